//! The profile view: owns the canonical record and wires the controllers to
//! the remote collaborator.

use std::sync::Arc;

use shared::{
    domain::{PostId, PreviewRef},
    protocol::{PostRecord, ProfileRecord, ProfileSnapshot},
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    config::ClientSettings,
    edit::{EditStateController, FieldValue, ProfileField},
    error::{ClientError, Result},
    events::{AssetSlot, ClientEvent, Notice},
    intake::{AssetIntakeController, CandidateFile, DecodingProbe, ImageProbe, MediaPolicy},
    posts::{PostLifecycleController, RemovalOutcome},
    preview::{ObjectUrlStore, PreviewStore},
    remote::RemoteData,
    BusyFlag, Liveness,
};

pub struct ProfileView {
    remote: Arc<dyn RemoteData>,
    liveness: Liveness,
    events: broadcast::Sender<ClientEvent>,
    record: Option<ProfileRecord>,
    edit: EditStateController,
    avatar: AssetIntakeController,
    composer: AssetIntakeController,
    posts: PostLifecycleController,
    loading: bool,
}

impl ProfileView {
    pub fn new(remote: Arc<dyn RemoteData>, settings: &ClientSettings) -> Self {
        Self::new_with_dependencies(
            remote,
            settings,
            ObjectUrlStore::new(),
            Arc::new(DecodingProbe),
        )
    }

    pub fn new_with_dependencies(
        remote: Arc<dyn RemoteData>,
        settings: &ClientSettings,
        previews: Arc<dyn PreviewStore>,
        probe: Arc<dyn ImageProbe>,
    ) -> Self {
        let liveness = Liveness::new();
        let (events, _) = broadcast::channel(256);
        Self {
            remote,
            events,
            record: None,
            edit: EditStateController::new(liveness.clone()),
            avatar: AssetIntakeController::new(
                MediaPolicy::avatar(settings),
                Arc::clone(&probe),
                Arc::clone(&previews),
                liveness.clone(),
            ),
            composer: AssetIntakeController::new(
                MediaPolicy::post(settings),
                probe,
                previews,
                liveness.clone(),
            )
            .with_caption_limit(settings.caption_max_chars),
            posts: PostLifecycleController::new(Vec::new(), liveness.clone()),
            liveness,
            loading: false,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn record(&self) -> Option<&ProfileRecord> {
        self.record.as_ref()
    }

    pub fn edit_state(&self) -> &EditStateController {
        &self.edit
    }

    pub fn avatar_intake(&self) -> &AssetIntakeController {
        &self.avatar
    }

    pub fn post_intake(&self) -> &AssetIntakeController {
        &self.composer
    }

    pub fn posts(&self) -> &[PostRecord] {
        self.posts.posts()
    }

    pub fn post_lifecycle(&self) -> &PostLifecycleController {
        &self.posts
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// The avatar to show: the local preview of a pending file, else the
    /// stored one.
    pub fn avatar_display(&self) -> Option<String> {
        self.avatar
            .draft()
            .and_then(|draft| draft.preview())
            .map(|preview| preview.0.clone())
            .or_else(|| self.record.as_ref().and_then(|r| r.avatar.clone()))
    }

    pub fn is_dirty(&self) -> bool {
        self.edit.is_dirty(&self.avatar)
    }

    pub fn can_commit(&self) -> bool {
        self.edit
            .can_commit(&self.avatar, chrono::Local::now().date_naive())
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn notify(&self, notice: Notice) {
        self.emit(ClientEvent::Notice(notice));
    }

    fn replace_snapshot(&mut self, snapshot: ProfileSnapshot) {
        self.edit.sync_from(&snapshot.profile);
        self.posts.replace_posts(snapshot.posts);
        self.emit(ClientEvent::ProfileReplaced(snapshot.profile.clone()));
        self.record = Some(snapshot.profile);
    }

    pub async fn load(&mut self) -> Result<()> {
        if self.loading {
            return Err(ClientError::Busy("load"));
        }
        let result = {
            let _busy = BusyFlag::raise(&mut self.loading);
            self.remote.fetch_profile().await
        };
        if !self.liveness.is_alive() {
            return Err(ClientError::TornDown);
        }

        match result {
            Ok(snapshot) => {
                info!(user_id = %snapshot.profile.id, "profile loaded");
                self.replace_snapshot(snapshot);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "profile load failed");
                self.notify(Notice::error("Can not load the profile"));
                Err(err.into())
            }
        }
    }

    pub fn begin_edit(&mut self, field: ProfileField) {
        self.edit.begin_edit(field);
        self.emit(ClientEvent::EditStateChanged);
    }

    pub fn set_pending(&mut self, value: FieldValue) -> bool {
        let applied = self.edit.set_pending(value);
        if applied {
            self.emit(ClientEvent::EditStateChanged);
        }
        applied
    }

    pub fn cancel_edit(&mut self, field: ProfileField) {
        self.edit.cancel_edit(field);
        self.emit(ClientEvent::EditStateChanged);
    }

    pub async fn select_avatar(&mut self, file: CandidateFile) -> Result<PreviewRef> {
        let result = self.avatar.select(file).await;
        self.after_intake(AssetSlot::Avatar, &result);
        result
    }

    pub fn discard_avatar(&mut self) {
        self.avatar.discard();
        self.emit(ClientEvent::AssetDraftChanged {
            slot: AssetSlot::Avatar,
            state: None,
        });
    }

    pub async fn select_post_image(&mut self, file: CandidateFile) -> Result<PreviewRef> {
        let result = self.composer.select(file).await;
        self.after_intake(AssetSlot::Post, &result);
        result
    }

    pub fn discard_post_image(&mut self) {
        self.composer.discard();
        self.emit(ClientEvent::AssetDraftChanged {
            slot: AssetSlot::Post,
            state: None,
        });
    }

    fn after_intake(&self, slot: AssetSlot, result: &Result<PreviewRef>) {
        if matches!(result, Err(ClientError::TornDown)) {
            return;
        }
        let intake = match slot {
            AssetSlot::Avatar => &self.avatar,
            AssetSlot::Post => &self.composer,
        };
        self.emit(ClientEvent::AssetDraftChanged {
            slot,
            state: intake.state().cloned(),
        });
        if let Err(err) = result {
            self.notify(Notice::error(err.to_string()));
        }
    }

    /// Saves every field under edit plus any pending avatar, then replaces
    /// the canonical record with the refetched one.
    pub async fn commit(&mut self) -> Result<()> {
        let result = self
            .edit
            .commit_all(self.remote.as_ref(), &mut self.avatar)
            .await;

        match result {
            Ok(snapshot) => {
                self.replace_snapshot(snapshot);
                self.emit(ClientEvent::EditStateChanged);
                self.emit(ClientEvent::AssetDraftChanged {
                    slot: AssetSlot::Avatar,
                    state: self.avatar.state().cloned(),
                });
                self.notify(Notice::success("Details updated successfully."));
                Ok(())
            }
            Err(ClientError::ConsistencyGap { source }) => {
                self.notify(Notice::error(
                    "Details saved, but the profile could not be refreshed",
                ));
                Err(ClientError::ConsistencyGap { source })
            }
            Err(err @ ClientError::Transport(_)) => {
                self.notify(Notice::error("Can not update the details"));
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Uploads the post image with `caption`, then refetches so the new post
    /// shows up in the collection.
    pub async fn publish_post(&mut self, caption: &str) -> Result<PostRecord> {
        let created = match self.composer.upload(self.remote.as_ref(), caption).await {
            Ok(created) => created,
            Err(ClientError::Transport(err)) => {
                let reason = err.detail().unwrap_or("Upload failed").to_string();
                self.notify(Notice::error(reason));
                return Err(ClientError::Transport(err));
            }
            Err(ClientError::Validation(err)) => {
                self.notify(Notice::error(err.to_string()));
                return Err(ClientError::Validation(err));
            }
            Err(err) => return Err(err),
        };
        self.emit(ClientEvent::AssetDraftChanged {
            slot: AssetSlot::Post,
            state: None,
        });
        self.emit(ClientEvent::PostPublished(created.clone()));
        self.notify(Notice::success("Post uploaded successfully"));

        let refetch = self.remote.fetch_profile().await;
        if !self.liveness.is_alive() {
            return Err(ClientError::TornDown);
        }
        match refetch {
            Ok(snapshot) => {
                self.replace_snapshot(snapshot);
                Ok(created)
            }
            Err(source) => {
                warn!(error = %source, "post created but refetch failed; view is stale");
                Err(ClientError::ConsistencyGap { source })
            }
        }
    }

    pub async fn remove_post(&mut self, post_id: PostId) -> Result<RemovalOutcome> {
        let result = self
            .posts
            .request_removal(self.remote.as_ref(), post_id)
            .await;
        match &result {
            Ok(RemovalOutcome::Armed) => self.emit(ClientEvent::RemovalArmed(post_id)),
            Ok(RemovalOutcome::Removed(_)) => {
                self.emit(ClientEvent::PostRemoved(post_id));
                self.notify(Notice::success("Post deleted successfully"));
            }
            Ok(RemovalOutcome::Ignored) | Err(ClientError::TornDown) => {}
            Err(_) => self.notify(Notice::error("Can not delete this post")),
        }
        result
    }

    /// Marks the view dead, releases every live preview and disarms all posts.
    /// Responses still in flight are discarded when they arrive.
    pub fn teardown(&mut self) {
        self.liveness.tear_down();
        self.avatar.teardown();
        self.composer.teardown();
        self.posts.disarm_all();
    }
}

impl Drop for ProfileView {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "tests/profile_tests.rs"]
mod tests;
