//! Two-step (arm, then confirm) removal of posts from an ordered collection.

use std::collections::HashSet;

use shared::{domain::PostId, protocol::PostRecord};
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, Result},
    remote::RemoteData,
    Liveness,
};

/// What a removal invocation amounts to, decided before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalStep {
    Arm,
    Confirm,
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    Armed,
    Removed(PostRecord),
    Ignored,
}

pub struct PostLifecycleController {
    posts: Vec<PostRecord>,
    armed: HashSet<PostId>,
    deleting: HashSet<PostId>,
    liveness: Liveness,
}

impl PostLifecycleController {
    pub fn new(posts: Vec<PostRecord>, liveness: Liveness) -> Self {
        Self {
            posts,
            armed: HashSet::new(),
            deleting: HashSet::new(),
            liveness,
        }
    }

    pub fn posts(&self) -> &[PostRecord] {
        &self.posts
    }

    pub fn is_armed(&self, post_id: PostId) -> bool {
        self.armed.contains(&post_id)
    }

    pub fn is_deleting(&self, post_id: PostId) -> bool {
        self.deleting.contains(&post_id)
    }

    /// Swaps in a freshly fetched collection. Arming only survives for posts
    /// that are still present.
    pub fn replace_posts(&mut self, posts: Vec<PostRecord>) {
        self.armed
            .retain(|id| posts.iter().any(|post| post.id == *id));
        self.posts = posts;
    }

    pub fn step_for(&self, post_id: PostId) -> RemovalStep {
        if self.deleting.contains(&post_id) || !self.posts.iter().any(|p| p.id == post_id) {
            RemovalStep::Ignore
        } else if self.armed.contains(&post_id) {
            RemovalStep::Confirm
        } else {
            RemovalStep::Arm
        }
    }

    /// First call arms the post. A second call while armed deletes it
    /// remotely and, on success, drops it from the collection. The post is
    /// disarmed once that call resolves, whatever the outcome.
    pub async fn request_removal(
        &mut self,
        remote: &dyn RemoteData,
        post_id: PostId,
    ) -> Result<RemovalOutcome> {
        match self.step_for(post_id) {
            RemovalStep::Ignore => Ok(RemovalOutcome::Ignored),
            RemovalStep::Arm => {
                debug!(%post_id, "removal armed");
                self.armed.insert(post_id);
                Ok(RemovalOutcome::Armed)
            }
            RemovalStep::Confirm => {
                let result = {
                    let _in_flight =
                        InFlightRemoval::start(&mut self.armed, &mut self.deleting, post_id);
                    remote.delete_post(post_id).await
                };

                if !self.liveness.is_alive() {
                    return Err(ClientError::TornDown);
                }

                match result {
                    Ok(()) => {
                        let removed = self.remove_local(post_id);
                        info!(%post_id, "post deleted");
                        Ok(removed.map_or(RemovalOutcome::Ignored, RemovalOutcome::Removed))
                    }
                    Err(err) => {
                        warn!(%post_id, error = %err, "post deletion failed");
                        Err(err.into())
                    }
                }
            }
        }
    }

    fn remove_local(&mut self, post_id: PostId) -> Option<PostRecord> {
        let index = self.posts.iter().position(|post| post.id == post_id)?;
        Some(self.posts.remove(index))
    }

    pub fn disarm(&mut self, post_id: PostId) {
        self.armed.remove(&post_id);
    }

    pub fn disarm_all(&mut self) {
        self.armed.clear();
        self.deleting.clear();
    }
}

/// Marks a post as deleting; dropping it clears both the deleting and the
/// armed mark, whether the call resolved or was abandoned.
struct InFlightRemoval<'a> {
    armed: &'a mut HashSet<PostId>,
    deleting: &'a mut HashSet<PostId>,
    post_id: PostId,
}

impl<'a> InFlightRemoval<'a> {
    fn start(
        armed: &'a mut HashSet<PostId>,
        deleting: &'a mut HashSet<PostId>,
        post_id: PostId,
    ) -> Self {
        deleting.insert(post_id);
        Self {
            armed,
            deleting,
            post_id,
        }
    }
}

impl Drop for InFlightRemoval<'_> {
    fn drop(&mut self) {
        self.deleting.remove(&self.post_id);
        self.armed.remove(&self.post_id);
    }
}

#[cfg(test)]
#[path = "tests/posts_tests.rs"]
mod tests;
