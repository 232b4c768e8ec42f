//! Per-field optimistic editing of the profile, reconciled on commit.

use chrono::NaiveDate;
use shared::{
    domain::Gender,
    protocol::{ProfileChanges, ProfileRecord, ProfileSnapshot},
};
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, Result, ValidationError},
    intake::AssetIntakeController,
    remote::{MediaUpload, ProfileUpdate, RemoteData},
    BusyFlag, Liveness,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    Name,
    BirthDate,
    Gender,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Name(String),
    BirthDate(Option<NaiveDate>),
    Gender(Option<Gender>),
}

impl FieldValue {
    pub fn field(&self) -> ProfileField {
        match self {
            FieldValue::Name(_) => ProfileField::Name,
            FieldValue::BirthDate(_) => ProfileField::BirthDate,
            FieldValue::Gender(_) => ProfileField::Gender,
        }
    }
}

/// Edit/view state of one attribute. `pending` only carries meaning while
/// `editing` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableField<T> {
    editing: bool,
    pending: Option<T>,
    committed: T,
}

impl<T: Clone> EditableField<T> {
    pub fn new(committed: T) -> Self {
        Self {
            editing: false,
            pending: None,
            committed,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn committed(&self) -> &T {
        &self.committed
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref().filter(|_| self.editing)
    }

    /// What the view shows: the pending value while editing, else the committed one.
    pub fn current(&self) -> &T {
        self.pending().unwrap_or(&self.committed)
    }

    fn begin(&mut self) {
        self.editing = true;
        if self.pending.is_none() {
            self.pending = Some(self.committed.clone());
        }
    }

    fn set(&mut self, value: T) -> bool {
        if !self.editing {
            return false;
        }
        self.pending = Some(value);
        true
    }

    fn cancel(&mut self) {
        self.editing = false;
        self.pending = None;
    }

    fn confirm(&mut self, echoed: T) {
        self.committed = echoed;
        self.editing = false;
        self.pending = None;
    }

    fn rebase(&mut self, committed: T) {
        self.committed = committed;
    }
}

pub struct EditStateController {
    name: EditableField<String>,
    birth_date: EditableField<Option<NaiveDate>>,
    gender: EditableField<Option<Gender>>,
    liveness: Liveness,
    committing: bool,
}

impl EditStateController {
    pub fn new(liveness: Liveness) -> Self {
        Self {
            name: EditableField::new(String::new()),
            birth_date: EditableField::new(None),
            gender: EditableField::new(None),
            liveness,
            committing: false,
        }
    }

    pub fn from_profile(profile: &ProfileRecord, liveness: Liveness) -> Self {
        let mut controller = Self::new(liveness);
        controller.sync_from(profile);
        controller
    }

    pub fn name(&self) -> &EditableField<String> {
        &self.name
    }

    pub fn birth_date(&self) -> &EditableField<Option<NaiveDate>> {
        &self.birth_date
    }

    pub fn gender(&self) -> &EditableField<Option<Gender>> {
        &self.gender
    }

    pub fn is_editing(&self, field: ProfileField) -> bool {
        match field {
            ProfileField::Name => self.name.is_editing(),
            ProfileField::BirthDate => self.birth_date.is_editing(),
            ProfileField::Gender => self.gender.is_editing(),
        }
    }

    pub fn any_editing(&self) -> bool {
        self.name.is_editing() || self.birth_date.is_editing() || self.gender.is_editing()
    }

    pub fn is_committing(&self) -> bool {
        self.committing
    }

    pub fn is_dirty(&self, avatar: &AssetIntakeController) -> bool {
        self.any_editing() || avatar.has_draft()
    }

    pub fn begin_edit(&mut self, field: ProfileField) {
        debug!(?field, "begin edit");
        match field {
            ProfileField::Name => self.name.begin(),
            ProfileField::BirthDate => self.birth_date.begin(),
            ProfileField::Gender => self.gender.begin(),
        }
    }

    /// Updates the pending value of a field that is being edited. Returns
    /// `false` and changes nothing when the field is not in edit mode.
    pub fn set_pending(&mut self, value: FieldValue) -> bool {
        match value {
            FieldValue::Name(v) => self.name.set(v),
            FieldValue::BirthDate(v) => self.birth_date.set(v),
            FieldValue::Gender(v) => self.gender.set(v),
        }
    }

    pub fn cancel_edit(&mut self, field: ProfileField) {
        match field {
            ProfileField::Name => self.name.cancel(),
            ProfileField::BirthDate => self.birth_date.cancel(),
            ProfileField::Gender => self.gender.cancel(),
        }
    }

    /// Takes new confirmed values without disturbing fields under edit.
    pub fn sync_from(&mut self, profile: &ProfileRecord) {
        self.name.rebase(profile.name.clone());
        self.birth_date.rebase(profile.birth_date);
        self.gender.rebase(profile.gender);
    }

    /// Pending values of the fields currently in edit mode.
    pub fn dirty_changes(&self) -> ProfileChanges {
        ProfileChanges {
            name: self.name.pending().cloned(),
            birth_date: self.birth_date.pending().copied(),
            gender: self.gender.pending().copied(),
        }
    }

    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationError> {
        if let Some(name) = self.name.pending() {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyName);
            }
        }
        if let Some(Some(birth_date)) = self.birth_date.pending() {
            crate::account::validate_birth_date(*birth_date, today)?;
        }
        Ok(())
    }

    /// Chooses the single payload for this commit: multipart when an avatar
    /// travels with it, structured otherwise.
    pub fn plan_commit(
        &self,
        avatar: Option<MediaUpload>,
        today: NaiveDate,
    ) -> Result<ProfileUpdate, ValidationError> {
        if !self.any_editing() && avatar.is_none() {
            return Err(ValidationError::NothingToCommit);
        }
        self.validate(today)?;

        let changes = self.dirty_changes();
        Ok(match avatar {
            Some(avatar) => ProfileUpdate::Multipart { changes, avatar },
            None => ProfileUpdate::Structured(changes),
        })
    }

    pub fn can_commit(&self, avatar: &AssetIntakeController, today: NaiveDate) -> bool {
        if self.committing || !self.is_dirty(avatar) {
            return false;
        }
        if avatar.has_draft() && avatar.pending_asset().is_none() {
            return false;
        }
        self.plan_commit(avatar.pending_asset(), today).is_ok()
    }

    /// Every field takes the server-echoed value and leaves edit mode.
    pub fn apply_confirmed(&mut self, profile: &ProfileRecord) {
        self.name.confirm(profile.name.clone());
        self.birth_date.confirm(profile.birth_date);
        self.gender.confirm(profile.gender);
    }

    /// Sends the dirty fields (and the avatar, if one is pending), then
    /// refetches the canonical record and reconciles against it.
    ///
    /// Nothing local changes unless both calls succeed. A failed refetch after
    /// an accepted update surfaces as [`ClientError::ConsistencyGap`].
    pub async fn commit_all(
        &mut self,
        remote: &dyn RemoteData,
        avatar: &mut AssetIntakeController,
    ) -> Result<ProfileSnapshot> {
        if self.committing {
            return Err(ClientError::Busy("commit"));
        }
        if avatar.has_draft() && avatar.pending_asset().is_none() {
            return Err(ValidationError::AssetNotReady.into());
        }
        let update = self.plan_commit(avatar.pending_asset(), today())?;
        let multipart = update.is_multipart();
        debug!(multipart, "committing profile changes");

        let refetch = {
            let _busy = BusyFlag::raise(&mut self.committing);
            if let Err(err) = remote.update_profile(update).await {
                if !self.liveness.is_alive() {
                    return Err(ClientError::TornDown);
                }
                warn!(error = %err, "profile update failed");
                return Err(err.into());
            }
            if !self.liveness.is_alive() {
                return Err(ClientError::TornDown);
            }
            remote.fetch_profile().await
        };
        if !self.liveness.is_alive() {
            return Err(ClientError::TornDown);
        }

        match refetch {
            Ok(snapshot) => {
                self.apply_confirmed(&snapshot.profile);
                if multipart {
                    avatar.discard();
                }
                info!(user_id = %snapshot.profile.id, "profile changes confirmed");
                Ok(snapshot)
            }
            Err(source) => {
                warn!(error = %source, "profile updated but refetch failed; view is stale");
                Err(ClientError::ConsistencyGap { source })
            }
        }
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
#[path = "tests/edit_tests.rs"]
mod tests;
