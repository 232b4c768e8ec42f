//! Client-side controllers for the social network: per-field profile
//! editing, media intake and upload, and two-step post removal.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

pub mod account;
pub mod config;
pub mod edit;
pub mod error;
pub mod events;
pub mod format;
pub mod http;
pub mod intake;
pub mod posts;
pub mod preview;
pub mod profile;
pub mod remote;

pub use edit::{EditStateController, EditableField, FieldValue, ProfileField};
pub use error::{ClientError, TransportError, ValidationError};
pub use events::{AssetSlot, ClientEvent, Notice, NoticeLevel};
pub use http::HttpRemote;
pub use intake::{
    AssetDraft, AssetIntakeController, CandidateFile, IntakeRejection, MediaPolicy,
    ValidationState,
};
pub use posts::{PostLifecycleController, RemovalOutcome};
pub use profile::ProfileView;
pub use remote::{MediaUpload, NewPost, ProfileUpdate, RemoteData};

/// Shared "the owning view still exists" flag. Results of calls that
/// resolve after [`Liveness::tear_down`] must not be applied.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn tear_down(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds an operation's busy flag raised until dropped, so the flag also
/// clears when the caller abandons the operation's future.
pub(crate) struct BusyFlag<'a>(&'a mut bool);

impl<'a> BusyFlag<'a> {
    pub(crate) fn raise(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod support;
