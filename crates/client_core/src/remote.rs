//! The single "send a request, get a response or an error" capability the
//! controllers depend on.

use async_trait::async_trait;
use shared::{
    domain::PostId,
    protocol::{
        Credentials, NewAccount, PostRecord, ProfileChanges, ProfileRecord, ProfileSnapshot,
        TokenPair,
    },
};

use crate::error::TransportError;

/// A file part ready for multipart transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub filename: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Exactly one of these is transmitted per profile commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileUpdate {
    Structured(ProfileChanges),
    Multipart {
        changes: ProfileChanges,
        avatar: MediaUpload,
    },
}

impl ProfileUpdate {
    pub fn is_multipart(&self) -> bool {
        matches!(self, ProfileUpdate::Multipart { .. })
    }

    pub fn changes(&self) -> &ProfileChanges {
        match self {
            ProfileUpdate::Structured(changes) => changes,
            ProfileUpdate::Multipart { changes, .. } => changes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub image: MediaUpload,
    pub caption: String,
}

#[async_trait]
pub trait RemoteData: Send + Sync {
    async fn create_account(
        &self,
        account: NewAccount,
        avatar: Option<MediaUpload>,
    ) -> Result<ProfileRecord, TransportError>;
    async fn authenticate(&self, credentials: Credentials) -> Result<TokenPair, TransportError>;
    async fn fetch_profile(&self) -> Result<ProfileSnapshot, TransportError>;
    async fn update_profile(&self, update: ProfileUpdate) -> Result<ProfileRecord, TransportError>;
    async fn create_post(&self, post: NewPost) -> Result<PostRecord, TransportError>;
    async fn delete_post(&self, post_id: PostId) -> Result<(), TransportError>;
}
