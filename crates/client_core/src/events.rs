//! Change notifications emitted by the profile view.

use shared::{
    domain::PostId,
    protocol::{PostRecord, ProfileRecord},
};

use crate::intake::ValidationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSlot {
    Avatar,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// One-shot transient notification for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    ProfileReplaced(ProfileRecord),
    EditStateChanged,
    AssetDraftChanged {
        slot: AssetSlot,
        state: Option<ValidationState>,
    },
    RemovalArmed(PostId),
    PostRemoved(PostId),
    PostPublished(PostRecord),
    Notice(Notice),
}
