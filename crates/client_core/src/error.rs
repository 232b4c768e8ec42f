use shared::error::ErrorCode;
use thiserror::Error;

use crate::{account::PasswordIssue, intake::IntakeRejection};

/// Failures detected locally; none of these ever reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0}")]
    Rejected(IntakeRejection),
    #[error("Please upload an image")]
    NoAsset,
    #[error("image is still being checked or was rejected")]
    AssetNotReady,
    #[error("Caption cannot be empty")]
    EmptyCaption,
    #[error("Caption must be at most {max} characters")]
    CaptionTooLong { max: usize },
    #[error("nothing to save")]
    NothingToCommit,
    #[error("Name cannot be empty")]
    EmptyName,
    #[error("Date of birth cannot be in the future")]
    BirthDateInFuture,
    #[error("weak password: {}", join_issues(.0))]
    WeakPassword(Vec<PasswordIssue>),
    #[error("Passwords do not match")]
    PasswordMismatch,
}

fn join_issues(issues: &[PasswordIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("service unreachable: {0}")]
    Unreachable(String),
    #[error("service responded {status}{}", .detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
    Status {
        status: u16,
        code: ErrorCode,
        detail: Option<String>,
    },
    #[error("malformed service response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn status(status: u16, detail: Option<String>) -> Self {
        TransportError::Status {
            status,
            code: ErrorCode::from_status(status),
            detail,
        }
    }

    /// Reason reported by the service, if it gave one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            TransportError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            TransportError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            TransportError::Decode(value.to_string())
        } else if let Some(status) = value.status() {
            TransportError::status(status.as_u16(), None)
        } else {
            TransportError::Unreachable(value.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The mutation was accepted but the confirmatory read failed. Local
    /// state stays at the last confirmed values until the next refresh.
    #[error("change saved but refresh failed: {source}")]
    ConsistencyGap { source: TransportError },
    #[error("{0} already in progress")]
    Busy(&'static str),
    #[error("view was torn down before the response arrived")]
    TornDown,
}

impl From<IntakeRejection> for ClientError {
    fn from(value: IntakeRejection) -> Self {
        ClientError::Validation(ValidationError::Rejected(value))
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
