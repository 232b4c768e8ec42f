//! Staged intake of user-selected media: type, size and dimension gates,
//! preview lifetime, and upload.

use std::{io::Cursor, path::Path, sync::Arc};

use async_trait::async_trait;
use shared::{domain::PreviewRef, protocol::PostRecord};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::ClientSettings,
    error::{ClientError, Result, ValidationError},
    preview::{PreviewHandle, PreviewStore},
    remote::{MediaUpload, NewPost, RemoteData},
    BusyFlag, Liveness,
};

pub const JPEG: &str = "image/jpeg";
pub const PNG: &str = "image/png";
pub const WEBP: &str = "image/webp";
pub const GIF: &str = "image/gif";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeRejection {
    #[error("Only {allowed} allowed")]
    InvalidType { media_type: String, allowed: String },
    #[error("Image too large (max {})", human_size(*.max_bytes))]
    TooLarge { size_bytes: u64, max_bytes: u64 },
    #[error("Image must be at least {min}x{min} px")]
    TooSmall { width: u32, height: u32, min: u32 },
    #[error("Invalid image file")]
    Unreadable,
}

fn human_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}

/// Fixed gates a candidate file must pass, checked in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPolicy {
    pub allowed_types: Vec<&'static str>,
    pub max_bytes: u64,
    pub min_dimension: u32,
}

impl MediaPolicy {
    pub fn post(settings: &ClientSettings) -> Self {
        Self {
            allowed_types: vec![JPEG, PNG, WEBP],
            max_bytes: settings.max_upload_bytes,
            min_dimension: settings.min_post_dimension,
        }
    }

    pub fn avatar(settings: &ClientSettings) -> Self {
        Self {
            allowed_types: vec![JPEG, PNG, WEBP, GIF],
            max_bytes: settings.max_upload_bytes,
            min_dimension: 1,
        }
    }

    pub fn check_type(&self, media_type: &str) -> Result<(), IntakeRejection> {
        let media_type = media_type.trim().to_ascii_lowercase();
        if self.allowed_types.iter().any(|allowed| *allowed == media_type) {
            return Ok(());
        }
        Err(IntakeRejection::InvalidType {
            media_type,
            allowed: self.allowed_label(),
        })
    }

    pub fn check_size(&self, size_bytes: u64) -> Result<(), IntakeRejection> {
        if size_bytes > self.max_bytes {
            return Err(IntakeRejection::TooLarge {
                size_bytes,
                max_bytes: self.max_bytes,
            });
        }
        Ok(())
    }

    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), IntakeRejection> {
        if width < self.min_dimension || height < self.min_dimension {
            return Err(IntakeRejection::TooSmall {
                width,
                height,
                min: self.min_dimension,
            });
        }
        Ok(())
    }

    fn allowed_label(&self) -> String {
        let names: Vec<&str> = self
            .allowed_types
            .iter()
            .map(|t| match *t {
                JPEG => "JPG",
                PNG => "PNG",
                WEBP => "WEBP",
                GIF => "GIF",
                other => other,
            })
            .collect();
        match names.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} or {last}", rest.join(", ")),
            Some((last, _)) => (*last).to_string(),
            None => String::new(),
        }
    }
}

/// A file the user picked, with its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl CandidateFile {
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads a file from disk, declaring its media type from the extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload.bin")
            .to_string();
        let media_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(Self::new(name, media_type, bytes))
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn to_upload(&self) -> MediaUpload {
        MediaUpload {
            filename: self.name.clone(),
            media_type: self.media_type.clone(),
            bytes: self.bytes.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationState {
    Pending,
    Validating,
    Valid,
    Rejected(IntakeRejection),
}

#[derive(Debug)]
pub struct AssetDraft {
    file: CandidateFile,
    preview: Option<PreviewHandle>,
    state: ValidationState,
}

impl AssetDraft {
    fn new(file: CandidateFile) -> Self {
        Self {
            file,
            preview: None,
            state: ValidationState::Pending,
        }
    }

    pub fn file(&self) -> &CandidateFile {
        &self.file
    }

    pub fn state(&self) -> &ValidationState {
        &self.state
    }

    pub fn preview(&self) -> Option<&PreviewRef> {
        self.preview.as_ref().map(PreviewHandle::reference)
    }

    pub fn is_valid(&self) -> bool {
        self.state == ValidationState::Valid
    }
}

/// Reads the natural pixel dimensions of an encoded image.
#[async_trait]
pub trait ImageProbe: Send + Sync {
    async fn dimensions(&self, bytes: Arc<[u8]>) -> Result<(u32, u32), IntakeRejection>;
}

/// Decodes the image header with the `image` crate off the async executor.
pub struct DecodingProbe;

#[async_trait]
impl ImageProbe for DecodingProbe {
    async fn dimensions(&self, bytes: Arc<[u8]>) -> Result<(u32, u32), IntakeRejection> {
        tokio::task::spawn_blocking(move || {
            image::ImageReader::new(Cursor::new(&bytes[..]))
                .with_guessed_format()
                .map_err(|err| err.to_string())?
                .into_dimensions()
                .map_err(|err| err.to_string())
        })
        .await
        .map_err(|_| IntakeRejection::Unreadable)?
        .map_err(|reason| {
            debug!(%reason, "image probe failed");
            IntakeRejection::Unreadable
        })
    }
}

pub struct AssetIntakeController {
    policy: MediaPolicy,
    probe: Arc<dyn ImageProbe>,
    previews: Arc<dyn PreviewStore>,
    liveness: Liveness,
    caption_max_chars: usize,
    draft: Option<AssetDraft>,
    uploading: bool,
}

impl AssetIntakeController {
    pub fn new(
        policy: MediaPolicy,
        probe: Arc<dyn ImageProbe>,
        previews: Arc<dyn PreviewStore>,
        liveness: Liveness,
    ) -> Self {
        Self {
            policy,
            probe,
            previews,
            liveness,
            caption_max_chars: ClientSettings::default().caption_max_chars,
            draft: None,
            uploading: false,
        }
    }

    pub fn with_caption_limit(mut self, caption_max_chars: usize) -> Self {
        self.caption_max_chars = caption_max_chars;
        self
    }

    pub fn policy(&self) -> &MediaPolicy {
        &self.policy
    }

    pub fn draft(&self) -> Option<&AssetDraft> {
        self.draft.as_ref()
    }

    pub fn state(&self) -> Option<&ValidationState> {
        self.draft.as_ref().map(AssetDraft::state)
    }

    pub fn has_draft(&self) -> bool {
        self.draft.is_some()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    /// The validated asset, if one is ready to travel with a submission.
    pub fn pending_asset(&self) -> Option<MediaUpload> {
        self.draft
            .as_ref()
            .filter(|draft| draft.is_valid())
            .map(|draft| draft.file.to_upload())
    }

    /// Replaces any current draft with `file` and runs it through the gates.
    ///
    /// The previous draft's preview is released before validation starts.
    /// A preview for the new file exists only once every gate has passed.
    pub async fn select(&mut self, file: CandidateFile) -> Result<PreviewRef> {
        self.discard();
        self.draft = Some(AssetDraft::new(file.clone()));

        let outcome = self.run_gates(&file).await;
        if !self.liveness.is_alive() {
            self.draft = None;
            return Err(ClientError::TornDown);
        }

        match outcome {
            Ok(()) => {
                let preview =
                    PreviewHandle::acquire(Arc::clone(&self.previews), &file.media_type, &file.bytes);
                let reference = preview.reference().clone();
                if let Some(draft) = self.draft.as_mut() {
                    draft.preview = Some(preview);
                    draft.state = ValidationState::Valid;
                }
                debug!(file = %file.name, "asset accepted");
                Ok(reference)
            }
            Err(rejection) => {
                debug!(file = %file.name, %rejection, "asset rejected");
                self.set_state(ValidationState::Rejected(rejection.clone()));
                Err(rejection.into())
            }
        }
    }

    async fn run_gates(&mut self, file: &CandidateFile) -> Result<(), IntakeRejection> {
        self.policy.check_type(&file.media_type)?;
        self.policy.check_size(file.size_bytes())?;

        self.set_state(ValidationState::Validating);
        let (width, height) = self.probe.dimensions(Arc::clone(&file.bytes)).await?;
        self.policy.check_dimensions(width, height)
    }

    fn set_state(&mut self, state: ValidationState) {
        if let Some(draft) = self.draft.as_mut() {
            draft.state = state;
        }
    }

    /// Drops the draft, releasing its preview if it has one.
    pub fn discard(&mut self) {
        if let Some(draft) = self.draft.take() {
            if let Some(preview) = draft.preview {
                preview.release();
            }
        }
    }

    pub fn teardown(&mut self) {
        self.discard();
    }

    /// Checks that an upload could be issued right now without issuing it.
    pub fn prepare_upload(&self, caption: &str) -> Result<NewPost, ValidationError> {
        let draft = self.draft.as_ref().ok_or(ValidationError::NoAsset)?;
        if !draft.is_valid() {
            return Err(ValidationError::AssetNotReady);
        }
        let trimmed = caption.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyCaption);
        }
        if trimmed.chars().count() > self.caption_max_chars {
            return Err(ValidationError::CaptionTooLong {
                max: self.caption_max_chars,
            });
        }
        Ok(NewPost {
            image: draft.file.to_upload(),
            caption: caption.to_string(),
        })
    }

    pub fn can_upload(&self, caption: &str) -> bool {
        !self.uploading && self.prepare_upload(caption).is_ok()
    }

    /// Sends the valid draft with `caption` as a new post. On success the
    /// draft and its preview are cleared; on failure both stay for a retry.
    pub async fn upload(&mut self, remote: &dyn RemoteData, caption: &str) -> Result<PostRecord> {
        if self.uploading {
            return Err(ClientError::Busy("upload"));
        }
        let post = self.prepare_upload(caption)?;

        let result = {
            let _busy = BusyFlag::raise(&mut self.uploading);
            remote.create_post(post).await
        };

        if !self.liveness.is_alive() {
            return Err(ClientError::TornDown);
        }

        match result {
            Ok(created) => {
                info!(post_id = %created.id, "post uploaded");
                self.discard();
                Ok(created)
            }
            Err(err) => {
                warn!(error = %err, "post upload failed");
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/intake_tests.rs"]
mod tests;
