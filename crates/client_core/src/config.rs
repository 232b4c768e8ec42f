use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: u64,
    pub min_post_dimension: u32,
    pub caption_max_chars: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".into(),
            request_timeout_secs: 30,
            max_upload_bytes: 2 * 1024 * 1024,
            min_post_dimension: 400,
            caption_max_chars: 150,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    max_upload_bytes: Option<u64>,
    min_post_dimension: Option<u32>,
    caption_max_chars: Option<usize>,
}

/// Defaults, then `client.toml` in the working directory, then environment.
pub fn load_settings() -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::default();
    let path = Path::new("client.toml");
    if path.exists() {
        apply_file(&mut settings, path)?;
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

/// Defaults, then the file at `path`, then environment.
pub fn load_settings_from(path: &Path) -> anyhow::Result<ClientSettings> {
    load_file_then_env(path, |key| std::env::var(key).ok())
}

fn load_file_then_env(
    path: &Path,
    var: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::default();
    apply_file(&mut settings, path)?;
    apply_env(&mut settings, var);
    Ok(settings)
}

fn apply_file(settings: &mut ClientSettings, path: &Path) -> anyhow::Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_cfg: FileSettings =
        toml::from_str(&raw).with_context(|| format!("invalid settings in {}", path.display()))?;

    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.max_upload_bytes {
        settings.max_upload_bytes = v;
    }
    if let Some(v) = file_cfg.min_post_dimension {
        settings.min_post_dimension = v;
    }
    if let Some(v) = file_cfg.caption_max_chars {
        settings.caption_max_chars = v;
    }
    Ok(())
}

fn apply_env(settings: &mut ClientSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SOCIAL_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = var("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(parsed) = var("APP__REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.request_timeout_secs = parsed;
    }
    if let Some(parsed) = var("APP__MAX_UPLOAD_BYTES").and_then(|v| v.parse().ok()) {
        settings.max_upload_bytes = parsed;
    }
    if let Some(parsed) = var("APP__MIN_POST_DIMENSION").and_then(|v| v.parse().ok()) {
        settings.min_post_dimension = parsed;
    }

    settings.api_base_url = settings.api_base_url.trim_end_matches('/').to_string();
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
