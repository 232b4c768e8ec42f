//! `RemoteData` over the service's HTTP API.

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder, Response,
};
use serde::de::DeserializeOwned;
use shared::{
    domain::PostId,
    error::ErrorBody,
    protocol::{
        Credentials, NewAccount, PostRecord, ProfileRecord, ProfileSnapshot, TokenPair,
    },
};
use tracing::debug;

use crate::{
    config::ClientSettings,
    error::TransportError,
    remote::{MediaUpload, NewPost, ProfileUpdate, RemoteData},
};

const AUTH_SCHEME: &str = "JWT";

pub struct HttpRemote {
    http: Client,
    server_url: String,
    access_token: Option<String>,
}

impl HttpRemote {
    pub fn new(settings: &ClientSettings) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|err| TransportError::Unreachable(err.to_string()))?;
        Ok(Self {
            http,
            server_url: settings.api_base_url.trim_end_matches('/').to_string(),
            access_token: None,
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.header(
                reqwest::header::AUTHORIZATION,
                format!("{AUTH_SCHEME} {token}"),
            ),
            None => request,
        }
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, TransportError> {
        let response = check(request.send().await?).await?;
        response
            .json()
            .await
            .map_err(|err| TransportError::Decode(err.to_string()))
    }
}

async fn check(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.reason());
    debug!(status = status.as_u16(), ?detail, "service rejected request");
    Err(TransportError::status(status.as_u16(), detail))
}

fn file_part(upload: MediaUpload) -> Result<Part, TransportError> {
    Part::bytes(upload.bytes)
        .file_name(upload.filename)
        .mime_str(&upload.media_type)
        .map_err(|err| TransportError::Decode(format!("invalid media type: {err}")))
}

fn text_form(fields: Vec<(&'static str, String)>) -> Form {
    fields
        .into_iter()
        .fold(Form::new(), |form, (name, value)| form.text(name, value))
}

#[async_trait]
impl RemoteData for HttpRemote {
    async fn create_account(
        &self,
        account: NewAccount,
        avatar: Option<MediaUpload>,
    ) -> Result<ProfileRecord, TransportError> {
        let mut form = text_form(account.form_fields());
        if let Some(avatar) = avatar {
            form = form.part("avatar", file_part(avatar)?);
        }
        Self::send_json(self.http.post(self.url("/auth/users/")).multipart(form)).await
    }

    async fn authenticate(&self, credentials: Credentials) -> Result<TokenPair, TransportError> {
        Self::send_json(
            self.http
                .post(self.url("/auth/jwt/create/"))
                .json(&credentials),
        )
        .await
    }

    async fn fetch_profile(&self) -> Result<ProfileSnapshot, TransportError> {
        Self::send_json(self.authorize(self.http.get(self.url("/auth/users/me/")))).await
    }

    async fn update_profile(&self, update: ProfileUpdate) -> Result<ProfileRecord, TransportError> {
        let request = self.authorize(self.http.patch(self.url("/auth/users/me/")));
        let request = match update {
            ProfileUpdate::Structured(changes) => request.json(&changes),
            ProfileUpdate::Multipart { changes, avatar } => {
                let form = text_form(changes.form_fields()).part("avatar", file_part(avatar)?);
                request.multipart(form)
            }
        };
        Self::send_json(request).await
    }

    async fn create_post(&self, post: NewPost) -> Result<PostRecord, TransportError> {
        let form = Form::new()
            .part("image", file_part(post.image)?)
            .text("caption", post.caption);
        Self::send_json(self.authorize(self.http.post(self.url("/api/posts/"))).multipart(form))
            .await
    }

    async fn delete_post(&self, post_id: PostId) -> Result<(), TransportError> {
        let request = self.authorize(self.http.delete(self.url(&format!("/api/posts/{post_id}/"))));
        check(request.send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
