//! HTTP backend over `reqwest`.

use crate::config::BackendConfig;
use crate::dispatch::backend::{Backend, BackendReply, ImageReply, ImageRequest, TextRequest};
use crate::dispatch::extract::{parse_image_reply, parse_reply};
use crate::error::{DialogueFailure, GroundedError, Result};

/// Conversational backend reached over HTTP with JSON bodies.
pub struct HttpBackend {
    client: reqwest::Client,
    text_url: String,
    image_url: String,
    health_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Self {
        let base = config.url.trim_end_matches('/');
        Self {
            client: reqwest::Client::new(),
            text_url: join(base, &config.text_path),
            image_url: join(base, &config.image_path),
            health_url: join(base, "/health"),
        }
    }

    pub fn text_url(&self) -> &str {
        &self.text_url
    }

    /// `GET /health`, returning the response body.
    ///
    /// # Errors
    ///
    /// Returns `GroundedError::Backend` when the backend is unreachable or
    /// answers with a non-success status.
    pub async fn check_health(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.health_url)
            .send()
            .await
            .map_err(|e| GroundedError::Backend {
                message: format!("{} unreachable: {e}", self.health_url),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GroundedError::Backend {
                message: format!("health check returned status {status}"),
            });
        }
        Ok(body)
    }

    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> std::result::Result<String, DialogueFailure> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| DialogueFailure::NetworkFailure(format!("POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DialogueFailure::NetworkFailure(format!(
                "POST {url} returned status {status}"
            )));
        }

        response
            .text()
            .await
            .map_err(|e| DialogueFailure::NetworkFailure(format!("reading body: {e}")))
    }
}

fn join(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn send_text(
        &self,
        request: &TextRequest,
    ) -> std::result::Result<BackendReply, DialogueFailure> {
        let body = self.post(&self.text_url, request).await?;
        parse_reply(&body)
    }

    async fn send_image(
        &self,
        request: &ImageRequest,
    ) -> std::result::Result<ImageReply, DialogueFailure> {
        let body = self.post(&self.image_url, request).await?;
        parse_image_reply(&body)
    }

    fn name(&self) -> &str {
        "http"
    }
}
