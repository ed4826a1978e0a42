use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Serialize;
use tracing::{info, warn};

use super::{GenerationPayload, ImageGenerator, error_detail, parse_images_response};
use crate::error::{Error, Result, UpstreamError};
use crate::types::FusionResult;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the images API. The credential is injected here once at
/// startup rather than read from the environment per request.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    /// Sent as `model` when set; otherwise the backend default applies
    pub model: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::InvalidArgument {
                arg: "api_key",
                value: "<empty>".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidArgument {
                arg: "timeout",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Edits,
    Generations,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Endpoint::Edits => "images/edits",
            Endpoint::Generations => "images/generations",
        }
    }

    /// Full URL, tolerating base URLs given with or without a trailing `/v1`.
    pub fn url(self, base_url: &str) -> String {
        let trimmed = base_url.trim_end_matches('/');
        if trimmed.ends_with("/v1") {
            format!("{}/{}", trimmed, self.path())
        } else {
            format!("{}/v1/{}", trimmed, self.path())
        }
    }
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

/// HTTP adapter for the OpenAI-compatible images API.
#[derive(Debug, Clone)]
pub struct OpenAiImageClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl OpenAiImageClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::external)?;
        Ok(Self { http, config })
    }

    fn edit_form(
        &self,
        image: Vec<u8>,
        mask: Vec<u8>,
        prompt: String,
        n: u32,
        size: &str,
    ) -> std::result::Result<Form, UpstreamError> {
        let image = Part::bytes(image)
            .file_name("base.png")
            .mime_str("image/png")
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        let mask = Part::bytes(mask)
            .file_name("mask.png")
            .mime_str("image/png")
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let mut form = Form::new()
            .part("image", image)
            .part("mask", mask)
            .text("prompt", prompt)
            .text("n", n.to_string())
            .text("size", size.to_string());
        if let Some(model) = &self.config.model {
            form = form.text("model", model.clone());
        }
        Ok(form)
    }

    fn transport_error(&self, e: reqwest::Error) -> UpstreamError {
        if e.is_timeout() {
            UpstreamError::Timeout(self.config.timeout)
        } else {
            UpstreamError::Transport(e.without_url().to_string())
        }
    }
}

impl ImageGenerator for OpenAiImageClient {
    async fn submit(&self, payload: GenerationPayload) -> std::result::Result<FusionResult, UpstreamError> {
        let request = match payload {
            GenerationPayload::Edit {
                image,
                mask,
                prompt,
                n,
                size,
            } => {
                let url = Endpoint::Edits.url(&self.config.base_url);
                info!("Sending edit request to {}", url);
                let form = self.edit_form(image, mask, prompt, n, size)?;
                self.http.post(url).multipart(form)
            }
            GenerationPayload::Generate { prompt, n, size } => {
                let url = Endpoint::Generations.url(&self.config.base_url);
                info!("Sending generation request to {}", url);
                let body = GenerationRequest {
                    model: self.config.model.as_deref(),
                    prompt: &prompt,
                    n,
                    size,
                };
                self.http.post(url).json(&body)
            }
        };

        let response = request
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let detail = error_detail(status.as_u16(), &body);
            warn!("Images API returned {}: {}", status, detail);
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        parse_images_response(&body)
    }
}
