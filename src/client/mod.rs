//! Generation backend seam: the payload shapes the pipeline submits, the trait the
//! orchestrator depends on, and the response/error parsing shared by adapters.
use std::future::Future;

use serde::Deserialize;
use serde_json::Value;

use crate::error::UpstreamError;
use crate::types::FusionResult;

pub mod openai;

pub use openai::{ClientConfig, OpenAiImageClient};

/// Number of images requested per fusion.
pub const IMAGE_COUNT: u32 = 1;

/// What gets sent to the backend, one variant per generation mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationPayload {
    /// Composite + mask + prompt, sent as multipart to the edit endpoint.
    Edit {
        image: Vec<u8>,
        mask: Vec<u8>,
        prompt: String,
        n: u32,
        size: &'static str,
    },
    /// Prompt only, sent as JSON to the generation endpoint.
    Generate {
        prompt: String,
        n: u32,
        size: &'static str,
    },
}

impl GenerationPayload {
    pub fn prompt(&self) -> &str {
        match self {
            GenerationPayload::Edit { prompt, .. } | GenerationPayload::Generate { prompt, .. } => {
                prompt
            }
        }
    }

    pub fn size(&self) -> &'static str {
        match self {
            GenerationPayload::Edit { size, .. } | GenerationPayload::Generate { size, .. } => *size,
        }
    }
}

/// A backend that turns a payload into one generated image. Implementations make a
/// single attempt; retries are not part of the contract.
pub trait ImageGenerator: Send + Sync {
    fn submit(
        &self,
        payload: GenerationPayload,
    ) -> impl Future<Output = Result<FusionResult, UpstreamError>> + Send;
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
}

/// Pull the first image URL out of an images API response body.
pub fn parse_images_response(body: &str) -> Result<FusionResult, UpstreamError> {
    let response: ImagesResponse =
        serde_json::from_str(body).map_err(|_| UpstreamError::MalformedResponse)?;
    response
        .data
        .into_iter()
        .next()
        .and_then(|img| img.url)
        .filter(|url| !url.is_empty())
        .map(FusionResult::new)
        .ok_or(UpstreamError::MalformedResponse)
}

/// Best available explanation for a non-2xx response: the structured message when the
/// body is JSON, else the raw body, else the status line.
pub fn error_detail(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .and_then(Value::as_str);
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        trimmed.to_string()
    }
}
