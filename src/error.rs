//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Validation variants cover everything that rejects an upload before the generation
//! backend is contacted; `UpstreamError` covers the single outbound call.
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{label} could not be decoded: {source}")]
    ImageDecode {
        label: String,
        #[source]
        source: image::ImageError,
    },

    #[error("{label} could not be encoded: {source}")]
    ImageEncode {
        label: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Resize error: {0}")]
    Resize(String),

    #[error("{label} exceeds size limit ({size} bytes > {limit} bytes)")]
    SizeLimit { label: String, size: u64, limit: u64 },

    #[error("{label} is {width}x{height}, larger than the {canvas}x{canvas} canvas")]
    ExceedsCanvas {
        label: String,
        width: u32,
        height: u32,
        canvas: u32,
    },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }

    pub fn resize<E: std::fmt::Display>(e: E) -> Self {
        Error::Resize(e.to_string())
    }
}

/// Failures of the outbound generation call. `Display` is the detail shown to clients.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Transport(String),

    #[error("{detail}")]
    Status { status: u16, detail: String },

    #[error("malformed response")]
    MalformedResponse,
}
