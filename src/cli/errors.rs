use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Timeout must be greater than 0, got: {secs}")]
    ZeroTimeout { secs: u64 },

    #[error("Upload limit must be greater than 0 MiB, got: {mb}")]
    ZeroUploadLimit { mb: usize },

    #[error("Invalid listen address {host}:{port}")]
    InvalidAddress { host: String, port: u16 },

    #[error("Input file does not exist: {path}")]
    MissingInput { path: String },

    #[error("{0}")]
    Fuse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Library(#[from] carfuse::Error),
}
