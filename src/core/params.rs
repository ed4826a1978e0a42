use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::GenerationMode;

/// Longest side a normalized image may have.
pub const MAX_SIDE: u32 = 1024;
/// Shortest side a normalized image should have.
pub const MIN_SIDE: u32 = 256;
/// Composite canvas edge length.
pub const CANVAS_SIDE: u32 = 1024;
/// Encoded size limit for processed images and the composite (4 MiB).
pub const MAX_ARTIFACT_BYTES: u64 = 4 * 1024 * 1024;

/// Pipeline parameters suitable for config files and embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuseParams {
    pub mode: GenerationMode,
    /// Directory holding staged uploads and per-request artifacts
    pub work_dir: PathBuf,
    /// Reject any encoded artifact larger than this
    pub max_artifact_bytes: u64,
}

impl FuseParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_artifact_bytes == 0 {
            return Err(Error::InvalidArgument {
                arg: "max_artifact_bytes",
                value: self.max_artifact_bytes.to_string(),
            });
        }
        if self.work_dir.as_os_str().is_empty() {
            return Err(Error::InvalidArgument {
                arg: "work_dir",
                value: String::new(),
            });
        }
        Ok(())
    }
}

impl Default for FuseParams {
    fn default() -> Self {
        Self {
            mode: GenerationMode::EditWithMask,
            work_dir: PathBuf::from("uploads"),
            max_artifact_bytes: MAX_ARTIFACT_BYTES,
        }
    }
}
