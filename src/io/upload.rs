use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::types::Slot;

/// A raw upload sitting in the working directory, owned by whoever runs the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub path: PathBuf,
    pub original_name: String,
    pub size_bytes: u64,
}

impl UploadedImage {
    /// File name up to its first `.`, or the slot's field name when that is empty.
    pub fn display_name(&self, slot: Slot) -> String {
        display_name(&self.original_name, slot)
    }
}

pub fn display_name(original_name: &str, slot: Slot) -> String {
    // Clients may send Windows paths, which `Path` does not split on Unix
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    match base.split('.').next() {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => slot.field_name().to_string(),
    }
}

fn reserve_path(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let file = tempfile::Builder::new()
        .prefix("upload-")
        .tempfile_in(dir)?;
    let path = file.into_temp_path().keep().map_err(|e| e.error)?;
    Ok(path)
}

/// Write an uploaded body to a fresh, uniquely named file in `dir`.
pub async fn stage_bytes(dir: &Path, original_name: &str, bytes: &[u8]) -> Result<UploadedImage> {
    let path = reserve_path(dir)?;
    if let Err(e) = tokio::fs::write(&path, bytes).await {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e.into());
    }
    debug!("Staged upload {:?} ({} bytes)", original_name, bytes.len());

    Ok(UploadedImage {
        path,
        original_name: original_name.to_string(),
        size_bytes: bytes.len() as u64,
    })
}

/// Copy a local file into `dir`, leaving the source untouched. The pipeline deletes
/// its inputs, so callers working from user files stage a copy first.
pub async fn stage_file(dir: &Path, source: &Path) -> Result<UploadedImage> {
    let path = reserve_path(dir)?;
    let size_bytes = match tokio::fs::copy(source, &path).await {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }
    };
    let original_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    debug!("Staged {:?} as {:?}", source, path);

    Ok(UploadedImage {
        path,
        original_name,
        size_bytes,
    })
}
