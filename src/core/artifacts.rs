//! Scoped ownership of every file a request creates or receives.
//!
//! Paths are registered *before* the file is written, so a step that fails halfway
//! still leaves a registered path behind. Releasing attempts one delete per path and
//! swallows every error; a path that never materialized is simply skipped.
//!
//! Blocking workers can outlive the guard when the request future is dropped. They
//! hold a [`ReleaseSignal`] and sweep their own outputs once the guard has released.
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Collects artifact paths and deletes them on [`release`](ArtifactGuard::release)
/// or on drop, whichever happens first.
#[derive(Debug, Default)]
pub struct ArtifactGuard {
    paths: Vec<PathBuf>,
    released: Arc<AtomicBool>,
}

/// Shared view of whether an [`ArtifactGuard`] has released.
#[derive(Debug, Clone)]
pub struct ReleaseSignal(Arc<AtomicBool>);

impl ReleaseSignal {
    pub fn is_released(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Delete `paths` if the guard already released; call after writing them.
    /// Returns how many files were removed.
    pub fn sweep(&self, paths: &[&Path]) -> usize {
        if !self.is_released() {
            return 0;
        }
        let removed = paths.iter().filter(|p| remove_quietly(p)).count();
        if removed > 0 {
            debug!("Swept {} file(s) written after release", removed);
        }
        removed
    }
}

impl ArtifactGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            released: Arc::default(),
        }
    }

    /// Track `path` and hand it back for the caller to write to.
    pub fn register(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.paths.push(path.clone());
        path
    }

    pub fn signal(&self) -> ReleaseSignal {
        ReleaseSignal(Arc::clone(&self.released))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Stop tracking everything without deleting, handing the paths back.
    pub fn disarm(mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.paths)
    }

    /// Delete every registered path once. Returns how many files were actually
    /// removed. Later calls (including the one from `Drop`) find nothing to do.
    pub fn release(&mut self) -> usize {
        // Flag first: a worker that misses it wrote before the deletes below
        self.released.store(true, Ordering::SeqCst);
        let paths = std::mem::take(&mut self.paths);
        paths.iter().filter(|p| remove_quietly(p)).count()
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if !self.paths.is_empty() {
            let removed = self.release();
            debug!("Artifact guard dropped, removed {} file(s)", removed);
        }
    }
}

/// Best-effort delete. `true` only if a file was removed; a missing file is not an
/// error and other failures are logged and ignored.
pub fn remove_quietly(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            debug!("Could not remove {:?}: {}", path, e);
            false
        }
    }
}
