//! Targets: externally checkable markers of completed work
//!
//! A target is the engine's only window into whether a task's work is
//! already done. The engine never writes targets itself; a task's `run()`
//! is responsible for materializing its own output.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::TargetError;

/// A checkable unit of completed work (file, record, marker).
///
/// `exists()` must be safe to call concurrently from multiple scheduler
/// workers; it is read-only. A query failure (permissions, connectivity)
/// is a `TargetError`, not a clean `false`.
pub trait Target: Send + Sync {
    fn exists(&self) -> Result<bool, TargetError>;

    /// Stable locator string used for logging and dedup diagnostics
    fn identity(&self) -> String;
}

/// Filesystem target: complete when the path exists
#[derive(Debug, Clone)]
pub struct FsTarget {
    path: PathBuf,
}

impl FsTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the output to force a re-run on the next invocation.
    /// Removing an already-absent target is not an error.
    pub fn remove(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Target for FsTarget {
    fn exists(&self) -> Result<bool, TargetError> {
        match std::fs::symlink_metadata(&self.path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TargetError::new(self.identity(), e)),
        }
    }

    fn identity(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory target backed by an atomic flag.
///
/// Clones share the flag, so a task can hold one clone and its graph node
/// another. Used by the engine's own tests and by consumers writing
/// engine-level tests without touching the filesystem.
#[derive(Debug, Clone)]
pub struct MemTarget {
    name: String,
    present: Arc<AtomicBool>,
}

impl MemTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            present: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a target that already exists
    pub fn existing(name: impl Into<String>) -> Self {
        let t = Self::new(name);
        t.complete();
        t
    }

    /// Mark the work as done (what a task's `run()` would do)
    pub fn complete(&self) {
        self.present.store(true, Ordering::SeqCst);
    }

    /// Clear the marker, forcing a re-run on the next invocation
    pub fn reset(&self) {
        self.present.store(false, Ordering::SeqCst);
    }

    pub fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }
}

impl Target for MemTarget {
    fn exists(&self) -> Result<bool, TargetError> {
        Ok(self.is_present())
    }

    fn identity(&self) -> String {
        format!("mem://{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_target_existence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let target = FsTarget::new(&path);

        assert!(!target.exists().unwrap());

        std::fs::write(&path, "done").unwrap();
        assert!(target.exists().unwrap());
    }

    #[test]
    fn fs_target_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let target = FsTarget::new(&path);

        std::fs::write(&path, "done").unwrap();
        target.remove().unwrap();
        assert!(!target.exists().unwrap());

        // already gone: still ok
        target.remove().unwrap();
    }

    #[test]
    fn mem_target_clones_share_state() {
        let a = MemTarget::new("a1");
        let b = a.clone();

        assert!(!b.exists().unwrap());
        a.complete();
        assert!(b.exists().unwrap());

        b.reset();
        assert!(!a.exists().unwrap());
    }

    #[test]
    fn identities() {
        assert_eq!(MemTarget::new("x").identity(), "mem://x");
        let fs = FsTarget::new("/tmp/out.gz");
        assert_eq!(fs.identity(), "/tmp/out.gz");
    }
}
