//! Per-run temporary workspace.
//!
//! Every pipeline run extracts, signs, and repackages inside a uniquely
//! named scratch directory that is removed on every exit path. Deletion
//! rides on [`tempfile::TempDir`]'s drop guard, so an error anywhere in
//! the pipeline still cleans up.

use crate::{Error, Result};
use log::{debug, warn};
use std::path::Path;
use tempfile::TempDir;

/// A uniquely named temporary directory owned by one pipeline run.
///
/// The directory is deleted when the `Workspace` is dropped; [`release`]
/// deletes it eagerly and reports (but never propagates) removal
/// failures.
///
/// [`release`]: Workspace::release
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Workspace`] if the host filesystem rejects
    /// creation.
    pub fn acquire() -> Result<Self> {
        let dir = TempDir::with_prefix("ipasign-").map_err(Error::Workspace)?;
        debug!("acquired workspace: {}", dir.path().display());
        Ok(Workspace { dir })
    }

    /// Path of the workspace directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the workspace now.
    ///
    /// Removal failure is logged, never escalated: by this point the run
    /// has either succeeded or already carries a more useful error.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("failed to remove workspace {}: {e}", path.display());
        } else {
            debug!("released workspace: {}", path.display());
        }
    }
}
