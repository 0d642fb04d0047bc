//! Per-script scratch directories
//!
//! Each script gets a fresh temp directory, and in chroot mode a second
//! directory the script binary is staged in. Both live inside the chroot
//! root when chrooting so they stay reachable after the root change. They are
//! removed when the guard is released or dropped, whatever the outcome.

use crate::errors::{RibError, Result};
use crate::execution::request::ExecutionRequest;
use crate::workspace::Workspace;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TEMP_PREFIX: &str = ".volatile.";
const EXEC_PREFIX: &str = ".exec.";

/// Scratch directories owned by one request
#[derive(Debug)]
pub struct VolatileDirs {
    temp: Option<TempDir>,
    exec: Option<TempDir>,
}

impl VolatileDirs {
    /// Allocate the directories `request` needs.
    pub fn allocate(request: &ExecutionRequest) -> Result<Self> {
        let workspace = Workspace::new(&request.work_dir);
        let chroot = request.flags.chroot();
        let base = if chroot {
            request
                .chroot_dir
                .clone()
                .unwrap_or_else(|| workspace.rootfs_dir())
        } else {
            workspace.temp_dir()
        };

        let temp = make_dir(&base, TEMP_PREFIX)?;
        // On failure below, `temp` is dropped and removed with it
        let exec = if chroot {
            Some(make_dir(&base, EXEC_PREFIX)?)
        } else {
            None
        };

        let dirs = Self {
            temp: Some(temp),
            exec,
        };
        debug!(
            "Allocated volatile dirs: temp={:?} exec={:?}",
            dirs.temp_path(),
            dirs.exec_path()
        );
        Ok(dirs)
    }

    pub fn temp_path(&self) -> Option<&Path> {
        self.temp.as_ref().map(TempDir::path)
    }

    pub fn exec_path(&self) -> Option<&Path> {
        self.exec.as_ref().map(TempDir::path)
    }

    /// Remove both directories. Calling it again is a no-op.
    pub fn release(&mut self) {
        for dir in [self.temp.take(), self.exec.take()].into_iter().flatten() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove volatile dir {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for VolatileDirs {
    fn drop(&mut self) {
        self.release();
    }
}

fn make_dir(base: &Path, prefix: &str) -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(base)
        .map_err(|source| RibError::ResourceAllocation {
            base: PathBuf::from(base),
            source,
        })
}
