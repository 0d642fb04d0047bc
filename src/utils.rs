//! Utility functions for process setup

use crate::errors::{RibError, Result};
use nix::unistd::{access, AccessFlags};
use std::env;
use std::path::{Path, PathBuf};

/// System directories every child sees on its PATH.
pub const SYSTEM_PATH: &str = "/usr/sbin:/usr/bin:/sbin:/bin";

/// Check if running as root
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Refuse to continue with root privileges.
///
/// Build scripts are meant to run under fakeroot; real root would let them
/// write outside the image.
pub fn refuse_root() -> Result<()> {
    if is_root() {
        Err(RibError::PermissionDenied("cannot run as root".to_string()))
    } else {
        Ok(())
    }
}

/// Locates wrapper executables on a search path.
#[derive(Debug, Clone)]
pub struct ExecutableResolver {
    dirs: Vec<PathBuf>,
}

impl ExecutableResolver {
    /// Resolver over an explicit list of directories
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Resolver over the current PATH, with `/sbin` and `/usr/sbin` appended
    /// when missing (chroot usually lives there).
    pub fn from_env() -> Self {
        let path_value = env::var("PATH").unwrap_or_default();
        Self::new(with_sbin_dirs(&path_value))
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Resolve a program name to an absolute path using PATH semantics.
    pub fn resolve(&self, program: &str) -> Result<PathBuf> {
        if program.contains('/') {
            return Ok(PathBuf::from(program));
        }

        for dir in &self.dirs {
            let candidate = dir.join(program);
            if is_executable(&candidate) {
                return Ok(candidate);
            }
        }

        Err(RibError::ExecutableNotFound(program.to_string()))
    }
}

impl Default for ExecutableResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

fn with_sbin_dirs(path_value: &str) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = path_value
        .split(':')
        .map(|entry| PathBuf::from(if entry.is_empty() { "." } else { entry }))
        .collect();

    for extra in ["/sbin", "/usr/sbin"] {
        if !dirs.iter().any(|d| d == Path::new(extra)) {
            dirs.push(PathBuf::from(extra));
        }
    }

    dirs
}

fn is_executable(path: &Path) -> bool {
    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}
