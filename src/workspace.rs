//! Work directory layout
//!
//! Every build runs against a work root holding a fixed skeleton of
//! directories. Scripts in non-chroot mode see each directory through an
//! environment variable.

use crate::errors::{RibError, Result};
use crate::fileops::{ensure_dir, ensure_file, is_empty, real_path};
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const MARKER: &str = "._RIB_";
pub const BUILD_DIR: &str = "build.d";
pub const ROOTFS_DIR: &str = "rootfs";
pub const BIN_DIR: &str = "bin";
pub const DIST_DIR: &str = "dist";
pub const FILES_DIR: &str = "files";
pub const TEMP_DIR: &str = "tmp";
pub const LOG_DIR: &str = "log";
pub const FAKEROOT_SAVE: &str = "fakeroot.save";

/// Kind of skeleton entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of the directory skeleton
#[derive(Debug, Clone, Copy)]
pub struct SkeletonEntry {
    pub name: &'static str,
    pub kind: EntryKind,
    /// Variable exported to non-chroot scripts
    pub env_var: Option<&'static str>,
    /// Only created by `init`, never recreated afterwards
    pub init_only: bool,
}

pub const SKELETON: &[SkeletonEntry] = &[
    SkeletonEntry {
        name: MARKER,
        kind: EntryKind::File,
        env_var: None,
        init_only: true,
    },
    SkeletonEntry {
        name: BUILD_DIR,
        kind: EntryKind::Dir,
        env_var: Some("RIB_DIR_BUILDD"),
        init_only: false,
    },
    SkeletonEntry {
        name: ROOTFS_DIR,
        kind: EntryKind::Dir,
        env_var: Some("RIB_DIR_ROOTFS"),
        init_only: false,
    },
    SkeletonEntry {
        name: BIN_DIR,
        kind: EntryKind::Dir,
        env_var: Some("RIB_DIR_BIN"),
        init_only: false,
    },
    SkeletonEntry {
        name: DIST_DIR,
        kind: EntryKind::Dir,
        env_var: Some("RIB_DIR_DIST"),
        init_only: false,
    },
    SkeletonEntry {
        name: FILES_DIR,
        kind: EntryKind::Dir,
        env_var: Some("RIB_DIR_FILES"),
        init_only: false,
    },
    SkeletonEntry {
        name: TEMP_DIR,
        kind: EntryKind::Dir,
        env_var: Some("RIB_DIR_TEMP"),
        init_only: false,
    },
    SkeletonEntry {
        name: LOG_DIR,
        kind: EntryKind::Dir,
        env_var: Some("RIB_DIR_LOG"),
        init_only: false,
    },
    SkeletonEntry {
        name: FAKEROOT_SAVE,
        kind: EntryKind::File,
        env_var: None,
        init_only: false,
    },
];

/// A work root and the paths derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Open an existing, initialized work root by its canonical path.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let workspace = Self::new(real_path(root.as_ref())?);
        if !workspace.is_initialized() {
            return Err(RibError::NotInitialized(workspace.root));
        }
        Ok(workspace)
    }

    /// Create the skeleton in an empty (or missing) directory.
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        ensure_dir(root)?;

        let workspace = Self::new(real_path(root)?);
        if workspace.is_initialized() {
            return Err(RibError::AlreadyInitialized(workspace.root));
        }
        if !is_empty(&workspace.root)? {
            return Err(RibError::NotEmpty(workspace.root));
        }

        workspace.ensure_skeleton(true)?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when the marker file exists and is not a directory.
    pub fn is_initialized(&self) -> bool {
        fs::metadata(self.root.join(MARKER))
            .map(|meta| !meta.is_dir())
            .unwrap_or(false)
    }

    /// Idempotently create every skeleton entry. Init-only entries are
    /// skipped unless `initializing` is set.
    pub fn ensure_skeleton(&self, initializing: bool) -> Result<()> {
        for entry in SKELETON {
            if entry.init_only && !initializing {
                continue;
            }
            let path = self.root.join(entry.name);
            match entry.kind {
                EntryKind::File => ensure_file(&path)?,
                EntryKind::Dir => ensure_dir(&path)?,
            }
        }
        Ok(())
    }

    /// Remove generated state, then restore the skeleton.
    pub fn clean(&self, all: bool) -> Result<()> {
        let mut targets = vec![ROOTFS_DIR, TEMP_DIR, FAKEROOT_SAVE];
        if all {
            targets.extend([DIST_DIR, LOG_DIR]);
        }

        for target in targets {
            let path = self.root.join(target);
            debug!("Removing '{}'.", path.display());
            remove_all(&path)?;
        }

        self.ensure_skeleton(false)
    }

    /// `(variable, absolute path)` for every skeleton entry that exports one
    pub fn dir_vars(&self) -> Vec<(&'static str, PathBuf)> {
        SKELETON
            .iter()
            .filter_map(|entry| entry.env_var.map(|var| (var, self.root.join(entry.name))))
            .collect()
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root.join(BUILD_DIR)
    }

    pub fn rootfs_dir(&self) -> PathBuf {
        self.root.join(ROOTFS_DIR)
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join(BIN_DIR)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join(TEMP_DIR)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join(LOG_DIR)
    }

    pub fn fakeroot_save(&self) -> PathBuf {
        self.root.join(FAKEROOT_SAVE)
    }
}

fn remove_all(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}
