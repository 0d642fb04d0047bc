//! Idempotent filesystem helpers

use crate::errors::{RibError, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Create an empty regular file unless one already exists.
pub fn ensure_file(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Err(RibError::NotAFile(path.to_path_buf())),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Create a directory and its parents unless it already exists.
pub fn ensure_dir(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(RibError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(path)?;
            // A racing writer could have put a file there
            if fs::metadata(path)?.is_dir() {
                Ok(())
            } else {
                Err(RibError::NotADirectory(path.to_path_buf()))
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// True for an empty directory or a zero-length file.
pub fn is_empty(path: &Path) -> Result<bool> {
    let meta = fs::metadata(path)?;
    if meta.is_dir() {
        Ok(fs::read_dir(path)?.next().is_none())
    } else {
        Ok(meta.len() == 0)
    }
}

/// Copy `src` to `dst`, keeping its permission bits.
///
/// A directory destination receives the source's file name. Returns the path
/// of the written copy.
pub fn copy_file(dst: &Path, src: &Path) -> Result<PathBuf> {
    let src_meta = fs::metadata(src)?;
    if !src_meta.is_file() {
        return Err(RibError::NotAFile(src.to_path_buf()));
    }

    let target = if dst.is_dir() {
        let name = src
            .file_name()
            .ok_or_else(|| RibError::NotAFile(src.to_path_buf()))?;
        dst.join(name)
    } else {
        dst.to_path_buf()
    };

    let mut reader = File::open(src)?;
    let mut writer = File::create(&target)?;
    io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    fs::set_permissions(
        &target,
        fs::Permissions::from_mode(src_meta.permissions().mode()),
    )?;

    Ok(target)
}

/// Canonical absolute path with symlinks resolved.
pub fn real_path(path: &Path) -> Result<PathBuf> {
    let resolved = fs::canonicalize(path)?;
    if !resolved.is_dir() {
        return Err(RibError::NotADirectory(resolved));
    }
    Ok(resolved)
}
