//! Child environment composition

use crate::errors::{RibError, Result};
use crate::execution::request::ExecutionRequest;
use crate::utils::SYSTEM_PATH;
use crate::workspace::Workspace;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Sentinel scripts check to know they run under rib
pub const EXEC_ENV_MARKER: (&str, &str) = ("RIB_EXEC_ENV", "1");

/// Variables carried from one script to the next.
///
/// Written only by side-channel records (see [`crate::execution::side_channel`]),
/// read when composing the environment of every later script. Lives for one
/// build run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistentEnv {
    vars: BTreeMap<String, String>,
}

impl PersistentEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn setenv(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn unsetenv(&mut self, key: &str) {
        self.vars.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Ordered `NAME=value` pairs for one child.
///
/// A name may appear more than once; the child sees the last occurrence.
pub type ChildEnv = Vec<(String, String)>;

/// Compute the environment for `request`, whose volatile temp dir is `vtemp`.
pub fn build_environment(
    request: &ExecutionRequest,
    vtemp: &Path,
    persistent: &PersistentEnv,
) -> Result<ChildEnv> {
    let mut env = ChildEnv::new();

    if request.flags.chroot() {
        let root = request
            .chroot_dir
            .as_deref()
            .ok_or_else(|| RibError::Configuration("chroot dir not defined".to_string()))?;
        env.push(("PATH".to_string(), SYSTEM_PATH.to_string()));
        let inside = chroot_relative(root, vtemp)?;
        env.push(("VTEMP".to_string(), inside.to_string_lossy().into_owned()));
    } else {
        let workspace = Workspace::new(&request.work_dir);
        env.push((
            "PATH".to_string(),
            format!("{}:{}", workspace.bin_dir().display(), SYSTEM_PATH),
        ));
        env.push(("VTEMP".to_string(), vtemp.to_string_lossy().into_owned()));
        for (var, path) in workspace.dir_vars() {
            env.push((var.to_string(), path.to_string_lossy().into_owned()));
        }
    }

    for (name, value) in persistent.iter() {
        env.push((name.to_string(), value.to_string()));
    }

    env.push((
        EXEC_ENV_MARKER.0.to_string(),
        EXEC_ENV_MARKER.1.to_string(),
    ));

    Ok(env)
}

/// Express `path` as an absolute path inside the chroot at `root`.
pub fn chroot_relative(root: &Path, path: &Path) -> Result<PathBuf> {
    let unresolvable = || RibError::PathResolution {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    };

    let relative = path.strip_prefix(root).map_err(|_| unresolvable())?;
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(unresolvable());
    }

    Ok(Path::new("/").join(relative))
}
