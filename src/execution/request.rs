//! A single script execution request

use crate::execution::flags::FlagSet;
use crate::workspace::Workspace;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One script to run, with the settings it runs under.
///
/// `program` and `args` are rewritten in place while the request is prepared
/// for spawning; everything else stays fixed after construction.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRequest {
    /// Program to execute
    pub program: PathBuf,
    /// Full argument vector, `args[0]` included
    pub args: Vec<String>,
    /// Capability flags
    pub flags: FlagSet,
    /// Sequence number parsed from the script name
    pub sequence: Option<u64>,
    /// Work root the script belongs to
    pub work_dir: PathBuf,
    /// Root directory for chroot
    pub chroot_dir: Option<PathBuf>,
    /// Fakeroot state file, loaded and saved around each run
    pub fakeroot_save: Option<PathBuf>,
}

impl ExecutionRequest {
    /// Request for `program` run with itself as `args[0]`.
    pub fn new(program: impl AsRef<Path>, flags: FlagSet) -> Self {
        let program = program.as_ref().to_path_buf();
        let args = vec![program.to_string_lossy().into_owned()];
        Self {
            program,
            args,
            flags,
            sequence: None,
            work_dir: PathBuf::new(),
            chroot_dir: None,
            fakeroot_save: None,
        }
    }

    /// Replace the argument vector (`args[0]` included).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Bind the request to a work root: chroot into its rootfs and keep
    /// fakeroot state in its save file.
    pub fn in_workspace(mut self, workspace: &Workspace) -> Self {
        self.work_dir = workspace.root().to_path_buf();
        self.chroot_dir = Some(workspace.rootfs_dir());
        self.fakeroot_save = Some(workspace.fakeroot_save());
        self
    }

    /// Human-readable command line
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in self.args.iter().skip(1) {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::flags::Flag;

    #[test]
    fn new_request_uses_program_as_argv0() {
        let req = ExecutionRequest::new("/work/build.d/10--base", FlagSet::empty());
        assert_eq!(req.args, vec!["/work/build.d/10--base"]);
        assert!(req.chroot_dir.is_none());
    }

    #[test]
    fn in_workspace_derives_paths() {
        let ws = Workspace::new("/work");
        let req = ExecutionRequest::new("/work/build.d/10-C-base", FlagSet::from_flags(&[Flag::Chroot]))
            .in_workspace(&ws);

        assert_eq!(req.work_dir, PathBuf::from("/work"));
        assert_eq!(req.chroot_dir, Some(PathBuf::from("/work/rootfs")));
        assert_eq!(req.fakeroot_save, Some(PathBuf::from("/work/fakeroot.save")));
    }

    #[test]
    fn command_line_joins_args() {
        let req = ExecutionRequest::new("/bin/bash", FlagSet::empty())
            .with_args(["bash", "--rcfile", "/.rc", "-i"]);
        assert_eq!(req.command_line(), "/bin/bash --rcfile /.rc -i");
    }
}
