//! Build controller
//!
//! [`Builder`] ties a work root to the script runner and exposes the
//! top-level operations: build, shell, clean and listing the build plan.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::errors::Result;
use crate::execution::env::chroot_relative;
use crate::execution::{ExecutionRequest, Flag, FlagSet, LineSink, PersistentEnv, ProcessRunner};
use crate::logging::{self, OutputHandle};
use crate::selector::ScriptSelector;
use crate::utils::ExecutableResolver;
use crate::workspace::Workspace;

pub const BUILD_LOG: &str = "build.log";

const SHELL_RC: &str = "alias ls='ls --color=auto'\nHISTFILE=\"\"\nPS1='\\u@[rib]:\\w\\$ '\n";

/// Outcome of a completed build
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Scripts selected for the run
    pub scripts_selected: usize,
    /// Scripts that ran to completion
    pub scripts_run: usize,
    /// Wall clock time of the whole run
    pub duration: Duration,
    /// Variables left behind by the side channel
    pub env: PersistentEnv,
}

/// Runs builds against one work root
pub struct Builder {
    workspace: Workspace,
    resolver: ExecutableResolver,
    sink: Option<Arc<dyn LineSink>>,
}

impl Builder {
    /// Open an initialized work root.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_workspace(Workspace::open(root)?))
    }

    /// Initialize a new work root and open it.
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        let workspace = Workspace::init(root)?;
        info!("Initialized work directory '{}'", workspace.root().display());
        Ok(Self::with_workspace(workspace))
    }

    fn with_workspace(workspace: Workspace) -> Self {
        Self {
            workspace,
            resolver: ExecutableResolver::from_env(),
            sink: None,
        }
    }

    /// Search path for the wrapper executables
    pub fn resolver(mut self, resolver: ExecutableResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Receive script output lines instead of the logger
    pub fn sink(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn runner(&self) -> ProcessRunner {
        let runner = ProcessRunner::new(self.resolver.clone());
        match &self.sink {
            Some(sink) => runner.with_sink(sink.clone()),
            None => runner,
        }
    }

    /// Requests a build starting at `seqmin` would run, in order.
    pub fn plan(&self, seqmin: u64) -> Result<Vec<ExecutionRequest>> {
        let selector = ScriptSelector::new(self.workspace.build_dir())?;
        Ok(selector
            .select(seqmin)?
            .into_iter()
            .map(|request| request.in_workspace(&self.workspace))
            .collect())
    }

    /// Run every selected script in order, stopping at the first failure.
    pub fn build(&self, seqmin: u64) -> Result<BuildReport> {
        self.workspace.ensure_skeleton(false)?;
        let _log = BuildLog::attach(&self.workspace.log_dir().join(BUILD_LOG))?;

        let mut env = PersistentEnv::new();
        let start = Instant::now();

        let requests = self.plan(seqmin)?;
        let mut report = BuildReport {
            scripts_selected: requests.len(),
            scripts_run: 0,
            duration: Duration::ZERO,
            env: PersistentEnv::new(),
        };

        if requests.is_empty() {
            warn!(
                "No build scripts found in '{}'.",
                self.workspace.build_dir().display()
            );
            return Ok(report);
        }

        let runner = self.runner();
        for request in requests {
            if let Err(e) = runner.run(request, &mut env) {
                error!("Command failed: {}", e);
                return Err(e);
            }
            report.scripts_run += 1;
        }

        report.duration = start.elapsed();
        report.env = env;
        info!("Build duration: {:?}", report.duration);

        Ok(report)
    }

    /// Run an interactive command inside the image.
    ///
    /// Without `args` this starts `bash` with a minimal rc file. A failing
    /// command is logged and not returned as an error.
    pub fn shell(&self, args: &[String]) -> Result<()> {
        let flags = FlagSet::from_flags(&[Flag::Interactive, Flag::Chroot, Flag::DirectExec]);

        let mut rcfile = None;
        let request = match args.split_first() {
            Some((program, _)) => ExecutionRequest::new(program, flags).with_args(args.iter().cloned()),
            None => {
                let rootfs = self.workspace.rootfs_dir();
                let mut file = tempfile::Builder::new()
                    .prefix(".volatile.bashrc.")
                    .tempfile_in(&rootfs)?;
                file.write_all(SHELL_RC.as_bytes())?;
                file.flush()?;
                let rc_path = chroot_relative(&rootfs, file.path())?;
                debug!("Shell rc file: {}", rc_path.display());
                rcfile = Some(file);

                ExecutionRequest::new("/bin/bash", flags).with_args([
                    "bash".to_string(),
                    "--rcfile".to_string(),
                    rc_path.display().to_string(),
                    "-i".to_string(),
                ])
            }
        };

        let mut env = PersistentEnv::new();
        if let Err(e) = self.runner().run(request.in_workspace(&self.workspace), &mut env) {
            info!("Shell command failed: {}", e);
        }
        drop(rcfile);

        Ok(())
    }

    /// Remove generated state. `all` also removes `dist` and `log`.
    pub fn clean(&self, all: bool) -> Result<()> {
        self.workspace.clean(all)
    }
}

/// Build log attached to the logger for the duration of a build
struct BuildLog {
    handle: OutputHandle,
}

impl BuildLog {
    fn attach(path: &Path) -> Result<Self> {
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o600)
            .open(path)?;
        debug!("Logging to '{}'", path.display());
        Ok(Self {
            handle: logging::add_output(file),
        })
    }
}

impl Drop for BuildLog {
    fn drop(&mut self) {
        logging::remove_output(self.handle);
    }
}
