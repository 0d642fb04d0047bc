//! Spawning and supervising one build script
//!
//! A run moves through `Configured -> ResourcesReady -> Spawned -> Draining
//! -> Exited`. The child gets the side channel as descriptor 3. Output
//! consumers run on scoped threads; all of them are joined before the child is
//! reaped, so nothing buffered in a pipe is lost to the exit status racing
//! ahead. The join is also what makes the persistent environment written by
//! the side-channel thread visible to the caller.

use crate::errors::{RibError, Result};
use crate::execution::args::ArgumentComposer;
use crate::execution::env::{build_environment, PersistentEnv};
use crate::execution::request::ExecutionRequest;
use crate::execution::side_channel::{decode_stream, CHILD_FD};
use crate::execution::stream::{collect_lines, LineSink, LogSink, StreamSource};
use crate::execution::volatile::VolatileDirs;
use crate::fileops::copy_file;
use crate::utils::ExecutableResolver;

use log::{debug, info, warn};
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::fmt;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Configured,
    ResourcesReady,
    Spawned,
    Draining,
    Exited,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Process ID
    pub pid: u32,
    /// Exit code, if the child exited normally
    pub exit_code: Option<i32>,
    /// Signal if killed
    pub signal: Option<i32>,
    /// Execution time in milliseconds
    pub exec_time_ms: u64,
    /// Captured stdout lines (0 when interactive)
    pub stdout_lines: usize,
    /// Captured stderr lines (0 when interactive)
    pub stderr_lines: usize,
    /// Side-channel records applied
    pub records: usize,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turn an unsuccessful termination into an error.
    pub fn check(&self, program: &str) -> Result<()> {
        match (self.exit_code, self.signal) {
            (Some(0), _) => Ok(()),
            (Some(code), _) => Err(RibError::ProcessExit {
                program: program.to_string(),
                code,
            }),
            (None, Some(signal)) => Err(RibError::ProcessSignal {
                program: program.to_string(),
                signal,
            }),
            (None, None) => Err(RibError::ProcessExit {
                program: program.to_string(),
                code: -1,
            }),
        }
    }
}

/// Runs execution requests one at a time
pub struct ProcessRunner {
    composer: ArgumentComposer,
    sink: Arc<dyn LineSink>,
}

impl ProcessRunner {
    pub fn new(resolver: ExecutableResolver) -> Self {
        Self {
            composer: ArgumentComposer::new(resolver),
            sink: Arc::new(LogSink),
        }
    }

    /// Send captured output lines somewhere other than the logger.
    pub fn with_sink(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run `request` to completion.
    ///
    /// An unsuccessful exit is an error unless the request carries the
    /// ignore-exit flag, in which case it is logged and swallowed. Volatile
    /// directories are gone by the time this returns, on every path.
    pub fn run(
        &self,
        request: ExecutionRequest,
        persistent: &mut PersistentEnv,
    ) -> Result<ProcessResult> {
        let ignore_exit = request.flags.ignore_exit();
        let mut execution = Execution::new(request);

        let result = execution.run(&self.composer, self.sink.as_ref(), persistent)?;

        match result.check(&execution.program_name()) {
            Ok(()) => Ok(result),
            Err(e) if ignore_exit => {
                warn!("Ignoring '{}' error: {}", execution.program_name(), e);
                Ok(result)
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(ExecutableResolver::from_env())
    }
}

/// One request on its way through the run states.
///
/// Owns the request, its volatile directories and the child handle.
struct Execution {
    request: ExecutionRequest,
    /// Script path before wrappers were layered on
    script: PathBuf,
    state: RunState,
    dirs: Option<VolatileDirs>,
}

impl Execution {
    fn new(request: ExecutionRequest) -> Self {
        let script = request.program.clone();
        Self {
            request,
            script,
            state: RunState::Configured,
            dirs: None,
        }
    }

    fn program_name(&self) -> String {
        self.script.display().to_string()
    }

    fn advance(&mut self, next: RunState) {
        debug!("{}: {} -> {}", self.program_name(), self.state, next);
        self.state = next;
    }

    fn run(
        &mut self,
        composer: &ArgumentComposer,
        sink: &dyn LineSink,
        persistent: &mut PersistentEnv,
    ) -> Result<ProcessResult> {
        let outcome = self.run_inner(composer, sink, persistent);
        if let Some(mut dirs) = self.dirs.take() {
            dirs.release();
        }
        outcome
    }

    fn run_inner(
        &mut self,
        composer: &ArgumentComposer,
        sink: &dyn LineSink,
        persistent: &mut PersistentEnv,
    ) -> Result<ProcessResult> {
        let vtemp = self.prepare_resources()?;
        self.advance(RunState::ResourcesReady);

        let env = build_environment(&self.request, &vtemp, persistent)?;
        composer.compose(&mut self.request)?;

        let (channel_read, channel_write) =
            pipe2(OFlag::O_CLOEXEC).map_err(|e| RibError::Io(io::Error::from(e)))?;

        let mut command = self.command(&env, &channel_write);
        info!("Executing command: {}", self.request.command_line());

        let start = Instant::now();
        let spawned = command.spawn();
        // Keep only the child's copy of the write end, or the reader never
        // sees end-of-stream
        drop(channel_write);
        drop(command);
        let mut child = spawned.map_err(|source| RibError::ProcessStart {
            program: self.request.program.display().to_string(),
            source,
        })?;
        self.advance(RunState::Spawned);

        self.advance(RunState::Draining);
        let drained = drain(&mut child, channel_read, sink, persistent);

        let status = child.wait()?;
        let exec_time_ms = start.elapsed().as_millis() as u64;
        self.advance(RunState::Exited);

        let (stdout_lines, stderr_lines, records) = drained?;
        Ok(result_from_status(
            child.id(),
            status,
            exec_time_ms,
            stdout_lines,
            stderr_lines,
            records,
        ))
    }

    /// Allocate scratch directories and stage the script for chroot
    /// execution. Returns the volatile temp dir.
    fn prepare_resources(&mut self) -> Result<PathBuf> {
        let dirs = VolatileDirs::allocate(&self.request)?;
        let dirs = self.dirs.insert(dirs);

        let vtemp = dirs
            .temp_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| RibError::Configuration("volatile temp dir missing".to_string()))?;

        if self.request.flags.chroot() && !self.request.flags.direct_exec() {
            let exec_dir = dirs
                .exec_path()
                .map(Path::to_path_buf)
                .ok_or_else(|| RibError::Configuration("volatile exec dir missing".to_string()))?;

            debug!(
                "Copying '{}' to '{}'.",
                self.request.program.display(),
                exec_dir.display()
            );
            copy_file(&exec_dir, &self.request.program)?;

            let exec_name = exec_dir
                .file_name()
                .ok_or_else(|| RibError::Configuration("unnamed exec dir".to_string()))?;
            let script_name = self
                .request
                .program
                .file_name()
                .ok_or_else(|| RibError::NotAFile(self.request.program.clone()))?;
            self.request.program = Path::new("/").join(exec_name).join(script_name);
        }

        Ok(vtemp)
    }

    fn command(&self, env: &[(String, String)], channel: &OwnedFd) -> Command {
        let mut command = Command::new(&self.request.program);
        if let Some((arg0, rest)) = self.request.args.split_first() {
            command.arg0(arg0).args(rest);
        }

        command.env_clear();
        for (name, value) in env {
            command.env(name, value);
        }

        if self.request.flags.interactive() {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        let channel_fd = channel.as_raw_fd();
        // SAFETY: the closure runs between fork and exec and only makes
        // async-signal-safe calls on descriptors that are valid in the child.
        unsafe {
            command.pre_exec(move || {
                if channel_fd == CHILD_FD {
                    let flags = libc::fcntl(channel_fd, libc::F_GETFD);
                    if flags < 0
                        || libc::fcntl(channel_fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0
                    {
                        return Err(io::Error::last_os_error());
                    }
                } else if libc::dup2(channel_fd, CHILD_FD) < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        command
    }
}

/// Run every stream consumer to end-of-stream and wait for all of them.
///
/// Returns `(stdout lines, stderr lines, side-channel records)`.
fn drain(
    child: &mut Child,
    channel: OwnedFd,
    sink: &dyn LineSink,
    persistent: &mut PersistentEnv,
) -> Result<(usize, usize, usize)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    thread::scope(|scope| {
        let stdout_handle =
            stdout.map(|out| scope.spawn(move || collect_lines(out, StreamSource::Stdout, sink)));
        let stderr_handle =
            stderr.map(|err| scope.spawn(move || collect_lines(err, StreamSource::Stderr, sink)));
        let channel_handle = scope.spawn(move || decode_stream(File::from(channel), persistent));

        let stdout_lines = join_collector(stdout_handle, StreamSource::Stdout);
        let stderr_lines = join_collector(stderr_handle, StreamSource::Stderr);
        let records = channel_handle
            .join()
            .unwrap_or_else(|_| Err(RibError::Decode("side channel reader panicked".to_string())))?;

        Ok((stdout_lines, stderr_lines, records))
    })
}

fn join_collector(handle: Option<thread::ScopedJoinHandle<'_, usize>>, source: StreamSource) -> usize {
    match handle.map(|h| h.join()) {
        Some(Ok(count)) => count,
        Some(Err(_)) => {
            warn!("{} collector panicked", source);
            0
        }
        None => 0,
    }
}

fn result_from_status(
    pid: u32,
    status: ExitStatus,
    exec_time_ms: u64,
    stdout_lines: usize,
    stderr_lines: usize,
    records: usize,
) -> ProcessResult {
    ProcessResult {
        pid,
        exit_code: status.code(),
        signal: status.signal(),
        exec_time_ms,
        stdout_lines,
        stderr_lines,
        records,
    }
}
