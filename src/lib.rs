//! rib: root image build tool
//!
//! Builds a filesystem image by running a directory of numbered scripts in
//! sequence. Each script may run under `chroot`, `fakeroot` and `fakechroot`
//! wrappers, gets its own volatile scratch directory, and can hand
//! environment variables to later scripts through a side channel.
//!
//! # Modules
//!
//! - **execution**: one script run (wrappers, environment, pipes, side channel)
//! - **selector**: discovering scripts and their filename flags
//! - **controller**: the build sequencer and the other top-level operations
//! - **workspace**: the work directory skeleton
//! - **logging**: leveled logging with runtime-attached outputs
//!
//! # Example
//!
//! ```ignore
//! use rib::Builder;
//!
//! let report = Builder::open("./image")?.build(0)?;
//! println!("ran {} scripts", report.scripts_run);
//! ```

// Core modules
pub mod errors;
pub mod fileops;
pub mod logging;
pub mod utils;
pub mod workspace;

// Layered modules
pub mod execution;
pub mod selector;

// Main controller
pub mod controller;

// Public API
pub use controller::{BuildReport, Builder};
pub use errors::{Result, RibError};
pub use execution::{ExecutionRequest, Flag, FlagSet, PersistentEnv, ProcessRunner};
pub use workspace::Workspace;
