//! Execution layer: running one build script
//!
//! This module turns an [`ExecutionRequest`] into a supervised child process:
//! volatile directories, environment, wrapper layering, output draining and
//! the side channel back from the script.
//!
//! # Examples
//!
//! ```ignore
//! use rib::execution::{ExecutionRequest, FlagSet, PersistentEnv, ProcessRunner};
//!
//! let mut env = PersistentEnv::new();
//! let request = ExecutionRequest::new("/work/build.d/10--hello", FlagSet::empty())
//!     .in_workspace(&workspace);
//! ProcessRunner::default().run(request, &mut env)?;
//! ```

pub mod args;
pub mod env;
pub mod flags;
pub mod process;
pub mod request;
pub mod side_channel;
pub mod stream;
pub mod volatile;

pub use args::ArgumentComposer;
pub use env::{build_environment, ChildEnv, PersistentEnv};
pub use flags::{Flag, FlagSet};
pub use process::{ProcessResult, ProcessRunner, RunState};
pub use request::ExecutionRequest;
pub use side_channel::SideChannelRecord;
pub use stream::{LineSink, LogSink, MemorySink, StreamSource};
pub use volatile::VolatileDirs;

#[cfg(test)]
mod tests;
