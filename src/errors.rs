//! Error types for rib operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for rib operations
pub type Result<T> = std::result::Result<T, RibError>;

/// Errors that can occur while preparing or running build scripts
#[derive(Error, Debug)]
pub enum RibError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Executable not found in search path: {0}")]
    ExecutableNotFound(String),

    #[error("Failed to allocate volatile directory under {base}: {source}")]
    ResourceAllocation {
        base: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot express {path} relative to {root}")]
    PathResolution { path: PathBuf, root: PathBuf },

    #[error("Failed to start {program}: {source}")]
    ProcessStart {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with code {code}")]
    ProcessExit { program: String, code: i32 },

    #[error("{program} killed by signal {signal}")]
    ProcessSignal { program: String, signal: i32 },

    #[error("Malformed side-channel record: {0}")]
    Decode(String),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("Directory '{0}' not initialized")]
    NotInitialized(PathBuf),

    #[error("Directory '{0}' already initialized")]
    AlreadyInitialized(PathBuf),

    #[error("Directory '{0}' is not empty")]
    NotEmpty(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl RibError {
    /// True for a child that ran and terminated unsuccessfully.
    ///
    /// This is the only failure the ignore-exit flag may downgrade.
    pub fn is_exit_failure(&self) -> bool {
        matches!(
            self,
            RibError::ProcessExit { .. } | RibError::ProcessSignal { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RibError::ProcessExit {
            program: "/bin/false".to_string(),
            code: 1,
        };
        assert_eq!(err.to_string(), "/bin/false exited with code 1");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let rib_err = RibError::from(io_err);
        assert!(rib_err.to_string().contains("IO error"));
    }

    #[test]
    fn test_exit_failures_are_downgradable() {
        assert!(
            RibError::ProcessSignal {
                program: "sh".to_string(),
                signal: 9
            }
            .is_exit_failure()
        );
        assert!(
            RibError::ProcessExit {
                program: "sh".to_string(),
                code: 2
            }
            .is_exit_failure()
        );
    }

    #[test]
    fn test_setup_failures_are_not_downgradable() {
        assert!(!RibError::Decode("x".to_string()).is_exit_failure());
        assert!(!RibError::ExecutableNotFound("chroot".to_string()).is_exit_failure());
        assert!(
            !RibError::ProcessStart {
                program: "sh".to_string(),
                source: io::Error::other("boom"),
            }
            .is_exit_failure()
        );
    }
}
