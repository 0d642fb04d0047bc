//! Build script discovery
//!
//! Scripts are named `<seq>-<FLAGS>-<name>`, e.g. `010-CE-install-base`.
//! The sequence number is decimal and the flags are zero or more of
//! `I R F C E S`. Entries run in file name order, so sequence numbers only
//! order numerically when they share a width.

use crate::errors::{RibError, Result};
use crate::execution::{ExecutionRequest, FlagSet};
use log::{debug, error, warn};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

const SCRIPT_PATTERN: &str = r"^(\d+)-([A-Z]*)-";

/// Parsed script file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptName {
    pub sequence: u64,
    pub flags: FlagSet,
    /// Letters that are not flags
    pub unknown: Vec<char>,
}

/// Selects the scripts of a build directory
pub struct ScriptSelector {
    dir: PathBuf,
    pattern: Regex,
}

impl ScriptSelector {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let pattern = Regex::new(SCRIPT_PATTERN)
            .map_err(|e| RibError::Configuration(format!("script pattern: {}", e)))?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            pattern,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parse a file name. `None` when it does not follow the naming scheme
    /// or the sequence number does not fit.
    pub fn parse(&self, name: &str) -> Option<ScriptName> {
        let caps = self.pattern.captures(name)?;
        let sequence = match caps[1].parse::<u64>() {
            Ok(seq) => seq,
            Err(e) => {
                error!("Bad sequence number in '{}': {}", name, e);
                return None;
            }
        };
        let (flags, unknown) = FlagSet::from_letters(&caps[2]);
        Some(ScriptName {
            sequence,
            flags,
            unknown,
        })
    }

    /// Ordered requests for every runnable script with sequence >= `seqmin`.
    ///
    /// Non-matching names, low sequence numbers and directories are skipped
    /// with a warning; scripts flagged `S` are dropped silently.
    pub fn select(&self, seqmin: u64) -> Result<Vec<ExecutionRequest>> {
        let mut entries = fs::read_dir(&self.dir)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        let mut requests = Vec::new();
        for entry in entries {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                warn!("Skipping file {:?}: name is not UTF-8", file_name);
                continue;
            };

            let Some(parsed) = self.parse(name) else {
                warn!("Skipping file '{}': regex mismatch", name);
                continue;
            };
            if parsed.sequence < seqmin {
                warn!(
                    "Skipping file '{}': seqno={} < seqmin={}",
                    name, parsed.sequence, seqmin
                );
                continue;
            }
            for letter in &parsed.unknown {
                warn!("Ignoring unknown flag {:?}.", letter);
            }
            if parsed.flags.skip() {
                continue;
            }
            if entry.file_type()?.is_dir() {
                warn!("Skipping '{}': is a directory", name);
                continue;
            }

            let path = self.dir.join(name);
            debug!("Registering build command: {}", path.display());
            requests.push(ExecutionRequest::new(path, parsed.flags).with_sequence(parsed.sequence));
        }

        Ok(requests)
    }
}
