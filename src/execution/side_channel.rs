//! Side channel from a running script back to rib
//!
//! Scripts write records to an extra inherited descriptor:
//!
//! ```text
//! record := category 0x1F key 0x1F value 0x00
//! ```
//!
//! `setenv` and `unsetenv` change the persistent environment seen by later
//! scripts. Other categories are ignored.

use crate::errors::{RibError, Result};
use crate::execution::env::PersistentEnv;
use log::{debug, error, warn};
use std::io::{self, BufRead, BufReader, Read};

/// Descriptor number the child finds the channel on
pub const CHILD_FD: i32 = 3;

pub const RECORD_SEP: u8 = 0x00;
pub const UNIT_SEP: u8 = 0x1f;

/// One decoded record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideChannelRecord {
    pub category: String,
    pub key: String,
    pub value: String,
}

impl SideChannelRecord {
    /// Split one record (without its terminator) into its three fields.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut fields = raw.splitn(3, |b| *b == UNIT_SEP);
        match (fields.next(), fields.next(), fields.next()) {
            (Some(category), Some(key), Some(value)) => Ok(Self {
                category: String::from_utf8_lossy(category).into_owned(),
                key: String::from_utf8_lossy(key).into_owned(),
                value: String::from_utf8_lossy(value).into_owned(),
            }),
            _ => Err(RibError::Decode(format!(
                "expected 3 fields, got {:?}",
                String::from_utf8_lossy(raw)
            ))),
        }
    }

    /// Fold the record into the persistent environment.
    pub fn apply(&self, env: &mut PersistentEnv) {
        match self.category.as_str() {
            "setenv" => {
                debug!("setenv {}={}", self.key, self.value);
                env.setenv(self.key.clone(), self.value.clone());
            }
            "unsetenv" => {
                debug!("unsetenv {}", self.key);
                env.unsetenv(&self.key);
            }
            _ => {}
        }
    }

    /// Wire encoding, terminator included
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.category.len() + self.key.len() + self.value.len() + 3);
        out.extend_from_slice(self.category.as_bytes());
        out.push(UNIT_SEP);
        out.extend_from_slice(self.key.as_bytes());
        out.push(UNIT_SEP);
        out.extend_from_slice(self.value.as_bytes());
        out.push(RECORD_SEP);
        out
    }
}

/// Read records until end-of-stream, applying each to `env` as it arrives.
///
/// The first malformed record is fatal: nothing after it is applied, but the
/// stream is still drained so the writer never blocks on a full pipe. A final
/// record without terminator is accepted.
pub fn decode_stream<R: Read>(reader: R, env: &mut PersistentEnv) -> Result<usize> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut applied = 0;
    let mut failure: Option<RibError> = None;

    loop {
        buf.clear();
        match reader.read_until(RECORD_SEP, &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if failure.is_some() {
                    continue;
                }
                let raw = buf.strip_suffix(&[RECORD_SEP]).unwrap_or(&buf);
                match SideChannelRecord::parse(raw) {
                    Ok(record) => {
                        record.apply(env);
                        applied += 1;
                    }
                    Err(e) => {
                        warn!("Discarding side channel data after bad record: {}", e);
                        failure = Some(e);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("side channel read error: {}", e);
                break;
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(applied),
    }
}
