//! Line-oriented draining of child output streams

use log::{debug, error};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::Mutex;

/// Which child stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    pub fn label(&self) -> &'static str {
        match self {
            StreamSource::Stdout => "stdout",
            StreamSource::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Receives every captured output line
pub trait LineSink: Send + Sync {
    fn line(&self, source: StreamSource, line: &str);
}

/// Forwards lines to the logger at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LineSink for LogSink {
    fn line(&self, source: StreamSource, line: &str) {
        debug!("[{}] {}", source, line);
    }
}

/// Keeps every line in memory, in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(StreamSource, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(StreamSource, String)> {
        self.lines
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    /// Lines from one stream only
    pub fn lines_from(&self, source: StreamSource) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(s, _)| *s == source)
            .map(|(_, line)| line)
            .collect()
    }
}

impl LineSink for MemorySink {
    fn line(&self, source: StreamSource, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push((source, line.to_string()));
    }
}

/// Drain `reader` to end-of-stream, handing each line to `sink`.
///
/// Returns the number of lines seen. A read error ends the drain; it is
/// logged, not returned, so it never fails the script on its own.
pub fn collect_lines<R: Read>(reader: R, source: StreamSource, sink: &dyn LineSink) -> usize {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut count = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = trim_line_end(&buf);
                sink.line(source, &String::from_utf8_lossy(line));
                count += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("[{}] read error: {}", source, e);
                break;
            }
        }
    }

    count
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
