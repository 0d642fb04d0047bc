//! Process logger
//!
//! Records go to a coloured terminal sink (an `env_logger` logger) and to any
//! number of extra writers attached at runtime, such as the build log. Extra
//! writers receive every record at debug level and above, with a UTC
//! timestamp, regardless of the terminal threshold.

use chrono::{DateTime, SecondsFormat, Utc};
use console::style;
use env_logger::{Builder, Env};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

type Output = Box<dyn Write + Send>;

static OUTPUTS: Mutex<Vec<(u64, Output)>> = Mutex::new(Vec::new());
static NEXT_OUTPUT: AtomicU64 = AtomicU64::new(1);

/// Handle of an attached output, used to detach it again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputHandle(u64);

/// Terminal threshold for the command-line verbosity flags
pub fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Off;
    }
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

/// Install the process logger. `RUST_LOG` overrides the terminal threshold.
pub fn init_logger(verbosity: u8, quiet: bool) {
    let default = level_for(verbosity, quiet).to_string().to_lowercase();
    let env = Env::default().filter_or("RUST_LOG", default);

    let terminal = Builder::from_env(env)
        .format(|buf, record| {
            let level = match record.level() {
                Level::Error => format!("{}", style("ERROR").red().bold()),
                Level::Warn => format!("{}", style("WARN ").yellow().bold()),
                Level::Info => format!("{}", style("INFO ").green()),
                Level::Debug => format!("{}", style("DEBUG").cyan()),
                Level::Trace => format!("{}", style("TRACE").dim()),
            };
            writeln!(buf, "{} {}", level, record.args())
        })
        .build();

    let max = terminal.filter().max(LevelFilter::Debug);
    if log::set_boxed_logger(Box::new(RibLogger { terminal })).is_ok() {
        log::set_max_level(max);
    }
}

/// Attach an extra output. Every later record is written to it.
pub fn add_output<W: Write + Send + 'static>(writer: W) -> OutputHandle {
    let id = NEXT_OUTPUT.fetch_add(1, Ordering::Relaxed);
    outputs().push((id, Box::new(writer)));
    OutputHandle(id)
}

/// Detach and flush an output. Unknown handles are ignored.
pub fn remove_output(handle: OutputHandle) {
    let mut outputs = outputs();
    if let Some(pos) = outputs.iter().position(|(id, _)| *id == handle.0) {
        let (_, mut writer) = outputs.remove(pos);
        let _ = writer.flush();
    }
}

fn outputs() -> MutexGuard<'static, Vec<(u64, Output)>> {
    OUTPUTS.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// One line as written to extra outputs, newline included
pub fn format_line(time: DateTime<Utc>, level: Level, message: &str) -> String {
    format!(
        "{} {:<5} {}\n",
        time.to_rfc3339_opts(SecondsFormat::Millis, true),
        level,
        escape(message)
    )
}

fn escape(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for c in message.chars() {
        if c.is_control() && c != '\t' {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    out
}

fn write_outputs(record: &Record) {
    if record.level() > Level::Debug {
        return;
    }
    let mut outputs = outputs();
    if outputs.is_empty() {
        return;
    }
    let line = format_line(Utc::now(), record.level(), &record.args().to_string());
    for (_, writer) in outputs.iter_mut() {
        // Nowhere left to report a failing log sink
        let _ = writer.write_all(line.as_bytes());
    }
}

struct RibLogger {
    terminal: env_logger::Logger,
}

impl Log for RibLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug || self.terminal.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.terminal.matches(record) {
            self.terminal.log(record);
        }
        write_outputs(record);
    }

    fn flush(&self) {
        self.terminal.flush();
        for (_, writer) in outputs().iter_mut() {
            let _ = writer.flush();
        }
    }
}
