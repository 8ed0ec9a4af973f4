//! Tracing setup for the `masterlink` binary.
//!
//! Events go to `$XDG_STATE_HOME/masterlink/masterlink.log`; when that file
//! cannot be opened the caller falls back to [`init_logging_stderr`].
//! `RUST_LOG` overrides [`DEFAULT_FILTER`].

use anyhow::{anyhow, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,masterlink=debug,masterlink_core=debug";

/// Install the global subscriber with `writer`. Fails if one is already set.
fn install<W>(writer: W) -> Result<()>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!(e))
}

/// Shared log file; each event gets its own handle, or stderr if the
/// handle cannot be duplicated.
struct LogFile(File);

enum LogSink {
    File(File),
    Stderr,
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogSink::File(f) => f.write(buf),
            LogSink::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogSink::File(f) => f.flush(),
            LogSink::Stderr => io::stderr().lock().flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.0.try_clone().map_or(LogSink::Stderr, LogSink::File)
    }
}

pub fn log_file_path() -> Result<PathBuf> {
    let dirs = xdg::BaseDirectories::with_prefix("masterlink")?;
    Ok(dirs.get_state_home().join("masterlink.log"))
}

/// Log to the state-dir file. Returns Err so the caller can fall back to stderr.
pub fn init_logging() -> Result<()> {
    let path = log_file_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    install(LogFile(file))?;
    tracing::info!(path = %path.display(), "logging initialized");
    Ok(())
}

/// Log to stderr only. Never fails; a second init is ignored.
pub fn init_logging_stderr() {
    let _ = install(io::stderr);
}
