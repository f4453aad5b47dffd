//! Logging initialization for the session client.
//!
//! Library crates only emit `tracing` events. Binaries call [`init_logging`]
//! once at startup to choose where those events go:
//!
//! - compact human-readable lines on stderr (default)
//! - structured JSONL appended to `~/.erp/logs/client.jsonl`
//!   (`ERP_LOG_FORMAT=json`)
//!
//! `RUST_LOG` always wins over the configured level.

use crate::{CoreError, CoreResult, Paths};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact text on stderr.
    Compact,
    /// JSON lines appended to the client log file.
    Json,
}

impl LogFormat {
    /// Read the format from `ERP_LOG_FORMAT`, defaulting to compact.
    pub fn from_env() -> Self {
        match std::env::var("ERP_LOG_FORMAT")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Append-only file writer shared by every event.
/// Each write is flushed so concurrent processes interleave whole lines.
#[derive(Clone)]
struct FileLogWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl FileLogWriter {
    fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl Write for FileLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

#[derive(Clone)]
struct WriterFactory {
    writer: FileLogWriter,
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = FileLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

/// Initialize logging with the format taken from `ERP_LOG_FORMAT`.
///
/// Falls back to stderr output when the log file cannot be opened. Calling
/// this more than once is harmless; later calls are ignored.
pub fn init_logging(level: &str, paths: &Paths) {
    let format = LogFormat::from_env();
    if let Err(e) = init_logging_with(level, format, paths) {
        if format == LogFormat::Json {
            let _ = init_logging_with(level, LogFormat::Compact, paths);
            tracing::warn!(error = %e, "JSON log file unavailable, logging to stderr");
        }
    }
}

/// Initialize logging with an explicit format.
pub fn init_logging_with(level: &str, format: LogFormat, paths: &Paths) -> CoreResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(level).to_string().to_lowercase()));

    let result = match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(io::stderr)
            .compact()
            .try_init(),
        LogFormat::Json => {
            let writer = FileLogWriter::open(&paths.log_file())?;
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_current_span(true)
                .with_writer(WriterFactory { writer })
                .try_init()
        }
    };

    result.map_err(|e| CoreError::Logging(e.to_string()))
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
