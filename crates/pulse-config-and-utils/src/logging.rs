//! Logging initialization for SDK hosts and the CLI.
//!
//! Logs are written as JSON lines to `<base>/logs/pulse.jsonl` and, when
//! requested, mirrored to stderr in compact form. `RUST_LOG` overrides the
//! default level.

use crate::Paths;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Default level when the SDK runs with verbose logging.
const VERBOSE_LEVEL: &str = "debug";
/// Default level when verbose logging is off.
const QUIET_LEVEL: &str = "warn";

/// Append-mode log file writer shared by every log line.
#[derive(Clone)]
struct LogFileWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl LogFileWriter {
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

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        // Flushed per line so the file can be tailed.
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Default SDK log level for the `enable_logging` config flag.
pub fn sdk_log_level(enable_logging: bool) -> &'static str {
    if enable_logging {
        VERBOSE_LEVEL
    } else {
        QUIET_LEVEL
    }
}

/// Initialize logging with stderr output only.
///
/// Safe to call more than once; later calls are ignored.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("Pulse started");
/// ```
pub fn init_logging(level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .compact()
                .with_writer(io::stderr)
                .with_filter(env_filter),
        )
        .try_init();
}

/// Initialize logging with the JSON-lines file under `paths` plus optional
/// stderr output.
///
/// Falls back to stderr-only logging if the log file cannot be opened.
pub fn init_logging_for_service(service_name: &str, level: &str, paths: &Paths, also_stderr: bool) {
    let log_path = paths.log_file();
    let writer = match LogFileWriter::open(&log_path) {
        Ok(writer) => writer,
        Err(e) => {
            eprintln!("pulse: failed to open log file {}: {}", log_path.display(), e);
            init_logging(level);
            return;
        }
    };

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer)
        .with_filter(file_filter);

    let stderr_layer = if also_stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .compact()
                .with_writer(io::stderr)
                .with_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
                ),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            service = %service_name,
            log_path = %log_path.display(),
            "logging initialized"
        );
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
