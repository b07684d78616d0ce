//! Process-wide logging.
//!
//! [`Logger::init`] installs the global `tracing` subscriber exactly once.
//! Everything else in the crate writes through the `tracing` macros.
//!
//! Output goes through a `tracing-appender` non-blocking writer: one
//! background thread owns the sink and receives whole formatted lines, so
//! concurrent request tasks never interleave partial output.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{Level, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::error::Error;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Where log lines go.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Destination {
    Stdout,
    Stderr,
    File(PathBuf),
}

impl Destination {
    /// Empty and `stdout` select standard output; anything else but
    /// `stderr` is a file path.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "stdout" => Self::Stdout,
            "stderr" => Self::Stderr,
            path => Self::File(PathBuf::from(path)),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Line format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Format {
    /// Human-readable single-line text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Format {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(Error::Config(format!("invalid log format `{other}`"))),
        }
    }
}

/// Parses a severity threshold. `warning` is accepted for `warn`;
/// `panic` and `fatal` map to `error`.
pub fn parse_level(raw: &str) -> Result<Level, Error> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" | "fatal" | "panic" => Ok(Level::ERROR),
        other => Err(Error::Config(format!("invalid log level `{other}`"))),
    }
}

/// Handle to the installed logger. Keep it alive for the life of the
/// process; dropping it flushes buffered lines.
pub struct Logger {
    level: Level,
    destination: Destination,
    _guard: WorkerGuard,
}

impl Logger {
    /// Installs the global subscriber with text output. Fails on an unknown
    /// level, an unopenable file, or a second call.
    pub fn init(file: &str, level: &str) -> Result<Self, Error> {
        Self::init_with_format(file, level, Format::Text)
    }

    /// Like [`init`](Self::init), choosing the line format.
    pub fn init_with_format(file: &str, level: &str, format: Format) -> Result<Self, Error> {
        let level = parse_level(level)?;
        let destination = Destination::parse(file);

        if INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(Error::Logging("logger already initialized".into()));
        }
        let installed = install(level, &destination, format);
        if installed.is_err() {
            INSTALLED.store(false, Ordering::SeqCst);
        }
        let guard = installed?;

        info!(%level, %destination, ?format, "logger initialized");
        Ok(Self { level, destination, _guard: guard })
    }

    pub fn level(&self) -> Level { self.level }
    pub fn destination(&self) -> &Destination { &self.destination }
}

fn install(level: Level, destination: &Destination, format: Format) -> Result<WorkerGuard, Error> {
    let (writer, guard) = match destination {
        Destination::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        Destination::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        Destination::File(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).map_err(|e| {
                    Error::Logging(format!("cannot create {}: {e}", dir.display()))
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::Logging(format!("cannot open {}: {e}", path.display())))?;
            tracing_appender::non_blocking(file)
        }
    };

    // RUST_LOG may refine the configured threshold per target.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);
    let installed = match format {
        Format::Text => builder.with_ansi(!matches!(destination, Destination::File(_))).try_init(),
        Format::Json => builder.with_ansi(false).json().try_init(),
    };
    installed.map_err(|e| Error::Logging(e.to_string()))?;

    Ok(guard)
}
