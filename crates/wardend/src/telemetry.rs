//! Structured telemetry initialisation for the node controller.
//!
//! Log records go to stderr and, once a volume is mounted, are teed into a
//! per-attempt log file on the volume through [`AttemptLog`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::{Lazy, OnceCell};
use time::OffsetDateTime;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter, writer::MakeWriterExt};

use warden_config::{Config, LogFormat};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();
static ATTEMPT_LOG: Lazy<AttemptLog> = Lazy::new(AttemptLog::default);

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Attempt log shared by the global subscriber.
#[must_use]
pub fn attempt_log() -> AttemptLog {
    ATTEMPT_LOG.clone()
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent and return a fresh [`TelemetryHandle`]
/// without touching the global state again.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(io::stderr.and(attempt_log()))
            // The attempt log is a plain file; keep escape codes out of it.
            .with_ansi(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

/// Log file receiving every record of the current startup attempt.
///
/// Detached until [`AttemptLog::attach`] opens a file; writes while detached
/// are discarded.
#[derive(Debug, Clone, Default)]
pub struct AttemptLog {
    file: Arc<Mutex<Option<File>>>,
}

impl AttemptLog {
    /// Opens `node_{YYYYMMDD}T{HHMMSS}Z.log` inside `dir`, replacing any
    /// previously attached file.
    pub fn attach(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(attempt_file_name(OffsetDateTime::now_utc()));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        *self.lock() = Some(file);
        Ok(path)
    }

    /// Stops teeing records into the file.
    pub fn detach(&self) {
        if let Some(mut file) = self.lock().take() {
            let _ = file.flush();
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn attempt_file_name(now: OffsetDateTime) -> String {
    format!(
        "node_{:04}{:02}{:02}T{:02}{:02}{:02}Z.log",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

/// Writer handed to the subscriber for a single record.
#[derive(Debug)]
pub struct AttemptLogWriter {
    log: AttemptLog,
}

impl Write for AttemptLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.log.lock().as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.log.lock().as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for AttemptLog {
    type Writer = AttemptLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        AttemptLogWriter { log: self.clone() }
    }
}
