//! File logging for processes that host a store.
//!
//! Store code only talks to the `log` facade. This module starts the
//! `flexi_logger` backend once per process and ties each log file to the
//! store that writes into it through `log_store_identity`.
//!
//! # Invariants
//! - Events are metadata-only (`event=.. module=.. status=..` plus lids,
//!   field names, counts); attribute values never reach the log.
//! - Starting twice with equal settings is a no-op; any other second start
//!   fails with `LoggingError::Conflict`.
//! - Nothing here panics.

use crate::store::Store;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const FILE_PREFIX: &str = "modelgraph";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEPT_FILES: usize = 5;
const PANIC_SUMMARY_CHARS: usize = 160;

static COMPONENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,31}$").expect("valid component regex"));

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

pub type LoggingResult<T> = Result<T, LoggingError>;

#[derive(Debug)]
pub enum LoggingError {
    UnsupportedLevel(String),
    InvalidDirectory { path: PathBuf, reason: &'static str },
    InvalidComponent(String),
    CreateDirectory { path: PathBuf, source: std::io::Error },
    Backend(String),
    Conflict { active: LogSettings, requested: LogSettings },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(raw) => write!(
                f,
                "unsupported log level `{raw}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDirectory { path, reason } => {
                write!(f, "log directory `{}` {reason}", path.display())
            }
            Self::InvalidComponent(name) => write!(f, "invalid log component `{name}`"),
            Self::CreateDirectory { path, source } => {
                write!(f, "cannot create log directory `{}`: {source}", path.display())
            }
            Self::Backend(message) => write!(f, "log backend failed to start: {message}"),
            Self::Conflict { active, requested } => write!(
                f,
                "logging already writes {active}; refusing to switch to {requested}"
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDirectory { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// `Debug` in debug builds, `Info` in release builds.
    pub fn for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Info
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(LoggingError::UnsupportedLevel(raw.trim().to_string())),
        }
    }
}

/// Where and how verbosely one process logs.
///
/// Files are named `modelgraph.log`, or `modelgraph_<component>.log` when a
/// component is set, so several hosts can share one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    level: LogLevel,
    directory: PathBuf,
    component: Option<String>,
}

impl LogSettings {
    /// # Errors
    /// - `InvalidDirectory` when `directory` is empty or relative.
    pub fn new(level: LogLevel, directory: impl Into<PathBuf>) -> LoggingResult<Self> {
        let directory = directory.into();
        if directory.as_os_str().is_empty() {
            return Err(LoggingError::InvalidDirectory {
                path: directory,
                reason: "is empty",
            });
        }
        if !directory.is_absolute() {
            return Err(LoggingError::InvalidDirectory {
                path: directory,
                reason: "must be absolute",
            });
        }
        Ok(Self {
            level,
            directory,
            component: None,
        })
    }

    /// # Errors
    /// - `InvalidComponent` unless `name` is a short lowercase identifier.
    pub fn component(mut self, name: &str) -> LoggingResult<Self> {
        if !COMPONENT_RE.is_match(name) {
            return Err(LoggingError::InvalidComponent(name.to_string()));
        }
        self.component = Some(name.to_string());
        Ok(self)
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_basename(&self) -> String {
        match &self.component {
            Some(component) => format!("{FILE_PREFIX}_{component}"),
            None => FILE_PREFIX.to_string(),
        }
    }
}

impl Display for LogSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at `{}` ({})",
            self.file_basename(),
            self.directory.display(),
            self.level.as_str()
        )
    }
}

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Starts rotating file logs for this process.
///
/// # Errors
/// - `CreateDirectory` or `Backend` when the backend cannot start.
/// - `Conflict` when logging already runs with different settings.
pub fn init_logging(settings: LogSettings) -> LoggingResult<()> {
    let active = match ACTIVE.get() {
        Some(active) => active,
        None => ACTIVE.get_or_try_init(|| start_backend(&settings))?,
    };
    if active.settings != settings {
        return Err(LoggingError::Conflict {
            active: active.settings.clone(),
            requested: settings,
        });
    }
    Ok(())
}

/// Settings of the running backend, if any.
pub fn logging_status() -> Option<LogSettings> {
    ACTIVE.get().map(|active| active.settings.clone())
}

/// Writes which store, schema and tunables the following events belong to.
pub fn log_store_identity(store: &Store) {
    let schema = store.schema();
    let config = store.config();
    info!(
        "event=store_identity module=logging status=ok store={} models={} inverse_policy={:?} retain_settled_reads={} notification_queue_limit={}",
        store.id(),
        schema.model_names().collect::<Vec<_>>().join(","),
        schema.inverse_policy(),
        config.retain_settled_reads,
        config.notification_queue_limit
    );
}

fn start_backend(settings: &LogSettings) -> LoggingResult<ActiveLogger> {
    std::fs::create_dir_all(&settings.directory).map_err(|source| {
        LoggingError::CreateDirectory {
            path: settings.directory.clone(),
            source,
        }
    })?;

    let handle = Logger::try_with_str(settings.level.as_str())
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(settings.directory.as_path())
                .basename(settings.file_basename()),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEPT_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook();
    info!(
        "event=logging_init module=logging status=ok level={} file={} os={} core_version={}",
        settings.level.as_str(),
        settings.file_basename(),
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogger {
        settings: settings.clone(),
        _handle: handle,
    })
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|at| format!("{}:{}", at.file(), at.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string payload".to_string());
        error!(
            "event=panic module=logging status=error location={} payload={}",
            location,
            one_line_summary(&payload, PANIC_SUMMARY_CHARS)
        );
        previous(info);
    }));
}

/// Panic payloads may quote record data; keep them to one short line.
fn one_line_summary(raw: &str, limit: usize) -> String {
    let flat = raw.replace(['\n', '\r'], " ");
    if flat.chars().count() <= limit {
        return flat;
    }
    let mut summary = flat.chars().take(limit).collect::<String>();
    summary.push_str("...");
    summary
}
