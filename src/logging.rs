/// Structured logging for the hydro discharge reporting service.
///
/// Provides context-rich logging with per-source tags and target codes,
/// timestamps, and severity levels. Supports both console output and
/// file-based logging for scheduled (cron-driven) operation, where
/// stdout may be discarded but a log file survives.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::model::{FetchError, RenderError};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl LogLevel {
    /// Parses the CLI's `--log-level` value, case-insensitively.
    pub fn parse(raw: &str) -> Option<LogLevel> {
        match raw.to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Log Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    PlantApi,
    StationSheet,
    Cache,
    Render,
    System,
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSource::PlantApi => write!(f, "PLANT"),
            LogSource::StationSheet => write!(f, "SHEET"),
            LogSource::Cache => write!(f, "CACHE"),
            LogSource::Render => write!(f, "RENDER"),
            LogSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Transient upstream condition; the next scheduled tick will retry.
    Transient,
    /// Unexpected failure, indicating an API change or a configuration issue.
    Unexpected,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Transient => write!(f, "TRANSIENT"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
        }
    }
}

/// Classifies a fetch failure. Network-level failures are routine for a
/// scheduler-driven pipeline; parse failures suggest the upstream changed
/// its payload shape.
pub fn classify_fetch_failure(err: &FetchError) -> FailureType {
    match err {
        FetchError::Network { .. } => FailureType::Transient,
        FetchError::Http { status, .. } if *status >= 500 => FailureType::Transient,
        FetchError::Http { .. } => FailureType::Unexpected,
        FetchError::Parse { .. } => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>) {
        let logger = Logger { min_level, log_file };
        *LOGGER.lock().unwrap() = Some(logger);
    }

    fn log(&self, level: LogLevel, source: LogSource, target: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let target_part = target.map(|t| format!(" [{}]", t)).unwrap_or_default();
        let log_entry = format!("{} {} {}{}: {}", timestamp, level, source, target_part, message);

        match level {
            LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
            LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>) {
    Logger::init(min_level, log_file.map(String::from));
}

/// Log a general informational message
pub fn info(source: LogSource, target: Option<&str>, message: &str) {
    if let Some(logger) = LOGGER.lock().unwrap().as_ref() {
        logger.log(LogLevel::Info, source, target, message);
    }
}

/// Log a warning message
pub fn warn(source: LogSource, target: Option<&str>, message: &str) {
    if let Some(logger) = LOGGER.lock().unwrap().as_ref() {
        logger.log(LogLevel::Warning, source, target, message);
    }
}

/// Log an error message
pub fn error(source: LogSource, target: Option<&str>, message: &str) {
    if let Some(logger) = LOGGER.lock().unwrap().as_ref() {
        logger.log(LogLevel::Error, source, target, message);
    }
}

/// Log a debug message
pub fn debug(source: LogSource, target: Option<&str>, message: &str) {
    if let Some(logger) = LOGGER.lock().unwrap().as_ref() {
        logger.log(LogLevel::Debug, source, target, message);
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a fetch failure with automatic classification.
pub fn log_fetch_failure(source: LogSource, target: &str, err: &FetchError) {
    let failure_type = classify_fetch_failure(err);
    let message = format!("fetch failed [{}]: {}", failure_type, err);
    match failure_type {
        FailureType::Transient => warn(source, Some(target), &message),
        FailureType::Unexpected => error(source, Some(target), &message),
    }
}

/// Log a render failure. Always unexpected: the data was already fetched
/// and normalized by the time rendering runs.
pub fn log_render_failure(target: &str, err: &RenderError) {
    error(LogSource::Render, Some(target), &format!("render failed: {}", err));
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one pipeline run across all targets.
pub fn log_run_summary(total: usize, produced: usize, degraded: usize, failed: usize) {
    let message = format!(
        "run complete: {}/{} targets produced ({} degraded), {} failed",
        produced, total, degraded, failed
    );

    if failed == 0 {
        info(LogSource::System, None, &message);
    } else if produced == 0 {
        error(LogSource::System, None, &message);
    } else {
        warn(LogSource::System, None, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_log_level_parse_accepts_aliases() {
        assert_eq!(LogLevel::parse("warn"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("Info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("verbose"), None);
    }

    #[test]
    fn test_failure_classification() {
        let timeout = FetchError::Network {
            source: "plant-report-api".to_string(),
            detail: "operation timed out".to_string(),
        };
        assert_eq!(classify_fetch_failure(&timeout), FailureType::Transient);

        let bad_gateway = FetchError::Http {
            source: "plant-report-api".to_string(),
            status: 502,
        };
        assert_eq!(classify_fetch_failure(&bad_gateway), FailureType::Transient);

        let not_found = FetchError::Http {
            source: "station-sheet".to_string(),
            status: 404,
        };
        assert_eq!(classify_fetch_failure(&not_found), FailureType::Unexpected);

        let bad_body = FetchError::Parse {
            source: "plant-report-api".to_string(),
            detail: "expected array".to_string(),
        };
        assert_eq!(classify_fetch_failure(&bad_body), FailureType::Unexpected);
    }
}
