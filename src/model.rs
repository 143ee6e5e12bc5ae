/// Core data types for the hydro discharge reporting service.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no I/O and no rendering logic, only types, the instant
/// parser, and the error taxonomy.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Series types
// ---------------------------------------------------------------------------

/// A single timestamped measurement from one of the reporting sources.
///
/// For the plant aggregate report, `primary` is the discharge towards
/// Vu Gia and `secondary` the discharge towards Thu Bồn, both in m³/s.
/// For a monitoring station, `primary` is the water level in the station's
/// unit and `secondary` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub primary: f64,
    pub secondary: Option<f64>,
}

/// Query parameters recorded alongside a cache entry, so operators can see
/// which request produced the stored records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    pub start: String,
    pub end: String,
    pub ids: String,
}

// ---------------------------------------------------------------------------
// Instant parsing
// ---------------------------------------------------------------------------

/// Parses a timestamp string from either reporting source into a UTC instant.
///
/// Accepts RFC 3339 (`2025-10-28T00:00:00.000Z`, offset suffixes handled by
/// chrono) and the two naive layouts the sources emit
/// (`2025-10-28T07:00:00` and `2025-10-28 07:00:00`). Naive timestamps
/// carry no offset and are interpreted as UTC.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    Err(format!("unrecognized instant '{}'", raw))
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Configuration problems discovered before any fetch is attempted.
/// Always fatal for the whole run.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// The requested station code is not in the registry.
    UnknownStation(String),
    /// A start/end instant could not be parsed.
    InvalidInstant { field: &'static str, value: String },
    /// The plant id list is not a comma-separated list of integers.
    InvalidPlantIds(String),
    /// A marked date is not a `YYYY-MM-DD` calendar date.
    InvalidMarkedDate(String),
    /// The configuration file could not be read.
    Io { path: String, detail: String },
    /// The configuration file could not be parsed as TOML.
    Malformed { path: String, detail: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownStation(code) => write!(f, "unknown station code: {}", code),
            ConfigError::InvalidInstant { field, value } => {
                write!(f, "invalid {} instant: '{}'", field, value)
            }
            ConfigError::InvalidPlantIds(ids) => write!(f, "invalid plant id list: '{}'", ids),
            ConfigError::InvalidMarkedDate(date) => write!(f, "invalid marked date: '{}'", date),
            ConfigError::Io { path, detail } => {
                write!(f, "cannot read config file {}: {}", path, detail)
            }
            ConfigError::Malformed { path, detail } => {
                write!(f, "malformed config file {}: {}", path, detail)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors raised while fetching from a remote reporting source.
/// Recoverable per target: the orchestrator degrades to cached data
/// when possible and otherwise skips the target for this run.
#[derive(Debug, PartialEq)]
pub enum FetchError {
    /// Non-2xx HTTP response.
    Http { source: String, status: u16 },
    /// The request could not be completed (DNS, connect, timeout).
    Network { source: String, detail: String },
    /// The response body could not be deserialized.
    Parse { source: String, detail: String },
}

impl FetchError {
    /// The reporting source this error originated from.
    pub fn source_name(&self) -> &str {
        match self {
            FetchError::Http { source, .. }
            | FetchError::Network { source, .. }
            | FetchError::Parse { source, .. } => source,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http { source, status } => {
                write!(f, "{}: HTTP error: {}", source, status)
            }
            FetchError::Network { source, detail } => {
                write!(f, "{}: request failed: {}", source, detail)
            }
            FetchError::Parse { source, detail } => {
                write!(f, "{}: unparsable response: {}", source, detail)
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// Errors raised while rendering chart artifacts.
/// Recoverable per target: logged, the target produces no artifact.
#[derive(Debug)]
pub enum RenderError {
    /// The normalized series contains no points to plot.
    EmptySeries(String),
    /// The drawing backend rejected the operation.
    Backend(String),
    /// The output path could not be created or written.
    Io(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::EmptySeries(target) => {
                write!(f, "nothing to plot for target {}", target)
            }
            RenderError::Backend(detail) => write!(f, "drawing failed: {}", detail),
            RenderError::Io(detail) => write!(f, "output not writable: {}", detail),
        }
    }
}

impl std::error::Error for RenderError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
