/// Run configuration for the reporting pipeline.
///
/// One explicit `RunConfig` value is assembled per invocation from CLI
/// flags, an optional TOML file, and built-in defaults (CLI wins over
/// file, file wins over defaults), then passed into the orchestrator.
/// Nothing reads configuration from module-level state.

use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::{plant_api, station_sheet};
use crate::model::{ConfigError, parse_instant};
use crate::stations;

/// Plant id list used when neither the CLI nor the config file names one.
pub const DEFAULT_PLANT_IDS: &str = "1,2,3,4";

/// Cache freshness window in minutes used when not configured.
pub const DEFAULT_CACHE_TTL_MINUTES: u64 = 60;

// ---------------------------------------------------------------------------
// Defaults for the query window
// ---------------------------------------------------------------------------

/// Start of yesterday (UTC), in the reporting API's instant layout.
pub fn default_start_instant() -> String {
    let yesterday = Utc::now().date_naive() - Duration::days(1);
    format!("{}T00:00:00.000Z", yesterday.format("%Y-%m-%d"))
}

/// End of today (UTC), in the reporting API's instant layout.
pub fn default_end_instant() -> String {
    format!("{}T23:59:59.999Z", Utc::now().date_naive().format("%Y-%m-%d"))
}

// ---------------------------------------------------------------------------
// Optional configuration file
// ---------------------------------------------------------------------------

/// Overrides loadable from a TOML file. Every field is optional; absent
/// fields fall through to built-in defaults.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub sheet_url: Option<String>,
    pub plant_ids: Option<String>,
    pub marked_dates: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<FileConfig, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            detail: err.to_string(),
        })?;
        toml::from_str(&raw).map_err(|err| ConfigError::Malformed {
            path: path.display().to_string(),
            detail: err.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Everything one pipeline run needs, fully resolved.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Query window start, ISO-8601.
    pub start: String,
    /// Query window end, ISO-8601.
    pub end: String,
    /// Comma-separated plant id list for the aggregate report.
    pub plant_ids: String,
    /// Station codes to produce charts for; must resolve in the registry.
    pub station_codes: Vec<String>,
    /// Directory artifacts are written into.
    pub output_dir: PathBuf,
    /// Artifact index path.
    pub index_path: PathBuf,
    /// Cache directory.
    pub cache_dir: PathBuf,
    /// Cache freshness window in minutes.
    pub cache_ttl_minutes: u64,
    /// Bypass the freshness check and always fetch. Fetched data is still
    /// written back to the cache.
    pub force_refresh: bool,
    /// Also produce mobile chart variants.
    pub mobile: bool,
    /// Log artifact locations after the run (rendering itself is headless).
    pub show: bool,
    /// Plant report endpoint.
    pub base_url: String,
    /// Station sheet export URL.
    pub sheet_url: String,
    /// Calendar dates whose daily maxima are drawn as reference lines on
    /// the plant chart.
    pub marked_dates: Vec<String>,
}

impl RunConfig {
    /// A config with built-in defaults for everything, suitable as a base
    /// to override from CLI/file values.
    pub fn defaults() -> RunConfig {
        RunConfig {
            start: default_start_instant(),
            end: default_end_instant(),
            plant_ids: DEFAULT_PLANT_IDS.to_string(),
            station_codes: Vec::new(),
            output_dir: PathBuf::from("public"),
            index_path: PathBuf::from("public/index.json"),
            cache_dir: PathBuf::from(".cache"),
            cache_ttl_minutes: DEFAULT_CACHE_TTL_MINUTES,
            force_refresh: false,
            mobile: false,
            show: false,
            base_url: plant_api::DEFAULT_BASE_URL.to_string(),
            sheet_url: station_sheet::default_sheet_url(),
            marked_dates: Vec::new(),
        }
    }

    /// Validates the whole configuration up front, before any fetch.
    /// Any failure here aborts the run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_instant(&self.start).map_err(|_| ConfigError::InvalidInstant {
            field: "start",
            value: self.start.clone(),
        })?;
        parse_instant(&self.end).map_err(|_| ConfigError::InvalidInstant {
            field: "end",
            value: self.end.clone(),
        })?;

        let ids_valid = !self.plant_ids.is_empty()
            && self
                .plant_ids
                .split(',')
                .all(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()));
        if !ids_valid {
            return Err(ConfigError::InvalidPlantIds(self.plant_ids.clone()));
        }

        for code in &self.station_codes {
            stations::resolve_station(code)?;
        }

        for date in &self.marked_dates {
            if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                return Err(ConfigError::InvalidMarkedDate(date.clone()));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
