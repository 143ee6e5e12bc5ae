/// Station water-level sheet client.
///
/// Monitoring station readings are published as a spreadsheet whose CSV
/// export this module downloads and filters. Each row carries a station
/// code, an observation time, and a value; rows for other stations or
/// with unparsable fields are skipped individually rather than failing
/// the batch.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::model::{FetchError, SeriesPoint};

/// Spreadsheet document id of the published station feed.
pub const SHEET_ID: &str = "1f659giCGHHzrndi2zmJYy82DTNzeOfmro_CxNz-QrMA";

/// Worksheet gid carrying the level readings.
pub const SHEET_GID: &str = "2051862179";

/// Source tag carried in fetch errors and log lines.
pub const SOURCE_NAME: &str = "station-sheet";

/// Observation time layout used by the sheet.
const TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// Default CSV export URL; overridable via configuration.
pub fn default_sheet_url() -> String {
    format!(
        "https://docs.google.com/spreadsheets/d/{}/export?format=csv&gid={}",
        SHEET_ID, SHEET_GID
    )
}

// ============================================================================
// Sheet Row Structure
// ============================================================================

/// One CSV row of the published sheet. Values stay as strings here;
/// parsing happens per-row in `station_series` so a single bad cell
/// cannot fail the whole export.
#[derive(Debug, Clone, Deserialize)]
pub struct SheetRow {
    #[serde(rename = "ma_tram")]
    pub station_code: String,
    #[serde(rename = "thoi_gian")]
    pub observed_at: String,
    #[serde(rename = "so_lieu")]
    pub value: String,
}

// ============================================================================
// Client Functions
// ============================================================================

/// Downloads the sheet export as CSV text.
pub fn fetch_sheet(client: &reqwest::blocking::Client, url: &str) -> Result<String, FetchError> {
    let response = client.get(url).send().map_err(|err| FetchError::Network {
        source: SOURCE_NAME.to_string(),
        detail: err.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Http {
            source: SOURCE_NAME.to_string(),
            status: status.as_u16(),
        });
    }

    response.text().map_err(|err| FetchError::Parse {
        source: SOURCE_NAME.to_string(),
        detail: err.to_string(),
    })
}

/// Parses CSV text into rows. The export is UTF-8 with a BOM, which must
/// not end up glued onto the first header name. Records that do not match
/// the expected columns are skipped.
pub fn parse_rows(text: &str) -> Vec<SheetRow> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    reader.deserialize().filter_map(|record| record.ok()).collect()
}

/// Filters rows for the requested station and parses time/value columns.
/// Rows with an empty or unparsable field are dropped individually.
pub fn station_series(rows: &[SheetRow], code: &str) -> Vec<SeriesPoint> {
    rows.iter()
        .filter(|row| row.station_code == code)
        .filter_map(|row| {
            let raw_time = row.observed_at.trim();
            let raw_value = row.value.trim();
            if raw_time.is_empty() || raw_value.is_empty() {
                return None;
            }
            let observed = NaiveDateTime::parse_from_str(raw_time, TIME_LAYOUT).ok()?;
            let value: f64 = raw_value.parse().ok()?;
            Some(SeriesPoint {
                timestamp: DateTime::from_naive_utc_and_offset(observed, Utc),
                primary: value,
                secondary: None,
            })
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
