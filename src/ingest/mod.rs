/// Ingestion layer: clients for the two remote reporting sources.
///
/// Submodules:
/// - `plant_api`: JSON discharge-report endpoint for the plant aggregate.
/// - `station_sheet`: CSV spreadsheet export carrying station water levels.
///
/// The `DataSource` trait is the seam between the orchestrator and the
/// network: production uses `HttpDataSource`, tests substitute stubs so
/// fetch counts and failures are fully controlled.

use std::time::Duration;

use crate::model::{FetchError, SeriesPoint};

pub mod plant_api;
pub mod station_sheet;

/// Request timeout for every upstream call. A hung fetch past this bound
/// is reported as a fetch failure; retrying is the scheduler's job.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Fetch seam
// ---------------------------------------------------------------------------

/// Access to the remote reporting sources. One attempt per call, no
/// internal retry; results are returned in upstream response order.
pub trait DataSource {
    /// Fetches the plant discharge report for a date range and plant id list.
    fn plant_report(
        &self,
        start: &str,
        end: &str,
        plant_ids: &str,
    ) -> Result<Vec<SeriesPoint>, FetchError>;

    /// Fetches the water-level series for one station code.
    fn station_levels(&self, code: &str) -> Result<Vec<SeriesPoint>, FetchError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Blocking HTTP implementation of `DataSource`.
pub struct HttpDataSource {
    client: reqwest::blocking::Client,
    base_url: String,
    sheet_url: String,
}

impl HttpDataSource {
    pub fn new(base_url: String, sheet_url: String) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| FetchError::Network {
                source: "http-client".to_string(),
                detail: err.to_string(),
            })?;
        Ok(HttpDataSource { client, base_url, sheet_url })
    }
}

impl DataSource for HttpDataSource {
    fn plant_report(
        &self,
        start: &str,
        end: &str,
        plant_ids: &str,
    ) -> Result<Vec<SeriesPoint>, FetchError> {
        let url = plant_api::build_report_url(&self.base_url, start, end, plant_ids);
        let rows = plant_api::fetch_report(&self.client, &url)?;
        Ok(plant_api::rows_to_points(rows))
    }

    fn station_levels(&self, code: &str) -> Result<Vec<SeriesPoint>, FetchError> {
        let text = station_sheet::fetch_sheet(&self.client, &self.sheet_url)?;
        let rows = station_sheet::parse_rows(&text);
        Ok(station_sheet::station_series(&rows, code))
    }
}
