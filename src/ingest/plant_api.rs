/// Plant discharge report API client.
///
/// Retrieves aggregated discharge statistics for a list of hydroelectric
/// plants from the provincial flood-control reporting endpoint. The
/// endpoint takes a date range and a comma-separated plant id list and
/// returns a JSON array of timestamped rows.

use serde::Deserialize;
use serde_json::Value;

use crate::model::{FetchError, SeriesPoint, parse_instant};

/// Default reporting endpoint; overridable via configuration.
pub const DEFAULT_BASE_URL: &str =
    "https://pctt.danang.gov.vn/DesktopModules/PCTT/api/PCTTApi/baocaothuydiens_thongke";

/// Source tag carried in fetch errors and log lines.
pub const SOURCE_NAME: &str = "plant-report-api";

// ============================================================================
// API Response Structures
// ============================================================================

/// One row of the report response. The endpoint emits many more fields;
/// only the discharge timestamp and the two basin discharge values are
/// used. Values arrive as numbers, numeric strings, or null depending on
/// which upstream system produced the row.
#[derive(Debug, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "thoigianxa")]
    pub discharge_time: Option<String>,
    #[serde(rename = "qvevugia", default)]
    pub q_vu_gia: Option<Value>,
    #[serde(rename = "qvethubon", default)]
    pub q_thu_bon: Option<Value>,
}

// ============================================================================
// API Client Functions
// ============================================================================

/// Composes the report endpoint URL with the provided query parameters.
///
/// The endpoint accepts `:` and `,` unescaped inside ISO instants and
/// id lists, so the query string is assembled directly.
pub fn build_report_url(base_url: &str, start: &str, end: &str, plant_ids: &str) -> String {
    format!(
        "{}?ngaybatdau={}&ngayketthuc={}&lst_thuydien_id={}",
        base_url, start, end, plant_ids
    )
}

/// Downloads and deserializes the report payload. Returns the rows in
/// response order; the caller converts and normalizes them.
pub fn fetch_report(
    client: &reqwest::blocking::Client,
    url: &str,
) -> Result<Vec<ReportRow>, FetchError> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .map_err(|err| FetchError::Network {
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

    response.json::<Vec<ReportRow>>().map_err(|err| FetchError::Parse {
        source: SOURCE_NAME.to_string(),
        detail: err.to_string(),
    })
}

// ============================================================================
// Row Conversion
// ============================================================================

/// Converts report rows into series points, preserving response order.
///
/// Rows without a parseable timestamp are skipped. Rows where both
/// discharge values coerce to 0.0 are upstream placeholders (the endpoint
/// pads the range with empty rows) and are dropped here, before
/// normalization.
pub fn rows_to_points(rows: Vec<ReportRow>) -> Vec<SeriesPoint> {
    let mut points = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(raw_time) = row.discharge_time else { continue };
        let Ok(timestamp) = parse_instant(&raw_time) else { continue };

        let vu_gia = coerce_discharge(row.q_vu_gia.as_ref());
        let thu_bon = coerce_discharge(row.q_thu_bon.as_ref());
        if vu_gia == 0.0 && thu_bon == 0.0 {
            continue;
        }

        points.push(SeriesPoint {
            timestamp,
            primary: vu_gia,
            secondary: Some(thu_bon),
        });
    }
    points
}

/// Coerces a loosely-typed discharge value to f64; null, absent, empty,
/// and unparsable values all read as 0.0.
fn coerce_discharge(value: Option<&Value>) -> f64 {
    match value {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(_) => 0.0,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(time: &str, vu: Value, thu: Value) -> ReportRow {
        ReportRow {
            discharge_time: Some(time.to_string()),
            q_vu_gia: Some(vu),
            q_thu_bon: Some(thu),
        }
    }

    #[test]
    fn test_build_report_url_keeps_query_parameters_readable() {
        let url = build_report_url(
            DEFAULT_BASE_URL,
            "2025-10-28T00:00:00.000Z",
            "2025-10-29T23:59:59.999Z",
            "1,2,3,4",
        );
        assert!(url.starts_with(DEFAULT_BASE_URL));
        assert!(url.contains("ngaybatdau=2025-10-28T00:00:00.000Z"));
        assert!(url.contains("ngayketthuc=2025-10-29T23:59:59.999Z"));
        assert!(url.contains("lst_thuydien_id=1,2,3,4"));
    }

    #[test]
    fn test_rows_deserialize_from_mixed_value_types() {
        let payload = r#"[
            {"thoigianxa": "2025-10-28T07:00:00", "qvevugia": 120.5, "qvethubon": "80.25"},
            {"thoigianxa": "2025-10-28T08:00:00", "qvevugia": null}
        ]"#;
        let rows: Vec<ReportRow> = serde_json::from_str(payload).expect("payload should parse");
        assert_eq!(rows.len(), 2);
        let points = rows_to_points(rows);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].primary, 120.5);
        assert_eq!(points[0].secondary, Some(80.25));
    }

    #[test]
    fn test_rows_without_timestamp_are_skipped() {
        let rows = vec![ReportRow {
            discharge_time: None,
            q_vu_gia: Some(Value::from(10.0)),
            q_thu_bon: Some(Value::from(5.0)),
        }];
        assert!(rows_to_points(rows).is_empty());
    }

    #[test]
    fn test_placeholder_rows_with_both_values_zero_are_dropped() {
        let rows = vec![
            row("2025-10-28T07:00:00", Value::from(0.0), Value::from(0.0)),
            row("2025-10-28T08:00:00", Value::from(42.0), Value::from(0.0)),
        ];
        let points = rows_to_points(rows);
        assert_eq!(points.len(), 1, "all-zero rows are placeholders, not readings");
        assert_eq!(points[0].primary, 42.0);
    }

    #[test]
    fn test_unparsable_values_coerce_to_zero() {
        let rows = vec![row(
            "2025-10-28T07:00:00",
            Value::from("n/a"),
            Value::from(9.5),
        )];
        let points = rows_to_points(rows);
        assert_eq!(points[0].primary, 0.0);
        assert_eq!(points[0].secondary, Some(9.5));
    }

    #[test]
    fn test_response_order_is_preserved_for_normalizer_tie_break() {
        // The normalizer keeps the last occurrence per timestamp, so the
        // converter must not reorder rows.
        let rows = vec![
            row("2025-10-28T07:00:00", Value::from(1.0), Value::from(1.0)),
            row("2025-10-28T06:00:00", Value::from(2.0), Value::from(2.0)),
        ];
        let points = rows_to_points(rows);
        assert_eq!(
            points[0].timestamp,
            Utc.with_ymd_and_hms(2025, 10, 28, 7, 0, 0).unwrap()
        );
        assert_eq!(
            points[1].timestamp,
            Utc.with_ymd_and_hms(2025, 10, 28, 6, 0, 0).unwrap()
        );
    }
}
