/// Integration tests for the fetch-cache-render pipeline
///
/// These tests verify:
/// 1. A cold-cache run fetches once, caches once, and writes the
///    chronological + overlay desktop charts and the artifact index
/// 2. A second run inside the TTL performs zero fetches and leaves
///    byte-identical artifacts (idempotence)
/// 3. --force-refresh fetches despite a fresh cache entry
/// 4. A corrupted cache entry behaves exactly like a cold cache
/// 5. A station whose fetch fails degrades to cached data and stays in
///    the index, while a station with no cache entry is omitted and the
///    run still completes for the other targets
/// 6. Marked-date maxima are fetched at most once and then cached
/// 7. An unknown station code aborts before any fetch
///
/// All network access goes through a stub `DataSource`, so runs are
/// deterministic and offline. Each test works inside its own scratch
/// directory under the system temp dir.
///
/// Run with: cargo test --test pipeline_run

use chrono::{DateTime, TimeZone, Utc};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use hydroreport_service::config::RunConfig;
use hydroreport_service::ingest::DataSource;
use hydroreport_service::model::{ConfigError, FetchError, SeriesPoint};
use hydroreport_service::pipeline::{PLANT_TARGET_CODE, Pipeline};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

fn scratch_root() -> PathBuf {
    let seq = DIR_SEQ.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "hydroreport_pipeline_test_{}_{}",
        std::process::id(),
        seq
    ));
    fs::create_dir_all(&dir).expect("scratch dir should be creatable");
    dir
}

fn test_config(root: &Path) -> RunConfig {
    let mut config = RunConfig::defaults();
    config.start = "2025-10-28T00:00:00.000Z".to_string();
    config.end = "2025-10-29T23:59:59.999Z".to_string();
    config.plant_ids = "1,2,3,4".to_string();
    config.output_dir = root.join("public");
    config.index_path = root.join("public/index.json");
    config.cache_dir = root.join("cache");
    config
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, day, hour, 0, 0).unwrap()
}

fn plant_points() -> Vec<SeriesPoint> {
    vec![
        SeriesPoint { timestamp: at(28, 1), primary: 5800.0, secondary: Some(2100.0) },
        SeriesPoint { timestamp: at(28, 2), primary: 6050.0, secondary: Some(2300.0) },
        SeriesPoint { timestamp: at(29, 1), primary: 5200.0, secondary: Some(1900.0) },
        SeriesPoint { timestamp: at(29, 2), primary: 4900.0, secondary: Some(1700.0) },
    ]
}

fn station_points() -> Vec<SeriesPoint> {
    vec![
        SeriesPoint { timestamp: at(28, 1), primary: 5.4, secondary: None },
        SeriesPoint { timestamp: at(28, 2), primary: 5.7, secondary: None },
        SeriesPoint { timestamp: at(28, 3), primary: 6.1, secondary: None },
    ]
}

/// Scripted stand-in for the HTTP data source. Counts calls so tests can
/// assert exactly how many fetches a run performed.
struct StubSource {
    plant_ok: bool,
    station_ok: bool,
    plant_calls: Cell<usize>,
    station_calls: Cell<usize>,
}

impl StubSource {
    fn healthy() -> StubSource {
        StubSource {
            plant_ok: true,
            station_ok: true,
            plant_calls: Cell::new(0),
            station_calls: Cell::new(0),
        }
    }

    fn stations_down() -> StubSource {
        StubSource { station_ok: false, ..StubSource::healthy() }
    }
}

impl DataSource for StubSource {
    fn plant_report(
        &self,
        _start: &str,
        _end: &str,
        _plant_ids: &str,
    ) -> Result<Vec<SeriesPoint>, FetchError> {
        self.plant_calls.set(self.plant_calls.get() + 1);
        if self.plant_ok {
            Ok(plant_points())
        } else {
            Err(FetchError::Network {
                source: "plant-report-api".to_string(),
                detail: "connection refused".to_string(),
            })
        }
    }

    fn station_levels(&self, _code: &str) -> Result<Vec<SeriesPoint>, FetchError> {
        self.station_calls.set(self.station_calls.get() + 1);
        if self.station_ok {
            Ok(station_points())
        } else {
            Err(FetchError::Network {
                source: "station-sheet".to_string(),
                detail: "connection refused".to_string(),
            })
        }
    }
}

fn cache_entry_files(cache_dir: &Path) -> Vec<PathBuf> {
    let Ok(listing) = fs::read_dir(cache_dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = listing
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.to_string_lossy().ends_with(".data.json"))
        .collect();
    files.sort();
    files
}

// ---------------------------------------------------------------------------
// Cold cache scenario
// ---------------------------------------------------------------------------

#[test]
fn test_cold_cache_run_fetches_once_and_writes_desktop_charts_and_index() {
    let root = scratch_root();
    let config = test_config(&root);
    let source = StubSource::healthy();

    let outcome = Pipeline::new(&config, &source).run().expect("run should succeed");

    assert_eq!(source.plant_calls.get(), 1, "cold cache must fetch exactly once");
    assert!(outcome.failed.is_empty());
    assert!(outcome.degraded.is_empty());
    assert_eq!(outcome.entries.len(), 1);
    assert_eq!(outcome.entries[0].code, PLANT_TARGET_CODE);

    assert_eq!(cache_entry_files(&config.cache_dir).len(), 1, "one cache entry per key");
    assert!(config.output_dir.join("baocaothuydien.png").exists());
    assert!(config.output_dir.join("baocaothuydien_overlay.png").exists());
    assert!(
        !config.output_dir.join("baocaothuydien_mobile.png").exists(),
        "mobile variants are opt-in"
    );

    let index_raw = fs::read_to_string(&config.index_path).expect("index should be written");
    let index: Vec<serde_json::Value> = serde_json::from_str(&index_raw).expect("index is JSON");
    assert_eq!(index.len(), 1);
    assert_eq!(index[0]["code"], PLANT_TARGET_CODE);
    assert!(index[0]["imageMobile"].is_string(), "page expects an imageMobile field");
}

// ---------------------------------------------------------------------------
// Idempotence inside the TTL
// ---------------------------------------------------------------------------

#[test]
fn test_second_run_within_ttl_fetches_nothing_and_reproduces_artifacts() {
    let root = scratch_root();
    let config = test_config(&root);

    let first = StubSource::healthy();
    Pipeline::new(&config, &first).run().expect("first run should succeed");
    let chart_path = config.output_dir.join("baocaothuydien.png");
    let first_bytes = fs::read(&chart_path).expect("chart should exist after first run");

    let second = StubSource::healthy();
    let outcome = Pipeline::new(&config, &second).run().expect("second run should succeed");

    assert_eq!(
        second.plant_calls.get(),
        0,
        "a fresh cache entry must suppress the network fetch entirely"
    );
    assert_eq!(outcome.entries.len(), 1);
    let second_bytes = fs::read(&chart_path).expect("chart should still exist");
    assert_eq!(first_bytes, second_bytes, "artifacts must be byte-identical");
}

// ---------------------------------------------------------------------------
// Force refresh
// ---------------------------------------------------------------------------

#[test]
fn test_force_refresh_fetches_despite_fresh_cache_entry() {
    let root = scratch_root();
    let config = test_config(&root);

    let first = StubSource::healthy();
    Pipeline::new(&config, &first).run().expect("first run should succeed");

    let mut forced_config = config.clone();
    forced_config.force_refresh = true;
    let second = StubSource::healthy();
    Pipeline::new(&forced_config, &second).run().expect("forced run should succeed");

    assert_eq!(second.plant_calls.get(), 1, "--force-refresh must bypass freshness");
}

// ---------------------------------------------------------------------------
// Cache corruption
// ---------------------------------------------------------------------------

#[test]
fn test_corrupted_cache_entry_behaves_like_cold_cache() {
    let root = scratch_root();
    let config = test_config(&root);

    let first = StubSource::healthy();
    Pipeline::new(&config, &first).run().expect("first run should succeed");

    // Truncate the entry mid-document; the next run must fall back to a
    // live fetch instead of crashing or trusting the partial file.
    let entries = cache_entry_files(&config.cache_dir);
    assert_eq!(entries.len(), 1);
    let raw = fs::read_to_string(&entries[0]).unwrap();
    fs::write(&entries[0], &raw[..raw.len() / 3]).unwrap();

    let second = StubSource::healthy();
    let outcome = Pipeline::new(&config, &second).run().expect("run should still succeed");

    assert_eq!(second.plant_calls.get(), 1, "corrupt entry must read as a miss");
    assert!(outcome.failed.is_empty());
}

// ---------------------------------------------------------------------------
// Degraded continuation
// ---------------------------------------------------------------------------

#[test]
fn test_station_with_cache_degrades_while_station_without_cache_is_omitted() {
    let root = scratch_root();

    // Seed a cache entry for station 553300 only.
    let mut seed_config = test_config(&root);
    seed_config.station_codes = vec!["553300".to_string()];
    let seeder = StubSource::healthy();
    Pipeline::new(&seed_config, &seeder).run().expect("seed run should succeed");

    // Now both stations are requested, every fetch is stale (TTL 0), and
    // the station source is down.
    let mut config = test_config(&root);
    config.station_codes = vec!["553300".to_string(), "551700".to_string()];
    config.cache_ttl_minutes = 0;
    let source = StubSource::stations_down();

    let outcome = Pipeline::new(&config, &source).run().expect("run should complete");

    let codes: Vec<&str> = outcome.entries.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(
        codes,
        vec![PLANT_TARGET_CODE, "553300"],
        "cached station stays in the index, uncached one is omitted"
    );
    assert_eq!(outcome.degraded, vec!["553300".to_string()]);
    assert_eq!(outcome.failed, vec!["551700".to_string()]);

    assert!(config.output_dir.join("tram_553300.png").exists());
    assert!(!config.output_dir.join("tram_551700.png").exists());

    let index_raw = fs::read_to_string(&config.index_path).expect("index should be written");
    let index: Vec<serde_json::Value> = serde_json::from_str(&index_raw).unwrap();
    assert_eq!(index.len(), 2, "failed targets are omitted, not null-filled");
}

// ---------------------------------------------------------------------------
// Marked dates
// ---------------------------------------------------------------------------

#[test]
fn test_marked_date_maxima_are_fetched_once_then_served_from_cache() {
    let root = scratch_root();
    let mut config = test_config(&root);
    config.marked_dates = vec!["2025-10-27".to_string()];

    let first = StubSource::healthy();
    Pipeline::new(&config, &first).run().expect("first run should succeed");
    assert_eq!(
        first.plant_calls.get(),
        2,
        "one fetch for the report window plus one for the marked date"
    );
    assert!(config.cache_dir.join("marked_dates.json").exists());

    let second = StubSource::healthy();
    Pipeline::new(&config, &second).run().expect("second run should succeed");
    assert_eq!(
        second.plant_calls.get(),
        0,
        "fresh cache entry and cached maxima leave nothing to fetch"
    );
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[test]
fn test_unknown_station_code_aborts_before_any_fetch() {
    let root = scratch_root();
    let mut config = test_config(&root);
    config.station_codes = vec!["000000".to_string()];
    let source = StubSource::healthy();

    let err = Pipeline::new(&config, &source)
        .run()
        .expect_err("unknown station must abort the run");

    assert_eq!(err, ConfigError::UnknownStation("000000".to_string()));
    assert_eq!(source.plant_calls.get(), 0, "config errors must precede any fetch");
    assert_eq!(source.station_calls.get(), 0);
    assert!(!config.index_path.exists(), "no index is written for an aborted run");
}
