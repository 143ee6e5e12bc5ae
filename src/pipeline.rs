/// Pipeline orchestrator.
///
/// Drives every configured target (the plant aggregate plus each station
/// code) through one run: resolve the cache key, check freshness, fetch
/// and normalize only when stale or forced, persist the cache entry,
/// render or reuse chart artifacts, and finally write the artifact index
/// over the targets that produced output.
///
/// Target failures are isolated: a failing plant or station never aborts
/// processing of the others, and artifacts from earlier runs are never
/// deleted. Only an up-front configuration error, or a run in which no
/// target produced output, escalates to a failing exit code.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::cache::{self, CacheEntry, CacheStore, ChartKind, FormFactor};
use crate::config::RunConfig;
use crate::ingest::DataSource;
use crate::logging::{self, LogSource};
use crate::model::{ConfigError, FetchError, QueryParams, RenderError, SeriesPoint};
use crate::render::{self, ChartStyle, ChronologicalChart, OverlayChart, ReferenceLine};
use crate::series;
use crate::stations::{self, Station};

/// Index code and label of the plant aggregate target.
pub const PLANT_TARGET_CODE: &str = "baocaothuydien";
pub const PLANT_TARGET_LABEL: &str = "Báo cáo thủy điện";

/// Daily maxima for marked dates live beside the regular cache entries.
const MARKED_CACHE_FILE: &str = "marked_dates.json";

// ---------------------------------------------------------------------------
// Run results
// ---------------------------------------------------------------------------

/// One record of the artifact index consumed by the static report page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub code: String,
    pub label: String,
    pub image: String,
    #[serde(rename = "imageMobile")]
    pub image_mobile: String,
}

/// Summary of one pipeline run across all targets.
#[derive(Debug)]
pub struct RunOutcome {
    /// Index entries for targets that produced artifacts, in target order.
    pub entries: Vec<IndexEntry>,
    /// Codes that produced artifacts from last-known-good cache after a
    /// failed fetch.
    pub degraded: Vec<String>,
    /// Codes that produced no artifact this run.
    pub failed: Vec<String>,
}

impl RunOutcome {
    /// True when every target failed, the only per-target condition that
    /// escalates to a failing exit code.
    pub fn fully_failed(&self) -> bool {
        self.entries.is_empty() && !self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Per-target errors
// ---------------------------------------------------------------------------

/// Where a target's records came from this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeriesOrigin {
    /// Fresh cache entry, no fetch issued.
    FreshCache,
    /// Live fetch succeeded.
    Fetched,
    /// Live fetch failed; last-known-good cache entry reused.
    Degraded,
}

#[derive(Debug)]
enum TargetError {
    Fetch(FetchError),
    Render(RenderError),
    /// Fetch succeeded but yielded no plottable records and no cached
    /// fallback exists.
    NoData,
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetError::Fetch(err) => write!(f, "{}", err),
            TargetError::Render(err) => write!(f, "{}", err),
            TargetError::NoData => write!(f, "no plottable records and no cached fallback"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline<'a> {
    config: &'a RunConfig,
    source: &'a dyn DataSource,
    cache: CacheStore,
}

/// Output paths for the plant aggregate target.
struct PlantPaths {
    chronological: PathBuf,
    overlay: PathBuf,
    chronological_mobile: PathBuf,
    overlay_mobile: PathBuf,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a RunConfig, source: &'a dyn DataSource) -> Pipeline<'a> {
        Pipeline {
            cache: CacheStore::new(config.cache_dir.clone()),
            config,
            source,
        }
    }

    /// Runs the whole pipeline once. Configuration is validated before any
    /// network or filesystem work; after that, per-target failures are
    /// absorbed into the outcome.
    pub fn run(&self) -> Result<RunOutcome, ConfigError> {
        self.config.validate()?;

        let total = 1 + self.config.station_codes.len();
        logging::info(
            LogSource::System,
            None,
            &format!("starting run over {} target(s)", total),
        );

        let mut outcome = RunOutcome {
            entries: Vec::new(),
            degraded: Vec::new(),
            failed: Vec::new(),
        };

        match self.run_plant() {
            Ok((entry, origin)) => {
                if origin == SeriesOrigin::Degraded {
                    outcome.degraded.push(entry.code.clone());
                }
                outcome.entries.push(entry);
            }
            Err(err) => {
                logging::error(
                    LogSource::System,
                    Some(PLANT_TARGET_CODE),
                    &format!("target skipped: {}", err),
                );
                outcome.failed.push(PLANT_TARGET_CODE.to_string());
            }
        }

        for code in &self.config.station_codes {
            // validate() already resolved every code; this cannot fail here.
            let station = stations::resolve_station(code)?;
            match self.run_station(station) {
                Ok((entry, origin)) => {
                    if origin == SeriesOrigin::Degraded {
                        outcome.degraded.push(entry.code.clone());
                    }
                    outcome.entries.push(entry);
                }
                Err(err) => {
                    logging::error(
                        LogSource::System,
                        Some(code),
                        &format!("target skipped: {}", err),
                    );
                    outcome.failed.push(code.clone());
                }
            }
        }

        if let Err(err) = self.write_index(&outcome.entries) {
            logging::error(
                LogSource::System,
                None,
                &format!("index write failed: {}", err),
            );
        }

        if self.config.show {
            for entry in &outcome.entries {
                logging::info(
                    LogSource::System,
                    Some(&entry.code),
                    &format!("artifact at {}", entry.image),
                );
            }
        }

        logging::log_run_summary(
            total,
            outcome.entries.len(),
            outcome.degraded.len(),
            outcome.failed.len(),
        );
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Plant aggregate target
    // -----------------------------------------------------------------------

    fn plant_paths(&self) -> PlantPaths {
        let dir = &self.config.output_dir;
        PlantPaths {
            chronological: dir.join("baocaothuydien.png"),
            overlay: dir.join("baocaothuydien_overlay.png"),
            chronological_mobile: dir.join("baocaothuydien_mobile.png"),
            overlay_mobile: dir.join("baocaothuydien_mobile_overlay.png"),
        }
    }

    fn run_plant(&self) -> Result<(IndexEntry, SeriesOrigin), TargetError> {
        let cfg = self.config;
        let key = cache::fingerprint("plant", &[&cfg.start, &cfg.end, &cfg.plant_ids]);
        let params = QueryParams {
            start: cfg.start.clone(),
            end: cfg.end.clone(),
            ids: cfg.plant_ids.clone(),
        };

        let (entry, origin) = self.obtain(&key, params, LogSource::PlantApi, PLANT_TARGET_CODE, || {
            self.source.plant_report(&cfg.start, &cfg.end, &cfg.plant_ids)
        })?;

        let marked = self.resolve_marked_maxima();
        let reference_lines = marked_reference_lines(&marked);

        let paths = self.plant_paths();
        let mut variants = vec![
            (ChartKind::Chronological, FormFactor::Desktop, paths.chronological.clone()),
            (ChartKind::Overlay, FormFactor::Desktop, paths.overlay.clone()),
        ];
        if cfg.mobile {
            variants.push((
                ChartKind::Chronological,
                FormFactor::Mobile,
                paths.chronological_mobile.clone(),
            ));
            variants.push((ChartKind::Overlay, FormFactor::Mobile, paths.overlay_mobile.clone()));
        }

        let render_variant = |records: &[SeriesPoint],
                              kind: ChartKind,
                              form: FormFactor,
                              out: &Path|
         -> Result<(), RenderError> {
            let style = style_for(form);
            match kind {
                ChartKind::Chronological => {
                    let chart = ChronologicalChart {
                        title: "Diễn biến theo giờ",
                        x_label: "Thời gian xả",
                        y_label: "Lưu lượng",
                        primary_label: "Q về Vu Gia",
                        secondary_label: Some("Q về Thu Bồn"),
                        reference_lines: &reference_lines,
                    };
                    render::render_chronological(records, &chart, &style, out)
                }
                ChartKind::Overlay => {
                    let chart = OverlayChart {
                        title: PLANT_TARGET_LABEL,
                        x_label: "Thời gian xả",
                        y_label: "Lưu lượng",
                        primary_panel_title: "Q về Vu Gia - So sánh từng ngày theo giờ",
                        secondary_panel_title: Some("Q về Thu Bồn - So sánh từng ngày theo giờ"),
                    };
                    render::render_overlay(records, &chart, &style, out)
                }
            }
        };

        self.materialize(&key, &entry, origin, PLANT_TARGET_CODE, &variants, &render_variant)?;

        let image_mobile = if cfg.mobile {
            &paths.chronological_mobile
        } else {
            &paths.chronological
        };
        Ok((
            IndexEntry {
                code: PLANT_TARGET_CODE.to_string(),
                label: PLANT_TARGET_LABEL.to_string(),
                image: path_str(&paths.chronological),
                image_mobile: path_str(image_mobile),
            },
            origin,
        ))
    }

    // -----------------------------------------------------------------------
    // Station targets
    // -----------------------------------------------------------------------

    fn run_station(&self, station: &'static Station) -> Result<(IndexEntry, SeriesOrigin), TargetError> {
        let cfg = self.config;
        let key = cache::fingerprint("station", &[&cfg.sheet_url, station.code]);
        // The sheet export carries no date-range parameters; the station
        // code alone identifies the query.
        let params = QueryParams {
            start: String::new(),
            end: String::new(),
            ids: station.code.to_string(),
        };

        let (entry, origin) = self.obtain(&key, params, LogSource::StationSheet, station.code, || {
            self.source.station_levels(station.code)
        })?;

        let desktop_out = cfg.output_dir.join(format!("tram_{}.png", station.code));
        let mobile_out = cfg.output_dir.join(format!("tram_{}_mobile.png", station.code));
        let mut variants = vec![(ChartKind::Chronological, FormFactor::Desktop, desktop_out.clone())];
        if cfg.mobile {
            variants.push((ChartKind::Chronological, FormFactor::Mobile, mobile_out.clone()));
        }

        let title = format!("Diễn biến mực nước {}", station.name);
        let y_label = format!("Mực nước ({})", station.unit);
        let reference_lines: Vec<ReferenceLine> = station
            .alarm_levels
            .iter()
            .enumerate()
            .map(|(index, alarm)| ReferenceLine {
                label: format!("{} ({})", alarm.label, alarm.level),
                value: alarm.level,
                color_index: index,
                dash: (6, 6),
            })
            .collect();

        let render_variant = |records: &[SeriesPoint],
                              _kind: ChartKind,
                              form: FormFactor,
                              out: &Path|
         -> Result<(), RenderError> {
            let chart = ChronologicalChart {
                title: &title,
                x_label: "Thời gian",
                y_label: &y_label,
                primary_label: "Mực nước",
                secondary_label: None,
                reference_lines: &reference_lines,
            };
            render::render_chronological(records, &chart, &style_for(form), out)
        };

        self.materialize(&key, &entry, origin, station.code, &variants, &render_variant)?;

        let image_mobile = if cfg.mobile { &mobile_out } else { &desktop_out };
        Ok((
            IndexEntry {
                code: station.code.to_string(),
                label: station.name.to_string(),
                image: path_str(&desktop_out),
                image_mobile: path_str(image_mobile),
            },
            origin,
        ))
    }

    // -----------------------------------------------------------------------
    // Cache-or-fetch
    // -----------------------------------------------------------------------

    /// Resolves the records for one target: fresh cache when allowed,
    /// otherwise a live fetch with write-back, otherwise last-known-good
    /// cache. Cache state is only touched after a complete parseable
    /// response.
    fn obtain(
        &self,
        key: &str,
        params: QueryParams,
        source: LogSource,
        code: &str,
        fetch: impl FnOnce() -> Result<Vec<SeriesPoint>, FetchError>,
    ) -> Result<(CacheEntry, SeriesOrigin), TargetError> {
        let cached = self.cache.load(key);

        if !self.config.force_refresh {
            if let Some(entry) = &cached {
                if CacheStore::is_fresh(entry, self.config.cache_ttl_minutes, Utc::now()) {
                    logging::info(
                        LogSource::Cache,
                        Some(code),
                        &format!("using cached data fetched at {}", entry.fetched_at.to_rfc3339()),
                    );
                    return Ok((entry.clone(), SeriesOrigin::FreshCache));
                }
            }
        }

        match fetch() {
            Ok(raw) => {
                let records = series::normalize(raw);
                if records.is_empty() {
                    logging::warn(source, Some(code), "fetch returned no plottable records");
                    return match cached {
                        Some(entry) => Ok((entry, SeriesOrigin::Degraded)),
                        None => Err(TargetError::NoData),
                    };
                }
                let entry = CacheEntry::new(Utc::now(), params, records);
                if let Err(err) = self.cache.store(key, &entry) {
                    logging::warn(
                        LogSource::Cache,
                        Some(code),
                        &format!("cache write failed: {}", err),
                    );
                }
                Ok((entry, SeriesOrigin::Fetched))
            }
            Err(err) => {
                logging::log_fetch_failure(source, code, &err);
                match cached {
                    Some(entry) => {
                        logging::warn(
                            LogSource::Cache,
                            Some(code),
                            &format!(
                                "degrading to cached data fetched at {}",
                                entry.fetched_at.to_rfc3339()
                            ),
                        );
                        Ok((entry, SeriesOrigin::Degraded))
                    }
                    None => Err(TargetError::Fetch(err)),
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Artifact materialization
    // -----------------------------------------------------------------------

    /// Ensures every requested chart variant exists at its output path.
    ///
    /// When no fetch happened this run and every variant has a cached
    /// image, the renderer is skipped and cached images are copied out.
    /// Otherwise all variants are re-rendered from the entry's records and
    /// copied back into the cache slots for the next reuse.
    fn materialize(
        &self,
        key: &str,
        entry: &CacheEntry,
        origin: SeriesOrigin,
        code: &str,
        variants: &[(ChartKind, FormFactor, PathBuf)],
        render_variant: &dyn Fn(&[SeriesPoint], ChartKind, FormFactor, &Path) -> Result<(), RenderError>,
    ) -> Result<(), TargetError> {
        let reusable = origin != SeriesOrigin::Fetched
            && variants
                .iter()
                .all(|(kind, form, _)| self.cache.image_path(key, *kind, *form).exists());

        if reusable {
            for (kind, form, out) in variants {
                copy_artifact(&self.cache.image_path(key, *kind, *form), out)
                    .map_err(|err| TargetError::Render(RenderError::Io(err.to_string())))?;
            }
            logging::info(LogSource::Cache, Some(code), "reused cached charts");
            return Ok(());
        }

        for (kind, form, out) in variants {
            render_variant(&entry.records, *kind, *form, out).map_err(|err| {
                logging::log_render_failure(code, &err);
                TargetError::Render(err)
            })?;
            let slot = self.cache.image_path(key, *kind, *form);
            if let Err(err) = copy_artifact(out, &slot) {
                logging::warn(
                    LogSource::Cache,
                    Some(code),
                    &format!("chart not cached: {}", err),
                );
            }
        }

        let mut rendered = entry.clone();
        rendered.last_rendered_at = Some(Utc::now());
        if let Err(err) = self.cache.store(key, &rendered) {
            logging::warn(
                LogSource::Cache,
                Some(code),
                &format!("cache write failed: {}", err),
            );
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Marked-date maxima
    // -----------------------------------------------------------------------

    /// Daily maxima for the configured marked dates, fetched at most once
    /// per date and cached beside the regular entries. A failed fetch for
    /// one date is logged and skipped; the run continues without its line.
    fn resolve_marked_maxima(&self) -> BTreeMap<String, (f64, f64)> {
        if self.config.marked_dates.is_empty() {
            return BTreeMap::new();
        }

        let path = self.cache.dir().join(MARKED_CACHE_FILE);
        let mut known: BTreeMap<String, (f64, f64)> = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        let mut updated = false;
        for date in &self.config.marked_dates {
            if known.contains_key(date) {
                continue;
            }
            let start = format!("{}T00:00:00.000Z", date);
            let end = format!("{}T23:59:59.999Z", date);
            logging::info(
                LogSource::PlantApi,
                None,
                &format!("fetching marked date {}", date),
            );
            match self.source.plant_report(&start, &end, &self.config.plant_ids) {
                Ok(points) => {
                    let mut max_primary = 0.0f64;
                    let mut max_secondary = 0.0f64;
                    for point in &points {
                        max_primary = max_primary.max(point.primary);
                        if let Some(secondary) = point.secondary {
                            max_secondary = max_secondary.max(secondary);
                        }
                    }
                    known.insert(date.clone(), (max_primary, max_secondary));
                    updated = true;
                }
                Err(err) => logging::log_fetch_failure(LogSource::PlantApi, date, &err),
            }
        }

        if updated {
            if let Err(err) = write_json_atomic(&path, &known) {
                logging::warn(
                    LogSource::Cache,
                    None,
                    &format!("marked-date cache write failed: {}", err),
                );
            }
        }

        // Only the currently configured dates are drawn; retired dates stay
        // in the cache file but not on the chart.
        known.retain(|date, _| self.config.marked_dates.contains(date));
        known
    }

    // -----------------------------------------------------------------------
    // Artifact index
    // -----------------------------------------------------------------------

    fn write_index(&self, entries: &[IndexEntry]) -> io::Result<()> {
        write_json_atomic(&self.config.index_path, &entries)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn style_for(form: FormFactor) -> ChartStyle {
    match form {
        FormFactor::Desktop => render::desktop_style(),
        FormFactor::Mobile => render::mobile_style(),
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Copies an artifact between the cache slot and the output path, creating
/// the destination directory. A no-op when both paths coincide.
fn copy_artifact(src: &Path, dst: &Path) -> io::Result<()> {
    if src == dst {
        return Ok(());
    }
    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::copy(src, dst)?;
    Ok(())
}

/// Serializes `value` as pretty JSON and writes it with the same
/// temp-then-rename sequence the cache store uses.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let serialized = serde_json::to_string_pretty(value)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serialized)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reference lines for the plant chart: one dashed line per marked-date
/// maximum, Vu Gia and Thu Bồn sharing the date's color but differing in
/// dash pattern. Zero maxima carry no information and draw nothing.
fn marked_reference_lines(maxima: &BTreeMap<String, (f64, f64)>) -> Vec<ReferenceLine> {
    let mut lines = Vec::new();
    for (index, (date, (max_vu, max_thu))) in maxima.iter().enumerate() {
        if *max_vu > 0.0 {
            lines.push(ReferenceLine {
                label: format!("{} VG max={:.0}", date, max_vu),
                value: *max_vu,
                color_index: index,
                dash: (6, 6),
            });
        }
        if *max_thu > 0.0 {
            lines.push(ReferenceLine {
                label: format!("{} TB max={:.0}", date, max_thu),
                value: *max_thu,
                color_index: index,
                dash: (2, 4),
            });
        }
    }
    lines
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_entry_serializes_with_page_facing_field_names() {
        let entry = IndexEntry {
            code: "553300".to_string(),
            label: "Trạm Ái Nghĩa".to_string(),
            image: "public/tram_553300.png".to_string(),
            image_mobile: "public/tram_553300_mobile.png".to_string(),
        };
        let value = serde_json::to_value(&entry).expect("entry must serialize");
        assert!(value.get("imageMobile").is_some(), "page expects camelCase key");
        assert!(value.get("image_mobile").is_none());
    }

    #[test]
    fn test_marked_reference_lines_share_color_per_date() {
        let mut maxima = BTreeMap::new();
        maxima.insert("2025-10-27".to_string(), (6100.0, 3200.0));
        maxima.insert("2025-10-28".to_string(), (0.0, 1500.0));
        let lines = marked_reference_lines(&maxima);
        assert_eq!(lines.len(), 3, "zero maxima draw nothing");
        assert_eq!(lines[0].color_index, lines[1].color_index);
        assert_ne!(lines[0].dash, lines[1].dash);
        assert_eq!(lines[2].color_index, 1);
    }

    #[test]
    fn test_outcome_fully_failed_requires_at_least_one_failure() {
        let empty = RunOutcome {
            entries: Vec::new(),
            degraded: Vec::new(),
            failed: Vec::new(),
        };
        assert!(!empty.fully_failed());

        let all_failed = RunOutcome {
            entries: Vec::new(),
            degraded: Vec::new(),
            failed: vec!["baocaothuydien".to_string()],
        };
        assert!(all_failed.fully_failed());

        let partial = RunOutcome {
            entries: vec![IndexEntry {
                code: "baocaothuydien".to_string(),
                label: PLANT_TARGET_LABEL.to_string(),
                image: "a.png".to_string(),
                image_mobile: "a.png".to_string(),
            }],
            degraded: Vec::new(),
            failed: vec!["553300".to_string()],
        };
        assert!(!partial.fully_failed());
    }
}
