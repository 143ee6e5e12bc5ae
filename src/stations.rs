/// Station registry for the hydro discharge reporting service.
///
/// Defines the canonical list of hydrological monitoring stations this
/// service can produce charts for, along with their labels, units and
/// official alarm levels. This is the single source of truth for station
/// codes; all other modules should resolve stations from here rather
/// than hardcoding codes. Requesting a code that is not listed here is a
/// configuration error, never a silent fallback.

use crate::model::ConfigError;

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// A named alarm level for a station, e.g. ("BĐ1", 6.5).
#[derive(Debug)]
pub struct AlarmLevel {
    pub label: &'static str,
    pub level: f64,
}

/// Metadata for a single monitoring station.
#[derive(Debug)]
pub struct Station {
    /// External station code used by the reporting sheet (e.g. "553300").
    pub code: &'static str,
    /// Human-readable station label, used in chart titles and the index.
    pub name: &'static str,
    /// Measurement unit of the station's series.
    pub unit: &'static str,
    /// Official alarm levels in ascending order, drawn as reference
    /// lines on the station chart. May be empty for unranked stations.
    pub alarm_levels: &'static [AlarmLevel],
}

/// The station code used when an invocation does not name one explicitly.
/// This is the only default the service carries; every other code must be
/// passed in and must resolve against the registry.
pub const DEFAULT_STATION_CODE: &str = "553300";

/// All monitoring stations known to the service, main stem first.
///
/// Alarm levels are the official BĐ1/BĐ2/BĐ3 flood alert stages for each
/// station, drawn as dashed reference lines on its chart.
pub static STATION_REGISTRY: &[Station] = &[
    Station {
        code: "553300",
        name: "Trạm Ái Nghĩa",
        unit: "m",
        alarm_levels: &[
            AlarmLevel { label: "BĐ1", level: 6.5 },
            AlarmLevel { label: "BĐ2", level: 8.0 },
            AlarmLevel { label: "BĐ3", level: 9.0 },
        ],
    },
    Station {
        code: "551700",
        name: "Trạm Giao Thủy",
        unit: "m",
        alarm_levels: &[
            AlarmLevel { label: "BĐ1", level: 6.2 },
            AlarmLevel { label: "BĐ2", level: 7.6 },
            AlarmLevel { label: "BĐ3", level: 8.8 },
        ],
    },
];

/// Looks up a station by code. Returns `None` if not found.
pub fn find_station(code: &str) -> Option<&'static Station> {
    STATION_REGISTRY.iter().find(|s| s.code == code)
}

/// Resolves a station code or fails with a `ConfigError`.
pub fn resolve_station(code: &str) -> Result<&'static Station, ConfigError> {
    find_station(code).ok_or_else(|| ConfigError::UnknownStation(code.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
