/// On-disk cache store for fetched payloads and rendered charts.
///
/// One entry per fingerprinted key, stored as pretty JSON next to the
/// cached chart images for the same key. Freshness is tracked by an
/// explicit `fetched_at` field rather than filesystem modification time,
/// which does not survive copies and is not crash-safe.
///
/// Writes go through a temp-file-then-rename sequence, so a reader racing
/// a writer sees either the old complete entry or the new complete entry,
/// never a partial one. A malformed or truncated entry is treated as a
/// cache miss, never as a fatal error.
///
/// # Clock injection
/// `is_fresh` takes a `now: DateTime<Utc>` parameter rather than calling
/// `Utc::now()` internally, keeping freshness deterministic in tests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::logging::{self, LogSource};
use crate::model::{QueryParams, SeriesPoint};

/// Bumped whenever the serialized entry layout changes; entries written
/// by an older layout are treated as misses.
pub const CACHE_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Cache entry
// ---------------------------------------------------------------------------

/// A cached payload plus its freshness metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: u32,
    pub fetched_at: DateTime<Utc>,
    pub last_rendered_at: Option<DateTime<Utc>>,
    pub params: QueryParams,
    pub records: Vec<SeriesPoint>,
}

impl CacheEntry {
    pub fn new(fetched_at: DateTime<Utc>, params: QueryParams, records: Vec<SeriesPoint>) -> Self {
        CacheEntry {
            version: CACHE_VERSION,
            fetched_at,
            last_rendered_at: None,
            params,
            records,
        }
    }
}

// ---------------------------------------------------------------------------
// Chart variants cached alongside an entry
// ---------------------------------------------------------------------------

/// Chart style axis: one pass over the full time range, or day-over-day
/// comparison on a shared 24-hour axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Chronological,
    Overlay,
}

/// Output form factor. Variants differ only in pixel dimensions and font
/// scaling, never in data content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormFactor {
    Desktop,
    Mobile,
}

fn variant_suffix(kind: ChartKind, form: FormFactor) -> &'static str {
    match (kind, form) {
        (ChartKind::Chronological, FormFactor::Desktop) => "hourly.png",
        (ChartKind::Overlay, FormFactor::Desktop) => "overlay.png",
        (ChartKind::Chronological, FormFactor::Mobile) => "hourly_mobile.png",
        (ChartKind::Overlay, FormFactor::Mobile) => "overlay_mobile.png",
    }
}

// ---------------------------------------------------------------------------
// Fingerprinting
// ---------------------------------------------------------------------------

/// Derives the deterministic cache key for a source and its query
/// parameters: first 16 hex characters of sha256 over the `|`-joined
/// inputs. Distinct parameter sets yield distinct keys.
pub fn fingerprint(source: &str, params: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    for param in params {
        hasher.update([b'|']);
        hasher.update(param.as_bytes());
    }
    let digest = hasher.finalize();
    digest
        .iter()
        .take(8)
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Filesystem-backed cache rooted at one directory.
///
/// Entries are never evicted; the directory grows with each distinct
/// parameter set until pruned externally.
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CacheStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.data.json", key))
    }

    /// Path of the cached chart image for a key and variant. The file may
    /// or may not exist; callers check before copying.
    pub fn image_path(&self, key: &str, kind: ChartKind, form: FormFactor) -> PathBuf {
        self.dir.join(format!("{}.{}", key, variant_suffix(kind, form)))
    }

    /// Loads the entry for `key`. Absent, unreadable, malformed, or
    /// version-mismatched entries all read as a miss.
    pub fn load(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                logging::warn(
                    LogSource::Cache,
                    Some(key),
                    &format!("entry unreadable, treating as miss: {}", err),
                );
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                logging::warn(
                    LogSource::Cache,
                    Some(key),
                    &format!("entry corrupted, treating as miss: {}", err),
                );
                return None;
            }
        };

        if entry.version != CACHE_VERSION {
            logging::info(
                LogSource::Cache,
                Some(key),
                &format!("entry written by layout v{}, treating as miss", entry.version),
            );
            return None;
        }

        Some(entry)
    }

    /// Persists the entry for `key` atomically: serialize to `<file>.tmp`
    /// in the same directory, then rename over the final path.
    pub fn store(&self, key: &str, entry: &CacheEntry) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        let tmp = self.dir.join(format!("{}.data.json.tmp", key));
        let serialized = serde_json::to_string_pretty(entry)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        fs::write(&tmp, serialized)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Freshness check: an entry is fresh while its age is strictly below
    /// the TTL. An entry exactly `ttl_minutes` old is already stale.
    pub fn is_fresh(entry: &CacheEntry, ttl_minutes: u64, now: DateTime<Utc>) -> bool {
        now - entry.fetched_at < Duration::minutes(ttl_minutes as i64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
