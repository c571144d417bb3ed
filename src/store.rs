//! Flat-file snapshot cache.
//!
//! The last computed report is kept as JSON under
//! `<cache_home>/marketsnap/snapshot.json` and reused while it is younger
//! than the configured TTL and was built for the same as-of date, timezone
//! and instrument universe.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{Config, Instrument, SourceKind};
use crate::snapshot::SnapshotReport;

const STORE_FILENAME: &str = "snapshot.json";

pub fn default_cache_dir() -> Result<PathBuf> {
    let cache_dir = dir_spec::cache_home()
        .ok_or_else(|| anyhow::anyhow!("Could not determine cache directory"))?;

    Ok(cache_dir.join("marketsnap"))
}

/// What a stored report was built for; a mismatch means a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreKey {
    pub as_of: NaiveDate,
    pub timezone: String,
    pub instruments: Vec<Instrument>,
    pub priority: Vec<String>,
    pub source: SourceKind,
    pub prices_dir: Option<PathBuf>,
    pub history_days: u32,
}

impl StoreKey {
    pub fn new(as_of: NaiveDate, config: &Config) -> Self {
        Self {
            as_of,
            timezone: config.timezone.clone(),
            instruments: config.instruments.clone(),
            priority: config.priority.clone(),
            source: config.source,
            prices_dir: config.prices_dir.clone(),
            history_days: config.history_days,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredReport {
    saved_at: DateTime<Utc>,
    key: StoreKey,
    report: SnapshotReport,
}

pub struct SnapshotStore {
    dir: PathBuf,
    ttl: Duration,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn open_default(ttl: Duration) -> Result<Self> {
        Ok(Self::new(default_cache_dir()?, ttl))
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STORE_FILENAME)
    }

    /// Persist `report` atomically (write to a temp file, then rename).
    pub fn save(&self, key: &StoreKey, report: &SnapshotReport) -> Result<PathBuf> {
        self.save_at(key, report, Utc::now())
    }

    pub fn save_at(
        &self,
        key: &StoreKey,
        report: &SnapshotReport,
        now: DateTime<Utc>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory {:?}", self.dir))?;

        let stored = StoredReport {
            saved_at: now,
            key: key.clone(),
            report: report.clone(),
        };
        let path = self.path();
        let tmp_path = self.dir.join(format!("{}.tmp", STORE_FILENAME));
        fs::write(&tmp_path, serde_json::to_vec_pretty(&stored)?)
            .context("Failed to write snapshot cache")?;
        fs::rename(&tmp_path, &path).context("Failed to finalize snapshot cache file")?;

        debug!("Saved snapshot cache to {:?}", path);
        Ok(path)
    }

    /// The stored report, if fresh and built for `key`.
    pub fn load_fresh(&self, key: &StoreKey) -> Result<Option<SnapshotReport>> {
        self.load_fresh_at(key, Utc::now())
    }

    pub fn load_fresh_at(&self, key: &StoreKey, now: DateTime<Utc>) -> Result<Option<SnapshotReport>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path).context("Failed to read snapshot cache")?;
        let stored: StoredReport = match serde_json::from_slice(&bytes) {
            Ok(s) => s,
            Err(e) => {
                warn!("Ignoring unreadable snapshot cache {:?}: {}", path, e);
                return Ok(None);
            }
        };

        if &stored.key != key {
            debug!("Snapshot cache built for a different request, ignoring");
            return Ok(None);
        }
        if now - stored.saved_at >= self.ttl {
            debug!("Snapshot cache expired (saved at {})", stored.saved_at);
            return Ok(None);
        }

        info!("Using cached snapshot from {}", stored.saved_at);
        Ok(Some(stored.report))
    }

    /// Remove the stored report. Returns whether anything was deleted.
    pub fn clear(&self) -> Result<bool> {
        remove_if_exists(&self.path())
    }
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {:?}", path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::ReturnPeriod;
    use crate::snapshot::{FetchFailure, InstrumentWarning, ReturnRecord, Snapshot};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn report() -> SnapshotReport {
        let mut returns = crate::returns::PeriodReturns::new();
        for p in ReturnPeriod::ALL {
            returns.insert(p, None);
        }
        returns.insert(ReturnPeriod::OneDay, Some(dec!(4.76)));
        SnapshotReport {
            snapshot: Snapshot {
                generated_at: Utc::now(),
                as_of: date(2024, 1, 3),
                timezone: "America/New_York".to_string(),
                records: vec![ReturnRecord {
                    instrument: "Gold".to_string(),
                    symbol: "GC=F".to_string(),
                    latest_close: Some(dec!(110)),
                    latest_date: Some(date(2024, 1, 3)),
                    returns,
                }],
            },
            warnings: vec![InstrumentWarning {
                instrument: "VIX".to_string(),
                symbol: "^VIX".to_string(),
                failure: FetchFailure::Empty,
            }],
        }
    }

    fn key() -> StoreKey {
        StoreKey::new(date(2024, 1, 3), &Config::default())
    }

    #[test]
    fn test_save_then_load_fresh() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), Duration::hours(6));
        let saved = report();
        store.save(&key(), &saved).unwrap();

        let loaded = store.load_fresh(&key()).unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert!(!dir.path().join("snapshot.json.tmp").exists());
    }

    #[test]
    fn test_expired_or_mismatched_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), Duration::hours(6));
        let saved_at = Utc::now() - Duration::hours(7);
        store.save_at(&key(), &report(), saved_at).unwrap();
        assert!(store.load_fresh(&key()).unwrap().is_none());

        store.save(&key(), &report()).unwrap();
        let other_day = StoreKey::new(date(2024, 1, 4), &Config::default());
        assert!(store.load_fresh(&other_day).unwrap().is_none());
    }

    #[test]
    fn test_changed_source_or_history_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), Duration::hours(6));
        let csv_config = Config {
            source: SourceKind::Csv,
            prices_dir: Some(PathBuf::from("/data/prices")),
            ..Config::default()
        };
        let as_of = date(2024, 1, 3);
        store.save(&StoreKey::new(as_of, &csv_config), &report()).unwrap();
        assert!(store.load_fresh(&StoreKey::new(as_of, &csv_config)).unwrap().is_some());

        let yahoo = Config::default();
        assert!(store.load_fresh(&StoreKey::new(as_of, &yahoo)).unwrap().is_none());

        let other_dir = Config {
            prices_dir: Some(PathBuf::from("/data/other")),
            ..csv_config.clone()
        };
        assert!(store.load_fresh(&StoreKey::new(as_of, &other_dir)).unwrap().is_none());

        let shorter = Config {
            history_days: 365,
            ..csv_config
        };
        assert!(store.load_fresh(&StoreKey::new(as_of, &shorter)).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), Duration::hours(6));
        fs::write(store.path(), b"{not json").unwrap();
        assert!(store.load_fresh(&key()).unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested"), Duration::hours(6));
        assert!(!store.clear().unwrap());
        store.save(&key(), &report()).unwrap();
        assert!(store.clear().unwrap());
        assert!(!store.path().exists());
    }
}
