//! Runtime configuration loaded from TOML.
//!
//! Lookup order: explicit path, `MARKETSNAP_CONFIG`, then
//! `<config_home>/marketsnap/config.toml`. When none exists the built-in
//! defaults are used.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::anchor::{parse_timezone, DEFAULT_TIMEZONE};
use crate::error::SnapshotError;

const CONFIG_ENV_VAR: &str = "MARKETSNAP_CONFIG";
const CONFIG_FILENAME: &str = "config.toml";
/// Ten years; keeps the TTL well inside chrono's duration range.
pub const MAX_CACHE_TTL_HOURS: u32 = 24 * 365 * 10;

/// One tracked asset: display name (unique key) and provider symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub symbol: String,
}

impl Instrument {
    pub fn new(name: &str, symbol: &str) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Yahoo,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// IANA zone every timestamp is normalized into
    pub timezone: String,
    /// Earliest fetch date is the as-of date minus this many days
    pub history_days: u32,
    pub cache_ttl_hours: u32,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout_secs: u64,
    pub output_dir: PathBuf,
    pub source: SourceKind,
    pub prices_dir: Option<PathBuf>,
    /// Display names shown first, in this order
    pub priority: Vec<String>,
    pub instruments: Vec<Instrument>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            history_days: 730,
            cache_ttl_hours: 6,
            max_concurrent_fetches: 4,
            fetch_timeout_secs: 30,
            output_dir: PathBuf::from("."),
            source: SourceKind::Yahoo,
            prices_dir: None,
            priority: default_priority(),
            instruments: default_instruments(),
        }
    }
}

fn default_instruments() -> Vec<Instrument> {
    [
        ("US Dollar Index", "DX-Y.NYB"),
        ("13W Treasury Yield", "^IRX"),
        ("10Y Treasury Yield", "^TNX"),
        ("VIX", "^VIX"),
        ("Gold", "GC=F"),
        ("WTI Crude", "CL=F"),
        ("S&P 500", "^GSPC"),
        ("Nasdaq", "^IXIC"),
        ("Dow Jones", "^DJI"),
        ("Russell 2000", "^RUT"),
        ("Bitcoin", "BTC-USD"),
        ("SSE Composite", "000001.SS"),
        ("CSI 300", "000300.SS"),
        ("REITs", "VNQ"),
        ("Health Care", "XLV"),
        ("Utilities", "XLU"),
    ]
    .iter()
    .map(|&(name, symbol)| Instrument::new(name, symbol))
    .collect()
}

fn default_priority() -> Vec<String> {
    [
        "US Dollar Index",
        "10Y Treasury Yield",
        "VIX",
        "Gold",
        "WTI Crude",
        "S&P 500",
        "Nasdaq",
        "Dow Jones",
        "Russell 2000",
        "Bitcoin",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// Resolve and load the configuration file.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV_VAR)
                .map(PathBuf::from)
                .or_else(|| default_config_path().filter(|p| p.exists())),
        };

        match path {
            Some(path) => {
                info!("Loading config from {:?}", path);
                Self::from_file(&path)
            }
            None => {
                debug!("No config file found, using defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let mut config = Self::from_toml(&text)
            .with_context(|| format!("Invalid config file {:?}", path))?;

        // Relative paths are relative to the config file.
        if let Some(base) = path.parent() {
            if let Some(dir) = config.prices_dir.as_mut() {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, SnapshotError> {
        let config: Config =
            toml::from_str(text).map_err(|e| SnapshotError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        parse_timezone(&self.timezone)?;

        if self.instruments.is_empty() {
            return Err(SnapshotError::Config(
                "at least one instrument is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for inst in &self.instruments {
            if inst.name.trim().is_empty() || inst.symbol.trim().is_empty() {
                return Err(SnapshotError::Config(format!(
                    "instrument '{}' needs both a name and a symbol",
                    inst.name
                )));
            }
            if !seen.insert(inst.name.as_str()) {
                return Err(SnapshotError::Config(format!(
                    "duplicate instrument name '{}'",
                    inst.name
                )));
            }
        }
        if self.max_concurrent_fetches == 0 {
            return Err(SnapshotError::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(SnapshotError::Config(
                "fetch_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.cache_ttl_hours > MAX_CACHE_TTL_HOURS {
            return Err(SnapshotError::Config(format!(
                "cache_ttl_hours must be at most {}",
                MAX_CACHE_TTL_HOURS
            )));
        }
        if self.source == SourceKind::Csv && self.prices_dir.is_none() {
            return Err(SnapshotError::Config(
                "source = \"csv\" requires prices_dir".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, SnapshotError> {
        parse_timezone(&self.timezone)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours.min(MAX_CACHE_TTL_HOURS) as i64)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dir_spec::config_home().map(|dir| dir.join("marketsnap").join(CONFIG_FILENAME))
}
