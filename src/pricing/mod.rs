// Pricing module - historical close sources and the fetch cache

pub mod cache;
pub mod csv_source;
pub mod yahoo;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{Config, SourceKind};
use crate::series::RawPoint;

pub use cache::{CachedSource, PriceCache};
pub use csv_source::CsvSource;
pub use yahoo::YahooSource;

/// A provider of daily closing prices.
///
/// Implementations return whatever the provider has for the window, in any
/// order; normalization and deduplication happen downstream.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Short provider name for logs and warnings.
    fn name(&self) -> &str;

    /// Daily closes for `symbol` from `start` through `end` inclusive.
    async fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawPoint>>;
}

/// Build the configured source, wrapped in a TTL cache.
pub fn source_from_config(config: &Config) -> Result<Arc<dyn PriceSource>> {
    let cache = Arc::new(PriceCache::new(config.cache_ttl()));

    let source: Arc<dyn PriceSource> = match config.source {
        SourceKind::Yahoo => {
            let timeout = Duration::from_secs(config.fetch_timeout_secs);
            Arc::new(CachedSource::new(YahooSource::new(timeout)?, cache))
        }
        SourceKind::Csv => {
            let dir = config.prices_dir.clone().ok_or_else(|| {
                anyhow::anyhow!("source = \"csv\" requires prices_dir to be set")
            })?;
            Arc::new(CachedSource::new(CsvSource::new(dir), cache))
        }
    };

    info!("Using {} price source", source.name());
    Ok(source)
}
