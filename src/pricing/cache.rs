//! Explicit time-to-live cache for fetched price histories.
//!
//! The cache is a collaborator injected around a [`PriceSource`]; the fetch
//! functions themselves stay stateless.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::PriceSource;
use crate::series::RawPoint;

/// A symbol plus the requested as-of window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CacheKey {
    pub fn new(symbol: &str, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            symbol: symbol.to_string(),
            start,
            end,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    points: Vec<RawPoint>,
    fetched_at: DateTime<Utc>,
}

/// Price history cache with a fixed TTL.
#[derive(Debug)]
pub struct PriceCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<RawPoint>> {
        self.get_at(key, Utc::now())
    }

    /// Look up `key`, treating entries older than the TTL at `now` as absent.
    pub fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Vec<RawPoint>> {
        let entries = self.lock();
        let entry = entries.get(key)?;
        let age = now.signed_duration_since(entry.fetched_at);
        if age < self.ttl {
            debug!(
                "Using cached history for {} (age: {}m)",
                key.symbol,
                age.num_minutes()
            );
            Some(entry.points.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, key: CacheKey, points: Vec<RawPoint>) {
        self.insert_at(key, points, Utc::now());
    }

    pub fn insert_at(&self, key: CacheKey, points: Vec<RawPoint>, fetched_at: DateTime<Utc>) {
        self.lock().insert(key, CacheEntry { points, fetched_at });
    }

    /// Drop entries that have outlived the TTL at `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.lock()
            .retain(|_, e| now.signed_duration_since(e.fetched_at) < ttl);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        // Entries are plain data; a poisoned lock still holds a usable map.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A [`PriceSource`] that consults a [`PriceCache`] before the inner source.
///
/// Only non-empty successful fetches are cached.
pub struct CachedSource<S> {
    inner: S,
    cache: Arc<PriceCache>,
}

impl<S> CachedSource<S> {
    pub fn new(inner: S, cache: Arc<PriceCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }
}

#[async_trait]
impl<S: PriceSource> PriceSource for CachedSource<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawPoint>> {
        let key = CacheKey::new(symbol, start, end);
        if let Some(points) = self.cache.get(&key) {
            return Ok(points);
        }

        let points = self.inner.fetch_history(symbol, start, end).await?;
        if !points.is_empty() {
            self.cache.insert(key, points.clone());
        }
        Ok(points)
    }
}
