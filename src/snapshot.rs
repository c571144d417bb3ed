//! Snapshot building: fan out fetches, compute returns, aggregate.
//!
//! Every configured instrument ends up in the snapshot. Instruments whose
//! fetch failed carry undefined values and a matching entry in the warnings
//! list; only a snapshot without a single usable price is an error.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::anchor::{AnchorDates, TimeAnchor};
use crate::config::{Config, Instrument};
use crate::error::SnapshotError;
use crate::pricing::PriceSource;
use crate::returns::{compute, PeriodReturns, ReturnPeriod};
use crate::series::{PriceSeries, RawPoint};

/// Return figures for one instrument in one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub instrument: String,
    pub symbol: String,
    pub latest_close: Option<Decimal>,
    pub latest_date: Option<NaiveDate>,
    pub returns: PeriodReturns,
}

impl ReturnRecord {
    /// Percentage change for `period`, `None` when undefined.
    pub fn get(&self, period: ReturnPeriod) -> Option<Decimal> {
        self.returns.get(&period).copied().flatten()
    }

    pub fn has_data(&self) -> bool {
        self.latest_close.is_some()
    }
}

/// One "as of" run over the whole instrument universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub timezone: String,
    pub records: Vec<ReturnRecord>,
}

impl Snapshot {
    pub fn record(&self, instrument: &str) -> Option<&ReturnRecord> {
        self.records.iter().find(|r| r.instrument == instrument)
    }

    pub fn usable_count(&self) -> usize {
        self.records.iter().filter(|r| r.has_data()).count()
    }
}

/// Why an instrument contributed no (or only partial) data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchFailure {
    /// Network or provider error.
    Provider { message: String },
    TimedOut { secs: u64 },
    /// Provider returned nothing usable on or before the as-of date.
    Empty,
    /// Some points had to be dropped.
    Malformed { dropped: usize },
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Provider { message } => write!(f, "{}", message),
            FetchFailure::TimedOut { secs } => write!(f, "timed out after {}s", secs),
            FetchFailure::Empty => write!(f, "no price data"),
            FetchFailure::Malformed { dropped } => {
                write!(f, "dropped {} malformed price point(s)", dropped)
            }
        }
    }
}

/// A per-instrument problem surfaced next to the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentWarning {
    pub instrument: String,
    pub symbol: String,
    pub failure: FetchFailure,
}

impl InstrumentWarning {
    pub fn to_error(&self) -> SnapshotError {
        SnapshotError::InstrumentFetch {
            instrument: self.instrument.clone(),
            reason: self.failure.to_string(),
        }
    }
}

impl fmt::Display for InstrumentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.instrument, self.symbol, self.failure)
    }
}

/// Result of one instrument's fetch step.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(Vec<RawPoint>),
    Failed(FetchFailure),
}

/// Snapshot plus the warnings gathered while building it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotReport {
    pub snapshot: Snapshot,
    pub warnings: Vec<InstrumentWarning>,
}

/// Progress notifications emitted while fetching.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    Started { total: usize },
    Fetched {
        instrument: String,
        ok: bool,
        completed: usize,
        total: usize,
    },
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub max_concurrent_fetches: usize,
    pub fetch_timeout: Duration,
    pub history_days: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
            fetch_timeout: Duration::from_secs(30),
            history_days: 730,
        }
    }
}

impl From<&Config> for BuildOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            history_days: config.history_days,
        }
    }
}

/// Stable priority ordering: listed names first in list order, everything
/// else after in configured order.
pub fn order_by_priority<T, F>(items: &mut [T], priority: &[String], name: F)
where
    F: Fn(&T) -> &str,
{
    items.sort_by_key(|item| {
        priority
            .iter()
            .position(|p| p == name(item))
            .unwrap_or(usize::MAX)
    });
}

pub struct SnapshotBuilder {
    anchor: TimeAnchor,
    options: BuildOptions,
    priority: Vec<String>,
}

impl SnapshotBuilder {
    pub fn new(anchor: TimeAnchor, options: BuildOptions) -> Self {
        Self {
            anchor,
            options,
            priority: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: Vec<String>) -> Self {
        self.priority = priority;
        self
    }

    pub fn anchor(&self) -> &TimeAnchor {
        &self.anchor
    }

    /// First and last calendar day requested from the source.
    pub fn fetch_window(&self) -> (NaiveDate, NaiveDate) {
        let end = self.anchor.today();
        let start = end
            .checked_sub_days(Days::new(self.options.history_days as u64))
            .unwrap_or(NaiveDate::MIN);
        (start, end)
    }

    pub async fn build(
        &self,
        instruments: &[Instrument],
        source: Arc<dyn PriceSource>,
    ) -> Result<SnapshotReport, SnapshotError> {
        self.build_with_progress(instruments, source, |_| {}).await
    }

    /// Fetch every instrument concurrently (bounded), then aggregate.
    pub async fn build_with_progress<F>(
        &self,
        instruments: &[Instrument],
        source: Arc<dyn PriceSource>,
        mut progress: F,
    ) -> Result<SnapshotReport, SnapshotError>
    where
        F: FnMut(&BuildEvent),
    {
        let (start, end) = self.fetch_window();
        let total = instruments.len();
        info!(
            "Building snapshot for {} instruments as of {} (history from {})",
            total, end, start
        );
        progress(&BuildEvent::Started { total });

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_fetches.max(1)));
        let timeout = self.options.fetch_timeout;
        let mut join_set = JoinSet::new();

        for (idx, inst) in instruments.iter().enumerate() {
            let sem = semaphore.clone();
            let source = source.clone();
            let symbol = inst.symbol.clone();

            join_set.spawn(async move {
                let outcome = match sem.acquire_owned().await {
                    Ok(_permit) => fetch_one(source.as_ref(), &symbol, start, end, timeout).await,
                    Err(e) => FetchOutcome::Failed(FetchFailure::Provider {
                        message: e.to_string(),
                    }),
                };
                (idx, outcome)
            });
        }

        let mut outcomes: Vec<Option<FetchOutcome>> = vec![None; total];
        let mut completed = 0;
        while let Some(joined) = join_set.join_next().await {
            let (idx, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    // The slot stays empty and is reported below.
                    warn!("Fetch task failed: {}", e);
                    continue;
                }
            };
            completed += 1;
            progress(&BuildEvent::Fetched {
                instrument: instruments[idx].name.clone(),
                ok: matches!(outcome, FetchOutcome::Fetched(_)),
                completed,
                total,
            });
            outcomes[idx] = Some(outcome);
        }

        let outcomes = outcomes
            .into_iter()
            .map(|o| {
                o.unwrap_or_else(|| {
                    FetchOutcome::Failed(FetchFailure::Provider {
                        message: "fetch task aborted".to_string(),
                    })
                })
            })
            .collect();

        self.assemble(instruments, outcomes)
    }

    /// Aggregate fetch outcomes (one per instrument, same order) into a
    /// snapshot. Pure apart from the generation timestamp.
    pub fn assemble(
        &self,
        instruments: &[Instrument],
        outcomes: Vec<FetchOutcome>,
    ) -> Result<SnapshotReport, SnapshotError> {
        let anchor_dates = self.anchor.reference_dates()?;

        let mut rows: Vec<(ReturnRecord, Vec<InstrumentWarning>)> = instruments
            .iter()
            .zip(outcomes)
            .map(|(inst, outcome)| self.record_for(inst, outcome, &anchor_dates))
            .collect();

        order_by_priority(&mut rows, &self.priority, |(r, _)| r.instrument.as_str());

        let mut records = Vec::with_capacity(rows.len());
        let mut warnings = Vec::new();
        for (record, w) in rows {
            records.push(record);
            warnings.extend(w);
        }

        let snapshot = Snapshot {
            generated_at: Utc::now(),
            as_of: self.anchor.today(),
            timezone: self.anchor.timezone().name().to_string(),
            records,
        };

        let usable = snapshot.usable_count();
        if usable == 0 {
            return Err(SnapshotError::NoUsableInstruments {
                attempted: instruments.len(),
            });
        }

        info!(
            "Snapshot ready: {}/{} instruments with data, {} warning(s)",
            usable,
            instruments.len(),
            warnings.len()
        );
        Ok(SnapshotReport { snapshot, warnings })
    }

    fn record_for(
        &self,
        inst: &Instrument,
        outcome: FetchOutcome,
        anchor_dates: &AnchorDates,
    ) -> (ReturnRecord, Vec<InstrumentWarning>) {
        let mut warnings = Vec::new();
        let mut warn_with = |failure: FetchFailure| {
            warn!("{} ({}): {}", inst.name, inst.symbol, failure);
            warnings.push(InstrumentWarning {
                instrument: inst.name.clone(),
                symbol: inst.symbol.clone(),
                failure,
            });
        };

        let series = match outcome {
            FetchOutcome::Fetched(raw) => {
                let (series, dropped) = PriceSeries::from_raw(raw, &self.anchor);
                if dropped > 0 {
                    warn_with(FetchFailure::Malformed { dropped });
                }
                if series.is_empty() {
                    warn_with(FetchFailure::Empty);
                }
                series
            }
            FetchOutcome::Failed(failure) => {
                warn_with(failure);
                PriceSeries::empty(self.anchor.timezone())
            }
        };

        let store = series.store();
        let latest = store.latest();
        let record = ReturnRecord {
            instrument: inst.name.clone(),
            symbol: inst.symbol.clone(),
            latest_close: latest.map(|p| p.close),
            latest_date: latest.map(|p| p.date()),
            returns: compute(store, anchor_dates),
        };
        debug!("{}: {} points, latest {:?}", inst.name, series.len(), record.latest_close);

        (record, warnings)
    }
}

async fn fetch_one(
    source: &dyn PriceSource,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    timeout: Duration,
) -> FetchOutcome {
    match tokio::time::timeout(timeout, source.fetch_history(symbol, start, end)).await {
        Ok(Ok(points)) if points.is_empty() => FetchOutcome::Failed(FetchFailure::Empty),
        Ok(Ok(points)) => FetchOutcome::Fetched(points),
        Ok(Err(e)) => FetchOutcome::Failed(FetchFailure::Provider {
            message: format!("{:#}", e),
        }),
        Err(_) => FetchOutcome::Failed(FetchFailure::TimedOut {
            secs: timeout.as_secs(),
        }),
    }
}
