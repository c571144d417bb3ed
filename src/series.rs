//! Per-instrument daily price series and nearest-past lookup.

use chrono::{DateTime, NaiveDate, TimeZone};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use tracing::debug;

use crate::anchor::{RawTimestamp, TimeAnchor};

/// One daily close, timestamped at start-of-day in the reference zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    pub timestamp: DateTime<Tz>,
    pub close: Decimal,
}

impl PricePoint {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// A close as delivered by a fetch collaborator, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    pub timestamp: RawTimestamp,
    pub close: Decimal,
}

impl RawPoint {
    pub fn new(timestamp: impl Into<RawTimestamp>, close: Decimal) -> Self {
        Self {
            timestamp: timestamp.into(),
            close,
        }
    }
}

/// Ascending, day-unique sequence of closes for one instrument.
///
/// Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    tz: Tz,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn empty(tz: Tz) -> Self {
        Self {
            tz,
            points: Vec::new(),
        }
    }

    /// Build from already-normalized points. Sorts ascending and keeps the
    /// last supplied point for any duplicated timestamp.
    pub fn from_points(tz: Tz, mut points: Vec<PricePoint>) -> Self {
        for p in points.iter_mut() {
            p.timestamp = p.timestamp.with_timezone(&tz);
        }
        // Stable sort keeps supply order among equal timestamps.
        points.sort_by_key(|p| p.timestamp);

        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for p in points {
            match deduped.last_mut() {
                Some(last) if last.timestamp == p.timestamp => *last = p,
                _ => deduped.push(p),
            }
        }

        Self {
            tz,
            points: deduped,
        }
    }

    /// Normalize raw provider points into the anchor zone at daily
    /// granularity.
    ///
    /// Points dated after the anchor's "today" are ignored so that a past
    /// as-of date never sees later closes. Returns the series and the number
    /// of points dropped as malformed (unparseable timestamp or negative
    /// close).
    pub fn from_raw(raw: Vec<RawPoint>, anchor: &TimeAnchor) -> (Self, usize) {
        let mut malformed = 0;
        let mut points = Vec::with_capacity(raw.len());

        for rp in raw {
            if rp.close < Decimal::ZERO {
                debug!("Dropping negative close {} at {:?}", rp.close, rp.timestamp);
                malformed += 1;
                continue;
            }
            match anchor.normalize_day(&rp.timestamp) {
                Ok(timestamp) if timestamp.date_naive() > anchor.today() => {}
                Ok(timestamp) => points.push(PricePoint {
                    timestamp,
                    close: rp.close,
                }),
                Err(e) => {
                    debug!("Dropping point: {}", e);
                    malformed += 1;
                }
            }
        }

        (Self::from_points(anchor.timezone(), points), malformed)
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Read-only lookup view.
    pub fn store(&self) -> PriceSeriesStore<'_> {
        PriceSeriesStore { series: self }
    }
}

/// Read-only lookups over one [`PriceSeries`].
#[derive(Debug, Clone, Copy)]
pub struct PriceSeriesStore<'a> {
    series: &'a PriceSeries,
}

impl<'a> PriceSeriesStore<'a> {
    /// Most recent point, if any.
    pub fn latest(&self) -> Option<&'a PricePoint> {
        self.series.points.last()
    }

    pub fn len(&self) -> usize {
        self.series.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.points.is_empty()
    }

    /// Point with the greatest timestamp at or before `target`.
    ///
    /// Walks backward over missing days; never interpolates and never looks
    /// forward. A target past the last point resolves to the last point.
    pub fn nearest_on_or_before<Z: TimeZone>(
        &self,
        target: &DateTime<Z>,
    ) -> Option<&'a PricePoint> {
        let target = target.with_timezone(&self.series.tz);
        let points = &self.series.points;
        let idx = points.partition_point(|p| p.timestamp <= target);
        idx.checked_sub(1).map(|i| &points[i])
    }
}
