//! Time anchoring: timezone normalization and lookback reference dates.
//!
//! Every timestamp that enters the engine passes through [`TimeAnchor`] so
//! that all comparisons happen in one reference timezone. The anchor is built
//! once per snapshot and shared read-only by every instrument.

use chrono::{
    DateTime, Datelike, Days, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc,
};
use chrono_tz::Tz;
use std::collections::BTreeMap;

use crate::error::SnapshotError;
use crate::returns::ReturnPeriod;

/// Reference timezone used when none is configured.
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Reference date (start-of-day in the anchor zone) for each period.
pub type AnchorDates = BTreeMap<ReturnPeriod, DateTime<Tz>>;

/// A timestamp as handed over by a data-fetch collaborator, before
/// normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    /// Calendar date without a zone; taken to be in the anchor zone already.
    Date(NaiveDate),
    /// Wall-clock time without a zone; taken to be in the anchor zone already.
    Naive(NaiveDateTime),
    /// Zone-aware instant; converted into the anchor zone.
    Aware(DateTime<FixedOffset>),
    /// Unparsed text, e.g. from a CSV file.
    Text(String),
}

impl From<NaiveDate> for RawTimestamp {
    fn from(date: NaiveDate) -> Self {
        RawTimestamp::Date(date)
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        RawTimestamp::Aware(dt.fixed_offset())
    }
}

/// Parse date/time text into a [`RawTimestamp`].
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and
/// `YYYY-MM-DD`.
pub fn parse_timestamp(input: &str) -> Result<RawTimestamp, SnapshotError> {
    let s = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(RawTimestamp::Aware(dt));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(RawTimestamp::Naive(naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(RawTimestamp::Date(date));
    }

    Err(SnapshotError::InvalidDate(input.to_string()))
}

/// Parse an IANA timezone identifier.
pub fn parse_timezone(id: &str) -> Result<Tz, SnapshotError> {
    id.trim()
        .parse::<Tz>()
        .map_err(|_| SnapshotError::Config(format!("unknown timezone '{}'", id)))
}

/// First calendar day of the quarter containing `date`.
pub fn quarter_start(date: NaiveDate) -> NaiveDate {
    let quarter = (date.month() - 1) / 3 + 1;
    let month = 3 * (quarter - 1) + 1;
    // Day 1 of months 1, 4, 7 and 10 always exists.
    date.with_day(1)
        .and_then(|d| d.with_month(month))
        .unwrap_or(date)
}

/// First calendar day of the year containing `date`.
pub fn year_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).and_then(|d| d.with_month(1)).unwrap_or(date)
}

/// The shared "as of" reference for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeAnchor {
    today: NaiveDate,
    tz: Tz,
}

impl TimeAnchor {
    pub fn new(today: NaiveDate, tz: Tz) -> Self {
        Self { today, tz }
    }

    /// Anchor on the current date as seen in `tz`.
    pub fn now_in(tz: Tz) -> Self {
        let today = Utc::now().with_timezone(&tz).date_naive();
        Self { today, tz }
    }

    /// Anchor on a user-supplied date string, normalized into `tz`.
    pub fn parse_as_of(input: &str, tz: Tz) -> Result<Self, SnapshotError> {
        let raw = parse_timestamp(input)?;
        let today = Self::new(NaiveDate::default(), tz)
            .normalize(&raw)?
            .date_naive();
        Ok(Self { today, tz })
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Convert a raw timestamp into the anchor zone.
    ///
    /// Naive values are reinterpreted as local to the anchor zone; zone-aware
    /// values are converted, keeping the instant.
    pub fn normalize(&self, ts: &RawTimestamp) -> Result<DateTime<Tz>, SnapshotError> {
        match ts {
            RawTimestamp::Date(date) => Ok(self.start_of_day(*date)),
            RawTimestamp::Naive(naive) => self.localize(naive),
            RawTimestamp::Aware(dt) => Ok(dt.with_timezone(&self.tz)),
            RawTimestamp::Text(text) => self.normalize(&parse_timestamp(text)?),
        }
    }

    /// Normalize and truncate to start-of-day; used for daily price points.
    pub fn normalize_day(&self, ts: &RawTimestamp) -> Result<DateTime<Tz>, SnapshotError> {
        let dt = self.normalize(ts)?;
        Ok(self.start_of_day(dt.date_naive()))
    }

    /// Midnight of `date` in the anchor zone, or the first valid instant of
    /// that day when midnight falls into a DST gap.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Tz> {
        let midnight = date.and_time(NaiveTime::MIN);
        match self.tz.from_local_datetime(&midnight) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => (1..=3)
                .filter_map(|h| {
                    self.tz
                        .from_local_datetime(&(midnight + chrono::Duration::hours(h)))
                        .earliest()
                })
                .next()
                .unwrap_or_else(|| self.tz.from_utc_datetime(&midnight)),
        }
    }

    /// Reference dates for every [`ReturnPeriod`], start-of-day in the
    /// anchor zone.
    pub fn reference_dates(&self) -> Result<AnchorDates, SnapshotError> {
        ReturnPeriod::ALL
            .iter()
            .map(|&period| {
                let date = self.reference_date(period)?;
                Ok((period, self.start_of_day(date)))
            })
            .collect()
    }

    /// Calendar date used as the lookback reference for `period`.
    pub fn reference_date(&self, period: ReturnPeriod) -> Result<NaiveDate, SnapshotError> {
        match period.calendar_offset_days() {
            Some(days) => self.today.checked_sub_days(Days::new(days)).ok_or_else(|| {
                SnapshotError::InvalidDate(format!("{} minus {} days", self.today, days))
            }),
            None => match period {
                ReturnPeriod::QuarterToDate => Ok(quarter_start(self.today)),
                _ => Ok(year_start(self.today)),
            },
        }
    }

    fn localize(&self, naive: &NaiveDateTime) -> Result<DateTime<Tz>, SnapshotError> {
        match self.tz.from_local_datetime(naive) {
            LocalResult::Single(dt) => Ok(dt),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest),
            // Inside a DST gap: the wall-clock time does not exist, so the
            // day is all that matters for daily data.
            LocalResult::None => Ok(self.start_of_day(naive.date())),
        }
    }
}
