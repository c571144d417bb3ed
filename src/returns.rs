//! Per-period percentage change for one instrument.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::anchor::AnchorDates;
use crate::series::PriceSeriesStore;

/// Decimal places kept on every percentage.
pub const PCT_DECIMALS: u32 = 2;

/// Lookback windows, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReturnPeriod {
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "1Y")]
    OneYear,
    #[serde(rename = "QTD")]
    QuarterToDate,
    #[serde(rename = "YTD")]
    YearToDate,
}

impl ReturnPeriod {
    pub const ALL: [ReturnPeriod; 6] = [
        ReturnPeriod::OneDay,
        ReturnPeriod::OneWeek,
        ReturnPeriod::OneMonth,
        ReturnPeriod::OneYear,
        ReturnPeriod::QuarterToDate,
        ReturnPeriod::YearToDate,
    ];

    /// Column label used in tables and CSV headers.
    pub fn label(&self) -> &'static str {
        match self {
            ReturnPeriod::OneDay => "1D",
            ReturnPeriod::OneWeek => "1W",
            ReturnPeriod::OneMonth => "1M",
            ReturnPeriod::OneYear => "1Y",
            ReturnPeriod::QuarterToDate => "QTD",
            ReturnPeriod::YearToDate => "YTD",
        }
    }

    /// Calendar days back from today, or `None` for the period-start windows.
    ///
    /// These are calendar days, not trading days.
    pub fn calendar_offset_days(&self) -> Option<u64> {
        match self {
            ReturnPeriod::OneDay => Some(1),
            ReturnPeriod::OneWeek => Some(7),
            ReturnPeriod::OneMonth => Some(30),
            ReturnPeriod::OneYear => Some(365),
            ReturnPeriod::QuarterToDate | ReturnPeriod::YearToDate => None,
        }
    }
}

impl fmt::Display for ReturnPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Percentage change per period; `None` means undefined.
pub type PeriodReturns = BTreeMap<ReturnPeriod, Option<Decimal>>;

/// `(latest / reference - 1) * 100`, rounded to [`PCT_DECIMALS`].
///
/// Undefined when the reference is zero.
pub fn percent_change(latest: Decimal, reference: Decimal) -> Option<Decimal> {
    if reference.is_zero() {
        return None;
    }
    let ratio = latest.checked_div(reference)?;
    let pct = (ratio - Decimal::ONE).checked_mul(Decimal::ONE_HUNDRED)?;
    Some(pct.round_dp_with_strategy(PCT_DECIMALS, RoundingStrategy::MidpointAwayFromZero))
}

/// Compute every period's return for one series against shared anchor dates.
///
/// A series with fewer than two points has no history to compare against and
/// yields undefined for every period. So does a series whose last point is
/// older than every anchor date (a stale feed). Periods missing from
/// `anchor_dates` are undefined as well.
pub fn compute(series: PriceSeriesStore<'_>, anchor_dates: &AnchorDates) -> PeriodReturns {
    let earliest_anchor = anchor_dates.values().min();
    let latest = series
        .latest()
        .filter(|_| series.len() >= 2)
        .filter(|latest| earliest_anchor.map_or(true, |first| latest.timestamp >= *first));

    ReturnPeriod::ALL
        .iter()
        .map(|&period| {
            let value = latest.and_then(|latest| {
                let target = anchor_dates.get(&period)?;
                let reference = series.nearest_on_or_before(target)?;
                percent_change(latest.close, reference.close)
            });
            (period, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{parse_timezone, TimeAnchor};
    use crate::series::{PriceSeries, RawPoint};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup(today: NaiveDate, points: &[(NaiveDate, Decimal)]) -> (PriceSeries, AnchorDates) {
        let anchor = TimeAnchor::new(today, parse_timezone("America/New_York").unwrap());
        let raw = points.iter().map(|&(d, c)| RawPoint::new(d, c)).collect();
        let (series, _) = PriceSeries::from_raw(raw, &anchor);
        (series, anchor.reference_dates().unwrap())
    }

    #[test]
    fn test_one_day_example() {
        let (series, refs) = setup(
            date(2024, 1, 3),
            &[
                (date(2024, 1, 1), dec!(100)),
                (date(2024, 1, 2), dec!(105)),
                (date(2024, 1, 3), dec!(110)),
            ],
        );
        let out = compute(series.store(), &refs);

        assert_eq!(out[&ReturnPeriod::OneDay], Some(dec!(4.76)));
        // QTD and YTD both anchor on Jan 1.
        assert_eq!(out[&ReturnPeriod::QuarterToDate], Some(dec!(10.00)));
        assert_eq!(out[&ReturnPeriod::YearToDate], Some(dec!(10.00)));
        // Nothing on or before Dec 27.
        assert_eq!(out[&ReturnPeriod::OneWeek], None);
        assert_eq!(out[&ReturnPeriod::OneYear], None);
    }

    #[test]
    fn test_single_point_is_all_undefined() {
        let (series, refs) = setup(date(2024, 1, 1), &[(date(2024, 1, 1), dec!(100))]);
        let out = compute(series.store(), &refs);
        assert_eq!(out.len(), ReturnPeriod::ALL.len());
        assert!(out.values().all(Option::is_none));
    }

    #[test]
    fn test_empty_series_is_all_undefined() {
        let (series, refs) = setup(date(2024, 1, 1), &[]);
        assert!(compute(series.store(), &refs).values().all(Option::is_none));
    }

    #[test]
    fn test_series_predating_every_anchor_is_undefined() {
        // Data stopped before the 1Y reference date: nothing to report.
        let (series, refs) = setup(
            date(2024, 6, 10),
            &[(date(2023, 1, 2), dec!(50)), (date(2023, 1, 3), dec!(55))],
        );
        let out = compute(series.store(), &refs);
        assert_eq!(out.len(), 6);
        assert!(out.values().all(Option::is_none));
    }

    #[test]
    fn test_last_point_between_anchors_still_clamps() {
        // Last close 2024-06-05 sits between the 1W (06-03) and 1D (06-09)
        // reference dates.
        let (series, refs) = setup(
            date(2024, 6, 10),
            &[(date(2024, 5, 1), dec!(100)), (date(2024, 6, 5), dec!(110))],
        );
        let out = compute(series.store(), &refs);
        assert_eq!(out[&ReturnPeriod::OneDay], Some(dec!(0.00)));
        assert_eq!(out[&ReturnPeriod::OneWeek], Some(dec!(10.00)));
        assert_eq!(out[&ReturnPeriod::OneMonth], Some(dec!(10.00)));
        assert_eq!(out[&ReturnPeriod::OneYear], None);
    }

    #[test]
    fn test_series_starting_after_every_anchor_is_undefined() {
        let (series, refs) = setup(
            date(2024, 6, 10),
            &[(date(2024, 6, 10), dec!(50)), (date(2024, 6, 10), dec!(51))],
        );
        // Duplicate day collapses to one point.
        assert_eq!(series.len(), 1);
        assert!(compute(series.store(), &refs).values().all(Option::is_none));
    }

    #[test]
    fn test_equal_prices_give_exact_zero() {
        assert_eq!(percent_change(dec!(42.5), dec!(42.5)), Some(Decimal::ZERO));
    }

    #[test]
    fn test_zero_reference_is_undefined() {
        assert_eq!(percent_change(dec!(10), Decimal::ZERO), None);

        let (series, refs) = setup(
            date(2024, 1, 3),
            &[(date(2024, 1, 2), dec!(0)), (date(2024, 1, 3), dec!(10))],
        );
        assert_eq!(compute(series.store(), &refs)[&ReturnPeriod::OneDay], None);
    }

    #[test]
    fn test_negative_change_rounds_away_from_zero() {
        // 99.995 / 100 - 1 = -0.005%
        assert_eq!(percent_change(dec!(99.995), dec!(100)), Some(dec!(-0.01)));
        assert_eq!(percent_change(dec!(90), dec!(100)), Some(dec!(-10.00)));
    }

    #[test]
    fn test_compute_is_deterministic() {
        let (series, refs) = setup(
            date(2024, 5, 20),
            &[
                (date(2024, 1, 2), dec!(10)),
                (date(2024, 4, 1), dec!(11)),
                (date(2024, 5, 17), dec!(12)),
                (date(2024, 5, 20), dec!(12.5)),
            ],
        );
        let first = compute(series.store(), &refs);
        let second = compute(series.store(), &refs);
        assert_eq!(first, second);
        // May 19 is a Sunday: falls back to Friday the 17th.
        assert_eq!(first[&ReturnPeriod::OneDay], Some(dec!(4.17)));
    }

    #[test]
    fn test_missing_anchor_is_undefined() {
        let (series, mut refs) = setup(
            date(2024, 1, 3),
            &[(date(2024, 1, 2), dec!(1)), (date(2024, 1, 3), dec!(2))],
        );
        refs.remove(&ReturnPeriod::OneDay);
        assert_eq!(compute(series.store(), &refs)[&ReturnPeriod::OneDay], None);
    }

    #[test]
    fn test_period_labels_follow_display_order() {
        let labels: Vec<&str> = ReturnPeriod::ALL.iter().map(|p| p.label()).collect();
        assert_eq!(labels, ["1D", "1W", "1M", "1Y", "QTD", "YTD"]);
    }
}
