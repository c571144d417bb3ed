//! Output formatting module for CLI display
//!
//! Data calculation lives in the library modules; this file only turns
//! snapshots and anchors into terminal text.

use chrono::SecondsFormat;
use colored::Colorize;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::anchor::{AnchorDates, TimeAnchor};
use crate::config::Config;
use crate::returns::ReturnPeriod;
use crate::snapshot::{order_by_priority, InstrumentWarning, ReturnRecord, SnapshotReport};
use crate::utils::{format_pct_cell, format_price, NOT_AVAILABLE};

/// Percentage at which the heatmap colour is fully saturated.
const SATURATION_PCT: f64 = 10.0;

/// Colour intensity in [-1, 1]: sign gives direction, magnitude the shade.
pub fn intensity(value: Decimal) -> f64 {
    let pct = value.to_f64().unwrap_or(0.0);
    (pct / SATURATION_PCT).clamp(-1.0, 1.0)
}

/// Background colour for an intensity: green for gains, red for losses,
/// darker shades for small moves.
pub fn heat_rgb(intensity: f64) -> (u8, u8, u8) {
    let level = (60.0 + 150.0 * intensity.abs()).round() as u8;
    if intensity > 0.0 {
        (0, level, 0)
    } else if intensity < 0.0 {
        (level, 0, 0)
    } else {
        (60, 60, 60)
    }
}

fn heat_cell(value: Option<Decimal>) -> String {
    match value {
        Some(v) if v.is_zero() => format_pct_cell(Some(v)),
        Some(v) => {
            let (r, g, b) = heat_rgb(intensity(v));
            format!(" {} ", format_pct_cell(Some(v)))
                .white()
                .on_truecolor(r, g, b)
                .to_string()
        }
        None => NOT_AVAILABLE.bright_black().to_string(),
    }
}

#[derive(Tabled)]
struct HeatRow {
    #[tabled(rename = "Instrument")]
    instrument: String,
    #[tabled(rename = "Last")]
    last: String,
    #[tabled(rename = "1D")]
    one_day: String,
    #[tabled(rename = "1W")]
    one_week: String,
    #[tabled(rename = "1M")]
    one_month: String,
    #[tabled(rename = "1Y")]
    one_year: String,
    #[tabled(rename = "QTD")]
    qtd: String,
    #[tabled(rename = "YTD")]
    ytd: String,
}

impl From<&ReturnRecord> for HeatRow {
    fn from(r: &ReturnRecord) -> Self {
        let cell = |p: ReturnPeriod| heat_cell(r.get(p));
        HeatRow {
            instrument: r.instrument.clone(),
            last: r
                .latest_close
                .map(format_price)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            one_day: cell(ReturnPeriod::OneDay),
            one_week: cell(ReturnPeriod::OneWeek),
            one_month: cell(ReturnPeriod::OneMonth),
            one_year: cell(ReturnPeriod::OneYear),
            qtd: cell(ReturnPeriod::QuarterToDate),
            ytd: cell(ReturnPeriod::YearToDate),
        }
    }
}

/// Heatmap table of every instrument plus header and warnings.
pub fn format_snapshot_table(report: &SnapshotReport) -> String {
    let snap = &report.snapshot;
    let mut output = String::new();

    output.push_str(&format!(
        "\n{} Market snapshot as of {} ({})\n",
        "📊".cyan().bold(),
        snap.as_of.to_string().bold(),
        snap.timezone
    ));
    output.push_str(&format!(
        "{}\n\n",
        format!(
            "Generated {}",
            snap.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
        .bright_black()
    ));

    let rows: Vec<HeatRow> = snap.records.iter().map(HeatRow::from).collect();
    let mut table = Table::new(&rows);
    table.with(Style::modern());
    table.modify(Columns::new(1..), Alignment::right());
    output.push_str(&table.to_string());
    output.push('\n');

    if !report.warnings.is_empty() {
        output.push_str(&format_warnings(&report.warnings));
    }
    output
}

pub fn format_warnings(warnings: &[InstrumentWarning]) -> String {
    let mut output = format!(
        "\n{} {} instrument warning(s):\n",
        "⚠".yellow().bold(),
        warnings.len()
    );
    for w in warnings {
        output.push_str(&format!("  - {}\n", w));
    }
    output
}

/// Reference date for each period, as the return calculator will use it.
pub fn format_anchor_table(anchor: &TimeAnchor, dates: &AnchorDates) -> String {
    #[derive(Tabled)]
    struct AnchorRow {
        #[tabled(rename = "Period")]
        period: String,
        #[tabled(rename = "Reference")]
        reference: String,
    }

    let rows: Vec<AnchorRow> = dates
        .iter()
        .map(|(period, at)| AnchorRow {
            period: period.label().to_string(),
            reference: at.format("%Y-%m-%d %a").to_string(),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());

    format!(
        "\n{} Reference dates for {} ({})\n\n{}\n",
        "📅".cyan().bold(),
        anchor.today().to_string().bold(),
        anchor.timezone().name(),
        table
    )
}

pub fn format_instruments_table(config: &Config) -> String {
    #[derive(Tabled)]
    struct InstrumentRow {
        #[tabled(rename = "#")]
        position: usize,
        #[tabled(rename = "Instrument")]
        name: String,
        #[tabled(rename = "Symbol")]
        symbol: String,
        #[tabled(rename = "Priority")]
        priority: String,
    }

    let mut instruments = config.instruments.clone();
    order_by_priority(&mut instruments, &config.priority, |i| i.name.as_str());

    let rows: Vec<InstrumentRow> = instruments
        .iter()
        .enumerate()
        .map(|(i, inst)| InstrumentRow {
            position: i + 1,
            name: inst.name.clone(),
            symbol: inst.symbol.clone(),
            priority: config
                .priority
                .iter()
                .position(|p| p == &inst.name)
                .map(|p| (p + 1).to_string())
                .unwrap_or_default(),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    format!("{}\n", table)
}

/// Pretty JSON for `--json`.
pub fn format_report_json(report: &SnapshotReport) -> String {
    serde_json::to_string_pretty(report)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::parse_timezone;
    use crate::returns::PeriodReturns;
    use crate::snapshot::{FetchFailure, Snapshot};
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn report() -> SnapshotReport {
        let mut returns: PeriodReturns = ReturnPeriod::ALL.iter().map(|&p| (p, None)).collect();
        returns.insert(ReturnPeriod::OneDay, Some(dec!(4.76)));
        returns.insert(ReturnPeriod::YearToDate, Some(dec!(-12.5)));
        SnapshotReport {
            snapshot: Snapshot {
                generated_at: Utc::now(),
                as_of: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                timezone: "America/New_York".to_string(),
                records: vec![ReturnRecord {
                    instrument: "Gold".to_string(),
                    symbol: "GC=F".to_string(),
                    latest_close: Some(dec!(2050.1)),
                    latest_date: NaiveDate::from_ymd_opt(2024, 1, 3),
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

    #[test]
    fn test_intensity_saturates() {
        assert_eq!(intensity(dec!(0)), 0.0);
        assert_eq!(intensity(dec!(5)), 0.5);
        assert_eq!(intensity(dec!(-2.5)), -0.25);
        assert_eq!(intensity(dec!(25)), 1.0);
        assert_eq!(intensity(dec!(-80)), -1.0);
    }

    #[test]
    fn test_heat_rgb_direction() {
        let (r, g, _) = heat_rgb(0.5);
        assert!(g > r);
        let (r, g, _) = heat_rgb(-1.0);
        assert!(r > g);
        assert_eq!(heat_rgb(-1.0).0, 210);
        assert_eq!(heat_rgb(0.0), (60, 60, 60));
        // Stronger moves get brighter shades.
        assert!(heat_rgb(0.9).1 > heat_rgb(0.1).1);
    }

    #[test]
    fn test_snapshot_table_contents() {
        let text = format_snapshot_table(&report());
        assert!(text.contains("2024-01-03"));
        assert!(text.contains("Gold"));
        assert!(text.contains("2,050.10"));
        assert!(text.contains("+4.76%"));
        assert!(text.contains("-12.50%"));
        assert!(text.contains("N/A"));
        assert!(text.contains("VIX (^VIX): no price data"));
    }

    #[test]
    fn test_anchor_table() {
        let tz = parse_timezone("America/New_York").unwrap();
        let anchor = TimeAnchor::new(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), tz);
        let text = format_anchor_table(&anchor, &anchor.reference_dates().unwrap());
        assert!(text.contains("QTD"));
        assert!(text.contains("2024-01-01 Mon"));
        assert!(text.contains("2023-03-16"));
    }

    #[test]
    fn test_instruments_table_in_display_order() {
        let text = format_instruments_table(&Config::default());
        assert!(text.contains("US Dollar Index"));
        assert!(text.contains("000300.SS"));
        // Display order: prioritized names first, the rest in configured order.
        let pos = |name: &str| text.find(name).unwrap();
        assert!(pos("US Dollar Index") < pos("10Y Treasury Yield"));
        assert!(pos("Bitcoin") < pos("13W Treasury Yield"));
        assert!(pos("13W Treasury Yield") < pos("SSE Composite"));
    }

    #[test]
    fn test_report_json_is_valid() {
        let json = format_report_json(&report());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["warnings"][0]["failure"]["kind"], "empty");
    }
}
