//! CSV and JSON export of a snapshot.
//!
//! The CSV starts with a UTF-8 byte order mark so spreadsheet tools pick the
//! right encoding. Columns are fixed: `instrument,symbol,latest_close` then
//! one column per return period. Undefined values are empty cells.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::returns::ReturnPeriod;
use crate::snapshot::{Snapshot, SnapshotReport};
use crate::utils::format_pct_plain;

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// `market_snapshot_YYYYMMDD.csv`
pub fn default_csv_name(as_of: NaiveDate) -> String {
    format!("market_snapshot_{}.csv", as_of.format("%Y%m%d"))
}

pub fn csv_header() -> Vec<&'static str> {
    let mut header = vec!["instrument", "symbol", "latest_close"];
    header.extend(ReturnPeriod::ALL.iter().map(|p| p.label()));
    header
}

/// Write the snapshot rows, BOM first.
pub fn write_csv<W: Write>(mut writer: W, snapshot: &Snapshot) -> Result<()> {
    writer.write_all(UTF8_BOM)?;

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(csv_header())?;
    for record in &snapshot.records {
        let mut row = vec![
            record.instrument.clone(),
            record.symbol.clone(),
            record.latest_close.map(|c| c.to_string()).unwrap_or_default(),
        ];
        row.extend(
            ReturnPeriod::ALL
                .iter()
                .map(|&p| format_pct_plain(record.get(p))),
        );
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_csv(path: &Path, snapshot: &Snapshot) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    write_csv(BufWriter::new(file), snapshot)
        .with_context(|| format!("Failed to write CSV export {:?}", path))?;
    info!("Exported {} rows to {:?}", snapshot.records.len(), path);
    Ok(())
}

/// Snapshot plus warnings as pretty JSON.
pub fn export_json(path: &Path, report: &SnapshotReport) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_vec_pretty(report)?;
    fs::write(path, json).with_context(|| format!("Failed to write JSON export {:?}", path))?;
    info!("Exported snapshot JSON to {:?}", path);
    Ok(())
}

/// Where the CSV goes when no explicit path is given.
pub fn default_csv_path(output_dir: &Path, as_of: NaiveDate) -> PathBuf {
    output_dir.join(default_csv_name(as_of))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::PeriodReturns;
    use crate::snapshot::ReturnRecord;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn snapshot() -> Snapshot {
        let mut gold = PeriodReturns::new();
        for p in ReturnPeriod::ALL {
            gold.insert(p, None);
        }
        gold.insert(ReturnPeriod::OneDay, Some(dec!(4.76)));
        gold.insert(ReturnPeriod::YearToDate, Some(dec!(-10)));

        let empty: PeriodReturns = ReturnPeriod::ALL.iter().map(|&p| (p, None)).collect();

        Snapshot {
            generated_at: Utc::now(),
            as_of: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            timezone: "America/New_York".to_string(),
            records: vec![
                ReturnRecord {
                    instrument: "Gold".to_string(),
                    symbol: "GC=F".to_string(),
                    latest_close: Some(dec!(2050.1)),
                    latest_date: NaiveDate::from_ymd_opt(2024, 1, 3),
                    returns: gold,
                },
                ReturnRecord {
                    instrument: "S&P 500, total".to_string(),
                    symbol: "^GSPC".to_string(),
                    latest_close: None,
                    latest_date: None,
                    returns: empty,
                },
            ],
        }
    }

    #[test]
    fn test_default_csv_name() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(default_csv_name(d), "market_snapshot_20240305.csv");
    }

    #[test]
    fn test_write_csv_layout() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &snapshot()).unwrap();

        assert!(buf.starts_with(UTF8_BOM));
        let text = String::from_utf8(buf[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "instrument,symbol,latest_close,1D,1W,1M,1Y,QTD,YTD");
        assert_eq!(lines[1], "Gold,GC=F,2050.1,4.76,,,,,-10.00");
        // Names with commas are quoted, missing values stay empty.
        assert_eq!(lines[2], "\"S&P 500, total\",^GSPC,,,,,,,");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_export_files() {
        let dir = TempDir::new().unwrap();
        let snap = snapshot();
        let csv_path = default_csv_path(&dir.path().join("out"), snap.as_of);
        export_csv(&csv_path, &snap).unwrap();
        assert!(csv_path.ends_with("out/market_snapshot_20240103.csv"));

        let json_path = dir.path().join("snap.json");
        let report = SnapshotReport {
            snapshot: snap,
            warnings: Vec::new(),
        };
        export_json(&json_path, &report).unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&json_path).unwrap()).unwrap();
        assert_eq!(value["snapshot"]["records"][0]["returns"]["1D"], "4.76");
        assert!(value["snapshot"]["records"][1]["returns"]["1D"].is_null());
    }
}
