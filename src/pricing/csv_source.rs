//! Offline price source: one `<symbol>.csv` file per instrument.
//!
//! Files carry a `date,close` header. Dates are passed through as text and
//! normalized by the snapshot builder, so any format the anchor understands
//! is accepted. Empty closes are skipped as provider gaps.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use super::PriceSource;
use crate::anchor::RawTimestamp;
use crate::series::RawPoint;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "Date", alias = "DATE")]
    date: String,
    #[serde(alias = "Close", alias = "CLOSE")]
    close: String,
}

/// Reads daily closes from a directory of CSV files.
#[derive(Debug, Clone)]
pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File that holds `symbol`; path separators in the symbol are replaced.
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        let file_name: String = symbol
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.csv", file_name))
    }
}

/// Parse `date,close` rows from any reader.
pub fn read_points<R: std::io::Read>(reader: R, origin: &Path) -> Result<Vec<RawPoint>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut points = Vec::new();
    for (line, row) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = row.with_context(|| format!("Malformed row {} in {:?}", line + 2, origin))?;
        if row.close.is_empty() {
            continue;
        }
        match Decimal::from_str(&row.close) {
            Ok(close) => points.push(RawPoint {
                timestamp: RawTimestamp::Text(row.date),
                close,
            }),
            Err(_) => warn!(
                "Skipping unparseable close '{}' at row {} in {:?}",
                row.close,
                line + 2,
                origin
            ),
        }
    }
    Ok(points)
}

#[async_trait]
impl PriceSource for CsvSource {
    fn name(&self) -> &str {
        "CSV files"
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<RawPoint>> {
        let path = self.path_for(symbol);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read price file {:?}", path))?;
        let points = read_points(bytes.as_slice(), &path)?;
        debug!("Read {} prices for {} from {:?}", points.len(), symbol, path);
        Ok(points)
    }
}
