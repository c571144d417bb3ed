use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::{Client, Url};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::PriceSource;
use crate::series::RawPoint;

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart/";

/// Yahoo Finance chart response
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Meta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(rename = "exchangeTimezoneName")]
    exchange_timezone_name: Option<String>,
    #[serde(rename = "gmtoffset")]
    gmt_offset: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

/// Daily closes from the Yahoo Finance chart API.
pub struct YahooSource {
    client: Client,
    base_url: Url,
}

impl YahooSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(YAHOO_CHART_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; MarketsnapBot/1.0)")
            .timeout(timeout)
            .build()?;
        let base_url = Url::parse(base_url).context("Invalid Yahoo Finance base URL")?;
        Ok(Self { client, base_url })
    }

    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Url> {
        let from_timestamp = start
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("Invalid from date"))?
            .and_utc()
            .timestamp();

        let to_timestamp = end
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| anyhow!("Invalid to date"))?
            .and_utc()
            .timestamp();

        let mut url = self
            .base_url
            .join(symbol)
            .with_context(|| format!("Invalid symbol for URL: {}", symbol))?;
        url.query_pairs_mut()
            .append_pair("period1", &from_timestamp.to_string())
            .append_pair("period2", &to_timestamp.to_string())
            .append_pair("interval", "1d");
        Ok(url)
    }
}

#[async_trait]
impl PriceSource for YahooSource {
    fn name(&self) -> &str {
        "Yahoo Finance"
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawPoint>> {
        info!(
            "Fetching historical prices for {} from {} to {}",
            symbol, start, end
        );

        let url = self.chart_url(symbol, start, end)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request to Yahoo Finance")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Yahoo Finance returned error status: {}",
                response.status()
            ));
        }

        let data: YahooChartResponse = response
            .json()
            .await
            .context("Failed to parse Yahoo Finance response")?;

        let points = parse_chart(data)?;
        debug!("Fetched {} historical prices for {}", points.len(), symbol);
        Ok(points)
    }
}

/// Parse a chart response body into raw points.
pub fn parse_chart_json(body: &str) -> Result<Vec<RawPoint>> {
    let data: YahooChartResponse =
        serde_json::from_str(body).context("Failed to parse Yahoo Finance response")?;
    parse_chart(data)
}

fn parse_chart(data: YahooChartResponse) -> Result<Vec<RawPoint>> {
    if let Some(error) = data.chart.error {
        return Err(anyhow!(
            "Yahoo Finance API error: {} - {}",
            error.code,
            error.description
        ));
    }

    let result = data
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow!("No data returned from Yahoo Finance"))?;

    // No timestamps at all means no trading days in the window.
    let timestamps = result.timestamp.unwrap_or_default();

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .and_then(|q| q.close)
        .unwrap_or_default();

    let exchange = ExchangeZone::from_meta(&result.meta);

    let mut points = Vec::with_capacity(timestamps.len());
    for (i, &timestamp) in timestamps.iter().enumerate() {
        // Null closes are provider gaps (halted days, partial rows).
        let Some(close) = closes.get(i).copied().flatten() else {
            continue;
        };
        let Some(close) = Decimal::from_f64(close) else {
            continue;
        };
        let utc = DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| anyhow!("Invalid timestamp {}", timestamp))?;

        // Bars are keyed by the exchange's trading date and handed over as a
        // zone-less date.
        points.push(RawPoint::new(exchange.trading_date(utc), close.normalize()));
    }

    Ok(points)
}

enum ExchangeZone {
    Named(Tz),
    Offset(FixedOffset),
}

impl ExchangeZone {
    fn from_meta(meta: &Meta) -> Self {
        if let Some(tz) = meta
            .exchange_timezone_name
            .as_deref()
            .and_then(|name| name.parse::<Tz>().ok())
        {
            return ExchangeZone::Named(tz);
        }
        let offset = meta
            .gmt_offset
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        ExchangeZone::Offset(offset)
    }

    fn trading_date(&self, utc: DateTime<Utc>) -> NaiveDate {
        match self {
            ExchangeZone::Named(tz) => tz.from_utc_datetime(&utc.naive_utc()).date_naive(),
            ExchangeZone::Offset(offset) => {
                offset.from_utc_datetime(&utc.naive_utc()).date_naive()
            }
        }
    }
}
