//! Secondary source: Yahoo charts for OHLCV and the KIND listing for
//! names and industries.

use crate::config::Settings;
use crate::domain::{BenchmarkIndex, DailyBar, ListingRow, Market};
use crate::market_data::http::HttpFetcher;
use crate::market_data::normalize::within;
use crate::market_data::provider::MarketDataSource;
use crate::market_data::{kind, yahoo};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct GlobalSource {
    http: HttpFetcher,
    yahoo_base_url: String,
    kind_base_url: String,
}

impl GlobalSource {
    pub fn new(http: HttpFetcher, yahoo_base_url: &str, kind_base_url: &str) -> Self {
        Self {
            http,
            yahoo_base_url: yahoo_base_url.to_string(),
            kind_base_url: kind_base_url.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            HttpFetcher::from_settings(settings)?,
            settings
                .yahoo_chart_base_url
                .as_deref()
                .unwrap_or(yahoo::DEFAULT_BASE_URL),
            settings.kind_base_url.as_deref().unwrap_or(kind::DEFAULT_BASE_URL),
        ))
    }

    async fn chart(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyBar>> {
        let url = yahoo::chart_url(&self.yahoo_base_url, symbol);
        let (p1, p2) = yahoo::period_bounds(start, end);
        let (p1, p2) = (p1.to_string(), p2.to_string());
        let text = self
            .http
            .text("yahoo chart", |c| {
                c.get(url.as_str()).query(&[
                    ("period1", p1.as_str()),
                    ("period2", p2.as_str()),
                    ("interval", "1d"),
                ])
            })
            .await?;
        let body: Value = serde_json::from_str(&text)
            .with_context(|| format!("yahoo chart for {symbol} is not JSON"))?;
        let bars = yahoo::parse_chart(&body).with_context(|| format!("symbol {symbol}"))?;
        Ok(within(bars, start, end))
    }
}

#[async_trait::async_trait]
impl MarketDataSource for GlobalSource {
    fn source_name(&self) -> &'static str {
        "global"
    }

    async fn index_bars(
        &self,
        index: BenchmarkIndex,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>> {
        self.chart(index.yahoo_symbol(), start, end).await
    }

    async fn price_bars(
        &self,
        ticker: &str,
        market: Market,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>> {
        let symbol = format!("{ticker}{}", market.yahoo_suffix());
        self.chart(&symbol, start, end).await
    }

    async fn listings(&self, market: Market) -> Result<Vec<ListingRow>> {
        let url = kind::listing_url(&self.kind_base_url);
        let bytes = self
            .http
            .bytes("KIND listing", |c| {
                c.get(url.as_str()).query(&[
                    ("method", "download"),
                    ("searchType", "13"),
                    ("marketType", kind::market_type(market)),
                ])
            })
            .await?;
        kind::parse_listing(&kind::decode_euc_kr(&bytes))
    }
}
