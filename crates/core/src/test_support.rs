use crate::domain::{
    BenchmarkIndex, DailyBar, FundamentalRow, InvestorCategory, ListingRow, Market,
    NetPurchaseRow, SectorIndexMembers,
};
use crate::market_data::MarketDataSource;
use anyhow::Result;
use chrono::{Duration, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One bar per calendar day ending on 2026-02-13, with a 1% band around each close.
pub fn bars_from_closes(closes: &[f64], volume: f64) -> Vec<DailyBar> {
    let end = date(2026, 2, 13);
    let n = closes.len() as i64;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| DailyBar {
            date: end - Duration::days(n - 1 - i as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume,
        })
        .collect()
}

/// In-memory market data source with per-operation switches.
#[derive(Default)]
pub struct FakeSource {
    pub name: &'static str,
    pub fail_all: bool,
    pub index_days: HashSet<NaiveDate>,
    pub prices: HashMap<String, Vec<DailyBar>>,
    pub failing_prices: HashSet<String>,
    pub panicking_prices: HashSet<String>,
    pub flows: HashMap<InvestorCategory, Vec<NetPurchaseRow>>,
    pub changes: HashMap<String, f64>,
    pub fundamentals: HashMap<String, FundamentalRow>,
    pub listings: Option<Vec<ListingRow>>,
    pub index_members: Vec<SectorIndexMembers>,
    pub price_calls: AtomicUsize,
    pub listing_calls: AtomicUsize,
    pub change_calls: AtomicUsize,
    pub failing_flows: HashSet<InvestorCategory>,
}

impl FakeSource {
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    fn check(&self) -> Result<()> {
        if self.fail_all {
            anyhow::bail!("{} is down", self.name);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MarketDataSource for FakeSource {
    fn source_name(&self) -> &'static str {
        self.name
    }

    async fn index_bars(
        &self,
        _index: BenchmarkIndex,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>> {
        self.check()?;
        Ok(self
            .index_days
            .iter()
            .filter(|d| **d >= start && **d <= end)
            .map(|&d| DailyBar {
                date: d,
                open: 2_600.0,
                high: 2_620.0,
                low: 2_590.0,
                close: 2_610.0,
                volume: 1e8,
            })
            .collect())
    }

    async fn price_bars(
        &self,
        ticker: &str,
        _market: Market,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<DailyBar>> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.panicking_prices.contains(ticker) {
            panic!("corrupt payload for {ticker}");
        }
        if self.failing_prices.contains(ticker) {
            anyhow::bail!("{} timed out for {ticker}", self.name);
        }
        Ok(self.prices.get(ticker).cloned().unwrap_or_default())
    }

    async fn net_purchases(
        &self,
        _date: NaiveDate,
        _market: Market,
        investor: InvestorCategory,
    ) -> Result<Vec<NetPurchaseRow>> {
        self.check()?;
        if self.failing_flows.contains(&investor) {
            anyhow::bail!("{} rejected the {investor} query", self.name);
        }
        Ok(self.flows.get(&investor).cloned().unwrap_or_default())
    }

    async fn daily_changes(&self, _date: NaiveDate, _market: Market) -> Result<HashMap<String, f64>> {
        self.change_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.check()?;
        Ok(self.changes.clone())
    }

    async fn fundamentals(
        &self,
        _date: NaiveDate,
        _market: Market,
    ) -> Result<HashMap<String, FundamentalRow>> {
        self.check()?;
        Ok(self.fundamentals.clone())
    }

    async fn listings(&self, _market: Market) -> Result<Vec<ListingRow>> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.check()?;
        self.listings
            .clone()
            .ok_or_else(|| anyhow::anyhow!("{} has no listing", self.name))
    }

    async fn sector_index_members(
        &self,
        _date: NaiveDate,
        _market: Market,
    ) -> Result<Vec<SectorIndexMembers>> {
        self.check()?;
        Ok(self.index_members.clone())
    }
}
