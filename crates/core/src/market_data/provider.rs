use crate::domain::{
    BenchmarkIndex, DailyBar, FundamentalRow, InvestorCategory, ListingRow, Market,
    NetPurchaseRow, SectorIndexMembers,
};
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashMap;

/// One upstream market-data service.
///
/// Every method returns rows already normalized into the canonical domain
/// types. Operations a source cannot serve fail with an "unsupported" error,
/// which the gateway treats like any other fetch fault.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn index_bars(
        &self,
        index: BenchmarkIndex,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>> {
        let _ = (index, start, end);
        Err(unsupported(self.source_name(), "index_bars"))
    }

    async fn price_bars(
        &self,
        ticker: &str,
        market: Market,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>> {
        let _ = (ticker, market, start, end);
        Err(unsupported(self.source_name(), "price_bars"))
    }

    async fn net_purchases(
        &self,
        date: NaiveDate,
        market: Market,
        investor: InvestorCategory,
    ) -> Result<Vec<NetPurchaseRow>> {
        let _ = (date, market, investor);
        Err(unsupported(self.source_name(), "net_purchases"))
    }

    /// Daily change % for every listed ticker.
    async fn daily_changes(&self, date: NaiveDate, market: Market) -> Result<HashMap<String, f64>> {
        let _ = (date, market);
        Err(unsupported(self.source_name(), "daily_changes"))
    }

    async fn fundamentals(
        &self,
        date: NaiveDate,
        market: Market,
    ) -> Result<HashMap<String, FundamentalRow>> {
        let _ = (date, market);
        Err(unsupported(self.source_name(), "fundamentals"))
    }

    /// Combined name + sector listing.
    async fn listings(&self, market: Market) -> Result<Vec<ListingRow>> {
        let _ = market;
        Err(unsupported(self.source_name(), "listings"))
    }

    async fn sector_index_members(
        &self,
        date: NaiveDate,
        market: Market,
    ) -> Result<Vec<SectorIndexMembers>> {
        let _ = (date, market);
        Err(unsupported(self.source_name(), "sector_index_members"))
    }
}

fn unsupported(source: &str, op: &str) -> anyhow::Error {
    anyhow::anyhow!("{source} does not support {op}")
}
