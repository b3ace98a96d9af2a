use crate::config::Settings;
use crate::domain::{
    BenchmarkIndex, FlowRow, FlowSnapshot, FundamentalSnapshot, InvestorCategory, Market,
    PriceSeries, SectorIndexMembers, SectorMap,
};
use crate::market_data::cache::{CacheTtls, TtlCache};
use crate::market_data::fetched::Fetched;
use crate::market_data::global::GlobalSource;
use crate::market_data::krx::KrxSource;
use crate::market_data::provider::MarketDataSource;
use crate::signal::targets::round_to;
use crate::time::kr_market::{
    probe_candidates, session_anchor, unverified_fallback, SESSION_PROBE_DAYS,
};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

type PriceKey = (String, Market, NaiveDate, NaiveDate);

/// Fault-tolerant access to market data with primary/secondary fallback.
///
/// Every fetch returns a [`Fetched`] instead of an error; successful results
/// are cached per data kind until their TTL lapses or [`invalidate_all`] is
/// called.
///
/// [`invalidate_all`]: MarketDataGateway::invalidate_all
pub struct MarketDataGateway {
    primary: Arc<dyn MarketDataSource>,
    secondary: Arc<dyn MarketDataSource>,
    sessions: TtlCache<NaiveDate, NaiveDate>,
    prices: TtlCache<PriceKey, PriceSeries>,
    flows: TtlCache<(NaiveDate, Market, InvestorCategory), Arc<FlowSnapshot>>,
    fundamentals: TtlCache<(NaiveDate, Market), Arc<FundamentalSnapshot>>,
    sectors: TtlCache<Market, Arc<SectorMap>>,
    changes: TtlCache<(NaiveDate, Market), Arc<HashMap<String, f64>>>,
    // Serialise cold fills of the enrichment caches shared by every flow fetch.
    sector_fill: Mutex<()>,
    changes_fill: Mutex<()>,
}

impl MarketDataGateway {
    pub fn new(
        primary: Arc<dyn MarketDataSource>,
        secondary: Arc<dyn MarketDataSource>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            primary,
            secondary,
            sessions: TtlCache::new(ttls.session),
            prices: TtlCache::new(ttls.prices),
            flows: TtlCache::new(ttls.flows),
            fundamentals: TtlCache::new(ttls.fundamentals),
            sectors: TtlCache::new(ttls.sectors),
            changes: TtlCache::new(ttls.flows),
            sector_fill: Mutex::new(()),
            changes_fill: Mutex::new(()),
        }
    }

    /// KRX + Naver as primary, Yahoo + KIND as secondary.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            Arc::new(KrxSource::from_settings(settings)?),
            Arc::new(GlobalSource::from_settings(settings)?),
            CacheTtls::from_env(),
        ))
    }

    pub fn invalidate_all(&self) {
        self.sessions.invalidate_all();
        self.prices.invalidate_all();
        self.flows.invalidate_all();
        self.fundamentals.invalidate_all();
        self.sectors.invalidate_all();
        self.changes.invalidate_all();
    }

    async fn with_fallback<T>(
        &self,
        what: &str,
        primary: impl Future<Output = Result<T>>,
        secondary: impl Future<Output = Result<T>>,
        is_empty: impl Fn(&T) -> bool,
    ) -> Fetched<T> {
        let first = classify(self.primary.source_name(), what, primary.await, &is_empty);
        if first.is_data() {
            return first;
        }
        let second = classify(self.secondary.source_name(), what, secondary.await, &is_empty);
        first.or(second)
    }

    /// Latest session with verifiable benchmark data, probing backwards from `now`.
    ///
    /// When no probe succeeds the previous weekday is returned unverified.
    pub async fn resolve_latest_session(&self, now: DateTime<Utc>) -> NaiveDate {
        let anchor = session_anchor(now);
        if let Some(day) = self.sessions.get(&anchor) {
            return day;
        }

        for day in probe_candidates(anchor, SESSION_PROBE_DAYS) {
            let probe = self
                .with_fallback(
                    "benchmark index",
                    self.primary.index_bars(BenchmarkIndex::Kospi, day, day),
                    self.secondary.index_bars(BenchmarkIndex::Kospi, day, day),
                    Vec::is_empty,
                )
                .await;
            match probe {
                Fetched::Data(_) => {
                    tracing::info!(%day, %anchor, "resolved latest session");
                    self.sessions.insert(anchor, day);
                    return day;
                }
                Fetched::Empty => tracing::debug!(%day, "no benchmark bars; probing earlier day"),
                Fetched::Failed(err) => {
                    tracing::debug!(%day, error = %err, "benchmark probe failed; probing earlier day")
                }
            }
        }

        let fallback = unverified_fallback(now);
        tracing::warn!(%fallback, %anchor, "no session verified; using unverified fallback");
        fallback
    }

    pub async fn fetch_price_series(
        &self,
        ticker: &str,
        market: Market,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Fetched<PriceSeries> {
        let key = (ticker.to_string(), market, start, end);
        if let Some(series) = self.prices.get(&key) {
            return Fetched::Data(series);
        }

        let fetched = self
            .with_fallback(
                "price bars",
                self.primary.price_bars(ticker, market, start, end),
                self.secondary.price_bars(ticker, market, start, end),
                Vec::is_empty,
            )
            .await
            .map(|bars| PriceSeries::new(ticker, bars));

        if let Fetched::Data(series) = &fetched {
            self.prices.insert(key, series.clone());
        }
        fetched
    }

    pub async fn fetch_daily_changes(
        &self,
        date: NaiveDate,
        market: Market,
    ) -> Fetched<Arc<HashMap<String, f64>>> {
        let key = (date, market);
        if let Some(changes) = self.changes.get(&key) {
            return Fetched::Data(changes);
        }
        let _fill = self.changes_fill.lock().await;
        if let Some(changes) = self.changes.get(&key) {
            return Fetched::Data(changes);
        }

        let fetched = self
            .with_fallback(
                "daily changes",
                self.primary.daily_changes(date, market),
                self.secondary.daily_changes(date, market),
                HashMap::is_empty,
            )
            .await
            .map(Arc::new);

        if let Fetched::Data(changes) = &fetched {
            self.changes.insert(key, Arc::clone(changes));
        }
        fetched
    }

    /// Net purchases for one investor slice, joined with change % and sector.
    ///
    /// Missing change % reads 0 and a missing sector reads as unclassified.
    pub async fn fetch_flow_snapshot(
        &self,
        date: NaiveDate,
        market: Market,
        investor: InvestorCategory,
    ) -> Fetched<Arc<FlowSnapshot>> {
        let key = (date, market, investor);
        if let Some(snapshot) = self.flows.get(&key) {
            return Fetched::Data(snapshot);
        }

        let raw = self
            .with_fallback(
                "net purchases",
                self.primary.net_purchases(date, market, investor),
                self.secondary.net_purchases(date, market, investor),
                Vec::is_empty,
            )
            .await;
        let rows = match raw {
            Fetched::Data(rows) => rows,
            Fetched::Empty => return Fetched::Empty,
            Fetched::Failed(err) => {
                tracing::warn!(%date, %investor, error = %err, "net purchase fetch failed");
                return Fetched::Failed(err);
            }
        };

        let changes = self.fetch_daily_changes(date, market).await.data_or_default();
        let sectors = self.fetch_sector_map(date, market).await.data_or_default();

        let rows = rows
            .into_iter()
            .map(|r| FlowRow {
                sector: sectors.sector(&r.ticker).to_string(),
                change_pct: changes.get(&r.ticker).copied().unwrap_or(0.0),
                net_value_100m: round_to(r.net_value / 1e8, 1),
                ticker: r.ticker,
                name: r.name,
                net_volume: r.net_volume,
                net_value: r.net_value,
            })
            .collect();

        let snapshot = Arc::new(FlowSnapshot::new(date, market, investor, rows));
        self.flows.insert(key, Arc::clone(&snapshot));
        Fetched::Data(snapshot)
    }

    pub async fn fetch_fundamental_snapshot(
        &self,
        date: NaiveDate,
        market: Market,
    ) -> Fetched<Arc<FundamentalSnapshot>> {
        let key = (date, market);
        if let Some(snapshot) = self.fundamentals.get(&key) {
            return Fetched::Data(snapshot);
        }

        let fetched = self
            .with_fallback(
                "fundamentals",
                self.primary.fundamentals(date, market),
                self.secondary.fundamentals(date, market),
                HashMap::is_empty,
            )
            .await
            .map(|rows| {
                Arc::new(FundamentalSnapshot {
                    as_of_date: date,
                    market,
                    rows,
                })
            });

        if let Fetched::Data(snapshot) = &fetched {
            self.fundamentals.insert(key, Arc::clone(snapshot));
        }
        fetched
    }

    /// Name + sector listing, else a sector map rebuilt from index membership.
    ///
    /// The rebuilt map is imprecise: a ticker in several indices keeps the
    /// label of the last index scanned.
    pub async fn fetch_sector_map(&self, date: NaiveDate, market: Market) -> Fetched<Arc<SectorMap>> {
        if let Some(map) = self.sectors.get(&market) {
            return Fetched::Data(map);
        }
        let _fill = self.sector_fill.lock().await;
        if let Some(map) = self.sectors.get(&market) {
            return Fetched::Data(map);
        }

        let listing = self
            .with_fallback(
                "listings",
                self.primary.listings(market),
                self.secondary.listings(market),
                Vec::is_empty,
            )
            .await
            .map(SectorMap::from_listings);

        let fetched = if listing.is_data() {
            listing
        } else {
            tracing::info!(%market, "listing unavailable; rebuilding sectors from index membership");
            let members = self
                .with_fallback(
                    "sector index members",
                    self.primary.sector_index_members(date, market),
                    self.secondary.sector_index_members(date, market),
                    |groups: &Vec<SectorIndexMembers>| groups.iter().all(|g| g.tickers.is_empty()),
                )
                .await
                .map(SectorMap::from_index_members);
            listing.or(members)
        };

        let fetched = fetched.map(Arc::new);
        if let Fetched::Data(map) = &fetched {
            self.sectors.insert(market, Arc::clone(map));
        }
        fetched
    }
}

fn classify<T>(
    source: &str,
    what: &str,
    res: Result<T>,
    is_empty: impl FnOnce(&T) -> bool,
) -> Fetched<T> {
    let fetched = Fetched::from_result(res, is_empty);
    if let Fetched::Failed(err) = &fetched {
        tracing::debug!(source, what, error = %err, "market data fetch failed");
    }
    fetched
}
