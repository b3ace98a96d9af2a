use crate::domain::{
    FlowSnapshot, FundamentalSnapshot, InvestorCategory, Market, SectorMap, TickerScoreRecord,
};
use crate::market_data::{Fetched, MarketDataGateway};
use crate::screening::{
    candidate_universe, leading_sectors, rank, OutcomeTally, ScreeningOptions, ScreeningReport,
    ScreeningStatus,
};
use crate::signal::{compute_signal, MarketContext, ScoringConfig, SignalError, SignalOutcome};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const MAX_TICKER_WARNINGS: usize = 10;
const PROGRESS_EVERY: usize = 20;

enum TickerOutcome {
    Signal(Result<SignalOutcome, SignalError>),
    NoData,
    FetchFailed(String),
    PoolClosed,
}

/// Runs one screening pass over a gateway with fixed options.
pub struct Screener {
    gateway: Arc<MarketDataGateway>,
    opts: ScreeningOptions,
}

impl Screener {
    pub fn new(gateway: Arc<MarketDataGateway>, opts: ScreeningOptions) -> Self {
        Self { gateway, opts }
    }

    pub fn gateway(&self) -> &Arc<MarketDataGateway> {
        &self.gateway
    }

    pub fn options(&self) -> &ScreeningOptions {
        &self.opts
    }

    pub async fn resolve_as_of_date(&self, as_of: Option<NaiveDate>) -> NaiveDate {
        match as_of {
            Some(d) => d,
            None => self.gateway.resolve_latest_session(Utc::now()).await,
        }
    }

    pub async fn run_screening(&self, as_of: Option<NaiveDate>) -> ScreeningReport {
        self.run_screening_at(as_of, Utc::now()).await
    }

    /// Like [`run_screening`](Self::run_screening) with an explicit clock for session resolution.
    pub async fn run_screening_at(
        &self,
        as_of: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> ScreeningReport {
        let started = Instant::now();
        let market = self.opts.market;
        let as_of_date = match as_of {
            Some(d) => d,
            None => self.gateway.resolve_latest_session(now).await,
        };

        let (foreign, institution, individual) = tokio::join!(
            self.gateway
                .fetch_flow_snapshot(as_of_date, market, InvestorCategory::Foreign),
            self.gateway
                .fetch_flow_snapshot(as_of_date, market, InvestorCategory::Institution),
            self.gateway
                .fetch_flow_snapshot(as_of_date, market, InvestorCategory::Individual),
        );

        let (foreign, institution) = match (foreign, institution) {
            (Fetched::Data(f), Fetched::Data(i)) => (f, i),
            (f, i) => {
                tracing::warn!(
                    %as_of_date,
                    %market,
                    foreign_failed = f.is_failed(),
                    institution_failed = i.is_failed(),
                    "foreign or institution flows unavailable; skipping screening"
                );
                return ScreeningReport::empty(
                    as_of_date,
                    market,
                    ScreeningStatus::NoFlowData,
                    self.opts.top_picks,
                );
            }
        };
        let individual = individual.data_or_else(|| {
            tracing::info!(%as_of_date, "individual flows unavailable; retail-selling bonus disabled");
            Arc::new(FlowSnapshot::empty(as_of_date, market, InvestorCategory::Individual))
        });

        let universe = candidate_universe(&foreign, &institution, self.opts.universe_per_side);
        let leading = leading_sectors(&foreign, &institution, self.opts.leading_sectors_top_n);

        let (fundamentals, sectors) = tokio::join!(
            self.gateway.fetch_fundamental_snapshot(as_of_date, market),
            self.gateway.fetch_sector_map(as_of_date, market),
        );
        let fundamentals = fundamentals.data_or_else(|| {
            tracing::warn!(%as_of_date, "fundamentals unavailable; valuation scores will be zero");
            Arc::new(FundamentalSnapshot::empty(as_of_date, market))
        });
        let sectors: Arc<SectorMap> = sectors.data_or_default();

        tracing::info!(
            %as_of_date,
            %market,
            universe = universe.len(),
            leading_sectors = ?leading,
            workers = self.opts.workers,
            "screening started"
        );

        let ctx = Arc::new(MarketContext {
            as_of_date,
            market,
            foreign,
            institution,
            individual,
            fundamentals,
            sectors,
            leading_sectors: Arc::new(leading),
        });

        let (mut ranked, tally) = self.fan_out(universe, ctx).await;
        rank(&mut ranked);

        let status = if ranked.is_empty() {
            ScreeningStatus::NoQualifyingTickers
        } else {
            ScreeningStatus::Completed
        };

        tracing::info!(
            %as_of_date,
            status = status.as_str(),
            scored = tally.scored,
            below_threshold = tally.below_threshold,
            insufficient_history = tally.insufficient_history,
            no_data = tally.no_data,
            fetch_failed = tally.fetch_failed,
            faults = tally.faults,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "screening finished"
        );

        ScreeningReport {
            as_of_date,
            market,
            status,
            ranked,
            tally,
            top_n: self.opts.top_picks,
        }
    }

    async fn fan_out(
        &self,
        universe: Vec<String>,
        ctx: Arc<MarketContext>,
    ) -> (Vec<TickerScoreRecord>, OutcomeTally) {
        let end = ctx.as_of_date;
        let start = end - Duration::days(self.opts.history_days);
        let cfg = self.opts.scoring();
        let delay = self.opts.req_delay;
        let semaphore = Arc::new(Semaphore::new(self.opts.workers.max(1)));

        let mut tally = OutcomeTally {
            universe: universe.len(),
            ..Default::default()
        };
        let mut join_set = JoinSet::new();

        for ticker in universe {
            let gateway = Arc::clone(&self.gateway);
            let ctx = Arc::clone(&ctx);
            let cfg = cfg.clone();
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (ticker, TickerOutcome::PoolClosed);
                };
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let outcome = evaluate_ticker(&gateway, &ctx, &cfg, &ticker, start, end).await;
                (ticker, outcome)
            });
        }

        let mut ranked = Vec::new();
        let mut warnings = 0usize;
        let mut warn = |msg: String| {
            warnings += 1;
            if warnings <= MAX_TICKER_WARNINGS {
                tracing::warn!("{msg}");
            }
        };

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, TickerOutcome::Signal(Ok(SignalOutcome::Scored(record))))) => {
                    tally.scored += 1;
                    ranked.push(*record);
                }
                Ok((_, TickerOutcome::Signal(Ok(SignalOutcome::BelowThreshold { .. })))) => {
                    tally.below_threshold += 1;
                }
                Ok((ticker, TickerOutcome::Signal(Ok(SignalOutcome::InsufficientHistory { bars })))) => {
                    tally.insufficient_history += 1;
                    tracing::debug!(%ticker, bars, "insufficient history; skipped");
                }
                Ok((ticker, TickerOutcome::Signal(Err(err)))) => {
                    tally.faults += 1;
                    warn(format!("scoring failed for {ticker}: {err}"));
                }
                Ok((ticker, TickerOutcome::NoData)) => {
                    tally.no_data += 1;
                    tracing::debug!(%ticker, "no price history");
                }
                Ok((ticker, TickerOutcome::FetchFailed(err))) => {
                    tally.fetch_failed += 1;
                    warn(format!("price fetch failed for {ticker}: {err}"));
                }
                Ok((ticker, TickerOutcome::PoolClosed)) => {
                    tally.faults += 1;
                    warn(format!("worker pool closed before {ticker} ran"));
                }
                Err(join_error) => {
                    tally.faults += 1;
                    warn(format!("screening task aborted: {join_error}"));
                }
            }

            let done = tally.completed();
            if done % PROGRESS_EVERY == 0 || done == tally.universe {
                tracing::info!(done, total = tally.universe, scored = tally.scored, "screening progress");
            }
        }

        if warnings > MAX_TICKER_WARNINGS {
            tracing::warn!(
                suppressed = warnings - MAX_TICKER_WARNINGS,
                "additional per-ticker warnings suppressed"
            );
        }

        (ranked, tally)
    }

    /// Leading sectors for `date` from foreign and institution flows.
    pub async fn leading_sectors(&self, date: NaiveDate) -> Fetched<BTreeSet<String>> {
        let market = self.opts.market;
        let (foreign, institution) = tokio::join!(
            self.gateway
                .fetch_flow_snapshot(date, market, InvestorCategory::Foreign),
            self.gateway
                .fetch_flow_snapshot(date, market, InvestorCategory::Institution),
        );
        match (foreign, institution) {
            (Fetched::Data(f), Fetched::Data(i)) => {
                Fetched::Data(leading_sectors(&f, &i, self.opts.leading_sectors_top_n))
            }
            (Fetched::Failed(e), _) | (_, Fetched::Failed(e)) => Fetched::Failed(e),
            _ => Fetched::Empty,
        }
    }

    pub fn market(&self) -> Market {
        self.opts.market
    }
}

async fn evaluate_ticker(
    gateway: &MarketDataGateway,
    ctx: &MarketContext,
    cfg: &ScoringConfig,
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> TickerOutcome {
    match gateway
        .fetch_price_series(ticker, ctx.market, start, end)
        .await
    {
        Fetched::Data(series) => TickerOutcome::Signal(compute_signal(&series, ctx, cfg)),
        Fetched::Empty => TickerOutcome::NoData,
        Fetched::Failed(err) => TickerOutcome::FetchFailed(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NetPurchaseRow;
    use crate::market_data::CacheTtls;
    use crate::test_support::{bars_from_closes, date, FakeSource};

    fn buy(ticker: &str, value: f64) -> NetPurchaseRow {
        NetPurchaseRow {
            ticker: ticker.to_string(),
            name: format!("Name {ticker}"),
            net_volume: if value >= 0.0 { 1_000 } else { -1_000 },
            net_value: value,
        }
    }

    fn rising(n: usize, start: f64, step: f64) -> Vec<crate::domain::DailyBar> {
        let closes: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
        bars_from_closes(&closes, 1_000_000.0)
    }

    fn screener(primary: FakeSource, opts: ScreeningOptions) -> Screener {
        let gateway = MarketDataGateway::new(
            Arc::new(primary),
            Arc::new(FakeSource::named("secondary")),
            CacheTtls::default(),
        );
        Screener::new(Arc::new(gateway), opts)
    }

    fn populated_source() -> FakeSource {
        let mut src = FakeSource::named("primary");
        src.flows.insert(
            InvestorCategory::Foreign,
            vec![
                buy("000001", 9e9),
                buy("000002", 7e9),
                buy("000003", 5e9),
                buy("000004", 4e9),
                buy("000005", 3e9),
                buy("000006", 2e9),
            ],
        );
        src.flows.insert(
            InvestorCategory::Institution,
            vec![buy("000001", 6e9), buy("000002", 5e9), buy("000007", 4e9)],
        );
        for (ticker, step) in [
            ("000001", 40.0),
            ("000002", 25.0),
            ("000003", 10.0),
            ("000007", 30.0),
        ] {
            src.prices.insert(ticker.to_string(), rising(70, 10_000.0, step));
        }
        src.prices.insert("000004".to_string(), rising(10, 10_000.0, 10.0));
        src.panicking_prices.insert("000005".to_string());
        src.failing_prices.insert("000006".to_string());
        src
    }

    #[tokio::test]
    async fn empty_flows_abort_with_no_flow_data() {
        let s = screener(FakeSource::named("primary"), ScreeningOptions::default());
        let report = s.run_screening(Some(date(2026, 2, 13))).await;
        assert_eq!(report.status, ScreeningStatus::NoFlowData);
        assert!(report.ranked.is_empty());
        assert!(report.top_picks().is_empty());
    }

    #[tokio::test]
    async fn ranks_descending_and_top_picks_are_a_prefix() {
        let opts = ScreeningOptions {
            top_picks: 2,
            ..Default::default()
        };
        let s = screener(populated_source(), opts);
        let report = s.run_screening(Some(date(2026, 2, 13))).await;

        assert_eq!(report.status, ScreeningStatus::Completed);
        assert!(report.ranked.len() >= 2);
        assert!(report
            .ranked
            .windows(2)
            .all(|w| w[0].score >= w[1].score));
        assert_eq!(report.top_picks(), &report.ranked[..2]);
        assert!(report.ranked.iter().all(|r| r.score >= 20.0 && r.score <= 100.0));

        let pincer = report
            .ranked
            .iter()
            .find(|r| r.ticker == "000001")
            .unwrap();
        assert!(pincer.tags.contains("pincer-buying"));
        assert_eq!(pincer.name, "Name 000001");
    }

    #[tokio::test]
    async fn per_ticker_failures_are_isolated() {
        let s = screener(populated_source(), ScreeningOptions::default());
        let report = s.run_screening(Some(date(2026, 2, 13))).await;

        let t = report.tally;
        assert_eq!(t.universe, 7);
        assert_eq!(t.completed(), 7);
        assert_eq!(t.insufficient_history, 1);
        assert_eq!(t.faults, 1);
        assert_eq!(t.fetch_failed, 1);
        assert!(report.ranked.iter().all(|r| r.ticker != "000005"));
        assert!(report.ranked.iter().any(|r| r.ticker == "000001"));
    }

    #[tokio::test]
    async fn single_worker_matches_parallel_output() {
        let parallel = screener(populated_source(), ScreeningOptions::default())
            .run_screening(Some(date(2026, 2, 13)))
            .await;
        let sequential = screener(
            populated_source(),
            ScreeningOptions {
                workers: 1,
                ..Default::default()
            },
        )
        .run_screening(Some(date(2026, 2, 13)))
        .await;
        assert_eq!(parallel.ranked, sequential.ranked);
    }

    #[tokio::test]
    async fn raising_the_threshold_can_empty_the_result() {
        let opts = ScreeningOptions {
            min_score: 101.0,
            ..Default::default()
        };
        let report = screener(populated_source(), opts)
            .run_screening(Some(date(2026, 2, 13)))
            .await;
        assert_eq!(report.status, ScreeningStatus::NoQualifyingTickers);
        assert!(report.ranked.is_empty());
        assert!(report.tally.below_threshold >= 1);
    }

    #[tokio::test]
    async fn one_sided_flows_abort_with_no_flow_data() {
        let mut foreign_only = populated_source();
        foreign_only.flows.remove(&InvestorCategory::Institution);
        let report = screener(foreign_only, ScreeningOptions::default())
            .run_screening(Some(date(2026, 2, 13)))
            .await;
        assert_eq!(report.status, ScreeningStatus::NoFlowData);
        assert!(report.ranked.is_empty());
        assert_eq!(report.tally.universe, 0);

        let mut institution_down = populated_source();
        institution_down
            .failing_flows
            .insert(InvestorCategory::Institution);
        let report = screener(institution_down, ScreeningOptions::default())
            .run_screening(Some(date(2026, 2, 13)))
            .await;
        assert_eq!(report.status, ScreeningStatus::NoFlowData);
        assert!(report.ranked.is_empty());
    }

    #[tokio::test]
    async fn missing_individual_flows_do_not_block_scoring() {
        let mut selling = populated_source();
        selling.flows.insert(
            InvestorCategory::Individual,
            vec![buy("000001", -8e9), buy("000002", -4e9)],
        );
        let with_retail = screener(selling, ScreeningOptions::default())
            .run_screening(Some(date(2026, 2, 13)))
            .await;
        let retail_record = with_retail
            .ranked
            .iter()
            .find(|r| r.ticker == "000001")
            .unwrap();
        assert!(retail_record.tags.contains("retail-selling"));

        let mut failing = populated_source();
        failing.failing_flows.insert(InvestorCategory::Individual);
        let report = screener(failing, ScreeningOptions::default())
            .run_screening(Some(date(2026, 2, 13)))
            .await;

        assert_eq!(report.status, ScreeningStatus::Completed);
        assert_eq!(report.tally.universe, 7);
        assert!(report.ranked.iter().all(|r| !r.tags.contains("retail-selling")));
        let record = report
            .ranked
            .iter()
            .find(|r| r.ticker == "000001")
            .unwrap();
        assert!(record.tags.contains("pincer-buying"));
        assert!(record.sub_scores.flow < retail_record.sub_scores.flow);
    }
}
