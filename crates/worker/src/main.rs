use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kswing_core::config::Settings;
use kswing_core::market_data::MarketDataGateway;
use kswing_core::screening::{ScreeningOptions, ScreeningReport, Screener};
use kswing_core::storage::{
    MemoryResultStore, PgResultStore, ResultEntry, ResultStore, SupabaseResultStore,
};
use kswing_core::time::kr_market::parse_as_of_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Supabase,
    Postgres,
}

#[derive(Debug, Parser)]
#[command(name = "kswing_worker")]
struct Args {
    /// Market as-of date (YYYY-MM-DD). Defaults to the latest session with data.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Screen and keep results in memory; no external store is touched.
    #[arg(long)]
    dry_run: bool,

    #[arg(long, value_enum, default_value_t = StoreKind::Supabase)]
    store: StoreKind,

    /// Overrides SWING_WORKERS. `--workers 1 --req-delay-ms 30` runs sequentially.
    #[arg(long)]
    workers: Option<usize>,

    /// Overrides SWING_REQ_DELAY_MS.
    #[arg(long)]
    req_delay_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(args, settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
        return Err(err);
    }
    Ok(())
}

/// Where results go, plus the Postgres connection holding the per-date lock.
struct Sink {
    store: Arc<dyn ResultStore>,
    pg_pool: Option<sqlx::PgPool>,
}

async fn run(args: Args, settings: Settings) -> anyhow::Result<()> {
    let mut opts = ScreeningOptions::from_env()?;
    if let Some(n) = args.workers {
        opts.workers = n;
    }
    if let Some(ms) = args.req_delay_ms {
        opts.req_delay = Duration::from_millis(ms);
    }
    opts.validate()?;

    let as_of = args.as_of_date.as_deref().map(parse_as_of_date).transpose()?;

    // Credentials are checked before any market data is fetched.
    let sink = open_sink(&args, &settings).await?;

    let gateway = Arc::new(MarketDataGateway::from_settings(&settings)?);
    let screener = Screener::new(gateway, opts);
    let as_of_date = screener.resolve_as_of_date(as_of).await;

    let mut lock_conn = None;
    if let Some(pool) = &sink.pg_pool {
        let mut conn = pool.acquire().await.context("acquire lock connection failed")?;
        let acquired =
            kswing_core::storage::lock::try_acquire_as_of_date_lock(&mut conn, as_of_date).await?;
        if !acquired {
            tracing::warn!(%as_of_date, "as_of_date lock not acquired; another run in progress");
            return Ok(());
        }
        lock_conn = Some(conn);
    }

    let report = screener.run_screening(Some(as_of_date)).await;
    log_report(&report);

    let persisted = persist(&report, sink.store.as_ref(), args.dry_run).await;

    if let Some(mut conn) = lock_conn {
        if let Err(e) =
            kswing_core::storage::lock::release_as_of_date_lock(&mut conn, as_of_date).await
        {
            tracing::warn!(error = %e, "failed to release as_of_date lock");
        }
    }

    persisted
}

async fn open_sink(args: &Args, settings: &Settings) -> anyhow::Result<Sink> {
    if args.dry_run {
        return Ok(Sink {
            store: Arc::new(MemoryResultStore::new()),
            pg_pool: None,
        });
    }

    match args.store {
        StoreKind::Supabase => Ok(Sink {
            store: Arc::new(SupabaseResultStore::from_settings(settings)?),
            pg_pool: None,
        }),
        StoreKind::Postgres => {
            let db_url = settings.require_database_url()?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .context("connect DATABASE_URL failed")?;
            kswing_core::storage::migrate(&pool).await?;
            Ok(Sink {
                store: Arc::new(PgResultStore::new(pool.clone())),
                pg_pool: Some(pool),
            })
        }
    }
}

fn log_report(report: &ScreeningReport) {
    tracing::info!(
        as_of_date = %report.as_of_date,
        status = report.status.as_str(),
        ranked = report.ranked.len(),
        "screening result"
    );
    for (i, pick) in report.top_picks().iter().enumerate() {
        tracing::info!(
            rank = i + 1,
            ticker = %pick.ticker,
            name = %pick.name,
            score = pick.score,
            target = pick.target_price,
            stop = pick.stop_price,
            tags = ?pick.tags.as_slice(),
            "top pick"
        );
    }
}

/// Writes non-empty results. Empty runs leave any earlier row for the date untouched.
async fn persist(report: &ScreeningReport, store: &dyn ResultStore, dry_run: bool) -> anyhow::Result<()> {
    if report.is_empty() {
        tracing::info!(as_of_date = %report.as_of_date, "nothing to persist");
        return Ok(());
    }

    let entry = ResultEntry::from_report(report)?;
    store
        .upsert(&entry)
        .await
        .with_context(|| format!("persist to {} failed", store.store_name()))?;

    tracing::info!(
        as_of_date = %report.as_of_date,
        store = store.store_name(),
        dry_run,
        stock_count = entry.stock_count,
        "persisted screening result"
    );
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sequential_variant_flags() {
        let args = Args::parse_from([
            "kswing_worker",
            "--as-of-date",
            "2026-02-13",
            "--store",
            "postgres",
            "--workers",
            "1",
            "--req-delay-ms",
            "30",
        ]);
        assert_eq!(args.store, StoreKind::Postgres);
        assert_eq!(args.workers, Some(1));
        assert_eq!(args.req_delay_ms, Some(30));
        assert!(!args.dry_run);
    }

    #[test]
    fn defaults_to_supabase() {
        let args = Args::parse_from(["kswing_worker", "--dry-run"]);
        assert_eq!(args.store, StoreKind::Supabase);
        assert!(args.dry_run);
        assert!(args.as_of_date.is_none());
    }
}
