use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kswing_core::domain::{FlowRow, InvestorCategory, TickerScoreRecord};
use kswing_core::market_data::{Fetched, MarketDataGateway};
use kswing_core::screening::{ScreeningOptions, ScreeningReport, ScreeningStatus, Screener};
use kswing_core::storage::{
    PgResultStore, ResultStore, ResultType, StoredResult, SupabaseResultStore,
};

const DEFAULT_SUPPLY_TOP_N: usize = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = kswing_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let gateway = Arc::new(MarketDataGateway::from_settings(&settings)?);
    let screener = Arc::new(Screener::new(gateway, ScreeningOptions::from_env()?));
    let store = connect_store(&settings).await;

    let state = AppState { screener, store };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/business-day", get(get_business_day))
        .route("/api/swing", get(run_swing))
        .route("/api/supply", get(get_supply))
        .route("/api/sectors/leading", get(get_leading_sectors))
        .route("/api/results/latest", get(get_latest_result))
        .route("/api/results/:target_date", get(get_result_by_date))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Hosted store when its credentials are set, else Postgres, else none (degraded mode).
async fn connect_store(settings: &kswing_core::config::Settings) -> Option<Arc<dyn ResultStore>> {
    if settings.require_supabase().is_ok() {
        return match SupabaseResultStore::from_settings(settings) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "supabase store init failed; starting API in degraded mode");
                None
            }
        };
    }

    let db_url = match settings.require_database_url() {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(error = %e, "no result store configured; starting API in degraded mode");
            return None;
        }
    };

    match sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
    {
        Ok(pool) => match kswing_core::storage::migrate(&pool).await {
            Ok(()) => Some(Arc::new(PgResultStore::new(pool))),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
            None
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    screener: Arc<Screener>,
    store: Option<Arc<dyn ResultStore>>,
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

fn parse_optional_date(raw: Option<&str>) -> Result<Option<NaiveDate>, StatusCode> {
    raw.map(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d"))
        .transpose()
        .map_err(|_| StatusCode::BAD_REQUEST)
}

#[derive(Debug, Serialize)]
struct BusinessDay {
    date: NaiveDate,
}

async fn get_business_day(State(state): State<AppState>) -> Json<BusinessDay> {
    let date = state.screener.resolve_as_of_date(None).await;
    Json(BusinessDay { date })
}

#[derive(Debug, Serialize)]
struct SwingResponse {
    as_of_date: Option<NaiveDate>,
    status: Option<&'static str>,
    data: Vec<TickerScoreRecord>,
    top3: Vec<TickerScoreRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SwingResponse {
    fn from_report(report: ScreeningReport) -> Self {
        let message = match report.status {
            ScreeningStatus::Completed => None,
            ScreeningStatus::NoFlowData => Some(format!(
                "no foreign/institution flow data for {}",
                report.as_of_date
            )),
            ScreeningStatus::NoQualifyingTickers => {
                Some("no ticker met the score threshold".to_string())
            }
        };
        let top3 = report.top_picks().to_vec();
        Self {
            as_of_date: Some(report.as_of_date),
            status: Some(report.status.as_str()),
            data: report.ranked,
            top3,
            message,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            as_of_date: None,
            status: None,
            data: Vec::new(),
            top3: Vec::new(),
            message: None,
            error: Some(error),
        }
    }
}

/// Runs a screening now. Failures come back as HTTP 200 with an `error` field.
async fn run_swing(State(state): State<AppState>, Query(q): Query<DateQuery>) -> Json<SwingResponse> {
    let as_of = match parse_optional_date(q.date.as_deref()) {
        Ok(d) => d,
        Err(_) => return Json(SwingResponse::failed("invalid date (expected YYYY-MM-DD)".to_string())),
    };

    let screener = Arc::clone(&state.screener);
    match tokio::spawn(async move { screener.run_screening(as_of).await }).await {
        Ok(report) => Json(SwingResponse::from_report(report)),
        Err(join_error) => {
            let err = anyhow::anyhow!("screening task failed: {join_error}");
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "swing screening failed");
            Json(SwingResponse::failed(err.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupplyQuery {
    date: Option<String>,
    investor: Option<String>,
    top_n: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SupplyResponse {
    date: NaiveDate,
    investor: InvestorCategory,
    rows: Vec<FlowRow>,
}

async fn get_supply(
    State(state): State<AppState>,
    Query(q): Query<SupplyQuery>,
) -> Result<Json<SupplyResponse>, StatusCode> {
    let as_of = parse_optional_date(q.date.as_deref())?;
    let investor: InvestorCategory = match q.investor.as_deref() {
        Some(s) => s.parse().map_err(|_| StatusCode::BAD_REQUEST)?,
        None => InvestorCategory::Foreign,
    };
    let top_n = q.top_n.unwrap_or(DEFAULT_SUPPLY_TOP_N);

    let date = state.screener.resolve_as_of_date(as_of).await;
    let fetched = state
        .screener
        .gateway()
        .fetch_flow_snapshot(date, state.screener.market(), investor)
        .await;

    let rows = match fetched {
        Fetched::Data(snapshot) => snapshot.top(top_n).to_vec(),
        Fetched::Empty => Vec::new(),
        Fetched::Failed(err) => {
            tracing::warn!(%date, %investor, error = %err, "supply fetch failed");
            return Err(StatusCode::BAD_GATEWAY);
        }
    };

    Ok(Json(SupplyResponse {
        date,
        investor,
        rows,
    }))
}

#[derive(Debug, Serialize)]
struct LeadingSectorsResponse {
    date: NaiveDate,
    sectors: Vec<String>,
}

async fn get_leading_sectors(
    State(state): State<AppState>,
    Query(q): Query<DateQuery>,
) -> Result<Json<LeadingSectorsResponse>, StatusCode> {
    let as_of = parse_optional_date(q.date.as_deref())?;
    let date = state.screener.resolve_as_of_date(as_of).await;

    let sectors = match state.screener.leading_sectors(date).await {
        Fetched::Data(s) => s.into_iter().collect(),
        Fetched::Empty => Vec::new(),
        Fetched::Failed(err) => {
            tracing::warn!(%date, error = %err, "leading sector fetch failed");
            return Err(StatusCode::BAD_GATEWAY);
        }
    };

    Ok(Json(LeadingSectorsResponse { date, sectors }))
}

#[derive(Debug, Serialize)]
struct ApiResult {
    target_date: NaiveDate,
    created_at: DateTime<Utc>,
    stock_count: i64,
    data: Vec<TickerScoreRecord>,
    top3: Vec<TickerScoreRecord>,
}

impl ApiResult {
    fn decode(row: StoredResult) -> anyhow::Result<Self> {
        Ok(Self {
            data: row.records()?,
            top3: row.top_picks()?,
            target_date: row.target_date,
            created_at: row.created_at,
            stock_count: row.stock_count,
        })
    }
}

async fn get_latest_result(State(state): State<AppState>) -> Result<Json<ApiResult>, StatusCode> {
    fetch_result(&state, None).await
}

async fn get_result_by_date(
    State(state): State<AppState>,
    Path(target_date): Path<String>,
) -> Result<Json<ApiResult>, StatusCode> {
    let target_date =
        NaiveDate::parse_from_str(&target_date, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)?;
    fetch_result(&state, Some(target_date)).await
}

async fn fetch_result(
    state: &AppState,
    target_date: Option<NaiveDate>,
) -> Result<Json<ApiResult>, StatusCode> {
    let Some(store) = &state.store else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let row = store
        .query(ResultType::Swing, target_date)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let result = ApiResult::decode(row).map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(result))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &kswing_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
