//! Persistence of screening results, keyed by (target date, result type).

pub mod lock;
pub mod memory;
pub mod postgres;
pub mod supabase;

pub use memory::MemoryResultStore;
pub use postgres::PgResultStore;
pub use supabase::SupabaseResultStore;

use crate::domain::TickerScoreRecord;
use crate::screening::ScreeningReport;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    Swing,
}

impl ResultType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultType::Swing => "swing",
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "swing" => Ok(ResultType::Swing),
            other => anyhow::bail!("unknown result type: {other}"),
        }
    }
}

/// Row written by [`ResultStore::upsert`].
///
/// `results_json` holds the ranked records with each record's tag list
/// JSON-encoded as a text cell; `top_picks_json` holds the top picks as
/// plain records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub target_date: NaiveDate,
    pub result_type: ResultType,
    pub results_json: String,
    pub top_picks_json: String,
    pub stock_count: i64,
}

impl ResultEntry {
    pub fn from_report(report: &ScreeningReport) -> anyhow::Result<Self> {
        let rows = report
            .ranked
            .iter()
            .map(record_to_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            target_date: report.as_of_date,
            result_type: ResultType::Swing,
            results_json: serde_json::to_string(&rows).context("serialize results failed")?,
            top_picks_json: serde_json::to_string(report.top_picks())
                .context("serialize top picks failed")?,
            stock_count: report.ranked.len() as i64,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    #[serde(default)]
    pub id: Option<uuid::Uuid>,
    pub target_date: NaiveDate,
    pub result_type: ResultType,
    pub results_json: String,
    pub top_picks_json: String,
    pub stock_count: i64,
    pub created_at: DateTime<Utc>,
}

impl StoredResult {
    pub fn records(&self) -> anyhow::Result<Vec<TickerScoreRecord>> {
        let rows: Vec<Value> =
            serde_json::from_str(&self.results_json).context("results_json is not a JSON array")?;
        rows.into_iter().map(row_to_record).collect()
    }

    pub fn top_picks(&self) -> anyhow::Result<Vec<TickerScoreRecord>> {
        serde_json::from_str(&self.top_picks_json).context("top_picks_json is malformed")
    }
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    fn store_name(&self) -> &'static str;

    /// Inserts or replaces the row for `(target_date, result_type)`.
    ///
    /// A replaced row keeps its original `created_at`.
    async fn upsert(&self, entry: &ResultEntry) -> anyhow::Result<()>;

    /// Most recently created row of `result_type`, optionally restricted to one date.
    ///
    /// "Most recent" is by `created_at`, so a backfilled older date can shadow
    /// a newer one when no date is given.
    async fn query(
        &self,
        result_type: ResultType,
        target_date: Option<NaiveDate>,
    ) -> anyhow::Result<Option<StoredResult>>;
}

fn record_to_row(record: &TickerScoreRecord) -> anyhow::Result<Value> {
    let mut row = serde_json::to_value(record).context("serialize record failed")?;
    if let Value::Object(map) = &mut row {
        let tags = serde_json::to_string(&record.tags).context("serialize tags failed")?;
        map.insert("tags".to_string(), Value::String(tags));
    }
    Ok(row)
}

fn row_to_record(mut row: Value) -> anyhow::Result<TickerScoreRecord> {
    if let Some(Value::String(text)) = row.get("tags") {
        let tags: Value = serde_json::from_str(text).context("tags cell is not JSON")?;
        if let Value::Object(map) = &mut row {
            map.insert("tags".to_string(), tags);
        }
    }
    serde_json::from_value(row).context("stored record is malformed")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{Market, SubScores, Tags};
    use crate::screening::{OutcomeTally, ScreeningStatus};
    use crate::test_support::date;

    pub(crate) fn record(ticker: &str, score: f64) -> TickerScoreRecord {
        TickerScoreRecord {
            ticker: ticker.to_string(),
            name: format!("Name {ticker}"),
            sector: "Chemicals".to_string(),
            close: 10_000.0,
            change_pct: 1.5,
            score,
            sub_scores: SubScores::default(),
            tags: Tags::from(vec!["pincer-buying".to_string(), "volume-surge(2.1x)".to_string()]),
            target_price: 10_500.0,
            target_pct: 5.0,
            stop_price: 9_800.0,
            stop_pct: -2.0,
            narrative: "[Strong buy signal]".to_string(),
            rsi: Some(44.0),
            volume_ratio: 2.1,
            pbr: 0.8,
            roe: None,
            dividend_yield: 1.2,
        }
    }

    pub(crate) fn report(as_of: NaiveDate, scores: &[(&str, f64)]) -> ScreeningReport {
        ScreeningReport {
            as_of_date: as_of,
            market: Market::Kospi,
            status: ScreeningStatus::Completed,
            ranked: scores.iter().map(|(t, s)| record(t, *s)).collect(),
            tally: OutcomeTally::default(),
            top_n: 3,
        }
    }

    #[test]
    fn tags_are_stored_as_text_cells() {
        let entry = ResultEntry::from_report(&report(
            date(2026, 2, 13),
            &[("000001", 55.0), ("000002", 41.0), ("000003", 33.0), ("000004", 21.0)],
        ))
        .unwrap();
        assert_eq!(entry.stock_count, 4);
        assert_eq!(entry.result_type, ResultType::Swing);

        let rows: Vec<Value> = serde_json::from_str(&entry.results_json).unwrap();
        assert_eq!(
            rows[0]["tags"],
            Value::String(r#"["pincer-buying","volume-surge(2.1x)"]"#.to_string())
        );

        let stored = StoredResult {
            id: None,
            target_date: entry.target_date,
            result_type: entry.result_type,
            results_json: entry.results_json.clone(),
            top_picks_json: entry.top_picks_json.clone(),
            stock_count: entry.stock_count,
            created_at: Utc::now(),
        };
        let records = stored.records().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0], record("000001", 55.0));
        assert_eq!(stored.top_picks().unwrap().len(), 3);
    }

    #[test]
    fn parses_result_type() {
        assert_eq!("swing".parse::<ResultType>().unwrap(), ResultType::Swing);
        assert!("topdown".parse::<ResultType>().is_err());
    }
}
