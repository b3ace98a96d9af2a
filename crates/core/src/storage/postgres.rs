use crate::storage::{ResultEntry, ResultStore, ResultType, StoredResult};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

type Row = (uuid::Uuid, NaiveDate, String, String, String, i64, DateTime<Utc>);

#[derive(Debug, Clone)]
pub struct PgResultStore {
    pool: sqlx::PgPool,
}

impl PgResultStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    fn store_name(&self) -> &'static str {
        "postgres"
    }

    async fn upsert(&self, entry: &ResultEntry) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO analysis_results (target_date, result_type, results_json, top_picks_json, stock_count) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (target_date, result_type) DO UPDATE SET \
               results_json = EXCLUDED.results_json, \
               top_picks_json = EXCLUDED.top_picks_json, \
               stock_count = EXCLUDED.stock_count, \
               updated_at = now()",
        )
        .persistent(false)
        .bind(entry.target_date)
        .bind(entry.result_type.as_str())
        .bind(&entry.results_json)
        .bind(&entry.top_picks_json)
        .bind(entry.stock_count)
        .execute(&self.pool)
        .await
        .context("upsert analysis_results failed")?;
        Ok(())
    }

    async fn query(
        &self,
        result_type: ResultType,
        target_date: Option<NaiveDate>,
    ) -> anyhow::Result<Option<StoredResult>> {
        let row = sqlx::query_as::<_, Row>(
            "SELECT id, target_date, result_type, results_json, top_picks_json, stock_count, created_at \
             FROM analysis_results \
             WHERE result_type = $1 AND ($2::date IS NULL OR target_date = $2) \
             ORDER BY created_at DESC \
             LIMIT 1",
        )
        .persistent(false)
        .bind(result_type.as_str())
        .bind(target_date)
        .fetch_optional(&self.pool)
        .await
        .context("query analysis_results failed")?;

        row.map(
            |(id, target_date, result_type, results_json, top_picks_json, stock_count, created_at)| {
                Ok(StoredResult {
                    id: Some(id),
                    target_date,
                    result_type: result_type.parse()?,
                    results_json,
                    top_picks_json,
                    stock_count,
                    created_at,
                })
            },
        )
        .transpose()
    }
}
