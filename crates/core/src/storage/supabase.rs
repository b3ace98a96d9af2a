//! PostgREST access to the hosted `analysis_results` table.

use crate::config::Settings;
use crate::market_data::http::HttpFetcher;
use crate::storage::{ResultEntry, ResultStore, ResultType, StoredResult};
use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

const TABLE: &str = "analysis_results";

#[derive(Debug, Clone)]
pub struct SupabaseResultStore {
    http: HttpFetcher,
    base_url: String,
    api_key: String,
}

impl SupabaseResultStore {
    pub fn new(http: HttpFetcher, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Fails unless both `SUPABASE_URL` and `SUPABASE_KEY` are set.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let (url, key) = settings.require_supabase()?;
        let http = HttpFetcher::new(
            Duration::from_secs(settings.data_provider_timeout_secs),
            settings.data_provider_retries,
        )?;
        Ok(Self::new(http, url, key))
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{TABLE}", self.base_url)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

pub fn query_params(
    result_type: ResultType,
    target_date: Option<NaiveDate>,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("select", "*".to_string()),
        ("result_type", format!("eq.{result_type}")),
    ];
    if let Some(d) = target_date {
        params.push(("target_date", format!("eq.{d}")));
    }
    params.push(("order", "created_at.desc".to_string()));
    params.push(("limit", "1".to_string()));
    params
}

#[async_trait]
impl ResultStore for SupabaseResultStore {
    fn store_name(&self) -> &'static str {
        "supabase"
    }

    async fn upsert(&self, entry: &ResultEntry) -> anyhow::Result<()> {
        let url = self.table_url();
        self.http
            .bytes("supabase upsert", |client| {
                self.authorized(client.post(&url))
                    .query(&[("on_conflict", "target_date,result_type")])
                    .header("Prefer", "resolution=merge-duplicates,return=minimal")
                    .json(entry)
            })
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        result_type: ResultType,
        target_date: Option<NaiveDate>,
    ) -> anyhow::Result<Option<StoredResult>> {
        let url = self.table_url();
        let params = query_params(result_type, target_date);
        let body = self
            .http
            .bytes("supabase query", |client| {
                self.authorized(client.get(&url)).query(&params)
            })
            .await?;
        let rows: Vec<StoredResult> =
            serde_json::from_slice(&body).context("supabase returned malformed rows")?;
        Ok(rows.into_iter().next())
    }
}
