//! Naver Finance daily chart (`siseJson.naver`).
//!
//! The payload is a JavaScript array literal with single-quoted header
//! labels in Korean, e.g. `[['날짜', '시가', ...], ["20260213", 55000, ...]]`.

use crate::domain::DailyBar;
use crate::market_data::normalize::bars_from_rows;
use anyhow::{Context, Result};
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://api.finance.naver.com";

pub fn chart_url(base_url: &str) -> String {
    format!("{}/siseJson.naver", base_url.trim_end_matches('/'))
}

pub fn parse_chart(text: &str) -> Result<Vec<DailyBar>> {
    let json = text.trim().replace('\'', "\"");
    if json.is_empty() {
        return Ok(Vec::new());
    }
    let table: Vec<Vec<Value>> =
        serde_json::from_str(&json).context("naver chart payload is not a JSON table")?;

    let mut rows = table.into_iter();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header
        .iter()
        .map(|v| v.as_str().unwrap_or_default().trim().to_string())
        .collect();
    anyhow::ensure!(
        headers.iter().any(|h| h == "종가"),
        "naver chart header has no close column: {headers:?}"
    );

    let body: Vec<Vec<Value>> = rows.collect();
    Ok(bars_from_rows(&headers, &body))
}
