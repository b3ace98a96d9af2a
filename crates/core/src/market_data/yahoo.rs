//! Yahoo Finance v8 chart API. Keys are English and prices arrive as
//! parallel arrays under `indicators.quote[0]`.

use crate::domain::DailyBar;
use crate::market_data::normalize::bars_from_rows;
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveTime};
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

const COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

pub fn chart_url(base_url: &str, symbol: &str) -> String {
    format!("{}/v8/finance/chart/{symbol}", base_url.trim_end_matches('/'))
}

/// Unix seconds for KST midnight of `start` and of the day after `end`.
pub fn period_bounds(start: NaiveDate, end: NaiveDate) -> (i64, i64) {
    let kst_midnight = |d: NaiveDate| {
        (d.and_time(NaiveTime::default()) - Duration::hours(9))
            .and_utc()
            .timestamp()
    };
    (kst_midnight(start), kst_midnight(end + Duration::days(1)))
}

pub fn parse_chart(body: &Value) -> Result<Vec<DailyBar>> {
    if let Some(err) = body.pointer("/chart/error").filter(|e| !e.is_null()) {
        anyhow::bail!("yahoo chart error: {err}");
    }
    let result = body
        .pointer("/chart/result/0")
        .context("yahoo chart has no result")?;
    let Some(timestamps) = result.get("timestamp").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let quote = result
        .pointer("/indicators/quote/0")
        .context("yahoo chart has no quote block")?;

    let series: Vec<&[Value]> = COLUMNS
        .iter()
        .map(|c| {
            quote
                .get(*c)
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[])
        })
        .collect();

    let headers: Vec<String> = std::iter::once("timestamp")
        .chain(COLUMNS)
        .map(str::to_string)
        .collect();
    let rows: Vec<Vec<Value>> = timestamps
        .iter()
        .enumerate()
        .map(|(i, ts)| {
            std::iter::once(ts.clone())
                .chain(series.iter().map(|s| s.get(i).cloned().unwrap_or(Value::Null)))
                .collect()
        })
        .collect();

    Ok(bars_from_rows(&headers, &rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_parallel_arrays_and_skips_null_rows() {
        let body = json!({
            "chart": {
                "result": [{
                    "timestamp": [1_770_854_400i64, 1_770_940_800i64],
                    "indicators": {"quote": [{
                        "open": [54000.0, null],
                        "high": [55200.0, null],
                        "low": [53800.0, null],
                        "close": [55000.0, null],
                        "volume": [9876543, null]
                    }]}
                }],
                "error": null
            }
        });
        let bars = parse_chart(&body).unwrap();
        assert_eq!(bars.len(), 1);
        // 2026-02-12 00:00 UTC is 09:00 KST the same day.
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2026, 2, 12).unwrap());
        assert_eq!(bars[0].close, 55_000.0);
    }

    #[test]
    fn surfaces_chart_errors() {
        let body = json!({"chart": {"result": null, "error": {"code": "Not Found"}}});
        assert!(parse_chart(&body).is_err());
    }

    #[test]
    fn period_covers_whole_kst_days() {
        let d = NaiveDate::from_ymd_opt(2026, 2, 13).unwrap();
        let (p1, p2) = period_bounds(d, d);
        assert_eq!(p2 - p1, 86_400);
        assert_eq!(p1, 1_770_908_400);
    }
}
