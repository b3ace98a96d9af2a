//! Canonical bar schema shared by every provider.
//!
//! Providers label OHLCV columns differently (Korean chart headers, English
//! chart keys, KRX field codes). Each label is mapped once here so nothing
//! downstream branches on which source produced a bar.

use crate::domain::DailyBar;
use chrono::{DateTime, Duration, NaiveDate};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarField {
    Date,
    Open,
    High,
    Low,
    Close,
    Volume,
}

pub fn bar_field(label: &str) -> Option<BarField> {
    let field = match label.trim() {
        "날짜" | "일자" | "date" | "Date" | "timestamp" | "TRD_DD" => BarField::Date,
        "시가" | "open" | "Open" | "OPNPRC_IDX" | "TDD_OPNPRC" => BarField::Open,
        "고가" | "high" | "High" | "HGPRC_IDX" | "TDD_HGPRC" => BarField::High,
        "저가" | "low" | "Low" | "LWPRC_IDX" | "TDD_LWPRC" => BarField::Low,
        "종가" | "close" | "Close" | "CLSPRC_IDX" | "TDD_CLSPRC" => BarField::Close,
        "거래량" | "volume" | "Volume" | "ACC_TRDVOL" => BarField::Volume,
        _ => return None,
    };
    Some(field)
}

/// Numeric cell: JSON number or string with thousands separators. `-` and blanks are absent.
pub fn cell_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_num(s),
        _ => None,
    }
}

pub fn parse_num(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() || t == "-" {
        return None;
    }
    t.replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Date cell: `YYYYMMDD`, `YYYY/MM/DD`, `YYYY-MM-DD`, or unix seconds read as a KST date.
pub fn cell_date(v: &Value) -> Option<NaiveDate> {
    match v {
        Value::String(s) => parse_date(s),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if (19_000_101..=99_991_231).contains(&raw) {
                parse_date(&raw.to_string())
            } else {
                let utc = DateTime::from_timestamp(raw, 0)?;
                Some((utc.naive_utc() + Duration::hours(9)).date())
            }
        }
        _ => None,
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let t = s.trim();
    ["%Y%m%d", "%Y/%m/%d", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(t, fmt).ok())
}

/// Builds a bar from labelled cells. Date and all four prices are required; volume defaults to 0.
pub fn bar_from_cells<'a>(cells: impl IntoIterator<Item = (&'a str, &'a Value)>) -> Option<DailyBar> {
    let mut date = None;
    let (mut open, mut high, mut low, mut close, mut volume) = (None, None, None, None, None);
    for (label, value) in cells {
        match bar_field(label) {
            Some(BarField::Date) => date = cell_date(value),
            Some(BarField::Open) => open = cell_f64(value),
            Some(BarField::High) => high = cell_f64(value),
            Some(BarField::Low) => low = cell_f64(value),
            Some(BarField::Close) => close = cell_f64(value),
            Some(BarField::Volume) => volume = cell_f64(value),
            None => {}
        }
    }
    Some(DailyBar {
        date: date?,
        open: open?,
        high: high?,
        low: low?,
        close: close?,
        volume: volume.unwrap_or(0.0),
    })
}

/// Header row plus positional rows, as in chart table payloads.
pub fn bars_from_rows(headers: &[String], rows: &[Vec<Value>]) -> Vec<DailyBar> {
    rows.iter()
        .filter_map(|row| {
            bar_from_cells(
                headers
                    .iter()
                    .map(String::as_str)
                    .zip(row.iter()),
            )
        })
        .collect()
}

/// One JSON object per bar, keyed by column label.
pub fn bars_from_records(records: &[Value]) -> Vec<DailyBar> {
    records
        .iter()
        .filter_map(|r| r.as_object())
        .filter_map(|obj| bar_from_cells(obj.iter().map(|(k, v)| (k.as_str(), v))))
        .collect()
}

/// Keeps bars dated within `[start, end]`.
pub fn within(bars: Vec<DailyBar>, start: NaiveDate, end: NaiveDate) -> Vec<DailyBar> {
    bars.into_iter()
        .filter(|b| b.date >= start && b.date <= end)
        .collect()
}
