//! Primary source: the KRX market-data JSON service, plus Naver charts for
//! per-ticker OHLCV.

use crate::config::Settings;
use crate::domain::{
    BenchmarkIndex, DailyBar, FundamentalRow, InvestorCategory, Market, NetPurchaseRow,
    SectorIndexMembers,
};
use crate::market_data::http::HttpFetcher;
use crate::market_data::naver;
use crate::market_data::normalize::{bars_from_records, parse_num, within};
use crate::market_data::provider::MarketDataSource;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;

pub const DEFAULT_BASE_URL: &str = "http://data.krx.co.kr";

const JSON_PATH: &str = "/comm/bldAttendant/getJsonData.cmd";
const REFERER_PATH: &str = "/contents/MDC/MDI/mdiLoader";

const BLD_NET_PURCHASES: &str = "dbms/MDC/STAT/standard/MDCSTAT02401";
const BLD_DAILY_CHANGES: &str = "dbms/MDC/STAT/standard/MDCSTAT01501";
const BLD_FUNDAMENTALS: &str = "dbms/MDC/STAT/standard/MDCSTAT03501";
const BLD_INDEX_OHLCV: &str = "dbms/MDC/STAT/standard/MDCSTAT00301";
const BLD_INDEX_MEMBERS: &str = "dbms/MDC/STAT/standard/MDCSTAT00601";
const BLD_INDEX_FINDER: &str = "dbms/comm/finder/finder_equidx";

// Market-wide and theme indices are not sectors.
const NON_SECTOR_INDEX_MARKERS: [&str; 3] = ["코스피", "코스닥", "KRX"];

#[derive(Debug, Clone)]
pub struct KrxSource {
    http: HttpFetcher,
    base_url: String,
    naver_base_url: String,
}

/// Raw index listing entry from the finder.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexListing {
    pub group: String,
    pub code: String,
    pub name: String,
}

impl KrxSource {
    pub fn new(http: HttpFetcher, base_url: &str, naver_base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            naver_base_url: naver_base_url.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            HttpFetcher::from_settings(settings)?,
            settings.krx_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
            settings
                .naver_chart_base_url
                .as_deref()
                .unwrap_or(naver::DEFAULT_BASE_URL),
        ))
    }

    async fn post(&self, bld: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{JSON_PATH}", self.base_url);
        let referer = format!("{}{REFERER_PATH}", self.base_url);
        let mut form: Vec<(&str, &str)> = vec![("bld", bld), ("locale", "ko_KR")];
        form.extend_from_slice(params);

        let text = self
            .http
            .text("KRX", |c| {
                c.post(url.as_str())
                    .header(reqwest::header::REFERER, referer.as_str())
                    .form(&form)
            })
            .await?;
        serde_json::from_str(&text).with_context(|| {
            let preview: String = text.chars().take(200).collect();
            format!("KRX response for {bld} is not JSON: {preview}")
        })
    }

    async fn index_listing(&self, market: Market) -> Result<Vec<IndexListing>> {
        let body = self
            .post(BLD_INDEX_FINDER, &[("mktsel", market.krx_index_group())])
            .await?;
        Ok(parse_index_listing(&body))
    }
}

fn ymd(d: NaiveDate) -> String {
    d.format("%Y%m%d").to_string()
}

fn output_rows(body: &Value) -> &[Value] {
    ["output", "OutBlock_1", "block1"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn str_field<'a>(row: &'a Value, key: &str) -> &'a str {
    row.get(key).and_then(Value::as_str).unwrap_or("").trim()
}

fn num_field(row: &Value, key: &str) -> Option<f64> {
    row.get(key).and_then(Value::as_str).and_then(parse_num)
}

pub fn parse_net_purchases(body: &Value) -> Vec<NetPurchaseRow> {
    output_rows(body)
        .iter()
        .filter_map(|row| {
            let ticker = str_field(row, "ISU_SRT_CD");
            if ticker.is_empty() {
                return None;
            }
            Some(NetPurchaseRow {
                ticker: ticker.to_string(),
                name: str_field(row, "ISU_NM").to_string(),
                net_volume: num_field(row, "NETBID_TRDVOL").unwrap_or(0.0) as i64,
                net_value: num_field(row, "NETBID_TRDVAL").unwrap_or(0.0),
            })
        })
        .collect()
}

pub fn parse_daily_changes(body: &Value) -> HashMap<String, f64> {
    output_rows(body)
        .iter()
        .filter_map(|row| {
            let ticker = str_field(row, "ISU_SRT_CD");
            let change = num_field(row, "FLUC_RT")?;
            (!ticker.is_empty()).then(|| (ticker.to_string(), change))
        })
        .collect()
}

pub fn parse_fundamentals(body: &Value) -> HashMap<String, FundamentalRow> {
    output_rows(body)
        .iter()
        .filter_map(|row| {
            let ticker = str_field(row, "ISU_SRT_CD");
            if ticker.is_empty() {
                return None;
            }
            let row = FundamentalRow {
                per: num_field(row, "PER").unwrap_or(0.0),
                pbr: num_field(row, "PBR").unwrap_or(0.0),
                bps: num_field(row, "BPS").unwrap_or(0.0),
                dividend_yield: num_field(row, "DVD_YLD").unwrap_or(0.0),
            };
            Some((ticker.to_string(), row))
        })
        .collect()
}

/// Sector indices only; market-wide indices are skipped.
pub fn parse_index_listing(body: &Value) -> Vec<IndexListing> {
    output_rows(body)
        .iter()
        .filter_map(|row| {
            let full = str_field(row, "full_code");
            let code = str_field(row, "short_code");
            let name = str_field(row, "codeName");
            if full.is_empty() || code.is_empty() || name.is_empty() {
                return None;
            }
            if NON_SECTOR_INDEX_MARKERS.iter().any(|m| name.contains(m)) {
                return None;
            }
            Some(IndexListing {
                group: full.chars().take(1).collect(),
                code: code.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

pub fn parse_index_members(body: &Value) -> Vec<String> {
    output_rows(body)
        .iter()
        .map(|row| str_field(row, "ISU_SRT_CD"))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait::async_trait]
impl MarketDataSource for KrxSource {
    fn source_name(&self) -> &'static str {
        "krx"
    }

    async fn index_bars(
        &self,
        index: BenchmarkIndex,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>> {
        let (group, code) = index.krx_code();
        let (s, e) = (ymd(start), ymd(end));
        let body = self
            .post(
                BLD_INDEX_OHLCV,
                &[("indIdx", group), ("indIdx2", code), ("strtDd", &s), ("endDd", &e)],
            )
            .await?;
        Ok(within(bars_from_records(output_rows(&body)), start, end))
    }

    async fn price_bars(
        &self,
        ticker: &str,
        _market: Market,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>> {
        let url = naver::chart_url(&self.naver_base_url);
        let (s, e) = (ymd(start), ymd(end));
        let text = self
            .http
            .text("naver chart", |c| {
                c.get(url.as_str()).query(&[
                    ("symbol", ticker),
                    ("requestType", "1"),
                    ("startTime", s.as_str()),
                    ("endTime", e.as_str()),
                    ("timeframe", "day"),
                ])
            })
            .await?;
        let bars = naver::parse_chart(&text).with_context(|| format!("ticker {ticker}"))?;
        Ok(within(bars, start, end))
    }

    async fn net_purchases(
        &self,
        date: NaiveDate,
        market: Market,
        investor: InvestorCategory,
    ) -> Result<Vec<NetPurchaseRow>> {
        let d = ymd(date);
        let body = self
            .post(
                BLD_NET_PURCHASES,
                &[
                    ("mktId", market.krx_id()),
                    ("invstTpCd", investor.krx_code()),
                    ("strtDd", &d),
                    ("endDd", &d),
                    ("share", "1"),
                    ("money", "1"),
                ],
            )
            .await?;
        Ok(parse_net_purchases(&body))
    }

    async fn daily_changes(&self, date: NaiveDate, market: Market) -> Result<HashMap<String, f64>> {
        let d = ymd(date);
        let body = self
            .post(
                BLD_DAILY_CHANGES,
                &[("mktId", market.krx_id()), ("trdDd", &d), ("share", "1"), ("money", "1")],
            )
            .await?;
        Ok(parse_daily_changes(&body))
    }

    async fn fundamentals(
        &self,
        date: NaiveDate,
        market: Market,
    ) -> Result<HashMap<String, FundamentalRow>> {
        let d = ymd(date);
        let body = self
            .post(
                BLD_FUNDAMENTALS,
                &[("searchType", "1"), ("mktId", market.krx_id()), ("trdDd", &d)],
            )
            .await?;
        Ok(parse_fundamentals(&body))
    }

    async fn sector_index_members(
        &self,
        date: NaiveDate,
        market: Market,
    ) -> Result<Vec<SectorIndexMembers>> {
        let d = ymd(date);
        let mut out = Vec::new();
        for index in self.index_listing(market).await? {
            let body = match self
                .post(
                    BLD_INDEX_MEMBERS,
                    &[("indIdx", &index.group), ("indIdx2", &index.code), ("trdDd", &d)],
                )
                .await
            {
                Ok(body) => body,
                Err(err) => {
                    tracing::debug!(index = %index.name, error = %err, "index constituents unavailable; skipping");
                    continue;
                }
            };
            out.push(SectorIndexMembers {
                index_name: index.name,
                tickers: parse_index_members(&body),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_net_purchase_rows() {
        let body = json!({
            "output": [
                {"ISU_SRT_CD": "005930", "ISU_NM": "삼성전자", "NETBID_TRDVOL": "1,234,567", "NETBID_TRDVAL": "98,765,432,100"},
                {"ISU_SRT_CD": "000660", "ISU_NM": "SK하이닉스", "NETBID_TRDVOL": "-12,000", "NETBID_TRDVAL": "-3,000,000,000"},
                {"ISU_SRT_CD": "", "ISU_NM": "blank"}
            ]
        });
        let rows = parse_net_purchases(&body);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].net_volume, 1_234_567);
        assert_eq!(rows[0].net_value, 98_765_432_100.0);
        assert_eq!(rows[1].net_volume, -12_000);
    }

    #[test]
    fn parses_fundamentals_with_dashes() {
        let body = json!({
            "output": [
                {"ISU_SRT_CD": "005930", "PER": "12.5", "PBR": "1.10", "BPS": "52,000", "DVD_YLD": "2.10"},
                {"ISU_SRT_CD": "123450", "PER": "-", "PBR": "0.45", "BPS": "-", "DVD_YLD": "0.00"}
            ]
        });
        let rows = parse_fundamentals(&body);
        assert_eq!(rows["005930"].bps, 52_000.0);
        assert_eq!(rows["123450"].per, 0.0);
        assert_eq!(rows["123450"].roe(), None);
    }

    #[test]
    fn parses_daily_changes_from_outblock() {
        let body = json!({
            "OutBlock_1": [
                {"ISU_SRT_CD": "005930", "FLUC_RT": "1.85"},
                {"ISU_SRT_CD": "000660", "FLUC_RT": "-"}
            ]
        });
        let changes = parse_daily_changes(&body);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get("005930").copied(), Some(1.85));
    }

    #[test]
    fn index_listing_skips_market_wide_indices() {
        let body = json!({
            "block1": [
                {"full_code": "1001", "short_code": "001", "codeName": "코스피"},
                {"full_code": "1013", "short_code": "013", "codeName": "전기·전자"},
                {"full_code": "1028", "short_code": "028", "codeName": "코스피 200"},
                {"full_code": "5042", "short_code": "042", "codeName": "KRX 헬스케어"}
            ]
        });
        let listing = parse_index_listing(&body);
        assert_eq!(
            listing,
            vec![IndexListing {
                group: "1".to_string(),
                code: "013".to_string(),
                name: "전기·전자".to_string(),
            }]
        );
    }

    #[test]
    fn missing_output_is_empty() {
        assert!(parse_net_purchases(&json!({})).is_empty());
        assert!(parse_index_members(&json!({"output": []})).is_empty());
    }
}
