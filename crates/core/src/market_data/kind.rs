//! KIND corporate listing download: an EUC-KR HTML table with company
//! name, ticker code and industry columns.

use crate::domain::{ListingRow, Market};
use anyhow::{Context, Result};
use encoding_rs::EUC_KR;
use scraper::{Html, Selector};

pub const DEFAULT_BASE_URL: &str = "https://kind.krx.co.kr";

const LISTING_PATH: &str = "/corpgeneral/corpList.do";

pub fn listing_url(base_url: &str) -> String {
    format!("{}{LISTING_PATH}", base_url.trim_end_matches('/'))
}

pub fn market_type(market: Market) -> &'static str {
    match market {
        Market::Kospi => "stockMkt",
        Market::Kosdaq => "kosdaqMkt",
    }
}

pub fn decode_euc_kr(bytes: &[u8]) -> String {
    let (cow, _, _) = EUC_KR.decode(bytes);
    cow.into_owned()
}

/// Parses the listing table. Codes are zero-padded to six digits.
pub fn parse_listing(html: &str) -> Result<Vec<ListingRow>> {
    let doc = Html::parse_document(html);
    let tr = Selector::parse("tr").map_err(|e| anyhow::anyhow!("bad selector: {e}"))?;
    let cell = Selector::parse("th, td").map_err(|e| anyhow::anyhow!("bad selector: {e}"))?;

    let mut rows = doc.select(&tr).map(|row| {
        row.select(&cell)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .collect::<Vec<_>>()
    });

    let header = rows.next().context("KIND listing has no rows")?;
    let col = |label: &str| header.iter().position(|h| h == label);
    let name_col = col("회사명").context("KIND listing has no 회사명 column")?;
    let code_col = col("종목코드").context("KIND listing has no 종목코드 column")?;
    let sector_col = col("업종").context("KIND listing has no 업종 column")?;

    Ok(rows
        .filter_map(|cells| {
            let code = cells.get(code_col)?.trim();
            if code.is_empty() {
                return None;
            }
            Some(ListingRow {
                ticker: format!("{code:0>6}"),
                name: cells.get(name_col).cloned().unwrap_or_default(),
                sector: cells.get(sector_col).cloned().unwrap_or_default(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<html><head><meta charset="euc-kr"></head><body>
        <table border="1">
          <tr><th>회사명</th><th>시장구분</th><th>종목코드</th><th>업종</th></tr>
          <tr><td>삼성전자</td><td>유가증권</td><td>5930</td><td>통신 및 방송 장비 제조업</td></tr>
          <tr><td>SK하이닉스</td><td>유가증권</td><td>000660</td><td>반도체 제조업</td></tr>
          <tr><td>빈칸</td><td>유가증권</td><td></td><td></td></tr>
        </table></body></html>"#;

    #[test]
    fn parses_listing_table() {
        let rows = parse_listing(SAMPLE).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ticker, "005930");
        assert_eq!(rows[0].name, "삼성전자");
        assert_eq!(rows[1].sector, "반도체 제조업");
    }

    #[test]
    fn decodes_euc_kr_payloads() {
        let (encoded, _, _) = EUC_KR.encode(SAMPLE);
        let rows = parse_listing(&decode_euc_kr(&encoded)).unwrap();
        assert_eq!(rows[1].name, "SK하이닉스");
    }

    #[test]
    fn missing_columns_fail() {
        let html = "<table><tr><th>name</th></tr><tr><td>x</td></tr></table>";
        assert!(parse_listing(html).is_err());
    }
}
