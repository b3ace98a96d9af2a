use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    Kospi,
    Kosdaq,
}

impl Market {
    /// Market id used by the KRX data service.
    pub fn krx_id(self) -> &'static str {
        match self {
            Market::Kospi => "STK",
            Market::Kosdaq => "KSQ",
        }
    }

    pub fn yahoo_suffix(self) -> &'static str {
        match self {
            Market::Kospi => ".KS",
            Market::Kosdaq => ".KQ",
        }
    }

    /// Finder selector for the KRX index listing.
    pub fn krx_index_group(self) -> &'static str {
        match self {
            Market::Kospi => "1",
            Market::Kosdaq => "2",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Kospi => write!(f, "KOSPI"),
            Market::Kosdaq => write!(f, "KOSDAQ"),
        }
    }
}

impl FromStr for Market {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KOSPI" | "STK" => Ok(Market::Kospi),
            "KOSDAQ" | "KSQ" => Ok(Market::Kosdaq),
            other => anyhow::bail!("unknown market: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestorCategory {
    Foreign,
    Institution,
    Individual,
    FinancialInvestment,
    Pension,
    OtherCorporation,
}

impl InvestorCategory {
    /// Investor type code used by the KRX net-purchase table.
    pub fn krx_code(self) -> &'static str {
        match self {
            InvestorCategory::FinancialInvestment => "1000",
            InvestorCategory::Pension => "6000",
            InvestorCategory::Institution => "7050",
            InvestorCategory::OtherCorporation => "7100",
            InvestorCategory::Individual => "8000",
            InvestorCategory::Foreign => "9000",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvestorCategory::Foreign => "foreign",
            InvestorCategory::Institution => "institution",
            InvestorCategory::Individual => "individual",
            InvestorCategory::FinancialInvestment => "financial_investment",
            InvestorCategory::Pension => "pension",
            InvestorCategory::OtherCorporation => "other_corporation",
        }
    }
}

impl fmt::Display for InvestorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestorCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let out = match t.to_ascii_lowercase().as_str() {
            "foreign" | "9000" => InvestorCategory::Foreign,
            "institution" | "7050" => InvestorCategory::Institution,
            "individual" | "8000" => InvestorCategory::Individual,
            "financial_investment" | "1000" => InvestorCategory::FinancialInvestment,
            "pension" | "6000" => InvestorCategory::Pension,
            "other_corporation" | "7100" => InvestorCategory::OtherCorporation,
            _ => match t {
                "외국인" => InvestorCategory::Foreign,
                "기관합계" => InvestorCategory::Institution,
                "개인" => InvestorCategory::Individual,
                "금융투자" => InvestorCategory::FinancialInvestment,
                "연기금" => InvestorCategory::Pension,
                "기타법인" => InvestorCategory::OtherCorporation,
                _ => anyhow::bail!("unknown investor category: {t}"),
            },
        };
        Ok(out)
    }
}

/// Benchmark index used to verify that a session has data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BenchmarkIndex {
    Kospi,
}

impl BenchmarkIndex {
    /// (indIdx, indIdx2) pair on the KRX data service.
    pub fn krx_code(self) -> (&'static str, &'static str) {
        match self {
            BenchmarkIndex::Kospi => ("1", "001"),
        }
    }

    pub fn yahoo_symbol(self) -> &'static str {
        match self {
            BenchmarkIndex::Kospi => "^KS11",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Daily bars for one ticker, ascending by date with unique dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: String,
    bars: Vec<DailyBar>,
}

impl PriceSeries {
    pub fn new(ticker: impl Into<String>, mut bars: Vec<DailyBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        Self {
            ticker: ticker.into(),
            bars,
        }
    }

    pub fn empty(ticker: impl Into<String>) -> Self {
        Self::new(ticker, Vec::new())
    }

    pub fn bars(&self) -> &[DailyBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    pub fn last(&self) -> Option<&DailyBar> {
        self.bars.last()
    }
}

/// Raw net-purchase row as reported for one investor category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetPurchaseRow {
    pub ticker: String,
    pub name: String,
    pub net_volume: i64,
    pub net_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRow {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub net_volume: i64,
    /// Net buy value in KRW.
    pub net_value: f64,
    /// Net buy value in units of 100 million KRW, one decimal.
    pub net_value_100m: f64,
    pub change_pct: f64,
}

/// Net-purchase table for one (date, market, investor) slice, sorted by net value descending.
#[derive(Debug, Clone, Serialize)]
pub struct FlowSnapshot {
    pub as_of_date: NaiveDate,
    pub market: Market,
    pub investor: InvestorCategory,
    rows: Vec<FlowRow>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl FlowSnapshot {
    pub fn new(
        as_of_date: NaiveDate,
        market: Market,
        investor: InvestorCategory,
        mut rows: Vec<FlowRow>,
    ) -> Self {
        rows.sort_by(|a, b| {
            b.net_value
                .partial_cmp(&a.net_value)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });
        let index = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.ticker.clone(), i))
            .collect();
        Self {
            as_of_date,
            market,
            investor,
            rows,
            index,
        }
    }

    pub fn empty(as_of_date: NaiveDate, market: Market, investor: InvestorCategory) -> Self {
        Self::new(as_of_date, market, investor, Vec::new())
    }

    pub fn rows(&self) -> &[FlowRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<&FlowRow> {
        self.index.get(ticker).and_then(|&i| self.rows.get(i))
    }

    pub fn top(&self, n: usize) -> &[FlowRow] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn is_net_buyer(&self, ticker: &str) -> bool {
        self.get(ticker).is_some_and(|r| r.net_volume > 0)
    }

    pub fn is_net_seller(&self, ticker: &str) -> bool {
        self.get(ticker).is_some_and(|r| r.net_volume < 0)
    }

    /// Net value of `ticker`, zero when the ticker is absent.
    pub fn net_value(&self, ticker: &str) -> f64 {
        self.get(ticker).map(|r| r.net_value).unwrap_or(0.0)
    }

    /// Aggregate net value per sector; unclassified rows are skipped.
    pub fn sector_totals(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for row in &self.rows {
            if row.sector.is_empty() {
                continue;
            }
            *out.entry(row.sector.clone()).or_insert(0.0) += row.net_value;
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalRow {
    pub per: f64,
    pub pbr: f64,
    pub bps: f64,
    pub dividend_yield: f64,
}

impl FundamentalRow {
    /// Book-implied ROE (%). Undefined for loss-making or data-absent rows.
    pub fn roe(&self) -> Option<f64> {
        if self.per > 0.0 && self.pbr > 0.0 {
            Some(self.pbr / self.per * 100.0)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub as_of_date: NaiveDate,
    pub market: Market,
    pub rows: HashMap<String, FundamentalRow>,
}

impl FundamentalSnapshot {
    pub fn empty(as_of_date: NaiveDate, market: Market) -> Self {
        Self {
            as_of_date,
            market,
            rows: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for `ticker`, all-zero ("not meaningful") when absent.
    pub fn get(&self, ticker: &str) -> FundamentalRow {
        self.rows.get(ticker).copied().unwrap_or_default()
    }
}

/// One row of a combined name + sector listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRow {
    pub ticker: String,
    pub name: String,
    pub sector: String,
}

/// Members of one sector index, used to rebuild a sector map when no listing is available.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorIndexMembers {
    pub index_name: String,
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorEntry {
    pub name: String,
    pub sector: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectorMap {
    entries: HashMap<String, SectorEntry>,
}

impl SectorMap {
    pub fn from_listings(rows: Vec<ListingRow>) -> Self {
        let entries = rows
            .into_iter()
            .map(|r| {
                (
                    r.ticker,
                    SectorEntry {
                        name: r.name,
                        sector: r.sector.trim().to_string(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Later indices overwrite earlier ones for tickers that belong to several.
    pub fn from_index_members(groups: Vec<SectorIndexMembers>) -> Self {
        let mut entries: HashMap<String, SectorEntry> = HashMap::new();
        for group in groups {
            for ticker in group.tickers {
                entries.entry(ticker).or_default().sector = group.index_name.clone();
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Sector label, empty when unclassified or unknown.
    pub fn sector(&self, ticker: &str) -> &str {
        self.entries
            .get(ticker)
            .map(|e| e.sector.as_str())
            .unwrap_or("")
    }

    pub fn name(&self, ticker: &str) -> Option<&str> {
        self.entries
            .get(ticker)
            .map(|e| e.name.as_str())
            .filter(|n| !n.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(ticker: &str, sector: &str, volume: i64, value: f64) -> FlowRow {
        FlowRow {
            ticker: ticker.to_string(),
            name: ticker.to_string(),
            sector: sector.to_string(),
            net_volume: volume,
            net_value: value,
            net_value_100m: value / 1e8,
            change_pct: 0.0,
        }
    }

    #[test]
    fn flow_snapshot_sorts_by_value_and_indexes() {
        let d = NaiveDate::from_ymd_opt(2026, 2, 13).unwrap();
        let snap = FlowSnapshot::new(
            d,
            Market::Kospi,
            InvestorCategory::Foreign,
            vec![
                flow("000001", "Chem", 10, 1e8),
                flow("000002", "", -5, -2e8),
                flow("000003", "Chem", 7, 5e8),
            ],
        );
        assert_eq!(snap.rows()[0].ticker, "000003");
        assert_eq!(snap.top(2).len(), 2);
        assert!(snap.is_net_buyer("000001"));
        assert!(snap.is_net_seller("000002"));
        assert!(!snap.is_net_buyer("999999"));
        assert_eq!(snap.net_value("999999"), 0.0);

        let totals = snap.sector_totals();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals.get("Chem").copied(), Some(6e8));
    }

    #[test]
    fn roe_is_undefined_for_non_positive_per() {
        let loss_making = FundamentalRow {
            per: 0.0,
            pbr: 0.8,
            bps: 10_000.0,
            dividend_yield: 0.0,
        };
        assert_eq!(loss_making.roe(), None);

        let negative = FundamentalRow {
            per: -3.0,
            ..loss_making
        };
        assert_eq!(negative.roe(), None);

        let ok = FundamentalRow {
            per: 8.0,
            ..loss_making
        };
        assert!((ok.roe().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn index_member_fallback_is_last_write_wins() {
        let map = SectorMap::from_index_members(vec![
            SectorIndexMembers {
                index_name: "Electronics".to_string(),
                tickers: vec!["005930".to_string(), "000660".to_string()],
            },
            SectorIndexMembers {
                index_name: "Semiconductors".to_string(),
                tickers: vec!["000660".to_string()],
            },
        ]);
        assert_eq!(map.sector("005930"), "Electronics");
        assert_eq!(map.sector("000660"), "Semiconductors");
        assert_eq!(map.sector("123456"), "");
        assert_eq!(map.name("005930"), None);
    }

    #[test]
    fn parses_investor_labels() {
        assert_eq!(
            "외국인".parse::<InvestorCategory>().unwrap(),
            InvestorCategory::Foreign
        );
        assert_eq!(
            "institution".parse::<InvestorCategory>().unwrap(),
            InvestorCategory::Institution
        );
        assert!("whale".parse::<InvestorCategory>().is_err());
    }
}
