use crate::domain::{
    FlowSnapshot, FundamentalSnapshot, Market, PriceSeries, SectorMap, SubScores, Tags,
    TickerScoreRecord,
};
use crate::signal::indicators::{
    atr_last, max_last, pct_change_from, rsi_last, sma_last, ATR_PERIOD, RSI_PERIOD,
};
use crate::signal::narrative::{self, NarrativeFacts};
use crate::signal::targets::{plan_trade, round_to};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Minimum bars required before a ticker is scored at all.
pub const MIN_BARS: usize = 30;
pub const DEFAULT_MIN_SCORE: f64 = 20.0;

const HUNDRED_MILLION: f64 = 1e8;

pub const TAG_LEADING_SECTOR: &str = "leading-sector";
pub const TAG_PINCER: &str = "pincer-buying";
pub const TAG_FOREIGN: &str = "foreign-buying";
pub const TAG_INSTITUTION: &str = "institution-buying";
pub const TAG_RETAIL_SELLING: &str = "retail-selling";
pub const TAG_GOLDEN: &str = "golden-alignment";
pub const TAG_NEAR_HIGH: &str = "near-60d-high";

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Records scoring below this are discarded.
    pub min_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

/// Read-only snapshots shared by every per-ticker computation of one run.
#[derive(Debug, Clone)]
pub struct MarketContext {
    pub as_of_date: NaiveDate,
    pub market: Market,
    pub foreign: Arc<FlowSnapshot>,
    pub institution: Arc<FlowSnapshot>,
    pub individual: Arc<FlowSnapshot>,
    pub fundamentals: Arc<FundamentalSnapshot>,
    pub sectors: Arc<SectorMap>,
    pub leading_sectors: Arc<BTreeSet<String>>,
}

impl MarketContext {
    pub fn flow_position(&self, ticker: &str) -> FlowPosition {
        FlowPosition {
            foreign_buy: self.foreign.is_net_buyer(ticker),
            institution_buy: self.institution.is_net_buyer(ticker),
            individual_sell: self.individual.is_net_seller(ticker),
            foreign_value: self.foreign.net_value(ticker),
            institution_value: self.institution.net_value(ticker),
        }
    }

    /// Name from the flow tables, then the listing, else the ticker itself.
    pub fn display_name(&self, ticker: &str) -> String {
        [&self.foreign, &self.institution, &self.individual]
            .iter()
            .filter_map(|s| s.get(ticker))
            .map(|r| r.name.trim())
            .find(|n| !n.is_empty())
            .or_else(|| self.sectors.name(ticker))
            .unwrap_or(ticker)
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowPosition {
    pub foreign_buy: bool,
    pub institution_buy: bool,
    pub individual_sell: bool,
    pub foreign_value: f64,
    pub institution_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CandlePattern {
    /// Large up day whose body dwarfs the upper wick.
    StrongBullish,
    Bullish,
    UpperWick,
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaTrend {
    /// MA5 > MA20 > MA60; carries the close's spread over MA60 in percent.
    GoldenAlignment { spread_pct: f64 },
    ShortAboveMid,
    AboveMid,
    BelowMid,
}

#[derive(Debug, Error, PartialEq)]
pub enum SignalError {
    #[error("invalid {field}: {value}")]
    InvalidPrice { field: &'static str, value: f64 },

    #[error("indicator unavailable: {0}")]
    MissingIndicator(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    Scored(Box<TickerScoreRecord>),
    InsufficientHistory { bars: usize },
    BelowThreshold { score: f64 },
}

pub fn sector_score(in_leading_sector: bool) -> f64 {
    if in_leading_sector {
        8.0
    } else {
        0.0
    }
}

pub fn flow_score(pos: &FlowPosition, tags: &mut Tags) -> f64 {
    let mut score = if pos.foreign_buy && pos.institution_buy {
        tags.push(TAG_PINCER);
        let combined = pos.foreign_value.abs() + pos.institution_value.abs();
        20.0 + ((combined / HUNDRED_MILLION).ln_1p() * 1.5).min(10.0)
    } else if pos.foreign_buy {
        tags.push(TAG_FOREIGN);
        12.0 + ((pos.foreign_value.abs() / HUNDRED_MILLION).ln_1p() * 1.2).min(6.0)
    } else if pos.institution_buy {
        tags.push(TAG_INSTITUTION);
        12.0 + ((pos.institution_value.abs() / HUNDRED_MILLION).ln_1p() * 1.2).min(6.0)
    } else {
        return 0.0;
    };

    if pos.individual_sell {
        score += 5.0;
        tags.push(TAG_RETAIL_SELLING);
    }
    score
}

pub fn candle_pattern(change_pct: f64, open: f64, high: f64, close: f64) -> CandlePattern {
    let body = (close - open).abs();
    let upper_wick = high - close.max(open);
    if change_pct > 5.0 && body > upper_wick * 2.0 {
        CandlePattern::StrongBullish
    } else if change_pct > 2.0 && close > open {
        CandlePattern::Bullish
    } else if upper_wick > body * 2.0 && change_pct > 0.0 {
        CandlePattern::UpperWick
    } else {
        CandlePattern::Plain
    }
}

pub fn candle_score(pattern: CandlePattern) -> f64 {
    match pattern {
        CandlePattern::StrongBullish => 3.0,
        CandlePattern::Bullish => 1.5,
        CandlePattern::UpperWick => 0.5,
        CandlePattern::Plain => 0.0,
    }
}

pub fn ma_trend(close: f64, ma5: f64, ma20: f64, ma60: Option<f64>) -> MaTrend {
    match ma60 {
        Some(ma60) if ma5 > ma20 && ma20 > ma60 => {
            let spread_pct = if ma60 > 0.0 {
                (close - ma60) / ma60 * 100.0
            } else {
                0.0
            };
            MaTrend::GoldenAlignment { spread_pct }
        }
        _ if close > ma20 && ma5 > ma20 => MaTrend::ShortAboveMid,
        _ if close > ma20 => MaTrend::AboveMid,
        _ => MaTrend::BelowMid,
    }
}

pub fn ma_trend_score(trend: MaTrend) -> f64 {
    match trend {
        MaTrend::GoldenAlignment { spread_pct } => 7.0 + (spread_pct * 0.3).clamp(0.0, 3.0),
        MaTrend::ShortAboveMid => 4.0,
        MaTrend::AboveMid => 2.0,
        MaTrend::BelowMid => 0.0,
    }
}

/// 1.2x -> 3, 1.5x -> 6.375, capped at 12.
pub fn volume_score(ratio: f64) -> f64 {
    if ratio >= 1.2 {
        (3.0 + (ratio - 1.2) * 11.25).min(12.0)
    } else {
        0.0
    }
}

/// Peaks at RSI 45 and loses 0.2 per point of distance.
pub fn rsi_score(rsi: Option<f64>) -> f64 {
    rsi.map_or(0.0, |r| (8.0 - (r - 45.0).abs() * 0.2).max(0.0))
}

pub fn rsi_tag(rsi: f64) -> Option<String> {
    if (30.0..=45.0).contains(&rsi) {
        Some(format!("rsi-pullback({rsi:.0})"))
    } else if (50.0..=70.0).contains(&rsi) {
        Some(format!("rsi-strong({rsi:.0})"))
    } else if rsi > 75.0 {
        Some(format!("rsi-overheated({rsi:.0})"))
    } else {
        None
    }
}

pub fn momentum_score(ret_5d: f64, ret_20d: f64) -> f64 {
    (ret_5d * 0.8).clamp(0.0, 6.0) + (ret_20d * 0.4).clamp(0.0, 6.0)
}

pub fn fundamental_score(pbr: f64) -> f64 {
    if pbr > 0.0 && pbr < 1.5 {
        (10.0 - pbr * 6.67).max(0.0)
    } else {
        0.0
    }
}

/// Up to 5 for sitting 0-5% above MA20, decaying by 0.5 per point beyond 5%.
pub fn ma20_gap_score(gap_pct: f64) -> f64 {
    if gap_pct > 0.0 && gap_pct <= 5.0 {
        (gap_pct * 1.5).min(5.0)
    } else if gap_pct > 5.0 {
        (5.0 - (gap_pct - 5.0) * 0.5).max(0.0)
    } else {
        0.0
    }
}

/// `from_high_pct` is the close as a percentage of the 60-day high.
pub fn high_proximity_score(from_high_pct: Option<f64>) -> f64 {
    match from_high_pct {
        Some(p) if p >= 95.0 => 5.0,
        Some(p) if p >= 85.0 => 3.0 + (p - 85.0) * 0.2,
        _ => 0.0,
    }
}

fn check_price(field: &'static str, value: f64) -> Result<f64, SignalError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SignalError::InvalidPrice { field, value })
    }
}

/// Scores one ticker against the run's shared snapshots.
///
/// Pure: identical inputs give identical output.
pub fn compute_signal(
    series: &PriceSeries,
    ctx: &MarketContext,
    cfg: &ScoringConfig,
) -> Result<SignalOutcome, SignalError> {
    let bars = series.bars();
    if bars.len() < MIN_BARS {
        return Ok(SignalOutcome::InsufficientHistory { bars: bars.len() });
    }

    let ticker = series.ticker.as_str();
    let last = bars[bars.len() - 1];
    let prev = bars[bars.len() - 2];
    let close = check_price("close", last.close)?;
    let prev_close = check_price("previous close", prev.close)?;
    let change_pct = (close - prev_close) / prev_close * 100.0;

    let closes = series.closes();
    let volumes = series.volumes();
    let ma5 = sma_last(&closes, 5).ok_or(SignalError::MissingIndicator("MA5"))?;
    let ma20 = sma_last(&closes, 20).ok_or(SignalError::MissingIndicator("MA20"))?;
    let ma60 = sma_last(&closes, 60);
    let volume_ma20 =
        sma_last(&volumes, 20).ok_or(SignalError::MissingIndicator("volume MA20"))?;
    let volume_ratio = if volume_ma20 > 0.0 {
        last.volume / volume_ma20
    } else {
        0.0
    };
    let rsi = rsi_last(&closes, RSI_PERIOD);
    let atr = atr_last(bars, ATR_PERIOD).ok_or(SignalError::MissingIndicator("ATR"))?;
    let ret_5d = pct_change_from(&closes, 4).unwrap_or(0.0);
    let ret_20d = pct_change_from(&closes, 19).unwrap_or(0.0);
    let highs = series.highs();
    let high_60d = max_last(&highs, highs.len().min(60)).filter(|h| *h > 0.0);
    let from_high = high_60d.map(|h| close / h * 100.0);
    let ma20_gap = (close - ma20) / ma20 * 100.0;

    let mut tags = Tags::new();

    let sector = ctx.sectors.sector(ticker).to_string();
    let in_leading = !sector.is_empty() && ctx.leading_sectors.contains(&sector);
    if in_leading {
        tags.push(TAG_LEADING_SECTOR);
    }

    let flows = ctx.flow_position(ticker);
    let flow = flow_score(&flows, &mut tags);

    let candle = candle_pattern(change_pct, last.open, last.high, close);
    let trend = ma_trend(close, ma5, ma20, ma60);
    if matches!(trend, MaTrend::GoldenAlignment { .. }) {
        tags.push(TAG_GOLDEN);
    }
    if volume_ratio >= 1.5 {
        tags.push(format!("volume-surge({volume_ratio:.1}x)"));
    }
    if let Some(tag) = rsi.and_then(rsi_tag) {
        tags.push(tag);
    }
    let technical =
        candle_score(candle) + ma_trend_score(trend) + volume_score(volume_ratio) + rsi_score(rsi);

    if ret_5d > 5.0 {
        tags.push(format!("5d+{ret_5d:.1}%"));
    }
    let momentum = momentum_score(ret_5d, ret_20d);

    let fundamentals = ctx.fundamentals.get(ticker);
    let pbr = fundamentals.pbr;
    if pbr > 0.0 && pbr < 1.0 {
        tags.push(format!("low-pbr({pbr:.1})"));
    }
    let fundamental = fundamental_score(pbr);

    if from_high.is_some_and(|p| p >= 95.0) {
        tags.push(TAG_NEAR_HIGH);
    }
    let position = ma20_gap_score(ma20_gap) + high_proximity_score(from_high);

    let sub_scores = SubScores {
        sector: sector_score(in_leading),
        flow,
        technical,
        momentum,
        fundamental,
        position,
    };
    let score = round_to(sub_scores.total().clamp(0.0, 100.0), 1);
    if score < cfg.min_score {
        return Ok(SignalOutcome::BelowThreshold { score });
    }

    let plan = plan_trade(close, atr, ma20);

    let narrative = narrative::compose(&NarrativeFacts {
        score,
        sub_scores: &sub_scores,
        sector: &sector,
        in_leading_sector: in_leading,
        flows: &flows,
        trend,
        ma5,
        ma20,
        ma60,
        close,
        volume_ratio,
        rsi,
        candle,
        change_pct,
        ret_5d,
        ret_20d,
        pbr,
        dividend_yield: fundamentals.dividend_yield,
        plan: &plan,
        high_60d,
        from_high,
        ma20_gap,
    });

    Ok(SignalOutcome::Scored(Box::new(TickerScoreRecord {
        ticker: ticker.to_string(),
        name: ctx.display_name(ticker),
        sector,
        close,
        change_pct: round_to(change_pct, 2),
        score,
        sub_scores,
        tags,
        target_price: plan.target_price,
        target_pct: plan.target_pct,
        stop_price: plan.stop_price,
        stop_pct: plan.stop_pct,
        narrative,
        rsi: rsi.map(|r| round_to(r, 1)),
        volume_ratio: round_to(volume_ratio, 2),
        pbr,
        roe: fundamentals.roe().map(|r| round_to(r, 2)),
        dividend_yield: fundamentals.dividend_yield,
    })))
}
