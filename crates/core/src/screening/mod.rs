//! End-of-day screening run: flows in, ranked swing candidates out.

pub mod options;
pub mod orchestrator;
pub mod universe;

pub use options::ScreeningOptions;
pub use orchestrator::Screener;
pub use universe::{candidate_universe, leading_sectors};

use crate::domain::{Market, TickerScoreRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningStatus {
    Completed,
    /// Foreign or institution flows were unavailable; nothing was scored.
    NoFlowData,
    /// Scoring ran but no ticker cleared the threshold.
    NoQualifyingTickers,
}

impl ScreeningStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScreeningStatus::Completed => "completed",
            ScreeningStatus::NoFlowData => "no_flow_data",
            ScreeningStatus::NoQualifyingTickers => "no_qualifying_tickers",
        }
    }
}

/// Per-ticker outcome counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTally {
    pub universe: usize,
    pub scored: usize,
    pub below_threshold: usize,
    pub insufficient_history: usize,
    pub no_data: usize,
    pub fetch_failed: usize,
    pub faults: usize,
}

impl OutcomeTally {
    pub fn completed(&self) -> usize {
        self.scored
            + self.below_threshold
            + self.insufficient_history
            + self.no_data
            + self.fetch_failed
            + self.faults
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningReport {
    pub as_of_date: NaiveDate,
    pub market: Market,
    pub status: ScreeningStatus,
    /// Score descending, ties by ticker.
    pub ranked: Vec<TickerScoreRecord>,
    pub tally: OutcomeTally,
    pub top_n: usize,
}

impl ScreeningReport {
    pub fn empty(as_of_date: NaiveDate, market: Market, status: ScreeningStatus, top_n: usize) -> Self {
        Self {
            as_of_date,
            market,
            status,
            ranked: Vec::new(),
            tally: OutcomeTally::default(),
            top_n,
        }
    }

    pub fn top_picks(&self) -> &[TickerScoreRecord] {
        &self.ranked[..self.top_n.min(self.ranked.len())]
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

/// Sorts by score descending; equal scores fall back to ticker order.
pub fn rank(records: &mut [TickerScoreRecord]) {
    records.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
}
