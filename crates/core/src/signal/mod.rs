pub mod indicators;
pub mod narrative;
pub mod scoring;
pub mod targets;

pub use scoring::{
    compute_signal, MarketContext, ScoringConfig, SignalError, SignalOutcome, MIN_BARS,
};
pub use targets::{plan_trade, TradePlan};
