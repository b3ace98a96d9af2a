use crate::domain::Market;
use crate::signal::scoring::DEFAULT_MIN_SCORE;
use crate::signal::ScoringConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ScreeningOptions {
    pub market: Market,

    /// Top-N tickers taken from each of the foreign and institution flow tables.
    pub universe_per_side: usize,

    /// Top-N sectors by aggregate net value taken from each side.
    pub leading_sectors_top_n: usize,

    /// Concurrent per-ticker evaluations. Upstream sources throttle aggressive
    /// clients, so keep this small.
    pub workers: usize,

    /// Calendar days of price history requested per ticker.
    pub history_days: i64,

    /// Pause each worker takes before its price request.
    pub req_delay: Duration,

    pub min_score: f64,
    pub top_picks: usize,
}

impl Default for ScreeningOptions {
    fn default() -> Self {
        Self {
            market: Market::Kospi,
            universe_per_side: 50,
            leading_sectors_top_n: 5,
            workers: 4,
            history_days: 120,
            req_delay: Duration::ZERO,
            min_score: DEFAULT_MIN_SCORE,
            top_picks: 3,
        }
    }
}

impl ScreeningOptions {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("SWING_MARKET") {
            out.market = s.parse()?;
        }

        if let Ok(s) = std::env::var("SWING_UNIVERSE_PER_SIDE") {
            if let Ok(n) = s.parse::<usize>() {
                out.universe_per_side = n;
            }
        }

        if let Ok(s) = std::env::var("SWING_LEADING_SECTORS_TOP_N") {
            if let Ok(n) = s.parse::<usize>() {
                out.leading_sectors_top_n = n;
            }
        }

        if let Ok(s) = std::env::var("SWING_WORKERS") {
            if let Ok(n) = s.parse::<usize>() {
                out.workers = n;
            }
        }

        if let Ok(s) = std::env::var("SWING_HISTORY_DAYS") {
            if let Ok(n) = s.parse::<i64>() {
                out.history_days = n;
            }
        }

        if let Ok(s) = std::env::var("SWING_REQ_DELAY_MS") {
            if let Ok(n) = s.parse::<u64>() {
                out.req_delay = Duration::from_millis(n);
            }
        }

        if let Ok(s) = std::env::var("SWING_MIN_SCORE") {
            if let Ok(n) = s.parse::<f64>() {
                out.min_score = n;
            }
        }

        if let Ok(s) = std::env::var("SWING_TOP_PICKS") {
            if let Ok(n) = s.parse::<usize>() {
                out.top_picks = n;
            }
        }

        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.workers >= 1, "SWING_WORKERS must be >= 1");
        anyhow::ensure!(
            self.universe_per_side >= 1,
            "SWING_UNIVERSE_PER_SIDE must be >= 1"
        );
        // 60-bar statistics need roughly 90 calendar days.
        anyhow::ensure!(
            self.history_days >= 90,
            "SWING_HISTORY_DAYS must be >= 90 (got {})",
            self.history_days
        );
        anyhow::ensure!(
            self.min_score.is_finite(),
            "SWING_MIN_SCORE must be a finite number"
        );
        Ok(())
    }

    pub fn scoring(&self) -> ScoringConfig {
        ScoringConfig {
            min_score: self.min_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let opts = ScreeningOptions::default();
        opts.validate().unwrap();
        assert_eq!(opts.workers, 4);
        assert_eq!(opts.scoring().min_score, 20.0);
    }

    #[test]
    fn rejects_zero_workers_and_short_history() {
        let opts = ScreeningOptions {
            workers: 0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let opts = ScreeningOptions {
            history_days: 30,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }
}
