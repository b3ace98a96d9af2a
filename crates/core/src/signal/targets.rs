use serde::{Deserialize, Serialize};

const ATR_STOP_MULTIPLE: f64 = 2.0;
const REWARD_TO_RISK: f64 = 2.0;
const FALLBACK_STOP_RATIO: f64 = 0.95;
const MIN_TARGET_GAIN: f64 = 0.05;
const MIN_TICK: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub target_price: f64,
    pub target_pct: f64,
    pub stop_price: f64,
    pub stop_pct: f64,
}

impl TradePlan {
    /// |target%| / |stop%|, zero when the stop sits on the close.
    pub fn reward_risk(&self) -> f64 {
        if self.stop_pct == 0.0 {
            0.0
        } else {
            (self.target_pct / self.stop_pct).abs()
        }
    }
}

/// Derives whole-won target and stop prices from ATR and the 20-day mean.
///
/// The stop is the highest of `close - 2*ATR` and `MA20` that lies strictly
/// between zero and the close, else 95% of the close. The target sits two
/// risk units above the close with a floor of +5%. Prices never drop below
/// one won and the target stays at least one won above the stop.
pub fn plan_trade(close: f64, atr: f64, ma20: f64) -> TradePlan {
    let atr_stop = (close - atr * ATR_STOP_MULTIPLE).trunc();
    let ma_stop = ma20.trunc();

    let stop_price = [atr_stop, ma_stop]
        .into_iter()
        .filter(|p| p.is_finite() && *p > 0.0 && *p < close)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
        .unwrap_or_else(|| (close * FALLBACK_STOP_RATIO).trunc().max(MIN_TICK));

    let risk = close - stop_price;
    let mut target_price = (close + risk * REWARD_TO_RISK).trunc();
    if (target_price - close) / close < MIN_TARGET_GAIN {
        target_price = (close * (1.0 + MIN_TARGET_GAIN)).trunc();
    }
    let target_price = target_price.max(stop_price + MIN_TICK);

    TradePlan {
        target_price,
        target_pct: round_to((target_price - close) / close * 100.0, 1),
        stop_price,
        stop_pct: round_to((stop_price - close) / close * 100.0, 1),
    }
}

pub(crate) fn round_to(v: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (v * f).round() / f
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_highest_stop_below_close() {
        // ATR stop 9_600, MA20 9_800 -> MA20 wins.
        let plan = plan_trade(10_000.0, 200.0, 9_800.4);
        assert_eq!(plan.stop_price, 9_800.0);
        // 10_400 is only +4%, so the +5% floor applies.
        assert_eq!(plan.target_price, 10_500.0);
        assert_eq!(plan.stop_pct, -2.0);
        assert_eq!(plan.target_pct, 5.0);
    }

    #[test]
    fn floors_target_at_five_percent() {
        // Tiny ATR and MA20 just under the close -> risk 10, target would be +0.2%.
        let plan = plan_trade(10_000.0, 5.0, 9_990.0);
        assert_eq!(plan.stop_price, 9_990.0);
        assert_eq!(plan.target_price, 10_500.0);
        assert!(plan.reward_risk() > 1.0);
    }

    #[test]
    fn falls_back_to_five_percent_stop() {
        // MA20 above close and ATR stop non-positive.
        let plan = plan_trade(10_000.0, 6_000.0, 10_500.0);
        assert_eq!(plan.stop_price, 9_500.0);
        assert_eq!(plan.target_price, 11_000.0);
        assert_eq!(plan.stop_pct, -5.0);
        assert_eq!(plan.target_pct, 10.0);
    }

    #[test]
    fn target_above_stop_above_zero() {
        for (close, atr, ma20) in [
            (1_000.0, 10.0, 990.0),
            (55_300.0, 2_100.0, 51_000.0),
            (870.0, 900.0, 2_000.0),
            (123_456.0, 0.0, 123_456.0),
        ] {
            let plan = plan_trade(close, atr, ma20);
            assert!(plan.stop_price > 0.0, "{plan:?}");
            assert!(plan.target_price > plan.stop_price, "{plan:?}");
            assert!(plan.stop_price < close, "{plan:?}");
        }
    }

    #[test]
    fn sub_two_won_close_keeps_a_positive_stop() {
        let plan = plan_trade(1.5, 1.0, 3.0);
        assert_eq!(plan.stop_price, 1.0);
        assert_eq!(plan.target_price, 2.0);

        let plan = plan_trade(1.0, 0.0, 1.0);
        assert_eq!(plan.stop_price, 1.0);
        assert!(plan.target_price > plan.stop_price, "{plan:?}");
    }
}
