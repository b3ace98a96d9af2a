//! Rolling statistics over daily bars.
//!
//! All functions look at the tail of the input and return `None` when the
//! window is not fully populated, mirroring a rolling window with
//! `min_periods == window`.

use crate::domain::DailyBar;

pub const RSI_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;

/// Mean of the last `period` values.
pub fn sma_last(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Maximum of the last `period` values.
pub fn max_last(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    values[values.len() - period..]
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

/// Percent change from the value `lag` positions before the last one.
///
/// `lag == 4` compares the last close with the 5th-from-last close.
pub fn pct_change_from(values: &[f64], lag: usize) -> Option<f64> {
    if values.len() <= lag {
        return None;
    }
    let last = values[values.len() - 1];
    let base = values[values.len() - 1 - lag];
    if base == 0.0 {
        return None;
    }
    Some((last - base) / base * 100.0)
}

/// Last value of a bias-adjusted exponentially weighted mean with smoothing `alpha`.
///
/// Each output is `sum((1-a)^i * x[t-i]) / sum((1-a)^i)`; `None` until
/// `min_periods` observations have been seen.
pub fn ewm_adjusted_last(values: &[f64], alpha: f64, min_periods: usize) -> Option<f64> {
    let decay = 1.0 - alpha;
    let mut num = 0.0;
    let mut den = 0.0;
    let mut seen = 0usize;
    for &v in values {
        num = v + decay * num;
        den = 1.0 + decay * den;
        seen += 1;
    }
    if seen == 0 || seen < min_periods {
        return None;
    }
    Some(num / den)
}

/// RSI over closes using Wilder's alpha (`1/period`, i.e. com = period - 1).
///
/// Returns `None` with fewer than `period` price changes or when the series
/// never moved. A series with no losses reads 100.
pub fn rsi_last(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < 2 {
        return None;
    }
    let mut gains = Vec::with_capacity(closes.len() - 1);
    let mut losses = Vec::with_capacity(closes.len() - 1);
    for w in closes.windows(2) {
        let delta = w[1] - w[0];
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }

    let alpha = 1.0 / period as f64;
    let avg_gain = ewm_adjusted_last(&gains, alpha, period)?;
    let avg_loss = ewm_adjusted_last(&losses, alpha, period)?;

    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return None;
        }
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// True range per bar. The first bar has no previous close and uses `high - low`.
pub fn true_range(bars: &[DailyBar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let hl = bar.high - bar.low;
        let tr = match i.checked_sub(1).and_then(|p| bars.get(p)) {
            Some(prev) => hl
                .max((bar.high - prev.close).abs())
                .max((bar.low - prev.close).abs()),
            None => hl,
        };
        out.push(tr);
    }
    out
}

/// Simple rolling mean of the true range over the last `period` bars.
pub fn atr_last(bars: &[DailyBar], period: usize) -> Option<f64> {
    sma_last(&true_range(bars), period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "expected {b}, got {a}");
    }

    fn bar(day: u32, high: f64, low: f64, close: f64) -> DailyBar {
        DailyBar {
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn sma_and_max_need_a_full_window() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        approx(sma_last(&v, 5).unwrap(), 3.0);
        approx(sma_last(&v, 2).unwrap(), 4.5);
        assert_eq!(sma_last(&v, 6), None);
        assert_eq!(max_last(&[3.0, 9.0, 1.0], 2), Some(9.0));
        assert_eq!(max_last(&[3.0], 2), None);
    }

    #[test]
    fn pct_change_uses_lagged_base() {
        let closes = [100.0, 50.0, 110.0];
        approx(pct_change_from(&closes, 2).unwrap(), 10.0);
        assert_eq!(pct_change_from(&closes, 3), None);
        assert_eq!(pct_change_from(&[0.0, 5.0], 1), None);
    }

    #[test]
    fn adjusted_ewm_weights_recent_values_more() {
        // (3 + 0.5*2 + 0.25*1) / (1 + 0.5 + 0.25)
        approx(ewm_adjusted_last(&[1.0, 2.0, 3.0], 0.5, 1).unwrap(), 4.25 / 1.75);
        assert_eq!(ewm_adjusted_last(&[1.0, 2.0], 0.5, 3), None);
    }

    #[test]
    fn rsi_edges() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi_last(&rising, RSI_PERIOD), Some(100.0));

        let falling: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        approx(rsi_last(&falling, RSI_PERIOD).unwrap(), 0.0);

        let flat = vec![100.0; 30];
        assert_eq!(rsi_last(&flat, RSI_PERIOD), None);

        // 14 closes give only 13 changes.
        let short: Vec<f64> = (0..14).map(|i| 100.0 + (i % 3) as f64).collect();
        assert_eq!(rsi_last(&short, RSI_PERIOD), None);
    }

    #[test]
    fn rsi_is_balanced_for_symmetric_moves() {
        let mut closes = vec![100.0];
        for i in 0..40 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 2.0 } else { last - 2.0 });
        }
        let rsi = rsi_last(&closes, RSI_PERIOD).unwrap();
        assert!((40.0..60.0).contains(&rsi), "rsi {rsi}");
    }

    #[test]
    fn true_range_uses_previous_close_gaps() {
        let bars = vec![bar(2, 105.0, 95.0, 100.0), bar(5, 112.0, 108.0, 110.0)];
        let tr = true_range(&bars);
        approx(tr[0], 10.0);
        // gap up: |112 - 100| beats 112 - 108
        approx(tr[1], 12.0);
        assert_eq!(atr_last(&bars, 3), None);
        approx(atr_last(&bars, 2).unwrap(), 11.0);
    }
}
