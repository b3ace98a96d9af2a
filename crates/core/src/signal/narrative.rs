//! Human-readable rationale attached to every scored ticker.

use crate::domain::SubScores;
use crate::signal::scoring::{CandlePattern, FlowPosition, MaTrend};
use crate::signal::targets::TradePlan;

pub struct NarrativeFacts<'a> {
    pub score: f64,
    pub sub_scores: &'a SubScores,
    pub sector: &'a str,
    pub in_leading_sector: bool,
    pub flows: &'a FlowPosition,
    pub trend: MaTrend,
    pub ma5: f64,
    pub ma20: f64,
    pub ma60: Option<f64>,
    pub close: f64,
    pub volume_ratio: f64,
    pub rsi: Option<f64>,
    pub candle: CandlePattern,
    pub change_pct: f64,
    pub ret_5d: f64,
    pub ret_20d: f64,
    pub pbr: f64,
    pub dividend_yield: f64,
    pub plan: &'a TradePlan,
    pub high_60d: Option<f64>,
    pub from_high: Option<f64>,
    pub ma20_gap: f64,
}

pub fn grade(score: f64) -> (&'static str, &'static str) {
    if score >= 60.0 {
        (
            "Very strong buy signal",
            "Flows, technicals and valuation all line up for a short swing entry.",
        )
    } else if score >= 45.0 {
        (
            "Strong buy signal",
            "Most indicators support further upside with a favourable reward to risk.",
        )
    } else if score >= 30.0 {
        (
            "Watchlist, conditional buy",
            "Some indicators are positive; scale in and wait for confirmation.",
        )
    } else {
        (
            "Monitoring",
            "No clear signal yet; keep watching for a trend change.",
        )
    }
}

pub fn compose(f: &NarrativeFacts<'_>) -> String {
    let mut sections = Vec::with_capacity(7);

    let (title, summary) = grade(f.score);
    sections.push(format!("[{title}] {summary}"));

    if f.in_leading_sector {
        sections.push(format!(
            "> Sector ({:.0} pts): '{}' is among today's leading sectors by foreign and institutional net buying.",
            f.sub_scores.sector, f.sector
        ));
    } else if !f.sector.is_empty() {
        sections.push(format!(
            "> Sector: '{}' is not among the leading sectors; the case rests on the stock itself.",
            f.sector
        ));
    }

    sections.push(flow_section(f));
    sections.push(technical_section(f));
    sections.push(momentum_section(f));
    sections.push(fundamental_section(f));
    sections.push(strategy_section(f));

    sections.join("\n")
}

fn flow_section(f: &NarrativeFacts<'_>) -> String {
    let p = f.flows;
    let mut s = format!("> Flows ({:.1} pts): ", f.sub_scores.flow);
    if p.foreign_buy && p.institution_buy {
        s.push_str(&format!(
            "Foreign ({:+.0}억) and institutional ({:+.0}억) pincer buying on the same day.",
            p.foreign_value / 1e8,
            p.institution_value / 1e8
        ));
    } else if p.foreign_buy {
        s.push_str(&format!(
            "Foreign investors net bought {:+.0}억.",
            p.foreign_value / 1e8
        ));
    } else if p.institution_buy {
        s.push_str(&format!(
            "Institutions net bought {:+.0}억.",
            p.institution_value / 1e8
        ));
    } else {
        s.push_str("No dominant buyer today; read the technicals first.");
        return s;
    }
    if p.individual_sell {
        s.push_str(" Retail investors are selling into that demand.");
    }
    s
}

fn technical_section(f: &NarrativeFacts<'_>) -> String {
    let mut items = Vec::with_capacity(4);

    items.push(match f.trend {
        MaTrend::GoldenAlignment { spread_pct } => format!(
            "- MA alignment: MA5 {} > MA20 {} > MA60 {}, {:+.1}% above MA60.",
            won(f.ma5),
            won(f.ma20),
            f.ma60.map(won).unwrap_or_default(),
            spread_pct
        ),
        MaTrend::ShortAboveMid => format!(
            "- MA5 {} is above MA20 {}; an MA60 break would confirm the uptrend.",
            won(f.ma5),
            won(f.ma20)
        ),
        MaTrend::AboveMid => format!(
            "- Close {} holds above MA20 {}.",
            won(f.close),
            won(f.ma20)
        ),
        MaTrend::BelowMid => format!(
            "- Close {} sits below MA20 {}; wait for a reclaim.",
            won(f.close),
            won(f.ma20)
        ),
    });

    let v = f.volume_ratio;
    items.push(if v >= 2.0 {
        format!("- Volume {v:.1}x the 20-day average: heavy new demand.")
    } else if v >= 1.5 {
        format!("- Volume {v:.1}x the 20-day average: elevated participation.")
    } else if v >= 1.2 {
        format!("- Volume {v:.1}x the 20-day average: slightly active.")
    } else {
        format!("- Volume {v:.1}x the 20-day average: unremarkable.")
    });

    if let Some(r) = f.rsi {
        items.push(if r <= 30.0 {
            format!("- RSI {r:.0}: oversold, watch for a volume-backed rebound.")
        } else if r <= 45.0 {
            format!("- RSI {r:.0}: pullback zone, a textbook swing entry.")
        } else if r <= 60.0 {
            format!("- RSI {r:.0}: healthy trend without overheating.")
        } else if r <= 75.0 {
            format!("- RSI {r:.0}: strong momentum, consider scaling in and out.")
        } else {
            format!("- RSI {r:.0}: overbought, a short-term pullback is likely.")
        });
    }

    match f.candle {
        CandlePattern::StrongBullish => items.push(format!(
            "- Candle: long bullish body, {:+.1}% on the day.",
            f.change_pct
        )),
        CandlePattern::Bullish => items.push(format!(
            "- Candle: solid bullish close, {:+.1}% on the day.",
            f.change_pct
        )),
        CandlePattern::UpperWick => {
            items.push("- Candle: long upper wick, supply being tested.".to_string())
        }
        CandlePattern::Plain => {}
    }

    format!(
        "> Technicals ({:.1} pts):\n{}",
        f.sub_scores.technical,
        items.join("\n")
    )
}

fn momentum_section(f: &NarrativeFacts<'_>) -> String {
    let body = if f.ret_5d > 5.0 && f.ret_20d > 10.0 {
        format!(
            "5-day {:+.1}% and 20-day {:+.1}%: short and medium term momentum both strong.",
            f.ret_5d, f.ret_20d
        )
    } else if f.ret_5d > 0.0 {
        format!(
            "5-day {:+.1}%, 20-day {:+.1}%: steady advance.",
            f.ret_5d, f.ret_20d
        )
    } else {
        format!(
            "5-day {:+.1}%, 20-day {:+.1}%: short-term consolidation.",
            f.ret_5d, f.ret_20d
        )
    };
    format!("> Momentum ({:.1} pts): {body}", f.sub_scores.momentum)
}

fn fundamental_section(f: &NarrativeFacts<'_>) -> String {
    let mut s = format!("> Fundamentals ({:.1} pts): ", f.sub_scores.fundamental);
    let pbr = f.pbr;
    if pbr <= 0.0 {
        s.push_str("PBR unavailable.");
    } else if pbr < 0.7 {
        s.push_str(&format!("PBR {pbr:.2}, deeply below book value."));
    } else if pbr < 1.0 {
        s.push_str(&format!("PBR {pbr:.2}, below book value."));
    } else if pbr < 2.0 {
        s.push_str(&format!("PBR {pbr:.2}, fairly valued."));
    } else {
        s.push_str(&format!("PBR {pbr:.2}, rich valuation."));
    }
    if f.dividend_yield > 0.0 {
        s.push_str(&format!(" Dividend yield {:.1}%.", f.dividend_yield));
    }
    s
}

fn strategy_section(f: &NarrativeFacts<'_>) -> String {
    let plan = f.plan;
    let mut s = format!(
        "> Strategy: target {} ({:+.1}%), stop {} ({:+.1}%), reward/risk 1:{:.1}.",
        won(plan.target_price),
        plan.target_pct,
        won(plan.stop_price),
        plan.stop_pct,
        plan.reward_risk()
    );
    if let (Some(high), Some(pct)) = (f.high_60d, f.from_high) {
        if pct >= 95.0 {
            s.push_str(&format!(
                " Trading at {pct:.0}% of the 60-day high {}, testing a breakout.",
                won(high)
            ));
        } else if pct >= 85.0 {
            s.push_str(&format!(
                " At {pct:.0}% of the 60-day high {}, with room to run.",
                won(high)
            ));
        }
    }
    if f.ma20_gap > 0.0 {
        s.push_str(&format!(" {:+.1}% above MA20.", f.ma20_gap));
    } else {
        s.push_str(&format!(
            " {:+.1}% versus MA20; enter after it is reclaimed.",
            f.ma20_gap
        ));
    }
    s
}

/// Whole-won amount with thousands separators.
fn won(v: f64) -> String {
    let n = v.round() as i64;
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts<'a>(
        sub: &'a SubScores,
        flows: &'a FlowPosition,
        plan: &'a TradePlan,
    ) -> NarrativeFacts<'a> {
        NarrativeFacts {
            score: 48.0,
            sub_scores: sub,
            sector: "Chemicals",
            in_leading_sector: false,
            flows,
            trend: MaTrend::AboveMid,
            ma5: 9_950.0,
            ma20: 9_900.0,
            ma60: None,
            close: 10_000.0,
            volume_ratio: 1.0,
            rsi: Some(52.0),
            candle: CandlePattern::Plain,
            change_pct: 0.4,
            ret_5d: 1.0,
            ret_20d: 2.0,
            pbr: 0.0,
            dividend_yield: 0.0,
            plan,
            high_60d: Some(12_000.0),
            from_high: Some(83.3),
            ma20_gap: 1.0,
        }
    }

    #[test]
    fn formats_won_with_separators() {
        assert_eq!(won(0.0), "0");
        assert_eq!(won(999.0), "999");
        assert_eq!(won(10_500.0), "10,500");
        assert_eq!(won(1_234_567.4), "1,234,567");
        assert_eq!(won(-2_500.0), "-2,500");
    }

    #[test]
    fn grade_bands() {
        assert_eq!(grade(60.0).0, "Very strong buy signal");
        assert_eq!(grade(45.0).0, "Strong buy signal");
        assert_eq!(grade(30.0).0, "Watchlist, conditional buy");
        assert_eq!(grade(29.9).0, "Monitoring");
    }

    #[test]
    fn sections_follow_inputs() {
        let sub = SubScores::default();
        let flows = FlowPosition::default();
        let plan = TradePlan {
            target_price: 10_500.0,
            target_pct: 5.0,
            stop_price: 9_800.0,
            stop_pct: -2.0,
        };
        let text = compose(&facts(&sub, &flows, &plan));
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("[Strong buy signal]"));
        assert!(text.contains("'Chemicals' is not among the leading sectors"));
        assert!(text.contains("No dominant buyer"));
        assert!(text.contains("PBR unavailable."));
        assert!(text.contains("target 10,500 (+5.0%), stop 9,800 (-2.0%), reward/risk 1:2.5"));
        assert!(!text.contains("60-day high"));
    }
}
