use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};

const KST_OFFSET_HOURS: i64 = 9;

// Daily investor and price tables are final a few minutes after the 15:30 close.
const DATA_CUTOFF_HOUR_KST: u32 = 15;
const DATA_CUTOFF_MINUTE_KST: u32 = 40;

/// How many weekdays are probed for benchmark data before giving up.
pub const SESSION_PROBE_DAYS: usize = 7;

pub fn parse_as_of_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date (expected YYYY-MM-DD): {s}"))
}

pub fn kst_datetime(now_utc: DateTime<Utc>) -> NaiveDateTime {
    now_utc.naive_utc() + Duration::hours(KST_OFFSET_HOURS)
}

/// Saturday goes back one day, Sunday two.
pub fn roll_back_weekend(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date - Duration::days(2),
        _ => date,
    }
}

pub fn previous_weekday(date: NaiveDate) -> NaiveDate {
    roll_back_weekend(date - Duration::days(1))
}

/// First session worth probing at `now_utc`.
///
/// Before the KST data cutoff the previous calendar day is used, then
/// weekends roll back to Friday.
pub fn session_anchor(now_utc: DateTime<Utc>) -> NaiveDate {
    let local = kst_datetime(now_utc);
    let mut date = local.date();
    let cutoff_reached =
        (local.hour(), local.minute()) >= (DATA_CUTOFF_HOUR_KST, DATA_CUTOFF_MINUTE_KST);
    if !cutoff_reached {
        date -= Duration::days(1);
    }
    roll_back_weekend(date)
}

/// `count` weekdays walking backwards from `anchor` (inclusive).
pub fn probe_candidates(anchor: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(count);
    let mut cur = roll_back_weekend(anchor);
    for _ in 0..count {
        out.push(cur);
        cur = previous_weekday(cur);
    }
    out
}

/// Yesterday (KST) rolled past weekends. Not verified against any data source.
pub fn unverified_fallback(now_utc: DateTime<Utc>) -> NaiveDate {
    roll_back_weekend(kst_datetime(now_utc).date() - Duration::days(1))
}
