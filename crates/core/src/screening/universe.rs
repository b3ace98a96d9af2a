use crate::domain::FlowSnapshot;
use std::collections::{BTreeSet, HashSet};

/// Top `per_side` tickers by net value from each side, deduplicated.
///
/// Foreign order comes first, followed by institution-only tickers.
pub fn candidate_universe(
    foreign: &FlowSnapshot,
    institution: &FlowSnapshot,
    per_side: usize,
) -> Vec<String> {
    let mut seen = HashSet::new();
    foreign
        .top(per_side)
        .iter()
        .chain(institution.top(per_side))
        .filter(|r| seen.insert(r.ticker.as_str()))
        .map(|r| r.ticker.clone())
        .collect()
}

/// Union of the top `top_n` sectors by aggregate net value on each side.
///
/// Unclassified rows never count toward a sector.
pub fn leading_sectors(
    foreign: &FlowSnapshot,
    institution: &FlowSnapshot,
    top_n: usize,
) -> BTreeSet<String> {
    [foreign, institution]
        .into_iter()
        .flat_map(|snap| top_sectors(snap, top_n))
        .collect()
}

fn top_sectors(snap: &FlowSnapshot, top_n: usize) -> Vec<String> {
    let mut totals: Vec<(String, f64)> = snap.sector_totals().into_iter().collect();
    totals.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    totals.into_iter().take(top_n).map(|(s, _)| s).collect()
}
