use serde::{Deserialize, Serialize};

/// Per-category contributions to the composite score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub sector: f64,
    pub flow: f64,
    pub technical: f64,
    pub momentum: f64,
    pub fundamental: f64,
    pub position: f64,
}

impl SubScores {
    pub fn total(&self) -> f64 {
        self.sector + self.flow + self.technical + self.momentum + self.fundamental + self.position
    }
}

/// Display tags: duplicates are ignored, first insertion order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.0.contains(&tag) {
            self.0.push(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for Tags {
    fn from(v: Vec<String>) -> Self {
        let mut out = Tags::new();
        for t in v {
            out.push(t);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerScoreRecord {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub close: f64,
    pub change_pct: f64,
    pub score: f64,
    pub sub_scores: SubScores,
    pub tags: Tags,
    pub target_price: f64,
    pub target_pct: f64,
    pub stop_price: f64,
    pub stop_pct: f64,
    pub narrative: String,
    pub rsi: Option<f64>,
    pub volume_ratio: f64,
    pub pbr: f64,
    pub roe: Option<f64>,
    pub dividend_yield: f64,
}
