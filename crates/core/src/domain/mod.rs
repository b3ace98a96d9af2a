pub mod market;
pub mod score;

pub use market::{
    BenchmarkIndex, DailyBar, FlowRow, FlowSnapshot, FundamentalRow, FundamentalSnapshot,
    InvestorCategory, ListingRow, Market, NetPurchaseRow, PriceSeries, SectorEntry,
    SectorIndexMembers, SectorMap,
};
pub use score::{SubScores, Tags, TickerScoreRecord};
