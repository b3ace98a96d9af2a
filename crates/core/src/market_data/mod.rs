pub mod cache;
pub mod fetched;
pub mod gateway;
pub mod global;
pub mod http;
pub mod kind;
pub mod krx;
pub mod naver;
pub mod normalize;
pub mod provider;
pub mod yahoo;

pub use cache::{CacheTtls, TtlCache};
pub use fetched::Fetched;
pub use gateway::MarketDataGateway;
pub use global::GlobalSource;
pub use krx::KrxSource;
pub use provider::MarketDataSource;
