pub mod config;
pub mod config_loader;
pub mod error;
pub mod signal;
pub mod snapshot;
pub mod timeframe;
pub mod trace;

pub use config::{
    CacheConfig, CacheTtlConfig, DebugConfig, DebugLevel, EngineConfig, TimeframeSpec,
    TimeframesConfig, TransformConfig, ValidationConfig,
};
pub use config_loader::{ConfigLoader, DEFAULT_CONFIG_PATH};
pub use error::EngineError;
pub use signal::{
    clamp_score, ComponentBreakdown, ComponentResult, ConfluenceResult, DataClass,
    IndicatorAdapter, ResultMetadata, NEUTRAL_SCORE,
};
pub use snapshot::{
    Frame, Liquidation, MarketSnapshot, OrderBook, PositionSide, PriceLevel, Sentiment, Ticker,
    Trade, TradeSide, REQUIRED_COLUMNS,
};
pub use timeframe::{parse_interval_minutes, TimeframeRole};
pub use trace::{FlowEvent, FlowTrace};
