mod backfill;
mod error;
mod kline_message;
mod price_stream;
mod provider;
mod rate_limiter;
mod storage;

pub use {
    backfill::BackfillLoader,
    error::FeedError,
    kline_message::parse_kline_message,
    price_stream::{
        ConnectionShard, ConnectionStatus, FeedConnection, FeedTransport, HeartbeatAction,
        HeartbeatMonitor, ShardStatus, StatusBoard, TungsteniteTransport, WireMessage,
        build_combined_stream_url, partition_symbols,
    },
    provider::{BinanceProvider, MarketDataProvider},
    rate_limiter::GlobalRateLimiter,
    storage::{MarketDataStorage, SqliteStorage},
};
