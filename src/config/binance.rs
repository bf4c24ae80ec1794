use serde::{Deserialize, Serialize};

pub struct BinanceApiConfig {
    pub timeout_ms: u64,
    pub retries: u32,
    pub backoff_ms: u64,
}

impl Default for BinanceApiConfig {
    fn default() -> Self {
        Self {
            timeout_ms: BINANCE.client.timeout_ms,
            retries: BINANCE.client.retries,
            backoff_ms: BINANCE.client.backoff_ms,
        }
    }
}

/// REST constraints: 1000 klines, weight budget, call costs.
pub struct RestLimits {
    pub klines_limit: i32,
    pub weight_limit_minute: u32,
    pub kline_call_weight: u32,
}

/// Live stream tuning. Copied into `SentinelSettings` so a config file can override it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    pub max_streams_per_connection: usize,
    /// Fixed delay before every reconnect attempt.
    pub reconnect_delay_sec: u64,
    /// Upper bound on one connect attempt, TLS handshake included.
    pub connect_timeout_sec: u64,
    pub heartbeat_interval_sec: u64,
    /// Consecutive unanswered pings before the socket is torn down.
    pub max_missed_acks: u32,
}

impl Default for WsConfig {
    fn default() -> Self {
        BINANCE.ws
    }
}

pub struct ClientDefaults {
    pub timeout_ms: u64,
    pub retries: u32,
    pub backoff_ms: u64,
}

pub const BINANCE_PAIRS_FILENAME: &str = "pairs.txt";

/// Checked in order, first matching suffix wins.
pub const BINANCE_QUOTE_ASSETS: &[&str] = &["FDUSD", "USDT", "USDC", "BTC", "ETH", "BNB"];

pub struct BinanceConfig {
    pub combined_base_url: &'static str,
    pub limits: RestLimits,
    pub ws: WsConfig,
    pub client: ClientDefaults,
}

pub const BINANCE: BinanceConfig = BinanceConfig {
    combined_base_url: "wss://stream.binance.com:9443/stream?streams=",
    limits: RestLimits {
        klines_limit: 1000,
        weight_limit_minute: 6000,
        kline_call_weight: 2,
    },
    ws: WsConfig {
        max_streams_per_connection: 200,
        reconnect_delay_sec: 5,
        connect_timeout_sec: 10,
        heartbeat_interval_sec: 20,
        max_missed_acks: 3,
    },
    client: ClientDefaults {
        timeout_ms: 5000,
        retries: 5,
        backoff_ms: 5000,
    },
};
