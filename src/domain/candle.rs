use serde::{Deserialize, Serialize};

/// One OHLCV bar. While `is_final` is false the bar is still forming and is
/// identified by `open_time`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,

    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,

    pub volume: f64,
    pub is_final: bool,
}

impl Candle {
    // A constructor for convenience. close_time follows Binance (last ms of the bar).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        open_time: i64,
        interval_ms: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        is_final: bool,
    ) -> Self {
        Candle {
            open_time,
            close_time: open_time + interval_ms - 1,
            open,
            high,
            low,
            close,
            volume,
            is_final,
        }
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Prices must be finite and positive with low <= open/close <= high.
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p > 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
            && self.low <= self.high
            && self.low <= self.open.min(self.close)
            && self.high >= self.open.max(self.close)
            && self.close_time >= self.open_time
    }
}

/// A bar tagged with the symbol it belongs to, as delivered by the live feed.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveCandle {
    pub symbol: String,
    pub candle: Candle,
}
