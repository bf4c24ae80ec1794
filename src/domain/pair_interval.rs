use {
    crate::{config::BINANCE_QUOTE_ASSETS, utils::TimeUtils},
    serde::{Deserialize, Serialize},
};

#[derive(Serialize, Deserialize, Debug, Clone, Hash, Eq, PartialEq)]
pub struct PairInterval {
    pub name: String,
    pub interval_ms: i64,
}

impl PairInterval {
    pub fn new(name: impl Into<String>, interval_ms: i64) -> Self {
        Self {
            name: name.into().to_uppercase(),
            interval_ms,
        }
    }

    pub(crate) fn get_base(text: &str) -> Option<&str> {
        let quote = Self::get_quote(text)?;
        text.strip_suffix(quote)
    }

    pub(crate) fn get_quote(text: &str) -> Option<&str> {
        BINANCE_QUOTE_ASSETS
            .iter()
            .find(|&&ext| text.ends_with(ext))
            .copied()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval_str(&self) -> &'static str {
        TimeUtils::interval_to_string(self.interval_ms)
    }

    /// Stream name for the combined websocket endpoint, e.g. `btcusdt@kline_1m`.
    pub fn stream_name(&self) -> String {
        format!("{}@kline_{}", self.name.to_lowercase(), self.interval_str())
    }
}

impl std::fmt::Display for PairInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let base = Self::get_base(&self.name).unwrap_or("?");
        let quote = Self::get_quote(&self.name).unwrap_or("?");
        write!(f, "{}/{} {}", base, quote, self.interval_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_name_is_lowercase_kline_topic() {
        let pair = PairInterval::new("btcusdt", TimeUtils::MS_IN_5_MIN);
        assert_eq!(pair.name(), "BTCUSDT");
        assert_eq!(pair.stream_name(), "btcusdt@kline_5m");
        assert_eq!(pair.to_string(), "BTC/USDT 5m");
    }

    #[test]
    fn unknown_quote_displays_placeholder() {
        let pair = PairInterval::new("FOOBAR", TimeUtils::MS_IN_MIN);
        assert_eq!(pair.to_string(), "?/? 1m");
    }
}
