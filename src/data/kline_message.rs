//! Decoding of Binance kline stream payloads.
//!
//! Accepts both the combined-stream envelope (`{"stream":..,"data":{..}}`)
//! and a bare kline event. Prices arrive as strings.

use serde::Deserialize;

use super::FeedError;
use crate::domain::{Candle, LiveCandle};

#[derive(Debug, Deserialize)]
struct CombinedEnvelope {
    data: KlineEvent,
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    is_final: bool,
}

fn parse_price(field: &str, text: &str) -> Result<f64, FeedError> {
    text.parse::<f64>()
        .map_err(|_| FeedError::MalformedMessage(format!("{} is not a number: {:?}", field, text)))
}

/// Decode one text frame into a validated candle.
pub fn parse_kline_message(text: &str) -> Result<LiveCandle, FeedError> {
    let event = match serde_json::from_str::<CombinedEnvelope>(text) {
        Ok(envelope) => envelope.data,
        Err(_) => serde_json::from_str::<KlineEvent>(text)?,
    };

    if event.event_type != "kline" {
        return Err(FeedError::MalformedMessage(format!(
            "unexpected event type {}",
            event.event_type
        )));
    }
    if event.symbol.is_empty() {
        return Err(FeedError::MalformedMessage("empty symbol".into()));
    }

    let k = event.kline;
    let candle = Candle {
        open_time: k.open_time,
        close_time: k.close_time,
        open: parse_price("open", &k.open)?,
        high: parse_price("high", &k.high)?,
        low: parse_price("low", &k.low)?,
        close: parse_price("close", &k.close)?,
        volume: parse_price("volume", &k.volume)?,
        is_final: k.is_final,
    };

    if !candle.is_well_formed() {
        return Err(FeedError::MalformedMessage(format!(
            "inconsistent kline for {} at {}",
            event.symbol, candle.open_time
        )));
    }

    Ok(LiveCandle {
        symbol: event.symbol.to_uppercase(),
        candle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combined(symbol: &str, open: &str, close: &str, is_final: bool) -> String {
        format!(
            r#"{{"stream":"{lower}@kline_1m","data":{{"e":"kline","E":1,"s":"{symbol}","k":{{"t":1700000000000,"T":1700000059999,"s":"{symbol}","i":"1m","o":"{open}","c":"{close}","h":"101.0","l":"99.0","v":"12.5","x":{is_final}}}}}}}"#,
            lower = symbol.to_lowercase(),
        )
    }

    #[test]
    fn parses_combined_stream_frame() {
        let live = parse_kline_message(&combined("BTCUSDT", "100.0", "100.5", true)).unwrap();
        assert_eq!(live.symbol, "BTCUSDT");
        assert_eq!(live.candle.open_time, 1_700_000_000_000);
        assert_eq!(live.candle.close_time, 1_700_000_059_999);
        assert_eq!(live.candle.close, 100.5);
        assert_eq!(live.candle.volume, 12.5);
        assert!(live.candle.is_final);
    }

    #[test]
    fn parses_bare_event() {
        let text = r#"{"e":"kline","s":"ethusdt","k":{"t":0,"T":59999,"o":"1","h":"2","l":"0.5","c":"1.5","v":"0","x":false}}"#;
        let live = parse_kline_message(text).unwrap();
        assert_eq!(live.symbol, "ETHUSDT");
        assert!(!live.candle.is_final);
    }

    #[test]
    fn rejects_garbage_and_bad_numbers() {
        let cases = [
            "not json".to_string(),
            r#"{"result":null,"id":1}"#.to_string(),
            combined("BTCUSDT", "abc", "100.5", true),
            // Close above high.
            combined("BTCUSDT", "100.0", "150.0", true),
        ];
        for text in &cases {
            assert!(matches!(
                parse_kline_message(text),
                Err(FeedError::MalformedMessage(_))
            ));
        }
    }
}
