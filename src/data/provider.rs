use std::time::Duration;

use async_trait::async_trait;
use binance_sdk::{
    config::ConfigurationRestApi,
    errors::ConnectorError,
    spot::{
        SpotRestApi,
        rest_api::{KlinesIntervalEnum, KlinesItemInner, KlinesParams, RestApi},
    },
};

use crate::config::{BINANCE, BinanceApiConfig};
use crate::data::{FeedError, GlobalRateLimiter};
use crate::domain::{Candle, PairInterval};
use crate::utils::{TimeUtils, now_timestamp_ms};

/// Exchange bans and 429s carry no usable header through the SDK, so wait out
/// the weight window.
const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(60);

/// Source of historical bars used to warm the windows.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// The newest `limit` bars, oldest first. The last bar may still be forming.
    async fn fetch_recent_candles(
        &self,
        pair: &PairInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, FeedError>;
}

pub fn try_interval_from_ms(ms: i64) -> Result<KlinesIntervalEnum, String> {
    use TimeUtils as T;
    match ms {
        T::MS_IN_S => Ok(KlinesIntervalEnum::Interval1s),
        T::MS_IN_MIN => Ok(KlinesIntervalEnum::Interval1m),
        T::MS_IN_3_MIN => Ok(KlinesIntervalEnum::Interval3m),
        T::MS_IN_5_MIN => Ok(KlinesIntervalEnum::Interval5m),
        T::MS_IN_15_MIN => Ok(KlinesIntervalEnum::Interval15m),
        T::MS_IN_30_MIN => Ok(KlinesIntervalEnum::Interval30m),
        T::MS_IN_H => Ok(KlinesIntervalEnum::Interval1h),
        T::MS_IN_2_H => Ok(KlinesIntervalEnum::Interval2h),
        T::MS_IN_4_H => Ok(KlinesIntervalEnum::Interval4h),
        T::MS_IN_6_H => Ok(KlinesIntervalEnum::Interval6h),
        T::MS_IN_8_H => Ok(KlinesIntervalEnum::Interval8h),
        T::MS_IN_12_H => Ok(KlinesIntervalEnum::Interval12h),
        T::MS_IN_D => Ok(KlinesIntervalEnum::Interval1d),
        T::MS_IN_3_D => Ok(KlinesIntervalEnum::Interval3d),
        T::MS_IN_W => Ok(KlinesIntervalEnum::Interval1w),
        T::MS_IN_1_M => Ok(KlinesIntervalEnum::Interval1M),
        _ => Err(format!("Unsupported interval: {}ms", ms)),
    }
}

fn item_as_i64(item: Option<&KlinesItemInner>, field: &str) -> Result<i64, FeedError> {
    match item {
        Some(KlinesItemInner::Integer(v)) => Ok(*v),
        _ => Err(FeedError::MalformedMessage(format!("kline {} is not an integer", field))),
    }
}

fn item_as_f64(item: Option<&KlinesItemInner>, field: &str) -> Result<f64, FeedError> {
    match item {
        Some(KlinesItemInner::String(s)) => s
            .parse::<f64>()
            .map_err(|_| FeedError::MalformedMessage(format!("kline {} is not a number: {}", field, s))),
        _ => Err(FeedError::MalformedMessage(format!("kline {} is not a string", field))),
    }
}

/// One REST row: [open_time, o, h, l, c, v, close_time, ...].
fn candle_from_row(row: &[KlinesItemInner], now_ms: i64) -> Result<Candle, FeedError> {
    let close_time = item_as_i64(row.get(6), "close_time")?;
    let candle = Candle {
        open_time: item_as_i64(row.first(), "open_time")?,
        close_time,
        open: item_as_f64(row.get(1), "open")?,
        high: item_as_f64(row.get(2), "high")?,
        low: item_as_f64(row.get(3), "low")?,
        close: item_as_f64(row.get(4), "close")?,
        volume: item_as_f64(row.get(5), "volume")?,
        is_final: close_time < now_ms,
    };
    if !candle.is_well_formed() {
        return Err(FeedError::MalformedMessage(format!(
            "inconsistent kline at {}",
            candle.open_time
        )));
    }
    Ok(candle)
}

fn classify_error(pair: &PairInterval, e: anyhow::Error) -> FeedError {
    match e.downcast_ref::<ConnectorError>() {
        Some(ConnectorError::TooManyRequestsError(msg)) => {
            log::warn!("{} Rate limit exceeded. {}", pair, msg);
            FeedError::UpstreamRateLimit {
                retry_after: RATE_LIMIT_PAUSE,
            }
        }
        Some(ConnectorError::RateLimitBanError(msg)) => {
            log::error!("{} IP address banned due to excessive rate limits. {}", pair, msg);
            FeedError::UpstreamRateLimit {
                retry_after: RATE_LIMIT_PAUSE * 2,
            }
        }
        Some(other) => {
            log::error!("{} Binance API call failed: {}", pair, other);
            FeedError::TransientNetwork(other.to_string())
        }
        None => {
            log::error!("An unexpected error occurred for {}: {:#}", pair, e);
            FeedError::TransientNetwork(format!("{:#}", e))
        }
    }
}

/// Classifies a failed call. Rate limits also pause every other caller.
async fn reject(limiter: &GlobalRateLimiter, pair: &PairInterval, e: anyhow::Error) -> FeedError {
    let err = classify_error(pair, e);
    if let FeedError::UpstreamRateLimit { retry_after } = &err {
        limiter.back_off(*retry_after).await;
    }
    err
}

pub struct BinanceProvider {
    client: RestApi,
    limiter: GlobalRateLimiter,
}

impl BinanceProvider {
    pub fn new(limiter: GlobalRateLimiter) -> anyhow::Result<Self> {
        let config = BinanceApiConfig::default();
        let rest_conf = ConfigurationRestApi::builder()
            .timeout(config.timeout_ms)
            .retries(config.retries)
            .backoff(config.backoff_ms)
            .build()?;
        Ok(Self {
            client: SpotRestApi::production(rest_conf),
            limiter,
        })
    }
}

#[async_trait]
impl MarketDataProvider for BinanceProvider {
    async fn fetch_recent_candles(
        &self,
        pair: &PairInterval,
        limit: usize,
    ) -> Result<Vec<Candle>, FeedError> {
        let interval = try_interval_from_ms(pair.interval_ms).map_err(FeedError::MalformedMessage)?;
        let limit = limit.min(BINANCE.limits.klines_limit as usize) as i32;

        self.limiter
            .acquire(BINANCE.limits.kline_call_weight, pair.name())
            .await;

        let params = KlinesParams::builder(pair.name().to_string(), interval)
            .limit(limit)
            .build()
            .map_err(|e| FeedError::MalformedMessage(e.to_string()))?;

        let rows = match self.client.klines(params).await {
            Ok(response) => match response.data().await {
                Ok(rows) => rows,
                Err(e) => return Err(reject(&self.limiter, pair, e.into()).await),
            },
            Err(e) => return Err(reject(&self.limiter, pair, e).await),
        };

        let now_ms = now_timestamp_ms();
        let mut candles = rows
            .iter()
            .map(|row| candle_from_row(row, now_ms))
            .collect::<Result<Vec<_>, _>>()?;
        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);
        Ok(candles)
    }
}
