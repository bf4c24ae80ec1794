//! Cold-start warm-up of candle windows.
//!
//! Stored history is tried first. When it covers too little of the recent
//! window the exchange is asked for the newest bars, the two sources are merged
//! by open time (fetched bars win) and whatever was missing from the store is
//! queued for persistence.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;

use crate::config::{BackfillConfig, DF};
use crate::data::{FeedError, MarketDataProvider, MarketDataStorage};
use crate::domain::{Candle, CandleWindow, PairInterval};
use crate::engine::PersistJob;
use crate::utils::now_timestamp_ms;

pub struct BackfillLoader {
    store: Arc<dyn MarketDataStorage>,
    provider: Arc<dyn MarketDataProvider>,
    persist_tx: Option<mpsc::Sender<PersistJob>>,
    config: BackfillConfig,
    capacity: usize,
}

/// Stored bars that fall inside the most recent `capacity` intervals.
fn recent_coverage(stored: &[Candle], now_ms: i64, interval_ms: i64, capacity: usize) -> usize {
    let horizon = now_ms - interval_ms * capacity as i64;
    stored.iter().filter(|c| c.open_time >= horizon).count()
}

impl BackfillLoader {
    pub fn new(
        store: Arc<dyn MarketDataStorage>,
        provider: Arc<dyn MarketDataProvider>,
        persist_tx: Option<mpsc::Sender<PersistJob>>,
        config: BackfillConfig,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            provider,
            persist_tx,
            config,
            capacity,
        }
    }

    async fn load_stored(&self, pair: &PairInterval) -> Vec<Candle> {
        match self
            .store
            .load_recent_candles(pair.name(), pair.interval_str(), self.capacity)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                log::warn!("{}: stored history unavailable: {:#}", pair, e);
                Vec::new()
            }
        }
    }

    async fn fetch_with_retries(&self, pair: &PairInterval) -> Result<Vec<Candle>, FeedError> {
        let mut attempt = 0;
        loop {
            match self.provider.fetch_recent_candles(pair, self.capacity + 1).await {
                Err(FeedError::UpstreamRateLimit { retry_after })
                    if attempt < self.config.max_rate_limit_retries =>
                {
                    attempt += 1;
                    log::warn!(
                        "{}: rate limited, retry {}/{} in {:?}",
                        pair,
                        attempt,
                        self.config.max_rate_limit_retries,
                        retry_after
                    );
                    tokio::time::sleep(retry_after).await;
                }
                other => return other,
            }
        }
    }

    /// Never fails: a symbol that cannot be warmed starts with whatever was stored.
    pub async fn warm(&self, pair: &PairInterval) -> CandleWindow {
        let stored = self.load_stored(pair).await;
        let covered = recent_coverage(&stored, now_timestamp_ms(), pair.interval_ms, self.capacity);
        let required = (self.capacity as f64 * self.config.min_coverage).ceil() as usize;

        if covered >= required {
            if DF.log_backfill {
                log::info!("{}: warmed from store ({} bars)", pair, stored.len());
            }
            return CandleWindow::from_history(self.capacity, stored);
        }

        let fetched = match self.fetch_with_retries(pair).await {
            Ok(fetched) => fetched,
            Err(e) => {
                log::warn!(
                    "{}: history fetch failed, starting with {} stored bars: {}",
                    pair,
                    stored.len(),
                    e
                );
                return CandleWindow::from_history(self.capacity, stored);
            }
        };

        let known: HashSet<i64> = stored.iter().map(|c| c.open_time).collect();
        let missing: Vec<Candle> = fetched
            .iter()
            .filter(|c| c.is_final && !known.contains(&c.open_time))
            .copied()
            .collect();

        let mut merged: BTreeMap<i64, Candle> =
            stored.into_iter().map(|c| (c.open_time, c)).collect();
        merged.extend(fetched.into_iter().map(|c| (c.open_time, c)));

        if DF.log_backfill {
            log::info!(
                "{}: {} stored in range, {} missing persisted, {} merged",
                pair,
                covered,
                missing.len(),
                merged.len()
            );
        }

        if !missing.is_empty() {
            self.enqueue(pair, missing);
        }

        CandleWindow::from_history(self.capacity, merged.into_values())
    }

    fn enqueue(&self, pair: &PairInterval, candles: Vec<Candle>) {
        let Some(tx) = &self.persist_tx else {
            return;
        };
        let job = PersistJob::Candles {
            pair: pair.clone(),
            candles,
        };
        if let Err(e) = tx.try_send(job) {
            log::warn!("{}: backfill persistence dropped: {}", pair, e);
        }
    }

    /// Warms `pairs` in batches, pausing between batches for the REST budget.
    pub async fn warm_all(&self, pairs: &[PairInterval]) -> Vec<(PairInterval, CandleWindow)> {
        let mut windows = Vec::with_capacity(pairs.len());
        let batch_size = self.config.batch_size.max(1);

        for (i, batch) in pairs.chunks(batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
            let warmed = join_all(batch.iter().map(|pair| self.warm(pair))).await;
            windows.extend(batch.iter().cloned().zip(warmed));
        }

        log::info!("Warmed {} symbols", windows.len());
        windows
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::BACKFILL;
    use crate::data::SqliteStorage;
    use crate::models::{AlertRecord, Direction};
    use crate::utils::TimeUtils;

    const MIN: i64 = TimeUtils::MS_IN_MIN;
    const CAPACITY: usize = 20;

    struct ScriptedProvider {
        responses: Mutex<Vec<Result<Vec<Candle>, FeedError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<Result<Vec<Candle>, FeedError>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl MarketDataProvider for ScriptedProvider {
        async fn fetch_recent_candles(
            &self,
            _pair: &PairInterval,
            _limit: usize,
        ) -> Result<Vec<Candle>, FeedError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(FeedError::TransientNetwork("script exhausted".into())))
        }
    }

    /// `n` final bars ending one interval before the current minute.
    fn recent_bars(n: i64, close: f64) -> Vec<Candle> {
        let current = now_timestamp_ms() / MIN * MIN;
        (1..=n)
            .rev()
            .map(|k| Candle::new(current - k * MIN, MIN, 100.0, 101.0, 99.0, close, 10.0, true))
            .collect()
    }

    async fn store_in(dir: &tempfile::TempDir) -> Arc<SqliteStorage> {
        let path = dir.path().join("warm.sqlite");
        let store = SqliteStorage::new(path.to_str().unwrap()).await.unwrap();
        store.initialize().await.unwrap();
        Arc::new(store)
    }

    fn pair() -> PairInterval {
        PairInterval::new("BTCUSDT", MIN)
    }

    #[tokio::test]
    async fn full_store_skips_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store.insert_candles("BTCUSDT", "1m", &recent_bars(18, 100.0)).await.unwrap();

        let provider = ScriptedProvider::new(vec![]);
        let loader = BackfillLoader::new(store, provider.clone(), None, BACKFILL, CAPACITY);
        let window = loader.warm(&pair()).await;

        assert_eq!(window.len(), 18);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn thin_store_merges_with_fetched_bars_winning() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let stored = recent_bars(10, 100.0);
        store.insert_candles("BTCUSDT", "1m", &stored).await.unwrap();

        let fetched = recent_bars(CAPACITY as i64, 100.7);
        let provider = ScriptedProvider::new(vec![Ok(fetched)]);
        let (tx, mut rx) = mpsc::channel(8);
        let loader = BackfillLoader::new(store, provider.clone(), Some(tx), BACKFILL, CAPACITY);

        let window = loader.warm(&pair()).await;
        assert_eq!(provider.calls(), 1);
        assert_eq!(window.len(), CAPACITY);
        assert!(window.iter().all(|c| c.close == 100.7));

        match rx.try_recv().unwrap() {
            PersistJob::Candles { candles, .. } => assert_eq!(candles.len(), CAPACITY - 10),
            other => panic!("unexpected job {:?}", other),
        }
    }

    /// Store that is down. Warm-up must carry on without it.
    struct OfflineStore;

    #[async_trait]
    impl MarketDataStorage for OfflineStore {
        async fn initialize(&self) -> anyhow::Result<()> {
            anyhow::bail!("offline")
        }
        async fn insert_candles(&self, _: &str, _: &str, _: &[Candle]) -> anyhow::Result<u64> {
            anyhow::bail!("offline")
        }
        async fn load_recent_candles(&self, _: &str, _: &str, _: usize) -> anyhow::Result<Vec<Candle>> {
            anyhow::bail!("offline")
        }
        async fn load_candles(&self, _: &str, _: &str, _: Option<i64>) -> anyhow::Result<Vec<Candle>> {
            anyhow::bail!("offline")
        }
        async fn insert_alert(&self, _: &AlertRecord) -> anyhow::Result<()> {
            anyhow::bail!("offline")
        }
        async fn has_recent_alert(
            &self,
            _: &str,
            _: Direction,
            _: i64,
            _: Option<f64>,
            _: f64,
        ) -> anyhow::Result<bool> {
            anyhow::bail!("offline")
        }
        async fn latest_alert(&self, _: &str, _: Direction, _: i64) -> anyhow::Result<Option<AlertRecord>> {
            anyhow::bail!("offline")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_is_retried_then_given_up() {
        let store = Arc::new(OfflineStore);
        let limited = || {
            Err(FeedError::UpstreamRateLimit {
                retry_after: Duration::from_secs(1),
            })
        };
        let provider = ScriptedProvider::new(vec![limited(), limited(), limited(), limited()]);
        let loader = BackfillLoader::new(store, provider.clone(), None, BACKFILL, CAPACITY);

        let window = loader.warm(&pair()).await;
        assert!(window.is_empty());
        assert_eq!(provider.calls(), 1 + BACKFILL.max_rate_limit_retries as usize);
    }

    #[test]
    fn coverage_counts_only_recent_bars() {
        let now = 1_000 * MIN;
        let bars: Vec<Candle> = (970..1_000)
            .map(|i| Candle::new(i * MIN, MIN, 1.0, 1.0, 1.0, 1.0, 1.0, true))
            .collect();
        assert_eq!(recent_coverage(&bars, now, MIN, 20), 20);
    }
}
