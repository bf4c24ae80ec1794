//! Service orchestration: warm-up, live shards, graceful drain.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, watch};

use crate::app::AppPhase;
use crate::config::{BINANCE, DF, SentinelSettings};
use crate::data::{
    BinanceProvider, FeedTransport, GlobalRateLimiter, MarketDataProvider, MarketDataStorage,
    SqliteStorage, StatusBoard, TungsteniteTransport,
};
use crate::domain::PairInterval;
use crate::engine::{
    AlertBus, AlertEnvelope, PersistSummary, RouterStats, log_alerts, spawn_persistence_worker,
};

/// What the service did between start and shutdown.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub symbols: usize,
    pub shards: usize,
    pub stats: RouterStats,
    /// `None` when the worker failed or did not drain within the flush timeout.
    pub persisted: Option<PersistSummary>,
}

pub struct SentinelApp {
    pub(crate) settings: SentinelSettings,
    pub(crate) interval_ms: i64,
    pub(crate) pairs: Vec<PairInterval>,
    pub(crate) store: Arc<dyn MarketDataStorage>,
    pub(crate) provider: Arc<dyn MarketDataProvider>,
    pub(crate) transport: Arc<dyn FeedTransport>,
    pub(crate) bus: AlertBus,
    pub(crate) board: StatusBoard,
    phase: AppPhase,
}

/// Reads one symbol per line. Blank lines and `#` comments are skipped,
/// duplicates keep their first position.
pub fn load_symbols(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read symbols file {}", path.display()))?;
    let mut symbols: Vec<String> = Vec::new();
    for line in text.lines() {
        let symbol = line.trim().to_uppercase();
        if symbol.is_empty() || symbol.starts_with('#') || symbols.contains(&symbol) {
            continue;
        }
        symbols.push(symbol);
    }
    Ok(symbols)
}

impl SentinelApp {
    pub fn new(
        settings: SentinelSettings,
        symbols: &[String],
        store: Arc<dyn MarketDataStorage>,
        provider: Arc<dyn MarketDataProvider>,
        transport: Arc<dyn FeedTransport>,
    ) -> Result<Self> {
        settings.validate()?;
        let interval_ms = settings.interval_ms()?;
        let pairs = symbols
            .iter()
            .take(DF.max_pairs_load)
            .map(|s| PairInterval::new(s.as_str(), interval_ms))
            .collect();
        let bus = AlertBus::new(settings.alerts.bus_capacity);

        Ok(Self {
            settings,
            interval_ms,
            pairs,
            store,
            provider,
            transport,
            bus,
            board: StatusBoard::default(),
            phase: AppPhase::Bootstrapping,
        })
    }

    /// Production wiring: SQLite store, Binance REST and websocket feed.
    pub async fn connect(settings: SentinelSettings, symbols: &[String]) -> Result<Self> {
        let store = SqliteStorage::new(&settings.db_path).await?;
        store.initialize().await?;
        let limiter = GlobalRateLimiter::new(BINANCE.limits.weight_limit_minute);
        let provider = BinanceProvider::new(limiter)?;

        Self::new(
            settings,
            symbols,
            Arc::new(store),
            Arc::new(provider),
            Arc::new(TungsteniteTransport),
        )
    }

    pub fn phase(&self) -> AppPhase {
        self.phase
    }

    pub fn pairs(&self) -> &[PairInterval] {
        &self.pairs
    }

    /// Extra receivers for downstream consumers. Subscribe before `run`.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEnvelope> {
        self.bus.subscribe()
    }

    pub fn status_board(&self) -> StatusBoard {
        self.board.clone()
    }

    fn enter(&mut self, phase: AppPhase) {
        log::info!("Sentinel: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Runs until `shutdown` resolves, then drains. Only startup wiring can fail.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<RunSummary> {
        let (persist_tx, persist_rx) = mpsc::channel(self.settings.queue.capacity.max(1));
        let worker = spawn_persistence_worker(persist_rx, self.store.clone());

        // 1. Warm windows and build one router per shard
        let shards = self.bootstrap(&persist_tx).await;
        let mut summary = RunSummary {
            symbols: self.pairs.len(),
            shards: shards.len(),
            ..Default::default()
        };

        // 2. Go live
        let (stop_tx, stop_rx) = watch::channel(false);
        let logger = tokio::spawn(log_alerts(self.bus.subscribe()));
        let handles = self.spawn_shards(shards, &stop_rx);
        let health = self.spawn_health_log(stop_rx);
        self.enter(AppPhase::Running);
        log::info!(
            "Live on {} shards, alert bus holds {}",
            summary.shards,
            self.bus.capacity()
        );

        shutdown.await;

        // 3. Stop reconnects. The flush window opens now and covers shard close.
        self.enter(AppPhase::Draining);
        let flush = Duration::from_millis(self.settings.queue.flush_timeout_ms);
        let deadline = tokio::time::Instant::now() + flush;
        let _ = stop_tx.send(true);
        drop(persist_tx);
        for handle in handles {
            match handle.await {
                Ok(router) => summary.stats += router.stats(),
                Err(e) => log::error!("Shard task failed: {}", e),
            }
        }
        if let Err(e) = health.await {
            log::error!("Health log task failed: {}", e);
        }

        // 4. Routers gone with their senders: the worker finishes the queue and exits
        summary.persisted = match tokio::time::timeout_at(deadline, worker).await {
            Ok(Ok(persisted)) => Some(persisted),
            Ok(Err(e)) => {
                log::error!("Persistence worker failed: {}", e);
                None
            }
            Err(_) => {
                log::warn!("Persistence queue not drained within {:?} of shutdown", flush);
                None
            }
        };
        logger.abort();

        self.enter(AppPhase::Stopped);
        log::info!("Sentinel stopped: {:?}", summary.stats);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use async_trait::async_trait;

    use super::*;
    use crate::data::{FeedConnection, FeedError};
    use crate::domain::Candle;
    use crate::models::{AlertRecord, Direction};
    use crate::utils::{TimeUtils, now_timestamp_ms};

    struct EmptyProvider;

    #[async_trait]
    impl MarketDataProvider for EmptyProvider {
        async fn fetch_recent_candles(
            &self,
            _pair: &PairInterval,
            _limit: usize,
        ) -> Result<Vec<Candle>, FeedError> {
            Ok(Vec::new())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl FeedTransport for Unreachable {
        async fn connect(&self, _url: &str) -> Result<Box<dyn FeedConnection>, FeedError> {
            Err(FeedError::TransientNetwork("unreachable".into()))
        }
    }

    struct Hanging;

    #[async_trait]
    impl FeedTransport for Hanging {
        async fn connect(&self, _url: &str) -> Result<Box<dyn FeedConnection>, FeedError> {
            std::future::pending().await
        }
    }

    async fn offline_app(dir: &tempfile::TempDir, symbols: &[&str]) -> SentinelApp {
        offline_app_with(dir, symbols, SentinelSettings::default(), Arc::new(Unreachable)).await
    }

    async fn offline_app_with(
        dir: &tempfile::TempDir,
        symbols: &[&str],
        settings: SentinelSettings,
        transport: Arc<dyn FeedTransport>,
    ) -> SentinelApp {
        let path = dir.path().join("app.sqlite");
        let store = SqliteStorage::new(path.to_str().unwrap()).await.unwrap();
        store.initialize().await.unwrap();
        let symbols: Vec<String> = symbols.iter().map(|s| s.to_string()).collect();
        SentinelApp::new(settings, &symbols, Arc::new(store), Arc::new(EmptyProvider), transport)
            .unwrap()
    }

    #[test]
    fn symbols_file_skips_comments_and_duplicates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# majors\nbtcusdt\n\nETHUSDT\nBTCUSDT\n  solusdt  ").unwrap();
        let symbols = load_symbols(file.path()).unwrap();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
    }

    fn stored_alert(symbol: &str, detected_at: i64) -> AlertRecord {
        AlertRecord {
            alert_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            interval_ms: TimeUtils::MS_IN_MIN,
            direction: Direction::Up,
            breakout_price: 102.0,
            upper_bound: 100.5,
            lower_bound: 99.5,
            center_price: 100.0,
            magnitude_pct: 1.5,
            volume_ratio: 2.0,
            range_start_time: 0,
            range_end_time: detected_at - TimeUtils::MS_IN_MIN,
            candle_count: 60,
            score_total: 75.0,
            detected_at,
        }
    }

    #[tokio::test]
    async fn bootstrap_restores_recent_cooldowns_only() {
        let dir = tempfile::tempdir().unwrap();
        let app = offline_app(&dir, &["BTCUSDT", "ETHUSDT"]).await;
        let now = now_timestamp_ms();
        app.store
            .insert_alert(&stored_alert("BTCUSDT", now - 5 * TimeUtils::MS_IN_MIN))
            .await
            .unwrap();
        app.store
            .insert_alert(&stored_alert("ETHUSDT", now - 2 * TimeUtils::MS_IN_H))
            .await
            .unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let mut shards = app.bootstrap(&tx).await;

        assert_eq!(shards.len(), 1);
        let (pairs, router) = &mut shards[0];
        assert_eq!(pairs.len(), 2);
        assert_eq!(router.symbols().count(), 2);
        assert!(router.window("BTCUSDT").unwrap().is_empty());
        assert_eq!(router.dedup_mut().len(), 1);
    }

    #[tokio::test]
    async fn run_stops_cleanly_when_feed_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let app = offline_app(&dir, &["BTCUSDT", "ETHUSDT"]).await;
        assert_eq!(app.phase(), AppPhase::Bootstrapping);

        let summary = app
            .run(tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();

        assert_eq!(summary.symbols, 2);
        assert_eq!(summary.shards, 1);
        assert_eq!(summary.stats.ticks, 0);
        let persisted = summary.persisted.unwrap();
        assert_eq!(persisted.failures, 0);
    }

    #[tokio::test]
    async fn alert_bus_uses_configured_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = SentinelSettings::default();
        settings.alerts.bus_capacity = 7;
        let app = offline_app_with(&dir, &["BTCUSDT"], settings, Arc::new(Unreachable)).await;
        assert_eq!(app.bus.capacity(), 7);

        let other = tempfile::tempdir().unwrap();
        let default_app = offline_app(&other, &["BTCUSDT"]).await;
        assert_eq!(default_app.bus.capacity(), SentinelSettings::default().alerts.bus_capacity);
    }

    #[tokio::test]
    async fn run_stops_while_connects_hang() {
        let dir = tempfile::tempdir().unwrap();
        let app =
            offline_app_with(&dir, &["BTCUSDT"], SentinelSettings::default(), Arc::new(Hanging)).await;

        let run = app.run(tokio::time::sleep(Duration::from_millis(50)));
        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("shutdown must not wait on a hung connect")
            .unwrap();

        assert_eq!(summary.shards, 1);
        assert_eq!(summary.persisted.unwrap().failures, 0);
    }
}
