use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::SentinelApp;
use crate::config::{BINANCE, DF};
use crate::data::{ConnectionShard, build_combined_stream_url};
use crate::domain::PairInterval;
use crate::engine::IngestionRouter;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

impl SentinelApp {
    /// One task per shard. Each task returns its router when it stops.
    pub(crate) fn spawn_shards(
        &self,
        shards: Vec<(Vec<PairInterval>, IngestionRouter)>,
        shutdown: &watch::Receiver<bool>,
    ) -> Vec<JoinHandle<IngestionRouter>> {
        shards
            .into_iter()
            .enumerate()
            .map(|(id, (pairs, router))| {
                let url = build_combined_stream_url(BINANCE.combined_base_url, &pairs);
                if DF.log_price_stream_updates {
                    log::info!("Shard {}: {} streams", id, pairs.len());
                }
                let shard = ConnectionShard::new(
                    id,
                    url,
                    router,
                    self.transport.clone(),
                    self.settings.ws,
                    self.board.clone(),
                    shutdown.clone(),
                );
                tokio::spawn(shard.run())
            })
            .collect()
    }

    /// Periodic connection health line until shutdown.
    pub(crate) fn spawn_health_log(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let board = self.board.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_LOG_INTERVAL);
            ticker.tick().await; // arm
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = board.snapshot();
                        let reconnects: u64 = snapshot.values().map(|s| s.reconnects).sum();
                        log::info!(
                            "Connection health {:.0}% ({} shards, {} reconnects)",
                            board.connection_health(),
                            snapshot.len(),
                            reconnects
                        );
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}
