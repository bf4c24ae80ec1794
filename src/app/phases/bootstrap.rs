use std::collections::HashMap;

use strum::IntoEnumIterator;
use tokio::sync::mpsc;

use crate::app::SentinelApp;
use crate::data::{BackfillLoader, partition_symbols};
use crate::domain::{CandleWindow, PairInterval};
use crate::engine::{IngestionRouter, PersistJob};
use crate::models::Direction;
use crate::utils::now_timestamp_ms;

impl SentinelApp {
    /// Warms every window, then hands each shard's symbols to its own router
    /// with cooldowns restored from the store.
    pub(crate) async fn bootstrap(
        &self,
        persist_tx: &mpsc::Sender<PersistJob>,
    ) -> Vec<(Vec<PairInterval>, IngestionRouter)> {
        let capacity = self.settings.detection.window.capacity;
        let loader = BackfillLoader::new(
            self.store.clone(),
            self.provider.clone(),
            Some(persist_tx.clone()),
            self.settings.backfill,
            capacity,
        );
        let mut windows: HashMap<PairInterval, CandleWindow> =
            loader.warm_all(&self.pairs).await.into_iter().collect();

        let groups = partition_symbols(&self.pairs, self.settings.ws.max_streams_per_connection);
        let mut shards = Vec::with_capacity(groups.len());
        for group in groups {
            let mut router = IngestionRouter::new(
                &self.settings,
                self.interval_ms,
                self.bus.clone(),
                Some(persist_tx.clone()),
            );
            for pair in &group {
                let window = windows
                    .remove(pair)
                    .unwrap_or_else(|| CandleWindow::new(capacity));
                router.insert_window(pair.clone(), window);
            }
            self.seed_cooldowns(&mut router, &group).await;
            shards.push((group, router));
        }
        shards
    }

    /// A restart must not re-alert a breakout still inside its cooldown.
    pub(crate) async fn seed_cooldowns(&self, router: &mut IngestionRouter, pairs: &[PairInterval]) {
        let since = now_timestamp_ms() - self.settings.alerts.cooldown_ms;
        let directions = self.settings.breakout.directions;
        let mut seeded = 0;

        for pair in pairs {
            for direction in Direction::iter().filter(|d| directions.allows(*d)) {
                let recent = self
                    .store
                    .has_recent_alert(pair.name(), direction, since, None, 0.0)
                    .await;
                match recent {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        log::warn!("{}: cooldown lookup failed: {:#}", pair, e);
                        continue;
                    }
                }
                match self.store.latest_alert(pair.name(), direction, since).await {
                    Ok(Some(record)) => {
                        router.dedup_mut().seed(&record);
                        seeded += 1;
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("{}: cooldown lookup failed: {:#}", pair, e),
                }
            }
        }

        if seeded > 0 {
            log::info!("Restored {} cooldowns from stored alerts", seeded);
        }
    }
}
