use std::sync::Arc;

use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;

use super::messages::PersistJob;
use crate::data::{FeedError, MarketDataStorage};

/// Totals reported when the worker drains and exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub candles_written: u64,
    pub alerts_written: u64,
    pub failures: u64,
}

fn store_failure(what: &str, e: anyhow::Error) -> FeedError {
    FeedError::Persistence(format!("{}: {:#}", what, e))
}

/// Single consumer for all store writes. Runs until every sender is dropped,
/// then finishes whatever is still queued. Failures are logged, never retried.
pub fn spawn_persistence_worker(
    mut rx: Receiver<PersistJob>,
    store: Arc<dyn MarketDataStorage>,
) -> JoinHandle<PersistSummary> {
    tokio::spawn(async move {
        let mut summary = PersistSummary::default();
        while let Some(job) = rx.recv().await {
            match job {
                PersistJob::Candles { pair, candles } => {
                    match store
                        .insert_candles(pair.name(), pair.interval_str(), &candles)
                        .await
                    {
                        Ok(n) => summary.candles_written += n,
                        Err(e) => {
                            summary.failures += 1;
                            let what = format!("{} candles for {}", candles.len(), pair);
                            log::error!("{}", store_failure(&what, e));
                        }
                    }
                }
                PersistJob::Alert(record) => match store.insert_alert(&record).await {
                    Ok(()) => summary.alerts_written += 1,
                    Err(e) => {
                        summary.failures += 1;
                        let what = format!("alert for {}", record.symbol);
                        log::error!("{}", store_failure(&what, e));
                    }
                },
            }
        }
        log::info!(
            "Persistence worker drained: {} candles, {} alerts, {} failures",
            summary.candles_written,
            summary.alerts_written,
            summary.failures
        );
        summary
    })
}
