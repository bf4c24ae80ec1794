use std::sync::Arc;

use tokio::sync::broadcast;

use super::messages::AlertEnvelope;
use crate::models::BreakoutEvent;

/// Fire-and-forget fan-out of emitted alerts. Cloning shares the same bus.
#[derive(Debug, Clone)]
pub struct AlertBus {
    tx: broadcast::Sender<AlertEnvelope>,
    capacity: usize,
}

impl AlertBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Alerts a subscriber may fall behind by before it starts missing them.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEnvelope> {
        self.tx.subscribe()
    }

    /// Number of subscribers that will see the alert. Zero is not an error.
    pub fn publish(&self, event: BreakoutEvent) -> usize {
        let envelope = AlertEnvelope {
            symbol: event.symbol.clone(),
            event: Arc::new(event),
        };
        self.tx.send(envelope).unwrap_or(0)
    }
}

/// Logs every alert until the bus closes. Lagging is reported, not fatal.
pub async fn log_alerts(mut rx: broadcast::Receiver<AlertEnvelope>) {
    loop {
        match rx.recv().await {
            Ok(envelope) => log::info!("ALERT {}", envelope.event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                log::warn!("Alert logger lagged, {} alerts skipped", missed)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
