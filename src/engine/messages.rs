use std::sync::Arc;

use crate::domain::{Candle, PairInterval};
use crate::models::{AlertRecord, BreakoutEvent};

/// Work for the persistence worker. Producers never wait on it.
#[derive(Debug, Clone)]
pub enum PersistJob {
    Candles {
        pair: PairInterval,
        candles: Vec<Candle>,
    },
    Alert(AlertRecord),
}

/// What subscribers of the alert bus receive.
#[derive(Debug, Clone)]
pub struct AlertEnvelope {
    pub symbol: String,
    pub event: Arc<BreakoutEvent>,
}
