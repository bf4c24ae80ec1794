use crate::domain::{CandleWindow, PairInterval};
use crate::models::StructuralRange;

/// Everything the router keeps for one symbol. Owned by exactly one shard.
#[derive(Debug, Clone)]
pub struct SymbolState {
    pub pair: PairInterval,
    pub window: CandleWindow,

    /// Ranges from the last detection pass, replaced wholesale.
    pub ranges: Vec<StructuralRange>,
    /// Open time of the finalized bar that triggered `ranges`.
    pub ranges_bar: Option<i64>,
}

impl SymbolState {
    pub fn new(pair: PairInterval, window: CandleWindow) -> Self {
        Self {
            pair,
            window,
            ranges: Vec::new(),
            ranges_bar: None,
        }
    }

    /// True if the pipeline already ran for the bar opening at `open_time`.
    pub fn already_processed(&self, open_time: i64) -> bool {
        self.ranges_bar == Some(open_time)
    }

    pub fn replace_ranges(&mut self, open_time: i64, ranges: Vec<StructuralRange>) {
        self.ranges = ranges;
        self.ranges_bar = Some(open_time);
    }
}
