use std::sync::Arc;

use crate::analysis::{OverlapScoreDetector, TightRangeDetector};
use crate::config::{DetectionConfig, StrategyKind};
use crate::domain::Candle;
use crate::models::StructuralRange;

/// A consolidation detector. Implementations are pure functions of the
/// candles they are given and never fail: too little data means no ranges.
pub trait DetectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ranges found in time-ordered, finalized `candles`, best first.
    fn detect(&self, candles: &[Candle]) -> Vec<StructuralRange>;
}

pub fn build_strategy(config: &DetectionConfig) -> Arc<dyn DetectionStrategy> {
    match config.strategy {
        StrategyKind::OverlapScore => Arc::new(OverlapScoreDetector::new(*config)),
        StrategyKind::TightRange => Arc::new(TightRangeDetector::new(*config)),
    }
}

// ─── Shared candidate plumbing ──────────────────────────────────────────────

/// A scored window, indexed into the slice handed to `detect`.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub start: usize,
    /// Exclusive
    pub end: usize,
    pub range: StructuralRange,
}

impl Candidate {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    fn shared_bars(&self, other: &Candidate) -> usize {
        self.end.min(other.end).saturating_sub(self.start.max(other.start))
    }

    /// True when the shared span exceeds half of either window.
    pub fn conflicts_with(&self, other: &Candidate) -> bool {
        let shared = self.shared_bars(other);
        shared * 2 > self.len() || shared * 2 > other.len()
    }
}

/// Best-first greedy selection: highest total, then longest, then most recent.
/// A candidate is dropped if it overlaps an already kept one by more than half.
pub(crate) fn select_top(mut candidates: Vec<Candidate>, top_k: usize) -> Vec<StructuralRange> {
    candidates.sort_by(|a, b| {
        b.range
            .score
            .total
            .total_cmp(&a.range.score.total)
            .then_with(|| b.len().cmp(&a.len()))
            .then_with(|| b.end.cmp(&a.end))
    });

    let mut kept: Vec<Candidate> = Vec::with_capacity(top_k);
    for candidate in candidates {
        if kept.len() >= top_k {
            break;
        }
        if kept.iter().any(|k| k.conflicts_with(&candidate)) {
            continue;
        }
        kept.push(candidate);
    }

    kept.into_iter().map(|c| c.range).collect()
}
