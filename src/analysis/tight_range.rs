//! Secondary detector: the newest bars squeezed into a band only a few ATRs wide.

use crate::analysis::range_scoring::{quantile_bounds, score_window};
use crate::analysis::strategy::{Candidate, DetectionStrategy, select_top};
use crate::analysis::trend_filter;
use crate::config::{DF, DetectionConfig};
use crate::domain::Candle;
use crate::models::StructuralRange;
use crate::utils::average_true_range;

pub struct TightRangeDetector {
    config: DetectionConfig,
}

impl TightRangeDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    fn qualify(&self, candles: &[Candle], start: usize) -> Option<Candidate> {
        let slice = &candles[start..];
        let scoring = &self.config.scoring;
        let tight = &self.config.tight;

        let atr = average_true_range(slice, tight.atr_period)?;
        let (upper, lower) = quantile_bounds(slice, scoring.bound_quantile)?;
        if atr <= 0.0 || upper - lower > tight.max_width_atr * atr {
            return None;
        }

        let score = score_window(slice, upper, lower, scoring);
        if score.total < scoring.min_total_score {
            return None;
        }
        let trend_verdict = trend_filter::evaluate(slice, &self.config.trend)?;

        Some(Candidate {
            start,
            end: candles.len(),
            range: StructuralRange {
                upper_bound: upper,
                lower_bound: lower,
                center_price: (upper + lower) / 2.0,
                start_time: slice[0].open_time,
                end_time: slice[slice.len() - 1].open_time,
                candle_count: slice.len(),
                score,
                trend_verdict,
            },
        })
    }
}

impl DetectionStrategy for TightRangeDetector {
    fn name(&self) -> &'static str {
        "tight-range"
    }

    fn detect(&self, candles: &[Candle]) -> Vec<StructuralRange> {
        let w = &self.config.window;
        if candles.len() < w.min_size || w.size_stride == 0 {
            return Vec::new();
        }

        let max_size = w.max_size.min(candles.len());
        let candidates: Vec<Candidate> = (w.min_size..=max_size)
            .step_by(w.size_stride)
            .filter_map(|size| self.qualify(candles, candles.len() - size))
            .collect();

        let ranges = select_top(candidates, self.config.scoring.top_k);
        if DF.log_detection {
            log::info!("tight-range: {} candles -> {} ranges", candles.len(), ranges.len());
        }
        ranges
    }
}
