// Range detection, scoring and breakout confirmation
mod breakout;
mod range_detector;
mod range_scoring;
mod strategy;
mod tight_range;
mod trend_filter;

pub mod range_gap_finder;

pub use breakout::{BreakoutConfirmer, ConfirmMode};
pub use range_detector::OverlapScoreDetector;
pub use strategy::{DetectionStrategy, build_strategy};
pub use tight_range::TightRangeDetector;
