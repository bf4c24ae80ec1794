mod alert_record;
mod breakout_event;
mod structural_range;

pub use alert_record::AlertRecord;
pub use breakout_event::{BreakoutEvent, Confirmations, Direction};
pub use structural_range::{RangeScore, StructuralRange, TrendVerdict};
