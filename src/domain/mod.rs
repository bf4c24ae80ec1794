// Domain types and value objects
mod candle;
mod candle_window;
mod pair_interval;

// Re-export commonly used types to the world
pub use candle::{Candle, LiveCandle};
pub use candle_window::{CandleWindow, WindowUpdate};
pub use pair_interval::PairInterval;
