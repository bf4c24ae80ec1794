//! Per-symbol rolling buffer of bars.
//!
//! Holds at most `capacity` finalized bars plus one slot for the bar that is
//! still forming. Only the shard that owns the symbol ever writes to it.

use std::collections::VecDeque;

use super::Candle;

/// What an upsert did to the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowUpdate {
    /// The tail bar with the same open_time was overwritten. Finalizing it may
    /// push the oldest bar out.
    Replaced { evicted: Option<Candle> },
    /// A new bar was pushed; carries the bar evicted to stay within capacity.
    Appended { evicted: Option<Candle> },
    /// Older than the tail bar; ignored.
    Stale,
}

#[derive(Debug, Clone)]
pub struct CandleWindow {
    capacity: usize,
    candles: VecDeque<Candle>,
}

impl CandleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            candles: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Builds a window from time-ordered history, keeping the newest bars.
    pub fn from_history(capacity: usize, history: impl IntoIterator<Item = Candle>) -> Self {
        let mut window = Self::new(capacity);
        for candle in history {
            window.upsert(candle);
        }
        window
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    /// Contiguous copy of all bars, oldest first.
    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }

    /// Finalized bars only, oldest first.
    pub fn finalized(&self) -> Vec<Candle> {
        self.candles.iter().filter(|c| c.is_final).copied().collect()
    }

    /// Apply a bar from the feed or from history.
    ///
    /// Same open_time as the tail replaces it in place. A newer bar is appended.
    /// Once more than `capacity` finalized bars are held the single oldest is
    /// evicted. A forming bar that was never finalized is dropped when a newer
    /// bar arrives.
    pub fn upsert(&mut self, candle: Candle) -> WindowUpdate {
        match self.candles.back_mut() {
            Some(last) if candle.open_time == last.open_time => {
                *last = candle;
                WindowUpdate::Replaced {
                    evicted: self.evict_overflow(),
                }
            }
            Some(last) if candle.open_time < last.open_time => WindowUpdate::Stale,
            Some(last) => {
                if !last.is_final {
                    self.candles.pop_back();
                }
                self.candles.push_back(candle);
                WindowUpdate::Appended {
                    evicted: self.evict_overflow(),
                }
            }
            None => {
                self.candles.push_back(candle);
                WindowUpdate::Appended { evicted: None }
            }
        }
    }

    fn finalized_len(&self) -> usize {
        match self.candles.back() {
            Some(last) if !last.is_final => self.candles.len() - 1,
            _ => self.candles.len(),
        }
    }

    // Only the tail can be forming, so at most one bar is ever over capacity.
    fn evict_overflow(&mut self) -> Option<Candle> {
        if self.finalized_len() > self.capacity {
            self.candles.pop_front()
        } else {
            None
        }
    }
}
