use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Shared REST weight budget. Every history request goes through `acquire`.
#[derive(Clone)]
pub struct GlobalRateLimiter {
    inner: Arc<Mutex<WeightWindow>>,
}

struct WeightWindow {
    used_weight: u32,
    window_start: Instant,
    limit: u32,
    // Set when the exchange itself said stop.
    blocked_until: Option<Instant>,
}

impl GlobalRateLimiter {
    pub fn new(limit: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WeightWindow {
                used_weight: 0,
                window_start: Instant::now(),
                limit,
                blocked_until: None,
            })),
        }
    }

    /// Waits until `cost` weight fits in the current minute, then spends it.
    /// A cost above the whole budget is charged as the full budget.
    pub async fn acquire(&self, cost: u32, context: &str) {
        loop {
            let (wait, used, limit) = {
                let mut guard = self.inner.lock().await;
                let now = Instant::now();

                // 1. Exchange-imposed pause
                if let Some(until) = guard.blocked_until {
                    if now < until {
                        (until - now, guard.used_weight, guard.limit)
                    } else {
                        guard.blocked_until = None;
                        continue;
                    }
                } else {
                    // 2. Roll the window
                    if now.duration_since(guard.window_start) >= WINDOW {
                        guard.used_weight = 0;
                        guard.window_start = now;
                    }

                    // 3. Spend if it fits
                    let cost = cost.min(guard.limit);
                    if guard.used_weight + cost <= guard.limit {
                        guard.used_weight += cost;
                        return;
                    }

                    let wait = (guard.window_start + WINDOW).saturating_duration_since(now);
                    (wait, guard.used_weight, guard.limit)
                }
            };

            log::warn!(
                "🛑 Rate limit saturated for [{}]. Used: {}/{}. Waiting {:.1}s...",
                context,
                used,
                limit,
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Blocks all callers for `retry_after` after an upstream 429/418.
    pub async fn back_off(&self, retry_after: Duration) {
        let mut guard = self.inner.lock().await;
        let until = Instant::now() + retry_after;
        if guard.blocked_until.is_none_or(|current| current < until) {
            guard.blocked_until = Some(until);
        }
    }

    pub async fn used_weight(&self) -> u32 {
        self.inner.lock().await.used_weight
    }
}
