use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces out task starts so that consecutive `acquire` calls return at
/// least `gap` apart, regardless of how many workers are waiting.
#[derive(Debug)]
pub struct FixedGapLimiter {
    gap: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl FixedGapLimiter {
    #[must_use]
    pub fn new(gap: Duration) -> Self {
        Self {
            gap,
            next_slot: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn gap(&self) -> Duration {
        self.gap
    }

    /// Wait for the next free start slot.
    pub async fn acquire(&self) {
        if self.gap.is_zero() {
            return;
        }
        let start = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let start = next.map_or(now, |slot| slot.max(now));
            *next = Some(start + self.gap);
            start
        };
        tokio::time::sleep_until(start).await;
    }
}
