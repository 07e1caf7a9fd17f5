use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

/// One failed attempt, as recorded in a dead letter's retry history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt: u8,
    /// Error message from the failed attempt.
    pub error: String,
    /// When this attempt occurred.
    pub timestamp: DateTime<Utc>,
}

impl RetryAttempt {
    pub fn new(attempt: u8, error: impl Into<String>) -> Self {
        Self {
            attempt,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// What to do with a message after a failure was recorded.
#[derive(Debug, Clone)]
pub enum RetryDecision {
    /// Try again; `attempt` is the failure count so far.
    Retry { attempt: u8 },
    /// Attempts are used up. Carries the full history for the dead letter.
    Exhausted { history: Vec<RetryAttempt> },
}

#[derive(Debug)]
struct Tracked {
    history: Vec<RetryAttempt>,
    last_touched: Instant,
}

/// Per-message failure bookkeeping for queue consumers.
///
/// Keyed by message id. An entry lives until its message succeeds, exhausts
/// its retries, or sits idle long enough for [`RetryTracker::evict_idle`]
/// to reap it.
#[derive(Debug, Default)]
pub struct RetryTracker {
    inflight: HashMap<String, Tracked>,
    max_retries: u8,
}

impl RetryTracker {
    pub fn new(max_retries: u8) -> Self {
        Self {
            inflight: HashMap::new(),
            max_retries,
        }
    }

    /// Record a failure and decide the message's fate. Exhausting a message
    /// removes it, so a later failure under the same id starts over at
    /// attempt 1.
    pub fn record_failure(&mut self, id: &str, error: &str) -> RetryDecision {
        let tracked = self
            .inflight
            .entry(id.to_string())
            .or_insert_with(|| Tracked {
                history: Vec::new(),
                last_touched: Instant::now(),
            });

        let attempt = u8::try_from(tracked.history.len() + 1).unwrap_or(u8::MAX);
        tracked.history.push(RetryAttempt::new(attempt, error));
        tracked.last_touched = Instant::now();

        if attempt <= self.max_retries {
            return RetryDecision::Retry { attempt };
        }
        let history = self
            .inflight
            .remove(id)
            .map(|tracked| tracked.history)
            .unwrap_or_default();
        RetryDecision::Exhausted { history }
    }

    /// Forget a message, usually after it succeeded.
    pub fn clear(&mut self, id: &str) {
        self.inflight.remove(id);
    }

    /// Failure count recorded so far for a message.
    pub fn attempts(&self, id: &str) -> u8 {
        self.inflight
            .get(id)
            .map(|tracked| u8::try_from(tracked.history.len()).unwrap_or(u8::MAX))
            .unwrap_or(0)
    }

    /// Drop entries that have not been touched within `max_idle`.
    pub fn evict_idle(&mut self, max_idle: Duration) {
        let now = Instant::now();
        self.inflight
            .retain(|_, tracked| now.duration_since(tracked.last_touched) < max_idle);
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

/// Exponential backoff with up to 25% jitter, capped at `max_ms`.
///
/// Attempt 1 waits about `base_ms`, doubling from there. Attempt 0 means
/// nothing has failed yet and waits not at all.
pub fn calculate_backoff(attempt: u8, base_ms: u64, max_ms: u64) -> Duration {
    let Some(doublings) = attempt.checked_sub(1) else {
        return Duration::ZERO;
    };
    let uncapped = base_ms.saturating_mul(2u64.saturating_pow(doublings.into()));
    let jitter = rand::rng().random_range(0..=uncapped / 4);
    Duration::from_millis(uncapped.saturating_add(jitter).min(max_ms))
}

/// Clears a message's tracker entry on drop.
///
/// Consumer closures can be cancelled mid-message; without the guard that
/// would leak the entry until idle eviction. Call [`defuse`] once success
/// or the dead-letter hand-off has settled the message's fate.
///
/// [`defuse`]: RetryCleanupGuard::defuse
pub struct RetryCleanupGuard<'a> {
    tracker: &'a Arc<Mutex<RetryTracker>>,
    id: String,
    defused: bool,
}

impl<'a> RetryCleanupGuard<'a> {
    pub fn new(tracker: &'a Arc<Mutex<RetryTracker>>, id: impl Into<String>) -> Self {
        Self {
            tracker,
            id: id.into(),
            defused: false,
        }
    }

    pub fn defuse(&mut self) {
        self.defused = true;
    }
}

impl Drop for RetryCleanupGuard<'_> {
    fn drop(&mut self) {
        if self.defused {
            return;
        }
        // Drop must not block; a missed clear is picked up by idle eviction.
        if let Ok(mut tracker) = self.tracker.try_lock() {
            tracker.clear(&self.id);
        }
    }
}

/// Background task that periodically evicts idle tracker entries.
pub fn spawn_cleanup_task(
    tracker: Arc<Mutex<RetryTracker>>,
    every: Duration,
    max_idle: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        loop {
            tick.tick().await;
            let mut guard = tracker.lock().await;
            let before = guard.len();
            guard.evict_idle(max_idle);
            let evicted = before - guard.len();
            drop(guard);
            if evicted > 0 {
                info!(evicted, "Evicted idle retry entries");
            }
        }
    })
}
