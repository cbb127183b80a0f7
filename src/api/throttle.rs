//! Single-slot throttle gate.
//!
//! The orderbook enforces a hard per-key rate limit, so every outbound call
//! made by one client instance passes through this gate. A dispatch is only
//! allowed once `min_interval` has elapsed since the previous dispatch, and
//! the caller then sits out a full `min_interval` cooldown after the response.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Last-dispatch bookkeeping. Owned by exactly one gate.
#[derive(Debug, Default)]
struct ThrottleState {
    last_call: Option<Instant>,
}

#[derive(Debug)]
pub struct ThrottleGate {
    state: Mutex<ThrottleState>,
    min_interval: Duration,
    poll_quantum: Duration,
}

impl ThrottleGate {
    pub fn new(min_interval: Duration, poll_quantum: Duration) -> Self {
        Self {
            state: Mutex::new(ThrottleState::default()),
            min_interval,
            // A zero quantum would spin.
            poll_quantum: poll_quantum.max(Duration::from_millis(1)),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a dispatch is allowed, then stamp the dispatch time.
    ///
    /// The read of `last_call` and the stamp happen under one lock with no
    /// suspension in between, so concurrent callers serialize strictly.
    pub async fn acquire(&self) {
        loop {
            let remaining = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                match state.last_call {
                    Some(last) if now.duration_since(last) < self.min_interval => {
                        Some(self.min_interval - now.duration_since(last))
                    }
                    _ => {
                        state.last_call = Some(now);
                        None
                    }
                }
            };

            match remaining {
                None => return,
                Some(remaining) => {
                    trace!(remaining_ms = remaining.as_millis() as u64, "Throttle gate closed");
                    tokio::time::sleep(remaining.min(self.poll_quantum)).await;
                }
            }
        }
    }

    /// Trailing cooldown imposed after every response.
    pub async fn cooldown(&self) {
        tokio::time::sleep(self.min_interval).await;
    }

    /// Time of the most recent dispatch, if any.
    pub async fn last_call(&self) -> Option<Instant> {
        self.state.lock().await.last_call
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
