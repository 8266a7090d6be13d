//! Source-wide rate-limit pause shared by every fetch worker
//!
//! A worker that sees HTTP 429 sets a "paused until" deadline here; all
//! workers check it before each request and sleep until it passes.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct RateLimitGate {
    paused_until: Mutex<Option<Instant>>,
}

impl RateLimitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the pause to `now + duration`. An existing later deadline wins.
    pub fn pause_for(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut paused_until = match self.paused_until.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if paused_until.is_none_or(|current| current < deadline) {
            warn!("⏸️ Rate limited, pausing all fetches for {:?}", duration);
            *paused_until = Some(deadline);
        }
    }

    /// Deadline of the active pause, if any
    pub fn paused_until(&self) -> Option<Instant> {
        let guard = match self.paused_until.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.filter(|deadline| *deadline > Instant::now())
    }

    pub fn is_paused(&self) -> bool {
        self.paused_until().is_some()
    }

    /// Wait out the active pause. Returns `false` when cancelled first.
    pub async fn wait_if_paused(&self, cancel: &CancellationToken) -> bool {
        let mut waited = false;
        // Re-check after waking: another worker may have extended the pause
        while let Some(deadline) = self.paused_until() {
            waited = true;
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {}
                () = cancel.cancelled() => return false,
            }
        }
        if cancel.is_cancelled() {
            return false;
        }
        if waited {
            info!("▶️ Rate-limit pause over, resuming fetches");
        }
        true
    }
}
