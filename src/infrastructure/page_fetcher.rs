//! Polite, rate-limited page fetching with retry/backoff
//!
//! Every request waits a random politeness delay, then the shared
//! rate-limit gate, then the global request quota. Responses are
//! classified into `PageResult`; only transient failures are retried.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::infrastructure::config::FetchConfig;
use crate::infrastructure::http_transport::HttpTransport;
use crate::infrastructure::rate_limit_gate::RateLimitGate;
use crate::infrastructure::retry_policy::{AttemptOutcome, RetryPolicy, RetryState};

/// Classified outcome of one `fetch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageResult {
    Ok { body: String, status: u16 },
    NotFound,
    /// The shared gate is already paused for this long
    RateLimited(Duration),
    /// A transient failure whose retries were cut short by cancellation
    TransientError(String),
    FatalError(String),
}

impl PageResult {
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

enum Classified {
    Done(PageResult),
    Transient(String),
}

pub struct PageFetcher {
    transport: Arc<dyn HttpTransport>,
    config: FetchConfig,
    gate: Arc<RateLimitGate>,
    quota: Option<DefaultDirectRateLimiter>,
    user_agent_cursor: AtomicUsize,
    cancel: CancellationToken,
}

impl PageFetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: &FetchConfig,
        gate: Arc<RateLimitGate>,
        cancel: CancellationToken,
    ) -> Self {
        // requests_per_minute = 0 disables the global quota
        let quota = NonZeroU32::new(config.requests_per_minute).map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Self {
            transport,
            config: config.clone(),
            gate,
            quota,
            user_agent_cursor: AtomicUsize::new(fastrand::usize(..config.user_agents.len().max(1))),
            cancel,
        }
    }

    pub fn gate(&self) -> &Arc<RateLimitGate> {
        &self.gate
    }

    fn next_user_agent(&self) -> String {
        let agents = &self.config.user_agents;
        if agents.is_empty() {
            return String::new();
        }
        let index = self.user_agent_cursor.fetch_add(1, Ordering::Relaxed) % agents.len();
        agents[index].clone()
    }

    fn politeness_delay(&self) -> Duration {
        let min = self.config.min_delay_ms;
        let max = self.config.max_delay_ms.max(min);
        Duration::from_millis(fastrand::u64(min..=max))
    }

    /// Sleep unless cancelled first
    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = self.cancel.cancelled() => false,
        }
    }

    fn classify_status(&self, status: u16, body: String, retry_after: Option<Duration>) -> Classified {
        match status {
            200..=299 => Classified::Done(PageResult::Ok { body, status }),
            404 | 410 => Classified::Done(PageResult::NotFound),
            429 => {
                let pause = retry_after
                    .unwrap_or_default()
                    .max(self.config.rate_limit_cooldown());
                self.gate.pause_for(pause);
                Classified::Done(PageResult::RateLimited(pause))
            }
            408 | 500..=599 => Classified::Transient(format!("HTTP {status}")),
            _ => Classified::Done(PageResult::FatalError(format!("HTTP {status}"))),
        }
    }

    async fn attempt(&self, url: &str) -> Option<Classified> {
        if !self.sleep_or_cancel(self.politeness_delay()).await {
            return None;
        }
        if !self.gate.wait_if_paused(&self.cancel).await {
            return None;
        }
        if let Some(quota) = &self.quota {
            tokio::select! {
                () = quota.until_ready() => {}
                () = self.cancel.cancelled() => return None,
            }
        }

        let headers = [
            ("user-agent", self.next_user_agent()),
            ("accept", self.config.accept.clone()),
            ("accept-language", self.config.accept_language.clone()),
        ];

        debug!("🌐 GET {}", url);
        let classified = match self.transport.get(url, &headers).await {
            Ok(response) => self.classify_status(response.status, response.body, response.retry_after),
            Err(failure) if failure.is_transient() => Classified::Transient(failure.to_string()),
            Err(failure) => Classified::Done(PageResult::FatalError(failure.to_string())),
        };
        Some(classified)
    }

    /// Fetch one URL. Failures never escape as errors; they are classified.
    pub async fn fetch(&self, url: &str) -> PageResult {
        let mut policy = RetryPolicy::from_config(&self.config);
        let mut last_cause = String::from("cancelled before request");

        loop {
            let Some(classified) = self.attempt(url).await else {
                return PageResult::TransientError(last_cause);
            };

            let cause = match classified {
                Classified::Done(result) => {
                    let outcome = if result.is_ok() { AttemptOutcome::Success } else { AttemptOutcome::Fatal };
                    policy.record(outcome);
                    return result;
                }
                Classified::Transient(cause) => cause,
            };

            match policy.record(AttemptOutcome::Transient) {
                RetryState::FailedTransient(attempt) => {
                    let backoff = policy.next_attempt().unwrap_or_default();
                    warn!(
                        "🔄 {} failed ({}), attempt {}/{}, retrying in {:?}",
                        url,
                        cause,
                        attempt,
                        policy.max_attempts(),
                        backoff
                    );
                    last_cause = cause;
                    if !self.sleep_or_cancel(backoff).await {
                        return PageResult::TransientError(last_cause);
                    }
                }
                _ => {
                    error!("❌ {} failed after {} attempts: {}", url, policy.max_attempts(), cause);
                    return PageResult::FatalError(format!("{cause} after {} attempts", policy.max_attempts()));
                }
            }
        }
    }
}
