//! Bounded automatic retry after fatal playback faults.
//!
//! The coordinator owns the auto-retry budget and the single pending retry
//! timer of a player. It never tears anything down itself; the retry
//! callback it is handed does the reload.

use common::{ErrorType, StreamError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::timer::TimerSlot;

/// Delay progression between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Immediate,
    ExponentialBackoff,
    LinearBackoff,
}

/// Most automatic attempts a policy may grant.
pub const MAX_AUTO_RETRY_LIMIT: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Automatic attempts before the viewer has to retry by hand
    pub max_auto_retries: u32,
    pub retry_strategy: RetryStrategy,
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub backoff_base: Duration,
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub backoff_max: Duration,
    /// Delays vary by up to this fraction either way (0.0 disables)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_auto_retries: MAX_AUTO_RETRY_LIMIT,
            retry_strategy: RetryStrategy::ExponentialBackoff,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(10),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt number `attempt` (starting at 0).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay = match self.retry_strategy {
            RetryStrategy::Immediate => Duration::from_millis(0),
            RetryStrategy::LinearBackoff => self.backoff_base.saturating_mul(attempt + 1),
            RetryStrategy::ExponentialBackoff => {
                let multiplier = 2u32.saturating_pow(attempt);
                self.backoff_base.saturating_mul(multiplier)
            }
        };
        let delay = delay.min(self.backoff_max);

        if self.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }

        // Spread the reconnects of a wall of cameras coming back at once.
        let delay_ms = delay.as_millis() as f64;
        let jitter = delay_ms * self.jitter_factor * (rand::random::<f64>() * 2.0 - 1.0);
        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    pub fn should_retry(&self, error: &StreamError, attempt: u32) -> bool {
        attempt < self.max_auto_retries && error.error_type.is_auto_recoverable()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManualRetryReason {
    RetriesExhausted { attempts: u32 },
    NotRecoverable { error_type: ErrorType },
    Destroyed,
}

/// Outcome of reporting a fault to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum RetryDecision {
    AutoRetry {
        attempt: u32,
        #[serde(rename = "delay_ms", serialize_with = "crate::serde_helpers::serialize_duration")]
        delay: Duration,
    },
    ManualRetryRequired {
        reason: ManualRetryReason,
    },
}

impl RetryDecision {
    pub fn is_auto_retry(&self) -> bool {
        matches!(self, RetryDecision::AutoRetry { .. })
    }
}

pub type RetryFn = Box<dyn FnOnce() + Send + 'static>;

pub struct FallbackRetryCoordinator {
    policy: RetryPolicy,
    timer: TimerSlot,
    state: Mutex<CoordinatorState>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    auto_retry_count: u32,
    destroyed: bool,
}

impl FallbackRetryCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            timer: TimerSlot::new("auto-retry"),
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Decides how to recover from `error`, scheduling `retry` when an
    /// automatic attempt is granted.
    ///
    /// A new error replaces any pending attempt. Whenever the decision is
    /// manual retry, the pending attempt, if any, is cancelled.
    pub fn handle_error(&self, error: &StreamError, retry: RetryFn) -> RetryDecision {
        let mut state = self.state.lock();

        if state.destroyed {
            drop(state);
            self.timer.cancel();
            return RetryDecision::ManualRetryRequired {
                reason: ManualRetryReason::Destroyed,
            };
        }

        if !error.error_type.is_auto_recoverable() {
            drop(state);
            if self.timer.cancel() {
                debug!("Pending automatic retry dropped");
            }
            debug!(error_type = %error.error_type, "Fault needs manual retry");
            return RetryDecision::ManualRetryRequired {
                reason: ManualRetryReason::NotRecoverable {
                    error_type: error.error_type,
                },
            };
        }

        if !self.policy.should_retry(error, state.auto_retry_count) {
            let attempts = state.auto_retry_count;
            drop(state);
            self.timer.cancel();
            warn!(attempts, "Automatic retries exhausted");
            return RetryDecision::ManualRetryRequired {
                reason: ManualRetryReason::RetriesExhausted { attempts },
            };
        }

        let delay = self.policy.calculate_delay(state.auto_retry_count);
        state.auto_retry_count += 1;
        let attempt = state.auto_retry_count;
        drop(state);

        info!(
            attempt,
            max = self.policy.max_auto_retries,
            delay_ms = delay.as_millis() as u64,
            error_type = %error.error_type,
            "Scheduling automatic retry"
        );
        self.timer.schedule(delay, retry);

        RetryDecision::AutoRetry { attempt, delay }
    }

    /// Connectivity came back while the player sits in error or timeout:
    /// retry right away, drawing on the same budget. Returns whether an
    /// attempt was issued.
    pub fn on_network_restored(&self, retry: RetryFn) -> bool {
        {
            let mut state = self.state.lock();
            if state.destroyed || state.auto_retry_count >= self.policy.max_auto_retries {
                return false;
            }
            state.auto_retry_count += 1;
            info!(attempt = state.auto_retry_count, "Network restored, retrying now");
        }
        self.timer.cancel();
        retry();
        true
    }

    /// Restores the full budget and drops any pending attempt.
    pub fn reset(&self) {
        self.state.lock().auto_retry_count = 0;
        self.timer.cancel();
    }

    pub fn clear_pending_retry(&self) -> bool {
        self.timer.cancel()
    }

    pub fn has_pending_retry(&self) -> bool {
        self.timer.is_pending()
    }

    pub fn auto_retry_count(&self) -> u32 {
        self.state.lock().auto_retry_count
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.policy.max_auto_retries.saturating_sub(self.auto_retry_count())
    }

    pub fn destroy(&self) {
        self.state.lock().destroyed = true;
        self.timer.cancel();
    }
}

impl Default for FallbackRetryCoordinator {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

/// Shared counter handy for retry callbacks in tests and demos.
pub fn counting_retry(counter: &Arc<std::sync::atomic::AtomicU32>) -> RetryFn {
    let counter = Arc::clone(counter);
    Box::new(move || {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    })
}
