//! Per-player loading watchdog.
//!
//! One deadline covers the current loading stage; moving to the next stage
//! restarts it, so a timeout only fires when a single stage stalls for the
//! whole window. The tracker only reports: cleanup and retry belong to the
//! controller.

use common::{DeviceTier, LoadingStage};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TimeoutSettings;
use crate::timer::TimerSlot;

/// Consecutive timeouts after which troubleshooting guidance is shown.
pub const TROUBLESHOOTING_THRESHOLD: u32 = 3;

pub type TimeoutCallback = Arc<dyn Fn(LoadingStage) + Send + Sync>;
pub type TroubleshootingCallback = Arc<dyn Fn(u32) + Send + Sync>;

pub struct LoadingTimeoutTracker {
    deadline: Duration,
    timer: TimerSlot,
    state: Arc<Mutex<TrackerState>>,
    on_timeout: Option<TimeoutCallback>,
    on_troubleshooting: Option<TroubleshootingCallback>,
}

#[derive(Debug, Default)]
struct TrackerState {
    active_stage: Option<LoadingStage>,
    consecutive_failures: u32,
    destroyed: bool,
}

impl LoadingTimeoutTracker {
    /// Tracker with the configured deadline for `tier`.
    pub fn new(tier: DeviceTier, settings: &TimeoutSettings) -> Self {
        Self::with_deadline(settings.deadline_for(tier))
    }

    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline,
            timer: TimerSlot::new("loading-timeout"),
            state: Arc::new(Mutex::new(TrackerState::default())),
            on_timeout: None,
            on_troubleshooting: None,
        }
    }

    pub fn on_timeout(mut self, callback: TimeoutCallback) -> Self {
        self.on_timeout = Some(callback);
        self
    }

    pub fn on_troubleshooting(mut self, callback: TroubleshootingCallback) -> Self {
        self.on_troubleshooting = Some(callback);
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Arms the deadline for `stage`, replacing any running one.
    pub fn start(&self, stage: LoadingStage) {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.active_stage = Some(stage);
        }
        self.arm(stage);
    }

    /// Restarts the deadline for a new stage. Ignored when not running.
    pub fn update_stage(&self, stage: LoadingStage) {
        {
            let mut state = self.state.lock();
            if state.destroyed || state.active_stage.is_none() {
                return;
            }
            if state.active_stage == Some(stage) {
                return;
            }
            state.active_stage = Some(stage);
        }
        debug!(stage = %stage, "Loading deadline restarted");
        self.arm(stage);
    }

    /// Stops the deadline without counting a failure.
    pub fn clear(&self) {
        self.state.lock().active_stage = None;
        self.timer.cancel();
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    pub fn reset_failures(&self) {
        self.state.lock().consecutive_failures = 0;
    }

    pub fn should_suggest_troubleshooting(&self) -> bool {
        self.consecutive_failures() >= TROUBLESHOOTING_THRESHOLD
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active_stage.is_some()
    }

    pub fn active_stage(&self) -> Option<LoadingStage> {
        self.state.lock().active_stage
    }

    pub fn destroy(&self) {
        {
            let mut state = self.state.lock();
            state.destroyed = true;
            state.active_stage = None;
        }
        self.timer.cancel();
    }

    fn arm(&self, stage: LoadingStage) {
        let state = Arc::clone(&self.state);
        let on_timeout = self.on_timeout.clone();
        let on_troubleshooting = self.on_troubleshooting.clone();
        let deadline = self.deadline;

        self.timer.schedule(deadline, move || {
            let failures = {
                let mut state = state.lock();
                if state.destroyed || state.active_stage != Some(stage) {
                    return;
                }
                state.active_stage = None;
                state.consecutive_failures += 1;
                state.consecutive_failures
            };

            warn!(
                stage = %stage,
                deadline_ms = deadline.as_millis() as u64,
                consecutive_failures = failures,
                "Loading stalled"
            );
            if let Some(callback) = on_timeout {
                callback(stage);
            }
            if failures >= TROUBLESHOOTING_THRESHOLD {
                if let Some(callback) = on_troubleshooting {
                    callback(failures);
                }
            }
        });
    }
}
