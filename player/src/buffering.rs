//! Stall indicator with a grace period.
//!
//! Live streams routinely drain their buffer for a moment; the indicator only
//! shows once buffering has lasted the whole delay without playback resuming.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::timer::TimerSlot;

pub type IndicatorCallback = Arc<dyn Fn() + Send + Sync>;

pub struct BufferingIndicator {
    delay: Duration,
    timer: TimerSlot,
    stalled: Arc<Mutex<bool>>,
    on_stalled: Option<IndicatorCallback>,
    on_recovered: Option<IndicatorCallback>,
}

impl BufferingIndicator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timer: TimerSlot::new("buffering-indicator"),
            stalled: Arc::new(Mutex::new(false)),
            on_stalled: None,
            on_recovered: None,
        }
    }

    pub fn on_stalled(mut self, callback: IndicatorCallback) -> Self {
        self.on_stalled = Some(callback);
        self
    }

    pub fn on_recovered(mut self, callback: IndicatorCallback) -> Self {
        self.on_recovered = Some(callback);
        self
    }

    /// Buffer ran dry during playback. Repeated reports keep the first deadline.
    pub fn on_buffer_empty(&self) {
        if *self.stalled.lock() || self.timer.is_pending() {
            return;
        }

        let stalled = Arc::clone(&self.stalled);
        let on_stalled = self.on_stalled.clone();
        let delay = self.delay;
        self.timer.schedule(delay, move || {
            *stalled.lock() = true;
            debug!(delay_ms = delay.as_millis() as u64, "Buffering outlasted grace period");
            if let Some(callback) = on_stalled {
                callback();
            }
        });
    }

    /// Playback resumed; hides the indicator or drops the pending one.
    pub fn on_playback_resumed(&self) {
        self.timer.cancel();
        let was_stalled = std::mem::take(&mut *self.stalled.lock());
        if was_stalled {
            if let Some(callback) = &self.on_recovered {
                callback();
            }
        }
    }

    pub fn is_stalled(&self) -> bool {
        *self.stalled.lock()
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    /// Silently clears all state, e.g. on teardown.
    pub fn reset(&self) {
        self.timer.cancel();
        *self.stalled.lock() = false;
    }
}
