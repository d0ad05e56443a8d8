use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// A slot holding at most one scheduled callback.
///
/// Scheduling replaces whatever was pending. Every schedule bumps a
/// generation counter and the callback only runs if its generation is still
/// current when the delay elapses, so a callback that was already woken when
/// `cancel` ran can never apply.
///
/// `schedule` must be called from within a tokio runtime.
pub struct TimerSlot {
    name: &'static str,
    state: Arc<Mutex<SlotState>>,
}

#[derive(Default)]
struct SlotState {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(SlotState::default())),
        }
    }

    pub fn schedule<F>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        state.generation += 1;
        let generation = state.generation;
        if let Some(previous) = state.handle.take() {
            previous.abort();
        }

        let shared = Arc::clone(&self.state);
        let name = self.name;
        state.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = shared.lock();
                if state.generation != generation {
                    trace!(timer = name, "Stale timer ignored");
                    return;
                }
                state.handle = None;
            }
            trace!(timer = name, "Timer fired");
            callback();
        }));
        trace!(timer = self.name, delay_ms = delay.as_millis() as u64, "Timer scheduled");
    }

    /// Cancels the pending callback. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        state.generation += 1;
        match state.handle.take() {
            Some(handle) => {
                handle.abort();
                trace!(timer = self.name, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().handle.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
