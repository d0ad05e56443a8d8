use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::SignalWatcher;
use crate::timer::TimerSlot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

pub type VisibilityWatcher = SignalWatcher<Visibility>;

/// Pauses playback that stayed off-screen for the whole delay.
pub type PauseFn = Arc<dyn Fn() -> bool + Send + Sync>;
pub type ResumeFn = Arc<dyn Fn() + Send + Sync>;

/// Delayed suspend/resume policy for an off-screen player.
///
/// Going hidden arms a single pause timer; coming back before it fires
/// cancels it. A pause applied by this scheduler is undone when the player
/// becomes visible again; a pause the viewer made is left alone.
pub struct VisibilityPauseScheduler {
    delay: Duration,
    timer: TimerSlot,
    state: Arc<Mutex<SchedulerState>>,
    on_pause: PauseFn,
    on_resume: ResumeFn,
}

#[derive(Debug)]
struct SchedulerState {
    visibility: Visibility,
    paused_by_visibility: bool,
    destroyed: bool,
}

impl VisibilityPauseScheduler {
    /// `on_pause` returns whether playback was actually paused.
    pub fn new(delay: Duration, on_pause: PauseFn, on_resume: ResumeFn) -> Self {
        Self {
            delay,
            timer: TimerSlot::new("visibility-pause"),
            state: Arc::new(Mutex::new(SchedulerState {
                visibility: Visibility::Visible,
                paused_by_visibility: false,
                destroyed: false,
            })),
            on_pause,
            on_resume,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn on_visibility_change(&self, visibility: Visibility) {
        let resume = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.visibility = visibility;
            match visibility {
                Visibility::Hidden => {
                    if state.paused_by_visibility {
                        return;
                    }
                    false
                }
                Visibility::Visible => std::mem::take(&mut state.paused_by_visibility),
            }
        };

        match visibility {
            Visibility::Hidden => self.arm(),
            Visibility::Visible => {
                if self.timer.cancel() {
                    debug!("Player visible again, pending pause cancelled");
                }
                if resume {
                    info!("Player visible again, resuming");
                    (self.on_resume)();
                }
            }
        }
    }

    /// Playback (re)started; an off-screen player gets a fresh pause timer.
    pub fn on_playing_started(&self) {
        let hidden = {
            let state = self.state.lock();
            !state.destroyed && state.visibility == Visibility::Hidden
        };
        if hidden && !self.timer.is_pending() {
            self.arm();
        }
    }

    /// Forgets a pause applied by this scheduler, e.g. after a manual resume
    /// or a reload.
    pub fn clear_suspension(&self) {
        self.state.lock().paused_by_visibility = false;
    }

    pub fn cancel(&self) -> bool {
        self.timer.cancel()
    }

    pub fn is_pause_pending(&self) -> bool {
        self.timer.is_pending()
    }

    pub fn paused_by_visibility(&self) -> bool {
        self.state.lock().paused_by_visibility
    }

    pub fn visibility(&self) -> Visibility {
        self.state.lock().visibility
    }

    pub fn destroy(&self) {
        {
            let mut state = self.state.lock();
            state.destroyed = true;
            state.paused_by_visibility = false;
        }
        self.timer.cancel();
    }

    fn arm(&self) {
        let state = Arc::clone(&self.state);
        let on_pause = Arc::clone(&self.on_pause);
        let on_resume = Arc::clone(&self.on_resume);
        let delay = self.delay;

        debug!(delay_ms = delay.as_millis() as u64, "Player hidden, pause scheduled");
        self.timer.schedule(delay, move || {
            {
                let state = state.lock();
                if state.destroyed || state.visibility != Visibility::Hidden {
                    return;
                }
            }
            if !on_pause() {
                return;
            }

            // Visibility may have flipped while the pause was applied.
            let visible_again = {
                let mut state = state.lock();
                if state.destroyed {
                    return;
                }
                if state.visibility == Visibility::Hidden {
                    state.paused_by_visibility = true;
                    false
                } else {
                    true
                }
            };
            if visible_again {
                info!("Player visible again while pausing, resuming");
                on_resume();
            } else {
                info!("Paused off-screen player");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{OnceLock, Weak};
    use tokio::time::sleep;

    struct Harness {
        scheduler: VisibilityPauseScheduler,
        pauses: Arc<AtomicU32>,
        resumes: Arc<AtomicU32>,
        playing: Arc<AtomicBool>,
    }

    fn harness(delay_ms: u64) -> Harness {
        let pauses = Arc::new(AtomicU32::new(0));
        let resumes = Arc::new(AtomicU32::new(0));
        let playing = Arc::new(AtomicBool::new(true));

        let (p, pl) = (Arc::clone(&pauses), Arc::clone(&playing));
        let on_pause: PauseFn = Arc::new(move || {
            if !pl.swap(false, Ordering::SeqCst) {
                return false;
            }
            p.fetch_add(1, Ordering::SeqCst);
            true
        });
        let (r, pl) = (Arc::clone(&resumes), Arc::clone(&playing));
        let on_resume: ResumeFn = Arc::new(move || {
            pl.store(true, Ordering::SeqCst);
            r.fetch_add(1, Ordering::SeqCst);
        });

        Harness {
            scheduler: VisibilityPauseScheduler::new(Duration::from_millis(delay_ms), on_pause, on_resume),
            pauses,
            resumes,
            playing,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_brief_absence_does_not_pause() {
        let h = harness(5000);

        h.scheduler.on_visibility_change(Visibility::Hidden);
        assert!(h.scheduler.is_pause_pending());
        sleep(Duration::from_millis(2000)).await;
        h.scheduler.on_visibility_change(Visibility::Visible);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(h.pauses.load(Ordering::SeqCst), 0);
        assert_eq!(h.resumes.load(Ordering::SeqCst), 0);
        assert!(!h.scheduler.is_pause_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_absence_pauses_once_then_resumes() {
        let h = harness(5000);

        h.scheduler.on_visibility_change(Visibility::Hidden);
        sleep(Duration::from_millis(5001)).await;
        assert_eq!(h.pauses.load(Ordering::SeqCst), 1);
        assert!(h.scheduler.paused_by_visibility());

        h.scheduler.on_visibility_change(Visibility::Hidden);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(h.pauses.load(Ordering::SeqCst), 1);

        h.scheduler.on_visibility_change(Visibility::Visible);
        assert_eq!(h.resumes.load(Ordering::SeqCst), 1);
        assert!(!h.scheduler.paused_by_visibility());
        assert!(h.playing.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_during_pause_resumes() {
        let resumes = Arc::new(AtomicU32::new(0));
        let slot: Arc<OnceLock<Weak<VisibilityPauseScheduler>>> = Arc::new(OnceLock::new());

        let on_pause: PauseFn = {
            let slot = Arc::clone(&slot);
            Arc::new(move || {
                // The viewer scrolls back while the pause is being applied.
                if let Some(scheduler) = slot.get().and_then(|weak| weak.upgrade()) {
                    scheduler.on_visibility_change(Visibility::Visible);
                }
                true
            })
        };
        let on_resume: ResumeFn = {
            let resumes = Arc::clone(&resumes);
            Arc::new(move || {
                resumes.fetch_add(1, Ordering::SeqCst);
            })
        };
        let scheduler = Arc::new(VisibilityPauseScheduler::new(Duration::from_millis(1000), on_pause, on_resume));
        let _ = slot.set(Arc::downgrade(&scheduler));

        scheduler.on_visibility_change(Visibility::Hidden);
        sleep(Duration::from_millis(1001)).await;

        assert_eq!(resumes.load(Ordering::SeqCst), 1);
        assert!(!scheduler.paused_by_visibility());
        assert_eq!(scheduler.visibility(), Visibility::Visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_viewer_pause_is_not_undone() {
        let h = harness(1000);
        h.playing.store(false, Ordering::SeqCst);

        h.scheduler.on_visibility_change(Visibility::Hidden);
        sleep(Duration::from_millis(1001)).await;
        assert!(!h.scheduler.paused_by_visibility());

        h.scheduler.on_visibility_change(Visibility::Visible);
        assert_eq!(h.resumes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playing_while_hidden_rearms() {
        let h = harness(1000);
        h.playing.store(false, Ordering::SeqCst);

        h.scheduler.on_visibility_change(Visibility::Hidden);
        sleep(Duration::from_millis(1001)).await;
        assert!(!h.scheduler.is_pause_pending());

        h.playing.store(true, Ordering::SeqCst);
        h.scheduler.on_playing_started();
        assert!(h.scheduler.is_pause_pending());
        sleep(Duration::from_millis(1001)).await;
        assert_eq!(h.pauses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_cancels_pending_pause() {
        let h = harness(1000);

        h.scheduler.on_visibility_change(Visibility::Hidden);
        h.scheduler.destroy();
        h.scheduler.on_visibility_change(Visibility::Hidden);
        h.scheduler.on_playing_started();

        sleep(Duration::from_secs(5)).await;
        assert_eq!(h.pauses.load(Ordering::SeqCst), 0);
        assert!(!h.scheduler.is_pause_pending());
    }
}
