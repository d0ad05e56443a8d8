//! Environment observers: on-screen visibility, device orientation and
//! network connectivity.
//!
//! The host publishes each observation on a `watch` channel. A watcher
//! forwards a value to its callback only when it differs from the last one
//! seen, starting from the value current at `start()`.

pub mod connectivity;
pub mod orientation;
pub mod visibility;

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub use connectivity::{Connectivity, ConnectivityWatcher};
pub use orientation::{OrientationWatcher, Viewport};
pub use visibility::{Visibility, VisibilityPauseScheduler, VisibilityWatcher};

pub type SignalCallback<T> = Arc<dyn Fn(T) + Send + Sync>;

pub struct SignalWatcher<T> {
    name: &'static str,
    inner: Mutex<WatcherState<T>>,
}

struct WatcherState<T> {
    receiver: Option<watch::Receiver<T>>,
    callback: Option<SignalCallback<T>>,
    token: Option<CancellationToken>,
}

impl<T> SignalWatcher<T>
where
    T: Clone + PartialEq + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(WatcherState {
                receiver: None,
                callback: None,
                token: None,
            }),
        }
    }

    /// Binds the watcher to a channel. A running watcher is restarted on the
    /// new channel.
    pub fn observe(&self, receiver: watch::Receiver<T>, callback: SignalCallback<T>) {
        let restart = {
            let mut inner = self.inner.lock();
            inner.receiver = Some(receiver);
            inner.callback = Some(callback);
            inner.token.is_some()
        };
        if restart {
            self.stop();
            self.start();
        }
    }

    /// Starts forwarding changes. No-op when unbound or already running.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        if inner.token.is_some() {
            return;
        }
        let (Some(receiver), Some(callback)) = (inner.receiver.clone(), inner.callback.clone()) else {
            return;
        };

        let token = CancellationToken::new();
        inner.token = Some(token.clone());
        drop(inner);

        let name = self.name;
        tokio::spawn(async move {
            let mut receiver = receiver;
            let mut last = receiver.borrow_and_update().clone();

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    changed = receiver.changed() => {
                        if changed.is_err() {
                            debug!(watcher = name, "Signal source closed");
                            break;
                        }
                        let value = receiver.borrow_and_update().clone();
                        if value == last {
                            continue;
                        }
                        trace!(watcher = name, from = ?last, to = ?value, "Signal changed");
                        last = value.clone();
                        callback(value);
                    }
                }
            }
        });
        debug!(watcher = self.name, "Watcher started");
    }

    pub fn stop(&self) {
        if let Some(token) = self.inner.lock().token.take() {
            token.cancel();
            debug!(watcher = self.name, "Watcher stopped");
        }
    }

    /// Stops and forgets the bound channel and callback.
    pub fn detach(&self) {
        self.stop();
        let mut inner = self.inner.lock();
        inner.receiver = None;
        inner.callback = None;
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().token.is_some()
    }

    /// Latest value on the bound channel.
    pub fn current(&self) -> Option<T> {
        self.inner
            .lock()
            .receiver
            .as_ref()
            .map(|receiver| receiver.borrow().clone())
    }
}

impl<T> Drop for SignalWatcher<T> {
    fn drop(&mut self) {
        if let Some(token) = self.inner.get_mut().token.take() {
            token.cancel();
        }
    }
}
