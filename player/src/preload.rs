//! Process-wide, load-once cache for the decoder module.
//!
//! The first caller starts the fetch and parks the in-flight future in the
//! cache; every caller after that, including those arriving before the fetch
//! completes, awaits the same shared future and receives the same handle. A
//! failed fetch is forgotten so a later call can try again. A handle, once
//! obtained, is kept for the rest of the process.

use common::{PlayerError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::media::{DecoderHandle, DecoderModuleLoader};

type SharedLoad = Shared<BoxFuture<'static, Result<DecoderHandle>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadState {
    Idle,
    Loading,
    Loaded,
    Error,
}

enum Slot {
    Idle,
    Loading { generation: u64, future: SharedLoad },
    Loaded(DecoderHandle),
    Failed { reason: String },
}

struct CacheInner {
    slot: Slot,
    generation: u64,
    load_count: u32,
}

pub struct PreloadCache {
    inner: Mutex<CacheInner>,
}

static GLOBAL: OnceLock<Arc<PreloadCache>> = OnceLock::new();

impl PreloadCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                slot: Slot::Idle,
                generation: 0,
                load_count: 0,
            }),
        }
    }

    /// The instance shared by every player in the process.
    pub fn global() -> Arc<PreloadCache> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(PreloadCache::new())))
    }

    /// Returns the decoder module, loading it through `loader` if no load has
    /// succeeded or is in flight.
    pub async fn ensure_loaded(&self, loader: Arc<dyn DecoderModuleLoader>) -> Result<DecoderHandle> {
        let (generation, future) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            match &inner.slot {
                Slot::Loaded(handle) => return Ok(Arc::clone(handle)),
                Slot::Loading { generation, future } => {
                    debug!("Decoder module load already in flight");
                    (*generation, future.clone())
                }
                Slot::Idle | Slot::Failed { .. } => {
                    inner.generation += 1;
                    inner.load_count += 1;
                    let generation = inner.generation;
                    let future = async move { loader.load().await }.boxed().shared();
                    inner.slot = Slot::Loading {
                        generation,
                        future: future.clone(),
                    };
                    info!(attempt = inner.load_count, "Loading decoder module");
                    (generation, future)
                }
            }
        };

        let result = future.await;

        let mut inner = self.inner.lock();
        let current = matches!(&inner.slot, Slot::Loading { generation: g, .. } if *g == generation);
        if current {
            inner.slot = match &result {
                Ok(handle) => {
                    info!("Decoder module loaded");
                    Slot::Loaded(Arc::clone(handle))
                }
                Err(error) => {
                    warn!(error = %error, "Decoder module failed to load");
                    Slot::Failed {
                        reason: error.to_string(),
                    }
                }
            };
        }
        result
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.inner.lock().slot, Slot::Loaded(_))
    }

    pub fn state(&self) -> PreloadState {
        match self.inner.lock().slot {
            Slot::Idle => PreloadState::Idle,
            Slot::Loading { .. } => PreloadState::Loading,
            Slot::Loaded(_) => PreloadState::Loaded,
            Slot::Failed { .. } => PreloadState::Error,
        }
    }

    /// Reason of the last failed load, while in the error state.
    pub fn last_error(&self) -> Option<PlayerError> {
        match &self.inner.lock().slot {
            Slot::Failed { reason } => Some(PlayerError::DecoderLoad {
                reason: reason.clone(),
            }),
            _ => None,
        }
    }

    /// Number of loads started over the cache's lifetime.
    pub fn load_count(&self) -> u32 {
        self.inner.lock().load_count
    }

    /// Returns to the idle state, dropping any handle. Meant for test
    /// isolation; a load in flight completes but is not recorded.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.slot = Slot::Idle;
        inner.load_count = 0;
    }
}

impl Default for PreloadCache {
    fn default() -> Self {
        Self::new()
    }
}
