//! Adaptive live camera-stream playback.
//!
//! A [`StreamLifecycleController`] drives one camera view: it classifies the
//! device, picks decoder parameters for it, loads the shared decoder module
//! once per process, walks the loading stages under a watchdog, retries with
//! backoff, suspends off-screen playback and tears everything down on
//! `destroy`.

pub mod buffering;
pub mod config;
pub mod controller;
#[cfg(test)]
mod controller_test;
pub mod device;
pub mod events;
pub mod logging;
pub mod media;
pub mod preload;
pub mod retry;
pub mod serde_helpers;
pub mod simulated;
pub mod stream_config;
pub mod timeout_tracker;
pub mod timer;
pub mod watchers;

pub use buffering::BufferingIndicator;
pub use config::{ConfigManager, EnvConfigOverride, PlayerSettings};
pub use controller::{ControllerBuilder, StreamLifecycleController};
pub use device::{DeviceProfiler, DeviceSignals};
pub use events::{PlayerDiagnostics, PlayerEvent};
pub use media::{
    Decoder, DecoderEvent, DecoderFault, DecoderFaultKind, DecoderHandle, DecoderModule, DecoderModuleLoader,
    MediaElement, MediaEvent,
};
pub use preload::{PreloadCache, PreloadState};
pub use retry::{FallbackRetryCoordinator, ManualRetryReason, RetryDecision, RetryPolicy, RetryStrategy};
pub use stream_config::{select_config, select_config_by_name, select_config_for_profile, ConfigOverrides, SelectOptions, StreamConfig};
pub use timeout_tracker::LoadingTimeoutTracker;
pub use watchers::{Connectivity, Viewport, Visibility};

pub use common::*;
