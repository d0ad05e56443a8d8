//! Scripted stand-ins for the decoder library and the playback element.
//!
//! They record every call made on them so tests can assert on teardown, and
//! can be told to fail, stall or report faults at chosen points in virtual
//! time.

use async_trait::async_trait;
use common::{PlayerError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::debug;

use crate::media::{
    Decoder, DecoderEvent, DecoderFault, DecoderHandle, DecoderModule, DecoderModuleLoader, MediaElement, MediaEvent,
};
use crate::stream_config::StreamConfig;

pub struct SimulatedModuleLoader {
    module: Arc<SimulatedDecoderModule>,
    delay: Duration,
    failures_left: AtomicU32,
    loads: AtomicU32,
}

impl SimulatedModuleLoader {
    pub fn new(module: Arc<SimulatedDecoderModule>) -> Self {
        Self {
            module,
            delay: Duration::ZERO,
            failures_left: AtomicU32::new(0),
            loads: AtomicU32::new(0),
        }
    }

    /// Time each fetch takes.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fails the first `count` fetches.
    pub fn failing_first(self, count: u32) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn module(&self) -> Arc<SimulatedDecoderModule> {
        Arc::clone(&self.module)
    }

    pub fn load_count(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecoderModuleLoader for SimulatedModuleLoader {
    async fn load(&self) -> Result<DecoderHandle> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(PlayerError::DecoderLoad {
                reason: "module fetch failed".to_string(),
            });
        }

        Ok(self.module.clone() as DecoderHandle)
    }
}

/// What a created decoder does once loading starts.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderScript {
    /// Parses the manifest, then buffers the first fragment.
    Healthy {
        manifest_after: Duration,
        fragment_after: Duration,
    },
    /// Never reports progress.
    Stall,
    /// Parses the manifest, then reports `fault`.
    Fault { after: Duration, fault: DecoderFault },
    /// Reports nothing on its own; drive it through [`SimulatedDecoderHandle::emit`].
    Manual,
}

impl Default for DecoderScript {
    fn default() -> Self {
        DecoderScript::Healthy {
            manifest_after: Duration::from_millis(100),
            fragment_after: Duration::from_millis(200),
        }
    }
}

pub struct SimulatedDecoderModule {
    supported: AtomicBool,
    fail_create: AtomicBool,
    default_script: Mutex<DecoderScript>,
    queued_scripts: Mutex<VecDeque<DecoderScript>>,
    decoders: Mutex<Vec<SimulatedDecoderHandle>>,
    configs: Mutex<Vec<StreamConfig>>,
}

impl SimulatedDecoderModule {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            supported: AtomicBool::new(true),
            fail_create: AtomicBool::new(false),
            default_script: Mutex::new(DecoderScript::default()),
            queued_scripts: Mutex::new(VecDeque::new()),
            decoders: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
        })
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Script used by every decoder without a queued one.
    pub fn set_script(&self, script: DecoderScript) {
        *self.default_script.lock() = script;
    }

    /// Script for the next decoder created, ahead of the default.
    pub fn queue_script(&self, script: DecoderScript) {
        self.queued_scripts.lock().push_back(script);
    }

    pub fn created_count(&self) -> usize {
        self.decoders.lock().len()
    }

    pub fn decoder(&self, index: usize) -> Option<SimulatedDecoderHandle> {
        self.decoders.lock().get(index).cloned()
    }

    pub fn last_decoder(&self) -> Option<SimulatedDecoderHandle> {
        self.decoders.lock().last().cloned()
    }

    pub fn last_config(&self) -> Option<StreamConfig> {
        self.configs.lock().last().cloned()
    }
}

impl DecoderModule for SimulatedDecoderModule {
    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    fn create(&self, config: &StreamConfig) -> Result<Box<dyn Decoder>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PlayerError::DecoderCreation {
                reason: "constructor threw".to_string(),
            });
        }

        let script = self
            .queued_scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_script.lock().clone());
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = SimulatedDecoderHandle {
            probe: Arc::new(DecoderProbe {
                sender,
                source: Mutex::new(None),
                attached: AtomicU32::new(0),
                start_loads: AtomicU32::new(0),
                recoveries: AtomicU32::new(0),
                destroys: AtomicU32::new(0),
            }),
        };

        self.configs.lock().push(config.clone());
        self.decoders.lock().push(handle.clone());

        Ok(Box::new(SimulatedDecoder {
            probe: Arc::clone(&handle.probe),
            script,
            events: Some(receiver),
        }))
    }
}

struct DecoderProbe {
    sender: mpsc::UnboundedSender<DecoderEvent>,
    source: Mutex<Option<String>>,
    attached: AtomicU32,
    start_loads: AtomicU32,
    recoveries: AtomicU32,
    destroys: AtomicU32,
}

impl DecoderProbe {
    fn is_destroyed(&self) -> bool {
        self.destroys.load(Ordering::SeqCst) > 0
    }
}

/// Test-side view of one created decoder.
#[derive(Clone)]
pub struct SimulatedDecoderHandle {
    probe: Arc<DecoderProbe>,
}

impl SimulatedDecoderHandle {
    /// Delivers `event` as if the decoder raised it. Returns false once the
    /// decoder is destroyed or nobody listens.
    pub fn emit(&self, event: DecoderEvent) -> bool {
        !self.probe.is_destroyed() && self.probe.sender.send(event).is_ok()
    }

    pub fn source(&self) -> Option<String> {
        self.probe.source.lock().clone()
    }

    pub fn attach_count(&self) -> u32 {
        self.probe.attached.load(Ordering::SeqCst)
    }

    pub fn start_load_count(&self) -> u32 {
        self.probe.start_loads.load(Ordering::SeqCst)
    }

    pub fn recover_count(&self) -> u32 {
        self.probe.recoveries.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> u32 {
        self.probe.destroys.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.probe.is_destroyed()
    }
}

pub struct SimulatedDecoder {
    probe: Arc<DecoderProbe>,
    script: DecoderScript,
    events: Option<mpsc::UnboundedReceiver<DecoderEvent>>,
}

impl SimulatedDecoder {
    fn run_script(&self) {
        let probe = Arc::clone(&self.probe);
        let steps: Vec<(Duration, DecoderEvent)> = match &self.script {
            DecoderScript::Healthy {
                manifest_after,
                fragment_after,
            } => vec![
                (*manifest_after, DecoderEvent::ManifestParsed { levels: 3 }),
                (*fragment_after, DecoderEvent::FragmentBuffered),
            ],
            DecoderScript::Fault { after, fault } => vec![
                (Duration::ZERO, DecoderEvent::ManifestParsed { levels: 1 }),
                (*after, DecoderEvent::Error(fault.clone())),
            ],
            DecoderScript::Stall | DecoderScript::Manual => return,
        };

        tokio::spawn(async move {
            for (delay, event) in steps {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if probe.is_destroyed() || probe.sender.send(event).is_err() {
                    return;
                }
            }
        });
    }
}

impl Decoder for SimulatedDecoder {
    fn load_source(&mut self, url: &str) {
        *self.probe.source.lock() = Some(url.to_string());
    }

    fn attach_media(&mut self, _element: Arc<dyn MediaElement>) {
        self.probe.attached.fetch_add(1, Ordering::SeqCst);
    }

    fn start_load(&mut self) {
        self.probe.start_loads.fetch_add(1, Ordering::SeqCst);
        self.run_script();
    }

    fn recover_media_error(&mut self) {
        self.probe.recoveries.fetch_add(1, Ordering::SeqCst);
        debug!("Simulated decoder recovering from media error");
    }

    fn destroy(&mut self) {
        self.probe.destroys.fetch_add(1, Ordering::SeqCst);
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<DecoderEvent>> {
        self.events.take()
    }
}

/// In-memory playback element.
pub struct SimulatedMediaElement {
    events: broadcast::Sender<MediaEvent>,
    state: Mutex<ElementState>,
    play_gate: Mutex<Option<Arc<Notify>>>,
}

#[derive(Debug, Default)]
struct ElementState {
    src: Option<String>,
    paused: bool,
    reject_play: bool,
    play_calls: u32,
    pause_calls: u32,
    load_calls: u32,
    src_clears: u32,
}

impl SimulatedMediaElement {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events,
            state: Mutex::new(ElementState {
                paused: true,
                ..Default::default()
            }),
            play_gate: Mutex::new(None),
        })
    }

    /// Makes `play()` reject, as under an autoplay policy.
    pub fn set_reject_play(&self, reject: bool) {
        self.state.lock().reject_play = reject;
    }

    /// Keeps later `play()` calls pending until [`Self::release_play`].
    pub fn hold_play(&self) {
        *self.play_gate.lock() = Some(Arc::new(Notify::new()));
    }

    /// Lets a held `play()` resolve.
    pub fn release_play(&self) {
        if let Some(gate) = self.play_gate.lock().take() {
            gate.notify_one();
        }
    }

    pub fn emit(&self, event: MediaEvent) {
        let _ = self.events.send(event);
    }

    pub fn src(&self) -> Option<String> {
        self.state.lock().src.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn play_count(&self) -> u32 {
        self.state.lock().play_calls
    }

    pub fn pause_count(&self) -> u32 {
        self.state.lock().pause_calls
    }

    pub fn load_count(&self) -> u32 {
        self.state.lock().load_calls
    }

    /// Times the source was cleared.
    pub fn src_clear_count(&self) -> u32 {
        self.state.lock().src_clears
    }
}

#[async_trait]
impl MediaElement for SimulatedMediaElement {
    async fn play(&self) -> Result<()> {
        self.state.lock().play_calls += 1;
        let gate = self.play_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        {
            let mut state = self.state.lock();
            if state.reject_play {
                return Err(PlayerError::PlaybackRejected {
                    reason: "NotAllowedError: play() failed because the user didn't interact with the document first"
                        .to_string(),
                });
            }
            state.paused = false;
        }
        let _ = self.events.send(MediaEvent::Playing);
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.pause_calls += 1;
        state.paused = true;
    }

    fn set_src(&self, src: Option<&str>) {
        let mut state = self.state.lock();
        if src.is_none() {
            state.src_clears += 1;
        }
        state.src = src.map(str::to_string);
    }

    fn load(&self) {
        self.state.lock().load_calls += 1;
    }

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.events.subscribe()
    }
}
