//! Per-camera playback state machine.
//!
//! One controller drives one camera view. Each load attempt is a session with
//! its own id and cancellation token; every asynchronous continuation checks
//! the id before touching state, so work left over from a torn-down session
//! can never apply to the next one.

use common::{
    DeviceProfile, ErrorType, LoadingStage, Orientation, PlayerError, PlayerStatus, Result, StreamError,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::buffering::BufferingIndicator;
use crate::config::PlayerSettings;
use crate::device::{DeviceProfiler, DeviceSignals};
use crate::events::{PlayerDiagnostics, PlayerEvent};
use crate::media::{Decoder, DecoderEvent, DecoderFault, DecoderFaultKind, DecoderModuleLoader, MediaElement, MediaEvent};
use crate::preload::PreloadCache;
use crate::retry::{FallbackRetryCoordinator, ManualRetryReason, RetryDecision, RetryFn};
use crate::stream_config::{select_config_for_profile, StreamConfig};
use crate::timeout_tracker::LoadingTimeoutTracker;
use crate::watchers::{
    Connectivity, ConnectivityWatcher, OrientationWatcher, Viewport, Visibility, VisibilityPauseScheduler,
    VisibilityWatcher,
};

const EVENT_CAPACITY: usize = 64;

pub struct ControllerBuilder {
    loader: Arc<dyn DecoderModuleLoader>,
    element: Arc<dyn MediaElement>,
    profile: Option<DeviceProfile>,
    signals: Option<DeviceSignals>,
    settings: PlayerSettings,
    preload: Option<Arc<PreloadCache>>,
    camera_id: Option<String>,
}

impl ControllerBuilder {
    /// Skips detection and uses `profile` as is.
    pub fn profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Signals to classify the device from. Defaults to what the host exposes.
    pub fn signals(mut self, signals: DeviceSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn settings(mut self, settings: PlayerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Cache to load the decoder module through. Defaults to the process-wide one.
    pub fn preload_cache(mut self, cache: Arc<PreloadCache>) -> Self {
        self.preload = Some(cache);
        self
    }

    pub fn camera_id(mut self, camera_id: impl Into<String>) -> Self {
        self.camera_id = Some(camera_id.into());
        self
    }

    pub fn build(self) -> Arc<StreamLifecycleController> {
        StreamLifecycleController::new(self)
    }
}

pub struct StreamLifecycleController {
    id: Uuid,
    camera_id: Option<String>,
    weak: Weak<StreamLifecycleController>,
    config: StreamConfig,
    loader: Arc<dyn DecoderModuleLoader>,
    preload: Arc<PreloadCache>,
    element: Arc<dyn MediaElement>,
    tracker: LoadingTimeoutTracker,
    coordinator: FallbackRetryCoordinator,
    visibility: VisibilityPauseScheduler,
    buffering: BufferingIndicator,
    visibility_watcher: VisibilityWatcher,
    orientation_watcher: OrientationWatcher,
    connectivity_watcher: ConnectivityWatcher,
    events: broadcast::Sender<PlayerEvent>,
    state: Mutex<ControllerState>,
}

struct ControllerState {
    status: PlayerStatus,
    stage: Option<LoadingStage>,
    session: u64,
    source: Option<String>,
    profile: DeviceProfile,
    viewport: Viewport,
    last_error: Option<StreamError>,
    active: Option<ActiveSession>,
}

impl ControllerState {
    /// Applies `next` if the status table allows it from the current status.
    fn transition(&mut self, next: PlayerStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }
}

/// Resources owned by the current load attempt.
struct ActiveSession {
    token: CancellationToken,
    decoder: Option<Box<dyn Decoder>>,
    media_ready: bool,
    /// The first `play()` of the session resolved successfully.
    play_confirmed: bool,
    media_recovery_used: bool,
}

impl ActiveSession {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            decoder: None,
            media_ready: false,
            play_confirmed: false,
            media_recovery_used: false,
        }
    }
}

impl StreamLifecycleController {
    pub fn builder(loader: Arc<dyn DecoderModuleLoader>, element: Arc<dyn MediaElement>) -> ControllerBuilder {
        ControllerBuilder {
            loader,
            element,
            profile: None,
            signals: None,
            settings: PlayerSettings::default(),
            preload: None,
            camera_id: None,
        }
    }

    fn new(builder: ControllerBuilder) -> Arc<Self> {
        let ControllerBuilder {
            loader,
            element,
            profile,
            signals,
            settings,
            preload,
            camera_id,
        } = builder;

        let mut profile = profile
            .unwrap_or_else(|| DeviceProfiler::detect(&signals.unwrap_or_else(DeviceSignals::from_host)));
        profile.tier = settings.stream.effective_tier(profile.tier);
        let tier = profile.tier;
        let config = select_config_for_profile(&profile, &settings.stream.overrides);

        let id = Uuid::new_v4();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!(
            player_id = %id,
            camera_id = ?camera_id,
            tier = %tier,
            mobile = ?profile.mobile_device_type,
            max_buffer_length = config.max_buffer_length,
            "Player created"
        );

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let tracker = LoadingTimeoutTracker::new(tier, &settings.timeouts)
                .on_timeout({
                    let weak = weak.clone();
                    Arc::new(move |stage| {
                        if let Some(controller) = weak.upgrade() {
                            controller.handle_timeout(stage);
                        }
                    })
                })
                .on_troubleshooting({
                    let weak = weak.clone();
                    Arc::new(move |failures| {
                        if let Some(controller) = weak.upgrade() {
                            controller.emit(PlayerEvent::TroubleshootingSuggested {
                                consecutive_failures: failures,
                            });
                        }
                    })
                });

            let visibility = VisibilityPauseScheduler::new(
                settings.visibility.pause_delay_for(tier),
                {
                    let weak = weak.clone();
                    Arc::new(move || weak.upgrade().map(|controller| controller.pause()).unwrap_or(false))
                },
                {
                    let weak = weak.clone();
                    Arc::new(move || {
                        if let Some(controller) = weak.upgrade() {
                            tokio::spawn(async move {
                                controller.resume().await;
                            });
                        }
                    })
                },
            );

            let buffering = BufferingIndicator::new(settings.buffering.stall_indicator_delay)
                .on_stalled({
                    let weak = weak.clone();
                    Arc::new(move || {
                        if let Some(controller) = weak.upgrade() {
                            controller.emit(PlayerEvent::BufferingStalled);
                        }
                    })
                })
                .on_recovered({
                    let weak = weak.clone();
                    Arc::new(move || {
                        if let Some(controller) = weak.upgrade() {
                            controller.emit(PlayerEvent::BufferingRecovered);
                        }
                    })
                });

            Self {
                id,
                camera_id,
                weak: weak.clone(),
                config,
                loader,
                preload: preload.unwrap_or_else(PreloadCache::global),
                element,
                tracker,
                coordinator: FallbackRetryCoordinator::new(settings.retry.clone()),
                visibility,
                buffering,
                visibility_watcher: VisibilityWatcher::new("visibility"),
                orientation_watcher: OrientationWatcher::new("orientation"),
                connectivity_watcher: ConnectivityWatcher::new("connectivity"),
                events,
                state: Mutex::new(ControllerState {
                    status: PlayerStatus::Idle,
                    stage: None,
                    session: 0,
                    source: None,
                    profile,
                    viewport: Viewport::default(),
                    last_error: None,
                    active: None,
                }),
            }
        })
    }

    /// Starts playing `source`, tearing down any previous load first.
    ///
    /// Only a malformed source is reported as an error; everything that goes
    /// wrong afterwards moves the player to `Error` or `Timeout` and is
    /// published as events.
    pub async fn initialize(&self, source: &str) -> Result<()> {
        validate_source(source)?;
        self.start_session(source.trim().to_string()).await;
        Ok(())
    }

    /// Marks the stream as playing. From `Loading` this requires buffered
    /// media and a `play()` call that has resolved successfully. Returns
    /// whether the transition happened.
    pub fn set_playing(&self) -> bool {
        let session = self.state.lock().session;
        self.mark_playing(session)
    }

    pub fn pause(&self) -> bool {
        {
            let mut state = self.state.lock();
            if !state.transition(PlayerStatus::Paused) {
                return false;
            }
        }
        self.element.pause();
        self.buffering.reset();
        debug!(player_id = %self.id, "Playback paused");
        self.emit(PlayerEvent::StatusChanged {
            status: PlayerStatus::Paused,
        });
        true
    }

    /// Resumes paused playback. A rejected play request is a fatal media
    /// fault.
    pub async fn resume(&self) -> bool {
        let session = {
            let state = self.state.lock();
            if state.status != PlayerStatus::Paused {
                return false;
            }
            state.session
        };

        match self.element.play().await {
            Ok(()) => {
                self.visibility.clear_suspension();
                self.mark_playing(session)
            }
            Err(error) => {
                let fault = self
                    .stream_error(ErrorType::Media, format!("Playback rejected: {}", error))
                    .with_details(json!({ "reason": "play_rejected" }));
                self.escalate(session, fault);
                false
            }
        }
    }

    /// Reports a fatal fault from outside the controller.
    pub fn set_error(&self, error: StreamError) -> Option<RetryDecision> {
        let session = self.state.lock().session;
        self.escalate(session, error)
    }

    /// Manual retry: restores the automatic retry budget and reloads the last
    /// source from scratch.
    pub async fn retry(&self) -> Result<()> {
        let source = {
            let state = self.state.lock();
            if state.status == PlayerStatus::Destroyed {
                return Ok(());
            }
            state.source.clone()
        };
        let source = source.ok_or(PlayerError::NoSource)?;

        self.coordinator.reset();
        info!(player_id = %self.id, "Manual retry requested");
        self.start_session(source).await;
        Ok(())
    }

    /// Connectivity came back. Retries right away when the player sits in
    /// error or timeout and automatic attempts remain.
    pub fn on_network_restored(&self) -> bool {
        if !self.state.lock().status.is_failed() {
            return false;
        }
        let retried = self.coordinator.on_network_restored(self.reload_fn());
        info!(player_id = %self.id, retried, "Network restored");
        self.emit(PlayerEvent::NetworkRestored { retried });
        retried
    }

    /// Releases everything the player holds. Safe in any state, before
    /// `initialize` and more than once.
    pub fn destroy(&self) {
        let released = {
            let mut state = self.state.lock();
            if !state.transition(PlayerStatus::Destroyed) {
                return;
            }
            state.session += 1;
            state.active.take()
        };

        self.visibility_watcher.detach();
        self.orientation_watcher.detach();
        self.connectivity_watcher.detach();
        self.tracker.destroy();
        self.coordinator.destroy();
        self.visibility.destroy();

        if let Some(active) = released {
            self.release(active);
        }
        self.unload_element();

        info!(player_id = %self.id, camera_id = ?self.camera_id, "Player destroyed");
        self.emit(PlayerEvent::StatusChanged {
            status: PlayerStatus::Destroyed,
        });
    }

    pub fn attach_visibility(&self, receiver: watch::Receiver<Visibility>) {
        if self.is_destroyed() {
            return;
        }
        let initial = *receiver.borrow();
        let weak = self.weak.clone();
        self.visibility_watcher.observe(
            receiver,
            Arc::new(move |visibility| {
                if let Some(controller) = weak.upgrade() {
                    controller.on_visibility_change(visibility);
                }
            }),
        );
        self.visibility_watcher.start();

        if initial == Visibility::Hidden {
            self.visibility.on_visibility_change(Visibility::Hidden);
        }
    }

    pub fn attach_orientation(&self, receiver: watch::Receiver<Orientation>) {
        if self.is_destroyed() {
            return;
        }
        self.state.lock().profile.orientation = *receiver.borrow();
        let weak = self.weak.clone();
        self.orientation_watcher.observe(
            receiver,
            Arc::new(move |orientation| {
                if let Some(controller) = weak.upgrade() {
                    controller.on_orientation_change(orientation);
                }
            }),
        );
        self.orientation_watcher.start();
    }

    pub fn attach_connectivity(&self, receiver: watch::Receiver<Connectivity>) {
        if self.is_destroyed() {
            return;
        }
        let weak = self.weak.clone();
        self.connectivity_watcher.observe(
            receiver,
            Arc::new(move |connectivity: Connectivity| {
                if !connectivity.is_online() {
                    return;
                }
                if let Some(controller) = weak.upgrade() {
                    controller.on_network_restored();
                }
            }),
        );
        self.connectivity_watcher.start();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn get_status(&self) -> PlayerStatus {
        self.state.lock().status
    }

    pub fn stage(&self) -> Option<LoadingStage> {
        self.state.lock().stage
    }

    /// Loading or showing video.
    pub fn is_active(&self) -> bool {
        matches!(
            self.get_status(),
            PlayerStatus::Loading | PlayerStatus::Playing | PlayerStatus::Paused
        )
    }

    pub fn profile(&self) -> DeviceProfile {
        self.state.lock().profile.clone()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn viewport(&self) -> Viewport {
        self.state.lock().viewport
    }

    pub fn set_zoom(&self, zoom: f64) {
        self.state.lock().viewport.set_zoom(zoom);
    }

    pub fn pan_by(&self, dx: f64, dy: f64) {
        self.state.lock().viewport.pan_by(dx, dy);
    }

    pub fn is_paused_by_visibility(&self) -> bool {
        self.visibility.paused_by_visibility()
    }

    pub fn should_suggest_troubleshooting(&self) -> bool {
        self.tracker.should_suggest_troubleshooting()
    }

    pub fn diagnostics(&self) -> PlayerDiagnostics {
        let consecutive_failures = self.tracker.consecutive_failures();
        let suggest_troubleshooting = self.tracker.should_suggest_troubleshooting();
        let auto_retry_count = self.coordinator.auto_retry_count();
        let remaining_auto_retries = self.coordinator.remaining_attempts();

        let state = self.state.lock();
        PlayerDiagnostics {
            player_id: self.id,
            camera_id: self.camera_id.clone(),
            status: state.status,
            stage: state.stage,
            tier: state.profile.tier,
            mobile_device_type: state.profile.mobile_device_type,
            consecutive_failures,
            auto_retry_count,
            remaining_auto_retries,
            suggest_troubleshooting,
            last_error: state.last_error.clone(),
            source: state.source.clone(),
        }
    }

    async fn start_session(&self, source: String) {
        let (session, token, previous) = {
            let mut state = self.state.lock();
            if !state.transition(PlayerStatus::Loading) {
                debug!(player_id = %self.id, status = %state.status, "Ignoring load");
                return;
            }
            let previous = state.active.take();
            let token = CancellationToken::new();
            state.session += 1;
            state.active = Some(ActiveSession::new(token.clone()));
            state.stage = Some(LoadingStage::Connecting);
            state.source = Some(source.clone());
            (state.session, token, previous)
        };

        if let Some(previous) = previous {
            self.release(previous);
            self.unload_element();
        }
        self.visibility.clear_suspension();
        self.tracker.start(LoadingStage::Connecting);

        info!(
            player_id = %self.id,
            camera_id = ?self.camera_id,
            session,
            source = %source,
            "Starting stream"
        );
        self.emit(PlayerEvent::StatusChanged {
            status: PlayerStatus::Loading,
        });
        self.emit(PlayerEvent::stage_changed(LoadingStage::Connecting));

        let module = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            module = self.preload.ensure_loaded(Arc::clone(&self.loader)) => module,
        };
        let module = match module {
            Ok(module) => module,
            Err(load_error) => {
                let fault = self.stream_error(ErrorType::Unknown, load_error.to_string());
                self.escalate(session, fault);
                return;
            }
        };

        if !module.is_supported() {
            let fault = self
                .stream_error(ErrorType::Media, PlayerError::DecoderUnsupported.to_string())
                .with_details(json!({ "unsupported": true }));
            self.escalate(session, fault);
            return;
        }

        let mut decoder = match module.create(&self.config) {
            Ok(decoder) => decoder,
            Err(create_error) => {
                let fault = self.stream_error(ErrorType::Unknown, create_error.to_string());
                self.escalate(session, fault);
                return;
            }
        };

        let decoder_events = decoder.take_events().unwrap_or_else(|| mpsc::unbounded_channel().1);
        let media_events = self.element.subscribe();
        decoder.attach_media(Arc::clone(&self.element));
        decoder.load_source(&source);
        decoder.start_load();

        let orphan = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match state.active.as_mut() {
                Some(active) if state.session == session => {
                    active.decoder = Some(decoder);
                    None
                }
                _ => Some(decoder),
            }
        };
        if let Some(mut decoder) = orphan {
            debug!(player_id = %self.id, session, "Session superseded during setup");
            decoder.destroy();
            return;
        }

        self.advance_stage(session, LoadingStage::Loading);
        tokio::spawn(Self::run_session(
            self.weak.clone(),
            session,
            token,
            decoder_events,
            media_events,
        ));
    }

    /// Forwards decoder and element events of one session until it ends.
    async fn run_session(
        weak: Weak<Self>,
        session: u64,
        token: CancellationToken,
        mut decoder_events: mpsc::UnboundedReceiver<DecoderEvent>,
        mut media_events: broadcast::Receiver<MediaEvent>,
    ) {
        let mut decoder_open = true;
        let mut media_open = true;

        while decoder_open || media_open {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                event = decoder_events.recv(), if decoder_open => match event {
                    Some(event) => {
                        let Some(controller) = weak.upgrade() else { break };
                        controller.on_decoder_event(session, event).await;
                    }
                    None => decoder_open = false,
                },
                event = media_events.recv(), if media_open => match event {
                    Ok(event) => {
                        let Some(controller) = weak.upgrade() else { break };
                        controller.on_media_event(session, event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(session, skipped, "Media element events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => media_open = false,
                },
            }
        }
        debug!(session, "Session event pump stopped");
    }

    async fn on_decoder_event(&self, session: u64, event: DecoderEvent) {
        match event {
            DecoderEvent::ManifestParsed { levels } => {
                debug!(player_id = %self.id, levels, "Manifest parsed");
                self.advance_stage(session, LoadingStage::Buffering);
            }
            DecoderEvent::FragmentBuffered => self.on_media_ready(session).await,
            DecoderEvent::BufferEmpty => self.on_buffer_empty(session),
            DecoderEvent::Error(fault) => self.on_fault(session, fault),
        }
    }

    async fn on_media_event(&self, session: u64, event: MediaEvent) {
        match event {
            MediaEvent::CanPlay => self.on_media_ready(session).await,
            MediaEvent::Waiting => self.on_buffer_empty(session),
            MediaEvent::Playing => {
                if self.is_current(session) {
                    self.buffering.on_playback_resumed();
                }
            }
            MediaEvent::Error { message } => {
                self.on_fault(session, DecoderFault::fatal(DecoderFaultKind::Media, message));
            }
        }
    }

    /// First playable media of the session: ask the element to play.
    async fn on_media_ready(&self, session: u64) {
        {
            let mut state = self.state.lock();
            if state.session != session || state.status != PlayerStatus::Loading {
                return;
            }
            match state.active.as_mut() {
                Some(active) if !active.media_ready => active.media_ready = true,
                _ => return,
            }
        }

        self.advance_stage(session, LoadingStage::Starting);
        match self.element.play().await {
            Ok(()) => {
                {
                    let mut state = self.state.lock();
                    if state.session != session {
                        return;
                    }
                    if let Some(active) = state.active.as_mut() {
                        active.play_confirmed = true;
                    }
                }
                self.mark_playing(session);
            }
            Err(play_error) => {
                let fault = self
                    .stream_error(ErrorType::Media, format!("Playback rejected: {}", play_error))
                    .with_details(json!({ "reason": "play_rejected" }));
                self.escalate(session, fault);
            }
        }
    }

    fn on_buffer_empty(&self, session: u64) {
        let playing = {
            let state = self.state.lock();
            state.session == session && state.status == PlayerStatus::Playing
        };
        if playing {
            self.buffering.on_buffer_empty();
        }
    }

    fn on_fault(&self, session: u64, fault: DecoderFault) {
        if !fault.fatal {
            warn!(player_id = %self.id, fault = %fault, "Non-fatal decoder error");
            return;
        }

        if fault.error_type() == ErrorType::Media {
            let recovering = {
                let mut state = self.state.lock();
                if state.session != session {
                    return;
                }
                match state.active.as_mut() {
                    Some(active) if !active.media_recovery_used => {
                        active.media_recovery_used = true;
                        if let Some(decoder) = active.decoder.as_mut() {
                            decoder.recover_media_error();
                        }
                        true
                    }
                    _ => false,
                }
            };
            if recovering {
                warn!(player_id = %self.id, fault = %fault, "Fatal media error, attempting recovery");
                return;
            }
        }

        let error = self
            .stream_error(fault.error_type(), fault.to_string())
            .with_details(json!({
                "kind": format!("{:?}", fault.kind),
                "details": fault.details,
                "response_code": fault.response_code,
            }));
        self.escalate(session, error);
    }

    /// Moves the stage forward within a loading session.
    fn advance_stage(&self, session: u64, next: LoadingStage) -> bool {
        {
            let mut state = self.state.lock();
            if state.session != session || state.status != PlayerStatus::Loading {
                return false;
            }
            let current = state.stage;
            match current {
                Some(current) if current.can_transition_to(next) => state.stage = Some(next),
                _ => return false,
            }
        }
        self.tracker.update_stage(next);
        debug!(player_id = %self.id, stage = %next, "Loading stage");
        self.emit(PlayerEvent::stage_changed(next));
        true
    }

    fn mark_playing(&self, session: u64) -> bool {
        let from = {
            let mut state = self.state.lock();
            if state.session != session {
                return false;
            }
            let ready = match state.status {
                PlayerStatus::Loading => state
                    .active
                    .as_ref()
                    .map_or(false, |active| active.media_ready && active.play_confirmed),
                _ => true,
            };
            let from = state.status;
            if !ready || !state.transition(PlayerStatus::Playing) {
                return false;
            }
            if from == PlayerStatus::Loading {
                state.stage = Some(LoadingStage::Playing);
            }
            from
        };

        if from == PlayerStatus::Loading {
            self.tracker.clear();
            self.tracker.reset_failures();
            self.coordinator.reset();
            info!(player_id = %self.id, camera_id = ?self.camera_id, "Stream playing");
            self.emit(PlayerEvent::stage_changed(LoadingStage::Playing));
        }
        self.visibility.on_playing_started();
        self.emit(PlayerEvent::StatusChanged {
            status: PlayerStatus::Playing,
        });
        true
    }

    /// Tears down the session and hands the fault to the retry coordinator.
    fn escalate(&self, session: u64, error: StreamError) -> Option<RetryDecision> {
        let released = {
            let mut state = self.state.lock();
            if state.session != session || !state.transition(PlayerStatus::Error) {
                return None;
            }
            state.stage = Some(LoadingStage::Error);
            state.last_error = Some(error.clone());
            state.session += 1;
            state.active.take()
        };
        if let Some(active) = released {
            self.release(active);
        }
        self.unload_element();

        error!(
            player_id = %self.id,
            camera_id = ?self.camera_id,
            error_type = %error.error_type,
            stage = %error.stage,
            "Stream failed: {}",
            error.message
        );
        self.emit(PlayerEvent::StatusChanged {
            status: PlayerStatus::Error,
        });
        self.emit(PlayerEvent::stage_changed(LoadingStage::Error));

        let unsupported = error
            .details
            .as_ref()
            .and_then(|details| details.get("unsupported"))
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        let decision = if unsupported {
            self.coordinator.clear_pending_retry();
            RetryDecision::ManualRetryRequired {
                reason: ManualRetryReason::NotRecoverable {
                    error_type: error.error_type,
                },
            }
        } else {
            self.coordinator.handle_error(&error, self.reload_fn())
        };

        if let RetryDecision::AutoRetry { attempt, delay } = decision {
            self.emit(PlayerEvent::RetryScheduled {
                attempt,
                delay_ms: delay.as_millis() as u64,
            });
        }
        self.emit(PlayerEvent::Error { error, action: decision });
        Some(decision)
    }

    fn handle_timeout(&self, stage: LoadingStage) {
        let deadline_ms = self.tracker.deadline().as_millis();
        let retry_count = self.coordinator.auto_retry_count();

        let (released, error) = {
            let mut state = self.state.lock();
            if state.status != PlayerStatus::Loading || !state.transition(PlayerStatus::Timeout) {
                return;
            }
            let error = StreamError::new(
                ErrorType::Timeout,
                format!("No progress past {} within {} ms", stage, deadline_ms),
                stage,
                state.profile.tier,
            )
            .with_retry_count(retry_count);
            state.stage = Some(LoadingStage::Timeout);
            state.last_error = Some(error.clone());
            state.session += 1;
            (state.active.take(), error)
        };
        if let Some(active) = released {
            self.release(active);
        }
        self.unload_element();

        warn!(
            player_id = %self.id,
            camera_id = ?self.camera_id,
            stage = %stage,
            consecutive_failures = self.tracker.consecutive_failures(),
            "Stream timed out"
        );
        // Timeouts always wait for the viewer; the coordinator records that
        // without spending an attempt.
        self.coordinator.handle_error(&error, Box::new(|| {}));

        self.emit(PlayerEvent::StatusChanged {
            status: PlayerStatus::Timeout,
        });
        self.emit(PlayerEvent::stage_changed(LoadingStage::Timeout));
        self.emit(PlayerEvent::Timeout {
            stage,
            diagnostics: self.diagnostics(),
        });
    }

    fn on_visibility_change(&self, visibility: Visibility) {
        debug!(player_id = %self.id, visibility = ?visibility, "Visibility changed");
        self.visibility.on_visibility_change(visibility);
        self.emit(PlayerEvent::VisibilityChanged { visibility });
    }

    /// Layout-only: the decoder and the session are left untouched.
    fn on_orientation_change(&self, orientation: Orientation) {
        {
            let mut state = self.state.lock();
            if state.status == PlayerStatus::Destroyed {
                return;
            }
            state.profile.orientation = orientation;
            state.viewport.reset();
        }
        info!(player_id = %self.id, orientation = ?orientation, "Orientation changed");
        self.emit(PlayerEvent::OrientationChanged { orientation });
    }

    fn reload_fn(&self) -> RetryFn {
        let weak = self.weak.clone();
        Box::new(move || {
            if let Some(controller) = weak.upgrade() {
                tokio::spawn(async move {
                    controller.reload().await;
                });
            }
        })
    }

    async fn reload(&self) {
        let source = {
            let state = self.state.lock();
            if !state.status.is_failed() {
                return;
            }
            state.source.clone()
        };
        if let Some(source) = source {
            info!(player_id = %self.id, attempt = self.coordinator.auto_retry_count(), "Retrying stream");
            self.start_session(source).await;
        }
    }

    /// Stops a session's timers and event pump and destroys its decoder.
    fn release(&self, mut active: ActiveSession) {
        active.token.cancel();
        self.tracker.clear();
        self.buffering.reset();
        self.visibility.cancel();
        if let Some(mut decoder) = active.decoder.take() {
            decoder.destroy();
        }
    }

    fn unload_element(&self) {
        self.element.pause();
        self.element.set_src(None);
        self.element.load();
    }

    fn stream_error(&self, error_type: ErrorType, message: impl Into<String>) -> StreamError {
        let (stage, tier) = {
            let state = self.state.lock();
            (state.stage.unwrap_or(LoadingStage::Connecting), state.profile.tier)
        };
        StreamError::new(error_type, message, stage, tier).with_retry_count(self.coordinator.auto_retry_count())
    }

    fn is_current(&self, session: u64) -> bool {
        self.state.lock().session == session
    }

    fn is_destroyed(&self) -> bool {
        self.state.lock().status == PlayerStatus::Destroyed
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for StreamLifecycleController {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn validate_source(source: &str) -> Result<()> {
    let trimmed = source.trim();
    let lower = trimmed.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));

    match rest {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') => Ok(()),
        _ => Err(PlayerError::InvalidSource {
            url: trimmed.to_string(),
        }),
    }
}
