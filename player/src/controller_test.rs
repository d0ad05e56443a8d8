#[cfg(test)]
mod tests {
    use crate::config::PlayerSettings;
    use crate::controller::StreamLifecycleController;
    use crate::events::PlayerEvent;
    use crate::media::{DecoderEvent, DecoderFault, DecoderFaultKind, MediaEvent};
    use crate::preload::PreloadCache;
    use crate::retry::{ManualRetryReason, RetryDecision};
    use crate::simulated::{DecoderScript, SimulatedDecoderModule, SimulatedMediaElement, SimulatedModuleLoader};
    use crate::watchers::{Connectivity, Visibility};
    use common::{
        DeviceProfile, DeviceTier, ErrorType, LoadingStage, MobileDeviceType, Orientation, PlayerError, PlayerStatus,
        StreamError,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{broadcast, watch};
    use tokio::time::sleep;

    const SOURCE: &str = "https://relay.local/cameras/7/index.m3u8";

    struct Fixture {
        controller: Arc<StreamLifecycleController>,
        module: Arc<SimulatedDecoderModule>,
        loader: Arc<SimulatedModuleLoader>,
        element: Arc<SimulatedMediaElement>,
    }

    fn settings() -> PlayerSettings {
        let mut settings = PlayerSettings::default();
        settings.retry.jitter_factor = 0.0;
        settings
    }

    fn fixture_with(profile: DeviceProfile, loader_failures: u32) -> Fixture {
        let module = SimulatedDecoderModule::new();
        let loader = Arc::new(SimulatedModuleLoader::new(module.clone()).failing_first(loader_failures));
        let element = SimulatedMediaElement::new();
        let controller = StreamLifecycleController::builder(loader.clone(), element.clone())
            .profile(profile)
            .settings(settings())
            .preload_cache(Arc::new(PreloadCache::new()))
            .camera_id("cam-7")
            .build();

        Fixture {
            controller,
            module,
            loader,
            element,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(DeviceProfile::desktop(DeviceTier::Medium), 0)
    }

    fn network_fault_script() -> DecoderScript {
        DecoderScript::Fault {
            after: Duration::from_millis(10),
            fault: DecoderFault::fatal(DecoderFaultKind::Network, "manifestLoadError"),
        }
    }

    fn drain(events: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    fn stages(events: &[PlayerEvent]) -> Vec<LoadingStage> {
        events
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::StageChanged { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect()
    }

    fn decisions(events: &[PlayerEvent]) -> Vec<RetryDecision> {
        events
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::Error { action, .. } => Some(*action),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_walks_stages_to_playing() {
        let f = fixture();
        let mut events = f.controller.subscribe();

        f.controller.initialize(SOURCE).await.unwrap();
        assert_eq!(f.controller.get_status(), PlayerStatus::Loading);
        assert!(f.controller.is_active());

        sleep(Duration::from_secs(1)).await;

        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
        assert_eq!(f.controller.stage(), Some(LoadingStage::Playing));
        assert_eq!(
            stages(&drain(&mut events)),
            vec![
                LoadingStage::Connecting,
                LoadingStage::Loading,
                LoadingStage::Buffering,
                LoadingStage::Starting,
                LoadingStage::Playing,
            ]
        );

        let decoder = f.module.last_decoder().unwrap();
        assert_eq!(decoder.source().as_deref(), Some(SOURCE));
        assert_eq!(decoder.attach_count(), 1);
        assert_eq!(decoder.start_load_count(), 1);
        assert_eq!(f.element.play_count(), 1);
        assert_eq!(f.loader.load_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_source_is_rejected_without_state_change() {
        let f = fixture();

        let result = f.controller.initialize("rtsp://10.0.0.5/stream").await;
        assert!(matches!(result, Err(PlayerError::InvalidSource { .. })));
        assert_eq!(f.controller.get_status(), PlayerStatus::Idle);
        assert_eq!(f.controller.stage(), None);
        assert_eq!(f.module.created_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_follows_profile() {
        let f = fixture_with(DeviceProfile::mobile(DeviceTier::Low, MobileDeviceType::Phone), 0);
        f.controller.initialize(SOURCE).await.unwrap();

        let config = f.module.last_config().unwrap();
        assert_eq!(config.max_buffer_length, 10);
        assert!(!config.enable_worker);
        assert_eq!(config.start_level, 0);
        assert_eq!(&config, f.controller.config());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_without_initialize_is_idempotent() {
        let f = fixture();

        f.controller.destroy();
        f.controller.destroy();

        assert_eq!(f.controller.get_status(), PlayerStatus::Destroyed);
        assert!(!f.controller.is_active());
        assert_eq!(f.element.src_clear_count(), 1);
        assert_eq!(f.element.load_count(), 1);

        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Destroyed);
        assert_eq!(f.module.created_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_while_playing_releases_everything() {
        let f = fixture();
        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        let (_visibility_tx, visibility_rx) = watch::channel(Visibility::Visible);
        f.controller.attach_visibility(visibility_rx);

        f.controller.destroy();
        f.controller.destroy();

        let decoder = f.module.last_decoder().unwrap();
        assert_eq!(decoder.destroy_count(), 1);
        assert!(f.element.src().is_none());
        assert_eq!(f.element.load_count(), 1);
        assert!(!f.controller.pause());
        assert!(!f.controller.set_playing());

        sleep(Duration::from_secs(60)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Destroyed);
        assert_eq!(f.module.created_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_playing_requires_buffered_media() {
        let f = fixture();
        f.module.set_script(DecoderScript::Manual);
        f.controller.initialize(SOURCE).await.unwrap();

        assert!(!f.controller.set_playing());
        assert!(!f.controller.pause());
        assert_eq!(f.controller.get_status(), PlayerStatus::Loading);

        let decoder = f.module.last_decoder().unwrap();
        decoder.emit(DecoderEvent::ManifestParsed { levels: 2 });
        decoder.emit(DecoderEvent::FragmentBuffered);
        sleep(Duration::from_millis(10)).await;

        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
        assert_eq!(f.element.play_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_playing_waits_for_pending_play() {
        let f = fixture();
        f.element.hold_play();

        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        assert_eq!(f.element.play_count(), 1);
        assert_eq!(f.controller.stage(), Some(LoadingStage::Starting));
        assert!(!f.controller.set_playing());
        assert_eq!(f.controller.get_status(), PlayerStatus::Loading);

        f.element.set_reject_play(true);
        f.element.release_play();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(f.controller.get_status(), PlayerStatus::Error);
        assert!(!f.controller.set_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_play_success_reaches_playing() {
        let f = fixture();
        f.element.hold_play();

        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Loading);

        f.element.release_play();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_illegal_status_changes_are_refused() {
        let f = fixture();

        // Idle
        assert!(!f.controller.set_playing());
        assert!(!f.controller.pause());
        assert!(!f.controller.resume().await);
        assert_eq!(f.controller.get_status(), PlayerStatus::Idle);

        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;
        assert!(!f.controller.set_playing());
        assert!(!f.controller.resume().await);
        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);

        let error = StreamError::new(ErrorType::Server, "relay refused", LoadingStage::Playing, DeviceTier::Medium);
        f.controller.set_error(error);
        assert_eq!(f.controller.get_status(), PlayerStatus::Error);
        assert!(!f.controller.set_playing());
        assert!(!f.controller.pause());
        assert!(!f.controller.resume().await);
        assert_eq!(f.controller.get_status(), PlayerStatus::Error);

        f.controller.destroy();
        let error = StreamError::new(ErrorType::Network, "late", LoadingStage::Playing, DeviceTier::Medium);
        assert_eq!(f.controller.set_error(error), None);
        assert!(!f.controller.set_playing());
        assert_eq!(f.controller.get_status(), PlayerStatus::Destroyed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let f = fixture();
        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        assert!(f.controller.pause());
        assert!(!f.controller.pause());
        assert_eq!(f.controller.get_status(), PlayerStatus::Paused);
        assert!(f.element.is_paused());

        assert!(f.controller.resume().await);
        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
        assert!(!f.controller.resume().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_media_error_gets_one_recovery() {
        let f = fixture();
        f.module.set_script(DecoderScript::Manual);
        let mut events = f.controller.subscribe();
        f.controller.initialize(SOURCE).await.unwrap();

        let decoder = f.module.last_decoder().unwrap();
        decoder.emit(DecoderEvent::ManifestParsed { levels: 2 });
        decoder.emit(DecoderEvent::Error(DecoderFault::fatal(
            DecoderFaultKind::Media,
            "bufferAppendError",
        )));
        sleep(Duration::from_millis(10)).await;

        assert_eq!(decoder.recover_count(), 1);
        assert_eq!(f.controller.get_status(), PlayerStatus::Loading);

        decoder.emit(DecoderEvent::Error(DecoderFault::fatal(
            DecoderFaultKind::Media,
            "bufferAppendError",
        )));
        sleep(Duration::from_millis(10)).await;

        assert_eq!(f.controller.get_status(), PlayerStatus::Error);
        assert_eq!(decoder.recover_count(), 1);
        assert!(decoder.is_destroyed());
        assert_eq!(
            decisions(&drain(&mut events)),
            vec![RetryDecision::AutoRetry {
                attempt: 1,
                delay: Duration::from_secs(1),
            }]
        );
        let last_error = f.controller.diagnostics().last_error.unwrap();
        assert_eq!(last_error.error_type, ErrorType::Media);
        assert_eq!(last_error.stage, LoadingStage::Buffering);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_fatal_errors_are_only_logged() {
        let f = fixture();
        f.module.set_script(DecoderScript::Manual);
        f.controller.initialize(SOURCE).await.unwrap();

        let decoder = f.module.last_decoder().unwrap();
        decoder.emit(DecoderEvent::Error(DecoderFault::non_fatal(
            DecoderFaultKind::Network,
            "fragLoadTimeOut",
        )));
        sleep(Duration::from_millis(10)).await;

        assert_eq!(f.controller.get_status(), PlayerStatus::Loading);
        assert!(!decoder.is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_back_off_then_require_manual_retry() {
        let f = fixture();
        f.module.set_script(network_fault_script());
        let mut events = f.controller.subscribe();

        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(20)).await;

        assert_eq!(f.controller.get_status(), PlayerStatus::Error);
        assert_eq!(f.module.created_count(), 4);

        let seen = drain(&mut events);
        let scheduled: Vec<(u32, u64)> = seen
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::RetryScheduled { attempt, delay_ms } => Some((*attempt, *delay_ms)),
                _ => None,
            })
            .collect();
        assert_eq!(scheduled, vec![(1, 1000), (2, 2000), (3, 4000)]);
        assert_eq!(
            decisions(&seen).last(),
            Some(&RetryDecision::ManualRetryRequired {
                reason: ManualRetryReason::RetriesExhausted { attempts: 3 },
            })
        );

        for index in 0..4 {
            assert_eq!(f.module.decoder(index).unwrap().destroy_count(), 1);
        }

        // Manual retry restores the budget.
        f.module.set_script(DecoderScript::default());
        f.controller.retry().await.unwrap();
        sleep(Duration::from_secs(1)).await;

        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
        assert_eq!(f.controller.diagnostics().auto_retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_without_source() {
        let f = fixture();
        assert_eq!(f.controller.retry().await, Err(PlayerError::NoSource));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_tears_down_and_waits_for_viewer() {
        let f = fixture();
        f.module.set_script(DecoderScript::Stall);
        let mut events = f.controller.subscribe();

        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_millis(19_900)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Loading);

        sleep(Duration::from_millis(101)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Timeout);
        assert_eq!(f.controller.stage(), Some(LoadingStage::Timeout));
        assert!(f.module.last_decoder().unwrap().is_destroyed());
        assert!(f.element.src().is_none());

        let timeout = drain(&mut events).into_iter().find_map(|event| match event {
            PlayerEvent::Timeout { stage, diagnostics } => Some((stage, diagnostics)),
            _ => None,
        });
        let (stage, diagnostics) = timeout.unwrap();
        assert_eq!(stage, LoadingStage::Loading);
        assert_eq!(diagnostics.consecutive_failures, 1);
        assert_eq!(diagnostics.tier, DeviceTier::Medium);
        assert_eq!(diagnostics.status, PlayerStatus::Timeout);

        sleep(Duration::from_secs(120)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Timeout);
        assert_eq!(f.module.created_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_decoder_needs_manual_retry() {
        let f = fixture();
        f.module.set_supported(false);
        let mut events = f.controller.subscribe();

        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(30)).await;

        assert_eq!(f.controller.get_status(), PlayerStatus::Error);
        assert_eq!(f.module.created_count(), 0);
        assert_eq!(f.loader.load_count(), 1);

        let error = f.controller.diagnostics().last_error.unwrap();
        assert_eq!(error.error_type, ErrorType::Media);
        assert_eq!(error.details.unwrap()["unsupported"], true);
        assert_eq!(
            decisions(&drain(&mut events)),
            vec![RetryDecision::ManualRetryRequired {
                reason: ManualRetryReason::NotRecoverable {
                    error_type: ErrorType::Media,
                },
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_decoder_creation_failure_is_retried() {
        let f = fixture();
        f.module.set_fail_create(true);
        let mut events = f.controller.subscribe();

        f.controller.initialize(SOURCE).await.unwrap();
        assert_eq!(f.controller.get_status(), PlayerStatus::Error);
        assert_eq!(f.controller.diagnostics().last_error.unwrap().error_type, ErrorType::Unknown);
        assert!(decisions(&drain(&mut events))[0].is_auto_retry());

        f.module.set_fail_create(false);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_module_load_failure_is_retried() {
        let f = fixture_with(DeviceProfile::desktop(DeviceTier::High), 1);

        f.controller.initialize(SOURCE).await.unwrap();
        assert_eq!(f.controller.get_status(), PlayerStatus::Error);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
        assert_eq!(f.loader.load_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_play_is_a_media_error() {
        let f = fixture();
        f.element.set_reject_play(true);

        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        assert_eq!(f.controller.get_status(), PlayerStatus::Error);
        let error = f.controller.diagnostics().last_error.unwrap();
        assert_eq!(error.error_type, ErrorType::Media);
        assert_eq!(error.stage, LoadingStage::Starting);

        f.element.set_reject_play(false);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_error_goes_through_coordinator() {
        let f = fixture();
        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        let error = StreamError::new(ErrorType::Server, "relay refused", LoadingStage::Playing, DeviceTier::Medium);
        let decision = f.controller.set_error(error);

        assert_eq!(
            decision,
            Some(RetryDecision::ManualRetryRequired {
                reason: ManualRetryReason::NotRecoverable {
                    error_type: ErrorType::Server,
                },
            })
        );
        assert_eq!(f.controller.get_status(), PlayerStatus::Error);
        assert!(f.module.last_decoder().unwrap().is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinitialize_replaces_session() {
        let f = fixture();
        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        let other = "https://relay.local/cameras/8/index.m3u8";
        f.controller.initialize(other).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        assert!(f.module.decoder(0).unwrap().is_destroyed());
        let current = f.module.decoder(1).unwrap();
        assert!(!current.is_destroyed());
        assert_eq!(current.source().as_deref(), Some(other));
        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
        assert_eq!(f.controller.diagnostics().source.as_deref(), Some(other));
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_pause_and_resume() {
        let f = fixture();
        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        let (tx, rx) = watch::channel(Visibility::Visible);
        f.controller.attach_visibility(rx);

        tx.send(Visibility::Hidden).unwrap();
        sleep(Duration::from_millis(2000)).await;
        tx.send(Visibility::Visible).unwrap();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
        assert_eq!(f.element.pause_count(), 0);

        tx.send(Visibility::Hidden).unwrap();
        sleep(Duration::from_millis(5001)).await;

        assert_eq!(f.controller.get_status(), PlayerStatus::Paused);
        assert_eq!(f.element.pause_count(), 1);
        assert!(f.controller.is_paused_by_visibility());

        tx.send(Visibility::Visible).unwrap();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
        assert_eq!(f.element.play_count(), 2);
        assert!(!f.controller.is_paused_by_visibility());
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_tier_pauses_sooner() {
        let f = fixture_with(DeviceProfile::desktop(DeviceTier::Low), 0);
        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        let (tx, rx) = watch::channel(Visibility::Visible);
        f.controller.attach_visibility(rx);
        tx.send(Visibility::Hidden).unwrap();

        sleep(Duration::from_millis(3001)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orientation_change_keeps_decoder() {
        let f = fixture();
        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;
        let mut events = f.controller.subscribe();

        f.controller.set_zoom(2.0);
        f.controller.pan_by(0.2, 0.1);
        let (tx, rx) = watch::channel(Orientation::Landscape);
        f.controller.attach_orientation(rx);

        tx.send(Orientation::Portrait).unwrap();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(f.controller.profile().orientation, Orientation::Portrait);
        assert!(f.controller.viewport().is_identity());
        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
        assert_eq!(f.module.created_count(), 1);
        assert_eq!(f.module.last_decoder().unwrap().destroy_count(), 0);
        assert!(drain(&mut events).contains(&PlayerEvent::OrientationChanged {
            orientation: Orientation::Portrait,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_restoration_retries_immediately() {
        let f = fixture();
        f.module.set_script(network_fault_script());
        let (tx, rx) = watch::channel(Connectivity::Online);
        f.controller.attach_connectivity(rx);

        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Error);

        tx.send(Connectivity::Offline).unwrap();
        sleep(Duration::from_millis(50)).await;
        f.module.set_script(DecoderScript::default());
        tx.send(Connectivity::Online).unwrap();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(f.module.created_count(), 2);
        assert_eq!(f.controller.diagnostics().auto_retry_count, 2);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(f.controller.get_status(), PlayerStatus::Playing);
        assert_eq!(f.module.created_count(), 2);
        assert_eq!(f.controller.diagnostics().auto_retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_restoration_ignored_while_healthy() {
        let f = fixture();
        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        assert!(!f.controller.on_network_restored());
        assert_eq!(f.module.created_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffering_indicator_grace_period() {
        let f = fixture();
        f.controller.initialize(SOURCE).await.unwrap();
        sleep(Duration::from_secs(1)).await;
        let mut events = f.controller.subscribe();
        let decoder = f.module.last_decoder().unwrap();

        decoder.emit(DecoderEvent::BufferEmpty);
        sleep(Duration::from_millis(1500)).await;
        f.element.emit(MediaEvent::Playing);
        sleep(Duration::from_secs(3)).await;
        assert!(!drain(&mut events).contains(&PlayerEvent::BufferingStalled));

        f.element.emit(MediaEvent::Waiting);
        sleep(Duration::from_millis(2001)).await;
        f.element.emit(MediaEvent::Playing);
        sleep(Duration::from_millis(10)).await;

        let seen = drain(&mut events);
        assert!(seen.contains(&PlayerEvent::BufferingStalled));
        assert!(seen.contains(&PlayerEvent::BufferingRecovered));
    }
}
