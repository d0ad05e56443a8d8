//! Notifications published to the UI layer.

use common::{DeviceTier, LoadingStage, MobileDeviceType, Orientation, PlayerStatus, StreamError};
use serde::Serialize;
use uuid::Uuid;

use crate::retry::RetryDecision;
use crate::watchers::Visibility;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    StatusChanged {
        status: PlayerStatus,
    },
    StageChanged {
        stage: LoadingStage,
        message: &'static str,
    },
    Error {
        error: StreamError,
        action: RetryDecision,
    },
    Timeout {
        stage: LoadingStage,
        diagnostics: PlayerDiagnostics,
    },
    TroubleshootingSuggested {
        consecutive_failures: u32,
    },
    RetryScheduled {
        attempt: u32,
        delay_ms: u64,
    },
    NetworkRestored {
        retried: bool,
    },
    BufferingStalled,
    BufferingRecovered,
    VisibilityChanged {
        visibility: Visibility,
    },
    OrientationChanged {
        orientation: Orientation,
    },
}

impl PlayerEvent {
    pub fn stage_changed(stage: LoadingStage) -> Self {
        PlayerEvent::StageChanged {
            stage,
            message: stage.message(),
        }
    }
}

/// Snapshot shown next to the timeout and error affordances.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerDiagnostics {
    pub player_id: Uuid,
    pub camera_id: Option<String>,
    pub status: PlayerStatus,
    pub stage: Option<LoadingStage>,
    pub tier: DeviceTier,
    pub mobile_device_type: MobileDeviceType,
    pub consecutive_failures: u32,
    pub auto_retry_count: u32,
    pub remaining_auto_retries: u32,
    pub suggest_troubleshooting: bool,
    pub last_error: Option<StreamError>,
    pub source: Option<String>,
}
