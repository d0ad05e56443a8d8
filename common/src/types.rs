use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Device capability classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTier {
    Low,
    #[default]
    Medium,
    High,
}

impl DeviceTier {
    pub const ALL: [DeviceTier; 3] = [DeviceTier::Low, DeviceTier::Medium, DeviceTier::High];

    /// Parses a tier name; anything unrecognised is treated as `Medium`.
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => DeviceTier::Low,
            "high" => DeviceTier::High,
            _ => DeviceTier::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceTier::Low => "low",
            DeviceTier::Medium => "medium",
            DeviceTier::High => "high",
        }
    }
}

impl fmt::Display for DeviceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceTier {
    type Err = String;

    /// Strict parse, for validating configuration input.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(DeviceTier::Low),
            "medium" => Ok(DeviceTier::Medium),
            "high" => Ok(DeviceTier::High),
            other => Err(format!("unknown device tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MobileDeviceType {
    Phone,
    Tablet,
    #[default]
    Desktop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    #[default]
    Landscape,
}

/// Result of the one-shot capability detection.
///
/// Only `orientation` changes after detection; it is updated in place when the
/// viewport rotates and never causes the stream to be reloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub tier: DeviceTier,
    pub is_mobile: bool,
    pub mobile_device_type: MobileDeviceType,
    pub has_touch: bool,
    pub orientation: Orientation,
}

impl DeviceProfile {
    pub fn desktop(tier: DeviceTier) -> Self {
        Self {
            tier,
            is_mobile: false,
            mobile_device_type: MobileDeviceType::Desktop,
            has_touch: false,
            orientation: Orientation::Landscape,
        }
    }

    pub fn mobile(tier: DeviceTier, mobile_device_type: MobileDeviceType) -> Self {
        Self {
            tier,
            is_mobile: mobile_device_type != MobileDeviceType::Desktop,
            mobile_device_type,
            has_touch: true,
            orientation: Orientation::Portrait,
        }
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::desktop(DeviceTier::Medium)
    }
}

/// Progress marker within one load attempt.
///
/// The first five variants form an ordered sequence. `Error` and `Timeout`
/// are absorbing: the only way out is an explicit retry back to `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadingStage {
    Connecting,
    Loading,
    Buffering,
    Starting,
    Playing,
    Error,
    Timeout,
}

impl LoadingStage {
    pub const SEQUENCE: [LoadingStage; 5] = [
        LoadingStage::Connecting,
        LoadingStage::Loading,
        LoadingStage::Buffering,
        LoadingStage::Starting,
        LoadingStage::Playing,
    ];

    /// Position in the forward sequence, `None` for the absorbing stages.
    pub fn ordinal(&self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|stage| stage == self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadingStage::Error | LoadingStage::Timeout)
    }

    pub fn can_transition_to(&self, next: LoadingStage) -> bool {
        if self.is_terminal() {
            return next == LoadingStage::Connecting;
        }
        if next.is_terminal() {
            return true;
        }
        match (self.ordinal(), next.ordinal()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }

    /// Progress message shown to the viewer while the stream starts.
    pub fn message(&self) -> &'static str {
        match self {
            LoadingStage::Connecting => "Connecting to camera...",
            LoadingStage::Loading => "Loading stream...",
            LoadingStage::Buffering => "Buffering video...",
            LoadingStage::Starting => "Starting playback...",
            LoadingStage::Playing => "Live",
            LoadingStage::Error => "Stream error",
            LoadingStage::Timeout => "Stream timed out",
        }
    }
}

impl fmt::Display for LoadingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadingStage::Connecting => "CONNECTING",
            LoadingStage::Loading => "LOADING",
            LoadingStage::Buffering => "BUFFERING",
            LoadingStage::Starting => "STARTING",
            LoadingStage::Playing => "PLAYING",
            LoadingStage::Error => "ERROR",
            LoadingStage::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

/// Coarse, user-facing player state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    /// Created but never initialized
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Error,
    Timeout,
    /// Terminal; every later call is a no-op
    Destroyed,
}

impl PlayerStatus {
    pub fn can_transition_to(&self, next: PlayerStatus) -> bool {
        use PlayerStatus::*;

        match (*self, next) {
            (Destroyed, _) => false,
            (_, Destroyed) => true,
            (_, Error) | (_, Timeout) => true,
            // Fresh load: first initialize, re-initialize or retry.
            (_, Loading) => true,
            (Loading, Playing) => true,
            (Playing, Paused) | (Paused, Playing) => true,
            _ => false,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PlayerStatus::Error | PlayerStatus::Timeout)
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerStatus::Idle => "idle",
            PlayerStatus::Loading => "loading",
            PlayerStatus::Playing => "playing",
            PlayerStatus::Paused => "paused",
            PlayerStatus::Error => "error",
            PlayerStatus::Timeout => "timeout",
            PlayerStatus::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Network,
    Media,
    Server,
    Timeout,
    Unknown,
}

impl ErrorType {
    /// Faults the retry coordinator may recover from without user action.
    pub fn is_auto_recoverable(&self) -> bool {
        matches!(self, ErrorType::Network | ErrorType::Media | ErrorType::Unknown)
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorType::Network => "network",
            ErrorType::Media => "media",
            ErrorType::Server => "server",
            ErrorType::Timeout => "timeout",
            ErrorType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A playback fault, as reported to the retry coordinator and to the UI.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{error_type} error during {stage}: {message}")]
pub struct StreamError {
    pub error_type: ErrorType,
    pub message: String,
    pub stage: LoadingStage,
    pub device_tier: DeviceTier,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl StreamError {
    pub fn new(
        error_type: ErrorType,
        message: impl Into<String>,
        stage: LoadingStage,
        device_tier: DeviceTier,
    ) -> Self {
        Self {
            error_type,
            message: message.into(),
            stage,
            device_tier,
            retry_count: 0,
            timestamp: Utc::now(),
            details: None,
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
