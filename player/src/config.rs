use common::{DeviceTier, PlayerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::retry::{RetryPolicy, MAX_AUTO_RETRY_LIMIT};
use crate::stream_config::ConfigOverrides;

/// Player settings, loaded from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Per-tier loading deadlines
    pub timeouts: TimeoutSettings,

    /// Automatic retry policy
    pub retry: RetryPolicy,

    /// Per-tier delays before an off-screen player is paused
    pub visibility: VisibilitySettings,

    /// Buffering indicator settings
    pub buffering: BufferingSettings,

    /// Decoder configuration adjustments
    pub stream: StreamSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub low: Duration,

    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub medium: Duration,

    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub high: Duration,
}

impl TimeoutSettings {
    pub fn deadline_for(&self, tier: DeviceTier) -> Duration {
        match tier {
            DeviceTier::Low => self.low,
            DeviceTier::Medium => self.medium,
            DeviceTier::High => self.high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilitySettings {
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub low: Duration,

    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub medium: Duration,

    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub high: Duration,
}

impl VisibilitySettings {
    pub fn pause_delay_for(&self, tier: DeviceTier) -> Duration {
        match tier {
            DeviceTier::Low => self.low,
            DeviceTier::Medium => self.medium,
            DeviceTier::High => self.high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferingSettings {
    /// Continuous buffering tolerated before the stall indicator shows
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub stall_indicator_delay: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Forces a tier instead of the detected one (`low`, `medium`, `high`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier_override: Option<String>,

    pub overrides: ConfigOverrides,
}

impl StreamSettings {
    /// Tier to use given the detected one. Unrecognised names fall back to medium.
    pub fn effective_tier(&self, detected: DeviceTier) -> DeviceTier {
        match &self.tier_override {
            Some(name) => DeviceTier::parse_or_default(name),
            None => detected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (compact, pretty)
    pub format: String,

    /// Show event targets
    pub with_target: bool,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            low: Duration::from_secs(30),
            medium: Duration::from_secs(20),
            high: Duration::from_secs(15),
        }
    }
}

impl Default for VisibilitySettings {
    fn default() -> Self {
        Self {
            low: Duration::from_secs(3),
            medium: Duration::from_secs(5),
            high: Duration::from_secs(5),
        }
    }
}

impl Default for BufferingSettings {
    fn default() -> Self {
        Self {
            stall_indicator_delay: Duration::from_secs(2),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            with_target: false,
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["compact", "pretty"];

impl PlayerSettings {
    pub fn validate(&self) -> Result<(), PlayerError> {
        for tier in DeviceTier::ALL {
            if self.timeouts.deadline_for(tier).is_zero() {
                return Err(config_error(format!("Loading deadline for {} tier must be greater than 0", tier)));
            }
        }

        if self.timeouts.low < self.timeouts.medium || self.timeouts.low < self.timeouts.high {
            return Err(config_error("Low tier loading deadline cannot be shorter than medium or high"));
        }

        if self.retry.max_auto_retries > MAX_AUTO_RETRY_LIMIT {
            return Err(config_error(format!(
                "At most {} automatic retries are allowed, got {}",
                MAX_AUTO_RETRY_LIMIT, self.retry.max_auto_retries
            )));
        }

        if self.retry.backoff_base > self.retry.backoff_max {
            return Err(config_error("Retry base delay cannot exceed the maximum delay"));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(config_error("Retry jitter factor must be between 0 and 1"));
        }

        if self.visibility.low > self.visibility.medium || self.visibility.medium > self.visibility.high {
            return Err(config_error("Lower tiers cannot wait longer than higher tiers before pausing"));
        }

        if let Some(tier) = &self.stream.tier_override {
            if tier.parse::<DeviceTier>().is_err() {
                return Err(config_error(format!("Unknown tier override: {}", tier)));
            }
        }

        for factor in [
            self.stream.overrides.abr_bandwidth_factor,
            self.stream.overrides.abr_bandwidth_up_factor,
        ]
        .into_iter()
        .flatten()
        {
            if factor <= 0.0 || factor > 1.0 {
                return Err(config_error("Bandwidth factors must be in (0, 1]"));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(config_error(format!("Unknown log level: {}", self.logging.level)));
        }

        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(config_error(format!("Unknown log format: {}", self.logging.format)));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> PlayerError {
    PlayerError::Configuration {
        message: message.into(),
    }
}

/// Loads, saves and validates the settings file
pub struct ConfigManager {
    config_path: PathBuf,
    config: PlayerSettings,
}

impl ConfigManager {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            config: PlayerSettings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load settings from file, writing the defaults when it does not exist
    pub async fn load(&mut self) -> Result<(), PlayerError> {
        if !self.config_path.exists() {
            self.save().await?;
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| config_error(format!("Failed to read config file: {}", e)))?;

        self.config = toml::from_str(&content)
            .map_err(|e| config_error(format!("Failed to parse config file: {}", e)))?;

        self.validate()?;
        Ok(())
    }

    pub async fn save(&self) -> Result<(), PlayerError> {
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| config_error(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| config_error(format!("Failed to create config directory: {}", e)))?;
        }

        tokio::fs::write(&self.config_path, content)
            .await
            .map_err(|e| config_error(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn get_config(&self) -> &PlayerSettings {
        &self.config
    }

    pub fn get_config_mut(&mut self) -> &mut PlayerSettings {
        &mut self.config
    }

    pub fn update_config(&mut self, config: PlayerSettings) -> Result<(), PlayerError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PlayerError> {
        self.config.validate()
    }
}

/// Environment-based configuration override
pub struct EnvConfigOverride;

impl EnvConfigOverride {
    pub const LOG_LEVEL: &'static str = "LIVEVIEW_LOG_LEVEL";
    pub const MAX_AUTO_RETRIES: &'static str = "LIVEVIEW_MAX_AUTO_RETRIES";
    pub const RETRY_BASE_DELAY_MS: &'static str = "LIVEVIEW_RETRY_BASE_DELAY_MS";
    pub const DEVICE_TIER: &'static str = "LIVEVIEW_DEVICE_TIER";

    /// Apply `LIVEVIEW_*` environment variables to `config`
    pub fn apply_overrides(config: &mut PlayerSettings) {
        Self::apply_from(config, |key| std::env::var(key).ok());
    }

    /// Same as [`Self::apply_overrides`] with an explicit variable source.
    /// Unparsable or out-of-range values are ignored.
    pub fn apply_from<F>(config: &mut PlayerSettings, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(Self::LOG_LEVEL) {
            config.logging.level = level;
        }

        if let Some(retries) = lookup(Self::MAX_AUTO_RETRIES) {
            match retries.parse::<u32>() {
                Ok(retries) if retries <= MAX_AUTO_RETRY_LIMIT => config.retry.max_auto_retries = retries,
                Ok(retries) => warn!(retries, limit = MAX_AUTO_RETRY_LIMIT, "Ignoring out-of-range retry count"),
                Err(_) => {}
            }
        }

        if let Some(delay) = lookup(Self::RETRY_BASE_DELAY_MS) {
            if let Ok(delay) = delay.parse::<u64>() {
                config.retry.backoff_base = Duration::from_millis(delay);
            }
        }

        if let Some(tier) = lookup(Self::DEVICE_TIER) {
            config.stream.tier_override = Some(tier.to_ascii_lowercase());
        }
    }
}
