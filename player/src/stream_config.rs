//! Buffering, ABR and loader parameters handed to the decoder.
//!
//! Selection is a pure function of the device profile: desktop presets per
//! tier, clamped down for tablets and phones, with explicit overrides applied
//! last. Field names follow the decoder library's configuration vocabulary.

use common::{DeviceProfile, DeviceTier, MobileDeviceType};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Demux in a worker thread
    pub enable_worker: bool,
    pub low_latency_mode: bool,
    /// Target forward buffer in seconds
    pub max_buffer_length: u32,
    /// Hard ceiling for the forward buffer in seconds
    pub max_max_buffer_length: u32,
    /// Played media kept behind the playhead, in seconds
    pub back_buffer_length: u32,
    /// Forward buffer ceiling in bytes
    pub max_buffer_size: u64,
    /// Initial quality level, -1 lets ABR decide
    pub start_level: i32,
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub manifest_loading_timeout: Duration,
    pub manifest_loading_max_retry: u32,
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub level_loading_timeout: Duration,
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub frag_loading_timeout: Duration,
    pub frag_loading_max_retry: u32,
    /// Share of the measured bandwidth ABR may use when staying on a level
    pub abr_bandwidth_factor: f64,
    /// Share of the measured bandwidth ABR may use when switching up
    pub abr_bandwidth_up_factor: f64,
    /// Bandwidth estimate before the first measurement, bits per second
    pub abr_ewma_default_estimate: u64,
}

impl StreamConfig {
    /// Desktop preset for a tier
    pub fn for_tier(tier: DeviceTier) -> Self {
        match tier {
            DeviceTier::Low => Self {
                enable_worker: false,
                low_latency_mode: false,
                max_buffer_length: 15,
                max_max_buffer_length: 30,
                back_buffer_length: 10,
                max_buffer_size: 30 * MB,
                start_level: 0,
                manifest_loading_timeout: Duration::from_secs(10),
                manifest_loading_max_retry: 2,
                level_loading_timeout: Duration::from_secs(10),
                frag_loading_timeout: Duration::from_secs(20),
                frag_loading_max_retry: 3,
                abr_bandwidth_factor: 0.8,
                abr_bandwidth_up_factor: 0.6,
                abr_ewma_default_estimate: 500_000,
            },
            DeviceTier::Medium => Self {
                enable_worker: true,
                low_latency_mode: true,
                max_buffer_length: 30,
                max_max_buffer_length: 60,
                back_buffer_length: 30,
                max_buffer_size: 60 * MB,
                start_level: -1,
                manifest_loading_timeout: Duration::from_secs(15),
                manifest_loading_max_retry: 3,
                level_loading_timeout: Duration::from_secs(15),
                frag_loading_timeout: Duration::from_secs(30),
                frag_loading_max_retry: 4,
                abr_bandwidth_factor: 0.9,
                abr_bandwidth_up_factor: 0.7,
                abr_ewma_default_estimate: 1_000_000,
            },
            DeviceTier::High => Self {
                enable_worker: true,
                low_latency_mode: true,
                max_buffer_length: 60,
                max_max_buffer_length: 120,
                back_buffer_length: 60,
                max_buffer_size: 120 * MB,
                start_level: -1,
                manifest_loading_timeout: Duration::from_secs(20),
                manifest_loading_max_retry: 4,
                level_loading_timeout: Duration::from_secs(20),
                frag_loading_timeout: Duration::from_secs(40),
                frag_loading_max_retry: 6,
                abr_bandwidth_factor: 0.95,
                abr_bandwidth_up_factor: 0.8,
                abr_ewma_default_estimate: 3_000_000,
            },
        }
    }
}

/// Explicit per-field overrides, applied after every other rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub enable_worker: Option<bool>,
    pub low_latency_mode: Option<bool>,
    pub max_buffer_length: Option<u32>,
    pub max_max_buffer_length: Option<u32>,
    pub back_buffer_length: Option<u32>,
    pub max_buffer_size: Option<u64>,
    pub start_level: Option<i32>,
    #[serde(with = "crate::serde_helpers::option_duration", skip_serializing_if = "Option::is_none")]
    pub manifest_loading_timeout: Option<Duration>,
    pub manifest_loading_max_retry: Option<u32>,
    #[serde(with = "crate::serde_helpers::option_duration", skip_serializing_if = "Option::is_none")]
    pub level_loading_timeout: Option<Duration>,
    #[serde(with = "crate::serde_helpers::option_duration", skip_serializing_if = "Option::is_none")]
    pub frag_loading_timeout: Option<Duration>,
    pub frag_loading_max_retry: Option<u32>,
    pub abr_bandwidth_factor: Option<f64>,
    pub abr_bandwidth_up_factor: Option<f64>,
    pub abr_ewma_default_estimate: Option<u64>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        *self == ConfigOverrides::default()
    }

    pub fn apply(&self, config: &mut StreamConfig) {
        fn set<T: Copy>(target: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *target = value;
            }
        }

        set(&mut config.enable_worker, self.enable_worker);
        set(&mut config.low_latency_mode, self.low_latency_mode);
        set(&mut config.max_buffer_length, self.max_buffer_length);
        set(&mut config.max_max_buffer_length, self.max_max_buffer_length);
        set(&mut config.back_buffer_length, self.back_buffer_length);
        set(&mut config.max_buffer_size, self.max_buffer_size);
        set(&mut config.start_level, self.start_level);
        set(&mut config.manifest_loading_timeout, self.manifest_loading_timeout);
        set(&mut config.manifest_loading_max_retry, self.manifest_loading_max_retry);
        set(&mut config.level_loading_timeout, self.level_loading_timeout);
        set(&mut config.frag_loading_timeout, self.frag_loading_timeout);
        set(&mut config.frag_loading_max_retry, self.frag_loading_max_retry);
        set(&mut config.abr_bandwidth_factor, self.abr_bandwidth_factor);
        set(&mut config.abr_bandwidth_up_factor, self.abr_bandwidth_up_factor);
        set(&mut config.abr_ewma_default_estimate, self.abr_ewma_default_estimate);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectOptions {
    pub is_mobile: bool,
    pub mobile_device_type: MobileDeviceType,
    pub overrides: ConfigOverrides,
}

impl SelectOptions {
    pub fn from_profile(profile: &DeviceProfile) -> Self {
        Self {
            is_mobile: profile.is_mobile,
            mobile_device_type: profile.mobile_device_type,
            overrides: ConfigOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Ceilings for handheld form factors. Applied with `min` so a mobile value
/// can never exceed the desktop preset of the same tier.
struct MobileCaps {
    max_buffer_length: u32,
    max_max_buffer_length: u32,
    back_buffer_length: u32,
    max_buffer_size: u64,
    start_level: Option<i32>,
    abr_bandwidth_factor: f64,
    abr_bandwidth_up_factor: f64,
}

fn mobile_caps(tier: DeviceTier, device_type: MobileDeviceType) -> Option<MobileCaps> {
    let caps = match (device_type, tier) {
        (MobileDeviceType::Desktop, _) => return None,
        (MobileDeviceType::Tablet, DeviceTier::Low) => MobileCaps {
            max_buffer_length: 12,
            max_max_buffer_length: 24,
            back_buffer_length: 8,
            max_buffer_size: 20 * MB,
            start_level: Some(0),
            abr_bandwidth_factor: 0.7,
            abr_bandwidth_up_factor: 0.5,
        },
        (MobileDeviceType::Tablet, DeviceTier::Medium) => MobileCaps {
            max_buffer_length: 20,
            max_max_buffer_length: 40,
            back_buffer_length: 15,
            max_buffer_size: 40 * MB,
            start_level: None,
            abr_bandwidth_factor: 0.8,
            abr_bandwidth_up_factor: 0.6,
        },
        (MobileDeviceType::Tablet, DeviceTier::High) => MobileCaps {
            max_buffer_length: 40,
            max_max_buffer_length: 80,
            back_buffer_length: 30,
            max_buffer_size: 80 * MB,
            start_level: None,
            abr_bandwidth_factor: 0.9,
            abr_bandwidth_up_factor: 0.7,
        },
        (MobileDeviceType::Phone, DeviceTier::Low) => MobileCaps {
            max_buffer_length: 10,
            max_max_buffer_length: 20,
            back_buffer_length: 5,
            max_buffer_size: 15 * MB,
            start_level: Some(0),
            abr_bandwidth_factor: 0.6,
            abr_bandwidth_up_factor: 0.4,
        },
        (MobileDeviceType::Phone, DeviceTier::Medium) => MobileCaps {
            max_buffer_length: 15,
            max_max_buffer_length: 30,
            back_buffer_length: 10,
            max_buffer_size: 30 * MB,
            start_level: Some(0),
            abr_bandwidth_factor: 0.7,
            abr_bandwidth_up_factor: 0.5,
        },
        (MobileDeviceType::Phone, DeviceTier::High) => MobileCaps {
            max_buffer_length: 30,
            max_max_buffer_length: 60,
            back_buffer_length: 20,
            max_buffer_size: 60 * MB,
            start_level: Some(0),
            abr_bandwidth_factor: 0.8,
            abr_bandwidth_up_factor: 0.6,
        },
    };
    Some(caps)
}

impl MobileCaps {
    fn apply(&self, config: &mut StreamConfig) {
        config.max_buffer_length = config.max_buffer_length.min(self.max_buffer_length);
        config.max_max_buffer_length = config.max_max_buffer_length.min(self.max_max_buffer_length);
        config.back_buffer_length = config.back_buffer_length.min(self.back_buffer_length);
        config.max_buffer_size = config.max_buffer_size.min(self.max_buffer_size);
        config.abr_bandwidth_factor = config.abr_bandwidth_factor.min(self.abr_bandwidth_factor);
        config.abr_bandwidth_up_factor = config.abr_bandwidth_up_factor.min(self.abr_bandwidth_up_factor);
        if let Some(level) = self.start_level {
            config.start_level = level;
        }
    }
}

/// Derives the decoder configuration for a device.
pub fn select_config(tier: DeviceTier, options: &SelectOptions) -> StreamConfig {
    let mut config = StreamConfig::for_tier(tier);

    if options.is_mobile {
        // A mobile device with no form factor is treated as the more
        // constrained one.
        let device_type = match options.mobile_device_type {
            MobileDeviceType::Desktop => MobileDeviceType::Phone,
            other => other,
        };
        if let Some(caps) = mobile_caps(tier, device_type) {
            caps.apply(&mut config);
        }
    }

    options.overrides.apply(&mut config);
    config
}

/// Same as [`select_config`] for a tier name coming from configuration or
/// the host page; unrecognised names select the medium preset.
pub fn select_config_by_name(tier: &str, options: &SelectOptions) -> StreamConfig {
    select_config(DeviceTier::parse_or_default(tier), options)
}

pub fn select_config_for_profile(profile: &DeviceProfile, overrides: &ConfigOverrides) -> StreamConfig {
    let options = SelectOptions::from_profile(profile).with_overrides(overrides.clone());
    select_config(profile.tier, &options)
}
