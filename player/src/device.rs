//! One-shot device capability classification.

use common::{DeviceProfile, DeviceTier, MobileDeviceType, Orientation};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Shorter screen side (CSS px) from which a touch device counts as a tablet.
const TABLET_MIN_SHORT_SIDE: u32 = 600;

/// UA fragments of platforms that struggle with segmented live video.
const LOW_END_UA_MARKERS: &[&str] = &[
    "android 4.",
    "android 5.",
    "android 6.",
    "windows phone",
    "kaios",
    "opera mini",
    "iphone os 9_",
    "iphone os 10_",
];

/// Raw capability signals reported by the host environment.
///
/// Every field is optional; a missing signal never lowers the tier on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSignals {
    pub hardware_concurrency: Option<u32>,
    pub device_memory_gb: Option<f64>,
    /// Network Information API hint: `slow-2g`, `2g`, `3g` or `4g`
    pub effective_connection_type: Option<String>,
    pub save_data: bool,
    pub user_agent: Option<String>,
    pub max_touch_points: Option<u32>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
}

impl DeviceSignals {
    /// Signals observable from the current process.
    pub fn from_host() -> Self {
        let hardware_concurrency = std::thread::available_parallelism()
            .ok()
            .map(|n| n.get() as u32);

        Self {
            hardware_concurrency,
            ..Default::default()
        }
    }
}

pub struct DeviceProfiler;

impl DeviceProfiler {
    /// Classifies the device. Pure and infallible; unknown signals fall back
    /// to conservative defaults.
    pub fn detect(signals: &DeviceSignals) -> DeviceProfile {
        let user_agent = signals.user_agent.as_deref().map(str::to_ascii_lowercase);
        let mobile_device_type = Self::classify_form_factor(signals, user_agent.as_deref());
        let is_mobile = mobile_device_type != MobileDeviceType::Desktop;

        let mut tier = Self::classify_tier(signals, user_agent.as_deref());
        if mobile_device_type == MobileDeviceType::Phone && tier == DeviceTier::High {
            tier = DeviceTier::Medium;
        }

        let has_touch = is_mobile || signals.max_touch_points.unwrap_or(0) > 0;
        let orientation = Self::orientation_of(signals, mobile_device_type);

        let profile = DeviceProfile {
            tier,
            is_mobile,
            mobile_device_type,
            has_touch,
            orientation,
        };
        debug!(
            tier = %profile.tier,
            mobile = ?profile.mobile_device_type,
            cores = ?signals.hardware_concurrency,
            memory_gb = ?signals.device_memory_gb,
            "Device profile detected"
        );
        profile
    }

    fn classify_tier(signals: &DeviceSignals, user_agent: Option<&str>) -> DeviceTier {
        let connection = signals
            .effective_connection_type
            .as_deref()
            .map(str::to_ascii_lowercase);

        if signals.save_data || matches!(connection.as_deref(), Some("slow-2g") | Some("2g")) {
            return DeviceTier::Low;
        }

        let mut low_votes = 0u32;
        let mut high_votes = 0u32;

        match signals.hardware_concurrency {
            Some(cores) if cores <= 2 => low_votes += 1,
            Some(cores) if cores >= 8 => high_votes += 1,
            _ => {}
        }

        match signals.device_memory_gb {
            Some(memory) if memory <= 2.0 => low_votes += 1,
            Some(memory) if memory >= 8.0 => high_votes += 1,
            _ => {}
        }

        if connection.as_deref() == Some("3g") {
            low_votes += 1;
        }

        if let Some(ua) = user_agent {
            if LOW_END_UA_MARKERS.iter().any(|marker| ua.contains(marker)) {
                low_votes += 2;
            }
        }

        if low_votes > high_votes {
            DeviceTier::Low
        } else if high_votes > 0 && low_votes == 0 {
            DeviceTier::High
        } else {
            DeviceTier::Medium
        }
    }

    fn classify_form_factor(signals: &DeviceSignals, user_agent: Option<&str>) -> MobileDeviceType {
        let touch_points = signals.max_touch_points.unwrap_or(0);

        match user_agent {
            Some(ua) => {
                if ua.contains("ipad") || ua.contains("tablet") || (ua.contains("android") && !ua.contains("mobile")) {
                    MobileDeviceType::Tablet
                } else if ua.contains("iphone")
                    || ua.contains("ipod")
                    || ua.contains("windows phone")
                    || ua.contains("mobi")
                {
                    MobileDeviceType::Phone
                } else if ua.contains("macintosh") && touch_points > 1 {
                    // iPadOS requests the desktop site by default.
                    MobileDeviceType::Tablet
                } else {
                    MobileDeviceType::Desktop
                }
            }
            None if touch_points > 0 => match Self::short_side(signals) {
                Some(side) if side >= TABLET_MIN_SHORT_SIDE => MobileDeviceType::Tablet,
                Some(_) => MobileDeviceType::Phone,
                None => MobileDeviceType::Desktop,
            },
            None => MobileDeviceType::Desktop,
        }
    }

    fn short_side(signals: &DeviceSignals) -> Option<u32> {
        match (signals.screen_width, signals.screen_height) {
            (Some(width), Some(height)) => Some(width.min(height)),
            _ => None,
        }
    }

    fn orientation_of(signals: &DeviceSignals, mobile_device_type: MobileDeviceType) -> Orientation {
        match (signals.screen_width, signals.screen_height) {
            (Some(width), Some(height)) if height > width => Orientation::Portrait,
            (Some(_), Some(_)) => Orientation::Landscape,
            _ if mobile_device_type == MobileDeviceType::Phone => Orientation::Portrait,
            _ => Orientation::Landscape,
        }
    }
}
