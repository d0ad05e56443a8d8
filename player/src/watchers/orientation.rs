use common::Orientation;
use serde::{Deserialize, Serialize};

use super::SignalWatcher;

pub type OrientationWatcher = SignalWatcher<Orientation>;

pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 4.0;

/// Pinch-zoom and pan state of the video surface.
///
/// Pan offsets are fractions of the surface size and are kept within the
/// area the current zoom makes reachable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub zoom: f64,
    pub pan_x: f64,
    pub pan_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: MIN_ZOOM,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

impl Viewport {
    pub fn is_identity(&self) -> bool {
        *self == Viewport::default()
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.clamp_pan();
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
        self.clamp_pan();
    }

    pub fn reset(&mut self) {
        *self = Viewport::default();
    }

    fn clamp_pan(&mut self) {
        let limit = (self.zoom - 1.0) / 2.0;
        self.pan_x = self.pan_x.clamp(-limit, limit);
        self.pan_y = self.pan_y.clamp(-limit, limit);
    }
}
