//! Pan/zoom camera for the 2D network map.
//!
//! World points map to the screen as `screen = world * zoom + offset`.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::geometry::{Rect, Viewport};

/// Zoom factor applied per wheel notch.
pub const WHEEL_ZOOM_STEP: f32 = 1.1;

/// Allowed zoom range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomLimits {
    pub min: f32,
    pub max: f32,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self { min: 0.1, max: 5.0 }
    }
}

impl ZoomLimits {
    /// Finite, positive and ordered.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min > 0.0 && self.min <= self.max
    }
}

/// Camera state. Zoom is clamped to the limits after every mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Screen-space offset of the world origin
    pub x: f32,
    pub y: f32,
    zoom: f32,
    limits: ZoomLimits,
}

impl Camera {
    /// Invalid limits fall back to the defaults.
    pub fn new(limits: ZoomLimits) -> Self {
        let limits = if limits.is_valid() {
            limits
        } else {
            ZoomLimits::default()
        };
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0f32.clamp(limits.min, limits.max),
            limits,
        }
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    /// Replace the limits and re-clamp. Invalid limits are ignored.
    pub fn set_limits(&mut self, limits: ZoomLimits) {
        if !limits.is_valid() {
            return;
        }
        self.limits = limits;
        self.zoom = self.zoom.clamp(limits.min, limits.max);
    }

    pub fn offset(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Set zoom directly, clamped. Non-finite values are ignored.
    pub fn set_zoom(&mut self, zoom: f32) {
        if !zoom.is_finite() {
            return;
        }
        self.zoom = zoom.clamp(self.limits.min, self.limits.max);
    }

    /// Move by a screen-space delta. Non-finite deltas are ignored.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        if !(dx.is_finite() && dy.is_finite()) {
            return;
        }
        self.x += dx;
        self.y += dy;
    }

    /// Zoom by `factor` keeping the world point under `pointer` fixed.
    ///
    /// The offset moves by the factor actually applied after clamping, so a
    /// clamped zoom does not drift the view.
    pub fn zoom_at(&mut self, pointer: Vec2, factor: f32) {
        if !(factor.is_finite() && factor > 0.0 && pointer.is_finite()) {
            return;
        }
        let old = self.zoom;
        self.set_zoom(old * factor);
        let applied = self.zoom / old;
        self.x = pointer.x - (pointer.x - self.x) * applied;
        self.y = pointer.y - (pointer.y - self.y) * applied;
    }

    /// Apply a wheel delta: negative scrolls zoom in, positive zoom out.
    pub fn wheel(&mut self, delta: f32, pointer: Vec2) {
        if delta == 0.0 || !delta.is_finite() {
            return;
        }
        let factor = if delta < 0.0 {
            WHEEL_ZOOM_STEP
        } else {
            1.0 / WHEEL_ZOOM_STEP
        };
        self.zoom_at(pointer, factor);
    }

    /// Visible world rectangle for a surface of `size` pixels.
    pub fn viewport(&self, size: Vec2) -> Viewport {
        let min = self.screen_to_world(Vec2::ZERO);
        let max = self.screen_to_world(size);
        Rect::new(min.x, max.x, min.y, max.y)
    }

    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        (screen - self.offset()) / self.zoom
    }

    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        world * self.zoom + self.offset()
    }

    /// Place `world` at the center of a surface of `size` pixels.
    pub fn center_on(&mut self, world: Vec2, size: Vec2) {
        let offset = size * 0.5 - world * self.zoom;
        self.x = offset.x;
        self.y = offset.y;
    }

    /// Back to the origin at zoom 1 (clamped).
    pub fn reset(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
        self.set_zoom(1.0);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(ZoomLimits::default())
    }
}
