//! Level of detail selection from camera zoom.

use serde::{Deserialize, Serialize};

/// Rendering detail tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DetailTier {
    /// Zoomed far out: shrunken nodes, no labels, no overlays
    Low,
    /// Mid zoom: detail overlays, no labels
    Medium,
    /// Close up: full size, labels and overlays
    High,
}

/// Zoom thresholds separating the tiers. Each tier's lower bound is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodThresholds {
    /// Below this zoom the tier is Low
    pub low_below: f32,
    /// Below this zoom (and at or above `low_below`) the tier is Medium
    pub medium_below: f32,
    /// Width of the band a zoom must cross past a threshold before the
    /// controller leaves its current tier. Zero disables hysteresis.
    pub hysteresis: f32,
}

impl Default for LodThresholds {
    fn default() -> Self {
        Self {
            low_below: 0.3,
            medium_below: 0.7,
            hysteresis: 0.0,
        }
    }
}

impl DetailTier {
    /// Tier for a zoom level. Pure and memoryless.
    pub fn for_zoom(zoom: f32, thresholds: &LodThresholds) -> Self {
        if zoom < thresholds.low_below {
            DetailTier::Low
        } else if zoom < thresholds.medium_below {
            DetailTier::Medium
        } else {
            DetailTier::High
        }
    }

    /// Render radius for a node with the given base radius.
    pub fn node_radius(&self, base: f32) -> f32 {
        match self {
            DetailTier::Low => (base * 0.5).max(2.0),
            DetailTier::Medium => (base * 0.8).max(4.0),
            DetailTier::High => base,
        }
    }

    /// Labels are drawn only at High.
    pub fn shows_labels(&self) -> bool {
        matches!(self, DetailTier::High)
    }

    /// Secondary overlays (health ring) are drawn at Medium and High.
    pub fn shows_detail_overlays(&self) -> bool {
        !matches!(self, DetailTier::Low)
    }
}

/// Tracks the current tier across frames.
///
/// With zero hysteresis this is exactly [`DetailTier::for_zoom`].
#[derive(Debug, Clone)]
pub struct LodController {
    thresholds: LodThresholds,
    current: Option<DetailTier>,
}

impl LodController {
    pub fn new(thresholds: LodThresholds) -> Self {
        Self {
            thresholds,
            current: None,
        }
    }

    pub fn thresholds(&self) -> &LodThresholds {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: LodThresholds) {
        self.thresholds = thresholds;
        self.current = None;
    }

    /// Recompute the tier for this frame's zoom.
    pub fn update(&mut self, zoom: f32) -> DetailTier {
        let raw = DetailTier::for_zoom(zoom, &self.thresholds);
        let band = self.thresholds.hysteresis;

        let tier = match self.current {
            Some(current) if band > 0.0 && raw != current => {
                // Re-evaluate with thresholds shifted away from the current tier
                let shifted = if raw > current {
                    LodThresholds {
                        low_below: self.thresholds.low_below + band,
                        medium_below: self.thresholds.medium_below + band,
                        hysteresis: band,
                    }
                } else {
                    LodThresholds {
                        low_below: self.thresholds.low_below - band,
                        medium_below: self.thresholds.medium_below - band,
                        hysteresis: band,
                    }
                };
                let candidate = DetailTier::for_zoom(zoom, &shifted);
                if candidate == current {
                    current
                } else {
                    candidate
                }
            }
            _ => raw,
        };

        self.current = Some(tier);
        tier
    }

    /// Tier chosen by the last [`update`](Self::update).
    pub fn current(&self) -> Option<DetailTier> {
        self.current
    }
}
