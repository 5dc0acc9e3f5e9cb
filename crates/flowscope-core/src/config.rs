//! Engine configuration.
//!
//! Every field has a default. A config can be built in code, parsed from
//! TOML, or swapped at runtime with [`Engine::apply_config`], which only
//! commits a config that validates.
//!
//! [`Engine::apply_config`]: crate::Engine::apply_config

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::camera::ZoomLimits;
use crate::culling::CullingLimits;
use crate::error::{Error, Result};
use crate::lod::LodThresholds;
use crate::particles::ParticleConfig;
use crate::perf::PerformanceBudget;

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nodes tracked by the spatial index
    pub max_nodes: usize,
    /// Edges drawn per frame in normal mode
    pub max_edges: usize,
    /// Edges drawn per frame in performance mode
    pub degraded_max_edges: usize,
    /// Nodes drawn per frame
    pub viewport_nodes: usize,
    /// World units added around the viewport when culling
    pub viewport_padding: f32,
    pub lod: LodThresholds,
    /// Frames per second cap; 0 disables the cap
    pub frame_rate_limit: u32,
    pub frame_budget_ms: f32,
    pub degrade_threshold_ms: f32,
    /// Bytes
    pub memory_warning_threshold: u64,
    pub zoom_limits: ZoomLimits,
    /// Node radius in pixels at High detail
    pub base_node_radius: f32,
    pub particles: ParticleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_nodes: 1000,
            max_edges: 2000,
            degraded_max_edges: 500,
            viewport_nodes: 200,
            viewport_padding: 50.0,
            lod: LodThresholds::default(),
            frame_rate_limit: 60,
            frame_budget_ms: 16.67,
            degrade_threshold_ms: 33.33,
            memory_warning_threshold: 512 * 1024 * 1024,
            zoom_limits: ZoomLimits::default(),
            base_node_radius: 8.0,
            particles: ParticleConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Check ranges and orderings. Every float must be finite.
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: impl Into<String>) -> Result<()> {
            Err(Error::InvalidConfig(msg.into()))
        }

        let p = &self.particles;
        let floats = [
            ("viewport_padding", self.viewport_padding),
            ("lod.low_below", self.lod.low_below),
            ("lod.medium_below", self.lod.medium_below),
            ("lod.hysteresis", self.lod.hysteresis),
            ("frame_budget_ms", self.frame_budget_ms),
            ("degrade_threshold_ms", self.degrade_threshold_ms),
            ("zoom_limits.min", self.zoom_limits.min),
            ("zoom_limits.max", self.zoom_limits.max),
            ("base_node_radius", self.base_node_radius),
            ("particles.particle_size", p.particle_size),
            ("particles.particle_lifetime", p.particle_lifetime),
            ("particles.emission_rate", p.emission_rate),
            ("particles.flow_stagger", p.flow_stagger),
            ("particles.gravity.x", p.gravity.x),
            ("particles.gravity.y", p.gravity.y),
            ("particles.velocity_range.min", p.velocity_range.min),
            ("particles.velocity_range.max", p.velocity_range.max),
            ("particles.spin", p.spin),
        ];
        if let Some((name, value)) = floats.iter().find(|(_, v)| !v.is_finite()) {
            return invalid(format!("{name} must be finite, got {value}"));
        }

        if self.max_nodes == 0 || self.viewport_nodes == 0 {
            return invalid("max_nodes and viewport_nodes must be positive");
        }
        if self.degraded_max_edges > self.max_edges {
            return invalid("degraded_max_edges must not exceed max_edges");
        }
        if self.viewport_padding < 0.0 {
            return invalid("viewport_padding must be non-negative");
        }
        let z = self.zoom_limits;
        if !(z.min > 0.0 && z.min <= z.max) {
            return invalid(format!("zoom limits {}..{} are not a valid range", z.min, z.max));
        }
        let lod = self.lod;
        if lod.low_below > lod.medium_below || lod.hysteresis < 0.0 {
            return invalid("lod thresholds must be ordered and hysteresis non-negative");
        }
        if !(self.frame_budget_ms > 0.0 && self.degrade_threshold_ms >= self.frame_budget_ms) {
            return invalid("degrade threshold must be at least the frame budget");
        }
        if self.base_node_radius <= 0.0 {
            return invalid("base_node_radius must be positive");
        }

        if p.max_particles == 0 {
            return invalid("particles.max_particles must be positive");
        }
        if p.particle_lifetime <= 0.0 || p.particle_size < 0.0 {
            return invalid("particles.particle_lifetime must be positive and particle_size non-negative");
        }
        if !(p.velocity_range.min >= 0.0 && p.velocity_range.min <= p.velocity_range.max) {
            return invalid("particles.velocity_range must be an ordered non-negative range");
        }
        if p.spin < 0.0 || p.emission_rate < 0.0 || p.flow_stagger < 0.0 {
            return invalid("particles.spin, emission_rate and flow_stagger must be non-negative");
        }
        Ok(())
    }

    pub fn culling_limits(&self) -> CullingLimits {
        CullingLimits {
            max_nodes: self.max_nodes,
            viewport_nodes: self.viewport_nodes,
            padding: self.viewport_padding,
        }
    }

    pub fn performance_budget(&self) -> PerformanceBudget {
        PerformanceBudget {
            frame_budget: millis(self.frame_budget_ms),
            degrade_threshold: millis(self.degrade_threshold_ms),
            memory_warning_threshold: self.memory_warning_threshold,
            max_edges: self.max_edges,
            degraded_max_edges: self.degraded_max_edges,
        }
    }
}

/// Milliseconds to a `Duration`, saturating instead of panicking.
fn millis(ms: f32) -> Duration {
    Duration::try_from_secs_f32(ms / 1000.0).unwrap_or(if ms > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            max_nodes = 500
            frame_rate_limit = 30

            [zoom_limits]
            min = 0.2
            max = 4.0

            [particles]
            max_particles = 256
            blend_mode = "multiply"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_nodes, 500);
        assert_eq!(config.viewport_nodes, 200);
        assert_eq!(config.zoom_limits.min, 0.2);
        assert_eq!(config.particles.max_particles, 256);
        assert_eq!(config.particles.blend_mode, crate::BlendMode::Multiply);
        assert_eq!(config.particles.particle_lifetime, 2.0);
    }

    #[test]
    fn inverted_zoom_limits_rejected() {
        let config = EngineConfig {
            zoom_limits: ZoomLimits { min: 2.0, max: 1.0 },
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("max_nodes = \"lots\""),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn budget_conversion() {
        let budget = EngineConfig::default().performance_budget();
        assert!((budget.frame_budget.as_secs_f64() - 0.01667).abs() < 1e-6);
        assert_eq!(budget.degraded_max_edges, 500);
    }

    #[test]
    fn non_finite_values_rejected() {
        for doc in [
            "[particles]\nspin = nan",
            "frame_budget_ms = inf\ndegrade_threshold_ms = inf",
            "viewport_padding = nan",
            "base_node_radius = inf",
            "[zoom_limits]\nmax = inf",
            "[lod]\nhysteresis = nan",
            "[particles]\nemission_rate = inf",
            "[particles.velocity_range]\nmin = 1.0\nmax = inf",
        ] {
            assert!(
                matches!(EngineConfig::from_toml_str(doc), Err(Error::InvalidConfig(_))),
                "accepted {doc:?}"
            );
        }
    }

    #[test]
    fn huge_budget_saturates() {
        let config = EngineConfig {
            frame_budget_ms: f32::MAX,
            degrade_threshold_ms: f32::MAX,
            ..EngineConfig::default()
        };
        config.validate().unwrap();
        assert_eq!(config.performance_budget().frame_budget, Duration::MAX);
    }
}
