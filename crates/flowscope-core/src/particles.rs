//! Pooled particles animating traffic along flows.
//!
//! All particle records are allocated once when the system is created and
//! recycled for its whole lifetime. Dead slots live on a free-list stack, so
//! emission is O(1) and never allocates. Running out of slots is normal under
//! load and simply emits fewer particles.
//!
//! This module owns the simulation and the vertex packing. The GPU program
//! that draws the packed vertices lives in the wgpu crate.

use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::time::Instant;

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::scheduler::RenderLoop;

/// Linear RGBA in [0, 1].
pub type Rgba = [f32; 4];

/// Local corner offsets of the two triangles forming one particle quad.
pub const QUAD_CORNERS: [[f32; 2]; 6] = [
    [-0.5, -0.5],
    [0.5, -0.5],
    [-0.5, 0.5],
    [-0.5, 0.5],
    [0.5, -0.5],
    [0.5, 0.5],
];

/// Vertices emitted per alive particle.
pub const VERTICES_PER_PARTICLE: usize = QUAD_CORNERS.len();

/// How particle fragments combine with what is already drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Source over destination by source alpha
    Normal,
    /// Source added onto destination, glows where particles overlap
    #[default]
    Additive,
    /// Destination darkened by source color
    Multiply,
}

/// Blend factor names, independent of any GPU API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
}

impl BlendMode {
    /// Source and destination color factors for this mode.
    pub fn factors(&self) -> (BlendFactor, BlendFactor) {
        match self {
            BlendMode::Normal => (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
            BlendMode::Additive => (BlendFactor::SrcAlpha, BlendFactor::One),
            BlendMode::Multiply => (BlendFactor::Dst, BlendFactor::OneMinusSrcAlpha),
        }
    }
}

/// Color at birth and at death.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorRange {
    pub start: Rgba,
    pub end: Rgba,
}

impl ColorRange {
    /// Per-channel linear interpolation at normalized age `t`.
    pub fn at(&self, t: f32) -> Rgba {
        let t = t.clamp(0.0, 1.0);
        let mut out = [0.0; 4];
        for (i, c) in out.iter_mut().enumerate() {
            *c = self.start[i] + (self.end[i] - self.start[i]) * t;
        }
        out
    }
}

/// Speed range in world units per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityRange {
    pub min: f32,
    pub max: f32,
}

/// Particle system parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Pool size, fixed at construction
    pub max_particles: usize,
    pub particle_size: f32,
    /// Seconds a particle lives
    pub particle_lifetime: f32,
    /// Flows animated per second by the engine
    pub emission_rate: f32,
    /// Particles placed along a flow per animation
    pub flow_particle_count: usize,
    /// Seconds between consecutive emissions along a flow
    pub flow_stagger: f32,
    /// Acceleration in world units per second squared
    pub gravity: Vec2,
    pub velocity_range: VelocityRange,
    /// Maximum rotation speed in radians per second
    pub spin: f32,
    pub color_range: ColorRange,
    pub blend_mode: BlendMode,
    /// Image file used as particle sprite; soft circles when absent
    pub texture_source: Option<std::path::PathBuf>,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            max_particles: 10_000,
            particle_size: 4.0,
            particle_lifetime: 2.0,
            emission_rate: 30.0,
            flow_particle_count: 5,
            flow_stagger: 0.05,
            gravity: Vec2::ZERO,
            velocity_range: VelocityRange {
                min: 10.0,
                max: 40.0,
            },
            spin: 1.0,
            color_range: ColorRange {
                start: [0.2, 0.8, 1.0, 1.0],
                end: [0.2, 0.4, 1.0, 0.0],
            },
            blend_mode: BlendMode::Additive,
            texture_source: None,
            seed: None,
        }
    }
}

/// One particle record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Remaining seconds; dead at or below zero
    pub life: f32,
    pub max_life: f32,
    pub size: f32,
    pub color: Rgba,
    /// Radians
    pub rotation: f32,
    /// Radians per second
    pub rotation_speed: f32,
}

impl Particle {
    const DEAD: Particle = Particle {
        position: Vec2::ZERO,
        velocity: Vec2::ZERO,
        life: 0.0,
        max_life: 0.0,
        size: 0.0,
        color: [0.0; 4],
        rotation: 0.0,
        rotation_speed: 0.0,
    };

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.life > 0.0
    }

    /// Normalized age: 0 at birth, 1 at death.
    pub fn age(&self) -> f32 {
        if self.max_life > 0.0 {
            (1.0 - self.life / self.max_life).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }
}

/// GPU vertex for one particle quad corner.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleVertex {
    /// Local corner offset in [-0.5, 0.5]
    pub corner: [f32; 2],
    /// World position of the particle
    pub position: [f32; 2],
    pub size: f32,
    pub rotation: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Copy)]
struct PendingEmission {
    /// System clock time at which to emit
    at: f32,
    position: Vec2,
}

/// Fixed-size particle pool with simulation and vertex packing.
pub struct ParticleSystem {
    config: ParticleConfig,
    particles: Vec<Particle>,
    /// Indices of dead particles; pop to emit, push on death
    free: Vec<u32>,
    pending: VecDeque<PendingEmission>,
    pending_capacity: usize,
    /// Seconds simulated so far
    clock: f32,
    rng: StdRng,
    render_loop: RenderLoop,
}

impl std::fmt::Debug for ParticleSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleSystem")
            .field("capacity", &self.particles.len())
            .field("alive", &self.alive_count())
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Uniform sample in `[lo, hi]`. Degenerate or non-finite ranges yield `lo`, or 0.
fn sample(rng: &mut StdRng, lo: f32, hi: f32) -> f32 {
    if lo.is_finite() && hi.is_finite() && lo < hi {
        rng.gen_range(lo..=hi)
    } else if lo.is_finite() {
        lo
    } else {
        0.0
    }
}

impl ParticleSystem {
    /// Allocate the pool. Every particle starts dead.
    pub fn new(config: ParticleConfig) -> Self {
        let capacity = config.max_particles;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut system = Self {
            particles: vec![Particle::DEAD; capacity],
            free: Vec::with_capacity(capacity),
            pending: VecDeque::with_capacity(capacity),
            pending_capacity: capacity,
            clock: 0.0,
            rng,
            render_loop: RenderLoop::new(),
            config,
        };
        system.clear();
        system
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    /// Update parameters that do not change the pool size.
    ///
    /// `max_particles` is fixed at construction and ignored here.
    pub fn set_config(&mut self, mut config: ParticleConfig) {
        config.max_particles = self.particles.len();
        self.config = config;
    }

    /// Kill every particle and drop pending emissions.
    pub fn clear(&mut self) {
        for p in &mut self.particles {
            *p = Particle::DEAD;
        }
        self.free.clear();
        // Reverse so that slot 0 is handed out first
        self.free.extend((0..self.particles.len() as u32).rev());
        self.pending.clear();
    }

    /// Emit up to `count` particles at `position`. Returns how many were emitted.
    pub fn emit(&mut self, position: Vec2, count: usize) -> usize {
        for emitted in 0..count {
            if !self.emit_one(position) {
                return emitted;
            }
        }
        count
    }

    fn emit_one(&mut self, position: Vec2) -> bool {
        let Some(slot) = self.free.pop() else {
            return false;
        };

        let c = &self.config;
        let theta = self.rng.gen_range(0.0..TAU);
        let speed = sample(&mut self.rng, c.velocity_range.min, c.velocity_range.max);
        let rotation = self.rng.gen_range(0.0..TAU);
        let rotation_speed = sample(&mut self.rng, -c.spin, c.spin);

        self.particles[slot as usize] = Particle {
            position,
            velocity: Vec2::new(theta.cos(), theta.sin()) * speed,
            life: c.particle_lifetime,
            max_life: c.particle_lifetime,
            size: c.particle_size,
            color: c.color_range.start,
            rotation,
            rotation_speed,
        };
        true
    }

    /// Animate a flow from `start` to `end` with `count` emissions.
    ///
    /// Emission points are evenly spaced along the segment starting at
    /// `start`; the i-th one fires `i * flow_stagger` seconds later so the
    /// burst travels toward `end`. Returns how many emissions were accepted.
    pub fn emit_flow(&mut self, start: Vec2, end: Vec2, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let mut accepted = 0;
        for i in 0..count {
            let t = i as f32 / count as f32;
            let position = start.lerp(end, t);
            let delay = i as f32 * self.config.flow_stagger;

            if delay <= 0.0 {
                if self.emit_one(position) {
                    accepted += 1;
                }
                continue;
            }
            if self.pending.len() >= self.pending_capacity {
                break;
            }
            self.pending.push_back(PendingEmission {
                at: self.clock + delay,
                position,
            });
            accepted += 1;
        }
        accepted
    }

    /// Integrate all alive particles by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.clock += dt;
        self.release_pending();
        if self.pending.is_empty() {
            // Nothing references the clock; keep it small for f32 precision
            self.clock = 0.0;
        }

        let gravity = self.config.gravity;
        let colors = self.config.color_range;

        for (idx, p) in self.particles.iter_mut().enumerate() {
            if !p.is_alive() {
                continue;
            }
            p.velocity += gravity * dt;
            p.position += p.velocity * dt;
            p.life -= dt;
            p.rotation += p.rotation_speed * dt;
            p.color = colors.at(p.age());

            if !p.is_alive() {
                self.free.push(idx as u32);
            }
        }
    }

    fn release_pending(&mut self) {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].at <= self.clock {
                if let Some(due) = self.pending.swap_remove_back(i) {
                    self.emit_one(due.position);
                }
            } else {
                i += 1;
            }
        }
    }

    /// Pack six vertices per alive particle into `out`, replacing its contents.
    pub fn write_vertices(&self, out: &mut Vec<ParticleVertex>) {
        out.clear();
        for p in self.particles.iter().filter(|p| p.is_alive()) {
            for corner in QUAD_CORNERS {
                out.push(ParticleVertex {
                    corner,
                    position: p.position.to_array(),
                    size: p.size,
                    rotation: p.rotation,
                    color: p.color,
                });
            }
        }
    }

    /// Vertex buffer capacity needed for a full pool.
    pub fn max_vertices(&self) -> usize {
        self.particles.len() * VERTICES_PER_PARTICLE
    }

    /// Start the particle loop.
    pub fn start(&mut self) {
        self.render_loop.start();
    }

    /// Stop the particle loop. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.render_loop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.render_loop.is_running()
    }

    /// Advance by the time since the previous call, if running.
    pub fn advance(&mut self, now: Instant) -> bool {
        match self.render_loop.tick(now) {
            Some(tick) => {
                self.update(tick.dt);
                true
            }
            None => false,
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    pub fn alive_count(&self) -> usize {
        self.particles.len() - self.free.len()
    }

    /// Emissions scheduled but not yet fired.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Approximate heap footprint in bytes.
    pub fn heap_bytes(&self) -> usize {
        self.particles.capacity() * std::mem::size_of::<Particle>()
            + self.free.capacity() * std::mem::size_of::<u32>()
            + self.pending.capacity() * std::mem::size_of::<PendingEmission>()
    }
}
