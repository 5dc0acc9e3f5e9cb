//! wgpu renderer for Flowscope network maps.
//!
//! Draws the [`flowscope_core::FrameDrawList`] and particle vertices the
//! engine produces each frame.
//!
//! # Passes
//! - Scene: instanced node discs, then edge strokes with the performance
//!   warning bar on top
//! - Particles: rotated quads with a configurable blend mode, loaded over
//!   the scene, followed by node labels and the HUD readout (glyphon)

pub mod error;
pub mod gpu;
pub mod particle_renderer;
pub mod renderer;
pub mod scene;
pub mod text;

pub use error::{Error, Result};
pub use gpu::GpuContext;
pub use particle_renderer::ParticleRenderer;
pub use renderer::Renderer;
pub use scene::SceneRenderer;
pub use text::TextOverlay;
