//! Flowscope core: the GPU-free half of a live network map renderer.
//!
//! - [`spatial`] quadtree over node positions, [`culling`] on top of it
//! - [`lod`] detail tiers from camera zoom
//! - [`perf`] frame timing, memory sampling and quality degradation
//! - [`scheduler`] frame-rate capping and start/stop of the render loop
//! - [`particles`] pooled particles animating traffic along flows
//! - [`compositor`] per-frame draw list
//! - [`engine`] the context that owns all of the above
//!
//! The wgpu crate turns the draw list and particle vertices into pixels.

pub mod camera;
pub mod compositor;
pub mod config;
pub mod culling;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod lod;
pub mod particles;
pub mod perf;
pub mod scheduler;
pub mod spatial;

pub use camera::{Camera, ZoomLimits};
pub use compositor::{EdgeInstance, FrameDrawList, Label, NodeInstance, Overlay};
pub use config::EngineConfig;
pub use culling::{CullingLimits, ViewportCuller};
pub use engine::{Engine, EngineEvent, EngineMetrics, Key};
pub use error::{Error, Result};
pub use geometry::{Rect, Viewport};
pub use graph::{Flow, FlowId, Graph, MetadataValue, Node, NodeId, NodeStatus};
pub use lod::{DetailTier, LodController, LodThresholds};
pub use particles::{BlendFactor, BlendMode, ParticleConfig, ParticleSystem, ParticleVertex};
pub use perf::{FrameMetrics, PerformanceAlert, PerformanceMonitor, QualitySettings};
pub use scheduler::{FrameLimiter, FrameScheduler, FrameTick, RenderLoop};
pub use spatial::SpatialIndex;
