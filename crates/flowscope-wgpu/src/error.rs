//! Renderer error types.
//!
//! Every variant is fatal for the renderer: the host treats the map as
//! unavailable. Per-frame surface problems are reported as
//! [`wgpu::SurfaceError`] instead.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// No adapter, device or surface could be obtained
    #[error("GPU initialization failed: {0}")]
    Initialization(String),

    #[error("shader `{label}` failed to compile: {message}")]
    ShaderCompilation { label: String, message: String },

    #[error("particle texture: {0}")]
    Texture(#[from] image::ImageError),

    #[error(transparent)]
    Core(#[from] flowscope_core::Error),
}
