//! Error types for flowscope-core.

use thiserror::Error;

/// Result type for flowscope-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring the engine.
///
/// Nothing on the per-frame path returns these: budget and memory breaches
/// are reported as [`PerformanceAlert`](crate::PerformanceAlert) values and
/// an exhausted particle pool simply emits fewer particles.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
