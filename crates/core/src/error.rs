//! Engine-level error types.

use thiserror::Error;

/// Top-level error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    /// GPU/Vulkan-related errors
    #[error("GPU error: {0}")]
    Gpu(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Asset loading errors
    #[error("Resource error: {0}")]
    Resource(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the engine's error type.
pub type Result<T> = std::result::Result<T, Error>;
