//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`EmberError`] covers all failure modes including:
//! - Graph construction and compilation errors
//! - GPU resource allocation failures
//! - Device-level failures
//! - Swapchain staleness (non-fatal, handled by the frame coordinator)
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, EmberError>`.

use thiserror::Error;

/// The main error type for the Ember engine.
///
/// Construction errors (`Config`, `Topology`) are detected at graph build
/// or compile time and are fatal to engine startup. `Allocation` is fatal
/// at startup and aborts the current frame at runtime. `Device` is always
/// fatal. `SwapchainStale` is recovered locally by the frame coordinator.
#[derive(Error, Debug)]
pub enum EmberError {
    // ========================================================================
    // Graph Construction Errors
    // ========================================================================
    /// Invalid pass or binding configuration (duplicate set/binding index,
    /// attachment out of range, unknown resource handle, missing shader stage).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The compiled dependency set contains a cycle.
    #[error("Topology error: {0}")]
    Topology(String),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// GPU memory, image or view creation failed, or an asset file could
    /// not be read or decoded.
    #[error("Allocation error: {0}")]
    Allocation(String),

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// The GPU API returned a fatal code or the device was lost.
    #[error("Device error: {0}")]
    Device(String),

    /// The swapchain is out of date or suboptimal; the current frame is
    /// dropped and the swapchain rebuilt at the new window extent.
    #[error("Swapchain is stale and must be rebuilt")]
    SwapchainStale,

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error (shader binaries, image initial contents).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for EmberError {
    fn from(err: image::ImageError) -> Self {
        EmberError::Allocation(format!("image decode failed: {err}"))
    }
}

/// Alias for `Result<T, EmberError>`.
pub type Result<T> = std::result::Result<T, EmberError>;
