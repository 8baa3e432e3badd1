//! Error Types
//!
//! This module defines the error types used by the peeling pipeline.
//!
//! # Overview
//!
//! The main error type [`PeelError`] covers every way a frame can degrade:
//! - Scratch target allocation failures
//! - Renderer or compositor failures in the middle of a frame
//! - Configuration that does not fit the layer arena
//!
//! Collaborators report their own failures as [`DrawError`], which the
//! pipeline wraps into [`PeelError::RenderPassFailed`] together with the index
//! of the pass that failed.
//!
//! # Usage
//!
//! All fallible pipeline APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, PeelError>`.
//!
//! ```rust,ignore
//! use depth_peel::errors::{PeelError, Result};
//!
//! fn allocate() -> Result<()> {
//!     Err(PeelError::ConfigurationInvalid("no layers".into()))
//! }
//! ```

use thiserror::Error;

use crate::renderer::target::TargetHandle;

/// The main error type for the peeling pipeline.
///
/// None of these errors are retried: a failed frame is a dropped frame, and
/// the orchestrator presents an untouched pass-through of the source instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PeelError {
    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// The backend could not provide a scratch target.
    #[error("Resource exhausted while allocating '{label}' ({width}x{height})")]
    ResourceExhausted {
        /// Label of the descriptor that failed
        label: &'static str,
        /// Requested width in texels
        width: u32,
        /// Requested height in texels
        height: u32,
    },

    /// A handle was looked up after it had been released.
    #[error("Render target {0:?} is no longer live")]
    StaleTarget(TargetHandle),

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// A renderer draw or compositor call failed; remaining passes were skipped.
    #[error("Render pass {pass} failed: {reason}")]
    RenderPassFailed {
        /// Index of the pass that failed (0 is the base capture)
        pass: u32,
        /// Collaborator-provided reason
        reason: DrawError,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Layer count or layer index does not match the allocated arena.
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),
}

/// Failure reported by a [`SceneRenderer`](crate::renderer::contract::SceneRenderer)
/// or [`CompositorShader`](crate::renderer::contract::CompositorShader).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DrawError {
    /// The device rejected or lost the submitted work.
    #[error("Device error: {0}")]
    Device(String),

    /// A bound target does not fit the call (missing binding, size mismatch).
    #[error("Invalid binding: {0}")]
    InvalidBinding(String),
}

impl PeelError {
    /// Wraps a collaborator failure for the given pass index.
    #[must_use]
    pub fn pass_failed(pass: u32, reason: DrawError) -> Self {
        Self::RenderPassFailed { pass, reason }
    }
}

/// Alias for `Result<T, PeelError>`.
pub type Result<T> = std::result::Result<T, PeelError>;
