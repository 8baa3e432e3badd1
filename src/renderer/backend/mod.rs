//! Target Backends
//!
//! A backend is the graphics API's own temporary-resource pool. The pipeline
//! never creates textures directly; it leases them through
//! [`RenderTargetPool`](crate::renderer::pool::RenderTargetPool), which in turn
//! asks the backend. Backends are free to recycle released targets across
//! frames; the pipeline itself caches nothing.
//!
//! Two backends ship with the crate:
//! - [`WgpuTargetBackend`]: GPU textures on a `wgpu::Device`.
//! - [`SoftBackend`]: CPU images, used headless and by the test suite.

pub mod gpu;
pub mod soft;

use glam::Vec4;

use crate::errors::Result;
use crate::renderer::target::{Extent, RenderTargetDescriptor};

pub use gpu::{WgpuTarget, WgpuTargetBackend};
pub use soft::{SoftBackend, SoftCompositor, SoftSceneRenderer, SoftSurface, SoftTarget};

/// Graphics backend providing temporary render targets.
///
/// All methods are called from the rendering thread in submission order;
/// backends only need to preserve that order, not synchronize.
pub trait TargetBackend {
    /// Backend-side render target. Collaborators receive `&Self::Target`.
    type Target;

    /// Returns a target matching `desc`. Contents are undefined.
    ///
    /// Fails with [`PeelError::ResourceExhausted`](crate::errors::PeelError::ResourceExhausted)
    /// when the request cannot be satisfied.
    fn acquire_temporary(&mut self, desc: &RenderTargetDescriptor) -> Result<Self::Target>;

    /// Hands a target back for reuse.
    fn release_temporary(&mut self, target: Self::Target);

    /// Fills the color plane with `color`; resets the depth plane to the far
    /// plane when `clear_depth` is set and the target has one.
    fn clear(&mut self, target: &Self::Target, color: Vec4, clear_depth: bool);

    /// Copies `src` into `dst`, resampling when the extents differ.
    fn copy(&mut self, src: &Self::Target, dst: &Self::Target);

    fn extent(&self, target: &Self::Target) -> Extent;

    /// Drops recycled targets that have been idle for more than
    /// `max_idle_frames` calls.
    fn trim(&mut self, max_idle_frames: u32);
}
