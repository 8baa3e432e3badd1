//! Collaborator Contracts
//!
//! The pipeline orchestrates passes but never rasterizes or shades anything
//! itself. Two collaborators do the pixel work:
//!
//! - [`SceneRenderer`]: draws the transparent geometry into the bindings of a
//!   [`DrawCall`].
//! - [`CompositorShader`]: blends one layer over a background, and resolves
//!   the two dual-peeling accumulators.
//!
//! Both receive borrowed targets for the duration of a single call and must
//! not retain them.

use bitflags::bitflags;
use glam::Vec4;
use smallvec::SmallVec;

use crate::errors::DrawError;
use crate::renderer::settings::{BlendFactor, BlendOperation, CompositeMode};

bitflags! {
    /// Planes cleared by the renderer before drawing.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ClearFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
    }
}

impl ClearFlags {
    pub const NONE: Self = Self::empty();
    pub const COLOR_DEPTH: Self = Self::COLOR.union(Self::DEPTH);
}

/// Shader variant selected for a draw.
///
/// Passed explicitly with every call instead of toggling process-wide shader
/// keywords, so no state leaks from one draw or frame into the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderVariant {
    /// Plain depth-tested render; no peeling test.
    Unpeeled,
    /// Front-to-back peel: discard fragments not strictly behind
    /// `previous_depth`.
    Peeled,
    /// First dual pass: write nearest/farthest surfaces without a peel test.
    DualSetup,
    /// Dual peel: keep fragments strictly between the previous near and far
    /// depths.
    DualPeeled,
}

impl ShaderVariant {
    #[inline]
    #[must_use]
    pub fn is_peeling(self) -> bool {
        matches!(self, Self::Peeled | Self::DualPeeled)
    }
}

/// One draw of the scene's transparent geometry.
///
/// Color target layout per variant:
///
/// | Variant                    | `color_targets`                 |
/// |----------------------------|---------------------------------|
/// | `Unpeeled` / `Peeled`      | `[layer color, depth out]`      |
/// | `DualSetup` / `DualPeeled` | `[front, back, depth out]`      |
///
/// `depth_target` is the base target, whose depth plane performs the hardware
/// depth test.
pub struct DrawCall<'a, T> {
    pub pass: u32,
    pub variant: ShaderVariant,
    pub color_targets: SmallVec<[&'a T; 3]>,
    pub depth_target: &'a T,
    /// Depth captured by the previous pass; bound for peeling variants only.
    pub previous_depth: Option<&'a T>,
    /// Per-color-target clear values; transparent black when absent.
    pub clear_colors: Option<SmallVec<[Vec4; 3]>>,
    pub clear: ClearFlags,
    /// Operation on the near-depth channel (and color RGB).
    pub blend_op_rgb: BlendOperation,
    /// Operation on the far-depth channel (and color alpha).
    pub blend_op_alpha: BlendOperation,
}

impl<T> DrawCall<'_, T> {
    /// Clear value for color target `index`.
    #[must_use]
    pub fn clear_color(&self, index: usize) -> Vec4 {
        self.clear_colors
            .as_ref()
            .and_then(|colors| colors.get(index).copied())
            .unwrap_or(Vec4::ZERO)
    }
}

/// Draws the transparent scene into the bindings of a [`DrawCall`].
pub trait SceneRenderer<T> {
    /// Records the draw. Returning means the commands were recorded, not that
    /// the GPU finished them.
    fn draw(&mut self, call: &DrawCall<'_, T>) -> Result<(), DrawError>;
}

/// Parameters of one layer blend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendParams {
    pub mode: CompositeMode,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

/// GPU-side compositing entry points.
///
/// Implementations typically own a material or pipeline built from the
/// compositor shader; [`CompositorShader::release`] frees it on teardown.
pub trait CompositorShader<T> {
    /// Writes `layer` blended over `background` into `output`.
    fn blend_layer(
        &mut self,
        background: &T,
        layer: &T,
        params: &BlendParams,
        output: &T,
    ) -> Result<(), DrawError>;

    /// Merges the dual-peeling accumulators into `output` in one pass.
    fn resolve_dual(
        &mut self,
        front: &T,
        back: &T,
        mode: CompositeMode,
        output: &T,
    ) -> Result<(), DrawError>;

    /// Frees long-lived resources. Called exactly once, on shutdown.
    fn release(&mut self) {}
}
