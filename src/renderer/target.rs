//! Render Target Descriptors & Handles
//!
//! Scratch targets are requested by value ([`RenderTargetDescriptor`]) and
//! referred to by a generational [`TargetHandle`] for the rest of the frame.
//! A handle outlives its target safely: once released, every lookup through
//! the pool reports it as stale instead of aliasing a recycled target.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Handle to a target leased from a [`RenderTargetPool`](super::pool::RenderTargetPool).
    ///
    /// `TargetHandle::null()` (via [`slotmap::Key`]) is never live, so
    /// cleanup code can release it unconditionally.
    pub struct TargetHandle;
}

/// Labels attached to the descriptors of the peeling working set.
pub mod labels {
    pub const BASE: &str = "Peel Base";
    pub const DEPTH: &str = "Peel Depth";
    pub const LAYER: &str = "Peel Layer";
    pub const FRONT: &str = "Peel Front Accumulator";
    pub const BACK: &str = "Peel Back Accumulator";
    pub const ACCUMULATOR: &str = "Composite Accumulator";
    pub const RESOLVED: &str = "Dual Resolve";
}

/// Texel layout of a scratch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorFormat {
    /// 8-bit normalized RGBA, used for every color-bearing target.
    Rgba8,
    /// Two 32-bit float channels, used by the depth ping-pong pair.
    Rg32Float,
}

impl ColorFormat {
    /// Bytes per texel, used for memory budgeting.
    #[inline]
    #[must_use]
    pub fn texel_size(self) -> u64 {
        match self {
            Self::Rgba8 => 4,
            Self::Rg32Float => 8,
        }
    }

    /// Maps onto the GPU texture format for the given color space.
    #[must_use]
    pub fn to_wgpu(self, space: ColorSpace) -> wgpu::TextureFormat {
        match (self, space) {
            (Self::Rgba8, ColorSpace::Linear) => wgpu::TextureFormat::Rgba8Unorm,
            (Self::Rgba8, ColorSpace::Gamma) => wgpu::TextureFormat::Rgba8UnormSrgb,
            (Self::Rg32Float, _) => wgpu::TextureFormat::Rg32Float,
        }
    }
}

/// Whether the target stores linear values or is sRGB-encoded on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    #[default]
    Linear,
    Gamma,
}

/// Width and height of a target in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Divides both dimensions by `2^lod`, never going below one texel.
    #[inline]
    #[must_use]
    pub fn at_lod(self, lod: u32) -> Self {
        Self {
            width: (self.width >> lod).max(1),
            height: (self.height >> lod).max(1),
        }
    }

    #[inline]
    #[must_use]
    pub fn texel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Request for a scratch render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetDescriptor {
    pub width: u32,
    pub height: u32,
    /// Bits of the attached depth plane; zero means no depth plane.
    pub depth_bits: u32,
    pub color_format: ColorFormat,
    pub color_space: ColorSpace,
    pub label: &'static str,
}

impl RenderTargetDescriptor {
    /// Color target at `base / 2^lod` without a depth plane.
    #[must_use]
    pub fn color(base: Extent, lod: u32, color_space: ColorSpace, label: &'static str) -> Self {
        let extent = base.at_lod(lod);
        Self {
            width: extent.width,
            height: extent.height,
            depth_bits: 0,
            color_format: ColorFormat::Rgba8,
            color_space,
            label,
        }
    }

    /// Two-channel depth ping-pong target at `base / 2^lod`.
    #[must_use]
    pub fn depth(base: Extent, lod: u32) -> Self {
        let extent = base.at_lod(lod);
        Self {
            width: extent.width,
            height: extent.height,
            depth_bits: 0,
            color_format: ColorFormat::Rg32Float,
            color_space: ColorSpace::Linear,
            label: labels::DEPTH,
        }
    }

    /// Attaches a depth plane with the given bit depth.
    #[must_use]
    pub fn with_depth_bits(mut self, depth_bits: u32) -> Self {
        self.depth_bits = depth_bits;
        self
    }

    #[inline]
    #[must_use]
    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    /// Approximate memory footprint, counting 4 bytes per texel of depth.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        let texels = u64::from(self.width) * u64::from(self.height);
        let depth = if self.depth_bits > 0 { 4 } else { 0 };
        texels * (self.color_format.texel_size() + depth)
    }
}
