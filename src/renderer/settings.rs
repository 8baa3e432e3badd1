//! Peeling Settings & Blend Configuration
//!
//! This module defines the per-frame configuration of the peeling pipeline.
//!
//! The core abstraction is [`PeelingSettings`]: which algorithm runs, how many
//! layers it may capture, at which resolution the capture and composite passes
//! run, and how captured layers are blended back together.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use depth_peel::renderer::settings::{PeelingAlgorithm, PeelingSettings};
//!
//! // Default: front-to-back peeling, 4 layers, full resolution
//! let settings = PeelingSettings::default();
//!
//! // Dual peeling at half resolution with a deep layer budget
//! let settings = PeelingSettings {
//!     algorithm: PeelingAlgorithm::DualPeeling,
//!     layer_count: 16,
//!     capture_lod: 1,
//!     ..Default::default()
//! };
//! ```
//!
//! The pipeline never clamps these values itself. The surrounding component is
//! expected to pass them through [`PeelingSettings::clamped`].

use glam::Vec4;
use serde::{Deserialize, Serialize};

/// Capacity of the layer arena. `layer_count` can never exceed this.
pub const MAX_LAYERS: u32 = 50;

/// Deepest supported level of detail (`2^4` = 1/16 resolution).
pub const MAX_LOD: u32 = 4;

// ---------------------------------------------------------------------------
// PeelingAlgorithm
// ---------------------------------------------------------------------------

/// Which peeling algorithm captures the transparent layers.
///
/// | Algorithm     | Passes for N surfaces | Persistent color targets |
/// |---------------|-----------------------|--------------------------|
/// | `FrontToBack` | N                     | one per layer            |
/// | `DualPeeling` | ⌈N / 2⌉               | two accumulators         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PeelingAlgorithm {
    /// Classic depth peeling: every pass captures the next-nearest surface.
    #[default]
    FrontToBack,
    /// Peels the nearest and the farthest remaining surface in the same pass,
    /// accumulating into a front and a back target. Requires min/max blend
    /// operations on the depth channels.
    DualPeeling,
}

// ---------------------------------------------------------------------------
// CompositeMode
// ---------------------------------------------------------------------------

/// How a captured layer is combined with everything behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompositeMode {
    /// Source-over with the configured source/destination factors.
    #[default]
    AlphaBlend,
    /// Unconditional add, ignoring the blend factors.
    Additive,
}

// ---------------------------------------------------------------------------
// BlendFactor / BlendOperation
// ---------------------------------------------------------------------------

/// Multiplier applied to one side of a blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    DstColor,
    SrcColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcColor,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturate,
    OneMinusSrcAlpha,
}

impl BlendFactor {
    /// Evaluates the per-channel factor for a source and destination texel.
    #[must_use]
    pub fn factor(self, src: Vec4, dst: Vec4) -> Vec4 {
        match self {
            Self::Zero => Vec4::ZERO,
            Self::One => Vec4::ONE,
            Self::DstColor => dst,
            Self::SrcColor => src,
            Self::OneMinusDstColor => Vec4::ONE - dst,
            Self::SrcAlpha => Vec4::splat(src.w),
            Self::OneMinusSrcColor => Vec4::ONE - src,
            Self::DstAlpha => Vec4::splat(dst.w),
            Self::OneMinusDstAlpha => Vec4::splat(1.0 - dst.w),
            Self::SrcAlphaSaturate => {
                let f = src.w.min(1.0 - dst.w);
                Vec4::new(f, f, f, 1.0)
            }
            Self::OneMinusSrcAlpha => Vec4::splat(1.0 - src.w),
        }
    }

    /// Maps onto the equivalent GPU blend factor.
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::BlendFactor {
        match self {
            Self::Zero => wgpu::BlendFactor::Zero,
            Self::One => wgpu::BlendFactor::One,
            Self::DstColor => wgpu::BlendFactor::Dst,
            Self::SrcColor => wgpu::BlendFactor::Src,
            Self::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
            Self::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            Self::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
            Self::DstAlpha => wgpu::BlendFactor::DstAlpha,
            Self::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
            Self::SrcAlphaSaturate => wgpu::BlendFactor::SrcAlphaSaturated,
            Self::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        }
    }
}

/// Operation combining the weighted source and destination terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

impl BlendOperation {
    /// Applies the operation to already-weighted terms.
    #[inline]
    #[must_use]
    pub fn apply(self, src: f32, dst: f32) -> f32 {
        match self {
            Self::Add => src + dst,
            Self::Subtract => src - dst,
            Self::ReverseSubtract => dst - src,
            Self::Min => src.min(dst),
            Self::Max => src.max(dst),
        }
    }

    /// Maps onto the equivalent GPU blend operation.
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::BlendOperation {
        match self {
            Self::Add => wgpu::BlendOperation::Add,
            Self::Subtract => wgpu::BlendOperation::Subtract,
            Self::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
            Self::Min => wgpu::BlendOperation::Min,
            Self::Max => wgpu::BlendOperation::Max,
        }
    }
}

// ---------------------------------------------------------------------------
// PeelingSettings
// ---------------------------------------------------------------------------

/// Configuration for one frame of the peeling pipeline.
///
/// The orchestrator copies the settings at the start of a frame, so changes
/// only take effect on the next frame.
///
/// # Fields
///
/// | Field                  | Description                               | Default            |
/// |------------------------|-------------------------------------------|--------------------|
/// | `algorithm`            | Peeling algorithm                         | `FrontToBack`      |
/// | `layer_count`          | Number of passes (1..=50)                 | `4`                |
/// | `capture_lod`          | Resolution shift of capture passes        | `0`                |
/// | `composite_lod`        | Resolution shift of composite passes      | `0`                |
/// | `composite_mode`       | Layer blend law                           | `AlphaBlend`       |
/// | `src_factor`           | Source factor for `AlphaBlend`            | `SrcAlpha`         |
/// | `dst_factor`           | Destination factor for `AlphaBlend`       | `OneMinusSrcAlpha` |
/// | `depth_blend_op_rgb`   | Near-depth channel op for dual peeling    | `Min`              |
/// | `depth_blend_op_alpha` | Far-depth channel op for dual peeling     | `Max`              |
/// | `enabled`              | When `false`, the base capture passes through | `true`         |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeelingSettings {
    pub algorithm: PeelingAlgorithm,
    pub layer_count: u32,
    pub capture_lod: u32,
    pub composite_lod: u32,
    pub composite_mode: CompositeMode,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub depth_blend_op_rgb: BlendOperation,
    pub depth_blend_op_alpha: BlendOperation,
    pub enabled: bool,
}

impl Default for PeelingSettings {
    fn default() -> Self {
        Self {
            algorithm: PeelingAlgorithm::default(),
            layer_count: 4,
            capture_lod: 0,
            composite_lod: 0,
            composite_mode: CompositeMode::default(),
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            depth_blend_op_rgb: BlendOperation::Min,
            depth_blend_op_alpha: BlendOperation::Max,
            enabled: true,
        }
    }
}

impl PeelingSettings {
    /// Returns a copy with every ranged field clamped into its valid range.
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self {
            layer_count: self.layer_count.clamp(1, MAX_LAYERS),
            capture_lod: self.capture_lod.min(MAX_LOD),
            composite_lod: self.composite_lod.min(MAX_LOD),
            ..*self
        }
    }

    /// Number of color targets the capture passes lease per frame.
    #[inline]
    #[must_use]
    pub fn layer_targets(&self) -> u32 {
        match self.algorithm {
            PeelingAlgorithm::FrontToBack => self.layer_count,
            PeelingAlgorithm::DualPeeling => 2,
        }
    }
}
