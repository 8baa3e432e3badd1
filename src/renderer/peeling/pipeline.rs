//! Peeling Pipeline
//!
//! Runs the capture passes of a frame and fills the [`LayerStack`].
//!
//! # Data Flow
//!
//! ```text
//! source ─copy─► base (color + depth plane)
//!                  │ depth test
//!   pass 0 ────────┼──► layer 0 / front+back   depth[0]
//!   pass i ────────┴──► layer i / front+back   depth[i % 2] ◄─ reads depth[1 - i % 2]
//! ```
//!
//! Which passes run is decided once per frame by [`FrameStrategy`]; the
//! disabled fast path is just another strategy so the working set is leased
//! and released the same way for all of them.

use glam::Vec4;
use smallvec::smallvec;

use crate::errors::{PeelError, Result};
use crate::renderer::backend::TargetBackend;
use crate::renderer::contract::{ClearFlags, DrawCall, SceneRenderer, ShaderVariant};
use crate::renderer::peeling::layers::{DepthPingPong, LayerRole, LayerStack};
use crate::renderer::pool::FrameLease;
use crate::renderer::settings::{
    BlendOperation, MAX_LAYERS, MAX_LOD, PeelingAlgorithm, PeelingSettings,
};
use crate::renderer::target::{ColorSpace, Extent, RenderTargetDescriptor, TargetHandle, labels};

/// Far-plane sentinel of the front-to-back depth buffers.
pub const FAR_DEPTH: Vec4 = Vec4::new(1.0, 1.0, 1.0, 1.0);

/// Dual sentinel: near channel at the far plane, far channel at the near
/// plane, so the first min/max blend always takes the fragment's depth.
pub const DUAL_DEPTH: Vec4 = Vec4::new(1.0, 0.0, 0.0, 0.0);

/// Bit depth of the base target's depth plane.
pub const BASE_DEPTH_BITS: u32 = 24;

/// What a frame does, selected once from the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStrategy {
    /// Disabled: capture the unpeeled scene once and present it directly.
    PassThrough,
    FrontToBack,
    DualPeeling,
}

impl FrameStrategy {
    #[must_use]
    pub fn select(settings: &PeelingSettings) -> Self {
        if !settings.enabled {
            return Self::PassThrough;
        }
        match settings.algorithm {
            PeelingAlgorithm::FrontToBack => Self::FrontToBack,
            PeelingAlgorithm::DualPeeling => Self::DualPeeling,
        }
    }

    /// Active length of the layer arena for this strategy.
    #[must_use]
    pub fn layer_slots(self, settings: &PeelingSettings) -> u32 {
        match self {
            Self::PassThrough => 1,
            Self::FrontToBack | Self::DualPeeling => settings.layer_targets(),
        }
    }

    /// Number of capture passes issued.
    #[must_use]
    pub fn capture_passes(self, settings: &PeelingSettings) -> u32 {
        match self {
            Self::PassThrough => 1,
            Self::FrontToBack | Self::DualPeeling => settings.layer_count,
        }
    }
}

/// Targets shared by every capture pass of a frame.
#[derive(Debug, Clone, Copy)]
pub struct WorkingSet {
    /// Background color plus the depth plane used for hardware depth tests.
    pub base: TargetHandle,
    pub depth: DepthPingPong,
    /// Extent of every capture target.
    pub capture: Extent,
}

/// Capture stage of the pipeline for one frame.
pub struct PeelingPipeline<'a> {
    settings: &'a PeelingSettings,
    strategy: FrameStrategy,
}

impl<'a> PeelingPipeline<'a> {
    #[must_use]
    pub fn new(settings: &'a PeelingSettings) -> Self {
        Self {
            settings,
            strategy: FrameStrategy::select(settings),
        }
    }

    #[must_use]
    pub fn strategy(&self) -> FrameStrategy {
        self.strategy
    }

    #[must_use]
    pub fn settings(&self) -> &'a PeelingSettings {
        self.settings
    }

    /// Reject settings the arena or the LOD ladder cannot represent.
    pub fn validate(&self) -> Result<()> {
        let s = self.settings;
        if s.layer_count == 0 || s.layer_count > MAX_LAYERS {
            return Err(PeelError::ConfigurationInvalid(format!(
                "layer count {} outside 1..={MAX_LAYERS}",
                s.layer_count
            )));
        }
        if s.capture_lod > MAX_LOD || s.composite_lod > MAX_LOD {
            return Err(PeelError::ConfigurationInvalid(format!(
                "lod {}/{} exceeds {MAX_LOD}",
                s.capture_lod, s.composite_lod
            )));
        }
        Ok(())
    }

    /// Lease the working set and the layer color targets.
    ///
    /// The background is copied from `source` into the base target. Every
    /// handle is owned by `lease`, so a failure here releases the partial set.
    pub fn allocate<B: TargetBackend>(
        &self,
        lease: &mut FrameLease<'_, B>,
        layers: &mut LayerStack,
        source: &B::Target,
        base_extent: Extent,
    ) -> Result<WorkingSet> {
        let lod = self.settings.capture_lod;

        let base = lease.acquire(
            &RenderTargetDescriptor::color(base_extent, lod, ColorSpace::Gamma, labels::BASE)
                .with_depth_bits(BASE_DEPTH_BITS),
        )?;
        let depth_desc = RenderTargetDescriptor::depth(base_extent, lod);
        let depth = DepthPingPong::new(lease.acquire(&depth_desc)?, lease.acquire(&depth_desc)?);

        let layer_desc = |label: &'static str| {
            RenderTargetDescriptor::color(base_extent, lod, ColorSpace::Linear, label)
        };
        match self.strategy {
            FrameStrategy::PassThrough => {
                let target = lease.acquire(&layer_desc(labels::LAYER))?;
                layers.set(0, target, LayerRole::Peeled)?;
            }
            FrameStrategy::FrontToBack => {
                for i in 0..self.settings.layer_count {
                    let target = lease.acquire(&layer_desc(labels::LAYER))?;
                    layers.set(i, target, LayerRole::Peeled)?;
                }
            }
            FrameStrategy::DualPeeling => {
                let front = lease.acquire(&layer_desc(labels::FRONT))?;
                let back = lease.acquire(&layer_desc(labels::BACK))?;
                layers.set(0, front, LayerRole::FrontAccumulator)?;
                layers.set(1, back, LayerRole::BackAccumulator)?;
            }
        }

        lease.copy_from_external(source, base)?;

        let capture = base_extent.at_lod(lod);
        log::debug!(
            "Allocated peeling working set: {:?}, {} layer target(s) at {}x{}",
            self.strategy,
            layers.len(),
            capture.width,
            capture.height,
        );

        Ok(WorkingSet {
            base,
            depth,
            capture,
        })
    }

    /// Issue every capture pass. Returns the number of passes drawn.
    ///
    /// A failed draw stops the loop; the remaining passes are skipped and the
    /// error names the failing pass.
    pub fn run<B, R>(
        &self,
        lease: &mut FrameLease<'_, B>,
        set: &WorkingSet,
        layers: &LayerStack,
        renderer: &mut R,
    ) -> Result<u32>
    where
        B: TargetBackend,
        R: SceneRenderer<B::Target> + ?Sized,
    {
        match self.strategy {
            FrameStrategy::PassThrough => {
                Self::capture_base(lease, set, layers, renderer)?;
                Ok(1)
            }
            FrameStrategy::FrontToBack => self.run_front_to_back(lease, set, layers, renderer),
            FrameStrategy::DualPeeling => self.run_dual(lease, set, layers, renderer),
        }
    }

    /// Pass 0: the scene as it would render without peeling.
    fn capture_base<B, R>(
        lease: &mut FrameLease<'_, B>,
        set: &WorkingSet,
        layers: &LayerStack,
        renderer: &mut R,
    ) -> Result<()>
    where
        B: TargetBackend,
        R: SceneRenderer<B::Target> + ?Sized,
    {
        let layer = layers.get(0)?;
        let depth_out = set.depth.write(0);

        let call = DrawCall {
            pass: 0,
            variant: ShaderVariant::Unpeeled,
            color_targets: smallvec![lease.target(layer.target)?, lease.target(depth_out)?],
            depth_target: lease.target(set.base)?,
            previous_depth: None,
            clear_colors: Some(smallvec![Vec4::ZERO, FAR_DEPTH]),
            clear: ClearFlags::COLOR_DEPTH,
            blend_op_rgb: BlendOperation::Add,
            blend_op_alpha: BlendOperation::Add,
        };
        renderer.draw(&call).map_err(|e| PeelError::pass_failed(0, e))
    }

    fn run_front_to_back<B, R>(
        &self,
        lease: &mut FrameLease<'_, B>,
        set: &WorkingSet,
        layers: &LayerStack,
        renderer: &mut R,
    ) -> Result<u32>
    where
        B: TargetBackend,
        R: SceneRenderer<B::Target> + ?Sized,
    {
        Self::capture_base(lease, set, layers, renderer)?;

        for i in 1..self.settings.layer_count {
            let layer = layers.get(i)?;
            let depth_out = set.depth.write(i);

            lease.clear(layer.target, Vec4::ZERO, false)?;
            lease.clear(depth_out, FAR_DEPTH, false)?;

            let call = DrawCall {
                pass: i,
                variant: ShaderVariant::Peeled,
                color_targets: smallvec![lease.target(layer.target)?, lease.target(depth_out)?],
                depth_target: lease.target(set.base)?,
                previous_depth: Some(lease.target(set.depth.read(i))?),
                clear_colors: None,
                clear: ClearFlags::DEPTH,
                blend_op_rgb: BlendOperation::Add,
                blend_op_alpha: BlendOperation::Add,
            };

            log::trace!(
                "Peel pass {i}: write depth[{}], read depth[{}]",
                DepthPingPong::write_index(i),
                DepthPingPong::read_index(i),
            );
            renderer.draw(&call).map_err(|e| PeelError::pass_failed(i, e))?;
        }

        Ok(self.settings.layer_count)
    }

    fn run_dual<B, R>(
        &self,
        lease: &mut FrameLease<'_, B>,
        set: &WorkingSet,
        layers: &LayerStack,
        renderer: &mut R,
    ) -> Result<u32>
    where
        B: TargetBackend,
        R: SceneRenderer<B::Target> + ?Sized,
    {
        let front = layers.get(0)?.target;
        let back = layers.get(1)?.target;

        for i in 0..self.settings.layer_count {
            let depth_out = set.depth.write(i);
            let setup = i == 0;

            // Accumulators are cleared by the setup draw only
            let (variant, previous_depth, clear, clear_colors) = if setup {
                (
                    ShaderVariant::DualSetup,
                    None,
                    ClearFlags::COLOR_DEPTH,
                    Some(smallvec![Vec4::ZERO, Vec4::ZERO, DUAL_DEPTH]),
                )
            } else {
                lease.clear(depth_out, DUAL_DEPTH, false)?;
                (
                    ShaderVariant::DualPeeled,
                    Some(lease.target(set.depth.read(i))?),
                    ClearFlags::NONE,
                    None,
                )
            };

            let call = DrawCall {
                pass: i,
                variant,
                color_targets: smallvec![
                    lease.target(front)?,
                    lease.target(back)?,
                    lease.target(depth_out)?
                ],
                depth_target: lease.target(set.base)?,
                previous_depth,
                clear_colors,
                clear,
                blend_op_rgb: self.settings.depth_blend_op_rgb,
                blend_op_alpha: self.settings.depth_blend_op_alpha,
            };

            log::trace!("Dual peel pass {i}: write depth[{}]", DepthPingPong::write_index(i));
            renderer.draw(&call).map_err(|e| PeelError::pass_failed(i, e))?;
        }

        Ok(self.settings.layer_count)
    }
}
