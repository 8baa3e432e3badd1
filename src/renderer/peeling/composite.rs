//! Layer Compositor
//!
//! Combines the captured layers with the background into one image.
//!
//! # Ordering
//!
//! Front-to-back layers are blended **farthest first**, `layer_count - 1`
//! down to `0`, so every nearer layer lands over everything behind it.
//! Iterating the other way produces wrong occlusion with no error to notice,
//! so the loop walks explicit indices instead of trusting iterator order.
//!
//! Each blend reads one accumulator and writes a freshly leased one; the
//! previous accumulator is released immediately, keeping at most two alive.
//!
//! ```text
//! base ─copy─► acc ─blend(layer N-1)─► acc' ─ … ─blend(layer 0)─► final
//! ```

use crate::errors::{PeelError, Result};
use crate::renderer::backend::TargetBackend;
use crate::renderer::contract::{BlendParams, CompositorShader};
use crate::renderer::peeling::layers::LayerStack;
use crate::renderer::peeling::pipeline::{FrameStrategy, WorkingSet};
use crate::renderer::pool::FrameLease;
use crate::renderer::settings::PeelingSettings;
use crate::renderer::target::{ColorSpace, Extent, RenderTargetDescriptor, TargetHandle, labels};

/// Composite stage of the pipeline for one frame.
pub struct Compositor {
    params: BlendParams,
    lod: u32,
    /// Pass index of the first composite call, for error reporting.
    first_pass: u32,
}

impl Compositor {
    #[must_use]
    pub fn new(settings: &PeelingSettings, first_pass: u32) -> Self {
        Self {
            params: BlendParams {
                mode: settings.composite_mode,
                src_factor: settings.src_factor,
                dst_factor: settings.dst_factor,
            },
            lod: settings.composite_lod,
            first_pass,
        }
    }

    /// Composite the captured layers. Returns the handle of the final
    /// accumulator, still owned by `lease`.
    ///
    /// [`FrameStrategy::PassThrough`] composites nothing and returns the
    /// unpeeled base capture.
    pub fn composite<B, C>(
        &self,
        lease: &mut FrameLease<'_, B>,
        set: &WorkingSet,
        layers: &LayerStack,
        shader: &mut C,
        strategy: FrameStrategy,
        base_extent: Extent,
    ) -> Result<TargetHandle>
    where
        B: TargetBackend,
        C: CompositorShader<B::Target> + ?Sized,
    {
        match strategy {
            FrameStrategy::PassThrough => Ok(layers.get(0)?.target),
            FrameStrategy::FrontToBack => {
                self.composite_layers(lease, set, layers, shader, base_extent)
            }
            FrameStrategy::DualPeeling => {
                self.resolve_dual(lease, set, layers, shader, base_extent)
            }
        }
    }

    fn accumulator_desc(&self, base_extent: Extent, label: &'static str) -> RenderTargetDescriptor {
        RenderTargetDescriptor::color(base_extent, self.lod, ColorSpace::Linear, label)
    }

    fn composite_layers<B, C>(
        &self,
        lease: &mut FrameLease<'_, B>,
        set: &WorkingSet,
        layers: &LayerStack,
        shader: &mut C,
        base_extent: Extent,
    ) -> Result<TargetHandle>
    where
        B: TargetBackend,
        C: CompositorShader<B::Target> + ?Sized,
    {
        let desc = self.accumulator_desc(base_extent, labels::ACCUMULATOR);

        let mut accumulator = lease.acquire(&desc)?;
        lease.copy(set.base, accumulator)?;

        for (step, index) in (0..layers.len()).rev().enumerate() {
            let layer = layers.get(index)?;
            let output = lease.acquire(&desc)?;

            shader
                .blend_layer(
                    lease.target(accumulator)?,
                    lease.target(layer.target)?,
                    &self.params,
                    lease.target(output)?,
                )
                .map_err(|e| PeelError::pass_failed(self.first_pass + step as u32, e))?;

            log::trace!("Composited layer {index} ({:?})", self.params.mode);
            lease.release(accumulator);
            accumulator = output;
        }

        Ok(accumulator)
    }

    fn resolve_dual<B, C>(
        &self,
        lease: &mut FrameLease<'_, B>,
        set: &WorkingSet,
        layers: &LayerStack,
        shader: &mut C,
        base_extent: Extent,
    ) -> Result<TargetHandle>
    where
        B: TargetBackend,
        C: CompositorShader<B::Target> + ?Sized,
    {
        let front = layers.get(0)?.target;
        let back = layers.get(1)?.target;

        let background = lease.acquire(&self.accumulator_desc(base_extent, labels::ACCUMULATOR))?;
        lease.copy(set.base, background)?;

        let resolved = lease.acquire(&self.accumulator_desc(base_extent, labels::RESOLVED))?;
        shader
            .resolve_dual(
                lease.target(front)?,
                lease.target(back)?,
                self.params.mode,
                lease.target(resolved)?,
            )
            .map_err(|e| PeelError::pass_failed(self.first_pass, e))?;

        // One blend places the resolved transparency over the background
        let output = lease.acquire(&self.accumulator_desc(base_extent, labels::ACCUMULATOR))?;
        shader
            .blend_layer(
                lease.target(background)?,
                lease.target(resolved)?,
                &self.params,
                lease.target(output)?,
            )
            .map_err(|e| PeelError::pass_failed(self.first_pass + 1, e))?;

        lease.release(background);
        lease.release(resolved);
        Ok(output)
    }
}
