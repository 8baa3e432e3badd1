//! Frame Orchestrator
//!
//! Single per-frame entry point of the peeling pipeline.
//!
//! # State Machine
//!
//! ```text
//! Idle → Allocating ─┬─ disabled ─► PassThrough ──────────────┬─► Releasing → Idle
//!                    └─ enabled ──► Peeling → Compositing ────┘
//! ```
//!
//! `Releasing` is reached from every branch, including failures: once
//! allocation starts, the frame's [`FrameLease`](crate::renderer::pool::FrameLease)
//! releases every target exactly once before [`FrameOrchestrator::render`]
//! returns. A failed frame never presents a partial composite; the destination
//! receives an untouched copy of the source instead.

use crate::errors::{PeelError, Result};
use crate::renderer::backend::TargetBackend;
use crate::renderer::contract::{CompositorShader, SceneRenderer};
use crate::renderer::peeling::composite::Compositor;
use crate::renderer::peeling::layers::LayerStack;
use crate::renderer::peeling::pipeline::{FrameStrategy, PeelingPipeline};
use crate::renderer::pool::{FrameLease, RenderTargetPool};
use crate::renderer::settings::PeelingSettings;

/// Frames a recycled backend target may sit idle before it is dropped.
pub const DEFAULT_MAX_IDLE_FRAMES: u32 = 8;

/// Where the orchestrator is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameState {
    #[default]
    Idle,
    Allocating,
    PassThrough,
    Peeling,
    Compositing,
    Releasing,
}

/// How a successful frame was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameOutcome {
    /// Layers were peeled and composited.
    Composited,
    /// Peeling was disabled; the unpeeled capture was presented.
    PassThrough,
}

/// Summary of one successful frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub outcome: FrameOutcome,
    pub strategy: FrameStrategy,
    /// Capture passes drawn by the renderer.
    pub passes: u32,
    /// Targets leased during the frame, all of them released.
    pub targets_leased: u64,
}

/// Drives one peeling frame at a time over a [`RenderTargetPool`].
///
/// Owns the compositor shader for its whole lifetime. The renderer is lent
/// per frame.
pub struct FrameOrchestrator<B, C>
where
    B: TargetBackend,
    C: CompositorShader<B::Target>,
{
    pool: RenderTargetPool<B>,
    compositor: Option<C>,
    settings: PeelingSettings,
    layers: LayerStack,
    state: FrameState,
    max_idle_frames: u32,
}

impl<B, C> FrameOrchestrator<B, C>
where
    B: TargetBackend,
    C: CompositorShader<B::Target>,
{
    #[must_use]
    pub fn new(backend: B, compositor: C, settings: PeelingSettings) -> Self {
        Self {
            pool: RenderTargetPool::new(backend),
            compositor: Some(compositor),
            settings,
            layers: LayerStack::new(),
            state: FrameState::Idle,
            max_idle_frames: DEFAULT_MAX_IDLE_FRAMES,
        }
    }

    #[must_use]
    pub fn with_max_idle_frames(mut self, frames: u32) -> Self {
        self.max_idle_frames = frames;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &PeelingSettings {
        &self.settings
    }

    /// Settings for the next frame. The running frame is never affected.
    pub fn settings_mut(&mut self) -> &mut PeelingSettings {
        &mut self.settings
    }

    #[must_use]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[must_use]
    pub fn pool(&self) -> &RenderTargetPool<B> {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut RenderTargetPool<B> {
        &mut self.pool
    }

    #[must_use]
    pub fn compositor(&self) -> Option<&C> {
        self.compositor.as_ref()
    }

    /// Render one frame from `source` into `destination`.
    ///
    /// On error the destination holds an unmodified copy of `source`.
    pub fn render<R>(
        &mut self,
        renderer: &mut R,
        source: &B::Target,
        destination: &B::Target,
    ) -> Result<FrameReport>
    where
        R: SceneRenderer<B::Target> + ?Sized,
    {
        let Some(compositor) = self.compositor.as_mut() else {
            return Err(PeelError::ConfigurationInvalid(
                "orchestrator used after shutdown".into(),
            ));
        };

        // Immutable for the rest of the frame
        let settings = self.settings;
        let pipeline = PeelingPipeline::new(&settings);
        let strategy = pipeline.strategy();

        if let Err(err) = pipeline.validate().and_then(|()| {
            let slots = strategy.layer_slots(&settings);
            if self.layers.len() != slots {
                log::debug!("Resizing layer stack {} -> {slots}", self.layers.len());
                self.layers.resize(slots)?;
            }
            Ok(())
        }) {
            log::warn!("Peeling frame skipped: {err}");
            self.pool.copy_external(source, destination);
            return Err(err);
        }

        let acquired_before = self.pool.stats().acquired;
        self.state = FrameState::Allocating;

        let mut lease = self.pool.lease();
        let result = Self::execute(
            &mut lease,
            &mut self.state,
            &pipeline,
            &mut self.layers,
            compositor,
            renderer,
            source,
            destination,
        );

        self.state = FrameState::Releasing;
        let released = lease.finish();
        self.layers.clear();
        log::trace!("Released {released} target(s)");

        let targets_leased = self.pool.stats().acquired - acquired_before;
        let report = match result {
            Ok(passes) => Ok(FrameReport {
                outcome: match strategy {
                    FrameStrategy::PassThrough => FrameOutcome::PassThrough,
                    FrameStrategy::FrontToBack | FrameStrategy::DualPeeling => {
                        FrameOutcome::Composited
                    }
                },
                strategy,
                passes,
                targets_leased,
            }),
            Err(err) => {
                log::warn!("Peeling frame degraded to pass-through: {err}");
                self.pool.copy_external(source, destination);
                Err(err)
            }
        };

        self.pool.end_frame(self.max_idle_frames);
        self.state = FrameState::Idle;
        report
    }

    /// Everything between `Allocating` and `Releasing`. Returns the number of
    /// capture passes drawn.
    fn execute<R>(
        lease: &mut FrameLease<'_, B>,
        state: &mut FrameState,
        pipeline: &PeelingPipeline<'_>,
        layers: &mut LayerStack,
        compositor: &mut C,
        renderer: &mut R,
        source: &B::Target,
        destination: &B::Target,
    ) -> Result<u32>
    where
        R: SceneRenderer<B::Target> + ?Sized,
    {
        let strategy = pipeline.strategy();
        let base_extent = lease.extent_of(destination);
        let set = pipeline.allocate(lease, layers, source, base_extent)?;

        *state = match strategy {
            FrameStrategy::PassThrough => FrameState::PassThrough,
            FrameStrategy::FrontToBack | FrameStrategy::DualPeeling => FrameState::Peeling,
        };
        let passes = pipeline.run(lease, &set, layers, renderer)?;

        if strategy != FrameStrategy::PassThrough {
            *state = FrameState::Compositing;
        }
        let output = Compositor::new(pipeline.settings(), passes).composite(
            lease,
            &set,
            layers,
            compositor,
            strategy,
            base_extent,
        )?;

        lease.copy_to_external(output, destination)?;
        Ok(passes)
    }

    /// Free the compositor's long-lived resources. Idempotent; frames rendered
    /// afterwards fail with [`PeelError::ConfigurationInvalid`].
    pub fn shutdown(&mut self) {
        if let Some(mut compositor) = self.compositor.take() {
            compositor.release();
            log::debug!("Peeling compositor released");
        }
    }
}

impl<B, C> Drop for FrameOrchestrator<B, C>
where
    B: TargetBackend,
    C: CompositorShader<B::Target>,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
