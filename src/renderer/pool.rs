//! Render Target Pool
//!
//! Leases scratch render targets from a [`TargetBackend`] and tracks every
//! live lease so nothing escapes the frame that acquired it.
//!
//! # Design
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │              RenderTargetPool<B>                    │
//! │                                                    │
//! │  live: SlotMap<TargetHandle, LiveTarget>           │
//! │  stats: PoolStats                                  │
//! │                                                    │
//! │  acquire(desc) → Handle   (Allocating / Peeling)   │
//! │  target(Handle) → &T      (collaborator calls)     │
//! │  release(Handle)          (idempotent)             │
//! │  end_frame()              (trim idle backend RTs)  │
//! └────────────────────────────────────────────────────┘
//!            ▲
//!            │ scoped by
//! ┌──────────┴─────────┐
//! │   FrameLease<'p>   │  releases everything it acquired on finish/drop
//! └────────────────────┘
//! ```
//!
//! Handles are generational: a released handle never aliases a target leased
//! later, and releasing it again is a no-op.

use glam::Vec4;
use rustc_hash::FxHashMap;
use slotmap::{Key, SlotMap};
use smallvec::SmallVec;

use crate::errors::{PeelError, Result};
use crate::renderer::backend::TargetBackend;
use crate::renderer::target::{Extent, RenderTargetDescriptor, TargetHandle};

// ─── Statistics ───────────────────────────────────────────────────────────────

/// Lease bookkeeping, cumulative since the last [`RenderTargetPool::reset_stats`].
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub acquired: u64,
    pub released: u64,
    pub peak_live: usize,
    per_label: FxHashMap<&'static str, u64>,
}

impl PoolStats {
    /// Number of acquisitions whose descriptor carried `label`.
    #[must_use]
    pub fn acquired_with_label(&self, label: &str) -> u64 {
        self.per_label.get(label).copied().unwrap_or(0)
    }
}

struct LiveTarget<T> {
    target: T,
    desc: RenderTargetDescriptor,
}

// ─── Pool ─────────────────────────────────────────────────────────────────────

/// Pool of scratch render targets for the rendering thread.
///
/// The pool is not reentrant: one frame at a time leases from it, which the
/// `&mut self` receivers enforce statically.
pub struct RenderTargetPool<B: TargetBackend> {
    backend: B,
    live: SlotMap<TargetHandle, LiveTarget<B::Target>>,
    stats: PoolStats,
}

impl<B: TargetBackend> RenderTargetPool<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            live: SlotMap::with_key(),
            stats: PoolStats::default(),
        }
    }

    /// Lease a target matching `desc`. Contents are undefined.
    pub fn acquire(&mut self, desc: &RenderTargetDescriptor) -> Result<TargetHandle> {
        let target = self.backend.acquire_temporary(desc).inspect_err(|err| {
            log::warn!("RenderTargetPool: {err}");
        })?;

        let handle = self.live.insert(LiveTarget {
            target,
            desc: *desc,
        });

        self.stats.acquired += 1;
        *self.stats.per_label.entry(desc.label).or_default() += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.live.len());

        log::trace!(
            "Acquired '{}' {}x{} as {handle:?}",
            desc.label,
            desc.width,
            desc.height
        );
        Ok(handle)
    }

    /// Return a target to the backend.
    ///
    /// Null and already-released handles are ignored, so cleanup paths can
    /// release unconditionally.
    pub fn release(&mut self, handle: TargetHandle) {
        if handle.is_null() {
            return;
        }
        if let Some(live) = self.live.remove(handle) {
            self.stats.released += 1;
            self.backend.release_temporary(live.target);
        }
    }

    /// Explicitly clear a leased target.
    pub fn clear(&mut self, handle: TargetHandle, color: Vec4, clear_depth: bool) -> Result<()> {
        let live = self.live.get(handle).ok_or(PeelError::StaleTarget(handle))?;
        self.backend.clear(&live.target, color, clear_depth);
        Ok(())
    }

    /// Borrow the backend target behind a live handle.
    pub fn target(&self, handle: TargetHandle) -> Result<&B::Target> {
        self.live
            .get(handle)
            .map(|live| &live.target)
            .ok_or(PeelError::StaleTarget(handle))
    }

    /// Descriptor a live handle was acquired with.
    pub fn descriptor(&self, handle: TargetHandle) -> Result<&RenderTargetDescriptor> {
        self.live
            .get(handle)
            .map(|live| &live.desc)
            .ok_or(PeelError::StaleTarget(handle))
    }

    /// Blit between two leased targets.
    pub fn copy(&mut self, src: TargetHandle, dst: TargetHandle) -> Result<()> {
        let src = self.live.get(src).ok_or(PeelError::StaleTarget(src))?;
        let dst = self.live.get(dst).ok_or(PeelError::StaleTarget(dst))?;
        self.backend.copy(&src.target, &dst.target);
        Ok(())
    }

    /// Blit a leased target into a target the pool does not own.
    pub fn copy_to_external(&mut self, src: TargetHandle, dst: &B::Target) -> Result<()> {
        let src = self.live.get(src).ok_or(PeelError::StaleTarget(src))?;
        self.backend.copy(&src.target, dst);
        Ok(())
    }

    /// Blit a target the pool does not own into a leased target.
    pub fn copy_from_external(&mut self, src: &B::Target, dst: TargetHandle) -> Result<()> {
        let dst = self.live.get(dst).ok_or(PeelError::StaleTarget(dst))?;
        self.backend.copy(src, &dst.target);
        Ok(())
    }

    /// Blit between two targets the pool does not own.
    pub fn copy_external(&mut self, src: &B::Target, dst: &B::Target) {
        self.backend.copy(src, dst);
    }

    #[must_use]
    pub fn extent_of(&self, target: &B::Target) -> Extent {
        self.backend.extent(target)
    }

    // ── Frame boundary ─────────────────────────────────────────────────────

    /// Let the backend drop recycled targets idle for more than
    /// `max_idle_frames` frames.
    ///
    /// Live leases at this point are a bookkeeping bug; they are reported and
    /// left untouched.
    pub fn end_frame(&mut self, max_idle_frames: u32) {
        if !self.live.is_empty() {
            log::error!(
                "RenderTargetPool: {} target(s) still leased at frame end",
                self.live.len()
            );
        }
        self.backend.trim(max_idle_frames);
    }

    /// Number of targets currently leased.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = PoolStats::default();
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Start a scoped lease. See [`FrameLease`].
    pub fn lease(&mut self) -> FrameLease<'_, B> {
        FrameLease {
            pool: self,
            handles: SmallVec::new(),
        }
    }
}

// ─── Scoped lease ─────────────────────────────────────────────────────────────

/// Scoped acquisition over a [`RenderTargetPool`].
///
/// Every handle acquired through the lease is released exactly once: either
/// early through [`FrameLease::release`], or when the lease is finished or
/// dropped. Dropping covers `?` early returns and unwinding.
pub struct FrameLease<'p, B: TargetBackend> {
    pool: &'p mut RenderTargetPool<B>,
    handles: SmallVec<[TargetHandle; 16]>,
}

impl<B: TargetBackend> FrameLease<'_, B> {
    pub fn acquire(&mut self, desc: &RenderTargetDescriptor) -> Result<TargetHandle> {
        let handle = self.pool.acquire(desc)?;
        self.handles.push(handle);
        Ok(handle)
    }

    /// Release one handle before the end of the scope.
    pub fn release(&mut self, handle: TargetHandle) {
        if let Some(pos) = self.handles.iter().position(|&h| h == handle) {
            self.handles.swap_remove(pos);
            self.pool.release(handle);
        }
    }

    /// Release everything still held and end the scope.
    ///
    /// Returns the number of targets released here.
    pub fn finish(mut self) -> usize {
        self.release_all()
    }

    fn release_all(&mut self) -> usize {
        let count = self.handles.len();
        for handle in self.handles.drain(..) {
            self.pool.release(handle);
        }
        count
    }

    /// Number of targets the lease currently holds.
    #[must_use]
    pub fn held(&self) -> usize {
        self.handles.len()
    }

    pub fn target(&self, handle: TargetHandle) -> Result<&B::Target> {
        self.pool.target(handle)
    }

    pub fn clear(&mut self, handle: TargetHandle, color: Vec4, clear_depth: bool) -> Result<()> {
        self.pool.clear(handle, color, clear_depth)
    }

    pub fn copy(&mut self, src: TargetHandle, dst: TargetHandle) -> Result<()> {
        self.pool.copy(src, dst)
    }

    pub fn copy_to_external(&mut self, src: TargetHandle, dst: &B::Target) -> Result<()> {
        self.pool.copy_to_external(src, dst)
    }

    pub fn copy_from_external(&mut self, src: &B::Target, dst: TargetHandle) -> Result<()> {
        self.pool.copy_from_external(src, dst)
    }

    #[must_use]
    pub fn extent_of(&self, target: &B::Target) -> Extent {
        self.pool.extent_of(target)
    }
}

impl<B: TargetBackend> Drop for FrameLease<'_, B> {
    fn drop(&mut self) {
        let leaked = self.release_all();
        if leaked > 0 {
            log::debug!("FrameLease dropped early, released {leaked} target(s)");
        }
    }
}
