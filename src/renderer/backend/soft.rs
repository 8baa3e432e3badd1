//! CPU Reference Backend
//!
//! Software implementations of the target backend and of both collaborator
//! contracts. They run the pipeline headless with the same lease, clear and
//! blend semantics a GPU backend has, which is what the test suite relies on.
//!
//! - [`SoftBackend`]: recycles [`SoftTarget`] images through free buckets,
//!   optionally failing once a live-target budget is exceeded.
//! - [`SoftSceneRenderer`]: rasterizes constant-depth [`SoftSurface`]s with the
//!   peeling tests of every [`ShaderVariant`].
//! - [`SoftCompositor`]: per-layer blending and the dual resolve.
//!
//! Color targets quantize to 8 bits on every write, like an `Rgba8Unorm`
//! attachment; depth targets keep full `f32` precision in two channels.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec4;
use parking_lot::{RwLock, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::{DrawError, PeelError, Result};
use crate::renderer::backend::TargetBackend;
use crate::renderer::contract::{
    BlendParams, ClearFlags, CompositorShader, DrawCall, SceneRenderer, ShaderVariant,
};
use crate::renderer::settings::{BlendOperation, CompositeMode};
use crate::renderer::target::{ColorFormat, ColorSpace, Extent, RenderTargetDescriptor};

/// Depth tolerance of the peeling tests.
pub const PEEL_EPSILON: f32 = 1e-5;

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

// ─── Images ───────────────────────────────────────────────────────────────────

/// Texel storage of a [`SoftTarget`].
pub struct SoftImage {
    extent: Extent,
    format: ColorFormat,
    color: Vec<Vec4>,
    depth: Option<Vec<f32>>,
}

impl SoftImage {
    fn new(desc: &RenderTargetDescriptor) -> Self {
        let texels = desc.extent().texel_count();
        Self {
            extent: desc.extent(),
            format: desc.color_format,
            color: vec![Vec4::ZERO; texels],
            depth: (desc.depth_bits > 0).then(|| vec![1.0; texels]),
        }
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.extent.width as usize + x as usize
    }

    /// Write one texel, encoded the way the format stores it.
    #[inline]
    fn store(&mut self, index: usize, value: Vec4) {
        self.color[index] = match self.format {
            ColorFormat::Rgba8 => (value.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round() / 255.0,
            ColorFormat::Rg32Float => Vec4::new(value.x, value.y, 0.0, 0.0),
        };
    }

    fn fill(&mut self, value: Vec4) {
        for i in 0..self.color.len() {
            self.store(i, value);
        }
    }

    fn clear_depth(&mut self) {
        if let Some(depth) = &mut self.depth {
            depth.fill(1.0);
        }
    }

    /// Nearest-texel lookup of texel `(x, y)` of an image of size `extent`.
    #[inline]
    fn sample(&self, x: u32, y: u32, extent: Extent) -> Vec4 {
        let sx = (u64::from(x) * u64::from(self.extent.width) / u64::from(extent.width)) as u32;
        let sy = (u64::from(y) * u64::from(self.extent.height) / u64::from(extent.height)) as u32;
        self.color[self.index(sx, sy)]
    }
}

/// CPU render target.
///
/// Texels sit behind a lock so collaborators can write through the shared
/// borrows a [`DrawCall`] hands out, the way GPU attachments are written.
pub struct SoftTarget {
    id: u64,
    desc: RenderTargetDescriptor,
    image: RwLock<SoftImage>,
}

impl SoftTarget {
    #[must_use]
    pub fn new(desc: &RenderTargetDescriptor) -> Self {
        Self {
            id: NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed),
            desc: *desc,
            image: RwLock::new(SoftImage::new(desc)),
        }
    }

    /// Linear `Rgba8` target without depth, as handed in by a caller.
    #[must_use]
    pub fn with_extent(width: u32, height: u32) -> Self {
        Self::new(&RenderTargetDescriptor::color(
            Extent::new(width, height),
            0,
            ColorSpace::Linear,
            "External",
        ))
    }

    /// Unique identity, stable across recycling.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn descriptor(&self) -> &RenderTargetDescriptor {
        &self.desc
    }

    #[must_use]
    pub fn extent(&self) -> Extent {
        self.desc.extent()
    }

    pub fn fill(&self, color: Vec4) {
        self.image.write().fill(color);
    }

    pub fn set_pixel(&self, x: u32, y: u32, color: Vec4) {
        let mut image = self.image.write();
        let index = image.index(x, y);
        image.store(index, color);
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        let image = self.image.read();
        image.color[image.index(x, y)]
    }

    #[must_use]
    pub fn pixels(&self) -> Vec<Vec4> {
        self.image.read().color.clone()
    }

    /// Raw texel bytes, for bit-exact comparisons.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.image.read().color).to_vec()
    }

    /// Depth plane value, when the target has one.
    #[must_use]
    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        let image = self.image.read();
        let index = image.index(x, y);
        image.depth.as_ref().map(|depth| depth[index])
    }
}

impl std::fmt::Debug for SoftTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftTarget")
            .field("id", &self.id)
            .field("label", &self.desc.label)
            .field("extent", &self.desc.extent())
            .finish_non_exhaustive()
    }
}

// ─── Backend ──────────────────────────────────────────────────────────────────

/// Recycling key. Labels are ignored so any matching target can be reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct PoolKey {
    width: u32,
    height: u32,
    depth_bits: u32,
    format: ColorFormat,
    space: ColorSpace,
}

impl PoolKey {
    fn from_desc(desc: &RenderTargetDescriptor) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            depth_bits: desc.depth_bits,
            format: desc.color_format,
            space: desc.color_space,
        }
    }
}

struct IdleTarget {
    target: SoftTarget,
    idle_frames: u32,
}

/// Counters of a [`SoftBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoftBackendStats {
    pub created: u64,
    pub reused: u64,
    pub trimmed: u64,
    pub clears: u64,
    pub copies: u64,
}

/// CPU implementation of the temporary-target pool.
///
/// Recycled targets keep whatever they held, so a caller that forgets to
/// clear sees stale texels, as it would on a GPU.
#[derive(Default)]
pub struct SoftBackend {
    free: FxHashMap<PoolKey, Vec<IdleTarget>>,
    /// Maximum number of simultaneously leased targets.
    budget: Option<usize>,
    outstanding: usize,
    stats: SoftBackendStats,
    /// Acquired descriptors, kept only after [`SoftBackend::with_history`].
    history: Option<Vec<RenderTargetDescriptor>>,
}

impl SoftBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail acquisitions beyond `max_live` simultaneously leased targets.
    #[must_use]
    pub fn with_budget(max_live: usize) -> Self {
        Self {
            budget: Some(max_live),
            ..Self::default()
        }
    }

    /// Keep every acquired descriptor until [`SoftBackend::take_history`].
    #[must_use]
    pub fn with_history(mut self) -> Self {
        self.history = Some(Vec::new());
        self
    }

    #[must_use]
    pub fn stats(&self) -> &SoftBackendStats {
        &self.stats
    }

    /// Targets currently handed out.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Targets waiting in the free buckets.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Every descriptor acquired since the last call, oldest first.
    /// Empty unless built with [`SoftBackend::with_history`].
    pub fn take_history(&mut self) -> Vec<RenderTargetDescriptor> {
        self.history.as_mut().map(std::mem::take).unwrap_or_default()
    }
}

impl TargetBackend for SoftBackend {
    type Target = SoftTarget;

    fn acquire_temporary(&mut self, desc: &RenderTargetDescriptor) -> Result<SoftTarget> {
        if self.budget.is_some_and(|max| self.outstanding >= max) {
            return Err(PeelError::ResourceExhausted {
                label: desc.label,
                width: desc.width,
                height: desc.height,
            });
        }

        let recycled = self
            .free
            .get_mut(&PoolKey::from_desc(desc))
            .and_then(Vec::pop);

        let target = if let Some(idle) = recycled {
            self.stats.reused += 1;
            let mut target = idle.target;
            target.desc.label = desc.label;
            target
        } else {
            self.stats.created += 1;
            SoftTarget::new(desc)
        };

        self.outstanding += 1;
        if let Some(history) = &mut self.history {
            history.push(*desc);
        }
        Ok(target)
    }

    fn release_temporary(&mut self, target: SoftTarget) {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.free
            .entry(PoolKey::from_desc(&target.desc))
            .or_default()
            .push(IdleTarget {
                target,
                idle_frames: 0,
            });
    }

    fn clear(&mut self, target: &SoftTarget, color: Vec4, clear_depth: bool) {
        self.stats.clears += 1;
        let mut image = target.image.write();
        image.fill(color);
        if clear_depth {
            image.clear_depth();
        }
    }

    fn copy(&mut self, src: &SoftTarget, dst: &SoftTarget) {
        if std::ptr::eq(src, dst) {
            return;
        }
        self.stats.copies += 1;

        let src = src.image.read();
        let mut dst = dst.image.write();
        let extent = dst.extent;
        for y in 0..extent.height {
            for x in 0..extent.width {
                let index = dst.index(x, y);
                let value = src.sample(x, y, extent);
                dst.store(index, value);
            }
        }
    }

    fn extent(&self, target: &SoftTarget) -> Extent {
        target.extent()
    }

    fn trim(&mut self, max_idle_frames: u32) {
        let mut trimmed = 0;
        for bucket in self.free.values_mut() {
            for idle in bucket.iter_mut() {
                idle.idle_frames += 1;
            }
            let before = bucket.len();
            bucket.retain(|idle| idle.idle_frames <= max_idle_frames);
            trimmed += before - bucket.len();
        }
        self.free.retain(|_, bucket| !bucket.is_empty());
        self.stats.trimmed += trimmed as u64;
    }
}

// ─── Scene renderer ───────────────────────────────────────────────────────────

/// Axis-aligned surface at a constant depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftSurface {
    /// Depth in `[0, 1)`; smaller is nearer.
    pub depth: f32,
    /// Straight-alpha linear color.
    pub color: Vec4,
    /// Covered region in normalized coordinates: `[x0, y0, x1, y1]`.
    pub rect: [f32; 4],
}

impl SoftSurface {
    #[must_use]
    pub fn fullscreen(depth: f32, color: Vec4) -> Self {
        Self {
            depth,
            color,
            rect: [0.0, 0.0, 1.0, 1.0],
        }
    }

    #[must_use]
    pub fn with_rect(mut self, x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        self.rect = [x0, y0, x1, y1];
        self
    }

    #[inline]
    fn covers(&self, u: f32, v: f32) -> bool {
        u >= self.rect[0] && u < self.rect[2] && v >= self.rect[1] && v < self.rect[3]
    }
}

/// What a [`SoftSceneRenderer`] was asked to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub pass: u32,
    pub variant: ShaderVariant,
    /// [`SoftTarget::id`] of every color binding, in binding order.
    pub color_ids: SmallVec<[u64; 3]>,
    pub previous_depth: Option<u64>,
    pub clear: ClearFlags,
    pub blend_op_rgb: BlendOperation,
    pub blend_op_alpha: BlendOperation,
}

/// Reference renderer drawing a fixed list of surfaces.
#[derive(Debug, Clone, Default)]
pub struct SoftSceneRenderer {
    surfaces: Vec<SoftSurface>,
    fail_at_pass: Option<u32>,
    recording: bool,
    draws: Vec<DrawRecord>,
}

impl SoftSceneRenderer {
    #[must_use]
    pub fn new(surfaces: Vec<SoftSurface>) -> Self {
        Self {
            surfaces,
            fail_at_pass: None,
            recording: false,
            draws: Vec::new(),
        }
    }

    /// Keep a [`DrawRecord`] of every draw until [`SoftSceneRenderer::clear_draws`].
    #[must_use]
    pub fn recording(mut self) -> Self {
        self.recording = true;
        self
    }

    /// Report a device error when asked to draw pass `pass`.
    #[must_use]
    pub fn failing_at(mut self, pass: u32) -> Self {
        self.fail_at_pass = Some(pass);
        self
    }

    #[must_use]
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn clear_draws(&mut self) {
        self.draws.clear();
    }

    fn record(call: &DrawCall<'_, SoftTarget>) -> DrawRecord {
        DrawRecord {
            pass: call.pass,
            variant: call.variant,
            color_ids: call.color_targets.iter().map(|t| t.id()).collect(),
            previous_depth: call.previous_depth.map(SoftTarget::id),
            clear: call.clear,
            blend_op_rgb: call.blend_op_rgb,
            blend_op_alpha: call.blend_op_alpha,
        }
    }
}

#[inline]
fn premultiply(color: Vec4) -> Vec4 {
    Vec4::new(color.x * color.w, color.y * color.w, color.z * color.w, color.w)
}

#[inline]
fn unpremultiply(color: Vec4) -> Vec4 {
    if color.w <= 0.0 {
        return Vec4::ZERO;
    }
    Vec4::new(color.x / color.w, color.y / color.w, color.z / color.w, color.w)
}

impl SceneRenderer<SoftTarget> for SoftSceneRenderer {
    fn draw(&mut self, call: &DrawCall<'_, SoftTarget>) -> std::result::Result<(), DrawError> {
        if self.recording {
            self.draws.push(Self::record(call));
        }

        if self.fail_at_pass == Some(call.pass) {
            return Err(DrawError::Device(format!(
                "injected failure at pass {}",
                call.pass
            )));
        }

        let dual = matches!(
            call.variant,
            ShaderVariant::DualSetup | ShaderVariant::DualPeeled
        );
        let expected = if dual { 3 } else { 2 };
        if call.color_targets.len() != expected {
            return Err(DrawError::InvalidBinding(format!(
                "{:?} expects {expected} color targets, got {}",
                call.variant,
                call.color_targets.len()
            )));
        }
        if call.variant.is_peeling() && call.previous_depth.is_none() {
            return Err(DrawError::InvalidBinding(
                "peeling draw without previous depth".into(),
            ));
        }

        let previous = call.previous_depth.map(|t| t.image.read());
        let mut colors: SmallVec<[RwLockWriteGuard<'_, SoftImage>; 3]> =
            call.color_targets.iter().map(|t| t.image.write()).collect();
        let mut base = call.depth_target.image.write();

        if call.clear.contains(ClearFlags::COLOR) {
            for (i, image) in colors.iter_mut().enumerate() {
                image.fill(call.clear_color(i));
            }
        }
        if call.clear.contains(ClearFlags::DEPTH) {
            base.clear_depth();
        }

        let extent = colors[0].extent;
        if colors.iter().any(|c| c.extent != extent) || base.extent != extent {
            return Err(DrawError::InvalidBinding("attachment extents differ".into()));
        }
        if !dual && base.depth.is_none() {
            return Err(DrawError::InvalidBinding(
                "depth target has no depth plane".into(),
            ));
        }

        for y in 0..extent.height {
            for x in 0..extent.width {
                let index = base.index(x, y);
                let u = (x as f32 + 0.5) / extent.width as f32;
                let v = (y as f32 + 0.5) / extent.height as f32;
                let prev = previous.as_ref().map(|p| p.color[index]);

                if dual {
                    shade_dual(&self.surfaces, call, &mut colors, index, u, v, prev);
                } else {
                    shade_peel(&self.surfaces, call, &mut colors, &mut base, index, u, v, prev);
                }
            }
        }

        Ok(())
    }
}

/// Front-to-back: keep the nearest fragment behind the previous layer that
/// also passes the hardware depth test.
fn shade_peel(
    surfaces: &[SoftSurface],
    call: &DrawCall<'_, SoftTarget>,
    colors: &mut [RwLockWriteGuard<'_, SoftImage>],
    base: &mut SoftImage,
    index: usize,
    u: f32,
    v: f32,
    prev: Option<Vec4>,
) {
    let floor = match (call.variant, prev) {
        (ShaderVariant::Peeled, Some(prev)) => prev.x + PEEL_EPSILON,
        _ => f32::NEG_INFINITY,
    };
    let Some(depth_plane) = base.depth.as_mut() else {
        return;
    };
    let limit = depth_plane[index];

    let nearest = surfaces
        .iter()
        .filter(|s| s.covers(u, v) && s.depth > floor && s.depth < limit)
        .min_by(|a, b| a.depth.total_cmp(&b.depth));

    if let Some(surface) = nearest {
        depth_plane[index] = surface.depth;
        colors[0].store(index, surface.color);
        colors[1].store(index, Vec4::new(surface.depth, surface.depth, 0.0, 0.0));
    }
}

/// Dual: peel the nearest and farthest fragment strictly between the
/// previous near/far depths. Front accumulates under, back accumulates over.
fn shade_dual(
    surfaces: &[SoftSurface],
    call: &DrawCall<'_, SoftTarget>,
    colors: &mut [RwLockWriteGuard<'_, SoftImage>],
    index: usize,
    u: f32,
    v: f32,
    prev: Option<Vec4>,
) {
    let (lo, hi) = match (call.variant, prev) {
        (ShaderVariant::DualPeeled, Some(prev)) => (prev.x + PEEL_EPSILON, prev.y - PEEL_EPSILON),
        _ => (f32::NEG_INFINITY, f32::INFINITY),
    };

    let mut near: Option<&SoftSurface> = None;
    let mut far: Option<&SoftSurface> = None;
    let mut count = 0;
    for surface in surfaces
        .iter()
        .filter(|s| s.covers(u, v) && s.depth > lo && s.depth < hi)
    {
        count += 1;
        if near.is_none_or(|n| surface.depth < n.depth) {
            near = Some(surface);
        }
        if far.is_none_or(|f| surface.depth > f.depth) {
            far = Some(surface);
        }
    }

    let (Some(near), Some(far)) = (near, far) else {
        return;
    };

    let depth = colors[2].color[index];
    colors[2].store(
        index,
        Vec4::new(
            call.blend_op_rgb.apply(near.depth, depth.x),
            call.blend_op_alpha.apply(far.depth, depth.y),
            0.0,
            0.0,
        ),
    );

    let front = colors[0].color[index];
    colors[0].store(index, front + (1.0 - front.w) * premultiply(near.color));

    if count > 1 {
        let back = colors[1].color[index];
        let incoming = premultiply(far.color);
        colors[1].store(index, incoming + (1.0 - incoming.w) * back);
    }
}

// ─── Compositor ───────────────────────────────────────────────────────────────

/// Reference implementation of the compositor shader.
#[derive(Debug, Clone, Default)]
pub struct SoftCompositor {
    /// [`SoftTarget::id`] of each blended layer, in call order.
    blended: Vec<u64>,
    recording: bool,
    resolves: u32,
    releases: u32,
    calls: u32,
    fail_at_call: Option<u32>,
}

impl SoftCompositor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a device error on the `call`-th entry point invocation
    /// (0-based, counting both entry points).
    #[must_use]
    pub fn failing_at(mut self, call: u32) -> Self {
        self.fail_at_call = Some(call);
        self
    }

    /// Keep the id of every blended layer.
    #[must_use]
    pub fn recording(mut self) -> Self {
        self.recording = true;
        self
    }

    #[must_use]
    pub fn blended_layers(&self) -> &[u64] {
        &self.blended
    }

    #[must_use]
    pub fn resolve_count(&self) -> u32 {
        self.resolves
    }

    /// How many times [`CompositorShader::release`] ran.
    #[must_use]
    pub fn release_count(&self) -> u32 {
        self.releases
    }

    fn begin_call(&mut self) -> std::result::Result<(), DrawError> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_at_call == Some(call) {
            return Err(DrawError::Device(format!(
                "injected compositor failure at call {call}"
            )));
        }
        Ok(())
    }
}

impl CompositorShader<SoftTarget> for SoftCompositor {
    fn blend_layer(
        &mut self,
        background: &SoftTarget,
        layer: &SoftTarget,
        params: &BlendParams,
        output: &SoftTarget,
    ) -> std::result::Result<(), DrawError> {
        self.begin_call()?;
        if self.recording {
            self.blended.push(layer.id());
        }

        let background = background.image.read();
        let layer = layer.image.read();
        let mut output = output.image.write();
        let extent = output.extent;

        for y in 0..extent.height {
            for x in 0..extent.width {
                let dst = background.sample(x, y, extent);
                let src = layer.sample(x, y, extent);
                let value = match params.mode {
                    CompositeMode::AlphaBlend => {
                        src * params.src_factor.factor(src, dst)
                            + dst * params.dst_factor.factor(src, dst)
                    }
                    CompositeMode::Additive => dst + src,
                };
                let index = output.index(x, y);
                output.store(index, value);
            }
        }
        Ok(())
    }

    fn resolve_dual(
        &mut self,
        front: &SoftTarget,
        back: &SoftTarget,
        mode: CompositeMode,
        output: &SoftTarget,
    ) -> std::result::Result<(), DrawError> {
        self.begin_call()?;
        self.resolves += 1;

        let front = front.image.read();
        let back = back.image.read();
        let mut output = output.image.write();
        let extent = output.extent;

        for y in 0..extent.height {
            for x in 0..extent.width {
                let f = front.sample(x, y, extent);
                let b = back.sample(x, y, extent);
                let combined = match mode {
                    CompositeMode::AlphaBlend => f + (1.0 - f.w) * b,
                    CompositeMode::Additive => (f + b).min(Vec4::ONE),
                };
                let index = output.index(x, y);
                output.store(index, unpremultiply(combined));
            }
        }
        Ok(())
    }

    fn release(&mut self) {
        self.releases += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(width: u32, height: u32) -> RenderTargetDescriptor {
        RenderTargetDescriptor::color(Extent::new(width, height), 0, ColorSpace::Linear, "Test")
    }

    #[test]
    fn test_rgba8_quantizes_on_store() {
        let target = SoftTarget::new(&desc(1, 1));
        target.fill(Vec4::new(0.5, 1.5, -1.0, 1.0));
        let texel = target.pixel(0, 0);
        assert_eq!(texel.x, 128.0 / 255.0);
        assert_eq!(texel.y, 1.0);
        assert_eq!(texel.z, 0.0);
    }

    #[test]
    fn test_backend_recycles_by_shape() {
        let mut backend = SoftBackend::new();
        let a = backend.acquire_temporary(&desc(4, 4)).unwrap();
        let id = a.id();
        backend.release_temporary(a);

        let b = backend.acquire_temporary(&desc(4, 4)).unwrap();
        assert_eq!(b.id(), id);
        let c = backend.acquire_temporary(&desc(2, 2)).unwrap();
        assert_ne!(c.id(), id);
        assert_eq!(backend.stats().reused, 1);
        assert_eq!(backend.stats().created, 2);
    }

    #[test]
    fn test_backend_budget_exhausts() {
        let mut backend = SoftBackend::with_budget(1);
        let a = backend.acquire_temporary(&desc(4, 4)).unwrap();
        let err = backend.acquire_temporary(&desc(4, 4)).unwrap_err();
        assert!(matches!(err, PeelError::ResourceExhausted { .. }));

        backend.release_temporary(a);
        assert!(backend.acquire_temporary(&desc(4, 4)).is_ok());
    }

    #[test]
    fn test_trim_drops_idle_targets() {
        let mut backend = SoftBackend::new();
        let a = backend.acquire_temporary(&desc(4, 4)).unwrap();
        backend.release_temporary(a);

        backend.trim(1);
        assert_eq!(backend.idle_count(), 1);
        backend.trim(1);
        assert_eq!(backend.idle_count(), 0);
        assert_eq!(backend.stats().trimmed, 1);
    }

    #[test]
    fn test_history_is_opt_in() {
        let mut backend = SoftBackend::new();
        let a = backend.acquire_temporary(&desc(4, 4)).unwrap();
        backend.release_temporary(a);
        assert!(backend.take_history().is_empty());

        let mut backend = SoftBackend::new().with_history();
        let a = backend.acquire_temporary(&desc(4, 4)).unwrap();
        backend.release_temporary(a);
        assert_eq!(backend.take_history().len(), 1);
        assert!(backend.take_history().is_empty());
    }

    #[test]
    fn test_copy_resamples_nearest() {
        let mut backend = SoftBackend::new();
        let small = SoftTarget::new(&desc(2, 1));
        small.set_pixel(0, 0, Vec4::new(1.0, 0.0, 0.0, 1.0));
        small.set_pixel(1, 0, Vec4::new(0.0, 0.0, 1.0, 1.0));

        let large = SoftTarget::new(&desc(4, 2));
        backend.copy(&small, &large);

        assert_eq!(large.pixel(1, 1), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(large.pixel(2, 0), Vec4::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn test_resolve_front_opaque_wins() {
        let mut compositor = SoftCompositor::new();
        let front = SoftTarget::new(&desc(1, 1));
        let back = SoftTarget::new(&desc(1, 1));
        let out = SoftTarget::new(&desc(1, 1));
        front.fill(Vec4::new(1.0, 0.0, 0.0, 1.0));
        back.fill(Vec4::new(0.0, 0.0, 1.0, 1.0));

        compositor
            .resolve_dual(&front, &back, CompositeMode::AlphaBlend, &out)
            .unwrap();
        assert_eq!(out.pixel(0, 0), Vec4::new(1.0, 0.0, 0.0, 1.0));

        compositor
            .resolve_dual(&front, &back, CompositeMode::Additive, &out)
            .unwrap();
        assert_eq!(out.pixel(0, 0), Vec4::new(1.0, 0.0, 1.0, 1.0));
    }
}
