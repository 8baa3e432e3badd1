//! Peeling Pipeline Tests
//!
//! Tests for:
//! - Settings validation and strategy selection
//! - Working-set allocation per strategy
//! - Front-to-back capture: one surface per layer, nearest first
//! - Depth ping-pong: each pass reads what the previous pass wrote
//! - Dual capture: front/back accumulation and near/far depth channels
//! - Settings serialization defaults

use glam::Vec4;

use depth_peel::errors::PeelError;
use depth_peel::renderer::contract::{ClearFlags, ShaderVariant};
use depth_peel::renderer::peeling::pipeline::{DUAL_DEPTH, FAR_DEPTH};
use depth_peel::renderer::peeling::{FrameStrategy, LayerRole, LayerStack, PeelingPipeline};
use depth_peel::renderer::settings::{BlendFactor, BlendOperation, CompositeMode};
use depth_peel::renderer::target::Extent;
use depth_peel::{
    PeelingAlgorithm, PeelingSettings, RenderTargetPool, SoftBackend, SoftSceneRenderer,
    SoftSurface, SoftTarget,
};

const EXTENT: Extent = Extent::new(4, 4);
const EPSILON: f32 = 1e-5;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn quantized(color: Vec4) -> Vec4 {
    (color * 255.0).round() / 255.0
}

fn surfaces() -> Vec<SoftSurface> {
    vec![
        SoftSurface::fullscreen(0.7, Vec4::new(0.0, 0.0, 1.0, 0.5)),
        SoftSurface::fullscreen(0.1, Vec4::new(1.0, 0.0, 0.0, 0.5)),
        SoftSurface::fullscreen(0.4, Vec4::new(0.0, 1.0, 0.0, 0.5)),
    ]
}

fn settings(algorithm: PeelingAlgorithm, layer_count: u32) -> PeelingSettings {
    PeelingSettings {
        algorithm,
        layer_count,
        ..Default::default()
    }
}

// ============================================================================
// Validation & Strategy
// ============================================================================

#[test]
fn validate_rejects_out_of_range_settings() {
    for layer_count in [0, 51] {
        let s = settings(PeelingAlgorithm::FrontToBack, layer_count);
        assert!(matches!(
            PeelingPipeline::new(&s).validate(),
            Err(PeelError::ConfigurationInvalid(_))
        ));
    }

    let s = PeelingSettings {
        capture_lod: 5,
        ..Default::default()
    };
    assert!(PeelingPipeline::new(&s).validate().is_err());

    let s = settings(PeelingAlgorithm::DualPeeling, 50);
    assert!(PeelingPipeline::new(&s).validate().is_ok());
}

#[test]
fn strategy_follows_enabled_flag() {
    let mut s = settings(PeelingAlgorithm::DualPeeling, 6);
    assert_eq!(FrameStrategy::select(&s), FrameStrategy::DualPeeling);
    assert_eq!(FrameStrategy::DualPeeling.layer_slots(&s), 2);
    assert_eq!(FrameStrategy::DualPeeling.capture_passes(&s), 6);

    s.enabled = false;
    assert_eq!(FrameStrategy::select(&s), FrameStrategy::PassThrough);
    assert_eq!(FrameStrategy::PassThrough.layer_slots(&s), 1);
    assert_eq!(FrameStrategy::PassThrough.capture_passes(&s), 1);
}

// ============================================================================
// Allocation
// ============================================================================

#[test]
fn allocate_leases_working_set() {
    let s = settings(PeelingAlgorithm::FrontToBack, 5);
    let pipeline = PeelingPipeline::new(&s);
    let mut pool = RenderTargetPool::new(SoftBackend::new());
    let mut layers = LayerStack::new();
    layers.resize(5).unwrap();
    let source = SoftTarget::with_extent(EXTENT.width, EXTENT.height);
    source.fill(Vec4::new(0.2, 0.4, 0.6, 1.0));

    {
        let mut lease = pool.lease();
        let set = pipeline.allocate(&mut lease, &mut layers, &source, EXTENT).unwrap();

        // base + 2 depth + 5 layers
        assert_eq!(lease.held(), 8);
        assert_eq!(set.capture, EXTENT);
        assert_ne!(set.depth.write(1), set.depth.read(1));
        assert!(layers.iter().all(|layer| layer.role == LayerRole::Peeled));

        let base = lease.target(set.base).unwrap();
        assert_eq!(base.pixel(0, 0), source.pixel(0, 0));
        assert!(base.depth_at(0, 0).is_some());
    }
    assert_eq!(pool.live_count(), 0);
}

#[test]
fn allocate_dual_uses_two_accumulators() {
    let s = settings(PeelingAlgorithm::DualPeeling, 9);
    let pipeline = PeelingPipeline::new(&s);
    let mut pool = RenderTargetPool::new(SoftBackend::new());
    let mut layers = LayerStack::new();
    layers.resize(2).unwrap();
    let source = SoftTarget::with_extent(EXTENT.width, EXTENT.height);

    let mut lease = pool.lease();
    pipeline.allocate(&mut lease, &mut layers, &source, EXTENT).unwrap();

    assert_eq!(lease.held(), 5);
    assert_eq!(layers.get(0).unwrap().role, LayerRole::FrontAccumulator);
    assert_eq!(layers.get(1).unwrap().role, LayerRole::BackAccumulator);
}

#[test]
fn allocate_rejects_undersized_arena() {
    let s = settings(PeelingAlgorithm::FrontToBack, 4);
    let pipeline = PeelingPipeline::new(&s);
    let mut pool = RenderTargetPool::new(SoftBackend::new());
    let mut layers = LayerStack::new();
    layers.resize(2).unwrap();
    let source = SoftTarget::with_extent(EXTENT.width, EXTENT.height);

    {
        let mut lease = pool.lease();
        let err = pipeline
            .allocate(&mut lease, &mut layers, &source, EXTENT)
            .unwrap_err();
        assert!(matches!(err, PeelError::ConfigurationInvalid(_)));
    }
    assert_eq!(pool.live_count(), 0);
}

// ============================================================================
// Front-to-Back Capture
// ============================================================================

#[test]
fn front_to_back_captures_one_surface_per_layer() {
    let s = settings(PeelingAlgorithm::FrontToBack, 4);
    let pipeline = PeelingPipeline::new(&s);
    let mut pool = RenderTargetPool::new(SoftBackend::new());
    let mut layers = LayerStack::new();
    layers.resize(4).unwrap();
    let source = SoftTarget::with_extent(EXTENT.width, EXTENT.height);
    let mut renderer = SoftSceneRenderer::new(surfaces());

    let mut lease = pool.lease();
    let set = pipeline.allocate(&mut lease, &mut layers, &source, EXTENT).unwrap();
    let passes = pipeline.run(&mut lease, &set, &layers, &mut renderer).unwrap();
    assert_eq!(passes, 4);

    let expected = [
        Vec4::new(1.0, 0.0, 0.0, 0.5),
        Vec4::new(0.0, 1.0, 0.0, 0.5),
        Vec4::new(0.0, 0.0, 1.0, 0.5),
        Vec4::ZERO,
    ];
    for (i, color) in expected.iter().enumerate() {
        let layer = lease.target(layers.get(i as u32).unwrap().target).unwrap();
        assert_eq!(layer.pixel(1, 2), quantized(*color), "layer {i}");
    }
}

#[test]
fn front_to_back_pass_bindings() {
    let s = settings(PeelingAlgorithm::FrontToBack, 4);
    let pipeline = PeelingPipeline::new(&s);
    let mut pool = RenderTargetPool::new(SoftBackend::new());
    let mut layers = LayerStack::new();
    layers.resize(4).unwrap();
    let source = SoftTarget::with_extent(EXTENT.width, EXTENT.height);
    let mut renderer = SoftSceneRenderer::new(surfaces()).recording();

    let mut lease = pool.lease();
    let set = pipeline.allocate(&mut lease, &mut layers, &source, EXTENT).unwrap();
    pipeline.run(&mut lease, &set, &layers, &mut renderer).unwrap();

    let draws = renderer.draws();
    assert_eq!(draws[0].variant, ShaderVariant::Unpeeled);
    assert_eq!(draws[0].clear, ClearFlags::COLOR_DEPTH);
    assert!(draws[0].previous_depth.is_none());

    for i in 1..draws.len() {
        let draw = &draws[i];
        assert_eq!(draw.variant, ShaderVariant::Peeled);
        assert_eq!(draw.clear, ClearFlags::DEPTH);
        // Reads what the previous pass wrote, never its own output
        assert_eq!(draw.previous_depth, Some(draws[i - 1].color_ids[1]));
        assert_ne!(draw.previous_depth, Some(draw.color_ids[1]));
        if i >= 2 {
            assert_eq!(draw.color_ids[1], draws[i - 2].color_ids[1]);
        }
    }
}

#[test]
fn front_to_back_depth_holds_last_peeled_surface() {
    let s = settings(PeelingAlgorithm::FrontToBack, 2);
    let pipeline = PeelingPipeline::new(&s);
    let mut pool = RenderTargetPool::new(SoftBackend::new());
    let mut layers = LayerStack::new();
    layers.resize(2).unwrap();
    let source = SoftTarget::with_extent(EXTENT.width, EXTENT.height);
    let mut renderer = SoftSceneRenderer::new(surfaces());

    let mut lease = pool.lease();
    let set = pipeline.allocate(&mut lease, &mut layers, &source, EXTENT).unwrap();
    pipeline.run(&mut lease, &set, &layers, &mut renderer).unwrap();

    let first = lease.target(set.depth.write(0)).unwrap().pixel(0, 0);
    let second = lease.target(set.depth.write(1)).unwrap().pixel(0, 0);
    assert!(approx(first.x, 0.1));
    assert!(approx(second.x, 0.4));
}

#[test]
fn empty_scene_leaves_far_depth() {
    let s = settings(PeelingAlgorithm::FrontToBack, 2);
    let pipeline = PeelingPipeline::new(&s);
    let mut pool = RenderTargetPool::new(SoftBackend::new());
    let mut layers = LayerStack::new();
    layers.resize(2).unwrap();
    let source = SoftTarget::with_extent(EXTENT.width, EXTENT.height);
    let mut renderer = SoftSceneRenderer::new(Vec::new());

    let mut lease = pool.lease();
    let set = pipeline.allocate(&mut lease, &mut layers, &source, EXTENT).unwrap();
    pipeline.run(&mut lease, &set, &layers, &mut renderer).unwrap();

    let depth = lease.target(set.depth.write(1)).unwrap().pixel(3, 3);
    assert!(approx(depth.x, FAR_DEPTH.x));
    let layer = lease.target(layers.get(1).unwrap().target).unwrap();
    assert_eq!(layer.pixel(3, 3), Vec4::ZERO);
}

// ============================================================================
// Dual Capture
// ============================================================================

#[test]
fn dual_setup_splits_nearest_and_farthest() {
    let s = settings(PeelingAlgorithm::DualPeeling, 1);
    let pipeline = PeelingPipeline::new(&s);
    let mut pool = RenderTargetPool::new(SoftBackend::new());
    let mut layers = LayerStack::new();
    layers.resize(2).unwrap();
    let source = SoftTarget::with_extent(EXTENT.width, EXTENT.height);
    let mut renderer = SoftSceneRenderer::new(surfaces());

    let mut lease = pool.lease();
    let set = pipeline.allocate(&mut lease, &mut layers, &source, EXTENT).unwrap();
    pipeline.run(&mut lease, &set, &layers, &mut renderer).unwrap();

    // Premultiplied nearest (red) and farthest (blue)
    let front = lease.target(layers.get(0).unwrap().target).unwrap().pixel(0, 0);
    let back = lease.target(layers.get(1).unwrap().target).unwrap().pixel(0, 0);
    assert_eq!(front, quantized(Vec4::new(0.5, 0.0, 0.0, 0.5)));
    assert_eq!(back, quantized(Vec4::new(0.0, 0.0, 0.5, 0.5)));

    let depth = lease.target(set.depth.write(0)).unwrap().pixel(0, 0);
    assert!(approx(depth.x, 0.1));
    assert!(approx(depth.y, 0.7));
}

#[test]
fn dual_peel_pass_takes_the_middle_surface() {
    let s = settings(PeelingAlgorithm::DualPeeling, 3);
    let pipeline = PeelingPipeline::new(&s);
    let mut pool = RenderTargetPool::new(SoftBackend::new());
    let mut layers = LayerStack::new();
    layers.resize(2).unwrap();
    let source = SoftTarget::with_extent(EXTENT.width, EXTENT.height);
    let mut renderer = SoftSceneRenderer::new(surfaces()).recording();

    let mut lease = pool.lease();
    let set = pipeline.allocate(&mut lease, &mut layers, &source, EXTENT).unwrap();
    pipeline.run(&mut lease, &set, &layers, &mut renderer).unwrap();

    // Pass 1 peels green under red; pass 2 finds nothing left
    let front = lease.target(layers.get(0).unwrap().target).unwrap().pixel(2, 1);
    assert!(front.y > 0.2);
    assert!(front.w > 0.74 && front.w < 0.76, "front alpha {}", front.w);

    let last = lease.target(set.depth.write(2)).unwrap().pixel(0, 0);
    assert!(approx(last.x, DUAL_DEPTH.x));
    assert!(approx(last.y, DUAL_DEPTH.y));

    let draws = renderer.draws();
    assert_eq!(draws[1].blend_op_rgb, BlendOperation::Min);
    assert_eq!(draws[1].blend_op_alpha, BlendOperation::Max);
}

// ============================================================================
// Settings Serialization
// ============================================================================

#[test]
fn settings_deserialize_with_defaults() {
    let s: PeelingSettings =
        serde_json::from_str(r#"{ "algorithm": "DualPeeling", "layer_count": 8 }"#).unwrap();

    assert_eq!(s.algorithm, PeelingAlgorithm::DualPeeling);
    assert_eq!(s.layer_count, 8);
    assert_eq!(s.composite_mode, CompositeMode::AlphaBlend);
    assert_eq!(s.src_factor, BlendFactor::SrcAlpha);
    assert_eq!(s.dst_factor, BlendFactor::OneMinusSrcAlpha);
    assert!(s.enabled);
}

#[test]
fn settings_roundtrip_json() {
    let s = PeelingSettings {
        composite_mode: CompositeMode::Additive,
        capture_lod: 2,
        enabled: false,
        ..Default::default()
    };
    let json = serde_json::to_string(&s).unwrap();
    let back: PeelingSettings = serde_json::from_str(&json).unwrap();
    assert_eq!(s, back);
}
