//! Depth Peeling
//!
//! Provides:
//! - LayerStack / DepthPingPong: per-frame layer arena and depth buffer pair
//! - PeelingPipeline: capture passes for both peeling algorithms
//! - Compositor: back-to-front layer blending and dual resolve
//! - FrameOrchestrator: per-frame entry point and release guarantee

pub mod composite;
pub mod frame;
pub mod layers;
pub mod pipeline;

pub use composite::Compositor;
pub use frame::{FrameOrchestrator, FrameOutcome, FrameReport, FrameState};
pub use layers::{DepthPingPong, Layer, LayerRole, LayerStack};
pub use pipeline::{FrameStrategy, PeelingPipeline, WorkingSet};
