//! Peeling Renderer
//!
//! - [`settings`]: per-frame configuration and blend enums
//! - [`target`]: scratch target descriptors and handles
//! - [`pool`]: target leasing with scoped release
//! - [`contract`]: renderer and compositor collaborator traits
//! - [`peeling`]: the pipeline itself
//! - [`backend`]: wgpu and CPU target backends

pub mod backend;
pub mod contract;
pub mod peeling;
pub mod pool;
pub mod settings;
pub mod target;

pub use contract::{
    BlendParams, ClearFlags, CompositorShader, DrawCall, SceneRenderer, ShaderVariant,
};
pub use peeling::{FrameOrchestrator, FrameOutcome, FrameReport, FrameState};
pub use pool::{FrameLease, PoolStats, RenderTargetPool};
pub use settings::{BlendFactor, BlendOperation, CompositeMode, PeelingAlgorithm, PeelingSettings};
pub use target::{ColorFormat, ColorSpace, Extent, RenderTargetDescriptor, TargetHandle};
