#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod renderer;

pub use errors::{DrawError, PeelError};
pub use renderer::backend::{
    SoftBackend, SoftCompositor, SoftSceneRenderer, SoftSurface, SoftTarget, TargetBackend,
    WgpuTarget, WgpuTargetBackend,
};
pub use renderer::{
    FrameOrchestrator, FrameOutcome, FrameReport, PeelingAlgorithm, PeelingSettings,
    RenderTargetPool,
};
