//! Painterly planet renderer for the Everybody's Cool fundraiser.
//!
//! A frame runs up to four fullscreen passes over three offscreen buffers:
//!
//! ```text
//!   scene ──▶ buffer A ──▶ structure tensor ──▶ buffer B
//!                │                                 │
//!                └──────────────┬──────────────────┘
//!                               ▼
//!                  anisotropic Kuwahara ──▶ buffer C
//!                                              │
//!                        paper grain ──▶ composite ──▶ surface
//! ```
//!
//! With stylisation disabled the scene pass draws straight to the surface.
//! [`Orchestrator`] owns the buffers, the clock and the filter parameters and
//! hands each [`PassStep`] of the [`frame_plan`] to a [`Backend`]: either
//! [`GpuBackend`] (`wgpu`, GLSL programs) or the CPU [`CpuBackend`], which
//! evaluates the same passes per pixel and needs no graphics device.

mod compile;
mod export;
mod gpu;
mod orchestrator;
mod paper;
mod plan;
pub mod reference;
mod runtime;
mod types;
mod window;

pub use compile::Program;
pub use export::{render_image, render_still, ExportRequest};
pub use gpu::{GpuBackend, GpuFrame, OffscreenTarget};
pub use orchestrator::{Backend, FrameReport, Orchestrator, RenderError, TargetChain};
pub use paper::{generate_paper, DEFAULT_PAPER_SEED, PAPER_SIZE};
pub use plan::{frame_plan, Pass, PassStep, Slot};
pub use reference::{CpuBackend, PixelBuffer};
pub use runtime::{
    BoxedTimeSource, FixedTimeSource, FrameClock, FrameScheduler, SystemTimeSource, TimeSample,
    TimeSource,
};
pub use types::{
    BackendKind, FilterParams, FilterParamsError, FrameInputs, Pointer, PreviewConfig,
    SurfaceSize, ALPHA_RANGE, KUWAHARA_SECTORS, RADIUS_RANGE, SECTOR_RANGE,
};
pub use window::run_preview;
