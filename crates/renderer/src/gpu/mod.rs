//! wgpu backend for the pass chain.
//!
//! - `context` owns the instance, device and optional window surface.
//! - `pipeline` builds one render pipeline per program and target format.
//! - `targets` wraps textures for buffers A/B/C, the paper grain, the
//!   confetti overlay and the headless export target.
//! - `uniforms` mirrors the GLSL `PassParams` block.
//! - `state` implements [`Backend`](crate::orchestrator::Backend) on top of them.

mod context;
mod pipeline;
mod state;
mod targets;
mod uniforms;

pub use state::{GpuBackend, GpuFrame};
pub use targets::OffscreenTarget;
