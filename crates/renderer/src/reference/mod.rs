//! Reference backend that evaluates every pass on the CPU.
//!
//! It is slow but needs no adapter, which makes it the backend for tests and
//! for `render --backend cpu`.

pub mod buffer;
pub mod composite;
pub mod kuwahara;
pub mod scene;
pub mod tensor;

use anyhow::{anyhow, bail, Context, Result};
use tracing::trace;

pub use buffer::PixelBuffer;

use crate::orchestrator::{Backend, RenderError, TargetChain};
use crate::paper::generate_paper;
use crate::plan::{Pass, PassStep, Slot};
use crate::types::{FrameInputs, SurfaceSize};

/// Largest width or height the CPU backend will allocate.
pub const MAX_DIMENSION: u32 = 8192;

fn check_size(size: SurfaceSize) -> Result<()> {
    if size.width > MAX_DIMENSION || size.height > MAX_DIMENSION {
        bail!("CPU max buffer dimension is {MAX_DIMENSION}, requested surface is {size}");
    }
    Ok(())
}

pub struct CpuBackend {
    paper: PixelBuffer,
    last_frame: Option<PixelBuffer>,
}

impl CpuBackend {
    pub fn new(paper_seed: u64) -> Result<Self> {
        let paper = PixelBuffer::from_rgba8(&generate_paper(paper_seed))
            .context("paper texture has zero area")?;
        Ok(Self {
            paper,
            last_frame: None,
        })
    }

    /// The surface contents of the most recently finished frame.
    pub fn last_frame(&self) -> Option<&PixelBuffer> {
        self.last_frame.as_ref()
    }

    pub fn take_frame(&mut self) -> Option<PixelBuffer> {
        self.last_frame.take()
    }
}

fn input<'a>(
    targets: &'a TargetChain<PixelBuffer>,
    paper: &'a PixelBuffer,
    step: &PassStep,
    index: usize,
) -> Result<&'a PixelBuffer> {
    let slot = *step
        .inputs
        .get(index)
        .ok_or_else(|| anyhow!("{} pass is missing input {index}", step.pass.label()))?;
    match slot {
        Slot::Paper => Ok(paper),
        other => targets
            .get(other)
            .ok_or_else(|| anyhow!("{other:?} cannot be sampled")),
    }
}

impl Backend for CpuBackend {
    type Target = PixelBuffer;
    type Frame = PixelBuffer;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn allocate(&mut self, _slot: Slot, size: SurfaceSize) -> Result<PixelBuffer> {
        check_size(size)?;
        Ok(PixelBuffer::new(size))
    }

    fn target_size(target: &PixelBuffer) -> SurfaceSize {
        target.size()
    }

    fn resize_surface(&mut self, size: SurfaceSize) -> Result<()> {
        check_size(size)
    }

    fn begin_frame(&mut self, size: SurfaceSize) -> Result<PixelBuffer, RenderError> {
        check_size(size)?;
        Ok(PixelBuffer::new(size))
    }

    fn encode(
        &mut self,
        frame: &mut PixelBuffer,
        step: &PassStep,
        targets: &mut TargetChain<PixelBuffer>,
        inputs: &FrameInputs,
    ) -> Result<()> {
        trace!(pass = step.pass.label(), "cpu pass");
        let output = match step.pass {
            Pass::Scene => scene::render(inputs),
            Pass::Tensor => tensor::structure_tensor(input(targets, &self.paper, step, 0)?),
            Pass::Kuwahara => kuwahara::filter(
                input(targets, &self.paper, step, 0)?,
                input(targets, &self.paper, step, 1)?,
                &inputs.filter,
            ),
            Pass::Composite => composite::compose(
                input(targets, &self.paper, step, 0)?,
                input(targets, &self.paper, step, 1)?,
            ),
        };
        match step.output {
            Slot::Surface => *frame = output,
            slot => {
                let target = targets
                    .get_mut(slot)
                    .ok_or_else(|| anyhow!("{slot:?} is not writable"))?;
                *target = output;
            }
        }
        Ok(())
    }

    fn finish_frame(&mut self, frame: PixelBuffer) -> Result<(), RenderError> {
        self.last_frame = Some(frame);
        Ok(())
    }

    fn release(&mut self) {
        self.last_frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Orchestrator;
    use crate::runtime::FrameClock;
    use crate::types::{FilterParams, Pointer};

    fn mount(stylize: bool, time: f32) -> Orchestrator<CpuBackend> {
        Orchestrator::mount(
            CpuBackend::new(1).expect("backend"),
            SurfaceSize::new(32, 24).expect("size"),
            FrameClock::fixed(time),
            FilterParams::new(2, 25.0, 8).expect("params"),
            stylize,
        )
        .expect("mount")
    }

    #[test]
    fn disabled_stylisation_matches_standalone_scene() {
        let mut orchestrator = mount(false, 3.0);
        orchestrator.render_frame().expect("frame");
        let frame = orchestrator
            .backend()
            .and_then(CpuBackend::last_frame)
            .expect("frame")
            .clone();

        let standalone = scene::render(&FrameInputs {
            time: 3.0,
            frame_index: 0,
            size: SurfaceSize::new(32, 24).expect("size"),
            pointer: Pointer::default(),
            filter: FilterParams::default(),
        });
        assert_eq!(frame, standalone);
    }

    #[test]
    fn stylised_frame_fills_every_buffer() {
        let mut orchestrator = mount(true, 1.0);
        orchestrator.render_frame().expect("frame");
        let targets = orchestrator.targets().expect("targets");
        let scene = targets.get(Slot::Scene).expect("scene");
        assert!(scene.pixels().iter().any(|pixel| pixel.w > 0.0));
        let filtered = targets.get(Slot::Filtered).expect("filtered");
        assert!(filtered.pixels().iter().all(|pixel| pixel.w == 1.0));

        let frame = orchestrator
            .backend()
            .and_then(CpuBackend::last_frame)
            .expect("frame");
        assert_eq!(frame.size(), SurfaceSize::new(32, 24).expect("size"));
        // Transparent corners carry no content and stay masked out.
        assert_eq!(frame.get(0, 0).w, 0.0);
        assert!(frame.get(16, 12).w > 0.0);
    }

    #[test]
    fn resize_reallocates_cpu_buffers() {
        let mut orchestrator = mount(true, 0.0);
        orchestrator.resize(20, 10).expect("resize");
        orchestrator.render_frame().expect("frame");
        let targets = orchestrator.targets().expect("targets");
        for (_, buffer) in targets.iter() {
            assert_eq!(buffer.size(), SurfaceSize::new(20, 10).expect("size"));
        }
    }

    #[test]
    fn oversized_buffers_are_refused() {
        let mounted = Orchestrator::mount(
            CpuBackend::new(1).expect("backend"),
            SurfaceSize::new(MAX_DIMENSION + 1, 4).expect("size"),
            FrameClock::fixed(0.0),
            FilterParams::default(),
            true,
        );
        let err = mounted.err().expect("oversized mount should fail");
        assert!(format!("{err:#}").contains("max buffer dimension"), "{err:#}");

        let mut orchestrator = mount(true, 0.0);
        assert!(orchestrator.resize(4, MAX_DIMENSION + 1).is_err());
        assert_eq!(orchestrator.size(), SurfaceSize::new(32, 24).expect("size"));
        orchestrator.render_frame().expect("frame");
    }
}
