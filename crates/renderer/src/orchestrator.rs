//! Frame orchestration shared by the GPU and CPU backends.
//!
//! The orchestrator owns every offscreen buffer, the frame clock and the
//! filter parameters. Backends only know how to allocate a buffer and how to
//! execute one [`PassStep`]; the order of passes comes from [`frame_plan`].

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::plan::{frame_plan, PassStep, Slot};
use crate::runtime::{FrameClock, TimeSample};
use crate::types::{FilterParams, FrameInputs, Pointer, SurfaceSize};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer has been torn down")]
    TornDown,
    #[error("surface was lost or outdated and has been reconfigured")]
    SurfaceLost,
    #[error("timed out acquiring the next surface texture")]
    SurfaceTimeout,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Execution engine for the passes of one frame.
pub trait Backend {
    /// One offscreen colour buffer.
    type Target;
    /// Per-frame state, e.g. an acquired swapchain texture and command encoder.
    type Frame;

    fn name(&self) -> &'static str;

    /// Allocates the buffer backing `slot` at `size`.
    fn allocate(&mut self, slot: Slot, size: SurfaceSize) -> Result<Self::Target>;

    /// Size of a previously allocated buffer.
    fn target_size(target: &Self::Target) -> SurfaceSize;

    /// Reconfigures the presentation surface.
    fn resize_surface(&mut self, size: SurfaceSize) -> Result<()>;

    fn begin_frame(&mut self, size: SurfaceSize) -> Result<Self::Frame, RenderError>;

    fn encode(
        &mut self,
        frame: &mut Self::Frame,
        step: &PassStep,
        targets: &mut TargetChain<Self::Target>,
        inputs: &FrameInputs,
    ) -> Result<()>;

    fn finish_frame(&mut self, frame: Self::Frame) -> Result<(), RenderError>;

    /// Releases programs, textures and the surface. Called at most once.
    fn release(&mut self);
}

/// Offscreen buffers A, B and C, always allocated at the same size.
#[derive(Debug)]
pub struct TargetChain<T> {
    size: SurfaceSize,
    scene: T,
    tensor: T,
    filtered: T,
}

impl<T> TargetChain<T> {
    fn allocate<B>(backend: &mut B, size: SurfaceSize) -> Result<Self>
    where
        B: Backend<Target = T>,
    {
        Ok(Self {
            size,
            scene: backend.allocate(Slot::Scene, size)?,
            tensor: backend.allocate(Slot::Tensor, size)?,
            filtered: backend.allocate(Slot::Filtered, size)?,
        })
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn get(&self, slot: Slot) -> Option<&T> {
        match slot {
            Slot::Scene => Some(&self.scene),
            Slot::Tensor => Some(&self.tensor),
            Slot::Filtered => Some(&self.filtered),
            Slot::Paper | Slot::Surface => None,
        }
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut T> {
        match slot {
            Slot::Scene => Some(&mut self.scene),
            Slot::Tensor => Some(&mut self.tensor),
            Slot::Filtered => Some(&mut self.filtered),
            Slot::Paper | Slot::Surface => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &T)> {
        [
            (Slot::Scene, &self.scene),
            (Slot::Tensor, &self.tensor),
            (Slot::Filtered, &self.filtered),
        ]
        .into_iter()
    }
}

/// Summary of one rendered frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub sample: TimeSample,
    pub passes: usize,
    pub stylized: bool,
}

/// Drives the pass chain once per frame and owns all pipeline resources.
pub struct Orchestrator<B: Backend> {
    backend: Option<B>,
    targets: Option<TargetChain<B::Target>>,
    size: SurfaceSize,
    clock: FrameClock,
    filter: FilterParams,
    stylize: bool,
    pointer: Pointer,
}

impl<B: Backend> Orchestrator<B> {
    /// Allocates the offscreen chain for `size`. A failing allocation releases
    /// the backend before the error is returned.
    pub fn mount(
        mut backend: B,
        size: SurfaceSize,
        clock: FrameClock,
        filter: FilterParams,
        stylize: bool,
    ) -> Result<Self> {
        let targets = match TargetChain::allocate(&mut backend, size) {
            Ok(targets) => targets,
            Err(err) => {
                backend.release();
                return Err(err.context("failed to allocate offscreen buffers"));
            }
        };
        info!(
            backend = backend.name(),
            %size,
            stylize,
            radius = filter.radius(),
            alpha = filter.alpha(),
            "render pipeline mounted"
        );
        Ok(Self {
            backend: Some(backend),
            targets: Some(targets),
            size,
            clock,
            filter,
            stylize,
            pointer: Pointer::default(),
        })
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn stylize(&self) -> bool {
        self.stylize
    }

    pub fn set_stylize(&mut self, stylize: bool) {
        if self.stylize != stylize {
            debug!(stylize, "painterly stylisation toggled");
        }
        self.stylize = stylize;
    }

    pub fn filter(&self) -> FilterParams {
        self.filter
    }

    pub fn set_pointer(&mut self, pointer: Pointer) {
        self.pointer = pointer;
    }

    pub fn targets(&self) -> Option<&TargetChain<B::Target>> {
        self.targets.as_ref()
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.backend.as_mut()
    }

    pub fn is_torn_down(&self) -> bool {
        self.backend.is_none()
    }

    /// Applies a new surface size. Zero-area sizes are ignored and the last
    /// valid size is kept. Returns whether the buffers were reallocated.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool, RenderError> {
        let Some(size) = SurfaceSize::new(width, height) else {
            debug!(width, height, "ignoring zero-area resize");
            return Ok(false);
        };
        let backend = self.backend.as_mut().ok_or(RenderError::TornDown)?;
        if size == self.size && self.targets.is_some() {
            return Ok(false);
        }

        backend.resize_surface(size)?;
        // Free the stale chain before allocating the new one.
        self.targets = None;
        self.targets = Some(TargetChain::allocate(backend, size)?);
        self.size = size;
        debug!(%size, "offscreen buffers reallocated");
        Ok(true)
    }

    /// Renders one frame: samples the clock once, then runs every pass of the plan in order.
    pub fn render_frame(&mut self) -> Result<FrameReport, RenderError> {
        let backend = self.backend.as_mut().ok_or(RenderError::TornDown)?;
        if self.targets.as_ref().map(TargetChain::size) != Some(self.size) {
            self.targets = None;
            self.targets = Some(TargetChain::allocate(backend, self.size)?);
        }
        let Some(targets) = self.targets.as_mut() else {
            return Err(RenderError::Backend(anyhow::anyhow!(
                "offscreen buffers are missing"
            )));
        };

        let sample = self.clock.tick();
        let inputs = FrameInputs {
            time: sample.seconds,
            frame_index: sample.frame_index,
            size: self.size,
            pointer: self.pointer,
            filter: self.filter,
        };
        let plan = frame_plan(self.stylize);

        let mut frame = match backend.begin_frame(self.size) {
            Ok(frame) => frame,
            Err(RenderError::SurfaceLost) => {
                warn!(size = %self.size, "surface lost; reconfiguring");
                backend.resize_surface(self.size)?;
                return Err(RenderError::SurfaceLost);
            }
            Err(err) => return Err(err),
        };
        for step in plan {
            backend.encode(&mut frame, step, targets, &inputs)?;
        }
        backend.finish_frame(frame)?;

        Ok(FrameReport {
            sample,
            passes: plan.len(),
            stylized: self.stylize,
        })
    }

    /// Releases every resource. Safe to call repeatedly; later frames fail with
    /// [`RenderError::TornDown`].
    pub fn teardown(&mut self) {
        self.targets = None;
        if let Some(mut backend) = self.backend.take() {
            backend.release();
            info!(
                backend = backend.name(),
                frames = self.clock.frames_rendered(),
                "render pipeline torn down"
            );
        }
    }
}

impl<B: Backend> Drop for Orchestrator<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Pass;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Allocate(Slot, SurfaceSize),
        ResizeSurface(SurfaceSize),
        Begin,
        Encode(Pass, Slot, SurfaceSize),
        Finish,
        Release,
    }

    #[derive(Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<Event>>>,
        lose_next_frame: bool,
        fail_allocations: bool,
    }

    impl Backend for Recorder {
        type Target = SurfaceSize;
        type Frame = ();

        fn name(&self) -> &'static str {
            "recorder"
        }

        fn allocate(&mut self, slot: Slot, size: SurfaceSize) -> Result<SurfaceSize> {
            if self.fail_allocations {
                anyhow::bail!("out of memory");
            }
            self.events.borrow_mut().push(Event::Allocate(slot, size));
            Ok(size)
        }

        fn target_size(target: &SurfaceSize) -> SurfaceSize {
            *target
        }

        fn resize_surface(&mut self, size: SurfaceSize) -> Result<()> {
            self.events.borrow_mut().push(Event::ResizeSurface(size));
            Ok(())
        }

        fn begin_frame(&mut self, _size: SurfaceSize) -> Result<(), RenderError> {
            if std::mem::take(&mut self.lose_next_frame) {
                return Err(RenderError::SurfaceLost);
            }
            self.events.borrow_mut().push(Event::Begin);
            Ok(())
        }

        fn encode(
            &mut self,
            _frame: &mut (),
            step: &PassStep,
            targets: &mut TargetChain<SurfaceSize>,
            inputs: &FrameInputs,
        ) -> Result<()> {
            for (_, target) in targets.iter() {
                assert_eq!(*target, inputs.size, "stale buffer sampled");
            }
            self.events
                .borrow_mut()
                .push(Event::Encode(step.pass, step.output, inputs.size));
            Ok(())
        }

        fn finish_frame(&mut self, _frame: ()) -> Result<(), RenderError> {
            self.events.borrow_mut().push(Event::Finish);
            Ok(())
        }

        fn release(&mut self) {
            self.events.borrow_mut().push(Event::Release);
        }
    }

    fn size(width: u32, height: u32) -> SurfaceSize {
        SurfaceSize::new(width, height).expect("non-zero size")
    }

    fn mount(stylize: bool) -> (Orchestrator<Recorder>, Rc<RefCell<Vec<Event>>>) {
        let recorder = Recorder::default();
        let events = recorder.events.clone();
        let orchestrator = Orchestrator::mount(
            recorder,
            size(64, 32),
            FrameClock::fixed(1.0),
            FilterParams::default(),
            stylize,
        )
        .expect("mount");
        (orchestrator, events)
    }

    #[test]
    fn mount_allocates_all_buffers_at_surface_size() {
        let (orchestrator, events) = mount(true);
        assert_eq!(
            *events.borrow(),
            vec![
                Event::Allocate(Slot::Scene, size(64, 32)),
                Event::Allocate(Slot::Tensor, size(64, 32)),
                Event::Allocate(Slot::Filtered, size(64, 32)),
            ]
        );
        let targets = orchestrator.targets().expect("targets");
        assert!(targets
            .iter()
            .all(|(_, target)| Recorder::target_size(target) == size(64, 32)));
    }

    #[test]
    fn stylized_frame_runs_four_passes_in_order() {
        let (mut orchestrator, events) = mount(true);
        events.borrow_mut().clear();
        let report = orchestrator.render_frame().expect("frame");
        assert_eq!(report.passes, 4);
        assert!(report.stylized);
        assert_eq!(
            *events.borrow(),
            vec![
                Event::Begin,
                Event::Encode(Pass::Scene, Slot::Scene, size(64, 32)),
                Event::Encode(Pass::Tensor, Slot::Tensor, size(64, 32)),
                Event::Encode(Pass::Kuwahara, Slot::Filtered, size(64, 32)),
                Event::Encode(Pass::Composite, Slot::Surface, size(64, 32)),
                Event::Finish,
            ]
        );
    }

    #[test]
    fn disabled_stylisation_draws_scene_straight_to_surface() {
        let (mut orchestrator, events) = mount(false);
        events.borrow_mut().clear();
        orchestrator.render_frame().expect("frame");
        assert_eq!(
            *events.borrow(),
            vec![
                Event::Begin,
                Event::Encode(Pass::Scene, Slot::Surface, size(64, 32)),
                Event::Finish,
            ]
        );
    }

    #[test]
    fn resize_reallocates_every_buffer_before_next_frame() {
        let (mut orchestrator, events) = mount(true);
        orchestrator.render_frame().expect("frame");
        events.borrow_mut().clear();

        assert!(orchestrator.resize(100, 50).expect("resize"));
        orchestrator.render_frame().expect("frame");

        let log = events.borrow();
        assert_eq!(log[0], Event::ResizeSurface(size(100, 50)));
        for slot in Slot::OFFSCREEN {
            let allocated = log
                .iter()
                .position(|event| *event == Event::Allocate(slot, size(100, 50)))
                .expect("reallocated");
            let first_encode = log
                .iter()
                .position(|event| matches!(event, Event::Encode(..)))
                .expect("encoded");
            assert!(allocated < first_encode);
        }
        assert_eq!(orchestrator.size(), size(100, 50));
        let targets = orchestrator.targets().expect("targets");
        assert_eq!(targets.size(), size(100, 50));
        assert!(targets.iter().all(|(_, target)| *target == size(100, 50)));
    }

    #[test]
    fn zero_area_resize_keeps_last_valid_size() {
        let (mut orchestrator, events) = mount(true);
        events.borrow_mut().clear();
        assert!(!orchestrator.resize(0, 480).expect("resize"));
        assert!(!orchestrator.resize(640, 0).expect("resize"));
        assert_eq!(orchestrator.size(), size(64, 32));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn same_size_resize_is_a_no_op() {
        let (mut orchestrator, events) = mount(true);
        events.borrow_mut().clear();
        assert!(!orchestrator.resize(64, 32).expect("resize"));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn lost_surface_is_reconfigured_and_frame_skipped() {
        let (mut orchestrator, events) = mount(true);
        events.borrow_mut().clear();
        if let Some(backend) = orchestrator.backend_mut() {
            backend.lose_next_frame = true;
        }
        let err = orchestrator.render_frame().expect_err("lost");
        assert!(matches!(err, RenderError::SurfaceLost));
        assert_eq!(*events.borrow(), vec![Event::ResizeSurface(size(64, 32))]);
        orchestrator.render_frame().expect("recovers");
    }

    #[test]
    fn teardown_is_idempotent_and_blocks_rendering() {
        let (mut orchestrator, events) = mount(true);
        orchestrator.teardown();
        orchestrator.teardown();
        assert!(orchestrator.is_torn_down());
        assert!(orchestrator.targets().is_none());
        let releases = events
            .borrow()
            .iter()
            .filter(|event| **event == Event::Release)
            .count();
        assert_eq!(releases, 1);
        assert!(matches!(
            orchestrator.render_frame(),
            Err(RenderError::TornDown)
        ));
        assert!(matches!(
            orchestrator.resize(10, 10),
            Err(RenderError::TornDown)
        ));
        drop(orchestrator);
        let releases = events
            .borrow()
            .iter()
            .filter(|event| **event == Event::Release)
            .count();
        assert_eq!(releases, 1);
    }

    #[test]
    fn failed_mount_releases_backend() {
        let recorder = Recorder {
            fail_allocations: true,
            ..Recorder::default()
        };
        let events = recorder.events.clone();
        let result = Orchestrator::mount(
            recorder,
            size(8, 8),
            FrameClock::fixed(0.0),
            FilterParams::default(),
            true,
        );
        assert!(result.is_err());
        assert_eq!(*events.borrow(), vec![Event::Release]);
    }

    #[test]
    fn clock_is_read_once_per_frame() {
        let (mut orchestrator, _events) = mount(true);
        let first = orchestrator.render_frame().expect("frame");
        let second = orchestrator.render_frame().expect("frame");
        assert_eq!(first.sample.frame_index, 0);
        assert_eq!(second.sample.frame_index, 1);
    }
}
