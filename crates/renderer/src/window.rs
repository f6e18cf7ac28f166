use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use confetti::{Canvas, ParticleSystem, DEFAULT_BURST};
use tracing::{debug, error, info, trace, warn};
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::gpu::GpuBackend;
use crate::orchestrator::{Orchestrator, RenderError};
use crate::runtime::{FrameClock, FrameScheduler};
use crate::types::{Pointer, PreviewConfig, SurfaceSize};

/// Longest confetti step; keeps bursts sane after the window was stalled.
const MAX_CONFETTI_STEP: f32 = 0.1;

/// Everything the preview event loop mutates. The orchestrator is declared
/// before the window so the surface is released first.
struct PreviewState {
    orchestrator: Orchestrator<GpuBackend>,
    scheduler: FrameScheduler,
    confetti: ParticleSystem,
    canvas: Canvas,
    overlay_visible: bool,
    last_frame: Instant,
    window: Arc<Window>,
}

impl PreviewState {
    fn new(window: Arc<Window>, config: &PreviewConfig) -> Result<Self> {
        let size = initial_surface_size(window.as_ref(), config);
        let backend = GpuBackend::windowed(window.as_ref(), size, config.paper_seed)?;
        info!(adapter = backend.adapter_name(), %size, "preview window ready");
        let orchestrator = Orchestrator::mount(
            backend,
            size,
            FrameClock::system(),
            config.filter,
            config.stylize,
        )?;
        let canvas = Canvas::new(size.width, size.height)?;
        Ok(Self {
            orchestrator,
            scheduler: FrameScheduler::new(config.target_fps),
            confetti: ParticleSystem::new(config.confetti_seed),
            canvas,
            overlay_visible: false,
            last_frame: Instant::now(),
            window,
        })
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if self.orchestrator.resize(width, height)? {
            self.canvas
                .resize(width, height)
                .map_err(|err| RenderError::Backend(err.into()))?;
            self.overlay_visible = false;
            if let Some(backend) = self.orchestrator.backend_mut() {
                backend.clear_overlay();
            }
        }
        Ok(())
    }

    fn move_pointer(&mut self, position: PhysicalPosition<f64>) {
        let size = self.orchestrator.size();
        self.orchestrator
            .set_pointer(Pointer::from_window(position.x, position.y, size));
    }

    fn toggle_stylize(&mut self) {
        let stylize = !self.orchestrator.stylize();
        self.orchestrator.set_stylize(stylize);
        info!(stylize, "painterly stylisation toggled");
    }

    /// Donation burst at the centre of the surface.
    fn celebrate(&mut self) {
        let size = self.orchestrator.size().as_vec2();
        self.confetti.burst(size * 0.5, DEFAULT_BURST);
        debug!(particles = self.confetti.len(), "confetti burst");
    }

    /// Steps the particles and uploads the overlay for the next frame.
    fn update_confetti(&mut self, dt: f32) -> Result<()> {
        self.confetti.step(dt.min(MAX_CONFETTI_STEP));
        let Some(backend) = self.orchestrator.backend_mut() else {
            return Ok(());
        };
        if self.confetti.is_idle() {
            if self.overlay_visible {
                backend.clear_overlay();
                self.overlay_visible = false;
                trace!("confetti finished");
            }
            return Ok(());
        }
        self.confetti.rasterize(&mut self.canvas);
        backend.set_overlay(
            self.canvas.width(),
            self.canvas.height(),
            self.canvas.as_bytes(),
        )?;
        self.overlay_visible = true;
        Ok(())
    }

    fn redraw(&mut self, elwt: &EventLoopWindowTarget<()>) -> Result<()> {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.update_confetti(dt)?;

        match self.orchestrator.render_frame() {
            Ok(report) => {
                self.scheduler.mark_rendered(Instant::now());
                trace!(
                    frame = report.sample.frame_index,
                    time = report.sample.seconds,
                    passes = report.passes,
                    "frame presented"
                );
            }
            Err(RenderError::SurfaceLost) => {
                self.window.request_redraw();
            }
            Err(RenderError::SurfaceTimeout) => {
                warn!("surface timeout; retrying next frame");
            }
            Err(RenderError::TornDown) => {
                elwt.exit();
            }
            Err(RenderError::Backend(err)) => return Err(err),
        }
        Ok(())
    }

    fn close(&mut self, elwt: &EventLoopWindowTarget<()>) {
        self.orchestrator.teardown();
        elwt.exit();
    }

    fn handle_key(&mut self, event: &KeyEvent, elwt: &EventLoopWindowTarget<()>) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => self.close(elwt),
            Key::Character(value) if value.eq_ignore_ascii_case("p") => self.toggle_stylize(),
            Key::Character(value) if value.eq_ignore_ascii_case("d") => self.celebrate(),
            _ => {}
        }
    }

    fn schedule(&self, elwt: &EventLoopWindowTarget<()>) {
        let now = Instant::now();
        if self.scheduler.ready_for_frame(now) {
            self.window.request_redraw();
            elwt.set_control_flow(ControlFlow::Wait);
        } else if let Some(deadline) = self.scheduler.next_deadline() {
            elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
        } else {
            elwt.set_control_flow(ControlFlow::Wait);
        }
    }
}

/// Device-pixel size of a freshly opened window. Before the first layout some
/// platforms report a zero inner size; fall back to the requested logical
/// size scaled by the monitor's device-pixel ratio.
fn initial_surface_size(window: &Window, config: &PreviewConfig) -> SurfaceSize {
    let inner = window.inner_size();
    SurfaceSize::new(inner.width, inner.height)
        .or_else(|| {
            SurfaceSize::from_logical(
                f64::from(config.surface_size.width),
                f64::from(config.surface_size.height),
                window.scale_factor(),
            )
        })
        .unwrap_or(config.surface_size)
}

/// Opens the interactive preview and blocks until the window is closed.
///
/// Keys: `P` toggles painterly stylisation, `D` or a left click fires a
/// donation confetti burst, `Esc` tears the renderer down and exits.
pub fn run_preview(config: PreviewConfig) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title("Everybody's Cool")
        .with_inner_size(LogicalSize::new(
            config.surface_size.width,
            config.surface_size.height,
        ))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let mut state =
        PreviewState::new(window.clone(), &config).context("failed to initialise preview")?;
    let mut fatal: Option<anyhow::Error> = None;

    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => state.close(elwt),
            WindowEvent::KeyboardInput { event, .. } => state.handle_key(&event, elwt),
            WindowEvent::CursorMoved { position, .. } => state.move_pointer(position),
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => state.celebrate(),
            WindowEvent::Resized(new_size) => {
                if let Err(err) = state.resize(new_size.width, new_size.height) {
                    error!("failed to resize preview: {err:#}");
                    fatal = Some(anyhow!("resize failed: {err}"));
                    state.close(elwt);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = state.redraw(elwt) {
                    error!("failed to render preview frame: {err:#}");
                    fatal = Some(err);
                    state.close(elwt);
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            if !elwt.exiting() {
                state.schedule(elwt);
            }
        }
        _ => {}
    });

    state.orchestrator.teardown();
    drop(state);

    if let Some(err) = fatal {
        return Err(err);
    }
    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}
