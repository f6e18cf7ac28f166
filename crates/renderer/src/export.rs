use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use tracing::info;

use crate::gpu::GpuBackend;
use crate::orchestrator::{Backend, Orchestrator};
use crate::paper::DEFAULT_PAPER_SEED;
use crate::reference::CpuBackend;
use crate::runtime::FrameClock;
use crate::types::{BackendKind, FilterParams, Pointer, SurfaceSize};

/// A deterministic still: one frame at a fixed time written to a PNG.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub size: SurfaceSize,
    /// Animation time in seconds.
    pub time: f32,
    pub backend: BackendKind,
    pub stylize: bool,
    pub filter: FilterParams,
    pub pointer: Pointer,
    pub paper_seed: u64,
    pub output: PathBuf,
}

impl ExportRequest {
    pub fn new(output: impl Into<PathBuf>, size: SurfaceSize) -> Self {
        Self {
            size,
            time: 0.0,
            backend: BackendKind::default(),
            stylize: true,
            filter: FilterParams::default(),
            pointer: Pointer::default(),
            paper_seed: DEFAULT_PAPER_SEED,
            output: output.into(),
        }
    }
}

fn render_with<B: Backend>(
    backend: B,
    request: &ExportRequest,
    read: impl FnOnce(&mut B) -> Result<RgbaImage>,
) -> Result<RgbaImage> {
    let mut orchestrator = Orchestrator::mount(
        backend,
        request.size,
        FrameClock::fixed(request.time),
        request.filter,
        request.stylize,
    )?;
    orchestrator.set_pointer(request.pointer);
    orchestrator
        .render_frame()
        .with_context(|| format!("failed to render {} frame", request.size))?;
    let backend = orchestrator
        .backend_mut()
        .ok_or_else(|| anyhow!("renderer was torn down before readback"))?;
    let image = read(backend)?;
    orchestrator.teardown();
    Ok(image)
}

/// Renders one frame with the requested backend and returns it as RGBA8.
pub fn render_image(request: &ExportRequest) -> Result<RgbaImage> {
    match request.backend {
        BackendKind::Gpu => render_with(GpuBackend::headless(request.paper_seed)?, request, |gpu| {
            gpu.capture()
        }),
        BackendKind::Cpu => render_with(CpuBackend::new(request.paper_seed)?, request, |cpu| {
            cpu.take_frame()
                .map(|frame| frame.to_rgba8())
                .ok_or_else(|| anyhow!("reference backend produced no frame"))
        }),
    }
}

/// Renders the request and saves it as PNG, creating parent directories.
pub fn render_still(request: &ExportRequest) -> Result<PathBuf> {
    let image = render_image(request)?;
    write_png(&image, &request.output)?;
    info!(
        path = %request.output.display(),
        size = %request.size,
        time = request.time,
        backend = ?request.backend,
        "still frame captured"
    );
    Ok(request.output.clone())
}

fn write_png(image: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))
}
