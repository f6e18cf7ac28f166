use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, warn};

use crate::orchestrator::RenderError;
use crate::types::SurfaceSize;

/// Format of the headless export target.
pub(crate) const EXPORT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct Presentation {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

/// Instance, device and (for the preview window) the presentation surface.
pub(crate) struct GpuContext {
    _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// Format every surface-bound pass renders into.
    pub output_format: wgpu::TextureFormat,
    pub max_dimension: u32,
    pub adapter_name: String,
    presentation: Option<Presentation>,
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("fundraiser device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        memory_hints: wgpu::MemoryHints::MemoryUsage,
        trace: wgpu::Trace::default(),
    }))
    .context("failed to create GPU device")
}

impl GpuContext {
    /// Creates a context that presents into `target`.
    pub(crate) fn windowed<T>(target: &T, size: SurfaceSize) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = create_instance();
        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        // The caller keeps the window alive until the context is dropped.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;
        let adapter_name = adapter.get_info().name;
        let max_dimension = adapter.limits().max_texture_dimension_2d;
        let (device, queue) = request_device(&adapter)?;

        let caps = surface.get_capabilities(&adapter);
        let output_format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;
        if output_format.is_srgb() {
            warn!(?output_format, "no linear surface format available; colours will be re-encoded");
        }
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let present_mode = if caps.present_modes.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            caps.present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::AutoVsync)
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: output_format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        let mut context = Self {
            _instance: instance,
            device,
            queue,
            output_format,
            max_dimension,
            adapter_name,
            presentation: Some(Presentation { surface, config }),
        };
        context.configure(size)?;
        debug!(
            adapter = %context.adapter_name,
            ?output_format,
            ?present_mode,
            "windowed GPU context ready"
        );
        Ok(context)
    }

    /// Creates a context without a surface; frames render into an export texture.
    pub(crate) fn headless() -> Result<Self> {
        let instance = create_instance();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;
        let adapter_name = adapter.get_info().name;
        let max_dimension = adapter.limits().max_texture_dimension_2d;
        let (device, queue) = request_device(&adapter)?;
        debug!(adapter = %adapter_name, "headless GPU context ready");
        Ok(Self {
            _instance: instance,
            device,
            queue,
            output_format: EXPORT_FORMAT,
            max_dimension,
            adapter_name,
            presentation: None,
        })
    }

    pub(crate) fn is_headless(&self) -> bool {
        self.presentation.is_none()
    }

    pub(crate) fn check_size(&self, size: SurfaceSize) -> Result<()> {
        if size.width > self.max_dimension || size.height > self.max_dimension {
            bail!(
                "GPU max texture dimension is {}, requested surface is {size}",
                self.max_dimension
            );
        }
        Ok(())
    }

    /// Reconfigures the surface for `size`. A no-op when headless.
    pub(crate) fn configure(&mut self, size: SurfaceSize) -> Result<()> {
        self.check_size(size)?;
        if let Some(presentation) = self.presentation.as_mut() {
            presentation.config.width = size.width;
            presentation.config.height = size.height;
            presentation
                .surface
                .configure(&self.device, &presentation.config);
        }
        Ok(())
    }

    /// Acquires the next swapchain texture. Returns `None` when headless.
    pub(crate) fn acquire(&self) -> Result<Option<wgpu::SurfaceTexture>, RenderError> {
        let Some(presentation) = self.presentation.as_ref() else {
            return Ok(None);
        };
        match presentation.surface.get_current_texture() {
            Ok(texture) => Ok(Some(texture)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                Err(RenderError::SurfaceLost)
            }
            Err(wgpu::SurfaceError::Timeout) => Err(RenderError::SurfaceTimeout),
            Err(err) => Err(RenderError::Backend(anyhow!(
                "failed to acquire surface texture: {err}"
            ))),
        }
    }
}
