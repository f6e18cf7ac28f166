use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use crossbeam_channel::bounded;
use image::RgbaImage;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, trace};

use crate::orchestrator::{Backend, RenderError, TargetChain};
use crate::paper::generate_paper;
use crate::plan::{PassStep, Slot};
use crate::types::{FrameInputs, SurfaceSize};

use super::context::{GpuContext, EXPORT_FORMAT};
use super::pipeline::{PassProgram, PipelineLayouts, ProgramSet};
use super::targets::{extent, padded_bytes_per_row, OffscreenTarget};
use super::uniforms::PassUniforms;

/// Per-frame state: the command encoder and the view passes draw into last.
pub struct GpuFrame {
    encoder: wgpu::CommandEncoder,
    surface_texture: Option<wgpu::SurfaceTexture>,
    view: wgpu::TextureView,
    uniforms_written: bool,
}

/// wgpu implementation of the pass chain.
pub struct GpuBackend {
    context: GpuContext,
    layouts: PipelineLayouts,
    programs: ProgramSet,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    paper: OffscreenTarget,
    overlay: Option<OffscreenTarget>,
    export: Option<OffscreenTarget>,
}

impl GpuBackend {
    /// Builds a backend that presents into a window.
    pub fn windowed<T>(target: &T, size: SurfaceSize, paper_seed: u64) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        Self::from_context(GpuContext::windowed(target, size)?, paper_seed)
    }

    /// Builds a backend that renders into an offscreen export texture.
    pub fn headless(paper_seed: u64) -> Result<Self> {
        Self::from_context(GpuContext::headless()?, paper_seed)
    }

    fn from_context(context: GpuContext, paper_seed: u64) -> Result<Self> {
        let device = &context.device;
        let layouts = PipelineLayouts::new(device)?;
        let programs = ProgramSet::compile(device, &layouts, context.output_format)?;

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pass uniforms"),
            size: std::mem::size_of::<PassUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pass uniform bind group"),
            layout: &layouts.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("pass input sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let paper = OffscreenTarget::from_image(
            device,
            &context.queue,
            "paper grain",
            &generate_paper(paper_seed),
        )
        .context("paper texture has zero area")?;

        debug!(adapter = %context.adapter_name, "render programs compiled");
        Ok(Self {
            context,
            layouts,
            programs,
            uniform_buffer,
            uniform_bind_group,
            sampler,
            paper,
            overlay: None,
            export: None,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.context.adapter_name
    }

    /// Uploads an RGBA8 overlay (top-left origin) drawn over every following frame.
    pub fn set_overlay(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<()> {
        let size = SurfaceSize::new(width, height).context("overlay has zero area")?;
        if rgba.len() != size.pixel_count() * 4 {
            bail!("overlay is {} bytes, expected {}", rgba.len(), size.pixel_count() * 4);
        }
        if self.overlay.as_ref().map(OffscreenTarget::size) != Some(size) {
            self.overlay = Some(OffscreenTarget::new(
                &self.context.device,
                "confetti overlay",
                size,
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            ));
        }
        if let Some(overlay) = self.overlay.as_ref() {
            overlay.write_rgba8(&self.context.queue, rgba);
        }
        Ok(())
    }

    pub fn clear_overlay(&mut self) {
        self.overlay = None;
    }

    fn input_view<'a>(
        &'a self,
        targets: &'a TargetChain<OffscreenTarget>,
        slot: Slot,
    ) -> Result<&'a wgpu::TextureView> {
        match slot {
            Slot::Paper => Ok(&self.paper.view),
            other => targets
                .get(other)
                .map(|target| &target.view)
                .ok_or_else(|| anyhow!("{other:?} cannot be sampled")),
        }
    }

    fn input_bind_group(
        &self,
        primary: &wgpu::TextureView,
        secondary: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        self.context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("pass input bind group"),
                layout: &self.layouts.input_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(primary),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(secondary),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            })
    }

    fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        program: &PassProgram,
        inputs: Option<&wgpu::BindGroup>,
        view: &wgpu::TextureView,
        load: wgpu::LoadOp<wgpu::Color>,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(program.program.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(&program.pipeline);
        render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        if let Some(group) = inputs {
            render_pass.set_bind_group(1, group, &[]);
        }
        render_pass.draw(0..3, 0..1);
    }

    fn ensure_export_target(&mut self, size: SurfaceSize) {
        if self.export.as_ref().map(OffscreenTarget::size) == Some(size) {
            return;
        }
        self.export = Some(OffscreenTarget::new(
            &self.context.device,
            "export target",
            size,
            EXPORT_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        ));
    }

    /// Reads back the last headless frame as 8-bit RGBA (top row first).
    pub fn capture(&self) -> Result<RgbaImage> {
        let export = self
            .export
            .as_ref()
            .context("no headless frame has been rendered")?;
        let size = export.size();
        let bytes_per_row = padded_bytes_per_row(size.width);
        let device = &self.context.device;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("export readback"),
            size: u64::from(bytes_per_row) * u64::from(size.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("export copy"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &export.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(size.height),
                },
            },
            extent(size),
        );
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .context("failed to wait for the GPU")?;
        receiver
            .recv()
            .context("readback callback was dropped")?
            .context("failed to map readback buffer")?;

        let row_bytes = (size.width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * size.height as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..row_bytes]);
            }
        }
        buffer.unmap();
        RgbaImage::from_raw(size.width, size.height, pixels)
            .context("readback size does not match the export target")
    }
}

impl Backend for GpuBackend {
    type Target = OffscreenTarget;
    type Frame = GpuFrame;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn allocate(&mut self, slot: Slot, size: SurfaceSize) -> Result<OffscreenTarget> {
        self.context.check_size(size)?;
        let label = match slot {
            Slot::Scene => "buffer A (scene)",
            Slot::Tensor => "buffer B (tensor)",
            Slot::Filtered => "buffer C (kuwahara)",
            Slot::Paper | Slot::Surface => bail!("{slot:?} is not an offscreen buffer"),
        };
        Ok(OffscreenTarget::offscreen(&self.context.device, label, size))
    }

    fn target_size(target: &OffscreenTarget) -> SurfaceSize {
        target.size()
    }

    fn resize_surface(&mut self, size: SurfaceSize) -> Result<()> {
        self.context.configure(size)?;
        if self.context.is_headless() {
            self.ensure_export_target(size);
        }
        Ok(())
    }

    fn begin_frame(&mut self, size: SurfaceSize) -> Result<GpuFrame, RenderError> {
        let (surface_texture, view) = match self.context.acquire()? {
            Some(texture) => {
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                (Some(texture), view)
            }
            None => {
                self.ensure_export_target(size);
                let view = self
                    .export
                    .as_ref()
                    .map(|export| export.view.clone())
                    .ok_or_else(|| anyhow!("export target is missing"))?;
                (None, view)
            }
        };
        let encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        Ok(GpuFrame {
            encoder,
            surface_texture,
            view,
            uniforms_written: false,
        })
    }

    fn encode(
        &mut self,
        frame: &mut GpuFrame,
        step: &PassStep,
        targets: &mut TargetChain<OffscreenTarget>,
        inputs: &FrameInputs,
    ) -> Result<()> {
        if !frame.uniforms_written {
            let uniforms = PassUniforms::from_inputs(inputs);
            self.context
                .queue
                .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
            frame.uniforms_written = true;
        }

        let program = self.programs.for_step(step);
        let group = if program.samples_inputs() {
            let primary = step
                .inputs
                .first()
                .ok_or_else(|| anyhow!("{} pass has no inputs", step.pass.label()))?;
            let secondary = step.inputs.get(1).unwrap_or(primary);
            Some(self.input_bind_group(
                self.input_view(targets, *primary)?,
                self.input_view(targets, *secondary)?,
            ))
        } else {
            None
        };
        let view = match step.output {
            Slot::Surface => &frame.view,
            slot => {
                &targets
                    .get(slot)
                    .ok_or_else(|| anyhow!("{slot:?} is not writable"))?
                    .view
            }
        };
        trace!(pass = step.pass.label(), output = ?step.output, "encoding pass");
        self.draw(
            &mut frame.encoder,
            program,
            group.as_ref(),
            view,
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
        );
        Ok(())
    }

    fn finish_frame(&mut self, mut frame: GpuFrame) -> Result<(), RenderError> {
        if let Some(overlay) = self.overlay.as_ref() {
            let group = self.input_bind_group(&overlay.view, &overlay.view);
            self.draw(
                &mut frame.encoder,
                self.programs.overlay(),
                Some(&group),
                &frame.view,
                wgpu::LoadOp::Load,
            );
        }
        self.context
            .queue
            .submit(std::iter::once(frame.encoder.finish()));
        if let Some(texture) = frame.surface_texture {
            texture.present();
        }
        Ok(())
    }

    fn release(&mut self) {
        self.overlay = None;
        self.export = None;
        if let Err(err) = self.context.device.poll(wgpu::PollType::Wait) {
            debug!(%err, "device poll during release failed");
        }
    }
}
