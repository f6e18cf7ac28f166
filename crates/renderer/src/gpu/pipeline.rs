use anyhow::{bail, Context, Result};

use crate::compile::{compile_fragment_shader, compile_vertex_shader, Program};
use crate::plan::{Pass, PassStep, Slot};

use super::targets::OFFSCREEN_FORMAT;

/// Bind group layouts and the shared vertex module.
pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub input_layout: wgpu::BindGroupLayout,
    scene_layout: wgpu::PipelineLayout,
    sampled_layout: wgpu::PipelineLayout,
    vertex_module: wgpu::ShaderModule,
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Runs `build` inside a validation error scope, turning a validation
/// failure into an error instead of a device panic.
pub(crate) fn validated<T>(
    device: &wgpu::Device,
    what: &str,
    build: impl FnOnce() -> T,
) -> Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let built = build();
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        bail!("failed to build {what}: {err}");
    }
    Ok(built)
}

impl PipelineLayouts {
    /// Pipeline layout matching the bindings `program` declares.
    pub fn for_program(&self, program: Program) -> &wgpu::PipelineLayout {
        if program.samples_inputs() {
            &self.sampled_layout
        } else {
            &self.scene_layout
        }
    }

    pub fn new(device: &wgpu::Device) -> Result<Self> {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pass uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let input_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pass input layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let scene_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene pipeline layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });
        let sampled_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sampled pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &input_layout],
            push_constant_ranges: &[],
        });
        let vertex_module = compile_vertex_shader(device)?;

        Ok(Self {
            uniform_layout,
            input_layout,
            scene_layout,
            sampled_layout,
            vertex_module,
        })
    }
}

/// A compiled fragment program bound to one colour target format.
pub(crate) struct PassProgram {
    pub program: Program,
    pub pipeline: wgpu::RenderPipeline,
}

impl PassProgram {
    /// Links `fragment_module` against the shared vertex stage. Interface,
    /// layout and format mismatches are returned as errors.
    fn new(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        layout: &wgpu::PipelineLayout,
        program: Program,
        fragment_module: &wgpu::ShaderModule,
        format: wgpu::TextureFormat,
        blend: Option<wgpu::BlendState>,
    ) -> Result<Self> {
        let what = format!("the {} pipeline ({format:?})", program.label());
        let pipeline = validated(device, &what, || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(program.label()),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &layouts.vertex_module,
                    entry_point: Some("main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        })?;
        Ok(Self { program, pipeline })
    }

    pub fn samples_inputs(&self) -> bool {
        self.program.samples_inputs()
    }
}

/// Every pipeline the frame plan can ask for. The scene program is built
/// twice: once for buffer A and once for drawing straight to the surface.
pub(crate) struct ProgramSet {
    scene_offscreen: PassProgram,
    scene_output: PassProgram,
    tensor: PassProgram,
    kuwahara: PassProgram,
    composite: PassProgram,
    overlay: PassProgram,
}

impl ProgramSet {
    pub fn compile(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        output_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let module = |program: Program| {
            compile_fragment_shader(device, program)
                .with_context(|| format!("failed to build the {} program", program.label()))
        };
        let scene = module(Program::Scene)?;
        let tensor = module(Program::Tensor)?;
        let kuwahara = module(Program::Kuwahara)?;
        let composite = module(Program::Composite)?;
        let overlay = module(Program::Overlay)?;

        let build = |program: Program, module: &wgpu::ShaderModule, format, blend| {
            let layout = layouts.for_program(program);
            PassProgram::new(device, layouts, layout, program, module, format, blend)
        };
        Ok(Self {
            scene_offscreen: build(Program::Scene, &scene, OFFSCREEN_FORMAT, None)?,
            scene_output: build(Program::Scene, &scene, output_format, None)?,
            tensor: build(Program::Tensor, &tensor, OFFSCREEN_FORMAT, None)?,
            kuwahara: build(Program::Kuwahara, &kuwahara, OFFSCREEN_FORMAT, None)?,
            composite: build(Program::Composite, &composite, output_format, None)?,
            overlay: build(
                Program::Overlay,
                &overlay,
                output_format,
                Some(wgpu::BlendState::ALPHA_BLENDING),
            )?,
        })
    }

    pub fn for_step(&self, step: &PassStep) -> &PassProgram {
        match (step.pass, step.output) {
            (Pass::Scene, Slot::Surface) => &self.scene_output,
            (Pass::Scene, _) => &self.scene_offscreen,
            (Pass::Tensor, _) => &self.tensor,
            (Pass::Kuwahara, _) => &self.kuwahara,
            (Pass::Composite, _) => &self.composite,
        }
    }

    pub fn overlay(&self) -> &PassProgram {
        &self.overlay
    }
}
