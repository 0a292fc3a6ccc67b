//! Runs a chain of effect passes from an input image to an output view.

use std::collections::HashMap;

use tracing::trace;
use wgpu::util::DeviceExt;

use super::catalog::{COPY_SHADER, ShaderDef};
use super::manager::SharedPass;
use super::pass::{FxUniforms, PassInput};
use crate::gpu::GpuContext;
use crate::render_target::RenderTarget;
use crate::texture::Texture;

/// Pipelines for every effect shader, built on first use.
///
/// Each shader sees:
/// - `u`: [`FxUniforms`] at binding 0
/// - `t_input` at binding 1, the previous pass output
/// - `fx_sampler` at binding 2
/// - `t_extra` at binding 3, the pass's registered image or black
struct FxPipelines {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    placeholder: Texture,
    format: wgpu::TextureFormat,
    pipelines: HashMap<&'static str, wgpu::RenderPipeline>,
}

impl FxPipelines {
    fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Fx Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Fx Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                texture_entry(3),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Fx Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            bind_group_layout,
            pipeline_layout,
            sampler,
            placeholder: Texture::solid(gpu, [0, 0, 0, 0], "Fx Placeholder"),
            format: gpu.format(),
            pipelines: HashMap::new(),
        }
    }

    fn ensure(&mut self, gpu: &GpuContext, def: &ShaderDef) {
        if self.pipelines.contains_key(def.name) {
            return;
        }
        let device = &gpu.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(def.name),
            source: wgpu::ShaderSource::Wgsl(def.source.into()),
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(def.name),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        trace!(shader = def.name, "fx pipeline created");
        self.pipelines.insert(def.name, pipeline);
    }

    /// One full-screen draw of `def` from `input` into `output`.
    #[allow(clippy::too_many_arguments)]
    fn draw(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        def: &ShaderDef,
        uniforms: FxUniforms,
        input: &wgpu::TextureView,
        extra: Option<&Texture>,
        output: &wgpu::TextureView,
    ) {
        let Some(pipeline) = self.pipelines.get(def.name) else {
            return;
        };
        let uniform_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Fx Uniforms"),
                contents: bytemuck::cast_slice(&[uniforms]),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let extra = extra.unwrap_or(&self.placeholder);
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Fx Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(extra.view()),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(def.name),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

/// A chain of passes, ping-ponging between two intermediate targets.
///
/// Passes are shared with the [`FxManager`](super::FxManager), so toggles
/// made there show up on the next render.
pub struct EffectComposer {
    label: String,
    passes: Vec<SharedPass>,
    targets: [RenderTarget; 2],
    pipelines: FxPipelines,
}

impl EffectComposer {
    pub fn new(gpu: &GpuContext, label: &str) -> Self {
        Self {
            label: label.to_string(),
            passes: Vec::new(),
            targets: [
                RenderTarget::new(gpu, &format!("{label} Ping")),
                RenderTarget::new(gpu, &format!("{label} Pong")),
            ],
            pipelines: FxPipelines::new(gpu),
        }
    }

    pub fn set_passes(&mut self, passes: Vec<SharedPass>) {
        self.passes = passes;
    }

    pub fn add_pass(&mut self, pass: SharedPass) {
        self.passes.push(pass);
    }

    pub fn remove_pass(&mut self, uid: &str) -> bool {
        let before = self.passes.len();
        self.passes.retain(|pass| pass.borrow().uid != uid);
        before != self.passes.len()
    }

    pub fn passes(&self) -> &[SharedPass] {
        &self.passes
    }

    /// Passes that will draw on the next render.
    pub fn active_count(&self) -> usize {
        self.passes.iter().filter(|p| p.borrow().state.enabled).count()
    }

    /// Keep the intermediate targets the size of the surface.
    pub fn resize(&mut self, gpu: &GpuContext) {
        let [ping, pong] = &mut self.targets;
        ping.ensure_size(gpu, &format!("{} Ping", self.label));
        pong.ensure_size(gpu, &format!("{} Pong", self.label));
    }

    /// Run enabled passes from `input` into `output`. With nothing enabled
    /// the input is copied straight through.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
    ) {
        self.resize(gpu);
        let (width, height) = (gpu.width(), gpu.height());

        let active: Vec<SharedPass> = self
            .passes
            .iter()
            .filter(|p| p.borrow().state.enabled)
            .cloned()
            .collect();
        for pass in &active {
            self.pipelines.ensure(gpu, pass.borrow().program());
        }

        if active.is_empty() {
            self.pipelines.ensure(gpu, &COPY_SHADER);
            let uniforms = FxUniforms {
                resolution: [width as f32, height as f32],
                time: 0.0,
                opacity: 1.0,
                params: Default::default(),
            };
            self.pipelines
                .draw(gpu, encoder, &COPY_SHADER, uniforms, input, None, output);
            return;
        }

        let last = active.len() - 1;
        let mut previous = input;
        for (i, shared) in active.iter().enumerate() {
            let pass = shared.borrow();
            let write = if i == last {
                output
            } else {
                &self.targets[i % 2].view
            };
            let read = match pass.input() {
                PassInput::Previous => previous,
                PassInput::Original => input,
            };
            self.pipelines.draw(
                gpu,
                encoder,
                pass.program(),
                pass.uniforms(width, height),
                read,
                pass.texture().map(|t| t.as_ref()),
                write,
            );
            previous = write;
        }
    }
}
