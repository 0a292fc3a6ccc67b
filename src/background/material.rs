//! Shared background pipelines.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::gpu::GpuContext;
use crate::mesh::Vertex3d;
use crate::render_target::DEPTH_FORMAT;
use crate::view::ViewType;

const BACKGROUND_SHADER: &str = include_str!("../shaders/background.wgsl");

/// Which vertex/fragment pair a background runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackgroundShader {
    /// Full-screen quad; the fragment shader casts a ray per pixel.
    Screen,
    /// Real geometry sampled at its vertex UVs.
    Mesh,
}

/// Cache key of a background material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialKey {
    pub view: ViewType,
    pub shader: BackgroundShader,
    /// Alpha blended, for backgrounds that fade in.
    pub transparent: bool,
}

/// A background pipeline and the layouts its bind groups must follow.
pub struct BackgroundMaterial {
    pub key: MaterialKey,
    pub(crate) pipeline: wgpu::RenderPipeline,
}

/// Pipelines shared by every background of a viewer.
///
/// Consumers hold `Rc` clones and never destroy materials themselves; the
/// pool drops its references in [`MaterialPool::clear`] at viewer teardown.
pub struct MaterialPool {
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    pub(crate) view_layout: wgpu::BindGroupLayout,
    pub(crate) texture_layout: wgpu::BindGroupLayout,
    materials: HashMap<MaterialKey, Rc<BackgroundMaterial>>,
}

impl MaterialPool {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Background Shader"),
            source: wgpu::ShaderSource::Wgsl(BACKGROUND_SHADER.into()),
        });

        let view_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Background View Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Background Texture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Background Pipeline Layout"),
            bind_group_layouts: &[&view_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        Self {
            shader,
            pipeline_layout,
            view_layout,
            texture_layout,
            materials: HashMap::new(),
        }
    }

    /// Shared material for `key`, built on first use.
    pub fn get(&mut self, gpu: &GpuContext, key: MaterialKey) -> Rc<BackgroundMaterial> {
        if let Some(material) = self.materials.get(&key) {
            return Rc::clone(material);
        }
        debug!(?key, "building background material");
        let material = Rc::new(self.build(gpu, key));
        self.materials.insert(key, Rc::clone(&material));
        material
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Release the pool's references. Materials still held elsewhere live on
    /// until their last user drops them.
    pub fn clear(&mut self) {
        self.materials.clear();
    }

    fn build(&self, gpu: &GpuContext, key: MaterialKey) -> BackgroundMaterial {
        let (vs, fs) = match key.shader {
            BackgroundShader::Screen => ("vs_screen", "fs_screen"),
            BackgroundShader::Mesh => ("vs_mesh", "fs_mesh"),
        };
        let blend = if key.transparent {
            wgpu::BlendState::ALPHA_BLENDING
        } else {
            wgpu::BlendState::REPLACE
        };

        let pipeline = gpu
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!(
                    "Background Pipeline ({} {:?}{})",
                    key.view.name(),
                    key.shader,
                    if key.transparent { " transparent" } else { "" }
                )),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some(vs),
                    buffers: &[Vertex3d::LAYOUT],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some(fs),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: gpu.format(),
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                // Backgrounds sit behind everything and leave depth untouched.
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        BackgroundMaterial { key, pipeline }
    }
}
