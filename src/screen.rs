//! Screen compositing of the outgoing and incoming scene images.
//!
//! [`ScreenMaterial`] holds the transition parameters and a CPU rendition of
//! the shader math in `shaders/screen.wgsl`, used by tests and by picking code
//! that needs to know which scene is visible under a pixel. [`ScreenRenderer`]
//! owns the GPU side.

use glam::{Vec2, Vec4};

use crate::gpu::GpuContext;
use crate::scene::SceneId;
use crate::texture::Texture;
use crate::transition::TransitionKind;

const SCREEN_SHADER: &str = include_str!("shaders/screen.wgsl");

/// Default softness of the mix-map threshold.
pub const DEFAULT_THRESHOLD: f32 = 0.1;
const MIX_MAP_SIZE: u32 = 256;

/// Transition parameters fed to the screen shader.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenMaterial {
    pub kind: TransitionKind,
    mix_ratio: f32,
    pub threshold: f32,
}

impl Default for ScreenMaterial {
    fn default() -> Self {
        Self {
            kind: TransitionKind::None,
            mix_ratio: 0.0,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ScreenMaterial {
    pub fn new(kind: TransitionKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn mix_ratio(&self) -> f32 {
        self.mix_ratio
    }

    /// Store a mix ratio clamped to [0, 1] and return the stored value.
    pub fn set_mix_ratio(&mut self, ratio: f32) -> f32 {
        self.mix_ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        self.mix_ratio
    }

    /// Per-pixel weight of texture one for a mix-map sample.
    pub fn mix_factor(&self, mix_texel: f32) -> f32 {
        mix_factor(mix_texel, self.mix_ratio, self.threshold)
    }

    /// Composite two texels the way the shader for `self.kind` does.
    ///
    /// `slide` kinds are position dependent; use [`slide_sample_offsets`].
    pub fn composite(&self, one: Vec4, two: Vec4, mix_texel: f32) -> Vec4 {
        let mixf = self.mix_factor(mix_texel);
        match self.kind {
            TransitionKind::Fade => fade_mix(one, two, mixf),
            TransitionKind::Blend => blend_mix(one, two, mixf),
            TransitionKind::None | TransitionKind::Slide => {
                if self.mix_ratio >= 1.0 {
                    two
                } else {
                    one
                }
            }
        }
    }
}

/// `clamp((mix - r) / threshold, 0, 1)` with
/// `r = ratio * (1 + 2 * threshold) - threshold`.
///
/// A zero threshold gives a hard edge at `mix == ratio`.
pub fn mix_factor(mix_texel: f32, mix_ratio: f32, threshold: f32) -> f32 {
    let r = mix_ratio * (1.0 + threshold * 2.0) - threshold;
    ((mix_texel - r) / threshold.max(f32::EPSILON)).clamp(0.0, 1.0)
}

/// Fade: `mix(two, one, mixf)`.
pub fn fade_mix(one: Vec4, two: Vec4, mixf: f32) -> Vec4 {
    two.lerp(one, mixf)
}

/// Blend: `mix(one, two, 1 - mixf)`.
pub fn blend_mix(one: Vec4, two: Vec4, mixf: f32) -> Vec4 {
    one.lerp(two, 1.0 - mixf)
}

/// Which texture a slide shows at a screen uv.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SlideSample {
    One(Vec2),
    Two(Vec2),
    Empty,
}

/// Shifted sample coordinates for texture one and two.
pub fn slide_sample_offsets(uv: Vec2, mix_ratio: f32) -> (Vec2, Vec2) {
    (
        uv + Vec2::new(mix_ratio, 0.0),
        uv - Vec2::new(1.0 - mix_ratio, 0.0),
    )
}

/// Resolve a slide sample, mirroring `fs_slide`.
pub fn slide_sample(uv: Vec2, mix_ratio: f32) -> SlideSample {
    let (one, two) = slide_sample_offsets(uv, mix_ratio);
    if one.x >= 0.0 && one.x < 1.0 {
        SlideSample::One(one)
    } else if two.x >= 0.0 && two.x <= 1.0 {
        SlideSample::Two(two)
    } else {
        SlideSample::Empty
    }
}

/// Lookup of live scene images by id.
///
/// Scene render targets are recreated on resize and reload, so the screen
/// renderer resolves them by id every frame instead of holding references.
pub trait SceneTextures {
    fn scene_texture(&self, id: &SceneId) -> Option<wgpu::TextureView>;
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ScreenUniforms {
    resolution: [f32; 2],
    mix_ratio: f32,
    threshold: f32,
}

/// GPU compositor for the current and loading scene.
pub struct ScreenRenderer {
    pub material: ScreenMaterial,
    copy_pipeline: wgpu::RenderPipeline,
    fade_pipeline: wgpu::RenderPipeline,
    blend_pipeline: wgpu::RenderPipeline,
    slide_pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    mix_map: Texture,
    placeholder: Texture,
    texture_one: Option<wgpu::TextureView>,
    texture_two: Option<wgpu::TextureView>,
}

impl ScreenRenderer {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Screen Shader"),
            source: wgpu::ShaderSource::Wgsl(SCREEN_SHADER.into()),
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Screen Uniforms"),
            size: std::mem::size_of::<ScreenUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Screen Sampler"),
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
            label: Some("Screen Bind Group Layout"),
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
                texture_entry(2),
                texture_entry(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Screen Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, entry_point: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: gpu.format(),
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
            })
        };

        Self {
            material: ScreenMaterial::default(),
            copy_pipeline: make_pipeline("Screen Copy Pipeline", "fs_copy"),
            fade_pipeline: make_pipeline("Screen Fade Pipeline", "fs_fade"),
            blend_pipeline: make_pipeline("Screen Blend Pipeline", "fs_blend"),
            slide_pipeline: make_pipeline("Screen Slide Pipeline", "fs_slide"),
            uniform_buffer,
            bind_group_layout,
            sampler,
            mix_map: Texture::mix_map(gpu, MIX_MAP_SIZE, 0x5eed),
            placeholder: Texture::solid(gpu, [0, 0, 0, 255], "Screen Placeholder"),
            texture_one: None,
            texture_two: None,
        }
    }

    pub fn set_kind(&mut self, kind: TransitionKind) {
        self.material.kind = kind;
    }

    /// Clamped setter, see [`ScreenMaterial::set_mix_ratio`].
    pub fn set_mix_ratio(&mut self, ratio: f32) -> f32 {
        self.material.set_mix_ratio(ratio)
    }

    /// Re-resolve the scene images. Call once per frame before [`render`](Self::render).
    pub fn update(
        &mut self,
        current: Option<&SceneId>,
        loading: Option<&SceneId>,
        source: &dyn SceneTextures,
    ) {
        self.texture_one = current.and_then(|id| source.scene_texture(id));
        self.texture_two = loading.and_then(|id| source.scene_texture(id));
    }

    /// True while two scene images are available to mix.
    pub fn is_mixing(&self) -> bool {
        self.texture_one.is_some() && self.texture_two.is_some()
    }

    /// Draw the composite into `target`. Passes texture one straight through
    /// when nothing is loading.
    pub fn render(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) {
        let (one, two, pipeline) = match (&self.texture_one, &self.texture_two) {
            (Some(one), Some(two)) => match self.material.kind {
                // Instant switch: show the incoming image once the ratio lands.
                TransitionKind::None if self.material.mix_ratio() >= 1.0 => {
                    (two, two, &self.copy_pipeline)
                }
                TransitionKind::None => (one, two, &self.copy_pipeline),
                TransitionKind::Fade => (one, two, &self.fade_pipeline),
                TransitionKind::Blend => (one, two, &self.blend_pipeline),
                TransitionKind::Slide => (one, two, &self.slide_pipeline),
            },
            (Some(one), None) => (one, one, &self.copy_pipeline),
            (None, Some(two)) => (two, two, &self.copy_pipeline),
            (None, None) => (
                self.placeholder.view(),
                self.placeholder.view(),
                &self.copy_pipeline,
            ),
        };

        let uniforms = ScreenUniforms {
            resolution: [gpu.width() as f32, gpu.height() as f32],
            mix_ratio: self.material.mix_ratio(),
            threshold: self.material.threshold,
        };
        gpu.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Screen Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(one),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(two),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(self.mix_map.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Screen Composite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
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
