//! Depth-tested textured mesh rendering for hotspot markers.
//!
//! The mesh pass uses three bind groups:
//! - **Group 0**: Camera uniforms (view-projection, camera position, time)
//! - **Group 1**: Model uniforms (model matrix, color)
//! - **Group 2**: Texture and sampler for the mesh surface
//!
//! Uniforms are written into fresh buffers per call rather than one shared
//! buffer, because every viewport of a frame records into the same
//! submission and a shared buffer would only hold the last write.
//!
//! # Override material
//!
//! Picking draws the same meshes with an id material instead of the normal
//! one. [`MeshPass::override_with`] installs it and returns an
//! [`OverrideGuard`] that puts the normal material back when dropped, on every
//! exit path.

use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;
use crate::mesh::{Mesh, Transform, Vertex3d};
use crate::render_target::DEPTH_FORMAT;
use crate::texture::Texture;

const MESH_SHADER: &str = include_str!("shaders/mesh.wgsl");

/// Camera uniforms for 3D rendering.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub time: f32,
}

/// Per-draw model uniforms.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelUniforms {
    pub model: [[f32; 4]; 4],
    /// RGBA multiplier. The id material reads the encoded id from rgb.
    pub color: [f32; 4],
}

/// Which fragment shader a material runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeshShader {
    /// Texture times color, alpha blended, depth tested.
    Textured,
    /// Same as `Textured` but always on top.
    Overlay,
    /// Flat encoded id, no blending.
    PickingId,
}

/// A pipeline the mesh pass can draw with.
pub struct MeshMaterial {
    pub shader: MeshShader,
    pipeline: wgpu::RenderPipeline,
}

/// Something whose temporary override can be cleared.
pub trait ClearOverride {
    fn clear_override(&mut self);
}

/// Clears the owner's override when dropped, on every exit path.
///
/// Derefs to the owner so rendering goes through the guard while it lives.
pub struct OverrideGuard<'a, P: ClearOverride> {
    owner: &'a mut P,
}

impl<'a, P: ClearOverride> OverrideGuard<'a, P> {
    pub fn new(owner: &'a mut P) -> Self {
        Self { owner }
    }
}

impl<P: ClearOverride> Deref for OverrideGuard<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        self.owner
    }
}

impl<P: ClearOverride> DerefMut for OverrideGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        self.owner
    }
}

impl<P: ClearOverride> Drop for OverrideGuard<'_, P> {
    fn drop(&mut self) {
        self.owner.clear_override();
    }
}

/// A mesh queued for drawing.
pub struct DrawCall<'a> {
    pub mesh: &'a Mesh,
    pub transform: Transform,
    pub color: [f32; 4],
    /// `None` draws with a 1x1 white texture.
    pub texture: Option<&'a Texture>,
}

/// Camera state for one [`MeshPass::render`] call.
#[derive(Clone, Copy, Debug)]
pub struct MeshCamera {
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// Renders textured meshes with depth testing.
pub struct MeshPass {
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    camera_bind_group_layout: wgpu::BindGroupLayout,
    model_bind_group_layout: wgpu::BindGroupLayout,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    default_texture: Texture,
    material: Rc<MeshMaterial>,
    overlay: Rc<MeshMaterial>,
    override_material: Option<Rc<MeshMaterial>>,
}

impl MeshPass {
    /// Create a mesh pass drawing into targets of `format` with a depth attachment.
    pub fn new(gpu: &GpuContext, format: wgpu::TextureFormat) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(MESH_SHADER.into()),
        });

        let uniform_layout = |label| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
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
            })
        };
        let camera_bind_group_layout = uniform_layout("Camera Bind Group Layout");
        let model_bind_group_layout = uniform_layout("Model Bind Group Layout");

        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Texture Bind Group Layout"),
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
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[
                &camera_bind_group_layout,
                &model_bind_group_layout,
                &texture_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        let default_texture = Texture::solid(gpu, [255, 255, 255, 255], "Default White Texture");

        let material = build_material(gpu, &shader, &pipeline_layout, MeshShader::Textured, format);
        let overlay = build_material(gpu, &shader, &pipeline_layout, MeshShader::Overlay, format);

        Self {
            shader,
            pipeline_layout,
            camera_bind_group_layout,
            model_bind_group_layout,
            texture_bind_group_layout,
            default_texture,
            material: Rc::new(material),
            overlay: Rc::new(overlay),
            override_material: None,
        }
    }

    /// Build a material sharing this pass's layouts.
    pub fn create_material(
        &self,
        gpu: &GpuContext,
        shader: MeshShader,
        format: wgpu::TextureFormat,
    ) -> MeshMaterial {
        build_material(gpu, &self.shader, &self.pipeline_layout, shader, format)
    }

    /// Material used for HUD draws.
    pub fn overlay_material(&self) -> Rc<MeshMaterial> {
        Rc::clone(&self.overlay)
    }

    pub fn set_override_material(&mut self, material: Rc<MeshMaterial>) {
        self.override_material = Some(material);
    }

    pub fn take_override_material(&mut self) -> Option<Rc<MeshMaterial>> {
        self.override_material.take()
    }

    pub fn has_override(&self) -> bool {
        self.override_material.is_some()
    }

    /// Install `material` until the returned guard is dropped.
    pub fn override_with(&mut self, material: Rc<MeshMaterial>) -> OverrideGuard<'_, MeshPass> {
        self.set_override_material(material);
        OverrideGuard::new(self)
    }

    fn create_texture_bind_group(&self, gpu: &GpuContext, texture: &Texture) -> wgpu::BindGroup {
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Texture Bind Group"),
            layout: &self.texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(texture.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(texture.sampler()),
                },
            ],
        })
    }

    fn uniform_bind_group<T: bytemuck::Pod>(
        &self,
        gpu: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        label: &str,
        value: &T,
    ) -> wgpu::BindGroup {
        let buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(value),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }

    /// Draw `draw_calls` with the override material if one is installed,
    /// else with `material` or the default textured material.
    ///
    /// Returns the number of meshes drawn.
    pub fn render(
        &self,
        gpu: &GpuContext,
        render_pass: &mut wgpu::RenderPass,
        camera: MeshCamera,
        time: f32,
        material: Option<&MeshMaterial>,
        draw_calls: &[DrawCall],
    ) -> usize {
        if draw_calls.is_empty() {
            return 0;
        }

        let material = self
            .override_material
            .as_deref()
            .or(material)
            .unwrap_or(&self.material);

        let camera_uniforms = CameraUniforms {
            view_proj: camera.view_proj.to_cols_array_2d(),
            camera_pos: camera.position.to_array(),
            time,
        };
        let camera_bind_group = self.uniform_bind_group(
            gpu,
            &self.camera_bind_group_layout,
            "Camera Uniforms",
            &camera_uniforms,
        );

        render_pass.set_pipeline(&material.pipeline);
        render_pass.set_bind_group(0, &camera_bind_group, &[]);

        for call in draw_calls {
            let model_uniforms = ModelUniforms {
                model: call.transform.matrix().to_cols_array_2d(),
                color: call.color,
            };
            let model_bind_group = self.uniform_bind_group(
                gpu,
                &self.model_bind_group_layout,
                "Model Uniforms",
                &model_uniforms,
            );
            render_pass.set_bind_group(1, &model_bind_group, &[]);

            let texture = call.texture.unwrap_or(&self.default_texture);
            let texture_bind_group = self.create_texture_bind_group(gpu, texture);
            render_pass.set_bind_group(2, &texture_bind_group, &[]);

            call.mesh.draw(render_pass);
        }
        draw_calls.len()
    }
}

fn build_material(
    gpu: &GpuContext,
    module: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    shader: MeshShader,
    format: wgpu::TextureFormat,
) -> MeshMaterial {
    let (entry_point, blend, depth_write, depth_compare) = match shader {
        MeshShader::Textured => (
            "fs",
            wgpu::BlendState::ALPHA_BLENDING,
            true,
            wgpu::CompareFunction::Less,
        ),
        MeshShader::Overlay => (
            "fs",
            wgpu::BlendState::ALPHA_BLENDING,
            false,
            wgpu::CompareFunction::Always,
        ),
        MeshShader::PickingId => (
            "fs_id",
            wgpu::BlendState::REPLACE,
            true,
            wgpu::CompareFunction::Less,
        ),
    };

    let pipeline = gpu
        .device
        .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("Mesh Pipeline ({shader:?})")),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs"),
                buffers: &[Vertex3d::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some(entry_point),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // Markers are visible from both sides.
                cull_mode: None,
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: depth_write,
                depth_compare,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

    MeshMaterial { shader, pipeline }
}

impl ClearOverride for MeshPass {
    fn clear_override(&mut self) {
        self.override_material = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Slot {
        value: Option<u32>,
    }

    impl ClearOverride for Slot {
        fn clear_override(&mut self) {
            self.value = None;
        }
    }

    fn render_with_early_return(slot: &mut Slot, fail: bool) -> Result<u32, &'static str> {
        slot.value = Some(7);
        let guard = OverrideGuard::new(slot);
        if fail {
            return Err("readback failed");
        }
        Ok(guard.value.unwrap_or(0))
    }

    #[test]
    fn override_is_cleared_on_success() {
        let mut slot = Slot::default();
        assert_eq!(render_with_early_return(&mut slot, false), Ok(7));
        assert_eq!(slot.value, None);
    }

    #[test]
    fn override_is_cleared_on_early_return() {
        let mut slot = Slot::default();
        assert!(render_with_early_return(&mut slot, true).is_err());
        assert_eq!(slot.value, None);
    }

    #[test]
    fn uniform_structs_are_aligned() {
        assert_eq!(std::mem::size_of::<CameraUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<ModelUniforms>() % 16, 0);
    }
}
