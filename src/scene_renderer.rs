//! Renders one scene into its own off-screen target.
//!
//! The screen compositor mixes the targets of the current and the loading
//! scene, so every scene renders independently of what is on screen.

use std::rc::Rc;

use glam::Vec2;
use image::RgbaImage;
use tracing::{debug, trace};

use crate::background::{MaterialPool, SceneMedia};
use crate::camera::Camera;
use crate::gpu::GpuContext;
use crate::keyframe::{CameraKeyframe, Track};
use crate::layout::{Layout, PixelRect};
use crate::loader::{LoadKey, TileKey};
use crate::media::MediaFormat;
use crate::mesh_pass::MeshPass;
use crate::objects::ObjectRenderer;
use crate::picking::{PickResult, PickingDrawpass, PickingRaycast, Ray};
use crate::render_target::RenderTarget;
use crate::scene::{SceneDescriptor, SceneId};
use crate::texture::Texture;
use crate::transition::TransitionSpec;
use crate::view::ViewType;
use crate::viewport::{DrawStep, FrameStats, Layers, ViewportManager, ViewportResources};

const TARGET_LABEL: &str = "Scene Target";

/// Normalized device coordinates of a pixel inside `rect`.
pub fn pixel_to_ndc(pointer: Vec2, rect: PixelRect) -> Vec2 {
    let u = (pointer.x - rect.x as f32) / rect.width.max(1) as f32;
    let v = (pointer.y - rect.y as f32) / rect.height.max(1) as f32;
    Vec2::new(u * 2.0 - 1.0, 1.0 - v * 2.0)
}

/// One scene: its media, hotspots, camera and viewports.
pub struct SceneRenderer {
    pub scene_id: SceneId,
    descriptor: SceneDescriptor,
    target: RenderTarget,
    pub camera: Camera,
    camera_track: Track<CameraKeyframe>,
    viewports: ViewportManager,
    pub objects: ObjectRenderer,
    pub media: SceneMedia,
    time: f32,
    stats: FrameStats,
}

impl SceneRenderer {
    pub fn new(
        gpu: &GpuContext,
        descriptor: &SceneDescriptor,
        layout: Layout,
        view_type: ViewType,
        background_transition: TransitionSpec,
        texture_budget: u64,
    ) -> Self {
        let viewports = ViewportManager::new(
            layout,
            descriptor.background_type(),
            descriptor.media.format,
            view_type,
            background_transition,
        );
        let fov = view_type.projection().clamp_fov(descriptor.camera.fov);
        let camera = Camera::new()
            .looking(descriptor.camera.yaw, descriptor.camera.pitch)
            .with_fov(fov);

        let mut objects = ObjectRenderer::new();
        objects.spawn_all(&descriptor.hotspots);

        debug!(
            scene = %descriptor.id,
            background = descriptor.background_type().name(),
            format = descriptor.media.format.name(),
            hotspots = descriptor.hotspots.len(),
            "scene renderer created"
        );

        Self {
            scene_id: descriptor.id.clone(),
            descriptor: descriptor.clone(),
            target: RenderTarget::with_depth(gpu, TARGET_LABEL),
            camera,
            camera_track: Track::from_keys(descriptor.camera_track.iter().copied()),
            viewports,
            objects,
            media: SceneMedia::new(&descriptor.media, texture_budget),
            time: 0.0,
            stats: FrameStats::default(),
        }
    }

    pub fn descriptor(&self) -> &SceneDescriptor {
        &self.descriptor
    }

    pub fn viewports(&self) -> &ViewportManager {
        &self.viewports
    }

    pub fn view_type(&self) -> ViewType {
        self.viewports.view_type()
    }

    /// Fov range of the active view.
    pub fn fov_limits(&self) -> (f32, f32) {
        self.view_type().projection().fov_limits()
    }

    pub fn set_view(&mut self, view_type: ViewType) {
        self.viewports.set_view(view_type);
        self.camera.fov = view_type.projection().clamp_fov(self.camera.fov);
    }

    pub fn set_layout(&mut self, layout: Layout) {
        self.viewports.set_layout(layout);
    }

    /// Keep the target the size of the surface.
    pub fn resize(&mut self, gpu: &GpuContext) {
        if self.target.ensure_size(gpu, TARGET_LABEL) {
            trace!(scene = %self.scene_id, width = gpu.width(), height = gpu.height(), "scene target resized");
        }
    }

    pub fn texture_view(&self) -> &wgpu::TextureView {
        &self.target.view
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    /// The scene's media is available, so it can be shown.
    pub fn is_ready(&self) -> bool {
        self.media.is_ready()
    }

    pub fn last_stats(&self) -> FrameStats {
        self.stats
    }

    /// Seconds since this scene was created.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Advance animations and refresh viewports.
    pub fn update(&mut self, dt: f32) {
        self.time += dt;
        if !self.camera_track.is_empty() && self.time <= self.camera_track.duration() {
            if let Some(key) = self.camera_track.sample(self.time) {
                self.camera.yaw = key.yaw;
                self.camera.set_pitch(key.pitch);
                self.camera.fov = self.view_type().projection().clamp_fov(key.fov);
            }
        }
        self.objects.update(self.time);
        self.viewports.update(
            &self.camera,
            self.target.width(),
            self.target.height(),
            dt,
        );
    }

    /// Upload a decoded image to wherever `key` says it belongs.
    pub fn apply_image(&mut self, gpu: &GpuContext, key: &LoadKey, image: &RgbaImage, now: f64) {
        let (width, height) = image.dimensions();
        let label = format!("{} {:?}", self.scene_id, key);
        match key {
            LoadKey::Media(_) | LoadKey::Preview(_) => {
                let texture = if self.media.format == MediaFormat::Equirectangular {
                    Texture::from_rgba_wrapping(gpu, image, width, height, &label)
                } else {
                    Texture::from_image(gpu, image, &label)
                };
                if matches!(key, LoadKey::Media(_)) {
                    self.media.set_texture(Rc::new(texture));
                } else {
                    self.media.set_preview(Rc::new(texture));
                }
            }
            LoadKey::Tile(_, tile) => {
                let texture = Texture::from_image(gpu, image, &label);
                self.media.tiles.insert(*tile, Rc::new(texture), now);
            }
            LoadKey::Hotspot(_, id) => {
                let texture = Texture::from_image(gpu, image, &label);
                self.objects.set_ready(id, Some(Rc::new(texture)));
            }
        }
    }

    /// Tiles the views want that are not loaded yet.
    pub fn missing_tiles(&self) -> Vec<TileKey> {
        if self.media.format != MediaFormat::Tiled {
            return Vec::new();
        }
        self.viewports
            .wanted_tiles()
            .into_iter()
            .filter(|key| !self.media.tiles.contains(key))
            .collect()
    }

    /// Record tile use for this frame and drop tiles over budget.
    pub fn maintain_tiles(&mut self, now: f64) {
        if self.media.format != MediaFormat::Tiled {
            return;
        }
        self.media.tiles.touch(&self.viewports.drawn_tiles(), now);
        self.media.tiles.evict();
    }

    /// Draw `layers` of every viewport into `color`, or the scene target when
    /// `None`. A render that includes the background clears the target and
    /// starts this frame's stats; an objects-only render draws over what is
    /// there and adds to them.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        pool: &mut MaterialPool,
        mesh_pass: &MeshPass,
        layers: Layers,
        color: Option<&wgpu::TextureView>,
    ) -> FrameStats {
        let (width, height) = (self.target.width(), self.target.height());
        let clears = layers.includes(DrawStep::Background);
        let load = if clears {
            wgpu::LoadOp::Clear(wgpu::Color::BLACK)
        } else {
            wgpu::LoadOp::Load
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color.unwrap_or(&self.target.view),
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: self.target.depth_view.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let resources = ViewportResources {
            gpu,
            pool,
            media: &self.media,
            mesh_pass,
            objects: &mut self.objects,
            time: self.time,
        };
        let stats = self
            .viewports
            .render(resources, &mut pass, width, height, layers);
        if clears {
            self.stats = stats;
        } else {
            self.stats.merge(stats);
        }
        stats
    }

    /// Collider pick at a pixel of the scene target.
    pub fn pick_raycast(&self, pointer: Vec2) -> Option<PickResult> {
        let (index, rect) = self.viewports.viewport_at(
            pointer.x,
            pointer.y,
            self.target.width(),
            self.target.height(),
        )?;
        let viewport = self.viewports.viewports().get(index)?;
        let ray = Ray::from_view(
            pixel_to_ndc(pointer, rect),
            &viewport.camera,
            viewport.background.projection(),
            rect.aspect(),
        );
        PickingRaycast::pick(&self.objects, &ray)
    }

    /// HUD pick at a pixel of the scene target.
    pub fn pick_hud(&self, pointer: Vec2) -> Option<PickResult> {
        let (_, rect) = self.viewports.viewport_at(
            pointer.x,
            pointer.y,
            self.target.width(),
            self.target.height(),
        )?;
        PickingRaycast::pick_hud(&self.objects, pixel_to_ndc(pointer, rect), rect.aspect())
    }

    /// Id-buffer pick at a pixel of the scene target.
    pub fn pick_drawpass(
        &mut self,
        gpu: &GpuContext,
        mesh_pass: &mut MeshPass,
        drawpass: &mut PickingDrawpass,
        pointer: Vec2,
    ) -> Option<PickResult> {
        let (index, rect) = self.viewports.viewport_at(
            pointer.x,
            pointer.y,
            self.target.width(),
            self.target.height(),
        )?;
        let viewport = self.viewports.viewports().get(index)?;
        drawpass.pick(
            gpu,
            mesh_pass,
            &mut self.objects,
            &viewport.camera,
            viewport.background.projection(),
            rect,
            pointer,
        )
    }

    /// Release GPU resources held by the backgrounds.
    pub fn destroy(&mut self) {
        self.viewports.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_to_ndc_maps_rect_corners() {
        let rect = PixelRect {
            x: 100,
            y: 0,
            width: 200,
            height: 100,
        };
        assert_eq!(pixel_to_ndc(Vec2::new(100.0, 0.0), rect), Vec2::new(-1.0, 1.0));
        assert_eq!(pixel_to_ndc(Vec2::new(200.0, 50.0), rect), Vec2::ZERO);
        assert_eq!(pixel_to_ndc(Vec2::new(300.0, 100.0), rect), Vec2::new(1.0, -1.0));
    }
}
