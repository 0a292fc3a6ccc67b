//! Hotspot picking: which hotspot is under the pointer.
//!
//! Two strategies are available:
//!
//! - [`PickingRaycast`] casts a [`Ray`] from the eye through the pointer and
//!   tests it against each hotspot's [`Collider`].
//! - [`PickingDrawpass`] renders raycastable hotspots with their index
//!   encoded as a flat color into a small scissored region around the
//!   pointer, then reads back the pixel under it.
//!
//! Both only consider hotspots that are ready and interactive. HUD hotspots
//! sit on top of the panorama and are hit-tested first, in screen space,
//! whichever strategy is configured.

use std::rc::Rc;
use std::sync::mpsc;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::camera::Camera;
use crate::gpu::GpuContext;
use crate::layout::PixelRect;
use crate::mesh::Transform;
use crate::mesh_pass::{MeshPass, MeshShader};
use crate::objects::{Hotspot, HudAnchor, ObjectRenderer, Placement};
use crate::render_target::RenderTarget;
use crate::view::ViewProjection;

/// Color format of the id target. Unorm so ids survive without sRGB conversion.
pub const PICK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Preferred gap between the pick region and the target edges, in pixels.
pub const PICK_INSET: u32 = 20;
/// Pick region size as a fraction of the target size.
pub const PICK_FRACTION: f32 = 0.2;

/// How pointer picks are resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PickingStrategy {
    /// Ray against hotspot colliders.
    #[default]
    Raycast,
    /// Read back an id buffer under the pointer.
    Drawpass,
}

impl From<String> for PickingStrategy {
    fn from(name: String) -> Self {
        match name.as_str() {
            "raycast" => PickingStrategy::Raycast,
            "drawpass" => PickingStrategy::Drawpass,
            other => {
                warn!(picking = other, "unknown picking strategy, using raycast");
                PickingStrategy::Raycast
            }
        }
    }
}

impl From<PickingStrategy> for String {
    fn from(strategy: PickingStrategy) -> Self {
        match strategy {
            PickingStrategy::Raycast => "raycast",
            PickingStrategy::Drawpass => "drawpass",
        }
        .to_string()
    }
}

/// A ray in 3D space, used for raycasting and picking.
///
/// # Example
///
/// ```
/// use panoview::{Ray, Vec3};
///
/// let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -2.0));
/// assert_eq!(ray.point_at(10.0), Vec3::new(0.0, 0.0, -10.0));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    /// Normalized direction.
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray. The direction is normalized.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Ray from the camera eye through `ndc`, bent by the viewport's lens.
    pub fn from_view(
        ndc: Vec2,
        camera: &Camera,
        projection: &dyn ViewProjection,
        aspect: f32,
    ) -> Self {
        Self::new(
            camera.position(),
            projection.screen_to_world(ndc, camera, aspect),
        )
    }

    #[inline]
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Distance to an axis-aligned box, or `None` if missed.
    pub fn intersect_aabb(&self, min: Vec3, max: Vec3) -> Option<f32> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for i in 0..3 {
            let origin = self.origin[i];
            let dir = self.direction[i];

            if dir.abs() < f32::EPSILON {
                if origin < min[i] || origin > max[i] {
                    return None;
                }
            } else {
                let inv_dir = 1.0 / dir;
                let mut t1 = (min[i] - origin) * inv_dir;
                let mut t2 = (max[i] - origin) * inv_dir;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }

        if t_min > 0.0 {
            Some(t_min)
        } else if t_max > 0.0 {
            Some(t_max)
        } else {
            None
        }
    }

    /// Distance to a sphere, or `None` if missed.
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let a = self.direction.dot(self.direction);
        let b = 2.0 * oc.dot(self.direction);
        let c = oc.dot(oc) - radius * radius;
        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 || a == 0.0 {
            return None;
        }

        let sqrt_disc = discriminant.sqrt();
        let t1 = (-b - sqrt_disc) / (2.0 * a);
        let t2 = (-b + sqrt_disc) / (2.0 * a);
        if t1 > 0.0 {
            Some(t1)
        } else if t2 > 0.0 {
            Some(t2)
        } else {
            None
        }
    }
}

/// Collision shape attached to a hotspot, in its local units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Collider {
    /// Axis-aligned box given by half-extents.
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
}

impl Collider {
    /// Box collider from full dimensions.
    pub fn box_collider(size: Vec3) -> Self {
        Self::Box {
            half_extents: size * 0.5,
        }
    }

    pub fn sphere(radius: f32) -> Self {
        Self::Sphere { radius }
    }

    /// Distance along `ray` to this collider placed by `transform`.
    pub fn intersect(&self, ray: &Ray, transform: &Transform) -> Option<f32> {
        match self {
            Collider::Box { half_extents } => {
                let half = *half_extents * transform.scale;
                ray.intersect_aabb(transform.position - half, transform.position + half)
            }
            Collider::Sphere { radius } => {
                let scale = transform.scale.max_element();
                ray.intersect_sphere(transform.position, radius * scale)
            }
        }
    }
}

impl Default for Collider {
    fn default() -> Self {
        Self::Sphere { radius: 0.5 }
    }
}

/// The hotspot under the pointer.
#[derive(Clone, Debug, PartialEq)]
pub struct PickResult {
    pub entity: hecs::Entity,
    pub hotspot_id: String,
    /// Distance from the eye, zero for draw-pass picks.
    pub distance: f32,
    /// World position of the hit, the hotspot position for draw-pass picks,
    /// the sprite centre in screen units for HUD picks.
    pub point: Vec3,
}

/// Collider-based picking.
pub struct PickingRaycast;

impl PickingRaycast {
    /// Closest raycastable hotspot hit by `ray`.
    pub fn pick(objects: &ObjectRenderer, ray: &Ray) -> Option<PickResult> {
        let mut best: Option<PickResult> = None;
        for entity in objects.raycastable() {
            let Ok(mut query) = objects
                .world
                .query_one::<(&Transform, &Collider, &Hotspot)>(entity)
            else {
                continue;
            };
            let Some((transform, collider, hotspot)) = query.get() else {
                continue;
            };
            let Some(distance) = collider.intersect(ray, transform) else {
                continue;
            };
            if best.as_ref().is_none_or(|b| distance < b.distance) {
                best = Some(PickResult {
                    entity,
                    hotspot_id: hotspot.id.clone(),
                    distance,
                    point: ray.point_at(distance),
                });
            }
        }
        best
    }

    /// HUD hotspot under `ndc`, tested against the drawn sprites.
    pub fn pick_hud(objects: &ObjectRenderer, ndc: Vec2, aspect: f32) -> Option<PickResult> {
        let entity = objects.hud_hit(ndc, aspect)?;
        let hotspot = objects.hotspot(entity)?;
        let anchor = objects.world.get::<&HudAnchor>(entity).ok()?.0;
        Some(PickResult {
            entity,
            hotspot_id: hotspot.id,
            distance: 0.0,
            point: Vec3::new(anchor.x * aspect, anchor.y, 0.0),
        })
    }
}

/// Encode a draw index as a color. Index `i` becomes id `i + 1`; black means nothing.
pub fn encode_id(index: usize) -> [f32; 4] {
    let id = (index as u32).wrapping_add(1) & 0x00ff_ffff;
    [
        (id & 0xff) as f32 / 255.0,
        ((id >> 8) & 0xff) as f32 / 255.0,
        ((id >> 16) & 0xff) as f32 / 255.0,
        1.0,
    ]
}

/// Decode a read-back pixel into a draw index, `None` for background.
pub fn decode_id(pixel: [u8; 4]) -> Option<usize> {
    let id = pixel[0] as u32 | (pixel[1] as u32) << 8 | (pixel[2] as u32) << 16;
    (id > 0).then(|| id as usize - 1)
}

/// Scissor region for a draw-pass pick: `PICK_FRACTION` of the target,
/// centred on the pointer and kept `PICK_INSET` pixels inside the edges
/// when the target allows it. The region always contains the pointer pixel.
pub fn pick_region(pointer: Vec2, target_width: u32, target_height: u32) -> PixelRect {
    let axis = |p: f32, size: u32| -> (u32, u32) {
        let size = size.max(1);
        let extent = ((size as f32 * PICK_FRACTION).round() as u32).clamp(1, size);
        let (lo, hi) = if size > 2 * PICK_INSET + extent {
            (PICK_INSET, size - PICK_INSET - extent)
        } else {
            (0, size - extent)
        };
        let pixel = p.clamp(0.0, (size - 1) as f32) as u32;
        let centred = ((p - extent as f32 * 0.5).round().max(0.0) as u32).min(size - extent);
        let start = centred
            .clamp(lo, hi)
            .clamp((pixel + 1).saturating_sub(extent), pixel.min(size - extent));
        (start, extent)
    };
    let (x, width) = axis(pointer.x, target_width);
    let (y, height) = axis(pointer.y, target_height);
    PixelRect {
        x,
        y,
        width,
        height,
    }
}

/// Id-buffer picking.
pub struct PickingDrawpass {
    target: Option<RenderTarget>,
    readback: wgpu::Buffer,
}

impl PickingDrawpass {
    pub fn new(gpu: &GpuContext) -> Self {
        let readback = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Picking Readback"),
            size: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            target: None,
            readback,
        }
    }

    /// Render ids around `pointer` (target pixels) and read back the one under it.
    #[allow(clippy::too_many_arguments)]
    pub fn pick(
        &mut self,
        gpu: &GpuContext,
        mesh_pass: &mut MeshPass,
        objects: &mut ObjectRenderer,
        camera: &Camera,
        projection: &dyn ViewProjection,
        viewport: PixelRect,
        pointer: Vec2,
    ) -> Option<PickResult> {
        if self.target.is_none() {
            self.target = Some(RenderTarget::with_format(
                gpu,
                "Picking Target",
                gpu.width(),
                gpu.height(),
                PICK_FORMAT,
                true,
            ));
        }
        let target = self.target.as_mut()?;
        target.ensure_size(gpu, "Picking Target");
        let (width, height) = (target.width(), target.height());
        if pointer.x < 0.0
            || pointer.y < 0.0
            || pointer.x >= width as f32
            || pointer.y >= height as f32
        {
            return None;
        }

        let aspect = viewport.aspect();
        let entities = objects.raycastable();
        let mut placements: Vec<Placement> = objects.placements(&entities, camera, projection, aspect);
        if placements.is_empty() {
            return None;
        }
        for (index, placement) in placements.iter_mut().enumerate() {
            placement.color = encode_id(index);
        }

        let region = pick_region(pointer, width, height);
        let id_material = Rc::new(mesh_pass.create_material(
            gpu,
            MeshShader::PickingId,
            PICK_FORMAT,
        ));

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Picking Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Picking Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: target.depth_view.as_ref().map(|view| {
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
            pass.set_viewport(
                viewport.x as f32,
                viewport.y as f32,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );
            pass.set_scissor_rect(region.x, region.y, region.width, region.height);

            // The guard restores the pass's own materials however this block exits.
            let guard = mesh_pass.override_with(id_material);
            objects.draw_placements(gpu, &guard, &mut pass, &placements, aspect, 0.0, None);
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: pointer.x as u32,
                    y: pointer.y as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let pixel = self.read_pixel(gpu)?;
        let index = decode_id(pixel)?;
        trace!(?pixel, index, "picked id");
        let placement = placements.get(index)?;
        let hotspot = objects.hotspot(placement.entity)?;
        let point = objects
            .world
            .get::<&Transform>(placement.entity)
            .map(|t| t.position)
            .unwrap_or(Vec3::ZERO);
        Some(PickResult {
            entity: placement.entity,
            hotspot_id: hotspot.id,
            distance: 0.0,
            point,
        })
    }

    fn read_pixel(&self, gpu: &GpuContext) -> Option<[u8; 4]> {
        let slice = self.readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        if let Err(err) = gpu.device.poll(wgpu::PollType::wait_indefinitely()) {
            warn!(%err, "device poll failed during picking readback");
        }
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(%err, "picking readback failed");
                return None;
            }
            Err(_) => return None,
        }
        let pixel = {
            let data = slice.get_mapped_range();
            [data[0], data[1], data[2], data[3]]
        };
        self.readback.unmap();
        Some(pixel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::HotspotDescriptor;
    use crate::view::RectilinearView;
    use approx::assert_abs_diff_eq;

    #[test]
    fn ray_hits_sphere_in_front() {
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        let hit = ray.intersect_sphere(Vec3::new(0.0, 0.0, -10.0), 1.0);
        assert_abs_diff_eq!(hit.unwrap(), 9.0, epsilon = 1e-5);
        assert!(ray.intersect_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0).is_none());
    }

    #[test]
    fn ray_hits_box() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let hit = ray.intersect_aabb(Vec3::new(4.0, -1.0, -1.0), Vec3::new(6.0, 1.0, 1.0));
        assert_abs_diff_eq!(hit.unwrap(), 4.0, epsilon = 1e-5);
        assert!(ray.intersect_aabb(Vec3::splat(-6.0), Vec3::splat(-4.0)).is_none());
    }

    #[test]
    fn ids_round_trip_and_zero_is_background() {
        for index in [0usize, 1, 254, 255, 256, 70_000] {
            let color = encode_id(index);
            let pixel = color.map(|c| (c * 255.0).round() as u8);
            assert_eq!(decode_id(pixel), Some(index));
        }
        assert_eq!(decode_id([0, 0, 0, 0]), None);
        assert_eq!(decode_id([0, 0, 0, 255]), None);
    }

    #[test]
    fn pick_region_is_centred_and_inset() {
        let region = pick_region(Vec2::new(500.0, 400.0), 1000, 800);
        assert_eq!((region.width, region.height), (200, 160));
        assert_eq!((region.x, region.y), (400, 320));

        let corner = pick_region(Vec2::new(30.0, 30.0), 1000, 800);
        assert_eq!((corner.x, corner.y), (PICK_INSET, PICK_INSET));

        let far = pick_region(Vec2::new(960.0, 760.0), 1000, 800);
        assert_eq!(far.x + far.width, 1000 - PICK_INSET);
        assert_eq!(far.y + far.height, 800 - PICK_INSET);
    }

    #[test]
    fn pick_region_contains_pointer_near_edges() {
        let inside = |region: PixelRect, x: u32, y: u32| {
            region.x <= x && x < region.x + region.width && region.y <= y && y < region.y + region.height
        };
        let region = pick_region(Vec2::new(5.0, 5.0), 1000, 800);
        assert_eq!((region.x, region.y), (5, 5));
        assert!(inside(region, 5, 5));

        for (x, y) in [(0, 0), (3, 790), (999, 799), (999, 10), (500, 1), (19, 400)] {
            let region = pick_region(Vec2::new(x as f32, y as f32), 1000, 800);
            assert!(inside(region, x, y), "pointer ({x}, {y}) outside {region:?}");
            assert!(region.x + region.width <= 1000 && region.y + region.height <= 800);
        }
    }

    #[test]
    fn pick_region_fits_tiny_targets() {
        let region = pick_region(Vec2::new(5.0, 5.0), 10, 10);
        assert!(region.x + region.width <= 10);
        assert!(region.width >= 1 && region.height >= 1);
    }

    #[test]
    fn raycast_picks_closest_interactive_hotspot() {
        let mut objects = ObjectRenderer::new();
        objects.spawn_hotspot(&HotspotDescriptor {
            id: "far".into(),
            distance: 20.0,
            size: 2.0,
            ..Default::default()
        });
        objects.spawn_hotspot(&HotspotDescriptor {
            id: "near".into(),
            distance: 10.0,
            size: 2.0,
            ..Default::default()
        });
        objects.spawn_hotspot(&HotspotDescriptor {
            id: "decor".into(),
            distance: 5.0,
            size: 2.0,
            interactive: false,
            ..Default::default()
        });

        let camera = Camera::new();
        let ray = Ray::from_view(Vec2::ZERO, &camera, &RectilinearView, 1.0);
        let hit = PickingRaycast::pick(&objects, &ray).unwrap();
        assert_eq!(hit.hotspot_id, "near");
        assert_abs_diff_eq!(hit.distance, 9.0, epsilon = 1e-4);

        let away = Ray::from_view(Vec2::ZERO, &camera.looking(180.0, 0.0), &RectilinearView, 1.0);
        assert!(PickingRaycast::pick(&objects, &away).is_none());
    }

    #[test]
    fn hud_hotspots_pick_in_screen_space_only() {
        let mut objects = ObjectRenderer::new();
        objects.spawn_hotspot(&HotspotDescriptor {
            id: "menu".into(),
            hud: true,
            yaw: 50.0,
            size: 2.0,
            ..Default::default()
        });

        // Looking where the anchor's yaw would point in the world finds nothing.
        let camera = Camera::new().looking(50.0, 0.0);
        let ray = Ray::from_view(Vec2::ZERO, &camera, &RectilinearView, 1.0);
        assert!(PickingRaycast::pick(&objects, &ray).is_none());

        let hit = PickingRaycast::pick_hud(&objects, Vec2::new(0.5, 0.0), 1.0).unwrap();
        assert_eq!(hit.hotspot_id, "menu");
        assert!(PickingRaycast::pick_hud(&objects, Vec2::ZERO, 1.0).is_none());
    }

    #[test]
    fn strategy_parses_from_config() {
        let strategy: PickingStrategy = serde_json::from_str("\"drawpass\"").unwrap();
        assert_eq!(strategy, PickingStrategy::Drawpass);
        assert_eq!(PickingStrategy::default(), PickingStrategy::Raycast);
    }
}
