//! Hotspots placed in a scene.
//!
//! Hotspots live in a `hecs` world. Each entity carries a [`Transform`] on
//! the viewing sphere and a [`Hotspot`] with its flags. Panorama hotspots add
//! a [`Collider`] for raycast picking; HUD hotspots add a [`HudAnchor`]
//! instead and are hit-tested in screen space. Animated hotspots also carry
//! a [`HotspotTrack`]. Hotspot images stay outside the world, keyed by entity.
//!
//! Hotspots are drawn as screen-facing sprites. Their screen position comes
//! from the viewport's projection, so they stay glued to the panorama under
//! every lens, not only the rectilinear one.

use std::collections::HashMap;
use std::rc::Rc;

use glam::{Mat4, Vec2, Vec3};
use tracing::{debug, warn};

use crate::camera::Camera;
use crate::geometry;
use crate::gpu::GpuContext;
use crate::keyframe::Track;
use crate::mesh::{Mesh, Transform};
use crate::mesh_pass::{DrawCall, MeshCamera, MeshMaterial, MeshPass};
use crate::picking::Collider;
use crate::scene::{HotspotDescriptor, HotspotPose, SceneId};
use crate::texture::Texture;
use crate::view::ViewProjection;

/// Screen units per HUD size unit.
const HUD_SCALE: f32 = 0.1;
/// Distance mapped to the far end of the sprite depth range.
const DEPTH_RANGE: f32 = 1000.0;

/// Flags and appearance of one hotspot.
#[derive(Clone, Debug, PartialEq)]
pub struct Hotspot {
    pub id: String,
    /// Media loaded, or no media needed.
    pub ready: bool,
    pub interactive: bool,
    pub visible: bool,
    pub hud: bool,
    pub color: [f32; 4],
    /// Edge length in world units, or in HUD units for HUD hotspots.
    pub size: f32,
    pub target: Option<SceneId>,
}

/// Keyframed yaw/pitch of an animated hotspot.
pub struct HotspotTrack {
    pub track: Track<HotspotPose>,
    pub distance: f32,
}

/// Screen anchor of a HUD hotspot: x in aspect-scaled units, y in -1..1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HudAnchor(pub Vec2);

/// A hotspot resolved to screen space for one viewport.
pub struct Placement {
    pub entity: hecs::Entity,
    pub transform: Transform,
    pub color: [f32; 4],
    pub texture: Option<Rc<Texture>>,
}

/// Orthographic camera spanning `-aspect..aspect` by `-1..1`.
pub fn screen_camera(aspect: f32) -> MeshCamera {
    let aspect = aspect.max(1e-4);
    MeshCamera {
        view_proj: Mat4::orthographic_rh(-aspect, aspect, -1.0, 1.0, -1.0, 1.0),
        position: Vec3::ZERO,
    }
}

/// Sprite transform of a world point seen through `projection`, in the space
/// of [`screen_camera`]. `None` when the point cannot be projected.
pub fn screen_transform(
    position: Vec3,
    size: f32,
    camera: &Camera,
    projection: &dyn ViewProjection,
    aspect: f32,
) -> Option<Transform> {
    let offset = position - camera.position();
    let distance = offset.length();
    if distance < 1e-4 {
        return None;
    }
    let ndc = projection.world_to_screen(offset, camera, aspect)?;
    let params = projection.params(projection.clamp_fov(camera.fov));
    let extent = size / (distance * params.scale.max(1e-4));
    // Nearer hotspots get a larger z, which the screen camera maps to a smaller depth.
    let z = -(distance / DEPTH_RANGE).clamp(0.0, 0.999);
    Some(
        Transform::new()
            .position(Vec3::new(ndc.x * aspect, ndc.y, z))
            .uniform_scale(extent),
    )
}

/// Owner of a scene's hotspots.
#[derive(Default)]
pub struct ObjectRenderer {
    pub world: hecs::World,
    textures: HashMap<hecs::Entity, Rc<Texture>>,
    sprite: Option<Mesh>,
}

impl ObjectRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a hotspot. It is ready right away unless it waits for an image.
    pub fn spawn_hotspot(&mut self, desc: &HotspotDescriptor) -> hecs::Entity {
        let hotspot = Hotspot {
            id: desc.id.clone(),
            ready: desc.media.is_none(),
            interactive: desc.interactive,
            visible: desc.visible,
            hud: desc.hud,
            color: desc.color,
            size: desc.size.max(0.0),
            target: desc.target.clone(),
        };
        let transform =
            Transform::on_sphere(desc.yaw, desc.pitch, desc.distance).uniform_scale(desc.size);
        // HUD hotspots reuse yaw/pitch as a screen anchor and have no world collider.
        let entity = if desc.hud {
            let anchor = HudAnchor(Vec2::new(desc.yaw / 100.0, desc.pitch / 100.0));
            self.world.spawn((transform, hotspot, anchor))
        } else {
            self.world.spawn((transform, hotspot, Collider::sphere(0.5)))
        };

        if !desc.track.is_empty() {
            let track = HotspotTrack {
                track: Track::from_keys(desc.track.iter().copied()),
                distance: desc.distance,
            };
            if let Err(err) = self.world.insert_one(entity, track) {
                warn!(id = %desc.id, ?err, "hotspot track not attached");
            }
        }
        debug!(id = %desc.id, hud = desc.hud, "spawned hotspot");
        entity
    }

    pub fn spawn_all(&mut self, hotspots: &[HotspotDescriptor]) {
        for desc in hotspots {
            self.spawn_hotspot(desc);
        }
    }

    pub fn find(&self, id: &str) -> Option<hecs::Entity> {
        self.world
            .query::<&Hotspot>()
            .iter()
            .find(|(_, h)| h.id == id)
            .map(|(entity, _)| entity)
    }

    pub fn hotspot(&self, entity: hecs::Entity) -> Option<Hotspot> {
        self.world
            .get::<&Hotspot>(entity)
            .ok()
            .map(|h| (*h).clone())
    }

    /// Mark a hotspot ready, attaching its image if it has one.
    pub fn set_ready(&mut self, id: &str, texture: Option<Rc<Texture>>) -> bool {
        let Some(entity) = self.find(id) else {
            warn!(id, "no hotspot with this id");
            return false;
        };
        if let Ok(mut hotspot) = self.world.get::<&mut Hotspot>(entity) {
            hotspot.ready = true;
        }
        if let Some(texture) = texture {
            self.textures.insert(entity, texture);
        }
        true
    }

    /// Ready, interactive panorama hotspots: the ones world picking considers.
    pub fn raycastable(&self) -> Vec<hecs::Entity> {
        self.select(|h| h.ready && h.interactive && !h.hud)
    }

    /// Ready, visible, interactive HUD hotspots.
    pub fn hud_pickable(&self) -> Vec<hecs::Entity> {
        self.select(|h| h.ready && h.visible && h.interactive && h.hud)
    }

    /// Topmost HUD hotspot under `ndc` in a viewport of `aspect`.
    pub fn hud_hit(&self, ndc: Vec2, aspect: f32) -> Option<hecs::Entity> {
        let point = Vec2::new(ndc.x * aspect, ndc.y);
        // Later sprites draw over earlier ones.
        self.hud_pickable().into_iter().rev().find(|&entity| {
            let Ok(anchor) = self.world.get::<&HudAnchor>(entity) else {
                return false;
            };
            let Ok(hotspot) = self.world.get::<&Hotspot>(entity) else {
                return false;
            };
            let half = hotspot.size * HUD_SCALE * 0.5;
            let centre = Vec2::new(anchor.0.x * aspect, anchor.0.y);
            let offset = (point - centre).abs();
            offset.x <= half && offset.y <= half
        })
    }

    /// Ready, visible hotspots placed in the panorama.
    pub fn visible(&self) -> Vec<hecs::Entity> {
        self.select(|h| h.ready && h.visible && !h.hud)
    }

    /// Ready, visible HUD hotspots.
    pub fn hud(&self) -> Vec<hecs::Entity> {
        self.select(|h| h.ready && h.visible && h.hud)
    }

    pub fn is_ready(&self) -> bool {
        self.world.query::<&Hotspot>().iter().all(|(_, h)| h.ready)
    }

    pub fn len(&self) -> usize {
        self.world.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.world.is_empty()
    }

    fn select(&self, filter: impl Fn(&Hotspot) -> bool) -> Vec<hecs::Entity> {
        let mut entities: Vec<_> = self
            .world
            .query::<&Hotspot>()
            .iter()
            .filter(|(_, h)| filter(h))
            .map(|(entity, _)| entity)
            .collect();
        entities.sort_by_key(|e| e.id());
        entities
    }

    /// Move animated hotspots to their pose at `time` seconds.
    pub fn update(&mut self, time: f32) {
        for (_, (transform, track)) in self.world.query_mut::<(&mut Transform, &HotspotTrack)>() {
            if let Some(pose) = track.track.sample(time) {
                let scale = transform.scale;
                *transform = Transform::on_sphere(pose.yaw, pose.pitch, track.distance).scale(scale);
            }
        }
    }

    /// Screen placements of `entities` for one viewport.
    pub fn placements(
        &self,
        entities: &[hecs::Entity],
        camera: &Camera,
        projection: &dyn ViewProjection,
        aspect: f32,
    ) -> Vec<Placement> {
        entities
            .iter()
            .filter_map(|&entity| {
                let transform = *self.world.get::<&Transform>(entity).ok()?;
                let hotspot = self.world.get::<&Hotspot>(entity).ok()?;
                let texture = self.textures.get(&entity).cloned();
                let screen = match self.world.get::<&HudAnchor>(entity) {
                    Ok(anchor) => Transform::new()
                        .position(Vec3::new(anchor.0.x * aspect, anchor.0.y, 0.0))
                        .uniform_scale(hotspot.size * HUD_SCALE),
                    Err(_) => screen_transform(
                        transform.position,
                        hotspot.size,
                        camera,
                        projection,
                        aspect,
                    )?,
                };
                Some(Placement {
                    entity,
                    transform: screen,
                    color: hotspot.color,
                    texture,
                })
            })
            .collect()
    }

    fn sprite(&mut self, gpu: &GpuContext) -> &Mesh {
        self.sprite
            .get_or_insert_with(|| geometry::billboard(1.0).upload(gpu))
    }

    /// Draw `placements` with `material`, or the pass default. Returns meshes drawn.
    pub fn draw_placements(
        &mut self,
        gpu: &GpuContext,
        mesh_pass: &MeshPass,
        pass: &mut wgpu::RenderPass<'_>,
        placements: &[Placement],
        aspect: f32,
        time: f32,
        material: Option<&MeshMaterial>,
    ) -> usize {
        if placements.is_empty() {
            return 0;
        }
        let sprite = self.sprite(gpu);
        let calls: Vec<DrawCall> = placements
            .iter()
            .map(|p| DrawCall {
                mesh: sprite,
                transform: p.transform,
                color: p.color,
                texture: p.texture.as_deref(),
            })
            .collect();
        mesh_pass.render(gpu, pass, screen_camera(aspect), time, material, &calls)
    }

    /// Draw panorama hotspots for one viewport.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        mesh_pass: &MeshPass,
        pass: &mut wgpu::RenderPass<'_>,
        camera: &Camera,
        projection: &dyn ViewProjection,
        aspect: f32,
        time: f32,
    ) -> usize {
        let placements = self.placements(&self.visible(), camera, projection, aspect);
        self.draw_placements(gpu, mesh_pass, pass, &placements, aspect, time, None)
    }

    /// Draw HUD hotspots on top of everything.
    pub fn render_hud(
        &mut self,
        gpu: &GpuContext,
        mesh_pass: &MeshPass,
        pass: &mut wgpu::RenderPass<'_>,
        camera: &Camera,
        projection: &dyn ViewProjection,
        aspect: f32,
        time: f32,
    ) -> usize {
        let placements = self.placements(&self.hud(), camera, projection, aspect);
        let overlay = mesh_pass.overlay_material();
        self.draw_placements(
            gpu,
            mesh_pass,
            pass,
            &placements,
            aspect,
            time,
            Some(&overlay),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyframe::Keyframe;
    use crate::media::{MediaDescriptor, MediaFormat};
    use crate::view::{RectilinearView, ViewType};
    use approx::assert_abs_diff_eq;

    fn hotspot(id: &str) -> HotspotDescriptor {
        HotspotDescriptor {
            id: id.into(),
            ..Default::default()
        }
    }

    #[test]
    fn hotspots_without_media_are_ready() {
        let mut objects = ObjectRenderer::new();
        objects.spawn_hotspot(&hotspot("plain"));
        objects.spawn_hotspot(&HotspotDescriptor {
            media: Some(MediaDescriptor::image(MediaFormat::Hotspot, "builtin:checker")),
            ..hotspot("icon")
        });

        assert_eq!(objects.visible().len(), 1);
        assert!(!objects.is_ready());
        assert!(objects.set_ready("icon", None));
        assert_eq!(objects.visible().len(), 2);
        assert!(objects.is_ready());
        assert!(!objects.set_ready("missing", None));
    }

    #[test]
    fn selection_respects_flags() {
        let mut objects = ObjectRenderer::new();
        objects.spawn_hotspot(&hotspot("a"));
        objects.spawn_hotspot(&HotspotDescriptor {
            interactive: false,
            ..hotspot("decor")
        });
        objects.spawn_hotspot(&HotspotDescriptor {
            hud: true,
            ..hotspot("menu")
        });
        objects.spawn_hotspot(&HotspotDescriptor {
            visible: false,
            ..hotspot("hidden")
        });

        let ids = |entities: Vec<hecs::Entity>| -> Vec<String> {
            entities
                .into_iter()
                .filter_map(|e| objects.hotspot(e))
                .map(|h| h.id)
                .collect()
        };
        assert_eq!(ids(objects.raycastable()), ["a", "hidden"]);
        assert_eq!(ids(objects.visible()), ["a", "decor"]);
        assert_eq!(ids(objects.hud()), ["menu"]);
        assert_eq!(ids(objects.hud_pickable()), ["menu"]);
    }

    #[test]
    fn components_can_live_in_the_world() {
        fn component<T: hecs::Component>() {}
        component::<Hotspot>();
        component::<HotspotTrack>();
        component::<HudAnchor>();
        component::<Transform>();
        component::<Collider>();
    }

    #[test]
    fn hud_hotspots_have_no_world_collider() {
        let mut objects = ObjectRenderer::new();
        let menu = objects.spawn_hotspot(&HotspotDescriptor {
            hud: true,
            ..hotspot("menu")
        });
        let door = objects.spawn_hotspot(&hotspot("door"));
        assert!(objects.world.get::<&Collider>(menu).is_err());
        assert!(objects.world.get::<&HudAnchor>(menu).is_ok());
        assert!(objects.world.get::<&Collider>(door).is_ok());
    }

    #[test]
    fn hud_hit_tests_the_drawn_sprite() {
        let mut objects = ObjectRenderer::new();
        let menu = objects.spawn_hotspot(&HotspotDescriptor {
            hud: true,
            yaw: 50.0,
            pitch: -80.0,
            size: 2.0,
            ..hotspot("menu")
        });
        // Anchor (0.5, -0.8) at aspect 2 sits at x = 1.0, half size 0.1.
        assert_eq!(objects.hud_hit(Vec2::new(0.5, -0.8), 2.0), Some(menu));
        assert_eq!(objects.hud_hit(Vec2::new(0.54, -0.75), 2.0), Some(menu));
        assert_eq!(objects.hud_hit(Vec2::new(0.6, -0.8), 2.0), None);
        assert_eq!(objects.hud_hit(Vec2::ZERO, 2.0), None);
    }

    #[test]
    fn tracks_move_hotspots() {
        let mut objects = ObjectRenderer::new();
        let entity = objects.spawn_hotspot(&HotspotDescriptor {
            distance: 5.0,
            track: vec![
                Keyframe::new(0.0, HotspotPose { yaw: 0.0, pitch: 0.0 }),
                Keyframe::new(1.0, HotspotPose { yaw: 90.0, pitch: 0.0 }),
            ],
            ..hotspot("moving")
        });
        objects.update(1.0);
        let transform = *objects.world.get::<&Transform>(entity).unwrap();
        assert_abs_diff_eq!(transform.position.x, 5.0, epsilon = 1e-4);
        assert_abs_diff_eq!(transform.position.z, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn centred_hotspot_lands_mid_screen() {
        let camera = Camera::new().with_fov(90.0);
        let transform = screen_transform(
            Vec3::new(0.0, 0.0, -10.0),
            2.0,
            &camera,
            &RectilinearView,
            1.5,
        )
        .unwrap();
        assert_abs_diff_eq!(transform.position.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(transform.position.y, 0.0, epsilon = 1e-5);
        // tan(45 deg) = 1, so a 2 unit sprite at 10 units spans 0.2 of the half-height.
        assert_abs_diff_eq!(transform.scale.y, 0.2, epsilon = 1e-4);
        assert!(transform.position.z < 0.0);
    }

    #[test]
    fn hotspot_behind_pinhole_is_skipped() {
        let camera = Camera::new();
        let behind = screen_transform(
            Vec3::new(0.0, 0.0, 10.0),
            1.0,
            &camera,
            ViewType::Rectilinear.projection().as_ref(),
            1.0,
        );
        assert!(behind.is_none());
    }

    #[test]
    fn hud_hotspots_use_their_anchor() {
        let mut objects = ObjectRenderer::new();
        let entity = objects.spawn_hotspot(&HotspotDescriptor {
            hud: true,
            yaw: 50.0,
            pitch: -80.0,
            size: 2.0,
            ..hotspot("menu")
        });
        let placements =
            objects.placements(&[entity], &Camera::new(), &RectilinearView, 2.0);
        assert_eq!(placements.len(), 1);
        let transform = placements[0].transform;
        assert_abs_diff_eq!(transform.position.x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(transform.position.y, -0.8, epsilon = 1e-6);
        assert_abs_diff_eq!(transform.scale.x, 0.2, epsilon = 1e-6);
    }
}
