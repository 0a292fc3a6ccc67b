//! Viewports: sub-rectangles of a scene target, each with its own camera
//! and background.

use tracing::debug;

use crate::background::{
    Background, BackgroundRenderer, BootContext, DrawContext, MaterialPool, SceneMedia,
};
use crate::camera::Camera;
use crate::gpu::GpuContext;
use crate::layout::{Eye, Layout, PixelRect, ViewportRect};
use crate::loader::TileKey;
use crate::media::MediaFormat;
use crate::mesh_pass::MeshPass;
use crate::objects::ObjectRenderer;
use crate::scene::BackgroundType;
use crate::transition::TransitionSpec;
use crate::view::ViewType;

/// Distance between the eyes of a VR pair, in world units.
pub const EYE_SEPARATION: f32 = 0.064;

/// One step of a viewport's draw order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawStep {
    Background,
    Objects,
    Hud,
}

/// What one viewport draws this frame, and where.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportDraw {
    pub index: usize,
    pub rect: PixelRect,
    pub steps: Vec<DrawStep>,
}

/// Which layers of a scene one render draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layers {
    All,
    /// The panorama only.
    Background,
    /// Hotspots and HUD over what the target already holds.
    Objects,
}

impl Layers {
    pub fn includes(self, step: DrawStep) -> bool {
        match self {
            Layers::All => true,
            Layers::Background => step == DrawStep::Background,
            Layers::Objects => step != DrawStep::Background,
        }
    }
}

/// Draw counts of one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub viewports: usize,
    /// Background draw calls.
    pub background_draws: usize,
    /// Object renderer passes over the panorama, one per viewport.
    pub object_passes: usize,
    /// HUD passes.
    pub hud_passes: usize,
    /// Hotspot meshes drawn by object and HUD passes.
    pub object_draws: usize,
}

impl FrameStats {
    /// Fold in the counts of another render of the same frame.
    pub fn merge(&mut self, other: FrameStats) {
        self.viewports = self.viewports.max(other.viewports);
        self.background_draws += other.background_draws;
        self.object_passes += other.object_passes;
        self.hud_passes += other.hud_passes;
        self.object_draws += other.object_draws;
    }
}

/// Run `draw` for every step of `plan` in order and tally the result.
///
/// `draw` returns how many draw calls (background) or meshes (objects, HUD)
/// the step issued.
pub fn execute_plan(
    plan: &[ViewportDraw],
    mut draw: impl FnMut(&ViewportDraw, DrawStep) -> usize,
) -> FrameStats {
    let mut stats = FrameStats::default();
    for viewport in plan {
        stats.viewports += 1;
        for &step in &viewport.steps {
            let drawn = draw(viewport, step);
            match step {
                DrawStep::Background => stats.background_draws += drawn,
                DrawStep::Objects => {
                    stats.object_passes += 1;
                    stats.object_draws += drawn;
                }
                DrawStep::Hud => {
                    stats.hud_passes += 1;
                    stats.object_draws += drawn;
                }
            }
        }
    }
    stats
}

/// One rectangle of the layout.
pub struct Viewport {
    pub rect: ViewportRect,
    pub vr: bool,
    pub eye: Eye,
    /// The scene camera shifted for this viewport's eye.
    pub camera: Camera,
    pub background: BackgroundRenderer,
}

impl Viewport {
    /// Follow the scene camera, keeping this viewport's eye offset.
    pub fn sync_camera(&mut self, base: &Camera) {
        self.camera = base.with_eye(self.eye.offset(EYE_SEPARATION));
    }
}

/// Resources a viewport render needs besides the pass itself.
pub struct ViewportResources<'a> {
    pub gpu: &'a GpuContext,
    pub pool: &'a mut MaterialPool,
    pub media: &'a SceneMedia,
    pub mesh_pass: &'a MeshPass,
    pub objects: &'a mut ObjectRenderer,
    pub time: f32,
}

/// The viewports of one scene.
pub struct ViewportManager {
    layout: Layout,
    viewports: Vec<Viewport>,
    background_type: BackgroundType,
    format: MediaFormat,
    view_type: ViewType,
    transition: TransitionSpec,
}

impl ViewportManager {
    pub fn new(
        layout: Layout,
        background_type: BackgroundType,
        format: MediaFormat,
        view_type: ViewType,
        transition: TransitionSpec,
    ) -> Self {
        let mut manager = Self {
            layout: Layout::single(),
            viewports: Vec::new(),
            background_type,
            format,
            view_type,
            transition,
        };
        manager.set_layout(layout);
        manager
    }

    /// Replace the layout; every viewport and background is rebuilt.
    pub fn set_layout(&mut self, layout: Layout) {
        let layout = if layout.is_empty() {
            Layout::single()
        } else {
            layout
        };
        let eyes = layout.eyes();
        self.viewports = layout
            .viewports()
            .iter()
            .zip(eyes)
            .map(|(config, eye)| Viewport {
                rect: config.rectangle,
                vr: config.vr,
                eye,
                camera: Camera::new().with_eye(eye.offset(EYE_SEPARATION)),
                background: BackgroundRenderer::new(
                    self.background_type,
                    self.format,
                    self.view_type,
                    self.transition,
                ),
            })
            .collect();
        debug!(layout = %layout.name, viewports = self.viewports.len(), "layout applied");
        self.layout = layout;
    }

    /// Switch every viewport's projection. Backgrounds rebuild on next render.
    pub fn set_view(&mut self, view_type: ViewType) {
        self.view_type = view_type;
        for viewport in &mut self.viewports {
            viewport.background.set_view(view_type);
        }
    }

    pub fn set_media_format(&mut self, format: MediaFormat) {
        self.format = format;
        for viewport in &mut self.viewports {
            viewport.background.set_media_format(format);
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn view_type(&self) -> ViewType {
        self.view_type
    }

    pub fn viewports(&self) -> &[Viewport] {
        &self.viewports
    }

    pub fn viewports_mut(&mut self) -> &mut [Viewport] {
        &mut self.viewports
    }

    pub fn len(&self) -> usize {
        self.viewports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewports.is_empty()
    }

    /// Topmost viewport containing the pixel, with its pixel rect.
    pub fn viewport_at(
        &self,
        px: f32,
        py: f32,
        target_width: u32,
        target_height: u32,
    ) -> Option<(usize, PixelRect)> {
        self.viewports
            .iter()
            .enumerate()
            .rev()
            .map(|(i, v)| (i, v.rect.to_pixels(target_width, target_height)))
            .find(|(_, rect)| rect.contains(px, py))
    }

    /// Refresh cameras and backgrounds for this frame.
    pub fn update(&mut self, camera: &Camera, target_width: u32, target_height: u32, dt: f32) {
        for viewport in &mut self.viewports {
            viewport.sync_camera(camera);
            let rect = viewport.rect.to_pixels(target_width, target_height);
            viewport.background.update(&viewport.camera, rect, dt);
        }
    }

    /// Draw order of every viewport for `layers`. Backgrounds always precede objects.
    pub fn plan(
        &self,
        target_width: u32,
        target_height: u32,
        objects: &ObjectRenderer,
        layers: Layers,
    ) -> Vec<ViewportDraw> {
        let has_hud = !objects.hud().is_empty();
        self.viewports
            .iter()
            .enumerate()
            .map(|(index, viewport)| {
                let mut steps = vec![DrawStep::Background, DrawStep::Objects];
                if has_hud {
                    steps.push(DrawStep::Hud);
                }
                steps.retain(|step| layers.includes(*step));
                ViewportDraw {
                    index,
                    rect: viewport.rect.to_pixels(target_width, target_height),
                    steps,
                }
            })
            .collect()
    }

    /// Draw `layers` of every viewport into `pass`, whose attachments are
    /// `target_width` by `target_height`.
    pub fn render(
        &mut self,
        res: ViewportResources,
        pass: &mut wgpu::RenderPass<'_>,
        target_width: u32,
        target_height: u32,
        layers: Layers,
    ) -> FrameStats {
        let ViewportResources {
            gpu,
            pool,
            media,
            mesh_pass,
            objects,
            time,
        } = res;
        let plan = self.plan(target_width, target_height, objects, layers);
        let viewports = &mut self.viewports;

        execute_plan(&plan, |draw, step| {
            let Some(viewport) = viewports.get_mut(draw.index) else {
                return 0;
            };
            let rect = draw.rect;
            if draw.steps.first() == Some(&step) {
                pass.set_viewport(
                    rect.x as f32,
                    rect.y as f32,
                    rect.width as f32,
                    rect.height as f32,
                    0.0,
                    1.0,
                );
                pass.set_scissor_rect(rect.x, rect.y, rect.width, rect.height);
            }

            let aspect = rect.aspect();
            match step {
                DrawStep::Background => {
                    if viewport.background.needs_boot() {
                        viewport.background.boot(&mut BootContext {
                            gpu,
                            pool: &mut *pool,
                            media,
                        });
                    }
                    let ctx = DrawContext {
                        gpu,
                        pool: &*pool,
                        media,
                    };
                    viewport.background.render(&ctx, pass)
                }
                DrawStep::Objects => objects.render(
                    gpu,
                    mesh_pass,
                    pass,
                    &viewport.camera,
                    viewport.background.projection(),
                    aspect,
                    time,
                ),
                DrawStep::Hud => objects.render_hud(
                    gpu,
                    mesh_pass,
                    pass,
                    &viewport.camera,
                    viewport.background.projection(),
                    aspect,
                    time,
                ),
            }
        })
    }

    /// Tiles wanted by any viewport, without duplicates.
    pub fn wanted_tiles(&self) -> Vec<TileKey> {
        let mut tiles: Vec<_> = self
            .viewports
            .iter()
            .flat_map(|v| v.background.wanted_tiles().iter().copied())
            .collect();
        tiles.sort();
        tiles.dedup();
        tiles
    }

    /// Tiles drawn by any viewport in the last frame.
    pub fn drawn_tiles(&self) -> Vec<TileKey> {
        let mut tiles: Vec<_> = self
            .viewports
            .iter()
            .flat_map(|v| v.background.drawn_tiles().iter().copied())
            .collect();
        tiles.sort();
        tiles.dedup();
        tiles
    }

    /// Release every background's GPU resources.
    pub fn destroy(&mut self) {
        for viewport in &mut self.viewports {
            viewport.background.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::HotspotDescriptor;

    fn manager(layout: Layout) -> ViewportManager {
        ViewportManager::new(
            layout,
            BackgroundType::Shader,
            MediaFormat::Equirectangular,
            ViewType::Rectilinear,
            TransitionSpec::none(),
        )
    }

    #[test]
    fn one_background_per_viewport() {
        let grid = manager(Layout::grid());
        assert_eq!(grid.len(), 4);
        let vr = manager(Layout::vr());
        let eyes: Vec<Eye> = vr.viewports().iter().map(|v| v.eye).collect();
        assert_eq!(eyes, [Eye::Left, Eye::Right]);
    }

    #[test]
    fn single_layout_draws_background_then_objects() {
        let manager = manager(Layout::single());
        let plan = manager.plan(640, 480, &ObjectRenderer::new(), Layers::All);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].steps, [DrawStep::Background, DrawStep::Objects]);
        assert_eq!((plan[0].rect.width, plan[0].rect.height), (640, 480));
    }

    #[test]
    fn single_layout_frame_is_one_background_and_one_object_pass() {
        let manager = manager(Layout::single());
        let plan = manager.plan(640, 480, &ObjectRenderer::new(), Layers::All);
        let mut calls = Vec::new();
        // An equirect shader background issues one draw; no hotspots means no meshes.
        let stats = execute_plan(&plan, |draw, step| {
            calls.push((draw.index, step));
            usize::from(step == DrawStep::Background)
        });
        assert_eq!(calls, [(0, DrawStep::Background), (0, DrawStep::Objects)]);
        assert_eq!(
            stats,
            FrameStats {
                viewports: 1,
                background_draws: 1,
                object_passes: 1,
                hud_passes: 0,
                object_draws: 0,
            }
        );
    }

    #[test]
    fn split_layers_add_up_to_a_full_frame() {
        let manager = manager(Layout::vr());
        let mut objects = ObjectRenderer::new();
        objects.spawn_hotspot(&HotspotDescriptor {
            id: "menu".into(),
            hud: true,
            ..Default::default()
        });
        let count = |_: &ViewportDraw, step: DrawStep| match step {
            DrawStep::Background => 1,
            DrawStep::Objects => 0,
            DrawStep::Hud => 1,
        };

        let background = manager.plan(800, 400, &objects, Layers::Background);
        assert!(background.iter().all(|d| d.steps == [DrawStep::Background]));
        let overlay = manager.plan(800, 400, &objects, Layers::Objects);
        assert!(overlay.iter().all(|d| d.steps == [DrawStep::Objects, DrawStep::Hud]));

        let mut split = execute_plan(&background, count);
        split.merge(execute_plan(&overlay, count));
        let full = execute_plan(&manager.plan(800, 400, &objects, Layers::All), count);
        assert_eq!(split, full);
        assert_eq!((full.viewports, full.background_draws, full.object_passes), (2, 2, 2));
        assert_eq!(full.hud_passes, 2);
    }

    #[test]
    fn plan_orders_background_first() {
        let manager = manager(Layout::vr());
        let mut objects = ObjectRenderer::new();
        let plan = manager.plan(800, 400, &objects, Layers::All);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].steps, [DrawStep::Background, DrawStep::Objects]);
        assert_eq!(plan[1].rect.x, 400);
        assert_eq!(plan[1].rect.width, 400);

        objects.spawn_hotspot(&HotspotDescriptor {
            id: "menu".into(),
            hud: true,
            ..Default::default()
        });
        let plan = manager.plan(800, 400, &objects, Layers::All);
        assert_eq!(
            plan[0].steps,
            [DrawStep::Background, DrawStep::Objects, DrawStep::Hud]
        );
    }

    #[test]
    fn vr_eyes_are_offset() {
        let mut manager = manager(Layout::vr());
        manager.update(&Camera::new(), 800, 400, 0.0);
        let left = manager.viewports()[0].camera.position();
        let right = manager.viewports()[1].camera.position();
        assert!(left.x < 0.0 && right.x > 0.0);
        assert!((right.x - left.x - EYE_SEPARATION).abs() < 1e-6);
    }

    #[test]
    fn view_change_marks_backgrounds() {
        let mut manager = manager(Layout::grid());
        manager.set_view(ViewType::Flat);
        assert_eq!(manager.view_type(), ViewType::Flat);
        assert!(manager
            .viewports()
            .iter()
            .all(|v| v.background.needs_boot() && v.background.view_type() == ViewType::Flat));
    }

    #[test]
    fn viewport_at_finds_quadrant() {
        let manager = manager(Layout::grid());
        let (_, rect) = manager.viewport_at(600.0, 300.0, 800, 400).unwrap();
        assert_eq!((rect.x, rect.y), (400, 200));
        assert!(manager.viewport_at(900.0, 10.0, 800, 400).is_none());
    }
}
