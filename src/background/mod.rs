//! Background renderers: the panorama itself, behind the hotspots.
//!
//! One [`BackgroundRenderer`] exists per viewport. It is composed at
//! construction from a [`GeometryStrategy`] (what gets drawn) and a material
//! from the shared [`MaterialPool`] (how it is shaded), both chosen from the
//! scene's [`BackgroundType`] and [`MediaFormat`] and the viewport's
//! [`ViewType`].
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --boot--> Built --media ready--> Ready --first draw--> Rendering
//!       ^                                                                  |
//!       +---------------- media format or view type changed ---------------+
//! ```
//!
//! Rendering before the media texture arrives is a silent no-op.

pub mod material;
pub mod pyramid;

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};
use wgpu::util::DeviceExt;

use crate::camera::Camera;
use crate::geometry::{self, RawGeometry};
use crate::gpu::GpuContext;
use crate::layout::PixelRect;
use crate::loader::TileKey;
use crate::media::{MediaDescriptor, MediaFormat, MediaSource};
use crate::mesh::Mesh;
use crate::scene::BackgroundType;
use crate::texture::Texture;
use crate::transition::{TransitionSpec, Tween};
use crate::view::{ViewProjection, ViewType, ViewUniforms};

pub use material::{BackgroundMaterial, BackgroundShader, MaterialKey, MaterialPool};
pub use pyramid::TileStore;

/// Radius of background spheres, cubes and tile cubes.
pub const BACKGROUND_RADIUS: f32 = 100.0;
/// Vertical field of view covered by flat media.
pub const DEFAULT_PLANE_VFOV: f32 = 60.0;
const PLANE_DISTANCE: f32 = 10.0;

/// What geometry a background draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryStrategy {
    /// Clip-space quad with per-pixel rays.
    ScreenQuad,
    /// Inward sphere for equirectangular media.
    Sphere,
    /// Plane in front of the camera for flat media.
    Plane,
    /// Inward cube for cube strips.
    Cube,
    /// Cube faces split into multi-resolution tiles.
    PyramidTiles,
}

impl GeometryStrategy {
    pub fn select(background: BackgroundType, format: MediaFormat) -> Self {
        match (background, format) {
            (_, MediaFormat::Tiled) => GeometryStrategy::PyramidTiles,
            (BackgroundType::Shader, _) => GeometryStrategy::ScreenQuad,
            (_, MediaFormat::Equirectangular) => GeometryStrategy::Sphere,
            (_, MediaFormat::Cube) => GeometryStrategy::Cube,
            (_, MediaFormat::Flat | MediaFormat::Grid | MediaFormat::Hotspot) => {
                GeometryStrategy::Plane
            }
        }
    }

    pub fn shader(self) -> BackgroundShader {
        match self {
            GeometryStrategy::ScreenQuad => BackgroundShader::Screen,
            _ => BackgroundShader::Mesh,
        }
    }

    /// CPU geometry, or `None` for tiles which are built per tile.
    pub fn geometry(self, media_aspect: f32, plane_vfov: f32) -> Option<RawGeometry> {
        match self {
            GeometryStrategy::ScreenQuad => Some(geometry::screen_quad()),
            GeometryStrategy::Sphere => Some(geometry::sphere(BACKGROUND_RADIUS, 64, 32)),
            GeometryStrategy::Plane => Some(geometry::flat_plane(
                media_aspect,
                plane_vfov,
                PLANE_DISTANCE,
            )),
            GeometryStrategy::Cube => Some(geometry::cube(BACKGROUND_RADIUS * 2.0)),
            GeometryStrategy::PyramidTiles => None,
        }
    }
}

/// Lifecycle state of a background renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackgroundState {
    Uninitialized,
    /// Geometry and material exist, media not yet available.
    Built,
    /// Media available, not drawn yet.
    Ready,
    Rendering,
}

impl BackgroundState {
    /// State after checking media readiness before a draw.
    pub fn advance(self, media_ready: bool) -> Self {
        match self {
            BackgroundState::Uninitialized => BackgroundState::Uninitialized,
            BackgroundState::Built if media_ready => BackgroundState::Ready,
            BackgroundState::Built => BackgroundState::Built,
            BackgroundState::Ready | BackgroundState::Rendering if !media_ready => {
                BackgroundState::Built
            }
            BackgroundState::Ready | BackgroundState::Rendering => BackgroundState::Rendering,
        }
    }

    pub fn can_draw(self) -> bool {
        matches!(self, BackgroundState::Ready | BackgroundState::Rendering)
    }
}

/// Media of one scene as seen by its backgrounds.
pub struct SceneMedia {
    pub format: MediaFormat,
    /// Full image, or the preview until the full image arrives.
    pub source: MediaSource<Rc<Texture>>,
    pub showing_preview: bool,
    pub tiles: TileStore,
    pub levels: u32,
    pub tile_size: u32,
}

impl SceneMedia {
    pub fn new(descriptor: &MediaDescriptor, texture_budget: u64) -> Self {
        Self {
            format: descriptor.format,
            source: MediaSource::Pending,
            showing_preview: false,
            tiles: TileStore::new(texture_budget),
            levels: descriptor.levels.max(1),
            tile_size: descriptor.tile_size.max(1),
        }
    }

    pub fn texture(&self) -> Option<&Rc<Texture>> {
        self.source.ready()
    }

    /// Install the full image, replacing any preview.
    pub fn set_texture(&mut self, texture: Rc<Texture>) {
        self.source = MediaSource::Ready(texture);
        self.showing_preview = false;
    }

    /// Install a preview unless the full image is already there.
    pub fn set_preview(&mut self, texture: Rc<Texture>) {
        if !self.source.is_ready() {
            self.source = MediaSource::Ready(texture);
            self.showing_preview = true;
        }
    }

    /// The full image could not be loaded. A preview already shown stays.
    pub fn fail(&mut self) {
        if !self.source.is_ready() {
            self.source = MediaSource::Failed;
        }
    }

    pub fn is_failed(&self) -> bool {
        self.source.is_failed()
    }

    pub fn is_ready(&self) -> bool {
        match self.format {
            MediaFormat::Tiled => self.tiles.has_base() || self.source.is_ready(),
            _ => self.source.is_ready(),
        }
    }
}

/// What a background needs to build itself.
pub struct BootContext<'a> {
    pub gpu: &'a GpuContext,
    pub pool: &'a mut MaterialPool,
    pub media: &'a SceneMedia,
}

/// What a background needs to draw.
pub struct DrawContext<'a> {
    pub gpu: &'a GpuContext,
    pub pool: &'a MaterialPool,
    pub media: &'a SceneMedia,
}

/// Capabilities shared by every background.
pub trait Background {
    /// Build geometry and material. Called whenever the state is `Uninitialized`.
    fn boot(&mut self, ctx: &mut BootContext);
    /// Draw into the current viewport of `pass`. Returns the number of draw calls issued.
    fn render(&mut self, ctx: &DrawContext, pass: &mut wgpu::RenderPass<'_>) -> usize;
    /// Release GPU resources; the next render needs a new boot.
    fn destroy(&mut self);
}

struct BackgroundGpu {
    material: Rc<BackgroundMaterial>,
    mesh: Option<Mesh>,
    uniform_buffer: wgpu::Buffer,
    view_bind_group: wgpu::BindGroup,
    built_aspect: f32,
}

/// Background of one viewport.
pub struct BackgroundRenderer {
    background: BackgroundType,
    format: MediaFormat,
    view_type: ViewType,
    projection: Box<dyn ViewProjection>,
    strategy: GeometryStrategy,
    state: BackgroundState,
    transition: TransitionSpec,
    pub plane_vfov: f32,
    uniforms: ViewUniforms,
    opacity: Option<Tween>,
    gpu: Option<BackgroundGpu>,
    texture_binding: Option<(Rc<Texture>, wgpu::BindGroup)>,
    tile_meshes: HashMap<TileKey, Mesh>,
    wanted_tiles: Vec<TileKey>,
    drawn_tiles: Vec<TileKey>,
    /// Pyramid levels and tile size of the media this renderer was built for.
    tile_levels: Option<(u32, u32)>,
    viewport_height: u32,
}

impl BackgroundRenderer {
    pub fn new(
        background: BackgroundType,
        format: MediaFormat,
        view_type: ViewType,
        transition: TransitionSpec,
    ) -> Self {
        let strategy = GeometryStrategy::select(background, format);
        let mut uniforms = ViewUniforms::default();
        uniforms.set_opacity(1.0);
        Self {
            background,
            format,
            view_type,
            projection: view_type.projection(),
            strategy,
            state: BackgroundState::Uninitialized,
            transition,
            plane_vfov: DEFAULT_PLANE_VFOV,
            uniforms,
            opacity: None,
            gpu: None,
            texture_binding: None,
            tile_meshes: HashMap::new(),
            wanted_tiles: Vec::new(),
            drawn_tiles: Vec::new(),
            tile_levels: None,
            viewport_height: 1,
        }
    }

    pub fn state(&self) -> BackgroundState {
        self.state
    }

    pub fn strategy(&self) -> GeometryStrategy {
        self.strategy
    }

    pub fn view_type(&self) -> ViewType {
        self.view_type
    }

    pub fn projection(&self) -> &dyn ViewProjection {
        self.projection.as_ref()
    }

    pub fn needs_boot(&self) -> bool {
        self.state == BackgroundState::Uninitialized
    }

    pub fn uniforms(&self) -> &ViewUniforms {
        &self.uniforms
    }

    pub fn material_key(&self) -> MaterialKey {
        MaterialKey {
            view: self.view_type,
            shader: self.strategy.shader(),
            transparent: self.transition.kind != crate::transition::TransitionKind::None,
        }
    }

    /// Switch projection. Marks the renderer for rebuild if it changed.
    pub fn set_view(&mut self, view_type: ViewType) {
        if view_type != self.view_type {
            debug!(from = self.view_type.name(), to = view_type.name(), "background view changed");
            self.view_type = view_type;
            self.projection = view_type.projection();
            self.reset();
        }
    }

    /// Switch media format. Marks the renderer for rebuild if it changed.
    pub fn set_media_format(&mut self, format: MediaFormat) {
        if format != self.format {
            self.format = format;
            self.strategy = GeometryStrategy::select(self.background, format);
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.state = BackgroundState::Uninitialized;
        self.gpu = None;
        self.texture_binding = None;
        self.tile_meshes.clear();
    }

    pub fn opacity(&self) -> f32 {
        self.uniforms.opacity()
    }

    /// Refresh view uniforms and the fade for this frame.
    pub fn update(&mut self, camera: &Camera, viewport: PixelRect, dt: f32) {
        let aspect = viewport.aspect();
        self.viewport_height = viewport.height;
        self.projection.update_uniforms(camera, aspect, &mut self.uniforms);
        if self.strategy == GeometryStrategy::ScreenQuad {
            // The ray math lives in the shader; the quad only needs to cover the screen.
            self.uniforms.view_proj = Camera::orthographic_screen().to_cols_array_2d();
        }
        self.uniforms.media[3] = (self.plane_vfov.to_radians() * 0.5).tan();

        if let Some(tween) = self.opacity.as_mut() {
            let value = tween.advance(dt);
            self.uniforms.set_opacity(value);
        }

        if self.strategy == GeometryStrategy::PyramidTiles {
            self.update_wanted_tiles(camera, aspect);
        }
    }

    fn update_wanted_tiles(&mut self, camera: &Camera, aspect: f32) {
        let fov = self.projection.clamp_fov(camera.fov);
        self.wanted_tiles.clear();
        self.wanted_tiles.extend(pyramid::base_tiles());
        let level = self.tile_level(fov);
        if level == 0 {
            return;
        }
        let half_v = (fov * 0.5).to_radians();
        let half_diag = if fov < 179.0 {
            (half_v.tan() * (1.0 + aspect * aspect).sqrt()).atan()
        } else {
            std::f32::consts::PI
        };
        let forward = self.projection.orientation(camera) * glam::Vec3::NEG_Z;
        self.wanted_tiles
            .extend(pyramid::visible_tiles(forward, half_diag, level));
    }

    fn tile_level(&self, fov: f32) -> u32 {
        self.tile_levels
            .map(|(levels, tile_size)| {
                pyramid::select_level(fov, self.viewport_height, tile_size, levels)
            })
            .unwrap_or(0)
    }

    /// Tiles the current view wants, coarse first.
    pub fn wanted_tiles(&self) -> &[TileKey] {
        &self.wanted_tiles
    }

    /// Tiles drawn by the last render.
    pub fn drawn_tiles(&self) -> &[TileKey] {
        &self.drawn_tiles
    }

    fn start_fade(&mut self) {
        let tween = self.transition.tween();
        self.uniforms.set_opacity(tween.value());
        self.opacity = Some(tween);
    }

    fn bind_texture(
        &mut self,
        gpu: &GpuContext,
        pool: &MaterialPool,
        texture: &Rc<Texture>,
    ) -> wgpu::BindGroup {
        if let Some((bound, group)) = &self.texture_binding {
            if Rc::ptr_eq(bound, texture) {
                return group.clone();
            }
        }
        let group = texture_bind_group(gpu, pool, texture);
        self.texture_binding = Some((Rc::clone(texture), group.clone()));
        group
    }

    fn render_tiles(
        &mut self,
        ctx: &DrawContext,
        pass: &mut wgpu::RenderPass<'_>,
    ) -> usize {
        let media = ctx.media;
        let mut keys: Vec<TileKey> = self
            .wanted_tiles
            .iter()
            .filter_map(|&key| media.tiles.best_available(key))
            .collect();
        keys.sort();
        keys.dedup();
        keys.sort_by_key(|k| k.level);

        self.drawn_tiles.clear();
        let mut draws = 0;
        for key in keys {
            let Some(texture) = media.tiles.texture(&key) else {
                continue;
            };
            let mesh = self.tile_meshes.entry(key).or_insert_with(|| {
                let tiles = 1u32 << key.level.min(15);
                geometry::pyramid_face_tile(key.face, tiles, key.x, key.y, BACKGROUND_RADIUS)
                    .upload(ctx.gpu)
            });
            let group = texture_bind_group(ctx.gpu, ctx.pool, texture);
            pass.set_bind_group(1, &group, &[]);
            mesh.draw(pass);
            self.drawn_tiles.push(key);
            draws += 1;
        }
        draws
    }
}

fn texture_bind_group(gpu: &GpuContext, pool: &MaterialPool, texture: &Texture) -> wgpu::BindGroup {
    gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Background Texture Bind Group"),
        layout: &pool.texture_layout,
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

impl Background for BackgroundRenderer {
    fn boot(&mut self, ctx: &mut BootContext) {
        let material = ctx.pool.get(ctx.gpu, self.material_key());
        let aspect = ctx.media.texture().map_or(1.0, |t| t.aspect());
        let mesh = self
            .strategy
            .geometry(aspect, self.plane_vfov)
            .map(|g| g.upload(ctx.gpu));

        let uniform_buffer = ctx
            .gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Background View Uniforms"),
                contents: bytemuck::bytes_of(&self.uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let view_bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Background View Bind Group"),
            layout: &ctx.pool.view_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        debug!(
            strategy = ?self.strategy,
            view = self.view_type.name(),
            format = self.format.name(),
            "background built"
        );
        self.gpu = Some(BackgroundGpu {
            material,
            mesh,
            uniform_buffer,
            view_bind_group,
            built_aspect: aspect,
        });
        self.tile_levels = Some((ctx.media.levels, ctx.media.tile_size));
        self.state = BackgroundState::Built;
    }

    fn render(&mut self, ctx: &DrawContext, pass: &mut wgpu::RenderPass<'_>) -> usize {
        let media_ready = ctx.media.is_ready();
        let previous = self.state;
        self.state = self.state.advance(media_ready);
        if !self.state.can_draw() {
            trace!(state = ?self.state, "background not ready");
            return 0;
        }
        if previous == BackgroundState::Built {
            self.start_fade();
        }

        let ratio = ctx.media.texture().map_or(1.0, |t| t.aspect());
        self.uniforms.set_media(self.format.shader_index(), ratio);

        // Flat media: the plane follows the image aspect.
        if self.strategy == GeometryStrategy::Plane {
            if let (Some(texture), Some(gpu_state)) = (ctx.media.texture(), self.gpu.as_mut()) {
                if (texture.aspect() - gpu_state.built_aspect).abs() > 1e-3 {
                    gpu_state.mesh = self
                        .strategy
                        .geometry(texture.aspect(), self.plane_vfov)
                        .map(|g| g.upload(ctx.gpu));
                    gpu_state.built_aspect = texture.aspect();
                }
            }
        }

        let Some(gpu_state) = self.gpu.as_ref() else {
            return 0;
        };
        ctx.gpu.queue.write_buffer(
            &gpu_state.uniform_buffer,
            0,
            bytemuck::bytes_of(&self.uniforms),
        );
        let material = Rc::clone(&gpu_state.material);
        let view_bind_group = gpu_state.view_bind_group.clone();

        pass.set_pipeline(&material.pipeline);
        pass.set_bind_group(0, &view_bind_group, &[]);

        if self.strategy == GeometryStrategy::PyramidTiles {
            return self.render_tiles(ctx, pass);
        }

        let Some(texture) = ctx.media.texture() else {
            return 0;
        };
        let texture_group = self.bind_texture(ctx.gpu, ctx.pool, texture);
        let Some(mesh) = self.gpu.as_ref().and_then(|g| g.mesh.as_ref()) else {
            return 0;
        };
        pass.set_bind_group(1, &texture_group, &[]);
        mesh.draw(pass);
        1
    }

    fn destroy(&mut self) {
        self.reset();
        self.opacity = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_follows_background_and_format() {
        use GeometryStrategy::*;
        let cases = [
            (BackgroundType::Shader, MediaFormat::Equirectangular, ScreenQuad),
            (BackgroundType::Shader, MediaFormat::Cube, ScreenQuad),
            (BackgroundType::Mesh, MediaFormat::Equirectangular, Sphere),
            (BackgroundType::Mesh, MediaFormat::Flat, Plane),
            (BackgroundType::Mesh, MediaFormat::Cube, Cube),
            (BackgroundType::Pyramid, MediaFormat::Tiled, PyramidTiles),
            (BackgroundType::Shader, MediaFormat::Tiled, PyramidTiles),
            (BackgroundType::Pyramid, MediaFormat::Equirectangular, Sphere),
        ];
        for (background, format, expected) in cases {
            assert_eq!(GeometryStrategy::select(background, format), expected);
        }
    }

    #[test]
    fn state_machine_waits_for_media() {
        let state = BackgroundState::Uninitialized;
        assert_eq!(state.advance(true), BackgroundState::Uninitialized);

        let built = BackgroundState::Built;
        assert_eq!(built.advance(false), BackgroundState::Built);
        assert!(!built.advance(false).can_draw());

        let ready = built.advance(true);
        assert_eq!(ready, BackgroundState::Ready);
        assert_eq!(ready.advance(true), BackgroundState::Rendering);
        assert_eq!(BackgroundState::Rendering.advance(false), BackgroundState::Built);
    }

    #[test]
    fn failed_media_is_never_ready() {
        let descriptor = MediaDescriptor::image(MediaFormat::Equirectangular, "missing.jpg");
        let mut media = SceneMedia::new(&descriptor, 1024);
        assert!(!media.is_ready() && !media.is_failed());
        media.fail();
        assert!(media.is_failed());
        assert!(!media.is_ready());
        assert!(media.texture().is_none());
    }

    #[test]
    fn view_change_resets_state() {
        let mut renderer = BackgroundRenderer::new(
            BackgroundType::Shader,
            MediaFormat::Equirectangular,
            ViewType::Rectilinear,
            TransitionSpec::none(),
        );
        renderer.state = BackgroundState::Rendering;
        renderer.set_view(ViewType::Rectilinear);
        assert_eq!(renderer.state(), BackgroundState::Rendering);
        renderer.set_view(ViewType::GoPro);
        assert_eq!(renderer.state(), BackgroundState::Uninitialized);
        assert_eq!(renderer.material_key().view, ViewType::GoPro);
    }

    #[test]
    fn media_change_swaps_geometry() {
        let mut renderer = BackgroundRenderer::new(
            BackgroundType::Mesh,
            MediaFormat::Equirectangular,
            ViewType::Rectilinear,
            TransitionSpec::none(),
        );
        assert_eq!(renderer.strategy(), GeometryStrategy::Sphere);
        renderer.set_media_format(MediaFormat::Flat);
        assert_eq!(renderer.strategy(), GeometryStrategy::Plane);
        assert!(renderer.needs_boot());
    }

    #[test]
    fn shader_background_uses_screen_camera() {
        let mut renderer = BackgroundRenderer::new(
            BackgroundType::Shader,
            MediaFormat::Equirectangular,
            ViewType::GoPro,
            TransitionSpec::none(),
        );
        let viewport = PixelRect {
            x: 0,
            y: 0,
            width: 200,
            height: 100,
        };
        renderer.update(&Camera::new().with_fov(150.0), viewport, 0.016);
        let uniforms = renderer.uniforms();
        assert_eq!(
            uniforms.view_proj,
            Camera::orthographic_screen().to_cols_array_2d()
        );
        assert_eq!(uniforms.projection[2], 2.0);
        assert!(uniforms.projection[1] > 0.0);
    }

    #[test]
    fn pyramid_always_wants_base_tiles() {
        let mut renderer = BackgroundRenderer::new(
            BackgroundType::Pyramid,
            MediaFormat::Tiled,
            ViewType::Rectilinear,
            TransitionSpec::none(),
        );
        renderer.tile_levels = Some((3, 512));
        let viewport = PixelRect {
            x: 0,
            y: 0,
            width: 1600,
            height: 900,
        };
        renderer.update(&Camera::new().with_fov(40.0), viewport, 0.0);
        let wanted = renderer.wanted_tiles();
        assert_eq!(&wanted[..6], pyramid::base_tiles().as_slice());
        assert!(wanted.iter().any(|t| t.level == 2));
    }
}
