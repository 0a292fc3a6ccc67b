//! The viewer: scene loading, transitions, compositing and effects.
//!
//! At most two scenes are alive at once. The current scene is on screen; a
//! loading scene renders off-screen until its media is ready, then the
//! screen transition mixes it in and it becomes current.
//!
//! [`SceneFlow`] decides which scene is current or loading and which events
//! fire. The [`Viewer`] owns the GPU side and applies what the flow decides.

use std::rc::Rc;
use std::time::Instant;

use glam::Vec2;
use tracing::{debug, info, warn};

use crate::background::MaterialPool;
use crate::camera::Camera;
use crate::clock::Clock;
use crate::config::ViewerConfig;
use crate::events::{EventDispatcher, ViewerEvent};
use crate::fx::{EffectComposer, FxManager, PassConfig, PassPosition, SharedPass};
use crate::gpu::GpuContext;
use crate::layout::Layout;
use crate::loader::{LoadKey, MediaLoader, load_image};
use crate::media::MediaFormat;
use crate::mesh_pass::MeshPass;
use crate::picking::{PickResult, PickingDrawpass, PickingStrategy};
use crate::registry::Registry;
use crate::render_target::RenderTarget;
use crate::scene::{SceneDescriptor, SceneId};
use crate::scene_renderer::SceneRenderer;
use crate::screen::{SceneTextures, ScreenRenderer};
use crate::texture::Texture;
use crate::transition::{Transition, TransitionConfig, TransitionKind, TransitionState};
use crate::view::ViewType;
use crate::viewport::{FrameStats, Layers};

/// Tile decodes allowed in flight at once.
const MAX_TILE_REQUESTS: usize = 8;
const FALLBACK_MEDIA: &str = "builtin:grid";
const BACKGROUND_FX_LABEL: &str = "Background Fx Input";
const RENDER_FX_LABEL: &str = "Render Fx Output";

/// Outcome of a [`Viewer::load_scene`] request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Started,
    /// The scene is already shown or already loading.
    AlreadyCurrent,
    UnknownScene,
    UnknownTransition,
}

/// What a load request does given the scenes alive now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoadPlan {
    /// Start loading, dropping any scene already loading.
    Load,
    /// Requested scene is loading already.
    Keep,
    /// Requested scene is current. Any other scene loading is dropped.
    Cancel,
}

fn plan_load(current: Option<&SceneId>, loading: Option<&SceneId>, id: &SceneId) -> LoadPlan {
    if loading == Some(id) {
        LoadPlan::Keep
    } else if current == Some(id) {
        LoadPlan::Cancel
    } else {
        LoadPlan::Load
    }
}

/// Transition config for a load request, or the status refusing it.
fn resolve_load(
    registry: &Registry,
    id: &SceneId,
    transition: Option<&str>,
    default: TransitionConfig,
) -> Result<TransitionConfig, LoadStatus> {
    if registry.scene(id).is_none() {
        return Err(LoadStatus::UnknownScene);
    }
    match transition {
        Some(name) => registry
            .transition(name)
            .ok_or(LoadStatus::UnknownTransition),
        None => Ok(default),
    }
}

/// State of the loading scene's main media.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoadingMedia {
    Waiting,
    Ready,
    Failed,
}

/// Slot changes and events from one [`SceneFlow`] call, applied in field order.
#[derive(Debug, Default, PartialEq)]
struct FlowChange {
    /// The loading scene was abandoned.
    dropped: Option<SceneId>,
    /// A slot must be built for this scene.
    created: Option<SceneId>,
    /// The loading scene became current.
    swapped: bool,
    events: Vec<ViewerEvent>,
}

/// Which scene is current, which is loading, and the transition between them.
#[derive(Debug, Default)]
struct SceneFlow {
    current: Option<SceneId>,
    loading: Option<SceneId>,
    transition: Option<Transition>,
}

impl SceneFlow {
    fn request(&mut self, id: &SceneId, config: TransitionConfig) -> (LoadStatus, FlowChange) {
        let mut change = FlowChange::default();
        match plan_load(self.current.as_ref(), self.loading.as_ref(), id) {
            LoadPlan::Keep => return (LoadStatus::AlreadyCurrent, change),
            LoadPlan::Cancel => {
                change.dropped = self.cancel();
                return (LoadStatus::AlreadyCurrent, change);
            }
            LoadPlan::Load => change.dropped = self.cancel(),
        }

        self.transition = Some(Transition::new(self.current.clone(), id.clone(), config));
        self.loading = Some(id.clone());
        debug!(scene = %id, transition = config.screen.kind.name(), "scene load started");
        change.created = Some(id.clone());
        change.events.push(ViewerEvent::SceneLoadStart(id.clone()));
        (LoadStatus::Started, change)
    }

    fn cancel(&mut self) -> Option<SceneId> {
        self.transition = None;
        self.loading.take()
    }

    /// Advance by `dt` seconds. A pending transition starts once `media` is
    /// ready and is abandoned if it failed.
    fn step(&mut self, dt: f32, media: LoadingMedia) -> FlowChange {
        let mut change = FlowChange::default();
        let Some(transition) = self.transition.as_mut() else {
            return change;
        };

        if transition.state() == TransitionState::Pending {
            match media {
                LoadingMedia::Waiting => {}
                LoadingMedia::Failed => {
                    warn!(scene = %transition.incoming, "scene media failed to load, staying put");
                    change.dropped = self.cancel();
                }
                LoadingMedia::Ready => {
                    transition.start();
                    let from = transition.outgoing.clone();
                    let to = transition.incoming.clone();
                    debug!(from = ?from, to = %to, kind = transition.kind().name(), "transition started");
                    change.events.push(ViewerEvent::SceneLoadComplete(to.clone()));
                    change.events.push(ViewerEvent::TransitionStart { from, to });
                }
            }
            return change;
        }

        transition.advance(dt);
        if !transition.is_complete() {
            return change;
        }
        let Some(done) = self.transition.take() else {
            return change;
        };
        if let Some(incoming) = self.loading.take() {
            self.current = Some(incoming);
            change.swapped = true;
        }
        debug!(to = %done.incoming, "transition complete");
        change.events.push(ViewerEvent::TransitionComplete {
            from: done.outgoing,
            to: done.incoming,
        });
        change
    }

    /// The transition once it mixes on screen.
    fn mixing(&self) -> Option<&Transition> {
        self.transition
            .as_ref()
            .filter(|t| t.state() != TransitionState::Pending)
    }
}

/// Effect chain bound to one scene, with the target it reads or writes.
struct SceneFx {
    composer: EffectComposer,
    target: RenderTarget,
}

impl SceneFx {
    fn new(gpu: &GpuContext, passes: Vec<SharedPass>, label: &str) -> Option<Self> {
        if passes.is_empty() {
            return None;
        }
        let mut composer = EffectComposer::new(gpu, label);
        composer.set_passes(passes);
        Some(Self {
            composer,
            target: RenderTarget::new(gpu, label),
        })
    }

    /// Point `chain` at `passes`, building or dropping it as needed.
    fn sync(chain: &mut Option<Self>, gpu: &GpuContext, passes: Vec<SharedPass>, label: &str) {
        match chain {
            Some(fx) if !passes.is_empty() => fx.composer.set_passes(passes),
            _ => *chain = Self::new(gpu, passes, label),
        }
    }
}

/// One step of a scene's frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SceneStep {
    Draw(Layers),
    /// Background chain from the background-only image into the scene target.
    BackgroundFx,
    /// Render chain from the full scene image into its output.
    RenderFx,
}

/// Order of a scene's frame. Background passes see the panorama before any
/// hotspot is drawn; render passes see the finished scene.
fn scene_steps(background_fx: bool, render_fx: bool) -> Vec<SceneStep> {
    let mut steps = if background_fx {
        vec![
            SceneStep::Draw(Layers::Background),
            SceneStep::BackgroundFx,
            SceneStep::Draw(Layers::Objects),
        ]
    } else {
        vec![SceneStep::Draw(Layers::All)]
    };
    if render_fx {
        steps.push(SceneStep::RenderFx);
    }
    steps
}

struct SceneSlot {
    renderer: SceneRenderer,
    background_fx: Option<SceneFx>,
    render_fx: Option<SceneFx>,
}

impl SceneSlot {
    fn image(&self) -> &wgpu::TextureView {
        match &self.render_fx {
            Some(fx) => &fx.target.view,
            None => self.renderer.texture_view(),
        }
    }

    fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        pool: &mut MaterialPool,
        mesh_pass: &MeshPass,
    ) {
        let Self {
            renderer,
            background_fx,
            render_fx,
        } = self;
        renderer.resize(gpu);

        for step in scene_steps(background_fx.is_some(), render_fx.is_some()) {
            match step {
                SceneStep::Draw(Layers::Background) => {
                    if let Some(fx) = background_fx.as_mut() {
                        fx.target.ensure_size(gpu, BACKGROUND_FX_LABEL);
                        renderer.render(
                            gpu,
                            encoder,
                            pool,
                            mesh_pass,
                            Layers::Background,
                            Some(&fx.target.view),
                        );
                    }
                }
                SceneStep::Draw(layers) => {
                    renderer.render(gpu, encoder, pool, mesh_pass, layers, None);
                }
                SceneStep::BackgroundFx => {
                    if let Some(fx) = background_fx.as_mut() {
                        fx.composer
                            .render(gpu, encoder, &fx.target.view, renderer.texture_view());
                    }
                }
                SceneStep::RenderFx => {
                    if let Some(fx) = render_fx.as_mut() {
                        fx.target.ensure_size(gpu, RENDER_FX_LABEL);
                        fx.composer
                            .render(gpu, encoder, renderer.texture_view(), &fx.target.view);
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct Scenes {
    current: Option<SceneSlot>,
    loading: Option<SceneSlot>,
}

impl Scenes {
    fn slots_mut(&mut self) -> impl Iterator<Item = &mut SceneSlot> {
        self.current.iter_mut().chain(self.loading.iter_mut())
    }

    fn find_mut(&mut self, id: &SceneId) -> Option<&mut SceneSlot> {
        self.slots_mut().find(|slot| &slot.renderer.scene_id == id)
    }
}

impl SceneTextures for Scenes {
    fn scene_texture(&self, id: &SceneId) -> Option<wgpu::TextureView> {
        self.current
            .iter()
            .chain(self.loading.iter())
            .find(|slot| &slot.renderer.scene_id == id)
            .map(|slot| slot.image().clone())
    }
}

/// Panorama viewer bound to one window surface.
pub struct Viewer {
    gpu: GpuContext,
    config: ViewerConfig,
    registry: Registry,
    layout: Layout,
    view_type: ViewType,
    pool: MaterialPool,
    mesh_pass: MeshPass,
    screen: ScreenRenderer,
    composite: RenderTarget,
    fx: FxManager,
    screen_fx: EffectComposer,
    picking: PickingStrategy,
    drawpass: PickingDrawpass,
    events: EventDispatcher<ViewerEvent>,
    loader: MediaLoader,
    clock: Clock,
    flow: SceneFlow,
    scenes: Scenes,
}

impl Viewer {
    pub fn new(gpu: GpuContext, config: ViewerConfig) -> Self {
        let registry = config.registry();
        let layout = config.base_layout();

        let mut fx = FxManager::default();
        let added = fx.add_config(&config.fx);
        if added < config.fx.len() {
            warn!(configured = config.fx.len(), added, "some fx passes were skipped");
        }
        for (id, url) in &config.fx_textures {
            match load_image(url) {
                Ok(image) => {
                    let texture = Texture::from_image(&gpu, &image, id);
                    fx.register_texture(id, Rc::new(texture));
                }
                Err(error) => warn!(texture = %id, %url, %error, "fx texture not loaded"),
            }
        }
        let mut screen_fx = EffectComposer::new(&gpu, "Screen Fx");
        screen_fx.set_passes(fx.passes_at(PassPosition::Global));

        info!(
            scenes = registry.len(),
            layout = %layout.name,
            view = config.view.name(),
            fx = fx.len(),
            "viewer created"
        );

        Self {
            pool: MaterialPool::new(&gpu),
            mesh_pass: MeshPass::new(&gpu, gpu.format()),
            screen: ScreenRenderer::new(&gpu),
            composite: RenderTarget::new(&gpu, "Screen Composite"),
            drawpass: PickingDrawpass::new(&gpu),
            screen_fx,
            fx,
            registry,
            layout,
            view_type: config.view,
            picking: config.picking,
            events: EventDispatcher::new(),
            loader: MediaLoader::new(),
            clock: Clock::new(),
            flow: SceneFlow::default(),
            scenes: Scenes::default(),
            config,
            gpu,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Subscribe to viewer events here.
    pub fn events(&mut self) -> &mut EventDispatcher<ViewerEvent> {
        &mut self.events
    }

    pub fn fx(&self) -> &FxManager {
        &self.fx
    }

    pub fn current_scene(&self) -> Option<&SceneId> {
        self.flow.current.as_ref()
    }

    pub fn loading_scene(&self) -> Option<&SceneId> {
        self.flow.loading.as_ref()
    }

    pub fn transition(&self) -> Option<&Transition> {
        self.flow.transition.as_ref()
    }

    /// Camera of the scene on screen.
    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        self.scenes.current.as_mut().map(|slot| &mut slot.renderer.camera)
    }

    /// Fov range of the active view.
    pub fn fov_limits(&self) -> (f32, f32) {
        self.view_type.projection().fov_limits()
    }

    pub fn view_type(&self) -> ViewType {
        self.view_type
    }

    pub fn last_stats(&self) -> Option<FrameStats> {
        self.scenes
            .current
            .as_ref()
            .map(|slot| slot.renderer.last_stats())
    }

    /// Start the scene from the config, if there is one.
    pub fn load_initial(&mut self) -> Option<LoadStatus> {
        let id = self.config.initial_scene_id()?;
        Some(self.load_scene(&id, None))
    }

    /// Begin switching to scene `id`, with a named transition or the default.
    ///
    /// The new scene renders off-screen until its media is ready, then the
    /// transition runs. Requesting another scene while one is loading drops
    /// the pending one.
    pub fn load_scene(&mut self, id: &SceneId, transition: Option<&str>) -> LoadStatus {
        let config = match resolve_load(&self.registry, id, transition, self.config.transition) {
            Ok(config) => config,
            Err(status) => return status,
        };
        let (status, change) = self.flow.request(id, config);
        self.apply(change);
        status
    }

    /// Load the scene `step` places after the current one in config order.
    pub fn load_neighbour(&mut self, step: isize) -> Option<LoadStatus> {
        let from = self
            .loading_scene()
            .or(self.current_scene())
            .cloned()?;
        let id = self.registry.neighbour(&from, step)?.clone();
        Some(self.load_scene(&id, None))
    }

    /// Bring slots and the screen in line with a flow change, then emit its events.
    fn apply(&mut self, change: FlowChange) {
        if let Some(id) = &change.dropped {
            if let Some(mut slot) = self.scenes.loading.take() {
                debug!(scene = %id, "pending scene dropped");
                slot.renderer.destroy();
            }
        }
        if let Some(id) = &change.created {
            let descriptor = self.registry.scene(id).cloned();
            let config = self.flow.transition.as_ref().map(|t| t.config);
            if let (Some(descriptor), Some(config)) = (descriptor, config) {
                let slot = self.create_slot(&descriptor, config);
                self.request_media(&descriptor);
                self.scenes.loading = Some(slot);
            }
        }
        if change.swapped {
            if let Some(incoming) = self.scenes.loading.take() {
                if let Some(mut outgoing) = self.scenes.current.replace(incoming) {
                    outgoing.renderer.destroy();
                }
            }
        }

        match self.flow.mixing() {
            Some(transition) => {
                self.screen.set_kind(transition.kind());
                self.screen.set_mix_ratio(transition.ratio());
            }
            None => {
                self.screen.set_kind(TransitionKind::None);
                self.screen.set_mix_ratio(0.0);
            }
        }

        for event in &change.events {
            self.events.dispatch(event);
        }
    }

    fn create_slot(&self, descriptor: &SceneDescriptor, config: TransitionConfig) -> SceneSlot {
        let layout = descriptor
            .layout
            .as_ref()
            .map(Layout::from_spec)
            .unwrap_or_else(|| self.layout.clone());
        let view = descriptor.view.unwrap_or(self.view_type);
        let renderer = SceneRenderer::new(
            &self.gpu,
            descriptor,
            layout,
            view,
            config.background,
            self.config.texture_budget,
        );
        SceneSlot {
            renderer,
            background_fx: SceneFx::new(
                &self.gpu,
                self.fx.passes_at(PassPosition::Background),
                BACKGROUND_FX_LABEL,
            ),
            render_fx: SceneFx::new(
                &self.gpu,
                self.fx.passes_at(PassPosition::Render),
                RENDER_FX_LABEL,
            ),
        }
    }

    fn request_media(&mut self, descriptor: &SceneDescriptor) {
        let id = &descriptor.id;
        let media = &descriptor.media;
        if let Some(url) = &media.preview_url {
            self.loader.request(LoadKey::Preview(id.clone()), url);
        }
        if media.format != MediaFormat::Tiled {
            let url = match &media.url {
                Some(url) => url.as_str(),
                None => {
                    warn!(scene = %id, "scene has no media url, showing a grid");
                    FALLBACK_MEDIA
                }
            };
            self.loader.request(LoadKey::Media(id.clone()), url);
        }
        for hotspot in &descriptor.hotspots {
            if let Some(url) = hotspot.media.as_ref().and_then(|m| m.url.as_ref()) {
                self.loader
                    .request(LoadKey::Hotspot(id.clone(), hotspot.id.clone()), url);
            }
        }
    }

    /// Add passes at runtime. Returns how many resolved.
    pub fn add_fx(&mut self, configs: &[PassConfig]) -> usize {
        let added = self.fx.add_config(configs);
        self.sync_fx();
        added
    }

    pub fn remove_fx(&mut self, uid: &str) -> bool {
        let removed = self.fx.remove(uid);
        self.sync_fx();
        removed
    }

    /// Flip bypass on every pass.
    pub fn toggle_fx_bypass(&mut self) -> bool {
        let bypass = self.fx.toggle_bypass_all();
        info!(bypass, "fx bypass toggled");
        bypass
    }

    fn sync_fx(&mut self) {
        self.screen_fx
            .set_passes(self.fx.passes_at(PassPosition::Global));
        let background = self.fx.passes_at(PassPosition::Background);
        let render = self.fx.passes_at(PassPosition::Render);
        let gpu = &self.gpu;
        for slot in self.scenes.slots_mut() {
            SceneFx::sync(&mut slot.background_fx, gpu, background.clone(), BACKGROUND_FX_LABEL);
            SceneFx::sync(&mut slot.render_fx, gpu, render.clone(), RENDER_FX_LABEL);
        }
    }

    /// Switch every scene's projection.
    pub fn set_view(&mut self, view_type: ViewType) {
        self.view_type = view_type;
        for slot in self.scenes.slots_mut() {
            slot.renderer.set_view(view_type);
        }
        info!(view = view_type.name(), "view changed");
    }

    /// Apply a named layout to every scene. Unknown names are ignored.
    pub fn set_layout(&mut self, name: &str) -> bool {
        let Some(layout) = self.registry.layout(name).cloned() else {
            return false;
        };
        for slot in self.scenes.slots_mut() {
            slot.renderer.set_layout(layout.clone());
        }
        self.layout = layout;
        true
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
        self.composite.ensure_size(&self.gpu, "Screen Composite");
        let gpu = &self.gpu;
        for slot in self.scenes.slots_mut() {
            slot.renderer.resize(gpu);
            if let Some(fx) = &mut slot.background_fx {
                fx.target.ensure_size(gpu, BACKGROUND_FX_LABEL);
            }
            if let Some(fx) = &mut slot.render_fx {
                fx.target.ensure_size(gpu, RENDER_FX_LABEL);
            }
        }
    }

    /// Pick the hotspot under a window pixel and emit `HotspotClicked`.
    ///
    /// HUD hotspots are tested first, then the configured strategy.
    pub fn pointer_pick(&mut self, pointer: Vec2) -> Option<PickResult> {
        let slot = self.scenes.current.as_mut()?;
        let result = match slot.renderer.pick_hud(pointer) {
            Some(hit) => hit,
            None => match self.picking {
                PickingStrategy::Raycast => slot.renderer.pick_raycast(pointer),
                PickingStrategy::Drawpass => slot.renderer.pick_drawpass(
                    &self.gpu,
                    &mut self.mesh_pass,
                    &mut self.drawpass,
                    pointer,
                ),
            }?,
        };
        let scene = slot.renderer.scene_id.clone();
        debug!(scene = %scene, hotspot = %result.hotspot_id, distance = result.distance, "hotspot picked");
        self.events.dispatch(&ViewerEvent::HotspotClicked {
            scene,
            hotspot: result.hotspot_id.clone(),
        });
        Some(result)
    }

    /// Load the scene a picked hotspot points to, if it has one.
    pub fn follow_hotspot(&mut self, pick: &PickResult) -> Option<LoadStatus> {
        let target = self
            .scenes
            .current
            .as_ref()?
            .renderer
            .objects
            .hotspot(pick.entity)?
            .target?;
        Some(self.load_scene(&target, None))
    }

    /// Run one frame: load, animate, render, composite, post-process and present.
    ///
    /// Returns the current scene's draw counts, or `None` if the frame was skipped.
    pub fn frame(&mut self, now: Instant) -> Option<FrameStats> {
        self.clock.tick(now);
        let dt = self.clock.delta();
        let elapsed = self.clock.elapsed() as f64;

        self.apply_loaded(elapsed);
        self.advance_transition(dt);
        self.fx.advance(dt);
        self.update_scenes(dt, elapsed);
        self.render()
    }

    fn apply_loaded(&mut self, now: f64) {
        for loaded in self.loader.poll() {
            let gpu = &self.gpu;
            match self.scenes.find_mut(loaded.key.scene()) {
                Some(slot) => slot.renderer.apply_image(gpu, &loaded.key, &loaded.image, now),
                None => debug!(key = ?loaded.key, "image for a dropped scene ignored"),
            }
        }
        let loader = &self.loader;
        for slot in self.scenes.slots_mut() {
            let key = LoadKey::Media(slot.renderer.scene_id.clone());
            if loader.has_failed(&key) {
                slot.renderer.media.fail();
            }
        }
    }

    fn advance_transition(&mut self, dt: f32) {
        let media = match self.scenes.loading.as_ref() {
            Some(slot) if slot.renderer.media.is_failed() => LoadingMedia::Failed,
            Some(slot) if slot.renderer.is_ready() => LoadingMedia::Ready,
            _ => LoadingMedia::Waiting,
        };
        let change = self.flow.step(dt, media);
        self.apply(change);
    }

    fn update_scenes(&mut self, dt: f32, now: f64) {
        let Self { scenes, loader, .. } = self;
        for slot in scenes.slots_mut() {
            let renderer = &mut slot.renderer;
            renderer.update(dt);

            let mut missing = renderer.missing_tiles();
            if !missing.is_empty() {
                // Coarse levels first.
                missing.sort_by_key(|tile| tile.level);
                let media = &renderer.descriptor().media;
                for tile in missing {
                    if loader.pending_count() >= MAX_TILE_REQUESTS {
                        break;
                    }
                    let Some(url) = media.tile_url(tile.face, tile.level, tile.x, tile.y) else {
                        continue;
                    };
                    loader.request(LoadKey::Tile(renderer.scene_id.clone(), tile), &url);
                }
            }
            renderer.maintain_tiles(now);
        }
    }

    fn render(&mut self) -> Option<FrameStats> {
        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("surface lost, reconfiguring");
                self.gpu.reconfigure();
                return None;
            }
            Err(error) => {
                warn!(%error, "skipping frame");
                return None;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Viewer Encoder"),
            });

        let Self {
            gpu,
            pool,
            mesh_pass,
            scenes,
            ..
        } = self;
        for slot in scenes.slots_mut() {
            slot.render(gpu, &mut encoder, pool, mesh_pass);
        }

        // The loading scene joins the composite only once its transition runs.
        let current = self.current_scene().cloned();
        let loading = match self.flow.mixing() {
            Some(_) => self.loading_scene().cloned(),
            None => None,
        };
        self.screen
            .update(current.as_ref(), loading.as_ref(), &self.scenes);

        self.composite.ensure_size(&self.gpu, "Screen Composite");
        self.screen
            .render(&self.gpu, &mut encoder, &self.composite.view);
        self.screen_fx
            .render(&self.gpu, &mut encoder, &self.composite.view, &view);

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.last_stats()
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        for slot in self.scenes.slots_mut() {
            slot.renderer.destroy();
        }
        self.pool.clear();
        self.events.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaDescriptor;
    use crate::transition::TransitionSpec;
    use crate::viewport::DrawStep;

    fn id(name: &str) -> SceneId {
        SceneId::new(name)
    }

    fn blend(ms: f32) -> TransitionConfig {
        TransitionConfig {
            screen: TransitionSpec::new(TransitionKind::Blend, ms),
            ..TransitionConfig::default()
        }
    }

    /// Flow with `a` current and nothing loading.
    fn showing_a() -> SceneFlow {
        let mut flow = SceneFlow::default();
        flow.request(&id("a"), blend(100.0));
        flow.step(0.0, LoadingMedia::Ready);
        flow.step(0.0, LoadingMedia::Waiting);
        assert_eq!(flow.current, Some(id("a")));
        flow
    }

    #[test]
    fn load_plan() {
        let a = SceneId::new("a");
        let b = SceneId::new("b");
        let c = SceneId::new("c");
        assert_eq!(plan_load(None, None, &a), LoadPlan::Load);
        assert_eq!(plan_load(Some(&a), None, &b), LoadPlan::Load);
        assert_eq!(plan_load(Some(&a), None, &a), LoadPlan::Cancel);
        assert_eq!(plan_load(Some(&a), Some(&b), &b), LoadPlan::Keep);
        assert_eq!(plan_load(Some(&a), Some(&b), &c), LoadPlan::Load);
        assert_eq!(plan_load(Some(&a), Some(&b), &a), LoadPlan::Cancel);
    }

    #[test]
    fn unknown_scene_and_transition_are_refused() {
        let mut registry = Registry::new();
        registry.add_scene(SceneDescriptor::new(
            "hall",
            MediaDescriptor::image(MediaFormat::Equirectangular, "hall.jpg"),
        ));
        let default = TransitionConfig::default();

        assert_eq!(
            resolve_load(&registry, &id("attic"), None, default),
            Err(LoadStatus::UnknownScene)
        );
        assert_eq!(
            resolve_load(&registry, &id("hall"), Some("spiral"), default),
            Err(LoadStatus::UnknownTransition)
        );
        assert_eq!(
            resolve_load(&registry, &id("hall"), Some("instant"), default),
            Ok(TransitionConfig::instant())
        );
        assert_eq!(resolve_load(&registry, &id("hall"), None, default), Ok(default));
    }

    #[test]
    fn events_follow_the_load_lifecycle() {
        let mut flow = showing_a();

        let (status, change) = flow.request(&id("b"), blend(100.0));
        assert_eq!(status, LoadStatus::Started);
        assert_eq!(change.created, Some(id("b")));
        assert_eq!(change.events, [ViewerEvent::SceneLoadStart(id("b"))]);

        // Nothing happens until the media is ready.
        assert_eq!(flow.step(0.5, LoadingMedia::Waiting), FlowChange::default());
        assert!(flow.mixing().is_none());

        let started = flow.step(0.016, LoadingMedia::Ready);
        assert_eq!(
            started.events,
            [
                ViewerEvent::SceneLoadComplete(id("b")),
                ViewerEvent::TransitionStart {
                    from: Some(id("a")),
                    to: id("b"),
                },
            ]
        );
        assert!(!started.swapped);

        let midway = flow.step(0.05, LoadingMedia::Ready);
        assert!(midway.events.is_empty());
        let ratio = flow.mixing().unwrap().ratio();
        assert!(ratio > 0.0 && ratio < 1.0);
        assert_eq!(flow.current, Some(id("a")));

        let done = flow.step(0.06, LoadingMedia::Ready);
        assert!(done.swapped);
        assert_eq!(
            done.events,
            [ViewerEvent::TransitionComplete {
                from: Some(id("a")),
                to: id("b"),
            }]
        );
        assert_eq!(flow.current, Some(id("b")));
        assert_eq!(flow.loading, None);
        assert!(flow.transition.is_none());
    }

    #[test]
    fn first_scene_swaps_the_frame_after_it_is_ready() {
        let mut flow = SceneFlow::default();
        let (status, _) = flow.request(&id("a"), blend(1000.0));
        assert_eq!(status, LoadStatus::Started);

        let started = flow.step(0.016, LoadingMedia::Ready);
        assert_eq!(started.events.len(), 2);
        assert!(!started.swapped);

        let done = flow.step(0.016, LoadingMedia::Ready);
        assert!(done.swapped);
        assert_eq!(flow.current, Some(id("a")));
    }

    #[test]
    fn new_request_pre_empts_the_loading_scene() {
        let mut flow = showing_a();
        flow.request(&id("b"), blend(100.0));

        let (status, change) = flow.request(&id("c"), blend(100.0));
        assert_eq!(status, LoadStatus::Started);
        assert_eq!(change.dropped, Some(id("b")));
        assert_eq!(change.created, Some(id("c")));
        assert_eq!(flow.loading, Some(id("c")));
        let transition = flow.transition.as_ref().unwrap();
        assert_eq!(transition.outgoing, Some(id("a")));
        assert_eq!(transition.incoming, id("c"));

        // Asking for the scene already loading changes nothing.
        let (status, change) = flow.request(&id("c"), blend(100.0));
        assert_eq!(status, LoadStatus::AlreadyCurrent);
        assert_eq!(change, FlowChange::default());
    }

    #[test]
    fn requesting_the_current_scene_cancels_loading() {
        let mut flow = showing_a();
        flow.request(&id("b"), blend(100.0));

        let (status, change) = flow.request(&id("a"), blend(100.0));
        assert_eq!(status, LoadStatus::AlreadyCurrent);
        assert_eq!(change.dropped, Some(id("b")));
        assert!(change.events.is_empty());
        assert_eq!(flow.current, Some(id("a")));
        assert_eq!(flow.loading, None);
        assert!(flow.transition.is_none());
    }

    #[test]
    fn failed_media_abandons_the_load() {
        let mut flow = showing_a();
        flow.request(&id("b"), blend(100.0));

        let change = flow.step(0.016, LoadingMedia::Failed);
        assert_eq!(change.dropped, Some(id("b")));
        assert!(change.events.is_empty());
        assert_eq!(flow.current, Some(id("a")));
        assert!(flow.transition.is_none());
    }

    #[test]
    fn background_fx_run_before_hotspots_are_drawn() {
        assert_eq!(scene_steps(false, false), [SceneStep::Draw(Layers::All)]);
        assert_eq!(
            scene_steps(false, true),
            [SceneStep::Draw(Layers::All), SceneStep::RenderFx]
        );
        assert_eq!(
            scene_steps(true, true),
            [
                SceneStep::Draw(Layers::Background),
                SceneStep::BackgroundFx,
                SceneStep::Draw(Layers::Objects),
                SceneStep::RenderFx,
            ]
        );

        // No hotspot layer reaches the background chain's input.
        let steps = scene_steps(true, false);
        let fx_at = steps
            .iter()
            .position(|s| *s == SceneStep::BackgroundFx)
            .unwrap();
        assert!(steps[..fx_at].iter().all(|s| match s {
            SceneStep::Draw(layers) =>
                !layers.includes(DrawStep::Objects) && !layers.includes(DrawStep::Hud),
            _ => true,
        }));
    }
}
