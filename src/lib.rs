//! # panoview
//!
//! **A wgpu panorama viewer with layered compositing, scene transitions and
//! post-processing.**
//!
//! Scenes are described in JSON (or built in code), each one a panoramic
//! image shown through a projection, with hotspots that link to other
//! scenes. Switching scenes renders the incoming one off-screen until its
//! media is ready, then mixes it in with a screen transition.
//!
//! ## Quick Start
//!
//! ```no_run
//! use panoview::*;
//!
//! fn main() -> Result<(), ViewerError> {
//!     let config = ViewerConfig::new()
//!         .title("Lobby")
//!         .scene(SceneDescriptor::new(
//!             "lobby",
//!             MediaDescriptor::image(MediaFormat::Equirectangular, "lobby.jpg"),
//!         ))
//!         .fx(PassConfig::new("vignette", "VignetteShader"));
//!
//!     run_with(config, |viewer| {
//!         viewer.events().on(|event, _| println!("{event:?}"));
//!     })
//! }
//! ```
//!
//! ## Layers
//!
//! - **Background**: the panorama itself, drawn per viewport through a
//!   [`ViewType`] projection. Tiled cube media stream in level by level.
//! - **Objects**: hotspots, placed in the world or pinned to the screen.
//! - **Screen**: composites the current and loading scene images.
//! - **Fx**: effect passes from the [`fx`] module, run per scene and on the
//!   final frame.

mod app;
mod background;
mod camera;
mod clock;
mod config;
mod error;
mod events;
pub mod fx;
mod geometry;
mod gpu;
mod input;
mod keyframe;
mod layout;
mod loader;
mod media;
mod mesh;
mod mesh_pass;
mod objects;
mod picking;
mod registry;
mod render_target;
mod scene;
mod scene_renderer;
mod screen;
mod texture;
mod texture_cache;
mod transition;
pub mod view;
mod viewer;
mod viewport;

pub use app::{run, run_with};
pub use background::MaterialPool;
pub use camera::{Camera, CameraController};
pub use clock::Clock;
pub use config::ViewerConfig;
pub use error::{ConfigError, ViewerError};
pub use events::{DispatcherHandle, DispatcherState, EventDispatcher, ListenerId, ViewerEvent};
pub use fx::{EffectComposer, FxManager, PassConfig, PassPosition, ShaderCatalog};
pub use gpu::GpuContext;
pub use input::Input;
pub use keyframe::{CameraKeyframe, Keyframe, Track};
pub use layout::{Layout, LayoutSpec, ViewportConfig, ViewportRect};
pub use loader::{LoadKey, MediaLoader, TileKey, builtin_image, load_image};
pub use media::{CubeFace, MediaDescriptor, MediaFormat, MediaSource};
pub use mesh::{Mesh, Transform};
pub use mesh_pass::MeshPass;
pub use objects::{Hotspot, ObjectRenderer};
pub use picking::{Collider, PickResult, PickingStrategy, Ray};
pub use registry::Registry;
pub use render_target::RenderTarget;
pub use scene::{BackgroundType, CameraStart, HotspotDescriptor, HotspotPose, SceneDescriptor, SceneId};
pub use scene_renderer::SceneRenderer;
pub use screen::{SceneTextures, ScreenRenderer};
pub use texture::Texture;
pub use transition::{
    Easing, Transition, TransitionConfig, TransitionKind, TransitionSpec, TransitionState,
};
pub use view::{ViewProjection, ViewType};
pub use viewer::{LoadStatus, Viewer};
pub use viewport::FrameStats;

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

pub use hecs::Entity;
