//! Viewer configuration, read from JSON.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::fx::PassConfig;
use crate::layout::{Layout, LayoutSpec};
use crate::media::{MediaDescriptor, MediaFormat};
use crate::picking::PickingStrategy;
use crate::registry::Registry;
use crate::scene::{SceneDescriptor, SceneId};
use crate::texture_cache::DEFAULT_TEXTURE_BUDGET;
use crate::transition::TransitionConfig;
use crate::view::ViewType;

/// Everything the viewer needs to start.
///
/// Every field has a default, so `{}` is a valid (if empty) config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub view: ViewType,
    pub layout: LayoutSpec,
    /// Extra layouts by name, selectable at runtime.
    pub layouts: HashMap<String, LayoutSpec>,
    pub transition: TransitionConfig,
    /// Extra transitions by name, for `load_scene` requests.
    pub transitions: HashMap<String, TransitionConfig>,
    pub fx: Vec<PassConfig>,
    /// Images for texture and addition passes, by id.
    pub fx_textures: HashMap<String, String>,
    pub picking: PickingStrategy,
    /// Bytes of GPU texture memory per scene before tiles are evicted.
    pub texture_budget: u64,
    pub scenes: Vec<SceneDescriptor>,
    pub initial_scene: Option<SceneId>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "panoview".to_string(),
            width: 1280,
            height: 720,
            view: ViewType::default(),
            layout: LayoutSpec::default(),
            layouts: HashMap::new(),
            transition: TransitionConfig::default(),
            transitions: HashMap::new(),
            fx: Vec::new(),
            fx_textures: HashMap::new(),
            picking: PickingStrategy::default(),
            texture_budget: DEFAULT_TEXTURE_BUDGET,
            scenes: Vec::new(),
            initial_scene: None,
        }
    }
}

impl ViewerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// One equirectangular scene per image, named after the file stem.
    pub fn from_images<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut config = Self::default();
        for path in paths {
            let path = path.as_ref();
            let id = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("scene-{}", config.scenes.len() + 1));
            config.scenes.push(SceneDescriptor::new(
                id,
                MediaDescriptor::image(
                    MediaFormat::Equirectangular,
                    path.to_string_lossy().into_owned(),
                ),
            ));
        }
        config
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn scene(mut self, scene: SceneDescriptor) -> Self {
        self.scenes.push(scene);
        self
    }

    pub fn fx(mut self, pass: PassConfig) -> Self {
        self.fx.push(pass);
        self
    }

    pub fn base_layout(&self) -> Layout {
        Layout::from_spec(&self.layout)
    }

    /// Scenes, layouts and transitions from this config.
    pub fn registry(&self) -> Registry {
        let mut registry = Registry::new();
        for scene in &self.scenes {
            registry.add_scene(scene.clone());
        }
        for (name, spec) in &self.layouts {
            registry.add_layout(name, spec);
        }
        for (name, transition) in &self.transitions {
            registry.add_transition(name, *transition);
        }
        registry
    }

    /// `initialScene` if it names a scene, else the first scene.
    pub fn initial_scene_id(&self) -> Option<SceneId> {
        if let Some(id) = &self.initial_scene {
            if self.scenes.iter().any(|scene| &scene.id == id) {
                return Some(id.clone());
            }
            warn!(scene = %id, "initial scene not found, using the first scene");
        }
        self.scenes.first().map(|scene| scene.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx::PassPosition;
    use crate::transition::{Easing, TransitionKind};

    const CONFIG: &str = r#"{
        "title": "Tour",
        "view": "littleplanet",
        "layout": "vr",
        "transition": {
            "screen": {"type": "slide", "easing": "quadInOut", "duration": 500}
        },
        "transitions": {"quick": {"screen": {"type": "blend", "duration": 200}}},
        "fx": [
            {"uid": "vig", "type": "VignetteShader", "params": {"darkness": 1.5}},
            {"type": "SepiaShader", "position": "render"}
        ],
        "picking": "drawpass",
        "textureBudget": 1024,
        "scenes": [
            {"id": "hall", "media": {"format": "equirect", "url": "hall.jpg"}},
            {"id": "roof", "media": {"format": "tiled", "tileUrlTemplate": "roof/{face}/{level}/{x}_{y}.jpg", "levels": 3, "tileSize": 512},
             "hotspots": [{"id": "door", "yaw": 30, "target": "hall"}]}
        ],
        "initialScene": "roof"
    }"#;

    #[test]
    fn parses_full_config() {
        let config = ViewerConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(config.title, "Tour");
        assert_eq!(config.width, 1280);
        assert_eq!(config.view, ViewType::Flat);
        assert_eq!(config.base_layout().len(), 2);
        assert_eq!(config.transition.screen.kind, TransitionKind::Slide);
        assert_eq!(config.transition.screen.easing, Easing::EaseInOut);
        assert_eq!(config.transition.screen.duration_ms, 500.0);
        assert_eq!(config.fx.len(), 2);
        assert_eq!(config.fx[1].position, PassPosition::Render);
        assert_eq!(config.picking, PickingStrategy::Drawpass);
        assert_eq!(config.texture_budget, 1024);
        assert_eq!(config.scenes[1].media.levels, 3);
        assert_eq!(config.scenes[1].hotspots[0].target, Some(SceneId::new("hall")));
        assert_eq!(config.initial_scene_id(), Some(SceneId::new("roof")));

        let registry = config.registry();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.transition("quick").unwrap().screen.kind,
            TransitionKind::Blend
        );
    }

    #[test]
    fn unknown_names_degrade_to_defaults() {
        let config = ViewerConfig::from_json_str(
            r#"{"view": "fisheye", "picking": "psychic", "layout": "triple"}"#,
        )
        .unwrap();
        assert_eq!(config.view, ViewType::Rectilinear);
        assert_eq!(config.picking, PickingStrategy::Raycast);
        assert_eq!(config.base_layout(), Layout::single());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = ViewerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.initial_scene_id(), None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            ViewerConfig::from_json_str("{"),
            Err(ConfigError::Serde(_))
        ));
    }

    #[test]
    fn images_become_scenes() {
        let config = ViewerConfig::from_images(["pano/lobby.jpg", "garden.png"]);
        let ids: Vec<&str> = config.scenes.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["lobby", "garden"]);
        assert_eq!(config.scenes[0].media.url.as_deref(), Some("pano/lobby.jpg"));
    }

    #[test]
    fn missing_initial_scene_falls_back() {
        let mut config = ViewerConfig::from_images(["a.jpg", "b.jpg"]);
        config.initial_scene = Some(SceneId::new("zzz"));
        assert_eq!(config.initial_scene_id(), Some(SceneId::new("a")));
    }
}
