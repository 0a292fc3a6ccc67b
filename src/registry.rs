//! Per-viewer lookup of scenes, layouts and transitions by id.

use std::collections::HashMap;

use tracing::warn;

use crate::layout::{Layout, LayoutSpec};
use crate::scene::{SceneDescriptor, SceneId};
use crate::transition::TransitionConfig;

#[derive(Clone, Debug, Default)]
pub struct Registry {
    scenes: HashMap<SceneId, SceneDescriptor>,
    /// Scene ids in registration order, for next/previous navigation.
    order: Vec<SceneId>,
    layouts: HashMap<String, Layout>,
    transitions: HashMap<String, TransitionConfig>,
}

impl Registry {
    pub fn new() -> Self {
        let mut registry = Self::default();
        for layout in [Layout::single(), Layout::vr(), Layout::grid()] {
            registry.layouts.insert(layout.name.clone(), layout);
        }
        registry
            .transitions
            .insert("default".to_string(), TransitionConfig::default());
        registry
            .transitions
            .insert("instant".to_string(), TransitionConfig::instant());
        registry
    }

    /// Add or replace a scene.
    pub fn add_scene(&mut self, scene: SceneDescriptor) {
        if self.scenes.contains_key(&scene.id) {
            warn!(scene = %scene.id, "replacing scene with the same id");
        } else {
            self.order.push(scene.id.clone());
        }
        self.scenes.insert(scene.id.clone(), scene);
    }

    pub fn add_layout(&mut self, name: &str, spec: &LayoutSpec) {
        let mut layout = Layout::from_spec(spec);
        layout.name = name.to_string();
        self.layouts.insert(name.to_string(), layout);
    }

    pub fn add_transition(&mut self, name: &str, config: TransitionConfig) {
        self.transitions.insert(name.to_string(), config);
    }

    pub fn scene(&self, id: &SceneId) -> Option<&SceneDescriptor> {
        let scene = self.scenes.get(id);
        if scene.is_none() {
            warn!(scene = %id, "unknown scene");
        }
        scene
    }

    pub fn has_scene(&self, id: &SceneId) -> bool {
        self.scenes.contains_key(id)
    }

    pub fn layout(&self, name: &str) -> Option<&Layout> {
        let layout = self.layouts.get(name);
        if layout.is_none() {
            warn!(layout = name, "unknown layout");
        }
        layout
    }

    pub fn transition(&self, name: &str) -> Option<TransitionConfig> {
        let transition = self.transitions.get(name).copied();
        if transition.is_none() {
            warn!(transition = name, "unknown transition");
        }
        transition
    }

    /// Scene ids in registration order.
    pub fn scene_ids(&self) -> &[SceneId] {
        &self.order
    }

    /// The scene `step` places after `from`, wrapping around.
    pub fn neighbour(&self, from: &SceneId, step: isize) -> Option<&SceneId> {
        let len = self.order.len() as isize;
        if len == 0 {
            return None;
        }
        let index = self.order.iter().position(|id| id == from)? as isize;
        self.order.get((index + step).rem_euclid(len) as usize)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaDescriptor, MediaFormat};
    use crate::transition::TransitionKind;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        for id in ["a", "b", "c"] {
            registry.add_scene(SceneDescriptor::new(
                id,
                MediaDescriptor::image(MediaFormat::Equirectangular, "builtin:grid"),
            ));
        }
        registry
    }

    #[test]
    fn missing_ids_return_none() {
        let registry = registry();
        assert!(registry.scene(&SceneId::new("nope")).is_none());
        assert!(registry.layout("nope").is_none());
        assert!(registry.transition("nope").is_none());
        assert!(registry.scene(&SceneId::new("b")).is_some());
        assert_eq!(
            registry.transition("instant").unwrap().screen.kind,
            TransitionKind::None
        );
        assert_eq!(registry.layout("vr").unwrap().len(), 2);
    }

    #[test]
    fn neighbours_wrap() {
        let registry = registry();
        let a = SceneId::new("a");
        assert_eq!(registry.neighbour(&a, 1), Some(&SceneId::new("b")));
        assert_eq!(registry.neighbour(&a, -1), Some(&SceneId::new("c")));
        assert!(registry.neighbour(&SceneId::new("z"), 1).is_none());
    }

    #[test]
    fn re_adding_keeps_order() {
        let mut registry = registry();
        registry.add_scene(SceneDescriptor::new("a", MediaDescriptor::default()));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.scene_ids()[0], SceneId::new("a"));
    }

    #[test]
    fn named_layouts() {
        let mut registry = registry();
        registry.add_layout("wide", &LayoutSpec::Preset("grid".into()));
        let layout = registry.layout("wide").unwrap();
        assert_eq!(layout.name, "wide");
        assert_eq!(layout.len(), 4);
    }
}
