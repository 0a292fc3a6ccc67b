//! Registry of effect passes, shared by every composer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use super::catalog::ShaderCatalog;
use super::config::{PassConfig, PassPosition};
use super::pass::FxPass;
use crate::texture::Texture;

pub type SharedPass = Rc<RefCell<FxPass>>;

#[derive(Default)]
pub struct FxManager {
    catalog: ShaderCatalog,
    /// Passes in config order.
    passes: Vec<SharedPass>,
    textures: HashMap<String, Rc<Texture>>,
    next_uid: u32,
}

impl FxManager {
    pub fn new(catalog: ShaderCatalog) -> Self {
        Self {
            catalog,
            ..Default::default()
        }
    }

    pub fn catalog_mut(&mut self) -> &mut ShaderCatalog {
        &mut self.catalog
    }

    /// Resolve and add passes. Entries that fail to resolve are skipped with a
    /// warning. Returns how many were added.
    pub fn add_config(&mut self, configs: &[PassConfig]) -> usize {
        let mut added = 0;
        for config in configs {
            let Some(resolved) = self.catalog.resolve(config) else {
                continue;
            };
            let uid = if config.uid.is_empty() {
                self.next_uid += 1;
                format!("fx-{}", self.next_uid)
            } else {
                config.uid.clone()
            };
            if self.get(&uid).is_some() {
                warn!(uid = %uid, "replacing pass with the same uid");
                self.remove(&uid);
            }

            let mut pass = FxPass::new(uid.clone(), config.position, resolved);
            pass.state.enabled = config.enabled;
            if let Some(id) = pass.kind.texture_id().map(str::to_string) {
                match self.textures.get(&id) {
                    Some(texture) => pass.set_texture(texture.clone()),
                    None => debug!(uid = %uid, texture = %id, "pass waits for texture"),
                }
            }
            debug!(uid = %uid, kind = %config.kind, position = ?config.position, "pass added");
            self.passes.push(Rc::new(RefCell::new(pass)));
            added += 1;
        }
        added
    }

    pub fn remove(&mut self, uid: &str) -> bool {
        let before = self.passes.len();
        self.passes.retain(|pass| pass.borrow().uid != uid);
        before != self.passes.len()
    }

    pub fn get(&self, uid: &str) -> Option<&SharedPass> {
        self.passes.iter().find(|pass| pass.borrow().uid == uid)
    }

    pub fn set_enabled(&self, uid: &str, enabled: bool) -> bool {
        self.with_pass(uid, |pass| pass.state.enabled = enabled)
    }

    pub fn set_bypass(&self, uid: &str, bypass: bool) -> bool {
        self.with_pass(uid, |pass| pass.state.bypass = bypass)
    }

    /// Flip bypass on every pass. Returns the new setting.
    pub fn toggle_bypass_all(&self) -> bool {
        let bypass = !self.passes.iter().all(|pass| pass.borrow().state.bypass);
        for pass in &self.passes {
            pass.borrow_mut().state.bypass = bypass;
        }
        bypass
    }

    fn with_pass(&self, uid: &str, apply: impl FnOnce(&mut FxPass)) -> bool {
        match self.get(uid) {
            Some(pass) => {
                apply(&mut *pass.borrow_mut());
                true
            }
            None => {
                warn!(uid, "no such pass");
                false
            }
        }
    }

    /// Passes at `position`, in config order.
    pub fn passes_at(&self, position: PassPosition) -> Vec<SharedPass> {
        self.passes
            .iter()
            .filter(|pass| pass.borrow().position == position)
            .cloned()
            .collect()
    }

    /// Advance every pass clock. Call once per frame.
    pub fn advance(&self, dt: f32) {
        for pass in &self.passes {
            pass.borrow_mut().advance(dt);
        }
    }

    /// Make an image available to texture and addition passes under `id`.
    pub fn register_texture(&mut self, id: &str, texture: Rc<Texture>) {
        for pass in &self.passes {
            let mut pass = pass.borrow_mut();
            if pass.kind.texture_id() == Some(id) {
                pass.set_texture(texture.clone());
            }
        }
        self.textures.insert(id.to_string(), texture);
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}
