//! Multi-resolution cube tiles: level choice, visibility and the tile store.

use std::rc::Rc;

use glam::Vec3;
use tracing::debug;

use crate::geometry::face_basis;
use crate::loader::TileKey;
use crate::media::CubeFace;
use crate::texture::Texture;
use crate::texture_cache::{MediaTexture, TextureCache};

/// Finest level whose face resolution does not exceed what the viewport needs.
///
/// A cube face spans 90 degrees. At `fov` degrees over `viewport_height`
/// pixels the screen shows `viewport_height * 90 / fov` pixels per face edge;
/// the first level at or above that wins, capped at the finest level.
pub fn select_level(fov: f32, viewport_height: u32, tile_size: u32, levels: u32) -> u32 {
    let levels = levels.max(1);
    let needed = viewport_height.max(1) as f32 * 90.0 / fov.clamp(1.0, 360.0);
    (0..levels)
        .find(|&level| ((1u32 << level.min(15)) * tile_size.max(1)) as f32 >= needed)
        .unwrap_or(levels - 1)
}

/// Direction to the centre of a tile and its angular radius in radians.
pub fn tile_bounds(tile: TileKey) -> (Vec3, f32) {
    let tiles = 1u32 << tile.level.min(15);
    let (normal, right, down) = face_basis(tile.face);
    let step = 2.0 / tiles as f32;
    let point = |s: f32, t: f32| normal + right * (s * step - 1.0) + down * (t * step - 1.0);

    let center = point(tile.x as f32 + 0.5, tile.y as f32 + 0.5).normalize();
    let radius = [
        point(tile.x as f32, tile.y as f32),
        point(tile.x as f32 + 1.0, tile.y as f32),
        point(tile.x as f32, tile.y as f32 + 1.0),
        point(tile.x as f32 + 1.0, tile.y as f32 + 1.0),
    ]
    .iter()
    .map(|corner| center.angle_between(corner.normalize()))
    .fold(0.0_f32, f32::max);
    (center, radius)
}

/// Tiles of `level` that may be visible within `half_angle` radians of `forward`.
pub fn visible_tiles(forward: Vec3, half_angle: f32, level: u32) -> Vec<TileKey> {
    let tiles = 1u32 << level.min(15);
    let forward = forward.normalize_or_zero();
    let mut out = Vec::new();
    for face in CubeFace::ALL {
        for y in 0..tiles {
            for x in 0..tiles {
                let key = TileKey::new(face, level, x, y);
                let (center, radius) = tile_bounds(key);
                if forward.angle_between(center) <= half_angle + radius {
                    out.push(key);
                }
            }
        }
    }
    out
}

/// Every tile of level 0.
pub fn base_tiles() -> Vec<TileKey> {
    CubeFace::ALL
        .iter()
        .map(|&face| TileKey::new(face, 0, 0, 0))
        .collect()
}

/// Loaded tile textures of one scene.
///
/// Level-0 tiles are locked so a complete cube is always drawable.
pub struct TileStore {
    cache: TextureCache<TileKey, Rc<Texture>>,
}

impl TileStore {
    pub fn new(budget: u64) -> Self {
        Self {
            cache: TextureCache::new(budget),
        }
    }

    pub fn insert(&mut self, key: TileKey, texture: Rc<Texture>, now: f64) {
        let size = texture.byte_size();
        let mut entry = MediaTexture::new(texture, size, now);
        if key.level == 0 {
            entry = entry.locked();
        }
        self.cache.insert(key, entry);
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.cache.contains(key)
    }

    pub fn texture(&self, key: &TileKey) -> Option<&Rc<Texture>> {
        self.cache.peek(key).map(|entry| &entry.texture)
    }

    /// Record use of the tiles drawn this frame.
    pub fn touch(&mut self, keys: &[TileKey], now: f64) {
        for key in keys {
            self.cache.get(key, now);
        }
    }

    /// The tile itself if loaded, else its closest loaded ancestor.
    pub fn best_available(&self, key: TileKey) -> Option<TileKey> {
        let mut current = Some(key);
        while let Some(k) = current {
            if self.cache.contains(&k) {
                return Some(k);
            }
            current = k.parent();
        }
        None
    }

    pub fn has_base(&self) -> bool {
        base_tiles().iter().all(|k| self.cache.contains(k))
    }

    /// Drop least used tiles until within budget.
    pub fn evict(&mut self) -> Vec<TileKey> {
        let evicted = self.cache.evict();
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "evicted tiles");
        }
        evicted
    }

    pub fn set_budget(&mut self, budget: u64) {
        self.cache.set_budget(budget);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn level_follows_zoom() {
        // 720px at 90 degrees needs 720px per face: 512 is too small, 1024 fits.
        assert_eq!(select_level(90.0, 720, 512, 4), 1);
        assert_eq!(select_level(120.0, 300, 512, 4), 0);
        // Zoomed far in, capped at the finest level.
        assert_eq!(select_level(10.0, 2000, 512, 3), 2);
    }

    #[test]
    fn base_tile_covers_face() {
        let (center, radius) = tile_bounds(TileKey::new(CubeFace::Front, 0, 0, 0));
        assert_abs_diff_eq!(center.dot(Vec3::NEG_Z), 1.0, epsilon = 1e-6);
        // Corner of a cube face is atan(sqrt 2) from its centre.
        assert_abs_diff_eq!(radius, 2.0_f32.sqrt().atan(), epsilon = 1e-5);
    }

    #[test]
    fn looking_forward_skips_the_back_face() {
        let tiles = visible_tiles(Vec3::NEG_Z, 40_f32.to_radians(), 1);
        assert!(tiles.iter().any(|t| t.face == CubeFace::Front));
        assert!(tiles.iter().all(|t| t.face != CubeFace::Back));
        assert!(tiles.len() < 24);
    }

    #[test]
    fn tile_bounds_is_inside_its_face() {
        let key = TileKey::new(CubeFace::Right, 2, 3, 0);
        let (center, _) = tile_bounds(key);
        // Right face, right-most column, top row: toward +Z and up.
        assert!(center.x > 0.0 && center.z > 0.0 && center.y > 0.0);
    }
}
