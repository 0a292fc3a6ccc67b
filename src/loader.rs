//! Background image decoding.
//!
//! Each request decodes on its own thread and sends the pixels back over a
//! channel. [`MediaLoader::poll`] drains finished work at the start of a
//! frame, so a completion is always consumed on a later frame than the one
//! that asked for it and never in the middle of rendering.

use std::collections::HashSet;
use std::sync::mpsc::{Receiver, Sender, channel};

use image::RgbaImage;
use tracing::{debug, warn};

use crate::media::CubeFace;
use crate::scene::SceneId;

/// One tile of a multi-resolution cube.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub face: CubeFace,
    pub level: u32,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(face: CubeFace, level: u32, x: u32, y: u32) -> Self {
        Self { face, level, x, y }
    }

    /// The tile one level up that covers this one.
    pub fn parent(&self) -> Option<TileKey> {
        (self.level > 0).then(|| TileKey::new(self.face, self.level - 1, self.x / 2, self.y / 2))
    }
}

/// What an image is for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LoadKey {
    Media(SceneId),
    Preview(SceneId),
    Tile(SceneId, TileKey),
    Hotspot(SceneId, String),
}

impl LoadKey {
    pub fn scene(&self) -> &SceneId {
        match self {
            LoadKey::Media(id) | LoadKey::Preview(id) => id,
            LoadKey::Tile(id, _) | LoadKey::Hotspot(id, _) => id,
        }
    }
}

/// Decoded RGBA pixels ready for upload.
#[derive(Debug)]
pub struct LoadedImage {
    pub key: LoadKey,
    pub image: RgbaImage,
}

impl LoadedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

type LoadResult = (LoadKey, Result<RgbaImage, String>);

/// Thread-per-request image loader.
pub struct MediaLoader {
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
    pending: HashSet<LoadKey>,
    failed: HashSet<LoadKey>,
}

impl Default for MediaLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaLoader {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            tx,
            rx,
            pending: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    /// Decode the image at `url` in the background.
    ///
    /// `url` is a file path or a `builtin:` name (see [`builtin_image`]).
    /// Returns false if the key is already in flight or has failed before.
    pub fn request(&mut self, key: LoadKey, url: &str) -> bool {
        let url = url.to_string();
        self.request_with(key, move || load_image(&url))
    }

    /// Run `decode` in the background and deliver its result under `key`.
    pub fn request_with<F>(&mut self, key: LoadKey, decode: F) -> bool
    where
        F: FnOnce() -> Result<RgbaImage, String> + Send + 'static,
    {
        if self.pending.contains(&key) || self.failed.contains(&key) {
            return false;
        }
        debug!(?key, "loading image");
        self.pending.insert(key.clone());
        let tx = self.tx.clone();
        std::thread::spawn(move || {
            let result = decode();
            // The viewer may have been dropped while we were decoding.
            let _ = tx.send((key, result));
        });
        true
    }

    pub fn is_pending(&self, key: &LoadKey) -> bool {
        self.pending.contains(key)
    }

    pub fn has_failed(&self, key: &LoadKey) -> bool {
        self.failed.contains(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Forget failures so the keys can be requested again.
    pub fn clear_failures(&mut self) {
        self.failed.clear();
    }

    /// Collect every finished decode. Failures are logged and remembered.
    pub fn poll(&mut self) -> Vec<LoadedImage> {
        let mut loaded = Vec::new();
        while let Ok((key, result)) = self.rx.try_recv() {
            self.pending.remove(&key);
            match result {
                Ok(image) => {
                    debug!(?key, width = image.width(), height = image.height(), "image loaded");
                    loaded.push(LoadedImage { key, image });
                }
                Err(error) => {
                    warn!(?key, %error, "failed to load image");
                    self.failed.insert(key);
                }
            }
        }
        loaded
    }
}

/// Decode the image at `url` on the calling thread.
pub fn load_image(url: &str) -> Result<RgbaImage, String> {
    if let Some(name) = url.strip_prefix("builtin:") {
        return builtin_image(name).ok_or_else(|| format!("unknown builtin image {name:?}"));
    }
    image::open(url)
        .map(|img| img.to_rgba8())
        .map_err(|e| e.to_string())
}

/// Procedural panoramas for demos and tests.
///
/// - `grid`: 2:1 latitude/longitude grid with a red meridian at the front
/// - `sky`: 2:1 vertical sky-to-ground gradient
/// - `checker`: square checkerboard
pub fn builtin_image(name: &str) -> Option<RgbaImage> {
    match name {
        "grid" => Some(RgbaImage::from_fn(1024, 512, |x, y| {
            let meridian = (x as i32 - 512).abs() < 2;
            let line = x % 64 < 2 || y % 64 < 2;
            if meridian {
                image::Rgba([230, 40, 40, 255])
            } else if line {
                image::Rgba([240, 240, 240, 255])
            } else {
                let shade = 40 + (y * 120 / 512) as u8;
                image::Rgba([shade / 2, shade / 2, shade, 255])
            }
        })),
        "sky" => Some(RgbaImage::from_fn(1024, 512, |_, y| {
            if y < 256 {
                let t = y as f32 / 256.0;
                image::Rgba([
                    (60.0 + 140.0 * t) as u8,
                    (120.0 + 100.0 * t) as u8,
                    (230.0 + 20.0 * t) as u8,
                    255,
                ])
            } else {
                let t = (y - 256) as f32 / 256.0;
                image::Rgba([(90.0 - 50.0 * t) as u8, (120.0 - 60.0 * t) as u8, 50, 255])
            }
        })),
        "checker" => Some(RgbaImage::from_fn(512, 512, |x, y| {
            if (x / 64 + y / 64) % 2 == 0 {
                image::Rgba([220, 220, 220, 255])
            } else {
                image::Rgba([40, 40, 40, 255])
            }
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn poll_until(loader: &mut MediaLoader, count: usize) -> Vec<LoadedImage> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while out.len() < count && Instant::now() < deadline {
            out.extend(loader.poll());
            std::thread::sleep(Duration::from_millis(2));
        }
        out
    }

    #[test]
    fn builtin_images_decode_in_background() {
        let mut loader = MediaLoader::new();
        let key = LoadKey::Media("a".into());
        assert!(loader.request(key.clone(), "builtin:grid"));
        assert!(!loader.request(key.clone(), "builtin:grid"));
        assert!(loader.is_pending(&key));

        let loaded = poll_until(&mut loader, 1);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key, key);
        assert_eq!((loaded[0].width(), loaded[0].height()), (1024, 512));
        assert_eq!(loader.pending_count(), 0);
    }

    #[test]
    fn failures_are_remembered() {
        let mut loader = MediaLoader::new();
        let key = LoadKey::Preview("b".into());
        loader.request(key.clone(), "builtin:nope");

        let deadline = Instant::now() + Duration::from_secs(5);
        while loader.is_pending(&key) && Instant::now() < deadline {
            assert!(loader.poll().is_empty());
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(loader.has_failed(&key));
        assert!(!loader.request(key.clone(), "builtin:grid"));

        loader.clear_failures();
        assert!(loader.request(key, "builtin:grid"));
    }

    #[test]
    fn tile_parent_walks_up_levels() {
        let tile = TileKey::new(CubeFace::Front, 2, 3, 1);
        let parent = tile.parent().unwrap();
        assert_eq!(parent, TileKey::new(CubeFace::Front, 1, 1, 0));
        assert_eq!(parent.parent().unwrap().parent(), None);
    }
}
