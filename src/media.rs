//! Media descriptors consumed by the background renderers.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Layout of the pixels in a panorama source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaFormat {
    /// 2:1 equirectangular image wrapped on a sphere.
    Equirectangular,
    /// Six cube faces packed in a 6x1 strip (+X -X +Y -Y +Z -Z).
    Cube,
    /// Ordinary rectangular image shown on a plane.
    #[default]
    Flat,
    /// Multi-resolution cube tiles.
    Tiled,
    /// Flat image split into a grid of tiles.
    Grid,
    /// Small image used as a hotspot sprite.
    Hotspot,
}

impl MediaFormat {
    /// Value written into the `media_format` shader uniform.
    ///
    /// 0 = equirectangular, 1 = cube, 2 = flat.
    pub fn shader_index(self) -> u32 {
        match self {
            MediaFormat::Equirectangular | MediaFormat::Tiled => 0,
            MediaFormat::Cube => 1,
            MediaFormat::Flat | MediaFormat::Grid | MediaFormat::Hotspot => 2,
        }
    }

    /// Parse a config name, falling back to [`MediaFormat::Flat`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "equi" | "equirect" | "equirectangular" => MediaFormat::Equirectangular,
            "cube" => MediaFormat::Cube,
            "flat" => MediaFormat::Flat,
            "tiled" => MediaFormat::Tiled,
            "grid" => MediaFormat::Grid,
            "hotspot" => MediaFormat::Hotspot,
            other => {
                warn!(format = other, "unknown media format, using flat");
                MediaFormat::Flat
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MediaFormat::Equirectangular => "equi",
            MediaFormat::Cube => "cube",
            MediaFormat::Flat => "flat",
            MediaFormat::Tiled => "tiled",
            MediaFormat::Grid => "grid",
            MediaFormat::Hotspot => "hotspot",
        }
    }

    /// True for formats that cover the full sphere.
    pub fn is_spherical(self) -> bool {
        matches!(
            self,
            MediaFormat::Equirectangular | MediaFormat::Cube | MediaFormat::Tiled
        )
    }
}

impl From<String> for MediaFormat {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<MediaFormat> for String {
    fn from(format: MediaFormat) -> Self {
        format.name().to_string()
    }
}

/// Where to find a scene's pixels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MediaDescriptor {
    pub format: MediaFormat,
    /// Path of a single-image source.
    pub url: Option<String>,
    /// Template for tiled sources, with `{face}`, `{level}`, `{x}` and `{y}` placeholders.
    pub tile_url_template: Option<String>,
    /// Low resolution image shown while the full media loads.
    pub preview_url: Option<String>,
    /// Number of pyramid levels for tiled media.
    pub levels: u32,
    /// Edge length of one tile in pixels.
    pub tile_size: u32,
}

impl MediaDescriptor {
    /// Single image source.
    pub fn image(format: MediaFormat, url: impl Into<String>) -> Self {
        Self {
            format,
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Tiled multi-resolution source.
    pub fn tiled(template: impl Into<String>, levels: u32, tile_size: u32) -> Self {
        Self {
            format: MediaFormat::Tiled,
            tile_url_template: Some(template.into()),
            levels: levels.max(1),
            tile_size,
            ..Default::default()
        }
    }

    pub fn with_preview(mut self, url: impl Into<String>) -> Self {
        self.preview_url = Some(url.into());
        self
    }

    /// Expand the tile template for one tile, or `None` if there is no template.
    pub fn tile_url(&self, face: CubeFace, level: u32, x: u32, y: u32) -> Option<String> {
        self.tile_url_template.as_ref().map(|t| {
            t.replace("{face}", face.letter())
                .replace("{level}", &level.to_string())
                .replace("{x}", &x.to_string())
                .replace("{y}", &y.to_string())
        })
    }

    /// Number of tiles along one face edge at `level`.
    pub fn tiles_per_edge(&self, level: u32) -> u32 {
        1 << level.min(15)
    }
}

/// One face of a cube map, in strip order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CubeFace {
    Right,
    Left,
    Up,
    Down,
    Front,
    Back,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::Right,
        CubeFace::Left,
        CubeFace::Up,
        CubeFace::Down,
        CubeFace::Front,
        CubeFace::Back,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    /// Single letter used in tile file names.
    pub fn letter(self) -> &'static str {
        match self {
            CubeFace::Right => "r",
            CubeFace::Left => "l",
            CubeFace::Up => "u",
            CubeFace::Down => "d",
            CubeFace::Front => "f",
            CubeFace::Back => "b",
        }
    }
}

/// Loading state of one media source.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum MediaSource<T> {
    #[default]
    Pending,
    Ready(T),
    Failed,
}

impl<T> MediaSource<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            MediaSource::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, MediaSource::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, MediaSource::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_source_states() {
        let pending: MediaSource<u32> = MediaSource::default();
        assert_eq!(pending.ready(), None);
        assert!(!pending.is_ready() && !pending.is_failed());
        assert_eq!(MediaSource::Ready(3).ready(), Some(&3));
        assert!(MediaSource::<u32>::Failed.is_failed());
    }

    #[test]
    fn unknown_format_falls_back_to_flat() {
        let desc: MediaDescriptor =
            serde_json::from_str(r#"{"format":"stereo-fisheye","url":"a.jpg"}"#).unwrap();
        assert_eq!(desc.format, MediaFormat::Flat);
        assert_eq!(desc.url.as_deref(), Some("a.jpg"));
    }

    #[test]
    fn missing_format_defaults_to_flat() {
        let desc: MediaDescriptor = serde_json::from_str(r#"{"url":"a.jpg"}"#).unwrap();
        assert_eq!(desc.format, MediaFormat::Flat);
    }

    #[test]
    fn shader_indices() {
        assert_eq!(MediaFormat::Equirectangular.shader_index(), 0);
        assert_eq!(MediaFormat::Cube.shader_index(), 1);
        assert_eq!(MediaFormat::Flat.shader_index(), 2);
    }

    #[test]
    fn tile_url_expands_placeholders() {
        let desc = MediaDescriptor::tiled("tiles/{face}/{level}/{y}_{x}.jpg", 3, 512);
        assert_eq!(
            desc.tile_url(CubeFace::Front, 2, 1, 3).as_deref(),
            Some("tiles/f/2/3_1.jpg")
        );
        assert_eq!(MediaDescriptor::default().tile_url(CubeFace::Up, 0, 0, 0), None);
    }

    #[test]
    fn format_names_round_trip() {
        for format in [
            MediaFormat::Equirectangular,
            MediaFormat::Cube,
            MediaFormat::Flat,
            MediaFormat::Tiled,
            MediaFormat::Grid,
            MediaFormat::Hotspot,
        ] {
            assert_eq!(MediaFormat::from_name(format.name()), format);
        }
    }
}
