//! Scene descriptors: one panorama plus its hotspots.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::keyframe::{CameraKeyframe, Keyframe};
use crate::layout::LayoutSpec;
use crate::media::{MediaDescriptor, MediaFormat};
use crate::view::ViewType;

/// Identifier of a scene within one viewer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(pub String);

impl SceneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How the background of a scene is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BackgroundType {
    /// Full-screen quad, projection done per pixel in the shader.
    Shader,
    /// Real geometry (sphere, plane or cube) drawn with a perspective camera.
    Mesh,
    /// Multi-resolution cube tiles.
    Pyramid,
}

impl BackgroundType {
    /// Default background for a media format.
    pub fn for_format(format: MediaFormat) -> Self {
        match format {
            MediaFormat::Tiled => BackgroundType::Pyramid,
            MediaFormat::Flat | MediaFormat::Grid | MediaFormat::Hotspot => BackgroundType::Mesh,
            MediaFormat::Equirectangular | MediaFormat::Cube => BackgroundType::Shader,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BackgroundType::Shader => "shader",
            BackgroundType::Mesh => "mesh",
            BackgroundType::Pyramid => "pyramid",
        }
    }
}

impl From<String> for BackgroundType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "shader" => BackgroundType::Shader,
            "mesh" | "sphere" | "plane" => BackgroundType::Mesh,
            "pyramid" | "tiled" => BackgroundType::Pyramid,
            other => {
                warn!(background = other, "unknown background type, using shader");
                BackgroundType::Shader
            }
        }
    }
}

impl From<BackgroundType> for String {
    fn from(ty: BackgroundType) -> Self {
        ty.name().to_string()
    }
}

/// Initial camera orientation for a scene, in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraStart {
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
}

impl Default for CameraStart {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            fov: 75.0,
        }
    }
}

/// Keyframe data for an animated hotspot, angles in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotspotPose {
    pub yaw: f32,
    pub pitch: f32,
}

/// An interactive or decorative marker placed in the panorama.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HotspotDescriptor {
    pub id: String,
    /// Horizontal angle in degrees, 0 is straight ahead, positive to the right.
    pub yaw: f32,
    /// Vertical angle in degrees, positive is up.
    pub pitch: f32,
    /// Distance from the viewer in world units.
    pub distance: f32,
    /// Edge length of the marker in world units.
    pub size: f32,
    pub interactive: bool,
    pub visible: bool,
    /// Drawn in screen space on top of everything else.
    pub hud: bool,
    pub color: [f32; 4],
    /// Scene to open when the hotspot is clicked.
    pub target: Option<SceneId>,
    /// Optional image shown on the marker.
    pub media: Option<MediaDescriptor>,
    pub track: Vec<Keyframe<HotspotPose>>,
}

impl Default for HotspotDescriptor {
    fn default() -> Self {
        Self {
            id: String::new(),
            yaw: 0.0,
            pitch: 0.0,
            distance: 10.0,
            size: 1.0,
            interactive: true,
            visible: true,
            hud: false,
            color: [1.0, 1.0, 1.0, 1.0],
            target: None,
            media: None,
            track: Vec::new(),
        }
    }
}

/// Everything needed to render one scene.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneDescriptor {
    pub id: SceneId,
    pub media: MediaDescriptor,
    /// Overrides the format's default background.
    pub background: Option<BackgroundType>,
    pub hotspots: Vec<HotspotDescriptor>,
    pub camera: CameraStart,
    pub view: Option<ViewType>,
    pub layout: Option<LayoutSpec>,
    pub camera_track: Vec<Keyframe<CameraKeyframe>>,
}

impl SceneDescriptor {
    pub fn new(id: impl Into<String>, media: MediaDescriptor) -> Self {
        Self {
            id: SceneId::new(id),
            media,
            ..Default::default()
        }
    }

    pub fn with_hotspot(mut self, hotspot: HotspotDescriptor) -> Self {
        self.hotspots.push(hotspot);
        self
    }

    /// The background actually used, after applying the format default.
    pub fn background_type(&self) -> BackgroundType {
        self.background
            .unwrap_or_else(|| BackgroundType::for_format(self.media.format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_defaults_follow_format() {
        let equi = SceneDescriptor::new(
            "a",
            MediaDescriptor::image(MediaFormat::Equirectangular, "a.jpg"),
        );
        assert_eq!(equi.background_type(), BackgroundType::Shader);

        let flat = SceneDescriptor::new("b", MediaDescriptor::image(MediaFormat::Flat, "b.jpg"));
        assert_eq!(flat.background_type(), BackgroundType::Mesh);

        let tiled = SceneDescriptor::new("c", MediaDescriptor::tiled("{face}", 2, 256));
        assert_eq!(tiled.background_type(), BackgroundType::Pyramid);
    }

    #[test]
    fn explicit_background_wins() {
        let mut scene = SceneDescriptor::new(
            "a",
            MediaDescriptor::image(MediaFormat::Equirectangular, "a.jpg"),
        );
        scene.background = Some(BackgroundType::Mesh);
        assert_eq!(scene.background_type(), BackgroundType::Mesh);
    }

    #[test]
    fn parses_scene_json() {
        let json = r#"{
            "id": "lobby",
            "media": { "format": "equi", "url": "lobby.jpg" },
            "hotspots": [ { "id": "door", "yaw": 45, "target": "hall" } ],
            "cameraTrack": [ { "time": 0.0, "yaw": 0, "pitch": 0, "fov": 70 } ]
        }"#;
        let scene: SceneDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(scene.id, SceneId::new("lobby"));
        assert_eq!(scene.media.format, MediaFormat::Equirectangular);
        assert_eq!(scene.hotspots[0].yaw, 45.0);
        assert!(scene.hotspots[0].interactive);
        assert_eq!(scene.hotspots[0].target, Some(SceneId::new("hall")));
        assert_eq!(scene.camera_track.len(), 1);
    }
}
