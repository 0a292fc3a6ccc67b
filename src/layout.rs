//! Viewport layouts: how the output is split between cameras.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Rectangle in percent (0-100) of the render target, origin top-left.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewportRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewportRect {
    pub const FULL: ViewportRect = ViewportRect::new(0.0, 0.0, 100.0, 100.0);

    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Pixel rectangle inside a `target_width` x `target_height` target.
    ///
    /// Clamped to the target and never smaller than one pixel.
    pub fn to_pixels(&self, target_width: u32, target_height: u32) -> PixelRect {
        let tw = target_width.max(1);
        let th = target_height.max(1);
        let px = |pct: f32, total: u32| ((pct.clamp(0.0, 100.0) / 100.0) * total as f32).round() as u32;

        let x = px(self.x, tw).min(tw - 1);
        let y = px(self.y, th).min(th - 1);
        let width = px(self.width, tw).clamp(1, tw - x);
        let height = px(self.height, th).clamp(1, th - y);
        PixelRect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn aspect_in(&self, target_width: u32, target_height: u32) -> f32 {
        self.to_pixels(target_width, target_height).aspect()
    }
}

impl Default for ViewportRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// Integer pixel rectangle, origin top-left.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x as f32
            && py >= self.y as f32
            && px < (self.x + self.width) as f32
            && py < (self.y + self.height) as f32
    }
}

/// One entry of a layout config.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub rectangle: ViewportRect,
    pub vr: bool,
}

/// Which eye a viewport renders for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eye {
    Mono,
    Left,
    Right,
}

impl Eye {
    /// Sideways camera offset for this eye.
    pub fn offset(self, eye_separation: f32) -> f32 {
        match self {
            Eye::Mono => 0.0,
            Eye::Left => -eye_separation * 0.5,
            Eye::Right => eye_separation * 0.5,
        }
    }
}

/// Layout as written in config: a preset name or explicit viewports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayoutSpec {
    Preset(String),
    Custom(Vec<ViewportConfig>),
}

impl Default for LayoutSpec {
    fn default() -> Self {
        LayoutSpec::Preset("single".to_string())
    }
}

/// Named, immutable list of viewports.
#[derive(Clone, Debug, PartialEq)]
pub struct Layout {
    pub name: String,
    viewports: Vec<ViewportConfig>,
}

impl Layout {
    /// One viewport covering the whole target.
    pub fn single() -> Self {
        Self {
            name: "single".to_string(),
            viewports: vec![ViewportConfig::default()],
        }
    }

    /// Side-by-side stereo pair.
    pub fn vr() -> Self {
        Self {
            name: "vr".to_string(),
            viewports: vec![
                ViewportConfig {
                    rectangle: ViewportRect::new(0.0, 0.0, 50.0, 100.0),
                    vr: true,
                },
                ViewportConfig {
                    rectangle: ViewportRect::new(50.0, 0.0, 50.0, 100.0),
                    vr: true,
                },
            ],
        }
    }

    /// Four quarters.
    pub fn grid() -> Self {
        let cell = |x, y| ViewportConfig {
            rectangle: ViewportRect::new(x, y, 50.0, 50.0),
            vr: false,
        };
        Self {
            name: "grid".to_string(),
            viewports: vec![
                cell(0.0, 0.0),
                cell(50.0, 0.0),
                cell(0.0, 50.0),
                cell(50.0, 50.0),
            ],
        }
    }

    /// Look up a preset by name, falling back to [`Layout::single`].
    pub fn preset(name: &str) -> Self {
        match name {
            "single" | "default" => Self::single(),
            "vr" | "stereo" => Self::vr(),
            "grid" | "quad" => Self::grid(),
            other => {
                warn!(layout = other, "unknown layout preset, using single");
                Self::single()
            }
        }
    }

    /// Build a custom layout. An empty list falls back to [`Layout::single`].
    pub fn from_configs(name: impl Into<String>, configs: Vec<ViewportConfig>) -> Self {
        let name = name.into();
        if configs.is_empty() {
            warn!(layout = %name, "layout has no viewports, using single");
            return Self::single();
        }
        Self {
            name,
            viewports: configs,
        }
    }

    pub fn from_spec(spec: &LayoutSpec) -> Self {
        match spec {
            LayoutSpec::Preset(name) => Self::preset(name),
            LayoutSpec::Custom(configs) => Self::from_configs("custom", configs.clone()),
        }
    }

    pub fn viewports(&self) -> &[ViewportConfig] {
        &self.viewports
    }

    pub fn len(&self) -> usize {
        self.viewports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewports.is_empty()
    }

    /// Eye assignment per viewport: VR viewports alternate left then right.
    pub fn eyes(&self) -> Vec<Eye> {
        let mut vr_index = 0;
        self.viewports
            .iter()
            .map(|v| {
                if v.vr {
                    let eye = if vr_index % 2 == 0 { Eye::Left } else { Eye::Right };
                    vr_index += 1;
                    eye
                } else {
                    Eye::Mono
                }
            })
            .collect()
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_rect_covers_target() {
        let px = ViewportRect::FULL.to_pixels(1280, 720);
        assert_eq!(
            px,
            PixelRect {
                x: 0,
                y: 0,
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn vr_halves() {
        let layout = Layout::vr();
        let right = layout.viewports()[1].rectangle.to_pixels(1000, 500);
        assert_eq!((right.x, right.width, right.height), (500, 500, 500));
        assert_eq!(layout.eyes(), vec![Eye::Left, Eye::Right]);
    }

    #[test]
    fn grid_has_four_quarters() {
        let layout = Layout::grid();
        assert_eq!(layout.len(), 4);
        let last = layout.viewports()[3].rectangle.to_pixels(800, 600);
        assert_eq!((last.x, last.y, last.width, last.height), (400, 300, 400, 300));
        assert!(layout.eyes().iter().all(|e| *e == Eye::Mono));
    }

    #[test]
    fn empty_config_falls_back_to_single() {
        let layout = Layout::from_configs("broken", Vec::new());
        assert_eq!(layout, Layout::single());
    }

    #[test]
    fn out_of_range_rect_is_clamped() {
        let px = ViewportRect::new(90.0, -10.0, 50.0, 0.0).to_pixels(100, 100);
        assert_eq!(px.x, 90);
        assert_eq!(px.y, 0);
        assert_eq!(px.width, 10);
        assert_eq!(px.height, 1);
    }

    #[test]
    fn parses_preset_and_custom_specs() {
        let preset: LayoutSpec = serde_json::from_str("\"vr\"").unwrap();
        assert_eq!(Layout::from_spec(&preset).len(), 2);

        let custom: LayoutSpec = serde_json::from_str(
            r#"[{"rectangle":{"x":0,"y":0,"width":100,"height":50}},
                {"rectangle":{"x":0,"y":50,"width":100,"height":50},"vr":false}]"#,
        )
        .unwrap();
        let layout = Layout::from_spec(&custom);
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.name, "custom");

        let empty: LayoutSpec = serde_json::from_str("[]").unwrap();
        assert_eq!(Layout::from_spec(&empty), Layout::single());
    }
}
