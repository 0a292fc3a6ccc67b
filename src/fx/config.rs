//! Post-processing configuration as written in viewer config files.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Where in the frame a pass runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PassPosition {
    /// On each scene target, before `Render` passes.
    Background,
    /// On each scene target.
    Render,
    /// On the composited screen image.
    #[default]
    Global,
}

impl From<String> for PassPosition {
    fn from(name: String) -> Self {
        match name.as_str() {
            "background" => PassPosition::Background,
            "render" => PassPosition::Render,
            "global" => PassPosition::Global,
            other => {
                warn!(position = other, "unknown pass position, using global");
                PassPosition::Global
            }
        }
    }
}

impl From<PassPosition> for String {
    fn from(position: PassPosition) -> Self {
        match position {
            PassPosition::Background => "background",
            PassPosition::Render => "render",
            PassPosition::Global => "global",
        }
        .to_string()
    }
}

/// One pass entry: `{uid, type, args?, params?, position?, enabled?}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassConfig {
    pub uid: String,
    /// `"<Name>Shader"` or `"<Name>Pass"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub args: Vec<Value>,
    pub params: serde_json::Map<String, Value>,
    pub position: PassPosition,
    pub enabled: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            uid: String::new(),
            kind: String::new(),
            args: Vec::new(),
            params: serde_json::Map::new(),
            position: PassPosition::default(),
            enabled: true,
        }
    }
}

impl PassConfig {
    pub fn new(uid: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, name: &str, value: Value) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn at(mut self, position: PassPosition) -> Self {
        self.position = position;
        self
    }

    /// First argument as a string, for passes that take a shader or texture name.
    pub fn name_arg(&self) -> Option<&str> {
        self.args.first().and_then(Value::as_str)
    }

    /// Numeric parameter, if present and a number.
    pub fn number(&self, name: &str) -> Option<f32> {
        self.params.get(name).and_then(Value::as_f64).map(|v| v as f32)
    }
}

/// A shader uniform value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Bool(bool),
    Color([f32; 3]),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
}

impl UniformValue {
    /// Coerce a config value. Returns `None` for shapes no uniform can take.
    ///
    /// Numbers become floats, booleans stay booleans, `"#rrggbb"` strings and
    /// `{type: "Color", args}` become colors, `{type: "Vector2"|"Vector3", args}`
    /// and plain arrays of two or three numbers become vectors.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(|v| UniformValue::Float(v as f32)),
            Value::Bool(b) => Some(UniformValue::Bool(*b)),
            Value::String(s) => parse_hex_color(s).map(UniformValue::Color),
            Value::Array(items) => match numbers(items)?.as_slice() {
                [x, y] => Some(UniformValue::Vec2([*x, *y])),
                [x, y, z] => Some(UniformValue::Vec3([*x, *y, *z])),
                _ => None,
            },
            Value::Object(map) => {
                let ty = map.get("type").and_then(Value::as_str)?;
                let args = map
                    .get("args")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                typed(ty, &args)
            }
            Value::Null => None,
        }
    }

    /// Packed into one vec4 slot of the pass uniforms.
    pub fn to_slot(self) -> [f32; 4] {
        match self {
            UniformValue::Float(v) => [v, 0.0, 0.0, 0.0],
            UniformValue::Bool(b) => [if b { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
            UniformValue::Color([r, g, b]) | UniformValue::Vec3([r, g, b]) => [r, g, b, 0.0],
            UniformValue::Vec2([x, y]) => [x, y, 0.0, 0.0],
        }
    }

    /// Same kind of value, so it can replace a declared default.
    pub fn same_kind(&self, other: &UniformValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
            || matches!(
                (self, other),
                (UniformValue::Color(_), UniformValue::Vec3(_))
                    | (UniformValue::Vec3(_), UniformValue::Color(_))
            )
    }
}

fn typed(ty: &str, args: &[Value]) -> Option<UniformValue> {
    match ty {
        "Color" => match args {
            [Value::String(hex)] => parse_hex_color(hex).map(UniformValue::Color),
            [Value::Number(n)] => {
                let rgb = n.as_u64()? as u32;
                Some(UniformValue::Color(unpack_rgb(rgb)))
            }
            _ => match numbers(args)?.as_slice() {
                [r, g, b] => Some(UniformValue::Color([*r, *g, *b])),
                _ => None,
            },
        },
        "Vector2" => match numbers(args)?.as_slice() {
            [x, y] => Some(UniformValue::Vec2([*x, *y])),
            _ => None,
        },
        "Vector3" => match numbers(args)?.as_slice() {
            [x, y, z] => Some(UniformValue::Vec3([*x, *y, *z])),
            _ => None,
        },
        other => {
            warn!(ty = other, "unknown uniform type");
            None
        }
    }
}

fn numbers(items: &[Value]) -> Option<Vec<f32>> {
    items
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

fn unpack_rgb(rgb: u32) -> [f32; 3] {
    [
        ((rgb >> 16) & 0xff) as f32 / 255.0,
        ((rgb >> 8) & 0xff) as f32 / 255.0,
        (rgb & 0xff) as f32 / 255.0,
    ]
}

/// `#rrggbb` or `0xrrggbb` into linear-free 0..1 components.
pub fn parse_hex_color(text: &str) -> Option<[f32; 3]> {
    let digits = text
        .strip_prefix('#')
        .or_else(|| text.strip_prefix("0x"))?;
    if digits.len() != 6 {
        return None;
    }
    u32::from_str_radix(digits, 16).ok().map(unpack_rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_plain_values() {
        assert_eq!(
            UniformValue::from_json(&json!(0.5)),
            Some(UniformValue::Float(0.5))
        );
        assert_eq!(
            UniformValue::from_json(&json!(true)),
            Some(UniformValue::Bool(true))
        );
        assert_eq!(
            UniformValue::from_json(&json!([1.0, 2.0])),
            Some(UniformValue::Vec2([1.0, 2.0]))
        );
        assert_eq!(UniformValue::from_json(&json!(null)), None);
        assert_eq!(UniformValue::from_json(&json!("nope")), None);
    }

    #[test]
    fn coerces_typed_descriptors() {
        assert_eq!(
            UniformValue::from_json(&json!({"type": "Color", "args": [1.0, 0.5, 0.0]})),
            Some(UniformValue::Color([1.0, 0.5, 0.0]))
        );
        assert_eq!(
            UniformValue::from_json(&json!({"type": "Color", "args": ["#ff0000"]})),
            Some(UniformValue::Color([1.0, 0.0, 0.0]))
        );
        assert_eq!(
            UniformValue::from_json(&json!({"type": "Color", "args": [0x00ff00]})),
            Some(UniformValue::Color([0.0, 1.0, 0.0]))
        );
        assert_eq!(
            UniformValue::from_json(&json!({"type": "Vector3", "args": [1, 2, 3]})),
            Some(UniformValue::Vec3([1.0, 2.0, 3.0]))
        );
        assert_eq!(
            UniformValue::from_json(&json!({"type": "Vector2", "args": [1]})),
            None
        );
        assert_eq!(
            UniformValue::from_json(&json!({"type": "Matrix4", "args": []})),
            None
        );
    }

    #[test]
    fn pass_config_defaults() {
        let config: PassConfig =
            serde_json::from_value(json!({"uid": "v", "type": "VignetteShader"})).unwrap();
        assert!(config.enabled);
        assert_eq!(config.position, PassPosition::Global);
        assert!(config.params.is_empty());

        let config: PassConfig = serde_json::from_value(json!({
            "type": "ShaderPass",
            "args": ["SepiaShader"],
            "params": {"amount": 0.5},
            "position": "render"
        }))
        .unwrap();
        assert_eq!(config.name_arg(), Some("SepiaShader"));
        assert_eq!(config.number("amount"), Some(0.5));
        assert_eq!(config.position, PassPosition::Render);
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#ffffff"), Some([1.0, 1.0, 1.0]));
        assert_eq!(parse_hex_color("0x000000"), Some([0.0, 0.0, 0.0]));
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("white"), None);
    }
}
