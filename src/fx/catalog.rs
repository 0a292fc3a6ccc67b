//! Built-in effect shaders and resolution of pass configs into passes.

use tracing::warn;

use super::config::{PassConfig, UniformValue};

/// Uniform slots available to a shader, each one `vec4f`.
pub const MAX_UNIFORMS: usize = 4;

/// A named uniform with its default.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UniformDecl {
    pub name: &'static str,
    pub default: UniformValue,
}

const fn float(name: &'static str, value: f32) -> UniformDecl {
    UniformDecl {
        name,
        default: UniformValue::Float(value),
    }
}

const fn vec3(name: &'static str, value: [f32; 3]) -> UniformDecl {
    UniformDecl {
        name,
        default: UniformValue::Vec3(value),
    }
}

/// An effect shader. Uniform `i` lives in `u.params[i]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShaderDef {
    pub name: &'static str,
    pub source: &'static str,
    pub uniforms: &'static [UniformDecl],
    /// Reads `u.time`, so the pass clock is written each frame.
    pub uses_time: bool,
}

impl ShaderDef {
    pub fn slot(&self, uniform: &str) -> Option<usize> {
        self.uniforms.iter().position(|decl| decl.name == uniform)
    }

    /// Declared defaults packed into uniform slots.
    pub fn default_slots(&self) -> [[f32; 4]; MAX_UNIFORMS] {
        let mut slots = [[0.0; 4]; MAX_UNIFORMS];
        for (slot, decl) in slots.iter_mut().zip(self.uniforms) {
            *slot = decl.default.to_slot();
        }
        slots
    }
}

pub const COPY_SHADER: ShaderDef = ShaderDef {
    name: "CopyShader",
    source: include_str!("../shaders/fx/copy.wgsl"),
    uniforms: &[],
    uses_time: false,
};

pub const VIGNETTE_SHADER: ShaderDef = ShaderDef {
    name: "VignetteShader",
    source: include_str!("../shaders/fx/vignette.wgsl"),
    uniforms: &[float("offset", 1.0), float("darkness", 1.0)],
    uses_time: false,
};

pub const FILM_SHADER: ShaderDef = ShaderDef {
    name: "FilmShader",
    source: include_str!("../shaders/fx/film.wgsl"),
    uniforms: &[
        float("nIntensity", 0.5),
        float("sIntensity", 0.05),
        float("sCount", 4096.0),
        UniformDecl {
            name: "grayscale",
            default: UniformValue::Bool(false),
        },
    ],
    uses_time: true,
};

pub const COLOR_CORRECTION_SHADER: ShaderDef = ShaderDef {
    name: "ColorCorrectionShader",
    source: include_str!("../shaders/fx/color_correction.wgsl"),
    uniforms: &[
        vec3("powRGB", [2.0, 2.0, 2.0]),
        vec3("mulRGB", [1.0, 1.0, 1.0]),
        vec3("addRGB", [0.0, 0.0, 0.0]),
    ],
    uses_time: false,
};

pub const SEPIA_SHADER: ShaderDef = ShaderDef {
    name: "SepiaShader",
    source: include_str!("../shaders/fx/sepia.wgsl"),
    uniforms: &[float("amount", 1.0)],
    uses_time: false,
};

pub const RGB_SHIFT_SHADER: ShaderDef = ShaderDef {
    name: "RGBShiftShader",
    source: include_str!("../shaders/fx/rgb_shift.wgsl"),
    uniforms: &[float("amount", 0.005), float("angle", 0.0)],
    uses_time: false,
};

pub(crate) const TEXTURE_SHADER: ShaderDef = ShaderDef {
    name: "TexturePass",
    source: include_str!("../shaders/fx/texture.wgsl"),
    uniforms: &[],
    uses_time: false,
};

pub(crate) const ADDITION_SHADER: ShaderDef = ShaderDef {
    name: "AdditionPass",
    source: include_str!("../shaders/fx/addition.wgsl"),
    uniforms: &[],
    uses_time: false,
};

/// What a resolved pass does.
#[derive(Clone, Debug, PartialEq)]
pub enum PassKind {
    /// Full-screen shader over the previous pass output.
    Shader {
        def: ShaderDef,
        slots: [[f32; 4]; MAX_UNIFORMS],
    },
    /// Re-emits the composer's input image.
    Render,
    /// Overlays a registered image.
    Texture { id: String },
    /// Adds a registered image.
    Addition { id: String },
}

impl PassKind {
    /// Registered image this pass samples, if any.
    pub fn texture_id(&self) -> Option<&str> {
        match self {
            PassKind::Texture { id } | PassKind::Addition { id } => Some(id),
            _ => None,
        }
    }
}

/// A pass config turned into something renderable.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPass {
    pub kind: PassKind,
    pub opacity: f32,
}

/// Shaders by name.
#[derive(Clone, Debug)]
pub struct ShaderCatalog {
    shaders: Vec<ShaderDef>,
}

impl Default for ShaderCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ShaderCatalog {
    pub fn builtin() -> Self {
        Self {
            shaders: vec![
                COPY_SHADER,
                VIGNETTE_SHADER,
                FILM_SHADER,
                COLOR_CORRECTION_SHADER,
                SEPIA_SHADER,
                RGB_SHIFT_SHADER,
            ],
        }
    }

    /// Add or replace a shader.
    pub fn register(&mut self, def: ShaderDef) {
        self.shaders.retain(|existing| existing.name != def.name);
        self.shaders.push(def);
    }

    pub fn get(&self, name: &str) -> Option<&ShaderDef> {
        self.shaders.iter().find(|def| def.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.shaders.iter().map(|def| def.name)
    }

    /// Turn a config into a pass. Unknown types and unresolvable shaders
    /// log a warning and yield `None`.
    pub fn resolve(&self, config: &PassConfig) -> Option<ResolvedPass> {
        let opacity = config.number("opacity").unwrap_or(1.0);
        let kind = match config.kind.as_str() {
            "ShaderPass" => {
                let Some(name) = config.name_arg() else {
                    warn!(uid = %config.uid, "ShaderPass without a shader name");
                    return None;
                };
                self.shader_pass(config, name)?
            }
            "RenderPass" => PassKind::Render,
            "TexturePass" => PassKind::Texture {
                id: texture_arg(config)?,
            },
            "AdditionPass" => PassKind::Addition {
                id: texture_arg(config)?,
            },
            name if name.ends_with("Shader") => self.shader_pass(config, name)?,
            other => {
                warn!(uid = %config.uid, kind = other, "unknown pass type");
                return None;
            }
        };
        Some(ResolvedPass { kind, opacity })
    }

    fn shader_pass(&self, config: &PassConfig, name: &str) -> Option<PassKind> {
        let Some(def) = self.get(name) else {
            warn!(uid = %config.uid, shader = name, "unknown shader");
            return None;
        };
        let mut slots = def.default_slots();
        for (param, value) in &config.params {
            if param == "opacity" {
                continue;
            }
            let Some(slot) = def.slot(param) else {
                warn!(shader = def.name, param = %param, "shader has no such uniform");
                continue;
            };
            match UniformValue::from_json(value) {
                Some(coerced) if coerced.same_kind(&def.uniforms[slot].default) => {
                    slots[slot] = coerced.to_slot();
                }
                _ => warn!(shader = def.name, param = %param, %value, "uniform value ignored"),
            }
        }
        Some(PassKind::Shader { def: *def, slots })
    }
}

fn texture_arg(config: &PassConfig) -> Option<String> {
    match config.name_arg() {
        Some(id) => Some(id.to_string()),
        None => {
            warn!(uid = %config.uid, kind = %config.kind, "pass needs a texture id");
            None
        }
    }
}
