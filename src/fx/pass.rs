//! One stage of an effect chain.

use std::rc::Rc;

use super::catalog::{
    ADDITION_SHADER, COPY_SHADER, MAX_UNIFORMS, PassKind, ResolvedPass, ShaderDef, TEXTURE_SHADER,
};
use super::config::PassPosition;
use crate::texture::Texture;

/// Uniform block shared by every effect shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FxUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub opacity: f32,
    pub params: [[f32; 4]; MAX_UNIFORMS],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassState {
    pub enabled: bool,
    /// Render the copy shader in place of the pass's own.
    pub bypass: bool,
    /// Seconds accumulated by [`FxPass::advance`].
    pub time: f32,
}

impl Default for PassState {
    fn default() -> Self {
        Self {
            enabled: true,
            bypass: false,
            time: 0.0,
        }
    }
}

/// Which image a pass reads as `t_input`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassInput {
    /// Output of the previous pass.
    Previous,
    /// The image the chain started from.
    Original,
}

pub struct FxPass {
    pub uid: String,
    pub position: PassPosition,
    pub kind: PassKind,
    pub state: PassState,
    pub opacity: f32,
    texture: Option<Rc<Texture>>,
}

impl FxPass {
    pub fn new(uid: impl Into<String>, position: PassPosition, resolved: ResolvedPass) -> Self {
        Self {
            uid: uid.into(),
            position,
            kind: resolved.kind,
            state: PassState::default(),
            opacity: resolved.opacity,
            texture: None,
        }
    }

    pub fn advance(&mut self, dt: f32) {
        self.state.time += dt;
    }

    /// Shader to run this frame.
    pub fn program(&self) -> &ShaderDef {
        if self.state.bypass {
            return &COPY_SHADER;
        }
        match &self.kind {
            PassKind::Shader { def, .. } => def,
            PassKind::Render => &COPY_SHADER,
            PassKind::Texture { .. } => &TEXTURE_SHADER,
            PassKind::Addition { .. } => &ADDITION_SHADER,
        }
    }

    pub fn input(&self) -> PassInput {
        match self.kind {
            PassKind::Render => PassInput::Original,
            _ => PassInput::Previous,
        }
    }

    /// Uniform block for a target of `width` by `height`.
    pub fn uniforms(&self, width: u32, height: u32) -> FxUniforms {
        let mut uniforms = FxUniforms {
            resolution: [width as f32, height as f32],
            time: 0.0,
            opacity: 1.0,
            params: [[0.0; 4]; MAX_UNIFORMS],
        };
        if self.state.bypass {
            return uniforms;
        }
        match &self.kind {
            PassKind::Shader { def, slots } => {
                uniforms.params = *slots;
                uniforms.opacity = self.opacity;
                if def.uses_time {
                    uniforms.time = self.state.time;
                }
            }
            PassKind::Render => {}
            PassKind::Texture { .. } | PassKind::Addition { .. } => {
                uniforms.opacity = self.opacity;
            }
        }
        uniforms
    }

    pub fn texture(&self) -> Option<&Rc<Texture>> {
        self.texture.as_ref()
    }

    pub fn set_texture(&mut self, texture: Rc<Texture>) {
        self.texture = Some(texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx::catalog::{FILM_SHADER, ShaderCatalog, VIGNETTE_SHADER};
    use crate::fx::config::PassConfig;

    fn pass(kind: &str) -> FxPass {
        let resolved = ShaderCatalog::builtin()
            .resolve(&PassConfig::new(kind, kind))
            .unwrap();
        FxPass::new(kind, PassPosition::Global, resolved)
    }

    #[test]
    fn time_is_written_only_when_declared() {
        let mut film = pass("FilmShader");
        let mut vignette = pass("VignetteShader");
        film.advance(0.5);
        film.advance(0.25);
        vignette.advance(0.5);
        assert_eq!(film.state.time, 0.75);
        assert_eq!(film.uniforms(10, 10).time, 0.75);
        assert_eq!(vignette.uniforms(10, 10).time, 0.0);
        assert_eq!(film.program(), &FILM_SHADER);
    }

    #[test]
    fn bypass_runs_copy() {
        let mut vignette = pass("VignetteShader");
        assert_eq!(vignette.program(), &VIGNETTE_SHADER);
        vignette.state.bypass = true;
        assert_eq!(vignette.program().name, "CopyShader");
        let uniforms = vignette.uniforms(640, 480);
        assert_eq!(uniforms.resolution, [640.0, 480.0]);
        assert_eq!(uniforms.opacity, 1.0);
        assert_eq!(uniforms.params, [[0.0; 4]; MAX_UNIFORMS]);
    }

    #[test]
    fn render_pass_reads_original() {
        let render = pass("RenderPass");
        assert_eq!(render.input(), PassInput::Original);
        assert_eq!(render.program().name, "CopyShader");
        assert_eq!(pass("SepiaShader").input(), PassInput::Previous);
    }

    #[test]
    fn uniform_block_is_aligned() {
        assert_eq!(std::mem::size_of::<FxUniforms>(), 80);
    }
}
