//! Post-processing: effect passes configured from JSON and run by composers.
//!
//! Passes live in the [`FxManager`] and are shared with every
//! [`EffectComposer`] that runs them. Scene composers run `background` and
//! `render` passes on each scene image; the screen composer runs `global`
//! passes on the composited frame.

pub mod catalog;
pub mod composer;
pub mod config;
pub mod manager;
pub mod pass;

pub use catalog::{PassKind, ShaderCatalog, ShaderDef, UniformDecl};
pub use composer::EffectComposer;
pub use config::{PassConfig, PassPosition, UniformValue};
pub use manager::{FxManager, SharedPass};
pub use pass::{FxPass, FxUniforms, PassState};
