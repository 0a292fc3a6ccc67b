//! `panoview [config.json | image...]`
//!
//! With no arguments a two-scene demo built from procedural panoramas is shown.
//! Drag to look, scroll to zoom, click a marker to follow it. Arrow keys step
//! through scenes, `V` cycles views, `1`-`3` pick a layout and `B` bypasses
//! effects.

use std::path::Path;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use panoview::{
    HotspotDescriptor, MediaDescriptor, MediaFormat, PassConfig, SceneDescriptor, SceneId,
    ViewerConfig, ViewerError,
};

fn demo_config() -> ViewerConfig {
    let door = |id: &str, yaw: f32, target: &str| HotspotDescriptor {
        id: id.to_string(),
        yaw,
        color: [1.0, 0.8, 0.2, 1.0],
        target: Some(SceneId::new(target)),
        ..Default::default()
    };
    ViewerConfig::new()
        .title("panoview demo")
        .scene(
            SceneDescriptor::new(
                "grid",
                MediaDescriptor::image(MediaFormat::Equirectangular, "builtin:grid"),
            )
            .with_hotspot(door("to-sky", 30.0, "sky")),
        )
        .scene(
            SceneDescriptor::new(
                "sky",
                MediaDescriptor::image(MediaFormat::Equirectangular, "builtin:sky"),
            )
            .with_hotspot(door("to-grid", -30.0, "grid")),
        )
        .fx(PassConfig::new("vignette", "VignetteShader"))
}

fn load_config(args: &[String]) -> Result<ViewerConfig, ViewerError> {
    match args {
        [] => Ok(demo_config()),
        [path] if Path::new(path).extension().is_some_and(|ext| ext == "json") => {
            Ok(ViewerConfig::from_file(path)?)
        }
        images => Ok(ViewerConfig::from_images(images)),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("panoview=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = load_config(&args).and_then(panoview::run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "panoview exited with an error");
            ExitCode::FAILURE
        }
    }
}
