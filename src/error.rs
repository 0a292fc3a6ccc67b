//! Error types for viewer setup.
//!
//! Only fatal setup failures are represented here. Per-frame problems
//! (missing textures, unknown passes, bad layouts) are logged and skipped
//! rather than surfaced as errors.

use thiserror::Error;

/// Failures that prevent the viewer from starting or loading an asset.
#[derive(Debug, Error)]
pub enum ViewerError {
    /// No GPU adapter matched the surface.
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    /// The logical device could not be created.
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    /// The window surface could not be created.
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    /// The surface reports no usable texture format.
    #[error("surface has no supported formats")]
    NoSurfaceFormat,
    /// Image decoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    /// Filesystem access failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration could not be read.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// The windowing system failed.
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    /// The OS refused to create a window.
    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
}

/// Failures while loading a [`ViewerConfig`](crate::config::ViewerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error while reading the file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
