//! Off-screen render targets.

use crate::gpu::GpuContext;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// An off-screen color target that can be rendered to and sampled from.
///
/// Created with `RENDER_ATTACHMENT | TEXTURE_BINDING | COPY_SRC` usage, so
/// it can feed the screen compositor, the effect chain and pixel readback.
/// The format is the surface format unless given explicitly.
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    /// Present on scene targets, which depth test hotspots against the background.
    pub depth_view: Option<wgpu::TextureView>,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// Color-only target matching the surface size.
    pub fn new(gpu: &GpuContext, label: &str) -> Self {
        Self::with_size(gpu, label, gpu.width(), gpu.height(), false)
    }

    /// Color plus `Depth32Float` target matching the surface size.
    pub fn with_depth(gpu: &GpuContext, label: &str) -> Self {
        Self::with_size(gpu, label, gpu.width(), gpu.height(), true)
    }

    pub fn with_size(gpu: &GpuContext, label: &str, width: u32, height: u32, depth: bool) -> Self {
        Self::with_format(gpu, label, width, height, gpu.format(), depth)
    }

    pub fn with_format(
        gpu: &GpuContext,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        depth: bool,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_view = depth.then(|| {
            gpu.device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("{label} Depth")),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: DEPTH_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        });

        Self {
            texture,
            view,
            depth_view,
            format,
            width: size.width,
            height: size.height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Recreate the target if the surface size changed. Returns true if it did.
    pub fn ensure_size(&mut self, gpu: &GpuContext, label: &str) -> bool {
        if self.width != gpu.width() || self.height != gpu.height() {
            let depth = self.depth_view.is_some();
            *self = Self::with_format(gpu, label, gpu.width(), gpu.height(), self.format, depth);
            true
        } else {
            false
        }
    }
}
