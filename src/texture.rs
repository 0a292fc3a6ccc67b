use crate::gpu::GpuContext;

/// A GPU texture that can be bound to shaders.
#[derive(Debug)]
pub struct Texture {
    #[allow(dead_code)]
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    /// Create a texture from raw RGBA data.
    pub fn from_rgba(gpu: &GpuContext, data: &[u8], width: u32, height: u32, label: &str) -> Self {
        Self::from_rgba_with(
            gpu,
            data,
            width,
            height,
            label,
            wgpu::AddressMode::ClampToEdge,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        )
    }

    /// Create a texture that wraps horizontally, for equirectangular media
    /// whose left and right edges meet.
    pub fn from_rgba_wrapping(
        gpu: &GpuContext,
        data: &[u8],
        width: u32,
        height: u32,
        label: &str,
    ) -> Self {
        Self::from_rgba_with(
            gpu,
            data,
            width,
            height,
            label,
            wgpu::AddressMode::Repeat,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        )
    }

    fn from_rgba_with(
        gpu: &GpuContext,
        data: &[u8],
        width: u32,
        height: u32,
        label: &str,
        address_mode_u: wgpu::AddressMode,
        format: wgpu::TextureFormat,
    ) -> Self {
        use wgpu::util::DeviceExt;

        let texture = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            data,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        // Panoramas are magnified heavily, so filter linearly.
        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", label)),
            address_mode_u,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            width,
            height,
        }
    }

    /// Upload a decoded image.
    pub fn from_image(gpu: &GpuContext, img: &image::RgbaImage, label: &str) -> Self {
        let (width, height) = img.dimensions();
        Self::from_rgba(gpu, img, width, height, label)
    }

    /// Load a texture from an image file.
    pub fn from_file(gpu: &GpuContext, path: &str) -> Result<Self, image::ImageError> {
        let img = image::open(path)?.to_rgba8();
        Ok(Self::from_image(gpu, &img, path))
    }

    /// Load a texture from embedded bytes.
    pub fn from_bytes(
        gpu: &GpuContext,
        bytes: &[u8],
        label: &str,
    ) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        Ok(Self::from_image(gpu, &img, label))
    }

    /// A 1x1 texture of a single color.
    pub fn solid(gpu: &GpuContext, rgba: [u8; 4], label: &str) -> Self {
        Self::from_rgba(gpu, &rgba, 1, 1, label)
    }

    /// Width divided by height.
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Approximate GPU memory used, for cache budgeting.
    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * 4
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Generate the gradient-plus-noise map that drives fade and blend transitions.
    pub fn mix_map(gpu: &GpuContext, size: u32, seed: u32) -> Self {
        let data = mix_map_pixels(size, seed);
        // Thresholds are compared against raw values, so skip sRGB decoding.
        Self::from_rgba_with(
            gpu,
            &data,
            size.max(1),
            size.max(1),
            "Transition Mix Map",
            wgpu::AddressMode::ClampToEdge,
            wgpu::TextureFormat::Rgba8Unorm,
        )
    }
}

/// RGBA pixels of a transition mix map.
///
/// The red channel is a diagonal gradient broken up by blocky noise, so a
/// threshold sweeping from 0 to 1 dissolves the image from one corner to the
/// other. Every channel carries the same value.
pub fn mix_map_pixels(size: u32, seed: u32) -> Vec<u8> {
    let size = size.max(1);
    let mut data = vec![0u8; (size * size * 4) as usize];
    let span = (2 * size.saturating_sub(1)).max(1) as f32;

    for y in 0..size {
        for x in 0..size {
            let idx = ((y * size + x) * 4) as usize;
            let gradient = (x + y) as f32 / span;

            // Blocky noise, 8px cells
            let cell = hash(x / 8, y / 8, seed);
            let noise = (cell % 64) as f32 / 63.0 - 0.5;

            let value = (gradient * 0.8 + noise * 0.2 + 0.1).clamp(0.0, 1.0);
            let v = (value * 255.0).round() as u8;
            data[idx] = v;
            data[idx + 1] = v;
            data[idx + 2] = v;
            data[idx + 3] = 255;
        }
    }

    data
}

/// Simple hash function for procedural generation.
fn hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_add(x.wrapping_mul(374761393));
    h = h.wrapping_add(y.wrapping_mul(668265263));
    h ^= h >> 13;
    h = h.wrapping_mul(1274126177);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_map_has_expected_size() {
        assert_eq!(mix_map_pixels(16, 1).len(), 16 * 16 * 4);
    }

    #[test]
    fn mix_map_runs_dark_to_light() {
        let size = 64;
        let data = mix_map_pixels(size, 7);
        let first = data[0];
        let last = data[((size * size - 1) * 4) as usize];
        assert!(first < last, "{first} >= {last}");
    }

    #[test]
    fn mix_map_is_deterministic() {
        assert_eq!(mix_map_pixels(32, 3), mix_map_pixels(32, 3));
    }
}
