use std::f32::consts::PI;

use super::{ProjectionParams, ViewProjection, ViewType};

/// Field of view at which the lens starts bending away from rectilinear.
pub const GOPRO_BLEND_START: f32 = 90.0;
/// Field of view at which the lens is fully stereographic.
pub const GOPRO_BLEND_END: f32 = 180.0;

/// Wide-angle lens that blends from rectilinear into a fisheye as fov grows.
#[derive(Clone, Copy, Debug, Default)]
pub struct GoProView;

impl GoProView {
    /// Projection distance for a field of view in degrees.
    ///
    /// Zero up to 90 degrees, one from 180 degrees, with a sinusoidal ease in between.
    pub fn distance(fov: f32) -> f32 {
        let t = ((fov - GOPRO_BLEND_START) / (GOPRO_BLEND_END - GOPRO_BLEND_START)).clamp(0.0, 1.0);
        (1.0 - (PI * t).cos()) * 0.5
    }
}

impl ViewProjection for GoProView {
    fn view_type(&self) -> ViewType {
        ViewType::GoPro
    }

    fn fov_limits(&self) -> (f32, f32) {
        (30.0, 330.0)
    }

    fn params(&self, fov: f32) -> ProjectionParams {
        let fov = self.clamp_fov(fov);
        ProjectionParams::for_half_fov((fov * 0.5).to_radians(), Self::distance(fov))
    }
}
