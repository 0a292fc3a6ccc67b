use super::{ProjectionParams, ViewProjection, ViewType};

/// Plain pinhole perspective.
#[derive(Clone, Copy, Debug, Default)]
pub struct RectilinearView;

impl ViewProjection for RectilinearView {
    fn view_type(&self) -> ViewType {
        ViewType::Rectilinear
    }

    fn fov_limits(&self) -> (f32, f32) {
        (30.0, 120.0)
    }

    fn params(&self, fov: f32) -> ProjectionParams {
        ProjectionParams::for_half_fov((fov * 0.5).to_radians(), 0.0)
    }
}
