use glam::Quat;

use super::{ProjectionParams, ViewProjection, ViewType};

/// Stereographic projection pointed at the nadir ("little planet").
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatView;

impl ViewProjection for FlatView {
    fn view_type(&self) -> ViewType {
        ViewType::Flat
    }

    fn fov_limits(&self) -> (f32, f32) {
        (30.0, 330.0)
    }

    fn params(&self, fov: f32) -> ProjectionParams {
        ProjectionParams::for_half_fov((fov * 0.5).to_radians(), 1.0)
    }

    fn lens_tilt(&self) -> Quat {
        Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use approx::assert_abs_diff_eq;
    use glam::Vec2;

    #[test]
    fn centre_of_screen_looks_down() {
        let dir = FlatView.screen_to_world(Vec2::ZERO, &Camera::new(), 1.0);
        assert_abs_diff_eq!(dir.y, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn reports_its_own_fov() {
        let params = FlatView.params(200.0);
        assert_abs_diff_eq!(FlatView.projection_fov(params), 200.0, epsilon = 1e-2);
    }
}
