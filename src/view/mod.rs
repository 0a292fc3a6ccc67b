//! Projection strategies mapping between screen points and view directions.
//!
//! All three views share one lens model: rays leave a projection centre
//! placed `distance` behind the sphere centre (0 is a pinhole, 1 is
//! stereographic) and hit an image plane scaled by `scale`. A view direction
//! at angle `theta` from the optical axis lands at plane radius
//!
//! ```text
//! r = sin(theta) / (distance + cos(theta))
//! ```
//!
//! and `scale` is chosen so the top edge of the screen sits at half the
//! vertical field of view. The strategies only differ in how `distance` and
//! `scale` follow the camera's field of view, which fov range they allow, and
//! which way the lens points.
//!
//! The background shader evaluates the same formulas per pixel from the
//! [`ViewUniforms`] written by [`ViewProjection::update_uniforms`].

mod flat;
mod gopro;
mod rectilinear;

pub use flat::FlatView;
pub use gopro::GoProView;
pub use rectilinear::RectilinearView;

use glam::{Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::camera::Camera;

/// Which projection a viewport uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ViewType {
    #[default]
    Rectilinear,
    GoPro,
    /// Stereographic "little planet" seen from above the nadir.
    Flat,
}

impl ViewType {
    /// Build the strategy object for this view.
    pub fn projection(self) -> Box<dyn ViewProjection> {
        match self {
            ViewType::Rectilinear => Box::new(RectilinearView),
            ViewType::GoPro => Box::new(GoProView),
            ViewType::Flat => Box::new(FlatView),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ViewType::Rectilinear => "rectilinear",
            ViewType::GoPro => "gopro",
            ViewType::Flat => "flat",
        }
    }
}

impl From<String> for ViewType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "rectilinear" | "default" => ViewType::Rectilinear,
            "gopro" => ViewType::GoPro,
            "flat" | "littleplanet" | "little-planet" => ViewType::Flat,
            other => {
                warn!(view = other, "unknown view type, using rectilinear");
                ViewType::Rectilinear
            }
        }
    }
}

impl From<ViewType> for String {
    fn from(view: ViewType) -> Self {
        view.name().to_string()
    }
}

/// Lens parameters derived from the camera's field of view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionParams {
    /// Distance of the projection centre behind the sphere centre, 0..=1.
    pub distance: f32,
    /// Plane radius at the top edge of the screen.
    pub scale: f32,
}

impl ProjectionParams {
    /// Parameters that put the screen edge at `half_fov` radians.
    pub fn for_half_fov(half_fov: f32, distance: f32) -> Self {
        Self {
            distance,
            scale: project_radius(half_fov, distance),
        }
    }
}

/// Uniform block shared by every background shader.
///
/// Must match `ViewUniforms` in `shaders/background.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewUniforms {
    /// Camera-to-world rotation.
    pub rotation: [[f32; 4]; 4],
    /// Perspective view-projection for mesh backgrounds.
    pub view_proj: [[f32; 4]; 4],
    /// x: scale, y: distance, z: aspect, w: unused.
    pub projection: [f32; 4],
    /// x: media format index, y: texture ratio, z: opacity, w: plane half-height.
    pub media: [f32; 4],
}

impl ViewUniforms {
    pub fn set_media(&mut self, format_index: u32, texture_ratio: f32) {
        self.media[0] = format_index as f32;
        self.media[1] = texture_ratio;
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.media[2] = opacity.clamp(0.0, 1.0);
    }

    pub fn opacity(&self) -> f32 {
        self.media[2]
    }
}

/// Plane radius of a direction `theta` radians off axis.
pub fn project_radius(theta: f32, distance: f32) -> f32 {
    theta.sin() / (distance + theta.cos())
}

/// Inverse of [`project_radius`]: angle off axis for a plane radius.
pub fn unproject_radius(r: f32, distance: f32) -> f32 {
    let base = r.atan();
    let k = (r * distance / (1.0 + r * r).sqrt()).clamp(-1.0, 1.0);
    base + k.asin()
}

/// Capabilities of a projection strategy.
///
/// Implementors provide the fov-dependent lens parameters; the mapping
/// functions are shared.
pub trait ViewProjection {
    fn view_type(&self) -> ViewType;

    /// Allowed camera field of view range, in degrees.
    fn fov_limits(&self) -> (f32, f32);

    /// Lens parameters for a camera field of view in degrees.
    fn params(&self, fov: f32) -> ProjectionParams;

    /// Extra rotation applied after the camera orientation.
    fn lens_tilt(&self) -> Quat {
        Quat::IDENTITY
    }

    /// Clamp a requested fov to this view's limits.
    fn clamp_fov(&self, fov: f32) -> f32 {
        let (min, max) = self.fov_limits();
        fov.clamp(min, max)
    }

    /// Camera-to-world rotation including the lens tilt.
    fn orientation(&self, camera: &Camera) -> Quat {
        camera.rotation() * self.lens_tilt()
    }

    /// Effective vertical fov in degrees reported by a set of lens parameters.
    fn projection_fov(&self, params: ProjectionParams) -> f32 {
        2.0 * unproject_radius(params.scale, params.distance).to_degrees()
    }

    /// Refresh the projection part of `uniforms`. Pure given camera and aspect.
    fn update_uniforms(&self, camera: &Camera, aspect: f32, uniforms: &mut ViewUniforms) {
        let params = self.params(self.clamp_fov(camera.fov));
        let rotation = Mat4::from_quat(self.orientation(camera));
        let mut lens = *camera;
        lens.fov = self.clamp_fov(camera.fov).min(179.0);
        uniforms.rotation = rotation.to_cols_array_2d();
        uniforms.view_proj =
            (lens.projection_matrix(aspect) * lens.view_matrix()).to_cols_array_2d();
        uniforms.projection = [params.scale, params.distance, aspect, 0.0];
    }

    /// World direction seen at normalized device coordinates `ndc`.
    fn screen_to_world(&self, ndc: Vec2, camera: &Camera, aspect: f32) -> Vec3 {
        let params = self.params(self.clamp_fov(camera.fov));
        let p = Vec2::new(ndc.x * aspect, ndc.y) * params.scale;
        let r = p.length();
        let local = if r < 1e-6 {
            Vec3::NEG_Z
        } else {
            let theta = unproject_radius(r, params.distance);
            let side = p / r * theta.sin();
            Vec3::new(side.x, side.y, -theta.cos())
        };
        self.orientation(camera) * local
    }

    /// Normalized device coordinates of a world direction, or `None` if it
    /// cannot be projected.
    fn world_to_screen(&self, direction: Vec3, camera: &Camera, aspect: f32) -> Option<Vec2> {
        let params = self.params(self.clamp_fov(camera.fov));
        let local = self.orientation(camera).inverse() * direction.try_normalize()?;
        let theta = (-local.z).clamp(-1.0, 1.0).acos();
        let denom = params.distance + theta.cos();
        if denom <= 1e-5 {
            return None;
        }
        let r = theta.sin() / denom;
        let side = Vec2::new(local.x, local.y).normalize_or_zero() * (r / params.scale);
        Some(Vec2::new(side.x / aspect, side.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn round_trip(view: &dyn ViewProjection, camera: &Camera) {
        let aspect = 16.0 / 9.0;
        for ndc in [
            Vec2::ZERO,
            Vec2::new(0.5, 0.25),
            Vec2::new(-0.9, 0.8),
            Vec2::new(0.0, -1.0),
        ] {
            let dir = view.screen_to_world(ndc, camera, aspect);
            let back = view.world_to_screen(dir, camera, aspect).unwrap();
            assert_abs_diff_eq!(back.x, ndc.x, epsilon = 1e-3);
            assert_abs_diff_eq!(back.y, ndc.y, epsilon = 1e-3);
        }
    }

    #[test]
    fn radius_functions_invert() {
        for distance in [0.0, 0.3, 0.7, 1.0] {
            for deg in [1.0_f32, 20.0, 45.0, 80.0] {
                let theta = deg.to_radians();
                let r = project_radius(theta, distance);
                assert_abs_diff_eq!(unproject_radius(r, distance), theta, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn screen_world_round_trip_for_every_view() {
        let camera = Camera::new().looking(35.0, -10.0);
        for view in [ViewType::Rectilinear, ViewType::GoPro, ViewType::Flat] {
            let projection = view.projection();
            for fov in [40.0, 75.0, 110.0] {
                round_trip(projection.as_ref(), &camera.with_fov(fov));
            }
        }
    }

    #[test]
    fn screen_edge_sits_at_half_fov() {
        let camera = Camera::new().with_fov(60.0);
        let view = RectilinearView;
        let dir = view.screen_to_world(Vec2::new(0.0, 1.0), &camera, 1.0);
        let angle = dir.angle_between(camera.forward()).to_degrees();
        assert_abs_diff_eq!(angle, 30.0, epsilon = 1e-3);
    }

    #[test]
    fn rectilinear_matches_pinhole_camera() {
        let camera = Camera::new().looking(20.0, 5.0).with_fov(70.0);
        let ndc = Vec2::new(0.4, -0.3);
        let a = RectilinearView.screen_to_world(ndc, &camera, 1.5);
        let b = camera.ray_direction(ndc, 1.5);
        assert_abs_diff_eq!(a.dot(b), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn unknown_view_name_falls_back() {
        let view: ViewType = serde_json::from_str("\"fisheye-9000\"").unwrap();
        assert_eq!(view, ViewType::Rectilinear);
        let view: ViewType = serde_json::from_str("\"littleplanet\"").unwrap();
        assert_eq!(view, ViewType::Flat);
    }

    #[test]
    fn uniforms_carry_lens_parameters() {
        let camera = Camera::new().with_fov(90.0);
        let mut uniforms = ViewUniforms::default();
        RectilinearView.update_uniforms(&camera, 2.0, &mut uniforms);
        assert_abs_diff_eq!(uniforms.projection[0], 1.0, epsilon = 1e-5);
        assert_eq!(uniforms.projection[1], 0.0);
        assert_eq!(uniforms.projection[2], 2.0);
    }
}
