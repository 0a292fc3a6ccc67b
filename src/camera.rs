//! Panorama camera: a viewer at the origin turning in place.

use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

/// Orientation and lens of one viewport.
///
/// Angles are stored in degrees. Yaw is positive to the right, pitch is
/// positive upward. The camera stays at the origin; `eye_offset` shifts it
/// sideways for stereo rendering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Offset in camera space, used for VR eyes.
    pub eye_offset: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            fov: 75.0,
            near: 0.1,
            far: 1000.0,
            eye_offset: Vec3::ZERO,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn looking(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.set_pitch(pitch);
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees;
        self
    }

    /// Copy of this camera shifted sideways by `offset` world units.
    pub fn with_eye(mut self, offset: f32) -> Self {
        self.eye_offset = Vec3::new(offset, 0.0, 0.0);
        self
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.clamp(-90.0, 90.0);
    }

    /// Rotation from camera space (looking down -Z) to world space.
    pub fn rotation(&self) -> Quat {
        Quat::from_euler(
            EulerRot::YXZ,
            -self.yaw.to_radians(),
            self.pitch.to_radians(),
            self.roll.to_radians(),
        )
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::NEG_Z
    }

    /// World-space eye position.
    pub fn position(&self) -> Vec3 {
        self.rotation() * self.eye_offset
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation(), self.position()).inverse()
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), aspect.max(1e-4), self.near, self.far)
    }

    /// Full-screen orthographic camera used by shader backgrounds.
    pub fn orthographic_screen() -> Mat4 {
        Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, -1.0, 1.0)
    }

    /// World direction through normalized device coordinates for a pinhole lens.
    pub fn ray_direction(&self, ndc: Vec2, aspect: f32) -> Vec3 {
        let tan_half = (self.fov.to_radians() * 0.5).tan();
        let local = Vec3::new(ndc.x * tan_half * aspect, ndc.y * tan_half, -1.0);
        self.rotation() * local.normalize()
    }
}

/// Drag-to-look and wheel-to-zoom control.
#[derive(Clone, Copy, Debug)]
pub struct CameraController {
    /// Degrees turned per pixel dragged at 90 degrees fov.
    pub drag_sensitivity: f32,
    /// Degrees of fov change per wheel line.
    pub zoom_step: f32,
    /// Degrees per second of automatic yaw, zero to disable.
    pub auto_rotate: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        Self {
            drag_sensitivity: 0.15,
            zoom_step: 5.0,
            auto_rotate: 0.0,
        }
    }
}

impl CameraController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one frame of input. `fov_limits` comes from the active view.
    pub fn update(
        &self,
        camera: &mut Camera,
        drag: Option<Vec2>,
        scroll: f32,
        dt: f32,
        fov_limits: (f32, f32),
    ) {
        if let Some(delta) = drag {
            // Scale with zoom so the image tracks the pointer.
            let scale = self.drag_sensitivity * (camera.fov / 90.0);
            camera.yaw = (camera.yaw - delta.x * scale).rem_euclid(360.0);
            camera.set_pitch(camera.pitch + delta.y * scale);
        } else if self.auto_rotate != 0.0 {
            camera.yaw = (camera.yaw + self.auto_rotate * dt).rem_euclid(360.0);
        }

        if scroll != 0.0 {
            camera.fov = (camera.fov - scroll * self.zoom_step).clamp(fov_limits.0, fov_limits.1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn default_looks_down_negative_z() {
        let forward = Camera::new().forward();
        assert_abs_diff_eq!(forward.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn positive_yaw_turns_right() {
        let forward = Camera::new().looking(90.0, 0.0).forward();
        assert_abs_diff_eq!(forward.x, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(forward.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn positive_pitch_looks_up() {
        let forward = Camera::new().looking(0.0, 45.0).forward();
        assert!(forward.y > 0.7);
    }

    #[test]
    fn pitch_is_clamped() {
        let camera = Camera::new().looking(0.0, 120.0);
        assert_eq!(camera.pitch, 90.0);
    }

    #[test]
    fn center_ray_matches_forward() {
        let camera = Camera::new().looking(30.0, 10.0);
        let ray = camera.ray_direction(Vec2::ZERO, 1.5);
        assert_abs_diff_eq!(ray.dot(camera.forward()), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn eye_offset_moves_position_sideways() {
        let camera = Camera::new().with_eye(0.03);
        assert_abs_diff_eq!(camera.position().x, 0.03, epsilon = 1e-6);
        let turned = Camera::new().looking(90.0, 0.0).with_eye(0.03);
        assert_abs_diff_eq!(turned.position().z, 0.03, epsilon = 1e-6);
    }

    #[test]
    fn zoom_respects_limits() {
        let controller = CameraController::new();
        let mut camera = Camera::new().with_fov(35.0);
        controller.update(&mut camera, None, 10.0, 0.016, (30.0, 120.0));
        assert_eq!(camera.fov, 30.0);
    }
}
