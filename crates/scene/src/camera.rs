//! First-person camera.
//!
//! Position plus yaw/pitch, driven directly by walk/strafe and mouse-look
//! calls. The view matrix is rebuilt on demand; the projection carries the
//! Vulkan Y-flip.

use glam::{Mat4, Vec3};

/// First-person camera with yaw/pitch orientation.
#[derive(Clone, Debug)]
pub struct Camera {
    /// World-space position.
    pub position: Vec3,
    /// Rotation about the world Y axis, radians.
    yaw: f32,
    /// Rotation about the camera's right axis, radians. Clamped short of
    /// straight up/down to keep the basis well-defined.
    pitch: f32,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl Camera {
    /// Creates a camera at the origin looking down -Z.
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            fov_y: 45.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 1.0,
            far: 1000.0,
        }
    }

    /// Sets the perspective projection parameters.
    pub fn set_lens(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.fov_y = fov_y;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
    }

    /// Updates the aspect ratio after a resize.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Forward direction (unit vector).
    pub fn forward(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(sin_yaw * cos_pitch, -sin_pitch, -cos_yaw * cos_pitch).normalize()
    }

    /// Right direction (unit vector).
    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize()
    }

    /// Moves along the view direction.
    pub fn walk(&mut self, distance: f32) {
        self.position += self.forward() * distance;
    }

    /// Moves along the right axis.
    pub fn strafe(&mut self, distance: f32) {
        self.position += self.right() * distance;
    }

    /// Pitches the view (positive looks down).
    pub fn pitch(&mut self, radians: f32) {
        let limit = std::f32::consts::FRAC_PI_2 - 0.01;
        self.pitch = (self.pitch + radians).clamp(-limit, limit);
    }

    /// Rotates the view about the world Y axis.
    pub fn rotate_y(&mut self, radians: f32) {
        self.yaw += radians;
    }

    /// View matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y)
    }

    /// Projection matrix with Vulkan Y-flip.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Near plane distance.
    pub fn near(&self) -> f32 {
        self.near
    }

    /// Far plane distance.
    pub fn far(&self) -> f32 {
        self.far
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_moves_along_forward() {
        let mut camera = Camera::new();
        camera.walk(5.0);
        // Default orientation looks down -Z.
        assert!((camera.position.z + 5.0).abs() < 1e-4);
        assert!(camera.position.x.abs() < 1e-4);
    }

    #[test]
    fn test_strafe_is_perpendicular_to_forward() {
        let mut camera = Camera::new();
        camera.rotate_y(0.7);
        let forward = camera.forward();
        let right = camera.right();
        assert!(forward.dot(right).abs() < 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::new();
        camera.pitch(10.0);
        // Still well-defined and short of straight down.
        assert!(camera.forward().length() > 0.99);
        camera.pitch(-20.0);
        assert!(camera.forward().length() > 0.99);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::new();
        let proj = camera.projection_matrix();
        assert!(proj.y_axis.y < 0.0);
    }
}
