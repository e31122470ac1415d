use std::f32::consts::{FRAC_PI_4, TAU};

use glam::{Mat4, Vec3};

/// Camera circling the origin on a sphere, looking at the centre.
///
/// Left-handed: +Z points into the screen, matching the clockwise front
/// faces of the default rasterizer state.
#[derive(Debug, Clone, Copy)]
pub struct OrbitCamera {
    pub radius: f32,
    /// Angle from +Y, in radians.
    pub phi: f32,
    /// Angle around +Y, in radians.
    pub theta: f32,
    /// Radians per second added to `theta`.
    pub spin: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            radius: 200.0,
            phi: 0.3 * std::f32::consts::PI,
            theta: 1.5 * std::f32::consts::PI,
            spin: 0.1,
            fov_y: FRAC_PI_4,
            near: 1.0,
            far: 1000.0,
        }
    }
}

impl OrbitCamera {
    pub fn advance(&mut self, dt: f32) {
        self.theta = (self.theta + self.spin * dt).rem_euclid(TAU);
    }

    pub fn eye(&self) -> Vec3 {
        let (sin_phi, cos_phi) = self.phi.sin_cos();
        let (sin_theta, cos_theta) = self.theta.sin_cos();
        self.radius * Vec3::new(sin_phi * cos_theta, cos_phi, sin_phi * sin_theta)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        let view = Mat4::look_at_lh(self.eye(), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_lh(self.fov_y, aspect, self.near, self.far);
        projection * view
    }
}
