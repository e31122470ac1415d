use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Converts a CPU matrix to the layout the shading stages read.
///
/// Shaders multiply row vectors (`v * M`), so the matrix is uploaded
/// transposed. A translation ends up in the last column of the upload.
#[inline]
pub fn shader_matrix(m: Mat4) -> [[f32; 4]; 4] {
    m.transpose().to_cols_array_2d()
}

/// Inverse-transpose of `world` with its translation removed.
///
/// Transforms normals correctly under non-uniform scale.
pub fn inverse_transpose(world: Mat4) -> Mat4 {
    let mut m = world;
    m.w_axis = Vec4::W;
    m.inverse().transpose()
}

/// Vertex stage, per object: world matrix and its inverse-transpose.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct VertexObjectParams {
    pub world: [[f32; 4]; 4],
    pub world_inverse_transpose: [[f32; 4]; 4],
}

impl VertexObjectParams {
    pub fn from_world(world: Mat4) -> Self {
        Self {
            world: shader_matrix(world),
            world_inverse_transpose: shader_matrix(inverse_transpose(world)),
        }
    }
}

/// Hull stage, per frame: camera position drives the tessellation factors.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct HullFrameParams {
    pub eye_position_w: [f32; 3],
    pub _pad: f32,
}

impl HullFrameParams {
    pub fn new(eye: Vec3) -> Self {
        Self {
            eye_position_w: eye.to_array(),
            _pad: 0.0,
        }
    }
}

/// Domain stage, per frame.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct DomainFrameParams {
    pub view_projection: [[f32; 4]; 4],
}

impl DomainFrameParams {
    pub fn new(view_projection: Mat4) -> Self {
        Self {
            view_projection: shader_matrix(view_projection),
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct DirectionalLight {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub direction: [f32; 3],
    pub _pad: f32,
}

impl DirectionalLight {
    pub fn new(ambient: Vec4, diffuse: Vec4, specular: Vec4, direction: Vec3) -> Self {
        Self {
            ambient: ambient.to_array(),
            diffuse: diffuse.to_array(),
            specular: specular.to_array(),
            direction: direction.normalize_or_zero().to_array(),
            _pad: 0.0,
        }
    }

    /// Key, fill and back light.
    pub fn three_point() -> [DirectionalLight; 3] {
        [
            DirectionalLight::new(
                Vec4::new(0.2, 0.2, 0.2, 1.0),
                Vec4::new(0.5, 0.5, 0.5, 1.0),
                Vec4::new(0.5, 0.5, 0.5, 1.0),
                Vec3::new(0.57735, -0.57735, 0.57735),
            ),
            DirectionalLight::new(
                Vec4::ZERO,
                Vec4::new(0.2, 0.2, 0.2, 1.0),
                Vec4::new(0.25, 0.25, 0.25, 1.0),
                Vec3::new(-0.57735, -0.57735, 0.57735),
            ),
            DirectionalLight::new(
                Vec4::ZERO,
                Vec4::new(0.2, 0.2, 0.2, 1.0),
                Vec4::ZERO,
                Vec3::new(0.0, -0.707, -0.707),
            ),
        ]
    }
}

/// Surface reflectance. `specular.w` is the specular power.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Material {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub reflect: [f32; 4],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: [0.8, 0.8, 0.8, 1.0],
            diffuse: [0.8, 0.8, 0.8, 1.0],
            specular: [0.4, 0.4, 0.4, 16.0],
            reflect: [0.0; 4],
        }
    }
}

/// Pixel stage, per frame: lights and eye position.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PixelFrameParams {
    pub lights: [DirectionalLight; 3],
    pub eye_position_w: [f32; 3],
    pub _pad: f32,
}

impl PixelFrameParams {
    pub fn new(lights: [DirectionalLight; 3], eye: Vec3) -> Self {
        Self {
            lights,
            eye_position_w: eye.to_array(),
            _pad: 0.0,
        }
    }
}

/// Pixel stage, per object: the material of the mesh being drawn.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PixelObjectParams {
    pub material: Material,
}
