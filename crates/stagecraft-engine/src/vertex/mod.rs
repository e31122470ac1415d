//! Vertex formats shared between shader input layouts and geometry buffers.
//!
//! - `VertexFormat` describes one buffer slot (stride + elements)
//! - `GpuVertex` ties a Rust `Pod` type to its format
//! - `Vertex` and `InstanceData` are the formats every demo uses

mod format;

pub use format::{
    ElementFormat, GpuVertex, StepMode, VertexElement, VertexFormat, VertexFormatError,
};

use bytemuck::{Pod, Zeroable};

/// Position / normal / texture-coordinate vertex (stride 32).
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub const fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

static VERTEX_FORMAT: VertexFormat = VertexFormat {
    name: "position-normal-texcoord",
    stride: 32,
    step: StepMode::Vertex,
    elements: &[
        VertexElement {
            semantic: "POSITION",
            semantic_index: 0,
            format: ElementFormat::Float32x3,
            offset: 0,
            location: 0,
        },
        VertexElement {
            semantic: "NORMAL",
            semantic_index: 0,
            format: ElementFormat::Float32x3,
            offset: 12,
            location: 1,
        },
        VertexElement {
            semantic: "TEXCOORD",
            semantic_index: 0,
            format: ElementFormat::Float32x2,
            offset: 24,
            location: 2,
        },
    ],
};

impl GpuVertex for Vertex {
    const FORMAT: &'static VertexFormat = &VERTEX_FORMAT;
}

/// Per-instance world transform, read from buffer slot 1.
///
/// Holds the four columns of a `glam::Mat4`; the vertex stage rebuilds the
/// matrix from locations 3..=6.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub world: [[f32; 4]; 4],
}

impl InstanceData {
    pub fn from_world(world: glam::Mat4) -> Self {
        Self {
            world: world.to_cols_array_2d(),
        }
    }

    pub fn from_translation(x: f32, y: f32, z: f32) -> Self {
        Self::from_world(glam::Mat4::from_translation(glam::Vec3::new(x, y, z)))
    }
}

static INSTANCE_FORMAT: VertexFormat = VertexFormat {
    name: "instance-world",
    stride: 64,
    step: StepMode::Instance,
    elements: &[
        VertexElement {
            semantic: "WORLD",
            semantic_index: 0,
            format: ElementFormat::Float32x4,
            offset: 0,
            location: 3,
        },
        VertexElement {
            semantic: "WORLD",
            semantic_index: 1,
            format: ElementFormat::Float32x4,
            offset: 16,
            location: 4,
        },
        VertexElement {
            semantic: "WORLD",
            semantic_index: 2,
            format: ElementFormat::Float32x4,
            offset: 32,
            location: 5,
        },
        VertexElement {
            semantic: "WORLD",
            semantic_index: 3,
            format: ElementFormat::Float32x4,
            offset: 48,
            location: 6,
        },
    ],
};

impl GpuVertex for InstanceData {
    const FORMAT: &'static VertexFormat = &INSTANCE_FORMAT;
}
