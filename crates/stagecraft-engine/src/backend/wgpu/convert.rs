//! Descriptor translation into wgpu types.

use crate::backend::{
    AddressMode, BlendDesc, BlendFactor, BlendOp, BlendTarget, CullMode, FillMode, Filter,
    IndexFormat, RasterizerDesc, TextureFormat, Topology,
};
use crate::vertex::{ElementFormat, StepMode};

pub(super) fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
    }
}

pub(super) fn vertex_format(format: ElementFormat) -> wgpu::VertexFormat {
    match format {
        ElementFormat::Float32 => wgpu::VertexFormat::Float32,
        ElementFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        ElementFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        ElementFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
    }
}

pub(super) fn step_mode(step: StepMode) -> wgpu::VertexStepMode {
    match step {
        StepMode::Vertex => wgpu::VertexStepMode::Vertex,
        StepMode::Instance => wgpu::VertexStepMode::Instance,
    }
}

pub(super) fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::U16 => wgpu::IndexFormat::Uint16,
        IndexFormat::U32 => wgpu::IndexFormat::Uint32,
    }
}

/// `None` for patch lists, which wgpu cannot draw.
pub(super) fn topology(topology: Topology) -> Option<wgpu::PrimitiveTopology> {
    match topology {
        Topology::PointList => Some(wgpu::PrimitiveTopology::PointList),
        Topology::LineList => Some(wgpu::PrimitiveTopology::LineList),
        Topology::TriangleList => Some(wgpu::PrimitiveTopology::TriangleList),
        Topology::TriangleStrip => Some(wgpu::PrimitiveTopology::TriangleStrip),
        Topology::PatchList { .. } => None,
    }
}

fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Wrap => wgpu::AddressMode::Repeat,
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
    }
}

/// Sampler descriptor for `filter`/`address`. Anisotropic filtering requires
/// linear filtering in every dimension.
pub(super) fn sampler_descriptor<'a>(
    label: &'a str,
    filter: Filter,
    address: AddressMode,
    max_anisotropy: u16,
) -> wgpu::SamplerDescriptor<'a> {
    let (mag, min, mip, anisotropy) = match filter {
        Filter::Point => (
            wgpu::FilterMode::Nearest,
            wgpu::FilterMode::Nearest,
            wgpu::MipmapFilterMode::Nearest,
            1,
        ),
        Filter::Linear => (
            wgpu::FilterMode::Linear,
            wgpu::FilterMode::Linear,
            wgpu::MipmapFilterMode::Linear,
            1,
        ),
        Filter::Anisotropic => (
            wgpu::FilterMode::Linear,
            wgpu::FilterMode::Linear,
            wgpu::MipmapFilterMode::Linear,
            max_anisotropy.max(1),
        ),
    };
    let address = address_mode(address);

    wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        mag_filter: mag,
        min_filter: min,
        mipmap_filter: mip,
        anisotropy_clamp: anisotropy,
        ..Default::default()
    }
}

/// Rasterizer state as it enters the pipeline key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(super) struct RasterKey {
    pub polygon_mode: wgpu::PolygonMode,
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    pub unclipped_depth: bool,
}

impl RasterKey {
    /// Solid fill, back faces culled, clockwise front faces, depth clipped.
    pub const DEFAULT: RasterKey = RasterKey {
        polygon_mode: wgpu::PolygonMode::Fill,
        cull_mode: Some(wgpu::Face::Back),
        front_face: wgpu::FrontFace::Cw,
        unclipped_depth: false,
    };

    /// Translates `desc`, downgrading what `features` cannot express.
    /// The second value lists the downgrades.
    pub fn from_desc(
        desc: &RasterizerDesc<'_>,
        features: wgpu::Features,
    ) -> (RasterKey, Vec<&'static str>) {
        let mut downgraded = Vec::new();

        let polygon_mode = match desc.fill {
            FillMode::Solid => wgpu::PolygonMode::Fill,
            FillMode::Wireframe if features.contains(wgpu::Features::POLYGON_MODE_LINE) => {
                wgpu::PolygonMode::Line
            }
            FillMode::Wireframe => {
                downgraded.push("wireframe fill");
                wgpu::PolygonMode::Fill
            }
        };

        let unclipped_depth = if desc.depth_clip {
            false
        } else if features.contains(wgpu::Features::DEPTH_CLIP_CONTROL) {
            true
        } else {
            downgraded.push("disabled depth clip");
            false
        };

        let key = RasterKey {
            polygon_mode,
            cull_mode: match desc.cull {
                CullMode::None => None,
                CullMode::Front => Some(wgpu::Face::Front),
                CullMode::Back => Some(wgpu::Face::Back),
            },
            front_face: if desc.front_counter_clockwise {
                wgpu::FrontFace::Ccw
            } else {
                wgpu::FrontFace::Cw
            },
            unclipped_depth,
        };
        (key, downgraded)
    }
}

/// Output-merger state as it enters the pipeline key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(super) struct BlendKey {
    pub blend: Option<wgpu::BlendState>,
    pub write_mask: wgpu::ColorWrites,
    pub alpha_to_coverage: bool,
}

impl BlendKey {
    /// Blending off, every channel written.
    pub const DEFAULT: BlendKey = BlendKey {
        blend: None,
        write_mask: wgpu::ColorWrites::ALL,
        alpha_to_coverage: false,
    };

    pub fn from_desc(desc: &BlendDesc<'_>) -> BlendKey {
        BlendKey {
            blend: desc.target.map(blend_state),
            write_mask: wgpu::ColorWrites::from_bits_truncate(u32::from(desc.write_mask)),
            alpha_to_coverage: desc.alpha_to_coverage,
        }
    }

    /// Whether the pipeline reads the pass blend constant.
    pub fn uses_constant(&self) -> bool {
        let Some(state) = self.blend else {
            return false;
        };
        [state.color, state.alpha].iter().any(|c| {
            matches!(c.src_factor, wgpu::BlendFactor::Constant | wgpu::BlendFactor::OneMinusConstant)
                || matches!(
                    c.dst_factor,
                    wgpu::BlendFactor::Constant | wgpu::BlendFactor::OneMinusConstant
                )
        })
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::InvSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::InvSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::InvDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::BlendFactor => wgpu::BlendFactor::Constant,
    }
}

fn blend_op(op: BlendOp) -> wgpu::BlendOperation {
    match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
        BlendOp::Subtract => wgpu::BlendOperation::Subtract,
        BlendOp::RevSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendOp::Min => wgpu::BlendOperation::Min,
        BlendOp::Max => wgpu::BlendOperation::Max,
    }
}

/// wgpu requires both factors to be `One` for min/max operations.
fn blend_component(src: BlendFactor, dst: BlendFactor, op: BlendOp) -> wgpu::BlendComponent {
    let operation = blend_op(op);
    let (src_factor, dst_factor) = match op {
        BlendOp::Min | BlendOp::Max => (wgpu::BlendFactor::One, wgpu::BlendFactor::One),
        _ => (blend_factor(src), blend_factor(dst)),
    };
    wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation,
    }
}

pub(super) fn blend_state(target: BlendTarget) -> wgpu::BlendState {
    wgpu::BlendState {
        color: blend_component(target.src, target.dst, target.op),
        alpha: blend_component(target.src_alpha, target.dst_alpha, target.op_alpha),
    }
}

pub(super) fn color(rgba: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(rgba[0]),
        g: f64::from(rgba[1]),
        b: f64::from(rgba[2]),
        a: f64::from(rgba[3]),
    }
}
