use super::handle::BufferId;

/// Fixed positions in the pipeline that consume bound resources.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Vertex,
    Hull,
    Domain,
    Pixel,
    Compute,
}

impl Stage {
    /// Graphics stages in pipeline order.
    pub const GRAPHICS: [Stage; 4] = [Stage::Vertex, Stage::Hull, Stage::Domain, Stage::Pixel];

    pub const fn name(self) -> &'static str {
        match self {
            Stage::Vertex => "vertex",
            Stage::Hull => "hull",
            Stage::Domain => "domain",
            Stage::Pixel => "pixel",
            Stage::Compute => "compute",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── buffers ─────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Contents fixed at creation; initial data is mandatory.
    Immutable,
    /// Rewritten through `CommandContext::update_buffer`.
    Dynamic,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferBinding {
    Vertex,
    Index,
    Constant,
    Storage,
}

#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub byte_width: u64,
    pub usage: BufferUsage,
    pub binding: BufferBinding,
}

// ── textures ────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
}

impl TextureFormat {
    pub const fn bytes_per_texel(self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureDesc<'_> {
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_texel() as usize
    }
}

// ── shaders ─────────────────────────────────────────────────────────────────

/// Program text for one stage.
#[derive(Debug, Copy, Clone)]
pub struct ShaderSource<'a> {
    pub label: &'a str,
    pub wgsl: &'a str,
    pub entry_point: &'a str,
}

// ── fixed-function state ────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    Point,
    Linear,
    Anisotropic,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Clamp,
    Mirror,
}

#[derive(Debug, Clone)]
pub struct SamplerDesc<'a> {
    pub label: &'a str,
    pub filter: Filter,
    pub address: AddressMode,
    /// Only read when `filter` is `Anisotropic`.
    pub max_anisotropy: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FillMode {
    Solid,
    Wireframe,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone)]
pub struct RasterizerDesc<'a> {
    pub label: &'a str,
    pub fill: FillMode,
    pub cull: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_clip: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    InvSrcAlpha,
    SrcColor,
    InvSrcColor,
    DstAlpha,
    InvDstAlpha,
    BlendFactor,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    RevSubtract,
    Min,
    Max,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlendTarget {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub op_alpha: BlendOp,
}

pub const COLOR_WRITE_ALL: u8 = 0b1111;

#[derive(Debug, Clone)]
pub struct BlendDesc<'a> {
    pub label: &'a str,
    pub alpha_to_coverage: bool,
    /// `None` disables blending on the render target.
    pub target: Option<BlendTarget>,
    /// RGBA bits, see [`COLOR_WRITE_ALL`].
    pub write_mask: u8,
}

// ── input assembly ──────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Topology {
    PointList,
    LineList,
    TriangleList,
    TriangleStrip,
    /// Each primitive is a patch of control points fed to the hull stage.
    PatchList { control_points: u8 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub const fn size(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    pub buffer: BufferId,
    pub stride: u32,
    pub offset: u32,
}
