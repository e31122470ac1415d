use std::fmt;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident, $variant:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a backend-assigned id. Backends must never hand out id 0.
            #[inline]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl From<$name> for GpuObject {
            #[inline]
            fn from(h: $name) -> Self {
                GpuObject::$variant(h)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($kind, "#{}"), self.0)
            }
        }
    };
}

gpu_handle!(
    /// Vertex, index, constant or storage buffer.
    BufferId, Buffer, "buffer"
);
gpu_handle!(
    /// Texture storage. Shaders never see it directly; they read through a view.
    TextureId, Texture, "texture"
);
gpu_handle!(
    /// Shader-readable view of a texture.
    TextureViewId, TextureView, "view"
);
gpu_handle!(ShaderId, Shader, "shader");
gpu_handle!(
    /// Maps vertex buffer memory to vertex stage inputs.
    InputLayoutId, InputLayout, "input-layout"
);
gpu_handle!(SamplerId, Sampler, "sampler");
gpu_handle!(RasterizerStateId, RasterizerState, "rasterizer");
gpu_handle!(BlendStateId, BlendState, "blend");

/// Any device-resident object, as seen by `Device::release`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GpuObject {
    Buffer(BufferId),
    Texture(TextureId),
    TextureView(TextureViewId),
    Shader(ShaderId),
    InputLayout(InputLayoutId),
    Sampler(SamplerId),
    RasterizerState(RasterizerStateId),
    BlendState(BlendStateId),
}

impl GpuObject {
    pub fn raw(self) -> u64 {
        match self {
            GpuObject::Buffer(h) => h.raw(),
            GpuObject::Texture(h) => h.raw(),
            GpuObject::TextureView(h) => h.raw(),
            GpuObject::Shader(h) => h.raw(),
            GpuObject::InputLayout(h) => h.raw(),
            GpuObject::Sampler(h) => h.raw(),
            GpuObject::RasterizerState(h) => h.raw(),
            GpuObject::BlendState(h) => h.raw(),
        }
    }
}

impl fmt::Display for GpuObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuObject::Buffer(h) => h.fmt(f),
            GpuObject::Texture(h) => h.fmt(f),
            GpuObject::TextureView(h) => h.fmt(f),
            GpuObject::Shader(h) => h.fmt(f),
            GpuObject::InputLayout(h) => h.fmt(f),
            GpuObject::Sampler(h) => h.fmt(f),
            GpuObject::RasterizerState(h) => h.fmt(f),
            GpuObject::BlendState(h) => h.fmt(f),
        }
    }
}
