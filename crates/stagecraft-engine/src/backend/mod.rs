//! Device seam between the resource/binding core and a graphics backend.
//!
//! The core never creates a device. It receives:
//! - a [`Device`] for object creation and release (shared as `Rc<dyn Device>`)
//! - a [`CommandContext`] per frame for stage binds, uploads and draws
//!
//! Two implementations ship with the crate:
//! - [`mock`]: records every call and tracks live objects and their dependents
//! - [`wgpu`]: immediate-context style slot binding emulated on wgpu

mod desc;
mod error;
mod handle;
mod owned;

pub mod mock;
pub mod wgpu;

pub use desc::{
    AddressMode, BlendDesc, BlendFactor, BlendOp, BlendTarget, BufferBinding, BufferDesc,
    BufferUsage, COLOR_WRITE_ALL, CullMode, FillMode, Filter, IndexFormat, RasterizerDesc,
    SamplerDesc, ShaderSource, Stage, TextureDesc, TextureFormat, Topology,
    VertexBufferBinding,
};
pub use error::{DeviceError, ResultCode};
pub use handle::{
    BlendStateId, BufferId, GpuObject, InputLayoutId, RasterizerStateId, SamplerId, ShaderId,
    TextureId, TextureViewId,
};
pub use owned::{Owned, OwnedSet};

use crate::vertex::VertexFormat;

/// Object creation entry points.
///
/// Every handle returned here must eventually be passed to [`release`](Self::release)
/// exactly once. Objects that reference others (an input layout and its vertex
/// shader, a view and its texture) must be released before what they reference.
pub trait Device {
    fn backend_name(&self) -> &'static str;

    /// `contents` is required for `BufferUsage::Immutable` buffers.
    fn create_buffer(
        &self,
        desc: &BufferDesc<'_>,
        contents: Option<&[u8]>,
    ) -> Result<BufferId, DeviceError>;

    /// `texels` must hold exactly `desc.byte_len()` bytes, tightly packed.
    fn create_texture(&self, desc: &TextureDesc<'_>, texels: &[u8])
    -> Result<TextureId, DeviceError>;

    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, DeviceError>;

    fn create_shader(&self, stage: Stage, source: &ShaderSource<'_>)
    -> Result<ShaderId, DeviceError>;

    /// Builds an input layout with one buffer slot per entry of `slots`.
    fn create_input_layout(
        &self,
        label: &str,
        slots: &[&'static VertexFormat],
        vertex_shader: ShaderId,
    ) -> Result<InputLayoutId, DeviceError>;

    fn create_sampler(&self, desc: &SamplerDesc<'_>) -> Result<SamplerId, DeviceError>;

    fn create_rasterizer_state(
        &self,
        desc: &RasterizerDesc<'_>,
    ) -> Result<RasterizerStateId, DeviceError>;

    fn create_blend_state(&self, desc: &BlendDesc<'_>) -> Result<BlendStateId, DeviceError>;

    fn release(&self, object: GpuObject) -> Result<(), DeviceError>;
}

/// Per-frame submission context.
///
/// State set here persists across draws until overwritten, the way an
/// immediate device context behaves. Any error is fatal for the draw being
/// recorded; callers do not retry.
pub trait CommandContext {
    /// Monotonic index of the frame being recorded.
    fn frame_index(&self) -> u64;

    /// How many frames recorded on this device were dropped without being
    /// submitted. Uploads recorded in such a frame never reached the GPU.
    fn discarded_frames(&self) -> u64;

    /// Overwrites the start of a dynamic buffer. Ordered with respect to draws.
    fn update_buffer(&mut self, buffer: BufferId, bytes: &[u8]) -> Result<(), DeviceError>;

    fn set_input_layout(&mut self, layout: Option<InputLayoutId>) -> Result<(), DeviceError>;

    fn set_primitive_topology(&mut self, topology: Topology) -> Result<(), DeviceError>;

    fn set_vertex_buffers(
        &mut self,
        first_slot: u32,
        buffers: &[VertexBufferBinding],
    ) -> Result<(), DeviceError>;

    fn set_index_buffer(
        &mut self,
        buffer: Option<BufferId>,
        format: IndexFormat,
        offset: u32,
    ) -> Result<(), DeviceError>;

    /// `None` unbinds the stage.
    fn set_shader(&mut self, stage: Stage, shader: Option<ShaderId>) -> Result<(), DeviceError>;

    fn set_constant_buffers(
        &mut self,
        stage: Stage,
        first_slot: u32,
        buffers: &[BufferId],
    ) -> Result<(), DeviceError>;

    fn set_shader_resources(
        &mut self,
        stage: Stage,
        first_slot: u32,
        views: &[TextureViewId],
    ) -> Result<(), DeviceError>;

    fn set_samplers(
        &mut self,
        stage: Stage,
        first_slot: u32,
        samplers: &[SamplerId],
    ) -> Result<(), DeviceError>;

    /// Storage buffers are only visible to the compute stage.
    fn set_storage_buffers(
        &mut self,
        first_slot: u32,
        buffers: &[BufferId],
    ) -> Result<(), DeviceError>;

    /// `None` selects the backend default (solid fill, back-face culling).
    fn set_rasterizer_state(
        &mut self,
        state: Option<RasterizerStateId>,
    ) -> Result<(), DeviceError>;

    /// `None` selects the backend default (blending disabled).
    fn set_blend_state(
        &mut self,
        state: Option<BlendStateId>,
        blend_factor: [f32; 4],
        sample_mask: u32,
    ) -> Result<(), DeviceError>;

    fn draw(&mut self, vertex_count: u32, start_vertex: u32) -> Result<(), DeviceError>;

    fn draw_indexed(
        &mut self,
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    ) -> Result<(), DeviceError>;

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) -> Result<(), DeviceError>;

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), DeviceError>;
}
