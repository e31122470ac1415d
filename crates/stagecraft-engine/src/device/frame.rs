/// A swapchain image acquired for one frame, plus the window's depth target.
///
/// Hand it back through [`Gpu::submit`](super::Gpu::submit) promptly; the
/// surface cannot give out another image while this one is held.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    /// Depth attachment shared by every frame of the window.
    pub depth_view: Option<wgpu::TextureView>,
    /// Monotonic index, handed to the command context.
    pub index: u64,
}

/// What the caller should do after frame acquisition failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// The surface was configured again; the next frame can be acquired.
    Reconfigured,
    /// Drop this frame and try again on the next redraw.
    SkipFrame,
    /// The device is out of memory; shut down.
    Fatal,
}
