use winit::event::WindowEvent;
use winit::window::WindowId;

use super::ctx::FrameCtx;
use crate::device::Gpu;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by higher layers.
pub trait App {
    /// Called once a window's GPU is ready, before its first frame.
    ///
    /// Device objects are created here; returning `Exit` aborts the runtime.
    fn on_gpu_ready(&mut self, window_id: WindowId, gpu: &Gpu<'_>) -> AppControl {
        let _ = (window_id, gpu);
        AppControl::Continue
    }

    /// Called for window events.
    fn on_window_event(&mut self, window_id: WindowId, event: &WindowEvent) -> AppControl {
        let _ = (window_id, event);
        AppControl::Continue
    }

    /// Called once per rendered frame per window.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;

    /// Called before a window and its GPU are dropped, including on exit.
    fn on_window_closing(&mut self, window_id: WindowId) {
        let _ = window_id;
    }
}
