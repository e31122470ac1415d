use std::fmt::Display;

use winit::window::{Window, WindowId};

use crate::backend::CommandContext;
use crate::device::{Gpu, SurfaceErrorAction};
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

use super::app::AppControl;

/// Per-window handles and immutable window metadata.
pub struct WindowCtx<'a> {
    pub id:     WindowId,
    pub window: &'a Window,
}

impl<'a> WindowCtx<'a> {
    /// Returns the physical window size as `(width, height)`.
    pub fn physical_size(&self) -> (u32, u32) {
        let phys = self.window.inner_size();
        (phys.width, phys.height)
    }

    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }
}

/// Per-frame context passed to `core::App::on_frame`.
///
/// Lifetimes:
/// - `'a` is the duration of the callback invocation
/// - `'w` is the window-borrow lifetime carried by `Gpu<'w>`
pub struct FrameCtx<'a, 'w> {
    pub window:  WindowCtx<'a>,
    pub gpu:     &'a mut Gpu<'w>,
    pub time:    FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}

impl<'a, 'w> FrameCtx<'a, 'w> {
    /// Acquires the next surface texture, lets `draw` record into a context
    /// that clears it to `clear`, then submits and presents.
    ///
    /// If `draw` fails the recorded commands are discarded and the frame is
    /// skipped; the error is logged and rendering continues next frame.
    /// Parameter blocks uploaded in the skipped frame upload again.
    pub fn render<F, E>(&mut self, clear: wgpu::Color, draw: F) -> AppControl
    where
        F: FnOnce(&mut dyn CommandContext) -> Result<(), E>,
        E: Display,
    {
        let frame = match self.gpu.begin_frame() {
            Ok(f) => f,
            Err(err) => {
                let action = self.gpu.handle_surface_error(err);
                if action == SurfaceErrorAction::Fatal {
                    return AppControl::Exit;
                }
                return AppControl::Continue;
            }
        };

        let mut ctx = self.gpu.command_context(&frame, clear);
        if let Err(e) = draw(&mut ctx) {
            log::warn!("frame {} skipped: {e}", frame.index);
            return AppControl::Continue;
        }
        let commands = ctx.finish();

        self.window.window.pre_present_notify();
        self.gpu.submit(frame, commands);

        AppControl::Continue
    }
}
