use std::path::PathBuf;

use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use stagecraft_engine::core::{App, AppControl, FrameCtx};
use stagecraft_engine::device::Gpu;

use crate::scene::{Demo, Scene};

const CLEAR: wgpu::Color = wgpu::Color {
    r: 0.69,
    g: 0.77,
    b: 0.87,
    a: 1.0,
};

/// Drives one demo scene in a single window.
///
/// `T` switches to wireframe, `Y` back to solid fill, `Escape` quits.
pub struct DemoApp {
    demo: Demo,
    ground_texture: Option<PathBuf>,
    scene: Option<Scene>,
    rate: FrameRate,
}

impl DemoApp {
    pub fn new(demo: Demo, ground_texture: Option<PathBuf>) -> Self {
        Self {
            demo,
            ground_texture,
            scene: None,
            rate: FrameRate::default(),
        }
    }
}

impl App for DemoApp {
    fn on_gpu_ready(&mut self, _window_id: WindowId, gpu: &Gpu<'_>) -> AppControl {
        match Scene::load(self.demo, self.ground_texture.as_deref(), &gpu.backend()) {
            Ok(scene) => {
                self.scene = Some(scene);
                AppControl::Continue
            }
            Err(e) => {
                log::error!("{e:#}");
                AppControl::Exit
            }
        }
    }

    fn on_window_event(&mut self, _window_id: WindowId, event: &WindowEvent) -> AppControl {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return AppControl::Continue;
        };
        if event.state != ElementState::Pressed {
            return AppControl::Continue;
        }

        match event.physical_key {
            PhysicalKey::Code(KeyCode::Escape) => return AppControl::Exit,
            PhysicalKey::Code(KeyCode::KeyT) => {
                if let Some(scene) = self.scene.as_mut() {
                    scene.set_wireframe(true);
                }
            }
            PhysicalKey::Code(KeyCode::KeyY) => {
                if let Some(scene) = self.scene.as_mut() {
                    scene.set_wireframe(false);
                }
            }
            _ => {}
        }
        AppControl::Continue
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        let Some(scene) = self.scene.as_mut() else {
            return AppControl::Continue;
        };

        if let Some((fps, ms)) = self.rate.tick(ctx.time.elapsed) {
            ctx.window
                .set_title(&format!("stagecraft: {}  fps {fps:.0}  {ms:.2} ms", self.demo.name()));
        }

        scene.update(&ctx.time, ctx.gpu.aspect_ratio());
        ctx.render(CLEAR, |c| scene.draw(c))
    }

    fn on_window_closing(&mut self, _window_id: WindowId) {
        let Some(scene) = self.scene.take() else {
            return;
        };
        if let Err(e) = scene.destroy() {
            log::error!("{e:#}");
        }
    }
}

/// Averages frame rate over windows of at least one second.
#[derive(Debug, Default)]
struct FrameRate {
    frames: u32,
    window_start: f32,
}

impl FrameRate {
    /// Counts a frame. Once a second has passed, returns frames per second
    /// and milliseconds per frame and starts a new window.
    fn tick(&mut self, elapsed: f32) -> Option<(f32, f32)> {
        self.frames += 1;
        let span = elapsed - self.window_start;
        if span < 1.0 {
            return None;
        }
        let fps = self.frames as f32 / span;
        self.frames = 0;
        self.window_start = elapsed;
        Some((fps, 1000.0 / fps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rate_reports_once_per_second() {
        let mut rate = FrameRate::default();
        for i in 1..60 {
            assert_eq!(rate.tick(i as f32 / 60.0), None);
        }
        let (fps, ms) = rate.tick(1.0).unwrap();
        assert!((fps - 60.0).abs() < 1e-3);
        assert!((ms - 1000.0 / 60.0).abs() < 1e-3);
        assert_eq!(rate.tick(1.01), None);
    }
}
