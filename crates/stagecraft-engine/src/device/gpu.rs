use std::rc::Rc;

use anyhow::{Context, Result};
use wgpu::SurfaceError;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::surface;
use super::{GpuFrame, GpuInit, SurfaceErrorAction};
use crate::backend::Device;
use crate::backend::wgpu::{RenderTarget, TargetFormats, WgpuContext, WgpuDevice};

/// Owns wgpu core objects and the surface configuration.
///
/// This type is the low-level rendering context:
/// - creates and stores Instance/Adapter/Device/Queue
/// - creates and configures the Surface (swapchain) and its depth attachment
/// - owns the [`WgpuDevice`] the resource registries create objects through
/// - acquires frames and submits recorded command buffers
pub struct Gpu<'w> {
    /// Kept alive for the surface.
    #[allow(dead_code)]
    instance: wgpu::Instance,

    /// Surface bound to the window.
    surface: wgpu::Surface<'w>,

    /// Selected adapter.
    adapter: wgpu::Adapter,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    /// Active surface configuration.
    config: wgpu::SurfaceConfiguration,

    /// Current drawable size in physical pixels.
    size: PhysicalSize<u32>,

    depth_format: Option<wgpu::TextureFormat>,
    depth_view: Option<wgpu::TextureView>,

    /// Object table and pipeline cache shared with the resource registries.
    backend: Rc<WgpuDevice>,

    next_frame: u64,
}

impl<'w> Gpu<'w> {
    /// Creates a GPU context bound to a window.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: &'w Window, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let features = init.features_for(adapter.features());
        let missing = init.missing_optional(adapter.features());
        if !missing.is_empty() {
            log::warn!("adapter lacks optional features {missing:?}; affected states fall back");
        }

        let GpuInit {
            prefer_srgb,
            present_mode,
            alpha_mode,
            required_limits,
            desired_maximum_frame_latency,
            depth_format,
            ..
        } = init;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("stagecraft device"),
                required_features: features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&surface_caps, prefer_srgb)
            .context("no supported surface formats")?;

        let alpha_mode = surface::choose_alpha_mode(&surface_caps, alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency,
        };

        surface.configure(&device, &config);

        let depth_view = depth_format.map(|f| surface::create_depth_view(&device, f, &config));
        let backend = Rc::new(WgpuDevice::new(
            device.clone(),
            queue.clone(),
            TargetFormats {
                color: format,
                depth: depth_format,
                sample_count: 1,
            },
        ));

        log::info!(
            "gpu ready: {} ({:?}), surface {format:?}, depth {depth_format:?}",
            adapter.get_info().name,
            adapter.get_info().backend
        );

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            config,
            size,
            depth_format,
            depth_view,
            backend,
            next_frame: 0,
        })
    }

    /// Returns the active surface format.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Returns the current drawable size (physical pixels).
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Width over height of the drawable, 1.0 while minimized.
    pub fn aspect_ratio(&self) -> f32 {
        if self.size.width == 0 || self.size.height == 0 {
            return 1.0;
        }
        self.size.width as f32 / self.size.height as f32
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The device seam the registries and parameter blocks create objects through.
    pub fn backend(&self) -> Rc<dyn Device> {
        self.backend.clone()
    }

    pub fn wgpu_backend(&self) -> &Rc<WgpuDevice> {
        &self.backend
    }

    /// Reconfigures the surface after a resize.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        let configured = surface::apply_resize(
            &self.surface,
            &self.device,
            &mut self.config,
            &mut self.size,
            new_size,
        );
        if configured {
            self.depth_view = self
                .depth_format
                .map(|f| surface::create_depth_view(&self.device, f, &self.config));
        }
    }

    /// Acquires the next surface texture.
    pub fn begin_frame(&mut self) -> std::result::Result<GpuFrame, SurfaceError> {
        let surface_texture = self.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let index = self.next_frame;
        self.next_frame += 1;

        Ok(GpuFrame {
            surface_texture,
            view,
            depth_view: self.depth_view.clone(),
            index,
        })
    }

    /// A recording context that renders into `frame`, clearing it to `clear`.
    pub fn command_context(&self, frame: &GpuFrame, clear: wgpu::Color) -> WgpuContext {
        WgpuContext::new(
            self.backend.clone(),
            RenderTarget {
                color: frame.view.clone(),
                depth: frame.depth_view.clone(),
                clear,
            },
            frame.index,
        )
    }

    /// Submits the recorded commands for the given frame and presents it.
    pub fn submit(&self, frame: GpuFrame, commands: wgpu::CommandBuffer) {
        self.queue.submit(std::iter::once(commands));
        drop(frame.view);
        frame.surface_texture.present();
    }

    /// Converts a `SurfaceError` into a higher-level action.
    pub fn handle_surface_error(&mut self, err: SurfaceError) -> SurfaceErrorAction {
        surface::map_surface_error(&self.surface, &self.device, &self.config, self.size, err)
    }
}
