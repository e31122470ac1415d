/// How [`Gpu::new`](super::Gpu::new) sets up the adapter, device and surface.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Pick an sRGB surface format when the surface offers one.
    ///
    /// Lit scenes compute in linear space and rely on the sRGB write.
    pub prefer_srgb: bool,

    pub present_mode: wgpu::PresentMode,

    /// Requested alpha mode. An unsupported request falls back to the first
    /// mode the surface lists.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Device creation fails without these.
    pub required_features: wgpu::Features,

    /// Enabled when the adapter has them, skipped otherwise.
    ///
    /// The defaults let wireframe rasterizer states and disabled depth
    /// clipping take effect instead of falling back to solid, clipped fill.
    pub optional_features: wgpu::Features,

    pub required_limits: wgpu::Limits,

    /// Surface latency hint; backends may ignore it.
    pub desired_maximum_frame_latency: u32,

    /// Format of the window's depth attachment. `None` renders without depth.
    pub depth_format: Option<wgpu::TextureFormat>,
}

impl GpuInit {
    /// Features to request from an adapter offering `available`.
    pub fn features_for(&self, available: wgpu::Features) -> wgpu::Features {
        self.required_features | (available & self.optional_features)
    }

    /// Optional features the adapter cannot provide.
    pub fn missing_optional(&self, available: wgpu::Features) -> wgpu::Features {
        self.optional_features - available
    }
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            optional_features: wgpu::Features::POLYGON_MODE_LINE
                | wgpu::Features::DEPTH_CLIP_CONTROL,
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
            depth_format: Some(wgpu::TextureFormat::Depth32Float),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_features_only_when_available() {
        let init = GpuInit::default();

        let none = init.features_for(wgpu::Features::empty());
        assert!(none.is_empty());
        assert_eq!(init.missing_optional(wgpu::Features::empty()), init.optional_features);

        let line_only = init.features_for(wgpu::Features::POLYGON_MODE_LINE);
        assert_eq!(line_only, wgpu::Features::POLYGON_MODE_LINE);
        assert_eq!(
            init.missing_optional(wgpu::Features::POLYGON_MODE_LINE),
            wgpu::Features::DEPTH_CLIP_CONTROL
        );
    }
}
