use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use wgpu::util::DeviceExt;

use super::convert::{self, BlendKey, RasterKey};
use super::{MAX_VERTEX_SLOTS, SlotKind};
use crate::backend::{
    BlendDesc, BlendStateId, BufferBinding, BufferDesc, BufferId, BufferUsage, Device,
    DeviceError, GpuObject, InputLayoutId, RasterizerDesc, RasterizerStateId, ResultCode,
    SamplerDesc, SamplerId, ShaderId, ShaderSource, Stage, TextureDesc, TextureId,
    TextureViewId,
};
use crate::vertex::VertexFormat;

/// Attachment formats every render pipeline is built against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TargetFormats {
    pub color: wgpu::TextureFormat,
    pub depth: Option<wgpu::TextureFormat>,
    pub sample_count: u32,
}

enum Resource {
    Buffer {
        buffer: wgpu::Buffer,
        usage: BufferUsage,
        binding: BufferBinding,
        size: u64,
    },
    Texture(wgpu::Texture),
    View(wgpu::TextureView),
    Shader {
        stage: Stage,
        module: wgpu::ShaderModule,
        entry_point: String,
    },
    InputLayout(Vec<&'static VertexFormat>),
    Sampler(wgpu::Sampler),
    Rasterizer(RasterKey),
    Blend(BlendKey),
}

struct Entry {
    label: String,
    depends_on: Vec<GpuObject>,
    resource: Resource,
}

#[derive(Default)]
struct ObjectTable {
    next_id: u64,
    live: HashMap<GpuObject, Entry>,
}

impl ObjectTable {
    fn require_live(&self, object: GpuObject) -> Result<&Entry, DeviceError> {
        match self.live.get(&object) {
            Some(entry) => Ok(entry),
            // Ids are never reused, so an issued id that is not live was released.
            None if (1..=self.next_id).contains(&object.raw()) => {
                Err(DeviceError::AlreadyReleased(object))
            }
            None => Err(DeviceError::UnknownObject(object)),
        }
    }
}

/// Bind group layout of one stage: visibility plus sorted `(binding, kind)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct GroupLayoutKey {
    pub visibility: wgpu::ShaderStages,
    pub entries: Vec<(u32, SlotKind)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct RenderPipelineKey {
    pub vertex: ShaderId,
    pub pixel: Option<ShaderId>,
    pub input_layout: InputLayoutId,
    pub topology: wgpu::PrimitiveTopology,
    pub raster: RasterKey,
    pub blend: BlendKey,
    pub sample_mask: u32,
    pub groups: [GroupLayoutKey; 2],
    pub targets: TargetFormats,
}

impl RenderPipelineKey {
    fn references(&self, object: GpuObject) -> bool {
        match object {
            GpuObject::Shader(id) => self.vertex == id || self.pixel == Some(id),
            GpuObject::InputLayout(id) => self.input_layout == id,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct ComputePipelineKey {
    pub shader: ShaderId,
    pub group: GroupLayoutKey,
}

#[derive(Default)]
struct PipelineCache {
    group_layouts: HashMap<GroupLayoutKey, wgpu::BindGroupLayout>,
    render: HashMap<RenderPipelineKey, wgpu::RenderPipeline>,
    compute: HashMap<ComputePipelineKey, wgpu::ComputePipeline>,
}

/// Buffer as seen by the recording context.
pub(super) struct BufferInfo {
    pub buffer: wgpu::Buffer,
    pub usage: BufferUsage,
    pub binding: BufferBinding,
    pub size: u64,
}

/// `Device` over a wgpu device and queue.
///
/// Every created object lives in a table keyed by its handle, with the
/// handles it depends on. Release order is enforced the same way the mock
/// enforces it.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    targets: Cell<TargetFormats>,
    objects: RefCell<ObjectTable>,
    cache: RefCell<PipelineCache>,
    discarded_frames: Cell<u64>,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, targets: TargetFormats) -> Self {
        log::debug!(
            "wgpu backend: color {:?}, depth {:?}, {} sample(s), features {:?}",
            targets.color,
            targets.depth,
            targets.sample_count,
            device.features()
        );
        Self {
            device,
            queue,
            targets: Cell::new(targets),
            objects: RefCell::new(ObjectTable::default()),
            cache: RefCell::new(PipelineCache::default()),
            discarded_frames: Cell::new(0),
        }
    }

    pub fn wgpu_device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn targets(&self) -> TargetFormats {
        self.targets.get()
    }

    /// Switches attachment formats, e.g. after the surface was reconfigured.
    /// Cached render pipelines built for the old formats are dropped.
    pub fn set_targets(&self, targets: TargetFormats) {
        if self.targets.replace(targets) != targets {
            self.cache.borrow_mut().render.clear();
        }
    }

    /// Frames whose context was dropped before [`WgpuContext::finish`](super::WgpuContext::finish).
    pub fn discarded_frames(&self) -> u64 {
        self.discarded_frames.get()
    }

    pub(super) fn note_discarded(&self) {
        self.discarded_frames.set(self.discarded_frames.get() + 1);
    }

    pub fn live_count(&self) -> usize {
        self.objects.borrow().live.len()
    }

    fn insert(
        &self,
        label: &str,
        depends_on: Vec<GpuObject>,
        resource: Resource,
        make: impl FnOnce(u64) -> GpuObject,
    ) -> GpuObject {
        let mut objects = self.objects.borrow_mut();
        objects.next_id += 1;
        let object = make(objects.next_id);
        objects.live.insert(
            object,
            Entry {
                label: label.to_string(),
                depends_on,
                resource,
            },
        );
        log::trace!("wgpu: created {object} `{label}`");
        object
    }

    // ── lookups used while recording ─────────────────────────────────────────

    pub(super) fn buffer(&self, id: BufferId) -> Result<BufferInfo, DeviceError> {
        let objects = self.objects.borrow();
        match &objects.require_live(id.into())?.resource {
            Resource::Buffer {
                buffer,
                usage,
                binding,
                size,
            } => Ok(BufferInfo {
                buffer: buffer.clone(),
                usage: *usage,
                binding: *binding,
                size: *size,
            }),
            _ => Err(DeviceError::UnknownObject(id.into())),
        }
    }

    pub(super) fn view(&self, id: TextureViewId) -> Result<wgpu::TextureView, DeviceError> {
        let objects = self.objects.borrow();
        match &objects.require_live(id.into())?.resource {
            Resource::View(view) => Ok(view.clone()),
            _ => Err(DeviceError::UnknownObject(id.into())),
        }
    }

    pub(super) fn sampler(&self, id: SamplerId) -> Result<wgpu::Sampler, DeviceError> {
        let objects = self.objects.borrow();
        match &objects.require_live(id.into())?.resource {
            Resource::Sampler(sampler) => Ok(sampler.clone()),
            _ => Err(DeviceError::UnknownObject(id.into())),
        }
    }

    pub(super) fn shader(
        &self,
        id: ShaderId,
    ) -> Result<(Stage, wgpu::ShaderModule, String), DeviceError> {
        let objects = self.objects.borrow();
        match &objects.require_live(id.into())?.resource {
            Resource::Shader {
                stage,
                module,
                entry_point,
            } => Ok((*stage, module.clone(), entry_point.clone())),
            _ => Err(DeviceError::UnknownObject(id.into())),
        }
    }

    pub(super) fn input_layout(
        &self,
        id: InputLayoutId,
    ) -> Result<Vec<&'static VertexFormat>, DeviceError> {
        let objects = self.objects.borrow();
        match &objects.require_live(id.into())?.resource {
            Resource::InputLayout(slots) => Ok(slots.clone()),
            _ => Err(DeviceError::UnknownObject(id.into())),
        }
    }

    pub(super) fn raster_key(&self, id: Option<RasterizerStateId>) -> Result<RasterKey, DeviceError> {
        let Some(id) = id else {
            return Ok(RasterKey::DEFAULT);
        };
        let objects = self.objects.borrow();
        match &objects.require_live(id.into())?.resource {
            Resource::Rasterizer(key) => Ok(*key),
            _ => Err(DeviceError::UnknownObject(id.into())),
        }
    }

    pub(super) fn blend_key(&self, id: Option<BlendStateId>) -> Result<BlendKey, DeviceError> {
        let Some(id) = id else {
            return Ok(BlendKey::DEFAULT);
        };
        let objects = self.objects.borrow();
        match &objects.require_live(id.into())?.resource {
            Resource::Blend(key) => Ok(*key),
            _ => Err(DeviceError::UnknownObject(id.into())),
        }
    }

    // ── pipeline cache ───────────────────────────────────────────────────────

    pub(super) fn group_layout(&self, key: &GroupLayoutKey) -> wgpu::BindGroupLayout {
        if let Some(layout) = self.cache.borrow().group_layouts.get(key) {
            return layout.clone();
        }

        let entries: Vec<wgpu::BindGroupLayoutEntry> = key
            .entries
            .iter()
            .map(|&(binding, kind)| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: key.visibility,
                ty: binding_type(kind),
                count: None,
            })
            .collect();
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("stagecraft stage slots"),
                entries: &entries,
            });

        self.cache
            .borrow_mut()
            .group_layouts
            .insert(key.clone(), layout.clone());
        layout
    }

    pub(super) fn render_pipeline(
        &self,
        key: &RenderPipelineKey,
    ) -> Result<wgpu::RenderPipeline, DeviceError> {
        if let Some(pipeline) = self.cache.borrow().render.get(key) {
            return Ok(pipeline.clone());
        }

        let (_, vs_module, vs_entry) = self.shader(key.vertex)?;
        let pixel = key.pixel.map(|id| self.shader(id)).transpose()?;
        let slots = self.input_layout(key.input_layout)?;

        let groups = [self.group_layout(&key.groups[0]), self.group_layout(&key.groups[1])];
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("stagecraft pipeline layout"),
                bind_group_layouts: &[&groups[0], &groups[1]],
                immediate_size: 0,
            });

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = slots
            .iter()
            .map(|format| {
                format
                    .elements
                    .iter()
                    .map(|e| wgpu::VertexAttribute {
                        format: convert::vertex_format(e.format),
                        offset: u64::from(e.offset),
                        shader_location: e.location,
                    })
                    .collect()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = slots
            .iter()
            .zip(&attributes)
            .map(|(format, attributes)| wgpu::VertexBufferLayout {
                array_stride: u64::from(format.stride),
                step_mode: convert::step_mode(format.step),
                attributes,
            })
            .collect();

        let samples = key.targets.sample_count.max(1);
        if key.blend.alpha_to_coverage && samples == 1 {
            log::warn!("alpha-to-coverage ignored on a single-sampled target");
        }

        let targets = [Some(wgpu::ColorTargetState {
            format: key.targets.color,
            blend: key.blend.blend,
            write_mask: key.blend.write_mask,
        })];
        let fragment = pixel.as_ref().map(|(_, module, entry)| wgpu::FragmentState {
            module,
            entry_point: Some(entry.as_str()),
            compilation_options: Default::default(),
            targets: &targets,
        });

        let label = format!("stagecraft pipeline {} {:?}", key.vertex, key.pixel);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &vs_module,
                    entry_point: Some(vs_entry.as_str()),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                fragment,
                primitive: wgpu::PrimitiveState {
                    topology: key.topology,
                    strip_index_format: None,
                    front_face: key.raster.front_face,
                    cull_mode: key.raster.cull_mode,
                    polygon_mode: key.raster.polygon_mode,
                    unclipped_depth: key.raster.unclipped_depth,
                    conservative: false,
                },
                depth_stencil: key.targets.depth.map(|format| wgpu::DepthStencilState {
                    format,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: samples,
                    mask: u64::from(key.sample_mask),
                    alpha_to_coverage_enabled: key.blend.alpha_to_coverage && samples > 1,
                },
                multiview_mask: None,
                cache: None,
            });

        log::debug!("built {label}");
        self.cache
            .borrow_mut()
            .render
            .insert(key.clone(), pipeline.clone());
        Ok(pipeline)
    }

    pub(super) fn compute_pipeline(
        &self,
        key: &ComputePipelineKey,
    ) -> Result<wgpu::ComputePipeline, DeviceError> {
        if let Some(pipeline) = self.cache.borrow().compute.get(key) {
            return Ok(pipeline.clone());
        }

        let (_, module, entry) = self.shader(key.shader)?;
        let group = self.group_layout(&key.group);
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("stagecraft compute layout"),
                bind_group_layouts: &[&group],
                immediate_size: 0,
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("stagecraft compute pipeline"),
                layout: Some(&layout),
                module: &module,
                entry_point: Some(entry.as_str()),
                compilation_options: Default::default(),
                cache: None,
            });

        self.cache
            .borrow_mut()
            .compute
            .insert(key.clone(), pipeline.clone());
        Ok(pipeline)
    }

    pub(super) fn create_bind_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        entries: &[wgpu::BindGroupEntry<'_>],
    ) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stagecraft stage bindings"),
            layout,
            entries,
        })
    }

    pub(super) fn create_staging(&self, bytes: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("stagecraft upload"),
                contents: bytes,
                usage: wgpu::BufferUsages::COPY_SRC,
            })
    }

    pub(super) fn create_encoder(&self) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("stagecraft frame encoder"),
            })
    }
}

fn binding_type(kind: SlotKind) -> wgpu::BindingType {
    match kind {
        SlotKind::Constant => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        SlotKind::Texture => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        SlotKind::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        SlotKind::Storage => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
    }
}

fn buffer_usages(desc: &BufferDesc<'_>) -> wgpu::BufferUsages {
    let binding = match desc.binding {
        BufferBinding::Vertex => wgpu::BufferUsages::VERTEX,
        BufferBinding::Index => wgpu::BufferUsages::INDEX,
        BufferBinding::Constant => wgpu::BufferUsages::UNIFORM,
        // Compute output may feed a later draw as instance data.
        BufferBinding::Storage => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX,
    };
    match desc.usage {
        BufferUsage::Immutable => binding,
        BufferUsage::Dynamic => binding | wgpu::BufferUsages::COPY_DST,
    }
}

/// Buffer sizes are padded to the copy alignment so uploads can always be
/// expressed as buffer-to-buffer copies.
pub(super) fn padded_size(size: u64) -> u64 {
    size.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}

impl Device for WgpuDevice {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn create_buffer(
        &self,
        desc: &BufferDesc<'_>,
        contents: Option<&[u8]>,
    ) -> Result<BufferId, DeviceError> {
        const CALL: &str = "create_buffer";
        if desc.byte_width == 0 {
            return Err(DeviceError::call(
                CALL,
                ResultCode::InvalidArgument,
                format!("`{}` has zero size", desc.label),
            ));
        }

        let limits = self.device.limits();
        let size = padded_size(desc.byte_width);
        let binding_limit = match desc.binding {
            BufferBinding::Constant => u64::from(limits.max_uniform_buffer_binding_size),
            BufferBinding::Storage => u64::from(limits.max_storage_buffer_binding_size),
            BufferBinding::Vertex | BufferBinding::Index => limits.max_buffer_size,
        };
        if size > limits.max_buffer_size.min(binding_limit) {
            return Err(DeviceError::call(
                CALL,
                ResultCode::LimitExceeded,
                format!("`{}`: {} bytes", desc.label, desc.byte_width),
            ));
        }

        let usage = buffer_usages(desc);
        let buffer = match (desc.usage, contents) {
            (_, Some(bytes)) if bytes.len() as u64 > desc.byte_width => {
                return Err(DeviceError::call(
                    CALL,
                    ResultCode::InvalidArgument,
                    format!(
                        "`{}`: {} bytes of data for {} bytes",
                        desc.label,
                        bytes.len(),
                        desc.byte_width
                    ),
                ));
            }
            (BufferUsage::Immutable, None) => {
                return Err(DeviceError::call(
                    CALL,
                    ResultCode::InvalidArgument,
                    format!("immutable buffer `{}` needs initial data", desc.label),
                ));
            }
            (_, Some(bytes)) => {
                let mut data = bytes.to_vec();
                data.resize(size as usize, 0);
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(desc.label),
                        contents: &data,
                        usage,
                    })
            }
            (BufferUsage::Dynamic, None) => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size,
                usage,
                mapped_at_creation: false,
            }),
        };

        let resource = Resource::Buffer {
            buffer,
            usage: desc.usage,
            binding: desc.binding,
            size: desc.byte_width,
        };
        let object = self.insert(desc.label, Vec::new(), resource, |id| {
            BufferId::from_raw(id).into()
        });
        Ok(BufferId::from_raw(object.raw()))
    }

    fn create_texture(
        &self,
        desc: &TextureDesc<'_>,
        texels: &[u8],
    ) -> Result<TextureId, DeviceError> {
        const CALL: &str = "create_texture";
        if desc.width == 0 || desc.height == 0 || texels.len() != desc.byte_len() {
            return Err(DeviceError::call(
                CALL,
                ResultCode::InvalidArgument,
                format!(
                    "`{}`: {}x{} with {} bytes of texels",
                    desc.label,
                    desc.width,
                    desc.height,
                    texels.len()
                ),
            ));
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width > max || desc.height > max {
            return Err(DeviceError::call(
                CALL,
                ResultCode::LimitExceeded,
                format!("`{}`: {}x{} exceeds {max}", desc.label, desc.width, desc.height),
            ));
        }

        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert::texture_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * desc.format.bytes_per_texel()),
                rows_per_image: Some(desc.height),
            },
            size,
        );

        let object = self.insert(desc.label, Vec::new(), Resource::Texture(texture), |id| {
            TextureId::from_raw(id).into()
        });
        Ok(TextureId::from_raw(object.raw()))
    }

    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, DeviceError> {
        let (label, view) = {
            let objects = self.objects.borrow();
            let entry = objects.require_live(texture.into())?;
            let Resource::Texture(tex) = &entry.resource else {
                return Err(DeviceError::UnknownObject(texture.into()));
            };
            let label = format!("{} view", entry.label);
            let view = tex.create_view(&wgpu::TextureViewDescriptor {
                label: Some(&label),
                ..Default::default()
            });
            (label, view)
        };

        let object = self.insert(&label, vec![texture.into()], Resource::View(view), |id| {
            TextureViewId::from_raw(id).into()
        });
        Ok(TextureViewId::from_raw(object.raw()))
    }

    fn create_shader(
        &self,
        stage: Stage,
        source: &ShaderSource<'_>,
    ) -> Result<ShaderId, DeviceError> {
        const CALL: &str = "create_shader";
        if matches!(stage, Stage::Hull | Stage::Domain) {
            return Err(DeviceError::call(
                CALL,
                ResultCode::Unsupported,
                format!("`{}`: wgpu has no {stage} stage", source.label),
            ));
        }
        if source.wgsl.trim().is_empty() || source.entry_point.is_empty() {
            return Err(DeviceError::call(
                CALL,
                ResultCode::InvalidArgument,
                format!("`{}` has no program text or entry point", source.label),
            ));
        }
        if !source.wgsl.contains(&format!("fn {}", source.entry_point)) {
            return Err(DeviceError::call(
                CALL,
                ResultCode::InvalidArgument,
                format!("`{}` does not define `{}`", source.label, source.entry_point),
            ));
        }

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(source.label),
                source: wgpu::ShaderSource::Wgsl(source.wgsl.into()),
            });

        let resource = Resource::Shader {
            stage,
            module,
            entry_point: source.entry_point.to_string(),
        };
        let object = self.insert(source.label, Vec::new(), resource, |id| {
            ShaderId::from_raw(id).into()
        });
        Ok(ShaderId::from_raw(object.raw()))
    }

    fn create_input_layout(
        &self,
        label: &str,
        slots: &[&'static VertexFormat],
        vertex_shader: ShaderId,
    ) -> Result<InputLayoutId, DeviceError> {
        const CALL: &str = "create_input_layout";
        let (stage, _, _) = self.shader(vertex_shader)?;
        if stage != Stage::Vertex {
            return Err(DeviceError::call(
                CALL,
                ResultCode::InvalidArgument,
                format!("{vertex_shader} is not a vertex shader"),
            ));
        }

        let max_slots = self.device.limits().max_vertex_buffers.min(MAX_VERTEX_SLOTS);
        if slots.is_empty() || slots.len() as u32 > max_slots {
            return Err(DeviceError::call(
                CALL,
                ResultCode::LimitExceeded,
                format!("`{label}`: {} buffer slots, at most {max_slots}", slots.len()),
            ));
        }
        for format in slots {
            format.validate().map_err(|e| {
                DeviceError::call(CALL, ResultCode::InvalidArgument, e.to_string())
            })?;
        }

        let object = self.insert(
            label,
            vec![vertex_shader.into()],
            Resource::InputLayout(slots.to_vec()),
            |id| InputLayoutId::from_raw(id).into(),
        );
        Ok(InputLayoutId::from_raw(object.raw()))
    }

    fn create_sampler(&self, desc: &SamplerDesc<'_>) -> Result<SamplerId, DeviceError> {
        if desc.max_anisotropy > 16 {
            return Err(DeviceError::call(
                "create_sampler",
                ResultCode::LimitExceeded,
                format!("max anisotropy {} > 16", desc.max_anisotropy),
            ));
        }
        let sampler = self.device.create_sampler(&convert::sampler_descriptor(
            desc.label,
            desc.filter,
            desc.address,
            desc.max_anisotropy,
        ));
        let object = self.insert(desc.label, Vec::new(), Resource::Sampler(sampler), |id| {
            SamplerId::from_raw(id).into()
        });
        Ok(SamplerId::from_raw(object.raw()))
    }

    fn create_rasterizer_state(
        &self,
        desc: &RasterizerDesc<'_>,
    ) -> Result<RasterizerStateId, DeviceError> {
        let (key, downgraded) = RasterKey::from_desc(desc, self.device.features());
        for what in downgraded {
            log::warn!("rasterizer `{}`: {what} not supported by this device", desc.label);
        }
        let object = self.insert(desc.label, Vec::new(), Resource::Rasterizer(key), |id| {
            RasterizerStateId::from_raw(id).into()
        });
        Ok(RasterizerStateId::from_raw(object.raw()))
    }

    fn create_blend_state(&self, desc: &BlendDesc<'_>) -> Result<BlendStateId, DeviceError> {
        let key = BlendKey::from_desc(desc);
        let object = self.insert(desc.label, Vec::new(), Resource::Blend(key), |id| {
            BlendStateId::from_raw(id).into()
        });
        Ok(BlendStateId::from_raw(object.raw()))
    }

    fn release(&self, object: GpuObject) -> Result<(), DeviceError> {
        let entry = {
            let mut objects = self.objects.borrow_mut();
            objects.require_live(object)?;

            let dependents: Vec<GpuObject> = objects
                .live
                .iter()
                .filter(|(_, e)| e.depends_on.contains(&object))
                .map(|(k, _)| *k)
                .collect();
            if !dependents.is_empty() {
                return Err(DeviceError::StillReferenced { object, dependents });
            }

            objects.live.remove(&object)
        };

        if matches!(object, GpuObject::Shader(_) | GpuObject::InputLayout(_)) {
            let mut cache = self.cache.borrow_mut();
            cache.render.retain(|key, _| !key.references(object));
            if let GpuObject::Shader(id) = object {
                cache.compute.retain(|key, _| key.shader != id);
            }
        }

        // Recorded commands keep their own references, so dropping the
        // entry never invalidates a frame still being encoded.
        if let Some(entry) = entry {
            log::trace!("wgpu: released {object} `{}`", entry.label);
        }
        Ok(())
    }
}
