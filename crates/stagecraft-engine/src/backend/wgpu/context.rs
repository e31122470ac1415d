use std::collections::BTreeMap;
use std::ops::Range;
use std::rc::Rc;

use super::convert;
use super::device::{ComputePipelineKey, GroupLayoutKey, RenderPipelineKey, WgpuDevice, padded_size};
use super::{MAX_VERTEX_SLOTS, SlotKind};
use crate::backend::{
    BlendStateId, BufferBinding, BufferId, BufferUsage, CommandContext, DeviceError,
    IndexFormat, InputLayoutId, RasterizerStateId, ResultCode, SamplerId, ShaderId, Stage,
    TextureViewId, Topology, VertexBufferBinding,
};

/// Attachments a frame renders into.
///
/// The first render pass of the frame clears both attachments; later passes
/// load what earlier ones wrote.
pub struct RenderTarget {
    pub color: wgpu::TextureView,
    pub depth: Option<wgpu::TextureView>,
    pub clear: wgpu::Color,
}

#[derive(Default, Clone)]
struct StageSlots {
    constants: BTreeMap<u32, BufferId>,
    resources: BTreeMap<u32, TextureViewId>,
    samplers: BTreeMap<u32, SamplerId>,
}

/// Everything set through the context, as an immediate device context keeps it.
struct Bound {
    input_layout: Option<InputLayoutId>,
    topology: Topology,
    vertex_buffers: BTreeMap<u32, VertexBufferBinding>,
    index: Option<(BufferId, IndexFormat, u32)>,
    shaders: BTreeMap<Stage, ShaderId>,
    slots: BTreeMap<Stage, StageSlots>,
    storage: BTreeMap<u32, BufferId>,
    rasterizer: Option<RasterizerStateId>,
    blend: Option<BlendStateId>,
    blend_factor: [f32; 4],
    sample_mask: u32,
}

impl Default for Bound {
    fn default() -> Self {
        Self {
            input_layout: None,
            topology: Topology::TriangleList,
            vertex_buffers: BTreeMap::new(),
            index: None,
            shaders: BTreeMap::new(),
            slots: BTreeMap::new(),
            storage: BTreeMap::new(),
            rasterizer: None,
            blend: None,
            blend_factor: [1.0; 4],
            sample_mask: u32::MAX,
        }
    }
}

enum BoundResource {
    Buffer(wgpu::Buffer),
    View(wgpu::TextureView),
    Sampler(wgpu::Sampler),
}

enum DrawCall {
    Vertices {
        vertices: Range<u32>,
    },
    Indexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

struct DrawPacket {
    pipeline: wgpu::RenderPipeline,
    bind_groups: [wgpu::BindGroup; 2],
    vertex_buffers: Vec<(wgpu::Buffer, u64)>,
    index: Option<(wgpu::Buffer, wgpu::IndexFormat, u64)>,
    blend_constant: Option<wgpu::Color>,
    call: DrawCall,
}

struct DispatchPacket {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    groups: [u32; 3],
}

enum Segment {
    Copy {
        staging: wgpu::Buffer,
        target: wgpu::Buffer,
        size: u64,
    },
    Draw(DrawPacket),
    Dispatch(DispatchPacket),
}

/// Records one frame against a [`WgpuDevice`].
///
/// Calls are validated and resolved as they arrive. Nothing reaches the GPU
/// until [`finish`](Self::finish) encodes the recorded segments in order.
pub struct WgpuContext {
    device: Rc<WgpuDevice>,
    target: RenderTarget,
    frame: u64,
    bound: Bound,
    segments: Vec<Segment>,
    draws: u32,
    finished: bool,
}

fn invalid(call: &'static str, detail: impl Into<String>) -> DeviceError {
    DeviceError::call(call, ResultCode::InvalidArgument, detail)
}

fn check_slots(call: &'static str, kind: SlotKind, first: u32, count: usize) -> Result<(), DeviceError> {
    let end = u64::from(first) + count as u64;
    if end > u64::from(kind.max_slots()) {
        return Err(invalid(
            call,
            format!("slots {first}..{end} past the {} available", kind.max_slots()),
        ));
    }
    Ok(())
}

fn check_stage(call: &'static str, stage: Stage) -> Result<(), DeviceError> {
    match stage {
        Stage::Hull | Stage::Domain => Err(DeviceError::call(
            call,
            ResultCode::Unsupported,
            format!("wgpu has no {stage} stage"),
        )),
        _ => Ok(()),
    }
}

impl WgpuContext {
    pub fn new(device: Rc<WgpuDevice>, target: RenderTarget, frame: u64) -> Self {
        Self {
            device,
            target,
            frame,
            bound: Bound::default(),
            segments: Vec::new(),
            draws: 0,
            finished: false,
        }
    }

    /// Draws recorded so far.
    pub fn draw_count(&self) -> u32 {
        self.draws
    }

    fn slots_mut(&mut self, stage: Stage) -> &mut StageSlots {
        self.bound.slots.entry(stage).or_default()
    }

    fn bound_buffer(
        &self,
        call: &'static str,
        buffer: BufferId,
        allowed: &[BufferBinding],
    ) -> Result<wgpu::Buffer, DeviceError> {
        let info = self.device.buffer(buffer)?;
        if !allowed.contains(&info.binding) {
            return Err(invalid(
                call,
                format!("{buffer} is a {:?} buffer", info.binding),
            ));
        }
        Ok(info.buffer)
    }

    /// Layout key and resources of one stage's bind group, sorted by binding.
    fn stage_group(
        &self,
        stage: Stage,
    ) -> Result<(GroupLayoutKey, Vec<(u32, BoundResource)>), DeviceError> {
        let visibility = match stage {
            Stage::Vertex => wgpu::ShaderStages::VERTEX,
            Stage::Pixel => wgpu::ShaderStages::FRAGMENT,
            Stage::Compute => wgpu::ShaderStages::COMPUTE,
            Stage::Hull | Stage::Domain => wgpu::ShaderStages::NONE,
        };

        let mut entries = Vec::new();
        let mut resources = Vec::new();
        if let Some(slots) = self.bound.slots.get(&stage) {
            for (&slot, &id) in &slots.constants {
                let binding = SlotKind::Constant.base() + slot;
                entries.push((binding, SlotKind::Constant));
                resources.push((binding, BoundResource::Buffer(self.device.buffer(id)?.buffer)));
            }
            for (&slot, &id) in &slots.resources {
                let binding = SlotKind::Texture.base() + slot;
                entries.push((binding, SlotKind::Texture));
                resources.push((binding, BoundResource::View(self.device.view(id)?)));
            }
            for (&slot, &id) in &slots.samplers {
                let binding = SlotKind::Sampler.base() + slot;
                entries.push((binding, SlotKind::Sampler));
                resources.push((binding, BoundResource::Sampler(self.device.sampler(id)?)));
            }
        }
        if stage == Stage::Compute {
            for (&slot, &id) in &self.bound.storage {
                let binding = SlotKind::Storage.base() + slot;
                entries.push((binding, SlotKind::Storage));
                resources.push((binding, BoundResource::Buffer(self.device.buffer(id)?.buffer)));
            }
        }

        Ok((GroupLayoutKey { visibility, entries }, resources))
    }

    fn bind_group(&self, key: &GroupLayoutKey, resources: &[(u32, BoundResource)]) -> wgpu::BindGroup {
        let layout = self.device.group_layout(key);
        let entries: Vec<wgpu::BindGroupEntry<'_>> = resources
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    BoundResource::Buffer(buffer) => buffer.as_entire_binding(),
                    BoundResource::View(view) => wgpu::BindingResource::TextureView(view),
                    BoundResource::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();
        self.device.create_bind_group(&layout, &entries)
    }

    fn record_draw(&mut self, call: &'static str, draw: DrawCall) -> Result<(), DeviceError> {
        for stage in [Stage::Hull, Stage::Domain] {
            if self.bound.shaders.contains_key(&stage) {
                check_stage(call, stage)?;
            }
        }
        let vertex = self
            .bound
            .shaders
            .get(&Stage::Vertex)
            .copied()
            .ok_or_else(|| invalid(call, "no vertex shader bound"))?;
        let input_layout = self
            .bound
            .input_layout
            .ok_or_else(|| invalid(call, "no input layout bound"))?;
        let topology = convert::topology(self.bound.topology).ok_or_else(|| {
            DeviceError::call(call, ResultCode::Unsupported, "patch lists need tessellation")
        })?;

        let formats = self.device.input_layout(input_layout)?;
        let mut vertex_buffers = Vec::with_capacity(formats.len());
        for (slot, format) in formats.iter().enumerate() {
            let Some(binding) = self.bound.vertex_buffers.get(&(slot as u32)) else {
                return Err(invalid(call, format!("vertex slot {slot} ({}) is empty", format.name)));
            };
            if binding.stride != format.stride {
                return Err(invalid(
                    call,
                    format!(
                        "vertex slot {slot}: stride {} bound for {}",
                        binding.stride, format
                    ),
                ));
            }
            let buffer = self.device.buffer(binding.buffer)?.buffer;
            vertex_buffers.push((buffer, u64::from(binding.offset)));
        }

        let index = match draw {
            DrawCall::Vertices { .. } => None,
            DrawCall::Indexed { .. } => {
                let (id, format, offset) = self
                    .bound
                    .index
                    .ok_or_else(|| invalid(call, "no index buffer bound"))?;
                let buffer = self.device.buffer(id)?.buffer;
                Some((buffer, convert::index_format(format), u64::from(offset)))
            }
        };

        let (vertex_group, vertex_resources) = self.stage_group(Stage::Vertex)?;
        let (pixel_group, pixel_resources) = self.stage_group(Stage::Pixel)?;
        let blend = self.device.blend_key(self.bound.blend)?;

        let key = RenderPipelineKey {
            vertex,
            pixel: self.bound.shaders.get(&Stage::Pixel).copied(),
            input_layout,
            topology,
            raster: self.device.raster_key(self.bound.rasterizer)?,
            blend,
            sample_mask: self.bound.sample_mask,
            groups: [vertex_group, pixel_group],
            targets: self.device.targets(),
        };
        let pipeline = self.device.render_pipeline(&key)?;
        let bind_groups = [
            self.bind_group(&key.groups[0], &vertex_resources),
            self.bind_group(&key.groups[1], &pixel_resources),
        ];

        let packet = DrawPacket {
            pipeline,
            bind_groups,
            vertex_buffers,
            index,
            blend_constant: blend
                .uses_constant()
                .then(|| convert::color(self.bound.blend_factor)),
            call: draw,
        };
        self.segments.push(Segment::Draw(packet));
        self.draws += 1;
        Ok(())
    }

    /// Encodes every recorded segment into one command buffer.
    ///
    /// Consecutive draws share a render pass. Uploads and dispatches between
    /// draws split the pass so they land in submission order.
    pub fn finish(mut self) -> wgpu::CommandBuffer {
        self.finished = true;
        let segments = std::mem::take(&mut self.segments);
        let (target, frame, draws) = (&self.target, self.frame, self.draws);

        let mut encoder = self.device.create_encoder();
        let mut cleared = false;
        let mut passes = 0u32;
        let mut segments = segments.into_iter().peekable();

        while let Some(segment) = segments.next() {
            match segment {
                Segment::Copy {
                    staging,
                    target: destination,
                    size,
                } => encoder.copy_buffer_to_buffer(&staging, 0, &destination, 0, size),
                Segment::Dispatch(dispatch) => encode_dispatch(&mut encoder, &dispatch),
                Segment::Draw(first) => {
                    let mut batch = vec![first];
                    while let Some(Segment::Draw(_)) = segments.peek() {
                        if let Some(Segment::Draw(next)) = segments.next() {
                            batch.push(next);
                        }
                    }
                    encode_pass(&mut encoder, target, &batch, !cleared);
                    cleared = true;
                    passes += 1;
                }
            }
        }

        if !cleared {
            encode_pass(&mut encoder, target, &[], true);
            passes += 1;
        }

        log::trace!("frame {frame}: {draws} draw(s) in {passes} pass(es)");
        encoder.finish()
    }
}

impl Drop for WgpuContext {
    fn drop(&mut self) {
        if !self.finished {
            self.device.note_discarded();
            log::debug!(
                "frame {}: discarded {} recorded segment(s)",
                self.frame,
                self.segments.len()
            );
        }
    }
}

fn load_op<V>(clear: bool, value: V) -> wgpu::LoadOp<V> {
    if clear {
        wgpu::LoadOp::Clear(value)
    } else {
        wgpu::LoadOp::Load
    }
}

fn encode_pass(
    encoder: &mut wgpu::CommandEncoder,
    target: &RenderTarget,
    draws: &[DrawPacket],
    clear: bool,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("stagecraft pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &target.color,
            resolve_target: None,
            ops: wgpu::Operations {
                load: load_op(clear, target.clear),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: target.depth.as_ref().map(|view| {
            wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: load_op(clear, 1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });

    for draw in draws {
        pass.set_pipeline(&draw.pipeline);
        for (group, bind_group) in draw.bind_groups.iter().enumerate() {
            pass.set_bind_group(group as u32, bind_group, &[]);
        }
        for (slot, (buffer, offset)) in draw.vertex_buffers.iter().enumerate() {
            pass.set_vertex_buffer(slot as u32, buffer.slice(*offset..));
        }
        if let Some((buffer, format, offset)) = &draw.index {
            pass.set_index_buffer(buffer.slice(*offset..), *format);
        }
        if let Some(constant) = draw.blend_constant {
            pass.set_blend_constant(constant);
        }
        match &draw.call {
            DrawCall::Vertices { vertices } => pass.draw(vertices.clone(), 0..1),
            DrawCall::Indexed {
                indices,
                base_vertex,
                instances,
            } => pass.draw_indexed(indices.clone(), *base_vertex, instances.clone()),
        }
    }
}

fn encode_dispatch(encoder: &mut wgpu::CommandEncoder, dispatch: &DispatchPacket) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("stagecraft dispatch"),
        timestamp_writes: None,
    });
    pass.set_pipeline(&dispatch.pipeline);
    pass.set_bind_group(0, &dispatch.bind_group, &[]);
    let [x, y, z] = dispatch.groups;
    pass.dispatch_workgroups(x, y, z);
}

impl CommandContext for WgpuContext {
    fn frame_index(&self) -> u64 {
        self.frame
    }

    fn discarded_frames(&self) -> u64 {
        self.device.discarded_frames()
    }

    fn update_buffer(&mut self, buffer: BufferId, bytes: &[u8]) -> Result<(), DeviceError> {
        const CALL: &str = "update_buffer";
        let info = self.device.buffer(buffer)?;
        if info.usage != BufferUsage::Dynamic {
            return Err(invalid(CALL, format!("{buffer} is immutable")));
        }
        if bytes.len() as u64 > info.size {
            return Err(invalid(
                CALL,
                format!("{} bytes written into a {} byte buffer", bytes.len(), info.size),
            ));
        }
        if bytes.is_empty() {
            return Ok(());
        }

        let mut data = bytes.to_vec();
        data.resize(padded_size(bytes.len() as u64) as usize, 0);
        let staging = self.device.create_staging(&data);
        self.segments.push(Segment::Copy {
            staging,
            target: info.buffer,
            size: data.len() as u64,
        });
        Ok(())
    }

    fn set_input_layout(&mut self, layout: Option<InputLayoutId>) -> Result<(), DeviceError> {
        if let Some(id) = layout {
            self.device.input_layout(id)?;
        }
        self.bound.input_layout = layout;
        Ok(())
    }

    fn set_primitive_topology(&mut self, topology: Topology) -> Result<(), DeviceError> {
        if convert::topology(topology).is_none() {
            return Err(DeviceError::call(
                "set_primitive_topology",
                ResultCode::Unsupported,
                format!("{topology:?} needs tessellation"),
            ));
        }
        self.bound.topology = topology;
        Ok(())
    }

    fn set_vertex_buffers(
        &mut self,
        first_slot: u32,
        buffers: &[VertexBufferBinding],
    ) -> Result<(), DeviceError> {
        const CALL: &str = "set_vertex_buffers";
        if u64::from(first_slot) + buffers.len() as u64 > u64::from(MAX_VERTEX_SLOTS) {
            return Err(invalid(CALL, format!("{} buffers from slot {first_slot}", buffers.len())));
        }
        for binding in buffers {
            self.bound_buffer(CALL, binding.buffer, &[BufferBinding::Vertex, BufferBinding::Storage])?;
        }
        for (i, binding) in buffers.iter().enumerate() {
            self.bound.vertex_buffers.insert(first_slot + i as u32, *binding);
        }
        Ok(())
    }

    fn set_index_buffer(
        &mut self,
        buffer: Option<BufferId>,
        format: IndexFormat,
        offset: u32,
    ) -> Result<(), DeviceError> {
        const CALL: &str = "set_index_buffer";
        let Some(id) = buffer else {
            self.bound.index = None;
            return Ok(());
        };
        self.bound_buffer(CALL, id, &[BufferBinding::Index])?;
        if offset % format.size() != 0 {
            return Err(invalid(CALL, format!("offset {offset} is not {format:?} aligned")));
        }
        self.bound.index = Some((id, format, offset));
        Ok(())
    }

    fn set_shader(&mut self, stage: Stage, shader: Option<ShaderId>) -> Result<(), DeviceError> {
        let Some(id) = shader else {
            self.bound.shaders.remove(&stage);
            return Ok(());
        };
        check_stage("set_shader", stage)?;
        let (created_for, _, _) = self.device.shader(id)?;
        if created_for != stage {
            return Err(invalid(
                "set_shader",
                format!("{id} is a {created_for} shader, bound as {stage}"),
            ));
        }
        self.bound.shaders.insert(stage, id);
        Ok(())
    }

    fn set_constant_buffers(
        &mut self,
        stage: Stage,
        first_slot: u32,
        buffers: &[BufferId],
    ) -> Result<(), DeviceError> {
        const CALL: &str = "set_constant_buffers";
        check_stage(CALL, stage)?;
        check_slots(CALL, SlotKind::Constant, first_slot, buffers.len())?;
        for &id in buffers {
            self.bound_buffer(CALL, id, &[BufferBinding::Constant])?;
        }
        let slots = self.slots_mut(stage);
        for (i, &id) in buffers.iter().enumerate() {
            slots.constants.insert(first_slot + i as u32, id);
        }
        Ok(())
    }

    fn set_shader_resources(
        &mut self,
        stage: Stage,
        first_slot: u32,
        views: &[TextureViewId],
    ) -> Result<(), DeviceError> {
        const CALL: &str = "set_shader_resources";
        check_stage(CALL, stage)?;
        check_slots(CALL, SlotKind::Texture, first_slot, views.len())?;
        for &id in views {
            self.device.view(id)?;
        }
        let slots = self.slots_mut(stage);
        for (i, &id) in views.iter().enumerate() {
            slots.resources.insert(first_slot + i as u32, id);
        }
        Ok(())
    }

    fn set_samplers(
        &mut self,
        stage: Stage,
        first_slot: u32,
        samplers: &[SamplerId],
    ) -> Result<(), DeviceError> {
        const CALL: &str = "set_samplers";
        check_stage(CALL, stage)?;
        check_slots(CALL, SlotKind::Sampler, first_slot, samplers.len())?;
        for &id in samplers {
            self.device.sampler(id)?;
        }
        let slots = self.slots_mut(stage);
        for (i, &id) in samplers.iter().enumerate() {
            slots.samplers.insert(first_slot + i as u32, id);
        }
        Ok(())
    }

    fn set_storage_buffers(
        &mut self,
        first_slot: u32,
        buffers: &[BufferId],
    ) -> Result<(), DeviceError> {
        const CALL: &str = "set_storage_buffers";
        check_slots(CALL, SlotKind::Storage, first_slot, buffers.len())?;
        for &id in buffers {
            self.bound_buffer(CALL, id, &[BufferBinding::Storage])?;
        }
        for (i, &id) in buffers.iter().enumerate() {
            self.bound.storage.insert(first_slot + i as u32, id);
        }
        Ok(())
    }

    fn set_rasterizer_state(
        &mut self,
        state: Option<RasterizerStateId>,
    ) -> Result<(), DeviceError> {
        self.device.raster_key(state)?;
        self.bound.rasterizer = state;
        Ok(())
    }

    fn set_blend_state(
        &mut self,
        state: Option<BlendStateId>,
        blend_factor: [f32; 4],
        sample_mask: u32,
    ) -> Result<(), DeviceError> {
        self.device.blend_key(state)?;
        self.bound.blend = state;
        self.bound.blend_factor = blend_factor;
        self.bound.sample_mask = sample_mask;
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, start_vertex: u32) -> Result<(), DeviceError> {
        self.record_draw(
            "draw",
            DrawCall::Vertices {
                vertices: start_vertex..start_vertex.saturating_add(vertex_count),
            },
        )
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    ) -> Result<(), DeviceError> {
        self.record_draw(
            "draw_indexed",
            DrawCall::Indexed {
                indices: start_index..start_index.saturating_add(index_count),
                base_vertex,
                instances: 0..1,
            },
        )
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) -> Result<(), DeviceError> {
        self.record_draw(
            "draw_indexed_instanced",
            DrawCall::Indexed {
                indices: start_index..start_index.saturating_add(index_count),
                base_vertex,
                instances: start_instance..start_instance.saturating_add(instance_count),
            },
        )
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), DeviceError> {
        const CALL: &str = "dispatch";
        let shader = self
            .bound
            .shaders
            .get(&Stage::Compute)
            .copied()
            .ok_or_else(|| invalid(CALL, "no compute shader bound"))?;

        let max = self.device.wgpu_device().limits().max_compute_workgroups_per_dimension;
        if x > max || y > max || z > max {
            return Err(DeviceError::call(
                CALL,
                ResultCode::LimitExceeded,
                format!("{x}x{y}x{z} groups, at most {max} per dimension"),
            ));
        }

        let (group, resources) = self.stage_group(Stage::Compute)?;
        let key = ComputePipelineKey { shader, group };
        let pipeline = self.device.compute_pipeline(&key)?;
        let bind_group = self.bind_group(&key.group, &resources);

        self.segments.push(Segment::Dispatch(DispatchPacket {
            pipeline,
            bind_group,
            groups: [x, y, z],
        }));
        Ok(())
    }
}
