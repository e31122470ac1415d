//! Recording device for tests and headless runs.
//!
//! `MockDevice` keeps a table of live objects with their dependencies:
//! - an input layout depends on its vertex shader
//! - a texture view depends on its texture
//!
//! Releasing an object that a live object still depends on fails with
//! `DeviceError::StillReferenced`, which makes out-of-order teardown visible.
//!
//! `MockContext` records every bind, upload and draw as a [`Command`].

use std::cell::RefCell;
use std::collections::BTreeMap;

use super::{
    BlendDesc, BlendStateId, BufferBinding, BufferDesc, BufferId, BufferUsage, CommandContext,
    Device, DeviceError, GpuObject, IndexFormat, InputLayoutId, RasterizerDesc,
    RasterizerStateId, ResultCode, SamplerDesc, SamplerId, ShaderId, ShaderSource, Stage,
    TextureDesc, TextureId, TextureViewId, Topology, VertexBufferBinding,
};
use crate::vertex::VertexFormat;

#[derive(Debug, Clone)]
struct LiveObject {
    label: String,
    depends_on: Vec<GpuObject>,
    detail: Detail,
}

#[derive(Debug, Clone)]
enum Detail {
    Buffer {
        usage: BufferUsage,
        binding: BufferBinding,
        contents: Vec<u8>,
    },
    Shader(Stage),
    InputLayout(Vec<&'static VertexFormat>),
    Other,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    call: &'static str,
    label: Option<String>,
    code: ResultCode,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    live: BTreeMap<GpuObject, LiveObject>,
    release_log: Vec<GpuObject>,
    created_total: u64,
    released_total: u64,
    failures: Vec<InjectedFailure>,
    discarded_frames: u64,
}

impl MockState {
    fn take_failure(&mut self, call: &'static str, label: Option<&str>) -> Option<DeviceError> {
        let pos = self.failures.iter().position(|f| {
            f.call == call
                && match (&f.label, label) {
                    (None, _) => true,
                    (Some(want), Some(got)) => want == got,
                    (Some(_), None) => false,
                }
        })?;
        let f = self.failures.remove(pos);
        Some(DeviceError::call(call, f.code, "injected failure"))
    }

    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert(&mut self, object: GpuObject, label: &str, depends_on: Vec<GpuObject>, detail: Detail) {
        self.created_total += 1;
        self.live.insert(
            object,
            LiveObject {
                label: label.to_string(),
                depends_on,
                detail,
            },
        );
    }

    fn require_live(&self, object: GpuObject) -> Result<&LiveObject, DeviceError> {
        match self.live.get(&object) {
            Some(o) => Ok(o),
            // Ids are never reused, so an issued id that is not live was released.
            None if (1..=self.next_id).contains(&object.raw()) => {
                Err(DeviceError::AlreadyReleased(object))
            }
            None => Err(DeviceError::UnknownObject(object)),
        }
    }
}

/// In-memory device that tracks object lifetimes.
#[derive(Default)]
pub struct MockDevice {
    state: RefCell<MockState>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call to `call` fail with `code`.
    ///
    /// `call` is the entry point name, e.g. `"create_texture"` or `"draw_indexed"`.
    pub fn fail_next(&self, call: &'static str, code: ResultCode) {
        self.state.borrow_mut().failures.push(InjectedFailure {
            call,
            label: None,
            code,
        });
    }

    /// Makes the next creation call for the object labelled `label` fail.
    pub fn fail_label(&self, call: &'static str, label: &str, code: ResultCode) {
        self.state.borrow_mut().failures.push(InjectedFailure {
            call,
            label: Some(label.to_string()),
            code,
        });
    }

    pub fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn created_count(&self) -> u64 {
        self.state.borrow().created_total
    }

    pub fn released_count(&self) -> u64 {
        self.state.borrow().released_total
    }

    /// Frames whose recorded commands were discarded through
    /// [`MockContext::discard`].
    pub fn discarded_frames(&self) -> u64 {
        self.state.borrow().discarded_frames
    }

    /// Every successful release, oldest first.
    pub fn release_log(&self) -> Vec<GpuObject> {
        self.state.borrow().release_log.clone()
    }

    pub fn is_live(&self, object: impl Into<GpuObject>) -> bool {
        self.state.borrow().live.contains_key(&object.into())
    }

    /// Live objects in creation order.
    pub fn live_objects(&self) -> Vec<GpuObject> {
        let state = self.state.borrow();
        let mut objects: Vec<GpuObject> = state.live.keys().copied().collect();
        objects.sort_by_key(|o| o.raw());
        objects
    }

    pub fn label_of(&self, object: impl Into<GpuObject>) -> Option<String> {
        self.state
            .borrow()
            .live
            .get(&object.into())
            .map(|o| o.label.clone())
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        match &self.state.borrow().live.get(&buffer.into())?.detail {
            Detail::Buffer { contents, .. } => Some(contents.clone()),
            _ => None,
        }
    }

    pub fn buffer_usage(&self, buffer: BufferId) -> Option<(BufferUsage, BufferBinding)> {
        match &self.state.borrow().live.get(&buffer.into())?.detail {
            Detail::Buffer { usage, binding, .. } => Some((*usage, *binding)),
            _ => None,
        }
    }

    pub fn buffer_size(&self, buffer: BufferId) -> Option<u64> {
        self.buffer_contents(buffer).map(|c| c.len() as u64)
    }

    pub fn shader_stage(&self, shader: ShaderId) -> Option<Stage> {
        match self.state.borrow().live.get(&shader.into())?.detail {
            Detail::Shader(stage) => Some(stage),
            _ => None,
        }
    }

    pub fn input_layout_slots(&self, layout: InputLayoutId) -> Option<Vec<&'static VertexFormat>> {
        match &self.state.borrow().live.get(&layout.into())?.detail {
            Detail::InputLayout(slots) => Some(slots.clone()),
            _ => None,
        }
    }

    fn create(
        &self,
        call: &'static str,
        label: &str,
        depends_on: Vec<GpuObject>,
        detail: Detail,
        make: impl FnOnce(u64) -> GpuObject,
    ) -> Result<GpuObject, DeviceError> {
        let mut state = self.state.borrow_mut();
        if let Some(err) = state.take_failure(call, Some(label)) {
            return Err(err);
        }
        for dep in &depends_on {
            state.require_live(*dep)?;
        }
        let id = state.alloc();
        let object = make(id);
        state.insert(object, label, depends_on, detail);
        log::trace!("mock: created {object} `{label}`");
        Ok(object)
    }

    fn write_buffer(&self, buffer: BufferId, bytes: &[u8]) -> Result<(), DeviceError> {
        let mut state = self.state.borrow_mut();
        state.require_live(buffer.into())?;
        let Some(obj) = state.live.get_mut(&GpuObject::Buffer(buffer)) else {
            return Err(DeviceError::UnknownObject(buffer.into()));
        };
        match &mut obj.detail {
            Detail::Buffer {
                usage: BufferUsage::Dynamic,
                contents,
                ..
            } => {
                if bytes.len() > contents.len() {
                    return Err(DeviceError::call(
                        "update_buffer",
                        ResultCode::InvalidArgument,
                        format!("{} bytes written into a {} byte buffer", bytes.len(), contents.len()),
                    ));
                }
                contents[..bytes.len()].copy_from_slice(bytes);
                Ok(())
            }
            Detail::Buffer { .. } => Err(DeviceError::call(
                "update_buffer",
                ResultCode::InvalidArgument,
                format!("{buffer} is immutable"),
            )),
            _ => Err(DeviceError::UnknownObject(buffer.into())),
        }
    }

    fn check_live(&self, object: GpuObject) -> Result<(), DeviceError> {
        self.state.borrow().require_live(object).map(|_| ())
    }

    fn check_call(&self, call: &'static str) -> Result<(), DeviceError> {
        match self.state.borrow_mut().take_failure(call, None) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Device for MockDevice {
    fn backend_name(&self) -> &'static str {
        "mock"
    }

    fn create_buffer(
        &self,
        desc: &BufferDesc<'_>,
        contents: Option<&[u8]>,
    ) -> Result<BufferId, DeviceError> {
        if desc.byte_width == 0 {
            return Err(DeviceError::call(
                "create_buffer",
                ResultCode::InvalidArgument,
                format!("`{}` has zero size", desc.label),
            ));
        }
        let data = match (desc.usage, contents) {
            (BufferUsage::Immutable, None) => {
                return Err(DeviceError::call(
                    "create_buffer",
                    ResultCode::InvalidArgument,
                    format!("immutable buffer `{}` needs initial data", desc.label),
                ));
            }
            (_, Some(bytes)) if bytes.len() as u64 > desc.byte_width => {
                return Err(DeviceError::call(
                    "create_buffer",
                    ResultCode::InvalidArgument,
                    format!("`{}`: {} bytes of data for {} bytes", desc.label, bytes.len(), desc.byte_width),
                ));
            }
            (_, Some(bytes)) => {
                let mut data = bytes.to_vec();
                data.resize(desc.byte_width as usize, 0);
                data
            }
            (_, None) => vec![0; desc.byte_width as usize],
        };

        let detail = Detail::Buffer {
            usage: desc.usage,
            binding: desc.binding,
            contents: data,
        };
        self.create("create_buffer", desc.label, Vec::new(), detail, |id| {
            BufferId::from_raw(id).into()
        })
        .map(|o| BufferId::from_raw(o.raw()))
    }

    fn create_texture(
        &self,
        desc: &TextureDesc<'_>,
        texels: &[u8],
    ) -> Result<TextureId, DeviceError> {
        if desc.width == 0 || desc.height == 0 || texels.len() != desc.byte_len() {
            return Err(DeviceError::call(
                "create_texture",
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
        self.create("create_texture", desc.label, Vec::new(), Detail::Other, |id| {
            TextureId::from_raw(id).into()
        })
        .map(|o| TextureId::from_raw(o.raw()))
    }

    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, DeviceError> {
        let label = self
            .label_of(texture)
            .map(|l| format!("{l} view"))
            .unwrap_or_else(|| "view".to_string());
        self.create(
            "create_texture_view",
            &label,
            vec![texture.into()],
            Detail::Other,
            |id| TextureViewId::from_raw(id).into(),
        )
        .map(|o| TextureViewId::from_raw(o.raw()))
    }

    fn create_shader(
        &self,
        stage: Stage,
        source: &ShaderSource<'_>,
    ) -> Result<ShaderId, DeviceError> {
        if source.wgsl.trim().is_empty() || source.entry_point.is_empty() {
            return Err(DeviceError::call(
                "create_shader",
                ResultCode::InvalidArgument,
                format!("`{}` has no program text or entry point", source.label),
            ));
        }
        self.create(
            "create_shader",
            source.label,
            Vec::new(),
            Detail::Shader(stage),
            |id| ShaderId::from_raw(id).into(),
        )
        .map(|o| ShaderId::from_raw(o.raw()))
    }

    fn create_input_layout(
        &self,
        label: &str,
        slots: &[&'static VertexFormat],
        vertex_shader: ShaderId,
    ) -> Result<InputLayoutId, DeviceError> {
        if self.shader_stage(vertex_shader).is_some_and(|s| s != Stage::Vertex) {
            return Err(DeviceError::call(
                "create_input_layout",
                ResultCode::InvalidArgument,
                format!("{vertex_shader} is not a vertex shader"),
            ));
        }
        for format in slots {
            if let Err(e) = format.validate() {
                return Err(DeviceError::call(
                    "create_input_layout",
                    ResultCode::InvalidArgument,
                    e.to_string(),
                ));
            }
        }
        self.create(
            "create_input_layout",
            label,
            vec![vertex_shader.into()],
            Detail::InputLayout(slots.to_vec()),
            |id| InputLayoutId::from_raw(id).into(),
        )
        .map(|o| InputLayoutId::from_raw(o.raw()))
    }

    fn create_sampler(&self, desc: &SamplerDesc<'_>) -> Result<SamplerId, DeviceError> {
        if desc.max_anisotropy > 16 {
            return Err(DeviceError::call(
                "create_sampler",
                ResultCode::LimitExceeded,
                format!("max anisotropy {} > 16", desc.max_anisotropy),
            ));
        }
        self.create("create_sampler", desc.label, Vec::new(), Detail::Other, |id| {
            SamplerId::from_raw(id).into()
        })
        .map(|o| SamplerId::from_raw(o.raw()))
    }

    fn create_rasterizer_state(
        &self,
        desc: &RasterizerDesc<'_>,
    ) -> Result<RasterizerStateId, DeviceError> {
        self.create(
            "create_rasterizer_state",
            desc.label,
            Vec::new(),
            Detail::Other,
            |id| RasterizerStateId::from_raw(id).into(),
        )
        .map(|o| RasterizerStateId::from_raw(o.raw()))
    }

    fn create_blend_state(&self, desc: &BlendDesc<'_>) -> Result<BlendStateId, DeviceError> {
        self.create("create_blend_state", desc.label, Vec::new(), Detail::Other, |id| {
            BlendStateId::from_raw(id).into()
        })
        .map(|o| BlendStateId::from_raw(o.raw()))
    }

    fn release(&self, object: GpuObject) -> Result<(), DeviceError> {
        let mut state = self.state.borrow_mut();
        state.require_live(object)?;

        let dependents: Vec<GpuObject> = state
            .live
            .iter()
            .filter(|(_, o)| o.depends_on.contains(&object))
            .map(|(k, _)| *k)
            .collect();
        if !dependents.is_empty() {
            return Err(DeviceError::StillReferenced { object, dependents });
        }

        state.live.remove(&object);
        state.release_log.push(object);
        state.released_total += 1;
        log::trace!("mock: released {object}");
        Ok(())
    }
}

// ── context ─────────────────────────────────────────────────────────────────

/// One recorded context call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    UpdateBuffer {
        buffer: BufferId,
        bytes: Vec<u8>,
    },
    SetInputLayout(Option<InputLayoutId>),
    SetTopology(Topology),
    SetVertexBuffers {
        first_slot: u32,
        buffers: Vec<VertexBufferBinding>,
    },
    SetIndexBuffer {
        buffer: Option<BufferId>,
        format: IndexFormat,
        offset: u32,
    },
    SetShader {
        stage: Stage,
        shader: Option<ShaderId>,
    },
    SetConstantBuffers {
        stage: Stage,
        first_slot: u32,
        buffers: Vec<BufferId>,
    },
    SetShaderResources {
        stage: Stage,
        first_slot: u32,
        views: Vec<TextureViewId>,
    },
    SetSamplers {
        stage: Stage,
        first_slot: u32,
        samplers: Vec<SamplerId>,
    },
    SetStorageBuffers {
        first_slot: u32,
        buffers: Vec<BufferId>,
    },
    SetRasterizerState(Option<RasterizerStateId>),
    SetBlendState {
        state: Option<BlendStateId>,
        blend_factor: [f32; 4],
        sample_mask: u32,
    },
    Draw {
        vertex_count: u32,
        start_vertex: u32,
    },
    DrawIndexed {
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
    DrawIndexedInstanced {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
}

/// Recording context bound to a [`MockDevice`].
pub struct MockContext<'d> {
    device: &'d MockDevice,
    frame: u64,
    commands: Vec<Command>,
}

impl<'d> MockContext<'d> {
    pub fn new(device: &'d MockDevice) -> Self {
        Self {
            device,
            frame: 0,
            commands: Vec::new(),
        }
    }

    /// Advances the frame index. Recorded commands are kept.
    pub fn next_frame(&mut self) {
        self.frame += 1;
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Drops everything recorded so far, as a frame that is never submitted
    /// would. Returns how many commands were thrown away.
    pub fn discard(&mut self) -> usize {
        let dropped = std::mem::take(&mut self.commands).len();
        self.device.state.borrow_mut().discarded_frames += 1;
        log::trace!("mock: frame {} discarded {dropped} command(s)", self.frame);
        dropped
    }

    /// Number of uploads recorded for `buffer`.
    pub fn upload_count(&self, buffer: BufferId) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::UpdateBuffer { buffer: b, .. } if *b == buffer))
            .count()
    }

    fn record(&mut self, call: &'static str, objects: &[GpuObject], cmd: Command) -> Result<(), DeviceError> {
        self.device.check_call(call)?;
        for o in objects {
            self.device.check_live(*o)?;
        }
        self.commands.push(cmd);
        Ok(())
    }
}

impl CommandContext for MockContext<'_> {
    fn frame_index(&self) -> u64 {
        self.frame
    }

    fn discarded_frames(&self) -> u64 {
        self.device.discarded_frames()
    }

    fn update_buffer(&mut self, buffer: BufferId, bytes: &[u8]) -> Result<(), DeviceError> {
        self.device.check_call("update_buffer")?;
        self.device.write_buffer(buffer, bytes)?;
        self.commands.push(Command::UpdateBuffer {
            buffer,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn set_input_layout(&mut self, layout: Option<InputLayoutId>) -> Result<(), DeviceError> {
        let objects: Vec<GpuObject> = layout.into_iter().map(Into::into).collect();
        self.record("set_input_layout", &objects, Command::SetInputLayout(layout))
    }

    fn set_primitive_topology(&mut self, topology: Topology) -> Result<(), DeviceError> {
        if let Topology::PatchList { control_points } = topology {
            if !(1..=32).contains(&control_points) {
                return Err(DeviceError::call(
                    "set_primitive_topology",
                    ResultCode::InvalidArgument,
                    format!("{control_points} control points"),
                ));
            }
        }
        self.record("set_primitive_topology", &[], Command::SetTopology(topology))
    }

    fn set_vertex_buffers(
        &mut self,
        first_slot: u32,
        buffers: &[VertexBufferBinding],
    ) -> Result<(), DeviceError> {
        let objects: Vec<GpuObject> = buffers.iter().map(|b| b.buffer.into()).collect();
        self.record(
            "set_vertex_buffers",
            &objects,
            Command::SetVertexBuffers {
                first_slot,
                buffers: buffers.to_vec(),
            },
        )
    }

    fn set_index_buffer(
        &mut self,
        buffer: Option<BufferId>,
        format: IndexFormat,
        offset: u32,
    ) -> Result<(), DeviceError> {
        let objects: Vec<GpuObject> = buffer.into_iter().map(Into::into).collect();
        self.record(
            "set_index_buffer",
            &objects,
            Command::SetIndexBuffer {
                buffer,
                format,
                offset,
            },
        )
    }

    fn set_shader(&mut self, stage: Stage, shader: Option<ShaderId>) -> Result<(), DeviceError> {
        if let Some(s) = shader {
            match self.device.shader_stage(s) {
                Some(actual) if actual != stage => {
                    return Err(DeviceError::call(
                        "set_shader",
                        ResultCode::InvalidArgument,
                        format!("{s} is a {actual} shader, bound as {stage}"),
                    ));
                }
                _ => {}
            }
        }
        let objects: Vec<GpuObject> = shader.into_iter().map(Into::into).collect();
        self.record("set_shader", &objects, Command::SetShader { stage, shader })
    }

    fn set_constant_buffers(
        &mut self,
        stage: Stage,
        first_slot: u32,
        buffers: &[BufferId],
    ) -> Result<(), DeviceError> {
        let objects: Vec<GpuObject> = buffers.iter().map(|b| (*b).into()).collect();
        self.record(
            "set_constant_buffers",
            &objects,
            Command::SetConstantBuffers {
                stage,
                first_slot,
                buffers: buffers.to_vec(),
            },
        )
    }

    fn set_shader_resources(
        &mut self,
        stage: Stage,
        first_slot: u32,
        views: &[TextureViewId],
    ) -> Result<(), DeviceError> {
        let objects: Vec<GpuObject> = views.iter().map(|v| (*v).into()).collect();
        self.record(
            "set_shader_resources",
            &objects,
            Command::SetShaderResources {
                stage,
                first_slot,
                views: views.to_vec(),
            },
        )
    }

    fn set_samplers(
        &mut self,
        stage: Stage,
        first_slot: u32,
        samplers: &[SamplerId],
    ) -> Result<(), DeviceError> {
        let objects: Vec<GpuObject> = samplers.iter().map(|s| (*s).into()).collect();
        self.record(
            "set_samplers",
            &objects,
            Command::SetSamplers {
                stage,
                first_slot,
                samplers: samplers.to_vec(),
            },
        )
    }

    fn set_storage_buffers(
        &mut self,
        first_slot: u32,
        buffers: &[BufferId],
    ) -> Result<(), DeviceError> {
        let objects: Vec<GpuObject> = buffers.iter().map(|b| (*b).into()).collect();
        self.record(
            "set_storage_buffers",
            &objects,
            Command::SetStorageBuffers {
                first_slot,
                buffers: buffers.to_vec(),
            },
        )
    }

    fn set_rasterizer_state(
        &mut self,
        state: Option<RasterizerStateId>,
    ) -> Result<(), DeviceError> {
        let objects: Vec<GpuObject> = state.into_iter().map(Into::into).collect();
        self.record(
            "set_rasterizer_state",
            &objects,
            Command::SetRasterizerState(state),
        )
    }

    fn set_blend_state(
        &mut self,
        state: Option<BlendStateId>,
        blend_factor: [f32; 4],
        sample_mask: u32,
    ) -> Result<(), DeviceError> {
        let objects: Vec<GpuObject> = state.into_iter().map(Into::into).collect();
        self.record(
            "set_blend_state",
            &objects,
            Command::SetBlendState {
                state,
                blend_factor,
                sample_mask,
            },
        )
    }

    fn draw(&mut self, vertex_count: u32, start_vertex: u32) -> Result<(), DeviceError> {
        self.record(
            "draw",
            &[],
            Command::Draw {
                vertex_count,
                start_vertex,
            },
        )
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    ) -> Result<(), DeviceError> {
        self.record(
            "draw_indexed",
            &[],
            Command::DrawIndexed {
                index_count,
                start_index,
                base_vertex,
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
        self.record(
            "draw_indexed_instanced",
            &[],
            Command::DrawIndexedInstanced {
                index_count,
                instance_count,
                start_index,
                base_vertex,
                start_instance,
            },
        )
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), DeviceError> {
        self.record("dispatch", &[], Command::Dispatch { x, y, z })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::{GpuVertex, Vertex};

    fn vs(device: &MockDevice) -> ShaderId {
        device
            .create_shader(
                Stage::Vertex,
                &ShaderSource {
                    label: "vs",
                    wgsl: "@vertex fn vs_main() {}",
                    entry_point: "vs_main",
                },
            )
            .unwrap()
    }

    #[test]
    fn releasing_a_referenced_object_fails() {
        let device = MockDevice::new();
        let shader = vs(&device);
        let layout = device
            .create_input_layout("layout", &[Vertex::FORMAT], shader)
            .unwrap();

        let err = device.release(shader.into()).unwrap_err();
        assert_eq!(
            err,
            DeviceError::StillReferenced {
                object: shader.into(),
                dependents: vec![layout.into()],
            }
        );
        assert!(device.is_live(shader));

        device.release(layout.into()).unwrap();
        device.release(shader.into()).unwrap();
        assert_eq!(device.live_count(), 0);
    }

    #[test]
    fn double_release_is_reported() {
        let device = MockDevice::new();
        let shader = vs(&device);
        device.release(shader.into()).unwrap();
        assert_eq!(
            device.release(shader.into()),
            Err(DeviceError::AlreadyReleased(shader.into()))
        );
    }

    #[test]
    fn never_issued_id_is_unknown() {
        let device = MockDevice::new();
        let shader = vs(&device);
        device.release(shader.into()).unwrap();

        let forged = ShaderId::from_raw(shader.raw() + 1);
        assert_eq!(
            device.release(forged.into()),
            Err(DeviceError::UnknownObject(forged.into()))
        );
        let zero = ShaderId::from_raw(0);
        assert_eq!(
            device.release(zero.into()),
            Err(DeviceError::UnknownObject(zero.into()))
        );
    }

    #[test]
    fn discard_counts_on_the_device() {
        let device = MockDevice::new();
        let shader = vs(&device);
        let mut ctx = MockContext::new(&device);
        ctx.set_shader(Stage::Vertex, Some(shader)).unwrap();

        assert_eq!(ctx.discarded_frames(), 0);
        assert_eq!(ctx.discard(), 1);
        assert!(ctx.commands().is_empty());

        let later = MockContext::new(&device);
        assert_eq!(later.discarded_frames(), 1);
    }

    #[test]
    fn immutable_buffer_requires_data_and_rejects_updates() {
        let device = MockDevice::new();
        let desc = BufferDesc {
            label: "vb",
            byte_width: 8,
            usage: BufferUsage::Immutable,
            binding: BufferBinding::Vertex,
        };
        let err = device.create_buffer(&desc, None).unwrap_err();
        assert_eq!(err.code(), Some(ResultCode::InvalidArgument));

        let vb = device.create_buffer(&desc, Some(&[1; 8])).unwrap();
        let mut ctx = MockContext::new(&device);
        let err = ctx.update_buffer(vb, &[0; 8]).unwrap_err();
        assert_eq!(err.code(), Some(ResultCode::InvalidArgument));
        assert_eq!(device.buffer_contents(vb), Some(vec![1; 8]));
    }

    #[test]
    fn injected_failure_fires_once() {
        let device = MockDevice::new();
        device.fail_label("create_shader", "vs", ResultCode::OutOfMemory);
        let err = device
            .create_shader(
                Stage::Vertex,
                &ShaderSource {
                    label: "vs",
                    wgsl: "x",
                    entry_point: "main",
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), Some(ResultCode::OutOfMemory));
        assert_eq!(device.created_count(), 0);
        vs(&device);
        assert_eq!(device.live_count(), 1);
    }

    #[test]
    fn binding_a_released_object_fails() {
        let device = MockDevice::new();
        let shader = vs(&device);
        device.release(shader.into()).unwrap();

        let mut ctx = MockContext::new(&device);
        assert_eq!(
            ctx.set_shader(Stage::Vertex, Some(shader)),
            Err(DeviceError::AlreadyReleased(shader.into()))
        );
        assert!(ctx.commands().is_empty());
    }

    #[test]
    fn shader_bound_to_the_wrong_stage_fails() {
        let device = MockDevice::new();
        let shader = vs(&device);
        let mut ctx = MockContext::new(&device);
        let err = ctx.set_shader(Stage::Pixel, Some(shader)).unwrap_err();
        assert_eq!(err.code(), Some(ResultCode::InvalidArgument));
    }
}
