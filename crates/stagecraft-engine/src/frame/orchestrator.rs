use std::fmt;

use crate::backend::{
    BlendStateId, BufferId, CommandContext, DeviceError, IndexFormat, InputLayoutId, ResultCode,
    SamplerId, ShaderId, Stage, TextureViewId, Topology,
};
use crate::params::StageBlock;
use crate::registry::{DrawRange, MeshDescriptor, PipelineStateRegistry, ShaderProgram};

/// Control points per patch for tessellated meshes.
pub const PATCH_CONTROL_POINTS: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    pub wireframe: bool,
    pub blend_factor: [f32; 4],
    pub sample_mask: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            wireframe: false,
            blend_factor: [0.0; 4],
            sample_mask: u32::MAX,
        }
    }
}

/// Counters for the frame in progress.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub draws: u32,
    pub dispatches: u32,
    pub stage_binds: u32,
}

/// Step of the draw sequence a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawStep {
    BeginFrame,
    OutputMerger,
    InputAssembly,
    VertexBuffers,
    Stage(Stage),
    Draw,
}

impl fmt::Display for DrawStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawStep::BeginFrame => f.write_str("begin frame"),
            DrawStep::OutputMerger => f.write_str("output merger"),
            DrawStep::InputAssembly => f.write_str("input assembly"),
            DrawStep::VertexBuffers => f.write_str("vertex buffers"),
            DrawStep::Stage(stage) => write!(f, "{stage} stage"),
            DrawStep::Draw => f.write_str("draw"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    /// A backend call failed. The draw is abandoned, not retried.
    #[error("`{item}`: {step} failed")]
    Device {
        item: String,
        step: DrawStep,
        #[source]
        source: DeviceError,
    },

    #[error("`{item}`: {detail}")]
    InvalidItem { item: String, detail: String },
}

impl FrameError {
    pub fn code(&self) -> Option<ResultCode> {
        match self {
            FrameError::Device { source, .. } => source.code(),
            FrameError::InvalidItem { .. } => None,
        }
    }
}

/// What one pipeline stage needs bound for a draw.
///
/// Blocks go to constant slots 0.., resources to texture slots 0.., samplers
/// to sampler slots 0.., in the order they were added.
pub struct StageBinding<'b> {
    pub stage: Stage,
    pub shader: ShaderId,
    pub blocks: Vec<&'b mut dyn StageBlock>,
    pub resources: Vec<TextureViewId>,
    pub samplers: Vec<SamplerId>,
}

impl<'b> StageBinding<'b> {
    pub fn new(stage: Stage, shader: ShaderId) -> Self {
        Self {
            stage,
            shader,
            blocks: Vec::new(),
            resources: Vec::new(),
            samplers: Vec::new(),
        }
    }

    pub fn block(mut self, block: &'b mut dyn StageBlock) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn resource(mut self, view: TextureViewId) -> Self {
        self.resources.push(view);
        self
    }

    pub fn sampler(mut self, sampler: SamplerId) -> Self {
        self.samplers.push(sampler);
        self
    }
}

/// One draw call, described declaratively.
pub struct DrawItem<'b> {
    pub label: &'b str,
    pub input_layout: InputLayoutId,
    pub topology: Topology,
    pub mesh: &'b MeshDescriptor,
    /// Per-instance buffer bound at slot 1.
    pub instances: Option<&'b MeshDescriptor>,
    /// `None` binds the default blend state.
    pub blend: Option<BlendStateId>,
    pub stages: Vec<StageBinding<'b>>,
}

impl<'b> DrawItem<'b> {
    /// Item for `program` drawing `mesh`; tessellated programs get patch
    /// topology. Stages are added with [`stage`](Self::stage).
    pub fn new(label: &'b str, program: &ShaderProgram, mesh: &'b MeshDescriptor) -> Self {
        let topology = if program.is_tessellated() {
            Topology::PatchList {
                control_points: PATCH_CONTROL_POINTS,
            }
        } else {
            Topology::TriangleList
        };
        Self {
            label,
            input_layout: program.input_layout,
            topology,
            mesh,
            instances: None,
            blend: None,
            stages: Vec::new(),
        }
    }

    pub fn instances(mut self, instances: &'b MeshDescriptor) -> Self {
        self.instances = Some(instances);
        self
    }

    pub fn blend(mut self, blend: BlendStateId) -> Self {
        self.blend = Some(blend);
        self
    }

    pub fn stage(mut self, binding: StageBinding<'b>) -> Self {
        self.stages.push(binding);
        self
    }
}

/// A compute dispatch with its bindings.
pub struct ComputeItem<'b> {
    pub label: &'b str,
    pub shader: ShaderId,
    pub blocks: Vec<&'b mut dyn StageBlock>,
    pub resources: Vec<TextureViewId>,
    pub samplers: Vec<SamplerId>,
    pub storage: Vec<BufferId>,
    pub groups: [u32; 3],
}

/// Runs the per-frame bind and draw sequence against a [`CommandContext`].
///
/// Per draw the order is fixed:
/// 1. input layout and topology
/// 2. vertex and index buffers
/// 3. stages vertex, hull, domain, pixel: apply blocks, then bind shader,
///    constant buffers, resources and samplers. Absent stages are unbound.
/// 4. the draw call matching the mesh's [`DrawRange`]
pub struct FrameOrchestrator {
    config: OrchestratorConfig,
    wireframe: bool,
    blend: Option<BlendStateId>,
    stats: FrameStats,
}

impl FrameOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            wireframe: config.wireframe,
            config,
            blend: None,
            stats: FrameStats::default(),
        }
    }

    #[inline]
    pub fn wireframe(&self) -> bool {
        self.wireframe
    }

    /// Takes effect at the next [`begin_frame`](Self::begin_frame).
    pub fn set_wireframe(&mut self, wireframe: bool) {
        if self.wireframe != wireframe {
            log::debug!("wireframe: {wireframe}");
        }
        self.wireframe = wireframe;
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Binds the rasterizer chosen by the wireframe flag and the default
    /// blend state, and resets the frame counters.
    pub fn begin_frame(
        &mut self,
        ctx: &mut dyn CommandContext,
        states: &PipelineStateRegistry,
    ) -> Result<(), FrameError> {
        self.stats = FrameStats {
            frame: ctx.frame_index(),
            ..FrameStats::default()
        };
        let fail = |source| FrameError::Device {
            item: "frame".to_string(),
            step: DrawStep::BeginFrame,
            source,
        };

        ctx.set_rasterizer_state(states.rasterizer_for(self.wireframe))
            .map_err(fail)?;
        ctx.set_blend_state(None, self.config.blend_factor, self.config.sample_mask)
            .map_err(fail)?;
        self.blend = None;
        Ok(())
    }

    pub fn draw(
        &mut self,
        ctx: &mut dyn CommandContext,
        mut item: DrawItem<'_>,
    ) -> Result<(), FrameError> {
        let label = item.label;
        let invalid = |detail: String| FrameError::InvalidItem {
            item: label.to_string(),
            detail,
        };
        let fail = |step: DrawStep| {
            move |source| FrameError::Device {
                item: label.to_string(),
                step,
                source,
            }
        };

        check_stages(&item.stages).map_err(invalid)?;
        let draw_call = resolve_draw(item.mesh, item.instances).map_err(invalid)?;

        if item.blend != self.blend {
            ctx.set_blend_state(item.blend, self.config.blend_factor, self.config.sample_mask)
                .map_err(fail(DrawStep::OutputMerger))?;
            self.blend = item.blend;
        }

        // 1. input assembly
        ctx.set_input_layout(Some(item.input_layout))
            .map_err(fail(DrawStep::InputAssembly))?;
        ctx.set_primitive_topology(item.topology)
            .map_err(fail(DrawStep::InputAssembly))?;

        // 2. vertex and index buffers
        let mut bindings = vec![item.mesh.vertex_binding()];
        if let Some(instances) = item.instances {
            bindings.push(instances.vertex_binding());
        }
        ctx.set_vertex_buffers(0, &bindings)
            .map_err(fail(DrawStep::VertexBuffers))?;
        ctx.set_index_buffer(item.mesh.index_buffer, IndexFormat::U32, 0)
            .map_err(fail(DrawStep::VertexBuffers))?;

        // 3. stages
        for stage in Stage::GRAPHICS {
            match item.stages.iter_mut().find(|b| b.stage == stage) {
                Some(binding) => {
                    bind_stage(ctx, stage, binding).map_err(fail(DrawStep::Stage(stage)))?;
                    self.stats.stage_binds += 1;
                }
                None => ctx
                    .set_shader(stage, None)
                    .map_err(fail(DrawStep::Stage(stage)))?,
            }
        }

        // 4. draw
        match draw_call {
            DrawCall::Indexed {
                index_count,
                start_index,
                base_vertex,
            } => ctx.draw_indexed(index_count, start_index, base_vertex),
            DrawCall::Instanced {
                index_count,
                instance_count,
                start_index,
                base_vertex,
            } => ctx.draw_indexed_instanced(index_count, instance_count, start_index, base_vertex, 0),
            DrawCall::NonIndexed {
                vertex_count,
                start_vertex,
            } => ctx.draw(vertex_count, start_vertex),
        }
        .map_err(fail(DrawStep::Draw))?;

        self.stats.draws += 1;
        log::trace!("drew `{label}` ({draw_call:?})");
        Ok(())
    }

    /// Binds the compute stage and dispatches `item.groups` thread groups.
    pub fn dispatch(
        &mut self,
        ctx: &mut dyn CommandContext,
        item: ComputeItem<'_>,
    ) -> Result<(), FrameError> {
        let label = item.label;
        if item.groups.contains(&0) {
            return Err(FrameError::InvalidItem {
                item: label.to_string(),
                detail: format!("empty dispatch {:?}", item.groups),
            });
        }
        let fail = |step: DrawStep| {
            move |source| FrameError::Device {
                item: label.to_string(),
                step,
                source,
            }
        };

        let mut binding = StageBinding {
            stage: Stage::Compute,
            shader: item.shader,
            blocks: item.blocks,
            resources: item.resources,
            samplers: item.samplers,
        };
        bind_stage(ctx, Stage::Compute, &mut binding).map_err(fail(DrawStep::Stage(Stage::Compute)))?;
        if !item.storage.is_empty() {
            ctx.set_storage_buffers(0, &item.storage)
                .map_err(fail(DrawStep::Stage(Stage::Compute)))?;
        }

        let [x, y, z] = item.groups;
        ctx.dispatch(x, y, z).map_err(fail(DrawStep::Draw))?;
        ctx.set_shader(Stage::Compute, None)
            .map_err(fail(DrawStep::Stage(Stage::Compute)))?;

        self.stats.dispatches += 1;
        Ok(())
    }
}

impl Default for FrameOrchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

#[derive(Debug, Clone, Copy)]
enum DrawCall {
    Indexed {
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
    Instanced {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
    NonIndexed {
        vertex_count: u32,
        start_vertex: u32,
    },
}

fn check_stages(stages: &[StageBinding<'_>]) -> Result<(), String> {
    if !stages.iter().any(|b| b.stage == Stage::Vertex) {
        return Err("no vertex stage".into());
    }
    for (i, binding) in stages.iter().enumerate() {
        if binding.stage == Stage::Compute {
            return Err("compute stage in a draw".into());
        }
        if stages[..i].iter().any(|b| b.stage == binding.stage) {
            return Err(format!("{} stage bound twice", binding.stage));
        }
    }
    let has = |stage: Stage| stages.iter().any(|b| b.stage == stage);
    if has(Stage::Hull) != has(Stage::Domain) {
        return Err("hull and domain stages must be bound together".into());
    }
    Ok(())
}

fn resolve_draw(
    mesh: &MeshDescriptor,
    instances: Option<&MeshDescriptor>,
) -> Result<DrawCall, String> {
    match (mesh.range, instances.map(|i| i.range)) {
        (
            DrawRange::Indexed {
                index_count,
                start_index,
                base_vertex,
            },
            None,
        ) => Ok(DrawCall::Indexed {
            index_count,
            start_index,
            base_vertex,
        }),
        (
            DrawRange::Indexed {
                index_count,
                start_index,
                base_vertex,
            },
            Some(DrawRange::NonIndexed { vertex_count, .. }),
        ) => Ok(DrawCall::Instanced {
            index_count,
            instance_count: vertex_count,
            start_index,
            base_vertex,
        }),
        (
            DrawRange::NonIndexed {
                vertex_count,
                start_vertex,
            },
            None,
        ) => Ok(DrawCall::NonIndexed {
            vertex_count,
            start_vertex,
        }),
        (_, Some(DrawRange::Indexed { .. })) => Err("instance buffer has an index range".into()),
        (DrawRange::NonIndexed { .. }, Some(_)) => {
            Err("instanced draws need an indexed mesh".into())
        }
    }
}

/// Applies every block of `binding`, then binds shader, constant buffers,
/// resources and samplers for `stage`.
fn bind_stage(
    ctx: &mut dyn CommandContext,
    stage: Stage,
    binding: &mut StageBinding<'_>,
) -> Result<(), DeviceError> {
    let mut buffers = Vec::with_capacity(binding.blocks.len());
    for block in binding.blocks.iter_mut() {
        buffers.push(block.apply(ctx)?.buffer());
    }

    ctx.set_shader(stage, Some(binding.shader))?;
    if !buffers.is_empty() {
        ctx.set_constant_buffers(stage, 0, &buffers)?;
    }
    if !binding.resources.is_empty() {
        ctx.set_shader_resources(stage, 0, &binding.resources)?;
    }
    if !binding.samplers.is_empty() {
        ctx.set_samplers(stage, 0, &binding.samplers)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Command, MockContext, MockDevice};
    use crate::backend::{Device, ShaderSource};
    use crate::geometry::{cylinder, grid};
    use crate::params::{ParameterBlock, UploadPolicy, VertexObjectParams};
    use crate::registry::{GeometryRegistry, GeometrySpec, ProgramSpec, ShaderRegistry};
    use crate::vertex::{GpuVertex, InstanceData, Vertex, VertexFormat};
    use std::rc::Rc;

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Prog {
        Lit,
        Instanced,
        Terrain,
        Tiles,
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Geo {
        Grid,
        Cylinder,
        Instances,
    }

    const MESH: &[&VertexFormat] = &[Vertex::FORMAT];
    const INSTANCED: &[&VertexFormat] = &[Vertex::FORMAT, InstanceData::FORMAT];

    fn src(label: &'static str) -> ShaderSource<'static> {
        ShaderSource {
            label,
            wgsl: "// test program",
            entry_point: "main",
        }
    }

    struct Scene {
        mock: Rc<MockDevice>,
        device: Rc<dyn Device>,
        states: PipelineStateRegistry,
        shaders: ShaderRegistry<Prog>,
        geometry: GeometryRegistry<Geo>,
    }

    fn scene() -> Scene {
        let mock = Rc::new(MockDevice::new());
        let device: Rc<dyn Device> = mock.clone();
        let states = PipelineStateRegistry::init_all(&device).unwrap();
        let shaders = ShaderRegistry::init_all(
            &device,
            &[
                ProgramSpec::new(Prog::Lit, src("lit vs"), MESH).with_pixel(src("lit ps")),
                ProgramSpec::new(Prog::Instanced, src("instanced vs"), INSTANCED)
                    .with_pixel(src("instanced ps")),
                ProgramSpec::new(Prog::Terrain, src("terrain vs"), MESH)
                    .with_hull(src("terrain hs"))
                    .with_domain(src("terrain ds"))
                    .with_pixel(src("terrain ps")),
            ],
            &[crate::registry::ComputeSpec {
                key: Prog::Tiles,
                source: src("tiles cs"),
            }],
        )
        .unwrap();

        let terrain = grid(10.0, 10.0, 2, 2);
        let pillar = cylinder(1.0, 1.0, 4.0, 6, 1);
        let instances: Vec<_> = (0..5)
            .map(|i| InstanceData::from_translation(i as f32 * 10.0, 25.0, 0.0))
            .collect();
        let geometry = GeometryRegistry::init_all(
            &device,
            &[
                GeometrySpec::Indexed {
                    key: Geo::Grid,
                    label: "grid",
                    mesh: &terrain,
                },
                GeometrySpec::Indexed {
                    key: Geo::Cylinder,
                    label: "cylinder",
                    mesh: &pillar,
                },
                GeometrySpec::instances(Geo::Instances, "instances", &instances),
            ],
        )
        .unwrap();

        Scene {
            mock,
            device,
            states,
            shaders,
            geometry,
        }
    }

    fn object_block(device: &Rc<dyn Device>) -> ParameterBlock<VertexObjectParams> {
        ParameterBlock::initialize(
            device,
            "object",
            VertexObjectParams::from_world(glam::Mat4::IDENTITY),
            UploadPolicy::OnChange,
        )
        .unwrap()
    }

    fn position(commands: &[Command], pred: impl Fn(&Command) -> bool) -> usize {
        commands.iter().position(pred).unwrap()
    }

    #[test]
    fn wireframe_flag_selects_the_rasterizer_handle() {
        let s = scene();
        let mut ctx = MockContext::new(&s.mock);
        let mut frame = FrameOrchestrator::new(OrchestratorConfig {
            wireframe: true,
            ..Default::default()
        });

        frame.begin_frame(&mut ctx, &s.states).unwrap();
        assert_eq!(
            ctx.commands()[0],
            Command::SetRasterizerState(Some(s.states.wireframe_rasterizer()))
        );

        frame.set_wireframe(false);
        ctx.next_frame();
        let _ = ctx.take_commands();
        frame.begin_frame(&mut ctx, &s.states).unwrap();
        assert_eq!(ctx.commands()[0], Command::SetRasterizerState(None));
        assert!(matches!(
            ctx.commands()[1],
            Command::SetBlendState { state: None, sample_mask: u32::MAX, .. }
        ));
    }

    #[test]
    fn blocks_are_applied_before_their_stage_is_bound() {
        let s = scene();
        let mut ctx = MockContext::new(&s.mock);
        let mut frame = FrameOrchestrator::default();
        let mut object = object_block(&s.device);
        let lit = s.shaders.program(Prog::Lit).unwrap();
        let grid = s.geometry.mesh(Geo::Grid).unwrap();

        frame
            .draw(
                &mut ctx,
                DrawItem::new("grid", lit, grid)
                    .stage(StageBinding::new(Stage::Vertex, lit.vertex).block(&mut object))
                    .stage(StageBinding::new(Stage::Pixel, lit.pixel.unwrap())),
            )
            .unwrap();

        let cmds = ctx.commands();
        let upload = position(cmds, |c| matches!(c, Command::UpdateBuffer { .. }));
        let bind = position(cmds, |c| {
            matches!(c, Command::SetConstantBuffers { stage: Stage::Vertex, .. })
        });
        assert!(upload < bind);
        assert_eq!(
            cmds[bind],
            Command::SetConstantBuffers {
                stage: Stage::Vertex,
                first_slot: 0,
                buffers: vec![object.buffer_id()],
            }
        );
        assert_eq!(
            cmds.last(),
            Some(&Command::DrawIndexed {
                index_count: 24,
                start_index: 0,
                base_vertex: 0,
            })
        );
    }

    #[test]
    fn stages_are_bound_in_pipeline_order() {
        let s = scene();
        let mut ctx = MockContext::new(&s.mock);
        let mut frame = FrameOrchestrator::default();
        let terrain = s.shaders.program(Prog::Terrain).unwrap();
        let grid = s.geometry.mesh(Geo::Grid).unwrap();

        // Declared out of order on purpose.
        frame
            .draw(
                &mut ctx,
                DrawItem::new("terrain", terrain, grid)
                    .stage(StageBinding::new(Stage::Pixel, terrain.pixel.unwrap()))
                    .stage(StageBinding::new(Stage::Domain, terrain.domain.unwrap()))
                    .stage(StageBinding::new(Stage::Vertex, terrain.vertex))
                    .stage(StageBinding::new(Stage::Hull, terrain.hull.unwrap())),
            )
            .unwrap();

        let order: Vec<Stage> = ctx
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetShader { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(order, Stage::GRAPHICS.to_vec());
        assert!(ctx.commands().contains(&Command::SetTopology(Topology::PatchList {
            control_points: PATCH_CONTROL_POINTS
        })));
        assert_eq!(frame.stats().stage_binds, 4);
    }

    #[test]
    fn absent_stages_are_unbound() {
        let s = scene();
        let mut ctx = MockContext::new(&s.mock);
        let mut frame = FrameOrchestrator::default();
        let lit = s.shaders.program(Prog::Lit).unwrap();
        let grid = s.geometry.mesh(Geo::Grid).unwrap();

        frame
            .draw(
                &mut ctx,
                DrawItem::new("grid", lit, grid)
                    .stage(StageBinding::new(Stage::Vertex, lit.vertex)),
            )
            .unwrap();

        for stage in [Stage::Hull, Stage::Domain, Stage::Pixel] {
            assert!(ctx
                .commands()
                .contains(&Command::SetShader { stage, shader: None }));
        }
    }

    #[test]
    fn instanced_draw_binds_two_slots() {
        let s = scene();
        let mut ctx = MockContext::new(&s.mock);
        let mut frame = FrameOrchestrator::default();
        let program = s.shaders.program(Prog::Instanced).unwrap();
        let pillar = s.geometry.mesh(Geo::Cylinder).unwrap();
        let instances = s.geometry.mesh(Geo::Instances).unwrap();

        frame
            .draw(
                &mut ctx,
                DrawItem::new("pillars", program, pillar)
                    .instances(instances)
                    .stage(StageBinding::new(Stage::Vertex, program.vertex)),
            )
            .unwrap();

        let cmds = ctx.commands();
        let bind = position(cmds, |c| matches!(c, Command::SetVertexBuffers { .. }));
        let Command::SetVertexBuffers { buffers, .. } = &cmds[bind] else {
            unreachable!()
        };
        assert_eq!(buffers.len(), 2);
        assert_eq!((buffers[0].stride, buffers[1].stride), (32, 64));
        assert!(matches!(
            cmds.last(),
            Some(Command::DrawIndexedInstanced { instance_count: 5, start_instance: 0, .. })
        ));
    }

    #[test]
    fn non_indexed_mesh_uses_plain_draw() {
        let s = scene();
        let mut ctx = MockContext::new(&s.mock);
        let mut frame = FrameOrchestrator::default();
        let program = s.shaders.program(Prog::Lit).unwrap();
        let points = s.geometry.mesh(Geo::Instances).unwrap();

        frame
            .draw(
                &mut ctx,
                DrawItem::new("points", program, points)
                    .stage(StageBinding::new(Stage::Vertex, program.vertex)),
            )
            .unwrap();

        assert!(ctx.commands().contains(&Command::SetIndexBuffer {
            buffer: None,
            format: IndexFormat::U32,
            offset: 0,
        }));
        assert_eq!(
            ctx.commands().last(),
            Some(&Command::Draw {
                vertex_count: 5,
                start_vertex: 0,
            })
        );
    }

    #[test]
    fn unchanged_block_uploads_once_across_draws() {
        let s = scene();
        let mut ctx = MockContext::new(&s.mock);
        let mut frame = FrameOrchestrator::default();
        let mut object = object_block(&s.device);
        let lit = s.shaders.program(Prog::Lit).unwrap();
        let grid = s.geometry.mesh(Geo::Grid).unwrap();

        for _ in 0..3 {
            frame
                .draw(
                    &mut ctx,
                    DrawItem::new("grid", lit, grid)
                        .stage(StageBinding::new(Stage::Vertex, lit.vertex).block(&mut object)),
                )
                .unwrap();
        }
        assert_eq!(ctx.upload_count(object.buffer_id()), 1);
        assert_eq!(frame.stats().draws, 3);
    }

    #[test]
    fn blend_state_is_bound_only_on_change() {
        let s = scene();
        let mut ctx = MockContext::new(&s.mock);
        let mut frame = FrameOrchestrator::default();
        let lit = s.shaders.program(Prog::Lit).unwrap();
        let grid = s.geometry.mesh(Geo::Grid).unwrap();
        let transparent = s.states.transparent_blend();

        frame.begin_frame(&mut ctx, &s.states).unwrap();
        for _ in 0..2 {
            frame
                .draw(
                    &mut ctx,
                    DrawItem::new("water", lit, grid)
                        .blend(transparent)
                        .stage(StageBinding::new(Stage::Vertex, lit.vertex)),
                )
                .unwrap();
        }
        let blends = ctx
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::SetBlendState { .. }))
            .count();
        // default from begin_frame, then the transparent state once
        assert_eq!(blends, 2);
    }

    #[test]
    fn draw_failure_is_reported_not_retried() {
        let s = scene();
        let mut ctx = MockContext::new(&s.mock);
        let mut frame = FrameOrchestrator::default();
        let lit = s.shaders.program(Prog::Lit).unwrap();
        let grid = s.geometry.mesh(Geo::Grid).unwrap();

        s.mock.fail_next("draw_indexed", ResultCode::DeviceLost);
        let err = frame
            .draw(
                &mut ctx,
                DrawItem::new("grid", lit, grid)
                    .stage(StageBinding::new(Stage::Vertex, lit.vertex)),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            FrameError::Device {
                step: DrawStep::Draw,
                ..
            }
        ));
        assert_eq!(err.code(), Some(ResultCode::DeviceLost));
        let draws = ctx
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::DrawIndexed { .. }))
            .count();
        assert_eq!(draws, 0);
        assert_eq!(frame.stats().draws, 0);
    }

    #[test]
    fn malformed_items_are_rejected_before_binding() {
        let s = scene();
        let mut ctx = MockContext::new(&s.mock);
        let mut frame = FrameOrchestrator::default();
        let terrain = s.shaders.program(Prog::Terrain).unwrap();
        let grid = s.geometry.mesh(Geo::Grid).unwrap();

        let err = frame
            .draw(
                &mut ctx,
                DrawItem::new("terrain", terrain, grid)
                    .stage(StageBinding::new(Stage::Vertex, terrain.vertex))
                    .stage(StageBinding::new(Stage::Hull, terrain.hull.unwrap())),
            )
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidItem { .. }));

        let err = frame
            .draw(&mut ctx, DrawItem::new("empty", terrain, grid))
            .unwrap_err();
        assert!(err.to_string().contains("no vertex stage"));
        assert!(ctx.commands().is_empty());
    }

    #[test]
    fn dispatch_binds_compute_and_unbinds_after() {
        let s = scene();
        let mut ctx = MockContext::new(&s.mock);
        let mut frame = FrameOrchestrator::default();
        let mut object = object_block(&s.device);
        let tiles = s.shaders.kernel(Prog::Tiles).unwrap();
        let lights = s.geometry.mesh(Geo::Instances).unwrap().vertex_buffer;

        frame
            .dispatch(
                &mut ctx,
                ComputeItem {
                    label: "tiles",
                    shader: tiles,
                    blocks: vec![&mut object as &mut dyn StageBlock],
                    resources: Vec::new(),
                    samplers: Vec::new(),
                    storage: vec![lights],
                    groups: [4, 3, 1],
                },
            )
            .unwrap();

        let cmds = ctx.commands();
        assert_eq!(
            cmds.iter()
                .filter(|c| matches!(c, Command::SetShader { stage: Stage::Compute, .. }))
                .count(),
            2
        );
        assert!(cmds.contains(&Command::Dispatch { x: 4, y: 3, z: 1 }));
        assert_eq!(
            cmds.last(),
            Some(&Command::SetShader {
                stage: Stage::Compute,
                shader: None,
            })
        );
        assert_eq!(frame.stats().dispatches, 1);
    }
}
