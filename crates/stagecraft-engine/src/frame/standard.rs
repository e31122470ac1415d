use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::backend::{CommandContext, Device, DeviceError, SamplerId, Stage, TextureViewId};
use crate::params::{
    DirectionalLight, DomainFrameParams, HullFrameParams, Material, ParameterBlock,
    PixelFrameParams, PixelObjectParams, UploadPolicy, VertexObjectParams,
};
use crate::registry::{MeshDescriptor, ShaderProgram};

use super::orchestrator::{DrawItem, FrameError, FrameOrchestrator, StageBinding};

/// Camera and scene state read each frame. Owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneInputs {
    pub view_projection: Mat4,
    pub eye_position: Vec3,
    pub lights: [DirectionalLight; 3],
}

impl Default for SceneInputs {
    fn default() -> Self {
        Self {
            view_projection: Mat4::IDENTITY,
            eye_position: Vec3::ZERO,
            lights: DirectionalLight::three_point(),
        }
    }
}

/// Textures sampled by a tessellated draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainTextures {
    pub height_map: TextureViewId,
    pub diffuse: TextureViewId,
    pub normal_map: TextureViewId,
}

/// The parameter blocks shared by the demos' draws, one per stage and
/// update frequency.
///
/// | block          | stage(s)                         | slot |
/// |----------------|----------------------------------|------|
/// | `object`       | vertex                           | b0   |
/// | `hull_frame`   | hull                             | b0   |
/// | `domain_frame` | domain, or vertex when untessellated | b0 / b1 |
/// | `pixel_frame`  | pixel                            | b0   |
/// | `pixel_object` | pixel                            | b1   |
pub struct StandardBlocks {
    pub object: ParameterBlock<VertexObjectParams>,
    pub hull_frame: ParameterBlock<HullFrameParams>,
    pub domain_frame: ParameterBlock<DomainFrameParams>,
    pub pixel_frame: ParameterBlock<PixelFrameParams>,
    pub pixel_object: ParameterBlock<PixelObjectParams>,
}

impl StandardBlocks {
    pub fn initialize(device: &Rc<dyn Device>) -> Result<Self, DeviceError> {
        let scene = SceneInputs::default();
        Ok(Self {
            object: ParameterBlock::initialize(
                device,
                "object params",
                VertexObjectParams::from_world(Mat4::IDENTITY),
                UploadPolicy::OnChange,
            )?,
            hull_frame: ParameterBlock::initialize(
                device,
                "hull frame params",
                HullFrameParams::new(scene.eye_position),
                UploadPolicy::OnChange,
            )?,
            domain_frame: ParameterBlock::initialize(
                device,
                "domain frame params",
                DomainFrameParams::new(scene.view_projection),
                UploadPolicy::OnChange,
            )?,
            pixel_frame: ParameterBlock::initialize(
                device,
                "pixel frame params",
                PixelFrameParams::new(scene.lights, scene.eye_position),
                UploadPolicy::OnChange,
            )?,
            pixel_object: ParameterBlock::initialize(
                device,
                "pixel object params",
                PixelObjectParams {
                    material: Material::default(),
                },
                UploadPolicy::OnChange,
            )?,
        })
    }

    /// Releases the buffers, newest first. Keeps going after a failure.
    pub fn destroy(self) -> Result<(), DeviceError> {
        let results = [
            self.pixel_object.destroy(),
            self.pixel_frame.destroy(),
            self.domain_frame.destroy(),
            self.hull_frame.destroy(),
            self.object.destroy(),
        ];
        results.into_iter().collect()
    }

    /// Writes the per-frame blocks. Only blocks whose contents changed are
    /// marked dirty.
    pub fn set_scene(&mut self, scene: &SceneInputs) {
        self.hull_frame.update(HullFrameParams::new(scene.eye_position));
        self.domain_frame
            .update(DomainFrameParams::new(scene.view_projection));
        self.pixel_frame
            .update(PixelFrameParams::new(scene.lights, scene.eye_position));
    }

    /// Tessellated draw:
    /// - vertex: world and its inverse-transpose
    /// - hull: eye position
    /// - domain: view-projection, height map, linear sampler
    /// - pixel: lights (b0) and material (b1), diffuse and normal maps, linear sampler
    #[allow(clippy::too_many_arguments)]
    pub fn draw_tessellated(
        &mut self,
        frame: &mut FrameOrchestrator,
        ctx: &mut dyn CommandContext,
        program: &ShaderProgram,
        mesh: &MeshDescriptor,
        world: Mat4,
        material: Material,
        textures: TerrainTextures,
        sampler: SamplerId,
    ) -> Result<(), FrameError> {
        let (Some(hull), Some(domain), Some(pixel)) = (program.hull, program.domain, program.pixel)
        else {
            return Err(FrameError::InvalidItem {
                item: "tessellated".to_string(),
                detail: "program lacks a hull, domain or pixel stage".to_string(),
            });
        };

        self.object.update(VertexObjectParams::from_world(world));
        self.set_material(material);

        let item = DrawItem::new("tessellated", program, mesh)
            .stage(StageBinding::new(Stage::Vertex, program.vertex).block(&mut self.object))
            .stage(StageBinding::new(Stage::Hull, hull).block(&mut self.hull_frame))
            .stage(
                StageBinding::new(Stage::Domain, domain)
                    .block(&mut self.domain_frame)
                    .resource(textures.height_map)
                    .sampler(sampler),
            )
            .stage(
                StageBinding::new(Stage::Pixel, pixel)
                    .block(&mut self.pixel_frame)
                    .block(&mut self.pixel_object)
                    .resource(textures.diffuse)
                    .resource(textures.normal_map)
                    .sampler(sampler),
            );
        frame.draw(ctx, item)
    }

    /// Untessellated lit draw. The view-projection block moves to vertex slot
    /// b1. With `instances`, per-instance world matrices come from slot 1 and
    /// `world` is applied on top of them.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_lit(
        &mut self,
        frame: &mut FrameOrchestrator,
        ctx: &mut dyn CommandContext,
        label: &str,
        program: &ShaderProgram,
        mesh: &MeshDescriptor,
        instances: Option<&MeshDescriptor>,
        world: Mat4,
        material: Material,
        diffuse: TextureViewId,
        sampler: SamplerId,
    ) -> Result<(), FrameError> {
        let Some(pixel) = program.pixel else {
            return Err(FrameError::InvalidItem {
                item: label.to_string(),
                detail: "program lacks a pixel stage".to_string(),
            });
        };

        self.object.update(VertexObjectParams::from_world(world));
        self.set_material(material);

        let mut item = DrawItem::new(label, program, mesh)
            .stage(
                StageBinding::new(Stage::Vertex, program.vertex)
                    .block(&mut self.object)
                    .block(&mut self.domain_frame),
            )
            .stage(
                StageBinding::new(Stage::Pixel, pixel)
                    .block(&mut self.pixel_frame)
                    .block(&mut self.pixel_object)
                    .resource(diffuse)
                    .sampler(sampler),
            );
        if let Some(instances) = instances {
            item = item.instances(instances);
        }
        frame.draw(ctx, item)
    }

    fn set_material(&mut self, material: Material) {
        self.pixel_object.update(PixelObjectParams { material });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Command, MockContext, MockDevice};
    use crate::backend::{ShaderSource, Topology};
    use crate::frame::PATCH_CONTROL_POINTS;
    use crate::geometry::grid;
    use crate::params::shader_matrix;
    use crate::registry::{
        GeometryRegistry, GeometrySpec, PipelineStateRegistry, ProgramSpec, ShaderRegistry,
    };
    use crate::vertex::{GpuVertex, Vertex, VertexFormat};

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Prog {
        Terrain,
        Lit,
    }

    const MESH: &[&VertexFormat] = &[Vertex::FORMAT];

    fn src(label: &'static str) -> ShaderSource<'static> {
        ShaderSource {
            label,
            wgsl: "// test program",
            entry_point: "main",
        }
    }

    struct Fixture {
        mock: Rc<MockDevice>,
        states: PipelineStateRegistry,
        shaders: ShaderRegistry<Prog>,
        geometry: GeometryRegistry<()>,
        blocks: StandardBlocks,
        textures: TerrainTextures,
    }

    fn fixture() -> Fixture {
        let mock = Rc::new(MockDevice::new());
        let device: Rc<dyn Device> = mock.clone();
        let states = PipelineStateRegistry::init_all(&device).unwrap();
        let shaders = ShaderRegistry::init_all(
            &device,
            &[
                ProgramSpec::new(Prog::Terrain, src("terrain vs"), MESH)
                    .with_hull(src("terrain hs"))
                    .with_domain(src("terrain ds"))
                    .with_pixel(src("terrain ps")),
                ProgramSpec::new(Prog::Lit, src("lit vs"), MESH).with_pixel(src("lit ps")),
            ],
            &[],
        )
        .unwrap();
        let terrain = grid(100.0, 100.0, 4, 4);
        let geometry = GeometryRegistry::init_all(
            &device,
            &[GeometrySpec::Indexed {
                key: (),
                label: "terrain",
                mesh: &terrain,
            }],
        )
        .unwrap();
        let blocks = StandardBlocks::initialize(&device).unwrap();

        // Views are opaque to the mock context; any live view will do.
        let view = |label: &str| {
            let tex = device
                .create_texture(
                    &crate::backend::TextureDesc {
                        label,
                        width: 1,
                        height: 1,
                        format: crate::backend::TextureFormat::Rgba8Unorm,
                    },
                    &[0; 4],
                )
                .unwrap();
            device.create_texture_view(tex).unwrap()
        };
        let textures = TerrainTextures {
            height_map: view("height"),
            diffuse: view("diffuse"),
            normal_map: view("normal"),
        };

        Fixture {
            mock,
            states,
            shaders,
            geometry,
            blocks,
            textures,
        }
    }

    #[test]
    fn tessellated_draw_writes_each_stage() {
        let mut f = fixture();
        let mut ctx = MockContext::new(&f.mock);
        let mut frame = FrameOrchestrator::default();
        let program = f.shaders.program(Prog::Terrain).unwrap();
        let mesh = f.geometry.mesh(()).unwrap();
        let sampler = f.states.linear_sampler();
        let eye = Vec3::new(0.0, 50.0, -100.0);

        f.blocks.set_scene(&SceneInputs {
            eye_position: eye,
            ..SceneInputs::default()
        });
        frame.begin_frame(&mut ctx, &f.states).unwrap();
        f.blocks
            .draw_tessellated(
                &mut frame,
                &mut ctx,
                program,
                mesh,
                Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
                Material::default(),
                f.textures,
                sampler,
            )
            .unwrap();

        let cmds = ctx.commands();
        assert!(cmds.contains(&Command::SetTopology(Topology::PatchList {
            control_points: PATCH_CONTROL_POINTS
        })));
        assert!(cmds.contains(&Command::SetShaderResources {
            stage: Stage::Domain,
            first_slot: 0,
            views: vec![f.textures.height_map],
        }));
        assert!(cmds.contains(&Command::SetShaderResources {
            stage: Stage::Pixel,
            first_slot: 0,
            views: vec![f.textures.diffuse, f.textures.normal_map],
        }));
        for stage in [Stage::Domain, Stage::Pixel] {
            assert!(cmds.contains(&Command::SetSamplers {
                stage,
                first_slot: 0,
                samplers: vec![sampler],
            }));
        }

        assert_eq!(f.blocks.hull_frame.data().eye_position_w, eye.to_array());
        let world = f.mock.buffer_contents(f.blocks.object.buffer_id()).unwrap();
        let uploaded: Vec<f32> = world[..64]
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!([uploaded[3], uploaded[7], uploaded[11]], [1.0, 2.0, 3.0]);
    }

    #[test]
    fn second_identical_frame_uploads_nothing() {
        let mut f = fixture();
        let mut ctx = MockContext::new(&f.mock);
        let mut frame = FrameOrchestrator::default();
        let program = f.shaders.program(Prog::Lit).unwrap();
        let mesh = f.geometry.mesh(()).unwrap();
        let sampler = f.states.anisotropic_sampler();
        let scene = SceneInputs::default();

        for _ in 0..2 {
            ctx.next_frame();
            f.blocks.set_scene(&scene);
            f.blocks
                .draw_lit(
                    &mut frame,
                    &mut ctx,
                    "grid",
                    program,
                    mesh,
                    None,
                    Mat4::IDENTITY,
                    Material::default(),
                    f.textures.diffuse,
                    sampler,
                )
                .unwrap();
        }

        let uploads = ctx
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::UpdateBuffer { .. }))
            .count();
        // object, camera and both pixel blocks once each; the hull block is unused
        assert_eq!(uploads, 4);
    }

    #[test]
    fn lit_draw_puts_view_projection_in_vertex_slot_one() {
        let mut f = fixture();
        let mut ctx = MockContext::new(&f.mock);
        let mut frame = FrameOrchestrator::default();
        let program = f.shaders.program(Prog::Lit).unwrap();
        let mesh = f.geometry.mesh(()).unwrap();
        let view_projection = Mat4::perspective_lh(1.0, 1.5, 1.0, 1000.0);

        f.blocks.set_scene(&SceneInputs {
            view_projection,
            ..SceneInputs::default()
        });
        f.blocks
            .draw_lit(
                &mut frame,
                &mut ctx,
                "grid",
                program,
                mesh,
                None,
                Mat4::IDENTITY,
                Material::default(),
                f.textures.diffuse,
                f.states.linear_sampler(),
            )
            .unwrap();

        assert!(ctx.commands().contains(&Command::SetConstantBuffers {
            stage: Stage::Vertex,
            first_slot: 0,
            buffers: vec![
                f.blocks.object.buffer_id(),
                f.blocks.domain_frame.buffer_id()
            ],
        }));
        assert_eq!(
            f.blocks.domain_frame.data().view_projection,
            shader_matrix(view_projection)
        );
    }

    #[test]
    fn pixel_frame_uploads_once_across_draws() {
        let mut f = fixture();
        let mut ctx = MockContext::new(&f.mock);
        let mut frame = FrameOrchestrator::default();
        let program = f.shaders.program(Prog::Lit).unwrap();
        let mesh = f.geometry.mesh(()).unwrap();
        let sampler = f.states.linear_sampler();
        let ground = Material::default();
        let column = Material {
            diffuse: [0.2, 0.4, 0.6, 1.0],
            ..Material::default()
        };

        for _ in 0..2 {
            ctx.take_commands();
            ctx.next_frame();
            f.blocks.set_scene(&SceneInputs {
                eye_position: Vec3::new(0.0, 0.0, ctx.frame_index() as f32),
                ..SceneInputs::default()
            });
            frame.begin_frame(&mut ctx, &f.states).unwrap();
            for material in [ground, column] {
                f.blocks
                    .draw_lit(
                        &mut frame,
                        &mut ctx,
                        "grid",
                        program,
                        mesh,
                        None,
                        Mat4::IDENTITY,
                        material,
                        f.textures.diffuse,
                        sampler,
                    )
                    .unwrap();
            }

            assert_eq!(ctx.upload_count(f.blocks.pixel_frame.buffer_id()), 1);
            assert_eq!(ctx.upload_count(f.blocks.pixel_object.buffer_id()), 2);
            assert!(ctx.commands().contains(&Command::SetConstantBuffers {
                stage: Stage::Pixel,
                first_slot: 0,
                buffers: vec![
                    f.blocks.pixel_frame.buffer_id(),
                    f.blocks.pixel_object.buffer_id()
                ],
            }));
        }
    }

    #[test]
    fn tessellated_draw_needs_all_stages() {
        let mut f = fixture();
        let mut ctx = MockContext::new(&f.mock);
        let mut frame = FrameOrchestrator::default();
        let program = f.shaders.program(Prog::Lit).unwrap();
        let mesh = f.geometry.mesh(()).unwrap();

        let err = f
            .blocks
            .draw_tessellated(
                &mut frame,
                &mut ctx,
                program,
                mesh,
                Mat4::IDENTITY,
                Material::default(),
                f.textures,
                f.states.linear_sampler(),
            )
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidItem { .. }));
    }

    #[test]
    fn destroy_releases_all_blocks() {
        let mock = Rc::new(MockDevice::new());
        let device: Rc<dyn Device> = mock.clone();
        let blocks = StandardBlocks::initialize(&device).unwrap();
        assert_eq!(mock.live_count(), 5);
        blocks.destroy().unwrap();
        assert_eq!(mock.live_count(), 0);
    }
}
