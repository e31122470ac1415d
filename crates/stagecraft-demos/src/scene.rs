use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use glam::Mat4;

use stagecraft_engine::backend::{CommandContext, Device, ShaderSource};
use stagecraft_engine::frame::{FrameOrchestrator, OrchestratorConfig, SceneInputs, StandardBlocks};
use stagecraft_engine::geometry::{cylinder, grid};
use stagecraft_engine::params::{DirectionalLight, Material};
use stagecraft_engine::registry::{
    GeometrySpec, ImageFileLoader, Pairing, ProgramSpec, RenderManifest, RenderResources,
    TextureOrigin, TextureSpec,
};
use stagecraft_engine::time::FrameTime;
use stagecraft_engine::vertex::{GpuVertex, InstanceData, Vertex, VertexFormat};

use crate::camera::OrbitCamera;

const LIT_COMMON: &str = include_str!("shaders/lit_common.wgsl");
const LIT: &str = include_str!("shaders/lit.wgsl");
const LIT_INSTANCED: &str = include_str!("shaders/lit_instanced.wgsl");

const MESH_SLOTS: &[&VertexFormat] = &[Vertex::FORMAT];
const INSTANCED_SLOTS: &[&VertexFormat] = &[Vertex::FORMAT, InstanceData::FORMAT];

const CHECKER_SIZE: u32 = 256;
const CHECKER_CELLS: u32 = 8;

/// Where the instancing demo places its columns.
pub const COLUMN_POSITIONS: [[f32; 3]; 5] = [
    [0.0, 25.0, 0.0],
    [50.0, 25.0, 50.0],
    [-50.0, 25.0, -50.0],
    [50.0, 25.0, -50.0],
    [-50.0, 25.0, 50.0],
];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Demo {
    /// Lit, textured ground grid.
    Texturing,
    /// The ground grid plus one cylinder drawn five times from an instance buffer.
    Instancing,
}

impl Demo {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "texturing" => Ok(Demo::Texturing),
            "instancing" => Ok(Demo::Instancing),
            other => anyhow::bail!("unknown demo `{other}`, expected `texturing` or `instancing`"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Demo::Texturing => "texturing",
            Demo::Instancing => "instancing",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Program {
    Lit,
    LitInstanced,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Texture {
    Ground,
    Column,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Mesh {
    Grid,
    Cylinder,
    Columns,
}

/// Everything one demo owns on the device, plus its camera.
pub struct Scene {
    demo: Demo,
    resources: RenderResources<Program, Texture, Mesh>,
    blocks: StandardBlocks,
    frame: FrameOrchestrator,
    camera: OrbitCamera,
}

impl Scene {
    /// Builds the demo's registries and parameter blocks.
    ///
    /// `ground_texture` replaces the procedural checker with an image file.
    pub fn load(demo: Demo, ground_texture: Option<&Path>, device: &Rc<dyn Device>) -> Result<Self> {
        let lit_wgsl = format!("{LIT_COMMON}\n{LIT}");
        let instanced_wgsl = format!("{LIT_COMMON}\n{LIT_INSTANCED}");

        let mut programs = vec![
            ProgramSpec::new(Program::Lit, vertex_source("lit vs", &lit_wgsl), MESH_SLOTS)
                .with_pixel(pixel_source("lit ps", &lit_wgsl)),
        ];

        let pixels = checker(
            CHECKER_SIZE,
            CHECKER_CELLS,
            [196, 186, 160, 255],
            [92, 120, 72, 255],
        );
        let ground_origin = match ground_texture {
            Some(path) => TextureOrigin::File(path),
            None => TextureOrigin::Rgba8 {
                width: CHECKER_SIZE,
                height: CHECKER_SIZE,
                pixels: &pixels,
            },
        };
        let mut textures = vec![TextureSpec {
            key: Texture::Ground,
            label: "ground",
            origin: ground_origin,
            srgb: true,
        }];

        let ground = grid(160.0, 160.0, 50, 50);
        let column = cylinder(8.0, 5.0, 50.0, 20, 4);
        let columns: Vec<InstanceData> = COLUMN_POSITIONS
            .iter()
            .map(|&[x, y, z]| InstanceData::from_translation(x, y, z))
            .collect();

        let mut geometry = vec![GeometrySpec::Indexed {
            key: Mesh::Grid,
            label: "ground grid",
            mesh: &ground,
        }];
        let mut pairings = vec![Pairing::new(Program::Lit, Mesh::Grid)];

        if demo == Demo::Instancing {
            programs.push(
                ProgramSpec::new(
                    Program::LitInstanced,
                    vertex_source("lit instanced vs", &instanced_wgsl),
                    INSTANCED_SLOTS,
                )
                .with_pixel(pixel_source("lit instanced ps", &instanced_wgsl)),
            );
            textures.push(TextureSpec {
                key: Texture::Column,
                label: "column",
                origin: TextureOrigin::Solid([230, 224, 210, 255]),
                srgb: true,
            });
            geometry.push(GeometrySpec::Indexed {
                key: Mesh::Cylinder,
                label: "column cylinder",
                mesh: &column,
            });
            geometry.push(GeometrySpec::instances(
                Mesh::Columns,
                "column instances",
                &columns,
            ));
            pairings.push(Pairing::instanced(
                Program::LitInstanced,
                Mesh::Cylinder,
                Mesh::Columns,
            ));
        }

        let manifest = RenderManifest {
            programs: &programs,
            kernels: &[],
            textures: &textures,
            geometry: &geometry,
            pairings: &pairings,
        };
        let resources = RenderResources::init_all(device, &ImageFileLoader, &manifest)
            .context("failed to load render resources")?;
        let blocks =
            StandardBlocks::initialize(device).context("failed to create parameter blocks")?;

        log::info!(
            "{} demo ready: {} device objects",
            demo.name(),
            resources.object_count()
        );

        Ok(Self {
            demo,
            resources,
            blocks,
            frame: FrameOrchestrator::new(OrchestratorConfig::default()),
            camera: OrbitCamera::default(),
        })
    }

    pub fn set_wireframe(&mut self, wireframe: bool) {
        self.frame.set_wireframe(wireframe);
    }

    /// Moves the camera and writes the per-frame blocks.
    pub fn update(&mut self, time: &FrameTime, aspect: f32) {
        self.camera.advance(time.dt);
        self.blocks.set_scene(&SceneInputs {
            view_projection: self.camera.view_projection(aspect),
            eye_position: self.camera.eye(),
            lights: DirectionalLight::three_point(),
        });
    }

    pub fn draw(&mut self, ctx: &mut dyn CommandContext) -> Result<()> {
        let Self {
            demo,
            resources,
            blocks,
            frame,
            ..
        } = self;

        let states = resources.states();
        frame.begin_frame(ctx, states)?;
        let sampler = states.anisotropic_sampler();

        blocks.draw_lit(
            frame,
            ctx,
            "ground",
            resources.shaders().program(Program::Lit)?,
            resources.geometry().mesh(Mesh::Grid)?,
            None,
            Mat4::IDENTITY,
            ground_material(),
            resources.resources().view(Texture::Ground)?,
            sampler,
        )?;

        if *demo == Demo::Instancing {
            let geometry = resources.geometry();
            blocks.draw_lit(
                frame,
                ctx,
                "columns",
                resources.shaders().program(Program::LitInstanced)?,
                geometry.mesh(Mesh::Cylinder)?,
                Some(geometry.mesh(Mesh::Columns)?),
                Mat4::IDENTITY,
                column_material(),
                resources.resources().view(Texture::Column)?,
                sampler,
            )?;
        }

        Ok(())
    }

    /// Releases the parameter blocks, then every registry.
    pub fn destroy(self) -> Result<()> {
        let blocks = self.blocks.destroy();
        let resources = self.resources.destroy_all();
        blocks.context("failed to release parameter blocks")?;
        resources.context("failed to release render resources")?;
        log::info!("{} demo torn down", self.demo.name());
        Ok(())
    }
}

fn vertex_source<'a>(label: &'a str, wgsl: &'a str) -> ShaderSource<'a> {
    ShaderSource {
        label,
        wgsl,
        entry_point: "vs_main",
    }
}

fn pixel_source<'a>(label: &'a str, wgsl: &'a str) -> ShaderSource<'a> {
    ShaderSource {
        label,
        wgsl,
        entry_point: "ps_main",
    }
}

fn ground_material() -> Material {
    Material {
        ambient: [1.0, 1.0, 1.0, 1.0],
        diffuse: [1.0, 1.0, 1.0, 1.0],
        specular: [0.1, 0.1, 0.1, 16.0],
        reflect: [0.0; 4],
    }
}

fn column_material() -> Material {
    Material {
        ambient: [0.7, 0.7, 0.7, 1.0],
        diffuse: [1.0, 1.0, 1.0, 1.0],
        specular: [0.6, 0.6, 0.6, 32.0],
        reflect: [0.0; 4],
    }
}

/// Square RGBA8 checkerboard of `cells` x `cells` squares.
pub fn checker(size: u32, cells: u32, light: [u8; 4], dark: [u8; 4]) -> Vec<u8> {
    let cell = (size / cells.max(1)).max(1);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let texel = if (x / cell + y / cell) % 2 == 0 { light } else { dark };
            pixels.extend_from_slice(&texel);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texel(pixels: &[u8], size: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * size + x) * 4) as usize;
        [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
    }

    #[test]
    fn checker_alternates_per_cell() {
        const L: [u8; 4] = [255, 255, 255, 255];
        const D: [u8; 4] = [0, 0, 0, 255];
        let pixels = checker(16, 4, L, D);

        assert_eq!(pixels.len(), 16 * 16 * 4);
        assert_eq!(texel(&pixels, 16, 0, 0), L);
        assert_eq!(texel(&pixels, 16, 3, 3), L);
        assert_eq!(texel(&pixels, 16, 4, 0), D);
        assert_eq!(texel(&pixels, 16, 4, 4), L);
        assert_eq!(texel(&pixels, 16, 15, 0), D);
    }

    #[test]
    fn demo_names_parse() {
        assert_eq!(Demo::from_name("texturing").unwrap(), Demo::Texturing);
        assert_eq!(Demo::from_name(" Instancing ").unwrap(), Demo::Instancing);
        assert!(Demo::from_name("terrain").is_err());
        for demo in [Demo::Texturing, Demo::Instancing] {
            assert_eq!(Demo::from_name(demo.name()).unwrap(), demo);
        }
    }

    #[test]
    fn instancing_demo_loads_on_the_mock_device() {
        use stagecraft_engine::backend::mock::MockDevice;

        let mock = Rc::new(MockDevice::new());
        let device: Rc<dyn Device> = mock.clone();

        let scene = Scene::load(Demo::Instancing, None, &device).unwrap();
        assert!(mock.live_count() > 0);

        scene.destroy().unwrap();
        assert_eq!(mock.live_count(), 0);
    }

    #[test]
    fn instancing_frame_draws_ground_then_columns() {
        use stagecraft_engine::backend::mock::{Command, MockContext, MockDevice};

        let mock = Rc::new(MockDevice::new());
        let device: Rc<dyn Device> = mock.clone();
        let mut scene = Scene::load(Demo::Instancing, None, &device).unwrap();

        let mut ctx = MockContext::new(&mock);
        let time = FrameTime {
            dt: 0.016,
            elapsed: 0.016,
            frame_index: 0,
        };
        scene.update(&time, 16.0 / 9.0);
        scene.draw(&mut ctx).unwrap();

        let draws: Vec<_> = ctx
            .commands()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Command::DrawIndexed { .. } | Command::DrawIndexedInstanced { .. }
                )
            })
            .collect();
        assert_eq!(draws.len(), 2);
        assert!(matches!(draws[0], Command::DrawIndexed { index_count: 15000, .. }));
        assert!(matches!(
            draws[1],
            Command::DrawIndexedInstanced {
                instance_count: 5,
                ..
            }
        ));
        // Lights go up once per frame; each draw brings its own material.
        assert_eq!(ctx.upload_count(scene.blocks.pixel_frame.buffer_id()), 1);
        assert_eq!(ctx.upload_count(scene.blocks.pixel_object.buffer_id()), 2);

        drop(ctx);
        scene.destroy().unwrap();
        assert_eq!(mock.live_count(), 0);
    }
}
