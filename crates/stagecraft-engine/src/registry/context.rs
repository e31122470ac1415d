use std::rc::Rc;

use crate::backend::Device;

use super::error::RegistryError;
use super::geometry::{GeometryRegistry, GeometrySpec};
use super::resources::{ResourceRegistry, TextureLoader, TextureSpec};
use super::shaders::{ComputeSpec, ProgramSpec, ShaderRegistry};
use super::states::PipelineStateRegistry;
use super::RegistryKey;

/// A program and the mesh (plus optional instance buffer) it is drawn with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pairing<SK, GK> {
    pub program: SK,
    pub mesh: GK,
    pub instances: Option<GK>,
}

impl<SK, GK> Pairing<SK, GK> {
    pub fn new(program: SK, mesh: GK) -> Self {
        Self {
            program,
            mesh,
            instances: None,
        }
    }

    pub fn instanced(program: SK, mesh: GK, instances: GK) -> Self {
        Self {
            program,
            mesh,
            instances: Some(instances),
        }
    }
}

/// Everything a demo loads before its first frame.
pub struct RenderManifest<'a, SK, RK, GK> {
    pub programs: &'a [ProgramSpec<'a, SK>],
    pub kernels: &'a [ComputeSpec<'a, SK>],
    pub textures: &'a [TextureSpec<'a, RK>],
    pub geometry: &'a [GeometrySpec<'a, GK>],
    /// Checked at init so a program is never drawn with a mesh of another
    /// vertex format.
    pub pairings: &'a [Pairing<SK, GK>],
}

/// The four registries of a demo, created and destroyed in dependency order.
pub struct RenderResources<SK: RegistryKey, RK: RegistryKey, GK: RegistryKey> {
    // Fields drop top to bottom, the reverse of init order.
    geometry: GeometryRegistry<GK>,
    resources: ResourceRegistry<RK>,
    shaders: ShaderRegistry<SK>,
    states: PipelineStateRegistry,
}

impl<SK: RegistryKey, RK: RegistryKey, GK: RegistryKey> RenderResources<SK, RK, GK> {
    /// Initializes states, shaders, resources and geometry, then validates
    /// the manifest's pairings.
    ///
    /// On failure every registry already built is dropped, newest first, which
    /// releases all of its objects.
    pub fn init_all(
        device: &Rc<dyn Device>,
        loader: &dyn TextureLoader,
        manifest: &RenderManifest<'_, SK, RK, GK>,
    ) -> Result<Self, RegistryError> {
        log::info!("initializing render resources on `{}`", device.backend_name());

        let states = PipelineStateRegistry::init_all(device)?;
        let shaders = ShaderRegistry::init_all(device, manifest.programs, manifest.kernels)?;
        let resources = ResourceRegistry::init_all(device, loader, manifest.textures)?;
        let geometry = GeometryRegistry::init_all(device, manifest.geometry)?;

        for pairing in manifest.pairings {
            check_pairing(&shaders, &geometry, pairing)?;
        }

        Ok(Self {
            geometry,
            resources,
            shaders,
            states,
        })
    }

    /// Destroys geometry, resources, shaders and states, in that order.
    ///
    /// A failed registry does not stop the ones after it; the first error is
    /// returned.
    pub fn destroy_all(self) -> Result<(), RegistryError> {
        let Self {
            geometry,
            resources,
            shaders,
            states,
        } = self;

        let results = [
            geometry.destroy_all(),
            resources.destroy_all(),
            shaders.destroy_all(),
            states.destroy_all(),
        ];

        let mut first = None;
        for err in results.into_iter().filter_map(Result::err) {
            log::error!("render resources teardown: {err}");
            first.get_or_insert(err);
        }
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[inline]
    pub fn states(&self) -> &PipelineStateRegistry {
        &self.states
    }

    #[inline]
    pub fn shaders(&self) -> &ShaderRegistry<SK> {
        &self.shaders
    }

    #[inline]
    pub fn resources(&self) -> &ResourceRegistry<RK> {
        &self.resources
    }

    #[inline]
    pub fn geometry(&self) -> &GeometryRegistry<GK> {
        &self.geometry
    }

    pub fn object_count(&self) -> usize {
        self.states.object_count()
            + self.shaders.object_count()
            + self.resources.object_count()
            + self.geometry.object_count()
    }
}

fn check_pairing<SK: RegistryKey, GK: RegistryKey>(
    shaders: &ShaderRegistry<SK>,
    geometry: &GeometryRegistry<GK>,
    pairing: &Pairing<SK, GK>,
) -> Result<(), RegistryError> {
    let program = shaders.program(pairing.program)?;
    let mesh = geometry.mesh(pairing.mesh)?;

    let mismatch = |mesh_key: GK, expected: String, actual: String| {
        RegistryError::VertexFormatMismatch {
            program: format!("{:?}", pairing.program),
            mesh: format!("{mesh_key:?}"),
            expected,
            actual,
        }
    };

    if program.vertex_format() != mesh.vertex_format {
        return Err(mismatch(
            pairing.mesh,
            program.vertex_format().to_string(),
            mesh.vertex_format.to_string(),
        ));
    }

    match (program.instance_format(), pairing.instances) {
        (None, None) => {}
        (Some(expected), Some(key)) => {
            let instances = geometry.mesh(key)?;
            if expected != instances.vertex_format {
                return Err(mismatch(
                    key,
                    expected.to_string(),
                    instances.vertex_format.to_string(),
                ));
            }
        }
        (Some(expected), None) => {
            return Err(mismatch(
                pairing.mesh,
                expected.to_string(),
                "no instance buffer".to_string(),
            ));
        }
        (None, Some(key)) => {
            return Err(mismatch(
                key,
                "no instance buffer".to_string(),
                geometry.mesh(key)?.vertex_format.to_string(),
            ));
        }
    }

    log::debug!("pairing {:?} + {:?} validated", pairing.program, pairing.mesh);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockDevice;
    use crate::backend::{DeviceError, GpuObject, ResultCode, ShaderSource};
    use crate::geometry::{cylinder, grid, MeshData};
    use crate::registry::{DecodedImage, LoadError, TextureOrigin};
    use crate::vertex::{GpuVertex, InstanceData, Vertex, VertexFormat};
    use std::path::Path;

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Prog {
        Lit,
        Instanced,
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Tex {
        Checker,
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Geo {
        Grid,
        Cylinder,
        Instances,
    }

    struct NoFiles;

    impl TextureLoader for NoFiles {
        fn decode(&self, path: &Path) -> Result<DecodedImage, LoadError> {
            Err(LoadError {
                code: ResultCode::NotFound,
                detail: path.display().to_string(),
            })
        }
    }

    fn src(label: &'static str) -> ShaderSource<'static> {
        ShaderSource {
            label,
            wgsl: "// test program",
            entry_point: "main",
        }
    }

    const MESH: &[&VertexFormat] = &[Vertex::FORMAT];
    const INSTANCED: &[&VertexFormat] = &[Vertex::FORMAT, InstanceData::FORMAT];
    const CHECKER: [u8; 16] = [255; 16];

    struct Fixture {
        programs: Vec<ProgramSpec<'static, Prog>>,
        textures: Vec<TextureSpec<'static, Tex>>,
        grid: MeshData,
        cylinder: MeshData,
        instances: Vec<InstanceData>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                programs: vec![
                    ProgramSpec::new(Prog::Lit, src("lit vs"), MESH).with_pixel(src("lit ps")),
                    ProgramSpec::new(Prog::Instanced, src("instanced vs"), INSTANCED)
                        .with_pixel(src("instanced ps")),
                ],
                textures: vec![TextureSpec {
                    key: Tex::Checker,
                    label: "checker",
                    origin: TextureOrigin::Rgba8 {
                        width: 2,
                        height: 2,
                        pixels: &CHECKER,
                    },
                    srgb: true,
                }],
                grid: grid(160.0, 160.0, 50, 50),
                cylinder: cylinder(5.0, 5.0, 50.0, 12, 4),
                instances: (0..5)
                    .map(|i| InstanceData::from_translation(i as f32, 25.0, 0.0))
                    .collect(),
            }
        }

        fn geometry(&self) -> Vec<GeometrySpec<'_, Geo>> {
            vec![
                GeometrySpec::Indexed {
                    key: Geo::Grid,
                    label: "grid",
                    mesh: &self.grid,
                },
                GeometrySpec::Indexed {
                    key: Geo::Cylinder,
                    label: "cylinder",
                    mesh: &self.cylinder,
                },
                GeometrySpec::instances(Geo::Instances, "instances", &self.instances),
            ]
        }

        fn init(
            &self,
            device: &Rc<dyn Device>,
            pairings: &[Pairing<Prog, Geo>],
        ) -> Result<RenderResources<Prog, Tex, Geo>, RegistryError> {
            let geometry = self.geometry();
            RenderResources::init_all(
                device,
                &NoFiles,
                &RenderManifest {
                    programs: &self.programs,
                    kernels: &[],
                    textures: &self.textures,
                    geometry: &geometry,
                    pairings,
                },
            )
        }
    }

    const PAIRINGS: &[Pairing<Prog, Geo>] = &[
        Pairing {
            program: Prog::Lit,
            mesh: Geo::Grid,
            instances: None,
        },
        Pairing {
            program: Prog::Instanced,
            mesh: Geo::Cylinder,
            instances: Some(Geo::Instances),
        },
    ];

    fn setup() -> (Rc<MockDevice>, Rc<dyn Device>) {
        let mock = Rc::new(MockDevice::new());
        let device: Rc<dyn Device> = mock.clone();
        (mock, device)
    }

    #[test]
    fn init_destroy_init_round_trip() {
        let (mock, device) = setup();
        let fixture = Fixture::new();

        let first = fixture.init(&device, PAIRINGS).unwrap();
        let count = first.object_count();
        let grid_before = first.geometry().mesh(Geo::Grid).unwrap().clone();
        assert_eq!(mock.live_count(), count);
        first.destroy_all().unwrap();
        assert_eq!(mock.live_count(), 0);
        assert_eq!(mock.released_count(), count as u64);

        let second = fixture.init(&device, PAIRINGS).unwrap();
        assert_eq!(second.object_count(), count);
        assert_eq!(mock.live_count(), count);
        let grid_after = second.geometry().mesh(Geo::Grid).unwrap();
        assert_eq!(grid_before.range, grid_after.range);
        assert_eq!(grid_before.vertices_supplied, grid_after.vertices_supplied);
    }

    #[test]
    fn teardown_is_reverse_of_init() {
        let (mock, device) = setup();
        let fixture = Fixture::new();
        let render = fixture.init(&device, PAIRINGS).unwrap();
        let sampler = render.states().linear_sampler();
        let checker = render.resources().view(Tex::Checker).unwrap();
        let grid_vb = render.geometry().mesh(Geo::Grid).unwrap().vertex_buffer;
        let lit_vs = render.shaders().program(Prog::Lit).unwrap().vertex;

        render.destroy_all().unwrap();

        let log = mock.release_log();
        let pos = |o: GpuObject| log.iter().position(|x| *x == o).unwrap();
        assert!(pos(grid_vb.into()) < pos(checker.into()));
        assert!(pos(checker.into()) < pos(lit_vs.into()));
        assert!(pos(lit_vs.into()) < pos(sampler.into()));
        // The first state object created is the last one released.
        assert_eq!(log.last(), Some(&GpuObject::Sampler(sampler)));
    }

    #[test]
    fn dropping_releases_everything() {
        let (mock, device) = setup();
        let fixture = Fixture::new();
        let render = fixture.init(&device, PAIRINGS).unwrap();
        assert!(mock.live_count() > 0);
        drop(render);
        assert_eq!(mock.live_count(), 0);
    }

    #[test]
    fn out_of_order_release_is_detected() {
        let (mock, device) = setup();
        let fixture = Fixture::new();
        let render = fixture.init(&device, PAIRINGS).unwrap();

        // A layout created outside the registries keeps the lit vertex shader
        // referenced when the shader registry is torn down.
        let lit_vs = render.shaders().program(Prog::Lit).unwrap().vertex;
        let stray = device
            .create_input_layout("stray layout", MESH, lit_vs)
            .unwrap();

        let err = render.destroy_all().unwrap_err();
        match err {
            RegistryError::Release {
                registry,
                source: DeviceError::StillReferenced { object, dependents },
            } => {
                assert_eq!(registry, "shader");
                assert_eq!(object, GpuObject::Shader(lit_vs));
                assert_eq!(dependents, vec![GpuObject::InputLayout(stray)]);
            }
            other => panic!("unexpected error: {other}"),
        }

        // Everything else was still released.
        assert_eq!(mock.live_count(), 2);
        assert!(mock.is_live(lit_vs));
        assert!(mock.is_live(stray));
    }

    #[test]
    fn vertex_format_mismatch_fails_init() {
        let (mock, device) = setup();
        let fixture = Fixture::new();

        // Instance data bound where the lit program expects mesh vertices.
        let err = fixture
            .init(&device, &[Pairing::new(Prog::Lit, Geo::Instances)])
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::VertexFormatMismatch { .. }));
        assert!(err.to_string().contains("instance-world"));
        assert_eq!(mock.live_count(), 0);
    }

    #[test]
    fn instanced_program_needs_an_instance_buffer() {
        let (_mock, device) = setup();
        let fixture = Fixture::new();
        let err = fixture
            .init(&device, &[Pairing::new(Prog::Instanced, Geo::Cylinder)])
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::VertexFormatMismatch { .. }));

        let ok = fixture.init(
            &device,
            &[Pairing::instanced(Prog::Instanced, Geo::Cylinder, Geo::Instances)],
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn failure_in_a_later_registry_releases_earlier_ones() {
        let (mock, device) = setup();
        mock.fail_label("create_buffer", "cylinder indices", ResultCode::OutOfMemory);
        let fixture = Fixture::new();

        let err = fixture.init(&device, PAIRINGS).err().unwrap();
        assert_eq!(err.code(), Some(ResultCode::OutOfMemory));
        assert!(mock.created_count() > 10);
        assert_eq!(mock.live_count(), 0);
    }
}
