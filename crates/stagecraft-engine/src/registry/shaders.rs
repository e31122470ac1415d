use std::rc::Rc;

use crate::backend::{Device, InputLayoutId, OwnedSet, ShaderId, ShaderSource, Stage};
use crate::vertex::VertexFormat;

use super::error::{create_err, RegistryError};
use super::{ensure_unique, find, RegistryKey};

const NAME: &str = "shader";

/// Graphics program: a vertex stage, optional later stages, and the buffer
/// slots its input layout reads.
#[derive(Debug, Clone)]
pub struct ProgramSpec<'a, K> {
    pub key: K,
    pub vertex: ShaderSource<'a>,
    pub hull: Option<ShaderSource<'a>>,
    pub domain: Option<ShaderSource<'a>>,
    pub pixel: Option<ShaderSource<'a>>,
    /// Slot 0 is the mesh format; slot 1, when present, the instance format.
    pub slots: &'a [&'static VertexFormat],
}

impl<'a, K> ProgramSpec<'a, K> {
    pub fn new(key: K, vertex: ShaderSource<'a>, slots: &'a [&'static VertexFormat]) -> Self {
        Self {
            key,
            vertex,
            hull: None,
            domain: None,
            pixel: None,
            slots,
        }
    }

    pub fn with_hull(mut self, hull: ShaderSource<'a>) -> Self {
        self.hull = Some(hull);
        self
    }

    pub fn with_domain(mut self, domain: ShaderSource<'a>) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_pixel(mut self, pixel: ShaderSource<'a>) -> Self {
        self.pixel = Some(pixel);
        self
    }
}

/// Compute-only program.
#[derive(Debug, Clone)]
pub struct ComputeSpec<'a, K> {
    pub key: K,
    pub source: ShaderSource<'a>,
}

/// Handles for one graphics program.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderProgram {
    pub vertex: ShaderId,
    pub hull: Option<ShaderId>,
    pub domain: Option<ShaderId>,
    pub pixel: Option<ShaderId>,
    pub input_layout: InputLayoutId,
    pub slots: Vec<&'static VertexFormat>,
}

impl ShaderProgram {
    /// Format of buffer slot 0.
    pub fn vertex_format(&self) -> &'static VertexFormat {
        self.slots[0]
    }

    /// Format of buffer slot 1, for instanced programs.
    pub fn instance_format(&self) -> Option<&'static VertexFormat> {
        self.slots.get(1).copied()
    }

    pub fn is_tessellated(&self) -> bool {
        self.hull.is_some() && self.domain.is_some()
    }

    pub fn stage(&self, stage: Stage) -> Option<ShaderId> {
        match stage {
            Stage::Vertex => Some(self.vertex),
            Stage::Hull => self.hull,
            Stage::Domain => self.domain,
            Stage::Pixel => self.pixel,
            Stage::Compute => None,
        }
    }
}

/// Owns every shader stage object and input layout.
#[derive(Debug)]
pub struct ShaderRegistry<K: RegistryKey> {
    programs: Vec<(K, ShaderProgram)>,
    kernels: Vec<(K, ShaderId)>,
    owned: OwnedSet,
}

impl<K: RegistryKey> ShaderRegistry<K> {
    pub fn init_all(
        device: &Rc<dyn Device>,
        programs: &[ProgramSpec<'_, K>],
        kernels: &[ComputeSpec<'_, K>],
    ) -> Result<Self, RegistryError> {
        ensure_unique(NAME, programs.iter().map(|p| p.key))?;
        ensure_unique(NAME, kernels.iter().map(|k| k.key))?;

        let mut owned = OwnedSet::new(device.clone());
        let mut built = Vec::with_capacity(programs.len());

        for spec in programs {
            let program = build_program(device.as_ref(), &mut owned, spec)?;
            log::debug!(
                "program {:?}: {} slot(s), tessellated: {}",
                spec.key,
                program.slots.len(),
                program.is_tessellated()
            );
            built.push((spec.key, program));
        }

        let mut built_kernels = Vec::with_capacity(kernels.len());
        for spec in kernels {
            let cs = owned.track(
                device
                    .create_shader(Stage::Compute, &spec.source)
                    .map_err(create_err(NAME, spec.source.label.to_string()))?,
            );
            built_kernels.push((spec.key, cs));
        }

        log::info!(
            "{NAME} registry ready: {} program(s), {} kernel(s), {} objects",
            built.len(),
            built_kernels.len(),
            owned.len()
        );

        Ok(Self {
            programs: built,
            kernels: built_kernels,
            owned,
        })
    }

    pub fn destroy_all(mut self) -> Result<(), RegistryError> {
        let count = self.owned.len();
        self.owned
            .release_all()
            .map_err(|source| RegistryError::Release {
                registry: NAME,
                source,
            })?;
        log::info!("{NAME} registry destroyed: {count} objects");
        Ok(())
    }

    pub fn program(&self, key: K) -> Result<&ShaderProgram, RegistryError> {
        find(&self.programs, key).ok_or_else(|| RegistryError::Missing {
            registry: NAME,
            item: format!("{key:?}"),
        })
    }

    pub fn kernel(&self, key: K) -> Result<ShaderId, RegistryError> {
        find(&self.kernels, key)
            .copied()
            .ok_or_else(|| RegistryError::Missing {
                registry: NAME,
                item: format!("{key:?}"),
            })
    }

    pub fn programs(&self) -> impl Iterator<Item = (K, &ShaderProgram)> {
        self.programs.iter().map(|(k, p)| (*k, p))
    }

    pub fn object_count(&self) -> usize {
        self.owned.len()
    }
}

fn build_program<K: RegistryKey>(
    device: &dyn Device,
    owned: &mut OwnedSet,
    spec: &ProgramSpec<'_, K>,
) -> Result<ShaderProgram, RegistryError> {
    let item = |label: &str| format!("{:?}/{label}", spec.key);

    if spec.slots.is_empty() {
        return Err(RegistryError::Missing {
            registry: NAME,
            item: item("vertex format"),
        });
    }
    for format in spec.slots {
        format
            .validate()
            .map_err(|source| RegistryError::InvalidVertexFormat {
                item: item(format.name),
                source,
            })?;
    }

    let mut create = |stage: Stage, source: &ShaderSource<'_>| {
        device
            .create_shader(stage, source)
            .map(|id| owned.track(id))
            .map_err(create_err(NAME, item(source.label)))
    };

    let vertex = create(Stage::Vertex, &spec.vertex)?;
    let hull = spec.hull.as_ref().map(|s| create(Stage::Hull, s)).transpose()?;
    let domain = spec.domain.as_ref().map(|s| create(Stage::Domain, s)).transpose()?;
    let pixel = spec.pixel.as_ref().map(|s| create(Stage::Pixel, s)).transpose()?;

    let layout_label = item("input layout");
    let input_layout = owned.track(
        device
            .create_input_layout(&layout_label, spec.slots, vertex)
            .map_err(create_err(NAME, layout_label.clone()))?,
    );

    Ok(ShaderProgram {
        vertex,
        hull,
        domain,
        pixel,
        input_layout,
        slots: spec.slots.to_vec(),
    })
}
