use std::rc::Rc;

use crate::backend::{
    BufferBinding, BufferDesc, BufferId, BufferUsage, Device, OwnedSet, VertexBufferBinding,
};
use crate::geometry::MeshData;
use crate::vertex::{GpuVertex, Vertex, VertexFormat};

use super::error::{create_err, RegistryError};
use super::{ensure_unique, find, RegistryKey};

const NAME: &str = "geometry";

/// One entry of the geometry manifest.
#[derive(Debug, Clone, Copy)]
pub enum GeometrySpec<'a, K> {
    /// A mesh with its own vertex and index buffer.
    Indexed {
        key: K,
        label: &'a str,
        mesh: &'a MeshData,
    },
    /// Several meshes sharing one vertex and one index buffer. Each part is
    /// addressed through its own `start_index` and `base_vertex`.
    Packed {
        label: &'a str,
        parts: &'a [(K, &'a MeshData)],
    },
    /// Per-instance data drawn without an index buffer.
    Instances {
        key: K,
        label: &'a str,
        bytes: &'a [u8],
        format: &'static VertexFormat,
        count: u32,
    },
}

impl<'a, K> GeometrySpec<'a, K> {
    pub fn instances<V: GpuVertex>(key: K, label: &'a str, data: &'a [V]) -> Self {
        GeometrySpec::Instances {
            key,
            label,
            bytes: bytemuck::cast_slice(data),
            format: V::FORMAT,
            count: data.len() as u32,
        }
    }
}

/// Which part of a mesh's buffers a draw reads.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DrawRange {
    Indexed {
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
    NonIndexed {
        vertex_count: u32,
        start_vertex: u32,
    },
}

/// Everything needed to bind and draw one mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshDescriptor {
    pub vertex_buffer: BufferId,
    pub index_buffer: Option<BufferId>,
    pub vertex_format: &'static VertexFormat,
    pub range: DrawRange,
    /// Vertices in `vertex_buffer`.
    pub vertices_supplied: u32,
    /// Indices in `index_buffer`, 0 when there is none.
    pub indices_supplied: u32,
}

impl MeshDescriptor {
    pub fn stride(&self) -> u32 {
        self.vertex_format.stride
    }

    pub fn vertex_binding(&self) -> VertexBufferBinding {
        VertexBufferBinding {
            buffer: self.vertex_buffer,
            stride: self.stride(),
            offset: 0,
        }
    }

    /// Number of elements one draw of this mesh reads: indices for indexed
    /// meshes, vertices (or instances) otherwise.
    pub fn element_count(&self) -> u32 {
        match self.range {
            DrawRange::Indexed { index_count, .. } => index_count,
            DrawRange::NonIndexed { vertex_count, .. } => vertex_count,
        }
    }

    /// Checks the draw range against what was supplied at creation.
    pub fn validate(&self) -> Result<(), String> {
        match self.range {
            DrawRange::Indexed {
                index_count,
                start_index,
                base_vertex,
            } => {
                if self.index_buffer.is_none() {
                    return Err("indexed range without an index buffer".into());
                }
                let end = u64::from(index_count) + u64::from(start_index);
                if end > u64::from(self.indices_supplied) {
                    return Err(format!(
                        "indices {start_index}..{end} exceed the {} supplied",
                        self.indices_supplied
                    ));
                }
                if base_vertex < 0 || base_vertex as u32 > self.vertices_supplied {
                    return Err(format!(
                        "base vertex {base_vertex} outside the {} supplied vertices",
                        self.vertices_supplied
                    ));
                }
            }
            DrawRange::NonIndexed {
                vertex_count,
                start_vertex,
            } => {
                let end = u64::from(vertex_count) + u64::from(start_vertex);
                if end > u64::from(self.vertices_supplied) {
                    return Err(format!(
                        "vertices {start_vertex}..{end} exceed the {} supplied",
                        self.vertices_supplied
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Owns every immutable vertex, index and instance buffer.
#[derive(Debug)]
pub struct GeometryRegistry<K: RegistryKey> {
    meshes: Vec<(K, MeshDescriptor)>,
    owned: OwnedSet,
}

impl<K: RegistryKey> GeometryRegistry<K> {
    pub fn init_all(
        device: &Rc<dyn Device>,
        specs: &[GeometrySpec<'_, K>],
    ) -> Result<Self, RegistryError> {
        ensure_unique(
            NAME,
            specs.iter().flat_map(|spec| match *spec {
                GeometrySpec::Indexed { key, .. } | GeometrySpec::Instances { key, .. } => {
                    vec![key]
                }
                GeometrySpec::Packed { parts, .. } => parts.iter().map(|(k, _)| *k).collect(),
            }),
        )?;

        let mut owned = OwnedSet::new(device.clone());
        let mut meshes = Vec::new();

        for spec in specs {
            match *spec {
                GeometrySpec::Indexed { key, label, mesh } => {
                    let parts = [(key, mesh)];
                    build_packed(device.as_ref(), &mut owned, label, &parts, &mut meshes)?;
                }
                GeometrySpec::Packed { label, parts } => {
                    build_packed(device.as_ref(), &mut owned, label, parts, &mut meshes)?;
                }
                GeometrySpec::Instances {
                    key,
                    label,
                    bytes,
                    format,
                    count,
                } => {
                    let desc = build_instances(device.as_ref(), &mut owned, label, bytes, format, count)?;
                    meshes.push((key, desc));
                }
            }
        }

        log::info!(
            "{NAME} registry ready: {} mesh(es), {} buffers",
            meshes.len(),
            owned.len()
        );

        Ok(Self { meshes, owned })
    }

    pub fn destroy_all(mut self) -> Result<(), RegistryError> {
        let count = self.owned.len();
        self.owned
            .release_all()
            .map_err(|source| RegistryError::Release {
                registry: NAME,
                source,
            })?;
        log::info!("{NAME} registry destroyed: {count} buffers");
        Ok(())
    }

    pub fn mesh(&self, key: K) -> Result<&MeshDescriptor, RegistryError> {
        find(&self.meshes, key).ok_or_else(|| RegistryError::Missing {
            registry: NAME,
            item: format!("{key:?}"),
        })
    }

    pub fn meshes(&self) -> impl Iterator<Item = (K, &MeshDescriptor)> {
        self.meshes.iter().map(|(k, m)| (*k, m))
    }

    pub fn object_count(&self) -> usize {
        self.owned.len()
    }
}

fn invalid(item: &str, detail: impl Into<String>) -> RegistryError {
    RegistryError::InvalidMesh {
        item: item.to_string(),
        detail: detail.into(),
    }
}

fn build_packed<K: RegistryKey>(
    device: &dyn Device,
    owned: &mut OwnedSet,
    label: &str,
    parts: &[(K, &MeshData)],
    out: &mut Vec<(K, MeshDescriptor)>,
) -> Result<(), RegistryError> {
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut ranges = Vec::with_capacity(parts.len());

    for (key, mesh) in parts {
        let item = format!("{label}/{key:?}");
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return Err(invalid(&item, "mesh has no vertices or no indices"));
        }
        if let Some(&bad) = mesh.indices.iter().find(|&&i| i >= mesh.vertex_count()) {
            return Err(invalid(
                &item,
                format!("index {bad} refers past {} vertices", mesh.vertex_count()),
            ));
        }

        let range = DrawRange::Indexed {
            index_count: mesh.index_count(),
            start_index: indices.len() as u32,
            base_vertex: vertices.len() as i32,
        };
        vertices.extend_from_slice(&mesh.vertices);
        indices.extend_from_slice(&mesh.indices);
        ranges.push((*key, item, range));
    }

    if ranges.is_empty() {
        return Err(invalid(label, "no meshes to pack"));
    }

    let vb_label = format!("{label} vertices");
    let vertex_buffer = owned.track(
        device
            .create_buffer(
                &BufferDesc {
                    label: &vb_label,
                    byte_width: (vertices.len() * size_of::<Vertex>()) as u64,
                    usage: BufferUsage::Immutable,
                    binding: BufferBinding::Vertex,
                },
                Some(bytemuck::cast_slice(&vertices)),
            )
            .map_err(create_err(NAME, vb_label.clone()))?,
    );

    let ib_label = format!("{label} indices");
    let index_buffer = owned.track(
        device
            .create_buffer(
                &BufferDesc {
                    label: &ib_label,
                    byte_width: (indices.len() * size_of::<u32>()) as u64,
                    usage: BufferUsage::Immutable,
                    binding: BufferBinding::Index,
                },
                Some(bytemuck::cast_slice(&indices)),
            )
            .map_err(create_err(NAME, ib_label.clone()))?,
    );

    for (key, item, range) in ranges {
        let desc = MeshDescriptor {
            vertex_buffer,
            index_buffer: Some(index_buffer),
            vertex_format: Vertex::FORMAT,
            range,
            vertices_supplied: vertices.len() as u32,
            indices_supplied: indices.len() as u32,
        };
        desc.validate().map_err(|detail| invalid(&item, detail))?;
        log::debug!("mesh `{item}`: {range:?}");
        out.push((key, desc));
    }
    Ok(())
}

fn build_instances(
    device: &dyn Device,
    owned: &mut OwnedSet,
    label: &str,
    bytes: &[u8],
    format: &'static VertexFormat,
    count: u32,
) -> Result<MeshDescriptor, RegistryError> {
    format
        .validate()
        .map_err(|source| RegistryError::InvalidVertexFormat {
            item: label.to_string(),
            source,
        })?;
    if count == 0 || bytes.len() as u64 != u64::from(count) * u64::from(format.stride) {
        return Err(invalid(
            label,
            format!(
                "{} bytes for {count} instance(s) of stride {}",
                bytes.len(),
                format.stride
            ),
        ));
    }

    let buffer = owned.track(
        device
            .create_buffer(
                &BufferDesc {
                    label,
                    byte_width: bytes.len() as u64,
                    usage: BufferUsage::Immutable,
                    binding: BufferBinding::Vertex,
                },
                Some(bytes),
            )
            .map_err(create_err(NAME, label.to_string()))?,
    );

    let desc = MeshDescriptor {
        vertex_buffer: buffer,
        index_buffer: None,
        vertex_format: format,
        range: DrawRange::NonIndexed {
            vertex_count: count,
            start_vertex: 0,
        },
        vertices_supplied: count,
        indices_supplied: 0,
    };
    desc.validate().map_err(|detail| invalid(label, detail))?;
    Ok(desc)
}
