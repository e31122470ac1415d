use std::f32::consts::TAU;

use glam::Vec3;

use crate::vertex::Vertex;

/// CPU-side mesh consumed verbatim by the geometry registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// Flat grid in the XZ plane centred at the origin.
///
/// `rows` cells along Z and `columns` cells along X give
/// `(rows + 1) * (columns + 1)` vertices and `6 * rows * columns` indices.
/// A zero count is raised to 1, so the result always has at least one cell.
pub fn grid(width: f32, depth: f32, rows: u32, columns: u32) -> MeshData {
    let rows = rows.max(1);
    let columns = columns.max(1);
    let vertex_columns = columns + 1;

    let half_width = 0.5 * width;
    let half_depth = 0.5 * depth;
    let dx = width / columns as f32;
    let dz = depth / rows as f32;
    let du = 1.0 / columns as f32;
    let dv = 1.0 / rows as f32;

    let mut mesh = MeshData {
        vertices: Vec::with_capacity(((rows + 1) * vertex_columns) as usize),
        indices: Vec::with_capacity((6 * rows * columns) as usize),
    };

    for i in 0..=rows {
        let z = half_depth - i as f32 * dz;
        for j in 0..=columns {
            let x = -half_width + j as f32 * dx;
            mesh.vertices.push(Vertex::new(
                [x, 0.0, z],
                [0.0, 1.0, 0.0],
                [j as f32 * du, i as f32 * dv],
            ));
        }
    }

    for i in 0..rows {
        for j in 0..columns {
            let a = i * vertex_columns + j;
            let b = a + 1;
            let c = a + vertex_columns;
            let d = c + 1;
            mesh.indices.extend_from_slice(&[a, b, c, c, b, d]);
        }
    }

    mesh
}

/// Capped cylinder (or cone frustum) along +Y, centred at the origin.
///
/// Each ring repeats its first vertex so texture coordinates wrap cleanly.
/// `slices` is raised to at least 3 and `stacks` to at least 1.
pub fn cylinder(
    bottom_radius: f32,
    top_radius: f32,
    height: f32,
    slices: u32,
    stacks: u32,
) -> MeshData {
    let slices = slices.max(3);
    let stacks = stacks.max(1);

    let mut mesh = MeshData::default();

    let stack_height = height / stacks as f32;
    let radius_step = (top_radius - bottom_radius) / stacks as f32;
    let ring_count = stacks + 1;
    let d_theta = TAU / slices as f32;
    let dr = bottom_radius - top_radius;

    for i in 0..ring_count {
        let y = -0.5 * height + i as f32 * stack_height;
        let r = bottom_radius + i as f32 * radius_step;

        for j in 0..=slices {
            let (s, c) = (j as f32 * d_theta).sin_cos();
            let tangent = Vec3::new(-s, 0.0, c);
            let bitangent = Vec3::new(dr * c, -height, dr * s);
            let normal = tangent.cross(bitangent).normalize_or_zero();

            mesh.vertices.push(Vertex::new(
                [r * c, y, r * s],
                normal.to_array(),
                [j as f32 / slices as f32, 1.0 - i as f32 / stacks as f32],
            ));
        }
    }

    let ring_vertices = slices + 1;
    for i in 0..stacks {
        for j in 0..slices {
            let a = i * ring_vertices + j;
            let b = (i + 1) * ring_vertices + j;
            mesh.indices
                .extend_from_slice(&[a, b, b + 1, a, b + 1, a + 1]);
        }
    }

    push_cap(&mut mesh, top_radius, 0.5 * height, slices, true);
    push_cap(&mut mesh, bottom_radius, -0.5 * height, slices, false);

    mesh
}

fn push_cap(mesh: &mut MeshData, radius: f32, y: f32, slices: u32, top: bool) {
    let base = mesh.vertex_count();
    let d_theta = TAU / slices as f32;
    let ny = if top { 1.0 } else { -1.0 };
    // Texture coordinates scale with the cap so the texel density matches the side.
    let uv_scale = if y != 0.0 { 1.0 / (2.0 * y.abs()) } else { 1.0 };

    for j in 0..=slices {
        let (s, c) = (j as f32 * d_theta).sin_cos();
        let x = radius * c;
        let z = radius * s;
        mesh.vertices.push(Vertex::new(
            [x, y, z],
            [0.0, ny, 0.0],
            [x * uv_scale + 0.5, z * uv_scale + 0.5],
        ));
    }

    let center = mesh.vertex_count();
    mesh.vertices
        .push(Vertex::new([0.0, y, 0.0], [0.0, ny, 0.0], [0.5, 0.5]));

    for j in 0..slices {
        if top {
            mesh.indices
                .extend_from_slice(&[center, base + j + 1, base + j]);
        } else {
            mesh.indices
                .extend_from_slice(&[center, base + j, base + j + 1]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── grid ────────────────────────────────────────────────────────────────

    #[test]
    fn grid_100_by_100_counts() {
        let mesh = grid(400.0, 400.0, 100, 100);
        assert_eq!(mesh.index_count(), 6 * 100 * 100);
        assert_eq!(mesh.vertex_count(), 101 * 101);
    }

    #[test]
    fn grid_indices_in_range() {
        let mesh = grid(10.0, 20.0, 3, 7);
        assert_eq!(mesh.vertex_count(), 4 * 8);
        assert!(mesh.indices.iter().all(|&i| i < mesh.vertex_count()));
    }

    #[test]
    fn grid_spans_extent() {
        let mesh = grid(10.0, 20.0, 2, 2);
        let first = mesh.vertices[0].position;
        let last = mesh.vertices[mesh.vertices.len() - 1].position;
        assert_eq!(first, [-5.0, 0.0, 10.0]);
        assert_eq!(last, [5.0, 0.0, -10.0]);
    }

    // ── cylinder ────────────────────────────────────────────────────────────

    #[test]
    fn zero_counts_are_raised_to_the_minimum() {
        assert_eq!(grid(10.0, 10.0, 0, 0), grid(10.0, 10.0, 1, 1));
        assert_eq!(cylinder(1.0, 1.0, 2.0, 0, 0), cylinder(1.0, 1.0, 2.0, 3, 1));
    }

    #[test]
    fn cylinder_counts() {
        let (slices, stacks) = (20, 10);
        let mesh = cylinder(10.0, 10.0, 50.0, slices, stacks);

        let side = (stacks + 1) * (slices + 1);
        let caps = 2 * (slices + 2);
        assert_eq!(mesh.vertex_count(), side + caps);
        assert_eq!(mesh.index_count(), 6 * stacks * slices + 2 * 3 * slices);
        assert!(mesh.indices.iter().all(|&i| i < mesh.vertex_count()));
    }

    #[test]
    fn straight_cylinder_side_normals_are_horizontal() {
        let mesh = cylinder(2.0, 2.0, 4.0, 8, 1);
        for v in &mesh.vertices[..18] {
            assert!(v.normal[1].abs() < 1e-5, "normal {:?}", v.normal);
            let len = Vec3::from(v.normal).length();
            assert!((len - 1.0).abs() < 1e-5);
        }
    }
}
