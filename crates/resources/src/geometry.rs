//! Procedural mesh generation.
//!
//! Generates the demo scene's primitive shapes. Vertex attributes are kept
//! as parallel arrays; the renderer interleaves them into its GPU vertex
//! format when uploading.

use glam::{Vec2, Vec3};

/// CPU-side mesh: parallel attribute arrays plus an index list.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tex_coords: Vec<Vec2>,
    pub tangents: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn push_vertex(&mut self, position: Vec3, normal: Vec3, uv: Vec2, tangent: Vec3) {
        self.positions.push(position);
        self.normals.push(normal);
        self.tex_coords.push(uv);
        self.tangents.push(tangent);
    }
}

/// An axis-aligned box centered at the origin.
pub fn create_box(width: f32, height: f32, depth: f32) -> MeshData {
    let (w, h, d) = (width * 0.5, height * 0.5, depth * 0.5);
    let mut mesh = MeshData::default();

    // Six faces: (normal, tangent, four corners).
    let faces: [(Vec3, Vec3, [Vec3; 4]); 6] = [
        // +Z
        (
            Vec3::Z,
            Vec3::X,
            [
                Vec3::new(-w, -h, d),
                Vec3::new(w, -h, d),
                Vec3::new(w, h, d),
                Vec3::new(-w, h, d),
            ],
        ),
        // -Z
        (
            Vec3::NEG_Z,
            Vec3::NEG_X,
            [
                Vec3::new(w, -h, -d),
                Vec3::new(-w, -h, -d),
                Vec3::new(-w, h, -d),
                Vec3::new(w, h, -d),
            ],
        ),
        // +X
        (
            Vec3::X,
            Vec3::NEG_Z,
            [
                Vec3::new(w, -h, d),
                Vec3::new(w, -h, -d),
                Vec3::new(w, h, -d),
                Vec3::new(w, h, d),
            ],
        ),
        // -X
        (
            Vec3::NEG_X,
            Vec3::Z,
            [
                Vec3::new(-w, -h, -d),
                Vec3::new(-w, -h, d),
                Vec3::new(-w, h, d),
                Vec3::new(-w, h, -d),
            ],
        ),
        // +Y
        (
            Vec3::Y,
            Vec3::X,
            [
                Vec3::new(-w, h, d),
                Vec3::new(w, h, d),
                Vec3::new(w, h, -d),
                Vec3::new(-w, h, -d),
            ],
        ),
        // -Y
        (
            Vec3::NEG_Y,
            Vec3::X,
            [
                Vec3::new(-w, -h, -d),
                Vec3::new(w, -h, -d),
                Vec3::new(w, -h, d),
                Vec3::new(-w, -h, d),
            ],
        ),
    ];

    let uvs = [
        Vec2::new(0.0, 1.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(0.0, 0.0),
    ];

    for (normal, tangent, corners) in faces {
        let base = mesh.vertex_count() as u32;
        for (corner, uv) in corners.iter().zip(uvs.iter()) {
            mesh.push_vertex(*corner, normal, *uv, tangent);
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    mesh
}

/// A flat grid in the XZ plane centered at the origin, `m` x `n` vertices.
pub fn create_grid(width: f32, depth: f32, m: u32, n: u32) -> MeshData {
    assert!(m >= 2 && n >= 2, "grid needs at least 2x2 vertices");
    let mut mesh = MeshData::default();

    let half_w = width * 0.5;
    let half_d = depth * 0.5;
    let dx = width / (n - 1) as f32;
    let dz = depth / (m - 1) as f32;

    for i in 0..m {
        let z = half_d - i as f32 * dz;
        for j in 0..n {
            let x = -half_w + j as f32 * dx;
            mesh.push_vertex(
                Vec3::new(x, 0.0, z),
                Vec3::Y,
                Vec2::new(j as f32 * dx / width, i as f32 * dz / depth),
                Vec3::X,
            );
        }
    }

    for i in 0..m - 1 {
        for j in 0..n - 1 {
            let a = i * n + j;
            let b = i * n + j + 1;
            let c = (i + 1) * n + j;
            let d = (i + 1) * n + j + 1;
            mesh.indices.extend_from_slice(&[a, b, d, a, d, c]);
        }
    }

    mesh
}

/// A UV sphere centered at the origin.
pub fn create_sphere(radius: f32, slices: u32, stacks: u32) -> MeshData {
    assert!(slices >= 3 && stacks >= 2);
    let mut mesh = MeshData::default();

    // Top pole.
    mesh.push_vertex(
        Vec3::new(0.0, radius, 0.0),
        Vec3::Y,
        Vec2::new(0.0, 0.0),
        Vec3::X,
    );

    let phi_step = std::f32::consts::PI / stacks as f32;
    let theta_step = std::f32::consts::TAU / slices as f32;

    for i in 1..stacks {
        let phi = i as f32 * phi_step;
        for j in 0..=slices {
            let theta = j as f32 * theta_step;
            let position = Vec3::new(
                radius * phi.sin() * theta.cos(),
                radius * phi.cos(),
                radius * phi.sin() * theta.sin(),
            );
            let tangent = Vec3::new(-phi.sin() * theta.sin(), 0.0, phi.sin() * theta.cos())
                .normalize_or(Vec3::X);
            mesh.push_vertex(
                position,
                position.normalize(),
                Vec2::new(theta / std::f32::consts::TAU, phi / std::f32::consts::PI),
                tangent,
            );
        }
    }

    // Bottom pole.
    mesh.push_vertex(
        Vec3::new(0.0, -radius, 0.0),
        Vec3::NEG_Y,
        Vec2::new(0.0, 1.0),
        Vec3::X,
    );

    // Top cap.
    for j in 1..=slices {
        mesh.indices.extend_from_slice(&[0, j + 1, j]);
    }

    // Interior stacks.
    let ring = slices + 1;
    let mut base = 1u32;
    for i in 0..stacks - 2 {
        for j in 0..slices {
            mesh.indices.extend_from_slice(&[
                base + i * ring + j,
                base + i * ring + j + 1,
                base + (i + 1) * ring + j,
            ]);
            mesh.indices.extend_from_slice(&[
                base + (i + 1) * ring + j,
                base + i * ring + j + 1,
                base + (i + 1) * ring + j + 1,
            ]);
        }
    }

    // Bottom cap.
    let south = mesh.vertex_count() as u32 - 1;
    base = south - ring;
    for j in 0..slices {
        mesh.indices.extend_from_slice(&[south, base + j, base + j + 1]);
    }

    mesh
}

/// A capped cylinder along the Y axis centered at the origin.
pub fn create_cylinder(
    bottom_radius: f32,
    top_radius: f32,
    height: f32,
    slices: u32,
    stacks: u32,
) -> MeshData {
    assert!(slices >= 3 && stacks >= 1);
    let mut mesh = MeshData::default();

    let stack_height = height / stacks as f32;
    let radius_step = (top_radius - bottom_radius) / stacks as f32;
    let theta_step = std::f32::consts::TAU / slices as f32;

    // Side rings.
    for i in 0..=stacks {
        let y = -0.5 * height + i as f32 * stack_height;
        let r = bottom_radius + i as f32 * radius_step;
        for j in 0..=slices {
            let theta = j as f32 * theta_step;
            let (sin_t, cos_t) = theta.sin_cos();
            let tangent = Vec3::new(-sin_t, 0.0, cos_t);
            // Slope term makes the normal correct for cones too.
            let dr = bottom_radius - top_radius;
            let bitangent = Vec3::new(dr * cos_t, -height, dr * sin_t);
            let normal = tangent.cross(bitangent).normalize();
            mesh.push_vertex(
                Vec3::new(r * cos_t, y, r * sin_t),
                normal,
                Vec2::new(j as f32 / slices as f32, 1.0 - i as f32 / stacks as f32),
                tangent,
            );
        }
    }

    let ring = slices + 1;
    for i in 0..stacks {
        for j in 0..slices {
            mesh.indices.extend_from_slice(&[
                i * ring + j,
                (i + 1) * ring + j,
                (i + 1) * ring + j + 1,
            ]);
            mesh.indices.extend_from_slice(&[
                i * ring + j,
                (i + 1) * ring + j + 1,
                i * ring + j + 1,
            ]);
        }
    }

    build_cylinder_cap(&mut mesh, top_radius, 0.5 * height, slices, true);
    build_cylinder_cap(&mut mesh, bottom_radius, -0.5 * height, slices, false);

    mesh
}

fn build_cylinder_cap(mesh: &mut MeshData, radius: f32, y: f32, slices: u32, top: bool) {
    let base = mesh.vertex_count() as u32;
    let normal = if top { Vec3::Y } else { Vec3::NEG_Y };
    let theta_step = std::f32::consts::TAU / slices as f32;

    for j in 0..=slices {
        let theta = j as f32 * theta_step;
        let (sin_t, cos_t) = theta.sin_cos();
        mesh.push_vertex(
            Vec3::new(radius * cos_t, y, radius * sin_t),
            normal,
            Vec2::new(cos_t * 0.5 + 0.5, sin_t * 0.5 + 0.5),
            Vec3::X,
        );
    }
    // Center vertex.
    mesh.push_vertex(Vec3::new(0.0, y, 0.0), normal, Vec2::new(0.5, 0.5), Vec3::X);

    let center = mesh.vertex_count() as u32 - 1;
    for j in 0..slices {
        if top {
            mesh.indices.extend_from_slice(&[center, base + j + 1, base + j]);
        } else {
            mesh.indices.extend_from_slice(&[center, base + j, base + j + 1]);
        }
    }
}

/// A quad in the XY plane, used by the debug layer to visualize the
/// shadow map. `(x, y)` is the top-left corner in NDC-style coordinates.
pub fn create_quad(x: f32, y: f32, width: f32, height: f32, depth: f32) -> MeshData {
    let mut mesh = MeshData::default();

    mesh.push_vertex(
        Vec3::new(x, y - height, depth),
        Vec3::NEG_Z,
        Vec2::new(0.0, 1.0),
        Vec3::X,
    );
    mesh.push_vertex(Vec3::new(x, y, depth), Vec3::NEG_Z, Vec2::new(0.0, 0.0), Vec3::X);
    mesh.push_vertex(
        Vec3::new(x + width, y, depth),
        Vec3::NEG_Z,
        Vec2::new(1.0, 0.0),
        Vec3::X,
    );
    mesh.push_vertex(
        Vec3::new(x + width, y - height, depth),
        Vec3::NEG_Z,
        Vec2::new(1.0, 1.0),
        Vec3::X,
    );
    mesh.indices.extend_from_slice(&[0, 1, 2, 0, 2, 3]);

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_mesh_consistent(mesh: &MeshData) {
        let n = mesh.vertex_count();
        assert_eq!(mesh.normals.len(), n);
        assert_eq!(mesh.tex_coords.len(), n);
        assert_eq!(mesh.tangents.len(), n);
        assert_eq!(mesh.indices.len() % 3, 0);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < n));
    }

    #[test]
    fn test_box_topology() {
        let mesh = create_box(1.0, 1.0, 1.0);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);
        assert_mesh_consistent(&mesh);
    }

    #[test]
    fn test_grid_topology() {
        let mesh = create_grid(20.0, 30.0, 60, 40);
        assert_eq!(mesh.vertex_count(), 60 * 40);
        assert_eq!(mesh.triangle_count(), 59 * 39 * 2);
        assert_mesh_consistent(&mesh);
        assert!(mesh.positions.iter().all(|p| p.y == 0.0));
    }

    #[test]
    fn test_sphere_radius_and_normals() {
        let mesh = create_sphere(2.0, 20, 20);
        assert_mesh_consistent(&mesh);
        for (position, normal) in mesh.positions.iter().zip(mesh.normals.iter()) {
            assert!((position.length() - 2.0).abs() < 1e-4);
            assert!((*normal - position.normalize()).length() < 1e-4);
        }
    }

    #[test]
    fn test_cylinder_bounds() {
        let mesh = create_cylinder(0.5, 0.3, 3.0, 20, 20);
        assert_mesh_consistent(&mesh);
        for position in &mesh.positions {
            assert!(position.y >= -1.5 - 1e-4 && position.y <= 1.5 + 1e-4);
        }
    }

    #[test]
    fn test_quad_is_two_triangles() {
        let mesh = create_quad(0.0, 0.0, 1.0, 1.0, 0.0);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_mesh_consistent(&mesh);
    }
}
