//! Integration test: build the full demo scene's CPU-side geometry the way
//! the renderer does at startup.

use drake_resources::geometry;

#[test]
fn test_demo_scene_shape_set_builds() {
    let shapes = [
        ("box", geometry::create_box(2.0, 1.0, 2.0)),
        ("grid", geometry::create_grid(20.0, 30.0, 60, 40)),
        ("sphere", geometry::create_sphere(0.5, 20, 20)),
        ("cylinder", geometry::create_cylinder(0.5, 0.3, 3.0, 20, 20)),
        ("quad", geometry::create_quad(0.0, 0.0, 1.0, 1.0, 0.0)),
    ];

    let mut total_vertices = 0usize;
    let mut total_indices = 0usize;
    for (name, mesh) in &shapes {
        assert!(mesh.vertex_count() > 0, "{name} produced no vertices");
        assert!(mesh.triangle_count() > 0, "{name} produced no triangles");
        assert_eq!(
            mesh.positions.len(),
            mesh.tangents.len(),
            "{name} attribute arrays diverge"
        );
        total_vertices += mesh.vertex_count();
        total_indices += mesh.indices.len();
    }

    // The renderer concatenates all shapes into one vertex/index buffer;
    // offsets only work if every index stays in its own mesh's range.
    assert!(total_vertices < u32::MAX as usize);
    assert!(total_indices % 3 == 0);
}

#[test]
fn test_normals_are_unit_length() {
    for mesh in [
        geometry::create_box(1.0, 1.0, 1.0),
        geometry::create_sphere(1.0, 16, 16),
        geometry::create_cylinder(0.5, 0.5, 2.0, 16, 4),
    ] {
        for normal in &mesh.normals {
            assert!((normal.length() - 1.0).abs() < 1e-3);
        }
    }
}
