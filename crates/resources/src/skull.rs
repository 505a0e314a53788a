//! Loader for the skull text model.
//!
//! The format is a whitespace-separated dump:
//!
//! ```text
//! VertexCount: 31076
//! TriangleCount: 60339
//! VertexList (pos, normal) {
//!     x y z nx ny nz
//!     ...
//! }
//! TriangleList {
//!     i0 i1 i2
//!     ...
//! }
//! ```
//!
//! The model has no UVs; tangents are synthesized per vertex so normal
//! mapping degenerates to the interpolated vertex normal.

use std::path::Path;

use glam::{Vec2, Vec3};
use tracing::info;

use crate::error::{ResourceError, ResourceResult};
use crate::geometry::MeshData;

/// Loads the skull model from `path`.
pub fn load(path: &Path) -> ResourceResult<MeshData> {
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    let mesh = parse(&text).map_err(|message| ResourceError::MalformedModel {
        path: path.to_path_buf(),
        message,
    })?;

    info!(
        "Loaded skull model: {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangle_count()
    );

    Ok(mesh)
}

/// Parses the skull text format.
fn parse(text: &str) -> Result<MeshData, String> {
    // Tokenize, dropping the brace/label tokens so only numbers remain
    // after the two counted headers.
    let mut tokens = text.split_whitespace();

    let vertex_count = read_counted(&mut tokens, "VertexCount:")?;
    let triangle_count = read_counted(&mut tokens, "TriangleCount:")?;

    let mut numbers = tokens.filter_map(|token| token.parse::<f32>().ok());

    let mut mesh = MeshData::default();
    for i in 0..vertex_count {
        let mut read = || {
            numbers
                .next()
                .ok_or_else(|| format!("vertex data truncated at vertex {i}"))
        };
        let position = Vec3::new(read()?, read()?, read()?);
        let normal = Vec3::new(read()?, read()?, read()?);

        mesh.positions.push(position);
        mesh.normals.push(normal);
        mesh.tex_coords.push(Vec2::ZERO);
        mesh.tangents.push(synthesize_tangent(normal));
    }

    for i in 0..triangle_count * 3 {
        let value = numbers
            .next()
            .ok_or_else(|| format!("index data truncated at index {i}"))?;
        let index = value as u32;
        if index as usize >= vertex_count {
            return Err(format!("index {index} out of range"));
        }
        mesh.indices.push(index);
    }

    Ok(mesh)
}

fn read_counted<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    label: &str,
) -> Result<usize, String> {
    loop {
        match tokens.next() {
            Some(token) if token == label => break,
            Some(_) => continue,
            None => return Err(format!("missing '{label}' header")),
        }
    }
    tokens
        .next()
        .ok_or_else(|| format!("'{label}' has no value"))?
        .parse::<usize>()
        .map_err(|_| format!("'{label}' value is not a number"))
}

/// Any tangent perpendicular to the normal works when no texture is
/// mapped; cross against whichever axis is less aligned with the normal.
fn synthesize_tangent(normal: Vec3) -> Vec3 {
    let up = if normal.dot(Vec3::Y).abs() < 1.0 - 0.001 {
        Vec3::Y
    } else {
        Vec3::Z
    };
    up.cross(normal).normalize_or(Vec3::X)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
VertexCount: 3
TriangleCount: 1
VertexList (pos, normal) {
    0.0 0.0 0.0  0.0 1.0 0.0
    1.0 0.0 0.0  0.0 1.0 0.0
    0.0 0.0 1.0  0.0 0.0 1.0
}
TriangleList {
    0 1 2
}";

    #[test]
    fn test_parse_sample() {
        let mesh = parse(SAMPLE).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.positions[1], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(mesh.normals[2], Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_tangents_are_perpendicular() {
        let mesh = parse(SAMPLE).unwrap();
        for (normal, tangent) in mesh.normals.iter().zip(mesh.tangents.iter()) {
            assert!(normal.dot(*tangent).abs() < 1e-5);
            assert!((tangent.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_truncated_vertices_rejected() {
        let text = "VertexCount: 2\nTriangleCount: 1\nVertexList {\n0 0 0 0 1 0\n}";
        assert!(parse(text).is_err());
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let text = "VertexCount: 1\nTriangleCount: 1\nVertexList {\n0 0 0 0 1 0\n}\nTriangleList {\n0 0 7\n}";
        assert!(parse(text).is_err());
    }

    #[test]
    fn test_missing_header_rejected() {
        assert!(parse("nothing here").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load(Path::new("assets/models/definitely_not_here.txt"));
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
