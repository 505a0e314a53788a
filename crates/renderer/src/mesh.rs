//! GPU mesh buffers.
//!
//! Related shapes are concatenated into one vertex/index buffer pair with
//! named submesh ranges, so a draw is two binds plus per-submesh offsets.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use drake_resources::MeshData;
use drake_rhi::RhiResult;
use drake_rhi::buffer::{Buffer, BufferUsage};
use drake_rhi::device::Device;
use drake_rhi::vertex::Vertex;
use drake_rhi::vk;

/// Index range of one named shape inside a [`MeshBuffer`].
#[derive(Clone, Copy, Debug)]
pub struct Submesh {
    pub index_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
}

/// A concatenated vertex/index buffer with named submesh ranges.
pub struct MeshBuffer {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    submeshes: HashMap<&'static str, Submesh>,
}

impl MeshBuffer {
    /// Uploads the given named meshes as one concatenated buffer pair.
    pub fn build(
        device: Arc<Device>,
        meshes: &[(&'static str, &MeshData)],
    ) -> RhiResult<Self> {
        let mut vertices: Vec<Vertex> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut submeshes = HashMap::new();

        for (name, mesh) in meshes {
            let submesh = Submesh {
                index_count: mesh.indices.len() as u32,
                first_index: indices.len() as u32,
                vertex_offset: vertices.len() as i32,
            };
            submeshes.insert(*name, submesh);

            vertices.extend((0..mesh.vertex_count()).map(|i| {
                Vertex::new(
                    mesh.positions[i].to_array(),
                    mesh.normals[i].to_array(),
                    mesh.tex_coords[i].to_array(),
                    mesh.tangents[i].to_array(),
                )
            }));
            indices.extend_from_slice(&mesh.indices);
        }

        let vertex_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&vertices),
        )?;
        let index_buffer =
            Buffer::new_with_data(device, BufferUsage::Index, bytemuck::cast_slice(&indices))?;

        debug!(
            "Mesh buffer built: {} submeshes, {} vertices, {} indices",
            submeshes.len(),
            vertices.len(),
            indices.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            submeshes,
        })
    }

    /// The vertex buffer handle.
    #[inline]
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    /// The index buffer handle (u32 indices).
    #[inline]
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    /// Looks up a submesh range by name.
    ///
    /// Panics on unknown names; scene construction uses fixed name sets,
    /// so a miss is a programmer error.
    pub fn submesh(&self, name: &str) -> Submesh {
        *self
            .submeshes
            .get(name)
            .unwrap_or_else(|| panic!("unknown submesh '{name}'"))
    }
}
