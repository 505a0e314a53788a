//! The shadow map.
//!
//! A fixed-size depth-only target rendered from the key light's view.
//! The shadow pass transitions it readable -> depth-write, renders the
//! opaque layer with a depth-biased pipeline, and transitions it back so
//! the main pass can sample it through its comparison sampler.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use tracing::debug;

use drake_rhi::RhiResult;
use drake_rhi::descriptor::TextureTable;
use drake_rhi::device::Device;
use drake_rhi::image::{Image, ImageDesc};
use drake_rhi::vk;

use crate::constants::ndc_to_texture;
use crate::depth_buffer::DEPTH_FORMAT;

/// Shadow map resolution (square).
pub const SHADOW_MAP_SIZE: u32 = 2048;

/// Light-space matrices for one frame.
#[derive(Clone, Copy, Debug)]
pub struct ShadowTransform {
    pub view: Mat4,
    pub proj: Mat4,
    /// World -> shadow-map texture coordinates.
    pub world_to_shadow: Mat4,
    pub light_pos: Vec3,
    pub near_z: f32,
    pub far_z: f32,
}

/// Fits an orthographic light frustum around the scene bounding sphere.
///
/// `light_dir` is the direction the key light travels; the light is
/// positioned behind the scene along it.
pub fn fit_to_scene(light_dir: Vec3, scene_center: Vec3, scene_radius: f32) -> ShadowTransform {
    let light_pos = scene_center - 2.0 * scene_radius * light_dir;
    let view = Mat4::look_at_rh(light_pos, scene_center, Vec3::Y);

    // Bounding sphere center in light space fixes the ortho box.
    let center_ls = view.transform_point3(scene_center);
    let near_z = -center_ls.z - scene_radius;
    let far_z = -center_ls.z + scene_radius;

    let proj = Mat4::orthographic_rh(
        center_ls.x - scene_radius,
        center_ls.x + scene_radius,
        center_ls.y - scene_radius,
        center_ls.y + scene_radius,
        near_z,
        far_z,
    );

    ShadowTransform {
        view,
        proj,
        world_to_shadow: ndc_to_texture() * proj * view,
        light_pos,
        near_z,
        far_z,
    }
}

/// The shadow map resource.
pub struct ShadowMap {
    image: Image,
    srv_slot: u32,
    extent: vk::Extent2D,
}

impl ShadowMap {
    /// Creates the shadow map and registers it in the texture table with
    /// the comparison sampler.
    pub fn new(
        device: Arc<Device>,
        table: &mut TextureTable,
        compare_sampler: vk::Sampler,
    ) -> RhiResult<Self> {
        let image = Image::new(
            device,
            &ImageDesc::depth_target(SHADOW_MAP_SIZE, SHADOW_MAP_SIZE, DEPTH_FORMAT),
        )?;
        let srv_slot = table.create_srv(
            image.view(),
            compare_sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );

        debug!(
            "Shadow map created: {}x{} (slot {})",
            SHADOW_MAP_SIZE, SHADOW_MAP_SIZE, srv_slot
        );

        Ok(Self {
            image,
            srv_slot,
            extent: vk::Extent2D {
                width: SHADOW_MAP_SIZE,
                height: SHADOW_MAP_SIZE,
            },
        })
    }

    /// The depth image.
    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// The texture-table slot.
    #[inline]
    pub fn srv_slot(&self) -> u32 {
        self.srv_slot
    }

    /// Shadow map extent (its own viewport, not the window's).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_frustum_encloses_scene_sphere() {
        let transform = fit_to_scene(
            Vec3::new(0.57735, -0.57735, 0.57735).normalize(),
            Vec3::ZERO,
            18.0,
        );
        // Sphere extremes along the light axis stay inside [near, far].
        assert!(transform.near_z < transform.far_z);
        assert!((transform.far_z - transform.near_z - 36.0).abs() < 1e-3);
    }

    #[test]
    fn test_scene_center_projects_to_texture_center() {
        let transform = fit_to_scene(Vec3::new(0.0, -1.0, 0.001).normalize(), Vec3::ZERO, 10.0);
        let projected = transform.world_to_shadow * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let uv = projected / projected.w;
        assert!((uv.x - 0.5).abs() < 1e-4);
        assert!((uv.y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_light_sits_behind_scene() {
        let dir = Vec3::new(1.0, -1.0, 0.0).normalize();
        let transform = fit_to_scene(dir, Vec3::ZERO, 5.0);
        // Position is opposite the travel direction.
        assert!(transform.light_pos.dot(dir) < 0.0);
    }
}
