//! Shader constant blocks.
//!
//! These structures match the GLSL uniform/storage block layouts exactly:
//! `#[repr(C)]`, std140-compatible ordering, explicit padding, `Pod` for
//! byte casting into the upload buffers. Layout tests pin the sizes.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Number of directional lights in the pass constants.
pub const MAX_LIGHTS: usize = 3;

/// Per-object constants, one aligned element per render item.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ObjectConstants {
    /// Object-to-world transform.
    pub world: Mat4,
    /// Texture coordinate transform.
    pub tex_transform: Mat4,
    /// Index into the material storage buffer.
    pub material_index: u32,
    pub _pad: [u32; 3],
}

impl ObjectConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates object constants for one render item.
    pub fn new(world: Mat4, tex_transform: Mat4, material_index: u32) -> Self {
        Self {
            world,
            tex_transform,
            material_index,
            _pad: [0; 3],
        }
    }
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, 0)
    }
}

/// One element of the material storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MaterialData {
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    /// Material-level texture coordinate transform.
    pub mat_transform: Mat4,
    /// Slot of the diffuse map in the texture table.
    pub diffuse_map_index: u32,
    /// Slot of the normal map in the texture table.
    pub normal_map_index: u32,
    pub _pad: [u32; 2],
}

impl MaterialData {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            diffuse_albedo: Vec4::ONE,
            fresnel_r0: Vec3::splat(0.01),
            roughness: 0.5,
            mat_transform: Mat4::IDENTITY,
            diffuse_map_index: 0,
            normal_map_index: 0,
            _pad: [0; 2],
        }
    }
}

/// One directional light as the shaders see it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuLight {
    pub strength: Vec3,
    pub _pad0: f32,
    /// Direction the light travels.
    pub direction: Vec3,
    pub _pad1: f32,
}

/// Per-pass constants.
///
/// Each frame resource holds two elements of this block: element 0 is the
/// main camera pass, element 1 the shadow (light) pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PassConstants {
    pub view: Mat4,
    pub inv_view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    /// View-projection followed by the NDC-to-texture remap. SSAO and
    /// shadow lookups index textures with this.
    pub view_proj_tex: Mat4,
    /// World-to-shadow-map transform.
    pub shadow_transform: Mat4,
    pub eye_pos: Vec3,
    pub _pad0: f32,
    pub render_target_size: Vec2,
    pub inv_render_target_size: Vec2,
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub ambient_light: Vec4,
    pub lights: [GpuLight; MAX_LIGHTS],
}

impl PassConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Element index of the main camera pass.
    pub const MAIN_PASS: u32 = 0;
    /// Element index of the shadow (light) pass.
    pub const SHADOW_PASS: u32 = 1;
    /// Elements per frame resource.
    pub const COUNT: u32 = 2;
}

impl Default for PassConstants {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            inv_view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            inv_proj: Mat4::IDENTITY,
            view_proj: Mat4::IDENTITY,
            inv_view_proj: Mat4::IDENTITY,
            view_proj_tex: Mat4::IDENTITY,
            shadow_transform: Mat4::IDENTITY,
            eye_pos: Vec3::ZERO,
            _pad0: 0.0,
            render_target_size: Vec2::ZERO,
            inv_render_target_size: Vec2::ZERO,
            near_z: 0.0,
            far_z: 0.0,
            total_time: 0.0,
            delta_time: 0.0,
            ambient_light: Vec4::ZERO,
            lights: [GpuLight::default(); MAX_LIGHTS],
        }
    }
}

/// SSAO pass constants: one element per frame resource.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SsaoConstants {
    pub proj: Mat4,
    pub inv_proj: Mat4,
    /// Projection followed by the NDC-to-texture remap.
    pub proj_tex: Mat4,
    /// Sample kernel: cube corners and face centers at varied lengths.
    pub offset_vectors: [Vec4; 14],
    /// 11-tap Gaussian packed into three Vec4s.
    pub blur_weights: [Vec4; 3],
    pub inv_render_target_size: Vec2,
    /// Occlusion falls off between fade_start and fade_end (view space).
    pub occlusion_radius: f32,
    pub occlusion_fade_start: f32,
    pub occlusion_fade_end: f32,
    pub surface_epsilon: f32,
    pub _pad: [f32; 2],
}

impl SsaoConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

impl Default for SsaoConstants {
    fn default() -> Self {
        Self {
            proj: Mat4::IDENTITY,
            inv_proj: Mat4::IDENTITY,
            proj_tex: Mat4::IDENTITY,
            offset_vectors: [Vec4::ZERO; 14],
            blur_weights: [Vec4::ZERO; 3],
            inv_render_target_size: Vec2::ZERO,
            occlusion_radius: 0.5,
            occlusion_fade_start: 0.2,
            occlusion_fade_end: 1.0,
            surface_epsilon: 0.05,
            _pad: [0.0; 2],
        }
    }
}

/// The NDC `[-1, 1]` to texture `[0, 1]` remap matrix.
pub fn ndc_to_texture() -> Mat4 {
    Mat4::from_cols(
        Vec4::new(0.5, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -0.5, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(0.5, 0.5, 0.0, 1.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_constants_layout() {
        // 2 Mat4 + u32 + 3 pad = 144 bytes, 16-byte multiple.
        assert_eq!(ObjectConstants::SIZE, 144);
        assert_eq!(ObjectConstants::SIZE % 16, 0);
    }

    #[test]
    fn test_material_data_layout() {
        // Vec4 + Vec3 + f32 + Mat4 + 2 u32 + 2 pad = 112 bytes.
        assert_eq!(MaterialData::SIZE, 112);
        assert_eq!(MaterialData::SIZE % 16, 0);
    }

    #[test]
    fn test_pass_constants_layout() {
        // 8 Mat4 (512) + 16 + 16 + 16 + 16 + 3 lights (96) = 672 bytes.
        assert_eq!(PassConstants::SIZE, 672);
        assert_eq!(PassConstants::SIZE % 16, 0);
        assert_eq!(std::mem::size_of::<GpuLight>(), 32);
    }

    #[test]
    fn test_ssao_constants_layout() {
        // 3 Mat4 (192) + 14 Vec4 (224) + 3 Vec4 (48) + Vec2 + 4 f32 + 2 pad
        // = 496 bytes.
        assert_eq!(SsaoConstants::SIZE, 496);
        assert_eq!(SsaoConstants::SIZE % 16, 0);
    }

    #[test]
    fn test_constant_blocks_cast_to_bytes() {
        let pass = PassConstants::default();
        assert_eq!(bytemuck::bytes_of(&pass).len(), PassConstants::SIZE);
        let ssao = SsaoConstants::default();
        assert_eq!(bytemuck::bytes_of(&ssao).len(), SsaoConstants::SIZE);
    }

    #[test]
    fn test_ndc_to_texture_maps_corners() {
        let remap = ndc_to_texture();
        let top_left = remap * Vec4::new(-1.0, 1.0, 0.0, 1.0);
        assert!((top_left.x - 0.0).abs() < 1e-6);
        assert!((top_left.y - 0.0).abs() < 1e-6);
        let bottom_right = remap * Vec4::new(1.0, -1.0, 0.0, 1.0);
        assert!((bottom_right.x - 1.0).abs() < 1e-6);
        assert!((bottom_right.y - 1.0).abs() < 1e-6);
    }
}
