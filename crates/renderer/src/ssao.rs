//! Screen-space ambient occlusion resources.
//!
//! The SSAO pass reads scene depth and the normal map and writes a
//! half-resolution ambient map, which a separable Gaussian blur then
//! smooths in two ping-pong passes over a second ambient map. Both SSAO
//! passes record against their own pipeline layout with a push constant
//! selecting the blur direction.
//!
//! Resize recreates the maps but rewrites the *same* texture-table slots,
//! so material/shader-visible indices never change.

use std::sync::Arc;

use glam::{Vec3, Vec4};
use tracing::{debug, info};

use drake_rhi::RhiResult;
use drake_rhi::descriptor::TextureTable;
use drake_rhi::device::Device;
use drake_rhi::image::{Image, ImageDesc};
use drake_rhi::vk;

/// Normal map format (world-space normals at full precision).
pub const NORMAL_MAP_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
/// Ambient map format (single occlusion channel).
pub const AMBIENT_MAP_FORMAT: vk::Format = vk::Format::R16_UNORM;

/// Number of kernel offset vectors (8 cube corners + 6 face centers).
pub const OFFSET_VECTOR_COUNT: usize = 14;

/// Maximum blur radius the weight packing supports.
pub const MAX_BLUR_RADIUS: usize = 5;

/// Computes normalized Gaussian weights for a blur of the given sigma.
///
/// The radius is `ceil(2 * sigma)`, capped at [`MAX_BLUR_RADIUS`]; the
/// returned vector has `2 * radius + 1` entries summing to 1.
pub fn gauss_weights(sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "blur sigma must be positive");
    let two_sigma2 = 2.0 * sigma * sigma;
    let radius = ((2.0 * sigma).ceil() as usize).min(MAX_BLUR_RADIUS);

    let mut weights = Vec::with_capacity(2 * radius + 1);
    let mut sum = 0.0f32;
    for i in -(radius as i32)..=(radius as i32) {
        let x = i as f32;
        let w = (-x * x / two_sigma2).exp();
        weights.push(w);
        sum += w;
    }
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Packs up to 11 blur weights into the three Vec4s the constant block
/// carries, zero-filling the tail.
pub fn pack_blur_weights(weights: &[f32]) -> [Vec4; 3] {
    assert!(weights.len() <= 12, "too many blur weights to pack");
    let mut packed = [0.0f32; 12];
    packed[..weights.len()].copy_from_slice(weights);
    [
        Vec4::new(packed[0], packed[1], packed[2], packed[3]),
        Vec4::new(packed[4], packed[5], packed[6], packed[7]),
        Vec4::new(packed[8], packed[9], packed[10], packed[11]),
    ]
}

/// Deterministic xorshift so the kernel is identical run to run.
struct Xorshift(u32);

impl Xorshift {
    fn next_f32(&mut self) -> f32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        (x >> 8) as f32 / (1u32 << 24) as f32
    }
}

/// Builds the 14 offset vectors: cube corners and face centers with
/// varied lengths, so samples don't clump in one direction.
pub fn build_offset_vectors() -> [Vec4; OFFSET_VECTOR_COUNT] {
    let mut offsets = [Vec4::ZERO; OFFSET_VECTOR_COUNT];

    // 8 cube corners.
    let corners = [
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(-1.0, -1.0, -1.0),
        Vec3::new(-1.0, 1.0, 1.0),
        Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(1.0, 1.0, -1.0),
        Vec3::new(-1.0, -1.0, 1.0),
        Vec3::new(-1.0, 1.0, -1.0),
        Vec3::new(1.0, -1.0, 1.0),
    ];
    // 6 face centers.
    let faces = [
        Vec3::new(-1.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, -1.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(0.0, 0.0, -1.0),
        Vec3::new(0.0, 0.0, 1.0),
    ];

    let mut rng = Xorshift(0x9E37_79B9);
    for (slot, direction) in offsets
        .iter_mut()
        .zip(corners.iter().chain(faces.iter()))
    {
        let length = 0.25 + 0.75 * rng.next_f32();
        *slot = (direction.normalize() * length).extend(0.0);
    }

    offsets
}

/// Builds the `size` x `size` RGBA8 random-vector texture the SSAO shader
/// uses to rotate its kernel per pixel. Deterministic, like the kernel.
pub fn build_random_vectors(size: u32) -> Vec<u8> {
    let mut rng = Xorshift(0x2545_F491);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for _ in 0..size * size {
        pixels.push((rng.next_f32() * 255.0) as u8);
        pixels.push((rng.next_f32() * 255.0) as u8);
        pixels.push((rng.next_f32() * 255.0) as u8);
        pixels.push(0);
    }
    pixels
}

/// Which ambient map a blur pass writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlurDirection {
    Horizontal,
    Vertical,
}

impl BlurDirection {
    /// The push-constant value the blur shader switches on.
    pub fn push_constant(self) -> u32 {
        match self {
            BlurDirection::Horizontal => 1,
            BlurDirection::Vertical => 0,
        }
    }
}

/// SSAO GPU resources.
pub struct Ssao {
    device: Arc<Device>,
    normal_map: Image,
    ambient_maps: [Image; 2],
    normal_slot: u32,
    ambient_slots: [u32; 2],
    render_extent: vk::Extent2D,
    offset_vectors: [Vec4; OFFSET_VECTOR_COUNT],
}

impl Ssao {
    /// Creates the SSAO maps for a client area of `width` x `height`.
    ///
    /// The ambient maps use a contiguous slot pair so blur shaders can
    /// address the ping-pong target relative to the first slot.
    pub fn new(
        device: Arc<Device>,
        table: &mut TextureTable,
        sampler: vk::Sampler,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let (normal_map, ambient_maps) = Self::build_maps(&device, width, height)?;

        let normal_slot = table.create_srv(
            normal_map.view(),
            sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        let first_ambient = table.allocator_mut().alloc_contiguous(2);
        let ambient_slots = [first_ambient, first_ambient + 1];
        for (slot, map) in ambient_slots.iter().zip(ambient_maps.iter()) {
            table.write_srv(
                *slot,
                map.view(),
                sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }

        info!(
            "SSAO created: ambient {}x{} (slots {}..{}), normals slot {}",
            width.div_ceil(2),
            height.div_ceil(2),
            ambient_slots[0],
            ambient_slots[1],
            normal_slot
        );

        Ok(Self {
            device,
            normal_map,
            ambient_maps,
            normal_slot,
            ambient_slots,
            render_extent: vk::Extent2D { width, height },
            offset_vectors: build_offset_vectors(),
        })
    }

    fn build_maps(
        device: &Arc<Device>,
        width: u32,
        height: u32,
    ) -> RhiResult<(Image, [Image; 2])> {
        let normal_map = Image::new(
            device.clone(),
            &ImageDesc::color_target(width, height, NORMAL_MAP_FORMAT),
        )?;

        // Ambient occlusion is low frequency; half resolution halves the
        // blur cost without visible quality loss.
        let aw = width.div_ceil(2);
        let ah = height.div_ceil(2);
        let ambient0 = Image::new(
            device.clone(),
            &ImageDesc::color_target(aw, ah, AMBIENT_MAP_FORMAT),
        )?;
        let ambient1 = Image::new(
            device.clone(),
            &ImageDesc::color_target(aw, ah, AMBIENT_MAP_FORMAT),
        )?;

        Ok((normal_map, [ambient0, ambient1]))
    }

    /// Recreates the maps at a new client size, rewriting the existing
    /// slots.
    pub fn resize(
        &mut self,
        table: &TextureTable,
        sampler: vk::Sampler,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        if width == self.render_extent.width && height == self.render_extent.height {
            return Ok(());
        }

        let (normal_map, ambient_maps) = Self::build_maps(&self.device, width, height)?;
        self.normal_map = normal_map;
        self.ambient_maps = ambient_maps;
        self.render_extent = vk::Extent2D { width, height };

        table.write_srv(
            self.normal_slot,
            self.normal_map.view(),
            sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        for (slot, map) in self.ambient_slots.iter().zip(self.ambient_maps.iter()) {
            table.write_srv(
                *slot,
                map.view(),
                sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }

        debug!("SSAO maps resized: {}x{}", width, height);
        Ok(())
    }

    /// The normal map target.
    #[inline]
    pub fn normal_map(&self) -> &Image {
        &self.normal_map
    }

    /// Ambient map `index` (0 is the SSAO pass target, 1 the blur
    /// scratch).
    #[inline]
    pub fn ambient_map(&self, index: usize) -> &Image {
        &self.ambient_maps[index]
    }

    /// The normal map's texture-table slot.
    #[inline]
    pub fn normal_slot(&self) -> u32 {
        self.normal_slot
    }

    /// Ambient map slots (contiguous pair).
    #[inline]
    pub fn ambient_slots(&self) -> [u32; 2] {
        self.ambient_slots
    }

    /// Full-resolution extent the normal map covers.
    #[inline]
    pub fn render_extent(&self) -> vk::Extent2D {
        self.render_extent
    }

    /// Half-resolution extent of the ambient maps.
    #[inline]
    pub fn ambient_extent(&self) -> vk::Extent2D {
        self.ambient_maps[0].extent()
    }

    /// The sample kernel.
    #[inline]
    pub fn offset_vectors(&self) -> &[Vec4; OFFSET_VECTOR_COUNT] {
        &self.offset_vectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauss_weights_normalized_and_symmetric() {
        let weights = gauss_weights(2.5);
        assert_eq!(weights.len(), 11);
        let sum: f32 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for i in 0..weights.len() / 2 {
            assert!((weights[i] - weights[weights.len() - 1 - i]).abs() < 1e-6);
        }
        // Center tap dominates.
        let center = weights[weights.len() / 2];
        assert!(weights.iter().all(|&w| w <= center));
    }

    #[test]
    fn test_gauss_radius_is_capped() {
        let weights = gauss_weights(10.0);
        assert_eq!(weights.len(), 2 * MAX_BLUR_RADIUS + 1);
    }

    #[test]
    fn test_pack_blur_weights_zero_fills() {
        let weights = gauss_weights(2.5);
        let packed = pack_blur_weights(&weights);
        assert!((packed[0].x - weights[0]).abs() < 1e-6);
        assert!((packed[2].z - weights[10]).abs() < 1e-6);
        assert_eq!(packed[2].w, 0.0);
    }

    #[test]
    fn test_offset_vectors_are_deterministic_and_bounded() {
        let a = build_offset_vectors();
        let b = build_offset_vectors();
        assert_eq!(a, b);
        for offset in &a {
            let length = offset.truncate().length();
            assert!((0.25..=1.0).contains(&length), "length {length}");
            assert_eq!(offset.w, 0.0);
        }
    }

    #[test]
    fn test_opposite_corners_stay_opposite() {
        // Corner pairs (0,1), (2,3), ... point in opposite directions so
        // at least one sample of each pair survives a surface clip.
        let offsets = build_offset_vectors();
        for pair in offsets[..8].chunks(2) {
            let a = pair[0].truncate().normalize();
            let b = pair[1].truncate().normalize();
            assert!((a + b).length() < 1e-5);
        }
    }

    #[test]
    fn test_random_vectors_sized_and_deterministic() {
        let pixels = build_random_vectors(8);
        assert_eq!(pixels.len(), 8 * 8 * 4);
        assert_eq!(pixels, build_random_vectors(8));
    }

    #[test]
    fn test_blur_direction_push_constants_differ() {
        assert_ne!(
            BlurDirection::Horizontal.push_constant(),
            BlurDirection::Vertical.push_constant()
        );
    }
}
