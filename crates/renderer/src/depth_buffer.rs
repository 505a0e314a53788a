//! The main scene depth buffer.
//!
//! Written by the normal-depth pass, tested (EQUAL, read-only writes come
//! from the sky layer) by the main pass, and *sampled* by the SSAO pass,
//! so unlike a plain depth attachment it carries SAMPLED usage and owns a
//! slot in the texture table.

use std::sync::Arc;

use tracing::debug;

use drake_rhi::RhiResult;
use drake_rhi::descriptor::TextureTable;
use drake_rhi::device::Device;
use drake_rhi::image::{Image, ImageDesc};
use drake_rhi::vk;

/// Depth format used everywhere in the engine.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Scene depth buffer with a texture-table slot.
pub struct DepthBuffer {
    image: Image,
    /// Slot in the texture table; stable across resizes.
    srv_slot: u32,
}

impl DepthBuffer {
    /// Creates the depth buffer and registers it in the texture table.
    pub fn new(
        device: Arc<Device>,
        table: &mut TextureTable,
        sampler: vk::Sampler,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let image = Image::new(
            device,
            &ImageDesc::depth_target(width, height, DEPTH_FORMAT),
        )?;
        let srv_slot = table.create_srv(
            image.view(),
            sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );

        debug!(
            "Depth buffer created: {}x{} (slot {})",
            width, height, srv_slot
        );

        Ok(Self { image, srv_slot })
    }

    /// Recreates the image at a new size, rewriting the existing slot.
    pub fn resize(
        &mut self,
        device: Arc<Device>,
        table: &TextureTable,
        sampler: vk::Sampler,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        self.image = Image::new(
            device,
            &ImageDesc::depth_target(width, height, DEPTH_FORMAT),
        )?;
        table.write_srv(
            self.srv_slot,
            self.image.view(),
            sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        Ok(())
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_format() {
        assert_eq!(DEPTH_FORMAT, vk::Format::D32_SFLOAT);
    }
}
