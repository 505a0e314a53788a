//! The offscreen main render target ("dock-space" mode).
//!
//! With dock-space on, the scene renders into this texture instead of the
//! swapchain image; the UI overlay then displays it inside its dockable
//! viewport via the SRV slot. Both paths share the whole pass sequence -
//! only the final color target and its barrier pair differ, decided once
//! per frame at the top of the main pass.
//!
//! The target uses the swapchain's format so one pipeline set serves both
//! modes.

use std::sync::Arc;

use tracing::debug;

use drake_rhi::RhiResult;
use drake_rhi::descriptor::{GpuDescriptor, TextureTable};
use drake_rhi::device::Device;
use drake_rhi::image::{Image, ImageDesc};
use drake_rhi::vk;

/// Offscreen color target sized to the client area.
pub struct OffscreenTarget {
    image: Image,
    srv_slot: u32,
    srv_handle: GpuDescriptor,
}

impl OffscreenTarget {
    /// Creates the target and registers it in the texture table.
    pub fn new(
        device: Arc<Device>,
        table: &mut TextureTable,
        sampler: vk::Sampler,
        format: vk::Format,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let image = Image::new(device, &ImageDesc::color_target(width, height, format))?;
        let srv_slot = table.create_srv(
            image.view(),
            sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        let srv_handle = table.allocator().gpu_handle(srv_slot);

        debug!(
            "Offscreen target created: {}x{} {:?} (slot {})",
            width,
            height,
            format,
            srv_slot
        );

        Ok(Self {
            image,
            srv_slot,
            srv_handle,
        })
    }

    /// Recreates the target at a new size, rewriting the existing slot.
    pub fn resize(
        &mut self,
        device: Arc<Device>,
        table: &TextureTable,
        sampler: vk::Sampler,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        let format = self.image.format();
        self.image = Image::new(device, &ImageDesc::color_target(width, height, format))?;
        table.write_srv(
            self.srv_slot,
            self.image.view(),
            sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        Ok(())
    }

    /// The color image.
    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// The texture-table slot.
    #[inline]
    pub fn srv_slot(&self) -> u32 {
        self.srv_slot
    }

    /// The GPU handle the UI uses to display this target.
    #[inline]
    pub fn srv_handle(&self) -> GpuDescriptor {
        self.srv_handle
    }
}
