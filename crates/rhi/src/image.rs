//! Owned GPU images, image views, and layout transitions.
//!
//! Render targets (shadow map, normal map, ambient maps, offscreen main
//! target) and the placeholder textures are all [`Image`]s. The pass
//! orchestrator moves them between layouts with [`cmd_transition_image`],
//! which encodes the producer/consumer stage+access pairs for every
//! transition the frame graph performs.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, warn};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandPool, submit_once};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Creation parameters for a 2D image.
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    /// 1 for plain 2D, 6 for cube maps.
    pub layers: u32,
    pub cube: bool,
}

impl ImageDesc {
    /// A color render target that is also sampled by later passes.
    pub fn color_target(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            format,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
            layers: 1,
            cube: false,
        }
    }

    /// A depth target that is also sampled by later passes.
    pub fn depth_target(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::DEPTH,
            layers: 1,
            cube: false,
        }
    }

    /// A sampled texture filled by a staging copy.
    pub fn texture(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            format,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: vk::ImageAspectFlags::COLOR,
            layers: 1,
            cube: false,
        }
    }

    /// A sampled cube map filled by a staging copy.
    pub fn cube_texture(size: u32, format: vk::Format) -> Self {
        Self {
            width: size,
            height: size,
            format,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: vk::ImageAspectFlags::COLOR,
            layers: 6,
            cube: true,
        }
    }
}

/// GPU image with managed memory and a default view.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    aspect: vk::ImageAspectFlags,
}

impl Image {
    /// Creates an image and its default view.
    pub fn new(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::InvalidHandle(
                "image dimensions must be greater than 0".to_string(),
            ));
        }

        let flags = if desc.cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .flags(flags)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(desc.layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name: "image",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view_type = if desc.cube {
            vk::ImageViewType::CUBE
        } else {
            vk::ImageViewType::TYPE_2D
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(desc.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(desc.aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(desc.layers),
            );

        let view = unsafe { device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created image: {}x{} {:?} ({} layer(s))",
            desc.width, desc.height, desc.format, desc.layers
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            format: desc.format,
            extent: vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
            aspect: desc.aspect,
        })
    }

    /// Creates a sampled texture and uploads `pixels` through a staging
    /// buffer, leaving it in SHADER_READ_ONLY_OPTIMAL.
    ///
    /// `pixels` covers all layers, tightly packed layer after layer.
    pub fn from_pixels(
        device: Arc<Device>,
        pool: &CommandPool,
        desc: &ImageDesc,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let image = Self::new(device.clone(), desc)?;
        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;

        let copy = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(desc.aspect)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(desc.layers),
            )
            .image_extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            });

        submit_once(&device, pool, |cmd| {
            cmd_transition_image(
                cmd.handle(),
                &device,
                image.handle(),
                desc.aspect,
                desc.layers,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            cmd.copy_buffer_to_image(
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy],
            );
            cmd_transition_image(
                cmd.handle(),
                &device,
                image.handle(),
                desc.aspect,
                desc.layers,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
            Ok(())
        })?;

        Ok(image)
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the default view.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the image extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the aspect mask of the default view.
    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free image allocation: {:?}", e);
            }
        }
    }
}

/// Records an image layout transition with the stage/access masks the
/// frame graph's producer/consumer pairs require.
///
/// The `(old, new)` pairs here are exactly the transitions the pass
/// sequence performs; anything else falls through to a full-pipeline
/// barrier with a warning, which is correct but slow.
#[allow(clippy::too_many_arguments)]
pub fn cmd_transition_image(
    cmd: vk::CommandBuffer,
    device: &Device,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    layers: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    use vk::AccessFlags as AF;
    use vk::ImageLayout as IL;
    use vk::PipelineStageFlags as PS;

    let (src_stage, src_access, dst_stage, dst_access) = match (old_layout, new_layout) {
        (IL::UNDEFINED, IL::COLOR_ATTACHMENT_OPTIMAL) => (
            PS::TOP_OF_PIPE,
            AF::empty(),
            PS::COLOR_ATTACHMENT_OUTPUT,
            AF::COLOR_ATTACHMENT_WRITE,
        ),
        (IL::UNDEFINED, IL::DEPTH_ATTACHMENT_OPTIMAL) => (
            PS::TOP_OF_PIPE,
            AF::empty(),
            PS::EARLY_FRAGMENT_TESTS,
            AF::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        (IL::UNDEFINED, IL::SHADER_READ_ONLY_OPTIMAL) => (
            PS::TOP_OF_PIPE,
            AF::empty(),
            PS::FRAGMENT_SHADER,
            AF::SHADER_READ,
        ),
        (IL::UNDEFINED, IL::TRANSFER_DST_OPTIMAL) => (
            PS::TOP_OF_PIPE,
            AF::empty(),
            PS::TRANSFER,
            AF::TRANSFER_WRITE,
        ),
        (IL::TRANSFER_DST_OPTIMAL, IL::SHADER_READ_ONLY_OPTIMAL) => (
            PS::TRANSFER,
            AF::TRANSFER_WRITE,
            PS::FRAGMENT_SHADER,
            AF::SHADER_READ,
        ),
        // Readable texture becomes a render target (normal map, ambient
        // maps, offscreen main target).
        (IL::SHADER_READ_ONLY_OPTIMAL, IL::COLOR_ATTACHMENT_OPTIMAL) => (
            PS::FRAGMENT_SHADER,
            AF::SHADER_READ,
            PS::COLOR_ATTACHMENT_OUTPUT,
            AF::COLOR_ATTACHMENT_WRITE,
        ),
        // Render target becomes readable by the next pass.
        (IL::COLOR_ATTACHMENT_OPTIMAL, IL::SHADER_READ_ONLY_OPTIMAL) => (
            PS::COLOR_ATTACHMENT_OUTPUT,
            AF::COLOR_ATTACHMENT_WRITE,
            PS::FRAGMENT_SHADER,
            AF::SHADER_READ,
        ),
        // Shadow map / scene depth round trips.
        (IL::SHADER_READ_ONLY_OPTIMAL, IL::DEPTH_ATTACHMENT_OPTIMAL) => (
            PS::FRAGMENT_SHADER,
            AF::SHADER_READ,
            PS::EARLY_FRAGMENT_TESTS,
            AF::DEPTH_STENCIL_ATTACHMENT_READ | AF::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        (IL::DEPTH_ATTACHMENT_OPTIMAL, IL::SHADER_READ_ONLY_OPTIMAL) => (
            PS::LATE_FRAGMENT_TESTS,
            AF::DEPTH_STENCIL_ATTACHMENT_WRITE,
            PS::FRAGMENT_SHADER,
            AF::SHADER_READ,
        ),
        (IL::COLOR_ATTACHMENT_OPTIMAL, IL::PRESENT_SRC_KHR) => (
            PS::COLOR_ATTACHMENT_OUTPUT,
            AF::COLOR_ATTACHMENT_WRITE,
            PS::BOTTOM_OF_PIPE,
            AF::empty(),
        ),
        _ => {
            warn!(
                "Unhandled layout transition: {:?} -> {:?}",
                old_layout, new_layout
            );
            (
                PS::ALL_COMMANDS,
                AF::MEMORY_READ | AF::MEMORY_WRITE,
                PS::ALL_COMMANDS,
                AF::MEMORY_READ | AF::MEMORY_WRITE,
            )
        }
    };

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(layers),
        )
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        device.handle().cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_target_desc() {
        let desc = ImageDesc::color_target(800, 600, vk::Format::R16G16B16A16_SFLOAT);
        assert!(desc.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert_eq!(desc.layers, 1);
        assert!(!desc.cube);
    }

    #[test]
    fn test_depth_target_is_sampled() {
        // SSAO reads scene depth, so depth targets must carry SAMPLED.
        let desc = ImageDesc::depth_target(2048, 2048, vk::Format::D32_SFLOAT);
        assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert_eq!(desc.aspect, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn test_cube_texture_desc() {
        let desc = ImageDesc::cube_texture(64, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(desc.layers, 6);
        assert!(desc.cube);
        assert_eq!(desc.width, desc.height);
    }
}
