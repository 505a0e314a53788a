//! The engine's fixed sampler set.
//!
//! A handful of samplers covers every pass, so they are created up front
//! and live for the renderer's lifetime (Vulkan has no static samplers in
//! the pipeline layout, but the effect is the same).

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// All samplers the passes use.
pub struct SamplerSet {
    device: Arc<Device>,
    /// Trilinear, repeat addressing. Material textures.
    pub linear_wrap: vk::Sampler,
    /// Trilinear, clamped. Full-screen reads (ambient map, offscreen view).
    pub linear_clamp: vk::Sampler,
    /// Nearest, clamped. Normal map reads in the SSAO pass.
    pub point_clamp: vk::Sampler,
    /// Anisotropic, repeat. The ground grid at grazing angles.
    pub anisotropic_wrap: vk::Sampler,
    /// Comparison sampler for shadow map PCF, border = opaque black.
    pub shadow_compare: vk::Sampler,
    /// Depth reads with an opaque-white border so samples that fall off
    /// the depth map read as "far".
    pub depth_border: vk::Sampler,
}

impl SamplerSet {
    /// Creates the full sampler set.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let linear_wrap = Self::create(
            &device,
            vk::Filter::LINEAR,
            vk::SamplerAddressMode::REPEAT,
            None,
            None,
        )?;
        let linear_clamp = Self::create(
            &device,
            vk::Filter::LINEAR,
            vk::SamplerAddressMode::CLAMP_TO_EDGE,
            None,
            None,
        )?;
        let point_clamp = Self::create(
            &device,
            vk::Filter::NEAREST,
            vk::SamplerAddressMode::CLAMP_TO_EDGE,
            None,
            None,
        )?;
        let anisotropic_wrap = Self::create(
            &device,
            vk::Filter::LINEAR,
            vk::SamplerAddressMode::REPEAT,
            Some(8.0),
            None,
        )?;
        let shadow_compare = Self::create(
            &device,
            vk::Filter::LINEAR,
            vk::SamplerAddressMode::CLAMP_TO_BORDER,
            None,
            Some((
                vk::CompareOp::LESS_OR_EQUAL,
                vk::BorderColor::FLOAT_OPAQUE_BLACK,
            )),
        )?;
        let depth_border = Self::create(
            &device,
            vk::Filter::LINEAR,
            vk::SamplerAddressMode::CLAMP_TO_BORDER,
            None,
            Some((vk::CompareOp::NEVER, vk::BorderColor::FLOAT_OPAQUE_WHITE)),
        )?;

        debug!("Sampler set created");

        Ok(Self {
            device,
            linear_wrap,
            linear_clamp,
            point_clamp,
            anisotropic_wrap,
            shadow_compare,
            depth_border,
        })
    }

    fn create(
        device: &Arc<Device>,
        filter: vk::Filter,
        address_mode: vk::SamplerAddressMode,
        anisotropy: Option<f32>,
        compare_border: Option<(vk::CompareOp, vk::BorderColor)>,
    ) -> RhiResult<vk::Sampler> {
        let mut info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);

        if let Some(max_anisotropy) = anisotropy {
            info = info.anisotropy_enable(true).max_anisotropy(max_anisotropy);
        }
        if let Some((compare_op, border)) = compare_border {
            // CompareOp::NEVER marks a plain border sampler, not a
            // comparison sampler.
            if compare_op != vk::CompareOp::NEVER {
                info = info.compare_enable(true).compare_op(compare_op);
            }
            info = info.border_color(border);
        }

        let sampler = unsafe { device.handle().create_sampler(&info, None)? };
        Ok(sampler)
    }
}

impl Drop for SamplerSet {
    fn drop(&mut self) {
        unsafe {
            let d = self.device.handle();
            d.destroy_sampler(self.linear_wrap, None);
            d.destroy_sampler(self.linear_clamp, None);
            d.destroy_sampler(self.point_clamp, None);
            d.destroy_sampler(self.anisotropic_wrap, None);
            d.destroy_sampler(self.shadow_compare, None);
            d.destroy_sampler(self.depth_border, None);
        }
        debug!("Sampler set destroyed");
    }
}
