//! Physical device selection.
//!
//! Scores the available GPUs and picks the best one that supports the
//! queue families, extensions, and surface formats the engine needs.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};

/// Queue family indices discovered on a physical device.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFamilyIndices {
    /// Graphics-capable family.
    pub graphics_family: Option<u32>,
    /// Family that can present to the surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// True when every required family was found.
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Deduplicated list of the families in use.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = vec![self.graphics_family.unwrap()];
        let present = self.present_family.unwrap();
        if !families.contains(&present) {
            families.push(present);
        }
        families
    }
}

/// Information about the selected physical device.
pub struct PhysicalDeviceInfo {
    /// The physical device handle.
    pub device: vk::PhysicalDevice,
    /// Queue families found on it.
    pub queue_families: QueueFamilyIndices,
    /// Cached device properties.
    pub properties: vk::PhysicalDeviceProperties,
}

impl PhysicalDeviceInfo {
    /// The device name as reported by the driver.
    pub fn device_name(&self) -> String {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_string_lossy()
                .into_owned()
        }
    }
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<QueueFamilyIndices> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();
    for (i, family) in families.iter().enumerate() {
        let index = i as u32;

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            && indices.graphics_family.is_none()
        {
            indices.graphics_family = Some(index);
        }

        let present_support = unsafe {
            surface_loader.get_physical_device_surface_support(device, index, surface)?
        };
        if present_support && indices.present_family.is_none() {
            indices.present_family = Some(index);
        }

        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

fn supports_required_extensions(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> RhiResult<bool> {
    let available = unsafe { instance.enumerate_device_extension_properties(device)? };
    let swapchain = ash::khr::swapchain::NAME.to_bytes_with_nul();
    Ok(available.iter().any(|ext| {
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name.to_bytes_with_nul() == swapchain
    }))
}

fn score_device(properties: &vk::PhysicalDeviceProperties) -> u32 {
    match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 100,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 50,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 25,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    }
}

/// Selects the most suitable physical device for the given surface.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no device has the required queue
/// families and extensions.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    debug!("Found {} physical device(s)", devices.len());

    let mut best: Option<(u32, PhysicalDeviceInfo)> = None;

    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let queue_families = find_queue_families(instance, device, surface, surface_loader)?;

        if !queue_families.is_complete() || !supports_required_extensions(instance, device)? {
            continue;
        }

        // Vulkan 1.2 is the floor for timeline semaphores and descriptor
        // indexing; 1.3 adds dynamic rendering without extensions.
        if vk::api_version_minor(properties.api_version) < 2 {
            continue;
        }

        let score = score_device(&properties);
        let info = PhysicalDeviceInfo {
            device,
            queue_families,
            properties,
        };

        if best.as_ref().is_none_or(|(s, _)| score > *s) {
            best = Some((score, info));
        }
    }

    let (_, info) = best.ok_or(RhiError::NoSuitableGpu)?;
    info!("Selected GPU: {}", info.device_name());
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_indices() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_unique_families_dedup() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(indices.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(split.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_discrete_gpu_scores_highest() {
        let mut props = vk::PhysicalDeviceProperties::default();
        props.device_type = vk::PhysicalDeviceType::DISCRETE_GPU;
        let discrete = score_device(&props);
        props.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        assert!(discrete > score_device(&props));
    }
}
