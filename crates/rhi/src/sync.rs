//! Synchronization primitives.
//!
//! - [`Semaphore`] - binary semaphore for GPU-to-GPU ordering (acquire /
//!   present).
//! - [`Fence`] - binary fence for one-shot CPU waits (staging uploads).
//! - [`TimelineFence`] - a monotonically increasing counter semaphore. The
//!   renderer signals it with a new value on every submit and the frame
//!   ring waits on it before reusing a frame resource's memory. This is
//!   the engine's single cross-timeline synchronization point in the
//!   steady-state loop.
//!
//! [`GpuTimeline`] abstracts the timeline fence behind a trait so the
//! ring-advance protocol can be exercised against a mocked completed value.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Binary semaphore for queue-to-queue ordering.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Binary fence for one-shot CPU-side waits.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally in the signaled state.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` (ns) expires.
    pub fn wait(&self, timeout: u64) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    pub fn reset(&self) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// The GPU's completed-work counter, as seen by the CPU.
///
/// Implemented by [`TimelineFence`] in production. Tests implement it with
/// a plain counter to drive the frame-ring wait protocol without a device.
pub trait GpuTimeline {
    /// The highest fence value the GPU has completed.
    fn completed_value(&self) -> RhiResult<u64>;

    /// Blocks (without timeout) until the GPU reaches `value`.
    ///
    /// A GPU that never reaches the value is a device-loss condition;
    /// there is no retry path, so no timeout is taken.
    fn wait_for(&self, value: u64) -> RhiResult<()>;
}

/// Monotonic timeline semaphore.
///
/// Created at value 0; the renderer signals `1, 2, 3, ...` with each
/// submitted frame. Never resets.
pub struct TimelineFence {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl TimelineFence {
    /// Creates the timeline semaphore at initial value 0.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Timeline fence created");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle (for submit signal operations).
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl GpuTimeline for TimelineFence {
    fn completed_value(&self) -> RhiResult<u64> {
        let value = unsafe {
            self.device
                .handle()
                .get_semaphore_counter_value(self.semaphore)?
        };
        Ok(value)
    }

    fn wait_for(&self, value: u64) -> RhiResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        unsafe {
            self.device.handle().wait_semaphores(&wait_info, u64::MAX)?;
        }
        Ok(())
    }
}

impl Drop for TimelineFence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Timeline fence destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<TimelineFence>();
    }
}
