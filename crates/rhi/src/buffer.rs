//! GPU buffer ownership and per-frame upload buffers.
//!
//! [`Buffer`] wraps a `VkBuffer` with gpu-allocator managed memory.
//! [`UploadBuffer`] layers typed, element-indexed CPU writes on top: each
//! frame resource owns one per constant-block kind, so the CPU can write
//! frame N+1's constants while the GPU still reads frame N's.

use std::marker::PhantomData;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer
    Vertex,
    /// Index buffer
    Index,
    /// Uniform buffer, CPU-writable every frame
    Uniform,
    /// Storage buffer, CPU-writable every frame (material table)
    Storage,
    /// Staging buffer for one-shot uploads
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Preferred memory location. Everything here is CPU-writable; GPU-only
    /// data goes through a staging copy instead.
    pub fn memory_location(self) -> MemoryLocation {
        MemoryLocation::CpuToGpu
    }

    /// Human-readable name for logs.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Storage => "storage",
            BufferUsage::Staging => "staging",
        }
    }
}

/// GPU buffer with managed memory.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a buffer of `size` bytes.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name: usage.name(),
                requirements,
                location: usage.memory_location(),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Creates a buffer initialized with `data`.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Writes `data` at `offset`. The memory is persistently mapped.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "write of {} bytes at offset {} exceeds buffer of {} bytes",
                data.len(),
                offset,
                self.size
            )));
        }

        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("buffer allocation missing".to_string()))?;
        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| RhiError::InvalidHandle("buffer memory is not mapped".to_string()))?;

        unsafe {
            let dst = mapped_ptr.as_ptr().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst as *mut u8, data.len());
        }

        Ok(())
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free buffer allocation: {:?}", e);
            }
        }
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
        debug!("Destroyed {} buffer", self.usage.name());
    }
}

/// Uniform-buffer elements are aligned to 256 bytes, which satisfies
/// `minUniformBufferOffsetAlignment` on every implementation the engine
/// targets.
pub const UNIFORM_ELEMENT_ALIGNMENT: u64 = 256;

/// Rounds `size` up to the next multiple of `alignment` (a power of two).
#[inline]
pub fn align_up(size: u64, alignment: u64) -> u64 {
    (size + alignment - 1) & !(alignment - 1)
}

/// CPU-writable array of constant blocks.
///
/// Uniform variants pad each element to the dynamic-offset alignment so
/// individual elements can be addressed per draw; storage variants are
/// tightly packed (shaders index them as a runtime array).
pub struct UploadBuffer<T: Pod> {
    buffer: Buffer,
    element_size: u64,
    count: u32,
    _marker: PhantomData<T>,
}

impl<T: Pod> UploadBuffer<T> {
    /// Creates a uniform upload buffer with `count` aligned elements.
    pub fn new_uniform(device: Arc<Device>, count: u32) -> RhiResult<Self> {
        let element_size = align_up(std::mem::size_of::<T>() as u64, UNIFORM_ELEMENT_ALIGNMENT);
        let buffer = Buffer::new(device, BufferUsage::Uniform, element_size * count as u64)?;
        Ok(Self {
            buffer,
            element_size,
            count,
            _marker: PhantomData,
        })
    }

    /// Creates a storage upload buffer with `count` packed elements.
    pub fn new_storage(device: Arc<Device>, count: u32) -> RhiResult<Self> {
        let element_size = std::mem::size_of::<T>() as u64;
        let buffer = Buffer::new(device, BufferUsage::Storage, element_size * count as u64)?;
        Ok(Self {
            buffer,
            element_size,
            count,
            _marker: PhantomData,
        })
    }

    /// Writes one element at `index`.
    pub fn copy_data(&self, index: u32, value: &T) -> RhiResult<()> {
        if index >= self.count {
            return Err(RhiError::InvalidHandle(format!(
                "element {} out of range (count {})",
                index, self.count
            )));
        }
        self.buffer
            .write_data(index as u64 * self.element_size, bytemuck::bytes_of(value))
    }

    /// Returns the underlying Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Byte offset of element `index` (for dynamic descriptor offsets).
    #[inline]
    pub fn offset_of(&self, index: u32) -> u64 {
        index as u64 * self.element_size
    }

    /// Stride of one element, including alignment padding.
    #[inline]
    pub fn element_size(&self) -> u64 {
        self.element_size
    }

    /// Element count.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(672, 256), 768);
    }

    #[test]
    fn test_buffer_usage_flags() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert!(
            BufferUsage::Storage
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::STORAGE_BUFFER)
        );
    }

    #[test]
    fn test_all_upload_memory_is_cpu_visible() {
        for usage in [
            BufferUsage::Vertex,
            BufferUsage::Index,
            BufferUsage::Uniform,
            BufferUsage::Storage,
            BufferUsage::Staging,
        ] {
            assert_eq!(usage.memory_location(), MemoryLocation::CpuToGpu);
        }
    }
}
