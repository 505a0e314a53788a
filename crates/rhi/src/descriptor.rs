//! Descriptor management: set layouts, pools, and the shader-visible slot
//! table.
//!
//! The engine binds every sampled texture through one large descriptor
//! array ("the slot table"). Slots are integer indices handed out by
//! [`DescriptorSlotAllocator`], a free-list allocator that never moves or
//! compacts: a slot stays valid until it is explicitly freed. Materials and
//! render passes refer to textures exclusively by slot index.
//!
//! Three layers live here:
//! - [`DescriptorSetLayout`] / [`DescriptorPool`] - thin wrappers used for
//!   the small per-frame and per-pass descriptor sets.
//! - [`DescriptorSlotAllocator`] - pure index/handle bookkeeping for the
//!   slot table. No Vulkan objects, so its invariants are unit-testable.
//! - [`TextureTable`] - the shader-visible side: an UPDATE_AFTER_BIND
//!   descriptor array of combined image samplers plus the embedded
//!   allocator.
//!
//! # Handles
//!
//! External collaborators (the UI overlay) address slots through a paired
//! CPU/GPU handle, both computed as `base + index * stride` with the stride
//! fixed when the table is created. Vulkan has no raw heap addresses, so
//! the bases are the table's own: 0 on the CPU side and the raw descriptor
//! set handle on the GPU side. Freeing through the pair cross-checks that
//! both handles resolve to the same slot.

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle as _;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Descriptor set layout wrapper.
///
/// Immutable after creation; shareable via `Arc` if needed.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a layout from the given bindings.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!("Created descriptor set layout ({} bindings)", bindings.len());

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool for the small per-frame and per-pass sets.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Creates a pool that can allocate `max_sets` sets drawn from
    /// `pool_sizes`.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!("Created descriptor pool: max_sets={}", max_sets);

        Ok(Self { device, pool })
    }

    /// Allocates one descriptor set per layout handle given.
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }

    /// Returns the Vulkan pool handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Applies a batch of descriptor writes.
pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    if writes.is_empty() {
        return;
    }
    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }
}

/// CPU-side handle into the slot table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CpuDescriptor {
    pub ptr: u64,
}

/// GPU-side handle into the slot table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GpuDescriptor {
    pub ptr: u64,
}

/// Free-list allocator over a fixed-capacity table of descriptor slots.
///
/// The free list is filled in descending order at creation, so repeated
/// [`alloc`](Self::alloc) calls serve indices low-to-high. That ordering is
/// not a public guarantee, but it is deterministic, which the tests rely
/// on. Freed slots are recycled LIFO.
///
/// Exhaustion and handle mismatches are unrecoverable: they mean the static
/// capacity was sized wrong or a caller corrupted its bookkeeping, so both
/// assert rather than returning an error.
pub struct DescriptorSlotAllocator {
    cpu_base: u64,
    gpu_base: u64,
    stride: u64,
    capacity: u32,
    free_slots: Vec<u32>,
}

impl DescriptorSlotAllocator {
    /// Creates an allocator over `capacity` slots.
    ///
    /// `stride` is the per-slot handle increment, fixed for the lifetime of
    /// the table. Must be nonzero.
    pub fn new(cpu_base: u64, gpu_base: u64, stride: u64, capacity: u32) -> Self {
        assert!(stride > 0, "descriptor handle stride must be nonzero");
        assert!(capacity > 0, "descriptor table capacity must be nonzero");

        let mut free_slots = Vec::with_capacity(capacity as usize);
        for n in (0..capacity).rev() {
            free_slots.push(n);
        }

        debug!("Descriptor slot table created: {} slots", capacity);

        Self {
            cpu_base,
            gpu_base,
            stride,
            capacity,
            free_slots,
        }
    }

    /// Allocates one slot.
    ///
    /// Panics if the table is exhausted; running out of statically sized
    /// descriptor slots is a configuration bug, not a runtime condition.
    pub fn alloc(&mut self) -> u32 {
        self.free_slots
            .pop()
            .expect("descriptor slot table exhausted")
    }

    /// Allocates `count` slots forming a contiguous ascending run and
    /// returns the first index.
    ///
    /// Shader-side code addresses multi-slot allocations relative to the
    /// first index, so the run must be truly contiguous. The lowest
    /// suitable run is chosen, which keeps the result deterministic.
    ///
    /// Panics if no contiguous run of `count` free slots exists.
    pub fn alloc_contiguous(&mut self, count: u32) -> u32 {
        assert!(count > 0, "contiguous allocation of zero slots");
        if count == 1 {
            return self.alloc();
        }

        let mut sorted = self.free_slots.clone();
        sorted.sort_unstable();

        let mut run_start = 0usize;
        let mut found = None;
        for i in 1..=sorted.len() {
            if i == sorted.len() || sorted[i] != sorted[i - 1] + 1 {
                if i - run_start >= count as usize {
                    found = Some(sorted[run_start]);
                    break;
                }
                run_start = i;
            }
        }

        let first = found.unwrap_or_else(|| {
            panic!(
                "descriptor slot table has no contiguous run of {} free slots",
                count
            )
        });

        self.free_slots
            .retain(|&slot| slot < first || slot >= first + count);
        first
    }

    /// Allocates one slot and returns its CPU/GPU handle pair.
    pub fn alloc_handles(&mut self) -> (CpuDescriptor, GpuDescriptor) {
        let index = self.alloc();
        (self.cpu_handle(index), self.gpu_handle(index))
    }

    /// Returns a slot to the free list.
    ///
    /// Panics on out-of-range or double frees.
    pub fn free(&mut self, index: u32) {
        assert!(index < self.capacity, "freed slot {} out of range", index);
        debug_assert!(
            !self.free_slots.contains(&index),
            "slot {} freed twice",
            index
        );
        self.free_slots.push(index);
    }

    /// Returns a slot identified by its handle pair.
    ///
    /// Both handles must resolve to the same index; a mismatch means the
    /// caller's bookkeeping is corrupt, which is fatal.
    pub fn free_handles(&mut self, cpu: CpuDescriptor, gpu: GpuDescriptor) {
        let cpu_index = (cpu.ptr - self.cpu_base) / self.stride;
        let gpu_index = (gpu.ptr - self.gpu_base) / self.stride;
        assert_eq!(
            cpu_index, gpu_index,
            "CPU/GPU descriptor handles resolve to different slots"
        );
        self.free(cpu_index as u32);
    }

    /// Computes the CPU handle for a slot.
    #[inline]
    pub fn cpu_handle(&self, index: u32) -> CpuDescriptor {
        CpuDescriptor {
            ptr: self.cpu_base + index as u64 * self.stride,
        }
    }

    /// Computes the GPU handle for a slot.
    #[inline]
    pub fn gpu_handle(&self, index: u32) -> GpuDescriptor {
        GpuDescriptor {
            ptr: self.gpu_base + index as u64 * self.stride,
        }
    }

    /// Total slot count.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Currently free slot count.
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free_slots.len()
    }
}

/// Size of one slot-table handle increment.
///
/// Vulkan exposes no per-descriptor address stride, so the table uses the
/// host size of the descriptor payload. The exact value is irrelevant to
/// correctness; it only has to be fixed and nonzero.
pub const SLOT_HANDLE_STRIDE: u64 = std::mem::size_of::<vk::DescriptorImageInfo>() as u64;

/// The shader-visible descriptor slot table.
///
/// One descriptor set with a single binding: a large, partially bound
/// combined-image-sampler array. Textures occupy slots handed out by the
/// embedded [`DescriptorSlotAllocator`]; shaders index the array with the
/// slot indices stored in material data.
pub struct TextureTable {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
    allocator: DescriptorSlotAllocator,
}

impl TextureTable {
    /// Binding index of the texture array inside the table's set.
    pub const BINDING: u32 = 0;

    /// Creates the table with `capacity` slots.
    pub fn new(device: Arc<Device>, capacity: u32) -> RhiResult<Self> {
        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(Self::BINDING)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(capacity)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)];

        let binding_flags = [vk::DescriptorBindingFlags::PARTIALLY_BOUND
            | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND];
        let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default()
            .binding_flags(&binding_flags);

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings)
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .push_next(&mut flags_info);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&layout_info, None)?
        };

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(capacity)];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(1)
            .pool_sizes(&pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND);

        let pool = unsafe { device.handle().create_descriptor_pool(&pool_info, None)? };

        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let set = unsafe { device.handle().allocate_descriptor_sets(&alloc_info)?[0] };

        let allocator =
            DescriptorSlotAllocator::new(0, set.as_raw(), SLOT_HANDLE_STRIDE, capacity);

        debug!("Texture table created: {} slots", capacity);

        Ok(Self {
            device,
            layout,
            pool,
            set,
            allocator,
        })
    }

    /// Allocates a slot and writes an image descriptor into it.
    pub fn create_srv(
        &mut self,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) -> u32 {
        let slot = self.allocator.alloc();
        self.write_srv(slot, view, sampler, layout);
        slot
    }

    /// Writes (or rewrites) the image descriptor at `slot`.
    ///
    /// Rewrites are how resize-recreated targets keep their slot indices.
    pub fn write_srv(
        &self,
        slot: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) {
        let image_info = [vk::DescriptorImageInfo::default()
            .sampler(sampler)
            .image_view(view)
            .image_layout(layout)];

        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(Self::BINDING)
            .dst_array_element(slot)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);

        unsafe {
            self.device.handle().update_descriptor_sets(&[write], &[]);
        }
    }

    /// Mutable access to the slot allocator.
    #[inline]
    pub fn allocator_mut(&mut self) -> &mut DescriptorSlotAllocator {
        &mut self.allocator
    }

    /// Shared access to the slot allocator.
    #[inline]
    pub fn allocator(&self) -> &DescriptorSlotAllocator {
        &self.allocator
    }

    /// The table's descriptor set.
    #[inline]
    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// The table's set layout (for pipeline layout creation).
    #[inline]
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for TextureTable {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Texture table destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_allocator(capacity: u32) -> DescriptorSlotAllocator {
        DescriptorSlotAllocator::new(0x1000, 0x9000, 32, capacity)
    }

    #[test]
    fn test_alloc_serves_indices_low_to_high() {
        let mut alloc = small_allocator(4);
        assert_eq!(alloc.alloc(), 0);
        assert_eq!(alloc.alloc(), 1);
        assert_eq!(alloc.alloc(), 2);
        assert_eq!(alloc.alloc(), 3);
    }

    #[test]
    fn test_live_indices_are_unique() {
        let mut alloc = small_allocator(16);
        let mut live = std::collections::HashSet::new();
        for _ in 0..10 {
            assert!(live.insert(alloc.alloc()));
        }
        // Free a few and re-allocate; recycled slots must come from the
        // freed set, never collide with still-live ones.
        for &slot in &[3u32, 7, 9] {
            alloc.free(slot);
            live.remove(&slot);
        }
        for _ in 0..3 {
            assert!(live.insert(alloc.alloc()));
        }
        assert_eq!(live.len(), 10);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_alloc_past_capacity_is_fatal() {
        let mut alloc = small_allocator(4);
        for _ in 0..4 {
            alloc.alloc();
        }
        alloc.alloc();
    }

    #[test]
    fn test_freed_slot_is_recycled_lifo() {
        let mut alloc = small_allocator(4);
        for _ in 0..4 {
            alloc.alloc();
        }
        alloc.free(2);
        assert_eq!(alloc.alloc(), 2);
    }

    #[test]
    fn test_contiguous_run_is_ascending_and_fresh() {
        let mut alloc = small_allocator(16);
        // Fragment the table: slots 0..6 live, then punch holes at 1 and 4.
        for _ in 0..6 {
            alloc.alloc();
        }
        alloc.free(1);
        alloc.free(4);

        let first = alloc.alloc_contiguous(3);
        // Neither hole can seed a 3-run; the run must come from the fresh
        // tail starting at 6.
        assert_eq!(first, 6);
        // All three slots of the run are now live: allocating the holes
        // back must not overlap the run.
        let a = alloc.alloc();
        let b = alloc.alloc();
        assert!(a == 4 && b == 1);
        assert_eq!(alloc.alloc(), 9);
    }

    #[test]
    fn test_contiguous_run_uses_lowest_gap() {
        let mut alloc = small_allocator(16);
        for _ in 0..8 {
            alloc.alloc();
        }
        alloc.free(2);
        alloc.free(3);
        alloc.free(4);
        assert_eq!(alloc.alloc_contiguous(2), 2);
    }

    #[test]
    #[should_panic(expected = "no contiguous run")]
    fn test_contiguous_without_room_is_fatal() {
        let mut alloc = small_allocator(4);
        alloc.alloc();
        let _ = alloc.alloc(); // slot 1 stays live
        alloc.free(0);
        // Free slots are {0, 2, 3}; no run of 3 exists.
        alloc.alloc_contiguous(3);
    }

    #[test]
    fn test_handle_pair_arithmetic() {
        let mut alloc = small_allocator(8);
        let (cpu, gpu) = alloc.alloc_handles();
        assert_eq!(cpu.ptr, 0x1000);
        assert_eq!(gpu.ptr, 0x9000);
        let (cpu1, gpu1) = alloc.alloc_handles();
        assert_eq!(cpu1.ptr - cpu.ptr, 32);
        assert_eq!(gpu1.ptr - gpu.ptr, 32);
    }

    #[test]
    fn test_free_through_handle_pair() {
        let mut alloc = small_allocator(8);
        let _ = alloc.alloc_handles();
        let (cpu, gpu) = alloc.alloc_handles();
        alloc.free_handles(cpu, gpu);
        // Slot 1 went back LIFO.
        assert_eq!(alloc.alloc(), 1);
    }

    #[test]
    #[should_panic(expected = "different slots")]
    fn test_mismatched_handle_pair_is_fatal() {
        let mut alloc = small_allocator(8);
        let (cpu, _) = alloc.alloc_handles();
        let (_, gpu) = alloc.alloc_handles();
        alloc.free_handles(cpu, gpu);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_free_out_of_range_is_fatal() {
        let mut alloc = small_allocator(4);
        alloc.free(4);
    }

    #[test]
    fn test_capacity_four_scenario() {
        // alloc x4 yields {0,1,2,3}; free(2) then alloc returns 2.
        let mut alloc = small_allocator(4);
        let mut seen: Vec<u32> = (0..4).map(|_| alloc.alloc()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        alloc.free(2);
        assert_eq!(alloc.alloc(), 2);
        assert_eq!(alloc.free_count(), 0);
    }
}
