//! Per-frame resources and the fence-gated ring.
//!
//! The CPU records up to [`NUM_FRAME_RESOURCES`] frames ahead of the GPU.
//! Each [`FrameResource`] owns everything one frame's recording touches:
//! command pool + buffer, the per-object / material / pass / SSAO upload
//! buffers, and the descriptor sets pointing at them. A frame resource
//! may be rewritten only after the GPU's timeline fence passes the value
//! stamped at its last submission.
//!
//! Ownership transfers atomically at submit: the CPU owns a frame
//! resource from [`FrameRing::advance`] until `queue_submit`, the GPU
//! timeline owns it from then until the fence reaches its stamped value.
//! No locking is involved; the wait in `advance` is the only blocking
//! point of the steady-state loop.

use std::sync::Arc;

use tracing::{debug, trace};

use drake_rhi::RhiResult;
use drake_rhi::buffer::UploadBuffer;
use drake_rhi::command::{CommandBuffer, CommandPool};
use drake_rhi::descriptor::DescriptorPool;
use drake_rhi::device::Device;
use drake_rhi::sync::GpuTimeline;
use drake_rhi::vk;

use crate::NUM_FRAME_RESOURCES;
use crate::constants::{MaterialData, ObjectConstants, PassConstants, SsaoConstants};

/// Anything the ring can gate on a fence value.
///
/// Split from [`FrameResource`] so the advance protocol is testable with
/// plain value slots.
pub trait RingSlot {
    /// The timeline value stamped at this slot's last submission; 0 means
    /// never submitted.
    fn fence_value(&self) -> u64;
}

/// All GPU-visible state one in-flight frame records into.
pub struct FrameResource {
    /// Command allocator for this frame; reset each time the slot cycles
    /// back to the CPU.
    pub command_pool: CommandPool,
    /// Primary command buffer recorded each frame.
    pub command_buffer: CommandBuffer,
    /// One aligned element per render item.
    pub object_cb: UploadBuffer<ObjectConstants>,
    /// One packed element per material.
    pub material_buffer: UploadBuffer<MaterialData>,
    /// Two elements: main camera pass and shadow pass.
    pub pass_cb: UploadBuffer<PassConstants>,
    /// One element of SSAO constants.
    pub ssao_cb: UploadBuffer<SsaoConstants>,
    /// Scene descriptor set (pass + object + material bindings).
    pub scene_set: vk::DescriptorSet,
    /// SSAO descriptor set (SSAO constant binding).
    pub ssao_set: vk::DescriptorSet,
    /// Timeline value to wait for before reuse; 0 until first submission.
    pub fence_value: u64,
}

impl FrameResource {
    /// Creates one frame resource with buffers sized for the scene.
    pub fn new(
        device: Arc<Device>,
        descriptor_pool: &DescriptorPool,
        scene_set_layout: vk::DescriptorSetLayout,
        ssao_set_layout: vk::DescriptorSetLayout,
        object_count: u32,
        material_count: u32,
    ) -> RhiResult<Self> {
        let graphics_family = device.queue_families().graphics_family.unwrap();
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;

        let object_cb = UploadBuffer::new_uniform(device.clone(), object_count)?;
        let material_buffer = UploadBuffer::new_storage(device.clone(), material_count)?;
        let pass_cb = UploadBuffer::new_uniform(device.clone(), PassConstants::COUNT)?;
        let ssao_cb = UploadBuffer::new_uniform(device.clone(), 1)?;

        let sets = descriptor_pool.allocate(&[scene_set_layout, ssao_set_layout])?;
        let (scene_set, ssao_set) = (sets[0], sets[1]);

        Self::write_descriptor_sets(
            &device,
            scene_set,
            ssao_set,
            &pass_cb,
            &object_cb,
            &material_buffer,
            &ssao_cb,
        );

        Ok(Self {
            command_pool,
            command_buffer,
            object_cb,
            material_buffer,
            pass_cb,
            ssao_cb,
            scene_set,
            ssao_set,
            fence_value: 0,
        })
    }

    fn write_descriptor_sets(
        device: &Device,
        scene_set: vk::DescriptorSet,
        ssao_set: vk::DescriptorSet,
        pass_cb: &UploadBuffer<PassConstants>,
        object_cb: &UploadBuffer<ObjectConstants>,
        material_buffer: &UploadBuffer<MaterialData>,
        ssao_cb: &UploadBuffer<SsaoConstants>,
    ) {
        // Dynamic uniform descriptors bind one element's range; the draw
        // supplies the element offset.
        let pass_info = [vk::DescriptorBufferInfo::default()
            .buffer(pass_cb.handle())
            .offset(0)
            .range(PassConstants::SIZE as u64)];
        let object_info = [vk::DescriptorBufferInfo::default()
            .buffer(object_cb.handle())
            .offset(0)
            .range(ObjectConstants::SIZE as u64)];
        let material_info = [vk::DescriptorBufferInfo::default()
            .buffer(material_buffer.handle())
            .offset(0)
            .range(vk::WHOLE_SIZE)];
        let ssao_info = [vk::DescriptorBufferInfo::default()
            .buffer(ssao_cb.handle())
            .offset(0)
            .range(SsaoConstants::SIZE as u64)];

        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(scene_set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .buffer_info(&pass_info),
            vk::WriteDescriptorSet::default()
                .dst_set(scene_set)
                .dst_binding(1)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .buffer_info(&object_info),
            vk::WriteDescriptorSet::default()
                .dst_set(scene_set)
                .dst_binding(2)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(&material_info),
            vk::WriteDescriptorSet::default()
                .dst_set(ssao_set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&ssao_info),
        ];

        unsafe {
            device.handle().update_descriptor_sets(&writes, &[]);
        }
    }
}

impl RingSlot for FrameResource {
    fn fence_value(&self) -> u64 {
        self.fence_value
    }
}

/// Fixed ring of frame resources cycled round-robin.
pub struct FrameRing<F: RingSlot = FrameResource> {
    slots: Vec<F>,
    current: usize,
}

impl<F: RingSlot> FrameRing<F> {
    /// Builds the ring from pre-created slots.
    ///
    /// The ring length is [`NUM_FRAME_RESOURCES`] in production; tests may
    /// use any nonzero length. Starts positioned on the last slot so the
    /// first `advance` lands on slot 0.
    pub fn new(slots: Vec<F>) -> Self {
        assert!(!slots.is_empty(), "frame ring cannot be empty");
        let current = slots.len() - 1;
        debug!("Frame ring created: {} slots", slots.len());
        Self { slots, current }
    }

    /// Moves to the next slot, blocking until the GPU is done with it.
    ///
    /// A slot with fence value 0 has never been submitted and is free
    /// immediately. Otherwise, if the timeline has not yet reached the
    /// slot's stamped value, this waits (without timeout) until it does.
    /// This is the only place the steady-state frame loop blocks.
    pub fn advance(&mut self, timeline: &dyn GpuTimeline) -> RhiResult<&mut F> {
        self.current = (self.current + 1) % self.slots.len();
        let slot = &self.slots[self.current];

        let fence_value = slot.fence_value();
        if fence_value != 0 && timeline.completed_value()? < fence_value {
            trace!("Frame ring waiting for fence value {}", fence_value);
            timeline.wait_for(fence_value)?;
        }

        Ok(&mut self.slots[self.current])
    }

    /// The slot the CPU currently owns.
    pub fn current(&self) -> &F {
        &self.slots[self.current]
    }

    /// Mutable access to the current slot.
    pub fn current_mut(&mut self) -> &mut F {
        &mut self.slots[self.current]
    }

    /// Index of the current slot.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; the constructor rejects empty rings.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates all slots (teardown, whole-ring invalidation).
    pub fn slots(&self) -> &[F] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use drake_rhi::RhiResult;

    /// Value-only stand-in for a frame resource.
    struct TestSlot {
        fence_value: u64,
    }

    impl RingSlot for TestSlot {
        fn fence_value(&self) -> u64 {
            self.fence_value
        }
    }

    /// Mock GPU timeline: a settable completed counter that records every
    /// wait and then "completes" the waited value, like a GPU catching up.
    struct MockTimeline {
        completed: Cell<u64>,
        waits: RefCell<Vec<u64>>,
    }

    impl MockTimeline {
        fn at(completed: u64) -> Self {
            Self {
                completed: Cell::new(completed),
                waits: RefCell::new(Vec::new()),
            }
        }
    }

    impl GpuTimeline for MockTimeline {
        fn completed_value(&self) -> RhiResult<u64> {
            Ok(self.completed.get())
        }

        fn wait_for(&self, value: u64) -> RhiResult<()> {
            self.waits.borrow_mut().push(value);
            self.completed.set(self.completed.get().max(value));
            Ok(())
        }
    }

    fn ring_of(values: [u64; 3]) -> FrameRing<TestSlot> {
        FrameRing::new(
            values
                .into_iter()
                .map(|fence_value| TestSlot { fence_value })
                .collect(),
        )
    }

    #[test]
    fn test_fresh_ring_never_waits() {
        // Fence value 0 means "never submitted": a full lap must not wait.
        let mut ring = ring_of([0, 0, 0]);
        let timeline = MockTimeline::at(0);
        for expected in [0usize, 1, 2, 0] {
            ring.advance(&timeline).unwrap();
            assert_eq!(ring.current_index(), expected);
        }
        assert!(timeline.waits.borrow().is_empty());
    }

    #[test]
    fn test_advance_blocks_exactly_until_stamped_value() {
        // Frames submitted with fences 1, 2, 3; the GPU has completed
        // nothing. Returning to slot 0 must wait for exactly 1.
        let mut ring = ring_of([1, 2, 3]);
        let timeline = MockTimeline::at(0);

        ring.advance(&timeline).unwrap();
        assert_eq!(*timeline.waits.borrow(), vec![1]);

        // Slot 1 needs fence 2; the mock completed 1 during the first
        // wait, so another wait is required.
        ring.advance(&timeline).unwrap();
        assert_eq!(*timeline.waits.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_advance_skips_wait_when_gpu_is_ahead() {
        let mut ring = ring_of([1, 2, 3]);
        let timeline = MockTimeline::at(3);
        for _ in 0..6 {
            ring.advance(&timeline).unwrap();
        }
        assert!(timeline.waits.borrow().is_empty());
    }

    #[test]
    fn test_steady_state_submission_cycle() {
        // Drive the ring the way the renderer does: stamp a new fence on
        // submit, advance, repeat. The wait sequence must trail the
        // submission sequence by exactly the ring length.
        let mut ring = ring_of([0, 0, 0]);
        let timeline = MockTimeline::at(0);
        let mut next_fence = 0u64;

        for _ in 0..10 {
            let slot = ring.advance(&timeline).unwrap();
            next_fence += 1;
            slot.fence_value = next_fence;
        }

        // Laps 2 and 3 wait on the fences stamped a full lap earlier.
        assert_eq!(*timeline.waits.borrow(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    #[should_panic(expected = "empty")]
    fn test_empty_ring_rejected() {
        let _ = FrameRing::<TestSlot>::new(Vec::new());
    }
}
