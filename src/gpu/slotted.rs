//! A growable device buffer carved into fixed-size slots.
//!
//! Slot indices are dense: allocation pops the lowest free index or
//! appends a new highest one, so renderers can compute byte offsets as
//! `slot * slot_size` forever. Capacity doubles on demand with a
//! device-side copy; the physical buffer id changes on growth so
//! bind-group caches notice the swap.
//!
//! This type does not know about frames. Freeing a slot makes it
//! immediately reusable, so callers whose slots may still be read by
//! in-flight GPU work must delay their `free_slot` calls behind frame
//! fencing (see the palette arena).

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::diagnostics::ResourceTracker;
use crate::gpu::device::{BufferUsage, Device, DeviceBuffer};

/// A single growable buffer divided into equally sized slots.
pub struct SlottedBuffer {
    device: Arc<dyn Device>,
    buffer: Arc<dyn DeviceBuffer>,
    label: String,
    usage: BufferUsage,
    slot_size: u64,
    /// Slots the current allocation can hold.
    capacity: u32,
    /// High-water mark: every index ever handed out is below this.
    len: u32,
    free: BinaryHeap<Reverse<u32>>,
    allocated: Vec<bool>,
    mapped: bool,
    tracker: Option<Arc<ResourceTracker>>,
}

impl SlottedBuffer {
    /// Creates a slotted buffer with room for `initial_capacity` slots.
    pub fn new(
        device: Arc<dyn Device>,
        usage: BufferUsage,
        slot_size: u64,
        initial_capacity: u32,
        label: &str,
    ) -> Self {
        assert!(slot_size > 0, "slotted buffer with zero slot size");
        let capacity = initial_capacity.max(1);
        let usage = usage | BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC | BufferUsage::COPY_DST;
        let buffer = device.create_buffer(usage, slot_size * u64::from(capacity), label);
        Self {
            device,
            buffer,
            label: label.to_string(),
            usage,
            slot_size,
            capacity,
            len: 0,
            free: BinaryHeap::new(),
            allocated: Vec::new(),
            mapped: false,
            tracker: None,
        }
    }

    /// Attaches a diagnostics context.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<ResourceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Hands out the lowest free slot index, growing if necessary.
    pub fn allocate_slot(&mut self) -> u32 {
        let index = if let Some(Reverse(index)) = self.free.pop() {
            self.allocated[index as usize] = true;
            index
        } else {
            if self.len == self.capacity {
                self.grow(self.capacity * 2);
            }
            let index = self.len;
            self.len += 1;
            self.allocated.push(true);
            index
        };
        if let Some(tracker) = &self.tracker {
            tracker.on_slot_allocated();
        }
        index
    }

    /// Returns a slot to the free list.
    ///
    /// The index must be currently allocated; anything else is a
    /// programmer error. The slot is reusable immediately; delaying
    /// that until in-flight reads retire is the caller's job.
    pub fn free_slot(&mut self, index: u32) {
        assert!(
            (index as usize) < self.allocated.len() && self.allocated[index as usize],
            "freeing unallocated slot {index} of `{}`",
            self.label
        );
        self.allocated[index as usize] = false;
        self.free.push(Reverse(index));
        if let Some(tracker) = &self.tracker {
            tracker.on_slot_freed();
        }
    }

    /// Writes bytes into an allocated slot, mapping the buffer first if
    /// it is not currently mapped.
    pub fn write_slot(&mut self, index: u32, offset: u64, data: &[u8]) {
        assert!(
            (index as usize) < self.allocated.len() && self.allocated[index as usize],
            "write to unallocated slot {index} of `{}`",
            self.label
        );
        assert!(
            offset + data.len() as u64 <= self.slot_size,
            "write of {} bytes at offset {offset} overflows a {}-byte slot",
            data.len(),
            self.slot_size
        );
        if !self.mapped {
            self.buffer.map_write();
            self.mapped = true;
        }
        self.buffer
            .write(u64::from(index) * self.slot_size + offset, data);
    }

    /// Closes the write mapping ahead of command submission.
    pub fn finish_writes(&mut self) {
        if self.mapped {
            self.buffer.unmap();
            self.mapped = false;
        }
    }

    fn grow(&mut self, new_capacity: u32) {
        log::info!(
            "`{}` expanding capacity: {} -> {} slots",
            self.label,
            self.capacity,
            new_capacity
        );
        // Growth replaces the physical buffer, so any open mapping dies
        // with the old allocation.
        self.finish_writes();
        let new_buffer = self
            .device
            .create_buffer(self.usage, self.slot_size * u64::from(new_capacity), &self.label);
        self.device.copy_buffer(self.buffer.as_ref(), new_buffer.as_ref());
        self.buffer = new_buffer;
        self.capacity = new_capacity;
        if let Some(tracker) = &self.tracker {
            tracker.on_buffer_grow();
        }
    }

    /// Id of the current physical allocation; changes on growth.
    #[must_use]
    pub fn buffer_id(&self) -> u64 {
        self.buffer.id()
    }

    /// The current physical buffer.
    #[must_use]
    pub fn buffer(&self) -> Arc<dyn DeviceBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Slot size in bytes.
    #[must_use]
    pub fn slot_size(&self) -> u64 {
        self.slot_size
    }

    /// High-water slot count; allocated indices are always below this.
    #[must_use]
    pub fn logical_len(&self) -> u32 {
        self.len
    }

    /// Current slot capacity.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of slots currently allocated.
    #[must_use]
    pub fn allocated_count(&self) -> u32 {
        self.len - self.free.len() as u32
    }

    /// Whether a write mapping is currently open.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}
