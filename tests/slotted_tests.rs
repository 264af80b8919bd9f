//! Slotted buffer tests
//!
//! Tests for:
//! - lowest-free-index allocation and append-at-end behavior
//! - fail-fast frees of unallocated indices
//! - capacity doubling preserving allocated bytes and changing the
//!   physical buffer id
//! - write-mapping lifecycle across growth

use std::sync::Arc;

use marionette::diagnostics::ResourceTracker;
use marionette::gpu::device::{BufferUsage, Device};
use marionette::gpu::headless::HeadlessDevice;
use marionette::gpu::slotted::SlottedBuffer;

// ============================================================================
// Helpers
// ============================================================================

fn slotted(slot_size: u64, capacity: u32) -> (Arc<HeadlessDevice>, SlottedBuffer) {
    let headless = HeadlessDevice::new();
    let device: Arc<dyn Device> = headless.clone();
    let buffer = SlottedBuffer::new(device, BufferUsage::STORAGE, slot_size, capacity, "TestSlots");
    (headless, buffer)
}

// ============================================================================
// Allocation discipline
// ============================================================================

#[test]
fn allocates_dense_then_reuses_lowest_freed() {
    let (_, mut slots) = slotted(16, 8);

    assert_eq!(slots.allocate_slot(), 0);
    assert_eq!(slots.allocate_slot(), 1);
    assert_eq!(slots.allocate_slot(), 2);
    assert_eq!(slots.allocate_slot(), 3);

    slots.free_slot(2);
    slots.free_slot(0);

    // Lowest free index first, then the next, then append.
    assert_eq!(slots.allocate_slot(), 0);
    assert_eq!(slots.allocate_slot(), 2);
    assert_eq!(slots.allocate_slot(), 4);
    assert_eq!(slots.logical_len(), 5);
}

#[test]
fn allocated_indices_stay_below_logical_len() {
    let (_, mut slots) = slotted(16, 4);
    let mut held = Vec::new();
    for _ in 0..10 {
        held.push(slots.allocate_slot());
    }
    for index in [1, 3, 5, 7] {
        slots.free_slot(index);
    }
    for _ in 0..6 {
        let index = slots.allocate_slot();
        assert!(index < slots.logical_len());
    }
}

#[test]
#[should_panic(expected = "freeing unallocated slot")]
fn double_free_fails_fast() {
    let (_, mut slots) = slotted(16, 4);
    let index = slots.allocate_slot();
    slots.free_slot(index);
    slots.free_slot(index);
}

#[test]
#[should_panic(expected = "freeing unallocated slot")]
fn free_of_never_allocated_index_fails_fast() {
    let (_, mut slots) = slotted(16, 4);
    slots.free_slot(3);
}

// ============================================================================
// Growth
// ============================================================================

#[test]
fn growth_doubles_capacity_and_replaces_buffer_id() {
    let tracker = ResourceTracker::new();
    let (_, slots) = slotted(16, 2);
    let mut slots = slots.with_tracker(Arc::clone(&tracker));

    let id_before = slots.buffer_id();
    slots.allocate_slot();
    slots.allocate_slot();
    assert_eq!(slots.capacity(), 2);

    slots.allocate_slot();
    assert_eq!(slots.capacity(), 4);
    assert_ne!(slots.buffer_id(), id_before);
    assert_eq!(tracker.buffer_grows(), 1);
}

#[test]
fn growth_preserves_bytes_of_allocated_slots() {
    let (headless, mut slots) = slotted(4, 2);

    let a = slots.allocate_slot();
    let b = slots.allocate_slot();
    slots.write_slot(a, 0, &[1, 2, 3, 4]);
    slots.write_slot(b, 0, &[5, 6, 7, 8]);

    // Forces the doubling copy.
    let c = slots.allocate_slot();
    slots.write_slot(c, 0, &[9, 9, 9, 9]);

    let bytes = headless
        .buffer_contents(slots.buffer_id())
        .expect("grown buffer is live");
    assert_eq!(&bytes[0..4], &[1, 2, 3, 4]);
    assert_eq!(&bytes[4..8], &[5, 6, 7, 8]);
    assert_eq!(&bytes[8..12], &[9, 9, 9, 9]);
}

#[test]
fn growth_invalidates_write_mapping() {
    let (_, mut slots) = slotted(4, 1);

    let a = slots.allocate_slot();
    slots.write_slot(a, 0, &[1, 1, 1, 1]);
    assert!(slots.is_mapped());

    // Growth replaces the buffer; the old mapping dies with it.
    slots.allocate_slot();
    assert!(!slots.is_mapped());

    // The next write maps the new buffer on demand.
    slots.write_slot(a, 0, &[2, 2, 2, 2]);
    assert!(slots.is_mapped());
    slots.finish_writes();
    assert!(!slots.is_mapped());
}

// ============================================================================
// Writes
// ============================================================================

#[test]
fn writes_land_at_slot_offsets() {
    let (headless, mut slots) = slotted(8, 4);
    let a = slots.allocate_slot();
    let b = slots.allocate_slot();

    slots.write_slot(a, 0, &[0xAA; 8]);
    slots.write_slot(b, 4, &[0xBB; 4]);

    let bytes = headless.buffer_contents(slots.buffer_id()).unwrap();
    assert_eq!(&bytes[0..8], &[0xAA; 8]);
    assert_eq!(&bytes[8..12], &[0, 0, 0, 0]);
    assert_eq!(&bytes[12..16], &[0xBB; 4]);
}

#[test]
#[should_panic(expected = "overflows")]
fn write_past_slot_end_fails_fast() {
    let (_, mut slots) = slotted(8, 4);
    let a = slots.allocate_slot();
    slots.write_slot(a, 4, &[0; 8]);
}

#[test]
#[should_panic(expected = "unallocated slot")]
fn write_to_freed_slot_fails_fast() {
    let (_, mut slots) = slotted(8, 4);
    let a = slots.allocate_slot();
    slots.free_slot(a);
    slots.write_slot(a, 0, &[0; 8]);
}
