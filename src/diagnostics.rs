//! Resource accounting for instrumented builds and tests.
//!
//! Pools and buffer allocators accept an optional [`ResourceTracker`] at
//! construction. When one is supplied, every acquire/release, slot
//! allocation and buffer growth ticks a counter; when none is, the cost
//! is a branch on an `Option`. The tracker is an explicit, injected
//! context; there is no global registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide id source for physical GPU resources.
///
/// Ids are never reused, so a cached id comparing unequal always means
/// the underlying allocation was replaced.
static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a fresh, process-unique resource id.
pub fn generate_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Atomic counters shared between the allocators of one runtime.
#[derive(Debug, Default)]
pub struct ResourceTracker {
    pool_built: AtomicU64,
    pool_acquired: AtomicU64,
    pool_released: AtomicU64,
    cow_copies: AtomicU64,
    slots_allocated: AtomicU64,
    slots_freed: AtomicU64,
    buffer_grows: AtomicU64,
    transient_created: AtomicU64,
    transient_evicted: AtomicU64,
}

impl ResourceTracker {
    /// Creates a tracker wrapped for sharing across allocators.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn on_pool_build(&self) {
        self.pool_built.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_pool_acquire(&self) {
        self.pool_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_pool_release(&self) {
        self.pool_released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_cow_copy(&self) {
        self.cow_copies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_slot_allocated(&self) {
        self.slots_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_slot_freed(&self) {
        self.slots_freed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_buffer_grow(&self) {
        self.buffer_grows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_transient_created(&self) {
        self.transient_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_transient_evicted(&self) {
        self.transient_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Objects constructed by pools (free-list misses).
    #[must_use]
    pub fn pool_built(&self) -> u64 {
        self.pool_built.load(Ordering::Relaxed)
    }

    /// Pool acquisitions, hits and misses combined.
    #[must_use]
    pub fn pool_acquired(&self) -> u64 {
        self.pool_acquired.load(Ordering::Relaxed)
    }

    /// Pool releases.
    #[must_use]
    pub fn pool_released(&self) -> u64 {
        self.pool_released.load(Ordering::Relaxed)
    }

    /// Private copies taken by shared copy-on-write edits.
    #[must_use]
    pub fn cow_copies(&self) -> u64 {
        self.cow_copies.load(Ordering::Relaxed)
    }

    /// Slots handed out by slotted buffers.
    #[must_use]
    pub fn slots_allocated(&self) -> u64 {
        self.slots_allocated.load(Ordering::Relaxed)
    }

    /// Slots returned to slotted-buffer free lists.
    #[must_use]
    pub fn slots_freed(&self) -> u64 {
        self.slots_freed.load(Ordering::Relaxed)
    }

    /// Capacity-doubling reallocations of slotted buffers.
    #[must_use]
    pub fn buffer_grows(&self) -> u64 {
        self.buffer_grows.load(Ordering::Relaxed)
    }

    /// Physical buffers created by draw-data pools.
    #[must_use]
    pub fn transient_created(&self) -> u64 {
        self.transient_created.load(Ordering::Relaxed)
    }

    /// Idle draw-data buffers destroyed by eviction.
    #[must_use]
    pub fn transient_evicted(&self) -> u64 {
        self.transient_evicted.load(Ordering::Relaxed)
    }
}
