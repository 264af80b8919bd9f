//! Frame-pipelined pools for transient per-draw shader data.
//!
//! Per-draw uniforms live for one frame on the CPU side but up to
//! pipeline-depth frames on the GPU, so the backing buffers must not be
//! overwritten until the reading commands retire. Two interchangeable
//! strategies cover the two device families:
//!
//! - [`SlicedDrawPool`] bump-allocates byte ranges from a small ring of
//!   physical buffers, one per in-flight frame. Right for devices that
//!   bind sub-buffer ranges efficiently.
//! - [`PooledDrawPool`] hands out whole buffers from a size-indexed free
//!   set and reclaims them when their frame's fence signals. Right for
//!   devices that bind buffers only wholesale.
//!
//! Either way, [`rotate`](DrawDataPool::rotate) is the once-per-frame
//! synchronization point, called after every draw submission that
//! references the frame's allocations.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::diagnostics::ResourceTracker;
use crate::gpu::device::{BufferUsage, Device, DeviceBuffer, DrawAllocation, Fence};

/// Starting capacity of each sliced ring buffer.
const INITIAL_SLICE_CAPACITY: u64 = 64 * 1024;

/// Smallest buffer the pooled strategy will create.
const MIN_POOLED_SIZE: u64 = 256;

/// Transient per-draw buffer allocation with fenced rotation.
pub trait DrawDataPool: Send {
    /// Reserves `size` bytes for one draw, valid for the current frame.
    fn allocate(&mut self, size: u64) -> DrawAllocation;

    /// Ends the current frame: fences its submissions and recycles
    /// whatever older frames the device has finished with.
    fn rotate(&mut self);
}

/// Picks the strategy the device is best served by.
#[must_use]
pub fn draw_pool_for_device(
    device: &Arc<dyn Device>,
    usage: BufferUsage,
    config: &RuntimeConfig,
    tracker: Option<Arc<ResourceTracker>>,
) -> Box<dyn DrawDataPool> {
    if device.supports_sub_buffer_binding() {
        Box::new(SlicedDrawPool::new(Arc::clone(device), usage, config, tracker))
    } else {
        Box::new(PooledDrawPool::new(Arc::clone(device), usage, config, tracker))
    }
}

// ============================================================================
// Sliced strategy
// ============================================================================

struct RingSlice {
    buffer: Arc<dyn DeviceBuffer>,
    /// Completion fence of the last frame submitted from this buffer.
    fence: Option<Arc<dyn Fence>>,
    mapped: bool,
}

/// Bump allocation from a ring of per-frame buffers.
pub struct SlicedDrawPool {
    device: Arc<dyn Device>,
    usage: BufferUsage,
    config: RuntimeConfig,
    tracker: Option<Arc<ResourceTracker>>,
    ring: Vec<RingSlice>,
    cursor: usize,
    offset: u64,
    capacity: u64,
    frame: u64,
    /// Buffers replaced by growth, parked until their frame retires.
    graveyard: VecDeque<(u64, Arc<dyn DeviceBuffer>)>,
}

impl SlicedDrawPool {
    /// Creates the ring with one buffer per in-flight frame.
    pub fn new(
        device: Arc<dyn Device>,
        usage: BufferUsage,
        config: &RuntimeConfig,
        tracker: Option<Arc<ResourceTracker>>,
    ) -> Self {
        let usage = usage | BufferUsage::MAP_WRITE;
        let ring = (0..config.pipeline_depth.max(1))
            .map(|index| RingSlice {
                buffer: device.create_buffer(
                    usage,
                    INITIAL_SLICE_CAPACITY,
                    &format!("DrawDataSlice{index}"),
                ),
                fence: None,
                mapped: false,
            })
            .collect();
        if let Some(tracker) = &tracker {
            for _ in 0..config.pipeline_depth.max(1) {
                tracker.on_transient_created();
            }
        }
        Self {
            device,
            usage,
            config: *config,
            tracker,
            ring,
            cursor: 0,
            offset: 0,
            capacity: INITIAL_SLICE_CAPACITY,
            frame: 0,
            graveyard: VecDeque::new(),
        }
    }

    fn grow(&mut self, needed: u64) {
        let new_capacity = (self.capacity * 2).max(self.config.align_up(needed));
        log::debug!(
            "draw-data slice {} growing: {} -> {} bytes",
            self.cursor,
            self.capacity,
            new_capacity
        );
        let slice = &mut self.ring[self.cursor];
        if slice.mapped {
            slice.buffer.unmap();
            slice.mapped = false;
        }
        // Earlier allocations of this frame still reference the old
        // buffer; park it until the frame provably retires.
        let replaced = std::mem::replace(
            &mut slice.buffer,
            self.device.create_buffer(
                self.usage,
                new_capacity,
                &format!("DrawDataSlice{}", self.cursor),
            ),
        );
        self.graveyard.push_back((self.frame, replaced));
        if let Some(tracker) = &self.tracker {
            tracker.on_transient_created();
        }
        self.capacity = new_capacity;
        self.offset = 0;
    }
}

impl DrawDataPool for SlicedDrawPool {
    fn allocate(&mut self, size: u64) -> DrawAllocation {
        let offset = self.config.align_up(self.offset);
        if offset + size > self.capacity {
            self.grow(size);
        }
        let offset = self.config.align_up(self.offset);
        let slice = &mut self.ring[self.cursor];
        if !slice.mapped {
            slice.buffer.map_write();
            slice.mapped = true;
        }
        self.offset = offset + size;
        DrawAllocation {
            buffer: Arc::clone(&slice.buffer),
            offset,
            size,
        }
    }

    fn rotate(&mut self) {
        let depth = self.ring.len();
        {
            let slice = &mut self.ring[self.cursor];
            if slice.mapped {
                slice.buffer.unmap();
                slice.mapped = false;
            }
            slice.fence = Some(self.device.create_fence());
        }
        self.frame += 1;
        self.cursor = (self.cursor + 1) % depth;
        // The incoming buffer was last touched pipeline-depth frames
        // ago; block until the device is done reading it.
        if let Some(fence) = self.ring[self.cursor].fence.take() {
            fence.await_completion();
        }
        self.offset = 0;
        while let Some((frame, _)) = self.graveyard.front() {
            if frame + depth as u64 <= self.frame {
                self.graveyard.pop_front();
                if let Some(tracker) = &self.tracker {
                    tracker.on_transient_evicted();
                }
            } else {
                break;
            }
        }
    }
}

// ============================================================================
// Pooled strategy
// ============================================================================

struct PooledBuffer {
    buffer: Arc<dyn DeviceBuffer>,
    size: u64,
    last_used_frame: u64,
    mapped: bool,
}

/// Whole-buffer recycling keyed by size, gated by per-frame fences.
pub struct PooledDrawPool {
    device: Arc<dyn Device>,
    usage: BufferUsage,
    tracker: Option<Arc<ResourceTracker>>,
    frame_lifetime: u64,
    frame: u64,
    /// Reusable buffers, smallest sufficient size wins.
    free: BTreeMap<u64, Vec<PooledBuffer>>,
    /// Buffers handed out for the frame being recorded.
    current: Vec<PooledBuffer>,
    /// Submitted frames awaiting their completion fence, oldest first.
    in_flight: VecDeque<(Arc<dyn Fence>, Vec<PooledBuffer>)>,
}

impl PooledDrawPool {
    /// Creates an empty pool.
    pub fn new(
        device: Arc<dyn Device>,
        usage: BufferUsage,
        config: &RuntimeConfig,
        tracker: Option<Arc<ResourceTracker>>,
    ) -> Self {
        Self {
            device,
            usage: usage | BufferUsage::MAP_WRITE,
            tracker,
            frame_lifetime: config.pooled_frame_lifetime,
            frame: 0,
            free: BTreeMap::new(),
            current: Vec::new(),
            in_flight: VecDeque::new(),
        }
    }

    fn take_free(&mut self, size: u64) -> Option<PooledBuffer> {
        let key = *self.free.range(size..).next().map(|(key, _)| key)?;
        let bucket = self.free.get_mut(&key)?;
        let entry = bucket.pop();
        if bucket.is_empty() {
            self.free.remove(&key);
        }
        entry
    }

    fn reclaim_completed(&mut self) {
        while let Some((fence, _)) = self.in_flight.front() {
            if !fence.is_complete() {
                break;
            }
            let (_, entries) = self.in_flight.pop_front().expect("front checked above");
            for entry in entries {
                self.free.entry(entry.size).or_default().push(entry);
            }
        }
    }

    fn evict_idle(&mut self) {
        let frame = self.frame;
        let lifetime = self.frame_lifetime;
        let tracker = self.tracker.clone();
        let mut evicted = 0u64;
        self.free.retain(|_, bucket| {
            bucket.retain(|entry| {
                let keep = entry.last_used_frame + lifetime > frame;
                if !keep {
                    evicted += 1;
                }
                keep
            });
            !bucket.is_empty()
        });
        if evicted > 0 {
            log::debug!("evicting {evicted} idle draw-data buffers");
            if let Some(tracker) = &tracker {
                for _ in 0..evicted {
                    tracker.on_transient_evicted();
                }
            }
        }
    }
}

impl DrawDataPool for PooledDrawPool {
    fn allocate(&mut self, size: u64) -> DrawAllocation {
        let mut entry = match self.take_free(size) {
            Some(entry) => entry,
            None => {
                let rounded = size.max(MIN_POOLED_SIZE).next_power_of_two();
                if let Some(tracker) = &self.tracker {
                    tracker.on_transient_created();
                }
                PooledBuffer {
                    buffer: self.device.create_buffer(
                        self.usage,
                        rounded,
                        "DrawDataPooled",
                    ),
                    size: rounded,
                    last_used_frame: self.frame,
                    mapped: false,
                }
            }
        };
        entry.last_used_frame = self.frame;
        if !entry.mapped {
            entry.buffer.map_write();
            entry.mapped = true;
        }
        let allocation = DrawAllocation {
            buffer: Arc::clone(&entry.buffer),
            offset: 0,
            size,
        };
        self.current.push(entry);
        allocation
    }

    fn rotate(&mut self) {
        for entry in &mut self.current {
            if entry.mapped {
                entry.buffer.unmap();
                entry.mapped = false;
            }
        }
        if !self.current.is_empty() {
            let fence = self.device.create_fence();
            self.in_flight
                .push_back((fence, std::mem::take(&mut self.current)));
        }
        self.frame += 1;
        self.reclaim_completed();
        self.evict_idle();
    }
}
