//! The graphics-device abstraction this crate is written against.
//!
//! Backend bindings live with the host application. Everything here is
//! the minimal contract the pooling layer needs: create buffers, map
//! them for writing, copy device-side, and fence completed submissions.
//! Records are fixed-size and natively ordered: a 4×4 float matrix is
//! 64 bytes, a morph weight is a 4-byte float.

use std::sync::Arc;

use bitflags::bitflags;

/// Size of one 4×4 float matrix as stored in GPU buffers.
pub const MATRIX_BYTES: u64 = 64;

/// Size of one per-channel morph weight.
pub const MORPH_WEIGHT_BYTES: u64 = 4;

bitflags! {
    /// Intended usages of a device buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// CPU-writable through a mapping.
        const MAP_WRITE = 1 << 0;
        /// Source of device-side copies.
        const COPY_SRC = 1 << 1;
        /// Destination of device-side copies.
        const COPY_DST = 1 << 2;
        /// Vertex input.
        const VERTEX = 1 << 3;
        /// Index input.
        const INDEX = 1 << 4;
        /// Shader uniform data.
        const UNIFORM = 1 << 5;
        /// Shader storage data.
        const STORAGE = 1 << 6;
    }
}

/// One buffer owned by the device.
///
/// Handles are shared with `Arc`; the device destroys the allocation
/// when the last handle drops.
pub trait DeviceBuffer: Send + Sync {
    /// Process-unique id of the physical allocation.
    fn id(&self) -> u64;

    /// Debug label.
    fn label(&self) -> &str;

    /// Allocation size in bytes.
    fn size(&self) -> u64;

    /// Usage flags the buffer was created with.
    fn usage(&self) -> BufferUsage;

    /// Opens the buffer for CPU writes. Mapping an already mapped
    /// buffer is a programmer error.
    fn map_write(&self);

    /// Closes the write mapping before submission.
    fn unmap(&self);

    /// Writes bytes at `offset`. The buffer must be mapped.
    fn write(&self, offset: u64, data: &[u8]);
}

/// A completion marker for previously submitted GPU work.
pub trait Fence: Send + Sync {
    /// Whether the fenced work has retired.
    fn is_complete(&self) -> bool;

    /// Blocks until the fenced work retires, with no timeout. A device
    /// hang is fatal and has no retry policy.
    fn await_completion(&self);
}

/// The device surface the pooling layer runs on.
pub trait Device: Send + Sync {
    /// Creates a zero-filled buffer.
    fn create_buffer(&self, usage: BufferUsage, size: u64, label: &str) -> Arc<dyn DeviceBuffer>;

    /// Creates a buffer initialized with `data`.
    fn create_buffer_init(&self, usage: BufferUsage, data: &[u8], label: &str) -> Arc<dyn DeviceBuffer>;

    /// Queues a device-side copy of `src` into `dst` (the overlapping
    /// prefix when sizes differ).
    fn copy_buffer(&self, src: &dyn DeviceBuffer, dst: &dyn DeviceBuffer);

    /// Creates a fence covering all work submitted so far.
    fn create_fence(&self) -> Arc<dyn Fence>;

    /// Whether the device binds sub-ranges of a buffer efficiently.
    /// Drives the draw-data pooling strategy.
    fn supports_sub_buffer_binding(&self) -> bool;
}

/// A transient byte range handed out for one draw.
#[derive(Clone)]
pub struct DrawAllocation {
    /// The backing buffer; hold the `Arc` for as long as the range is
    /// referenced.
    pub buffer: Arc<dyn DeviceBuffer>,
    /// Byte offset of the range.
    pub offset: u64,
    /// Usable length of the range.
    pub size: u64,
}

impl DrawAllocation {
    /// Writes `data` at the start of the range.
    pub fn write(&self, data: &[u8]) {
        assert!(
            data.len() as u64 <= self.size,
            "draw-data write of {} bytes into a {}-byte allocation",
            data.len(),
            self.size
        );
        self.buffer.write(self.offset, data);
    }
}
