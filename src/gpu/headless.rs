//! An in-memory device for tests and CI.
//!
//! Buffers are byte-accurate `Vec<u8>`s with the same map/unmap contract
//! a real backend enforces, copies run immediately, and fences are under
//! the test's control: they stay pending until
//! [`signal_all_fences`](HeadlessDevice::signal_all_fences) flips them.
//! A blocking [`Fence::await_completion`] on a pending fence completes
//! it on the spot (a single-threaded test must not deadlock), but the
//! wait is counted so tests can assert that rotation actually blocked.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Weak;

use parking_lot::Mutex;

use crate::diagnostics::generate_resource_id;
use crate::gpu::device::{BufferUsage, Device, DeviceBuffer, Fence};

struct HeadlessBuffer {
    id: u64,
    label: String,
    usage: BufferUsage,
    data: Mutex<Vec<u8>>,
    mapped: AtomicBool,
}

impl DeviceBuffer for HeadlessBuffer {
    fn id(&self) -> u64 {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn size(&self) -> u64 {
        self.data.lock().len() as u64
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn map_write(&self) {
        let was_mapped = self.mapped.swap(true, Ordering::AcqRel);
        assert!(!was_mapped, "buffer `{}` mapped twice", self.label);
    }

    fn unmap(&self) {
        let was_mapped = self.mapped.swap(false, Ordering::AcqRel);
        assert!(was_mapped, "buffer `{}` unmapped while not mapped", self.label);
    }

    fn write(&self, offset: u64, data: &[u8]) {
        assert!(
            self.mapped.load(Ordering::Acquire),
            "write to unmapped buffer `{}`",
            self.label
        );
        let mut bytes = self.data.lock();
        let end = offset as usize + data.len();
        assert!(
            end <= bytes.len(),
            "write past the end of buffer `{}` ({} > {})",
            self.label,
            end,
            bytes.len()
        );
        bytes[offset as usize..end].copy_from_slice(data);
    }
}

struct HeadlessFence {
    signaled: AtomicBool,
    forced_waits: Arc<AtomicU64>,
}

impl Fence for HeadlessFence {
    fn is_complete(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    fn await_completion(&self) {
        if !self.signaled.swap(true, Ordering::AcqRel) {
            self.forced_waits.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// The in-memory [`Device`] implementation.
pub struct HeadlessDevice {
    sub_buffer_binding: bool,
    buffers: Mutex<Vec<Weak<HeadlessBuffer>>>,
    fences: Mutex<Vec<Weak<HeadlessFence>>>,
    forced_waits: Arc<AtomicU64>,
}

impl HeadlessDevice {
    /// A device that binds sub-buffer ranges (the sliced strategy).
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_sub_buffer_binding(true)
    }

    /// A device with explicit sub-buffer-binding support.
    #[must_use]
    pub fn with_sub_buffer_binding(sub_buffer_binding: bool) -> Arc<Self> {
        Arc::new(Self {
            sub_buffer_binding,
            buffers: Mutex::new(Vec::new()),
            fences: Mutex::new(Vec::new()),
            forced_waits: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Signals every pending fence, as if the GPU caught up completely.
    pub fn signal_all_fences(&self) {
        let mut fences = self.fences.lock();
        fences.retain(|weak| {
            let Some(fence) = weak.upgrade() else {
                return false;
            };
            fence.signaled.store(true, Ordering::Release);
            true
        });
    }

    /// Number of live, unsignaled fences.
    #[must_use]
    pub fn pending_fence_count(&self) -> usize {
        self.fences
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|fence| !fence.is_complete())
            .count()
    }

    /// How many `await_completion` calls found their fence unsignaled.
    #[must_use]
    pub fn forced_waits(&self) -> u64 {
        self.forced_waits.load(Ordering::Relaxed)
    }

    /// Number of buffers still alive (referenced by someone).
    #[must_use]
    pub fn live_buffer_count(&self) -> usize {
        let mut buffers = self.buffers.lock();
        buffers.retain(|weak| weak.strong_count() > 0);
        buffers.len()
    }

    /// Snapshot of a live buffer's bytes, by physical id.
    #[must_use]
    pub fn buffer_contents(&self, id: u64) -> Option<Vec<u8>> {
        self.find(id).map(|buffer| buffer.data.lock().clone())
    }

    fn find(&self, id: u64) -> Option<Arc<HeadlessBuffer>> {
        self.buffers
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .find(|buffer| buffer.id == id)
    }

    fn register(&self, usage: BufferUsage, data: Vec<u8>, label: &str) -> Arc<dyn DeviceBuffer> {
        let buffer = Arc::new(HeadlessBuffer {
            id: generate_resource_id(),
            label: label.to_string(),
            usage,
            data: Mutex::new(data),
            mapped: AtomicBool::new(false),
        });
        self.buffers.lock().push(Arc::downgrade(&buffer));
        buffer
    }
}

impl Device for HeadlessDevice {
    fn create_buffer(&self, usage: BufferUsage, size: u64, label: &str) -> Arc<dyn DeviceBuffer> {
        self.register(usage, vec![0u8; size as usize], label)
    }

    fn create_buffer_init(&self, usage: BufferUsage, data: &[u8], label: &str) -> Arc<dyn DeviceBuffer> {
        self.register(usage, data.to_vec(), label)
    }

    fn copy_buffer(&self, src: &dyn DeviceBuffer, dst: &dyn DeviceBuffer) {
        let src = self.find(src.id()).expect("copy source is not a live buffer");
        let dst = self.find(dst.id()).expect("copy destination is not a live buffer");
        let src_bytes = src.data.lock();
        let mut dst_bytes = dst.data.lock();
        let len = src_bytes.len().min(dst_bytes.len());
        dst_bytes[..len].copy_from_slice(&src_bytes[..len]);
    }

    fn create_fence(&self) -> Arc<dyn Fence> {
        let fence = Arc::new(HeadlessFence {
            signaled: AtomicBool::new(false),
            forced_waits: Arc::clone(&self.forced_waits),
        });
        self.fences.lock().push(Arc::downgrade(&fence));
        fence
    }

    fn supports_sub_buffer_binding(&self) -> bool {
        self.sub_buffer_binding
    }
}
