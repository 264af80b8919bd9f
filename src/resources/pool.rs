//! Object pools, plain and frame-delayed.
//!
//! [`ObjectPool`] is a free list with lifecycle hooks. [`FramedPool`]
//! adds the delay that makes recycling safe for objects the GPU may
//! still be reading: a released object only becomes acquirable again
//! once [`rotate`](FramedPool::rotate) has been called pipeline-depth
//! times, i.e. once execution has provably advanced past the frame that
//! last touched it.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::diagnostics::ResourceTracker;

/// Lifecycle hooks for pooled objects.
pub trait PoolItem {
    /// Runs when the object leaves the pool.
    fn on_acquire(&mut self) {}

    /// Runs when the object is handed back. Must reset every mutable
    /// field the next owner could observe.
    fn on_release(&mut self);

    /// Runs once when the pool is closed, for objects holding external
    /// resources (GPU handles and the like).
    fn on_close(&mut self) {}
}

/// A free-list pool with a factory for cold misses.
pub struct ObjectPool<T: PoolItem> {
    label: String,
    free: Vec<T>,
    build: Box<dyn Fn() -> T + Send>,
    closed: bool,
    tracker: Option<Arc<ResourceTracker>>,
}

impl<T: PoolItem> ObjectPool<T> {
    /// Creates an empty pool.
    pub fn new(label: &str, build: impl Fn() -> T + Send + 'static) -> Self {
        Self {
            label: label.to_string(),
            free: Vec::new(),
            build: Box::new(build),
            closed: false,
            tracker: None,
        }
    }

    /// Attaches a diagnostics context.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<ResourceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Takes a free object or constructs a new one.
    pub fn acquire(&mut self) -> T {
        assert!(!self.closed, "acquire from closed pool `{}`", self.label);
        let mut item = match self.free.pop() {
            Some(item) => item,
            None => {
                if let Some(tracker) = &self.tracker {
                    tracker.on_pool_build();
                }
                (self.build)()
            }
        };
        if let Some(tracker) = &self.tracker {
            tracker.on_pool_acquire();
        }
        item.on_acquire();
        item
    }

    /// Returns an object to the free list, resetting it first.
    pub fn release(&mut self, item: T) {
        let item = self.run_release_hook(item);
        if self.closed {
            // Late release during teardown: close the straggler instead
            // of resurrecting the pool.
            let mut item = item;
            item.on_close();
            return;
        }
        self.free.push(item);
    }

    /// Runs the release hook and accounting without repooling.
    pub(crate) fn run_release_hook(&self, mut item: T) -> T {
        item.on_release();
        if let Some(tracker) = &self.tracker {
            tracker.on_pool_release();
        }
        item
    }

    /// Repools an already-reset object.
    pub(crate) fn repool(&mut self, item: T) {
        if self.closed {
            let mut item = item;
            item.on_close();
            return;
        }
        self.free.push(item);
    }

    /// Drains the pool, closing every free object. Acquiring afterwards
    /// fails fast.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        log::debug!("closing pool `{}` ({} free objects)", self.label, self.free.len());
        for mut item in self.free.drain(..) {
            item.on_close();
        }
        self.closed = true;
    }

    /// Number of objects currently on the free list.
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Whether the pool has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<T: PoolItem> Drop for ObjectPool<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// An [`ObjectPool`] whose releases are parked for pipeline-depth
/// rotations before reuse.
pub struct FramedPool<T: PoolItem> {
    pool: ObjectPool<T>,
    /// One bucket per in-flight frame; releases land in the back, the
    /// front retires on rotate.
    pending: VecDeque<Vec<T>>,
}

impl<T: PoolItem> FramedPool<T> {
    /// Creates a framed pool with the given reuse delay in frames.
    pub fn new(label: &str, depth: usize, build: impl Fn() -> T + Send + 'static) -> Self {
        assert!(depth > 0, "framed pool depth must be at least 1");
        let mut pending = VecDeque::with_capacity(depth);
        for _ in 0..depth {
            pending.push_back(Vec::new());
        }
        Self {
            pool: ObjectPool::new(label, build),
            pending,
        }
    }

    /// Attaches a diagnostics context.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<ResourceTracker>) -> Self {
        self.pool.tracker = Some(tracker);
        self
    }

    /// Takes a free object or constructs a new one. Parked objects are
    /// not candidates until their frame retires.
    pub fn acquire(&mut self) -> T {
        self.pool.acquire()
    }

    /// Resets the object and parks it until its frame is provably done.
    pub fn release(&mut self, item: T) {
        let item = self.pool.run_release_hook(item);
        self.pending
            .back_mut()
            .expect("framed pool has at least one bucket")
            .push(item);
    }

    /// Advances one frame: the oldest bucket's objects become reusable.
    ///
    /// Call exactly once per frame, after every release belonging to it.
    pub fn rotate(&mut self) {
        let retired = self
            .pending
            .pop_front()
            .expect("framed pool has at least one bucket");
        for item in retired {
            self.pool.repool(item);
        }
        self.pending.push_back(Vec::new());
    }

    /// Closes the underlying pool, draining parked objects too.
    pub fn close(&mut self) {
        for mut bucket in self.pending.drain(..) {
            for item in &mut bucket {
                item.on_close();
            }
        }
        self.pool.close();
    }

    /// The configured reuse delay in frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.pending.len().max(1)
    }

    /// Number of immediately acquirable objects.
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.pool.free_len()
    }

    /// Number of parked objects still waiting out their frames.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.iter().map(Vec::len).sum()
    }
}

impl<T: PoolItem> Drop for FramedPool<T> {
    fn drop(&mut self) {
        self.close();
    }
}
