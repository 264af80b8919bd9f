//! Copy-on-write buffers.
//!
//! A [`CowBuffer`] hands the simulation O(1) snapshots: a render task
//! shares the handle for the price of a reference-count bump, and the
//! next simulation edit quietly moves to a private copy, leaving the
//! shared content byte-stable for the frames still reading it.

use std::mem;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::diagnostics::ResourceTracker;
use crate::resources::lifecycle::RefCount;

/// Content a [`CowBuffer`] can manage.
pub trait CowContent: Send + Sync {
    /// Produces an independent copy for a diverging edit.
    #[must_use]
    fn duplicate(&self) -> Self;

    /// Release action, run exactly once when the last handle drops.
    fn release(&mut self);
}

struct CowCell<T: CowContent> {
    refs: RefCount,
    value: RwLock<T>,
}

impl<T: CowContent> CowCell<T> {
    fn acquire(value: T) -> Arc<Self> {
        let cell = Arc::new(Self {
            refs: RefCount::new(),
            value: RwLock::new(value),
        });
        cell.refs.increase();
        cell
    }
}

/// A handle to shared, lazily-copied content.
///
/// Cloning shares the content (one more reference); dropping releases
/// it, and the drop that takes the count to zero runs
/// [`CowContent::release`]. [`edit`](Self::edit) mutates in place while
/// this handle is the only owner and silently diverges to a private copy
/// otherwise.
pub struct CowBuffer<T: CowContent> {
    cell: Arc<CowCell<T>>,
    tracker: Option<Arc<ResourceTracker>>,
}

impl<T: CowContent> CowBuffer<T> {
    /// Wraps fresh content, holding the first reference.
    #[must_use]
    pub fn acquire(value: T) -> Self {
        Self {
            cell: CowCell::acquire(value),
            tracker: None,
        }
    }

    /// Attaches a diagnostics context; divergent copies are counted.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<ResourceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Shares the content under one more reference.
    #[must_use]
    pub fn share(&self) -> Self {
        self.cell.refs.increase();
        Self {
            cell: Arc::clone(&self.cell),
            tracker: self.tracker.clone(),
        }
    }

    /// Number of live handles on this content.
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.cell.refs.count()
    }

    /// Reads the content.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.value.read())
    }

    /// Mutates the content.
    ///
    /// With a single live handle the content is edited in place. While
    /// shared, the edit lands on a private duplicate and this handle is
    /// repointed at it; every other holder keeps observing the original
    /// bytes and still releases its own reference as usual.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        if self.cell.refs.count() > 1 {
            let copy = self.cell.value.read().duplicate();
            if let Some(tracker) = &self.tracker {
                tracker.on_cow_copy();
            }
            let fresh = CowCell::acquire(copy);
            let shared = mem::replace(&mut self.cell, fresh);
            if shared.refs.decrease() {
                // The other holders vanished between the count check and
                // here; run their release so the content is not leaked.
                shared.value.write().release();
            }
        }
        f(&mut self.cell.value.write())
    }
}

impl<T: CowContent> Clone for CowBuffer<T> {
    fn clone(&self) -> Self {
        self.share()
    }
}

impl<T: CowContent> Drop for CowBuffer<T> {
    fn drop(&mut self) {
        if self.cell.refs.decrease() {
            self.cell.value.write().release();
        }
    }
}
