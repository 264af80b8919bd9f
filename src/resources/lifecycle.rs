//! Intrusive reference counting with finalize-on-zero.
//!
//! Shared-ownership lifetimes in this crate fall into two camps. Plain
//! memory ownership rides on `Arc` and `Drop` like everywhere else in
//! Rust. Semantic lifetimes ("this palette slot may be reclaimed now")
//! are tracked by an explicit [`RefCount`] embedded in the shared object,
//! because several independent owners (the simulating instance, renderer
//! caches, pending render tasks) extend them concurrently and exactly one
//! release action must run when the last owner lets go.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// An intrusive reference count.
///
/// A count starts uninitialized at zero. [`increase`](Self::increase)
/// brings it to life; the [`decrease`](Self::decrease) that returns it to
/// zero finalizes it, and the caller runs the release action exactly
/// once, right then. Increasing a finalized count, or decreasing a count
/// that was never increased (or is already finalized), is a programmer
/// error and fails fast.
///
/// Pooled objects call [`reset`](Self::reset) to clear the finalized
/// state for reuse. The `ever_acquired` flag deliberately survives the
/// reset so per-object instrumentation registers once, not once per
/// recycle.
#[derive(Debug, Default)]
pub struct RefCount {
    count: AtomicU32,
    finalized: AtomicBool,
    ever_acquired: AtomicBool,
}

impl RefCount {
    /// Creates an uninitialized count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one reference.
    pub fn increase(&self) {
        assert!(
            !self.finalized.load(Ordering::Acquire),
            "increase on a finalized reference count"
        );
        self.count.fetch_add(1, Ordering::AcqRel);
        self.ever_acquired.store(true, Ordering::Release);
    }

    /// Drops one reference.
    ///
    /// Returns `true` exactly when this call took the count from one to
    /// zero; the caller must run the object's release action then.
    pub fn decrease(&self) -> bool {
        assert!(
            self.ever_acquired.load(Ordering::Acquire),
            "decrease on a reference count that was never increased"
        );
        assert!(
            !self.finalized.load(Ordering::Acquire),
            "decrease on a finalized reference count"
        );
        let previous = self.count.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "reference count underflow");
        if previous == 1 {
            self.finalized.store(true, Ordering::Release);
            return true;
        }
        false
    }

    /// Current number of live references.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// Whether the count has gone through its final transition to zero.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Whether the count was ever increased, across resets.
    #[must_use]
    pub fn ever_acquired(&self) -> bool {
        self.ever_acquired.load(Ordering::Acquire)
    }

    /// Clears the finalized state so a pooled object can live again.
    ///
    /// Only a finalized (or never-used) count may be reset; resetting a
    /// count with live references would strand its owners.
    pub fn reset(&self) {
        assert!(
            self.count.load(Ordering::Acquire) == 0,
            "reset on a reference count with live references"
        );
        self.finalized.store(false, Ordering::Release);
    }
}
