//! Ownership and recycling primitives
//!
//! The building blocks the per-frame layer is assembled from:
//! - RefCount: intrusive reference count with finalize-on-zero
//! - ObjectPool / FramedPool: instance recycling, optionally delayed by
//!   the frame-pipeline depth for GPU-visible objects
//! - CowBuffer: reference-counted content with lazy private copies

pub mod cow;
pub mod lifecycle;
pub mod pool;

pub use cow::{CowBuffer, CowContent};
pub use lifecycle::RefCount;
pub use pool::{FramedPool, ObjectPool, PoolItem};
