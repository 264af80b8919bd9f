//! Graphics-device seam and buffer machinery
//!
//! The host application owns the real device; this crate only needs the
//! narrow surface in [`device`]: buffer creation, write mapping,
//! device-side copies and completion fences. On top of it sit:
//! - SlottedBuffer: a growable buffer carved into fixed-size slots
//! - the draw-data pools: transient per-draw allocation with fenced
//!   rotation
//! - HeadlessDevice: an in-memory implementation for tests

pub mod device;
pub mod draw_pool;
pub mod headless;
pub mod slotted;

pub use device::{BufferUsage, Device, DeviceBuffer, DrawAllocation, Fence, MATRIX_BYTES, MORPH_WEIGHT_BYTES};
pub use draw_pool::{DrawDataPool, PooledDrawPool, SlicedDrawPool, draw_pool_for_device};
pub use headless::HeadlessDevice;
pub use slotted::SlottedBuffer;
