#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod gpu;
pub mod resources;
pub mod scene;

pub use config::RuntimeConfig;
pub use diagnostics::ResourceTracker;
pub use errors::RigError;
pub use gpu::{BufferUsage, Device, DeviceBuffer, DrawAllocation, DrawDataPool, Fence, HeadlessDevice, SlottedBuffer};
pub use resources::{CowBuffer, CowContent, FramedPool, ObjectPool, PoolItem, RefCount};
pub use scene::{
    CameraPose, ModelInstance, PoseTransform, PropagationStats, RenderSnapshot, Topology,
    TopologyBuilder,
};
