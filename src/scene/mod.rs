//! Scene data model and per-frame update
//!
//! The shared/immutable versus owned/mutable split at the heart of the
//! crate:
//! - Topology: the frozen node tree, skins, morph layouts and dense
//!   slot counts, built once by a loader
//! - ModelInstance: everything a spawned instance varies per frame
//! - propagation: the traversal carrying dirty transforms into world
//!   matrices, skin palettes and camera poses
//! - PaletteArena: the shared slotted GPU buffers instance state lives in

pub mod camera;
pub mod instance;
pub mod morph;
pub mod palette;
pub mod propagate;
pub mod skin;
pub mod snapshot;
pub mod topology;
pub mod transform;

pub use camera::CameraPose;
pub use instance::ModelInstance;
pub use morph::{ActiveTargetList, MAX_ACTIVE_TARGETS, MorphChannelKind, MorphLayout, MorphWeights};
pub use palette::{PaletteArena, PaletteSheet};
pub use propagate::PropagationStats;
pub use skin::{Skin, SkinPalette};
pub use snapshot::RenderSnapshot;
pub use topology::{
    IkAxisLimit, IkChain, IkLink, InfluenceBinding, InfluenceSource, Node, NodeKind, Topology,
    TopologyBuilder,
};
pub use transform::PoseTransform;
