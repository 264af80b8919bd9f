//! Mutable per-instance state over a shared topology.
//!
//! Spawning a model allocates one of these; it borrows the immutable
//! [`Topology`] through an `Arc` and owns everything that varies per
//! instance: transform overrides and their dirty bits, the computed
//! world matrices, the copy-on-write skin and morph buffers, and a
//! framed pool of render snapshots. All mutation is single-threaded per
//! instance; the snapshots it hands out are safe to read from anywhere.

use std::sync::Arc;

use glam::{Affine3A, Mat4};

use crate::config::RuntimeConfig;
use crate::resources::cow::CowBuffer;
use crate::resources::pool::FramedPool;
use crate::scene::camera::CameraPose;
use crate::scene::morph::MorphWeights;
use crate::scene::propagate::{self, PropagationStats};
use crate::scene::skin::SkinPalette;
use crate::scene::snapshot::RenderSnapshot;
use crate::scene::topology::Topology;
use crate::scene::transform::PoseTransform;

/// One spawned instance of a model.
pub struct ModelInstance {
    pub(crate) topology: Arc<Topology>,

    // === Per transform slot ===
    pub(crate) overrides: Vec<Option<PoseTransform>>,
    pub(crate) locals: Vec<Affine3A>,
    pub(crate) dirty: Vec<bool>,
    pub(crate) dirty_count: usize,
    pub(crate) world: Vec<Affine3A>,

    // === Per primitive / camera ===
    pub(crate) primitive_world: Vec<Affine3A>,
    pub(crate) cameras: Vec<CameraPose>,

    // === Per skin / morphable primitive ===
    pub(crate) skins: Vec<CowBuffer<SkinPalette>>,
    pub(crate) morphs: Vec<CowBuffer<MorphWeights>>,

    snapshots: FramedPool<RenderSnapshot>,
}

impl ModelInstance {
    /// Spawns an instance: identity-seeded arrays, one palette slot per
    /// skin and per morphable primitive.
    #[must_use]
    pub fn new(topology: Arc<Topology>, config: &RuntimeConfig) -> Self {
        let slot_count = topology.transform_slot_count() as usize;
        let locals = (0..slot_count)
            .map(|slot| topology.rest_pose(slot as u32).to_affine())
            .collect();

        let skins = topology
            .skins()
            .iter()
            .map(|skin| {
                let sheet = topology
                    .palettes()
                    .skin_sheet()
                    .expect("topology with skins has a skin sheet");
                CowBuffer::acquire(SkinPalette::allocate(Arc::clone(sheet), skin.joint_count()))
            })
            .collect();

        let morphs = topology
            .morph_layouts()
            .iter()
            .map(|layout| {
                let sheet = topology
                    .palettes()
                    .morph_sheet()
                    .expect("topology with morphs has a morph sheet");
                CowBuffer::acquire(MorphWeights::allocate(Arc::clone(sheet), Arc::clone(layout)))
            })
            .collect();

        Self {
            overrides: vec![None; slot_count],
            locals,
            // Every slot starts dirty so the first update computes the
            // rest pose instead of skipping as all-clean.
            dirty: vec![true; slot_count],
            dirty_count: slot_count,
            world: vec![Affine3A::IDENTITY; slot_count],
            primitive_world: vec![Affine3A::IDENTITY; topology.primitive_count() as usize],
            cameras: vec![CameraPose::IDENTITY; topology.camera_count() as usize],
            skins,
            morphs,
            snapshots: FramedPool::new(
                "RenderSnapshots",
                config.pipeline_depth.max(1),
                RenderSnapshot::default,
            ),
            topology,
        }
    }

    /// The shared topology this instance animates.
    #[must_use]
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    // ========================================================================
    // Transform overrides
    // ========================================================================

    /// Replaces the local transform of a slot and marks it dirty.
    pub fn set_transform_override(&mut self, slot: u32, pose: PoseTransform) {
        let index = slot as usize;
        self.overrides[index] = Some(pose);
        self.locals[index] = pose.to_affine();
        self.mark_dirty(index);
    }

    /// Restores a slot to its rest pose and marks it dirty.
    pub fn clear_transform_override(&mut self, slot: u32) {
        let index = slot as usize;
        self.overrides[index] = None;
        self.locals[index] = self.topology.rest_pose(slot).to_affine();
        self.mark_dirty(index);
    }

    /// The current override of a slot, if any.
    #[must_use]
    pub fn transform_override(&self, slot: u32) -> Option<&PoseTransform> {
        self.overrides[slot as usize].as_ref()
    }

    fn mark_dirty(&mut self, index: usize) {
        if !self.dirty[index] {
            self.dirty[index] = true;
            self.dirty_count += 1;
        }
    }

    /// Number of slots changed since the last propagation.
    #[must_use]
    pub fn dirty_slot_count(&self) -> usize {
        self.dirty_count
    }

    // ========================================================================
    // Morph weights
    // ========================================================================

    /// Sets one morph target's weight on a morphable primitive.
    pub fn set_morph_weight(&mut self, morph: u32, target: u32, weight: f32) {
        self.morphs[morph as usize].edit(|weights| weights.set_weight(target, weight));
    }

    /// Reads one morph target's CPU-side weight.
    #[must_use]
    pub fn morph_weight(&self, morph: u32, target: u32) -> f32 {
        self.morphs[morph as usize].read(|weights| weights.weight(target))
    }

    // ========================================================================
    // Per-frame update
    // ========================================================================

    /// Propagates dirty transforms through the tree, refreshing world
    /// matrices, skin palettes and camera poses. Skips entirely when no
    /// slot is dirty.
    pub fn update_transforms(&mut self) -> PropagationStats {
        propagate::update_pose(self)
    }

    /// Captures an immutable render task for the current state.
    ///
    /// Return it through [`release_snapshot`](Self::release_snapshot)
    /// once its draws are submitted.
    pub fn snapshot_for_render(&mut self) -> RenderSnapshot {
        let mut snapshot = self.snapshots.acquire();
        snapshot
            .primitive_world
            .extend(self.primitive_world.iter().map(|world| Mat4::from(*world)));
        snapshot.skins.extend(self.skins.iter().map(CowBuffer::share));
        snapshot.morphs.extend(self.morphs.iter().map(CowBuffer::share));
        snapshot.cameras.extend_from_slice(&self.cameras);
        snapshot
    }

    /// Returns a snapshot to the pool; it is recycled once its frame
    /// provably retired.
    pub fn release_snapshot(&mut self, snapshot: RenderSnapshot) {
        self.snapshots.release(snapshot);
    }

    /// Once-per-frame synchronization point for this instance's
    /// snapshot pool.
    pub fn rotate(&mut self) {
        self.snapshots.rotate();
    }

    // ========================================================================
    // Renderer access
    // ========================================================================

    /// The world matrix last computed for a transform slot.
    #[must_use]
    pub fn world_matrix(&self, slot: u32) -> &Affine3A {
        &self.world[slot as usize]
    }

    /// The world matrix last recorded for a drawable primitive.
    #[must_use]
    pub fn primitive_world(&self, primitive: u32) -> &Affine3A {
        &self.primitive_world[primitive as usize]
    }

    /// The camera pose last captured for a camera node.
    #[must_use]
    pub fn camera_pose(&self, camera: u32) -> &CameraPose {
        &self.cameras[camera as usize]
    }

    /// The live skin palette handle of a skin.
    #[must_use]
    pub fn skin_palette(&self, skin: u32) -> &CowBuffer<SkinPalette> {
        &self.skins[skin as usize]
    }

    /// The live morph weight handle of a morphable primitive.
    #[must_use]
    pub fn morph_weights(&self, morph: u32) -> &CowBuffer<MorphWeights> {
        &self.morphs[morph as usize]
    }
}
