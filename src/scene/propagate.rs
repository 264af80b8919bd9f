//! Per-frame transform propagation.
//!
//! One recursive pass over the node tree with an accumulated matrix and
//! an `update` flag. A dirty transform slot switches `update` on for the
//! rest of its subtree regardless of what its ancestors did; world
//! matrices, joint skinning matrices, camera poses and primitive
//! placements recompute only under that flag. When nothing is dirty the
//! pass is skipped outright.

use std::sync::Arc;

use glam::{Affine3A, Mat4, Quat, Vec3};

use crate::scene::camera::CameraPose;
use crate::scene::instance::ModelInstance;
use crate::scene::topology::{InfluenceBinding, NodeKind, Topology};

/// What one propagation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationStats {
    /// The all-clean fast path fired; nothing was visited.
    pub skipped: bool,
    /// Nodes the traversal touched.
    pub nodes_visited: u32,
    /// World matrices recomputed for transform slots.
    pub transforms_recomputed: u32,
    /// Joint skinning matrices rewritten.
    pub joints_recomputed: u32,
    /// Camera poses refreshed.
    pub cameras_updated: u32,
}

/// Runs propagation for one instance.
pub(crate) fn update_pose(instance: &mut ModelInstance) -> PropagationStats {
    if instance.dirty_count == 0 {
        return PropagationStats {
            skipped: true,
            ..PropagationStats::default()
        };
    }
    let topology = Arc::clone(&instance.topology);
    let mut stats = PropagationStats::default();
    for &root in topology.roots() {
        walk(&topology, instance, root, Affine3A::IDENTITY, false, &mut stats);
    }
    stats
}

fn walk(
    topology: &Topology,
    instance: &mut ModelInstance,
    node_index: u32,
    accumulated: Affine3A,
    update: bool,
    stats: &mut PropagationStats,
) {
    stats.nodes_visited += 1;
    let node = topology.node(node_index);
    let mut accumulated = accumulated;
    let mut update = update;

    match node.kind() {
        NodeKind::Group => {}
        NodeKind::Transform { slot } => {
            let index = *slot as usize;
            if instance.dirty[index] {
                instance.dirty[index] = false;
                instance.dirty_count -= 1;
                // A changed slot invalidates its whole subtree, no
                // matter how clean the ancestors were.
                update = true;
            }
            accumulated = accumulated * instance.locals[index];
            if update {
                instance.world[index] = accumulated;
                stats.transforms_recomputed += 1;
            }
        }
        NodeKind::Joint { skin, joint } => {
            if update {
                let inverse_bind = topology.skin(*skin).inverse_bind(*joint);
                let matrix = Mat4::from(accumulated) * inverse_bind;
                let joint = *joint;
                instance.skins[*skin as usize].edit(|palette| palette.set_joint(joint, matrix));
                stats.joints_recomputed += 1;
            }
        }
        NodeKind::Influence(binding) => {
            accumulated = accumulated * influence_matrix(topology, instance, binding);
            // The sources' dirtiness is not observable from here, so
            // the subtree always recomputes.
            update = true;
        }
        NodeKind::Camera { camera } => {
            if update {
                instance.cameras[*camera as usize] = CameraPose::from_world(&accumulated);
                stats.cameras_updated += 1;
            }
        }
        NodeKind::Primitive { primitive } => {
            if update {
                instance.primitive_world[*primitive as usize] = accumulated;
            }
        }
    }

    for i in 0..node.children().len() {
        let child = node.children()[i];
        walk(topology, instance, child, accumulated, update, stats);
    }
}

/// Blends the influence's sources into one applied transform.
fn influence_matrix(
    topology: &Topology,
    instance: &ModelInstance,
    binding: &InfluenceBinding,
) -> Affine3A {
    let mut rotation = Quat::IDENTITY;
    let mut translation = Vec3::ZERO;
    for source in &binding.sources {
        let rest = topology.rest_pose(source.slot);
        let pose = instance.overrides[source.slot as usize]
            .as_ref()
            .unwrap_or(rest);
        let (source_rotation, source_translation) = if source.relative_to_rest {
            (
                rest.rotation.inverse() * pose.rotation,
                pose.translation - rest.translation,
            )
        } else {
            (pose.rotation, pose.translation)
        };
        rotation = (rotation * Quat::IDENTITY.slerp(source_rotation, source.weight)).normalize();
        translation += source_translation * source.weight;
    }
    if !binding.affect_rotation {
        rotation = Quat::IDENTITY;
    }
    if !binding.affect_translation {
        translation = Vec3::ZERO;
    }
    Affine3A::from_rotation_translation(rotation, translation)
}
