//! Transform propagation tests
//!
//! Tests for:
//! - dirty-subtree-only recomputation and the all-clean fast path
//! - world matrix composition along chains
//! - joint palette writes with and without inverse-bind matrices
//! - influence nodes (absolute, relative-to-rest, weighted, flagged)
//! - camera pose snapshots
//! - copy-on-write divergence between simulation and render snapshots

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use marionette::config::RuntimeConfig;
use marionette::gpu::device::Device;
use marionette::gpu::headless::HeadlessDevice;
use marionette::scene::instance::ModelInstance;
use marionette::scene::topology::{
    InfluenceBinding, InfluenceSource, Topology, TopologyBuilder,
};
use marionette::scene::transform::PoseTransform;
use smallvec::smallvec;

// ============================================================================
// Helpers
// ============================================================================

const EPSILON: f32 = 1e-5;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
}

fn device() -> Arc<dyn Device> {
    HeadlessDevice::new()
}

struct SkinnedRig {
    topology: Arc<Topology>,
    slot_a: u32,
    slot_b: u32,
}

/// root(Group) → A(Transform) → { joint0, camera, B(Transform) → { joint1, primitive } }
fn skinned_rig(inverse_bind: Option<Vec<Mat4>>) -> SkinnedRig {
    let mut builder = TopologyBuilder::new();
    let root = builder.group(None).unwrap();
    let skin = builder.add_skin(2, inverse_bind).unwrap();
    let (node_a, slot_a) = builder.transform(Some(root), PoseTransform::IDENTITY).unwrap();
    builder.joint(Some(node_a), skin, 0).unwrap();
    builder.camera(Some(node_a)).unwrap();
    let (node_b, slot_b) = builder.transform(Some(node_a), PoseTransform::IDENTITY).unwrap();
    builder.joint(Some(node_b), skin, 1).unwrap();
    builder.primitive(Some(node_b)).unwrap();
    let topology = builder.finish(&device(), &RuntimeConfig::default()).unwrap();
    SkinnedRig {
        topology,
        slot_a,
        slot_b,
    }
}

fn spawn(rig: &SkinnedRig) -> ModelInstance {
    ModelInstance::new(Arc::clone(&rig.topology), &RuntimeConfig::default())
}

// ============================================================================
// Dirty tracking and the fast path
// ============================================================================

#[test]
fn first_update_computes_everything() {
    let rig = skinned_rig(None);
    let mut instance = spawn(&rig);

    assert_eq!(instance.dirty_slot_count(), 2);
    let stats = instance.update_transforms();
    assert!(!stats.skipped);
    assert_eq!(stats.transforms_recomputed, 2);
    assert_eq!(stats.joints_recomputed, 2);
    assert_eq!(stats.cameras_updated, 1);
    assert_eq!(instance.dirty_slot_count(), 0);
}

#[test]
fn clean_instance_takes_the_fast_path() {
    let rig = skinned_rig(None);
    let mut instance = spawn(&rig);
    instance.update_transforms();

    let stats = instance.update_transforms();
    assert!(stats.skipped);
    assert_eq!(stats.nodes_visited, 0);
    assert_eq!(stats.transforms_recomputed, 0);
    assert_eq!(stats.joints_recomputed, 0);
}

#[test]
fn dirty_leaf_recomputes_only_its_subtree() {
    let rig = skinned_rig(None);
    let mut instance = spawn(&rig);
    instance.update_transforms();

    // Only B dirty: its joint recomputes, A's joint and camera do not.
    instance.set_transform_override(
        rig.slot_b,
        PoseTransform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
    );
    let stats = instance.update_transforms();
    assert!(!stats.skipped);
    assert_eq!(stats.transforms_recomputed, 1);
    assert_eq!(stats.joints_recomputed, 1);
    assert_eq!(stats.cameras_updated, 0);
}

#[test]
fn dirty_root_slot_recomputes_descendants() {
    let rig = skinned_rig(None);
    let mut instance = spawn(&rig);
    instance.update_transforms();

    instance.set_transform_override(
        rig.slot_a,
        PoseTransform::from_translation(Vec3::new(1.0, 0.0, 0.0)),
    );
    let stats = instance.update_transforms();
    assert_eq!(stats.transforms_recomputed, 2);
    assert_eq!(stats.joints_recomputed, 2);
    assert_eq!(stats.cameras_updated, 1);
}

// ============================================================================
// World matrices and skinning
// ============================================================================

#[test]
fn world_matrices_compose_down_the_chain() {
    let rig = skinned_rig(None);
    let mut instance = spawn(&rig);

    instance.set_transform_override(
        rig.slot_a,
        PoseTransform::from_translation(Vec3::new(1.0, 0.0, 0.0)),
    );
    instance.set_transform_override(
        rig.slot_b,
        PoseTransform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
    );
    instance.update_transforms();

    assert!(vec3_approx(
        instance.world_matrix(rig.slot_a).translation.into(),
        Vec3::new(1.0, 0.0, 0.0)
    ));
    assert!(vec3_approx(
        instance.world_matrix(rig.slot_b).translation.into(),
        Vec3::new(1.0, 1.0, 0.0)
    ));
    // The primitive under B is placed at B's world transform.
    assert!(vec3_approx(
        instance.primitive_world(0).translation.into(),
        Vec3::new(1.0, 1.0, 0.0)
    ));
}

#[test]
fn joint_matrices_are_world_times_inverse_bind() {
    let inverse_bind = vec![
        Mat4::IDENTITY,
        Mat4::from_translation(Vec3::new(-1.0, -1.0, 0.0)),
    ];
    let rig = skinned_rig(Some(inverse_bind));
    let mut instance = spawn(&rig);

    instance.set_transform_override(
        rig.slot_a,
        PoseTransform::from_translation(Vec3::new(1.0, 0.0, 0.0)),
    );
    instance.set_transform_override(
        rig.slot_b,
        PoseTransform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
    );
    instance.update_transforms();

    instance.skin_palette(0).read(|palette| {
        // joint0 under A: identity bind, so the palette carries A's
        // world matrix.
        let j0 = palette.joints()[0].w_axis.truncate();
        assert!(vec3_approx(j0, Vec3::new(1.0, 0.0, 0.0)));
        // joint1 under B: the bind cancels B's world translation.
        let j1 = palette.joints()[1].w_axis.truncate();
        assert!(vec3_approx(j1, Vec3::ZERO));
    });
}

#[test]
fn stale_joint_keeps_its_previous_matrix() {
    let rig = skinned_rig(None);
    let mut instance = spawn(&rig);

    instance.set_transform_override(
        rig.slot_a,
        PoseTransform::from_translation(Vec3::new(2.0, 0.0, 0.0)),
    );
    instance.update_transforms();
    let j0_before = instance.skin_palette(0).read(|p| p.joints()[0]);

    // A clean, only B moves: joint0's bytes stay untouched.
    instance.set_transform_override(
        rig.slot_b,
        PoseTransform::from_translation(Vec3::new(0.0, 3.0, 0.0)),
    );
    instance.update_transforms();
    let j0_after = instance.skin_palette(0).read(|p| p.joints()[0]);
    assert_eq!(j0_before, j0_after);

    let j1 = instance.skin_palette(0).read(|p| p.joints()[1]).w_axis.truncate();
    assert!(vec3_approx(j1, Vec3::new(2.0, 3.0, 0.0)));
}

// ============================================================================
// Cameras
// ============================================================================

#[test]
fn camera_pose_tracks_its_ancestors() {
    let rig = skinned_rig(None);
    let mut instance = spawn(&rig);

    instance.set_transform_override(
        rig.slot_a,
        PoseTransform::from_translation(Vec3::new(0.0, 5.0, 10.0)),
    );
    instance.update_transforms();

    let pose = instance.camera_pose(0);
    assert!(vec3_approx(pose.translation, Vec3::new(0.0, 5.0, 10.0)));
    assert!(approx_eq(pose.angle, 0.0));
}

#[test]
fn camera_rotation_is_normalized_under_scaled_ancestors() {
    let mut builder = TopologyBuilder::new();
    let root = builder.group(None).unwrap();
    let rest = PoseTransform {
        translation: Vec3::new(3.0, 0.0, 0.0),
        rotation: Quat::from_rotation_y(FRAC_PI_2),
        scale: Vec3::splat(2.0),
    };
    let (node, _) = builder.transform(Some(root), rest).unwrap();
    let (_, camera) = builder.camera(Some(node)).unwrap();
    let topology = builder.finish(&device(), &RuntimeConfig::default()).unwrap();

    let mut instance = ModelInstance::new(topology, &RuntimeConfig::default());
    instance.update_transforms();

    let pose = instance.camera_pose(camera);
    assert!(approx_eq(pose.rotation.length(), 1.0));
    assert!(approx_eq(pose.angle, FRAC_PI_2));
    assert!(vec3_approx(pose.axis, Vec3::Y));
    assert!(vec3_approx(pose.translation, Vec3::new(3.0, 0.0, 0.0)));
}

// ============================================================================
// Influence nodes
// ============================================================================

struct InfluenceRig {
    topology: Arc<Topology>,
    source_slot: u32,
    other_slot: u32,
}

/// root → { S(Transform), T(Transform), influence(S) → primitive }
fn influence_rig(rest: PoseTransform, source: InfluenceSource) -> InfluenceRig {
    let mut builder = TopologyBuilder::new();
    let root = builder.group(None).unwrap();
    let (_, source_slot) = builder.transform(Some(root), rest).unwrap();
    let (_, other_slot) = builder.transform(Some(root), PoseTransform::IDENTITY).unwrap();
    let influence = builder
        .influence(
            Some(root),
            InfluenceBinding {
                sources: smallvec![source],
                affect_rotation: true,
                affect_translation: true,
            },
        )
        .unwrap();
    builder.primitive(Some(influence)).unwrap();
    let topology = builder.finish(&device(), &RuntimeConfig::default()).unwrap();
    InfluenceRig {
        topology,
        source_slot,
        other_slot,
    }
}

#[test]
fn influence_applies_its_source_transform() {
    let rig = influence_rig(
        PoseTransform::IDENTITY,
        InfluenceSource {
            slot: 0,
            weight: 1.0,
            relative_to_rest: false,
        },
    );
    let mut instance = ModelInstance::new(rig.topology, &RuntimeConfig::default());
    instance.set_transform_override(
        rig.source_slot,
        PoseTransform::from_translation(Vec3::new(2.0, 0.0, 0.0)),
    );
    instance.update_transforms();

    assert!(vec3_approx(
        instance.primitive_world(0).translation.into(),
        Vec3::new(2.0, 0.0, 0.0)
    ));
}

#[test]
fn influence_subtree_refreshes_even_when_only_others_are_dirty() {
    let rig = influence_rig(
        PoseTransform::IDENTITY,
        InfluenceSource {
            slot: 0,
            weight: 1.0,
            relative_to_rest: false,
        },
    );
    let mut instance = ModelInstance::new(rig.topology, &RuntimeConfig::default());
    instance.set_transform_override(
        rig.source_slot,
        PoseTransform::from_translation(Vec3::new(2.0, 0.0, 0.0)),
    );
    instance.update_transforms();

    // Change the source, then dirty an unrelated slot in a later frame:
    // the influence subtree still picks up the source's current value.
    instance.set_transform_override(
        rig.source_slot,
        PoseTransform::from_translation(Vec3::new(5.0, 0.0, 0.0)),
    );
    instance.update_transforms();
    instance.set_transform_override(
        rig.other_slot,
        PoseTransform::from_translation(Vec3::new(0.0, 9.0, 0.0)),
    );
    instance.update_transforms();

    assert!(vec3_approx(
        instance.primitive_world(0).translation.into(),
        Vec3::new(5.0, 0.0, 0.0)
    ));
}

#[test]
fn influence_weight_scales_the_contribution() {
    let rig = influence_rig(
        PoseTransform::IDENTITY,
        InfluenceSource {
            slot: 0,
            weight: 0.5,
            relative_to_rest: false,
        },
    );
    let mut instance = ModelInstance::new(rig.topology, &RuntimeConfig::default());
    instance.set_transform_override(
        rig.source_slot,
        PoseTransform {
            translation: Vec3::new(4.0, 0.0, 0.0),
            rotation: Quat::from_rotation_y(FRAC_PI_2),
            scale: Vec3::ONE,
        },
    );
    instance.update_transforms();

    let world = instance.primitive_world(0);
    assert!(vec3_approx(world.translation.into(), Vec3::new(2.0, 0.0, 0.0)));
    // Half the source rotation: X rotates 45 degrees around Y.
    let rotated = world.transform_vector3(Vec3::X);
    let half = (2.0_f32).sqrt() / 2.0;
    assert!(vec3_approx(rotated, Vec3::new(half, 0.0, -half)));
}

#[test]
fn influence_relative_mode_uses_the_delta_from_rest() {
    let rig = influence_rig(
        PoseTransform::from_translation(Vec3::new(1.0, 0.0, 0.0)),
        InfluenceSource {
            slot: 0,
            weight: 1.0,
            relative_to_rest: true,
        },
    );
    let mut instance = ModelInstance::new(rig.topology, &RuntimeConfig::default());
    instance.set_transform_override(
        rig.source_slot,
        PoseTransform::from_translation(Vec3::new(3.0, 0.0, 0.0)),
    );
    instance.update_transforms();

    // Delta from rest is (2, 0, 0).
    assert!(vec3_approx(
        instance.primitive_world(0).translation.into(),
        Vec3::new(2.0, 0.0, 0.0)
    ));
}

// ============================================================================
// Snapshots and copy-on-write divergence
// ============================================================================

#[test]
fn snapshot_preserves_bytes_across_simulation_edits() {
    let rig = skinned_rig(None);
    let mut instance = ModelInstance::new(Arc::clone(&rig.topology), &RuntimeConfig::default());

    instance.set_transform_override(
        rig.slot_b,
        PoseTransform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
    );
    instance.update_transforms();

    let sheet = rig.topology.palettes().skin_sheet().unwrap();
    assert_eq!(sheet.allocated_count(), 1);

    let snapshot = instance.snapshot_for_render();
    assert_eq!(instance.skin_palette(0).ref_count(), 2);
    let frozen_j1 = snapshot.skins[0].read(|p| p.joints()[1]);

    // Next simulation tick: the edit diverges to a private slot.
    instance.set_transform_override(
        rig.slot_b,
        PoseTransform::from_translation(Vec3::new(0.0, 7.0, 0.0)),
    );
    instance.update_transforms();

    assert_eq!(instance.skin_palette(0).ref_count(), 1);
    assert_eq!(snapshot.skins[0].ref_count(), 1);
    assert_eq!(sheet.allocated_count(), 2);

    // The render task's view is byte-stable.
    assert_eq!(snapshot.skins[0].read(|p| p.joints()[1]), frozen_j1);
    let live_j1 = instance.skin_palette(0).read(|p| p.joints()[1]);
    assert!(vec3_approx(live_j1.w_axis.truncate(), Vec3::new(0.0, 7.0, 0.0)));

    // Releasing the snapshot retires the old slot; the free lands after
    // pipeline-depth palette rotations.
    instance.release_snapshot(snapshot);
    assert_eq!(sheet.allocated_count(), 2);
    for _ in 0..RuntimeConfig::default().pipeline_depth {
        rig.topology.palettes().rotate();
    }
    assert_eq!(sheet.allocated_count(), 1);
}

#[test]
fn snapshot_carries_primitive_and_camera_state() {
    let rig = skinned_rig(None);
    let mut instance = spawn(&rig);
    instance.set_transform_override(
        rig.slot_a,
        PoseTransform::from_translation(Vec3::new(0.0, 2.0, 0.0)),
    );
    instance.update_transforms();

    let snapshot = instance.snapshot_for_render();
    assert_eq!(snapshot.primitive_world.len(), 1);
    assert_eq!(snapshot.cameras.len(), 1);
    let translation = snapshot.primitive_world[0].w_axis.truncate();
    assert!(vec3_approx(translation, Vec3::new(0.0, 2.0, 0.0)));
    assert!(vec3_approx(snapshot.cameras[0].translation, Vec3::new(0.0, 2.0, 0.0)));
    instance.release_snapshot(snapshot);
}

#[test]
fn dropping_an_instance_retires_its_palette_slots() {
    let rig = skinned_rig(None);
    let instance = ModelInstance::new(Arc::clone(&rig.topology), &RuntimeConfig::default());
    let sheet = Arc::clone(rig.topology.palettes().skin_sheet().unwrap());
    assert_eq!(sheet.allocated_count(), 1);

    drop(instance);
    for _ in 0..RuntimeConfig::default().pipeline_depth {
        rig.topology.palettes().rotate();
    }
    assert_eq!(sheet.allocated_count(), 0);
}
