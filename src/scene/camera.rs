use glam::{Affine3A, Quat, Vec3};

/// A per-instance snapshot of a camera node's accumulated transform.
///
/// Written by transform propagation whenever the camera's subtree
/// updates; the embedding renderer reads it to place its view. Scale is
/// dropped and the rotation re-normalized so the orientation stays a
/// unit quaternion even under scaled ancestors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// World-space position of the camera node.
    pub translation: Vec3,
    /// Normalized world-space orientation.
    pub rotation: Quat,
    /// Rotation axis of the axis-angle form.
    pub axis: Vec3,
    /// Rotation angle of the axis-angle form, in radians.
    pub angle: f32,
}

impl CameraPose {
    /// The pose of an untransformed camera.
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        axis: Vec3::X,
        angle: 0.0,
    };

    /// Decomposes an accumulated world matrix into a camera pose.
    #[must_use]
    pub fn from_world(world: &Affine3A) -> Self {
        let (_, rotation, translation) = world.to_scale_rotation_translation();
        let rotation = rotation.normalize();
        let (axis, angle) = rotation.to_axis_angle();
        Self {
            translation,
            rotation,
            axis,
            angle,
        }
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::IDENTITY
    }
}
