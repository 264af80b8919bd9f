use glam::{Affine3A, Quat, Vec3};

/// A local transform as translation, rotation and scale.
///
/// Topologies carry one per transform slot as the rest pose; instances
/// override individual slots with their own values. Kept decomposed
/// rather than as a matrix so influence nodes can blend rotation and
/// translation separately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl PoseTransform {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// A pure translation.
    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// A pure rotation.
    #[must_use]
    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// The equivalent affine matrix.
    #[inline]
    #[must_use]
    pub fn to_affine(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for PoseTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
