use std::sync::Arc;

use glam::Mat4;

use crate::gpu::device::MATRIX_BYTES;
use crate::resources::cow::CowContent;
use crate::scene::palette::PaletteSheet;

/// A bone chain: joint node references plus inverse-bind matrices.
///
/// Static data, fixed at load time. The inverse-bind matrix carries a
/// vertex from mesh space into the joint's local space; when the source
/// model omits them the joints bind at identity.
#[derive(Debug, Clone)]
pub struct Skin {
    /// Node arena index bound to each joint, in joint order. `None` for
    /// joints the node tree never binds.
    joint_nodes: Vec<Option<u32>>,
    inverse_bind: Vec<Mat4>,
    joint_count: u32,
}

impl Skin {
    pub(crate) fn new(
        joint_count: u32,
        joint_nodes: Vec<Option<u32>>,
        inverse_bind: Option<Vec<Mat4>>,
    ) -> Self {
        let inverse_bind =
            inverse_bind.unwrap_or_else(|| vec![Mat4::IDENTITY; joint_count as usize]);
        Self {
            joint_nodes,
            inverse_bind,
            joint_count,
        }
    }

    /// Number of joints in the chain.
    #[must_use]
    pub fn joint_count(&self) -> u32 {
        self.joint_count
    }

    /// The node bound to a joint, if any.
    #[must_use]
    pub fn joint_node(&self, joint: u32) -> Option<u32> {
        self.joint_nodes[joint as usize]
    }

    /// The joint's inverse-bind matrix.
    #[inline]
    #[must_use]
    pub fn inverse_bind(&self, joint: u32) -> Mat4 {
        self.inverse_bind[joint as usize]
    }
}

/// One instance's skinning matrices for one skin, living in a slot of
/// the topology's shared skin sheet.
///
/// The CPU-side matrix list shadows the slot byte for byte, so taking a
/// private copy under copy-on-write is one slot allocation plus one
/// upload.
pub struct SkinPalette {
    sheet: Arc<PaletteSheet>,
    slot: u32,
    joints: Vec<Mat4>,
}

impl SkinPalette {
    /// Allocates a palette slot seeded with identity matrices.
    pub(crate) fn allocate(sheet: Arc<PaletteSheet>, joint_count: u32) -> Self {
        let slot = sheet.allocate();
        let palette = Self {
            sheet,
            slot,
            joints: vec![Mat4::IDENTITY; joint_count as usize],
        };
        palette.upload_all();
        palette
    }

    fn upload_all(&self) {
        self.sheet
            .write(self.slot, 0, bytemuck::cast_slice(&self.joints));
    }

    /// Writes one joint's skinning matrix, CPU shadow and GPU slot both.
    pub fn set_joint(&mut self, joint: u32, matrix: Mat4) {
        self.joints[joint as usize] = matrix;
        self.sheet.write(
            self.slot,
            u64::from(joint) * MATRIX_BYTES,
            bytemuck::bytes_of(&matrix),
        );
    }

    /// The current skinning matrices.
    #[must_use]
    pub fn joints(&self) -> &[Mat4] {
        &self.joints
    }

    /// This palette's slot index in the skin sheet.
    #[must_use]
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Byte offset of this palette inside the sheet's buffer.
    #[must_use]
    pub fn byte_offset(&self) -> u64 {
        u64::from(self.slot) * self.sheet.slot_size()
    }

    /// Physical id of the sheet's current buffer.
    #[must_use]
    pub fn buffer_id(&self) -> u64 {
        self.sheet.buffer_id()
    }
}

impl CowContent for SkinPalette {
    fn duplicate(&self) -> Self {
        let copy = Self {
            sheet: Arc::clone(&self.sheet),
            slot: self.sheet.allocate(),
            joints: self.joints.clone(),
        };
        copy.upload_all();
        copy
    }

    fn release(&mut self) {
        // The GPU may still read this slot for frames already in
        // flight; the sheet delays the actual free accordingly.
        self.sheet.retire(self.slot);
    }
}
