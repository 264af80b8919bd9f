use glam::Mat4;

use crate::resources::cow::CowBuffer;
use crate::resources::pool::PoolItem;
use crate::scene::camera::CameraPose;
use crate::scene::morph::MorphWeights;
use crate::scene::skin::SkinPalette;

/// An immutable render task captured from one instance.
///
/// Everything a renderer backend needs for one frame of one instance:
/// world matrices per drawable, the skin and morph buffer handles
/// (shared, so the simulation's next edit diverges instead of racing the
/// GPU), and the camera poses. Snapshots are pooled per instance and
/// recycled pipeline-depth frames after release.
#[derive(Default)]
pub struct RenderSnapshot {
    /// World matrix per drawable primitive, dense primitive order.
    pub primitive_world: Vec<Mat4>,
    /// Skin palette handle per skin, dense skin order.
    pub skins: Vec<CowBuffer<SkinPalette>>,
    /// Morph weight handle per morphable primitive, dense morph order.
    pub morphs: Vec<CowBuffer<MorphWeights>>,
    /// Camera pose per camera node, dense camera order.
    pub cameras: Vec<CameraPose>,
}

impl PoolItem for RenderSnapshot {
    fn on_release(&mut self) {
        // Dropping the handles releases the shared references; the
        // vectors keep their capacity for the next frame.
        self.primitive_world.clear();
        self.skins.clear();
        self.morphs.clear();
        self.cameras.clear();
    }
}
