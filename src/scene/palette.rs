//! Shared slotted buffers backing per-instance skin and morph state.
//!
//! Every instance of a topology parks its skinning matrices and morph
//! active-lists in slots of two buffers shared topology-wide. A sheet
//! wraps one such buffer with the frame-delay that makes slot recycling
//! safe: a retired slot only rejoins the free list after pipeline-depth
//! rotations, when no in-flight frame can still be reading it.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::RuntimeConfig;
use crate::diagnostics::ResourceTracker;
use crate::gpu::device::{BufferUsage, Device, DeviceBuffer, MATRIX_BYTES};
use crate::gpu::slotted::SlottedBuffer;
use crate::scene::morph::MORPH_SLOT_BYTES;

/// A shared slotted buffer plus its frame-delayed free queue.
pub struct PaletteSheet {
    slots: Mutex<SlottedBuffer>,
    /// Retired slots by age; the front bucket frees on rotate.
    deferred: Mutex<VecDeque<Vec<u32>>>,
}

impl PaletteSheet {
    pub(crate) fn new(
        device: &Arc<dyn Device>,
        usage: BufferUsage,
        slot_size: u64,
        config: &RuntimeConfig,
        label: &str,
        tracker: Option<&Arc<ResourceTracker>>,
    ) -> Arc<Self> {
        let mut slots = SlottedBuffer::new(
            Arc::clone(device),
            usage,
            slot_size,
            config.initial_slot_capacity,
            label,
        );
        if let Some(tracker) = tracker {
            slots = slots.with_tracker(Arc::clone(tracker));
        }
        let mut deferred = VecDeque::with_capacity(config.pipeline_depth);
        for _ in 0..config.pipeline_depth.max(1) {
            deferred.push_back(Vec::new());
        }
        Arc::new(Self {
            slots: Mutex::new(slots),
            deferred: Mutex::new(deferred),
        })
    }

    /// Hands out a slot.
    pub fn allocate(&self) -> u32 {
        self.slots.lock().allocate_slot()
    }

    /// Queues a slot for freeing once in-flight frames are done with it.
    pub fn retire(&self, slot: u32) {
        self.deferred
            .lock()
            .back_mut()
            .expect("sheet has at least one deferral bucket")
            .push(slot);
    }

    /// Writes bytes into a slot.
    pub fn write(&self, slot: u32, offset: u64, data: &[u8]) {
        self.slots.lock().write_slot(slot, offset, data);
    }

    /// Closes the write mapping ahead of command submission.
    pub fn finish_writes(&self) {
        self.slots.lock().finish_writes();
    }

    /// Advances one frame: slots retired pipeline-depth rotations ago
    /// actually free.
    pub fn rotate(&self) {
        let expired = {
            let mut deferred = self.deferred.lock();
            let expired = deferred
                .pop_front()
                .expect("sheet has at least one deferral bucket");
            deferred.push_back(Vec::new());
            expired
        };
        if !expired.is_empty() {
            let mut slots = self.slots.lock();
            for slot in expired {
                slots.free_slot(slot);
            }
        }
    }

    /// Physical id of the current buffer; changes on growth.
    #[must_use]
    pub fn buffer_id(&self) -> u64 {
        self.slots.lock().buffer_id()
    }

    /// The current physical buffer.
    #[must_use]
    pub fn buffer(&self) -> Arc<dyn DeviceBuffer> {
        self.slots.lock().buffer()
    }

    /// Slot size in bytes.
    #[must_use]
    pub fn slot_size(&self) -> u64 {
        self.slots.lock().slot_size()
    }

    /// Number of slots currently allocated (retired slots count until
    /// their delayed free runs).
    #[must_use]
    pub fn allocated_count(&self) -> u32 {
        self.slots.lock().allocated_count()
    }
}

/// The shared sheets of one topology.
pub struct PaletteArena {
    skins: Option<Arc<PaletteSheet>>,
    morphs: Option<Arc<PaletteSheet>>,
}

impl std::fmt::Debug for PaletteArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaletteArena")
            .field("skins", &self.skins.is_some())
            .field("morphs", &self.morphs.is_some())
            .finish()
    }
}

impl PaletteArena {
    /// Builds the sheets a topology needs: a skin sheet sized for its
    /// widest skin, a morph sheet if any primitive morphs.
    pub(crate) fn new(
        device: &Arc<dyn Device>,
        skin_count: u32,
        max_joint_count: u32,
        morph_primitive_count: u32,
        config: &RuntimeConfig,
        tracker: Option<&Arc<ResourceTracker>>,
    ) -> Self {
        let skins = (skin_count > 0).then(|| {
            PaletteSheet::new(
                device,
                BufferUsage::STORAGE,
                u64::from(max_joint_count.max(1)) * MATRIX_BYTES,
                config,
                "SkinMatrixSheet",
                tracker,
            )
        });
        let morphs = (morph_primitive_count > 0).then(|| {
            PaletteSheet::new(
                device,
                BufferUsage::UNIFORM,
                MORPH_SLOT_BYTES,
                config,
                "MorphWeightSheet",
                tracker,
            )
        });
        Self { skins, morphs }
    }

    /// The skin-matrix sheet, when the topology has skins.
    #[must_use]
    pub fn skin_sheet(&self) -> Option<&Arc<PaletteSheet>> {
        self.skins.as_ref()
    }

    /// The morph-weight sheet, when the topology has morphable
    /// primitives.
    #[must_use]
    pub fn morph_sheet(&self) -> Option<&Arc<PaletteSheet>> {
        self.morphs.as_ref()
    }

    /// Closes write mappings on both sheets ahead of submission.
    pub fn finish_writes(&self) {
        if let Some(sheet) = &self.skins {
            sheet.finish_writes();
        }
        if let Some(sheet) = &self.morphs {
            sheet.finish_writes();
        }
    }

    /// Once-per-frame synchronization point: advances both sheets'
    /// deferred frees. Call after the frame's draw submissions.
    pub fn rotate(&self) {
        if let Some(sheet) = &self.skins {
            sheet.rotate();
        }
        if let Some(sheet) = &self.morphs {
            sheet.rotate();
        }
    }
}
