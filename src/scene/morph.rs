//! Morph-target weights and their GPU-resident active lists.
//!
//! A morphable primitive can carry many targets, but only a handful are
//! non-zero at once; the GPU sees a capped list of (target, weight)
//! pairs per channel rather than the full weight vector. Setting a
//! weight to zero vacates its entry, and the vacancy is back-filled from
//! the lowest-indexed latent non-zero target so the uploaded list stays
//! as full as the cap allows.

use std::mem;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::errors::{Result, RigError};
use crate::resources::cow::CowContent;
use crate::scene::palette::PaletteSheet;

/// Most targets a channel's GPU-resident active list can hold.
pub const MAX_ACTIVE_TARGETS: usize = 8;

/// The three per-vertex attributes a target may displace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphChannelKind {
    Position,
    Color,
    TexCoord,
}

impl MorphChannelKind {
    /// Every channel, in slot-layout order.
    pub const ALL: [Self; 3] = [Self::Position, Self::Color, Self::TexCoord];

    /// This channel's position in the slot layout.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Position => 0,
            Self::Color => 1,
            Self::TexCoord => 2,
        }
    }
}

/// The GPU-resident record of one channel's enabled targets.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ActiveTargetList {
    /// Enabled target indices; entries past `count` are stale.
    pub indices: [u32; MAX_ACTIVE_TARGETS],
    /// Weights parallel to `indices`.
    pub weights: [f32; MAX_ACTIVE_TARGETS],
    /// Number of valid entries.
    pub count: u32,
    pub _pad: [u32; 3],
}

impl ActiveTargetList {
    fn position_of(&self, target: u32) -> Option<usize> {
        self.indices[..self.count as usize]
            .iter()
            .position(|&index| index == target)
    }

    fn contains(&self, target: u32) -> bool {
        self.position_of(target).is_some()
    }

    fn remove_at(&mut self, position: usize) {
        let count = self.count as usize;
        for i in position..count - 1 {
            self.indices[i] = self.indices[i + 1];
            self.weights[i] = self.weights[i + 1];
        }
        self.count -= 1;
    }

    fn push(&mut self, target: u32, weight: f32) {
        let count = self.count as usize;
        self.indices[count] = target;
        self.weights[count] = weight;
        self.count += 1;
    }
}

/// Bytes one channel occupies inside a morph sheet slot.
pub const MORPH_CHANNEL_BYTES: u64 = mem::size_of::<ActiveTargetList>() as u64;

/// Bytes one morphable primitive occupies inside a morph sheet slot.
pub const MORPH_SLOT_BYTES: u64 = MORPH_CHANNEL_BYTES * 3;

/// Which channels each target of a morphable primitive displaces.
///
/// Immutable layout data assigned by the loader.
#[derive(Debug, Clone)]
pub struct MorphLayout {
    target_count: u32,
    /// Per-target bitmask of affected channels.
    channel_masks: Vec<u8>,
}

impl MorphLayout {
    /// Builds a layout from per-channel target lists.
    pub fn new(
        target_count: u32,
        position_targets: &[u32],
        color_targets: &[u32],
        texcoord_targets: &[u32],
    ) -> Result<Self> {
        let mut channel_masks = vec![0u8; target_count as usize];
        for (channel, targets) in [
            (MorphChannelKind::Position, position_targets),
            (MorphChannelKind::Color, color_targets),
            (MorphChannelKind::TexCoord, texcoord_targets),
        ] {
            for &target in targets {
                if target >= target_count {
                    return Err(RigError::MorphTargetOutOfBounds {
                        target,
                        target_count,
                    });
                }
                channel_masks[target as usize] |= 1 << channel.index();
            }
        }
        Ok(Self {
            target_count,
            channel_masks,
        })
    }

    /// Number of targets the primitive carries.
    #[must_use]
    pub fn target_count(&self) -> u32 {
        self.target_count
    }

    /// Whether a target displaces the given channel.
    #[inline]
    #[must_use]
    pub fn affects(&self, target: u32, channel: MorphChannelKind) -> bool {
        self.channel_masks[target as usize] & (1 << channel.index()) != 0
    }
}

/// One instance's morph weights for one morphable primitive, living in
/// a slot of the topology's shared morph sheet.
pub struct MorphWeights {
    sheet: Arc<PaletteSheet>,
    slot: u32,
    layout: Arc<MorphLayout>,
    /// Full per-target weights, including latent ones past the cap.
    weights: Vec<f32>,
    channels: [ActiveTargetList; 3],
    overflow_warned: bool,
}

impl MorphWeights {
    /// Allocates a morph slot with every weight at zero.
    pub(crate) fn allocate(sheet: Arc<PaletteSheet>, layout: Arc<MorphLayout>) -> Self {
        let slot = sheet.allocate();
        let weights = vec![0.0; layout.target_count() as usize];
        let morph = Self {
            sheet,
            slot,
            layout,
            weights,
            channels: [ActiveTargetList::zeroed(); 3],
            overflow_warned: false,
        };
        morph.upload_all();
        morph
    }

    fn upload_all(&self) {
        self.sheet
            .write(self.slot, 0, bytemuck::cast_slice(&self.channels));
    }

    fn upload_channel(&self, channel: usize) {
        self.sheet.write(
            self.slot,
            channel as u64 * MORPH_CHANNEL_BYTES,
            bytemuck::bytes_of(&self.channels[channel]),
        );
    }

    /// Sets one target's weight and refreshes every affected channel.
    pub fn set_weight(&mut self, target: u32, weight: f32) {
        assert!(
            target < self.layout.target_count(),
            "morph target {target} out of bounds (target count {})",
            self.layout.target_count()
        );
        self.weights[target as usize] = weight;
        let layout = Arc::clone(&self.layout);
        for channel in MorphChannelKind::ALL {
            if layout.affects(target, channel) {
                self.update_channel(channel, target, weight);
            }
        }
    }

    fn update_channel(&mut self, channel: MorphChannelKind, target: u32, weight: f32) {
        let index = channel.index();
        let position = self.channels[index].position_of(target);
        if weight == 0.0 {
            let Some(position) = position else {
                return;
            };
            self.channels[index].remove_at(position);
            self.back_fill(channel);
        } else if let Some(position) = position {
            self.channels[index].weights[position] = weight;
        } else if (self.channels[index].count as usize) < MAX_ACTIVE_TARGETS {
            self.channels[index].push(target, weight);
        } else {
            // Weight is recorded CPU-side and becomes visible if an
            // active entry vacates.
            if !self.overflow_warned {
                log::warn!(
                    "morph channel active list full ({MAX_ACTIVE_TARGETS}); target {target} stays latent"
                );
                self.overflow_warned = true;
            }
            return;
        }
        self.upload_channel(index);
    }

    /// Promotes the lowest-indexed latent non-zero target into the
    /// channel's freed capacity.
    fn back_fill(&mut self, channel: MorphChannelKind) {
        let index = channel.index();
        for target in 0..self.layout.target_count() {
            if (self.channels[index].count as usize) >= MAX_ACTIVE_TARGETS {
                break;
            }
            let weight = self.weights[target as usize];
            if weight != 0.0
                && self.layout.affects(target, channel)
                && !self.channels[index].contains(target)
            {
                self.channels[index].push(target, weight);
            }
        }
    }

    /// The CPU-side weight of a target, latent or not.
    #[must_use]
    pub fn weight(&self, target: u32) -> f32 {
        self.weights[target as usize]
    }

    /// The GPU-resident active list of a channel.
    #[must_use]
    pub fn active(&self, channel: MorphChannelKind) -> &ActiveTargetList {
        &self.channels[channel.index()]
    }

    /// This primitive's slot index in the morph sheet.
    #[must_use]
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Byte offset of this primitive's record inside the sheet buffer.
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

impl CowContent for MorphWeights {
    fn duplicate(&self) -> Self {
        let copy = Self {
            sheet: Arc::clone(&self.sheet),
            slot: self.sheet.allocate(),
            layout: Arc::clone(&self.layout),
            weights: self.weights.clone(),
            channels: self.channels,
            overflow_warned: self.overflow_warned,
        };
        copy.upload_all();
        copy
    }

    fn release(&mut self) {
        self.sheet.retire(self.slot);
    }
}
