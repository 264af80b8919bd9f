//! The immutable scene topology and its builder.
//!
//! A loader builds the topology once per model file: the node tree, the
//! skins, the morph layouts and the dense slot indices everything else
//! is keyed by. After [`TopologyBuilder::finish`] the shape is frozen;
//! instances only ever vary the numeric payload, never the tree.
//!
//! Nodes live in a flat arena addressed by dense `u32` indices, with a
//! separate parent-index array; children carry the downward links the
//! per-frame traversal follows. No back-pointer cycles, no interior
//! mutability in the tree itself.

use std::sync::Arc;

use glam::Mat4;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::config::RuntimeConfig;
use crate::diagnostics::ResourceTracker;
use crate::errors::{Result, RigError};
use crate::gpu::device::Device;
use crate::scene::morph::MorphLayout;
use crate::scene::palette::PaletteArena;
use crate::scene::skin::Skin;
use crate::scene::transform::PoseTransform;

/// One weighted source feeding an influence node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfluenceSource {
    /// Transform slot the contribution is read from.
    pub slot: u32,
    /// Blend weight of this source.
    pub weight: f32,
    /// Contribute the delta from the source's rest pose instead of its
    /// absolute local pose.
    pub relative_to_rest: bool,
}

/// How an influence node derives its transform from other slots.
#[derive(Debug, Clone, PartialEq)]
pub struct InfluenceBinding {
    /// The weighted sources, applied in order.
    pub sources: SmallVec<[InfluenceSource; 2]>,
    /// Whether the blended rotation is applied.
    pub affect_rotation: bool,
    /// Whether the blended translation is applied.
    pub affect_translation: bool,
}

/// What a node contributes to the per-frame traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Structural grouping; passes the accumulated matrix through.
    Group,
    /// A drawable; the traversal records its world matrix.
    Primitive {
        /// Dense drawable index.
        primitive: u32,
    },
    /// Owns a transform slot; the only kind that moves the hierarchy.
    Transform {
        /// Dense transform slot index.
        slot: u32,
    },
    /// Writes one skinning matrix when its subtree updates.
    Joint {
        /// Skin the joint belongs to.
        skin: u32,
        /// Joint index within the skin.
        joint: u32,
    },
    /// Applies a blend of other slots' transforms (a constraint).
    Influence(InfluenceBinding),
    /// Snapshots the accumulated matrix for the renderer's view.
    Camera {
        /// Dense camera index.
        camera: u32,
    },
}

/// A node of the frozen tree.
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    children: Vec<u32>,
}

impl Node {
    /// The node's traversal behavior.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Child node indices in traversal order.
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[u32] {
        &self.children
    }
}

/// Per-axis rotation limits of one IK link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkAxisLimit {
    /// Lower euler-angle bound per axis, radians.
    pub min: glam::Vec3,
    /// Upper euler-angle bound per axis, radians.
    pub max: glam::Vec3,
}

/// One link of an IK chain: a transform slot, optionally axis-limited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkLink {
    /// Transform slot the link would drive.
    pub slot: u32,
    /// Rotation limits, when the source model constrains the link.
    pub limit: Option<IkAxisLimit>,
}

/// An inverse-kinematics chain as loaded from the model.
///
/// Data contract only: the chain shape is validated and stored, but no
/// per-frame solve runs. A solver would plug in against this data.
#[derive(Debug, Clone, PartialEq)]
pub struct IkChain {
    /// Node whose position the chain would drive.
    pub effector: u32,
    /// Node the effector would chase.
    pub target: u32,
    /// Solver iteration count from the model file.
    pub loop_count: u32,
    /// Per-iteration rotation clamp, radians.
    pub angle_limit: f32,
    /// The driven links, effector-nearest first.
    pub links: Vec<IkLink>,
}

/// The immutable, shared description of one model's structure.
#[derive(Debug)]
pub struct Topology {
    nodes: Vec<Node>,
    parents: Vec<Option<u32>>,
    roots: Vec<u32>,
    rest_pose: Vec<PoseTransform>,
    skins: Vec<Skin>,
    morphs: Vec<Arc<MorphLayout>>,
    ik_chains: Vec<IkChain>,
    primitive_count: u32,
    camera_count: u32,
    palettes: PaletteArena,
}

impl Topology {
    /// All nodes, arena order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// One node by arena index.
    #[inline]
    #[must_use]
    pub fn node(&self, index: u32) -> &Node {
        &self.nodes[index as usize]
    }

    /// A node's parent, `None` for roots.
    #[inline]
    #[must_use]
    pub fn parent(&self, index: u32) -> Option<u32> {
        self.parents[index as usize]
    }

    /// Indices of the parentless nodes, in creation order.
    #[must_use]
    pub fn roots(&self) -> &[u32] {
        &self.roots
    }

    /// Number of assigned transform slots.
    #[must_use]
    pub fn transform_slot_count(&self) -> u32 {
        self.rest_pose.len() as u32
    }

    /// The rest pose of a transform slot.
    #[inline]
    #[must_use]
    pub fn rest_pose(&self, slot: u32) -> &PoseTransform {
        &self.rest_pose[slot as usize]
    }

    /// All skins, dense order.
    #[must_use]
    pub fn skins(&self) -> &[Skin] {
        &self.skins
    }

    /// One skin by dense index.
    #[inline]
    #[must_use]
    pub fn skin(&self, index: u32) -> &Skin {
        &self.skins[index as usize]
    }

    /// Morph layouts of the morphable primitives, dense order.
    #[must_use]
    pub fn morph_layouts(&self) -> &[Arc<MorphLayout>] {
        &self.morphs
    }

    /// The IK chains carried as data.
    #[must_use]
    pub fn ik_chains(&self) -> &[IkChain] {
        &self.ik_chains
    }

    /// Number of drawable primitives.
    #[must_use]
    pub fn primitive_count(&self) -> u32 {
        self.primitive_count
    }

    /// Number of camera nodes.
    #[must_use]
    pub fn camera_count(&self) -> u32 {
        self.camera_count
    }

    /// The shared GPU sheets instances allocate their slots from.
    #[must_use]
    pub fn palettes(&self) -> &PaletteArena {
        &self.palettes
    }
}

struct PendingSkin {
    joint_count: u32,
    inverse_bind: Option<Vec<Mat4>>,
}

/// Loader-facing construction of a [`Topology`].
///
/// Skins must be registered before the joints that bind them; influence
/// sources and IK chains may reference slots created later (they are
/// checked at [`finish`](Self::finish)).
#[derive(Default)]
pub struct TopologyBuilder {
    nodes: Vec<Node>,
    parents: Vec<Option<u32>>,
    rest_pose: Vec<PoseTransform>,
    skins: Vec<PendingSkin>,
    joint_bindings: FxHashMap<(u32, u32), u32>,
    morphs: Vec<Arc<MorphLayout>>,
    ik_chains: Vec<IkChain>,
    primitive_count: u32,
    camera_count: u32,
}

impl TopologyBuilder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&mut self, parent: Option<u32>, kind: NodeKind) -> Result<u32> {
        let index = self.nodes.len() as u32;
        if let Some(parent) = parent {
            let Some(node) = self.nodes.get_mut(parent as usize) else {
                return Err(RigError::ParentOutOfBounds {
                    parent,
                    node_count: index,
                });
            };
            node.children.push(index);
        }
        self.nodes.push(Node {
            kind,
            children: Vec::new(),
        });
        self.parents.push(parent);
        Ok(index)
    }

    /// Adds a structural group node.
    pub fn group(&mut self, parent: Option<u32>) -> Result<u32> {
        self.attach(parent, NodeKind::Group)
    }

    /// Adds a transform node with the given rest pose. Returns
    /// `(node index, transform slot)`.
    pub fn transform(&mut self, parent: Option<u32>, rest: PoseTransform) -> Result<(u32, u32)> {
        let slot = self.rest_pose.len() as u32;
        let node = self.attach(parent, NodeKind::Transform { slot })?;
        self.rest_pose.push(rest);
        Ok((node, slot))
    }

    /// Adds a joint node binding `(skin, joint)`. The skin must already
    /// be registered, the joint in range and not bound elsewhere.
    pub fn joint(&mut self, parent: Option<u32>, skin: u32, joint: u32) -> Result<u32> {
        let Some(pending) = self.skins.get(skin as usize) else {
            return Err(RigError::SkinOutOfBounds {
                skin,
                skin_count: self.skins.len() as u32,
            });
        };
        if joint >= pending.joint_count {
            return Err(RigError::JointOutOfBounds {
                skin,
                joint,
                joint_count: pending.joint_count,
            });
        }
        if self.joint_bindings.contains_key(&(skin, joint)) {
            return Err(RigError::DuplicateJointBinding { skin, joint });
        }
        let node = self.attach(parent, NodeKind::Joint { skin, joint })?;
        self.joint_bindings.insert((skin, joint), node);
        Ok(node)
    }

    /// Adds a drawable node. Returns `(node index, primitive index)`.
    pub fn primitive(&mut self, parent: Option<u32>) -> Result<(u32, u32)> {
        let primitive = self.primitive_count;
        let node = self.attach(parent, NodeKind::Primitive { primitive })?;
        self.primitive_count += 1;
        Ok((node, primitive))
    }

    /// Adds a camera node. Returns `(node index, camera index)`.
    pub fn camera(&mut self, parent: Option<u32>) -> Result<(u32, u32)> {
        let camera = self.camera_count;
        let node = self.attach(parent, NodeKind::Camera { camera })?;
        self.camera_count += 1;
        Ok((node, camera))
    }

    /// Adds an influence node. Source slots may be forward references;
    /// they are bounds-checked at finish.
    pub fn influence(&mut self, parent: Option<u32>, binding: InfluenceBinding) -> Result<u32> {
        if binding.sources.is_empty() {
            return Err(RigError::EmptyInfluence);
        }
        self.attach(parent, NodeKind::Influence(binding))
    }

    /// Registers a skin. Returns its dense index.
    pub fn add_skin(&mut self, joint_count: u32, inverse_bind: Option<Vec<Mat4>>) -> Result<u32> {
        if let Some(matrices) = &inverse_bind {
            if matrices.len() as u32 != joint_count {
                return Err(RigError::InverseBindCountMismatch {
                    joint_count,
                    matrix_count: matrices.len() as u32,
                });
            }
        }
        let index = self.skins.len() as u32;
        self.skins.push(PendingSkin {
            joint_count,
            inverse_bind,
        });
        Ok(index)
    }

    /// Registers a morphable primitive's layout. Returns its dense
    /// morph index.
    pub fn add_morph_layout(
        &mut self,
        target_count: u32,
        position_targets: &[u32],
        color_targets: &[u32],
        texcoord_targets: &[u32],
    ) -> Result<u32> {
        let layout = MorphLayout::new(
            target_count,
            position_targets,
            color_targets,
            texcoord_targets,
        )?;
        let index = self.morphs.len() as u32;
        self.morphs.push(Arc::new(layout));
        Ok(index)
    }

    /// Records an IK chain as data. Node and slot references are
    /// checked at finish.
    pub fn add_ik_chain(&mut self, chain: IkChain) {
        self.ik_chains.push(chain);
    }

    /// Freezes the topology, validating every deferred reference and
    /// creating the shared GPU sheets.
    pub fn finish(
        self,
        device: &Arc<dyn Device>,
        config: &RuntimeConfig,
    ) -> Result<Arc<Topology>> {
        self.finish_with_tracker(device, config, None)
    }

    /// [`finish`](Self::finish) with a diagnostics context attached to
    /// the shared sheets.
    pub fn finish_with_tracker(
        self,
        device: &Arc<dyn Device>,
        config: &RuntimeConfig,
        tracker: Option<&Arc<ResourceTracker>>,
    ) -> Result<Arc<Topology>> {
        let slot_count = self.rest_pose.len() as u32;
        let node_count = self.nodes.len() as u32;

        let check_slot = |slot: u32| -> Result<()> {
            if slot >= slot_count {
                return Err(RigError::TransformSlotOutOfBounds { slot, slot_count });
            }
            Ok(())
        };
        let check_node = |node: u32| -> Result<()> {
            if node >= node_count {
                return Err(RigError::NodeOutOfBounds { node, node_count });
            }
            Ok(())
        };

        for node in &self.nodes {
            if let NodeKind::Influence(binding) = &node.kind {
                for source in &binding.sources {
                    check_slot(source.slot)?;
                }
            }
        }
        for chain in &self.ik_chains {
            check_node(chain.effector)?;
            check_node(chain.target)?;
            for link in &chain.links {
                check_slot(link.slot)?;
            }
        }

        let skins: Vec<Skin> = self
            .skins
            .into_iter()
            .enumerate()
            .map(|(skin_index, pending)| {
                let joint_nodes = (0..pending.joint_count)
                    .map(|joint| {
                        self.joint_bindings
                            .get(&(skin_index as u32, joint))
                            .copied()
                    })
                    .collect();
                Skin::new(pending.joint_count, joint_nodes, pending.inverse_bind)
            })
            .collect();

        let max_joint_count = skins.iter().map(Skin::joint_count).max().unwrap_or(0);
        let palettes = PaletteArena::new(
            device,
            skins.len() as u32,
            max_joint_count,
            self.morphs.len() as u32,
            config,
            tracker,
        );

        let roots = self
            .parents
            .iter()
            .enumerate()
            .filter_map(|(index, parent)| parent.is_none().then_some(index as u32))
            .collect();

        Ok(Arc::new(Topology {
            nodes: self.nodes,
            parents: self.parents,
            roots,
            rest_pose: self.rest_pose,
            skins,
            morphs: self.morphs,
            ik_chains: self.ik_chains,
            primitive_count: self.primitive_count,
            camera_count: self.camera_count,
            palettes,
        }))
    }
}
