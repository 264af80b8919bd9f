//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The only fallible public surface is topology construction: a model
//! loader feeds the [`TopologyBuilder`](crate::scene::TopologyBuilder)
//! file-derived data, and every cross-reference it hands us (parent
//! links, skin/joint indices, morph target indices) is validated before
//! the immutable topology is produced.
//!
//! Everything past construction is contract-checked instead: invalid
//! reference-count transitions, freeing an unallocated buffer slot or
//! acquiring from a closed pool are programmer errors and fail fast via
//! `assert!` rather than returning a `Result`.

use thiserror::Error;

/// Validation errors reported while building a scene topology.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RigError {
    // ========================================================================
    // Node graph errors
    // ========================================================================
    /// A node referenced a parent index that does not exist yet.
    #[error("Parent node {parent} out of bounds (node count: {node_count})")]
    ParentOutOfBounds {
        /// The offending parent index
        parent: u32,
        /// Number of nodes present when the reference was made
        node_count: u32,
    },

    /// An IK chain referenced a node index that does not exist.
    #[error("Node {node} out of bounds (node count: {node_count})")]
    NodeOutOfBounds {
        /// The offending node index
        node: u32,
        /// Total node count
        node_count: u32,
    },

    // ========================================================================
    // Skin errors
    // ========================================================================
    /// A joint node referenced a skin index that was never registered.
    #[error("Skin {skin} out of bounds (skin count: {skin_count})")]
    SkinOutOfBounds {
        /// The offending skin index
        skin: u32,
        /// Number of registered skins
        skin_count: u32,
    },

    /// A joint node referenced a joint index past its skin's joint count.
    #[error("Joint {joint} out of bounds for skin {skin} (joint count: {joint_count})")]
    JointOutOfBounds {
        /// Skin the joint belongs to
        skin: u32,
        /// The offending joint index
        joint: u32,
        /// The skin's joint count
        joint_count: u32,
    },

    /// Two joint nodes claimed the same (skin, joint) pair.
    #[error("Joint {joint} of skin {skin} is bound by more than one node")]
    DuplicateJointBinding {
        /// Skin the joint belongs to
        skin: u32,
        /// The doubly-bound joint index
        joint: u32,
    },

    /// An inverse-bind matrix list did not match the skin's joint count.
    #[error("Skin has {joint_count} joints but {matrix_count} inverse-bind matrices")]
    InverseBindCountMismatch {
        /// The skin's joint count
        joint_count: u32,
        /// Length of the supplied matrix list
        matrix_count: u32,
    },

    // ========================================================================
    // Transform slot errors
    // ========================================================================
    /// An influence source or IK link referenced a transform slot that
    /// does not exist.
    #[error("Transform slot {slot} out of bounds (slot count: {slot_count})")]
    TransformSlotOutOfBounds {
        /// The offending slot index
        slot: u32,
        /// Number of assigned transform slots
        slot_count: u32,
    },

    /// An influence node listed no sources.
    #[error("Influence node has an empty source list")]
    EmptyInfluence,

    // ========================================================================
    // Morph errors
    // ========================================================================
    /// A morph channel listed a target index past the layout's target count.
    #[error("Morph target {target} out of bounds (target count: {target_count})")]
    MorphTargetOutOfBounds {
        /// The offending target index
        target: u32,
        /// The layout's target count
        target_count: u32,
    },
}

/// Alias for `Result<T, RigError>`.
pub type Result<T> = std::result::Result<T, RigError>;
