// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for tree, geometry, and state-stack operations.
//!
//! Every error here signals misuse by the caller rather than a transient
//! failure. Operations that return one of them leave prior state intact.

use core::fmt;

use crate::node::NodeId;

/// Leaf geometry that cannot be drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidGeometryError {
    /// The vertex list is empty.
    NoVertices,
    /// The index list is empty or not a multiple of three.
    IncompleteTriangles {
        /// Number of indices supplied.
        len: usize,
    },
    /// An index refers past the end of the vertex list.
    IndexOutOfRange {
        /// The offending index.
        index: u16,
        /// Number of vertices.
        vertex_count: usize,
    },
    /// More vertices than a single batch can address.
    TooManyVertices {
        /// Number of vertices supplied.
        vertex_count: usize,
    },
    /// A vertex position is NaN or infinite.
    NonFinitePosition,
    /// Every triangle has zero area.
    ZeroArea,
}

impl fmt::Display for InvalidGeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoVertices => write!(f, "geometry has no vertices"),
            Self::IncompleteTriangles { len } => {
                write!(f, "index count {len} does not describe whole triangles")
            }
            Self::IndexOutOfRange {
                index,
                vertex_count,
            } => write!(
                f,
                "index {index} out of range for {vertex_count} vertices"
            ),
            Self::TooManyVertices { vertex_count } => {
                write!(f, "{vertex_count} vertices exceed the 16-bit index space")
            }
            Self::NonFinitePosition => write!(f, "vertex position is not finite"),
            Self::ZeroArea => write!(f, "geometry has zero area"),
        }
    }
}

impl core::error::Error for InvalidGeometryError {}

/// Transform resolution between two nodes that share no common ancestor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisconnectedTreeError {
    /// The node whose space was being mapped from.
    pub source: NodeId,
    /// The node whose space was being mapped into.
    pub target: NodeId,
}

impl fmt::Display for DisconnectedTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} and {:?} are not part of the same tree",
            self.source, self.target
        )
    }
}

impl core::error::Error for DisconnectedTreeError {}

/// An attempt to insert a node beneath itself or one of its descendants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleError {
    /// The node that was being inserted.
    pub child: NodeId,
    /// The requested parent, which is `child` or one of its descendants.
    pub parent: NodeId,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot add {:?} under {:?}: it would become its own ancestor",
            self.child, self.parent
        )
    }
}

impl core::error::Error for CycleError {}

/// `pop` on a render state stack that has nothing left to pop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StackUnderflowError;

impl fmt::Display for StackUnderflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "render state stack underflow (unbalanced push/pop)")
    }
}

impl core::error::Error for StackUnderflowError {}
