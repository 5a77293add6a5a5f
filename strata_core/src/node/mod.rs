// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node tree: storage, geometry, and spatial queries.
//!
//! Nodes live in a [`NodeStore`] and are addressed by generational
//! [`NodeId`] handles. A node is either a container (ordered children, drawn
//! back to front) or a leaf (one [`Geometry`]). Every node carries a
//! decomposed [`Transform`](crate::transform::Transform), opacity, blend mode,
//! flags, an optional clip rect, mask and filter.

mod geometry;
mod id;
mod query;
mod resource;
mod space;
mod store;
mod traverse;

pub use geometry::{Geometry, MAX_VERTICES, Vertex};
pub use id::{INVALID, NodeId};
pub use resource::{FilterId, RenderTarget, TextureId};
pub use store::{NodeFlags, NodeKind, NodeStore};
pub use traverse::{Ancestors, Children};
