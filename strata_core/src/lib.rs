// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene tree, transform resolution, and frame-cache bookkeeping for a
//! retained-mode 2D renderer.
//!
//! `strata_core` holds everything the render traversal reads: the node tree,
//! per-node transforms, the render state stack, and the per-node frame
//! stamps that decide whether a subtree can be replayed from the previous
//! frame's draw sequence. It is `no_std` compatible (with `alloc`) and uses
//! struct-of-arrays storage with generational handles.
//!
//! # Architecture
//!
//! ```text
//!   application mutations
//!       │  (set_position, add_child, set_geometry, ...)
//!       ▼
//!   NodeStore ──► change journal (dirty channels)
//!                      │
//!                      ▼  drained once per rendered frame
//!   mark_changed(node, frame) ──► FrameStamps
//!                                     │
//!                 ┌───────────────────┘
//!                 ▼
//!   traversal (strata_render): StateStack + replay decisions + Batcher
//! ```
//!
//! **[`node`]**: Struct-of-arrays node tree with generational handles.
//! Containers own ordered children; leaves own [`Geometry`](node::Geometry).
//! Includes transform resolution between arbitrary nodes
//! ([`matrix_between`](node::NodeStore::matrix_between)), bounds and
//! hit-testing.
//!
//! **[`cache`]**: Frame ids, per-node frame stamps, batch tokens and the
//! replay rule.
//!
//! **[`state`]**: The render state stack composed during traversal.
//!
//! **[`transform`]**: Decomposed 2D transform with a lazily cached matrix.
//!
//! **[`transform3d`]**: Column-major 4×4 transform for the optional 3D path.
//!
//! **[`blend`]**: Blend modes and their GPU blend factors.
//!
//! **[`dirty`]**: Change-journal channel constants.
//!
//! **[`error`]**: Error types returned by tree and stack operations.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! render-loop instrumentation.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies.
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-node
//!   change events.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod blend;
pub mod cache;
pub mod dirty;
pub mod error;
pub mod node;
pub mod state;
pub mod trace;
pub mod transform;
pub mod transform3d;
