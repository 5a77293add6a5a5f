// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Draw-call batching, cache replay and frame traversal for strata scene
//! trees.
//!
//! This crate turns a [`strata_core`] node tree into GPU draw calls:
//!
//! - [`Pipeline`]: per-frame traversal deciding, per subtree, between
//!   replaying the previous frame's draw range and drawing fresh
//! - [`Batcher`]: merges consecutive compatible geometry into one draw call
//!   and keeps the frame record that replay copies from
//! - [`GpuBackend`]: the submission contract, with [`RecordingBackend`] for
//!   tests
//! - [`Stage`]: owns a tree and runs the update phase ([`Advance`]
//!   collaborators) followed by the render phase
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Emits render-loop events to a
//!   [`TraceSink`](strata_core::trace::TraceSink).
//! - `trace-rich` (disabled by default, implies `trace`): Also emits the
//!   per-frame list of changed nodes.

#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

mod backend;
mod batch;
mod config;
mod pipeline;
mod stage;

pub use backend::{BackendCall, GpuBackend, RecordedDraw, RecordingBackend};
pub use batch::{BatchSignature, BatchState, Batcher};
pub use config::PipelineConfig;
pub use pipeline::{FrameStats, Pipeline, RenderError};
pub use stage::{Advance, Stage};
