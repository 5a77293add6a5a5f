// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame traversal tying the frame cache, state stack and batcher
//! together.
//!
//! One call to [`Pipeline::render`] is one frame:
//!
//! 1. Drain the store's change journal and stamp every changed node with the
//!    new frame id (`mark_changed`). With skip-unchanged enabled, an empty
//!    journal ends the frame here.
//! 2. Reset the state stack and start a new batcher frame.
//! 3. Walk the tree depth first from the root. Each visible child is either
//!    replayed from the previous frame's record or drawn fresh: state
//!    pushed, geometry batched (leaf) or children walked (container), state
//!    popped. Its batch tokens are recorded either way.
//! 4. Flush the last batch and publish the frame's [`FrameStats`].

use core::fmt;

use strata_core::cache::FrameId;
use strata_core::error::StackUnderflowError;
use strata_core::node::{INVALID, NodeId, NodeKind, NodeStore, RenderTarget};
use strata_core::state::StateStack;
use strata_core::trace::{
    FlushReason, FrameBeginEvent, FrameSkippedEvent, FrameSummary, ReplayEvent, Tracer,
};

use crate::backend::GpuBackend;
use crate::batch::Batcher;
use crate::config::PipelineConfig;

/// Errors that abort a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum RenderError {
    /// Traversal popped more state entries than it pushed.
    StackUnderflow(StackUnderflowError),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackUnderflow(e) => write!(f, "render traversal failed: {e}"),
        }
    }
}

impl core::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::StackUnderflow(e) => Some(e),
        }
    }
}

impl From<StackUnderflowError> for RenderError {
    fn from(e: StackUnderflowError) -> Self {
        Self::StackUnderflow(e)
    }
}

/// Counters for the last rendered frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame id.
    pub frame_id: FrameId,
    /// Draw calls issued.
    pub draw_calls: u32,
    /// Vertices submitted across all draw calls.
    pub batched_vertices: u32,
    /// Nodes visited; a replayed subtree counts once.
    pub nodes_traversed: u32,
    /// Subtree replays performed.
    pub cache_replays: u32,
    /// Vertices copied from the previous frame by replays.
    pub replayed_vertices: u32,
}

impl From<FrameStats> for FrameSummary {
    fn from(s: FrameStats) -> Self {
        Self {
            frame_id: s.frame_id,
            draw_calls: s.draw_calls,
            batched_vertices: s.batched_vertices,
            nodes_traversed: s.nodes_traversed,
            cache_replays: s.cache_replays,
            replayed_vertices: s.replayed_vertices,
        }
    }
}

/// Renders a [`NodeStore`] tree into a [`GpuBackend`], one frame per call.
///
/// The pipeline owns the frame counter, so independent pipelines (say a
/// main view and a thumbnail renderer) keep independent cache state. A
/// store should be rendered by one pipeline only, since the frame stamps
/// live on the nodes.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    frame_id: FrameId,
    replay_allowed: bool,
    replay_ready: bool,
    stack: StateStack,
    batcher: Batcher,
    stats: FrameStats,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Pipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        if !config.cache_enabled {
            log::debug!("subtree replay disabled by configuration");
        }
        Self {
            config,
            frame_id: 0,
            replay_allowed: false,
            replay_ready: false,
            stack: StateStack::new(),
            batcher: Batcher::new(config.max_batch_vertices, config.initial_vertex_capacity),
            stats: FrameStats::default(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the id of the last rendered frame (`0` before the first).
    #[must_use]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the counters of the last rendered frame.
    #[must_use]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Renders one frame of the tree rooted at `root`.
    ///
    /// Returns `Ok(false)` without drawing anything if skip-unchanged is
    /// enabled and nothing changed since the last rendered frame; the frame
    /// id does not advance in that case.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::StackUnderflow`] if the traversal's pushes and
    /// pops get out of step. The frame is abandoned.
    ///
    /// # Panics
    ///
    /// Panics if `root` is stale.
    pub fn render(
        &mut self,
        store: &mut NodeStore,
        root: NodeId,
        backend: &mut dyn GpuBackend,
        tracer: &mut Tracer<'_>,
    ) -> Result<bool, RenderError> {
        assert!(store.is_alive(root), "stale root NodeId");
        let changes = store.take_changes();
        if self.config.skip_unchanged_frames && self.frame_id != 0 && changes.is_empty() {
            tracer.frame_skipped(&FrameSkippedEvent {
                frame_id: self.frame_id,
            });
            return Ok(false);
        }

        self.frame_id += 1;
        let frame = self.frame_id;
        #[cfg(feature = "trace-rich")]
        let mut stamped = alloc::vec::Vec::with_capacity(changes.len());
        for &id in &changes {
            let ancestors = store.mark_changed(id, frame);
            #[cfg(feature = "trace-rich")]
            stamped.push(strata_core::trace::NodeChange {
                node_index: id.index(),
                ancestors_stamped: u32::try_from(ancestors).unwrap_or(u32::MAX),
            });
            #[cfg(not(feature = "trace-rich"))]
            let _ = ancestors;
        }
        #[cfg(feature = "trace-rich")]
        tracer.node_changes(frame, &stamped);

        self.replay_allowed = self.config.cache_enabled && self.replay_ready;
        self.replay_ready = true;
        self.stack.reset();
        self.batcher.next_frame(frame);
        self.stats = FrameStats {
            frame_id: frame,
            ..FrameStats::default()
        };
        tracer.frame_begin(&FrameBeginEvent {
            frame_id: frame,
            changed_nodes: u32::try_from(changes.len()).unwrap_or(u32::MAX),
            replay_allowed: self.replay_allowed,
        });

        // The root is always drawn fresh so that each of its children
        // decides replay on its own.
        let root = root.index();
        if Self::is_drawn(store, root) {
            self.stats.nodes_traversed += 1;
            self.draw_fresh(store, root, backend, tracer)?;
        }
        self.batcher.flush(backend, tracer, FlushReason::FrameEnd);

        self.stats.draw_calls = self.batcher.draw_calls();
        self.stats.batched_vertices = self.batcher.batched_vertices();
        tracer.frame_summary(&self.stats.into());
        Ok(true)
    }

    /// Releases the batcher's buffers and recorded history and asks the
    /// backend to do the same.
    ///
    /// Must only be called between frames. The next frame is drawn without
    /// replay.
    pub fn purge(&mut self, backend: &mut dyn GpuBackend) {
        self.batcher.purge();
        self.stack.shrink_to_fit();
        backend.purge();
        self.replay_ready = false;
        log::debug!("pipeline purged after frame {}", self.frame_id);
    }

    fn is_drawn(store: &NodeStore, idx: u32) -> bool {
        store.flags_at(idx).visible && store.opacity_at(idx) != 0.0 && !store.is_mask_at(idx)
    }

    fn draw_child(
        &mut self,
        store: &mut NodeStore,
        idx: u32,
        parent_changed: bool,
        backend: &mut dyn GpuBackend,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), RenderError> {
        let frame = self.frame_id;
        if !Self::is_drawn(store, idx) {
            return Ok(());
        }
        self.stats.nodes_traversed += 1;

        let stamps = store.stamps_at_mut(idx);
        if parent_changed {
            stamps.self_or_ancestor_changed = frame;
        }
        let push = self.batcher.position();
        if stamps.can_replay(frame, self.replay_allowed) {
            let (from, to) = (stamps.push_token, stamps.pop_token);
            if let Some((batches, vertices)) = self.batcher.replay(backend, tracer, from, to) {
                stamps.push_token = push;
                stamps.pop_token = self.batcher.position();
                stamps.last_drawn = frame;
                self.stats.cache_replays += 1;
                self.stats.replayed_vertices += vertices;
                tracer.replay(&ReplayEvent {
                    frame_id: frame,
                    node_index: idx,
                    batches,
                    vertices,
                });
                return Ok(());
            }
        }
        self.draw_fresh(store, idx, backend, tracer)
    }

    fn draw_fresh(
        &mut self,
        store: &mut NodeStore,
        idx: u32,
        backend: &mut dyn GpuBackend,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), RenderError> {
        let frame = self.frame_id;
        let flags = store.flags_at(idx);
        let push = self.batcher.position();
        let stamps = store.stamps_at_mut(idx);
        // Tentative; a non-cacheable descendant resets it.
        stamps.last_drawn = frame;
        stamps.push_token = push;
        let self_changed = stamps.self_or_ancestor_changed == frame;

        self.stack.push(
            store.local_matrix_at(idx),
            store.opacity_at(idx),
            store.blend_mode_at(idx),
            store.clip_rect_at(idx),
        );
        let mask = store.mask_at(idx);
        if mask != INVALID {
            // Masks live in the masked node's local space.
            let m = self.stack.top().matrix * store.local_matrix_at(mask);
            self.stack.clip_to(store.subtree_bounds_at(mask, m));
        }
        if let Some(filter) = store.filter_at(idx) {
            self.stack.set_render_target(RenderTarget::Filter(filter));
        }
        if !flags.cacheable {
            store.exclude_from_cache_at(idx);
        }

        match store.kind_at(idx) {
            NodeKind::Leaf => {
                let top = *self.stack.top();
                if top.matrix.determinant() != 0.0 && !top.is_clipped_out() {
                    if let Some(geometry) = store.geometry_at(idx) {
                        self.batcher.add_geometry(backend, tracer, geometry, &top);
                    }
                }
            }
            NodeKind::Container => {
                let mut c = store.first_child_at(idx);
                while c != INVALID {
                    let next = store.next_sibling_at(c);
                    self.draw_child(store, c, self_changed, backend, tracer)?;
                    c = next;
                }
            }
        }

        self.stack.pop()?;
        store.stamps_at_mut(idx).pop_token = self.batcher.position();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use strata_core::node::{Geometry, TextureId, Vertex};

    fn leaf(store: &mut NodeStore, parent: NodeId, texture: u64) -> NodeId {
        let g = Geometry::quad(4.0, 4.0, Vertex::WHITE).with_texture(TextureId(texture));
        let id = store.create_leaf(g).unwrap();
        store.add_child(parent, id).unwrap();
        id
    }

    fn frame(p: &mut Pipeline, store: &mut NodeStore, root: NodeId) -> RecordingBackend {
        let mut backend = RecordingBackend::new();
        p.render(store, root, &mut backend, &mut Tracer::none()).unwrap();
        backend
    }

    #[test]
    fn first_frame_draws_everything() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let a = leaf(&mut store, root, 1);
        let mut p = Pipeline::default();
        let backend = frame(&mut p, &mut store, root);
        assert_eq!(backend.draw_count(), 1);
        assert_eq!(p.frame_id(), 1);
        let stats = p.stats();
        assert_eq!(stats.nodes_traversed, 2);
        assert_eq!(stats.cache_replays, 0);
        assert_eq!(store.stamps(a).last_drawn, 1);
    }

    #[test]
    fn unchanged_frame_replays_each_child_of_root() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let a = leaf(&mut store, root, 1);
        leaf(&mut store, root, 2);
        let mut p = Pipeline::default();
        let first = frame(&mut p, &mut store, root);
        let second = frame(&mut p, &mut store, root);
        assert_eq!(first.draws(), second.draws());
        assert_eq!(p.stats().cache_replays, 2);
        assert_eq!(p.stats().nodes_traversed, 3);
        assert_eq!(store.stamps(root).last_drawn, 2);
        assert_eq!(store.stamps(a).last_drawn, 2);
    }

    #[test]
    fn invisible_root_draws_nothing() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        leaf(&mut store, root, 1);
        store.set_visible(root, false);
        let mut p = Pipeline::default();
        let backend = frame(&mut p, &mut store, root);
        assert_eq!(backend.draw_count(), 0);
        assert_eq!(p.stats().nodes_traversed, 0);
    }

    #[test]
    fn hidden_nodes_are_not_traversed() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let a = leaf(&mut store, root, 1);
        leaf(&mut store, root, 1);
        store.set_visible(a, false);
        let mut p = Pipeline::default();
        let backend = frame(&mut p, &mut store, root);
        assert_eq!(p.stats().nodes_traversed, 2);
        assert_eq!(backend.draws()[0].vertices.len(), 4);
    }

    #[test]
    fn skip_unchanged_keeps_frame_id() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        leaf(&mut store, root, 1);
        let mut p = Pipeline::new(PipelineConfig::new().with_skip_unchanged_frames(true));
        let mut backend = RecordingBackend::new();
        assert_eq!(p.render(&mut store, root, &mut backend, &mut Tracer::none()), Ok(true));
        assert_eq!(p.render(&mut store, root, &mut backend, &mut Tracer::none()), Ok(false));
        assert_eq!(p.frame_id(), 1);
    }

    #[test]
    fn error_display_names_the_cause() {
        let e = RenderError::from(StackUnderflowError);
        assert!(alloc::format!("{e}").contains("render traversal failed"));
    }
}
