// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The two-phase frame driver.

use alloc::boxed::Box;
use alloc::vec::Vec;

use strata_core::node::{NodeId, NodeStore};
use strata_core::trace::{TraceSink, Tracer};

use crate::backend::GpuBackend;
use crate::config::PipelineConfig;
use crate::pipeline::{FrameStats, Pipeline, RenderError};

/// Per-frame update collaborator, such as an animation or tween system.
///
/// Runs in the update phase, before the frame is rendered, and may mutate
/// the tree freely.
pub trait Advance {
    /// Advances by `elapsed` seconds.
    fn advance(&mut self, store: &mut NodeStore, elapsed: f64);
}

impl<F: FnMut(&mut NodeStore, f64)> Advance for F {
    fn advance(&mut self, store: &mut NodeStore, elapsed: f64) {
        self(store, elapsed);
    }
}

/// Owns a tree, a pipeline and a backend, and runs update then render.
pub struct Stage<B> {
    store: NodeStore,
    root: NodeId,
    pipeline: Pipeline,
    backend: B,
    advancers: Vec<Box<dyn Advance>>,
}

impl<B: core::fmt::Debug> core::fmt::Debug for Stage<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stage")
            .field("root", &self.root)
            .field("pipeline", &self.pipeline)
            .field("backend", &self.backend)
            .field("advancers", &self.advancers.len())
            .finish_non_exhaustive()
    }
}

impl<B: GpuBackend> Stage<B> {
    /// Creates a stage with an empty root container.
    #[must_use]
    pub fn new(backend: B, config: PipelineConfig) -> Self {
        let mut store = NodeStore::new();
        let root = store.create_container();
        Self {
            store,
            root,
            pipeline: Pipeline::new(config),
            backend,
            advancers: Vec::new(),
        }
    }

    /// Returns the root container.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the node store.
    #[must_use]
    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// Returns the node store for mutation.
    pub fn store_mut(&mut self) -> &mut NodeStore {
        &mut self.store
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the backend for mutation.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Returns the pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Counters of the last rendered frame.
    #[must_use]
    pub fn frame_stats(&self) -> FrameStats {
        self.pipeline.stats()
    }

    /// Registers an update collaborator. Collaborators run in registration
    /// order.
    pub fn add_advancer(&mut self, advancer: impl Advance + 'static) {
        self.advancers.push(Box::new(advancer));
    }

    /// Runs the update phase. Negative or NaN `elapsed` is treated as zero.
    pub fn advance(&mut self, elapsed: f64) {
        let elapsed = if elapsed > 0.0 { elapsed } else { 0.0 };
        for a in &mut self.advancers {
            a.advance(&mut self.store, elapsed);
        }
    }

    /// Renders one frame. See [`Pipeline::render`].
    ///
    /// # Errors
    ///
    /// Propagates [`RenderError`] from the traversal.
    pub fn render(&mut self) -> Result<bool, RenderError> {
        self.pipeline.render(
            &mut self.store,
            self.root,
            &mut self.backend,
            &mut Tracer::none(),
        )
    }

    /// Renders one frame, reporting to `sink` (requires the `trace`
    /// feature to emit anything).
    ///
    /// # Errors
    ///
    /// Propagates [`RenderError`] from the traversal.
    pub fn render_traced(&mut self, sink: &mut dyn TraceSink) -> Result<bool, RenderError> {
        self.pipeline.render(
            &mut self.store,
            self.root,
            &mut self.backend,
            &mut Tracer::new(sink),
        )
    }

    /// Forces `id` to be redrawn next frame, for content that changes
    /// outside the tree (a texture re-rendered off-screen, for example).
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn request_redraw(&mut self, id: NodeId) {
        self.store.request_redraw(id);
    }

    /// Releases pipeline and backend buffers. See [`Pipeline::purge`].
    pub fn purge(&mut self) {
        self.pipeline.purge(&mut self.backend);
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use core::cell::Cell;

    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};
    use strata_core::node::{Geometry, Vertex};

    #[test]
    fn advance_runs_before_render() {
        let mut stage = Stage::new(RecordingBackend::new(), PipelineConfig::default());
        let leaf = stage
            .store_mut()
            .create_leaf(Geometry::quad(2.0, 2.0, Vertex::WHITE))
            .unwrap();
        let root = stage.root();
        stage.store_mut().add_child(root, leaf).unwrap();
        stage.add_advancer(move |store: &mut NodeStore, dt: f64| {
            let x = store.transform(leaf).position().x;
            store.set_position(leaf, (x + dt * 10.0, 0.0));
        });

        stage.advance(0.5);
        assert_eq!(stage.render(), Ok(true));
        let draws = stage.backend().draws();
        assert_eq!(draws[0].vertices[0].position, [5.0, 0.0]);
    }

    #[test]
    fn negative_elapsed_is_clamped() {
        let seen = Rc::new(Cell::new(f64::NAN));
        let mut stage = Stage::new(RecordingBackend::new(), PipelineConfig::default());
        let s = Rc::clone(&seen);
        stage.add_advancer(move |_: &mut NodeStore, dt: f64| s.set(dt));
        stage.advance(-1.0);
        assert_eq!(seen.get(), 0.0);
        stage.advance(f64::NAN);
        assert_eq!(seen.get(), 0.0);
    }

    #[test]
    fn purge_reaches_backend() {
        let mut stage = Stage::new(RecordingBackend::new(), PipelineConfig::default());
        stage.render().unwrap();
        stage.purge();
        assert_eq!(stage.backend().calls().last(), Some(&BackendCall::Purge));
    }
}
