// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the render loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! render-loop instrumentation calls at each stage. All method bodies default
//! to no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`): gates [`NodeChange`] events and the
//!   corresponding `TraceSink` method.

use crate::blend::BlendMode;
use crate::cache::FrameId;
use crate::node::{RenderTarget, TextureId};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Why the batcher emitted a draw call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlushReason {
    /// Incoming geometry had a different texture, tint, alpha mode or blend
    /// mode.
    Signature,
    /// The scissor rect or render target changed.
    State,
    /// Appending would exceed the per-batch vertex limit.
    Capacity,
    /// End of the frame's traversal.
    FrameEnd,
    /// Requested by the caller.
    Explicit,
}

impl FlushReason {
    /// Returns a short lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signature => "signature",
            Self::State => "state",
            Self::Capacity => "capacity",
            Self::FrameEnd => "frame-end",
            Self::Explicit => "explicit",
        }
    }
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a rendered frame starts, after the change journal is drained.
#[derive(Clone, Copy, Debug)]
pub struct FrameBeginEvent {
    /// Id of the frame being rendered.
    pub frame_id: FrameId,
    /// Number of nodes recorded as changed since the previous frame.
    pub changed_nodes: u32,
    /// Whether subtrees may be replayed this frame.
    pub replay_allowed: bool,
}

/// Emitted when the skip-unchanged policy decides not to render.
#[derive(Clone, Copy, Debug)]
pub struct FrameSkippedEvent {
    /// Id of the last rendered frame, which stays current.
    pub frame_id: FrameId,
}

/// Emitted for every draw call.
#[derive(Clone, Copy, Debug)]
pub struct FlushEvent {
    /// Frame the draw belongs to.
    pub frame_id: FrameId,
    /// Batch ordinal within the frame.
    pub batch: u32,
    /// Why the batch was closed.
    pub reason: FlushReason,
    /// Vertices uploaded.
    pub vertices: u32,
    /// Indices drawn.
    pub indices: u32,
    /// Texture bound for the draw.
    pub texture: Option<TextureId>,
    /// Blend mode of the draw.
    pub blend: BlendMode,
    /// Target drawn into.
    pub target: RenderTarget,
}

/// Emitted when a subtree's previous draw range is replayed.
#[derive(Clone, Copy, Debug)]
pub struct ReplayEvent {
    /// Frame the replay happens in.
    pub frame_id: FrameId,
    /// Slot index of the replayed node.
    pub node_index: u32,
    /// Number of recorded batches the range touched.
    pub batches: u32,
    /// Vertices re-appended.
    pub vertices: u32,
}

/// Per-frame counters emitted after the final flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameSummary {
    /// Frame id.
    pub frame_id: FrameId,
    /// Draw calls issued.
    pub draw_calls: u32,
    /// Vertices submitted across all draw calls.
    pub batched_vertices: u32,
    /// Nodes visited by the traversal (a replayed subtree counts once).
    pub nodes_traversed: u32,
    /// Subtree replays performed.
    pub cache_replays: u32,
    /// Vertices copied from the previous frame by replays.
    pub replayed_vertices: u32,
}

/// A node recorded as changed at the start of a frame.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct NodeChange {
    /// Slot index of the node.
    pub node_index: u32,
    /// Ancestors newly stamped by the change walk.
    pub ancestors_stamped: u32,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the render loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a rendered frame starts.
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        _ = e;
    }

    /// Called when a frame is skipped.
    fn on_frame_skipped(&mut self, e: &FrameSkippedEvent) {
        _ = e;
    }

    /// Called for every draw call.
    fn on_flush(&mut self, e: &FlushEvent) {
        _ = e;
    }

    /// Called for every subtree replay.
    fn on_replay(&mut self, e: &ReplayEvent) {
        _ = e;
    }

    /// Called with the per-frame summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }

    /// Called with the nodes marked changed this frame (requires
    /// `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_node_changes(&mut self, frame_id: FrameId, changes: &[NodeChange]) {
        _ = (frame_id, changes);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Returns `true` if events reach a sink.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        #[cfg(feature = "trace")]
        {
            self.sink.is_some()
        }
        #[cfg(not(feature = "trace"))]
        {
            false
        }
    }

    /// Emits a [`FrameBeginEvent`].
    #[inline]
    pub fn frame_begin(&mut self, e: &FrameBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FrameSkippedEvent`].
    #[inline]
    pub fn frame_skipped(&mut self, e: &FrameSkippedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_skipped(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FlushEvent`].
    #[inline]
    pub fn flush(&mut self, e: &FlushEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_flush(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`ReplayEvent`].
    #[inline]
    pub fn replay(&mut self, e: &ReplayEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_replay(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FrameSummary`].
    #[inline]
    pub fn frame_summary(&mut self, s: &FrameSummary) {
        #[cfg(feature = "trace")]
        if let Some(sink) = &mut self.sink {
            sink.on_frame_summary(s);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = s;
        }
    }

    /// Emits node changes (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn node_changes(&mut self, frame_id: FrameId, changes: &[NodeChange]) {
        if let Some(s) = &mut self.sink {
            s.on_node_changes(frame_id, changes);
        }
    }
}

#[cfg(all(test, feature = "trace"))]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        begins: u32,
        flushes: u32,
    }

    impl TraceSink for Counting {
        fn on_frame_begin(&mut self, _: &FrameBeginEvent) {
            self.begins += 1;
        }

        fn on_flush(&mut self, _: &FlushEvent) {
            self.flushes += 1;
        }
    }

    #[test]
    fn tracer_dispatches_to_sink() {
        let mut sink = Counting::default();
        {
            let mut tracer = Tracer::new(&mut sink);
            assert!(tracer.is_active());
            tracer.frame_begin(&FrameBeginEvent {
                frame_id: 1,
                changed_nodes: 0,
                replay_allowed: false,
            });
            tracer.flush(&FlushEvent {
                frame_id: 1,
                batch: 0,
                reason: FlushReason::FrameEnd,
                vertices: 4,
                indices: 6,
                texture: None,
                blend: BlendMode::Normal,
                target: RenderTarget::Screen,
            });
            tracer.replay(&ReplayEvent {
                frame_id: 1,
                node_index: 0,
                batches: 1,
                vertices: 4,
            });
        }
        assert_eq!(sink.begins, 1);
        assert_eq!(sink.flushes, 1);
    }

    #[test]
    fn none_tracer_is_inactive() {
        let mut tracer = Tracer::none();
        assert!(!tracer.is_active());
        tracer.frame_summary(&FrameSummary::default());
    }
}
