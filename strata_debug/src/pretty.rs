// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr).

use std::io::Write;

use strata_core::cache::FrameId;
use strata_core::node::RenderTarget;
use strata_core::trace::{
    FlushEvent, FrameBeginEvent, FrameSkippedEvent, FrameSummary, NodeChange, ReplayEvent,
    TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    flushes: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("flushes", &self.flushes)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            flushes: true,
        }
    }

    /// Turns per-draw-call lines on or off. Frames with many batches are
    /// easier to read with only the summaries.
    #[must_use]
    pub fn with_flushes(mut self, flushes: bool) -> Self {
        self.flushes = flushes;
        self
    }

    /// Returns the destination.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn target_name(target: RenderTarget) -> String {
    match target {
        RenderTarget::Screen => "screen".into(),
        RenderTarget::Filter(id) => format!("filter#{}", id.0),
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        let replay = if e.replay_allowed { "on" } else { "off" };
        let _ = writeln!(
            self.writer,
            "[frame] frame={} changed={} replay={replay}",
            e.frame_id, e.changed_nodes,
        );
    }

    fn on_frame_skipped(&mut self, e: &FrameSkippedEvent) {
        let _ = writeln!(self.writer, "[skip] unchanged since frame={}", e.frame_id);
    }

    fn on_flush(&mut self, e: &FlushEvent) {
        if !self.flushes {
            return;
        }
        let texture = e
            .texture
            .map_or_else(|| "-".to_owned(), |t| t.0.to_string());
        let _ = writeln!(
            self.writer,
            "[flush] frame={} batch={} reason={} verts={} idx={} tex={texture} blend={:?} target={}",
            e.frame_id,
            e.batch,
            e.reason.as_str(),
            e.vertices,
            e.indices,
            e.blend,
            target_name(e.target),
        );
    }

    fn on_replay(&mut self, e: &ReplayEvent) {
        let _ = writeln!(
            self.writer,
            "[replay] frame={} node={} batches={} verts={}",
            e.frame_id, e.node_index, e.batches, e.vertices,
        );
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let _ = writeln!(
            self.writer,
            "[summary] frame={} draws={} verts={} nodes={} replays={} replayed_verts={}",
            s.frame_id,
            s.draw_calls,
            s.batched_vertices,
            s.nodes_traversed,
            s.cache_replays,
            s.replayed_vertices,
        );
    }

    fn on_node_changes(&mut self, frame_id: FrameId, changes: &[NodeChange]) {
        let walked: u32 = changes.iter().map(|c| c.ancestors_stamped).sum();
        let _ = writeln!(
            self.writer,
            "[changes] frame={frame_id} nodes={} ancestors_stamped={walked}",
            changes.len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::blend::BlendMode;
    use strata_core::node::{FilterId, TextureId};
    use strata_core::trace::FlushReason;

    fn flush() -> FlushEvent {
        FlushEvent {
            frame_id: 3,
            batch: 1,
            reason: FlushReason::Signature,
            vertices: 8,
            indices: 12,
            texture: Some(TextureId(42)),
            blend: BlendMode::Add,
            target: RenderTarget::Filter(FilterId(2)),
        }
    }

    #[test]
    fn pretty_print_flush() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_flush(&flush());
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.starts_with("[flush] frame=3 batch=1"), "got: {output}");
        assert!(output.contains("reason=signature"), "got: {output}");
        assert!(output.contains("tex=42"), "got: {output}");
        assert!(output.contains("target=filter#2"), "got: {output}");
    }

    #[test]
    fn flush_lines_can_be_silenced() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new()).with_flushes(false);
        sink.on_flush(&flush());
        sink.on_frame_summary(&FrameSummary {
            frame_id: 3,
            draw_calls: 2,
            ..FrameSummary::default()
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(!output.contains("[flush]"), "got: {output}");
        assert!(output.contains("[summary] frame=3 draws=2"), "got: {output}");
    }

    #[test]
    fn node_changes_are_totalled() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_node_changes(
            5,
            &[
                NodeChange {
                    node_index: 1,
                    ancestors_stamped: 3,
                },
                NodeChange {
                    node_index: 2,
                    ancestors_stamped: 0,
                },
            ],
        );
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(output, "[changes] frame=5 nodes=2 ancestors_stamped=3\n");
    }
}
