// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON frame-summary export.
//!
//! [`JsonSummarySink`] collects one record per rendered frame (the
//! [`FrameSummary`] plus a count of flushes by reason) and
//! [`write_json`](JsonSummarySink::write_json) writes them as a JSON array,
//! handy for comparing batching behavior across runs.

use std::io::{self, Write};

use serde_json::{Value, json};

use strata_core::trace::{FlushEvent, FlushReason, FrameSkippedEvent, FrameSummary, TraceSink};

const REASONS: [FlushReason; 5] = [
    FlushReason::Signature,
    FlushReason::State,
    FlushReason::Capacity,
    FlushReason::FrameEnd,
    FlushReason::Explicit,
];

#[derive(Clone, Debug)]
struct FrameRecord {
    summary: FrameSummary,
    flushes: [u32; REASONS.len()],
}

/// Collects per-frame summaries for JSON export.
#[derive(Clone, Debug, Default)]
pub struct JsonSummarySink {
    frames: Vec<FrameRecord>,
    pending: [u32; REASONS.len()],
    skipped: u64,
}

impl JsonSummarySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected summaries in frame order.
    pub fn summaries(&self) -> impl Iterator<Item = &FrameSummary> {
        self.frames.iter().map(|f| &f.summary)
    }

    /// Returns how many frames were skipped as unchanged.
    #[must_use]
    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }

    /// Builds the JSON document.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.frames
                .iter()
                .map(|f| {
                    let s = &f.summary;
                    let flushes: serde_json::Map<String, Value> = REASONS
                        .iter()
                        .zip(f.flushes)
                        .filter(|(_, n)| *n > 0)
                        .map(|(r, n)| (r.as_str().to_owned(), json!(n)))
                        .collect();
                    json!({
                        "frame_id": s.frame_id,
                        "draw_calls": s.draw_calls,
                        "batched_vertices": s.batched_vertices,
                        "nodes_traversed": s.nodes_traversed,
                        "cache_replays": s.cache_replays,
                        "replayed_vertices": s.replayed_vertices,
                        "flushes": flushes,
                    })
                })
                .collect(),
        )
    }

    /// Writes the collected frames as a pretty-printed JSON array.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from `writer`.
    pub fn write_json(&self, writer: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, &self.to_value()).map_err(io::Error::other)?;
        writeln!(writer)
    }
}

fn reason_slot(reason: FlushReason) -> usize {
    match reason {
        FlushReason::Signature => 0,
        FlushReason::State => 1,
        FlushReason::Capacity => 2,
        FlushReason::FrameEnd => 3,
        FlushReason::Explicit => 4,
    }
}

impl TraceSink for JsonSummarySink {
    fn on_frame_skipped(&mut self, _: &FrameSkippedEvent) {
        self.skipped += 1;
    }

    fn on_flush(&mut self, e: &FlushEvent) {
        self.pending[reason_slot(e.reason)] += 1;
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.frames.push(FrameRecord {
            summary: *s,
            flushes: core::mem::take(&mut self.pending),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::blend::BlendMode;
    use strata_core::node::RenderTarget;

    fn flush(reason: FlushReason) -> FlushEvent {
        FlushEvent {
            frame_id: 1,
            batch: 0,
            reason,
            vertices: 4,
            indices: 6,
            texture: None,
            blend: BlendMode::Normal,
            target: RenderTarget::Screen,
        }
    }

    #[test]
    fn frames_export_as_array() {
        let mut sink = JsonSummarySink::new();
        sink.on_flush(&flush(FlushReason::Signature));
        sink.on_flush(&flush(FlushReason::FrameEnd));
        sink.on_frame_summary(&FrameSummary {
            frame_id: 1,
            draw_calls: 2,
            batched_vertices: 8,
            nodes_traversed: 3,
            ..FrameSummary::default()
        });
        sink.on_frame_skipped(&FrameSkippedEvent { frame_id: 1 });
        sink.on_frame_summary(&FrameSummary {
            frame_id: 2,
            cache_replays: 1,
            ..FrameSummary::default()
        });

        let value = sink.to_value();
        let frames = value.as_array().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["draw_calls"], 2);
        assert_eq!(frames[0]["flushes"]["signature"], 1);
        assert_eq!(frames[0]["flushes"]["frame-end"], 1);
        assert!(frames[1]["flushes"].as_object().unwrap().is_empty());
        assert_eq!(frames[1]["cache_replays"], 1);
        assert_eq!(sink.skipped_frames(), 1);
    }

    #[test]
    fn written_json_parses_back() {
        let mut sink = JsonSummarySink::new();
        sink.on_frame_summary(&FrameSummary {
            frame_id: 9,
            ..FrameSummary::default()
        });
        let mut out = Vec::new();
        sink.write_json(&mut out).unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, sink.to_value());
        assert_eq!(parsed[0]["frame_id"], 9);
    }
}
