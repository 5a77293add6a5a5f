// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Draw-call batching.
//!
//! The [`Batcher`] appends leaf geometry to the open batch as long as the
//! incoming [`BatchSignature`] and [`BatchState`] match and the vertex limit
//! is not exceeded; anything else closes the batch with one draw call.
//!
//! Every batch a frame produces is kept in a frame record: the transformed
//! vertices, batch-local indices, the signature and state of each batch, and
//! one segment per piece of geometry appended. The open batch is simply the
//! record's last entry. A [`BatchToken`] is an absolute position in that
//! record, so replaying a cached subtree means walking the segments in the
//! token range of the previous frame's record and appending each one exactly
//! as fresh geometry would be, merging with neighbours where the signatures
//! and the vertex limit allow.

use alloc::vec::Vec;

use kurbo::{Affine, Point, Rect};
use strata_core::blend::{BlendFactors, BlendMode};
use strata_core::cache::{BatchToken, FrameId};
use strata_core::node::{Geometry, MAX_VERTICES, RenderTarget, TextureId, Vertex};
use strata_core::state::RenderState;
use strata_core::trace::{FlushEvent, FlushReason, Tracer};

use crate::backend::GpuBackend;

/// The properties that must match for geometry to share a draw call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchSignature {
    /// Texture bound for the draw.
    pub texture: Option<TextureId>,
    /// Whether vertex colors (or a sub-unit alpha) modulate the output.
    pub tinted: bool,
    /// Whether colors carry premultiplied alpha.
    pub premultiplied_alpha: bool,
    /// Resolved blend mode.
    pub blend: BlendMode,
}

impl BatchSignature {
    /// Computes the signature of `geometry` drawn with `alpha` and `blend`.
    #[must_use]
    pub fn for_geometry(geometry: &Geometry, alpha: f32, blend: BlendMode) -> Self {
        Self {
            texture: geometry.texture,
            tinted: alpha < 1.0 || geometry.is_tinted(),
            premultiplied_alpha: geometry.premultiplied_alpha,
            blend,
        }
    }

    /// Returns the GPU blend factors for this signature.
    #[must_use]
    pub const fn blend_factors(&self) -> BlendFactors {
        self.blend.factors(self.premultiplied_alpha)
    }
}

/// GPU state outside the signature that a batch is drawn with.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BatchState {
    /// Scissor rect in render-target space.
    pub clip: Option<Rect>,
    /// Target the batch draws into.
    pub target: RenderTarget,
}

impl From<&RenderState> for BatchState {
    fn from(state: &RenderState) -> Self {
        Self {
            clip: state.clip,
            target: state.target,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct BatchRecord {
    signature: BatchSignature,
    state: BatchState,
    vertex_start: u32,
    index_start: u32,
    vertex_count: u32,
    index_count: u32,
}

/// One appended piece of geometry, in frame-absolute offsets.
#[derive(Clone, Copy, Debug)]
struct Segment {
    batch: u32,
    vertex_start: u32,
    index_start: u32,
    vertex_count: u32,
    index_count: u32,
}

/// Everything one frame submitted. Indices are local to their batch.
#[derive(Clone, Debug, Default)]
struct FrameRecord {
    frame: FrameId,
    vertices: Vec<Vertex>,
    indices: Vec<u16>,
    batches: Vec<BatchRecord>,
    segments: Vec<Segment>,
}

impl FrameRecord {
    fn clear(&mut self, frame: FrameId) {
        self.frame = frame;
        self.vertices.clear();
        self.indices.clear();
        self.batches.clear();
        self.segments.clear();
    }

    fn release(&mut self) {
        self.vertices = Vec::new();
        self.indices = Vec::new();
        self.batches = Vec::new();
        self.segments = Vec::new();
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct AppliedState {
    target: Option<RenderTarget>,
    scissor: Option<Option<Rect>>,
    factors: Option<BlendFactors>,
}

/// Accumulates geometry into batches and issues one draw call per batch.
#[derive(Clone, Debug)]
pub struct Batcher {
    max_vertices: u32,
    current: FrameRecord,
    previous: FrameRecord,
    open: bool,
    applied: AppliedState,
    draw_calls: u32,
    batched_vertices: u32,
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new(len_u32(MAX_VERTICES), 0)
    }
}

impl Batcher {
    /// Creates a batcher.
    ///
    /// `max_vertices` is clamped into `4..=MAX_VERTICES`.
    #[must_use]
    pub fn new(max_vertices: u32, initial_capacity: usize) -> Self {
        let mut current = FrameRecord::default();
        current.vertices.reserve(initial_capacity);
        current.indices.reserve(initial_capacity + initial_capacity / 2);
        Self {
            max_vertices: max_vertices.clamp(4, len_u32(MAX_VERTICES)),
            current,
            previous: FrameRecord::default(),
            open: false,
            applied: AppliedState::default(),
            draw_calls: 0,
            batched_vertices: 0,
        }
    }

    /// Returns the per-batch vertex limit.
    #[must_use]
    pub fn max_vertices(&self) -> u32 {
        self.max_vertices
    }

    /// Returns the frame currently being recorded.
    #[must_use]
    pub fn frame(&self) -> FrameId {
        self.current.frame
    }

    /// Returns the draw calls issued in the current frame.
    #[must_use]
    pub fn draw_calls(&self) -> u32 {
        self.draw_calls
    }

    /// Returns the vertices submitted in the current frame.
    #[must_use]
    pub fn batched_vertices(&self) -> u32 {
        self.batched_vertices
    }

    /// Returns `true` if a batch is open (and possibly non-empty).
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Returns a token for the current position in the frame's batch
    /// sequence.
    #[must_use]
    pub fn position(&self) -> BatchToken {
        BatchToken::new(
            self.current.frame,
            len_u32(self.current.batches.len()),
            len_u32(self.current.vertices.len()),
            len_u32(self.current.indices.len()),
        )
    }

    /// Starts recording `frame`.
    ///
    /// The finished frame's record becomes the replay source; tokens captured
    /// in any earlier frame no longer resolve.
    pub fn next_frame(&mut self, frame: FrameId) {
        self.open = false;
        core::mem::swap(&mut self.current, &mut self.previous);
        self.current.clear(frame);
        self.applied = AppliedState::default();
        self.draw_calls = 0;
        self.batched_vertices = 0;
    }

    /// Appends `geometry`, transformed by `state.matrix` and faded by
    /// `state.alpha`, flushing first if it cannot join the open batch.
    pub fn add_geometry(
        &mut self,
        backend: &mut dyn GpuBackend,
        tracer: &mut Tracer<'_>,
        geometry: &Geometry,
        state: &RenderState,
    ) {
        let signature = BatchSignature::for_geometry(geometry, state.alpha, state.blend);
        let base = self.begin(
            backend,
            tracer,
            signature,
            BatchState::from(state),
            len_u32(geometry.vertices.len()),
        );
        let alpha = state.alpha;
        let premultiplied = geometry.premultiplied_alpha;
        self.current.vertices.extend(geometry.vertices.iter().map(|v| {
            let mut out = *v;
            out.position = transform_position(state.matrix, v.position);
            if premultiplied {
                out.color = v.color.map(|c| c * alpha);
            } else {
                out.color[3] *= alpha;
            }
            out
        }));
        self.current
            .indices
            .extend(geometry.indices.iter().map(|&i| to_index(base + u32::from(i))));
        self.grow_open(geometry.vertices.len(), geometry.indices.len());
    }

    /// Re-emits the draw range between two tokens captured in the previous
    /// frame.
    ///
    /// Each recorded segment in the range is appended on its own with its
    /// batch's signature and state, so batches merge and split exactly as
    /// they would when re-adding the same geometry. Returns the number of
    /// recorded batches touched and vertices copied, or `None` if the tokens
    /// do not belong to the previous frame's record.
    pub fn replay(
        &mut self,
        backend: &mut dyn GpuBackend,
        tracer: &mut Tracer<'_>,
        push: BatchToken,
        pop: BatchToken,
    ) -> Option<(u32, u32)> {
        let prev = &self.previous;
        if push.frame != prev.frame
            || pop.frame != prev.frame
            || push.index > pop.index
            || push.vertex > pop.vertex
            || pop.index as usize > prev.indices.len()
            || pop.vertex as usize > prev.vertices.len()
        {
            return None;
        }

        let mut batches = 0;
        let mut vertices = 0;
        let mut last_batch = None;
        let first = prev
            .segments
            .partition_point(|seg| seg.vertex_start < push.vertex);
        for s in first..self.previous.segments.len() {
            let seg = self.previous.segments[s];
            if seg.vertex_start + seg.vertex_count > pop.vertex {
                break;
            }
            let record = self.previous.batches[seg.batch as usize];
            let base = self.begin(
                backend,
                tracer,
                record.signature,
                record.state,
                seg.vertex_count,
            );
            // Recorded indices are relative to the batch start; rebase them
            // onto the segment, then onto the open batch.
            let skipped = seg.vertex_start - record.vertex_start;
            let (v0, v1) = (seg.vertex_start, seg.vertex_start + seg.vertex_count);
            let (i0, i1) = (seg.index_start, seg.index_start + seg.index_count);
            let prev = &self.previous;
            self.current
                .vertices
                .extend_from_slice(&prev.vertices[v0 as usize..v1 as usize]);
            self.current.indices.extend(
                prev.indices[i0 as usize..i1 as usize]
                    .iter()
                    .map(|&i| to_index(base + (u32::from(i) - skipped))),
            );
            self.grow_open(seg.vertex_count as usize, seg.index_count as usize);
            if last_batch != Some(seg.batch) {
                last_batch = Some(seg.batch);
                batches += 1;
            }
            vertices += seg.vertex_count;
        }
        Some((batches, vertices))
    }

    /// Closes the open batch, issuing one draw call if it holds geometry.
    pub fn flush(
        &mut self,
        backend: &mut dyn GpuBackend,
        tracer: &mut Tracer<'_>,
        reason: FlushReason,
    ) {
        if !self.open {
            return;
        }
        self.open = false;
        let ordinal = self.current.batches.len() - 1;
        let record = self.current.batches[ordinal];
        if record.index_count == 0 {
            return;
        }

        if self.applied.target != Some(record.state.target) {
            backend.set_render_target(record.state.target);
            self.applied.target = Some(record.state.target);
        }
        if self.applied.scissor != Some(record.state.clip) {
            backend.set_scissor_rect(record.state.clip);
            self.applied.scissor = Some(record.state.clip);
        }
        let factors = record.signature.blend_factors();
        if self.applied.factors != Some(factors) {
            backend.set_blend_factors(factors);
            self.applied.factors = Some(factors);
        }

        let vs = record.vertex_start as usize;
        let is = record.index_start as usize;
        backend.upload_vertex_data(&self.current.vertices[vs..vs + record.vertex_count as usize]);
        backend.upload_index_data(&self.current.indices[is..is + record.index_count as usize]);
        backend.draw_indexed(&record.signature, 0, record.index_count);

        self.draw_calls += 1;
        self.batched_vertices += record.vertex_count;
        tracer.flush(&FlushEvent {
            frame_id: self.current.frame,
            batch: len_u32(ordinal),
            reason,
            vertices: record.vertex_count,
            indices: record.index_count,
            texture: record.signature.texture,
            blend: record.signature.blend,
            target: record.state.target,
        });
    }

    /// Releases the recorded history and the accumulation buffers.
    ///
    /// Tokens from the previous frame stop resolving, so replay is not
    /// possible until a frame has been recorded again.
    pub fn purge(&mut self) {
        let retained = self.current.vertices.capacity() + self.previous.vertices.capacity();
        self.open = false;
        self.current.release();
        self.previous.release();
        self.current.frame = FrameId::MAX;
        self.previous.frame = FrameId::MAX;
        log::debug!("batcher purged, released capacity for {retained} vertices");
    }

    /// Makes sure an open batch can take `vertices` more vertices with the
    /// given signature and state, flushing if needed. Returns the open
    /// batch's current vertex count, the base for incoming indices.
    fn begin(
        &mut self,
        backend: &mut dyn GpuBackend,
        tracer: &mut Tracer<'_>,
        signature: BatchSignature,
        state: BatchState,
        vertices: u32,
    ) -> u32 {
        if self.open {
            let open = self.current.batches[self.current.batches.len() - 1];
            let reason = if open.signature != signature {
                Some(FlushReason::Signature)
            } else if open.state != state {
                Some(FlushReason::State)
            } else if open.vertex_count + vertices > self.max_vertices {
                Some(FlushReason::Capacity)
            } else {
                None
            };
            match reason {
                None => return open.vertex_count,
                Some(reason) => self.flush(backend, tracer, reason),
            }
        }
        if vertices > self.max_vertices {
            log::warn!(
                "geometry with {vertices} vertices exceeds the batch limit of {}, drawing it alone",
                self.max_vertices
            );
        }
        self.current.batches.push(BatchRecord {
            signature,
            state,
            vertex_start: len_u32(self.current.vertices.len()),
            index_start: len_u32(self.current.indices.len()),
            vertex_count: 0,
            index_count: 0,
        });
        self.open = true;
        0
    }

    /// Accounts the geometry just appended to the streams to the open batch
    /// as one segment.
    fn grow_open(&mut self, vertices: usize, indices: usize) {
        let n = self.current.batches.len();
        let open = &mut self.current.batches[n - 1];
        open.vertex_count += len_u32(vertices);
        open.index_count += len_u32(indices);
        let (vertex_count, index_count) = (len_u32(vertices), len_u32(indices));
        self.current.segments.push(Segment {
            batch: len_u32(n - 1),
            vertex_start: len_u32(self.current.vertices.len()) - vertex_count,
            index_start: len_u32(self.current.indices.len()) - index_count,
            vertex_count,
            index_count,
        });
    }
}

#[expect(clippy::cast_possible_truncation, reason = "narrowing to GPU precision")]
fn transform_position(matrix: Affine, p: [f32; 2]) -> [f32; 2] {
    let q = matrix * Point::new(f64::from(p[0]), f64::from(p[1]));
    [q.x as f32, q.y as f32]
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "batches hold at most MAX_VERTICES vertices"
)]
fn to_index(i: u32) -> u16 {
    i as u16
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "frame records stay far below u32::MAX entries"
)]
fn len_u32(n: usize) -> u32 {
    n as u32
}
