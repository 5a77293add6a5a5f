// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GPU submission contract.
//!
//! The render pipeline never talks to a graphics API directly. Every batch
//! it closes becomes a short sequence of calls on a [`GpuBackend`]:
//!
//! ```text
//! set_render_target   (only when the target changed)
//! set_scissor_rect    (only when the scissor changed)
//! set_blend_factors   (only when the factors changed)
//! upload_vertex_data
//! upload_index_data
//! draw_indexed
//! ```
//!
//! A backend binds the signature's texture and picks a shader variant
//! (tinted or not, premultiplied or not) in `draw_indexed`. Vertex data is
//! `bytemuck::Pod`, so uploads can cast the slice to bytes directly.
//!
//! [`RecordingBackend`] is a test double that records every call.

use alloc::vec::Vec;

use kurbo::Rect;
use strata_core::blend::BlendFactors;
use strata_core::node::{RenderTarget, Vertex};

use crate::batch::BatchSignature;

/// Receives the draw calls of a frame.
pub trait GpuBackend {
    /// Redirects subsequent draws to `target`.
    fn set_render_target(&mut self, target: RenderTarget);

    /// Restricts subsequent draws to `rect` (render-target space), or lifts
    /// the restriction for `None`.
    fn set_scissor_rect(&mut self, rect: Option<Rect>);

    /// Sets the blend equation factors for subsequent draws.
    fn set_blend_factors(&mut self, factors: BlendFactors);

    /// Replaces the vertex buffer contents.
    fn upload_vertex_data(&mut self, vertices: &[Vertex]);

    /// Replaces the index buffer contents.
    fn upload_index_data(&mut self, indices: &[u16]);

    /// Draws `count` indices starting at `offset` from the uploaded buffers.
    fn draw_indexed(&mut self, signature: &BatchSignature, offset: u32, count: u32);

    /// Releases buffers the backend holds. Only called between frames.
    fn purge(&mut self) {}
}

/// A single recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    /// [`GpuBackend::set_render_target`].
    SetRenderTarget(RenderTarget),
    /// [`GpuBackend::set_scissor_rect`].
    SetScissorRect(Option<Rect>),
    /// [`GpuBackend::set_blend_factors`].
    SetBlendFactors(BlendFactors),
    /// [`GpuBackend::upload_vertex_data`].
    UploadVertices(Vec<Vertex>),
    /// [`GpuBackend::upload_index_data`].
    UploadIndices(Vec<u16>),
    /// [`GpuBackend::draw_indexed`].
    DrawIndexed {
        /// Signature of the batch.
        signature: BatchSignature,
        /// First index.
        offset: u32,
        /// Number of indices.
        count: u32,
    },
    /// [`GpuBackend::purge`].
    Purge,
}

/// A fully resolved draw: the state in effect plus the data it consumed.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDraw {
    /// Signature passed to `draw_indexed`.
    pub signature: BatchSignature,
    /// Render target in effect.
    pub target: RenderTarget,
    /// Scissor in effect.
    pub scissor: Option<Rect>,
    /// Blend factors in effect.
    pub blend_factors: Option<BlendFactors>,
    /// Vertices uploaded for the draw.
    pub vertices: Vec<Vertex>,
    /// Indices drawn.
    pub indices: Vec<u16>,
}

/// A [`GpuBackend`] that records every call, for tests and debugging.
#[derive(Clone, Debug, Default)]
pub struct RecordingBackend {
    calls: Vec<BackendCall>,
}

impl RecordingBackend {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every call in order.
    #[must_use]
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Forgets recorded calls.
    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Returns the number of `draw_indexed` calls.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, BackendCall::DrawIndexed { .. }))
            .count()
    }

    /// Replays the recorded calls and returns each draw with the state and
    /// data it used.
    #[must_use]
    pub fn draws(&self) -> Vec<RecordedDraw> {
        let mut target = RenderTarget::Screen;
        let mut scissor = None;
        let mut factors = None;
        let mut vertices: &[Vertex] = &[];
        let mut indices: &[u16] = &[];
        let mut out = Vec::new();
        for call in &self.calls {
            match call {
                BackendCall::SetRenderTarget(t) => target = *t,
                BackendCall::SetScissorRect(r) => scissor = *r,
                BackendCall::SetBlendFactors(f) => factors = Some(*f),
                BackendCall::UploadVertices(v) => vertices = v,
                BackendCall::UploadIndices(i) => indices = i,
                BackendCall::DrawIndexed {
                    signature,
                    offset,
                    count,
                } => {
                    let start = (*offset as usize).min(indices.len());
                    let end = (start + *count as usize).min(indices.len());
                    out.push(RecordedDraw {
                        signature: *signature,
                        target,
                        scissor,
                        blend_factors: factors,
                        vertices: vertices.to_vec(),
                        indices: indices[start..end].to_vec(),
                    });
                }
                BackendCall::Purge => {}
            }
        }
        out
    }
}

impl GpuBackend for RecordingBackend {
    fn set_render_target(&mut self, target: RenderTarget) {
        self.calls.push(BackendCall::SetRenderTarget(target));
    }

    fn set_scissor_rect(&mut self, rect: Option<Rect>) {
        self.calls.push(BackendCall::SetScissorRect(rect));
    }

    fn set_blend_factors(&mut self, factors: BlendFactors) {
        self.calls.push(BackendCall::SetBlendFactors(factors));
    }

    fn upload_vertex_data(&mut self, vertices: &[Vertex]) {
        self.calls.push(BackendCall::UploadVertices(vertices.to_vec()));
    }

    fn upload_index_data(&mut self, indices: &[u16]) {
        self.calls.push(BackendCall::UploadIndices(indices.to_vec()));
    }

    fn draw_indexed(&mut self, signature: &BatchSignature, offset: u32, count: u32) {
        self.calls.push(BackendCall::DrawIndexed {
            signature: *signature,
            offset,
            count,
        });
    }

    fn purge(&mut self) {
        self.calls.push(BackendCall::Purge);
    }
}
