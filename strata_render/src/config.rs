// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipeline configuration.

/// Tunables for a [`Pipeline`](crate::Pipeline).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Vertices one batch may hold before it is flushed. Clamped into
    /// `4..=65535`; the upper bound is what 16-bit indices can address.
    pub max_batch_vertices: u32,
    /// Whether unchanged subtrees may be replayed from the previous frame.
    pub cache_enabled: bool,
    /// Whether [`render`](crate::Pipeline::render) returns early when nothing
    /// changed since the last rendered frame.
    pub skip_unchanged_frames: bool,
    /// Vertices to reserve up front in the batch accumulator.
    pub initial_vertex_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineConfig {
    /// Largest value accepted for [`max_batch_vertices`](Self::max_batch_vertices).
    pub const MAX_BATCH_VERTICES: u32 = 65_535;

    /// Returns the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_batch_vertices: Self::MAX_BATCH_VERTICES,
            cache_enabled: true,
            skip_unchanged_frames: false,
            initial_vertex_capacity: 1024,
        }
    }

    /// Sets the per-batch vertex limit, clamped into `4..=65535`.
    #[must_use]
    pub const fn with_max_batch_vertices(mut self, max: u32) -> Self {
        self.max_batch_vertices = if max < 4 {
            4
        } else if max > Self::MAX_BATCH_VERTICES {
            Self::MAX_BATCH_VERTICES
        } else {
            max
        };
        self
    }

    /// Enables or disables subtree replay.
    #[must_use]
    pub const fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Enables or disables skipping frames with no recorded changes.
    #[must_use]
    pub const fn with_skip_unchanged_frames(mut self, skip: bool) -> Self {
        self.skip_unchanged_frames = skip;
        self
    }

    /// Sets the initial accumulator capacity in vertices.
    #[must_use]
    pub const fn with_initial_vertex_capacity(mut self, vertices: usize) -> Self {
        self.initial_vertex_capacity = vertices;
        self
    }
}
