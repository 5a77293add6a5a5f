// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opaque handles to externally managed resources.
//!
//! Textures and filters are created and owned by collaborators outside the
//! render core (asset loaders, filter implementations). The core only
//! compares these handles for batch compatibility and passes them through to
//! the backend.

use core::fmt;

/// An opaque handle to a texture owned by the asset system.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureId(pub u64);

impl fmt::Debug for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextureId({})", self.0)
    }
}

/// An opaque handle to a filter owned by the filter collaborator.
///
/// A filtered node's subtree is drawn into that filter's input target.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterId(pub u32);

impl fmt::Debug for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterId({})", self.0)
    }
}

/// Where batches are drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The frame's back buffer.
    #[default]
    Screen,
    /// The input texture of a filter.
    Filter(FilterId),
}
