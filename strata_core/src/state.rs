// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The render state stack composed during traversal.
//!
//! Each entry is derived only from the entry below it and the local values
//! of the node being entered:
//!
//! | field  | composition                                             |
//! |--------|---------------------------------------------------------|
//! | matrix | `parent.matrix * local`                                 |
//! | alpha  | `parent.alpha * local`, clamped to `[0, 1]`             |
//! | blend  | local mode, or the parent's if local is `Auto`          |
//! | clip   | local clip (mapped to target space) ∩ parent clip       |
//! | target | inherited; replaced when entering a filtered subtree    |

use alloc::vec::Vec;

use kurbo::{Affine, Rect};

use crate::blend::BlendMode;
use crate::error::StackUnderflowError;
use crate::node::RenderTarget;

/// The composed state in effect at one tree depth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderState {
    /// Maps the current node's local space into render-target space.
    pub matrix: Affine,
    /// Product of all alphas down to the current node.
    pub alpha: f32,
    /// Effective blend mode; never [`BlendMode::Auto`].
    pub blend: BlendMode,
    /// Scissor rect in render-target space, if any.
    pub clip: Option<Rect>,
    /// Where geometry is drawn.
    pub target: RenderTarget,
}

impl Default for RenderState {
    fn default() -> Self {
        Self::ROOT
    }
}

impl RenderState {
    /// The state before any node is entered.
    pub const ROOT: Self = Self {
        matrix: Affine::IDENTITY,
        alpha: 1.0,
        blend: BlendMode::Normal,
        clip: None,
        target: RenderTarget::Screen,
    };

    /// Returns `true` if the clip rect has no area, so nothing drawn in this
    /// state can be visible.
    #[must_use]
    pub fn is_clipped_out(&self) -> bool {
        self.clip.is_some_and(|c| c.width() <= 0.0 || c.height() <= 0.0)
    }

    fn compose(&self, matrix: Affine, alpha: f32, blend: BlendMode) -> Self {
        Self {
            matrix: self.matrix * matrix,
            alpha: (self.alpha * alpha).clamp(0.0, 1.0),
            blend: blend.resolve(self.blend),
            clip: self.clip,
            target: self.target,
        }
    }
}

/// Intersects two clip rects. Disjoint rects yield an empty rect at the
/// first one's origin rather than an inverted rect.
fn intersect_clip(a: Rect, b: Rect) -> Rect {
    let r = a.intersect(b);
    if r.x1 < r.x0 || r.y1 < r.y0 {
        Rect::new(a.x0, a.y0, a.x0, a.y0)
    } else {
        r
    }
}

/// Stack of [`RenderState`]s, one per entered node above a fixed base entry.
///
/// The stack is reused across frames; [`reset`](Self::reset) drops every
/// pushed entry but keeps the allocation.
#[derive(Clone, Debug)]
pub struct StateStack {
    entries: Vec<RenderState>,
}

impl Default for StateStack {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStack {
    /// Creates a stack holding only [`RenderState::ROOT`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_base(RenderState::ROOT)
    }

    /// Creates a stack with a custom base entry, for example a projection
    /// matrix or an initial scissor.
    #[must_use]
    pub fn with_base(base: RenderState) -> Self {
        let mut entries = Vec::with_capacity(16);
        entries.push(base);
        Self { entries }
    }

    /// Pushes an entry composed from the current top and the given local
    /// values. `clip` is in the local space of the node being entered.
    pub fn push(&mut self, matrix: Affine, alpha: f32, blend: BlendMode, clip: Option<Rect>) {
        let mut next = self.top().compose(matrix, alpha, blend);
        if let Some(local) = clip {
            let mapped = next.matrix.transform_rect_bbox(local);
            next.clip = Some(match next.clip {
                Some(parent) => intersect_clip(mapped, parent),
                None => mapped,
            });
        }
        self.entries.push(next);
    }

    /// Pops the top entry.
    ///
    /// # Errors
    ///
    /// Returns [`StackUnderflowError`] if nothing was pushed; the base entry
    /// is never removed.
    pub fn pop(&mut self) -> Result<(), StackUnderflowError> {
        if self.entries.len() <= 1 {
            return Err(StackUnderflowError);
        }
        self.entries.pop();
        Ok(())
    }

    /// Returns the current composed entry.
    #[must_use]
    pub fn top(&self) -> &RenderState {
        // The base entry is never popped.
        &self.entries[self.entries.len() - 1]
    }

    /// Recomposes the top entry's matrix, alpha and blend mode from the entry
    /// below it and the given local values, keeping its clip and target.
    ///
    /// Calling it repeatedly with the same values is idempotent. If nothing
    /// has been pushed, an entry is pushed first.
    pub fn set_state(&mut self, matrix: Affine, alpha: f32, blend: BlendMode) {
        if self.entries.len() <= 1 {
            self.push(matrix, alpha, blend, None);
            return;
        }
        let n = self.entries.len();
        let below = self.entries[n - 2];
        let top = &mut self.entries[n - 1];
        let composed = below.compose(matrix, alpha, blend);
        top.matrix = composed.matrix;
        top.alpha = composed.alpha;
        top.blend = composed.blend;
    }

    /// Intersects the top entry's clip with `rect`, given in render-target
    /// space.
    pub fn clip_to(&mut self, rect: Rect) {
        let n = self.entries.len();
        let top = &mut self.entries[n - 1];
        top.clip = Some(match top.clip {
            Some(c) => intersect_clip(rect, c),
            None => rect,
        });
    }

    /// Redirects drawing in the top entry (and everything pushed on it) to
    /// `target`.
    pub fn set_render_target(&mut self, target: RenderTarget) {
        let n = self.entries.len();
        self.entries[n - 1].target = target;
    }

    /// Returns the number of pushed entries above the base.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len() - 1
    }

    /// Drops every pushed entry.
    pub fn reset(&mut self) {
        self.entries.truncate(1);
    }

    /// Releases spare capacity.
    pub fn shrink_to_fit(&mut self) {
        self.entries.shrink_to_fit();
    }
}
