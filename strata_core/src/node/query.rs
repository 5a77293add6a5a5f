// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounds and hit testing.

use kurbo::{Affine, Point, Rect};

use super::id::{INVALID, NodeId};
use super::store::{NodeKind, NodeStore};
use crate::error::DisconnectedTreeError;

impl NodeStore {
    /// Returns the axis-aligned bounds of `id`'s geometry (its whole subtree
    /// for containers) in `target`'s space, or world space for `None`.
    ///
    /// An empty container reports a zero-size rect at its origin. If the
    /// mapping is singular (for example a zero scale on `target` or an
    /// ancestor between the two), the result is [`Rect::ZERO`].
    ///
    /// # Errors
    ///
    /// Returns [`DisconnectedTreeError`] if the two nodes share no ancestor.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale.
    pub fn bounds(&self, id: NodeId, target: Option<NodeId>) -> Result<Rect, DisconnectedTreeError> {
        let m = self.matrix_between(id, target)?;
        Ok(self.subtree_bounds_at(id.idx, m))
    }

    /// Returns the bounds of the subtree at slot `idx` with its local space
    /// mapped through `matrix`.
    ///
    /// Returns [`Rect::ZERO`] for a non-finite matrix or result.
    #[must_use]
    pub fn subtree_bounds_at(&self, idx: u32, matrix: Affine) -> Rect {
        if !matrix.is_finite() {
            return Rect::ZERO;
        }
        let r = self.bounds_in(idx, matrix).unwrap_or_else(|| {
            let origin = matrix * Point::ORIGIN;
            Rect::from_points(origin, origin)
        });
        if r.is_finite() { r } else { Rect::ZERO }
    }

    /// Returns the top-most visible, touchable leaf under `point`, given in
    /// `id`'s local space.
    ///
    /// Children are tested front to back. Clip rects and masks limit the hit
    /// area the same way they limit drawing. A descendant whose matrix is
    /// singular is never hit. `id`'s own transform does not apply, since
    /// `point` is already in its local space.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn hit_test(&self, id: NodeId, point: Point) -> Option<NodeId> {
        self.validate(id);
        self.hit_at(id.idx, point).and_then(|hit| self.handle(hit))
    }

    fn hit_at(&self, idx: u32, p: Point) -> Option<u32> {
        let i = idx as usize;
        let flags = self.flags[i];
        if !flags.visible || !flags.touchable || self.maskee[i] != INVALID {
            return None;
        }
        if let Some(clip) = self.clip[i] {
            if !clip.contains(p) {
                return None;
            }
        }
        let mask = self.mask[i];
        if mask != INVALID {
            let mask_bounds = self.subtree_bounds_at(mask, self.transform[mask as usize].matrix());
            if !mask_bounds.contains(p) {
                return None;
            }
        }
        match self.kind[i] {
            NodeKind::Leaf => self.geometry[i]
                .as_ref()
                .is_some_and(|g| g.contains(p))
                .then_some(idx),
            NodeKind::Container => {
                let mut children: alloc::vec::Vec<u32> = self.children_of(idx).collect();
                children.reverse();
                children.into_iter().find_map(|c| {
                    let m = self.transform[c as usize].matrix();
                    if m.determinant() == 0.0 {
                        return None;
                    }
                    self.hit_at(c, m.inverse() * p)
                })
            }
        }
    }

    fn bounds_in(&self, idx: u32, matrix: Affine) -> Option<Rect> {
        let i = idx as usize;
        match self.kind[i] {
            NodeKind::Leaf => self.geometry[i].as_ref().map(|g| g.bounds(matrix)),
            NodeKind::Container => self
                .children_of(idx)
                .filter_map(|c| self.bounds_in(c, matrix * self.transform[c as usize].matrix()))
                .reduce(|a, b| a.union(b)),
        }
    }
}
