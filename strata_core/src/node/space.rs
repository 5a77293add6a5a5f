// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transform resolution between node coordinate spaces.
//!
//! A node's local matrix maps its local space into its parent's. A mask node
//! has no parent; its local matrix maps into the space of the node it masks,
//! so resolution follows the masked-owner link in that case.
//!
//! `None` as a target means the space the root nodes are positioned in.

use alloc::collections::BTreeSet;

use kurbo::Affine;

use super::id::{INVALID, NodeId};
use super::store::NodeStore;
use crate::error::DisconnectedTreeError;
use crate::transform3d::Transform3d;

impl NodeStore {
    /// Returns the matrix mapping points in `source`'s local space into
    /// `target`'s local space (or world space for `None`).
    ///
    /// Parent and child lookups take an O(1) path; anything else walks both
    /// ancestor chains to their lowest common ancestor. If `target` has a
    /// singular matrix on the path the result is not finite.
    ///
    /// # Errors
    ///
    /// Returns [`DisconnectedTreeError`] if the two nodes have no common
    /// ancestor.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale.
    pub fn matrix_between(
        &self,
        source: NodeId,
        target: Option<NodeId>,
    ) -> Result<Affine, DisconnectedTreeError> {
        self.validate(source);
        let t = match target {
            Some(t) => {
                self.validate(t);
                t.idx
            }
            None => INVALID,
        };
        let s = source.idx;
        if s == t {
            return Ok(Affine::IDENTITY);
        }
        if self.owner_at(s) == t {
            return Ok(self.transform[s as usize].matrix());
        }
        if t != INVALID && self.owner_at(t) == s {
            return Ok(self.transform[t as usize].matrix().inverse());
        }
        self.matrix_via_lca(s, t).ok_or(DisconnectedTreeError {
            source,
            target: target.unwrap_or(source),
        })
    }

    /// The 3D counterpart of [`matrix_between`](Self::matrix_between),
    /// including each node's z offset and x/y rotations.
    ///
    /// # Errors
    ///
    /// Returns [`DisconnectedTreeError`] if the two nodes have no common
    /// ancestor.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale.
    pub fn matrix_between_3d(
        &self,
        source: NodeId,
        target: Option<NodeId>,
    ) -> Result<Transform3d, DisconnectedTreeError> {
        self.validate(source);
        let t = match target {
            Some(t) => {
                self.validate(t);
                t.idx
            }
            None => INVALID,
        };
        let s = source.idx;
        if s == t {
            return Ok(Transform3d::IDENTITY);
        }
        if self.owner_at(s) == t {
            return Ok(self.transform[s as usize].matrix_3d());
        }
        if t != INVALID && self.owner_at(t) == s {
            return Ok(self.transform[t as usize].matrix_3d().inverse());
        }
        let err = DisconnectedTreeError {
            source,
            target: target.unwrap_or(source),
        };
        let lca = self.common_ancestor(s, t).ok_or(err)?;
        let to_lca = |mut n: u32| {
            let mut acc = Transform3d::IDENTITY;
            while n != lca {
                acc = self.transform[n as usize].matrix_3d() * acc;
                n = self.owner_at(n);
            }
            acc
        };
        Ok(to_lca(t).inverse() * to_lca(s))
    }

    /// Returns `true` if the node's own transform has a 3D component.
    ///
    /// Only such nodes (or their descendants) need
    /// [`matrix_between_3d`](Self::matrix_between_3d).
    #[must_use]
    pub fn is_3d(&self, id: NodeId) -> bool {
        self.validate(id);
        self.transform[id.idx as usize].is_3d()
    }

    /// General resolution through the lowest common ancestor, without the
    /// parent/child shortcuts.
    pub(crate) fn matrix_via_lca(&self, s: u32, t: u32) -> Option<Affine> {
        let lca = self.common_ancestor(s, t)?;
        let source_to_lca = self.matrix_to_ancestor(s, lca);
        let target_to_lca = self.matrix_to_ancestor(t, lca);
        Some(target_to_lca.inverse() * source_to_lca)
    }

    /// Composes local matrices from `n` up to (not including) `ancestor`.
    /// `ancestor` may be [`INVALID`] for world space.
    pub(crate) fn matrix_to_ancestor(&self, mut n: u32, ancestor: u32) -> Affine {
        let mut acc = Affine::IDENTITY;
        while n != ancestor {
            acc = self.transform[n as usize].matrix() * acc;
            n = self.owner_at(n);
        }
        acc
    }

    /// Lowest common ancestor of two slots, each counted as its own ancestor.
    /// World space ([`INVALID`]) is a common ancestor of everything.
    fn common_ancestor(&self, a: u32, b: u32) -> Option<u32> {
        if a == INVALID || b == INVALID {
            return Some(INVALID);
        }
        let mut seen = BTreeSet::new();
        let mut n = a;
        while n != INVALID {
            seen.insert(n);
            n = self.owner_at(n);
        }
        let mut n = b;
        while n != INVALID {
            if seen.contains(&n) {
                return Some(n);
            }
            n = self.owner_at(n);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use core::f64::consts::FRAC_PI_3;

    use kurbo::Point;

    use super::*;
    use crate::transform::Spatial3d;

    const EPS: f64 = 1e-9;

    fn approx(a: Affine, b: Affine) -> bool {
        a.as_coeffs()
            .iter()
            .zip(b.as_coeffs().iter())
            .all(|(x, y)| (x - y).abs() < EPS)
    }

    /// root ─┬─ a ── a1 ── a2
    ///       └─ b ── b1
    fn tree() -> (NodeStore, [NodeId; 6]) {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let a = store.create_container();
        let a1 = store.create_container();
        let a2 = store.create_container();
        let b = store.create_container();
        let b1 = store.create_container();
        store.add_child(root, a).unwrap();
        store.add_child(a, a1).unwrap();
        store.add_child(a1, a2).unwrap();
        store.add_child(root, b).unwrap();
        store.add_child(b, b1).unwrap();

        store.set_position(root, (5.0, -3.0));
        store.set_position(a, (10.0, 20.0));
        store.set_rotation(a, FRAC_PI_3);
        store.set_scale(a1, (2.0, 0.5));
        store.set_pivot(a1, (4.0, 4.0));
        store.set_skew(a2, (0.1, -0.2));
        store.set_position(a2, (-7.0, 1.0));
        store.set_position(b, (100.0, 0.0));
        store.set_rotation(b, -1.0);
        store.set_scale(b1, (3.0, 3.0));
        (store, [root, a, a1, a2, b, b1])
    }

    #[test]
    fn same_node_is_identity() {
        let (store, [_, a, ..]) = tree();
        assert_eq!(store.matrix_between(a, Some(a)), Ok(Affine::IDENTITY));
    }

    #[test]
    fn parent_fast_path_is_local_matrix() {
        let (store, [root, a, ..]) = tree();
        assert_eq!(store.matrix_between(a, Some(root)), Ok(store.local_matrix(a)));
        assert_eq!(store.matrix_between(root, None), Ok(store.local_matrix(root)));
    }

    #[test]
    fn round_trip_is_identity() {
        let (store, ids) = tree();
        for &x in &ids {
            for &y in &ids {
                let xy = store.matrix_between(x, Some(y)).unwrap();
                let yx = store.matrix_between(y, Some(x)).unwrap();
                assert!(approx(xy * yx, Affine::IDENTITY), "{x:?} <-> {y:?}");
            }
        }
    }

    #[test]
    fn fast_paths_match_general_walk() {
        let (store, [root, a, a1, a2, b, b1]) = tree();
        for (parent, child) in [(root, a), (a, a1), (a1, a2), (root, b), (b, b1)] {
            let fast = store.matrix_between(child, Some(parent)).unwrap();
            let general = store.matrix_via_lca(child.idx, parent.idx).unwrap();
            assert!(approx(fast, general), "child to parent {child:?}");

            let fast = store.matrix_between(parent, Some(child)).unwrap();
            let general = store.matrix_via_lca(parent.idx, child.idx).unwrap();
            assert!(approx(fast, general), "parent to child {child:?}");
        }
    }

    #[test]
    fn cousins_resolve_through_common_ancestor() {
        let (store, [root, _, _, a2, _, b1]) = tree();
        let p = Point::new(3.0, 4.0);
        let via_root = store.matrix_between(root, Some(b1)).unwrap()
            * (store.matrix_between(a2, Some(root)).unwrap() * p);
        let direct = store.matrix_between(a2, Some(b1)).unwrap() * p;
        assert!((via_root - direct).hypot() < EPS);
    }

    #[test]
    fn world_space_composes_whole_chain() {
        let (store, [root, a, a1, ..]) = tree();
        let expected = store.local_matrix(root) * store.local_matrix(a) * store.local_matrix(a1);
        assert!(approx(store.matrix_between(a1, None).unwrap(), expected));
    }

    #[test]
    fn disconnected_trees_fail() {
        let (mut store, [_, a, ..]) = tree();
        let other = store.create_container();
        let err = store.matrix_between(a, Some(other)).unwrap_err();
        assert_eq!(err, DisconnectedTreeError { source: a, target: other });
    }

    #[test]
    fn mask_lives_in_owner_space() {
        let (mut store, [root, a, ..]) = tree();
        let m = store.create_container();
        store.set_position(m, (1.0, 1.0));
        store.set_mask(a, Some(m)).unwrap();
        let expected = store.local_matrix(a) * store.local_matrix(m);
        assert!(approx(store.matrix_between(m, Some(root)).unwrap(), expected));
    }

    #[test]
    fn flat_tree_3d_matches_2d() {
        let (store, [_, _, _, a2, _, b1]) = tree();
        let m2 = store.matrix_between(a2, Some(b1)).unwrap();
        let m3 = store.matrix_between_3d(a2, Some(b1)).unwrap();
        assert!(approx(m3.to_affine(), m2));
    }

    #[test]
    fn round_trip_3d_with_rotation() {
        let (mut store, [root, a, a1, ..]) = tree();
        store.set_transform_3d(
            a1,
            Spatial3d {
                z: 10.0,
                rotation_y: 0.4,
                ..Spatial3d::default()
            },
        );
        assert!(store.is_3d(a1));
        assert!(!store.is_3d(a));
        let there = store.matrix_between_3d(a1, Some(root)).unwrap();
        let back = store.matrix_between_3d(root, Some(a1)).unwrap();
        assert!((there * back).approx_eq(&Transform3d::IDENTITY, 1e-9));
    }
}
