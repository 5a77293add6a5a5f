// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree traversal utilities.

use super::id::{INVALID, NodeId};
use super::store::NodeStore;

/// An iterator over the direct children of a node, in draw order.
///
/// Created by [`NodeStore::children`].
#[derive(Debug)]
pub struct Children<'a> {
    store: &'a NodeStore,
    current: u32,
}

impl<'a> Children<'a> {
    pub(crate) fn new(store: &'a NodeStore, first: u32) -> Self {
        Self {
            store,
            current: first,
        }
    }
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.store.next_sibling[idx as usize];
        Some(NodeId {
            idx,
            generation: self.store.generation[idx as usize],
        })
    }
}

/// An iterator over a node's ancestors, nearest first.
///
/// Mask nodes report their masked owner in place of a parent, so the chain
/// is the one change notifications travel along.
///
/// Created by [`NodeStore::ancestors`].
#[derive(Debug)]
pub struct Ancestors<'a> {
    store: &'a NodeStore,
    current: u32,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.current == INVALID {
            return None;
        }
        self.current = self.store.owner_at(self.current);
        self.store.handle(self.current)
    }
}

impl NodeStore {
    /// Returns an iterator over `id`'s ancestors (or masked owner chain),
    /// nearest first, excluding `id` itself.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        self.validate(id);
        Ancestors {
            store: self,
            current: id.idx,
        }
    }

    /// Returns every node in `root`'s subtree in draw order (depth-first
    /// pre-order), including `root`.
    #[must_use]
    pub fn descendants(&self, root: NodeId) -> alloc::vec::Vec<NodeId> {
        self.validate(root);
        let mut out = alloc::vec::Vec::new();
        let mut stack = alloc::vec![root.idx];
        while let Some(n) = stack.pop() {
            out.push(NodeId {
                idx: n,
                generation: self.generation[n as usize],
            });
            let mark = stack.len();
            let mut c = self.first_child[n as usize];
            while c != INVALID {
                stack.push(c);
                c = self.next_sibling[c as usize];
            }
            // First child must pop first.
            stack[mark..].reverse();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn descendants_are_pre_order() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let a = store.create_container();
        let a1 = store.create_container();
        let b = store.create_container();
        store.add_child(root, a).unwrap();
        store.add_child(a, a1).unwrap();
        store.add_child(root, b).unwrap();
        assert_eq!(store.descendants(root), vec![root, a, a1, b]);
    }

    #[test]
    fn ancestors_follow_mask_owner() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let n = store.create_container();
        let m = store.create_container();
        store.add_child(root, n).unwrap();
        store.set_mask(n, Some(m)).unwrap();
        let chain: Vec<_> = store.ancestors(m).collect();
        assert_eq!(chain, vec![n, root]);
    }
}
