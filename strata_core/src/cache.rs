// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame ids, per-node frame stamps, batch tokens and the replay rule.
//!
//! Each node carries three frame stamps:
//!
//! - `self_or_ancestor_changed`: the last frame in which the node itself (or,
//!   as propagated during traversal, one of its ancestors) changed.
//! - `subtree_changed`: the last frame in which anything below the node
//!   changed.
//! - `last_drawn`: the last frame in which the node's draw range was
//!   recorded, or [`UNCACHEABLE`].
//!
//! A node whose stamps are all clear of the current frame, and which was
//! drawn in the immediately preceding rendered frame, can have the draw range
//! recorded between its [`BatchToken`]s replayed instead of being traversed.
//!
//! Frame ids count *rendered* frames only. A frame skipped because nothing
//! changed does not advance the id, so "drawn in frame `id - 1`" keeps
//! meaning "drawn in the previous rendered frame".

use crate::node::{INVALID, NodeId, NodeStore};

/// Identifies one rendered frame.
pub type FrameId = u64;

/// `last_drawn` sentinel for nodes that must not be replayed: never drawn,
/// or excluded from the cache.
pub const UNCACHEABLE: FrameId = FrameId::MAX;

/// A position in a frame's batch sequence.
///
/// `batch` is the number of batches opened so far in the frame; `vertex` and
/// `index` are offsets into the frame's recorded vertex and index streams.
/// Tokens captured in one frame are only meaningful against that frame's
/// record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BatchToken {
    /// Frame the token was captured in.
    pub frame: FrameId,
    /// Batches opened before this position.
    pub batch: u32,
    /// Vertex offset within the frame record.
    pub vertex: u32,
    /// Index offset within the frame record.
    pub index: u32,
}

impl BatchToken {
    /// Creates a token.
    #[must_use]
    pub const fn new(frame: FrameId, batch: u32, vertex: u32, index: u32) -> Self {
        Self {
            frame,
            batch,
            vertex,
            index,
        }
    }
}

/// Per-node cache bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameStamps {
    /// Last frame the node or an ancestor changed.
    pub self_or_ancestor_changed: FrameId,
    /// Last frame something in the node's subtree changed.
    pub subtree_changed: FrameId,
    /// Last frame the node's draw range was recorded, or [`UNCACHEABLE`].
    pub last_drawn: FrameId,
    /// Start of the node's draw range in frame `last_drawn`.
    pub push_token: BatchToken,
    /// End of the node's draw range in frame `last_drawn`.
    pub pop_token: BatchToken,
}

impl Default for FrameStamps {
    fn default() -> Self {
        Self {
            self_or_ancestor_changed: 0,
            subtree_changed: 0,
            last_drawn: UNCACHEABLE,
            push_token: BatchToken::default(),
            pop_token: BatchToken::default(),
        }
    }
}

impl FrameStamps {
    /// Returns `true` if the node must be traversed in `frame`.
    #[must_use]
    pub fn requires_redraw(&self, frame: FrameId) -> bool {
        self.self_or_ancestor_changed == frame || self.subtree_changed == frame
    }

    /// Returns `true` if the node's previous draw range may be replayed in
    /// `frame`. `replay_allowed` is the frame-wide switch (off on the first
    /// frame, after a purge, or with caching disabled).
    #[must_use]
    pub fn can_replay(&self, frame: FrameId, replay_allowed: bool) -> bool {
        replay_allowed
            && !self.requires_redraw(frame)
            && self.last_drawn != UNCACHEABLE
            && self.last_drawn.wrapping_add(1) == frame
    }
}

impl NodeStore {
    /// Records that `id` changed in `frame`.
    ///
    /// Stamps `self_or_ancestor_changed` on the node, then walks up its
    /// ancestors (a mask walks to the node it masks) stamping
    /// `subtree_changed`. The walk stops at the first ancestor already
    /// stamped for `frame`, since everything above it was stamped by the
    /// same walk earlier.
    ///
    /// A masked owner also gets `self_or_ancestor_changed`: its clip is the
    /// mask's bounds, so its whole subtree must be drawn again.
    ///
    /// Returns the number of ancestors newly stamped.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn mark_changed(&mut self, id: NodeId, frame: FrameId) -> usize {
        self.validate(id);
        self.mark_changed_at(id.idx, frame)
    }

    /// [`mark_changed`](Self::mark_changed) by raw slot index.
    pub fn mark_changed_at(&mut self, idx: u32, frame: FrameId) -> usize {
        self.stamps[idx as usize].self_or_ancestor_changed = frame;
        let mut stamped = 0;
        let mut from = idx;
        let mut n = self.owner_at(idx);
        while n != INVALID {
            let via_mask = self.parent[from as usize] == INVALID;
            let s = &mut self.stamps[n as usize];
            if via_mask {
                s.self_or_ancestor_changed = frame;
            }
            if s.subtree_changed == frame {
                break;
            }
            s.subtree_changed = frame;
            stamped += 1;
            from = n;
            n = self.owner_at(n);
        }
        stamped
    }

    /// Returns `true` if `id` changed, or something below it changed, in
    /// `frame`.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn requires_redraw(&self, id: NodeId, frame: FrameId) -> bool {
        self.validate(id);
        self.stamps[id.idx as usize].requires_redraw(frame)
    }

    /// Forbids replaying `id` and every ancestor until they are drawn fresh
    /// again.
    ///
    /// Called during traversal by nodes whose content cannot be cached; an
    /// ancestor's recorded range would contain the stale content.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn exclude_from_cache(&mut self, id: NodeId) {
        self.validate(id);
        self.exclude_from_cache_at(id.idx);
    }

    /// [`exclude_from_cache`](Self::exclude_from_cache) by raw slot index.
    pub fn exclude_from_cache_at(&mut self, idx: u32) {
        let mut n = idx;
        while n != INVALID {
            self.stamps[n as usize].last_drawn = UNCACHEABLE;
            n = self.owner_at(n);
        }
    }

    /// Returns the frame stamps of a node.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn stamps(&self, id: NodeId) -> FrameStamps {
        self.validate(id);
        self.stamps[id.idx as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root ── a ── b ─┬─ c
    ///                 └─ d
    fn chain() -> (NodeStore, [NodeId; 5]) {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let a = store.create_container();
        let b = store.create_container();
        let c = store.create_container();
        let d = store.create_container();
        store.add_child(root, a).unwrap();
        store.add_child(a, b).unwrap();
        store.add_child(b, c).unwrap();
        store.add_child(b, d).unwrap();
        (store, [root, a, b, c, d])
    }

    #[test]
    fn mark_changed_stamps_ancestors() {
        let (mut store, [root, a, b, c, d]) = chain();
        assert_eq!(store.mark_changed(c, 7), 3);
        assert_eq!(store.stamps(c).self_or_ancestor_changed, 7);
        for n in [b, a, root] {
            assert_eq!(store.stamps(n).subtree_changed, 7, "{n:?}");
            assert!(store.requires_redraw(n, 7));
        }
        assert!(!store.requires_redraw(d, 7));
    }

    #[test]
    fn mark_changed_is_idempotent() {
        let (mut store, [root, a, b, c, _]) = chain();
        assert_eq!(store.mark_changed(c, 3), 3);
        let once: [FrameStamps; 4] = [root, a, b, c].map(|n| store.stamps(n));
        assert_eq!(store.mark_changed(c, 3), 0);
        let twice: [FrameStamps; 4] = [root, a, b, c].map(|n| store.stamps(n));
        assert_eq!(once, twice);
    }

    #[test]
    fn sibling_walk_terminates_early() {
        let (mut store, [.., c, d]) = chain();
        assert_eq!(store.mark_changed(c, 4), 3);
        // b was stamped by c's walk, so d's walk stops immediately.
        assert_eq!(store.mark_changed(d, 4), 0);
        assert_eq!(store.stamps(d).self_or_ancestor_changed, 4);
    }

    #[test]
    fn new_frame_walks_again() {
        let (mut store, [.., c, _]) = chain();
        let _ = store.mark_changed(c, 1);
        assert_eq!(store.mark_changed(c, 2), 3);
    }

    #[test]
    fn mask_change_walks_to_masked_owner() {
        let (mut store, [root, a, ..]) = chain();
        let m = store.create_container();
        store.set_mask(a, Some(m)).unwrap();
        assert_eq!(store.mark_changed(m, 9), 2);
        assert_eq!(store.stamps(a).subtree_changed, 9);
        assert_eq!(store.stamps(root).subtree_changed, 9);
        assert_eq!(store.stamps(a).self_or_ancestor_changed, 9);
        assert_ne!(store.stamps(root).self_or_ancestor_changed, 9);
    }

    #[test]
    fn change_inside_mask_redraws_owner() {
        let (mut store, [_, a, b, ..]) = chain();
        let m = store.create_container();
        let inner = store.create_container();
        store.add_child(m, inner).unwrap();
        store.set_mask(a, Some(m)).unwrap();
        // b's walk already stamped the owner's chain this frame.
        let _ = store.mark_changed(b, 5);
        assert_ne!(store.stamps(a).self_or_ancestor_changed, 5);
        assert_eq!(store.mark_changed(inner, 5), 1);
        assert_eq!(store.stamps(a).self_or_ancestor_changed, 5);
    }

    #[test]
    fn exclude_walks_to_root() {
        let (mut store, [root, a, b, c, d]) = chain();
        for n in [root, a, b, c, d] {
            store.stamps_at_mut(n.index()).last_drawn = 5;
        }
        store.exclude_from_cache(c);
        for n in [root, a, b, c] {
            assert_eq!(store.stamps(n).last_drawn, UNCACHEABLE, "{n:?}");
        }
        assert_eq!(store.stamps(d).last_drawn, 5);
    }

    #[test]
    fn replay_rule() {
        let drawn = FrameStamps {
            last_drawn: 4,
            ..FrameStamps::default()
        };
        assert!(drawn.can_replay(5, true));
        assert!(!drawn.can_replay(5, false), "frame-wide switch");
        assert!(!drawn.can_replay(6, true), "not drawn in previous frame");

        let changed = FrameStamps {
            self_or_ancestor_changed: 5,
            ..drawn
        };
        assert!(!changed.can_replay(5, true));
        let below = FrameStamps {
            subtree_changed: 5,
            ..drawn
        };
        assert!(!below.can_replay(5, true));

        assert!(!FrameStamps::default().can_replay(0, true), "never drawn");
    }
}
