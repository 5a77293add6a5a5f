// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays node storage with allocation, topology, and property management.

use alloc::vec::Vec;

use kurbo::{Affine, Rect, Vec2};
use understory_dirty::{Channel, CycleHandling, DirtyTracker};

use super::geometry::Geometry;
use super::id::{INVALID, NodeId};
use super::resource::{FilterId, TextureId};
use super::traverse::Children;
use crate::blend::BlendMode;
use crate::cache::FrameStamps;
use crate::dirty;
use crate::error::{CycleError, InvalidGeometryError};
use crate::transform::{Spatial3d, Transform};

/// What a node can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Owns an ordered list of children; draws nothing itself.
    Container,
    /// Owns [`Geometry`]; cannot have children.
    Leaf,
}

/// Per-node boolean flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeFlags {
    /// Whether the node (and its subtree) is drawn.
    pub visible: bool,
    /// Whether the node takes part in hit testing.
    pub touchable: bool,
    /// Whether the node's draw range may be replayed from the previous
    /// frame. Clearing this excludes the node and its ancestors from replay
    /// on every frame it is drawn.
    pub cacheable: bool,
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self {
            visible: true,
            touchable: true,
            cacheable: true,
        }
    }
}

/// Struct-of-arrays storage for all nodes.
///
/// Nodes are addressed by [`NodeId`] handles. Internally, each node occupies
/// a slot in parallel arrays. Destroyed nodes are recycled via a free list,
/// and generation counters prevent stale handle access.
///
/// Every mutation records the node in a change journal. The render pipeline
/// drains it with [`take_changes`](Self::take_changes) once per rendered frame.
#[derive(Debug)]
pub struct NodeStore {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,
    pub(crate) kind: Vec<NodeKind>,

    // -- Local properties --
    pub(crate) transform: Vec<Transform>,
    pub(crate) opacity: Vec<f32>,
    pub(crate) blend: Vec<BlendMode>,
    pub(crate) flags: Vec<NodeFlags>,
    pub(crate) clip: Vec<Option<Rect>>,
    pub(crate) filter: Vec<Option<FilterId>>,
    pub(crate) geometry: Vec<Option<Geometry>>,

    // -- Masking (mask[n] = m  <=>  maskee[m] = n) --
    pub(crate) mask: Vec<u32>,
    pub(crate) maskee: Vec<u32>,

    // -- Frame cache --
    pub(crate) stamps: Vec<FrameStamps>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) alive: Vec<bool>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,

    // -- Change journal --
    pub(crate) dirty: DirtyTracker<u32>,
    pub(crate) pending: bool,
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore {
    /// Creates an empty node store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            kind: Vec::new(),
            transform: Vec::new(),
            opacity: Vec::new(),
            blend: Vec::new(),
            flags: Vec::new(),
            clip: Vec::new(),
            filter: Vec::new(),
            geometry: Vec::new(),
            mask: Vec::new(),
            maskee: Vec::new(),
            stamps: Vec::new(),
            generation: Vec::new(),
            alive: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            pending: false,
        }
    }

    // -- Allocation API --

    /// Creates a new, detached container.
    pub fn create_container(&mut self) -> NodeId {
        self.alloc(NodeKind::Container, None)
    }

    /// Creates a new, detached leaf drawing `geometry`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidGeometryError`] if the geometry cannot be drawn; no
    /// node is created in that case.
    pub fn create_leaf(&mut self, geometry: Geometry) -> Result<NodeId, InvalidGeometryError> {
        geometry.validate()?;
        Ok(self.alloc(NodeKind::Leaf, Some(geometry)))
    }

    /// Destroys a node and its entire subtree, freeing their slots.
    ///
    /// The node is detached from its parent first. A node used as a mask is
    /// detached from its masked owner. Masks referenced by destroyed nodes
    /// are released but not destroyed.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn destroy_node(&mut self, id: NodeId) {
        self.validate(id);
        let idx = id.idx;
        let p = self.parent[idx as usize];
        if p != INVALID {
            self.unlink_from_parent(idx);
            self.record(p, dirty::TOPOLOGY);
        }
        let owner = self.maskee[idx as usize];
        if owner != INVALID {
            self.mask[owner as usize] = INVALID;
            self.maskee[idx as usize] = INVALID;
            self.record(owner, dirty::MASKING);
        }

        let mut stack = alloc::vec![idx];
        while let Some(n) = stack.pop() {
            let mut c = self.first_child[n as usize];
            while c != INVALID {
                stack.push(c);
                c = self.next_sibling[c as usize];
            }
            self.free_slot(n);
        }
    }

    /// Returns whether the given handle refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        id.idx < self.len
            && self.alive[id.idx as usize]
            && self.generation[id.idx as usize] == id.generation
    }

    /// Returns the number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.len as usize - self.free_list.len()
    }

    // -- Topology API --

    /// Appends `child` as the last child of `parent`.
    ///
    /// If `child` already has a parent it is removed from it first, so
    /// re-parenting (and moving to the end of the same parent) is a single
    /// call.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] if `parent` is `child` or one of its
    /// descendants. The tree is left unmodified.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale, if `parent` is a leaf, or if `child`
    /// is in use as a mask.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), CycleError> {
        self.check_insert(parent, child)?;
        self.detach(child.idx);
        self.link_last(parent.idx, child.idx);
        self.record(child.idx, dirty::TOPOLOGY);
        self.record(parent.idx, dirty::TOPOLOGY);
        Ok(())
    }

    /// Inserts `child` into `parent`'s child list at `index`.
    ///
    /// Index `0` is drawn first (at the back). If `child` already belongs to
    /// `parent`, `index` refers to the list with `child` removed.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] if `parent` is `child` or one of its
    /// descendants. The tree is left unmodified.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`add_child`](Self::add_child),
    /// or if `index` is greater than the resulting child count.
    pub fn insert_child_at(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: usize,
    ) -> Result<(), CycleError> {
        self.check_insert(parent, child)?;
        let p = parent.idx;
        let c = child.idx;
        let count = self.children_of(p).filter(|&k| k != c).count();
        assert!(
            index <= count,
            "child index {index} out of range (child count {count})"
        );

        self.detach(c);
        let before = self.children_of(p).nth(index).unwrap_or(INVALID);
        if before == INVALID {
            self.link_last(p, c);
        } else {
            self.link_before(c, before);
        }
        self.record(c, dirty::TOPOLOGY);
        self.record(p, dirty::TOPOLOGY);
        Ok(())
    }

    /// Removes `child` from its parent, if it has one.
    ///
    /// With `dispose` set, the node and its subtree are destroyed as by
    /// [`destroy_node`](Self::destroy_node).
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn remove_from_parent(&mut self, child: NodeId, dispose: bool) {
        self.validate(child);
        if dispose {
            self.destroy_node(child);
        } else if self.parent[child.idx as usize] != INVALID {
            self.detach(child.idx);
            self.record(child.idx, dirty::TOPOLOGY);
        }
    }

    /// Returns the parent of a node, if any.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.validate(id);
        self.handle(self.parent[id.idx as usize])
    }

    /// Returns an iterator over the direct children of a node, back to front.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Children<'_> {
        self.validate(id);
        Children::new(self, self.first_child[id.idx as usize])
    }

    /// Returns the number of direct children.
    #[must_use]
    pub fn child_count(&self, id: NodeId) -> usize {
        self.validate(id);
        self.children_of(id.idx).count()
    }

    /// Returns the child at `index`, if any.
    #[must_use]
    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.validate(id);
        self.children_of(id.idx)
            .nth(index)
            .and_then(|c| self.handle(c))
    }

    /// Returns the position of `child` in `parent`'s child list.
    #[must_use]
    pub fn child_index(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.validate(parent);
        self.validate(child);
        self.children_of(parent.idx).position(|c| c == child.idx)
    }

    /// Returns `true` if `node` is `ancestor` or lies in its subtree.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.validate(ancestor);
        self.validate(node);
        let mut n = node.idx;
        while n != INVALID {
            if n == ancestor.idx {
                return true;
            }
            n = self.parent[n as usize];
        }
        false
    }

    /// Returns the kind of a node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.validate(id);
        self.kind[id.idx as usize]
    }

    // -- Transform API --

    /// Returns the decomposed transform of a node.
    #[must_use]
    pub fn transform(&self, id: NodeId) -> &Transform {
        self.validate(id);
        &self.transform[id.idx as usize]
    }

    /// Returns the matrix mapping the node's local space into its parent's.
    #[must_use]
    pub fn local_matrix(&self, id: NodeId) -> Affine {
        self.validate(id);
        self.transform[id.idx as usize].matrix()
    }

    /// Sets the position in parent space.
    pub fn set_position(&mut self, id: NodeId, position: impl Into<Vec2>) {
        self.validate(id);
        let changed = self.transform[id.idx as usize].set_position(position.into());
        self.mark_if(changed, id.idx, dirty::TRANSFORM);
    }

    /// Sets the pivot (rotation and scale origin) in local space.
    pub fn set_pivot(&mut self, id: NodeId, pivot: impl Into<Vec2>) {
        self.validate(id);
        let changed = self.transform[id.idx as usize].set_pivot(pivot.into());
        self.mark_if(changed, id.idx, dirty::TRANSFORM);
    }

    /// Sets the scale factors.
    pub fn set_scale(&mut self, id: NodeId, scale: impl Into<Vec2>) {
        self.validate(id);
        let changed = self.transform[id.idx as usize].set_scale(scale.into());
        self.mark_if(changed, id.idx, dirty::TRANSFORM);
    }

    /// Sets the skew angles in radians.
    pub fn set_skew(&mut self, id: NodeId, skew: impl Into<Vec2>) {
        self.validate(id);
        let changed = self.transform[id.idx as usize].set_skew(skew.into());
        self.mark_if(changed, id.idx, dirty::TRANSFORM);
    }

    /// Sets the rotation in radians, normalized into (−π, π].
    pub fn set_rotation(&mut self, id: NodeId, radians: f64) {
        self.validate(id);
        let changed = self.transform[id.idx as usize].set_rotation(radians);
        self.mark_if(changed, id.idx, dirty::TRANSFORM);
    }

    /// Sets the 3D part of the transform.
    pub fn set_transform_3d(&mut self, id: NodeId, spatial: Spatial3d) {
        self.validate(id);
        let changed = self.transform[id.idx as usize].set_spatial(spatial);
        self.mark_if(changed, id.idx, dirty::TRANSFORM);
    }

    // -- Appearance API --

    /// Returns the node's own opacity.
    #[must_use]
    pub fn opacity(&self, id: NodeId) -> f32 {
        self.validate(id);
        self.opacity[id.idx as usize]
    }

    /// Sets the opacity, clamped to `[0, 1]`. NaN is treated as `0`.
    pub fn set_opacity(&mut self, id: NodeId, opacity: f32) {
        self.validate(id);
        let opacity = if opacity.is_nan() {
            0.0
        } else {
            opacity.clamp(0.0, 1.0)
        };
        let slot = &mut self.opacity[id.idx as usize];
        let changed = *slot != opacity;
        *slot = opacity;
        self.mark_if(changed, id.idx, dirty::APPEARANCE);
    }

    /// Returns the node's own blend mode.
    #[must_use]
    pub fn blend_mode(&self, id: NodeId) -> BlendMode {
        self.validate(id);
        self.blend[id.idx as usize]
    }

    /// Sets the blend mode.
    pub fn set_blend_mode(&mut self, id: NodeId, mode: BlendMode) {
        self.validate(id);
        let changed = self.blend[id.idx as usize] != mode;
        self.blend[id.idx as usize] = mode;
        self.mark_if(changed, id.idx, dirty::APPEARANCE);
    }

    /// Returns the flags of a node.
    #[must_use]
    pub fn flags(&self, id: NodeId) -> NodeFlags {
        self.validate(id);
        self.flags[id.idx as usize]
    }

    /// Shows or hides the node and its subtree.
    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        self.update_flags(id, |f| f.visible = visible);
    }

    /// Includes or excludes the node from hit testing.
    pub fn set_touchable(&mut self, id: NodeId, touchable: bool) {
        self.update_flags(id, |f| f.touchable = touchable);
    }

    /// Allows or forbids replaying the node's draw range from the previous
    /// frame.
    pub fn set_cacheable(&mut self, id: NodeId, cacheable: bool) {
        self.update_flags(id, |f| f.cacheable = cacheable);
    }

    /// Returns `true` if the node contributes pixels: it is visible, not fully
    /// transparent, has non-zero scale on both axes, and is not used as a
    /// mask.
    ///
    /// Visibility of ancestors is not considered.
    #[must_use]
    pub fn has_visible_area(&self, id: NodeId) -> bool {
        self.validate(id);
        self.has_visible_area_at(id.idx)
    }

    // -- Masking API --

    /// Returns the node's mask, if any.
    #[must_use]
    pub fn mask(&self, id: NodeId) -> Option<NodeId> {
        self.validate(id);
        self.handle(self.mask[id.idx as usize])
    }

    /// Returns the node that `id` masks, if it is in use as a mask.
    #[must_use]
    pub fn masked_owner(&self, id: NodeId) -> Option<NodeId> {
        self.validate(id);
        self.handle(self.maskee[id.idx as usize])
    }

    /// Sets or clears the node's mask.
    ///
    /// The mask lives in `id`'s local space and is never drawn itself. A
    /// node masks at most one other node: assigning a mask that already
    /// masks another node moves it.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] if `mask` is `id` or one of `id`'s ancestors.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale or if `mask` has a parent.
    pub fn set_mask(&mut self, id: NodeId, mask: Option<NodeId>) -> Result<(), CycleError> {
        self.validate(id);
        let n = id.idx;
        let new = match mask {
            Some(m) => {
                self.validate(m);
                assert!(
                    self.parent[m.idx as usize] == INVALID,
                    "mask node cannot be part of the tree"
                );
                if self.is_owner_chain_member(m.idx, n) {
                    return Err(CycleError {
                        child: m,
                        parent: id,
                    });
                }
                m.idx
            }
            None => INVALID,
        };
        let old = self.mask[n as usize];
        if old == new {
            return Ok(());
        }
        if old != INVALID {
            self.maskee[old as usize] = INVALID;
            self.record(old, dirty::MASKING);
        }
        if new != INVALID {
            let prev_owner = self.maskee[new as usize];
            if prev_owner != INVALID {
                self.mask[prev_owner as usize] = INVALID;
                self.record(prev_owner, dirty::MASKING);
            }
            self.maskee[new as usize] = n;
        }
        self.mask[n as usize] = new;
        self.record(n, dirty::MASKING);
        Ok(())
    }

    /// Returns the node's filter, if any.
    #[must_use]
    pub fn filter(&self, id: NodeId) -> Option<FilterId> {
        self.validate(id);
        self.filter[id.idx as usize]
    }

    /// Sets or clears the node's filter. A filtered subtree is drawn into the
    /// filter's render target.
    pub fn set_filter(&mut self, id: NodeId, filter: Option<FilterId>) {
        self.validate(id);
        let changed = self.filter[id.idx as usize] != filter;
        self.filter[id.idx as usize] = filter;
        self.mark_if(changed, id.idx, dirty::MASKING);
    }

    /// Returns the node's clip rect in local space, if any.
    #[must_use]
    pub fn clip_rect(&self, id: NodeId) -> Option<Rect> {
        self.validate(id);
        self.clip[id.idx as usize]
    }

    /// Sets or clears the clip rect, given in the node's local space.
    pub fn set_clip_rect(&mut self, id: NodeId, clip: Option<Rect>) {
        self.validate(id);
        let changed = self.clip[id.idx as usize] != clip;
        self.clip[id.idx as usize] = clip;
        self.mark_if(changed, id.idx, dirty::MASKING);
    }

    // -- Content API --

    /// Returns a leaf's geometry, or `None` for containers.
    #[must_use]
    pub fn geometry(&self, id: NodeId) -> Option<&Geometry> {
        self.validate(id);
        self.geometry[id.idx as usize].as_ref()
    }

    /// Replaces a leaf's geometry.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidGeometryError`] if the geometry cannot be drawn; the
    /// previous geometry is kept.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the node is a container.
    pub fn set_geometry(&mut self, id: NodeId, geometry: Geometry) -> Result<(), InvalidGeometryError> {
        self.validate(id);
        self.assert_leaf(id.idx);
        geometry.validate()?;
        self.geometry[id.idx as usize] = Some(geometry);
        self.record(id.idx, dirty::CONTENT);
        Ok(())
    }

    /// Sets the texture a leaf samples.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the node is a container.
    pub fn set_texture(&mut self, id: NodeId, texture: Option<TextureId>) {
        self.validate(id);
        self.assert_leaf(id.idx);
        if let Some(g) = self.geometry[id.idx as usize].as_mut() {
            if g.texture != texture {
                g.texture = texture;
                self.record(id.idx, dirty::CONTENT);
            }
        }
    }

    /// Records that content the store cannot observe (for example a texture
    /// rendered elsewhere) changed, so the node is not replayed stale.
    pub fn request_redraw(&mut self, id: NodeId) {
        self.validate(id);
        self.record(id.idx, dirty::CONTENT);
    }

    // -- Change journal --

    /// Drains the change journal and returns every live node mutated since
    /// the previous call, in ascending slot order without duplicates.
    pub fn take_changes(&mut self) -> Vec<NodeId> {
        self.pending = false;
        let mut changed: Vec<u32> = Vec::new();
        for channel in dirty::ALL {
            changed.extend(self.dirty.drain(channel).deterministic().run());
        }
        changed.sort_unstable();
        changed.dedup();
        changed
            .into_iter()
            .filter_map(|idx| self.live_handle(idx))
            .collect()
    }

    /// Returns `true` if anything was recorded since the last
    /// [`take_changes`](Self::take_changes).
    ///
    /// This can report `true` when every recorded node has since been
    /// destroyed; `take_changes` then returns an empty list.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.pending
    }

    // -- Raw-index accessors for the render traversal --
    //
    // These accept raw slot indices (as obtained from `NodeId::index` or from
    // the sibling links) rather than handles, skipping generation validation.

    /// Returns the handle for the live node at slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range or the slot is free.
    #[must_use]
    pub fn id_at(&self, idx: u32) -> NodeId {
        self.assert_slot(idx);
        assert!(self.alive[idx as usize], "slot {idx} is not alive");
        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Returns the first child slot of `idx`, or [`INVALID`].
    #[must_use]
    pub fn first_child_at(&self, idx: u32) -> u32 {
        self.assert_slot(idx);
        self.first_child[idx as usize]
    }

    /// Returns the next sibling slot of `idx`, or [`INVALID`].
    #[must_use]
    pub fn next_sibling_at(&self, idx: u32) -> u32 {
        self.assert_slot(idx);
        self.next_sibling[idx as usize]
    }

    /// Returns the kind at slot `idx`.
    #[must_use]
    pub fn kind_at(&self, idx: u32) -> NodeKind {
        self.assert_slot(idx);
        self.kind[idx as usize]
    }

    /// Returns the local matrix at slot `idx`.
    #[must_use]
    pub fn local_matrix_at(&self, idx: u32) -> Affine {
        self.assert_slot(idx);
        self.transform[idx as usize].matrix()
    }

    /// Returns the opacity at slot `idx`.
    #[must_use]
    pub fn opacity_at(&self, idx: u32) -> f32 {
        self.assert_slot(idx);
        self.opacity[idx as usize]
    }

    /// Returns the blend mode at slot `idx`.
    #[must_use]
    pub fn blend_mode_at(&self, idx: u32) -> BlendMode {
        self.assert_slot(idx);
        self.blend[idx as usize]
    }

    /// Returns the flags at slot `idx`.
    #[must_use]
    pub fn flags_at(&self, idx: u32) -> NodeFlags {
        self.assert_slot(idx);
        self.flags[idx as usize]
    }

    /// Returns the clip rect at slot `idx`.
    #[must_use]
    pub fn clip_rect_at(&self, idx: u32) -> Option<Rect> {
        self.assert_slot(idx);
        self.clip[idx as usize]
    }

    /// Returns the filter at slot `idx`.
    #[must_use]
    pub fn filter_at(&self, idx: u32) -> Option<FilterId> {
        self.assert_slot(idx);
        self.filter[idx as usize]
    }

    /// Returns the mask slot of `idx`, or [`INVALID`].
    #[must_use]
    pub fn mask_at(&self, idx: u32) -> u32 {
        self.assert_slot(idx);
        self.mask[idx as usize]
    }

    /// Returns `true` if the node at slot `idx` is in use as a mask.
    #[must_use]
    pub fn is_mask_at(&self, idx: u32) -> bool {
        self.assert_slot(idx);
        self.maskee[idx as usize] != INVALID
    }

    /// Returns the geometry at slot `idx`.
    #[must_use]
    pub fn geometry_at(&self, idx: u32) -> Option<&Geometry> {
        self.assert_slot(idx);
        self.geometry[idx as usize].as_ref()
    }

    /// Returns whether the node at slot `idx` contributes pixels.
    #[must_use]
    pub fn has_visible_area_at(&self, idx: u32) -> bool {
        self.assert_slot(idx);
        let i = idx as usize;
        self.flags[i].visible
            && self.opacity[i] != 0.0
            && !self.transform[i].has_zero_scale()
            && self.maskee[i] == INVALID
    }

    /// Returns the frame stamps at slot `idx`.
    #[must_use]
    pub fn stamps_at(&self, idx: u32) -> &FrameStamps {
        self.assert_slot(idx);
        &self.stamps[idx as usize]
    }

    /// Returns the frame stamps at slot `idx` for writing.
    pub fn stamps_at_mut(&mut self, idx: u32) -> &mut FrameStamps {
        self.assert_slot(idx);
        &mut self.stamps[idx as usize]
    }

    // -- Internal helpers --

    fn alloc(&mut self, kind: NodeKind, geometry: Option<Geometry>) -> NodeId {
        let idx = if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.kind[i] = kind;
            self.transform[i] = Transform::new();
            self.opacity[i] = 1.0;
            self.blend[i] = BlendMode::Auto;
            self.flags[i] = NodeFlags::default();
            self.clip[i] = None;
            self.filter[i] = None;
            self.geometry[i] = geometry;
            self.mask[i] = INVALID;
            self.maskee[i] = INVALID;
            self.stamps[i] = FrameStamps::default();
            self.alive[i] = true;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.kind.push(kind);
            self.transform.push(Transform::new());
            self.opacity.push(1.0);
            self.blend.push(BlendMode::Auto);
            self.flags.push(NodeFlags::default());
            self.clip.push(None);
            self.filter.push(None);
            self.geometry.push(geometry);
            self.mask.push(INVALID);
            self.maskee.push(INVALID);
            self.stamps.push(FrameStamps::default());
            self.generation.push(0);
            self.alive.push(true);
            idx
        };
        self.record(idx, dirty::TOPOLOGY);
        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Releases a single slot. Links into the slot must already be gone.
    fn free_slot(&mut self, idx: u32) {
        let i = idx as usize;
        let m = self.mask[i];
        if m != INVALID {
            self.maskee[m as usize] = INVALID;
            self.record(m, dirty::MASKING);
        }
        self.dirty.remove_key(idx);
        self.geometry[i] = None;
        self.alive[i] = false;
        // Bump generation so old handles immediately fail validation.
        self.generation[i] = self.generation[i].wrapping_add(1);
        self.free_list.push(idx);
    }

    /// Validates an insertion of `child` under `parent` without mutating.
    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<(), CycleError> {
        self.validate(parent);
        self.validate(child);
        assert!(
            self.kind[parent.idx as usize] == NodeKind::Container,
            "cannot add children to a leaf"
        );
        assert!(
            self.maskee[child.idx as usize] == INVALID,
            "a mask node cannot be added to the tree"
        );
        if self.is_owner_chain_member(child.idx, parent.idx) {
            return Err(CycleError { child, parent });
        }
        Ok(())
    }

    /// Returns `true` if `candidate` is `start` or reachable from it by
    /// following parent (or masked-owner) links.
    fn is_owner_chain_member(&self, candidate: u32, start: u32) -> bool {
        let mut n = start;
        while n != INVALID {
            if n == candidate {
                return true;
            }
            n = self.owner_at(n);
        }
        false
    }

    /// The node whose subtree contains `idx`: its parent, or for a mask
    /// node its masked owner.
    pub(crate) fn owner_at(&self, idx: u32) -> u32 {
        let p = self.parent[idx as usize];
        if p != INVALID {
            p
        } else {
            self.maskee[idx as usize]
        }
    }

    /// Unlinks `idx` from its parent (if any) and marks the old parent.
    fn detach(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        if p != INVALID {
            self.unlink_from_parent(idx);
            self.record(p, dirty::TOPOLOGY);
        }
    }

    fn link_last(&mut self, p: u32, c: u32) {
        self.parent[c as usize] = p;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;

        if self.first_child[p as usize] == INVALID {
            self.first_child[p as usize] = c;
        } else {
            let mut last = self.first_child[p as usize];
            while self.next_sibling[last as usize] != INVALID {
                last = self.next_sibling[last as usize];
            }
            self.next_sibling[last as usize] = c;
            self.prev_sibling[c as usize] = last;
        }
    }

    fn link_before(&mut self, c: u32, s: u32) {
        let p = self.parent[s as usize];
        self.parent[c as usize] = p;
        self.next_sibling[c as usize] = s;
        self.prev_sibling[c as usize] = self.prev_sibling[s as usize];

        if self.prev_sibling[s as usize] != INVALID {
            self.next_sibling[self.prev_sibling[s as usize] as usize] = c;
        } else {
            self.first_child[p as usize] = c;
        }
        self.prev_sibling[s as usize] = c;
    }

    /// Removes `idx` from its parent's child list without touching the journal.
    fn unlink_from_parent(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let prev = self.prev_sibling[idx as usize];
        let next = self.next_sibling[idx as usize];

        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            self.first_child[p as usize] = next;
        }

        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }

        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;
    }

    pub(crate) fn children_of(&self, idx: u32) -> impl Iterator<Item = u32> + '_ {
        let mut c = self.first_child[idx as usize];
        core::iter::from_fn(move || {
            if c == INVALID {
                return None;
            }
            let cur = c;
            c = self.next_sibling[cur as usize];
            Some(cur)
        })
    }

    fn update_flags(&mut self, id: NodeId, f: impl FnOnce(&mut NodeFlags)) {
        self.validate(id);
        let before = self.flags[id.idx as usize];
        f(&mut self.flags[id.idx as usize]);
        let changed = before != self.flags[id.idx as usize];
        self.mark_if(changed, id.idx, dirty::APPEARANCE);
    }

    fn mark_if(&mut self, changed: bool, idx: u32, channel: Channel) {
        if changed {
            self.record(idx, channel);
        }
    }

    fn record(&mut self, idx: u32, channel: Channel) {
        self.dirty.mark(idx, channel);
        self.pending = true;
    }

    pub(crate) fn handle(&self, idx: u32) -> Option<NodeId> {
        (idx != INVALID).then(|| NodeId {
            idx,
            generation: self.generation[idx as usize],
        })
    }

    fn live_handle(&self, idx: u32) -> Option<NodeId> {
        (idx < self.len && self.alive[idx as usize]).then(|| NodeId {
            idx,
            generation: self.generation[idx as usize],
        })
    }

    fn assert_leaf(&self, idx: u32) {
        assert!(
            self.kind[idx as usize] == NodeKind::Leaf,
            "node is not a leaf"
        );
    }

    fn assert_slot(&self, idx: u32) {
        assert!(
            idx < self.len,
            "slot index {idx} out of range (len {})",
            self.len
        );
    }

    /// Panics if the handle is stale.
    pub(crate) fn validate(&self, id: NodeId) {
        assert!(
            self.is_alive(id),
            "stale NodeId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }
}
