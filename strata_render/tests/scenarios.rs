// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end frame scenarios: tree mutation, cache replay and batching.

use kurbo::{Affine, Point, Rect};
use strata_core::blend::BlendMode;
use strata_core::cache::UNCACHEABLE;
use strata_core::node::{FilterId, Geometry, NodeId, NodeStore, RenderTarget, TextureId, Vertex};
use strata_core::trace::Tracer;
use strata_render::{Pipeline, PipelineConfig, RecordingBackend, Stage};

fn quad(texture: u64) -> Geometry {
    Geometry::quad(8.0, 8.0, Vertex::WHITE).with_texture(TextureId(texture))
}

fn leaf(store: &mut NodeStore, parent: NodeId, texture: u64) -> NodeId {
    let id = store.create_leaf(quad(texture)).unwrap();
    store.add_child(parent, id).unwrap();
    id
}

fn container(store: &mut NodeStore, parent: NodeId) -> NodeId {
    let id = store.create_container();
    store.add_child(parent, id).unwrap();
    id
}

fn render(p: &mut Pipeline, store: &mut NodeStore, root: NodeId) -> RecordingBackend {
    let mut backend = RecordingBackend::new();
    let drawn = p
        .render(store, root, &mut backend, &mut Tracer::none())
        .unwrap();
    assert!(drawn, "frame was skipped");
    backend
}

fn approx_eq(a: Affine, b: Affine) -> bool {
    a.as_coeffs()
        .iter()
        .zip(b.as_coeffs())
        .all(|(x, y)| (x - y).abs() < 1e-9)
}

/// Three groups of three leaves under a root, textures 1, 2, 1 per group.
/// Returns the store, the root, the groups and the leaves.
fn grid() -> (NodeStore, NodeId, [NodeId; 3], [[NodeId; 3]; 3]) {
    let mut store = NodeStore::new();
    let root = store.create_container();
    let mut groups = [root; 3];
    let mut leaves = [[root; 3]; 3];
    for (g, texture) in [1, 2, 1].into_iter().enumerate() {
        groups[g] = container(&mut store, root);
        store.set_position(groups[g], (0.0, 20.0 * g as f64));
        for l in 0..3 {
            leaves[g][l] = leaf(&mut store, groups[g], texture);
            store.set_position(leaves[g][l], (10.0 * l as f64, 0.0));
        }
    }
    (store, root, groups, leaves)
}

#[test]
fn matrix_round_trip_across_branches() {
    let mut store = NodeStore::new();
    let root = store.create_container();
    let a = container(&mut store, root);
    let b = container(&mut store, a);
    let c = container(&mut store, root);
    let d = container(&mut store, c);
    store.set_position(a, (5.0, -3.0));
    store.set_rotation(a, 0.7);
    store.set_scale(b, (2.0, 0.5));
    store.set_skew(b, (0.1, 0.0));
    store.set_pivot(c, (4.0, 4.0));
    store.set_rotation(c, -1.2);
    store.set_position(d, (1.0, 9.0));

    for (x, y) in [(b, d), (d, b), (a, c), (b, root), (d, a)] {
        let there = store.matrix_between(x, Some(y)).unwrap();
        let back = store.matrix_between(y, Some(x)).unwrap();
        assert!(approx_eq(there * back, Affine::IDENTITY), "{x:?} <-> {y:?}");
    }

    // Child to parent is the child's local matrix, whichever path computes it.
    let fast = store.matrix_between(d, Some(c)).unwrap();
    assert!(approx_eq(fast, store.local_matrix(d)));
    let via_world = store.matrix_between(c, None).unwrap().inverse()
        * store.matrix_between(d, None).unwrap();
    assert!(approx_eq(fast, via_world));
}

#[test]
fn single_change_matches_uncached_render() {
    let (mut cached_store, cached_root, groups, leaves) = grid();
    let (mut plain_store, plain_root, _, plain_leaves) = grid();
    let mut cached = Pipeline::default();
    let mut plain = Pipeline::new(PipelineConfig::new().with_cache_enabled(false));

    render(&mut cached, &mut cached_store, cached_root);
    render(&mut plain, &mut plain_store, plain_root);

    let changed = leaves[1][1];
    cached_store.set_position(changed, (15.0, 3.0));
    plain_store.set_position(plain_leaves[1][1], (15.0, 3.0));

    let from_cache = render(&mut cached, &mut cached_store, cached_root);
    let reference = render(&mut plain, &mut plain_store, plain_root);
    assert_eq!(from_cache.draws(), reference.draws());
    assert_eq!(from_cache.draw_count(), 3);

    let stats = cached.stats();
    // groups 0 and 2, plus the changed leaf's two siblings.
    assert_eq!(stats.cache_replays, 4);
    assert_eq!(plain.stats().cache_replays, 0);
    // root, group 1 and the changed leaf are drawn fresh.
    assert_eq!(stats.nodes_traversed, 3 + 4);

    // Nodes inside replayed subtrees were not visited.
    for g in [0, 2] {
        assert_eq!(cached_store.stamps(groups[g]).last_drawn, 2);
        for l in leaves[g] {
            assert_eq!(cached_store.stamps(l).last_drawn, 1, "{l:?}");
        }
    }
    assert!(cached_store.requires_redraw(groups[1], 2));
    assert!(!cached_store.requires_redraw(groups[0], 2));
}

#[test]
fn unchanged_frames_keep_replaying() {
    let (mut store, root, ..) = grid();
    let mut p = Pipeline::default();
    let first = render(&mut p, &mut store, root);
    for frame in 2..5 {
        let again = render(&mut p, &mut store, root);
        assert_eq!(again.draws(), first.draws(), "frame {frame}");
        // The root and its three groups; the groups replay.
        assert_eq!(p.stats().nodes_traversed, 4);
        assert_eq!(p.stats().cache_replays, 3);
    }
}

#[test]
fn change_after_idle_frames_replays_untouched_groups() {
    let (mut store, root, groups, leaves) = grid();
    let (mut plain_store, plain_root, _, plain_leaves) = grid();
    let mut p = Pipeline::default();
    let mut plain = Pipeline::new(PipelineConfig::new().with_cache_enabled(false));
    for _ in 0..2 {
        render(&mut p, &mut store, root);
        render(&mut plain, &mut plain_store, plain_root);
    }

    store.set_position(leaves[1][1], (15.0, 3.0));
    plain_store.set_position(plain_leaves[1][1], (15.0, 3.0));
    let from_cache = render(&mut p, &mut store, root);
    let reference = render(&mut plain, &mut plain_store, plain_root);
    assert_eq!(from_cache.draws(), reference.draws());

    let stats = p.stats();
    assert_eq!(stats.cache_replays, 2);
    // Root, the three groups and group 1's leaves.
    assert_eq!(stats.nodes_traversed, 7);
    for g in [0, 2] {
        assert_eq!(store.stamps(groups[g]).last_drawn, 3);
    }

    // Group 1's siblings were recorded this time, so they replay next frame.
    store.set_position(leaves[1][1], (16.0, 3.0));
    plain_store.set_position(plain_leaves[1][1], (16.0, 3.0));
    let from_cache = render(&mut p, &mut store, root);
    let reference = render(&mut plain, &mut plain_store, plain_root);
    assert_eq!(from_cache.draws(), reference.draws());
    assert_eq!(p.stats().cache_replays, 4);
}

#[test]
fn texture_runs_batch_in_draw_order() {
    let mut store = NodeStore::new();
    let root = store.create_container();
    for t in [1, 1, 1, 2, 2, 1] {
        leaf(&mut store, root, t);
    }
    let mut p = Pipeline::default();
    let backend = render(&mut p, &mut store, root);
    assert_eq!(backend.draw_count(), 3);
    let textures: Vec<_> = backend
        .draws()
        .iter()
        .map(|d| d.signature.texture)
        .collect();
    assert_eq!(
        textures,
        [Some(TextureId(1)), Some(TextureId(2)), Some(TextureId(1))]
    );
    assert_eq!(p.stats().draw_calls, 3);
    assert_eq!(p.stats().batched_vertices, 24);
}

#[test]
fn repeated_mutation_marks_once() {
    let (mut store, root, groups, leaves) = grid();
    let mut p = Pipeline::default();
    render(&mut p, &mut store, root);

    let l = leaves[0][2];
    store.set_position(l, (1.0, 1.0));
    store.set_position(l, (2.0, 2.0));
    store.set_opacity(l, 0.5);
    render(&mut p, &mut store, root);

    let s = store.stamps(l);
    assert_eq!(s.self_or_ancestor_changed, 2);
    assert_eq!(store.stamps(groups[0]).subtree_changed, 2);
    assert_eq!(store.stamps(root).subtree_changed, 2);
    assert_eq!(store.mark_changed(l, 2), 0, "ancestors already stamped");
}

#[test]
fn reparenting_marks_moved_node_and_root() {
    let mut store = NodeStore::new();
    let r = store.create_container();
    let a = container(&mut store, r);
    let b = container(&mut store, r);
    leaf(&mut store, a, 1);
    let mut p = Pipeline::default();
    render(&mut p, &mut store, r);

    store.add_child(b, a).unwrap();
    assert_eq!(store.children(r).collect::<Vec<_>>(), [b]);
    assert_eq!(store.children(b).collect::<Vec<_>>(), [a]);

    render(&mut p, &mut store, r);
    assert_eq!(p.frame_id(), 2);
    assert!(store.requires_redraw(a, 2));
    assert_eq!(store.stamps(a).self_or_ancestor_changed, 2);
    assert!(store.requires_redraw(r, 2));
    assert!(store.requires_redraw(b, 2));
}

#[test]
fn cycle_is_rejected_and_tree_unchanged() {
    let mut store = NodeStore::new();
    let root = store.create_container();
    let p = container(&mut store, root);
    let a = container(&mut store, p);
    let err = store.add_child(a, p).unwrap_err();
    assert_eq!(err.child, p);
    assert_eq!(err.parent, a);
    assert_eq!(store.parent(a), Some(p));
    assert_eq!(store.parent(p), Some(root));
    assert_eq!(store.children(root).collect::<Vec<_>>(), [p]);
    assert!(store.add_child(a, a).is_err());
}

#[test]
fn zero_scale_is_traversed_but_not_batched() {
    let mut store = NodeStore::new();
    let root = store.create_container();
    let squashed = container(&mut store, root);
    let inner = leaf(&mut store, squashed, 1);
    let flat = leaf(&mut store, root, 1);
    let visible = leaf(&mut store, root, 1);
    store.set_scale(squashed, (0.0, 1.0));
    store.set_scale(flat, (0.0, 1.0));

    assert!(!store.has_visible_area(squashed));
    assert!(!store.has_visible_area(flat));
    assert!(store.has_visible_area(inner), "evaluated on its own");
    assert!(store.has_visible_area(visible));

    let mut p = Pipeline::default();
    let backend = render(&mut p, &mut store, root);
    assert_eq!(p.stats().nodes_traversed, 5);
    assert_eq!(backend.draw_count(), 1);
    assert_eq!(backend.draws()[0].vertices.len(), 4);
    assert_eq!(store.stamps(inner).last_drawn, 1);
}

#[test]
fn hundred_leaves_one_draw() {
    let mut store = NodeStore::new();
    let root = store.create_container();
    let leaves: Vec<_> = (0..100).map(|_| leaf(&mut store, root, 7)).collect();
    let mut p = Pipeline::default();
    assert_eq!(render(&mut p, &mut store, root).draw_count(), 1);

    store.set_texture(leaves[50], Some(TextureId(8)));
    let backend = render(&mut p, &mut store, root);
    assert!(backend.draw_count() >= 2);
    assert_eq!(backend.draw_count(), 3);
    assert_eq!(p.stats().batched_vertices, 400);
}

#[test]
fn skipped_frames_then_one_change() {
    let (mut store, root, _, leaves) = grid();
    let (mut plain_store, plain_root, _, plain_leaves) = grid();
    let mut p = Pipeline::new(PipelineConfig::new().with_skip_unchanged_frames(true));
    let mut plain = Pipeline::new(PipelineConfig::new().with_cache_enabled(false));
    render(&mut p, &mut store, root);
    render(&mut plain, &mut plain_store, plain_root);

    let mut idle = RecordingBackend::new();
    for _ in 0..4 {
        let drawn = p
            .render(&mut store, root, &mut idle, &mut Tracer::none())
            .unwrap();
        assert!(!drawn);
    }
    assert!(idle.calls().is_empty());
    assert_eq!(p.frame_id(), 1);

    store.set_rotation(leaves[2][0], 0.3);
    plain_store.set_rotation(plain_leaves[2][0], 0.3);
    let backend = render(&mut p, &mut store, root);
    let reference = render(&mut plain, &mut plain_store, plain_root);
    assert_eq!(p.frame_id(), 2);
    assert!(p.stats().cache_replays > 0, "previous rendered frame replays");
    assert_eq!(backend.draws(), reference.draws());
}

#[test]
fn uncacheable_node_forces_its_ancestors_live() {
    let mut store = NodeStore::new();
    let root = store.create_container();
    let live = container(&mut store, root);
    let video = leaf(&mut store, live, 3);
    let still = container(&mut store, root);
    leaf(&mut store, still, 3);
    store.set_cacheable(video, false);

    let mut p = Pipeline::default();
    let first = render(&mut p, &mut store, root);
    for n in [root, live, video] {
        assert_eq!(store.stamps(n).last_drawn, UNCACHEABLE, "{n:?}");
    }
    assert_eq!(store.stamps(still).last_drawn, 1);

    let second = render(&mut p, &mut store, root);
    assert_eq!(second.draws(), first.draws());
    assert_eq!(p.stats().cache_replays, 1);
    assert_eq!(p.stats().nodes_traversed, 4);

    // Explicit exclusion works the same way for a single frame.
    store.set_cacheable(video, true);
    render(&mut p, &mut store, root);
    store.exclude_from_cache(still);
    assert_eq!(store.stamps(root).last_drawn, UNCACHEABLE);
    render(&mut p, &mut store, root);
    assert_eq!(p.stats().cache_replays, 1, "only `live` replays");
}

#[test]
fn purge_draws_next_frame_fresh() {
    let (mut store, root, ..) = grid();
    let mut p = Pipeline::default();
    let first = render(&mut p, &mut store, root);

    let mut backend = RecordingBackend::new();
    p.purge(&mut backend);
    assert_eq!(backend.calls().len(), 1);

    let after = render(&mut p, &mut store, root);
    assert_eq!(p.stats().cache_replays, 0);
    assert_eq!(after.draws(), first.draws());

    render(&mut p, &mut store, root);
    assert_eq!(p.stats().cache_replays, 3);
}

#[test]
fn filter_redirects_subtree_target() {
    let mut store = NodeStore::new();
    let root = store.create_container();
    leaf(&mut store, root, 1);
    let filtered = container(&mut store, root);
    leaf(&mut store, filtered, 1);
    leaf(&mut store, filtered, 1);
    leaf(&mut store, root, 1);
    store.set_filter(filtered, Some(FilterId(7)));

    let mut p = Pipeline::default();
    let backend = render(&mut p, &mut store, root);
    let targets: Vec<_> = backend.draws().iter().map(|d| d.target).collect();
    assert_eq!(
        targets,
        [
            RenderTarget::Screen,
            RenderTarget::Filter(FilterId(7)),
            RenderTarget::Screen
        ]
    );
    assert_eq!(backend.draws()[1].vertices.len(), 8);
}

#[test]
fn clip_and_mask_become_scissor() {
    let mut store = NodeStore::new();
    let root = store.create_container();
    let clipped = container(&mut store, root);
    store.set_position(clipped, (100.0, 0.0));
    store.set_clip_rect(clipped, Some(Rect::new(0.0, 0.0, 4.0, 4.0)));
    leaf(&mut store, clipped, 1);

    let masked = leaf(&mut store, root, 1);
    store.set_position(masked, (10.0, 10.0));
    let mask = store
        .create_leaf(Geometry::quad(2.0, 2.0, Vertex::WHITE))
        .unwrap();
    store.set_mask(masked, Some(mask)).unwrap();

    let mut p = Pipeline::default();
    let backend = render(&mut p, &mut store, root);
    let scissors: Vec<_> = backend.draws().iter().map(|d| d.scissor).collect();
    assert_eq!(
        scissors,
        [
            Some(Rect::new(100.0, 0.0, 104.0, 4.0)),
            Some(Rect::new(10.0, 10.0, 12.0, 12.0))
        ]
    );

    // Moving the mask redraws its owner.
    store.set_position(mask, (1.0, 1.0));
    let backend = render(&mut p, &mut store, root);
    assert!(store.requires_redraw(masked, 2));
    assert_eq!(
        backend.draws()[1].scissor,
        Some(Rect::new(11.0, 11.0, 13.0, 13.0))
    );
    assert_eq!(p.stats().cache_replays, 1, "the clipped branch replays");
}

#[test]
fn moving_a_container_mask_redraws_its_children() {
    fn build() -> (NodeStore, NodeId, NodeId) {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let owner = container(&mut store, root);
        leaf(&mut store, owner, 1);
        let mask = store
            .create_leaf(Geometry::quad(2.0, 2.0, Vertex::WHITE))
            .unwrap();
        store.set_mask(owner, Some(mask)).unwrap();
        (store, root, mask)
    }
    let (mut store, root, mask) = build();
    let (mut plain_store, plain_root, plain_mask) = build();
    let mut p = Pipeline::default();
    let mut plain = Pipeline::new(PipelineConfig::new().with_cache_enabled(false));
    render(&mut p, &mut store, root);
    render(&mut plain, &mut plain_store, plain_root);

    store.set_position(mask, (1.0, 1.0));
    plain_store.set_position(plain_mask, (1.0, 1.0));
    let from_cache = render(&mut p, &mut store, root);
    let reference = render(&mut plain, &mut plain_store, plain_root);
    assert_eq!(
        from_cache.draws()[0].scissor,
        Some(Rect::new(1.0, 1.0, 3.0, 3.0))
    );
    assert_eq!(from_cache.draws(), reference.draws());
    assert_eq!(p.stats().cache_replays, 0);
}

#[test]
fn replay_at_vertex_limit_splits_like_fresh_render() {
    fn build() -> (NodeStore, NodeId, NodeId) {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let first = leaf(&mut store, root, 2);
        let group = container(&mut store, root);
        leaf(&mut store, group, 1);
        leaf(&mut store, group, 1);
        (store, root, first)
    }
    let config = PipelineConfig::new().with_max_batch_vertices(8);
    let (mut store, root, first) = build();
    let (mut plain_store, plain_root, plain_first) = build();
    let mut p = Pipeline::new(config);
    let mut plain = Pipeline::new(config.with_cache_enabled(false));
    render(&mut p, &mut store, root);
    render(&mut plain, &mut plain_store, plain_root);

    store.set_texture(first, Some(TextureId(1)));
    plain_store.set_texture(plain_first, Some(TextureId(1)));
    let from_cache = render(&mut p, &mut store, root);
    let reference = render(&mut plain, &mut plain_store, plain_root);
    assert_eq!(p.stats().cache_replays, 1);
    let sizes: Vec<_> = from_cache.draws().iter().map(|d| d.vertices.len()).collect();
    assert_eq!(sizes, [8, 4]);
    assert_eq!(from_cache.draws(), reference.draws());
}

#[test]
fn blend_change_splits_batch() {
    let mut store = NodeStore::new();
    let root = store.create_container();
    leaf(&mut store, root, 1);
    let add = leaf(&mut store, root, 1);
    leaf(&mut store, root, 1);
    store.set_blend_mode(add, BlendMode::Add);

    let mut p = Pipeline::default();
    let backend = render(&mut p, &mut store, root);
    let blends: Vec<_> = backend.draws().iter().map(|d| d.signature.blend).collect();
    assert_eq!(blends, [BlendMode::Normal, BlendMode::Add, BlendMode::Normal]);
}

#[test]
fn stage_request_redraw_defeats_replay() {
    let mut stage = Stage::new(RecordingBackend::new(), PipelineConfig::default());
    let root = stage.root();
    let store = stage.store_mut();
    let target = leaf(store, root, 1);
    leaf(store, root, 1);

    stage.render().unwrap();
    stage.render().unwrap();
    assert_eq!(stage.frame_stats().cache_replays, 2);

    stage.request_redraw(target);
    stage.render().unwrap();
    let stats = stage.frame_stats();
    assert_eq!(stats.frame_id, 3);
    assert_eq!(stats.cache_replays, 1, "only the untouched sibling");
    assert_eq!(stats.nodes_traversed, 3);
}

#[test]
fn hit_test_and_bounds_follow_transforms() {
    let mut store = NodeStore::new();
    let root = store.create_container();
    let g = container(&mut store, root);
    store.set_position(g, (50.0, 50.0));
    let a = leaf(&mut store, g, 1);
    let b = leaf(&mut store, g, 1);
    store.set_position(b, (4.0, 0.0));

    assert_eq!(store.hit_test(root, Point::new(55.0, 52.0)), Some(b));
    assert_eq!(store.hit_test(root, Point::new(51.0, 52.0)), Some(a));
    assert_eq!(store.hit_test(root, Point::new(0.0, 0.0)), None);
    assert_eq!(
        store.bounds(g, Some(root)).unwrap(),
        Rect::new(50.0, 50.0, 62.0, 58.0)
    );
}

#[cfg(feature = "trace")]
mod traced {
    use super::*;
    use strata_core::trace::{FlushEvent, FlushReason, FrameSummary, ReplayEvent, TraceSink};

    #[derive(Default)]
    struct Collect {
        reasons: Vec<FlushReason>,
        replays: u32,
        summaries: Vec<FrameSummary>,
    }

    impl TraceSink for Collect {
        fn on_flush(&mut self, e: &FlushEvent) {
            self.reasons.push(e.reason);
        }

        fn on_replay(&mut self, _: &ReplayEvent) {
            self.replays += 1;
        }

        fn on_frame_summary(&mut self, s: &FrameSummary) {
            self.summaries.push(*s);
        }
    }

    #[test]
    fn sink_sees_flushes_replays_and_summary() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        leaf(&mut store, root, 1);
        leaf(&mut store, root, 2);
        let mut p = Pipeline::default();
        let mut sink = Collect::default();
        let mut backend = RecordingBackend::new();
        for _ in 0..2 {
            p.render(&mut store, root, &mut backend, &mut Tracer::new(&mut sink))
                .unwrap();
        }
        assert_eq!(
            sink.reasons,
            [
                FlushReason::Signature,
                FlushReason::FrameEnd,
                FlushReason::Signature,
                FlushReason::FrameEnd
            ]
        );
        assert_eq!(sink.replays, 2);
        assert_eq!(sink.summaries.len(), 2);
        assert_eq!(sink.summaries[1], FrameSummary::from(p.stats()));
    }
}
