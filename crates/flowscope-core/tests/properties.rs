//! Property tests for culling, level of detail and the particle pool.

use std::collections::HashSet;

use flowscope_core::{
    CullingLimits, DetailTier, Graph, LodController, LodThresholds, Node, NodeId, ParticleConfig,
    ParticleSystem, Rect, ViewportCuller,
};
use glam::Vec2;
use proptest::prelude::*;

fn position() -> impl Strategy<Value = Vec2> {
    (-1000.0f32..1000.0, -1000.0f32..1000.0).prop_map(|(x, y)| Vec2::new(x, y))
}

fn nodes(max: usize) -> impl Strategy<Value = Vec<Node>> {
    prop::collection::vec(position(), 0..max).prop_map(|points| {
        points
            .into_iter()
            .enumerate()
            .map(|(i, p)| Node::new(NodeId(i as u64), p))
            .collect()
    })
}

fn viewport() -> impl Strategy<Value = Rect> {
    (position(), 0.0f32..800.0, 0.0f32..800.0)
        .prop_map(|(min, w, h)| Rect::new(min.x, min.x + w, min.y, min.y + h))
}

fn cull(nodes: Vec<Node>, limits: CullingLimits, vp: &Rect) -> (Graph, Vec<usize>) {
    let mut graph = Graph::new();
    graph.replace(nodes, Vec::new());
    let mut culler = ViewportCuller::new(limits);
    culler.sync(&graph);
    let visible = culler.cull(vp).to_vec();
    (graph, visible)
}

proptest! {
    #[test]
    fn visible_is_subset_within_padding(
        nodes in nodes(300),
        vp in viewport(),
        padding in 0.0f32..100.0,
        max_nodes in 1usize..400,
        cap in 1usize..250,
    ) {
        let total = nodes.len();
        let limits = CullingLimits { max_nodes, viewport_nodes: cap, padding };
        let (graph, visible) = cull(nodes, limits, &vp);

        let tracked = total.min(max_nodes);
        prop_assert!(visible.len() <= tracked.min(cap));

        let area = vp.expand(padding);
        let mut seen = HashSet::new();
        for idx in visible {
            prop_assert!(idx < tracked);
            prop_assert!(seen.insert(idx), "duplicate index {}", idx);
            prop_assert!(area.contains(graph.nodes()[idx].position));
        }
    }

    #[test]
    fn uncapped_query_matches_brute_force(
        nodes in nodes(200),
        vp in viewport(),
        padding in 0.0f32..100.0,
    ) {
        let limits = CullingLimits { max_nodes: 1000, viewport_nodes: 1000, padding };
        let (graph, visible) = cull(nodes, limits, &vp);

        let area = vp.expand(padding);
        let expected: HashSet<usize> = graph
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, n)| area.contains(n.position))
            .map(|(i, _)| i)
            .collect();
        let got: HashSet<usize> = visible.into_iter().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn lod_is_a_pure_function_of_zoom(zooms in prop::collection::vec(0.05f32..5.0, 1..50)) {
        let thresholds = LodThresholds::default();
        let mut controller = LodController::new(thresholds);
        for zoom in zooms {
            let expected = DetailTier::for_zoom(zoom, &thresholds);
            prop_assert_eq!(controller.update(zoom), expected);
            prop_assert_eq!(DetailTier::for_zoom(zoom, &thresholds), expected);
        }
    }

    #[test]
    fn lod_is_monotonic(a in 0.0f32..5.0, b in 0.0f32..5.0) {
        let t = LodThresholds::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(DetailTier::for_zoom(lo, &t) <= DetailTier::for_zoom(hi, &t));
    }

    #[test]
    fn emit_conserves_the_pool(pre in 0usize..32, count in 0usize..32, seed in any::<u64>()) {
        let mut ps = ParticleSystem::new(ParticleConfig {
            max_particles: 64,
            seed: Some(seed),
            ..ParticleConfig::default()
        });
        ps.emit(Vec2::ZERO, pre);
        ps.update(0.1);
        let before = ps.particles().to_vec();
        let dead_before = before.iter().filter(|p| !p.is_alive()).count();
        prop_assume!(count <= dead_before);

        prop_assert_eq!(ps.emit(Vec2::new(3.0, 4.0), count), count);

        let mut fresh = 0;
        for (old, new) in before.iter().zip(ps.particles()) {
            if old != new {
                prop_assert!(!old.is_alive());
                prop_assert_eq!(new.life, new.max_life);
                fresh += 1;
            }
        }
        prop_assert_eq!(fresh, count);
    }

    #[test]
    fn zero_step_keeps_position_and_rotation(count in 1usize..64, seed in any::<u64>()) {
        let mut ps = ParticleSystem::new(ParticleConfig {
            max_particles: 64,
            seed: Some(seed),
            ..ParticleConfig::default()
        });
        ps.emit(Vec2::new(10.0, -10.0), count);
        let before = ps.particles().to_vec();
        ps.update(0.0);
        for (a, b) in before.iter().zip(ps.particles()) {
            prop_assert_eq!(a.position, b.position);
            prop_assert_eq!(a.rotation, b.rotation);
            prop_assert_eq!(a.life, b.life);
        }
    }
}
