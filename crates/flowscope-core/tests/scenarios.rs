//! End-to-end scenarios over the public API.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use flowscope_core::perf::PerformanceBudget;
use flowscope_core::{
    Camera, CullingLimits, Graph, Node, NodeId, ParticleConfig, ParticleSystem, PerformanceAlert,
    PerformanceMonitor, Rect, ViewportCuller, ZoomLimits,
};
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn default_limits() -> CullingLimits {
    CullingLimits {
        max_nodes: 1000,
        viewport_nodes: 200,
        padding: 50.0,
    }
}

#[test]
fn scenario_a_all_nodes_inside_are_visible() {
    let nodes: Vec<Node> = (0..15)
        .map(|i| Node::new(NodeId(i), Vec2::new(50.0 + i as f32 * 60.0, 500.0)))
        .collect();
    let mut graph = Graph::new();
    graph.replace(nodes, Vec::new());

    let mut culler = ViewportCuller::new(default_limits());
    culler.sync(&graph);
    let visible = culler.cull(&Rect::new(0.0, 1000.0, 0.0, 1000.0));
    assert_eq!(visible.len(), 15);
}

#[test]
fn scenario_b_large_graph_is_capped() {
    let mut rng = StdRng::seed_from_u64(42);
    let nodes: Vec<Node> = (0..5000)
        .map(|i| {
            Node::new(
                NodeId(i),
                Vec2::new(rng.gen_range(0.0..1000.0), rng.gen_range(0.0..1000.0)),
            )
        })
        .collect();
    let mut graph = Graph::new();
    graph.replace(nodes, Vec::new());

    let mut culler = ViewportCuller::new(default_limits());
    culler.sync(&graph);
    assert_eq!(culler.tracked_count(), 1000);

    let visible = culler.cull(&Rect::new(0.0, 1000.0, 0.0, 1000.0)).to_vec();
    assert_eq!(visible.len(), 200);
    // Only the first 1000 nodes are indexed
    assert!(visible.iter().all(|&idx| idx < 1000));
}

#[test]
fn scenario_c_zoom_out_clamps_at_minimum() {
    let mut camera = Camera::new(ZoomLimits { min: 0.1, max: 5.0 });
    assert_eq!(camera.zoom(), 1.0);
    let pointer = Vec2::new(400.0, 300.0);
    let mut previous = camera.zoom();
    for _ in 0..200 {
        camera.wheel(1.0, pointer);
        assert!(camera.zoom() >= 0.1);
        assert!(camera.zoom() <= previous);
        previous = camera.zoom();
    }
    assert_eq!(camera.zoom(), 0.1);
}

#[test]
fn scenario_d_single_emit_on_dead_pool() {
    let mut ps = ParticleSystem::new(ParticleConfig {
        max_particles: 100,
        seed: Some(9),
        ..ParticleConfig::default()
    });
    assert_eq!(ps.alive_count(), 0);

    ps.emit(Vec2::new(100.0, 100.0), 1);

    let alive: Vec<_> = ps.particles().iter().filter(|p| p.is_alive()).collect();
    assert_eq!(alive.len(), 1);
    assert_eq!(alive[0].position, Vec2::new(100.0, 100.0));
    assert_eq!(alive[0].life, alive[0].max_life);
}

#[test]
fn scenario_e_budget_alerts_without_degrading() {
    let mut monitor = PerformanceMonitor::new(PerformanceBudget {
        frame_budget: Duration::from_micros(16_670),
        degrade_threshold: Duration::from_micros(33_330),
        memory_warning_threshold: 512 * 1024 * 1024,
        max_edges: 2000,
        degraded_max_edges: 500,
    });
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    monitor.on_alert(move |alert| sink.borrow_mut().push(alert.clone()));

    for _ in 0..10 {
        let alerts = monitor.record_frame(Duration::from_millis(20));
        assert_eq!(alerts.len(), 1);
        assert!(matches!(alerts[0], PerformanceAlert::FrameBudgetExceeded { .. }));
    }
    assert!(!monitor.performance_mode());
    assert_eq!(seen.borrow().len(), 10);

    let alerts = monitor.record_frame(Duration::from_millis(40));
    assert!(alerts
        .iter()
        .any(|a| matches!(a, PerformanceAlert::PerformanceModeActivated { .. })));
    assert!(monitor.performance_mode());

    // Sticky: recovery does not switch it off, and it is not reported twice
    let alerts = monitor.record_frame(Duration::from_millis(40));
    assert!(!alerts
        .iter()
        .any(|a| matches!(a, PerformanceAlert::PerformanceModeActivated { .. })));
    monitor.record_frame(Duration::from_millis(5));
    assert!(monitor.performance_mode());
    assert_eq!(monitor.quality().max_edges, 500);
}
