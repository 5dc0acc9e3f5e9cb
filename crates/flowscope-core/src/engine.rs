//! The engine context: one instance owns every subsystem.
//!
//! Nothing here is global. A host creates an [`Engine`], feeds it data and
//! input, and calls [`Engine::frame`] from its presentation callback.

use std::collections::VecDeque;
use std::time::Instant;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::compositor::{ComposeInput, Compositor, FrameDrawList};
use crate::config::EngineConfig;
use crate::culling::ViewportCuller;
use crate::error::Result;
use crate::graph::{Flow, Graph, Node, NodeId};
use crate::lod::{DetailTier, LodController};
use crate::particles::{ParticleSystem, ParticleVertex};
use crate::perf::{PerformanceAlert, PerformanceMonitor};
use crate::scheduler::FrameScheduler;

/// Pointer travel in pixels below which a press/release counts as a click.
pub const CLICK_THRESHOLD: f32 = 4.0;

/// Events kept for [`Engine::drain_events`]. Older events are dropped first.
pub const MAX_QUEUED_EVENTS: usize = 256;

/// Pixels moved per arrow key press.
pub const KEY_PAN_STEP: f32 = 40.0;

/// Zoom factor per zoom key press.
pub const KEY_ZOOM_STEP: f32 = 1.2;

/// Keys the engine reacts to. Hosts map their own key codes onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    ZoomIn,
    ZoomOut,
    Home,
    TogglePerformanceMode,
}

/// Notifications produced while handling input and frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EngineEvent {
    /// A node was clicked
    NodeSelected { node: NodeId },
    /// Empty space was clicked while a node was selected
    SelectionCleared,
    Alert(PerformanceAlert),
}

/// Snapshot of engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub visible_nodes: usize,
    pub tracked_nodes: usize,
    pub alive_particles: usize,
    /// Running mean render time in milliseconds
    pub average_frame_ms: f64,
    pub fps: f32,
    pub memory_usage: u64,
    pub frame_count: u64,
    pub dropped_ticks: u64,
    pub tier: Option<DetailTier>,
    pub performance_mode: bool,
}

#[derive(Debug, Clone, Copy)]
struct DragState {
    origin: Vec2,
    last: Vec2,
    /// Set once the pointer travels past the click threshold
    dragging: bool,
}

/// Rendering engine context.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    graph: Graph,
    camera: Camera,
    culler: ViewportCuller,
    lod: LodController,
    monitor: PerformanceMonitor,
    scheduler: FrameScheduler,
    particles: ParticleSystem,
    particle_vertices: Vec<ParticleVertex>,
    compositor: Compositor,
    /// Logical surface size in pixels
    surface_size: Vec2,
    selected: Option<NodeId>,
    drag: Option<DragState>,
    events: VecDeque<EngineEvent>,
    /// Fractional flow animations carried between frames
    emission_accumulator: f32,
    /// Next edge of the draw list to animate
    emission_cursor: usize,
}

impl Engine {
    /// Create an engine. Fails only on an invalid config.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let monitor = PerformanceMonitor::new(config.performance_budget());
        let particles = ParticleSystem::new(config.particles.clone());
        let particle_vertices = Vec::with_capacity(particles.max_vertices());
        let compositor = Compositor::new(monitor.quality());

        tracing::debug!(
            max_nodes = config.max_nodes,
            max_particles = config.particles.max_particles,
            "Engine created"
        );

        Ok(Self {
            graph: Graph::new(),
            camera: Camera::new(config.zoom_limits),
            culler: ViewportCuller::new(config.culling_limits()),
            lod: LodController::new(config.lod),
            scheduler: FrameScheduler::new(config.frame_rate_limit),
            monitor,
            particles,
            particle_vertices,
            compositor,
            surface_size: Vec2::new(1.0, 1.0),
            selected: None,
            drag: None,
            events: VecDeque::new(),
            emission_accumulator: 0.0,
            emission_cursor: 0,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate `config` and push it into every subsystem.
    ///
    /// On error the engine keeps running with its previous config. The
    /// particle pool size is fixed at construction.
    pub fn apply_config(&mut self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        self.culler.set_limits(config.culling_limits());
        self.lod.set_thresholds(config.lod);
        self.monitor.set_budget(config.performance_budget());
        self.scheduler.set_frame_rate(config.frame_rate_limit);
        self.camera.set_limits(config.zoom_limits);
        self.particles.set_config(config.particles.clone());
        self.config = config;
        tracing::debug!("Engine config applied");
        Ok(())
    }

    /// Replace the dataset.
    pub fn set_graph(&mut self, nodes: Vec<Node>, flows: Vec<Flow>) {
        self.graph.replace(nodes, flows);
        if let Some(id) = self.selected {
            if self.graph.index_of(id).is_none() {
                self.selected = None;
                self.push_event(EngineEvent::SelectionCleared);
            }
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Set the logical surface size and the device pixel ratio.
    pub fn resize(&mut self, width: f32, height: f32, scale_factor: f32) {
        self.surface_size = Vec2::new(width.max(1.0), height.max(1.0));
        self.monitor.set_device_pixel_ratio(scale_factor);
    }

    pub fn surface_size(&self) -> Vec2 {
        self.surface_size
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    pub fn pointer_down(&mut self, position: Vec2) {
        self.drag = Some(DragState {
            origin: position,
            last: position,
            dragging: false,
        });
    }

    pub fn pointer_move(&mut self, position: Vec2) {
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        if !drag.dragging && position.distance(drag.origin) > CLICK_THRESHOLD {
            drag.dragging = true;
        }
        if drag.dragging {
            let delta = position - drag.last;
            self.camera.pan(delta.x, delta.y);
        }
        drag.last = position;
    }

    pub fn pointer_up(&mut self, position: Vec2) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        if drag.dragging || position.distance(drag.origin) > CLICK_THRESHOLD {
            return;
        }
        self.click(position);
    }

    fn click(&mut self, position: Vec2) {
        match self.hit_test(position) {
            Some(id) => {
                self.selected = Some(id);
                tracing::debug!(node = %id, "Node selected");
                self.push_event(EngineEvent::NodeSelected { node: id });
            }
            None => {
                if self.selected.take().is_some() {
                    self.push_event(EngineEvent::SelectionCleared);
                }
            }
        }
    }

    /// Topmost visible node under a screen position.
    ///
    /// Nodes drawn later sit on top, so the visible set is scanned backwards.
    pub fn hit_test(&self, screen: Vec2) -> Option<NodeId> {
        let tier = self
            .lod
            .current()
            .unwrap_or_else(|| DetailTier::for_zoom(self.camera.zoom(), self.lod.thresholds()));
        let radius = tier.node_radius(self.config.base_node_radius);

        self.culler.visible().iter().rev().find_map(|&idx| {
            let node = self.graph.node(idx)?;
            let at = self.camera.world_to_screen(node.position);
            (at.distance(screen) <= radius).then_some(node.id)
        })
    }

    /// Wheel input: negative deltas zoom in about the pointer.
    pub fn wheel(&mut self, delta: f32, pointer: Vec2) {
        self.camera.wheel(delta, pointer);
    }

    pub fn key(&mut self, key: Key) {
        let center = self.surface_size * 0.5;
        match key {
            Key::Left => self.camera.pan(KEY_PAN_STEP, 0.0),
            Key::Right => self.camera.pan(-KEY_PAN_STEP, 0.0),
            Key::Up => self.camera.pan(0.0, KEY_PAN_STEP),
            Key::Down => self.camera.pan(0.0, -KEY_PAN_STEP),
            Key::ZoomIn => self.camera.zoom_at(center, KEY_ZOOM_STEP),
            Key::ZoomOut => self.camera.zoom_at(center, 1.0 / KEY_ZOOM_STEP),
            Key::Home => self.camera.reset(),
            Key::TogglePerformanceMode => {
                let enabled = !self.monitor.performance_mode();
                self.set_performance_mode(enabled);
            }
        }
    }

    pub fn set_performance_mode(&mut self, enabled: bool) {
        self.monitor.set_performance_mode(enabled);
    }

    pub fn performance_mode(&self) -> bool {
        self.monitor.performance_mode()
    }

    /// Register a callback for performance alerts.
    ///
    /// Alerts are also queued as [`EngineEvent::Alert`].
    pub fn on_alert(&mut self, callback: impl FnMut(&PerformanceAlert) + 'static) {
        self.monitor.on_alert(callback);
    }

    /// Start producing frames. No-op while running.
    pub fn start(&mut self) {
        if self.scheduler.is_running() {
            return;
        }
        let generation = self.scheduler.start();
        self.particles.start();
        tracing::debug!(generation, "Render loop started");
    }

    /// Stop producing frames. Repeated calls are no-ops.
    pub fn stop(&mut self) {
        if !self.scheduler.is_running() {
            return;
        }
        self.scheduler.stop();
        self.particles.stop();
        tracing::debug!("Render loop stopped");
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Run one frame if the loop is running and the frame-rate cap admits it.
    pub fn frame(&mut self, now: Instant) -> Option<&FrameDrawList> {
        let tick = self.scheduler.tick(now)?;
        self.monitor.begin_frame(Instant::now());

        self.culler.sync(&self.graph);
        let viewport = self.camera.viewport(self.surface_size);
        self.culler.cull(&viewport);

        let tier = self.lod.update(self.camera.zoom());
        let quality = self.monitor.quality();

        self.compositor.compose(ComposeInput {
            graph: &self.graph,
            culler: &self.culler,
            tier,
            quality,
            selected: self.selected,
            base_radius: self.config.base_node_radius,
            performance_mode: self.monitor.performance_mode(),
            fps: self.monitor.fps(),
            memory_bytes: self.monitor.metrics().memory_usage,
            alive_particles: self.particles.alive_count(),
        });

        self.animate_particles(now, tick.dt, quality.emission_scale);

        let mut alerts = self.monitor.end_frame(Instant::now());
        let memory = self.memory_estimate();
        alerts.extend(self.monitor.sample_memory(memory));
        for alert in alerts {
            self.push_event(EngineEvent::Alert(alert));
        }

        Some(self.compositor.draw_list())
    }

    /// Continuous flow emission along drawn edges, then integration.
    fn animate_particles(&mut self, now: Instant, dt: f32, emission_scale: f32) {
        let edges = &self.compositor.draw_list().edges;
        if edges.is_empty() {
            self.emission_accumulator = 0.0;
        } else {
            let rate = self.config.particles.emission_rate * emission_scale;
            self.emission_accumulator += rate * dt;
            let per_flow = self.config.particles.flow_particle_count;
            while self.emission_accumulator >= 1.0 {
                self.emission_accumulator -= 1.0;
                let edge = edges[self.emission_cursor % edges.len()];
                self.emission_cursor = self.emission_cursor.wrapping_add(1);
                self.particles
                    .emit_flow(Vec2::from(edge.from), Vec2::from(edge.to), per_flow);
            }
        }

        self.particles.advance(now);
        self.particles.write_vertices(&mut self.particle_vertices);
    }

    fn memory_estimate(&self) -> u64 {
        let bytes = self.graph.heap_bytes()
            + self.culler.heap_bytes()
            + self.particles.heap_bytes()
            + self.particle_vertices.capacity() * std::mem::size_of::<ParticleVertex>()
            + self.compositor.draw_list().heap_bytes();
        bytes as u64
    }

    /// Particle vertices packed by the last frame.
    pub fn particle_vertices(&self) -> &[ParticleVertex] {
        &self.particle_vertices
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut ParticleSystem {
        &mut self.particles
    }

    /// Draw list of the last frame.
    pub fn draw_list(&self) -> &FrameDrawList {
        self.compositor.draw_list()
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn metrics(&self) -> EngineMetrics {
        let frame = self.monitor.metrics();
        EngineMetrics {
            visible_nodes: self.culler.visible_count(),
            tracked_nodes: self.culler.tracked_count(),
            alive_particles: self.particles.alive_count(),
            average_frame_ms: frame.average_frame_time.as_secs_f64() * 1000.0,
            fps: frame.fps(),
            memory_usage: frame.memory_usage,
            frame_count: frame.frame_count,
            dropped_ticks: self.scheduler.dropped_ticks(),
            tier: self.lod.current(),
            performance_mode: self.monitor.performance_mode(),
        }
    }

    /// Take all queued events, oldest first.
    ///
    /// At most [`MAX_QUEUED_EVENTS`] are kept between drains. Hosts that
    /// only listen through [`on_alert`](Self::on_alert) may never drain.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    fn push_event(&mut self, event: EngineEvent) {
        if self.events.len() >= MAX_QUEUED_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FlowId;
    use crate::perf::PerformanceAlert;
    use std::time::Duration;

    fn engine() -> Engine {
        let mut config = EngineConfig::default();
        config.particles.max_particles = 256;
        config.particles.seed = Some(1);
        let mut engine = Engine::new(config).unwrap();
        engine.resize(800.0, 600.0, 1.0);
        engine.set_graph(
            vec![
                Node::new(NodeId(1), Vec2::new(100.0, 100.0)),
                Node::new(NodeId(2), Vec2::new(400.0, 300.0)),
            ],
            vec![Flow::new(FlowId(1), NodeId(1), NodeId(2), 10.0)],
        );
        engine
    }

    #[test]
    fn no_frames_until_started() {
        let mut engine = engine();
        let t0 = Instant::now();
        assert!(engine.frame(t0).is_none());
        engine.start();
        assert!(engine.frame(t0).is_some());
        engine.stop();
        engine.stop();
        assert!(engine.frame(t0 + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn click_selects_and_clears() {
        let mut engine = engine();
        engine.start();
        engine.frame(Instant::now());

        engine.pointer_down(Vec2::new(101.0, 99.0));
        engine.pointer_up(Vec2::new(102.0, 100.0));
        assert_eq!(engine.selected(), Some(NodeId(1)));

        engine.pointer_down(Vec2::new(700.0, 50.0));
        engine.pointer_up(Vec2::new(700.0, 50.0));
        assert_eq!(engine.selected(), None);

        assert_eq!(
            engine.drain_events(),
            vec![
                EngineEvent::NodeSelected { node: NodeId(1) },
                EngineEvent::SelectionCleared
            ]
        );
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn drag_pans_without_selecting() {
        let mut engine = engine();
        engine.start();
        engine.frame(Instant::now());

        engine.pointer_down(Vec2::new(100.0, 100.0));
        engine.pointer_move(Vec2::new(102.0, 100.0));
        assert_eq!(engine.camera().x, 0.0);
        engine.pointer_move(Vec2::new(130.0, 110.0));
        engine.pointer_up(Vec2::new(130.0, 110.0));

        assert_eq!(engine.camera().offset(), Vec2::new(30.0, 10.0));
        assert_eq!(engine.selected(), None);
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn keys_drive_camera_and_mode() {
        let mut engine = engine();
        engine.key(Key::Left);
        assert_eq!(engine.camera().x, KEY_PAN_STEP);
        engine.key(Key::ZoomIn);
        assert!((engine.camera().zoom() - KEY_ZOOM_STEP).abs() < 1e-6);
        engine.key(Key::Home);
        assert_eq!(engine.camera().offset(), Vec2::ZERO);
        assert_eq!(engine.camera().zoom(), 1.0);

        engine.key(Key::TogglePerformanceMode);
        assert!(engine.performance_mode());
        engine.start();
        let list = engine.frame(Instant::now()).unwrap();
        assert!(!list.quality.antialiasing);
        assert_eq!(list.quality.max_edges, 500);
        engine.key(Key::TogglePerformanceMode);
        assert!(!engine.performance_mode());
    }

    #[test]
    fn frames_cull_and_animate_flows() {
        let mut engine = engine();
        engine.start();
        let t0 = Instant::now();
        let list = engine.frame(t0).unwrap();
        assert_eq!(list.nodes.len(), 2);
        assert_eq!(list.edges.len(), 1);

        engine.frame(t0 + Duration::from_millis(100)).unwrap();
        let alive = engine.particles().alive_count();
        assert!(alive > 0);
        assert_eq!(engine.particle_vertices().len(), alive * 6);

        let metrics = engine.metrics();
        assert_eq!(metrics.visible_nodes, 2);
        assert_eq!(metrics.tracked_nodes, 2);
        assert_eq!(metrics.frame_count, 2);
        assert_eq!(metrics.tier, Some(DetailTier::High));
        assert!(metrics.memory_usage > 0);
    }

    #[test]
    fn memory_alerts_become_events() {
        let mut config = EngineConfig::default();
        config.memory_warning_threshold = 1;
        config.particles.max_particles = 16;
        let mut engine = Engine::new(config).unwrap();
        engine.start();
        engine.frame(Instant::now());
        let events = engine.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::Alert(PerformanceAlert::MemoryThresholdExceeded { threshold: 1, .. })
        )));
    }

    #[test]
    fn replacing_graph_drops_stale_selection() {
        let mut engine = engine();
        engine.start();
        engine.frame(Instant::now());
        engine.pointer_down(Vec2::new(100.0, 100.0));
        engine.pointer_up(Vec2::new(100.0, 100.0));
        engine.drain_events();

        engine.set_graph(vec![Node::new(NodeId(9), Vec2::ZERO)], Vec::new());
        assert_eq!(engine.selected(), None);
        assert_eq!(engine.drain_events(), vec![EngineEvent::SelectionCleared]);
    }

    #[test]
    fn apply_config_validates() {
        let mut engine = engine();
        let mut config = engine.config().clone();
        config.zoom_limits.min = 0.5;
        engine.apply_config(config).unwrap();
        assert_eq!(engine.camera().limits().min, 0.5);
        assert_eq!(engine.config().zoom_limits.min, 0.5);
    }

    #[test]
    fn rejected_config_is_not_committed() {
        let mut engine = engine();
        let mut config = engine.config().clone();
        config.base_node_radius = -5.0;
        config.viewport_nodes = 0;
        assert!(engine.apply_config(config).is_err());
        assert_eq!(engine.config().base_node_radius, 8.0);
        assert_eq!(engine.config().viewport_nodes, 200);

        engine.start();
        let list = engine.frame(Instant::now()).unwrap();
        assert_eq!(list.nodes.len(), 2);
        assert!(list.nodes.iter().all(|n| n.radius > 0.0));
    }

    #[test]
    fn undrained_events_stay_bounded() {
        let mut config = EngineConfig::default();
        config.memory_warning_threshold = 1;
        config.particles.max_particles = 16;
        let mut engine = Engine::new(config).unwrap();
        engine.start();

        let t0 = Instant::now();
        for i in 0..(MAX_QUEUED_EVENTS as u64 + 50) {
            engine.frame(t0 + Duration::from_millis(100 * i));
        }
        let events = engine.drain_events();
        assert_eq!(events.len(), MAX_QUEUED_EVENTS);
        assert!(engine.drain_events().is_empty());
    }
}
