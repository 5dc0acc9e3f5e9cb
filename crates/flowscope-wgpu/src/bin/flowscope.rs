//! Interactive network map viewer.
//!
//! Controls:
//! - Left-drag: Pan
//! - Left-click: Select node (click empty space to clear)
//! - Scroll wheel: Zoom about the cursor
//! - Arrows: Pan
//! - +/-: Zoom about the window center
//! - Home: Reset camera
//! - P: Toggle performance mode
//! - Escape: Quit

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use flowscope_core::graph::ANOMALY_KEY;
use flowscope_core::{
    Engine, EngineConfig, EngineEvent, Flow, FlowId, Key, MetadataValue, Node, NodeId,
    NodeStatus, PerformanceAlert,
};
use flowscope_wgpu::Renderer;
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

const HUD_INTERVAL: Duration = Duration::from_secs(1);

/// Flowscope network map viewer
#[derive(Parser, Debug)]
#[command(name = "flowscope", version, about)]
struct Args {
    /// Number of generated nodes
    #[arg(long, default_value_t = 2_000)]
    nodes: usize,

    /// Number of generated flows
    #[arg(long, default_value_t = 4_000)]
    flows: usize,

    /// Seed for the generated topology
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Engine configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame rate limit, overrides the config file
    #[arg(long)]
    fps: Option<u32>,
}

/// Scatter nodes over a square sized to keep density roughly constant.
fn demo_topology(nodes: usize, flows: usize, seed: u64) -> (Vec<Node>, Vec<Flow>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let extent = (nodes.max(1) as f32).sqrt() * 40.0;

    let nodes: Vec<Node> = (0..nodes)
        .map(|i| {
            let position = Vec2::new(rng.gen_range(0.0..extent), rng.gen_range(0.0..extent));
            let status = match rng.gen_range(0..100) {
                0..=79 => NodeStatus::Healthy,
                80..=91 => NodeStatus::Warning,
                92..=97 => NodeStatus::Critical,
                _ => NodeStatus::Offline,
            };
            let mut node = Node::new(NodeId(i as u64), position)
                .with_status(status)
                .with_health(rng.gen_range(0.2..1.0))
                .with_activity(rng.gen_range(0.0..1.0));
            if rng.gen_bool(0.02) {
                node = node.with_metadata(ANOMALY_KEY, MetadataValue::Bool(true));
            }
            node
        })
        .collect();

    if nodes.len() < 2 {
        return (nodes, Vec::new());
    }

    let flows = (0..flows)
        .map(|i| {
            let source = rng.gen_range(0..nodes.len());
            // Bias targets toward nearby indices so flows stay local-ish
            let hop = rng.gen_range(1..nodes.len().min(64));
            let target = (source + hop) % nodes.len();
            Flow::new(
                FlowId(i as u64),
                nodes[source].id,
                nodes[target].id,
                rng.gen_range(1.0..100.0),
            )
        })
        .collect();

    (nodes, flows)
}

fn map_key(code: KeyCode) -> Option<Key> {
    Some(match code {
        KeyCode::ArrowLeft => Key::Left,
        KeyCode::ArrowRight => Key::Right,
        KeyCode::ArrowUp => Key::Up,
        KeyCode::ArrowDown => Key::Down,
        KeyCode::Equal | KeyCode::NumpadAdd => Key::ZoomIn,
        KeyCode::Minus | KeyCode::NumpadSubtract => Key::ZoomOut,
        KeyCode::Home => Key::Home,
        KeyCode::KeyP => Key::TogglePerformanceMode,
        _ => return None,
    })
}

fn log_alert(alert: &PerformanceAlert) {
    match alert {
        PerformanceAlert::FrameBudgetExceeded {
            render_time, frame, ..
        } => {
            tracing::debug!(frame, ?render_time, "Frame over budget");
        }
        PerformanceAlert::PerformanceModeActivated { render_time, frame } => {
            tracing::warn!(frame, ?render_time, "Performance mode activated");
        }
        PerformanceAlert::MemoryThresholdExceeded { used, threshold } => {
            tracing::warn!(used, threshold, "Memory threshold exceeded");
        }
    }
}

struct App {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    engine: Engine,
    cursor: Vec2,
    last_hud: Instant,
}

impl App {
    fn new(engine: Engine) -> Self {
        Self {
            window: None,
            renderer: None,
            engine,
            cursor: Vec2::ZERO,
            last_hud: Instant::now(),
        }
    }

    fn scale_factor(&self) -> f64 {
        self.renderer.as_ref().map_or(1.0, |r| r.scale_factor())
    }

    fn resize(&mut self) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };
        let logical = renderer.logical_size();
        self.engine
            .resize(logical.x, logical.y, renderer.scale_factor() as f32);
        let quality = self.engine.monitor().quality();
        renderer.resize(renderer.size(), renderer.scale_factor(), &quality);
    }

    fn report(&mut self) {
        for event in self.engine.drain_events() {
            match event {
                EngineEvent::NodeSelected { node } => {
                    if let Some(n) = self
                        .engine
                        .graph()
                        .index_of(node)
                        .and_then(|idx| self.engine.graph().node(idx))
                    {
                        tracing::info!(
                            node = %node,
                            status = ?n.status,
                            health = n.health,
                            connections = n.connections.len(),
                            "Selected"
                        );
                    }
                }
                EngineEvent::SelectionCleared => tracing::info!("Selection cleared"),
                EngineEvent::Alert(alert) => log_alert(&alert),
            }
        }

        let now = Instant::now();
        if now.duration_since(self.last_hud) >= HUD_INTERVAL {
            self.last_hud = now;
            let m = self.engine.metrics();
            tracing::info!(
                fps = format_args!("{:.1}", m.fps),
                frame_ms = format_args!("{:.2}", m.average_frame_ms),
                visible = m.visible_nodes,
                tracked = m.tracked_nodes,
                particles = m.alive_particles,
                memory_kb = m.memory_usage / 1024,
                tier = ?m.tier,
                performance_mode = m.performance_mode,
                "Stats"
            );
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title(format!(
                "Flowscope - {} nodes, {} flows",
                self.engine.graph().nodes().len(),
                self.engine.graph().flows().len()
            ))
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        let particles = self.engine.config().particles.clone();
        match pollster::block_on(Renderer::new(window.clone(), &particles)) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                tracing::error!("Renderer initialization failed: {}", e);
                event_loop.exit();
                return;
            }
        }

        self.resize();
        self.engine.start();
        self.last_hud = Instant::now();
        window.request_redraw();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if self.renderer.is_none() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.engine.stop();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(renderer) = &mut self.renderer {
                    let quality = self.engine.monitor().quality();
                    renderer.resize(size, renderer.scale_factor(), &quality);
                }
                self.resize();
            }

            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                if let Some(renderer) = &mut self.renderer {
                    let quality = self.engine.monitor().quality();
                    renderer.resize(renderer.size(), scale_factor, &quality);
                }
                self.resize();
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if code == KeyCode::Escape {
                    self.engine.stop();
                    event_loop.exit();
                    return;
                }
                if let Some(key) = map_key(code) {
                    self.engine.key(key);
                    if key == Key::TogglePerformanceMode {
                        tracing::info!(
                            "Performance mode: {}",
                            if self.engine.performance_mode() { "on" } else { "off" }
                        );
                    }
                }
            }

            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state,
                ..
            } => match state {
                ElementState::Pressed => self.engine.pointer_down(self.cursor),
                ElementState::Released => self.engine.pointer_up(self.cursor),
            },

            WindowEvent::CursorMoved { position, .. } => {
                let scale = self.scale_factor();
                self.cursor = Vec2::new((position.x / scale) as f32, (position.y / scale) as f32);
                self.engine.pointer_move(self.cursor);
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                };
                // Scrolling up zooms in
                self.engine.wheel(-scroll, self.cursor);
            }

            WindowEvent::RedrawRequested => {
                if self.engine.frame(Instant::now()).is_some() {
                    if let Some(renderer) = &mut self.renderer {
                        let result = renderer.render(
                            self.engine.draw_list(),
                            self.engine.particle_vertices(),
                            self.engine.camera(),
                        );
                        match result {
                            Ok(_) => {}
                            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                                renderer.recover();
                            }
                            Err(wgpu::SurfaceError::OutOfMemory) => {
                                tracing::error!("Out of GPU memory");
                                self.engine.stop();
                                event_loop.exit();
                                return;
                            }
                            Err(e) => {
                                tracing::warn!("Render error: {:?}", e);
                            }
                        }
                    }
                }
                self.report();

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &mut self.renderer {
            renderer.dispose();
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    if let Some(fps) = args.fps {
        config.frame_rate_limit = fps;
    }

    let mut engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Generating {} nodes and {} flows (seed {})", args.nodes, args.flows, args.seed);
    let (nodes, flows) = demo_topology(args.nodes, args.flows, args.seed);
    engine.set_graph(nodes, flows);

    tracing::info!("Flowscope viewer");
    tracing::info!("Controls:");
    tracing::info!("  Left-drag - Pan");
    tracing::info!("  Left-click - Select node");
    tracing::info!("  Scroll wheel - Zoom");
    tracing::info!("  Arrows - Pan");
    tracing::info!("  +/- - Zoom");
    tracing::info!("  Home - Reset camera");
    tracing::info!("  P - Toggle performance mode");
    tracing::info!("  Escape - Quit");

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            tracing::error!("Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(engine);
    if let Err(e) = event_loop.run_app(&mut app) {
        tracing::error!("Event loop error: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_is_seeded() {
        let (a_nodes, a_flows) = demo_topology(50, 80, 7);
        let (b_nodes, b_flows) = demo_topology(50, 80, 7);
        assert_eq!(a_nodes.len(), 50);
        assert_eq!(a_flows.len(), 80);
        for (a, b) in a_nodes.iter().zip(&b_nodes) {
            assert_eq!(a.position, b.position);
        }
        for (a, b) in a_flows.iter().zip(&b_flows) {
            assert_eq!((a.source, a.target), (b.source, b.target));
            assert_ne!(a.source, a.target);
        }
    }

    #[test]
    fn tiny_topologies_have_no_flows() {
        let (nodes, flows) = demo_topology(1, 10, 1);
        assert_eq!(nodes.len(), 1);
        assert!(flows.is_empty());
    }

    #[test]
    fn keys_map_to_engine_controls() {
        assert_eq!(map_key(KeyCode::Equal), Some(Key::ZoomIn));
        assert_eq!(map_key(KeyCode::KeyP), Some(Key::TogglePerformanceMode));
        assert_eq!(map_key(KeyCode::KeyQ), None);
    }
}
