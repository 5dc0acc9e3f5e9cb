//! Per-frame draw ordering.
//!
//! The compositor turns the culled node set, the LOD tier and the current
//! quality into a [`FrameDrawList`]. Renderers draw the list front to back
//! in field order: clear, nodes, edges, overlays. The particle pass runs
//! after that with its own program.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::culling::ViewportCuller;
use crate::graph::{Graph, NodeId, NodeStatus};
use crate::lod::DetailTier;
use crate::perf::QualitySettings;

/// Background color, linear RGBA.
pub const CLEAR_COLOR: [f32; 4] = [0.02, 0.03, 0.06, 1.0];

/// Node instance flag: draw a selection ring.
pub const FLAG_SELECTED: u32 = 1;
/// Node instance flag: draw the health ring overlay.
pub const FLAG_DETAIL: u32 = 1 << 1;

/// Pack RGBA bytes into a u32 (ABGR in memory order, matches `unpack4x8unorm`).
#[inline]
pub const fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    ((a as u32) << 24) | ((b as u32) << 16) | ((g as u32) << 8) | r as u32
}

const HEALTHY: u32 = pack_rgba(0x22, 0xc5, 0x5e, 0xff);
const WARNING: u32 = pack_rgba(0xf5, 0x9e, 0x0b, 0xff);
const CRITICAL: u32 = pack_rgba(0xef, 0x44, 0x44, 0xff);
const OFFLINE: u32 = pack_rgba(0x6b, 0x72, 0x80, 0xff);
const ANOMALY: u32 = pack_rgba(0xd9, 0x46, 0xef, 0xff);

/// Fill color for a node.
pub fn node_color(status: NodeStatus, anomalous: bool) -> u32 {
    if anomalous {
        return ANOMALY;
    }
    match status {
        NodeStatus::Healthy => HEALTHY,
        NodeStatus::Warning => WARNING,
        NodeStatus::Critical => CRITICAL,
        NodeStatus::Offline => OFFLINE,
    }
}

/// GPU instance data for one node.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct NodeInstance {
    /// World position
    pub position: [f32; 2],
    /// Radius in pixels
    pub radius: f32,
    /// Packed RGBA fill
    pub color: u32,
    /// Health in [0, 1], drawn as ring arc when `FLAG_DETAIL` is set
    pub health: f32,
    pub flags: u32,
}

/// GPU instance data for one edge.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EdgeInstance {
    pub from: [f32; 2],
    pub to: [f32; 2],
    /// Stroke width in pixels
    pub width: f32,
    /// Packed RGBA stroke
    pub color: u32,
}

/// A node label anchored below the node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Label {
    pub node: NodeId,
    /// World position of the node center
    pub anchor: Vec2,
    /// Pixel offset below the anchor
    pub offset: f32,
}

/// HUD items drawn on top of the scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Overlay {
    /// Shown while performance mode is active
    PerformanceWarning,
    /// FPS, memory and counts readout
    Stats {
        fps: f32,
        memory_bytes: u64,
        visible_nodes: usize,
        alive_particles: usize,
    },
}

/// Everything to draw for one frame.
#[derive(Debug, Clone)]
pub struct FrameDrawList {
    pub clear_color: [f32; 4],
    pub tier: DetailTier,
    pub quality: QualitySettings,
    pub nodes: Vec<NodeInstance>,
    pub edges: Vec<EdgeInstance>,
    pub labels: Vec<Label>,
    pub overlays: Vec<Overlay>,
}

impl FrameDrawList {
    fn new(quality: QualitySettings) -> Self {
        Self {
            clear_color: CLEAR_COLOR,
            tier: DetailTier::High,
            quality,
            nodes: Vec::new(),
            edges: Vec::new(),
            labels: Vec::new(),
            overlays: Vec::new(),
        }
    }

    fn clear(&mut self) {
        self.clear_color = CLEAR_COLOR;
        self.nodes.clear();
        self.edges.clear();
        self.labels.clear();
        self.overlays.clear();
    }

    /// Approximate heap footprint in bytes.
    pub fn heap_bytes(&self) -> usize {
        self.nodes.capacity() * std::mem::size_of::<NodeInstance>()
            + self.edges.capacity() * std::mem::size_of::<EdgeInstance>()
            + self.labels.capacity() * std::mem::size_of::<Label>()
            + self.overlays.capacity() * std::mem::size_of::<Overlay>()
    }
}

/// Frame state the compositor reads.
#[derive(Debug, Clone, Copy)]
pub struct ComposeInput<'a> {
    pub graph: &'a Graph,
    pub culler: &'a ViewportCuller,
    pub tier: DetailTier,
    pub quality: QualitySettings,
    pub selected: Option<NodeId>,
    pub base_radius: f32,
    pub performance_mode: bool,
    pub fps: f32,
    pub memory_bytes: u64,
    pub alive_particles: usize,
}

/// Builds the draw list, reusing its buffers across frames.
#[derive(Debug)]
pub struct Compositor {
    list: FrameDrawList,
    /// Flow indices selected for drawing this frame
    edge_scratch: Vec<usize>,
}

impl Compositor {
    pub fn new(quality: QualitySettings) -> Self {
        Self {
            list: FrameDrawList::new(quality),
            edge_scratch: Vec::new(),
        }
    }

    pub fn draw_list(&self) -> &FrameDrawList {
        &self.list
    }

    /// Build the draw list for this frame.
    pub fn compose(&mut self, input: ComposeInput<'_>) -> &FrameDrawList {
        self.list.clear();
        self.list.tier = input.tier;
        self.list.quality = input.quality;

        self.compose_nodes(&input);
        self.compose_edges(&input);
        self.compose_overlays(&input);

        &self.list
    }

    fn compose_nodes(&mut self, input: &ComposeInput<'_>) {
        let tier = input.tier;
        let radius = tier.node_radius(input.base_radius);
        let selected = input.selected.and_then(|id| input.graph.index_of(id));

        for &idx in input.culler.visible() {
            let Some(node) = input.graph.node(idx) else {
                continue;
            };

            let mut flags = 0;
            if selected == Some(idx) {
                flags |= FLAG_SELECTED;
            }
            if tier.shows_detail_overlays() {
                flags |= FLAG_DETAIL;
            }

            self.list.nodes.push(NodeInstance {
                position: node.position.to_array(),
                radius,
                color: node_color(node.status, node.is_anomalous()),
                health: node.health,
                flags,
            });

            if tier.shows_labels() {
                self.list.labels.push(Label {
                    node: node.id,
                    anchor: node.position,
                    offset: radius + 4.0,
                });
            }
        }
    }

    fn compose_edges(&mut self, input: &ComposeInput<'_>) {
        let culler = input.culler;
        let graph = input.graph;
        let cap = input.quality.max_edges;

        self.edge_scratch.clear();
        let mut max_volume = 0.0f32;
        for (i, flow) in graph.flows().iter().enumerate() {
            if self.edge_scratch.len() >= cap {
                break;
            }
            let (Some(a), Some(b)) = (graph.index_of(flow.source), graph.index_of(flow.target)) else {
                continue;
            };
            if !culler.is_tracked(a) || !culler.is_tracked(b) {
                continue;
            }
            if !culler.is_visible(a) && !culler.is_visible(b) {
                continue;
            }
            max_volume = max_volume.max(flow.volume);
            self.edge_scratch.push(i);
        }

        let flows = graph.flows();
        let nodes = graph.nodes();
        for &i in &self.edge_scratch {
            let flow = &flows[i];
            let (Some(a), Some(b)) = (graph.index_of(flow.source), graph.index_of(flow.target)) else {
                continue;
            };
            let intensity = if max_volume > 0.0 {
                flow.volume / max_volume
            } else {
                0.0
            };
            let alpha = (0.25 + 0.75 * intensity).clamp(0.0, 1.0);
            self.list.edges.push(EdgeInstance {
                from: nodes[a].position.to_array(),
                to: nodes[b].position.to_array(),
                width: 1.0 + 3.0 * intensity,
                color: pack_rgba(0x38, 0xbd, 0xf8, (alpha * 255.0) as u8),
            });
        }
    }

    fn compose_overlays(&mut self, input: &ComposeInput<'_>) {
        if input.performance_mode {
            self.list.overlays.push(Overlay::PerformanceWarning);
        }
        self.list.overlays.push(Overlay::Stats {
            fps: input.fps,
            memory_bytes: input.memory_bytes,
            visible_nodes: input.culler.visible_count(),
            alive_particles: input.alive_particles,
        });
    }
}
