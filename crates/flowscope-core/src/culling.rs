//! Viewport culling on top of the spatial index.

use crate::geometry::Viewport;
use crate::graph::Graph;
use crate::spatial::SpatialIndex;

/// Limits applied by the culler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullingLimits {
    /// Maximum nodes tracked by the index (MAX_NODES)
    pub max_nodes: usize,
    /// Maximum nodes reported visible per frame (VIEWPORT_NODES)
    pub viewport_nodes: usize,
    /// World-space padding added around the viewport
    pub padding: f32,
}

/// Produces the capped set of visible node indices for a viewport.
#[derive(Debug)]
pub struct ViewportCuller {
    limits: CullingLimits,
    index: SpatialIndex,
    /// Graph generation the index was built from
    built_for: Option<u64>,
    visible: Vec<usize>,
    /// Membership mask over tracked node indices, parallel to `visible`
    visible_mask: Vec<bool>,
}

impl ViewportCuller {
    pub fn new(limits: CullingLimits) -> Self {
        Self {
            limits,
            index: SpatialIndex::new(),
            built_for: None,
            visible: Vec::with_capacity(limits.viewport_nodes),
            visible_mask: Vec::new(),
        }
    }

    /// Rebuild the index if the graph changed since the last build.
    ///
    /// Returns `true` when a rebuild happened.
    pub fn sync(&mut self, graph: &Graph) -> bool {
        if self.built_for == Some(graph.generation()) {
            return false;
        }
        self.rebuild(graph);
        true
    }

    fn rebuild(&mut self, graph: &Graph) {
        let start = std::time::Instant::now();
        self.index = SpatialIndex::build(graph.nodes(), self.limits.max_nodes);
        self.built_for = Some(graph.generation());
        self.visible.clear();
        self.visible_mask.clear();
        self.visible_mask.resize(self.index.len(), false);
        tracing::debug!(
            tracked = self.index.len(),
            depth = self.index.depth(),
            elapsed = ?start.elapsed(),
            "Rebuilt spatial index"
        );
    }

    /// Change the limits. A changed node cap forces a rebuild on next sync.
    pub fn set_limits(&mut self, limits: CullingLimits) {
        if limits.max_nodes != self.limits.max_nodes {
            self.built_for = None;
        }
        self.limits = limits;
    }

    pub fn limits(&self) -> CullingLimits {
        self.limits
    }

    /// Compute the visible set for `viewport`.
    pub fn cull(&mut self, viewport: &Viewport) -> &[usize] {
        for &idx in &self.visible {
            self.visible_mask[idx] = false;
        }
        self.index.query_into(
            viewport,
            self.limits.padding,
            self.limits.viewport_nodes,
            &mut self.visible,
        );
        for &idx in &self.visible {
            self.visible_mask[idx] = true;
        }
        &self.visible
    }

    /// Visible node indices from the last [`cull`](Self::cull).
    pub fn visible(&self) -> &[usize] {
        &self.visible
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    /// Whether a node index was in the last visible set.
    pub fn is_visible(&self, idx: usize) -> bool {
        self.visible_mask.get(idx).copied().unwrap_or(false)
    }

    /// Whether a node index is covered by the index at all.
    pub fn is_tracked(&self, idx: usize) -> bool {
        idx < self.index.len()
    }

    /// Number of nodes in the index.
    pub fn tracked_count(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Approximate heap footprint in bytes.
    pub fn heap_bytes(&self) -> usize {
        self.index.len() * std::mem::size_of::<crate::spatial::SpatialIndexEntry>()
            + self.visible.capacity() * std::mem::size_of::<usize>()
            + self.visible_mask.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::graph::{Node, NodeId};
    use glam::Vec2;

    fn limits() -> CullingLimits {
        CullingLimits {
            max_nodes: 1000,
            viewport_nodes: 200,
            padding: 50.0,
        }
    }

    fn line_graph(n: u64, spacing: f32) -> Graph {
        let mut graph = Graph::new();
        let nodes = (0..n)
            .map(|i| Node::new(NodeId(i), Vec2::new(i as f32 * spacing, 0.0)))
            .collect();
        graph.replace(nodes, Vec::new());
        graph
    }

    #[test]
    fn sync_only_rebuilds_on_new_generation() {
        let graph = line_graph(10, 10.0);
        let mut culler = ViewportCuller::new(limits());
        assert!(culler.sync(&graph));
        assert!(!culler.sync(&graph));
        assert_eq!(culler.tracked_count(), 10);
    }

    #[test]
    fn padding_includes_nodes_just_outside() {
        let graph = line_graph(10, 100.0);
        let mut culler = ViewportCuller::new(limits());
        culler.sync(&graph);

        // Node 3 sits at x=300, 40 units right of the viewport edge
        let visible = culler.cull(&Rect::new(0.0, 260.0, -10.0, 10.0)).to_vec();
        assert!(visible.contains(&3));
        assert!(!visible.contains(&4));
        assert!(culler.is_visible(3));
        assert!(!culler.is_visible(4));
    }

    #[test]
    fn visibility_mask_follows_latest_cull() {
        let graph = line_graph(10, 100.0);
        let mut culler = ViewportCuller::new(limits());
        culler.sync(&graph);
        culler.cull(&Rect::new(0.0, 10.0, -10.0, 10.0));
        assert!(culler.is_visible(0));
        culler.cull(&Rect::new(800.0, 900.0, -10.0, 10.0));
        assert!(!culler.is_visible(0));
        assert!(culler.is_visible(9));
    }

    #[test]
    fn shrinking_node_cap_forces_rebuild() {
        let graph = line_graph(50, 1.0);
        let mut culler = ViewportCuller::new(limits());
        culler.sync(&graph);
        culler.set_limits(CullingLimits {
            max_nodes: 20,
            ..limits()
        });
        assert!(culler.sync(&graph));
        assert_eq!(culler.tracked_count(), 20);
    }
}
