//! Quadtree over node positions.
//!
//! The tree is rebuilt wholesale whenever the node set changes; there is no
//! incremental insert or removal. Entries refer to nodes by their index in
//! the input slice.

use glam::Vec2;

use crate::geometry::Rect;
use crate::graph::Node;

/// Entries a leaf holds before it splits.
const LEAF_CAPACITY: usize = 8;

/// Depth limit; coincident points pile up in a leaf at this depth.
const MAX_DEPTH: u32 = 16;

/// A node position stored in the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialIndexEntry {
    /// Index of the node in the slice the tree was built from
    pub node: usize,
    pub position: Vec2,
}

#[derive(Debug)]
struct QuadNode {
    bounds: Rect,
    depth: u32,
    entries: Vec<SpatialIndexEntry>,
    /// Children in NW, NE, SW, SE order
    children: Option<Box<[QuadNode; 4]>>,
}

impl QuadNode {
    fn new(bounds: Rect, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            entries: Vec::new(),
            children: None,
        }
    }

    fn insert(&mut self, entry: SpatialIndexEntry) {
        let slot = quadrant_of(&self.bounds, entry.position);
        if let Some(children) = self.children.as_mut() {
            children[slot].insert(entry);
            return;
        }

        self.entries.push(entry);
        if self.entries.len() > LEAF_CAPACITY && self.depth < MAX_DEPTH {
            self.split();
        }
    }

    fn split(&mut self) {
        let [nw, ne, sw, se] = self.bounds.quadrants();
        let depth = self.depth + 1;
        let mut children = Box::new([
            QuadNode::new(nw, depth),
            QuadNode::new(ne, depth),
            QuadNode::new(sw, depth),
            QuadNode::new(se, depth),
        ]);
        for entry in self.entries.drain(..) {
            children[quadrant_of(&self.bounds, entry.position)].insert(entry);
        }
        self.children = Some(children);
    }

    /// Collect entries inside `area`, stopping once `out` holds `cap` items.
    fn query(&self, area: &Rect, cap: usize, out: &mut Vec<usize>) {
        if out.len() >= cap || !self.bounds.intersects(area) {
            return;
        }

        for entry in &self.entries {
            if out.len() >= cap {
                return;
            }
            if area.contains(entry.position) {
                out.push(entry.node);
            }
        }

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query(area, cap, out);
            }
        }
    }

    fn depth_reached(&self) -> u32 {
        match &self.children {
            Some(children) => children.iter().map(QuadNode::depth_reached).max().unwrap_or(self.depth),
            None => self.depth,
        }
    }
}

/// Quadtree keyed by node position.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    root: Option<QuadNode>,
    len: usize,
}

impl SpatialIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from the first `max_nodes` nodes in input order.
    ///
    /// Nodes past the cap are silently dropped.
    pub fn build(nodes: &[Node], max_nodes: usize) -> Self {
        let tracked = &nodes[..nodes.len().min(max_nodes)];
        if tracked.len() < nodes.len() {
            tracing::debug!(
                tracked = tracked.len(),
                dropped = nodes.len() - tracked.len(),
                "Node set exceeds index cap"
            );
        }

        let Some(bounds) = Rect::from_points(tracked.iter().map(|n| n.position)) else {
            return Self::new();
        };
        // Degenerate extents (single point, a line) still need a splittable box
        let bounds = square_up(bounds);

        let mut root = QuadNode::new(bounds, 0);
        for (node, n) in tracked.iter().enumerate() {
            root.insert(SpatialIndexEntry {
                node,
                position: n.position,
            });
        }

        Self {
            root: Some(root),
            len: tracked.len(),
        }
    }

    /// Node indices inside `viewport` grown by `padding`, at most `cap` of them.
    ///
    /// When more than `cap` nodes qualify, the first `cap` met in traversal
    /// order (NW, NE, SW, SE, depth first) are returned.
    pub fn query(&self, viewport: &Rect, padding: f32, cap: usize) -> Vec<usize> {
        let mut out = Vec::new();
        self.query_into(viewport, padding, cap, &mut out);
        out
    }

    /// Same as [`query`](Self::query), writing into a reusable buffer.
    pub fn query_into(&self, viewport: &Rect, padding: f32, cap: usize, out: &mut Vec<usize>) {
        out.clear();
        if let Some(root) = &self.root {
            let area = viewport.expand(padding);
            root.query(&area, cap, out);
        }
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bounds covered by the root, if any.
    pub fn bounds(&self) -> Option<Rect> {
        self.root.as_ref().map(|r| r.bounds)
    }

    /// Deepest level reached by any leaf.
    pub fn depth(&self) -> u32 {
        self.root.as_ref().map_or(0, QuadNode::depth_reached)
    }
}

/// Child slot for a point: NW, NE, SW, SE.
#[inline]
fn quadrant_of(bounds: &Rect, p: Vec2) -> usize {
    let c = bounds.center();
    match (p.x >= c.x, p.y >= c.y) {
        (false, false) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (true, true) => 3,
    }
}

/// Expand the shorter side so both sides match, keeping the center.
fn square_up(bounds: Rect) -> Rect {
    let side = bounds.width().max(bounds.height()).max(1.0);
    let c = bounds.center();
    let half = side * 0.5;
    // min/max against the input guards against rounding at the edges
    Rect::new(
        (c.x - half).min(bounds.min_x),
        (c.x + half).max(bounds.max_x),
        (c.y - half).min(bounds.min_y),
        (c.y + half).max(bounds.max_y),
    )
}
