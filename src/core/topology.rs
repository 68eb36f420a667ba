//! Layered network layout.
//!
//! Nodes are stored layer-major and edges source-major, so the outgoing edges
//! of node `i` live at `edges[edge_offsets[i]..edge_offsets[i + 1]]` (CSR
//! layout). Layers are not stored: they are derived from the layer-size list.

use core::ops::Range;

use crate::prng::Prng;

pub type NodeId = usize;
pub type EdgeId = usize;

/// Pixels kept clear above and below each column.
pub const PADDING: f32 = 40.0;
/// How far beyond the viewport edge a node starts its entrance.
pub const OFFSCREEN_MARGIN: f32 = 100.0;
/// Entrance delay added per layer (seconds).
pub const LAYER_STAGGER: f32 = 0.15;
/// Entrance delay added per node within a layer (seconds).
pub const NODE_STAGGER: f32 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn lerp(self, other: Point, t: f32) -> Point {
        Point {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

/// Side of the viewport a node flies in from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDirection {
    Top,
    Right,
    Bottom,
    Left,
}

impl EntryDirection {
    pub fn for_layer(layer: usize) -> Self {
        match layer % 4 {
            0 => EntryDirection::Top,
            1 => EntryDirection::Right,
            2 => EntryDirection::Bottom,
            _ => EntryDirection::Left,
        }
    }

    /// Starting point for a node whose final position is `target`.
    pub fn entry_point(self, target: Point, width: f32, height: f32) -> Point {
        match self {
            EntryDirection::Top => Point::new(target.x, -OFFSCREEN_MARGIN),
            EntryDirection::Bottom => Point::new(target.x, height + OFFSCREEN_MARGIN),
            EntryDirection::Left => Point::new(-OFFSCREEN_MARGIN, target.y),
            EntryDirection::Right => Point::new(width + OFFSCREEN_MARGIN, target.y),
        }
    }
}

/// Rise-then-decay envelope shared by node activation and edge highlights.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pulse {
    pub intensity: f32,
    rising: bool,
}

/// Seconds for a pulse to rise from 0 to 1.
pub const PULSE_RISE: f32 = 0.12;
/// Exponential decay time constant once the peak is reached.
pub const PULSE_DECAY_TAU: f32 = 0.5;
/// Below this a pulse is considered finished.
pub const PULSE_FLOOR: f32 = 0.01;

impl Pulse {
    pub fn trigger(&mut self) {
        self.rising = true;
    }

    pub fn is_live(&self) -> bool {
        self.rising || self.intensity > 0.0
    }

    pub fn advance(&mut self, dt: f32) {
        if self.rising {
            self.intensity += dt / PULSE_RISE;
            if self.intensity >= 1.0 {
                self.intensity = 1.0;
                self.rising = false;
            }
        } else if self.intensity > 0.0 {
            self.intensity *= (-dt / PULSE_DECAY_TAU).exp();
            if self.intensity < PULSE_FLOOR {
                self.intensity = 0.0;
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Pulse::default();
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub layer: usize,
    pub index: usize,

    pub position: Point,
    pub target: Point,
    pub entry: Point,
    pub entry_direction: EntryDirection,
    /// Seconds after the build before the entrance tween starts.
    pub entry_delay: f32,

    pub opacity: f32,
    /// Set while the activation pulse is non-zero.
    pub activated: bool,
    pub activation: Pulse,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    /// Decorative only: the sign picks a color, nothing else reads it.
    pub weight: f32,
    pub opacity: f32,
    pub highlight: Pulse,
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// CSR offsets: node `i` owns edges `edge_offsets[i]..edge_offsets[i + 1]`.
    pub edge_offsets: Vec<usize>,
    layer_sizes: Vec<usize>,
    width: f32,
    height: f32,
    generation: u64,
}

impl Topology {
    /// Lay out nodes and wire adjacent layers densely.
    ///
    /// Zero-sized layers are skipped. A zero-area viewport or an empty size
    /// list produces an empty topology: there is nothing to draw yet.
    pub fn generate(
        width: f32,
        height: f32,
        layer_sizes: &[usize],
        generation: u64,
        rng: &mut Prng,
    ) -> Self {
        let sizes: Vec<usize> = layer_sizes.iter().copied().filter(|&n| n > 0).collect();
        if !(width > 0.0 && height > 0.0) || sizes.is_empty() {
            return Self {
                width: width.max(0.0),
                height: height.max(0.0),
                generation,
                ..Self::default()
            };
        }

        let layer_count = sizes.len();
        let padding = PADDING.min(height / 4.0);
        let column_step = width / (layer_count as f32 + 1.0);

        let node_count: usize = sizes.iter().sum();
        let mut nodes = Vec::with_capacity(node_count);
        for (layer, &n) in sizes.iter().enumerate() {
            let x = column_step * (layer as f32 + 1.0);
            let row_step = (height - 2.0 * padding) / (n as f32 + 1.0);
            let entry_direction = EntryDirection::for_layer(layer);
            for index in 0..n {
                let target = Point::new(x, padding + row_step * (index as f32 + 1.0));
                let entry = entry_direction.entry_point(target, width, height);
                nodes.push(Node {
                    layer,
                    index,
                    position: entry,
                    target,
                    entry,
                    entry_direction,
                    entry_delay: layer as f32 * LAYER_STAGGER + index as f32 * NODE_STAGGER,
                    opacity: 0.0,
                    activated: false,
                    activation: Pulse::default(),
                });
            }
        }

        let edge_count: usize = sizes.windows(2).map(|w| w[0] * w[1]).sum();
        let mut edges = Vec::with_capacity(edge_count);
        let mut edge_offsets = Vec::with_capacity(node_count + 1);
        let mut layer_start = 0;
        for (layer, &n) in sizes.iter().enumerate() {
            let next_start = layer_start + n;
            let next_len = sizes.get(layer + 1).copied().unwrap_or(0);
            for source in layer_start..next_start {
                edge_offsets.push(edges.len());
                for target in next_start..next_start + next_len {
                    edges.push(Edge {
                        source,
                        target,
                        weight: rng.gen_range_f32(-1.0, 1.0),
                        opacity: 0.0,
                        highlight: Pulse::default(),
                    });
                }
            }
            layer_start = next_start;
        }
        edge_offsets.push(edges.len());

        Self {
            nodes,
            edges,
            edge_offsets,
            layer_sizes: sizes,
            width,
            height,
            generation,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    pub fn layer_count(&self) -> usize {
        self.layer_sizes.len()
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    /// Node ids of `layer`, derived from the size list.
    pub fn layer_range(&self, layer: usize) -> Range<NodeId> {
        let start: usize = self.layer_sizes.iter().take(layer).sum();
        let len = self.layer_sizes.get(layer).copied().unwrap_or(0);
        start..start + len
    }

    pub fn outgoing(&self, node: NodeId) -> Range<EdgeId> {
        match (self.edge_offsets.get(node), self.edge_offsets.get(node + 1)) {
            (Some(&a), Some(&b)) => a..b,
            _ => 0..0,
        }
    }

    /// Incoming edges of `node`. Edges are source-major, so these are strided.
    pub fn incoming(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        let layer = self.nodes.get(node).map(|n| n.layer);
        let (sources, offset) = match layer {
            Some(l) if l > 0 => (self.layer_range(l - 1), node - self.layer_range(l).start),
            _ => (0..0, 0),
        };
        sources.map(move |s| self.edge_offsets[s] + offset)
    }

    /// Largest entry delay: the entrance ends `ENTRANCE_DURATION` after it.
    pub fn max_entry_delay(&self) -> f32 {
        self.nodes
            .iter()
            .map(|n| n.entry_delay)
            .fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(w: f32, h: f32, sizes: &[usize], seed: u64) -> Topology {
        Topology::generate(w, h, sizes, 1, &mut Prng::new(seed))
    }

    #[test]
    fn counts_match_dense_adjacent_wiring() {
        for sizes in [
            vec![5, 10, 15, 10, 5],
            vec![5, 10, 10, 5],
            vec![1, 1],
            vec![3, 7],
            vec![2, 9, 4, 6, 1, 8],
        ] {
            let t = build(800.0, 400.0, &sizes, 9);
            let nodes: usize = sizes.iter().sum();
            let edges: usize = sizes.windows(2).map(|w| w[0] * w[1]).sum();
            assert_eq!(t.nodes.len(), nodes);
            assert_eq!(t.edges.len(), edges);
        }
    }

    #[test]
    fn edges_only_connect_adjacent_layers() {
        let t = build(640.0, 480.0, &[4, 6, 3], 5);
        for e in &t.edges {
            let sl = t.nodes[e.source].layer;
            let tl = t.nodes[e.target].layer;
            assert_eq!(sl + 1, tl);
            assert!((-1.0..=1.0).contains(&e.weight));
        }
    }

    #[test]
    fn targets_stay_inside_padded_bounds() {
        let (w, h) = (800.0, 400.0);
        let t = build(w, h, &[5, 10, 15, 10, 5], 1);
        for n in &t.nodes {
            assert!(n.target.x > 0.0 && n.target.x < w);
            assert!(n.target.y >= PADDING && n.target.y <= h - PADDING);
        }
    }

    #[test]
    fn tiny_viewport_still_lays_out_inside() {
        let t = build(30.0, 20.0, &[3, 3], 1);
        for n in &t.nodes {
            assert!(n.target.y > 0.0 && n.target.y < 20.0);
        }
    }

    #[test]
    fn layout_is_deterministic_weights_are_not() {
        let a = build(800.0, 400.0, &[5, 10, 10, 5], 1);
        let b = build(800.0, 400.0, &[5, 10, 10, 5], 2);
        for (na, nb) in a.nodes.iter().zip(&b.nodes) {
            assert_eq!(na.target, nb.target);
            assert_eq!(na.entry_delay, nb.entry_delay);
            assert_eq!(na.entry_direction, nb.entry_direction);
        }
        assert!(a
            .edges
            .iter()
            .zip(&b.edges)
            .any(|(ea, eb)| ea.weight != eb.weight));
    }

    #[test]
    fn column_and_row_formulas() {
        let t = build(800.0, 400.0, &[5, 10, 10, 5], 1);
        // 4 layers: columns at 800/5 * (i+1)
        assert_eq!(t.nodes[0].target.x, 160.0);
        assert_eq!(t.nodes[t.layer_range(3).start].target.x, 640.0);
        // First row of a 5-node layer: 40 + 320/6
        assert!((t.nodes[0].target.y - (40.0 + 320.0 / 6.0)).abs() < 1e-4);
    }

    #[test]
    fn entry_directions_cycle_and_start_offscreen() {
        let t = build(800.0, 400.0, &[1, 1, 1, 1, 1], 1);
        let dirs: Vec<_> = t.nodes.iter().map(|n| n.entry_direction).collect();
        assert_eq!(
            dirs,
            vec![
                EntryDirection::Top,
                EntryDirection::Right,
                EntryDirection::Bottom,
                EntryDirection::Left,
                EntryDirection::Top
            ]
        );
        assert_eq!(t.nodes[0].entry.y, -OFFSCREEN_MARGIN);
        assert_eq!(t.nodes[1].entry.x, 800.0 + OFFSCREEN_MARGIN);
        assert_eq!(t.nodes[2].entry.y, 400.0 + OFFSCREEN_MARGIN);
        assert_eq!(t.nodes[3].entry.x, -OFFSCREEN_MARGIN);
        assert!(t.nodes.iter().all(|n| n.position == n.entry && n.opacity == 0.0));
    }

    #[test]
    fn delays_grow_diagonally() {
        let t = build(800.0, 400.0, &[3, 3], 1);
        assert_eq!(t.nodes[0].entry_delay, 0.0);
        assert!((t.nodes[2].entry_delay - 2.0 * NODE_STAGGER).abs() < 1e-6);
        assert!((t.nodes[3].entry_delay - LAYER_STAGGER).abs() < 1e-6);
        assert!((t.max_entry_delay() - (LAYER_STAGGER + 2.0 * NODE_STAGGER)).abs() < 1e-6);
    }

    #[test]
    fn csr_offsets_cover_outgoing_edges() {
        let t = build(800.0, 400.0, &[2, 3, 2], 4);
        assert_eq!(t.edge_offsets.len(), t.nodes.len() + 1);
        for node in 0..t.nodes.len() {
            for e in t.outgoing(node) {
                assert_eq!(t.edges[e].source, node);
            }
        }
        // Last layer has no outgoing edges.
        assert!(t.outgoing(t.nodes.len() - 1).is_empty());
    }

    #[test]
    fn incoming_edges_point_at_node() {
        let t = build(800.0, 400.0, &[2, 3, 2], 4);
        for node in 0..t.nodes.len() {
            let incoming: Vec<_> = t.incoming(node).collect();
            let expected = match t.nodes[node].layer {
                0 => 0,
                l => t.layer_sizes()[l - 1],
            };
            assert_eq!(incoming.len(), expected);
            for e in incoming {
                assert_eq!(t.edges[e].target, node);
            }
        }
    }

    #[test]
    fn degenerate_inputs_produce_nothing() {
        assert!(build(0.0, 400.0, &[3, 3], 1).is_empty());
        assert!(build(800.0, 0.0, &[3, 3], 1).is_empty());
        assert!(build(800.0, 400.0, &[], 1).is_empty());
        assert!(build(800.0, 400.0, &[0, 0], 1).is_empty());

        let single = build(800.0, 400.0, &[0, 4, 0], 1);
        assert_eq!(single.nodes.len(), 4);
        assert!(single.edges.is_empty());
    }

    #[test]
    fn pulse_rises_then_decays() {
        let mut p = Pulse::default();
        p.trigger();
        p.advance(PULSE_RISE / 2.0);
        assert!((p.intensity - 0.5).abs() < 1e-4);
        p.advance(PULSE_RISE);
        assert_eq!(p.intensity, 1.0);
        p.advance(PULSE_DECAY_TAU);
        assert!(p.intensity < 0.4 && p.intensity > 0.3);
        for _ in 0..100 {
            p.advance(0.1);
        }
        assert_eq!(p.intensity, 0.0);
        assert!(!p.is_live());
    }
}
