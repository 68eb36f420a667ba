//! Render backends.
//!
//! Both backends draw the same [`Scene`] into an owned RGBA8 premultiplied
//! frame of the mounted size. Which one runs is decided once by the
//! [`selector::BackendSelector`]; everything above it only sees the
//! [`RenderBackend`] trait.
//!
//! The visual mapping from model state to primitives (sizes, colors, glow)
//! lives here so the two backends cannot drift apart.

use hashbrown::HashSet;

use crate::palette::{ColorScheme, Rgba, Theme};
use crate::pool::{Signal, SignalDirection, SignalPool};
use crate::topology::{Edge, EdgeId, Node, NodeId, Point, Topology};

#[cfg(feature = "gpu")]
pub mod gpu;
pub mod raster;
pub mod selector;

/// Pulses above this count as "active" for the frame.
pub const ACTIVE_THRESHOLD: f32 = 0.05;
pub const NODE_RADIUS: f32 = 4.0;
/// Extra radius at full activation.
pub const NODE_ACTIVE_GROWTH: f32 = 3.0;
pub const SIGNAL_RADIUS: f32 = 2.0;
pub const EDGE_WIDTH: f32 = 1.0;
/// Extra stroke width at full highlight.
pub const EDGE_ACTIVE_GROWTH: f32 = 1.5;
/// Glow reach in pixels at glow intensity 1.0 (the raster blur-shadow).
pub const SHADOW_BLUR: f32 = 15.0;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("could not allocate a {width}x{height} surface")]
    Surface { width: u32, height: u32 },
    #[error("GPU rendering is not available: {0}")]
    Unsupported(&'static str),
    #[error("no suitable GPU adapter found")]
    Adapter,
    #[error("GPU device request failed: {0}")]
    Device(String),
    #[error("shader or pipeline creation failed: {0}")]
    Shader(String),
    #[error("GPU error during render: {0}")]
    Gpu(String),
    #[error("frame readback failed: {0}")]
    Readback(String),
    #[error("backend has been disposed")]
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BackendKind {
    Gpu,
    Raster,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Gpu => "gpu",
            BackendKind::Raster => "raster",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Batched draw submissions issued for the frame.
    pub draw_calls: u32,
}

/// Borrowed view of the last rendered frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub width: u32,
    pub height: u32,
    /// Premultiplied RGBA8, row-major, no padding.
    pub pixels: &'a [u8],
}

/// Node and edge ids lit up this frame.
#[derive(Debug, Clone, Default)]
pub struct ActiveSets {
    pub nodes: HashSet<NodeId>,
    pub edges: HashSet<EdgeId>,
}

impl ActiveSets {
    pub fn recompute(&mut self, topology: &Topology) {
        self.nodes.clear();
        self.edges.clear();
        self.nodes.extend(
            topology
                .nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.activated && n.activation.intensity > ACTIVE_THRESHOLD)
                .map(|(i, _)| i),
        );
        self.edges.extend(
            topology
                .edges
                .iter()
                .enumerate()
                .filter(|(_, e)| e.highlight.intensity > ACTIVE_THRESHOLD)
                .map(|(i, _)| i),
        );
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }
}

/// Everything a backend needs for one frame. Colors are resolved by the
/// caller per frame; backends must not keep them.
#[derive(Clone, Copy)]
pub struct Scene<'a> {
    pub nodes: &'a [Node],
    pub edges: &'a [Edge],
    pub signals: &'a SignalPool,
    pub active: &'a ActiveSets,
    pub colors: &'a ColorScheme,
    pub glow_intensity: f32,
    pub theme: Theme,
}

/// Shared draw contract.
pub trait RenderBackend {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    fn render(&mut self, scene: &Scene<'_>) -> Result<RenderStats, RenderError>;

    fn is_ready(&self) -> bool;

    /// Free every backend resource. Rendering afterwards fails with `Disposed`.
    fn dispose(&mut self);

    fn frame(&self) -> Option<FrameView<'_>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeStyle {
    pub center: Point,
    pub radius: f32,
    pub color: Rgba,
    /// Bright center for active nodes.
    pub core: Option<Rgba>,
    /// Glow strength in `[0, 2]`; the halo reaches `radius + SHADOW_BLUR * glow`.
    pub glow: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeStyle {
    pub from: Point,
    pub to: Point,
    pub color: Rgba,
    pub width: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalStyle {
    pub center: Point,
    pub radius: f32,
    pub color: Rgba,
}

pub fn node_style(scene: &Scene<'_>, id: NodeId) -> Option<NodeStyle> {
    let node = scene.nodes.get(id)?;
    if node.opacity <= 0.0 {
        return None;
    }
    let a = node.activation.intensity;
    let active = scene.active.nodes.contains(&id);
    let color = scene
        .colors
        .node
        .lerp(scene.colors.signal, a)
        .fade(node.opacity);
    let core = active.then(|| scene.colors.active_center.fade(a * node.opacity));
    Some(NodeStyle {
        center: node.position,
        radius: NODE_RADIUS + NODE_ACTIVE_GROWTH * a,
        color,
        core,
        glow: scene.glow_intensity * (0.35 + 0.65 * a) * node.opacity,
    })
}

pub fn edge_style(scene: &Scene<'_>, id: EdgeId) -> Option<EdgeStyle> {
    let edge = scene.edges.get(id)?;
    let h = if scene.active.edges.contains(&id) {
        edge.highlight.intensity
    } else {
        0.0
    };
    // Weight sign only picks the resting color.
    let base = if edge.weight >= 0.0 {
        scene.colors.connection
    } else {
        scene.colors.particle
    };
    let alpha = edge.opacity + (0.8 - edge.opacity).max(0.0) * h;
    if alpha <= 0.001 {
        return None;
    }
    Some(EdgeStyle {
        from: scene.nodes.get(edge.source)?.position,
        to: scene.nodes.get(edge.target)?.position,
        color: base.lerp(scene.colors.signal, h).with_alpha(alpha),
        width: EDGE_WIDTH + EDGE_ACTIVE_GROWTH * h,
    })
}

pub fn signal_style(scene: &Scene<'_>, signal: &Signal) -> Option<SignalStyle> {
    let edge = scene.edges.get(signal.edge)?;
    let from = scene.nodes.get(edge.source)?.position;
    let to = scene.nodes.get(edge.target)?.position;
    let color = match signal.direction {
        SignalDirection::Forward => scene.colors.signal,
        SignalDirection::Backward => scene.colors.particle,
    };
    Some(SignalStyle {
        center: from.lerp(to, signal.progress.clamp(0.0, 1.0)),
        radius: SIGNAL_RADIUS + 1.5 * signal.intensity,
        color: color.fade(signal.intensity),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::palette::{resolve, ColorOverrides};
    use crate::prng::Prng;

    /// A settled topology with every node visible and one lit path.
    pub fn settled(
        width: f32,
        height: f32,
        sizes: &[usize],
    ) -> (Topology, SignalPool, ActiveSets, ColorScheme) {
        let mut rng = Prng::new(17);
        let mut topo = Topology::generate(width, height, sizes, 1, &mut rng);
        for n in &mut topo.nodes {
            n.position = n.target;
            n.opacity = 1.0;
        }
        for e in &mut topo.edges {
            e.opacity = 0.2;
        }
        let mut pool = SignalPool::for_edges(topo.edges.len());
        if !topo.edges.is_empty() {
            topo.nodes[0].activation.trigger();
            topo.nodes[0].activation.advance(1.0);
            topo.nodes[0].activated = true;
            topo.edges[0].highlight.trigger();
            topo.edges[0].highlight.advance(1.0);
            let h = pool.acquire(0, SignalDirection::Forward, 1.0, 1.0);
            assert!(h.is_some());
            pool.advance(0.5);
        }
        let mut active = ActiveSets::default();
        active.recompute(&topo);
        let colors = resolve(Theme::Dark, &ColorOverrides::default());
        (topo, pool, active, colors)
    }

    pub fn scene<'a>(
        topo: &'a Topology,
        pool: &'a SignalPool,
        active: &'a ActiveSets,
        colors: &'a ColorScheme,
    ) -> Scene<'a> {
        Scene {
            nodes: &topo.nodes,
            edges: &topo.edges,
            signals: pool,
            active,
            colors,
            glow_intensity: 0.8,
            theme: Theme::Dark,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn active_sets_follow_pulses() {
        let (topo, _pool, active, _) = settled(800.0, 400.0, &[3, 3]);
        assert_eq!(active.nodes.len(), 1);
        assert!(active.nodes.contains(&0));
        assert_eq!(active.edges.len(), 1);
        assert!(active.edges.contains(&0));

        let mut cleared = active.clone();
        let mut calm = topo.clone();
        calm.nodes[0].activation.reset();
        calm.nodes[0].activated = false;
        calm.edges[0].highlight.reset();
        cleared.recompute(&calm);
        assert!(cleared.nodes.is_empty() && cleared.edges.is_empty());
    }

    #[test]
    fn active_node_is_larger_and_has_core() {
        let (topo, pool, active, colors) = settled(800.0, 400.0, &[3, 3]);
        let scene = scene(&topo, &pool, &active, &colors);
        let hot = node_style(&scene, 0).unwrap();
        let cold = node_style(&scene, 1).unwrap();
        assert!(hot.radius > cold.radius);
        assert!(hot.core.is_some());
        assert!(cold.core.is_none());
        assert!(hot.glow > cold.glow);
    }

    #[test]
    fn invisible_nodes_are_skipped() {
        let (mut topo, pool, active, colors) = settled(800.0, 400.0, &[3, 3]);
        topo.nodes[2].opacity = 0.0;
        let scene = scene(&topo, &pool, &active, &colors);
        assert!(node_style(&scene, 2).is_none());
        assert!(node_style(&scene, 99).is_none());
    }

    #[test]
    fn weight_sign_picks_resting_color() {
        let (mut topo, pool, active, colors) = settled(800.0, 400.0, &[2, 2]);
        topo.edges[1].weight = 0.5;
        topo.edges[2].weight = -0.5;
        let scene = scene(&topo, &pool, &active, &colors);
        let pos = edge_style(&scene, 1).unwrap();
        let neg = edge_style(&scene, 2).unwrap();
        assert_eq!(pos.color.with_alpha(1.0), colors.connection);
        assert_eq!(neg.color.with_alpha(1.0), colors.particle);
        assert_eq!(pos.width, EDGE_WIDTH);
    }

    #[test]
    fn highlighted_edge_is_wider_and_brighter() {
        let (topo, pool, active, colors) = settled(800.0, 400.0, &[2, 2]);
        let scene = scene(&topo, &pool, &active, &colors);
        let lit = edge_style(&scene, 0).unwrap();
        let rest = edge_style(&scene, 1).unwrap();
        assert!(lit.width > rest.width);
        assert!(lit.color.a > rest.color.a);
    }

    #[test]
    fn signal_sits_along_its_edge() {
        let (topo, pool, active, colors) = settled(800.0, 400.0, &[2, 2]);
        let scene = scene(&topo, &pool, &active, &colors);
        let signal = pool.iter().next().unwrap();
        let style = signal_style(&scene, signal).unwrap();
        let e = &topo.edges[0];
        let mid = topo.nodes[e.source]
            .position
            .lerp(topo.nodes[e.target].position, 0.5);
        assert!((style.center.x - mid.x).abs() < 1e-3);
        assert!((style.center.y - mid.y).abs() < 1e-3);
    }
}
