use crate::choreography::Phase;
use crate::engine::NetworkViz;

/// A read-only snapshot of what the visualization is doing.
///
/// Design intent:
/// - Observers cannot mutate or steer the engine.
/// - Snapshotting is *on-demand* and allocation-free; the frame loop stays unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EngineSnapshot {
    pub width: u32,
    pub height: u32,
    pub dark: bool,
    pub phase: Phase,
    pub scene_time: f64,
    pub cycles_completed: u64,

    pub nodes: usize,
    pub edges: usize,
    pub active_nodes: usize,
    pub active_edges: usize,
    pub active_signals: usize,
    pub pool_capacity: usize,

    /// `None` once torn down (or if no backend could be built).
    pub backend: Option<&'static str>,
    pub draw_calls: u32,
    pub ticks: u64,
}

pub struct VizAdapter<'a> {
    viz: &'a NetworkViz,
}

impl<'a> VizAdapter<'a> {
    pub fn new(viz: &'a NetworkViz) -> Self {
        Self { viz }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let viz = self.viz;
        let (width, height) = viz.size();
        let topology = viz.topology();
        let choreographer = viz.choreographer();
        let active = viz.active_sets();

        EngineSnapshot {
            width,
            height,
            dark: viz.theme().is_dark(),
            phase: choreographer.phase(),
            scene_time: choreographer.elapsed(),
            cycles_completed: choreographer.cycles_completed(),

            nodes: topology.nodes.len(),
            edges: topology.edges.len(),
            active_nodes: active.nodes.len(),
            active_edges: active.edges.len(),
            active_signals: viz.pool().len(),
            pool_capacity: viz.pool().capacity(),

            backend: viz.backend_name(),
            draw_calls: viz.last_stats().draw_calls,
            ticks: viz.ticks(),
        }
    }
}
