//! Entrance formation and steady-state propagation.
//!
//! The choreographer owns the scene clock and the task queue; the model
//! (`Topology`) and the `SignalPool` are owned by the engine and lent in on
//! every advance. Tasks are stamped with the topology generation they were
//! planned against and are dropped if the topology has since been rebuilt.
//!
//! Phases:
//! - `Idle`: no usable topology yet.
//! - `Forming`: nodes fly in from off-screen, edges fade in behind them.
//! - `Steady`: repeating cycles of forward activation waves, optionally
//!   followed by a backward "error" sweep.

use hashbrown::HashSet;

use crate::palette::Theme;
use crate::pool::{SignalDirection, SignalPool};
use crate::prng::Prng;
use crate::timeline::Timeline;
use crate::topology::{NodeId, Topology};

/// Seconds for one node's entrance tween.
pub const ENTRANCE_DURATION: f32 = 0.8;
/// Seconds for an edge to fade up to the theme ceiling.
pub const EDGE_FADE_DURATION: f32 = 0.6;
/// Pause between the end of forming and the first cycle.
pub const STEADY_LEAD_IN: f32 = 0.5;
/// Offset between cycle sources.
pub const SOURCE_STAGGER: f32 = 0.4;
/// Delay per layer hop within a source's wave.
pub const LAYER_HOP: f32 = 0.35;
/// Delay between consecutive activations within one layer.
pub const NODE_STEP: f32 = 0.04;
/// Travel time for a signal across one edge.
pub const SIGNAL_TRAVEL: f32 = 0.5;
/// Rest between cycles.
pub const REPEAT_DELAY: f32 = 1.5;
/// Share of each downstream layer that lights up per source.
pub const LAYER_FRACTION: f32 = 0.4;
/// Outgoing (or incoming, for the error sweep) edges fired per activation.
pub const MAX_FANOUT: usize = 8;
/// Intensity given to error-sweep signals.
pub const BACKWARD_INTENSITY: f32 = 0.7;
/// Upper bound on sources per cycle; the input layer never holds more.
pub const MAX_SOURCES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    #[default]
    Idle,
    Forming,
    Steady,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChoreographyParams {
    /// Multiplier on steady-state pacing. Entrance timing is unaffected.
    pub speed: f32,
    /// Follow each forward wave with a backward error sweep.
    pub training: bool,
    pub sources_min: usize,
    pub sources_max: usize,
}

impl Default for ChoreographyParams {
    fn default() -> Self {
        Self {
            speed: 1.0,
            training: true,
            sources_min: 2,
            sources_max: 4,
        }
    }
}

impl ChoreographyParams {
    fn sanitized(self) -> Self {
        let speed = if self.speed.is_finite() {
            self.speed.clamp(0.1, 10.0)
        } else {
            1.0
        };
        let sources_min = self.sources_min.clamp(1, MAX_SOURCES);
        Self {
            speed,
            training: self.training,
            sources_min,
            sources_max: self.sources_max.clamp(sources_min, MAX_SOURCES),
        }
    }

    fn scaled(&self, seconds: f32) -> f64 {
        (seconds / self.speed) as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    StartCycle,
    Activate { node: NodeId, generation: u64 },
    Backpropagate { node: NodeId, generation: u64 },
    CycleComplete { generation: u64 },
}

#[derive(Debug, Clone)]
pub struct Choreographer {
    params: ChoreographyParams,
    phase: Phase,
    /// Seconds since the current topology was built.
    elapsed: f64,
    entrance_end: f64,
    generation: u64,
    timeline: Timeline<Task>,
    rng: Prng,

    cycles_completed: u64,
    cycle_activated: HashSet<NodeId>,

    picks: Vec<usize>,
    wave: Vec<(usize, NodeId, f64)>,
}

/// Cubic ease-out: fast start, gentle landing.
pub fn ease_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

impl Choreographer {
    pub fn new(params: ChoreographyParams, rng: Prng) -> Self {
        Self {
            params: params.sanitized(),
            phase: Phase::Idle,
            elapsed: 0.0,
            entrance_end: 0.0,
            generation: 0,
            timeline: Timeline::new(),
            rng,
            cycles_completed: 0,
            cycle_activated: HashSet::new(),
            picks: Vec::new(),
            wave: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn params(&self) -> &ChoreographyParams {
        &self.params
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    pub fn pending_tasks(&self) -> usize {
        self.timeline.len()
    }

    /// Nodes activated so far in the current (or just finished) cycle.
    pub fn cycle_activated(&self) -> &HashSet<NodeId> {
        &self.cycle_activated
    }

    /// Scene time at which the entrance completes.
    pub fn entrance_end(&self) -> f64 {
        self.entrance_end
    }

    pub fn rng_mut(&mut self) -> &mut Prng {
        &mut self.rng
    }

    /// Forget all in-flight work and start over against `topology`.
    ///
    /// Must run before (or as part of) replacing the model, so nothing planned
    /// against the old arrays can fire afterwards.
    pub fn restart(&mut self, topology: &Topology, pool: &mut SignalPool) {
        self.cancel(pool);
        self.generation = topology.generation();
        self.elapsed = 0.0;
        self.entrance_end = (topology.max_entry_delay() + ENTRANCE_DURATION) as f64;
        self.phase = if topology.is_empty() {
            Phase::Idle
        } else {
            Phase::Forming
        };
    }

    /// Cancel every pending task and drop all signals.
    pub fn cancel(&mut self, pool: &mut SignalPool) {
        self.timeline.cancel_all();
        pool.clear();
        self.cycle_activated.clear();
        self.phase = Phase::Idle;
    }

    /// Advance the scene clock by `dt` seconds and apply everything due.
    pub fn advance(
        &mut self,
        dt: f32,
        topology: &mut Topology,
        pool: &mut SignalPool,
        theme: Theme,
    ) {
        if self.phase == Phase::Idle || topology.generation() != self.generation {
            return;
        }
        let dt = dt.max(0.0);
        self.elapsed += dt as f64;

        if self.phase == Phase::Forming {
            self.update_entrance(topology);
        }
        self.update_edge_fade(topology, theme);

        // Existing signals move before new ones are emitted at progress 0.
        pool.advance(dt);

        while let Some((_, task)) = self.timeline.pop_due(self.elapsed) {
            self.run(task, topology, pool);
        }

        for node in &mut topology.nodes {
            node.activation.advance(dt);
            node.activated = node.activation.is_live();
        }
        for edge in &mut topology.edges {
            edge.highlight.advance(dt);
        }
    }

    fn update_entrance(&mut self, topology: &mut Topology) {
        let now = self.elapsed as f32;
        if self.elapsed >= self.entrance_end {
            for node in &mut topology.nodes {
                node.position = node.target;
                node.opacity = 1.0;
            }
            self.phase = Phase::Steady;
            tracing::debug!(
                generation = self.generation,
                "entrance complete, starting propagation"
            );
            let first = self.elapsed + self.params.scaled(STEADY_LEAD_IN);
            self.timeline.schedule(first, Task::StartCycle);
            return;
        }

        for node in &mut topology.nodes {
            let t = ease_out((now - node.entry_delay) / ENTRANCE_DURATION);
            node.position = node.entry.lerp(node.target, t);
            node.opacity = t;
        }
    }

    fn update_edge_fade(&mut self, topology: &mut Topology, theme: Theme) {
        let now = self.elapsed as f32;
        let ceiling = theme.edge_opacity_ceiling();
        let nodes = &topology.nodes;
        for edge in &mut topology.edges {
            // Both endpoints must have begun entering.
            let start = nodes[edge.source]
                .entry_delay
                .max(nodes[edge.target].entry_delay);
            let t = ease_out((now - start) / EDGE_FADE_DURATION);
            edge.opacity = ceiling * t;
        }
    }

    fn run(&mut self, task: Task, topology: &mut Topology, pool: &mut SignalPool) {
        match task {
            Task::StartCycle => self.start_cycle(topology),
            Task::Activate { node, generation } => {
                if generation != topology.generation() {
                    return;
                }
                self.activate(node, topology, pool);
            }
            Task::Backpropagate { node, generation } => {
                if generation != topology.generation() {
                    return;
                }
                self.backpropagate(node, topology, pool);
            }
            Task::CycleComplete { generation } => {
                if generation != topology.generation() {
                    return;
                }
                self.cycles_completed += 1;
                let next = self.elapsed + self.params.scaled(REPEAT_DELAY);
                self.timeline.schedule(next, Task::StartCycle);
            }
        }
    }

    fn start_cycle(&mut self, topology: &Topology) {
        self.cycle_activated.clear();
        let input = topology.layer_range(0);
        if input.is_empty() {
            // Nothing to fire; try again later.
            let next = self.elapsed + self.params.scaled(REPEAT_DELAY);
            self.timeline.schedule(next, Task::StartCycle);
            return;
        }

        let generation = topology.generation();
        let travel = self.params.scaled(SIGNAL_TRAVEL);
        let k = self
            .rng
            .gen_inclusive_usize(self.params.sources_min, self.params.sources_max)
            .min(input.len());
        let mut sources = Vec::with_capacity(k);
        self.rng.sample_distinct(input.len(), k, &mut self.picks);
        sources.extend(self.picks.iter().map(|&i| input.start + i));

        let mut cycle_end = self.elapsed;
        for (si, &source) in sources.iter().enumerate() {
            let t0 = self.elapsed + self.params.scaled(SOURCE_STAGGER) * si as f64;
            self.plan_wave(topology, source, t0);

            let mut forward_end = t0;
            for &(_, node, at) in &self.wave {
                self.timeline.schedule(at, Task::Activate { node, generation });
                forward_end = forward_end.max(at);
            }
            forward_end += travel;
            cycle_end = cycle_end.max(forward_end);

            if self.params.training {
                let last_layer = topology.layer_count().saturating_sub(1);
                let mut step_in_layer = 0usize;
                let mut current_layer = usize::MAX;
                // Deepest layer first; layer 0 has no incoming edges.
                for &(layer, node, _) in self.wave.iter().rev() {
                    if layer == 0 {
                        continue;
                    }
                    if layer != current_layer {
                        current_layer = layer;
                        step_in_layer = 0;
                    }
                    let at = forward_end
                        + self.params.scaled(LAYER_HOP) * (last_layer - layer) as f64
                        + self.params.scaled(NODE_STEP) * step_in_layer as f64;
                    step_in_layer += 1;
                    self.timeline
                        .schedule(at, Task::Backpropagate { node, generation });
                    cycle_end = cycle_end.max(at + travel);
                }
            }
        }

        self.timeline
            .schedule(cycle_end, Task::CycleComplete { generation });
    }

    /// Fill `self.wave` with `(layer, node, time)` for one source, layer order.
    fn plan_wave(&mut self, topology: &Topology, source: NodeId, t0: f64) {
        self.wave.clear();
        self.wave.push((0, source, t0));
        for layer in 1..topology.layer_count() {
            let range = topology.layer_range(layer);
            let n = range.len();
            let count = ((n as f32 * LAYER_FRACTION).ceil() as usize).clamp(1, n);
            self.rng.sample_distinct(n, count, &mut self.picks);
            let base = t0 + self.params.scaled(LAYER_HOP) * layer as f64;
            for (i, &pick) in self.picks.iter().enumerate() {
                let at = base + self.params.scaled(NODE_STEP) * i as f64;
                self.wave.push((layer, range.start + pick, at));
            }
        }
    }

    fn activate(&mut self, node: NodeId, topology: &mut Topology, pool: &mut SignalPool) {
        let Some(n) = topology.nodes.get_mut(node) else {
            return;
        };
        n.activation.trigger();
        n.activated = true;
        self.cycle_activated.insert(node);

        let travel = self.params.scaled(SIGNAL_TRAVEL) as f32;
        for edge in topology.outgoing(node).take(MAX_FANOUT) {
            topology.edges[edge].highlight.trigger();
            // A full pool just means fewer sparks this frame.
            let _ = pool.acquire(edge, SignalDirection::Forward, 1.0, travel);
        }
    }

    fn backpropagate(&mut self, node: NodeId, topology: &mut Topology, pool: &mut SignalPool) {
        let travel = self.params.scaled(SIGNAL_TRAVEL) as f32;
        self.picks.clear();
        self.picks.extend(topology.incoming(node).take(MAX_FANOUT));
        for &edge in &self.picks {
            topology.edges[edge].highlight.trigger();
            let _ = pool.acquire(edge, SignalDirection::Backward, BACKWARD_INTENSITY, travel);
        }
    }
}
