//! Fixed-capacity arena of travelling signals.
//!
//! Slots are preallocated once per topology. Acquiring pops an index off the
//! free list; releasing pushes it back. Handles carry a generation so a handle
//! kept past its release cannot touch the slot's next occupant.
//!
//! The active list is swept lazily: releases only flip the slot, and stale
//! entries are dropped when they pile up or every `SWEEP_INTERVAL` advances.

use crate::topology::EdgeId;

/// Hard cap on simultaneous signals regardless of topology size.
pub const MAX_SIGNALS: usize = 150;
/// Fraction of the edge count used to size the pool.
pub const EDGE_FRACTION: f32 = 0.3;
/// Advances between unconditional sweeps of the active list.
pub const SWEEP_INTERVAL: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDirection {
    /// Source to target; progress runs 0 -> 1.
    Forward,
    /// Error sweep, target to source; progress runs 1 -> 0.
    Backward,
}

#[derive(Debug, Clone, Copy)]
pub struct Signal {
    pub edge: EdgeId,
    /// Position along the edge, 0 at the source node and 1 at the target.
    pub progress: f32,
    pub direction: SignalDirection,
    pub intensity: f32,
    /// Travel time in seconds for the full edge.
    pub duration: f32,
    active: bool,
    generation: u32,
}

impl Signal {
    const EMPTY: Signal = Signal {
        edge: 0,
        progress: 0.0,
        direction: SignalDirection::Forward,
        intensity: 0.0,
        duration: 1.0,
        active: false,
        generation: 0,
    };

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn finished(&self) -> bool {
        match self.direction {
            SignalDirection::Forward => self.progress >= 1.0,
            SignalDirection::Backward => self.progress <= 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
pub struct SignalPool {
    slots: Vec<Signal>,
    free: Vec<u32>,
    active: Vec<SignalHandle>,
    live: usize,
    stale: usize,
    since_sweep: u32,
}

impl SignalPool {
    /// `min(150, edge_count * 0.3)` slots.
    pub fn capacity_for_edges(edge_count: usize) -> usize {
        ((edge_count as f32 * EDGE_FRACTION) as usize).min(MAX_SIGNALS)
    }

    pub fn for_edges(edge_count: usize) -> Self {
        Self::with_capacity(Self::capacity_for_edges(edge_count))
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![Signal::EMPTY; capacity],
            // Pop order hands out slot 0 first.
            free: (0..capacity as u32).rev().collect(),
            // Stale entries are bounded by `capacity` before a forced sweep.
            active: Vec::with_capacity(capacity * 2),
            live: 0,
            stale: 0,
            since_sweep: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Signals currently travelling.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Take a free slot, or `None` when the pool is exhausted.
    pub fn acquire(
        &mut self,
        edge: EdgeId,
        direction: SignalDirection,
        intensity: f32,
        duration: f32,
    ) -> Option<SignalHandle> {
        let index = self.free.pop()?;
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.edge = edge;
        slot.direction = direction;
        slot.progress = match direction {
            SignalDirection::Forward => 0.0,
            SignalDirection::Backward => 1.0,
        };
        slot.intensity = intensity.clamp(0.0, 1.0);
        slot.duration = duration.max(1e-3);
        slot.active = true;

        let handle = SignalHandle {
            index,
            generation: slot.generation,
        };
        self.active.push(handle);
        self.live += 1;
        Some(handle)
    }

    /// Return a slot to the free list. Stale handles are ignored.
    pub fn release(&mut self, handle: SignalHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if !slot.active || slot.generation != handle.generation {
            return false;
        }
        slot.active = false;
        self.free.push(handle.index);
        self.live -= 1;
        self.stale += 1;
        if self.stale >= self.slots.len() {
            self.sweep();
        }
        true
    }

    fn release_in_place(&mut self, index: u32) {
        self.slots[index as usize].active = false;
        self.free.push(index);
        self.live -= 1;
        self.stale += 1;
    }

    pub fn get(&self, handle: SignalHandle) -> Option<&Signal> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.active && s.generation == handle.generation)
    }

    /// Move every live signal along its edge; arrivals are released.
    pub fn advance(&mut self, dt: f32) {
        for i in 0..self.active.len() {
            let handle = self.active[i];
            let slot = &mut self.slots[handle.index as usize];
            if !slot.active || slot.generation != handle.generation {
                continue;
            }
            let step = dt / slot.duration;
            slot.progress = match slot.direction {
                SignalDirection::Forward => (slot.progress + step).min(1.0),
                SignalDirection::Backward => (slot.progress - step).max(0.0),
            };
            if slot.finished() {
                self.release_in_place(handle.index);
            }
        }

        self.since_sweep += 1;
        if self.since_sweep >= SWEEP_INTERVAL || self.stale >= self.slots.len() {
            self.sweep();
        }
    }

    /// Drop released entries from the active list.
    fn sweep(&mut self) {
        let slots = &self.slots;
        self.active.retain(|h| {
            let s = &slots[h.index as usize];
            s.active && s.generation == h.generation
        });
        self.stale = 0;
        self.since_sweep = 0;
    }

    /// Live signals, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Signal> + '_ {
        self.active.iter().filter_map(move |h| self.get(*h))
    }

    /// Release everything. Capacity is unchanged.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.active = false;
        }
        self.active.clear();
        self.free.clear();
        self.free.extend((0..self.slots.len() as u32).rev());
        self.live = 0;
        self.stale = 0;
        self.since_sweep = 0;
    }

    #[cfg(test)]
    fn active_list_len(&self) -> usize {
        self.active.len()
    }
}
