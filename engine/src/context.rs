use std::collections::{BTreeMap, BTreeSet};

use crate::{circuit::Circuit, components::GateMemory, types::GateId};

/// State threaded by the caller through successive evaluations of one
/// circuit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationContext {
    /// Simulated time in milliseconds, read by CLOCK gates.
    pub time: f64,
    memory: BTreeMap<GateId, GateMemory>,
    dirty: BTreeSet<GateId>,
    known: BTreeSet<GateId>,
    // time up to which carried-over propagation has been paid for
    propagated_to: Option<f64>,
    depth: usize,
}

impl EvaluationContext {
    pub fn new() -> EvaluationContext {
        EvaluationContext::default()
    }

    pub fn at(time: f64) -> EvaluationContext {
        EvaluationContext {
            time,
            ..EvaluationContext::default()
        }
    }

    /// Context for the internal circuit of a custom gate.
    pub(crate) fn nested(time: f64, depth: usize) -> EvaluationContext {
        EvaluationContext {
            time,
            depth,
            ..EvaluationContext::default()
        }
    }

    /// How many custom gates enclose the circuit this context evaluates.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn advance(&mut self, dt_ms: f64) {
        self.time += dt_ms.max(0.0);
    }

    pub fn memory(&self, gate_id: &str) -> Option<&GateMemory> {
        self.memory.get(gate_id)
    }

    pub fn set_memory(&mut self, gate_id: &str, memory: GateMemory) {
        self.memory.insert(gate_id.to_string(), memory);
    }

    /// Asks the event-driven evaluator to recompute this gate next call.
    pub fn mark_dirty(&mut self, gate_id: &str) {
        self.dirty.insert(gate_id.to_string());
    }

    pub fn is_dirty(&self, gate_id: &str) -> bool {
        self.dirty.contains(gate_id)
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub(crate) fn take_dirty(&mut self) -> BTreeSet<GateId> {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn replace_dirty(&mut self, dirty: BTreeSet<GateId>) {
        if dirty.is_empty() {
            self.propagated_to = None;
        }
        self.dirty = dirty;
    }

    pub(crate) fn propagated_to(&self) -> Option<f64> {
        self.propagated_to
    }

    pub(crate) fn set_propagated_to(&mut self, time: Option<f64>) {
        self.propagated_to = time;
    }

    pub(crate) fn is_known(&self, gate_id: &str) -> bool {
        self.known.contains(gate_id)
    }

    /// Records the circuit's gates as seen and drops memory of gates that
    /// no longer exist, so a recycled id starts fresh.
    pub(crate) fn sync_with(&mut self, circuit: &Circuit) {
        self.known = circuit.gates.iter().map(|g| g.id.clone()).collect();
        let known = &self.known;
        self.memory.retain(|id, _| known.contains(id));
        self.dirty.retain(|id| known.contains(id));
        if self.dirty.is_empty() {
            self.propagated_to = None;
        }
    }

    pub fn forget(&mut self, gate_id: &str) {
        self.memory.remove(gate_id);
        self.dirty.remove(gate_id);
        self.known.remove(gate_id);
    }

    /// Drops all memory and bookkeeping but keeps the clock.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.dirty.clear();
        self.known.clear();
        self.propagated_to = None;
    }
}
