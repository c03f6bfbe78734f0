use std::collections::VecDeque;

use crate::{
    circuit::{Circuit, PinEndpoint},
    components::{CustomGateDefinition, Gate, Position},
    config::EngineConfig,
    context::EvaluationContext,
    error::CircuitError,
    hybrid::{EvaluationResult, Evaluator},
    timing::{SystemClock, TimeSource, TimingCapture, TimingEvent},
    types::{GateId, WireId},
};

/// An edit waiting to be applied before the next tick.
#[derive(Debug, Clone)]
pub enum CircuitUpdateOps {
    AddGate(Gate),
    AddCustomGate(CustomGateDefinition, Position),
    RemoveGate(GateId),
    Connect(PinEndpoint, PinEndpoint),
    Disconnect(WireId),
    SetInput(GateId, bool),
    SetClockRunning(GateId, bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Synced,
    Error(String),
    NotSynced,
}

impl SyncState {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncState::Synced)
    }
    pub fn is_error(&self) -> bool {
        matches!(self, SyncState::Error(_))
    }
    pub fn error_msg(&self) -> &str {
        if let SyncState::Error(msg) = self {
            msg
        } else {
            ""
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub result: EvaluationResult,
    pub events: Vec<TimingEvent>,
}

pub struct SimulationRunner<T: TimeSource = SystemClock> {
    circuit: Circuit,
    context: EvaluationContext,
    evaluator: Evaluator,
    capture: TimingCapture<T>,
    pending: VecDeque<CircuitUpdateOps>,
    sync: SyncState,
}

impl<T: TimeSource> SimulationRunner<T> {
    pub fn new(circuit: Circuit, config: EngineConfig, capture: TimingCapture<T>) -> Self {
        SimulationRunner {
            circuit,
            context: EvaluationContext::new(),
            evaluator: Evaluator::new(config),
            capture,
            pending: VecDeque::new(),
            sync: SyncState::NotSynced,
        }
    }

    pub fn push(&mut self, op: CircuitUpdateOps) {
        self.pending.push_back(op);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn apply(&mut self, op: CircuitUpdateOps) -> Result<(), CircuitError> {
        let config = self.evaluator.config();
        match op {
            CircuitUpdateOps::AddGate(gate) => {
                let id = self.circuit.insert_gate(gate)?;
                log::info!("added gate {id}");
            }
            CircuitUpdateOps::AddCustomGate(definition, position) => {
                let name = definition.name.clone();
                let id = self.circuit.add_custom_gate(definition, position);
                log::info!("added custom gate {id} ({name})");
            }
            CircuitUpdateOps::RemoveGate(id) => {
                self.circuit.remove_gate(&id)?;
                self.context.forget(&id);
                log::info!("removed gate {id}");
            }
            CircuitUpdateOps::Connect(a, b) => {
                let id = self.circuit.connect(a, b, config)?;
                log::info!("connected {id}");
            }
            CircuitUpdateOps::Disconnect(wire_id) => {
                let wire = self.circuit.disconnect(&wire_id)?;
                self.context.mark_dirty(&wire.to.gate_id);
                log::info!("disconnected {wire_id}");
            }
            CircuitUpdateOps::SetInput(id, value) => {
                self.circuit.set_input(&id, value)?;
                self.context.mark_dirty(&id);
                log::info!("input {id} set to {value}");
            }
            CircuitUpdateOps::SetClockRunning(id, running) => {
                self.circuit.set_clock_running(&id, running)?;
                self.context.mark_dirty(&id);
                log::info!("clock {id} running: {running}");
            }
        }
        Ok(())
    }

    /// Applies every queued edit in order. A failed edit leaves the circuit
    /// as it was, records the error in the sync state and does not stop the
    /// edits queued after it.
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        let mut error = None;
        while let Some(op) = self.pending.pop_front() {
            match self.apply(op) {
                Ok(()) => applied += 1,
                Err(e) => {
                    log::warn!("circuit update rejected: {e}");
                    error.get_or_insert_with(|| e.to_string());
                }
            }
        }
        if let Some(msg) = error {
            self.sync = SyncState::Error(msg);
        } else if applied > 0 {
            self.sync = SyncState::NotSynced;
        }
        applied
    }

    /// Applies queued edits, advances simulated time by `dt_ms` and
    /// re-evaluates, reporting the pin changes this tick produced.
    pub fn tick(&mut self, dt_ms: f64) -> TickReport {
        let before = self.circuit.clone();
        self.apply_pending();
        self.context.advance(dt_ms);
        let result = self.evaluator.evaluate(&mut self.circuit, &mut self.context);
        let events = self.capture.capture(&before, &self.circuit);
        if !self.sync.is_error() {
            self.sync = SyncState::Synced;
        }
        TickReport { result, events }
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.context
    }

    pub fn time(&self) -> f64 {
        self.context.time
    }

    pub fn sync_state(&self) -> &SyncState {
        &self.sync
    }

    pub fn capture(&self) -> &TimingCapture<T> {
        &self.capture
    }

    pub fn capture_mut(&mut self) -> &mut TimingCapture<T> {
        &mut self.capture
    }

    pub fn into_circuit(self) -> Circuit {
        self.circuit
    }
}
