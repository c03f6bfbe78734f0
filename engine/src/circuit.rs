use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    components::{CustomGateDefinition, Gate, GateType, Position},
    config::EngineConfig,
    error::{CircuitError, ConnectionError},
    types::{resolve_pin, GateId, PinIndex, PinType, WireId},
    validation::validate_connection,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRef {
    pub gate_id: GateId,
    pub pin_index: PinIndex,
}

impl PinRef {
    pub fn new(gate_id: &str, pin_index: PinIndex) -> PinRef {
        PinRef {
            gate_id: gate_id.to_string(),
            pin_index,
        }
    }
}

/// A pin as picked by the user, with its direction. The two ends of a drag
/// may arrive in either order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinEndpoint {
    pub gate_id: GateId,
    pub pin_type: PinType,
    pub pin_index: PinIndex,
}

impl PinEndpoint {
    pub fn output(gate_id: &str, pin_index: PinIndex) -> PinEndpoint {
        PinEndpoint {
            gate_id: gate_id.to_string(),
            pin_type: PinType::Output,
            pin_index,
        }
    }

    pub fn input(gate_id: &str, pin_index: PinIndex) -> PinEndpoint {
        PinEndpoint {
            gate_id: gate_id.to_string(),
            pin_type: PinType::Input,
            pin_index,
        }
    }

    pub(crate) fn into_pin_ref(self) -> PinRef {
        PinRef {
            gate_id: self.gate_id,
            pin_index: self.pin_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wire {
    pub id: WireId,
    pub from: PinRef,
    pub to: PinRef,
    #[serde(default)]
    pub is_active: bool,
}

/// The netlist: gates and wires in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Circuit {
    #[serde(default)]
    pub gates: Vec<Gate>,
    #[serde(default)]
    pub wires: Vec<Wire>,
    #[serde(skip)]
    last_id: u64,
}

impl PartialEq for Circuit {
    fn eq(&self, other: &Self) -> bool {
        self.gates == other.gates && self.wires == other.wires
    }
}

impl Circuit {
    pub fn new() -> Circuit {
        Circuit::default()
    }

    pub fn from_json(s: &str) -> Result<Circuit, CircuitError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json(&self) -> Result<String, CircuitError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, CircuitError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn id_in_use(&self, id: &str) -> bool {
        self.gates.iter().any(|g| g.id == id) || self.wires.iter().any(|w| w.id == id)
    }

    pub fn new_id(&mut self, prefix: &str) -> String {
        loop {
            self.last_id += 1;
            let id = format!("{}-{}", prefix, self.last_id);
            if !self.id_in_use(&id) {
                return id;
            }
        }
    }

    pub fn add_gate(&mut self, gate_type: GateType, position: Position) -> GateId {
        let id = self.new_id("gate");
        self.gates.push(Gate::new(id.clone(), gate_type, position));
        id
    }

    pub fn add_gate_with_inputs(
        &mut self,
        gate_type: GateType,
        position: Position,
        n_inputs: usize,
    ) -> GateId {
        let id = self.new_id("gate");
        self.gates
            .push(Gate::with_input_count(id.clone(), gate_type, position, n_inputs));
        id
    }

    pub fn add_input(&mut self, label: &str, init_val: bool) -> GateId {
        let id = self.new_id("gate");
        let mut gate = Gate::new(id.clone(), GateType::Input, Position::default()).labelled(label);
        gate.set_outputs(&[init_val]);
        self.gates.push(gate);
        id
    }

    pub fn add_output(&mut self, label: &str) -> GateId {
        let id = self.new_id("gate");
        self.gates
            .push(Gate::new(id.clone(), GateType::Output, Position::default()).labelled(label));
        id
    }

    pub fn add_custom_gate(
        &mut self,
        definition: CustomGateDefinition,
        position: Position,
    ) -> GateId {
        let id = self.new_id("gate");
        self.gates.push(Gate::custom(id.clone(), definition, position));
        id
    }

    pub fn insert_gate(&mut self, gate: Gate) -> Result<GateId, CircuitError> {
        if self.id_in_use(&gate.id) {
            return Err(CircuitError::DuplicateId(gate.id));
        }
        let id = gate.id.clone();
        self.gates.push(gate);
        Ok(id)
    }

    pub fn gate(&self, id: &str) -> Option<&Gate> {
        self.gates.iter().find(|g| g.id == id)
    }

    pub fn gate_mut(&mut self, id: &str) -> Option<&mut Gate> {
        self.gates.iter_mut().find(|g| g.id == id)
    }

    pub fn wire(&self, id: &str) -> Option<&Wire> {
        self.wires.iter().find(|w| w.id == id)
    }

    pub fn gates_of_type(&self, gate_type: GateType) -> impl Iterator<Item = &Gate> {
        self.gates.iter().filter(move |g| g.gate_type == gate_type)
    }

    pub fn incoming_wire(&self, gate_id: &str, pin_index: usize) -> Option<&Wire> {
        self.wires.iter().find(|w| {
            w.to.gate_id == gate_id && resolve_pin(w.to.pin_index) == Some(pin_index)
        })
    }

    // Removes the gate and every wire touching it.
    pub fn remove_gate(&mut self, id: &str) -> Result<Gate, CircuitError> {
        let idx = self
            .gates
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| CircuitError::GateNotFound(id.to_string()))?;
        self.wires
            .retain(|w| w.from.gate_id != id && w.to.gate_id != id);
        Ok(self.gates.remove(idx))
    }

    /// Validates and stores a wire between two pins given in any order.
    pub fn connect(
        &mut self,
        a: PinEndpoint,
        b: PinEndpoint,
        config: &EngineConfig,
    ) -> Result<WireId, ConnectionError> {
        let (from, to) = validate_connection(self, a, b, config)?;
        let id = self.new_id("wire");
        self.wires.push(Wire {
            id: id.clone(),
            from: from.into_pin_ref(),
            to: to.into_pin_ref(),
            is_active: false,
        });
        Ok(id)
    }

    pub fn disconnect(&mut self, wire_id: &str) -> Result<Wire, CircuitError> {
        let idx = self
            .wires
            .iter()
            .position(|w| w.id == wire_id)
            .ok_or_else(|| CircuitError::WireNotFound(wire_id.to_string()))?;
        Ok(self.wires.remove(idx))
    }

    /// Toggles an INPUT gate. Propagation happens on the next evaluation.
    pub fn set_input(&mut self, id: &str, value: bool) -> Result<(), CircuitError> {
        let gate = self
            .gate_mut(id)
            .ok_or_else(|| CircuitError::GateNotFound(id.to_string()))?;
        if gate.gate_type != GateType::Input {
            return Err(CircuitError::NotAnInput(id.to_string()));
        }
        gate.set_outputs(&[value]);
        Ok(())
    }

    pub fn set_clock_running(&mut self, id: &str, running: bool) -> Result<(), CircuitError> {
        let gate = self
            .gate_mut(id)
            .ok_or_else(|| CircuitError::GateNotFound(id.to_string()))?;
        if gate.gate_type != GateType::Clock {
            return Err(CircuitError::NotAClock(id.to_string()));
        }
        gate.metadata.is_running = Some(running);
        Ok(())
    }

    pub fn sync_wires(&mut self) {
        let index: HashMap<&str, usize> = self
            .gates
            .iter()
            .enumerate()
            .map(|(i, g)| (g.id.as_str(), i))
            .collect();
        let values: Vec<bool> = self
            .wires
            .iter()
            .map(|w| {
                let source = index.get(w.from.gate_id.as_str()).map(|i| &self.gates[*i]);
                match (source, resolve_pin(w.from.pin_index)) {
                    (Some(g), Some(pin)) => g.outputs.get(pin).copied().unwrap_or(false),
                    _ => false,
                }
            })
            .collect();
        for (wire, v) in self.wires.iter_mut().zip(values) {
            wire.is_active = v;
        }
    }
}
