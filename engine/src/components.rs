use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    circuit::Circuit,
    types::{GateId, DEFAULT_CLOCK_FREQUENCY, DEFAULT_COUNTER_BITS, DEFAULT_MUX_SELECT_BITS},
};

/// Every kind of gate the engine knows how to evaluate.
///
/// Serialized as the upper-case names the playground uses (`"AND"`,
/// `"SR-LATCH"`, `"D-FF"`, ...). Names the engine does not recognise load as
/// [`GateType::Unknown`], which evaluates as a passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateType {
    Input,
    Output,
    And,
    Or,
    Not,
    Xor,
    Nand,
    Nor,
    Xnor,
    Clock,
    SrLatch,
    DFlipFlop,
    Mux,
    BinaryCounter,
    Custom,
    Unknown,
}

impl GateType {
    pub fn as_str(self) -> &'static str {
        match self {
            GateType::Input => "INPUT",
            GateType::Output => "OUTPUT",
            GateType::And => "AND",
            GateType::Or => "OR",
            GateType::Not => "NOT",
            GateType::Xor => "XOR",
            GateType::Nand => "NAND",
            GateType::Nor => "NOR",
            GateType::Xnor => "XNOR",
            GateType::Clock => "CLOCK",
            GateType::SrLatch => "SR-LATCH",
            GateType::DFlipFlop => "D-FF",
            GateType::Mux => "MUX",
            GateType::BinaryCounter => "BINARY_COUNTER",
            GateType::Custom => "CUSTOM",
            GateType::Unknown => "UNKNOWN",
        }
    }

    pub fn from_name(name: &str) -> GateType {
        match name.to_ascii_uppercase().replace('_', "-").as_str() {
            "INPUT" => GateType::Input,
            "OUTPUT" => GateType::Output,
            "AND" => GateType::And,
            "OR" => GateType::Or,
            "NOT" => GateType::Not,
            "XOR" => GateType::Xor,
            "NAND" => GateType::Nand,
            "NOR" => GateType::Nor,
            "XNOR" => GateType::Xnor,
            "CLOCK" => GateType::Clock,
            "SR-LATCH" => GateType::SrLatch,
            "D-FF" => GateType::DFlipFlop,
            "MUX" => GateType::Mux,
            "BINARY-COUNTER" => GateType::BinaryCounter,
            "CUSTOM" => GateType::Custom,
            _ => {
                log::warn!("unrecognised gate type {name:?}, treating it as a passthrough");
                GateType::Unknown
            }
        }
    }

    // (inputs, outputs) a freshly placed gate of this type gets.
    pub fn default_arity(self) -> (usize, usize) {
        match self {
            GateType::Input | GateType::Clock => (0, 1),
            GateType::Output => (1, 0),
            GateType::Not | GateType::Unknown => (1, 1),
            GateType::And
            | GateType::Or
            | GateType::Xor
            | GateType::Nand
            | GateType::Nor
            | GateType::Xnor => (2, 1),
            GateType::SrLatch | GateType::DFlipFlop => (2, 2),
            GateType::Mux => ((1 << DEFAULT_MUX_SELECT_BITS) + DEFAULT_MUX_SELECT_BITS, 1),
            GateType::BinaryCounter => (1, DEFAULT_COUNTER_BITS),
            GateType::Custom => (0, 0),
        }
    }

    pub fn is_variadic(self) -> bool {
        matches!(
            self,
            GateType::And
                | GateType::Or
                | GateType::Xor
                | GateType::Nand
                | GateType::Nor
                | GateType::Xnor
        )
    }

    pub fn is_stateful(self) -> bool {
        matches!(
            self,
            GateType::SrLatch | GateType::DFlipFlop | GateType::BinaryCounter
        )
    }

    pub fn is_source(self) -> bool {
        matches!(self, GateType::Input | GateType::Clock)
    }
}

impl fmt::Display for GateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for GateType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GateType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(GateType::from_name(&name))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Position {
        Position { x, y }
    }

    pub fn distance(self, other: Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GateMemory {
    Latch {
        q: bool,
    },
    FlipFlop {
        q: bool,
        #[serde(rename = "prevClk")]
        prev_clk: bool,
    },
    Counter {
        count: u64,
        #[serde(rename = "prevClk")]
        prev_clk: bool,
    },
}

/// External pin of a custom gate, bound to an INPUT or OUTPUT gate of the
/// internal circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPin {
    pub name: String,
    pub gate_id: GateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomGateDefinition {
    pub id: String,
    pub name: String,
    pub input_pins: Vec<CustomPin>,
    pub output_pins: Vec<CustomPin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_circuit: Option<Circuit>,
}

impl CustomGateDefinition {
    /// Wraps `circuit`, exposing its INPUT gates as input pins and its OUTPUT
    /// gates as output pins, both in insertion order.
    pub fn from_circuit(name: &str, circuit: Circuit) -> CustomGateDefinition {
        let pins_of = |gate_type: GateType, prefix: &str| {
            circuit
                .gates
                .iter()
                .filter(|g| g.gate_type == gate_type)
                .enumerate()
                .map(|(i, g)| CustomPin {
                    name: g
                        .metadata
                        .label
                        .clone()
                        .unwrap_or_else(|| format!("{prefix}{i}")),
                    gate_id: g.id.clone(),
                })
                .collect::<Vec<CustomPin>>()
        };
        let input_pins = pins_of(GateType::Input, "IN");
        let output_pins = pins_of(GateType::Output, "OUT");
        CustomGateDefinition {
            id: format!("custom-{}", name.to_ascii_lowercase().replace(' ', "-")),
            name: name.to_string(),
            input_pins,
            output_pins,
            internal_circuit: Some(circuit),
        }
    }
}

/// Per-type configuration and runtime state. Keys this engine does not use
/// are kept in `extra` so a save/load cycle loses nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GateMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_running: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_width: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<GateMemory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_gate_definition: Option<Box<CustomGateDefinition>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub id: GateId,
    #[serde(rename = "type")]
    pub gate_type: GateType,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub inputs: Vec<bool>,
    #[serde(default)]
    pub outputs: Vec<bool>,
    // Legacy scalar mirror of `outputs[0]` (of `inputs[0]` for OUTPUT sinks).
    #[serde(default)]
    pub output: bool,
    #[serde(default)]
    pub metadata: GateMetadata,
}

impl Gate {
    pub fn new(id: impl Into<GateId>, gate_type: GateType, position: Position) -> Gate {
        let (n_inp, n_out) = gate_type.default_arity();
        let mut gate = Gate {
            id: id.into(),
            gate_type,
            position,
            inputs: vec![false; n_inp],
            outputs: vec![false; n_out],
            output: false,
            metadata: GateMetadata::default(),
        };
        match gate_type {
            GateType::Clock => {
                gate.metadata.frequency = Some(DEFAULT_CLOCK_FREQUENCY);
                gate.metadata.is_running = Some(true);
                gate.metadata.start_time = Some(0.0);
            }
            GateType::BinaryCounter => gate.metadata.bit_width = Some(DEFAULT_COUNTER_BITS),
            _ => {}
        }
        gate
    }

    /// A combinational gate folding over `n_inputs` (at least two) inputs.
    /// Non-variadic types keep their fixed arity.
    pub fn with_input_count(
        id: impl Into<GateId>,
        gate_type: GateType,
        position: Position,
        n_inputs: usize,
    ) -> Gate {
        let mut gate = Gate::new(id, gate_type, position);
        if gate_type.is_variadic() {
            gate.inputs = vec![false; n_inputs.max(2)];
        }
        gate
    }

    /// `2^select_bits` data inputs followed by `select_bits` select inputs.
    pub fn mux(id: impl Into<GateId>, position: Position, select_bits: usize) -> Gate {
        let select_bits = select_bits.clamp(1, 8);
        let mut gate = Gate::new(id, GateType::Mux, position);
        gate.inputs = vec![false; (1 << select_bits) + select_bits];
        gate
    }

    pub fn counter(id: impl Into<GateId>, position: Position, bits: usize) -> Gate {
        let bits = bits.clamp(1, 64);
        let mut gate = Gate::new(id, GateType::BinaryCounter, position);
        gate.outputs = vec![false; bits];
        gate.metadata.bit_width = Some(bits);
        gate
    }

    pub fn clock(id: impl Into<GateId>, position: Position, frequency: f64) -> Gate {
        let mut gate = Gate::new(id, GateType::Clock, position);
        gate.metadata.frequency = Some(frequency);
        gate
    }

    pub fn custom(
        id: impl Into<GateId>,
        definition: CustomGateDefinition,
        position: Position,
    ) -> Gate {
        let mut gate = Gate::new(id, GateType::Custom, position);
        gate.inputs = vec![false; definition.input_pins.len()];
        gate.outputs = vec![false; definition.output_pins.len()];
        gate.metadata.label = Some(definition.name.clone());
        gate.metadata.custom_gate_definition = Some(Box::new(definition));
        gate
    }

    pub fn labelled(mut self, label: &str) -> Gate {
        self.metadata.label = Some(label.to_string());
        self
    }

    pub fn label(&self) -> &str {
        self.metadata.label.as_deref().unwrap_or(&self.id)
    }

    pub fn set_outputs(&mut self, values: &[bool]) {
        for (slot, v) in self.outputs.iter_mut().zip(values) {
            *slot = *v;
        }
        self.refresh_scalar();
    }

    pub fn set_inputs(&mut self, values: &[bool]) {
        for (slot, v) in self.inputs.iter_mut().zip(values) {
            *slot = *v;
        }
        self.refresh_scalar();
    }

    pub(crate) fn refresh_scalar(&mut self) {
        self.output = match self.gate_type {
            GateType::Output => self.inputs.first().copied().unwrap_or(false),
            _ => self.outputs.first().copied().unwrap_or(false),
        };
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = |v: &[bool]| v.iter().map(|b| if *b { '1' } else { '0' }).collect::<String>();
        let state_str = if self.output {
            "\x1b[32mON\x1b[0m"
        } else {
            "\x1b[31mOFF\x1b[0m"
        };
        write!(
            f,
            "{} \x1b[33m{}\x1b[0m ({} input{}) [{}] -> [{}] {}",
            self.gate_type,
            self.label(),
            self.inputs.len(),
            if self.inputs.len() == 1 { "" } else { "s" },
            bits(&self.inputs),
            bits(&self.outputs),
            state_str,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_arity() {
        let p = Position::default();
        assert_eq!(Gate::new("a", GateType::And, p).inputs.len(), 2);
        assert_eq!(Gate::new("o", GateType::Output, p).outputs.len(), 0);
        assert_eq!(Gate::with_input_count("a4", GateType::And, p, 4).inputs.len(), 4);
        assert_eq!(Gate::with_input_count("n", GateType::Not, p, 4).inputs.len(), 1);
        assert_eq!(Gate::mux("m", p, 2).inputs.len(), 6);
        assert_eq!(Gate::counter("c", p, 3).outputs.len(), 3);
        assert!(GateType::DFlipFlop.is_stateful());
        assert!(!GateType::Mux.is_stateful());
    }

    #[test]
    fn type_names_round_trip() {
        for t in [
            GateType::SrLatch,
            GateType::DFlipFlop,
            GateType::BinaryCounter,
            GateType::Xnor,
        ] {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(serde_json::from_str::<GateType>(&json).unwrap(), t);
        }
        assert_eq!(GateType::from_name("d_ff"), GateType::DFlipFlop);
        assert_eq!(
            serde_json::from_str::<GateType>("\"TRISTATE\"").unwrap(),
            GateType::Unknown
        );
    }

    #[test]
    fn unknown_metadata_keys_survive() {
        let json = r#"{"label":"clk","frequency":2.0,"color":"red","nested":{"a":1}}"#;
        let m: GateMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(m.frequency, Some(2.0));
        assert_eq!(m.extra.len(), 2);
        let back: serde_json::Value = serde_json::to_value(&m).unwrap();
        assert_eq!(back, serde_json::from_str::<serde_json::Value>(json).unwrap());
    }

    #[test]
    fn outputs_keep_their_arity() {
        let mut g = Gate::new("x", GateType::Xor, Position::default());
        g.set_outputs(&[true, true, true]);
        assert_eq!(g.outputs, vec![true]);
        assert!(g.output);
    }
}
