use std::fmt;

use serde::{Deserialize, Serialize};

pub type BinaryLogicReducer = fn(&[bool]) -> bool;

pub type GateId = String;
pub type WireId = String;
pub type PinIndex = i32;

// "the" output pin of a single-output gate
pub const SCALAR_OUTPUT_PIN: PinIndex = -1;

pub const DEFAULT_COUNTER_BITS: usize = 4;
pub const DEFAULT_MUX_SELECT_BITS: usize = 1;
pub const DEFAULT_CLOCK_FREQUENCY: f64 = 1.0;

// ceiling for `truthTableMaxInputs`; 2^16 rows
pub const MAX_TRUTH_TABLE_INPUTS: usize = 16;

/// Direction of a pin as seen from the gate that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinType {
    Input,
    Output,
}

impl fmt::Display for PinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinType::Input => write!(f, "input"),
            PinType::Output => write!(f, "output"),
        }
    }
}

/// Maps the scalar sentinel onto pin 0 and rejects any other negative index.
pub fn resolve_pin(pin: PinIndex) -> Option<usize> {
    if pin == SCALAR_OUTPUT_PIN {
        Some(0)
    } else {
        usize::try_from(pin).ok()
    }
}
