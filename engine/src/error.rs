use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{GateId, PinType, WireId};

/// Reasons a proposed wire is rejected. The circuit is never modified when
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    #[error("cannot connect two {0} pins")]
    SameType(PinType),
    #[error("gate {0} cannot be wired to itself")]
    SelfConnection(GateId),
    #[error("gate {0} does not exist")]
    GateNotFound(GateId),
    #[error("gate {gate_id} has no {pin_type} pin {pin_index}")]
    InvalidPin {
        gate_id: GateId,
        pin_type: PinType,
        pin_index: i32,
    },
    #[error("input pin {pin_index} of gate {gate_id} already has an incoming wire")]
    MultipleInput { gate_id: GateId, pin_index: usize },
    #[error("pins are {distance:.1}px apart, the limit is {limit:.1}px")]
    DistanceTooFar { distance: f64, limit: f64 },
}

impl ConnectionError {
    pub fn code(&self) -> &'static str {
        match self {
            ConnectionError::SameType(_) => "SAME_TYPE",
            ConnectionError::SelfConnection(_) => "SELF_CONNECTION",
            ConnectionError::GateNotFound(_) => "GATE_NOT_FOUND",
            ConnectionError::InvalidPin { .. } => "INVALID_PIN",
            ConnectionError::MultipleInput { .. } => "MULTIPLE_INPUT",
            ConnectionError::DistanceTooFar { .. } => "DISTANCE_TOO_FAR",
        }
    }
}

/// A single gate could not be evaluated. Callers substitute all-false
/// outputs for that gate and keep going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("custom gate nesting reached depth {depth} (limit {limit})")]
    RecursionLimitExceeded { depth: usize, limit: usize },
    #[error("custom gate {0} has no definition")]
    MissingDefinition(GateId),
    #[error("custom gate {0} has no internal circuit")]
    MissingInternalCircuit(GateId),
    #[error("custom gate {gate_id} maps a pin onto unknown internal gate {internal_id}")]
    UnknownInternalGate { gate_id: GateId, internal_id: GateId },
}

/// Problems in the wiring graph. The offending wire is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("wire {wire_id} references missing gate {gate_id}")]
    MissingGate { wire_id: WireId, gate_id: GateId },
    #[error("wire {wire_id} references {pin_type} pin {pin_index} that gate {gate_id} does not have")]
    InvalidPin {
        wire_id: WireId,
        gate_id: GateId,
        pin_type: PinType,
        pin_index: i32,
    },
    #[error("wire {wire_id} drives input pin {pin_index} of gate {gate_id}, which is already driven")]
    DuplicateFanIn {
        wire_id: WireId,
        gate_id: GateId,
        pin_index: usize,
    },
}

impl DependencyError {
    pub fn gate_id(&self) -> &GateId {
        match self {
            DependencyError::MissingGate { gate_id, .. }
            | DependencyError::InvalidPin { gate_id, .. }
            | DependencyError::DuplicateFanIn { gate_id, .. } => gate_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum CircuitError {
    #[error("gate {0} does not exist")]
    GateNotFound(GateId),
    #[error("wire {0} does not exist")]
    WireNotFound(WireId),
    #[error("gate {0} is not an INPUT gate")]
    NotAnInput(GateId),
    #[error("gate {0} is not a CLOCK gate")]
    NotAClock(GateId),
    #[error("gate id {0} is already in use")]
    DuplicateId(GateId),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("circuit (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TruthTableError {
    #[error("{count} inputs exceed the truth table limit of {limit}")]
    TooManyInputs { count: usize, limit: usize },
    #[error("circuit has no OUTPUT gates")]
    NoOutputs,
    #[error("unknown column {0}")]
    UnknownColumn(String),
    #[error("row has {got} values but the table has {expected} columns")]
    RowWidth { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid engine configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} must be {requirement}")]
    Invalid {
        field: &'static str,
        requirement: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    Evaluation,
    Dependency,
    Performance,
    StepLimit,
}

/// Non-fatal diagnostic attached to an evaluation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub kind: WarningKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_id: Option<GateId>,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Warning {
        Warning {
            kind,
            gate_id: None,
            message: message.into(),
        }
    }

    pub fn for_gate(kind: WarningKind, gate_id: &str, message: impl Into<String>) -> Warning {
        Warning {
            kind,
            gate_id: Some(gate_id.to_string()),
            message: message.into(),
        }
    }
}

impl From<&DependencyError> for Warning {
    fn from(e: &DependencyError) -> Self {
        Warning::for_gate(WarningKind::Dependency, e.gate_id(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_codes() {
        assert_eq!(ConnectionError::SameType(PinType::Input).code(), "SAME_TYPE");
        assert_eq!(
            ConnectionError::SelfConnection("g".into()).code(),
            "SELF_CONNECTION"
        );
        let far = ConnectionError::DistanceTooFar {
            distance: 1200.0,
            limit: 800.0,
        };
        assert_eq!(far.code(), "DISTANCE_TOO_FAR");
        assert_eq!(far.to_string(), "pins are 1200.0px apart, the limit is 800.0px");
    }

    #[test]
    fn dependency_error_becomes_warning() {
        let e = DependencyError::MissingGate {
            wire_id: "w1".into(),
            gate_id: "ghost".into(),
        };
        let w = Warning::from(&e);
        assert_eq!(w.kind, WarningKind::Dependency);
        assert_eq!(w.gate_id.as_deref(), Some("ghost"));
    }
}
