use crate::{
    circuit::{Circuit, PinEndpoint},
    components::{Gate, Position},
    config::EngineConfig,
    error::ConnectionError,
    types::{resolve_pin, PinType},
};

/// Where a pin is drawn: inputs on the gate's left edge, outputs on its
/// right edge, stacked `pin_spacing` apart from the top.
pub fn pin_position(gate: &Gate, pin_type: PinType, pin: usize, config: &EngineConfig) -> Position {
    let x = match pin_type {
        PinType::Input => gate.position.x,
        PinType::Output => gate.position.x + config.gate_width,
    };
    Position::new(x, gate.position.y + config.pin_spacing * (pin as f64 + 1.0))
}

/// Checks a proposed wire against the circuit and returns its two ends
/// ordered (output side, input side). Nothing is mutated.
pub fn validate_connection(
    circuit: &Circuit,
    a: PinEndpoint,
    b: PinEndpoint,
    config: &EngineConfig,
) -> Result<(PinEndpoint, PinEndpoint), ConnectionError> {
    if a.pin_type == b.pin_type {
        return Err(ConnectionError::SameType(a.pin_type));
    }
    let (from, to) = match a.pin_type {
        PinType::Output => (a, b),
        PinType::Input => (b, a),
    };
    if from.gate_id == to.gate_id {
        return Err(ConnectionError::SelfConnection(from.gate_id));
    }

    let source = circuit
        .gate(&from.gate_id)
        .ok_or_else(|| ConnectionError::GateNotFound(from.gate_id.clone()))?;
    let target = circuit
        .gate(&to.gate_id)
        .ok_or_else(|| ConnectionError::GateNotFound(to.gate_id.clone()))?;

    let source_pin = resolve_pin(from.pin_index)
        .filter(|p| *p < source.outputs.len())
        .ok_or_else(|| ConnectionError::InvalidPin {
            gate_id: from.gate_id.clone(),
            pin_type: PinType::Output,
            pin_index: from.pin_index,
        })?;
    let target_pin = resolve_pin(to.pin_index)
        .filter(|p| *p < target.inputs.len())
        .ok_or_else(|| ConnectionError::InvalidPin {
            gate_id: to.gate_id.clone(),
            pin_type: PinType::Input,
            pin_index: to.pin_index,
        })?;

    if circuit.incoming_wire(&to.gate_id, target_pin).is_some() {
        return Err(ConnectionError::MultipleInput {
            gate_id: to.gate_id.clone(),
            pin_index: target_pin,
        });
    }

    let distance = pin_position(source, PinType::Output, source_pin, config)
        .distance(pin_position(target, PinType::Input, target_pin, config));
    if distance > config.max_wire_distance {
        return Err(ConnectionError::DistanceTooFar {
            distance,
            limit: config.max_wire_distance,
        });
    }

    Ok((from, to))
}
