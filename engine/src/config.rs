use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, types::MAX_TRUTH_TABLE_INPUTS};

/// Which evaluator the hybrid entry point should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationStrategy {
    EventDrivenOnly,
    BatchOnly,
    #[default]
    AutoSelect,
}

/// Tunables shared by every evaluator. Every field has a default, so a JSON
/// document only needs to name the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub strategy: EvaluationStrategy,
    /// Deepest allowed nesting of custom gates inside custom gates.
    pub max_recursion_depth: usize,
    pub step_cap_per_gate: usize,
    pub min_step_cap: usize,
    /// Simulated milliseconds one wave of a still-changing loop takes once
    /// it outlives the call that started it.
    pub gate_delay_ms: f64,
    /// AUTO_SELECT switches to event-driven evaluation above this size.
    pub event_driven_gate_threshold: usize,
    pub performance_gate_threshold: usize,
    pub performance_time_budget_ms: f64,
    pub max_wire_distance: f64,
    pub gate_width: f64,
    pub pin_spacing: f64,
    pub truth_table_max_inputs: usize,
    pub timing_history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            strategy: EvaluationStrategy::AutoSelect,
            max_recursion_depth: 10,
            step_cap_per_gate: 64,
            min_step_cap: 256,
            gate_delay_ms: 5.0,
            event_driven_gate_threshold: 200,
            performance_gate_threshold: 1000,
            performance_time_budget_ms: 16.0,
            max_wire_distance: 800.0,
            gate_width: 60.0,
            pin_spacing: 20.0,
            truth_table_max_inputs: 8,
            timing_history_limit: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn from_json(s: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_recursion_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "maxRecursionDepth",
                requirement: "at least 1",
            });
        }
        if self.step_cap_per_gate == 0 && self.min_step_cap == 0 {
            return Err(ConfigError::Invalid {
                field: "stepCapPerGate",
                requirement: "non-zero when minStepCap is zero",
            });
        }
        if !(self.gate_delay_ms > 0.0 && self.gate_delay_ms.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "gateDelayMs",
                requirement: "positive and finite",
            });
        }
        if self.truth_table_max_inputs > MAX_TRUTH_TABLE_INPUTS {
            return Err(ConfigError::Invalid {
                field: "truthTableMaxInputs",
                requirement: "at most 16",
            });
        }
        if !(self.gate_width > 0.0 && self.pin_spacing > 0.0) {
            return Err(ConfigError::Invalid {
                field: "gateWidth/pinSpacing",
                requirement: "positive",
            });
        }
        if !(self.max_wire_distance > 0.0) {
            return Err(ConfigError::Invalid {
                field: "maxWireDistance",
                requirement: "positive",
            });
        }
        Ok(())
    }

    pub fn step_cap(&self, gate_count: usize) -> usize {
        self.min_step_cap
            .max(self.step_cap_per_gate.saturating_mul(gate_count))
    }
}
