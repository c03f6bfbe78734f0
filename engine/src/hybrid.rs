use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::{
    batch::run_batch,
    circuit::Circuit,
    config::{EngineConfig, EvaluationStrategy},
    context::EvaluationContext,
    error::{Warning, WarningKind},
    event_driven::run_event_driven,
    resolver::DependencyGraph,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyUsed {
    Batch,
    EventDriven,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub strategy_used: StrategyUsed,
    pub execution_time_ms: f64,
    pub has_circular_dependency: bool,
    pub gate_count: usize,
    pub wire_count: usize,
    /// Gate evaluations performed.
    pub steps: usize,
    pub warnings: Vec<Warning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl EvaluationResult {
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// Entry point used after every edit or clock tick.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EngineConfig,
}

impl Evaluator {
    pub fn new(config: EngineConfig) -> Evaluator {
        Evaluator { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        circuit: &mut Circuit,
        context: &mut EvaluationContext,
    ) -> EvaluationResult {
        self.evaluate_with(circuit, context, self.config.strategy)
    }

    pub fn evaluate_with(
        &self,
        circuit: &mut Circuit,
        context: &mut EvaluationContext,
        strategy: EvaluationStrategy,
    ) -> EvaluationResult {
        let started = Instant::now();
        let graph = DependencyGraph::build(circuit);
        let schedule = graph.schedule(circuit);
        let gate_count = circuit.gates.len();

        let chosen = match strategy {
            EvaluationStrategy::BatchOnly => StrategyUsed::Batch,
            EvaluationStrategy::EventDrivenOnly => StrategyUsed::EventDriven,
            EvaluationStrategy::AutoSelect => {
                if schedule.has_cycle || gate_count > self.config.event_driven_gate_threshold {
                    StrategyUsed::EventDriven
                } else {
                    StrategyUsed::Batch
                }
            }
        };
        log::debug!(
            "{:?} picked {:?} for {} gates (feedback: {})",
            strategy,
            chosen,
            gate_count,
            schedule.has_cycle
        );

        let (steps, mut warnings) = match chosen {
            StrategyUsed::Batch => {
                let warnings = run_batch(circuit, context, &self.config, &graph, &schedule);
                (schedule.order.len(), warnings)
            }
            StrategyUsed::EventDriven => {
                let outcome = run_event_driven(circuit, context, &self.config, &graph);
                (outcome.steps, outcome.warnings)
            }
        };

        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        if gate_count > self.config.performance_gate_threshold {
            warnings.push(Warning::new(
                WarningKind::Performance,
                format!(
                    "{gate_count} gates exceeds the soft limit of {}",
                    self.config.performance_gate_threshold
                ),
            ));
        }
        if execution_time_ms > self.config.performance_time_budget_ms {
            warnings.push(Warning::new(
                WarningKind::Performance,
                format!(
                    "evaluation took {execution_time_ms:.2}ms, budget is {:.2}ms",
                    self.config.performance_time_budget_ms
                ),
            ));
        }

        let recommendation = match (chosen, schedule.has_cycle) {
            (StrategyUsed::Batch, true) => Some(
                "feedback loops advance one step per batch pass; EVENT_DRIVEN_ONLY lets them settle"
                    .to_string(),
            ),
            (StrategyUsed::Batch, false) if gate_count > self.config.event_driven_gate_threshold => {
                Some("large circuit: EVENT_DRIVEN_ONLY only recomputes what changed".to_string())
            }
            _ => None,
        };

        EvaluationResult {
            strategy_used: chosen,
            execution_time_ms,
            has_circular_dependency: schedule.has_cycle,
            gate_count,
            wire_count: circuit.wires.len(),
            steps,
            warnings,
            recommendation,
        }
    }
}

/// One-off evaluation with a fresh context.
pub fn evaluate(circuit: &mut Circuit, config: &EngineConfig) -> EvaluationResult {
    Evaluator::new(config.clone()).evaluate(circuit, &mut EvaluationContext::new())
}
