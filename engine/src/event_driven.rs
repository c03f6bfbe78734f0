use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    circuit::Circuit,
    components::GateType,
    config::EngineConfig,
    context::EvaluationContext,
    error::{Warning, WarningKind},
    evaluators::{apply_evaluation, evaluate_or_fallback, EvalEnv, GateEvaluation},
    resolver::DependencyGraph,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOutcome {
    /// Gate evaluations performed.
    pub steps: usize,
    pub waves: usize,
    /// The step cap stopped propagation before the circuit went quiet.
    pub truncated: bool,
    /// A loop still changing from an earlier call used up the waves that
    /// the simulated time since then allows.
    pub deferred: bool,
    pub warnings: Vec<Warning>,
}

pub fn evaluate_event_driven(
    circuit: &mut Circuit,
    context: &mut EvaluationContext,
    config: &EngineConfig,
) -> EventOutcome {
    let graph = DependencyGraph::build(circuit);
    run_event_driven(circuit, context, config, &graph)
}

fn wave_budget(elapsed_ms: f64, gate_delay_ms: f64) -> usize {
    let waves = (elapsed_ms / gate_delay_ms).floor();
    // at least one, or a caller that never advances time would stall
    if waves >= 1.0 {
        waves as usize
    } else {
        1
    }
}

// gates that must be looked at this call, by index
fn seed(
    circuit: &Circuit,
    context: &mut EvaluationContext,
    graph: &DependencyGraph,
) -> BTreeSet<usize> {
    let mut pending: BTreeSet<usize> = context
        .take_dirty()
        .iter()
        .filter_map(|id| graph.index_of(id))
        .collect();
    for (idx, gate) in circuit.gates.iter().enumerate() {
        let wake = !context.is_known(&gate.id)
            || matches!(gate.gate_type, GateType::Clock | GateType::Custom)
            || graph.gather_inputs(circuit, idx) != gate.inputs;
        if wake {
            pending.insert(idx);
        }
    }
    pending
}

pub(crate) fn run_event_driven(
    circuit: &mut Circuit,
    context: &mut EvaluationContext,
    config: &EngineConfig,
    graph: &DependencyGraph,
) -> EventOutcome {
    let mut outcome = EventOutcome {
        warnings: graph.issues().iter().map(Warning::from).collect(),
        ..EventOutcome::default()
    };
    let env = EvalEnv {
        time: context.time,
        depth: context.depth(),
        config,
    };
    let cap = config.step_cap(graph.len());
    let paced_from = context.propagated_to();
    let budget = paced_from.map(|from| wave_budget(context.time - from, config.gate_delay_ms));
    let mut pending = seed(circuit, context, graph);

    while !pending.is_empty() {
        if budget.is_some_and(|b| outcome.waves >= b) {
            outcome.deferred = true;
            break;
        }
        // the first wave always runs so an undersized cap still makes progress
        if outcome.steps > 0 && outcome.steps + pending.len() > cap {
            outcome.truncated = true;
            break;
        }
        let wave = std::mem::take(&mut pending);

        let mut results: Vec<(usize, Vec<bool>, GateEvaluation)> = Vec::with_capacity(wave.len());
        for &idx in &wave {
            let inputs = graph.gather_inputs(circuit, idx);
            let evaluation = evaluate_or_fallback(
                &circuit.gates[idx],
                &inputs,
                &env,
                context,
                &mut outcome.warnings,
            );
            results.push((idx, inputs, evaluation));
        }

        for (idx, inputs, evaluation) in results {
            if apply_evaluation(&mut circuit.gates[idx], &inputs, evaluation, context) {
                pending.extend(graph.downstream(idx).iter().copied());
            }
        }
        outcome.steps += wave.len();
        outcome.waves += 1;
    }

    if outcome.deferred {
        log::trace!(
            "{} waves in {}ms of simulated time, {} gates carried over",
            outcome.waves,
            context.time - paced_from.unwrap_or(context.time),
            pending.len()
        );
    }
    if outcome.truncated {
        log::warn!(
            "event-driven evaluation hit the step cap ({cap}) after {} waves, {} gates still unsettled",
            outcome.waves,
            pending.len()
        );
        outcome.warnings.push(Warning::new(
            WarningKind::StepLimit,
            format!(
                "stopped after {} gate evaluations; {} gates still changing",
                outcome.steps,
                pending.len()
            ),
        ));
    }
    let unsettled = !pending.is_empty();
    context.replace_dirty(
        pending
            .into_iter()
            .map(|idx| circuit.gates[idx].id.clone())
            .collect(),
    );
    if unsettled {
        // waves already run are paid for; a first storm starts paying from now
        let caught_up = match paced_from {
            Some(from) => (from + outcome.waves as f64 * config.gate_delay_ms).min(context.time),
            None => context.time,
        };
        context.set_propagated_to(Some(caught_up));
    }
    context.sync_with(circuit);
    circuit.sync_wires();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{circuit::PinEndpoint, components::Position};

    fn link(c: &mut Circuit, from: &str, to: &str, pin: i32) {
        c.connect(
            PinEndpoint::output(from, -1),
            PinEndpoint::input(to, pin),
            &EngineConfig::default(),
        )
        .unwrap();
    }

    fn inverter_chain(len: usize) -> (Circuit, String, String) {
        let mut c = Circuit::new();
        let a = c.add_input("A", false);
        let mut prev = a.clone();
        for _ in 0..len {
            let n = c.add_gate(GateType::Not, Position::default());
            link(&mut c, &prev, &n, 0);
            prev = n;
        }
        let y = c.add_output("Y");
        link(&mut c, &prev, &y, 0);
        (c, a, y)
    }

    #[test]
    fn only_changed_gates_are_recomputed() {
        let config = EngineConfig::default();
        let (mut c, a, y) = inverter_chain(3);
        let mut ctx = EvaluationContext::new();

        let first = evaluate_event_driven(&mut c, &mut ctx, &config);
        assert!(first.steps >= c.gates.len());
        assert!(c.gate(&y).unwrap().output);

        let idle = evaluate_event_driven(&mut c, &mut ctx, &config);
        assert_eq!(idle.steps, 0);
        assert_eq!(idle.waves, 0);

        c.set_input(&a, true).unwrap();
        let toggled = evaluate_event_driven(&mut c, &mut ctx, &config);
        // one wave per stage: three inverters and the sink
        assert_eq!(toggled.steps, 4);
        assert_eq!(toggled.waves, 4);
        assert!(!toggled.truncated);
        assert!(!c.gate(&y).unwrap().output);
    }

    #[test]
    fn agrees_with_batch_on_acyclic_circuits() {
        let config = EngineConfig::default();
        let (mut event, a, y) = inverter_chain(4);
        let mut batch = event.clone();
        for value in [true, false, true] {
            event.set_input(&a, value).unwrap();
            batch.set_input(&a, value).unwrap();
            evaluate_event_driven(&mut event, &mut EvaluationContext::new(), &config);
            crate::batch::evaluate_direct(&mut batch, &mut EvaluationContext::new(), &config);
            assert_eq!(event.gate(&y).unwrap().output, batch.gate(&y).unwrap().output);
            assert_eq!(event, batch);
        }
    }

    #[test]
    fn step_cap_keeps_leftover_work() {
        let config = EngineConfig {
            step_cap_per_gate: 1,
            min_step_cap: 0,
            ..EngineConfig::default()
        };
        let mut c = Circuit::new();
        // a NOT gate feeding itself never settles
        let n = c.add_gate(GateType::Not, Position::default());
        c.wires.push(crate::circuit::Wire {
            id: "loop".into(),
            from: crate::circuit::PinRef::new(&n, -1),
            to: crate::circuit::PinRef::new(&n, 0),
            is_active: false,
        });
        let mut ctx = EvaluationContext::new();

        let out = evaluate_event_driven(&mut c, &mut ctx, &config);
        assert!(out.truncated);
        assert_eq!(out.steps, 1);
        assert!(out
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::StepLimit));
        assert!(ctx.is_dirty(&n));
        assert_eq!(ctx.dirty_len(), 1);
        let first = c.gate(&n).unwrap().output;

        evaluate_event_driven(&mut c, &mut ctx, &config);
        assert_ne!(c.gate(&n).unwrap().output, first);
    }

    #[test]
    fn carried_storm_runs_one_wave_per_gate_delay() {
        let config = EngineConfig::default();
        let mut c = Circuit::new();
        let n = c.add_gate(GateType::Not, Position::default());
        c.wires.push(crate::circuit::Wire {
            id: "loop".into(),
            from: crate::circuit::PinRef::new(&n, -1),
            to: crate::circuit::PinRef::new(&n, 0),
            is_active: false,
        });
        let mut ctx = EvaluationContext::at(0.0);

        let first = evaluate_event_driven(&mut c, &mut ctx, &config);
        assert!(first.truncated);
        assert!(!first.deferred);
        assert_eq!(ctx.propagated_to(), Some(0.0));

        let before = c.gate(&n).unwrap().output;
        ctx.advance(12.0);
        let paced = evaluate_event_driven(&mut c, &mut ctx, &config);
        assert!(paced.deferred);
        assert!(!paced.truncated);
        assert_eq!(paced.waves, 2);
        assert_eq!(c.gate(&n).unwrap().output, before);
        // the 2ms left over count towards the next call
        assert_eq!(ctx.propagated_to(), Some(10.0));

        ctx.advance(3.0);
        let next = evaluate_event_driven(&mut c, &mut ctx, &config);
        assert_eq!(next.waves, 1);
        assert_ne!(c.gate(&n).unwrap().output, before);
        assert!(next.warnings.is_empty());
        assert!(ctx.is_dirty(&n));
    }

    #[test]
    fn clocks_are_polled_every_call() {
        let config = EngineConfig::default();
        let mut c = Circuit::new();
        let clk = c
            .insert_gate(crate::components::Gate::clock("clk", Position::default(), 1.0))
            .unwrap();
        let y = c.add_output("Y");
        link(&mut c, &clk, &y, 0);

        let mut ctx = EvaluationContext::at(0.0);
        evaluate_event_driven(&mut c, &mut ctx, &config);
        assert!(!c.gate(&y).unwrap().output);
        ctx.advance(600.0);
        evaluate_event_driven(&mut c, &mut ctx, &config);
        assert!(c.gate(&y).unwrap().output);
    }
}
