use crate::{
    circuit::Circuit,
    config::EngineConfig,
    context::EvaluationContext,
    error::Warning,
    evaluators::{apply_evaluation, evaluate_or_fallback, EvalEnv},
    resolver::{DependencyGraph, Schedule},
};

/// Evaluates every gate once in dependency order.
///
/// Gates on a feedback loop read what their loop partners held before this
/// call, so a latch built from gates advances one discrete step per call.
pub fn evaluate_direct(
    circuit: &mut Circuit,
    context: &mut EvaluationContext,
    config: &EngineConfig,
) -> Vec<Warning> {
    let graph = DependencyGraph::build(circuit);
    let schedule = graph.schedule(circuit);
    run_batch(circuit, context, config, &graph, &schedule)
}

pub(crate) fn run_batch(
    circuit: &mut Circuit,
    context: &mut EvaluationContext,
    config: &EngineConfig,
    graph: &DependencyGraph,
    schedule: &Schedule,
) -> Vec<Warning> {
    let mut warnings: Vec<Warning> = graph.issues().iter().map(Warning::from).collect();
    let env = EvalEnv {
        time: context.time,
        depth: context.depth(),
        config,
    };

    // loop members read each other from before the pass, not mid-pass
    let held: Vec<Vec<bool>> = if schedule.has_cycle {
        circuit.gates.iter().map(|g| g.outputs.clone()).collect()
    } else {
        Vec::new()
    };

    for &idx in &schedule.order {
        let inputs = if schedule.cyclic[idx] {
            graph.gather_loop_inputs(circuit, idx, schedule, &held)
        } else {
            graph.gather_inputs(circuit, idx)
        };
        let evaluation =
            evaluate_or_fallback(&circuit.gates[idx], &inputs, &env, context, &mut warnings);
        apply_evaluation(&mut circuit.gates[idx], &inputs, evaluation, context);
    }

    // every gate is now current; nothing is left for the event-driven evaluator
    context.sync_with(circuit);
    context.replace_dirty(Default::default());
    circuit.sync_wires();
    log::trace!(
        "batch pass over {} gates, {} warnings",
        schedule.order.len(),
        warnings.len()
    );
    warnings
}
