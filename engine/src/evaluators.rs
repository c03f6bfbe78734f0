use crate::{
    batch::evaluate_direct,
    circuit::Circuit,
    clock_manager::{rising_edge, ClockManager},
    components::{Gate, GateMemory, GateType},
    config::EngineConfig,
    context::EvaluationContext,
    error::{EvaluationError, Warning, WarningKind},
    types::BinaryLogicReducer,
};

#[derive(Debug, Clone, Copy)]
pub struct EvalEnv<'a> {
    pub time: f64,
    // Custom-gate nesting depth of the circuit being evaluated.
    pub depth: usize,
    pub config: &'a EngineConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateEvaluation {
    pub outputs: Vec<bool>,
    pub memory: Option<GateMemory>,
    /// Updated internal circuit of a custom gate.
    pub internal: Option<Circuit>,
    pub warnings: Vec<Warning>,
}

impl GateEvaluation {
    fn outputs(outputs: Vec<bool>) -> GateEvaluation {
        GateEvaluation {
            outputs,
            ..GateEvaluation::default()
        }
    }

    fn with_memory(outputs: Vec<bool>, memory: GateMemory) -> GateEvaluation {
        GateEvaluation {
            outputs,
            memory: Some(memory),
            ..GateEvaluation::default()
        }
    }
}

pub type GateEvaluator = fn(
    &Gate,
    &[bool],
    &EvalEnv,
    Option<&GateMemory>,
) -> Result<GateEvaluation, EvaluationError>;

fn and_reduce(v: &[bool]) -> bool {
    v.iter().all(|b| *b)
}

fn or_reduce(v: &[bool]) -> bool {
    v.iter().any(|b| *b)
}

fn xor_reduce(v: &[bool]) -> bool {
    v.iter().filter(|b| **b).count() % 2 == 1
}

fn not_reduce(v: &[bool]) -> bool {
    !v.first().copied().unwrap_or(false)
}

fn nand_reduce(v: &[bool]) -> bool {
    !and_reduce(v)
}

fn nor_reduce(v: &[bool]) -> bool {
    !or_reduce(v)
}

fn xnor_reduce(v: &[bool]) -> bool {
    !xor_reduce(v)
}

pub fn reducer(gate_type: GateType) -> Option<BinaryLogicReducer> {
    match gate_type {
        GateType::And => Some(and_reduce),
        GateType::Or => Some(or_reduce),
        GateType::Xor => Some(xor_reduce),
        GateType::Not => Some(not_reduce),
        GateType::Nand => Some(nand_reduce),
        GateType::Nor => Some(nor_reduce),
        GateType::Xnor => Some(xnor_reduce),
        _ => None,
    }
}

pub fn evaluator_for(gate_type: GateType) -> GateEvaluator {
    match gate_type {
        GateType::And
        | GateType::Or
        | GateType::Xor
        | GateType::Not
        | GateType::Nand
        | GateType::Nor
        | GateType::Xnor => eval_combinational,
        GateType::Input => eval_input,
        GateType::Output => eval_output,
        GateType::Clock => eval_clock,
        GateType::SrLatch => eval_sr_latch,
        GateType::DFlipFlop => eval_d_flip_flop,
        GateType::Mux => eval_mux,
        GateType::BinaryCounter => eval_binary_counter,
        GateType::Custom => eval_custom,
        GateType::Unknown => eval_passthrough,
    }
}

pub fn evaluate_gate(
    gate: &Gate,
    inputs: &[bool],
    env: &EvalEnv,
    prior: Option<&GateMemory>,
) -> Result<GateEvaluation, EvaluationError> {
    (evaluator_for(gate.gate_type))(gate, inputs, env, prior)
}

fn eval_combinational(
    gate: &Gate,
    inputs: &[bool],
    env: &EvalEnv,
    prior: Option<&GateMemory>,
) -> Result<GateEvaluation, EvaluationError> {
    match reducer(gate.gate_type) {
        Some(f) => Ok(GateEvaluation::outputs(vec![f(inputs)])),
        None => eval_passthrough(gate, inputs, env, prior),
    }
}

// INPUT gates only change through explicit user action.
fn eval_input(
    gate: &Gate,
    _: &[bool],
    _: &EvalEnv,
    _: Option<&GateMemory>,
) -> Result<GateEvaluation, EvaluationError> {
    Ok(GateEvaluation::outputs(gate.outputs.clone()))
}

fn eval_output(
    _: &Gate,
    _: &[bool],
    _: &EvalEnv,
    _: Option<&GateMemory>,
) -> Result<GateEvaluation, EvaluationError> {
    Ok(GateEvaluation::outputs(Vec::new()))
}

fn eval_clock(
    gate: &Gate,
    _: &[bool],
    env: &EvalEnv,
    _: Option<&GateMemory>,
) -> Result<GateEvaluation, EvaluationError> {
    let outputs = match ClockManager::from_metadata(&gate.metadata).level_at(env.time) {
        Some(level) => vec![level],
        None => gate.outputs.clone(),
    };
    Ok(GateEvaluation::outputs(outputs))
}

/// S=1,R=1 drives both outputs low, as a NOR latch does, and leaves the
/// stored bit untouched so releasing both inputs restores the prior state.
fn eval_sr_latch(
    gate: &Gate,
    inputs: &[bool],
    _: &EvalEnv,
    prior: Option<&GateMemory>,
) -> Result<GateEvaluation, EvaluationError> {
    let s = inputs.first().copied().unwrap_or(false);
    let r = inputs.get(1).copied().unwrap_or(false);
    let held = match prior {
        Some(GateMemory::Latch { q }) => *q,
        _ => gate.outputs.first().copied().unwrap_or(false),
    };
    let (q, outputs) = match (s, r) {
        (true, false) => (true, vec![true, false]),
        (false, true) => (false, vec![false, true]),
        (false, false) => (held, vec![held, !held]),
        (true, true) => (held, vec![false, false]),
    };
    Ok(GateEvaluation::with_memory(outputs, GateMemory::Latch { q }))
}

fn eval_d_flip_flop(
    gate: &Gate,
    inputs: &[bool],
    _: &EvalEnv,
    prior: Option<&GateMemory>,
) -> Result<GateEvaluation, EvaluationError> {
    let d = inputs.first().copied().unwrap_or(false);
    let clk = inputs.get(1).copied().unwrap_or(false);
    // without memory, the current level counts as already seen: no edge on power-on
    let (mut q, prev_clk) = match prior {
        Some(GateMemory::FlipFlop { q, prev_clk }) => (*q, *prev_clk),
        _ => (gate.outputs.first().copied().unwrap_or(false), clk),
    };
    if rising_edge(prev_clk, clk) {
        q = d;
    }
    Ok(GateEvaluation::with_memory(
        vec![q, !q],
        GateMemory::FlipFlop { q, prev_clk: clk },
    ))
}

fn eval_binary_counter(
    gate: &Gate,
    inputs: &[bool],
    _: &EvalEnv,
    prior: Option<&GateMemory>,
) -> Result<GateEvaluation, EvaluationError> {
    let clk = inputs.first().copied().unwrap_or(false);
    let bits = gate.outputs.len().min(64);
    let (mut count, prev_clk) = match prior {
        Some(GateMemory::Counter { count, prev_clk }) => (*count, *prev_clk),
        _ => {
            let restored = gate
                .outputs
                .iter()
                .take(64)
                .enumerate()
                .fold(0u64, |acc, (i, b)| acc | ((*b as u64) << i));
            (restored, clk)
        }
    };
    if rising_edge(prev_clk, clk) {
        count = count.wrapping_add(1);
    }
    if bits < 64 {
        count &= (1u64 << bits) - 1;
    }
    let outputs = (0..bits).map(|i| (count >> i) & 1 == 1).collect();
    Ok(GateEvaluation::with_memory(
        outputs,
        GateMemory::Counter {
            count,
            prev_clk: clk,
        },
    ))
}

// Number of select lines for a MUX with `n_inputs` pins: the largest `k`
// with `2^k + k <= n_inputs`.
pub fn mux_select_bits(n_inputs: usize) -> usize {
    let mut k = 0;
    while k < 16 && (1usize << (k + 1)) + k + 1 <= n_inputs {
        k += 1;
    }
    k
}

fn eval_mux(
    _: &Gate,
    inputs: &[bool],
    _: &EvalEnv,
    _: Option<&GateMemory>,
) -> Result<GateEvaluation, EvaluationError> {
    let k = mux_select_bits(inputs.len());
    if k == 0 {
        return Ok(GateEvaluation::outputs(vec![false]));
    }
    let (data, select) = inputs.split_at(inputs.len() - k);
    let idx = select
        .iter()
        .enumerate()
        .fold(0usize, |acc, (i, b)| acc | ((*b as usize) << i));
    Ok(GateEvaluation::outputs(vec![data
        .get(idx)
        .copied()
        .unwrap_or(false)]))
}

// Output i mirrors input i.
fn eval_passthrough(
    gate: &Gate,
    inputs: &[bool],
    _: &EvalEnv,
    _: Option<&GateMemory>,
) -> Result<GateEvaluation, EvaluationError> {
    let outputs = (0..gate.outputs.len())
        .map(|i| inputs.get(i).copied().unwrap_or(false))
        .collect();
    Ok(GateEvaluation::outputs(outputs))
}

fn eval_custom(
    gate: &Gate,
    inputs: &[bool],
    env: &EvalEnv,
    _: Option<&GateMemory>,
) -> Result<GateEvaluation, EvaluationError> {
    if env.depth >= env.config.max_recursion_depth {
        return Err(EvaluationError::RecursionLimitExceeded {
            depth: env.depth + 1,
            limit: env.config.max_recursion_depth,
        });
    }
    let definition = gate
        .metadata
        .custom_gate_definition
        .as_ref()
        .ok_or_else(|| EvaluationError::MissingDefinition(gate.id.clone()))?;
    let mut internal = definition
        .internal_circuit
        .clone()
        .ok_or_else(|| EvaluationError::MissingInternalCircuit(gate.id.clone()))?;

    let unknown = |internal_id: &str| EvaluationError::UnknownInternalGate {
        gate_id: gate.id.clone(),
        internal_id: internal_id.to_string(),
    };
    for (i, pin) in definition.input_pins.iter().enumerate() {
        let value = inputs.get(i).copied().unwrap_or(false);
        internal
            .set_input(&pin.gate_id, value)
            .map_err(|_| unknown(&pin.gate_id))?;
    }

    let mut context = EvaluationContext::nested(env.time, env.depth + 1);
    let warnings = evaluate_direct(&mut internal, &mut context, env.config)
        .into_iter()
        .map(|w| Warning {
            kind: w.kind,
            gate_id: Some(gate.id.clone()),
            message: format!("{}: {}", definition.name, w.message),
        })
        .collect();

    let outputs = definition
        .output_pins
        .iter()
        .map(|pin| {
            internal
                .gate(&pin.gate_id)
                .map(|g| g.output)
                .ok_or_else(|| unknown(&pin.gate_id))
        })
        .collect::<Result<Vec<bool>, EvaluationError>>()?;

    Ok(GateEvaluation {
        outputs,
        memory: None,
        internal: Some(internal),
        warnings,
    })
}

/// Evaluates one gate, substituting all-low outputs (and a warning) when
/// its evaluator fails. Prior memory comes from the context first, then
/// from the gate's saved metadata.
pub(crate) fn evaluate_or_fallback(
    gate: &Gate,
    inputs: &[bool],
    env: &EvalEnv,
    context: &EvaluationContext,
    warnings: &mut Vec<Warning>,
) -> GateEvaluation {
    let prior = context.memory(&gate.id).or(gate.metadata.state.as_ref());
    match evaluate_gate(gate, inputs, env, prior) {
        Ok(mut evaluation) => {
            warnings.append(&mut evaluation.warnings);
            log::trace!("{} {} -> {:?}", gate.gate_type, gate.id, evaluation.outputs);
            evaluation
        }
        Err(e) => {
            log::warn!("gate {} fell back to low outputs: {}", gate.id, e);
            warnings.push(Warning::for_gate(
                WarningKind::Evaluation,
                &gate.id,
                e.to_string(),
            ));
            GateEvaluation::outputs(vec![false; gate.outputs.len()])
        }
    }
}

/// Stores an evaluation into its gate and the context; returns whether any
/// output value changed.
pub(crate) fn apply_evaluation(
    gate: &mut Gate,
    inputs: &[bool],
    evaluation: GateEvaluation,
    context: &mut EvaluationContext,
) -> bool {
    let before = gate.outputs.clone();
    gate.set_inputs(inputs);
    gate.set_outputs(&evaluation.outputs);
    if let Some(memory) = evaluation.memory {
        context.set_memory(&gate.id, memory);
        gate.metadata.state = Some(memory);
    }
    if let Some(internal) = evaluation.internal {
        if let Some(definition) = gate.metadata.custom_gate_definition.as_mut() {
            definition.internal_circuit = Some(internal);
        }
    }
    gate.outputs != before
}
