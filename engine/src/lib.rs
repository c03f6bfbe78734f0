pub mod batch;
pub mod circuit;
pub mod clock_manager;
pub mod components;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluators;
pub mod event_driven;
pub mod hybrid;
pub mod resolver;
pub mod runner;
pub mod table;
pub mod timing;
pub mod types;
pub mod validation;

pub use batch::evaluate_direct;
pub use circuit::{Circuit, PinEndpoint, PinRef, Wire};
pub use components::{CustomGateDefinition, Gate, GateMemory, GateMetadata, GateType, Position};
pub use config::{EngineConfig, EvaluationStrategy};
pub use context::EvaluationContext;
pub use error::{
    CircuitError, ConfigError, ConnectionError, DependencyError, EvaluationError,
    TruthTableError, Warning, WarningKind,
};
pub use event_driven::{evaluate_event_driven, EventOutcome};
pub use hybrid::{evaluate, EvaluationResult, Evaluator, StrategyUsed};
pub use resolver::{resolve_dependencies, DependencyResolution};
pub use runner::{CircuitUpdateOps, SimulationRunner, SyncState, TickReport};
pub use table::{generate_truth_table, Table};
pub use timing::{SteppedClock, SystemClock, TimeSource, TimingCapture, TimingEvent};

#[cfg(test)]
mod tests {
    use super::*;

    fn link(c: &mut Circuit, from: &str, out_pin: i32, to: &str, in_pin: i32) -> String {
        c.connect(
            PinEndpoint::output(from, out_pin),
            PinEndpoint::input(to, in_pin),
            &EngineConfig::default(),
        )
        .unwrap()
    }

    fn output_of(c: &Circuit, id: &str) -> bool {
        c.gate(id).unwrap().output
    }

    struct HalfAdder {
        circuit: Circuit,
        a: String,
        b: String,
        sum: String,
        carry: String,
    }

    fn half_adder() -> HalfAdder {
        let mut c = Circuit::new();
        let a = c.add_input("A", false);
        let b = c.add_input("B", false);
        let xor = c.add_gate(GateType::Xor, Position::default());
        let and = c.add_gate(GateType::And, Position::default());
        let sum = c.add_output("S");
        let carry = c.add_output("C");
        link(&mut c, &a, -1, &xor, 0);
        link(&mut c, &b, -1, &xor, 1);
        link(&mut c, &a, -1, &and, 0);
        link(&mut c, &b, -1, &and, 1);
        link(&mut c, &xor, -1, &sum, 0);
        link(&mut c, &and, -1, &carry, 0);
        HalfAdder {
            circuit: c,
            a,
            b,
            sum,
            carry,
        }
    }

    #[test]
    fn half_adder_adds() {
        let config = EngineConfig::default();
        let HalfAdder {
            mut circuit,
            a,
            b,
            sum,
            carry,
        } = half_adder();
        for (va, vb) in [(false, false), (false, true), (true, false), (true, true)] {
            circuit.set_input(&a, va).unwrap();
            circuit.set_input(&b, vb).unwrap();
            let result = evaluate(&mut circuit, &config);
            assert!(result.warnings.is_empty());
            assert_eq!(output_of(&circuit, &sum), va ^ vb);
            assert_eq!(output_of(&circuit, &carry), va && vb);
        }

        let table = generate_truth_table(&half_adder().circuit, &config).unwrap();
        assert_eq!(table.column("S").unwrap(), vec!['0', '1', '1', '0']);
        assert_eq!(table.column("C").unwrap(), vec!['0', '0', '0', '1']);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let config = EngineConfig::default();
        let mut first = half_adder();
        first.circuit.set_input(&first.a, true).unwrap();
        let mut second = first.circuit.clone();

        for strategy in [EvaluationStrategy::BatchOnly, EvaluationStrategy::EventDrivenOnly] {
            let evaluator = Evaluator::new(config.clone());
            evaluator.evaluate_with(&mut first.circuit, &mut EvaluationContext::new(), strategy);
            evaluator.evaluate_with(&mut second, &mut EvaluationContext::new(), strategy);
            assert_eq!(
                first.circuit.to_json().unwrap(),
                second.to_json().unwrap()
            );
        }
    }

    /// Q = NOR(R, Q'), Q' = NOR(S, Q)
    fn nor_latch() -> (Circuit, String, String, String) {
        let mut c = Circuit::new();
        let s = c.add_input("S", false);
        let r = c.add_input("R", false);
        let q = c.add_gate(GateType::Nor, Position::default());
        let qn = c.add_gate(GateType::Nor, Position::default());
        let out = c.add_output("Q");
        link(&mut c, &r, -1, &q, 0);
        link(&mut c, &s, -1, &qn, 0);
        link(&mut c, &q, -1, &qn, 1);
        link(&mut c, &qn, -1, &q, 1);
        link(&mut c, &q, -1, &out, 0);
        (c, s, r, out)
    }

    #[test]
    fn nor_latch_sets_holds_and_resets() {
        let evaluator = Evaluator::new(EngineConfig::default());
        let (mut c, s, r, out) = nor_latch();
        let mut ctx = EvaluationContext::new();
        let mut step = |c: &mut Circuit, sv: bool, rv: bool| {
            c.set_input(&s, sv).unwrap();
            c.set_input(&r, rv).unwrap();
            let result = evaluator.evaluate(c, &mut ctx);
            assert_eq!(result.strategy_used, StrategyUsed::EventDriven);
            assert!(result.has_circular_dependency);
            output_of(c, &out)
        };
        assert!(step(&mut c, true, false));
        assert!(step(&mut c, false, false));
        assert!(!step(&mut c, false, true));
        assert!(!step(&mut c, false, false));
        assert!(step(&mut c, true, false));
    }

    #[test]
    fn sr_latch_gate_holds_through_a_circuit() {
        let config = EngineConfig::default();
        let evaluator = Evaluator::new(config);
        let mut c = Circuit::new();
        let s = c.add_input("S", false);
        let r = c.add_input("R", false);
        let latch = c.add_gate(GateType::SrLatch, Position::default());
        let q = c.add_output("Q");
        let qn = c.add_output("Qn");
        link(&mut c, &s, -1, &latch, 0);
        link(&mut c, &r, -1, &latch, 1);
        link(&mut c, &latch, 0, &q, 0);
        link(&mut c, &latch, 1, &qn, 0);

        let mut ctx = EvaluationContext::new();
        for (sv, rv, expect) in [
            (true, false, (true, false)),
            (false, false, (true, false)),
            (true, true, (false, false)),
            (false, false, (true, false)),
            (false, true, (false, true)),
            (false, false, (false, true)),
        ] {
            c.set_input(&s, sv).unwrap();
            c.set_input(&r, rv).unwrap();
            evaluator.evaluate(&mut c, &mut ctx);
            assert_eq!((output_of(&c, &q), output_of(&c, &qn)), expect, "S={sv} R={rv}");
        }
    }

    #[test]
    fn d_flip_flop_samples_on_rising_edge() {
        let evaluator = Evaluator::new(EngineConfig::default());
        let mut c = Circuit::new();
        let d = c.add_input("D", true);
        let clk = c.add_input("CLK", false);
        let ff = c.add_gate(GateType::DFlipFlop, Position::default());
        let q = c.add_output("Q");
        link(&mut c, &d, -1, &ff, 0);
        link(&mut c, &clk, -1, &ff, 1);
        link(&mut c, &ff, 0, &q, 0);

        let mut ctx = EvaluationContext::new();
        let mut run = |c: &mut Circuit, dv: bool, cv: bool| {
            c.set_input(&d, dv).unwrap();
            c.set_input(&clk, cv).unwrap();
            evaluator.evaluate(c, &mut ctx);
            output_of(c, &q)
        };
        assert!(!run(&mut c, true, false));
        assert!(run(&mut c, true, true));
        assert!(run(&mut c, false, true));
        assert!(run(&mut c, false, false));
        assert!(!run(&mut c, false, true));
    }

    #[test]
    fn released_nor_latch_keeps_oscillating() {
        let evaluator = Evaluator::new(EngineConfig::default());
        let mut c = Circuit::new();
        let s = c.add_input("S", true);
        let r = c.add_input("R", true);
        let n1 = c.add_gate(GateType::Nor, Position::default());
        let n2 = c.add_gate(GateType::Nor, Position::default());
        let q = c.add_output("Q");
        link(&mut c, &s, -1, &n1, 0);
        link(&mut c, &r, -1, &n2, 0);
        link(&mut c, &n1, -1, &n2, 1);
        link(&mut c, &n2, -1, &n1, 1);
        link(&mut c, &n1, -1, &q, 0);

        let mut ctx = EvaluationContext::new();
        let held = evaluator.evaluate(&mut c, &mut ctx);
        assert!(!held.has_warning(WarningKind::StepLimit));
        assert!(!output_of(&c, &n1) && !output_of(&c, &n2));

        c.set_input(&s, false).unwrap();
        c.set_input(&r, false).unwrap();
        let mut seen = Vec::new();
        for call in 0..12 {
            ctx.advance(16.0);
            let result = evaluator.evaluate(&mut c, &mut ctx);
            assert_eq!(result.strategy_used, StrategyUsed::EventDriven);
            assert!(result.steps > 0, "settled on call {call}");
            // only the call that releases the latch runs into the step cap
            assert_eq!(result.has_warning(WarningKind::StepLimit), call == 0);
            seen.push(output_of(&c, &q));
        }
        let highs = seen.iter().filter(|v| **v).count();
        assert!(highs > 0 && highs < seen.len(), "{seen:?}");
    }

    #[test]
    fn custom_half_adder_matches_flat_circuit() {
        let config = EngineConfig::default();
        let definition = CustomGateDefinition::from_circuit("Half Adder", half_adder().circuit);
        assert_eq!(definition.input_pins.len(), 2);
        assert_eq!(definition.output_pins.len(), 2);

        let mut outer = Circuit::new();
        let x = outer.add_input("X", false);
        let y = outer.add_input("Y", false);
        let ha = outer.add_custom_gate(definition, Position::default());
        let sum = outer.add_output("SUM");
        let carry = outer.add_output("CARRY");
        link(&mut outer, &x, -1, &ha, 0);
        link(&mut outer, &y, -1, &ha, 1);
        link(&mut outer, &ha, 0, &sum, 0);
        link(&mut outer, &ha, 1, &carry, 0);

        for (vx, vy) in [(false, false), (false, true), (true, false), (true, true)] {
            outer.set_input(&x, vx).unwrap();
            outer.set_input(&y, vy).unwrap();
            let result = evaluate(&mut outer, &config);
            assert!(result.warnings.is_empty());
            assert_eq!(output_of(&outer, &sum), vx ^ vy);
            assert_eq!(output_of(&outer, &carry), vx && vy);
        }

        // the evaluated internals are written back and survive a save/load
        let reloaded = Circuit::from_json(&outer.to_json().unwrap()).unwrap();
        assert_eq!(reloaded, outer);
        let internal = reloaded
            .gate(&ha)
            .and_then(|g| g.metadata.custom_gate_definition.as_ref())
            .and_then(|d| d.internal_circuit.as_ref())
            .unwrap();
        assert!(internal.gates_of_type(GateType::Input).all(|g| g.output));
    }

    fn wrap(name: &str, inner: CustomGateDefinition) -> CustomGateDefinition {
        let mut c = Circuit::new();
        let i = c.add_input("I", false);
        let g = c.add_custom_gate(inner, Position::default());
        let o = c.add_output("O");
        link(&mut c, &i, -1, &g, 0);
        link(&mut c, &g, 0, &o, 0);
        CustomGateDefinition::from_circuit(name, c)
    }

    #[test]
    fn deep_custom_nesting_falls_back_to_low() {
        let mut base = Circuit::new();
        let i = base.add_input("I", false);
        let o = base.add_output("O");
        link(&mut base, &i, -1, &o, 0);
        let mut definition = CustomGateDefinition::from_circuit("wire", base);
        for level in 1..12 {
            definition = wrap(&format!("level{level}"), definition);
        }

        let build = |definition: CustomGateDefinition| {
            let mut c = Circuit::new();
            let a = c.add_input("A", true);
            let g = c.add_custom_gate(definition, Position::default());
            let y = c.add_output("Y");
            link(&mut c, &a, -1, &g, 0);
            link(&mut c, &g, 0, &y, 0);
            (c, g, y)
        };

        let (mut shallow_limit, g, y) = build(definition.clone());
        let result = evaluate(&mut shallow_limit, &EngineConfig::default());
        assert!(!output_of(&shallow_limit, &y));
        let warning = result
            .warnings
            .iter()
            .find(|w| w.kind == WarningKind::Evaluation)
            .unwrap();
        assert_eq!(warning.gate_id.as_deref(), Some(g.as_str()));

        let deep = EngineConfig {
            max_recursion_depth: 20,
            ..EngineConfig::default()
        };
        let (mut deep_limit, _, y) = build(definition);
        let result = evaluate(&mut deep_limit, &deep);
        assert!(!result.has_warning(WarningKind::Evaluation));
        assert!(output_of(&deep_limit, &y));
    }

    #[test]
    fn saved_latch_state_survives_reload() {
        let config = EngineConfig::default();
        let mut c = Circuit::new();
        let s = c.add_input("S", true);
        let latch = c.add_gate(GateType::SrLatch, Position::new(100.0, 40.0));
        let q = c.add_output("Q");
        link(&mut c, &s, -1, &latch, 0);
        link(&mut c, &latch, 0, &q, 0);
        evaluate(&mut c, &config);
        c.set_input(&s, false).unwrap();

        let mut reloaded = Circuit::from_json(&c.to_json().unwrap()).unwrap();
        assert_eq!(
            reloaded.gate(&latch).unwrap().metadata.state,
            Some(GateMemory::Latch { q: true })
        );
        evaluate(&mut reloaded, &config);
        assert!(output_of(&reloaded, &q));
    }

    #[test]
    fn removed_gate_leaves_a_clean_circuit() {
        let config = EngineConfig::default();
        let HalfAdder {
            mut circuit, sum, ..
        } = half_adder();
        let xor = circuit.incoming_wire(&sum, 0).unwrap().from.gate_id.clone();
        circuit.remove_gate(&xor).unwrap();
        assert_eq!(circuit.wires.len(), 3);
        let result = evaluate(&mut circuit, &config);
        assert!(result.warnings.is_empty());
        assert!(!output_of(&circuit, &sum));
    }

    #[test]
    fn clock_drives_a_counter() {
        let evaluator = Evaluator::new(EngineConfig::default());
        let mut c = Circuit::new();
        let clk = c
            .insert_gate(Gate::clock("clk", Position::default(), 1.0))
            .unwrap();
        let counter = c
            .insert_gate(Gate::counter("cnt", Position::default(), 4))
            .unwrap();
        link(&mut c, &clk, -1, &counter, 0);

        let mut ctx = EvaluationContext::new();
        for _ in 0..12 {
            ctx.advance(250.0);
            evaluator.evaluate(&mut c, &mut ctx);
        }
        // rising edges at 500, 1500 and 2500 ms
        assert_eq!(
            c.gate(&counter).unwrap().outputs,
            vec![true, true, false, false]
        );
    }
}
