use std::{env, fs, process::ExitCode};

use gatesim_engine::{
    generate_truth_table, Circuit, CircuitUpdateOps, EngineConfig, Gate, GateType, PinEndpoint,
    Position, SimulationRunner, SystemClock, TimingCapture,
};

fn half_adder(config: &EngineConfig) -> Result<Circuit, Box<dyn std::error::Error>> {
    let mut c = Circuit::new();
    let a = c.add_input("A", false);
    let b = c.add_input("B", false);
    let xor = c.add_gate(GateType::Xor, Position::new(100.0, 0.0));
    let and = c.add_gate(GateType::And, Position::new(100.0, 80.0));
    let s = c.add_output("S");
    let carry = c.add_output("C");
    for (from, to, pin) in [
        (&a, &xor, 0),
        (&b, &xor, 1),
        (&a, &and, 0),
        (&b, &and, 1),
        (&xor, &s, 0),
        (&and, &carry, 0),
    ] {
        c.connect(PinEndpoint::output(from, -1), PinEndpoint::input(to, pin), config)?;
    }
    Ok(c)
}

fn clocked_counter(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut runner = SimulationRunner::new(
        Circuit::new(),
        config.clone(),
        TimingCapture::new(SystemClock::new(), config.timing_history_limit),
    );
    runner.push(CircuitUpdateOps::AddGate(Gate::clock("clk", Position::default(), 2.0)));
    runner.push(CircuitUpdateOps::AddGate(Gate::counter(
        "count",
        Position::new(100.0, 0.0),
        4,
    )));
    runner.push(CircuitUpdateOps::Connect(
        PinEndpoint::output("clk", -1),
        PinEndpoint::input("count", 0),
    ));
    runner.apply_pending();
    if runner.sync_state().is_error() {
        return Err(runner.sync_state().error_msg().into());
    }
    let wired = runner.circuit().clone();
    runner.capture_mut().watch_all(&wired);

    println!("4 bit counter on a 2Hz clock, 125ms per tick");
    for _ in 0..24 {
        let report = runner.tick(125.0);
        if let Some(counter) = runner.circuit().gate("count") {
            println!(
                "t={:>5}ms {} ({} pin changes)",
                runner.time(),
                counter,
                report.events.len()
            );
        }
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::default();
    match env::args().nth(1) {
        Some(path) => {
            let circuit = Circuit::from_json(&fs::read_to_string(&path)?)?;
            println!("{path}: {} gates, {} wires", circuit.gates.len(), circuit.wires.len());
            println!("{}", generate_truth_table(&circuit, &config)?);
        }
        None => {
            println!("half adder");
            println!("{}", generate_truth_table(&half_adder(&config)?, &config)?);
            clocked_counter(&config)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
