use std::{collections::VecDeque, time::Instant};

use serde::{Deserialize, Serialize};

use crate::{
    circuit::Circuit,
    components::{Gate, GateType},
    types::{GateId, PinType},
};

/// Where capture timestamps come from, in milliseconds.
pub trait TimeSource {
    fn now_ms(&mut self) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl TimeSource for SystemClock {
    fn now_ms(&mut self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

// Returns `current`, then moves it forward by `step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteppedClock {
    pub current: f64,
    pub step: f64,
}

impl SteppedClock {
    pub fn new(start: f64, step: f64) -> SteppedClock {
        SteppedClock {
            current: start,
            step,
        }
    }
}

impl TimeSource for SteppedClock {
    fn now_ms(&mut self) -> f64 {
        let now = self.current;
        self.current += self.step;
        now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub gate_id: GateId,
    pub pin_type: PinType,
    pub pin_index: usize,
}

impl Probe {
    pub fn output(gate_id: &str, pin_index: usize) -> Probe {
        Probe {
            gate_id: gate_id.to_string(),
            pin_type: PinType::Output,
            pin_index,
        }
    }

    pub fn input(gate_id: &str, pin_index: usize) -> Probe {
        Probe {
            gate_id: gate_id.to_string(),
            pin_type: PinType::Input,
            pin_index,
        }
    }

    fn read(&self, gate: &Gate) -> Option<bool> {
        let pins = match self.pin_type {
            PinType::Input => &gate.inputs,
            PinType::Output => &gate.outputs,
        };
        pins.get(self.pin_index).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSource {
    UserInput,
    Clock,
    Evaluation,
}

impl EventSource {
    fn of(gate_type: GateType) -> EventSource {
        match gate_type {
            GateType::Input => EventSource::UserInput,
            GateType::Clock => EventSource::Clock,
            _ => EventSource::Evaluation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingEvent {
    pub time: f64,
    pub gate_id: GateId,
    pub pin_type: PinType,
    pub pin_index: usize,
    pub value: bool,
    pub source: EventSource,
}

/// Diffs watched pins between two snapshots of a circuit and keeps a
/// bounded history of the changes.
#[derive(Debug, Clone)]
pub struct TimingCapture<T: TimeSource = SystemClock> {
    source: T,
    probes: Vec<Probe>,
    history: VecDeque<TimingEvent>,
    history_limit: usize,
    last_time: f64,
}

impl<T: TimeSource> TimingCapture<T> {
    pub fn new(source: T, history_limit: usize) -> TimingCapture<T> {
        TimingCapture {
            source,
            probes: Vec::new(),
            history: VecDeque::new(),
            history_limit,
            last_time: f64::NEG_INFINITY,
        }
    }

    pub fn watch(&mut self, probe: Probe) {
        if !self.probes.contains(&probe) {
            self.probes.push(probe);
        }
    }

    pub fn unwatch(&mut self, probe: &Probe) {
        self.probes.retain(|p| p != probe);
    }

    // Watches every output pin, plus the input pin of each OUTPUT sink.
    pub fn watch_all(&mut self, circuit: &Circuit) {
        for gate in &circuit.gates {
            for i in 0..gate.outputs.len() {
                self.watch(Probe::output(&gate.id, i));
            }
            if gate.gate_type == GateType::Output {
                for i in 0..gate.inputs.len() {
                    self.watch(Probe::input(&gate.id, i));
                }
            }
        }
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    /// One event per watched pin whose value differs between the snapshots.
    /// Pins of gates new in `current` count as changed from low; pins of
    /// gates gone from `current` are skipped.
    pub fn capture(&mut self, previous: &Circuit, current: &Circuit) -> Vec<TimingEvent> {
        let time = self.source.now_ms().max(self.last_time);
        self.last_time = time;

        let mut events = Vec::new();
        for probe in &self.probes {
            let Some(gate) = current.gate(&probe.gate_id) else {
                continue;
            };
            let Some(value) = probe.read(gate) else {
                continue;
            };
            let before = previous
                .gate(&probe.gate_id)
                .and_then(|g| probe.read(g))
                .unwrap_or(false);
            if before != value {
                events.push(TimingEvent {
                    time,
                    gate_id: probe.gate_id.clone(),
                    pin_type: probe.pin_type,
                    pin_index: probe.pin_index,
                    value,
                    source: EventSource::of(gate.gate_type),
                });
            }
        }

        self.history.extend(events.iter().cloned());
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
        events
    }

    pub fn history(&self) -> &VecDeque<TimingEvent> {
        &self.history
    }

    pub fn waveform<'a>(&'a self, probe: &'a Probe) -> impl Iterator<Item = (f64, bool)> + 'a {
        self.history
            .iter()
            .filter(move |e| {
                e.gate_id == probe.gate_id
                    && e.pin_type == probe.pin_type
                    && e.pin_index == probe.pin_index
            })
            .map(|e| (e.time, e.value))
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Position;

    #[test]
    fn stepped_clock_advances() {
        let mut clk = SteppedClock::new(5.0, 2.5);
        assert_eq!(clk.now_ms(), 5.0);
        assert_eq!(clk.now_ms(), 7.5);
    }

    #[test]
    fn captures_only_changed_probes() {
        let mut before = Circuit::new();
        let a = before.add_input("A", false);
        let g = before.add_gate(GateType::Not, Position::default());
        let mut after = before.clone();
        after.set_input(&a, true).unwrap();

        let mut capture = TimingCapture::new(SteppedClock::new(0.0, 10.0), 100);
        capture.watch_all(&before);
        assert_eq!(capture.probes().len(), 2);
        let events = capture.capture(&before, &after);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].gate_id, a);
        assert_eq!(events[0].source, EventSource::UserInput);
        assert!(events[0].value);

        assert!(capture.capture(&after, &after).is_empty());
        capture.unwatch(&Probe::output(&a, 0));
        assert!(capture.capture(&after, &before).is_empty());
        assert!(!capture.waveform(&Probe::output(&g, 0)).any(|_| true));
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let mut before = Circuit::new();
        let a = before.add_input("A", false);
        let mut after = before.clone();
        after.set_input(&a, true).unwrap();

        let mut capture = TimingCapture::new(SteppedClock::new(100.0, -50.0), 100);
        capture.watch(Probe::output(&a, 0));
        let t1 = capture.capture(&before, &after)[0].time;
        let t2 = capture.capture(&after, &before)[0].time;
        assert_eq!(t1, 100.0);
        assert_eq!(t2, 100.0);
    }

    #[test]
    fn history_is_bounded() {
        let mut low = Circuit::new();
        let a = low.add_input("A", false);
        let mut high = low.clone();
        high.set_input(&a, true).unwrap();

        let mut capture = TimingCapture::new(SteppedClock::new(0.0, 1.0), 3);
        capture.watch(Probe::output(&a, 0));
        for i in 0..5 {
            if i % 2 == 0 {
                capture.capture(&low, &high);
            } else {
                capture.capture(&high, &low);
            }
        }
        assert_eq!(capture.history().len(), 3);
        let wave: Vec<(f64, bool)> = capture.waveform(&Probe::output(&a, 0)).collect();
        assert_eq!(wave, vec![(2.0, true), (3.0, false), (4.0, true)]);
    }
}
