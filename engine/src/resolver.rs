use std::{
    cmp::Reverse,
    collections::{BTreeSet, BinaryHeap, HashMap},
};

use crate::{
    circuit::Circuit,
    error::DependencyError,
    types::{resolve_pin, GateId, PinType},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Incoming {
    pub pin: usize,
    pub source: usize,
    pub source_pin: usize,
}

// Gate-to-gate graph derived from the wires of one circuit, by gate index.
// Built per call and never cached between circuits.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    index: HashMap<GateId, usize>,
    incoming: Vec<Vec<Incoming>>,
    downstream: Vec<Vec<usize>>,
    issues: Vec<DependencyError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Schedule {
    pub order: Vec<usize>,
    // strongly connected component of every gate
    pub component: Vec<usize>,
    pub cyclic: Vec<bool>,
    pub has_cycle: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyResolution {
    pub order: Vec<GateId>,
    pub has_cycle: bool,
    pub cyclic_gates: BTreeSet<GateId>,
    pub issues: Vec<DependencyError>,
}

impl DependencyGraph {
    pub fn build(circuit: &Circuit) -> DependencyGraph {
        let index: HashMap<GateId, usize> = circuit
            .gates
            .iter()
            .enumerate()
            .map(|(i, g)| (g.id.clone(), i))
            .collect();
        let n = circuit.gates.len();
        let mut incoming: Vec<Vec<Incoming>> = vec![Vec::new(); n];
        let mut downstream: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        let mut issues = Vec::new();

        for wire in &circuit.wires {
            let (source, target) = match (
                index.get(&wire.from.gate_id),
                index.get(&wire.to.gate_id),
            ) {
                (Some(s), Some(t)) => (*s, *t),
                (None, _) => {
                    issues.push(DependencyError::MissingGate {
                        wire_id: wire.id.clone(),
                        gate_id: wire.from.gate_id.clone(),
                    });
                    continue;
                }
                (_, None) => {
                    issues.push(DependencyError::MissingGate {
                        wire_id: wire.id.clone(),
                        gate_id: wire.to.gate_id.clone(),
                    });
                    continue;
                }
            };
            let Some(source_pin) = resolve_pin(wire.from.pin_index)
                .filter(|p| *p < circuit.gates[source].outputs.len())
            else {
                issues.push(DependencyError::InvalidPin {
                    wire_id: wire.id.clone(),
                    gate_id: wire.from.gate_id.clone(),
                    pin_type: PinType::Output,
                    pin_index: wire.from.pin_index,
                });
                continue;
            };
            let Some(pin) = resolve_pin(wire.to.pin_index)
                .filter(|p| *p < circuit.gates[target].inputs.len())
            else {
                issues.push(DependencyError::InvalidPin {
                    wire_id: wire.id.clone(),
                    gate_id: wire.to.gate_id.clone(),
                    pin_type: PinType::Input,
                    pin_index: wire.to.pin_index,
                });
                continue;
            };
            if incoming[target].iter().any(|i| i.pin == pin) {
                issues.push(DependencyError::DuplicateFanIn {
                    wire_id: wire.id.clone(),
                    gate_id: wire.to.gate_id.clone(),
                    pin_index: pin,
                });
                continue;
            }
            incoming[target].push(Incoming {
                pin,
                source,
                source_pin,
            });
            downstream[source].insert(target);
        }

        for issue in &issues {
            log::warn!("{issue}");
        }

        DependencyGraph {
            index,
            incoming,
            downstream: downstream
                .into_iter()
                .map(|s| s.into_iter().collect())
                .collect(),
            issues,
        }
    }

    pub fn len(&self) -> usize {
        self.incoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty()
    }

    pub fn index_of(&self, gate_id: &str) -> Option<usize> {
        self.index.get(gate_id).copied()
    }

    pub fn issues(&self) -> &[DependencyError] {
        &self.issues
    }

    pub(crate) fn downstream(&self, idx: usize) -> &[usize] {
        &self.downstream[idx]
    }

    /// Values on the input pins of gate `idx`, read through its wires.
    /// Unconnected pins read low.
    pub(crate) fn gather_inputs(&self, circuit: &Circuit, idx: usize) -> Vec<bool> {
        self.gather_with(circuit, idx, |inc| &circuit.gates[inc.source].outputs)
    }

    /// Like `gather_inputs`, but wires coming from the same loop as `idx`
    /// read the outputs held in `held` instead of the live circuit.
    pub(crate) fn gather_loop_inputs(
        &self,
        circuit: &Circuit,
        idx: usize,
        schedule: &Schedule,
        held: &[Vec<bool>],
    ) -> Vec<bool> {
        self.gather_with(circuit, idx, |inc| {
            if schedule.cyclic[idx] && schedule.component[inc.source] == schedule.component[idx] {
                &held[inc.source]
            } else {
                &circuit.gates[inc.source].outputs
            }
        })
    }

    fn gather_with<'a>(
        &self,
        circuit: &Circuit,
        idx: usize,
        outputs_of: impl Fn(&Incoming) -> &'a Vec<bool>,
    ) -> Vec<bool> {
        let mut values = vec![false; circuit.gates[idx].inputs.len()];
        for inc in &self.incoming[idx] {
            values[inc.pin] = outputs_of(inc)
                .get(inc.source_pin)
                .copied()
                .unwrap_or(false);
        }
        values
    }

    /// Strongly connected components by Tarjan's algorithm (iterative, so
    /// deep circuits cannot overflow the stack). Returns the component id of
    /// every gate and whether that gate sits on a cycle.
    fn components(&self) -> (Vec<usize>, Vec<bool>) {
        const UNVISITED: usize = usize::MAX;
        let n = self.len();
        let mut order = vec![UNVISITED; n];
        let mut lowlink = vec![0; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut component = vec![UNVISITED; n];
        let mut cyclic = vec![false; n];
        let mut next = 0;
        let mut n_components = 0;

        for root in 0..n {
            if order[root] != UNVISITED {
                continue;
            }
            order[root] = next;
            lowlink[root] = next;
            next += 1;
            stack.push(root);
            on_stack[root] = true;
            let mut calls: Vec<(usize, usize)> = vec![(root, 0)];

            while let Some(frame) = calls.last_mut() {
                let v = frame.0;
                if frame.1 < self.downstream[v].len() {
                    let w = self.downstream[v][frame.1];
                    frame.1 += 1;
                    if order[w] == UNVISITED {
                        order[w] = next;
                        lowlink[w] = next;
                        next += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        calls.push((w, 0));
                    } else if on_stack[w] {
                        lowlink[v] = lowlink[v].min(order[w]);
                    }
                    continue;
                }

                calls.pop();
                if let Some(parent) = calls.last() {
                    lowlink[parent.0] = lowlink[parent.0].min(lowlink[v]);
                }
                if lowlink[v] == order[v] {
                    let mut members = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        members.push(w);
                        if w == v {
                            break;
                        }
                    }
                    let looped = members.len() > 1 || self.downstream[v].contains(&v);
                    for m in members {
                        component[m] = n_components;
                        cyclic[m] = looped;
                    }
                    n_components += 1;
                }
            }
        }
        (component, cyclic)
    }

    /// Kahn's algorithm with edges inside a feedback loop ignored. Ready
    /// gates are released sources first, then by insertion order, so the
    /// schedule is the same on every call.
    pub(crate) fn schedule(&self, circuit: &Circuit) -> Schedule {
        let n = self.len();
        let (component, cyclic) = self.components();
        let same_loop = |v: usize, w: usize| component[v] == component[w];

        let mut indegree = vec![0usize; n];
        for (v, targets) in self.downstream.iter().enumerate() {
            for &w in targets {
                if !same_loop(v, w) {
                    indegree[w] += 1;
                }
            }
        }

        let rank = |i: usize| u8::from(!circuit.gates[i].gate_type.is_source());
        let mut ready: BinaryHeap<Reverse<(u8, usize)>> = (0..n)
            .filter(|i| indegree[*i] == 0)
            .map(|i| Reverse((rank(i), i)))
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse((_, v))) = ready.pop() {
            order.push(v);
            for &w in &self.downstream[v] {
                if same_loop(v, w) {
                    continue;
                }
                indegree[w] -= 1;
                if indegree[w] == 0 {
                    ready.push(Reverse((rank(w), w)));
                }
            }
        }

        let has_cycle = cyclic.iter().any(|c| *c);
        Schedule {
            order,
            component,
            cyclic,
            has_cycle,
        }
    }
}

pub fn resolve_dependencies(circuit: &Circuit) -> DependencyResolution {
    let graph = DependencyGraph::build(circuit);
    let schedule = graph.schedule(circuit);
    let id = |i: usize| circuit.gates[i].id.clone();
    DependencyResolution {
        order: schedule.order.iter().map(|i| id(*i)).collect(),
        has_cycle: schedule.has_cycle,
        cyclic_gates: (0..graph.len())
            .filter(|i| schedule.cyclic[*i])
            .map(id)
            .collect(),
        issues: graph.issues,
    }
}
