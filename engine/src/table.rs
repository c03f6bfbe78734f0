use std::{collections::HashMap, fmt};

use crate::{
    batch::evaluate_direct,
    circuit::Circuit,
    components::GateType,
    config::EngineConfig,
    context::EvaluationContext,
    error::TruthTableError,
    types::MAX_TRUTH_TABLE_INPUTS,
};

/// A column-labelled table. The first `inputs` columns are drawn apart from
/// the rest when printed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table<T> {
    cols: Vec<String>,
    col_idx: HashMap<String, usize>,
    inputs: usize,
    pub rows: Vec<Vec<T>>,
}

impl<T: Default + Clone> Table<T> {
    pub fn new() -> Table<T> {
        Table {
            cols: Vec::new(),
            col_idx: HashMap::new(),
            inputs: 0,
            rows: Vec::new(),
        }
    }

    pub fn with_columns(cols: Vec<String>) -> Table<T> {
        let mut t = Table::new();
        t.set_columns(cols);
        t
    }

    /// Columns split into inputs (leading) and outputs.
    pub fn with_split(inputs: Vec<String>, outputs: Vec<String>) -> Table<T> {
        let split = inputs.len();
        let mut t = Table::with_columns(inputs.into_iter().chain(outputs).collect());
        t.inputs = split;
        t
    }

    // duplicate labels resolve to the last column carrying them
    pub fn set_columns(&mut self, cols: Vec<String>) {
        self.col_idx = cols
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        self.cols = cols;
        self.inputs = 0;
        self.rows.clear();
    }

    pub fn columns(&self) -> &[String] {
        &self.cols
    }

    pub fn input_columns(&self) -> &[String] {
        &self.cols[..self.inputs]
    }

    pub fn output_columns(&self) -> &[String] {
        &self.cols[self.inputs..]
    }

    pub fn push_row(&mut self, row: Vec<T>) -> Result<usize, TruthTableError> {
        if row.len() != self.cols.len() {
            return Err(TruthTableError::RowWidth {
                expected: self.cols.len(),
                got: row.len(),
            });
        }
        self.rows.push(row);
        Ok(self.rows.len() - 1)
    }

    pub fn get(&self, row: usize, col: &str) -> Result<Option<&T>, TruthTableError> {
        let j = self
            .col_idx
            .get(col)
            .ok_or_else(|| TruthTableError::UnknownColumn(col.to_string()))?;
        Ok(self.rows.get(row).and_then(|r| r.get(*j)))
    }

    pub fn column(&self, col: &str) -> Result<Vec<T>, TruthTableError> {
        let j = *self
            .col_idx
            .get(col)
            .ok_or_else(|| TruthTableError::UnknownColumn(col.to_string()))?;
        Ok(self.rows.iter().map(|r| r[j].clone()).collect())
    }
}

impl<T> Table<T> {
    fn separator(&self, j: usize) -> &'static str {
        if j > 0 && j == self.inputs {
            " ‖"
        } else {
            " |"
        }
    }
}

impl<T: fmt::Display> fmt::Display for Table<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths: Vec<usize> = self.cols.iter().map(|c| c.chars().count().max(1)).collect();

        for (j, (col, &w)) in self.cols.iter().zip(&widths).enumerate() {
            // output labels in yellow
            if j >= self.inputs {
                write!(f, "{} \x1b[33m{col:^w$}\x1b[0m", self.separator(j))?;
            } else {
                write!(f, "{} {col:^w$}", self.separator(j))?;
            }
        }
        writeln!(f, " |")?;
        for (j, w) in widths.iter().enumerate() {
            let joint = if j > 0 && j == self.inputs { "-╫" } else { "-+" };
            write!(f, "{joint}{}", "-".repeat(w + 1))?;
        }
        writeln!(f, "-+")?;
        for row in &self.rows {
            for (j, (value, &w)) in row.iter().zip(&widths).enumerate() {
                write!(f, "{} {:^w$}", self.separator(j), value.to_string())?;
            }
            writeln!(f, " |")?;
        }
        Ok(())
    }
}

/// Every assignment of `bits` inputs in counting order, most significant
/// bit first. `None` when `2^bits` rows do not fit in a `usize`.
pub fn combinations(bits: usize) -> Option<impl Iterator<Item = Vec<bool>>> {
    let rows = u32::try_from(bits)
        .ok()
        .and_then(|b| 1usize.checked_shl(b))?;
    Some((0..rows).map(move |n| (0..bits).rev().map(|i| (n >> i) & 1 == 1).collect()))
}

fn bit_char(b: bool) -> char {
    if b {
        '1'
    } else {
        '0'
    }
}

/// Evaluates every input combination once with the batch evaluator.
///
/// INPUT gates, in insertion order, become the input columns and OUTPUT
/// gates the output columns. Each row runs on its own copy of `circuit` with
/// a fresh context, so sequential gates start from the state saved in the
/// circuit.
pub fn generate_truth_table(
    circuit: &Circuit,
    config: &EngineConfig,
) -> Result<Table<char>, TruthTableError> {
    let inputs: Vec<(String, String)> = circuit
        .gates_of_type(GateType::Input)
        .map(|g| (g.id.clone(), g.label().to_string()))
        .collect();
    let outputs: Vec<(String, String)> = circuit
        .gates_of_type(GateType::Output)
        .map(|g| (g.id.clone(), g.label().to_string()))
        .collect();
    let limit = config.truth_table_max_inputs.min(MAX_TRUTH_TABLE_INPUTS);
    let too_many = || TruthTableError::TooManyInputs {
        count: inputs.len(),
        limit,
    };
    if inputs.len() > limit {
        return Err(too_many());
    }
    if outputs.is_empty() {
        return Err(TruthTableError::NoOutputs);
    }
    let rows = combinations(inputs.len()).ok_or_else(too_many)?;

    let label = |(_, label): &(String, String)| label.clone();
    let mut table = Table::with_split(
        inputs.iter().map(label).collect(),
        outputs.iter().map(label).collect(),
    );
    for combination in rows {
        let mut copy = circuit.clone();
        for ((id, _), value) in inputs.iter().zip(&combination) {
            if let Some(g) = copy.gate_mut(id) {
                g.set_outputs(&[*value]);
            }
        }
        let mut context = EvaluationContext::new();
        evaluate_direct(&mut copy, &mut context, config);

        let mut row: Vec<char> = combination.iter().map(|b| bit_char(*b)).collect();
        row.extend(
            outputs
                .iter()
                .map(|(id, _)| bit_char(copy.gate(id).map(|g| g.output).unwrap_or(false))),
        );
        table.push_row(row)?;
    }
    Ok(table)
}
