//! Linear-programming contract and the built-in solver.
//!
//! The model and solution types mirror the JSON contract of the JavaScript
//! solver used by the web front end, so a model can be handed to either the
//! [`SimplexSolver`] below or to a JS function through the wasm boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::error::CalculatorError;

/// Bounds of one constraint row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LpConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equal: Option<f64>,
}

impl LpConstraint {
    pub fn equal(value: f64) -> Self {
        LpConstraint {
            equal: Some(value),
            ..Default::default()
        }
    }

    pub fn at_least(value: f64) -> Self {
        LpConstraint {
            min: Some(value),
            ..Default::default()
        }
    }

    pub fn at_most(value: f64) -> Self {
        LpConstraint {
            max: Some(value),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    #[default]
    Min,
    Max,
}

/// Solver input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LpModel {
    /// Name of the objective entry in each variable's coefficient map.
    pub optimize: String,
    pub op_type: OpType,
    pub constraints: BTreeMap<String, LpConstraint>,
    /// Variable name to (constraint or objective name to coefficient).
    pub variables: BTreeMap<String, BTreeMap<String, f64>>,
}

impl LpModel {
    pub fn new(objective: &str) -> Self {
        LpModel {
            optimize: objective.to_string(),
            ..Default::default()
        }
    }
}

/// Solver output: flags, objective value and one entry per nonzero variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Value>", into = "BTreeMap<String, Value>")]
pub struct LpSolution {
    pub feasible: bool,
    pub bounded: bool,
    pub result: f64,
    pub values: BTreeMap<String, f64>,
}

impl LpSolution {
    /// Solved value of a variable; absent variables are zero.
    pub fn value(&self, var: &str) -> f64 {
        self.values.get(var).copied().unwrap_or(0.0)
    }

    pub fn infeasible() -> Self {
        LpSolution {
            feasible: false,
            bounded: true,
            ..Default::default()
        }
    }
}

impl From<BTreeMap<String, Value>> for LpSolution {
    fn from(raw: BTreeMap<String, Value>) -> Self {
        let mut solution = LpSolution::default();
        for (key, value) in raw {
            match key.as_str() {
                "feasible" => solution.feasible = value.as_bool().unwrap_or(false),
                "bounded" => solution.bounded = value.as_bool().unwrap_or(true),
                "result" => solution.result = value.as_f64().unwrap_or(0.0),
                _ => {
                    if let Some(number) = value.as_f64() {
                        solution.values.insert(key, number);
                    }
                }
            }
        }
        solution
    }
}

impl From<LpSolution> for BTreeMap<String, Value> {
    fn from(solution: LpSolution) -> Self {
        let mut raw: BTreeMap<String, Value> = solution
            .values
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();
        raw.insert("feasible".to_string(), Value::from(solution.feasible));
        raw.insert("bounded".to_string(), Value::from(solution.bounded));
        raw.insert("result".to_string(), Value::from(solution.result));
        raw
    }
}

/// Anything that can solve an [`LpModel`].
pub trait LpSolver {
    fn solve(&self, model: &LpModel) -> Result<LpSolution, CalculatorError>;
}

/// Dense two-phase simplex with Bland's rule. Variables are non-negative.
#[derive(Debug, Clone)]
pub struct SimplexSolver {
    pub epsilon: f64,
    pub max_iterations: usize,
}

impl Default for SimplexSolver {
    fn default() -> Self {
        SimplexSolver {
            epsilon: 1e-9,
            max_iterations: 50_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Relation {
    Le,
    Ge,
    Eq,
}

enum Outcome {
    Optimal,
    Unbounded,
}

struct Tableau {
    rows: Vec<Vec<f64>>,
    basis: Vec<usize>,
    width: usize,
}

impl Tableau {
    fn rhs(&self, row: usize) -> f64 {
        self.rows[row][self.width]
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let pivot = self.rows[row][col];
        for value in self.rows[row].iter_mut() {
            *value /= pivot;
        }
        let pivot_row = self.rows[row].clone();
        for (i, other) in self.rows.iter_mut().enumerate() {
            if i == row {
                continue;
            }
            let factor = other[col];
            if factor != 0.0 {
                for (value, p) in other.iter_mut().zip(pivot_row.iter()) {
                    *value -= factor * p;
                }
            }
        }
        self.basis[row] = col;
    }

    fn objective(&self, cost: &[f64]) -> f64 {
        self.basis
            .iter()
            .enumerate()
            .map(|(i, &b)| cost[b] * self.rhs(i))
            .sum()
    }

    fn optimize(
        &mut self,
        cost: &[f64],
        allowed: usize,
        epsilon: f64,
        max_iterations: usize,
    ) -> Result<Outcome, CalculatorError> {
        for _ in 0..max_iterations {
            let mut entering = None;
            for j in 0..allowed {
                if self.basis.contains(&j) {
                    continue;
                }
                let reduced = cost[j]
                    - self
                        .basis
                        .iter()
                        .enumerate()
                        .map(|(i, &b)| cost[b] * self.rows[i][j])
                        .sum::<f64>();
                if reduced < -epsilon {
                    entering = Some(j);
                    break;
                }
            }
            let Some(col) = entering else {
                return Ok(Outcome::Optimal);
            };

            let mut leaving: Option<(usize, f64)> = None;
            for i in 0..self.rows.len() {
                let a = self.rows[i][col];
                if a <= epsilon {
                    continue;
                }
                let ratio = self.rhs(i) / a;
                leaving = match leaving {
                    None => Some((i, ratio)),
                    Some((best, best_ratio)) => {
                        if ratio < best_ratio - epsilon
                            || (ratio <= best_ratio + epsilon && self.basis[i] < self.basis[best])
                        {
                            Some((i, ratio))
                        } else {
                            Some((best, best_ratio))
                        }
                    }
                };
            }
            let Some((row, _)) = leaving else {
                return Ok(Outcome::Unbounded);
            };
            self.pivot(row, col);
        }
        Err(CalculatorError::Solver(format!(
            "simplex did not converge in {max_iterations} iterations"
        )))
    }
}

impl LpSolver for SimplexSolver {
    fn solve(&self, model: &LpModel) -> Result<LpSolution, CalculatorError> {
        let vars: Vec<&String> = model.variables.keys().collect();
        let n = vars.len();

        let mut rows: Vec<(Vec<f64>, Relation, f64)> = Vec::new();
        for (name, constraint) in &model.constraints {
            let coeffs: Vec<f64> = vars
                .iter()
                .map(|v| model.variables[*v].get(name).copied().unwrap_or(0.0))
                .collect();
            if let Some(equal) = constraint.equal {
                rows.push((coeffs, Relation::Eq, equal));
                continue;
            }
            if let Some(min) = constraint.min {
                rows.push((coeffs.clone(), Relation::Ge, min));
            }
            if let Some(max) = constraint.max {
                rows.push((coeffs, Relation::Le, max));
            }
        }
        for (coeffs, relation, rhs) in rows.iter_mut() {
            if !rhs.is_finite() || coeffs.iter().any(|c| !c.is_finite()) {
                return Err(CalculatorError::Solver("non-finite model coefficient".to_string()));
            }
            if *rhs < 0.0 {
                *rhs = -*rhs;
                coeffs.iter_mut().for_each(|c| *c = -*c);
                *relation = match relation {
                    Relation::Le => Relation::Ge,
                    Relation::Ge => Relation::Le,
                    Relation::Eq => Relation::Eq,
                };
            }
        }

        let slack_count = rows.iter().filter(|r| r.1 != Relation::Eq).count();
        let artificial_start = n + slack_count;
        let artificial_count = rows.iter().filter(|r| r.1 != Relation::Le).count();
        let width = artificial_start + artificial_count;

        let mut tableau = Tableau {
            rows: Vec::with_capacity(rows.len()),
            basis: Vec::with_capacity(rows.len()),
            width,
        };
        let (mut slack, mut artificial) = (n, artificial_start);
        for (coeffs, relation, rhs) in &rows {
            let mut row = vec![0.0; width + 1];
            row[..n].copy_from_slice(coeffs);
            row[width] = *rhs;
            match relation {
                Relation::Le => {
                    row[slack] = 1.0;
                    tableau.basis.push(slack);
                    slack += 1;
                }
                Relation::Ge => {
                    row[slack] = -1.0;
                    slack += 1;
                    row[artificial] = 1.0;
                    tableau.basis.push(artificial);
                    artificial += 1;
                }
                Relation::Eq => {
                    row[artificial] = 1.0;
                    tableau.basis.push(artificial);
                    artificial += 1;
                }
            }
            tableau.rows.push(row);
        }

        // Phase 1: minimize the artificial variables.
        let phase_one: Vec<f64> = (0..width)
            .map(|j| if j >= artificial_start { 1.0 } else { 0.0 })
            .collect();
        tableau.optimize(&phase_one, width, self.epsilon, self.max_iterations)?;
        if tableau.objective(&phase_one) > 1e-7 {
            trace!("simplex phase 1 left artificial slack; infeasible");
            return Ok(LpSolution::infeasible());
        }

        // Drive zero-level artificials out of the basis; rows that cannot be are redundant.
        let mut redundant = Vec::new();
        for i in 0..tableau.rows.len() {
            if tableau.basis[i] < artificial_start {
                continue;
            }
            match (0..artificial_start).find(|&j| tableau.rows[i][j].abs() > self.epsilon) {
                Some(j) => tableau.pivot(i, j),
                None => redundant.push(i),
            }
        }
        for i in redundant.into_iter().rev() {
            tableau.rows.remove(i);
            tableau.basis.remove(i);
        }

        // Phase 2: the real objective, artificial columns frozen out.
        let sign = match model.op_type {
            OpType::Min => 1.0,
            OpType::Max => -1.0,
        };
        let mut cost = vec![0.0; width];
        for (j, var) in vars.iter().enumerate() {
            cost[j] = sign
                * model.variables[*var]
                    .get(&model.optimize)
                    .copied()
                    .unwrap_or(0.0);
        }
        let outcome = tableau.optimize(&cost, artificial_start, self.epsilon, self.max_iterations)?;

        let mut values = BTreeMap::new();
        for (i, &b) in tableau.basis.iter().enumerate() {
            if b < n {
                let value = tableau.rhs(i);
                if value.abs() > self.epsilon {
                    values.insert(vars[b].clone(), value);
                }
            }
        }
        let result = sign * tableau.objective(&cost);
        Ok(LpSolution {
            feasible: true,
            bounded: matches!(outcome, Outcome::Optimal),
            result,
            values,
        })
    }
}
