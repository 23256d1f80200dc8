use std::time::Duration;

use tracing::debug;

use crate::backend::{Backend, BackendStatus, Engine, Sense, VarHandle, VariableKind};
use crate::branch::{BranchAndBound, SearchOutcome, SearchStatus};
use crate::problem::{ConstraintOp, LpProblem, VariableDef};

/// Backend for the engines that take a generic column/row model
#[derive(Debug, Clone)]
pub struct MipBackend {
    engine: Engine,
    problem: LpProblem,
    relative_gap: f64,
    time_limit: Option<Duration>,
    outcome: Option<SearchOutcome>,
}

impl MipBackend {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            problem: LpProblem::with_variables(Vec::new()),
            relative_gap: 1e-4,
            time_limit: None,
            outcome: None,
        }
    }

    /// The model assembled so far
    pub fn problem(&self) -> &LpProblem {
        &self.problem
    }

    fn padded(&self, coefficients: &[f64]) -> Vec<f64> {
        let mut row = coefficients.to_vec();
        row.resize(self.problem.num_variables(), 0.0);
        row
    }
}

/// Add a ranged row to `problem` as one or two one-sided constraints
pub(crate) fn push_ranged_row(problem: &mut LpProblem, lower: f64, upper: f64, row: Vec<f64>) {
    let name = format!("row{}", problem.num_constraints());
    if lower == upper {
        problem.add_constraint(name, row, ConstraintOp::Eq, lower);
        return;
    }
    if lower.is_finite() && upper.is_finite() {
        problem.add_constraint(format!("{name}_lo"), row.clone(), ConstraintOp::Ge, lower);
        problem.add_constraint(format!("{name}_hi"), row, ConstraintOp::Le, upper);
    } else if lower.is_finite() {
        problem.add_constraint(name, row, ConstraintOp::Ge, lower);
    } else if upper.is_finite() {
        problem.add_constraint(name, row, ConstraintOp::Le, upper);
    }
}

pub(crate) fn search(problem: &LpProblem, relative_gap: f64, time_limit: Option<Duration>) -> SearchOutcome {
    let mut search = BranchAndBound::new().with_relative_gap(relative_gap);
    if let Some(limit) = time_limit {
        search = search.with_time_limit(limit);
    }
    search.solve(problem)
}

pub(crate) fn to_backend_status(status: SearchStatus) -> BackendStatus {
    match status {
        SearchStatus::Optimal => BackendStatus::Optimal,
        SearchStatus::Feasible => BackendStatus::Feasible,
        SearchStatus::Infeasible => BackendStatus::Infeasible,
        SearchStatus::Unbounded => BackendStatus::Unbounded,
        SearchStatus::NotSolved => BackendStatus::NotSolved,
    }
}

impl Backend for MipBackend {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn new_variable(&mut self, kind: VariableKind, lower: f64, upper: f64) -> VarHandle {
        let name = format!("x{}", self.problem.num_variables());
        let integer = kind != VariableKind::Continuous && self.engine.supports_integers();
        let (lower, upper) = match kind {
            VariableKind::Binary => (lower.max(0.0), upper.min(1.0)),
            _ => (lower, upper),
        };
        let var = VariableDef {
            name,
            lower,
            upper,
            integer,
        };
        VarHandle(self.problem.add_variable(var))
    }

    fn set_objective(&mut self, sense: Sense, coefficients: &[f64]) {
        let coefficients = self.padded(coefficients);
        self.problem.set_objective(coefficients, sense == Sense::Minimize);
    }

    fn add_row(&mut self, lower: f64, upper: f64, coefficients: &[f64]) {
        let row = self.padded(coefficients);
        push_ranged_row(&mut self.problem, lower, upper, row);
    }

    fn set_relative_gap(&mut self, gap: f64) {
        self.relative_gap = gap;
    }

    fn set_time_limit(&mut self, limit: Duration) {
        self.time_limit = Some(limit);
    }

    fn solve(&mut self) -> BackendStatus {
        let outcome = search(&self.problem, self.relative_gap, self.time_limit);
        debug!(
            event = "backend_solve",
            engine = %self.engine,
            integers = self.problem.has_integers(),
            status = ?outcome.status,
            nodes = outcome.nodes,
        );
        let status = to_backend_status(outcome.status);
        self.outcome = Some(outcome);
        status
    }

    fn objective_value(&self) -> f64 {
        self.outcome.as_ref().map_or(0.0, |o| o.objective_value)
    }

    fn variable_value(&self, var: VarHandle) -> f64 {
        self.outcome
            .as_ref()
            .and_then(|o| o.values.get(var.0).copied())
            .unwrap_or(0.0)
    }
}
