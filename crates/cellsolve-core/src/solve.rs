use std::time::Instant;

use cellsolve_solver::{Backend, BackendStatus, Sense, VarHandle};
use tracing::{debug, info};

use crate::config::SolverConfig;
use crate::error::SolveError;
use crate::model::Model;

pub const STATUS_OPTIMAL: &str = "Optimal solution found";
pub const STATUS_FEASIBLE: &str = "Sub-optimal feasible solution found";

/// Outcome of one solve request
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    pub success: bool,
    pub status: String,
    pub objective_value: f64,
    /// Variable values in canonical order
    pub solution: Vec<f64>,
}

impl SolveResult {
    pub fn failure(status: impl Into<String>, solution: Vec<f64>) -> Self {
        Self {
            success: false,
            status: status.into(),
            objective_value: 0.0,
            solution,
        }
    }

    /// Failure reached before the backend ran
    pub fn from_error(error: &SolveError) -> Self {
        Self::failure(error.to_string(), Vec::new())
    }

    /// Map a backend status to a result. Only `Optimal` and `Feasible`
    /// carry the objective value.
    pub fn from_status(status: BackendStatus, objective_value: f64, solution: Vec<f64>) -> Self {
        let text = match status {
            BackendStatus::Optimal => STATUS_OPTIMAL,
            BackendStatus::Feasible => STATUS_FEASIBLE,
            _ => return Self::failure(SolveError::NoSolutionFound.to_string(), solution),
        };
        Self {
            success: true,
            status: text.to_string(),
            objective_value,
            solution,
        }
    }
}

fn to_backend_bound(value: f64, infinity: f64) -> f64 {
    if value == f64::INFINITY {
        infinity
    } else if value == f64::NEG_INFINITY {
        -infinity
    } else {
        value
    }
}

/// Load `model` into `backend`, apply `config` and run the solve
pub fn solve_model(backend: &mut dyn Backend, model: &Model, config: &SolverConfig) -> SolveResult {
    let infinity = backend.infinity();

    let handles: Vec<VarHandle> = model
        .variables
        .iter()
        .map(|v| {
            backend.new_variable(
                v.kind,
                to_backend_bound(v.lower, infinity),
                to_backend_bound(v.upper, infinity),
            )
        })
        .collect();

    let sense = if model.maximize {
        Sense::Maximize
    } else {
        Sense::Minimize
    };
    backend.set_objective(sense, &model.objective);

    for constraint in &model.constraints {
        let (lower, upper) = constraint.operator.row_bounds(constraint.row.bound, infinity);
        backend.add_row(
            to_backend_bound(lower, infinity),
            to_backend_bound(upper, infinity),
            &constraint.row.coefficients,
        );
    }

    backend.set_relative_gap(config.relative_gap());
    backend.set_time_limit(config.timeout());
    debug!(
        event = "backend_ready",
        engine = %backend.engine(),
        variables = handles.len(),
        rows = model.constraints.len(),
        gap = config.relative_gap(),
        timeout_s = config.timeout().as_secs(),
    );

    let started = Instant::now();
    let status = backend.solve();
    let solution: Vec<f64> = handles.iter().map(|&h| backend.variable_value(h)).collect();
    info!(
        event = "solve_end",
        engine = %backend.engine(),
        status = ?status,
        elapsed_ms = started.elapsed().as_millis() as u64,
    );

    SolveResult::from_status(status, backend.objective_value(), solution)
}
