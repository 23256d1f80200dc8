use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::{Backend, BackendStatus, Engine, Sense, VarHandle, VariableKind};
use crate::branch::SearchOutcome;
use crate::mip::{push_ranged_row, search, to_backend_status};
use crate::problem::{LpProblem, VariableDef};

/// Integer domain of a constraint-programming variable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntDomain {
    pub lower: f64,
    pub upper: f64,
}

impl IntDomain {
    /// Tighten real bounds to the integers they contain
    pub fn from_bounds(lower: f64, upper: f64) -> Self {
        Self {
            lower: lower.ceil(),
            upper: upper.floor(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lower > self.upper
    }
}

#[derive(Debug, Clone)]
struct LinearRow {
    lower: f64,
    upper: f64,
    coefficients: Vec<f64>,
}

/// Constraint-programming model: integer domains plus linear rows.
/// It is only lowered to a search problem when solved.
#[derive(Debug, Clone, Default)]
pub struct CpModel {
    domains: Vec<IntDomain>,
    rows: Vec<LinearRow>,
    objective: Vec<f64>,
    minimize: bool,
}

impl CpModel {
    pub fn new_int_var(&mut self, domain: IntDomain) -> usize {
        self.domains.push(domain);
        self.domains.len() - 1
    }

    pub fn add_linear(&mut self, lower: f64, upper: f64, coefficients: Vec<f64>) {
        self.rows.push(LinearRow {
            lower,
            upper,
            coefficients,
        });
    }

    pub fn domains(&self) -> &[IntDomain] {
        &self.domains
    }

    fn lower(&self) -> LpProblem {
        let n = self.domains.len();
        let variables = self
            .domains
            .iter()
            .enumerate()
            .map(|(i, d)| VariableDef::integer(format!("v{i}"), d.lower, d.upper))
            .collect();
        let mut problem = LpProblem::with_variables(variables);

        let mut objective = self.objective.clone();
        objective.resize(n, 0.0);
        problem.set_objective(objective, self.minimize);

        for row in &self.rows {
            let mut coefficients = row.coefficients.clone();
            coefficients.resize(n, 0.0);
            push_ranged_row(&mut problem, row.lower, row.upper, coefficients);
        }
        problem
    }
}

/// Backend for the constraint-programming engine
#[derive(Debug, Clone)]
pub struct CpSatBackend {
    model: CpModel,
    relative_gap: f64,
    time_limit: Option<Duration>,
    outcome: Option<SearchOutcome>,
}

impl Default for CpSatBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpSatBackend {
    pub fn new() -> Self {
        Self {
            model: CpModel {
                minimize: true,
                ..CpModel::default()
            },
            relative_gap: 0.0,
            time_limit: None,
            outcome: None,
        }
    }

    pub fn model(&self) -> &CpModel {
        &self.model
    }
}

impl Backend for CpSatBackend {
    fn engine(&self) -> Engine {
        Engine::CpSat
    }

    fn new_variable(&mut self, kind: VariableKind, lower: f64, upper: f64) -> VarHandle {
        if kind == VariableKind::Continuous {
            warn!(event = "cp_integralize", lower, upper, "continuous variable restricted to integers");
        }
        let domain = match kind {
            VariableKind::Binary => IntDomain::from_bounds(lower.max(0.0), upper.min(1.0)),
            _ => IntDomain::from_bounds(lower, upper),
        };
        VarHandle(self.model.new_int_var(domain))
    }

    fn set_objective(&mut self, sense: Sense, coefficients: &[f64]) {
        self.model.objective = coefficients.to_vec();
        self.model.minimize = sense == Sense::Minimize;
    }

    fn add_row(&mut self, lower: f64, upper: f64, coefficients: &[f64]) {
        self.model.add_linear(lower, upper, coefficients.to_vec());
    }

    fn set_relative_gap(&mut self, gap: f64) {
        self.relative_gap = gap;
    }

    fn set_time_limit(&mut self, limit: Duration) {
        self.time_limit = Some(limit);
    }

    fn solve(&mut self) -> BackendStatus {
        if self.model.domains.iter().any(IntDomain::is_empty) {
            self.outcome = None;
            return BackendStatus::Infeasible;
        }
        let problem = self.model.lower();
        let outcome = search(&problem, self.relative_gap, self.time_limit);
        debug!(
            event = "backend_solve",
            engine = %Engine::CpSat,
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
