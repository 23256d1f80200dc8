use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::cpsat::CpSatBackend;
use crate::mip::MipBackend;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Unsupported solver engine: {0}")]
    UnknownEngine(String),
}

/// Domain of a decision variable
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Continuous,
    Integer,
    Binary,
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKind::Continuous => write!(f, "continuous"),
            VariableKind::Integer => write!(f, "integer"),
            VariableKind::Binary => write!(f, "binary"),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Minimize,
    Maximize,
}

/// Handle to a column created by [`Backend::new_variable`].
///
/// Handles are dense and follow creation order, so the `i`-th created
/// variable is addressed by the `i`-th entry of every coefficient slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarHandle(pub(crate) usize);

impl VarHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Optimal,
    Feasible,
    Infeasible,
    Unbounded,
    /// A limit was reached before any solution was found
    NotSolved,
    /// The engine stopped for numerical reasons
    Abnormal,
}

impl BackendStatus {
    /// Whether a solution vector can be read back
    pub fn has_solution(self) -> bool {
        matches!(self, BackendStatus::Optimal | BackendStatus::Feasible)
    }
}

/// The available optimization engines
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// Mixed-integer branch-and-bound
    Cbc,
    /// Constraint-programming engine over integer domains
    CpSat,
    /// Pure LP engine; integrality is relaxed
    Glop,
    /// Mixed-integer branch-and-bound
    Scip,
}

impl Engine {
    pub const ALL: [Engine; 4] = [Engine::Cbc, Engine::CpSat, Engine::Glop, Engine::Scip];

    pub fn name(self) -> &'static str {
        match self {
            Engine::Cbc => "CBC",
            Engine::CpSat => "CP-SAT",
            Engine::Glop => "GLOP",
            Engine::Scip => "SCIP",
        }
    }

    /// Whether the engine enforces integrality of integer and binary variables
    pub fn supports_integers(self) -> bool {
        !matches!(self, Engine::Glop)
    }

    /// Instantiate a fresh backend for this engine
    pub fn create(self) -> Box<dyn Backend> {
        match self {
            Engine::CpSat => Box::new(CpSatBackend::new()),
            Engine::Cbc | Engine::Glop | Engine::Scip => Box::new(MipBackend::new(self)),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Engine {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CBC" => Ok(Engine::Cbc),
            "CP-SAT" | "CPSAT" => Ok(Engine::CpSat),
            "GLOP" => Ok(Engine::Glop),
            "SCIP" => Ok(Engine::Scip),
            _ => Err(BackendError::UnknownEngine(s.to_string())),
        }
    }
}

/// Create a backend by engine name
pub fn create(engine_name: &str) -> Result<Box<dyn Backend>, BackendError> {
    Ok(engine_name.parse::<Engine>()?.create())
}

/// Capability shared by every optimization engine.
///
/// A backend is built column by column, then rows are attached, then
/// [`Backend::solve`] runs once. Values read after a solve that returned a
/// status without a solution are zero.
pub trait Backend {
    fn engine(&self) -> Engine;

    /// Sentinel used for unbounded sides of variables and rows
    fn infinity(&self) -> f64 {
        f64::INFINITY
    }

    fn new_variable(&mut self, kind: VariableKind, lower: f64, upper: f64) -> VarHandle;

    /// Coefficients are indexed by variable creation order
    fn set_objective(&mut self, sense: Sense, coefficients: &[f64]);

    /// Add `lower <= coefficients . x <= upper`; either side may be infinite
    fn add_row(&mut self, lower: f64, upper: f64, coefficients: &[f64]);

    fn set_relative_gap(&mut self, gap: f64);

    fn set_time_limit(&mut self, limit: Duration);

    fn solve(&mut self) -> BackendStatus;

    fn objective_value(&self) -> f64;

    fn variable_value(&self, var: VarHandle) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_names_round_trip() {
        for engine in Engine::ALL {
            assert_eq!(engine.name().parse::<Engine>(), Ok(engine));
        }
        assert_eq!("cpsat".parse::<Engine>(), Ok(Engine::CpSat));
        assert_eq!(" scip ".parse::<Engine>(), Ok(Engine::Scip));
    }

    #[test]
    fn test_unknown_engine() {
        let err = create("GUROBI").err();
        assert_eq!(err, Some(BackendError::UnknownEngine("GUROBI".to_string())));
    }

    #[test]
    fn test_create_reports_engine() {
        for engine in Engine::ALL {
            let backend = create(engine.name()).map(|b| b.engine());
            assert_eq!(backend, Ok(engine));
        }
    }

    #[test]
    fn test_status_has_solution() {
        assert!(BackendStatus::Optimal.has_solution());
        assert!(BackendStatus::Feasible.has_solution());
        assert!(!BackendStatus::Infeasible.has_solution());
        assert!(!BackendStatus::NotSolved.has_solution());
    }
}
