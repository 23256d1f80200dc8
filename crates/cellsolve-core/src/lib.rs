//! Infers a linear or mixed-integer model from a recalculating document by
//! probing its cells, then solves it with one of the `cellsolve-solver`
//! engines.
//!
//! Probing sets every variable cell to 0, then each one in turn to 1, and
//! reads the objective and constraint cells. The differences are taken as
//! coefficients, which is only correct when those cells are affine in the
//! variables. Nonlinear formulas are not detected.

pub mod cell;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod probe;
pub mod solve;
pub mod solver;

#[cfg(test)]
mod testing;

pub use cell::{column_name, CellError, CellEvaluator, CellRef, Document, DocumentLock, ScopedLock};
pub use classify::{classify, Classification, LinearSpec};
pub use config::{ConfigError, Property, PropertyValue, SolverConfig, ValueType};
pub use error::SolveError;
pub use extract::{constraint_row, extract_model, objective_coefficients, ExtractedRow};
pub use model::{
    variable_bounds, CoefficientRow, ConstraintOperator, ConstraintSpec, ExtractionWarning,
    LinearConstraint, Model, ModelBuilder, Operand, RowOperator, UnknownOperator, Variable,
};
pub use probe::{ExtractionSession, ProbeOutcome, SessionState};
pub use solve::{solve_model, SolveResult, STATUS_FEASIBLE, STATUS_OPTIMAL};
pub use solver::{SheetSolver, DEFAULT_ENGINE};

pub use cellsolve_solver::{Engine, VariableKind};
