mod backend;
mod branch;
mod cpsat;
mod mip;
mod problem;
mod simplex;
mod solution;

pub use backend::{create, Backend, BackendError, BackendStatus, Engine, Sense, VarHandle, VariableKind};
pub use branch::{BranchAndBound, SearchOutcome, SearchStatus};
pub use cpsat::{CpModel, CpSatBackend, IntDomain};
pub use mip::MipBackend;
pub use problem::{Constraint, ConstraintOp, LpProblem, Objective, VariableDef};
pub use simplex::Solver;
pub use solution::{Solution, SolutionStatus};
