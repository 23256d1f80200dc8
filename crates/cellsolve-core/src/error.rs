use thiserror::Error;

use crate::cell::CellError;

/// Why a solve request ended without invoking, or without hearing back from, the backend.
///
/// The `Display` text of each variant is what callers see as the status text
/// of the failed [`crate::SolveResult`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("Error: unable to instantiate the solver engine ({0})")]
    BackendUnavailable(String),
    #[error("Error: malformed constraint #{index}: {reason}")]
    MalformedConstraint { index: usize, reason: String },
    #[error("No solution found")]
    NoSolutionFound,
    #[error("Error: no document to solve")]
    NoDocument,
    #[error("Error: no objective cell set")]
    NoObjective,
    #[error("Error: extraction session already finished")]
    SessionClosed,
    #[error("Error: {0}")]
    Cell(#[from] CellError),
}

impl SolveError {
    pub fn malformed(index: usize, reason: impl Into<String>) -> Self {
        SolveError::MalformedConstraint {
            index,
            reason: reason.into(),
        }
    }
}
