use std::time::Instant;

use cellsolve_solver::VariableKind;
use tracing::{debug, info, warn};

use crate::cell::{CellError, CellRef, Document};
use crate::classify::{classify, LinearSpec};
use crate::config::SolverConfig;
use crate::error::SolveError;
use crate::model::{
    CoefficientRow, ConstraintSpec, ExtractionWarning, LinearConstraint, Model, ModelBuilder, Operand,
};
use crate::probe::ExtractionSession;

/// A coefficient row plus whether its right side had to be folded
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    pub row: CoefficientRow,
    pub folded: bool,
}

/// Objective coefficients: one probe of the objective cell
pub fn objective_coefficients<D: Document + ?Sized>(
    session: &mut ExtractionSession<'_, D>,
    objective: CellRef,
) -> Result<Vec<f64>, SolveError> {
    let outcome = session.probe(&[objective])?;
    Ok(outcome.deltas(0))
}

/// Coefficient row of one linear constraint.
///
/// A right side that reads the same at every probe step is a constant and
/// becomes the bound term. Otherwise it is moved to the left side
/// (`left - right`) and the bound term is 0.
pub fn constraint_row<D: Document + ?Sized>(
    session: &mut ExtractionSession<'_, D>,
    spec: &LinearSpec,
) -> Result<ExtractedRow, SolveError> {
    match spec.right {
        Operand::Value(value) => {
            if !value.is_finite() {
                return Err(SolveError::malformed(
                    spec.index,
                    format!("right side {value} is not a finite number"),
                ));
            }
            let outcome = session.probe(&[spec.left])?;
            Ok(ExtractedRow {
                row: CoefficientRow {
                    coefficients: outcome.deltas(0),
                    bound: value,
                },
                folded: false,
            })
        }
        Operand::Cell(right) => {
            match session.read(right) {
                Err(SolveError::Cell(CellError::InvalidCell(_))) => {
                    return Err(SolveError::malformed(
                        spec.index,
                        format!("right side {right} is not a recognized cell"),
                    ));
                }
                Err(err) => return Err(err),
                Ok(_) => {}
            }
            let outcome = session.probe(&[spec.left, right])?;
            let left_deltas = outcome.deltas(0);
            let right_deltas = outcome.deltas(1);
            let coefficients = left_deltas.iter().zip(&right_deltas).map(|(l, r)| l - r).collect();

            if outcome.is_constant(1) {
                let bound = outcome.baseline[1];
                if !bound.is_finite() {
                    return Err(SolveError::malformed(
                        spec.index,
                        format!("right cell {right} holds {bound}"),
                    ));
                }
                Ok(ExtractedRow {
                    row: CoefficientRow { coefficients, bound },
                    folded: false,
                })
            } else {
                Ok(ExtractedRow {
                    row: CoefficientRow {
                        coefficients,
                        bound: 0.0,
                    },
                    folded: true,
                })
            }
        }
    }
}

/// Run the full extraction pass inside an open session
pub fn extract_model<D: Document + ?Sized>(
    session: &mut ExtractionSession<'_, D>,
    objective: CellRef,
    constraints: &[ConstraintSpec],
    maximize: bool,
    config: &SolverConfig,
) -> Result<Model, SolveError> {
    let started = Instant::now();
    let variables = session.variables().to_vec();
    info!(
        event = "extract_start",
        variables = variables.len(),
        constraints = constraints.len()
    );

    let default_kind = if config.integer() {
        VariableKind::Integer
    } else {
        VariableKind::Continuous
    };
    let classified = classify(&variables, default_kind, constraints);

    let objective = objective_coefficients(session, objective)?;
    let mut builder = ModelBuilder::new(config.non_negative(), maximize)
        .variables(&variables, &classified.kinds)
        .objective(objective);

    for spec in &classified.linear {
        let extracted = constraint_row(session, spec)?;
        debug!(
            event = "constraint_row",
            constraint = spec.index,
            operator = %spec.operator,
            coefficients = ?extracted.row.coefficients,
            bound = extracted.row.bound,
        );
        if extracted.folded {
            warn!(
                event = "rhs_folded",
                constraint = spec.index,
                operator = %spec.operator,
                "right side depends on the variables; folded into the left side against a bound of 0"
            );
            builder = builder.warning(ExtractionWarning::FoldedRightHandSide {
                constraint: spec.index,
                operator: spec.operator,
            });
        }
        builder = builder.constraint(LinearConstraint {
            source: spec.index,
            operator: spec.operator,
            row: extracted.row,
        });
    }

    let model = builder.build();
    info!(
        event = "extract_end",
        rows = model.constraints.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
    );
    Ok(model)
}
