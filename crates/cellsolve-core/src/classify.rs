use std::collections::HashMap;

use cellsolve_solver::VariableKind;
use tracing::debug;

use crate::cell::CellRef;
use crate::model::{ConstraintOperator, ConstraintSpec, Operand, RowOperator};

/// A constraint that contributes a coefficient row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearSpec {
    /// Position in the caller's constraint list
    pub index: usize,
    pub operator: RowOperator,
    pub left: CellRef,
    pub right: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Kind of each variable, in canonical order
    pub kinds: Vec<VariableKind>,
    pub linear: Vec<LinearSpec>,
}

/// Split constraints into domain declarations and linear rows.
///
/// `Binary`/`Integer` constraints on a variable cell set that variable's kind
/// and are consumed. On any other cell they are dropped.
pub fn classify(variables: &[CellRef], default_kind: VariableKind, constraints: &[ConstraintSpec]) -> Classification {
    let mut positions: HashMap<CellRef, Vec<usize>> = HashMap::new();
    for (i, &cell) in variables.iter().enumerate() {
        positions.entry(cell).or_default().push(i);
    }

    let mut kinds = vec![default_kind; variables.len()];
    let mut linear = Vec::new();

    for (index, spec) in constraints.iter().enumerate() {
        let kind = match spec.operator {
            ConstraintOperator::Binary => VariableKind::Binary,
            ConstraintOperator::Integer => VariableKind::Integer,
            ConstraintOperator::Equal => {
                linear.push(LinearSpec::new(index, RowOperator::Equal, spec));
                continue;
            }
            ConstraintOperator::LessEqual => {
                linear.push(LinearSpec::new(index, RowOperator::LessEqual, spec));
                continue;
            }
            ConstraintOperator::GreaterEqual => {
                linear.push(LinearSpec::new(index, RowOperator::GreaterEqual, spec));
                continue;
            }
        };

        match positions.get(&spec.left) {
            Some(slots) => {
                for &i in slots {
                    kinds[i] = kind;
                }
            }
            None => {
                debug!(event = "structural_ignored", constraint = index, cell = %spec.left);
            }
        }
    }

    Classification { kinds, linear }
}

impl LinearSpec {
    fn new(index: usize, operator: RowOperator, spec: &ConstraintSpec) -> Self {
        Self {
            index,
            operator,
            left: spec.left,
            right: spec.right,
        }
    }
}
