use std::fmt;
use std::str::FromStr;

use cellsolve_solver::VariableKind;
use thiserror::Error;

use crate::cell::CellRef;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown constraint operator: {0}")]
pub struct UnknownOperator(pub String);

/// Relational or structural operator of a user constraint
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintOperator {
    /// Restricts the left cell to {0, 1}
    Binary,
    /// Restricts the left cell to integers
    Integer,
    Equal,
    LessEqual,
    GreaterEqual,
}

impl ConstraintOperator {
    pub fn is_structural(self) -> bool {
        matches!(self, ConstraintOperator::Binary | ConstraintOperator::Integer)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ConstraintOperator::Binary => "bin",
            ConstraintOperator::Integer => "int",
            ConstraintOperator::Equal => "=",
            ConstraintOperator::LessEqual => "<=",
            ConstraintOperator::GreaterEqual => ">=",
        }
    }
}

impl fmt::Display for ConstraintOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for ConstraintOperator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bin" | "binary" => Ok(ConstraintOperator::Binary),
            "int" | "integer" => Ok(ConstraintOperator::Integer),
            "=" | "==" | "eq" | "equal" => Ok(ConstraintOperator::Equal),
            "<=" | "le" | "less_equal" => Ok(ConstraintOperator::LessEqual),
            ">=" | "ge" | "greater_equal" => Ok(ConstraintOperator::GreaterEqual),
            _ => Err(UnknownOperator(s.to_string())),
        }
    }
}

/// Operator of a constraint that contributes a coefficient row
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowOperator {
    Equal,
    LessEqual,
    GreaterEqual,
}

impl RowOperator {
    /// Row activity range `(lower, upper)` for a bound term
    pub fn row_bounds(self, bound: f64, infinity: f64) -> (f64, f64) {
        match self {
            RowOperator::Equal => (bound, bound),
            RowOperator::LessEqual => (0.0, bound),
            RowOperator::GreaterEqual => (bound, infinity),
        }
    }
}

impl TryFrom<ConstraintOperator> for RowOperator {
    type Error = ConstraintOperator;

    fn try_from(op: ConstraintOperator) -> Result<Self, Self::Error> {
        match op {
            ConstraintOperator::Equal => Ok(RowOperator::Equal),
            ConstraintOperator::LessEqual => Ok(RowOperator::LessEqual),
            ConstraintOperator::GreaterEqual => Ok(RowOperator::GreaterEqual),
            structural => Err(structural),
        }
    }
}

impl fmt::Display for RowOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowOperator::Equal => write!(f, "="),
            RowOperator::LessEqual => write!(f, "<="),
            RowOperator::GreaterEqual => write!(f, ">="),
        }
    }
}

/// Right-hand side of a constraint
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Cell(CellRef),
    Value(f64),
}

/// A user constraint as entered against the document
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintSpec {
    pub operator: ConstraintOperator,
    pub left: CellRef,
    pub right: Operand,
}

impl ConstraintSpec {
    pub fn new(left: CellRef, operator: ConstraintOperator, right: Operand) -> Self {
        Self { operator, left, right }
    }

    pub fn binary(cell: CellRef) -> Self {
        Self::new(cell, ConstraintOperator::Binary, Operand::Value(0.0))
    }

    pub fn integer(cell: CellRef) -> Self {
        Self::new(cell, ConstraintOperator::Integer, Operand::Value(0.0))
    }

    pub fn equal(left: CellRef, right: Operand) -> Self {
        Self::new(left, ConstraintOperator::Equal, right)
    }

    pub fn less_equal(left: CellRef, right: Operand) -> Self {
        Self::new(left, ConstraintOperator::LessEqual, right)
    }

    pub fn greater_equal(left: CellRef, right: Operand) -> Self {
        Self::new(left, ConstraintOperator::GreaterEqual, right)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub cell: CellRef,
    pub kind: VariableKind,
    pub lower: f64,
    pub upper: f64,
}

/// Coefficients in canonical variable order plus the bound term
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    pub coefficients: Vec<f64>,
    pub bound: f64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    /// Position of the originating [`ConstraintSpec`] in the caller's list
    pub source: usize,
    pub operator: RowOperator,
    pub row: CoefficientRow,
}

/// Something extraction did that changes the meaning of a constraint
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionWarning {
    /// The right side moved with the variables and was folded into the left
    /// side against a bound of 0
    FoldedRightHandSide { constraint: usize, operator: RowOperator },
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionWarning::FoldedRightHandSide { constraint, operator } => write!(
                f,
                "constraint #{constraint} ({operator}) has a variable-dependent right side; \
                 it was folded into the left side with a bound of 0"
            ),
        }
    }
}

/// A solver-ready model, with every vector in canonical variable order
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub variables: Vec<Variable>,
    pub objective: Vec<f64>,
    pub maximize: bool,
    pub constraints: Vec<LinearConstraint>,
    pub warnings: Vec<ExtractionWarning>,
}

impl Model {
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }
}

/// Bounds implied by a variable's kind
pub fn variable_bounds(kind: VariableKind, non_negative: bool) -> (f64, f64) {
    match kind {
        VariableKind::Binary => (0.0, 1.0),
        VariableKind::Continuous | VariableKind::Integer => {
            let lower = if non_negative { 0.0 } else { f64::NEG_INFINITY };
            (lower, f64::INFINITY)
        }
    }
}

/// Assembles extracted pieces into a [`Model`]
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    non_negative: bool,
    maximize: bool,
    variables: Vec<Variable>,
    objective: Vec<f64>,
    constraints: Vec<LinearConstraint>,
    warnings: Vec<ExtractionWarning>,
}

impl ModelBuilder {
    pub fn new(non_negative: bool, maximize: bool) -> Self {
        Self {
            non_negative,
            maximize,
            ..Self::default()
        }
    }

    pub fn variables(mut self, cells: &[CellRef], kinds: &[VariableKind]) -> Self {
        self.variables = cells
            .iter()
            .zip(kinds)
            .map(|(&cell, &kind)| {
                let (lower, upper) = variable_bounds(kind, self.non_negative);
                Variable {
                    cell,
                    kind,
                    lower,
                    upper,
                }
            })
            .collect();
        self
    }

    pub fn objective(mut self, coefficients: Vec<f64>) -> Self {
        self.objective = coefficients;
        self
    }

    pub fn constraint(mut self, constraint: LinearConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn warning(mut self, warning: ExtractionWarning) -> Self {
        self.warnings.push(warning);
        self
    }

    pub fn build(self) -> Model {
        Model {
            variables: self.variables,
            objective: self.objective,
            maximize: self.maximize,
            constraints: self.constraints,
            warnings: self.warnings,
        }
    }
}
