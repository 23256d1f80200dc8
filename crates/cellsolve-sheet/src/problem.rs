use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cellsolve_core::{
    CellRef, ConfigError, ConstraintOperator, ConstraintSpec, Operand, PropertyValue, SheetSolver,
    SolveError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::parser::ParseError;
use crate::workbook::Workbook;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid problem file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Problem file has no sheets")]
    NoSheets,
    #[error("Invalid cell address: {0}")]
    Address(String),
    #[error("Cell {cell}: {source}")]
    Cell {
        cell: String,
        #[source]
        source: ParseError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Constraint(#[from] SolveError),
}

/// A solve request stored as JSON: the workbook contents plus the
/// objective, variables, constraints and options that refer into it.
///
/// Unqualified addresses refer to the first sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemFile {
    pub sheets: Vec<SheetSpec>,
    pub objective: String,
    pub variables: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<ConstraintEntry>,
    #[serde(default = "default_maximize")]
    pub maximize: bool,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetSpec {
    pub name: String,
    #[serde(default)]
    pub cells: BTreeMap<String, CellInput>,
}

/// A number, or text that is either a `=` formula or a number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellInput {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintEntry {
    pub left: String,
    pub op: String,
    #[serde(default)]
    pub right: Option<RightOperand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RightOperand {
    Number(f64),
    Cell(String),
}

fn default_maximize() -> bool {
    true
}

impl ProblemFile {
    pub fn from_json(source: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&source)
    }

    /// Build the workbook described by `sheets`
    pub fn workbook(&self) -> Result<Workbook, LoadError> {
        if self.sheets.is_empty() {
            return Err(LoadError::NoSheets);
        }
        let mut book = Workbook::new();
        for sheet in &self.sheets {
            book.add_sheet(sheet.name.clone());
        }
        for (index, sheet) in self.sheets.iter().enumerate() {
            for (address, input) in &sheet.cells {
                let cell = book
                    .resolve(address, index)
                    .ok_or_else(|| LoadError::Address(format!("{}!{address}", sheet.name)))?;
                let stored = match input {
                    CellInput::Number(value) => book
                        .set_number(cell, *value)
                        .map_err(|_| ParseError::InvalidReference(address.clone())),
                    CellInput::Text(text) => book.set_input(cell, text),
                };
                stored.map_err(|source| LoadError::Cell {
                    cell: book.display_cell(cell),
                    source,
                })?;
            }
        }
        Ok(book)
    }

    fn cell(book: &Workbook, address: &str) -> Result<CellRef, LoadError> {
        book.resolve(address, 0)
            .ok_or_else(|| LoadError::Address(address.to_string()))
    }

    /// Resolve every constraint against `book`
    pub fn constraint_specs(&self, book: &Workbook) -> Result<Vec<ConstraintSpec>, SolveError> {
        self.constraints
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.resolve(index, book))
            .collect()
    }

    /// A solver with the document, cells, constraints and options applied
    pub fn into_solver(self) -> Result<SheetSolver<Workbook>, LoadError> {
        let book = self.workbook()?;
        let objective = Self::cell(&book, &self.objective)?;
        let variables = self
            .variables
            .iter()
            .map(|address| Self::cell(&book, address))
            .collect::<Result<Vec<_>, _>>()?;
        let constraints = self.constraint_specs(&book)?;

        let mut solver = SheetSolver::new();
        solver.set_objective(objective);
        solver.set_variables(variables);
        solver.set_constraints(constraints);
        solver.set_maximize(self.maximize);
        if let Some(engine) = &self.engine {
            solver.set_engine(engine.clone());
        }
        for (name, value) in &self.options {
            match option_value(value) {
                Some(value) => solver.set_property(name, value)?,
                None => {
                    // Still reject unknown names
                    solver.property(name)?;
                    debug!(event = "option_ignored", option = %name, value = %value);
                }
            }
        }
        solver.set_document(book);
        Ok(solver)
    }
}

impl ConstraintEntry {
    fn resolve(&self, index: usize, book: &Workbook) -> Result<ConstraintSpec, SolveError> {
        let operator = self
            .op
            .parse::<ConstraintOperator>()
            .map_err(|e| SolveError::malformed(index, e.to_string()))?;
        let left = book.resolve(&self.left, 0).ok_or_else(|| {
            SolveError::malformed(index, format!("left side {} is not a cell", self.left))
        })?;

        let right = match &self.right {
            Some(RightOperand::Number(value)) => Operand::Value(*value),
            Some(RightOperand::Cell(text)) => {
                if let Some(cell) = book.resolve(text, 0) {
                    Operand::Cell(cell)
                } else if let Ok(value) = text.trim().parse::<f64>() {
                    Operand::Value(value)
                } else {
                    return Err(SolveError::malformed(
                        index,
                        format!("right side {text} is neither a number nor a cell"),
                    ));
                }
            }
            None if operator.is_structural() => Operand::Value(0.0),
            None => return Err(SolveError::malformed(index, "missing right side")),
        };

        Ok(ConstraintSpec::new(left, operator, right))
    }
}

/// JSON option value as a property value; integers become `Long`
fn option_value(value: &serde_json::Value) -> Option<PropertyValue> {
    match value {
        serde_json::Value::Bool(b) => Some(PropertyValue::Bool(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(PropertyValue::Long(i)),
            None => n.as_f64().map(PropertyValue::Double),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cellsolve_core::{CellEvaluator, ExtractionWarning, RowOperator, VariableKind};

    const SINGLE: &str = r#"{
        "sheets": [{ "name": "Model", "cells": { "A1": 0, "B1": "=3*A1" } }],
        "objective": "B1",
        "variables": ["A1"],
        "constraints": [{ "left": "A1", "op": "<=", "right": 5 }],
        "maximize": true,
        "options": { "NonNegative": true, "Timeout": 30 }
    }"#;

    #[test]
    fn test_single_variable_end_to_end() {
        let mut solver = ProblemFile::from_json(SINGLE).unwrap().into_solver().unwrap();

        let model = solver.extract_model().unwrap();
        assert_eq!(model.objective, vec![3.0]);
        assert_eq!(model.constraints.len(), 1);
        assert_eq!(model.constraints[0].operator, RowOperator::LessEqual);
        assert_eq!(model.constraints[0].row.coefficients, vec![1.0]);
        assert_eq!(model.constraints[0].row.bound, 5.0);

        let result = solver.solve().clone();
        assert!(result.success);
        assert_eq!(result.status, "Optimal solution found");
        assert_relative_eq!(result.objective_value, 15.0, epsilon = 1e-6);
        assert_relative_eq!(result.solution[0], 5.0, epsilon = 1e-6);

        assert_eq!(solver.property("Timeout"), Ok(PropertyValue::Long(30)));
        assert!(!solver.document().unwrap().is_locked());
    }

    #[test]
    fn test_integer_minimization_end_to_end() {
        let source = r#"{
            "sheets": [{ "name": "Model", "cells": {
                "A1": 3, "B1": 4,
                "C1": "=A1 + 2*B1",
                "D1": "=SUM(A1:B1)"
            } }],
            "objective": "C1",
            "variables": ["A1", "B1"],
            "constraints": [{ "left": "D1", "op": "=", "right": 10 }],
            "maximize": false,
            "options": { "Integer": true }
        }"#;
        let mut solver = ProblemFile::from_json(source).unwrap().into_solver().unwrap();

        let model = solver.extract_model().unwrap();
        assert_eq!(model.constraints[0].row.coefficients, vec![1.0, 1.0]);
        assert_eq!(model.constraints[0].row.bound, 10.0);
        assert!(model.variables.iter().all(|v| v.kind == VariableKind::Integer));

        solver.solve();
        assert!(solver.success());
        assert_relative_eq!(solver.result_value(), 10.0, epsilon = 1e-6);
        let x: Vec<f64> = solver.solution().to_vec();
        assert_relative_eq!(x[0] + 2.0 * x[1], 10.0, epsilon = 1e-6);
        assert_relative_eq!(x[0] + x[1], 10.0, epsilon = 1e-6);
    }

    // Pick items with values 5, 4, 3 and weights 2, 3, 1 under capacity 3
    const KNAPSACK: &str = r#"{
        "sheets": [
            { "name": "Items", "cells": {
                "A1": 0, "A2": 0, "A3": 0,
                "B1": 5, "B2": 4, "B3": 3,
                "C1": 2, "C2": 3, "C3": 1
            } },
            { "name": "Totals", "cells": {
                "A1": "=SUMPRODUCT(Items!A1:A3, Items!B1:B3)",
                "A2": "=SUMPRODUCT(Items!A1:A3, Items!C1:C3)",
                "A3": 3
            } }
        ],
        "objective": "Totals!A1",
        "variables": ["A1", "A2", "A3"],
        "constraints": [
            { "left": "A1", "op": "bin" },
            { "left": "A2", "op": "bin" },
            { "left": "A3", "op": "bin" },
            { "left": "Totals!A2", "op": "<=", "right": "Totals!A3" }
        ],
        "engine": "SCIP"
    }"#;

    #[test]
    fn test_binary_selection_across_sheets() {
        let mut solver = ProblemFile::from_json(KNAPSACK).unwrap().into_solver().unwrap();

        let model = solver.extract_model().unwrap();
        assert_eq!(model.constraints.len(), 1);
        assert_eq!(model.constraints[0].row.coefficients, vec![2.0, 3.0, 1.0]);
        assert_eq!(model.constraints[0].row.bound, 3.0);

        let result = solver.solve().clone();
        assert!(result.success);
        assert_relative_eq!(result.objective_value, 8.0, epsilon = 1e-6);
        assert_relative_eq!(result.solution[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(result.solution[1], 0.0, epsilon = 1e-6);
        assert_relative_eq!(result.solution[2], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_solution_follows_variable_order() {
        let mut solver = ProblemFile::from_json(KNAPSACK).unwrap().into_solver().unwrap();
        let items = solver.variables().to_vec();
        let chosen = [1.0, 0.0, 1.0];

        for order in [[0, 1, 2], [2, 0, 1], [1, 2, 0]] {
            solver.set_variables(order.iter().map(|&i| items[i]).collect());

            let model = solver.extract_model().unwrap();
            let weights: Vec<f64> = order.iter().map(|&i| [2.0, 3.0, 1.0][i]).collect();
            assert_eq!(model.constraints[0].row.coefficients, weights);

            solver.solve();
            assert!(solver.success(), "{order:?}");
            assert_relative_eq!(solver.result_value(), 8.0, epsilon = 1e-6);
            for (position, &i) in order.iter().enumerate() {
                assert_relative_eq!(solver.solution()[position], chosen[i], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_variables_left_at_zero_after_solve() {
        let mut solver = ProblemFile::from_json(SINGLE).unwrap().into_solver().unwrap();
        let a1 = solver.variables()[0];
        solver.solve();

        let book = solver.document().unwrap();
        assert_eq!(book.read(a1).unwrap(), 0.0);
    }

    #[test]
    fn test_folded_constraint_warning() {
        let source = r#"{
            "sheets": [{ "name": "S", "cells": { "C1": "=A1 + B1", "D1": "=2*B1" } }],
            "objective": "C1",
            "variables": ["A1", "B1"],
            "constraints": [
                { "left": "A1", "op": ">=", "right": "D1" },
                { "left": "B1", "op": "<=", "right": 2 }
            ]
        }"#;
        let mut solver = ProblemFile::from_json(source).unwrap().into_solver().unwrap();
        solver.solve();

        assert_eq!(
            solver.warnings(),
            &[ExtractionWarning::FoldedRightHandSide {
                constraint: 0,
                operator: RowOperator::GreaterEqual
            }]
        );
    }

    #[test]
    fn test_malformed_constraints() {
        let with = |constraint: &str| {
            let source = format!(
                r#"{{ "sheets": [{{ "name": "S" }}], "objective": "A1", "variables": ["A1"],
                     "constraints": [{constraint}] }}"#
            );
            ProblemFile::from_json(&source).unwrap().into_solver()
        };

        for constraint in [
            r#"{ "left": "A1", "op": "<", "right": 1 }"#,
            r#"{ "left": "A1", "op": "<=", "right": "lots" }"#,
            r#"{ "left": "A1", "op": "<=" }"#,
            r#"{ "left": "nope", "op": "=", "right": 1 }"#,
        ] {
            let err = with(constraint).err();
            assert!(
                matches!(
                    err,
                    Some(LoadError::Constraint(SolveError::MalformedConstraint { index: 0, .. }))
                ),
                "{constraint}: {err:?}"
            );
        }

        assert!(with(r#"{ "left": "A1", "op": "<=", "right": "2.5" }"#).is_ok());
    }

    #[test]
    fn test_options() {
        let base = |options: &str| {
            format!(
                r#"{{ "sheets": [{{ "name": "S" }}], "objective": "A1", "variables": [],
                     "options": {options} }}"#
            )
        };

        let solver = ProblemFile::from_json(&base(r#"{ "RelativeGap": 0.05, "Timeout": "soon" }"#))
            .unwrap()
            .into_solver()
            .unwrap();
        assert_eq!(solver.property("RelativeGap"), Ok(PropertyValue::Double(0.05)));
        assert_eq!(solver.property("Timeout"), Ok(PropertyValue::Long(100)));

        let err = ProblemFile::from_json(&base(r#"{ "Threads": 4 }"#))
            .unwrap()
            .into_solver()
            .err();
        assert!(matches!(err, Some(LoadError::Config(ConfigError::UnknownProperty(_)))));

        let err = ProblemFile::from_json(&base(r#"{ "Verbose": "yes" }"#))
            .unwrap()
            .into_solver()
            .err();
        assert!(matches!(err, Some(LoadError::Config(ConfigError::UnknownProperty(_)))));
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(ProblemFile::from_json("{"), Err(LoadError::Json(_))));

        let no_sheets = r#"{ "sheets": [], "objective": "A1", "variables": [] }"#;
        let err = ProblemFile::from_json(no_sheets).unwrap().into_solver().err();
        assert!(matches!(err, Some(LoadError::NoSheets)));

        let bad_formula = r#"{ "sheets": [{ "name": "S", "cells": { "A1": "=1 +" } }],
                               "objective": "A1", "variables": [] }"#;
        let err = ProblemFile::from_json(bad_formula).unwrap().into_solver().err();
        assert!(matches!(err, Some(LoadError::Cell { .. })));

        let bad_objective = r#"{ "sheets": [{ "name": "S" }], "objective": "Other!A1", "variables": [] }"#;
        let err = ProblemFile::from_json(bad_objective).unwrap().into_solver().err();
        assert!(matches!(err, Some(LoadError::Address(_))));

        let err = ProblemFile::load("/nonexistent/problem.json").err();
        assert!(matches!(err, Some(LoadError::Io { .. })));
    }
}
