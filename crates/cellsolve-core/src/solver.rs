use std::time::Instant;

use cellsolve_solver::{create, Backend};
use tracing::{info, warn};

use crate::cell::{CellRef, Document};
use crate::config::{ConfigError, Property, PropertyValue, SolverConfig};
use crate::error::SolveError;
use crate::extract::extract_model;
use crate::model::{ConstraintSpec, ExtractionWarning, Model};
use crate::probe::ExtractionSession;
use crate::solve::{solve_model, SolveResult};

pub const DEFAULT_ENGINE: &str = "CBC";

/// Solves the optimization problem laid out in a document.
///
/// Configure the document, objective cell, variable cells and constraints,
/// then call [`SheetSolver::solve`]. The document is locked from the moment
/// the variables are zeroed until the solution has been read back.
#[derive(Debug)]
pub struct SheetSolver<D> {
    document: Option<D>,
    objective: Option<CellRef>,
    variables: Vec<CellRef>,
    constraints: Vec<ConstraintSpec>,
    maximize: bool,
    engine: String,
    config: SolverConfig,
    result: Option<SolveResult>,
    warnings: Vec<ExtractionWarning>,
}

impl<D> Default for SheetSolver<D> {
    fn default() -> Self {
        Self {
            document: None,
            objective: None,
            variables: Vec::new(),
            constraints: Vec::new(),
            maximize: true,
            engine: DEFAULT_ENGINE.to_string(),
            config: SolverConfig::default(),
            result: None,
            warnings: Vec::new(),
        }
    }
}

impl<D: Document> SheetSolver<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component_description(&self) -> &'static str {
        "Linear and mixed-integer programming over formula cells"
    }

    pub fn set_document(&mut self, document: D) {
        self.document = Some(document);
    }

    pub fn document(&self) -> Option<&D> {
        self.document.as_ref()
    }

    pub fn document_mut(&mut self) -> Option<&mut D> {
        self.document.as_mut()
    }

    pub fn set_objective(&mut self, cell: CellRef) {
        self.objective = Some(cell);
    }

    pub fn objective(&self) -> Option<CellRef> {
        self.objective
    }

    /// The order given here is the order of the solution vector
    pub fn set_variables(&mut self, cells: Vec<CellRef>) {
        self.variables = cells;
    }

    pub fn variables(&self) -> &[CellRef] {
        &self.variables
    }

    pub fn set_constraints(&mut self, constraints: Vec<ConstraintSpec>) {
        self.constraints = constraints;
    }

    pub fn constraints(&self) -> &[ConstraintSpec] {
        &self.constraints
    }

    pub fn set_maximize(&mut self, maximize: bool) {
        self.maximize = maximize;
    }

    pub fn maximize(&self) -> bool {
        self.maximize
    }

    pub fn set_engine(&mut self, name: impl Into<String>) {
        self.engine = name.into();
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SolverConfig {
        &mut self.config
    }

    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), ConfigError> {
        self.config.set_by_name(name, value)
    }

    pub fn property(&self, name: &str) -> Result<PropertyValue, ConfigError> {
        self.config.get_by_name(name)
    }

    pub fn property_description(&self, name: &str) -> String {
        match name.parse::<Property>() {
            Ok(property) => property.description().to_string(),
            Err(_) => format!("{name} is not a supported property"),
        }
    }

    /// Run extraction only and return the inferred model
    pub fn extract_model(&mut self) -> Result<Model, SolveError> {
        let objective = self.objective.ok_or(SolveError::NoObjective)?;
        let document = self.document.as_mut().ok_or(SolveError::NoDocument)?;
        let mut session = ExtractionSession::begin(document, &self.variables)?;
        extract_model(
            &mut session,
            objective,
            &self.constraints,
            self.maximize,
            &self.config,
        )
    }

    /// Extract the model, solve it and keep the result. Failures are
    /// reported through the result; the previous result is replaced.
    pub fn solve(&mut self) -> &SolveResult {
        let started = Instant::now();
        info!(event = "solve_start", engine = %self.engine, variables = self.variables.len());

        self.warnings.clear();
        let result = match self.run() {
            Ok(result) => result,
            Err(err) => {
                warn!(event = "solve_failed", error = %err);
                SolveResult::from_error(&err)
            }
        };

        info!(
            event = "solve_done",
            success = result.success,
            status = %result.status,
            objective = result.objective_value,
            elapsed_ms = started.elapsed().as_millis() as u64,
        );
        self.result.insert(result)
    }

    fn run(&mut self) -> Result<SolveResult, SolveError> {
        let objective = self.objective.ok_or(SolveError::NoObjective)?;
        let document = self.document.as_mut().ok_or(SolveError::NoDocument)?;
        let mut backend: Box<dyn Backend> =
            create(&self.engine).map_err(|e| SolveError::BackendUnavailable(e.to_string()))?;

        let mut session = ExtractionSession::begin(document, &self.variables)?;
        let model = extract_model(
            &mut session,
            objective,
            &self.constraints,
            self.maximize,
            &self.config,
        )?;
        session.finish();
        self.warnings = model.warnings.clone();

        let result = solve_model(backend.as_mut(), &model, &self.config);
        drop(session);
        Ok(result)
    }

    pub fn result(&self) -> Option<&SolveResult> {
        self.result.as_ref()
    }

    pub fn success(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.success)
    }

    pub fn status_description(&self) -> &str {
        self.result.as_ref().map_or("", |r| r.status.as_str())
    }

    pub fn result_value(&self) -> f64 {
        self.result.as_ref().map_or(0.0, |r| r.objective_value)
    }

    pub fn solution(&self) -> &[f64] {
        self.result.as_ref().map_or(&[], |r| r.solution.as_slice())
    }

    /// Warnings raised by the most recent extraction
    pub fn warnings(&self) -> &[ExtractionWarning] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Operand;
    use crate::testing::{cell, AffineDocument};
    use approx::assert_relative_eq;

    fn single_variable() -> SheetSolver<AffineDocument> {
        // max 3x, x <= 5
        let (x, obj) = (cell(0), cell(10));
        let mut doc = AffineDocument::new();
        doc.define(obj, 0.0, &[(x, 3.0)]);

        let mut solver = SheetSolver::new();
        solver.set_document(doc);
        solver.set_objective(obj);
        solver.set_variables(vec![x]);
        solver.set_constraints(vec![ConstraintSpec::less_equal(x, Operand::Value(5.0))]);
        solver
    }

    #[test]
    fn test_maximize_single_variable() {
        let mut solver = single_variable();

        let model = solver.extract_model().unwrap();
        assert_eq!(model.objective, vec![3.0]);
        assert_eq!(model.constraints[0].row.coefficients, vec![1.0]);
        assert_eq!(model.constraints[0].row.bound, 5.0);

        solver.solve();
        assert!(solver.success());
        assert_eq!(solver.status_description(), "Optimal solution found");
        assert_relative_eq!(solver.result_value(), 15.0, epsilon = 1e-6);
        assert_eq!(solver.solution().len(), 1);
        assert_relative_eq!(solver.solution()[0], 5.0, epsilon = 1e-6);

        let doc = solver.document().unwrap();
        assert!(!doc.is_locked());
        assert_eq!(doc.locks(), doc.releases());
        assert_eq!(doc.writes_while_unlocked(), 0);
    }

    #[test]
    fn test_minimize_integer_equality() {
        // min x + 2y, x + y = 10, integer
        let (x, y, obj, sum) = (cell(0), cell(1), cell(10), cell(11));
        let mut doc = AffineDocument::new();
        doc.define(obj, 0.0, &[(x, 1.0), (y, 2.0)]);
        doc.define(sum, 0.0, &[(x, 1.0), (y, 1.0)]);

        let mut solver = SheetSolver::new();
        solver.set_document(doc);
        solver.set_objective(obj);
        solver.set_variables(vec![x, y]);
        solver.set_constraints(vec![ConstraintSpec::equal(sum, Operand::Value(10.0))]);
        solver.set_maximize(false);
        solver.set_property("Integer", PropertyValue::Bool(true)).unwrap();

        let model = solver.extract_model().unwrap();
        assert_eq!(model.constraints[0].row.coefficients, vec![1.0, 1.0]);
        assert_eq!(model.constraints[0].row.bound, 10.0);

        let result = solver.solve().clone();
        assert!(result.success);
        assert_relative_eq!(result.objective_value, 10.0, epsilon = 1e-6);
        assert_relative_eq!(result.solution[0], 10.0, epsilon = 1e-6);
        assert_relative_eq!(result.solution[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_every_engine_solves_example() {
        for engine in ["CBC", "CP-SAT", "GLOP", "SCIP"] {
            let mut solver = single_variable();
            solver.set_engine(engine);
            solver.solve();
            assert!(solver.success(), "{engine}");
            assert_relative_eq!(solver.result_value(), 15.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_unknown_engine_does_not_touch_document() {
        let mut solver = single_variable();
        solver.set_engine("GUROBI");

        let result = solver.solve().clone();

        assert!(!result.success);
        assert!(result.status.contains("GUROBI"));
        assert_eq!(result.objective_value, 0.0);
        assert!(result.solution.is_empty());
        assert_eq!(solver.document().unwrap().locks(), 0);
    }

    #[test]
    fn test_infeasible_reports_no_solution() {
        let mut solver = single_variable();
        let x = cell(0);
        solver.set_constraints(vec![
            ConstraintSpec::greater_equal(x, Operand::Value(8.0)),
            ConstraintSpec::less_equal(x, Operand::Value(5.0)),
        ]);

        solver.solve();

        assert!(!solver.success());
        assert_eq!(solver.status_description(), "No solution found");
        assert_eq!(solver.result_value(), 0.0);
        assert!(!solver.document().unwrap().is_locked());
    }

    #[test]
    fn test_malformed_constraint_releases_lock() {
        let mut solver = single_variable();
        let x = cell(0);
        solver.set_constraints(vec![ConstraintSpec::less_equal(x, Operand::Value(f64::INFINITY))]);

        solver.solve();

        assert!(!solver.success());
        assert!(solver.status_description().contains("malformed constraint #0"));
        let doc = solver.document().unwrap();
        assert_eq!(doc.locks(), 1);
        assert_eq!(doc.releases(), 1);
    }

    #[test]
    fn test_unknown_right_cell_is_malformed() {
        let mut solver = single_variable();
        let (x, elsewhere) = (cell(0), CellRef::new(7, 0, 0));
        solver.document_mut().unwrap().remove_cell(elsewhere);
        solver.set_constraints(vec![ConstraintSpec::less_equal(x, Operand::Cell(elsewhere))]);

        solver.solve();

        assert!(!solver.success());
        assert!(solver.status_description().contains("malformed constraint #0"));
        assert!(solver.status_description().contains("7!A1"));
        let doc = solver.document().unwrap();
        assert!(!doc.is_locked());
        assert_eq!(doc.locks(), doc.releases());
    }

    #[test]
    fn test_cell_error_releases_lock() {
        let mut solver = single_variable();
        solver.document_mut().unwrap().fail_on(cell(10));

        solver.solve();

        assert!(!solver.success());
        assert!(!solver.document().unwrap().is_locked());
    }

    #[test]
    fn test_missing_document_or_objective() {
        let mut solver: SheetSolver<AffineDocument> = SheetSolver::new();
        solver.set_objective(cell(1));
        solver.solve();
        assert_eq!(solver.status_description(), "Error: no document to solve");

        let mut solver = single_variable();
        solver.objective = None;
        solver.solve();
        assert!(!solver.success());
        assert_eq!(solver.status_description(), SolveError::NoObjective.to_string());
    }

    #[test]
    fn test_new_solve_replaces_result() {
        let mut solver = single_variable();
        solver.solve();
        assert!(solver.success());

        solver.set_engine("nope");
        solver.solve();
        assert!(!solver.success());
        assert!(solver.solution().is_empty());
    }

    #[test]
    fn test_folded_right_side_is_reported() {
        let (x, y, obj, rhs) = (cell(0), cell(1), cell(10), cell(11));
        let mut doc = AffineDocument::new();
        doc.define(obj, 0.0, &[(x, 1.0), (y, 1.0)]);
        doc.define(rhs, 0.0, &[(y, 1.0)]);

        let mut solver = SheetSolver::new();
        solver.set_document(doc);
        solver.set_objective(obj);
        solver.set_variables(vec![x, y]);
        solver.set_constraints(vec![
            ConstraintSpec::equal(x, Operand::Cell(rhs)),
            ConstraintSpec::less_equal(y, Operand::Value(4.0)),
        ]);

        solver.solve();

        assert_eq!(solver.warnings().len(), 1);
        assert!(solver.success());
        // x = y, y <= 4
        assert_relative_eq!(solver.result_value(), 8.0, epsilon = 1e-6);
    }

    #[test]
    fn test_properties_by_name() {
        let mut solver: SheetSolver<AffineDocument> = SheetSolver::new();
        assert!(solver.maximize());
        assert_eq!(solver.engine(), "CBC");

        solver.set_property("Timeout", PropertyValue::Long(30)).unwrap();
        solver.set_property("RelativeGap", PropertyValue::Double(2.0)).unwrap();
        assert_eq!(solver.property("Timeout"), Ok(PropertyValue::Long(30)));
        assert_eq!(solver.property("RelativeGap"), Ok(PropertyValue::Double(0.01)));
        assert!(solver.set_property("Threads", PropertyValue::Long(4)).is_err());

        assert_eq!(solver.property_description("Integer"), "Assume variables as integer");
        assert_eq!(solver.property_description("Threads"), "Threads is not a supported property");
    }
}
