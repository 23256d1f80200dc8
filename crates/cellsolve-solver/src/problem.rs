/// Represents a (mixed-integer) linear programming problem
#[derive(Debug, Clone)]
pub struct LpProblem {
    /// Decision variables, in column order
    pub variables: Vec<VariableDef>,
    /// Objective function coefficients (costs)
    pub objective: Objective,
    /// Constraints
    pub constraints: Vec<Constraint>,
}

/// A single column of the problem with its box bounds
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDef {
    /// Name/label for the variable (for diagnostics)
    pub name: String,
    /// Lower bound, may be `f64::NEG_INFINITY`
    pub lower: f64,
    /// Upper bound, may be `f64::INFINITY`
    pub upper: f64,
    /// Whether branch-and-bound must drive this column to an integer value
    pub integer: bool,
}

#[derive(Debug, Clone)]
pub struct Objective {
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// Whether to minimize or maximize
    pub minimize: bool,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    /// Name/label for the constraint (for diagnostics)
    pub name: String,
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// Comparison operator
    pub op: ConstraintOp,
    /// Right-hand side value
    pub rhs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

impl ConstraintOp {
    /// The operator obtained by multiplying both sides by -1
    pub fn flipped(self) -> Self {
        match self {
            ConstraintOp::Le => ConstraintOp::Ge,
            ConstraintOp::Ge => ConstraintOp::Le,
            ConstraintOp::Eq => ConstraintOp::Eq,
        }
    }
}

impl VariableDef {
    pub fn continuous(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
            integer: false,
        }
    }

    pub fn integer(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
            integer: true,
        }
    }
}

impl LpProblem {
    /// Create a problem over non-negative continuous variables
    pub fn new(variables: Vec<String>) -> Self {
        let variables = variables
            .into_iter()
            .map(|name| VariableDef::continuous(name, 0.0, f64::INFINITY))
            .collect();
        Self::with_variables(variables)
    }

    pub fn with_variables(variables: Vec<VariableDef>) -> Self {
        let n = variables.len();
        Self {
            variables,
            objective: Objective {
                coefficients: vec![0.0; n],
                minimize: true,
            },
            constraints: Vec::new(),
        }
    }

    pub fn add_variable(&mut self, variable: VariableDef) -> usize {
        self.variables.push(variable);
        self.objective.coefficients.push(0.0);
        self.variables.len() - 1
    }

    pub fn set_objective(&mut self, coefficients: Vec<f64>, minimize: bool) {
        self.objective = Objective { coefficients, minimize };
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, coefficients: Vec<f64>, op: ConstraintOp, rhs: f64) {
        self.constraints.push(Constraint {
            name: name.into(),
            coefficients,
            op,
            rhs,
        });
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn has_integers(&self) -> bool {
        self.variables.iter().any(|v| v.integer)
    }

    /// Evaluate the objective function at `values`
    pub fn objective_at(&self, values: &[f64]) -> f64 {
        self.objective
            .coefficients
            .iter()
            .zip(values)
            .map(|(c, x)| c * x)
            .sum()
    }
}
