use crate::problem::{ConstraintOp, LpProblem};
use crate::solution::Solution;

/// Consecutive degenerate pivots tolerated before switching to Bland's rule
const DEGENERATE_STREAK_LIMIT: usize = 50;

/// Simplex solver for linear programming problems
#[derive(Debug, Clone)]
pub struct Solver {
    /// Maximum iterations before giving up
    max_iterations: usize,
    /// Tolerance for floating point comparisons
    tolerance: f64,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            max_iterations: 10000,
            tolerance: 1e-9,
        }
    }
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Solve the LP relaxation of `problem` using the two-phase simplex method.
    ///
    /// Integrality flags are ignored here; see [`crate::BranchAndBound`].
    pub fn solve(&self, problem: &LpProblem) -> Solution {
        let Some(standard) = StandardForm::from_problem(problem) else {
            return Solution::infeasible();
        };

        let mut tableau = Tableau::build(&standard);

        // Phase 1: Find initial basic feasible solution
        if tableau.n_artificial > 0 {
            match self.phase1(&mut tableau) {
                SimplexResult::Optimal => {}
                SimplexResult::IterationLimit => return Solution::iteration_limit(),
                SimplexResult::Unbounded | SimplexResult::Infeasible => {
                    return Solution::infeasible();
                }
            }
        }

        // Phase 2: Optimize
        match self.phase2(&mut tableau) {
            SimplexResult::Optimal => {}
            SimplexResult::Unbounded => return Solution::unbounded(),
            SimplexResult::Infeasible => return Solution::infeasible(),
            SimplexResult::IterationLimit => return Solution::iteration_limit(),
        }

        let values = standard.recover(&tableau.structural_values());
        let objective_value = problem.objective_at(&values);
        Solution::optimal(values, objective_value)
    }

    fn phase1(&self, tableau: &mut Tableau) -> SimplexResult {
        // Auxiliary objective: maximize -sum(artificials)
        let n_constraints = tableau.n_rows();
        let n_cols = tableau.n_cols();
        let art_start = tableau.artificial_start();

        let orig_obj = tableau.data[n_constraints].clone();

        for j in 0..n_cols {
            tableau.data[n_constraints][j] = 0.0;
        }
        for j in art_start..(art_start + tableau.n_artificial) {
            tableau.data[n_constraints][j] = -1.0;
        }

        // Price out the basic artificials
        for i in 0..n_constraints {
            if tableau.basic_vars[i] >= art_start {
                for j in 0..n_cols {
                    tableau.data[n_constraints][j] += tableau.data[i][j];
                }
            }
        }

        match self.iterate(tableau, n_cols - 1) {
            SimplexResult::Optimal => {}
            SimplexResult::Unbounded => return SimplexResult::Infeasible,
            other => return other,
        }

        let rhs_col = n_cols - 1;
        for i in 0..n_constraints {
            if tableau.basic_vars[i] >= art_start && tableau.data[i][rhs_col].abs() > self.tolerance {
                return SimplexResult::Infeasible;
            }
        }

        self.drive_out_artificials(tableau);

        // Restore original objective and price out the basis
        tableau.data[n_constraints] = orig_obj;
        for i in 0..n_constraints {
            let basic = tableau.basic_vars[i];
            let ratio = tableau.data[n_constraints][basic];
            if ratio.abs() > self.tolerance {
                for j in 0..n_cols {
                    tableau.data[n_constraints][j] -= ratio * tableau.data[i][j];
                }
            }
        }

        SimplexResult::Optimal
    }

    /// Pivot zero-level artificials out of the basis so phase 2 cannot raise them.
    /// Rows with no usable column are redundant and stay as they are.
    fn drive_out_artificials(&self, tableau: &mut Tableau) {
        let art_start = tableau.artificial_start();
        for i in 0..tableau.n_rows() {
            if tableau.basic_vars[i] < art_start {
                continue;
            }
            let column = (0..art_start).find(|&j| tableau.data[i][j].abs() > self.tolerance);
            if let Some(j) = column {
                self.pivot(tableau, i, j);
            }
        }
    }

    fn phase2(&self, tableau: &mut Tableau) -> SimplexResult {
        // Artificial columns never re-enter
        let limit = tableau.artificial_start();
        self.iterate(tableau, limit)
    }

    fn iterate(&self, tableau: &mut Tableau, column_limit: usize) -> SimplexResult {
        let rhs_col = tableau.n_cols() - 1;
        let mut degenerate_streak = 0;

        for _ in 0..self.max_iterations {
            let bland = degenerate_streak > DEGENERATE_STREAK_LIMIT;
            let Some(pivot_col) = self.find_pivot_column(tableau, column_limit, bland) else {
                return SimplexResult::Optimal;
            };
            let Some(pivot_row) = self.find_pivot_row(tableau, pivot_col) else {
                return SimplexResult::Unbounded;
            };
            if tableau.data[pivot_row][rhs_col].abs() <= self.tolerance {
                degenerate_streak += 1;
            } else {
                degenerate_streak = 0;
            }
            self.pivot(tableau, pivot_row, pivot_col);
        }
        SimplexResult::IterationLimit
    }

    fn find_pivot_column(&self, tableau: &Tableau, column_limit: usize, bland: bool) -> Option<usize> {
        let obj_row = tableau.n_rows();
        let reduced = &tableau.data[obj_row][..column_limit];

        if bland {
            return reduced.iter().position(|&v| v > self.tolerance);
        }

        // Look for the most positive reduced cost (can improve objective)
        let mut max_val = self.tolerance;
        let mut max_col = None;
        for (j, &v) in reduced.iter().enumerate() {
            if v > max_val {
                max_val = v;
                max_col = Some(j);
            }
        }
        max_col
    }

    fn find_pivot_row(&self, tableau: &Tableau, col: usize) -> Option<usize> {
        let rhs_col = tableau.n_cols() - 1;

        let mut min_ratio = f64::INFINITY;
        let mut min_row: Option<usize> = None;

        for i in 0..tableau.n_rows() {
            let val = tableau.data[i][col];
            if val <= self.tolerance {
                continue;
            }
            let ratio = tableau.data[i][rhs_col] / val;
            let better = match min_row {
                None => true,
                Some(r) => {
                    ratio < min_ratio - self.tolerance
                        || ((ratio - min_ratio).abs() <= self.tolerance
                            && tableau.basic_vars[i] < tableau.basic_vars[r])
                }
            };
            if better {
                min_ratio = ratio;
                min_row = Some(i);
            }
        }

        min_row
    }

    fn pivot(&self, tableau: &mut Tableau, row: usize, col: usize) {
        let n_rows = tableau.data.len();
        let n_cols = tableau.n_cols();

        tableau.basic_vars[row] = col;

        let pivot_val = tableau.data[row][col];
        for j in 0..n_cols {
            tableau.data[row][j] /= pivot_val;
        }

        for i in 0..n_rows {
            if i != row {
                let factor = tableau.data[i][col];
                if factor == 0.0 {
                    continue;
                }
                for j in 0..n_cols {
                    tableau.data[i][j] -= factor * tableau.data[row][j];
                }
            }
        }
    }
}

/// How one original variable is expressed over non-negative structural columns:
/// `x = offset + sum(sign * y[col])`
#[derive(Debug, Clone)]
struct ColumnMap {
    offset: f64,
    terms: Vec<(usize, f64)>,
}

#[derive(Debug, Clone)]
struct StandardRow {
    coefficients: Vec<f64>,
    op: ConstraintOp,
    rhs: f64,
}

/// The problem rewritten over non-negative columns with finite bounds turned into rows
#[derive(Debug, Clone)]
struct StandardForm {
    columns: Vec<ColumnMap>,
    n_cols: usize,
    rows: Vec<StandardRow>,
    objective: Vec<f64>,
    minimize: bool,
}

impl StandardForm {
    /// Returns `None` when a variable's bounds are empty
    fn from_problem(problem: &LpProblem) -> Option<Self> {
        let mut columns = Vec::with_capacity(problem.num_variables());
        let mut upper_rows = Vec::new();
        let mut n_cols = 0;

        for var in &problem.variables {
            let (lower, upper) = (var.lower, var.upper);
            if lower > upper || lower == f64::INFINITY || upper == f64::NEG_INFINITY {
                return None;
            }
            let map = if lower.is_finite() {
                let col = n_cols;
                n_cols += 1;
                if upper.is_finite() {
                    upper_rows.push((col, upper - lower));
                }
                ColumnMap {
                    offset: lower,
                    terms: vec![(col, 1.0)],
                }
            } else if upper.is_finite() {
                let col = n_cols;
                n_cols += 1;
                ColumnMap {
                    offset: upper,
                    terms: vec![(col, -1.0)],
                }
            } else {
                let (pos, neg) = (n_cols, n_cols + 1);
                n_cols += 2;
                ColumnMap {
                    offset: 0.0,
                    terms: vec![(pos, 1.0), (neg, -1.0)],
                }
            };
            columns.push(map);
        }

        let mut rows = Vec::with_capacity(problem.num_constraints() + upper_rows.len());
        for c in &problem.constraints {
            let mut coefficients = vec![0.0; n_cols];
            let mut rhs = c.rhs;
            for (map, &a) in columns.iter().zip(&c.coefficients) {
                rhs -= a * map.offset;
                for &(col, sign) in &map.terms {
                    coefficients[col] += a * sign;
                }
            }
            rows.push(StandardRow { coefficients, op: c.op, rhs });
        }
        for (col, width) in upper_rows {
            let mut coefficients = vec![0.0; n_cols];
            coefficients[col] = 1.0;
            rows.push(StandardRow {
                coefficients,
                op: ConstraintOp::Le,
                rhs: width,
            });
        }

        let mut objective = vec![0.0; n_cols];
        for (map, &c) in columns.iter().zip(&problem.objective.coefficients) {
            for &(col, sign) in &map.terms {
                objective[col] += c * sign;
            }
        }

        Some(Self {
            columns,
            n_cols,
            rows,
            objective,
            minimize: problem.objective.minimize,
        })
    }

    fn recover(&self, y: &[f64]) -> Vec<f64> {
        self.columns
            .iter()
            .map(|map| map.offset + map.terms.iter().map(|&(col, sign)| sign * y[col]).sum::<f64>())
            .collect()
    }
}

struct Tableau {
    data: Vec<Vec<f64>>,
    basic_vars: Vec<usize>,
    n_vars: usize,
    n_slack: usize,
    n_artificial: usize,
}

impl Tableau {
    fn build(standard: &StandardForm) -> Self {
        let n_vars = standard.n_cols;
        let n_constraints = standard.rows.len();

        // Normalize to non-negative right-hand sides first so the basis choice is valid
        let rows: Vec<StandardRow> = standard
            .rows
            .iter()
            .map(|row| {
                if row.rhs < 0.0 {
                    StandardRow {
                        coefficients: row.coefficients.iter().map(|a| -a).collect(),
                        op: row.op.flipped(),
                        rhs: -row.rhs,
                    }
                } else {
                    row.clone()
                }
            })
            .collect();

        let mut n_slack = 0;
        let mut n_artificial = 0;
        for row in &rows {
            match row.op {
                ConstraintOp::Le => n_slack += 1,
                ConstraintOp::Ge => {
                    n_slack += 1; // surplus
                    n_artificial += 1;
                }
                ConstraintOp::Eq => n_artificial += 1,
            }
        }

        let total_cols = n_vars + n_slack + n_artificial + 1; // +1 for RHS
        let mut tableau = Tableau {
            data: vec![vec![0.0; total_cols]; n_constraints + 1],
            basic_vars: vec![0; n_constraints],
            n_vars,
            n_slack,
            n_artificial,
        };

        let mut slack_idx = n_vars;
        let mut artificial_idx = n_vars + n_slack;

        for (i, row) in rows.iter().enumerate() {
            tableau.data[i][..n_vars].copy_from_slice(&row.coefficients);
            tableau.data[i][total_cols - 1] = row.rhs;

            match row.op {
                ConstraintOp::Le => {
                    tableau.data[i][slack_idx] = 1.0;
                    tableau.basic_vars[i] = slack_idx;
                    slack_idx += 1;
                }
                ConstraintOp::Ge => {
                    tableau.data[i][slack_idx] = -1.0;
                    slack_idx += 1;
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    artificial_idx += 1;
                }
                ConstraintOp::Eq => {
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    artificial_idx += 1;
                }
            }
        }

        // Objective row: the tableau always maximizes
        for (j, &coef) in standard.objective.iter().enumerate() {
            tableau.data[n_constraints][j] = if standard.minimize { -coef } else { coef };
        }

        tableau
    }

    fn n_rows(&self) -> usize {
        self.data.len() - 1
    }

    fn n_cols(&self) -> usize {
        self.data[0].len()
    }

    fn artificial_start(&self) -> usize {
        self.n_vars + self.n_slack
    }

    fn structural_values(&self) -> Vec<f64> {
        let rhs_col = self.n_cols() - 1;
        let mut values = vec![0.0; self.n_vars];
        for (i, &basic) in self.basic_vars.iter().enumerate() {
            if basic < self.n_vars {
                values[basic] = self.data[i][rhs_col];
            }
        }
        values
    }
}

enum SimplexResult {
    Optimal,
    Unbounded,
    Infeasible,
    IterationLimit,
}
