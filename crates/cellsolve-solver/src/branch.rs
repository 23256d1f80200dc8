use std::time::{Duration, Instant};

use tracing::debug;

use crate::problem::LpProblem;
use crate::simplex::Solver;
use crate::solution::SolutionStatus;

/// Outcome of a branch-and-bound run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// Proven optimal, or within the configured relative gap of the best bound
    Optimal,
    /// An incumbent exists but the search stopped on a time or node limit
    Feasible,
    /// No integer-feasible point exists
    Infeasible,
    /// The relaxation is unbounded
    Unbounded,
    /// A limit was hit before any incumbent was found
    NotSolved,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub status: SearchStatus,
    pub values: Vec<f64>,
    pub objective_value: f64,
    /// Number of relaxations solved
    pub nodes: usize,
}

/// Depth-first branch-and-bound over the simplex relaxation
#[derive(Debug, Clone)]
pub struct BranchAndBound {
    relaxation: Solver,
    /// Stop once the incumbent is within this fraction of the best bound
    relative_gap: f64,
    time_limit: Option<Duration>,
    max_nodes: usize,
    /// Distance from an integer below which a value counts as integral
    integrality_tolerance: f64,
}

impl Default for BranchAndBound {
    fn default() -> Self {
        Self {
            relaxation: Solver::default(),
            relative_gap: 1e-4,
            time_limit: None,
            max_nodes: 100_000,
            integrality_tolerance: 1e-6,
        }
    }
}

struct Node {
    bounds: Vec<(f64, f64)>,
    /// Relaxation value of the parent, in minimization sense
    parent_bound: f64,
}

impl BranchAndBound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relative_gap(mut self, gap: f64) -> Self {
        self.relative_gap = gap;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Replace the simplex solver used for node relaxations
    pub fn with_relaxation(mut self, relaxation: Solver) -> Self {
        self.relaxation = relaxation;
        self
    }

    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = max;
        self
    }

    pub fn solve(&self, problem: &LpProblem) -> SearchOutcome {
        let started = Instant::now();
        // Everything below compares objective values in minimization sense
        let sense = if problem.objective.minimize { 1.0 } else { -1.0 };

        let mut working = problem.clone();
        let root_bounds: Vec<(f64, f64)> = problem.variables.iter().map(|v| (v.lower, v.upper)).collect();
        let mut stack = vec![Node {
            bounds: root_bounds,
            parent_bound: f64::NEG_INFINITY,
        }];

        let mut incumbent: Option<(f64, Vec<f64>)> = None;
        let mut nodes = 0;
        let mut limit_hit = false;

        while let Some(node) = stack.pop() {
            if self.time_limit.is_some_and(|limit| started.elapsed() >= limit) || nodes >= self.max_nodes {
                limit_hit = true;
                break;
            }
            if let Some((best, _)) = &incumbent {
                if node.parent_bound >= *best - self.relaxation.tolerance() {
                    continue;
                }
            }

            for (var, &(lower, upper)) in working.variables.iter_mut().zip(&node.bounds) {
                var.lower = lower;
                var.upper = upper;
            }
            let relaxed = self.relaxation.solve(&working);
            nodes += 1;

            match relaxed.status {
                SolutionStatus::Optimal => {}
                SolutionStatus::Unbounded if nodes == 1 => {
                    return SearchOutcome::empty(SearchStatus::Unbounded, nodes);
                }
                // The node is unresolved, not infeasible; no optimality claim survives it
                SolutionStatus::IterationLimit => {
                    debug!(event = "relaxation_limit", nodes);
                    limit_hit = true;
                    continue;
                }
                SolutionStatus::Infeasible | SolutionStatus::Unbounded => continue,
            }

            let bound = sense * relaxed.objective_value;
            if let Some((best, _)) = &incumbent {
                if bound >= *best - self.relaxation.tolerance() {
                    continue;
                }
            }

            match self.most_fractional(&working, &relaxed.values) {
                None => {
                    let values = self.snap_integers(&working, relaxed.values);
                    let value = sense * problem.objective_at(&values);
                    debug!(event = "incumbent", objective = sense * value, nodes);
                    incumbent = Some((value, values));

                    if self.gap_closed(value, &stack) {
                        break;
                    }
                }
                Some(j) => {
                    let x = relaxed.values[j];
                    let (lower, upper) = node.bounds[j];
                    let mut down = node.bounds.clone();
                    down[j] = (lower, x.floor());
                    let mut up = node.bounds;
                    up[j] = (x.ceil(), upper);

                    let down = Node { bounds: down, parent_bound: bound };
                    let up = Node { bounds: up, parent_bound: bound };
                    // Explore the nearer side first
                    if x - x.floor() < 0.5 {
                        stack.push(up);
                        stack.push(down);
                    } else {
                        stack.push(down);
                        stack.push(up);
                    }
                }
            }
        }

        match incumbent {
            Some((value, values)) => SearchOutcome {
                status: if limit_hit { SearchStatus::Feasible } else { SearchStatus::Optimal },
                values,
                objective_value: sense * value,
                nodes,
            },
            None if limit_hit => SearchOutcome::empty(SearchStatus::NotSolved, nodes),
            None => SearchOutcome::empty(SearchStatus::Infeasible, nodes),
        }
    }

    fn most_fractional(&self, problem: &LpProblem, values: &[f64]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (j, (var, &x)) in problem.variables.iter().zip(values).enumerate() {
            if !var.integer {
                continue;
            }
            let frac = (x - x.round()).abs();
            if frac <= self.integrality_tolerance {
                continue;
            }
            if best.is_none_or(|(_, f)| frac > f) {
                best = Some((j, frac));
            }
        }
        best.map(|(j, _)| j)
    }

    fn snap_integers(&self, problem: &LpProblem, mut values: Vec<f64>) -> Vec<f64> {
        for (var, x) in problem.variables.iter().zip(values.iter_mut()) {
            if var.integer {
                *x = x.round();
            }
        }
        values
    }

    fn gap_closed(&self, incumbent: f64, open: &[Node]) -> bool {
        let best_bound = open
            .iter()
            .map(|n| n.parent_bound)
            .fold(f64::INFINITY, f64::min);
        if best_bound == f64::INFINITY {
            return true;
        }
        (incumbent - best_bound).abs() <= self.relative_gap * incumbent.abs().max(1e-9)
    }
}

impl SearchOutcome {
    fn empty(status: SearchStatus, nodes: usize) -> Self {
        Self {
            status,
            values: Vec::new(),
            objective_value: 0.0,
            nodes,
        }
    }
}
