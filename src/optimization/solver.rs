//! Solver seam. The engine only speaks [`Formulation`]; adapters translate
//! it for a concrete MILP backend.

use crate::optimization::model::{Comparison, Formulation, LinearExpr, Sense, VarKind};
use good_lp::{
    constraint, microlp, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Result of one solver call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolveOutcome {
    Optimal { values: Vec<f64>, objective: f64 },
    Infeasible,
    Unbounded,
    TimeLimit,
    Failed(String),
}

impl SolveOutcome {
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveOutcome::Optimal { .. })
    }

    pub fn status(&self) -> SolveStatus {
        match self {
            SolveOutcome::Optimal { .. } => SolveStatus::Optimal,
            SolveOutcome::Infeasible => SolveStatus::Infeasible,
            SolveOutcome::Unbounded => SolveStatus::Unbounded,
            SolveOutcome::TimeLimit => SolveStatus::TimeLimit,
            SolveOutcome::Failed(_) => SolveStatus::Failed,
        }
    }
}

/// Outcome without its payload, for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    TimeLimit,
    Failed,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Unbounded => "unbounded",
            SolveStatus::TimeLimit => "time limit reached",
            SolveStatus::Failed => "solver failure",
        };
        write!(f, "{}", label)
    }
}

/// A mixed-integer linear programming backend.
pub trait MilpSolver {
    fn name(&self) -> &str;

    /// Solve to optimality. Values are indexed by [`VarId`](crate::optimization::model::VarId).
    fn solve(&self, formulation: &Formulation) -> SolveOutcome;
}

/// Branch-and-bound via `good_lp`'s pure-Rust microlp backend.
///
/// microlp cannot be interrupted, so a search that outlives the time limit
/// keeps running on its own thread. Those threads are tracked, reaped once
/// they finish, and can be joined with [`GoodLpSolver::wait_for_abandoned`].
#[derive(Debug, Clone, Default)]
pub struct GoodLpSolver {
    time_limit: Option<Duration>,
    abandoned: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl GoodLpSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up after `limit` of wall-clock time and report
    /// [`SolveOutcome::TimeLimit`]. The abandoned search finishes on its
    /// own thread and its answer is discarded.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    /// Timed-out searches still running.
    pub fn abandoned_searches(&self) -> usize {
        self.reap_finished()
    }

    /// Block until every timed-out search has finished.
    pub fn wait_for_abandoned(&self) {
        let handles: Vec<JoinHandle<()>> = self.lock_abandoned().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn lock_abandoned(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.abandoned.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reap_finished(&self) -> usize {
        let mut abandoned = self.lock_abandoned();
        abandoned.retain(|h| !h.is_finished());
        abandoned.len()
    }
}

impl MilpSolver for GoodLpSolver {
    fn name(&self) -> &str {
        "good_lp/microlp"
    }

    fn solve(&self, formulation: &Formulation) -> SolveOutcome {
        let Some(limit) = self.time_limit else {
            return solve_with_microlp(formulation);
        };

        let still_running = self.reap_finished();
        if still_running > 0 {
            log::warn!("{} timed-out searches are still running", still_running);
        }

        let (tx, rx) = mpsc::channel();
        let owned = formulation.clone();
        let handle = match thread::Builder::new()
            .name("milp-solve".into())
            .spawn(move || {
                let _ = tx.send(solve_with_microlp(&owned));
            }) {
            Ok(handle) => handle,
            Err(e) => return SolveOutcome::Failed(format!("could not start solver thread: {}", e)),
        };

        match rx.recv_timeout(limit) {
            Ok(outcome) => {
                let _ = handle.join();
                outcome
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!(
                    "solver exceeded time limit of {:?}; search left running on its thread",
                    limit
                );
                self.lock_abandoned().push(handle);
                SolveOutcome::TimeLimit
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                SolveOutcome::Failed("solver thread exited without a result".into())
            }
        }
    }
}

fn to_expression(expr: &LinearExpr, vars: &[Variable]) -> Expression {
    let mut out = Expression::with_capacity(expr.terms.len());
    for (var, coef) in &expr.terms {
        out.add_mul(*coef, vars[var.index()]);
    }
    out += expr.constant;
    out
}

fn solve_with_microlp(formulation: &Formulation) -> SolveOutcome {
    let mut problem = ProblemVariables::new();
    let vars: Vec<Variable> = formulation
        .variables()
        .iter()
        .map(|kind| match *kind {
            VarKind::Binary => problem.add(variable().binary()),
            VarKind::Continuous { lower, upper } => problem.add(variable().min(lower).max(upper)),
        })
        .collect();

    let objective = formulation.objective();
    let goal = to_expression(&objective.expr, &vars);
    let unsolved = match objective.sense {
        Sense::Max => problem.maximise(goal),
        Sense::Min => problem.minimise(goal),
    };

    let mut model = unsolved.using(microlp);
    for c in formulation.constraints() {
        let lhs = to_expression(&c.expr, &vars);
        let row = match c.comparison {
            Comparison::Le => constraint::leq(lhs, c.rhs),
            Comparison::Ge => constraint::geq(lhs, c.rhs),
            Comparison::Eq => constraint::eq(lhs, c.rhs),
        };
        model.add_constraint(row);
    }

    match model.solve() {
        Ok(solution) => {
            let values: Vec<f64> = vars.iter().map(|v| solution.value(*v)).collect();
            let objective = objective.expr.evaluate(&values);
            SolveOutcome::Optimal { values, objective }
        }
        Err(ResolutionError::Infeasible) => SolveOutcome::Infeasible,
        Err(ResolutionError::Unbounded) => SolveOutcome::Unbounded,
        Err(other) => SolveOutcome::Failed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::model::{Constraint, VarId};
    use approx::assert_abs_diff_eq;

    fn knapsack() -> Formulation {
        // weights 3, 4, 2; values 5, 6, 3; capacity 6
        let mut f = Formulation::new(Sense::Max);
        let xs: Vec<VarId> = (0..3).map(|_| f.add_binary()).collect();
        let weights = [3.0, 4.0, 2.0];
        let values = [5.0, 6.0, 3.0];
        f.add_constraint(Constraint::le(
            "weight",
            xs.iter().zip(weights).map(|(&x, w)| (x, w)).collect(),
            6.0,
        ));
        f.set_objective(xs.iter().zip(values).map(|(&x, v)| (x, v)).collect());
        f
    }

    #[test]
    fn test_binary_knapsack() {
        let f = knapsack();
        match GoodLpSolver::new().solve(&f) {
            SolveOutcome::Optimal { values, objective } => {
                assert_abs_diff_eq!(objective, 9.0, epsilon = 1e-6);
                assert!(values[1] > 0.5 && values[2] > 0.5);
                assert!(values[0] < 0.5);
                assert!(f.is_feasible(&values, 1e-6));
            }
            other => panic!("expected optimal, got {:?}", other),
        }
    }

    #[test]
    fn test_minimisation_with_floor() {
        let mut f = Formulation::new(Sense::Min);
        let a = f.add_binary();
        let b = f.add_binary();
        f.add_constraint(Constraint::ge("cover", [(a, 1.0), (b, 1.0)].into_iter().collect(), 1.0));
        f.set_objective([(a, 4.0), (b, 2.5)].into_iter().collect());
        match GoodLpSolver::new().solve(&f) {
            SolveOutcome::Optimal { values, objective } => {
                assert_abs_diff_eq!(objective, 2.5, epsilon = 1e-6);
                assert!(values[b.index()] > 0.5);
            }
            other => panic!("expected optimal, got {:?}", other),
        }
    }

    #[test]
    fn test_infeasible() {
        let mut f = Formulation::new(Sense::Max);
        let x = f.add_binary();
        f.add_constraint(Constraint::ge("impossible", [(x, 1.0)].into_iter().collect(), 2.0));
        f.set_objective([(x, 1.0)].into_iter().collect());
        assert_eq!(GoodLpSolver::new().solve(&f).status(), SolveStatus::Infeasible);
    }

    #[test]
    fn test_generous_time_limit_still_solves() {
        let solver = GoodLpSolver::new().with_time_limit(Duration::from_secs(30));
        assert!(solver.solve(&knapsack()).is_optimal());
        assert_eq!(solver.abandoned_searches(), 0);
    }

    #[test]
    fn test_timed_out_searches_are_tracked_and_joined() {
        let solver = GoodLpSolver::new().with_time_limit(Duration::from_nanos(1));
        let outcome = solver.solve(&knapsack());
        assert!(matches!(outcome, SolveOutcome::TimeLimit | SolveOutcome::Optimal { .. }));
        if outcome == SolveOutcome::TimeLimit {
            assert!(solver.abandoned_searches() <= 1);
        }

        // clones share the same bookkeeping
        solver.clone().wait_for_abandoned();
        assert_eq!(solver.abandoned_searches(), 0);
    }
}
