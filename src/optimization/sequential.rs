use crate::core::error::EngineError;
use crate::core::facility::FacilitySet;
use crate::core::loan::Loan;
use crate::optimization::assignment::Assignment;
use crate::optimization::eligibility::EligibilityMatrix;
use crate::optimization::formulation::{AchievedObjective, FormulationBuilder};
use crate::optimization::solver::{GoodLpSolver, MilpSolver, SolveOutcome, SolveStatus};
use crate::optimization::step::{sort_steps, OptimizationStep};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Engine knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Slack allowed when later steps re-impose earlier objectives.
    pub tolerance: f64,
    /// Wall-clock budget per solver call. A search that runs over is
    /// reported as a time-limit failure but keeps its thread until it
    /// finishes; see [`GoodLpSolver::wait_for_abandoned`].
    pub time_limit: Option<Duration>,
    /// Cap new principal per facility at capacity minus ledger principal.
    pub enforce_capacity: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-4,
            time_limit: None,
            enforce_capacity: false,
        }
    }
}

impl EngineConfig {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_capacity_enforced(mut self, enforce: bool) -> Self {
        self.enforce_capacity = enforce;
        self
    }

    /// The default backend configured with this time limit.
    pub fn solver(&self) -> GoodLpSolver {
        match self.time_limit {
            Some(limit) => GoodLpSolver::new().with_time_limit(limit),
            None => GoodLpSolver::new(),
        }
    }
}

/// Per-facility figures for the loans one step placed there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityStats {
    pub facility: usize,
    pub num_loans: usize,
    pub total_amount: Decimal,
    /// Mean `CSCORE_B` over assigned loans that have one.
    pub avg_credit_score: Option<f64>,
}

/// A step the solver answered optimally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: OptimizationStep,
    pub objective_value: f64,
    pub assignments: Vec<Assignment>,
    pub unassigned: Vec<usize>,
    /// Only facilities that received at least one loan.
    pub facility_stats: Vec<FacilityStats>,
}

impl StepResult {
    fn from_assignments(
        step: OptimizationStep,
        objective_value: f64,
        assignments: Vec<Assignment>,
        loans: &[Loan],
    ) -> Self {
        let mut assigned = vec![false; loans.len()];
        let mut by_facility: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for a in &assignments {
            assigned[a.loan] = true;
            by_facility.entry(a.facility).or_default().push(a.loan);
        }

        let facility_stats = by_facility
            .into_iter()
            .map(|(facility, members)| {
                let scores: Vec<f64> = members
                    .iter()
                    .filter_map(|&i| loans[i].credit_score())
                    .collect();
                FacilityStats {
                    facility,
                    num_loans: members.len(),
                    total_amount: members.iter().map(|&i| loans[i].orig_amt()).sum(),
                    avg_credit_score: if scores.is_empty() {
                        None
                    } else {
                        Some(scores.iter().sum::<f64>() / scores.len() as f64)
                    },
                }
            })
            .collect();

        Self {
            step,
            objective_value,
            unassigned: (0..loans.len()).filter(|&i| !assigned[i]).collect(),
            assignments,
            facility_stats,
        }
    }

    /// Loan indices grouped by facility index.
    pub fn loans_by_facility(&self) -> BTreeMap<usize, Vec<usize>> {
        let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for a in &self.assignments {
            grouped.entry(a.facility).or_default().push(a.loan);
        }
        grouped
    }
}

/// A step that ended without an optimal solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: OptimizationStep,
    pub status: SolveStatus,
    pub reason: Option<String>,
}

/// Everything a sequential run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub steps: Vec<StepResult>,
    pub failures: Vec<StepFailure>,
    num_loans: usize,
}

impl AllocationOutcome {
    fn empty(num_loans: usize) -> Self {
        Self {
            num_loans,
            ..Default::default()
        }
    }

    /// The last optimally solved step, whose assignment is authoritative.
    pub fn final_step(&self) -> Option<&StepResult> {
        self.steps.last()
    }

    pub fn assignments(&self) -> &[Assignment] {
        self.final_step().map_or(&[], |s| s.assignments.as_slice())
    }

    /// Unassigned loan indices. Every loan when no step succeeded.
    pub fn unassigned(&self) -> Vec<usize> {
        match self.final_step() {
            Some(step) => step.unassigned.clone(),
            None => (0..self.num_loans).collect(),
        }
    }

    pub fn objective_values(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.objective_value).collect()
    }

    pub fn facility_stats(&self) -> &[FacilityStats] {
        self.final_step().map_or(&[], |s| s.facility_stats.as_slice())
    }

    pub fn is_success(&self) -> bool {
        !self.steps.is_empty()
    }
}

/// Preemptive goal programming: each step optimizes one objective while
/// holding every earlier loan-field objective at its achieved value.
pub struct SequentialOptimizer<S: MilpSolver> {
    solver: S,
    config: EngineConfig,
}

impl SequentialOptimizer<GoodLpSolver> {
    /// Optimizer over the default backend.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::new(config.solver(), config)
    }
}

impl<S: MilpSolver> SequentialOptimizer<S> {
    pub fn new(solver: S, config: EngineConfig) -> Self {
        Self { solver, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run(
        &self,
        loans: &[Loan],
        facilities: &FacilitySet,
        matrix: &EligibilityMatrix,
        steps: &[OptimizationStep],
    ) -> Result<AllocationOutcome, EngineError> {
        if loans.is_empty() || facilities.is_empty() {
            log::info!(
                "nothing to allocate ({} loans, {} facilities)",
                loans.len(),
                facilities.len()
            );
            return Ok(AllocationOutcome::empty(loans.len()));
        }

        let builder = FormulationBuilder::new(loans, facilities, matrix)?
            .with_tolerance(self.config.tolerance)
            .with_capacity_limits(self.config.enforce_capacity);

        let mut outcome = AllocationOutcome::empty(loans.len());
        let mut achieved: Vec<AchievedObjective> = Vec::new();

        for step in sort_steps(steps) {
            log::debug!("starting {} with {}", step, self.solver.name());
            let program = builder.build(&step, &achieved);

            match self.solver.solve(&program.formulation) {
                SolveOutcome::Optimal { values, objective } => {
                    let assignments = program.assignments(&values);
                    log::info!(
                        "{} solved: objective {:.4}, {} loans assigned",
                        step,
                        objective,
                        assignments.len()
                    );
                    achieved.push(AchievedObjective {
                        target: step.target,
                        value: objective,
                    });
                    outcome
                        .steps
                        .push(StepResult::from_assignments(step, objective, assignments, loans));
                }
                other => {
                    let reason = match &other {
                        SolveOutcome::Failed(msg) => Some(msg.clone()),
                        _ => None,
                    };
                    log::warn!("{} not solved: {}", step, other.status());
                    outcome.failures.push(StepFailure {
                        step,
                        status: other.status(),
                        reason,
                    });
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::covenant::{Bound, PoolCovenant, PoolKind};
    use crate::core::facility::{Facility, FacilityId};
    use crate::core::loan::LoanField;
    use crate::optimization::model::Formulation;
    use approx::assert_abs_diff_eq;
    use rust_decimal_macros::dec;
    use std::cell::RefCell;

    fn scenario_loans() -> Vec<Loan> {
        vec![
            Loan::new("A", dec!(300000)).with_credit_score(700.0),
            Loan::new("B", dec!(200000)).with_credit_score(800.0),
            Loan::new("C", dec!(200000)).with_credit_score(760.0),
        ]
    }

    /// One facility that can hold at most two loans.
    fn two_slot_facility() -> FacilitySet {
        let mut facility = Facility::new(FacilityId::new(1), dec!(100), dec!(1_000_000));
        facility.add_pool_covenant(PoolCovenant::new(
            vec![1.0; 3],
            vec![1.0; 3],
            2.0,
            PoolKind::WeightedSum,
            Bound::AtMost,
        ));
        [facility].into_iter().collect()
    }

    #[test]
    fn test_lexicographic_scenario() {
        let loans = scenario_loans();
        let facilities = two_slot_facility();
        let matrix = EligibilityMatrix::build(&loans, &facilities);
        let steps = [
            OptimizationStep::maximize(2, LoanField::CreditScore),
            OptimizationStep::maximize(1, LoanField::Amount),
        ];

        let outcome = SequentialOptimizer::with_config(EngineConfig::default())
            .run(&loans, &facilities, &matrix, &steps)
            .unwrap();

        assert!(outcome.failures.is_empty());
        let values = outcome.objective_values();
        assert_abs_diff_eq!(values[0], 500000.0, epsilon = 1e-3);
        assert_abs_diff_eq!(values[1], 1500.0, epsilon = 1e-3);

        let mut placed: Vec<usize> = outcome.assignments().iter().map(|a| a.loan).collect();
        placed.sort_unstable();
        assert_eq!(placed, vec![0, 1]);
        assert_eq!(outcome.unassigned(), vec![2]);

        let stats = &outcome.facility_stats()[0];
        assert_eq!(stats.num_loans, 2);
        assert_eq!(stats.total_amount, dec!(500000));
        assert_abs_diff_eq!(stats.avg_credit_score.unwrap(), 750.0, epsilon = 1e-9);
    }

    #[test]
    fn test_each_loan_assigned_at_most_once() {
        let loans = scenario_loans();
        let facilities: FacilitySet = [1, 2]
            .into_iter()
            .map(|n| Facility::new(FacilityId::new(n), dec!(1), dec!(1)))
            .collect();
        let matrix = EligibilityMatrix::build(&loans, &facilities);
        let outcome = SequentialOptimizer::with_config(EngineConfig::default())
            .run(
                &loans,
                &facilities,
                &matrix,
                &[OptimizationStep::maximize(1, LoanField::Amount)],
            )
            .unwrap();
        assert_eq!(outcome.assignments().len(), 3);
        let mut seen: Vec<usize> = outcome.assignments().iter().map(|a| a.loan).collect();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_facility_cost_prefers_cheapest() {
        let loans = scenario_loans();
        let facilities: FacilitySet = [(1, dec!(50)), (2, dec!(10))]
            .into_iter()
            .map(|(n, cost)| Facility::new(FacilityId::new(n), cost, dec!(1)))
            .collect();
        let matrix = EligibilityMatrix::build(&loans, &facilities);
        let steps = [
            OptimizationStep::maximize(1, LoanField::Amount),
            OptimizationStep::minimize_cost(2),
        ];
        let outcome = SequentialOptimizer::with_config(EngineConfig::default())
            .run(&loans, &facilities, &matrix, &steps)
            .unwrap();
        assert_abs_diff_eq!(outcome.objective_values()[1], 10.0, epsilon = 1e-6);
        assert!(outcome.assignments().iter().all(|a| a.facility == 1));
        assert_eq!(outcome.assignments().len(), 3);
    }

    #[test]
    fn test_empty_inputs_skip_solving() {
        let outcome = SequentialOptimizer::with_config(EngineConfig::default())
            .run(
                &scenario_loans(),
                &FacilitySet::new(),
                &EligibilityMatrix::from_rows(vec![vec![], vec![], vec![]]).unwrap(),
                &[OptimizationStep::maximize(1, LoanField::Amount)],
            )
            .unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.assignments().is_empty());
        assert_eq!(outcome.unassigned(), vec![0, 1, 2]);
    }

    struct Scripted {
        answers: RefCell<Vec<SolveOutcome>>,
        seen: RefCell<Vec<usize>>,
    }

    impl MilpSolver for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn solve(&self, formulation: &Formulation) -> SolveOutcome {
            self.seen.borrow_mut().push(formulation.num_constraints());
            self.answers.borrow_mut().remove(0)
        }
    }

    #[test]
    fn test_failed_step_adds_no_carry_forward() {
        let loans = scenario_loans();
        let facilities = two_slot_facility();
        let matrix = EligibilityMatrix::build(&loans, &facilities);
        let solver = Scripted {
            answers: RefCell::new(vec![
                SolveOutcome::TimeLimit,
                SolveOutcome::Optimal {
                    values: vec![1.0, 0.0, 1.0],
                    objective: 1460.0,
                },
                SolveOutcome::Failed("backend crashed".into()),
            ]),
            seen: RefCell::new(Vec::new()),
        };
        let steps = [
            OptimizationStep::maximize(1, LoanField::Amount),
            OptimizationStep::maximize(2, LoanField::CreditScore),
            OptimizationStep::maximize(3, LoanField::Amount),
        ];
        let outcome = SequentialOptimizer::new(solver, EngineConfig::default())
            .run(&loans, &facilities, &matrix, &steps)
            .unwrap();

        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[0].status, SolveStatus::TimeLimit);
        assert_eq!(outcome.failures[1].reason.as_deref(), Some("backend crashed"));
        assert_eq!(outcome.final_step().unwrap().step.order, 2);
        assert_eq!(
            outcome.assignments(),
            &[Assignment::new(0, 0), Assignment::new(2, 0)]
        );
    }

    #[test]
    fn test_carry_forward_only_after_success() {
        let loans = scenario_loans();
        let facilities = two_slot_facility();
        let matrix = EligibilityMatrix::build(&loans, &facilities);
        let solver = Scripted {
            answers: RefCell::new(vec![
                SolveOutcome::Infeasible,
                SolveOutcome::Optimal {
                    values: vec![0.0; 3],
                    objective: 0.0,
                },
                SolveOutcome::Optimal {
                    values: vec![0.0; 3],
                    objective: 0.0,
                },
            ]),
            seen: RefCell::new(Vec::new()),
        };
        let optimizer = SequentialOptimizer::new(solver, EngineConfig::default());
        let steps = [
            OptimizationStep::maximize(1, LoanField::Amount),
            OptimizationStep::maximize(2, LoanField::Amount),
            OptimizationStep::maximize(3, LoanField::Amount),
        ];
        optimizer.run(&loans, &facilities, &matrix, &steps).unwrap();
        // base: 3 one-facility, 3 eligibility, 1 pool
        assert_eq!(*optimizer.solver.seen.borrow(), vec![7, 7, 8]);
    }

    #[test]
    fn test_shape_errors_propagate() {
        let result = SequentialOptimizer::with_config(EngineConfig::default()).run(
            &scenario_loans(),
            &two_slot_facility(),
            &EligibilityMatrix::from_rows(vec![vec![true]]).unwrap(),
            &[],
        );
        assert!(matches!(result, Err(EngineError::MatrixShape { .. })));
    }
}
