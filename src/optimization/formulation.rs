use crate::core::error::EngineError;
use crate::core::facility::FacilitySet;
use crate::core::loan::{Loan, LoanField};
use crate::optimization::assignment::Assignment;
use crate::optimization::eligibility::EligibilityMatrix;
use crate::optimization::model::{Constraint, Formulation, LinearExpr, VarId};
use crate::optimization::step::{ObjectiveTarget, OptimizationStep};
use rust_decimal::prelude::ToPrimitive;

/// Value a previous step achieved, kept as a floor for later steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AchievedObjective {
    pub target: ObjectiveTarget,
    pub value: f64,
}

/// A step's program plus the mapping from (loan, facility) to variables.
#[derive(Debug, Clone)]
pub struct StepFormulation {
    pub formulation: Formulation,
    num_loans: usize,
    num_facilities: usize,
    used: Vec<VarId>,
}

impl StepFormulation {
    /// Decision variable for placing `loan` into `facility`.
    pub fn decision(&self, loan: usize, facility: usize) -> VarId {
        VarId(loan * self.num_facilities + facility)
    }

    /// Facility-used indicators; empty unless the step targets facility cost.
    pub fn used_indicators(&self) -> &[VarId] {
        &self.used
    }

    /// Pairs whose decision value rounds to one.
    pub fn assignments(&self, values: &[f64]) -> Vec<Assignment> {
        let mut out = Vec::new();
        for i in 0..self.num_loans {
            for j in 0..self.num_facilities {
                let value = values.get(self.decision(i, j).index()).copied().unwrap_or(0.0);
                if value > 0.5 {
                    out.push(Assignment::new(i, j));
                }
            }
        }
        out
    }
}

/// Builds one fresh formulation per optimization step over fixed inputs.
pub struct FormulationBuilder<'a> {
    loans: &'a [Loan],
    facilities: &'a FacilitySet,
    matrix: &'a EligibilityMatrix,
    tolerance: f64,
    enforce_capacity: bool,
}

impl<'a> FormulationBuilder<'a> {
    /// Check that every input agrees on the number of loans and facilities.
    pub fn new(
        loans: &'a [Loan],
        facilities: &'a FacilitySet,
        matrix: &'a EligibilityMatrix,
    ) -> Result<Self, EngineError> {
        if matrix.loan_count() != loans.len() || matrix.facility_count() != facilities.len() {
            return Err(EngineError::MatrixShape {
                rows: matrix.loan_count(),
                cols: matrix.facility_count(),
                loans: loans.len(),
                facilities: facilities.len(),
            });
        }
        for (j, facility) in facilities.iter().enumerate() {
            for (k, covenant) in facility.pool_covenants().iter().enumerate() {
                let bad = [covenant.a.len(), covenant.b.len()]
                    .into_iter()
                    .find(|&len| len != loans.len());
                if let Some(len) = bad {
                    return Err(EngineError::CoefficientLength {
                        facility: j,
                        covenant: k,
                        len,
                        loans: loans.len(),
                    });
                }
            }
        }
        Ok(Self {
            loans,
            facilities,
            matrix,
            tolerance: 1e-4,
            enforce_capacity: false,
        })
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_capacity_limits(mut self, enforce: bool) -> Self {
        self.enforce_capacity = enforce;
        self
    }

    pub fn build(&self, step: &OptimizationStep, prior: &[AchievedObjective]) -> StepFormulation {
        let nl = self.loans.len();
        let nf = self.facilities.len();
        let mut f = Formulation::new(step.sense);

        for _ in 0..nl * nf {
            f.add_binary();
        }
        let x = |i: usize, j: usize| VarId(i * nf + j);

        for i in 0..nl {
            let once: LinearExpr = (0..nf).map(|j| (x(i, j), 1.0)).collect();
            f.add_constraint(Constraint::le(format!("one_facility_{}", i), once, 1.0));
        }

        for i in 0..nl {
            for j in 0..nf {
                let cell = if self.matrix.is_eligible(i, j) { 1.0 } else { 0.0 };
                f.add_constraint(Constraint::le(
                    format!("eligible_{}_{}", i, j),
                    [(x(i, j), 1.0)].into_iter().collect(),
                    cell,
                ));
            }
        }

        for (j, facility) in self.facilities.iter().enumerate() {
            for (k, covenant) in facility.pool_covenants().iter().enumerate() {
                let flip = covenant.bound.flip_factor();
                let lhs: LinearExpr = (0..nl)
                    .map(|i| (x(i, j), covenant.candidate_coefficient(i) * flip))
                    .collect();
                f.add_constraint(Constraint::le(
                    format!("pool_{}_{}", j, k),
                    lhs,
                    covenant.existing_rhs() * flip,
                ));
            }

            if self.enforce_capacity {
                let headroom = facility.remaining_capacity().to_f64().unwrap_or(0.0);
                let lhs: LinearExpr = (0..nl)
                    .map(|i| (x(i, j), self.loans[i].orig_amt().to_f64().unwrap_or(0.0)))
                    .collect();
                f.add_constraint(Constraint::le(format!("capacity_{}", j), lhs, headroom));
            }
        }

        for (p, achieved) in prior.iter().enumerate() {
            let ObjectiveTarget::Loan(field) = achieved.target else {
                continue;
            };
            f.add_constraint(Constraint::ge(
                format!("carry_forward_{}", p),
                self.field_sum(field, nf),
                achieved.value - self.tolerance,
            ));
        }

        let mut used = Vec::new();
        let objective = match step.target {
            ObjectiveTarget::FacilityCost => {
                used = (0..nf).map(|_| f.add_binary()).collect();
                let mut cost = LinearExpr::with_capacity(nf);
                for (j, facility) in self.facilities.iter().enumerate() {
                    let mut link: LinearExpr = (0..nl).map(|i| (x(i, j), 1.0)).collect();
                    link.add_term(used[j], -(nl as f64));
                    f.add_constraint(Constraint::le(format!("facility_used_{}", j), link, 0.0));
                    cost.add_term(used[j], facility.cost().to_f64().unwrap_or(0.0));
                }
                cost
            }
            ObjectiveTarget::Loan(field) => self.field_sum(field, nf),
        };
        f.set_objective(objective);

        log::debug!(
            "{}: {} variables, {} constraints",
            step,
            f.num_variables(),
            f.num_constraints()
        );

        StepFormulation {
            formulation: f,
            num_loans: nl,
            num_facilities: nf,
            used,
        }
    }

    /// `Σ_i Σ_j x[i][j]·loan_i.field`, with missing values counted as zero.
    fn field_sum(&self, field: LoanField, nf: usize) -> LinearExpr {
        let mut expr = LinearExpr::with_capacity(self.loans.len() * nf);
        for (i, loan) in self.loans.iter().enumerate() {
            let coef = loan.numeric(field).unwrap_or(0.0);
            for j in 0..nf {
                expr.add_term(VarId(i * nf + j), coef);
            }
        }
        expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::covenant::{Bound, PoolCovenant, PoolKind};
    use crate::core::facility::{Facility, FacilityId};
    use crate::optimization::model::Comparison;
    use crate::optimization::solver::{GoodLpSolver, MilpSolver, SolveOutcome};
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    fn loans() -> Vec<Loan> {
        vec![
            Loan::new("A", dec!(300)).with_credit_score(700.0),
            Loan::new("B", dec!(200)),
        ]
    }

    fn facilities() -> FacilitySet {
        let mut first = Facility::new(FacilityId::new(1), dec!(5), dec!(1000));
        first.add_pool_covenant(PoolCovenant::new(
            vec![1.0, 1.0],
            vec![1.0, 1.0],
            1.0,
            PoolKind::WeightedSum,
            Bound::AtMost,
        ));
        let second = Facility::new(FacilityId::new(2), dec!(7), dec!(250));
        [first, second].into_iter().collect()
    }

    fn find<'f>(f: &'f Formulation, name: &str) -> &'f Constraint {
        f.constraints()
            .iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("no constraint {}", name))
    }

    #[test]
    fn test_base_rows() {
        let loans = loans();
        let facilities = facilities();
        let matrix = EligibilityMatrix::from_rows(vec![vec![true, false], vec![true, true]]).unwrap();
        let builder = FormulationBuilder::new(&loans, &facilities, &matrix).unwrap();
        let step = builder.build(&OptimizationStep::maximize(1, LoanField::Amount), &[]);
        let f = &step.formulation;

        assert_eq!(f.num_variables(), 4);
        // 2 one-facility rows, 4 eligibility rows, 1 pool row
        assert_eq!(f.num_constraints(), 7);
        assert_relative_eq!(find(f, "eligible_0_1").rhs, 0.0);
        assert_relative_eq!(find(f, "pool_0_0").rhs, 1.0);
        assert_eq!(step.decision(1, 0), VarId(2));
        assert!(step.used_indicators().is_empty());
    }

    #[test]
    fn test_carry_forward_skips_cost_steps() {
        let loans = loans();
        let facilities = facilities();
        let matrix = EligibilityMatrix::build(&loans, &facilities);
        let builder = FormulationBuilder::new(&loans, &facilities, &matrix)
            .unwrap()
            .with_tolerance(0.01);
        let prior = [
            AchievedObjective {
                target: ObjectiveTarget::Loan(LoanField::Amount),
                value: 500.0,
            },
            AchievedObjective {
                target: ObjectiveTarget::FacilityCost,
                value: 5.0,
            },
        ];
        let step = builder.build(&OptimizationStep::maximize(3, LoanField::CreditScore), &prior);
        let carry = find(&step.formulation, "carry_forward_0");
        assert_eq!(carry.comparison, Comparison::Ge);
        assert_relative_eq!(carry.rhs, 499.99);
        assert!(step
            .formulation
            .constraints()
            .iter()
            .all(|c| c.name != "carry_forward_1"));
        // B has no credit score and contributes nothing
        assert_eq!(step.formulation.objective().expr.terms.len(), 2);
    }

    #[test]
    fn test_facility_cost_objective() {
        let loans = loans();
        let facilities = facilities();
        let matrix = EligibilityMatrix::build(&loans, &facilities);
        let builder = FormulationBuilder::new(&loans, &facilities, &matrix).unwrap();
        let step = builder.build(&OptimizationStep::minimize_cost(1), &[]);
        assert_eq!(step.used_indicators().len(), 2);
        assert_eq!(step.formulation.num_variables(), 6);
        let link = find(&step.formulation, "facility_used_1");
        assert!(link.expr.terms.contains(&(step.used_indicators()[1], -2.0)));
        let objective = &step.formulation.objective().expr;
        assert!(objective.terms.contains(&(step.used_indicators()[0], 5.0)));
        assert!(objective.terms.contains(&(step.used_indicators()[1], 7.0)));
    }

    #[test]
    fn test_capacity_rows_only_when_enabled() {
        let loans = loans();
        let facilities = facilities();
        let matrix = EligibilityMatrix::build(&loans, &facilities);
        let step = OptimizationStep::maximize(1, LoanField::Amount);

        let off = FormulationBuilder::new(&loans, &facilities, &matrix).unwrap().build(&step, &[]);
        assert!(off.formulation.constraints().iter().all(|c| !c.name.starts_with("capacity")));

        let on = FormulationBuilder::new(&loans, &facilities, &matrix)
            .unwrap()
            .with_capacity_limits(true)
            .build(&step, &[]);
        assert_relative_eq!(find(&on.formulation, "capacity_1").rhs, 250.0);
    }

    #[test]
    fn test_overfull_facility_closes_without_blocking_others() {
        let loans = loans();
        let mut full = Facility::new(FacilityId::new(1), dec!(1), dec!(50));
        full.commit_loans([Loan::new("OLD", dec!(80))]);
        let open = Facility::new(FacilityId::new(2), dec!(1), dec!(1000));
        let facilities: FacilitySet = [full, open].into_iter().collect();
        let matrix = EligibilityMatrix::build(&loans, &facilities);

        let step = FormulationBuilder::new(&loans, &facilities, &matrix)
            .unwrap()
            .with_capacity_limits(true)
            .build(&OptimizationStep::maximize(1, LoanField::Amount), &[]);
        assert_relative_eq!(find(&step.formulation, "capacity_0").rhs, 0.0);

        let (values, objective) = match GoodLpSolver::new().solve(&step.formulation) {
            SolveOutcome::Optimal { values, objective } => (values, objective),
            other => panic!("expected an optimal solve, got {:?}", other),
        };
        assert_relative_eq!(objective, 500.0, epsilon = 1e-6);
        assert_eq!(
            step.assignments(&values),
            vec![Assignment::new(0, 1), Assignment::new(1, 1)]
        );
    }

    #[test]
    fn test_at_least_covenant_is_flipped() {
        let loans = loans();
        let mut facility = Facility::new(FacilityId::new(1), dec!(0), dec!(0));
        facility.add_pool_covenant(PoolCovenant::new(
            vec![2.0, 3.0],
            vec![1.0, 1.0],
            4.0,
            PoolKind::WeightedSum,
            Bound::AtLeast,
        ));
        let facilities: FacilitySet = [facility].into_iter().collect();
        let matrix = EligibilityMatrix::build(&loans, &facilities);
        let step = FormulationBuilder::new(&loans, &facilities, &matrix)
            .unwrap()
            .build(&OptimizationStep::maximize(1, LoanField::Amount), &[]);
        let row = find(&step.formulation, "pool_0_0");
        assert_eq!(row.expr.terms, vec![(VarId(0), -2.0), (VarId(1), -3.0)]);
        assert_relative_eq!(row.rhs, -4.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let loans = loans();
        let facilities = facilities();
        let matrix = EligibilityMatrix::from_rows(vec![vec![true, true]]).unwrap();
        assert!(matches!(
            FormulationBuilder::new(&loans, &facilities, &matrix),
            Err(EngineError::MatrixShape { rows: 1, loans: 2, .. })
        ));
    }

    #[test]
    fn test_coefficient_length_mismatch() {
        let loans = loans();
        let mut facility = Facility::new(FacilityId::new(1), dec!(0), dec!(0));
        facility.add_pool_covenant(PoolCovenant::new(
            vec![1.0],
            vec![1.0],
            1.0,
            PoolKind::WeightedSum,
            Bound::AtMost,
        ));
        let facilities: FacilitySet = [facility].into_iter().collect();
        let matrix = EligibilityMatrix::build(&loans, &facilities);
        assert!(matches!(
            FormulationBuilder::new(&loans, &facilities, &matrix),
            Err(EngineError::CoefficientLength { facility: 0, covenant: 0, len: 1, loans: 2 })
        ));
    }

    #[test]
    fn test_assignments_round_half() {
        let loans = loans();
        let facilities = facilities();
        let matrix = EligibilityMatrix::build(&loans, &facilities);
        let step = FormulationBuilder::new(&loans, &facilities, &matrix)
            .unwrap()
            .build(&OptimizationStep::maximize(1, LoanField::Amount), &[]);
        let values = [0.0, 0.9999, 0.4, 0.0];
        assert_eq!(step.assignments(&values), vec![Assignment::new(0, 1)]);
    }
}
