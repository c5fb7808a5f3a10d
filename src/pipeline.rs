use crate::compiler::directive::ConfigRow;
use crate::compiler::{CompileSummary, CovenantCompiler};
use crate::core::error::{AllocationError, LoadError};
use crate::core::facility::{FacilityId, FacilitySet};
use crate::core::ledger::HistoricalLedger;
use crate::core::loan::Loan;
use crate::optimization::assignment::apply_assignments;
use crate::optimization::eligibility::EligibilityMatrix;
use crate::optimization::model::Sense;
use crate::optimization::sequential::{
    AllocationOutcome, EngineConfig, SequentialOptimizer, StepFailure,
};
use crate::optimization::solver::MilpSolver;
use crate::optimization::step::{ObjectiveTarget, OptimizationStep};
use crate::optimization::utilization::UtilizationReport;
use crate::tables;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// The four tables a run consumes.
#[derive(Debug, Clone, Default)]
pub struct AllocationInputs {
    pub loans: Vec<Loan>,
    pub config: Vec<ConfigRow>,
    pub order: Vec<OptimizationStep>,
    pub ledger: HistoricalLedger,
}

impl AllocationInputs {
    /// Read every table from disk. A missing ledger file means an empty one.
    pub fn load(
        loans: impl AsRef<Path>,
        config: impl AsRef<Path>,
        order: impl AsRef<Path>,
        ledger: impl AsRef<Path>,
    ) -> Result<Self, LoadError> {
        Ok(Self {
            loans: tables::load_loans(loans)?,
            config: tables::load_config(config)?,
            order: tables::load_order(order)?,
            ledger: tables::load_ledger(ledger)?,
        })
    }
}

/// Objective value reached by one solved step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepObjective {
    pub order: i64,
    pub sense: Sense,
    pub target: ObjectiveTarget,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedLoan {
    pub loan_id: String,
    pub facility: FacilityId,
}

/// Authoritative-step statistics for one facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilitySummary {
    pub facility: FacilityId,
    pub num_loans: usize,
    pub total_amount: Decimal,
    pub avg_credit_score: Option<f64>,
}

/// Everything a run reports, in a form that serializes cleanly.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub solver: String,
    pub objectives: Vec<StepObjective>,
    pub failed_steps: Vec<StepFailure>,
    pub assignments: Vec<PlacedLoan>,
    pub unassigned: Vec<String>,
    /// Loans no facility's asset covenants accept.
    pub ineligible: Vec<String>,
    pub facility_stats: Vec<FacilitySummary>,
    pub utilization: UtilizationReport,
    pub compile: CompileSummary,
}

impl AllocationReport {
    fn new(
        solver: &str,
        loans: &[Loan],
        facilities: &FacilitySet,
        matrix: &EligibilityMatrix,
        outcome: &AllocationOutcome,
        compile: CompileSummary,
    ) -> Self {
        let facility_id = |j: usize| facilities.get(j).map(|f| f.id()).unwrap_or_default();
        let loan_id = |i: usize| loans[i].loan_id().to_string();

        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            solver: solver.to_string(),
            objectives: outcome
                .steps
                .iter()
                .map(|s| StepObjective {
                    order: s.step.order,
                    sense: s.step.sense,
                    target: s.step.target,
                    value: s.objective_value,
                })
                .collect(),
            failed_steps: outcome.failures.clone(),
            assignments: outcome
                .assignments()
                .iter()
                .map(|a| PlacedLoan {
                    loan_id: loan_id(a.loan),
                    facility: facility_id(a.facility),
                })
                .collect(),
            unassigned: outcome.unassigned().into_iter().map(loan_id).collect(),
            ineligible: matrix.orphans().into_iter().map(loan_id).collect(),
            facility_stats: outcome
                .facility_stats()
                .iter()
                .map(|s| FacilitySummary {
                    facility: facility_id(s.facility),
                    num_loans: s.num_loans,
                    total_amount: s.total_amount,
                    avg_credit_score: s.avg_credit_score,
                })
                .collect(),
            utilization: UtilizationReport::new(facilities, loans, outcome.assignments()),
            compile,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for AllocationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Allocation Run {} ===", self.run_id)?;
        writeln!(f, "Generated:   {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "Solver:      {}", self.solver)?;
        writeln!(
            f,
            "Covenants:   {} asset, {} pool, {} rows skipped",
            self.compile.asset_covenants,
            self.compile.pool_covenants,
            self.compile.skipped.len()
        )?;
        for skip in &self.compile.skipped {
            writeln!(f, "  row {} (facility {}): {}", skip.row, skip.facility, skip.reason)?;
        }

        writeln!(f, "\nObjectives:")?;
        for obj in &self.objectives {
            writeln!(f, "  {:>3}. {} {:<12} {:.4}", obj.order, obj.sense, obj.target.to_string(), obj.value)?;
        }
        for failed in &self.failed_steps {
            writeln!(f, "  {} -> {}", failed.step, failed.status)?;
        }

        writeln!(f, "\nAssigned:    {}", self.assignments.len())?;
        writeln!(f, "Unassigned:  {}", self.unassigned.len())?;
        if !self.ineligible.is_empty() {
            writeln!(f, "Ineligible:  {}", self.ineligible.join(", "))?;
        }
        for stats in &self.facility_stats {
            let score = stats
                .avg_credit_score
                .map_or_else(|| "-".to_string(), |s| format!("{:.1}", s));
            writeln!(
                f,
                "  Facility {}: {} loans, principal {}, avg credit {}",
                stats.facility, stats.num_loans, stats.total_amount, score
            )?;
        }

        writeln!(f)?;
        write!(f, "{}", self.utilization)
    }
}

/// Result of a full run: the report, the facilities with updated ledgers,
/// and the ledger table to persist for the next run.
#[derive(Debug, Clone)]
pub struct AllocationRun {
    pub report: AllocationReport,
    pub outcome: AllocationOutcome,
    pub facilities: FacilitySet,
    pub ledger: HistoricalLedger,
}

/// Compile, load the ledger, optimize and commit the authoritative
/// assignments exactly once. Ledger rows for unconfigured facilities are
/// carried into the exported ledger unchanged.
pub fn run_allocation<S: MilpSolver>(
    inputs: &AllocationInputs,
    solver: S,
    config: &EngineConfig,
) -> Result<AllocationRun, AllocationError> {
    let compilation = CovenantCompiler::new(&inputs.ledger, &inputs.loans).compile(&inputs.config)?;
    let mut facilities = compilation.facilities;

    let loaded = inputs.ledger.load_into(&mut facilities);
    log::info!(
        "{} facilities configured, {} ledger loans loaded, {} candidates",
        facilities.len(),
        loaded,
        inputs.loans.len()
    );

    let matrix = EligibilityMatrix::build(&inputs.loans, &facilities);
    let solver_name = solver.name().to_string();
    let outcome = SequentialOptimizer::new(solver, config.clone()).run(
        &inputs.loans,
        &facilities,
        &matrix,
        &inputs.order,
    )?;

    apply_assignments(outcome.assignments(), &inputs.loans, &mut facilities)?;
    let mut ledger = HistoricalLedger::from_facilities(&facilities);
    ledger.extend(inputs.ledger.unplaced(&facilities));

    let report = AllocationReport::new(
        &solver_name,
        &inputs.loans,
        &facilities,
        &matrix,
        &outcome,
        compilation.summary,
    );

    Ok(AllocationRun {
        report,
        outcome,
        facilities,
        ledger,
    })
}
