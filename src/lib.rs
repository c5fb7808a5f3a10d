//! # facility-allocator
//!
//! Covenant-aware allocation of candidate loans into financing facilities.
//!
//! Facilities carry asset covenants (per-loan eligibility rules) and pool
//! covenants (aggregate linear constraints over everything a facility
//! holds). Loans are placed by a sequence of mixed-integer programs solved
//! in priority order, each holding earlier objectives at their achieved
//! values.
//!
//! ## Architecture
//!
//! - **core**: loans, facilities, covenants, the historical ledger, errors
//! - **compiler**: configuration rows to typed covenants, with a closed
//!   coefficient-expression language
//! - **optimization**: eligibility matrix, formulation, solver adapter,
//!   sequential engine, assignment application, utilization
//! - **tables**: CSV input and output
//! - **pipeline**: one complete allocation run
//! - **simulation**: synthetic loan populations

pub mod compiler;
pub mod core;
pub mod optimization;
pub mod pipeline;
pub mod simulation;
pub mod tables;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::compiler::directive::ConfigRow;
    pub use crate::compiler::CovenantCompiler;
    pub use crate::core::covenant::{AssetCovenant, Bound, Condition, PoolCovenant, PoolKind};
    pub use crate::core::error::AllocationError;
    pub use crate::core::facility::{Facility, FacilityId, FacilitySet};
    pub use crate::core::ledger::HistoricalLedger;
    pub use crate::core::loan::{Loan, LoanField};
    pub use crate::core::value::{AttrValue, Operator};
    pub use crate::optimization::{
        apply_assignments, AllocationOutcome, Assignment, EligibilityMatrix, EngineConfig,
        GoodLpSolver, MilpSolver, OptimizationStep, SequentialOptimizer,
    };
    pub use crate::pipeline::{run_allocation, AllocationInputs, AllocationReport};
}
