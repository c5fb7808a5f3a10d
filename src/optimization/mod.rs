//! Eligibility, formulation and the sequential MILP engine.

pub mod assignment;
pub mod eligibility;
pub mod formulation;
pub mod model;
pub mod sequential;
pub mod solver;
pub mod step;
pub mod utilization;

pub use assignment::{apply_assignments, Assignment};
pub use eligibility::EligibilityMatrix;
pub use sequential::{AllocationOutcome, EngineConfig, SequentialOptimizer};
pub use solver::{GoodLpSolver, MilpSolver, SolveOutcome, SolveStatus};
pub use step::{ObjectiveTarget, OptimizationStep};
