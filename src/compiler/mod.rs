//! Covenant compiler: configuration rows in, facilities with typed
//! covenants out.

pub mod covenant_compiler;
pub mod directive;
pub mod expression;

pub use covenant_compiler::{Compilation, CompileSummary, CovenantCompiler, SkipReason, SkippedRow};
