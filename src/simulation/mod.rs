//! Synthetic data for demos and benchmarks.

pub mod sampling;

pub use sampling::{generate_random_loans, split_preallocated, LoanGenConfig, PreallocatedSplit, SamplingConfig};
