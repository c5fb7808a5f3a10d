//! Two-run allocation walkthrough.
//!
//! Generates a synthetic loan tape, treats part of it as already held by
//! two facilities, allocates the rest across three facilities, then feeds
//! the updated ledger into a second run.

use facility_allocator::compiler::directive::ConfigRow;
use facility_allocator::core::loan::LoanField;
use facility_allocator::optimization::sequential::EngineConfig;
use facility_allocator::optimization::step::OptimizationStep;
use facility_allocator::pipeline::{run_allocation, AllocationInputs};
use facility_allocator::simulation::sampling::{
    generate_random_loans, split_preallocated, LoanGenConfig, SamplingConfig,
};
use std::time::Duration;

fn facilities() -> Vec<ConfigRow> {
    vec![
        // Facility 1: no NY loans, high-LTV loans need a 700 score,
        // amount-weighted average score at least 720, at most 8 loans
        ConfigRow::facility(1, "250", "6000000"),
        ConfigRow::asset(1, "state", "!=", "NY"),
        ConfigRow::asset(1, "CSCORE_B", ">=", "700").with_gates("oltv", ">=", "80"),
        ConfigRow::pool(1, "CSCORE_B", "orig_amt", "720", 0, 1),
        ConfigRow::pool(1, "1", "1", "8", 1, 0),
        // Facility 2: owner-occupied and second homes up to 90 LTV
        ConfigRow::facility(2, "400", "8000000"),
        ConfigRow::asset(2, "occ_stat", "!=", "I"),
        ConfigRow::asset(2, "oltv", "<=", "90"),
        // Facility 3: expensive catch-all
        ConfigRow::facility(3, "900", "20000000"),
    ]
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("╔════════════════════════════════════════════════╗");
    println!("║  facility-allocator: Two-Run Allocation Demo   ║");
    println!("╚════════════════════════════════════════════════╝\n");

    let tape: Vec<_> = generate_random_loans(&LoanGenConfig::default().with_count(60).with_seed(21))
        .into_iter()
        .filter(|l| l.credit_score().is_some())
        .collect();
    let split = split_preallocated(
        &tape,
        &SamplingConfig {
            sample_size: 48,
            seed: Some(21),
            ..Default::default()
        },
    );
    println!(
        "Loan tape: {} loans, {} already held, {} candidates\n",
        tape.len(),
        split.ledger.len(),
        split.candidates.len()
    );

    let (first_batch, second_batch) = split.candidates.split_at(split.candidates.len() / 2);
    let order = vec![
        OptimizationStep::maximize(1, LoanField::Amount),
        OptimizationStep::maximize(2, LoanField::CreditScore),
        OptimizationStep::minimize_cost(3),
    ];
    let engine = EngineConfig::default().with_time_limit(Duration::from_secs(30));

    // --- Run 1 ---
    println!("━━━ Run 1 ━━━\n");
    let first = match run_allocation(
        &AllocationInputs {
            loans: first_batch.to_vec(),
            config: facilities(),
            order: order.clone(),
            ledger: split.ledger.clone(),
        },
        engine.solver(),
        &engine,
    ) {
        Ok(run) => run,
        Err(e) => {
            eprintln!("run 1 failed: {}", e);
            std::process::exit(1);
        }
    };
    println!("{}", first.report);

    // --- Run 2 sees everything run 1 committed ---
    println!("━━━ Run 2 ━━━\n");
    let second = match run_allocation(
        &AllocationInputs {
            loans: second_batch.to_vec(),
            config: facilities(),
            order,
            ledger: first.ledger.clone(),
        },
        engine.solver(),
        &engine,
    ) {
        Ok(run) => run,
        Err(e) => {
            eprintln!("run 2 failed: {}", e);
            std::process::exit(1);
        }
    };
    println!("{}", second.report);

    println!(
        "Ledger grew {} → {} → {} loans",
        split.ledger.len(),
        first.ledger.len(),
        second.ledger.len()
    );
}
