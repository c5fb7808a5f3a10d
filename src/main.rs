//! facility-allocator CLI
//!
//! Run covenant-aware loan allocation from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Allocate candidate loans and write the updated ledger
//! facility-allocator allocate --loans loans.csv --config facilities.csv \
//!     --order order.csv --ledger ledger.csv --output ledger_next.csv
//!
//! # Inspect which facilities accept which loans
//! facility-allocator eligibility --loans loans.csv --config facilities.csv
//!
//! # Generate a synthetic loan table and a pre-allocated ledger
//! facility-allocator generate --count 400 --seed 7 --output loans.csv --ledger-output ledger.csv
//! ```

use env_logger::Env;
use facility_allocator::compiler::CovenantCompiler;
use facility_allocator::core::ledger::HistoricalLedger;
use facility_allocator::optimization::eligibility::EligibilityMatrix;
use facility_allocator::optimization::sequential::EngineConfig;
use facility_allocator::pipeline::{run_allocation, AllocationInputs};
use facility_allocator::simulation::sampling::{
    generate_random_loans, split_preallocated, LoanGenConfig, SamplingConfig,
};
use facility_allocator::tables;
use std::process;
use std::time::Duration;

fn print_usage() {
    eprintln!(
        r#"facility-allocator: covenant-aware loan-to-facility allocation

USAGE:
    facility-allocator <COMMAND> [OPTIONS]

COMMANDS:
    allocate      Run the sequential optimization and commit assignments
    eligibility   Show the loan x facility eligibility matrix
    generate      Generate synthetic loans (for testing)
    help          Show this message

OPTIONS (allocate, eligibility):
    --loans <FILE>        Candidate loans CSV
    --config <FILE>       Facility/covenant configuration CSV
    --ledger <FILE>       Historical ledger CSV (missing file = empty)
    --format <FORMAT>     Output format: text (default) or json

OPTIONS (allocate):
    --order <FILE>        Optimization order CSV (Order, Type, Input)
    --output <FILE>       Where to write the updated ledger
    --tolerance <EPS>     Carry-forward tolerance (default: 1e-4)
    --time-limit <SECS>   Wall-clock limit per solver call
    --enforce-capacity    Cap new principal at remaining facility capacity

OPTIONS (generate):
    --count <N>           Number of loans (default: 200)
    --seed <N>            RNG seed
    --output <FILE>       Write loans to file instead of stdout
    --ledger-output <FILE>
                          Also sample a pre-allocated ledger; the loans
                          table then holds only the remaining candidates

Logging follows RUST_LOG (default: info).

EXAMPLES:
    facility-allocator allocate --loans loans.csv --config facilities.csv --order order.csv
    facility-allocator allocate --loans loans.csv --config facilities.csv --order order.csv \
        --ledger ledger.csv --output ledger.csv --time-limit 60 --format json
    facility-allocator eligibility --loans loans.csv --config facilities.csv
    facility-allocator generate --count 400 --seed 7 --output loans.csv"#
    );
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

fn value_of(args: &[String], i: usize, flag: &str, what: &str) -> String {
    args.get(i).cloned().unwrap_or_else(|| {
        eprintln!("{} requires {}", flag, what);
        process::exit(1);
    })
}

#[derive(Default)]
struct TableArgs {
    loans: Option<String>,
    config: Option<String>,
    order: Option<String>,
    ledger: Option<String>,
    output: Option<String>,
    format: String,
    engine: EngineConfig,
}

fn parse_table_args(args: &[String], allocate: bool) -> TableArgs {
    let mut parsed = TableArgs {
        format: "text".to_string(),
        ..Default::default()
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--loans" => {
                i += 1;
                parsed.loans = Some(value_of(args, i, "--loans", "a file path"));
            }
            "--config" => {
                i += 1;
                parsed.config = Some(value_of(args, i, "--config", "a file path"));
            }
            "--ledger" => {
                i += 1;
                parsed.ledger = Some(value_of(args, i, "--ledger", "a file path"));
            }
            "--format" => {
                i += 1;
                parsed.format = value_of(args, i, "--format", "'text' or 'json'");
            }
            "--order" if allocate => {
                i += 1;
                parsed.order = Some(value_of(args, i, "--order", "a file path"));
            }
            "--output" if allocate => {
                i += 1;
                parsed.output = Some(value_of(args, i, "--output", "a file path"));
            }
            "--tolerance" if allocate => {
                i += 1;
                let eps: f64 = value_of(args, i, "--tolerance", "a number")
                    .parse()
                    .unwrap_or_else(|_| fail("--tolerance requires a number"));
                parsed.engine.tolerance = eps;
            }
            "--time-limit" if allocate => {
                i += 1;
                let secs: f64 = value_of(args, i, "--time-limit", "seconds")
                    .parse()
                    .ok()
                    .filter(|s: &f64| s.is_finite() && *s > 0.0)
                    .unwrap_or_else(|| fail("--time-limit requires a positive number of seconds"));
                parsed.engine.time_limit = Some(Duration::from_secs_f64(secs));
            }
            "--enforce-capacity" if allocate => {
                parsed.engine.enforce_capacity = true;
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }
    parsed
}

fn require(value: &Option<String>, flag: &str) -> String {
    value
        .clone()
        .unwrap_or_else(|| fail(format!("{} <FILE> is required", flag)))
}

fn load_ledger(path: &Option<String>) -> HistoricalLedger {
    match path {
        Some(p) => tables::load_ledger(p).unwrap_or_else(|e| fail(e)),
        None => HistoricalLedger::new(),
    }
}

fn cmd_allocate(args: &[String]) {
    let parsed = parse_table_args(args, true);
    let inputs = AllocationInputs {
        loans: tables::load_loans(require(&parsed.loans, "--loans")).unwrap_or_else(|e| fail(e)),
        config: tables::load_config(require(&parsed.config, "--config")).unwrap_or_else(|e| fail(e)),
        order: tables::load_order(require(&parsed.order, "--order")).unwrap_or_else(|e| fail(e)),
        ledger: load_ledger(&parsed.ledger),
    };

    let run = run_allocation(&inputs, parsed.engine.solver(), &parsed.engine)
        .unwrap_or_else(|e| fail(e));

    if let Some(path) = &parsed.output {
        tables::save_ledger(path, &run.ledger).unwrap_or_else(|e| fail(e));
        eprintln!("Wrote {} ledger rows → {}", run.ledger.len(), path);
    }

    if parsed.format == "json" {
        println!("{}", run.report.to_json().unwrap_or_else(|e| fail(e)));
    } else {
        println!("{}", run.report);
    }
}

#[derive(serde::Serialize)]
struct EligibilityRow {
    loan_id: String,
    facilities: Vec<u32>,
}

fn cmd_eligibility(args: &[String]) {
    let parsed = parse_table_args(args, false);
    let loans = tables::load_loans(require(&parsed.loans, "--loans")).unwrap_or_else(|e| fail(e));
    let config = tables::load_config(require(&parsed.config, "--config")).unwrap_or_else(|e| fail(e));
    let ledger = load_ledger(&parsed.ledger);

    let compilation = CovenantCompiler::new(&ledger, &loans)
        .compile(&config)
        .unwrap_or_else(|e| fail(e));
    let facilities = compilation.facilities;
    let matrix = EligibilityMatrix::build(&loans, &facilities);

    let rows: Vec<EligibilityRow> = loans
        .iter()
        .enumerate()
        .map(|(i, loan)| EligibilityRow {
            loan_id: loan.loan_id().to_string(),
            facilities: matrix
                .eligible_facilities(i)
                .into_iter()
                .filter_map(|j| facilities.get(j).map(|f| f.id().number()))
                .collect(),
        })
        .collect();

    if parsed.format == "json" {
        println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_else(|e| fail(e)));
        return;
    }

    println!("=== Eligibility ({} loans x {} facilities) ===", loans.len(), facilities.len());
    for row in &rows {
        let ids: Vec<String> = row.facilities.iter().map(|n| n.to_string()).collect();
        let shown = if ids.is_empty() { "-".to_string() } else { ids.join(", ") };
        println!("  {:<16} {}", row.loan_id, shown);
    }
    println!("\nEligible loans per facility:");
    for (facility, count) in facilities.iter().zip(matrix.eligible_counts()) {
        println!("  Facility {}: {}", facility.id(), count);
    }
    let orphans = matrix.orphans();
    if !orphans.is_empty() {
        println!("\n{} loans have no eligible facility", orphans.len());
    }
}

fn cmd_generate(args: &[String]) {
    let mut gen = LoanGenConfig::default();
    let mut output_path: Option<String> = None;
    let mut ledger_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--count" => {
                i += 1;
                gen.count = value_of(args, i, "--count", "a number")
                    .parse()
                    .unwrap_or_else(|_| fail("--count requires a number"));
            }
            "--seed" => {
                i += 1;
                gen.seed = Some(
                    value_of(args, i, "--seed", "a number")
                        .parse()
                        .unwrap_or_else(|_| fail("--seed requires a number")),
                );
            }
            "--output" => {
                i += 1;
                output_path = Some(value_of(args, i, "--output", "a file path"));
            }
            "--ledger-output" => {
                i += 1;
                ledger_path = Some(value_of(args, i, "--ledger-output", "a file path"));
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let mut loans = generate_random_loans(&gen);

    if let Some(path) = &ledger_path {
        let split = split_preallocated(
            &loans,
            &SamplingConfig {
                sample_size: loans.len(),
                seed: gen.seed,
                ..Default::default()
            },
        );
        tables::save_ledger(path, &split.ledger).unwrap_or_else(|e| fail(e));
        eprintln!("Pre-allocated {} loans → {}", split.ledger.len(), path);
        loans = split.candidates;
    }

    match output_path {
        Some(path) => {
            tables::save_loans(&path, &loans).unwrap_or_else(|e| fail(e));
            eprintln!("Generated {} loans → {}", loans.len(), path);
        }
        None => {
            tables::write_loans(std::io::stdout().lock(), &loans).unwrap_or_else(|e| fail(e));
        }
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "allocate" => cmd_allocate(rest),
        "eligibility" => cmd_eligibility(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
