use criterion::{black_box, criterion_group, criterion_main, Criterion};
use facility_allocator::compiler::directive::ConfigRow;
use facility_allocator::compiler::CovenantCompiler;
use facility_allocator::core::facility::FacilitySet;
use facility_allocator::core::ledger::HistoricalLedger;
use facility_allocator::core::loan::{Loan, LoanField};
use facility_allocator::optimization::eligibility::EligibilityMatrix;
use facility_allocator::optimization::sequential::{EngineConfig, SequentialOptimizer};
use facility_allocator::optimization::step::OptimizationStep;
use facility_allocator::simulation::sampling::{generate_random_loans, LoanGenConfig};

fn bench_config() -> Vec<ConfigRow> {
    vec![
        ConfigRow::facility(1, "250", "50000000"),
        ConfigRow::asset(1, "state", "!=", "NY"),
        ConfigRow::asset(1, "CSCORE_B", ">=", "700").with_gates("oltv", ">=", "80"),
        ConfigRow::pool(1, "CSCORE_B", "orig_amt", "720", 0, 1),
        ConfigRow::facility(2, "400", "50000000"),
        ConfigRow::asset(2, "oltv", "<=", "90"),
        ConfigRow::pool(2, "(occ_stat == 'I') * orig_amt", "1", "2000000", 1, 0),
        ConfigRow::facility(3, "600", "50000000"),
    ]
}

fn setup(count: usize) -> (Vec<Loan>, FacilitySet) {
    let loans = generate_random_loans(&LoanGenConfig::default().with_count(count).with_seed(42));
    // missing scores would drop the ratio covenant, so fill them in
    let loans: Vec<Loan> = loans
        .into_iter()
        .map(|l| {
            if l.credit_score().is_none() {
                l.with_credit_score(700.0)
            } else {
                l
            }
        })
        .collect();
    let facilities = CovenantCompiler::new(&HistoricalLedger::new(), &loans)
        .compile(&bench_config())
        .map(|c| c.facilities)
        .unwrap_or_default();
    (loans, facilities)
}

fn bench_compile_1000_loans(c: &mut Criterion) {
    let (loans, _) = setup(1000);
    let ledger = HistoricalLedger::new();
    let config = bench_config();

    c.bench_function("compile_1000_loans", |b| {
        b.iter(|| CovenantCompiler::new(black_box(&ledger), black_box(&loans)).compile(&config))
    });
}

fn bench_eligibility_1000_loans(c: &mut Criterion) {
    let (loans, facilities) = setup(1000);

    c.bench_function("eligibility_1000_loans", |b| {
        b.iter(|| EligibilityMatrix::build(black_box(&loans), black_box(&facilities)))
    });
}

fn bench_sequential_20_loans(c: &mut Criterion) {
    let (loans, facilities) = setup(20);
    let matrix = EligibilityMatrix::build(&loans, &facilities);
    let steps = vec![
        OptimizationStep::maximize(1, LoanField::Amount),
        OptimizationStep::minimize_cost(2),
    ];
    let optimizer = SequentialOptimizer::with_config(EngineConfig::default());

    let mut group = c.benchmark_group("sequential");
    group.sample_size(10);
    group.bench_function("sequential_20_loans", |b| {
        b.iter(|| optimizer.run(black_box(&loans), &facilities, &matrix, &steps))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_compile_1000_loans,
    bench_eligibility_1000_loans,
    bench_sequential_20_loans
);
criterion_main!(benches);
