//! Synthetic loan populations and pre-allocated ledgers for demos,
//! benchmarks and tests.

use crate::core::facility::FacilityId;
use crate::core::ledger::HistoricalLedger;
use crate::core::loan::Loan;
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Shape of a generated loan population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanGenConfig {
    pub count: usize,
    pub seed: Option<u64>,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub states: Vec<String>,
    /// Share of loans with no primary credit score.
    pub missing_score_rate: f64,
}

impl Default for LoanGenConfig {
    fn default() -> Self {
        Self {
            count: 200,
            seed: None,
            min_amount: Decimal::from(50_000),
            max_amount: Decimal::from(800_000),
            states: ["CA", "TX", "FL", "NY", "WA", "IL", "AZ", "CO"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            missing_score_rate: 0.02,
        }
    }
}

impl LoanGenConfig {
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Generate a random loan population.
pub fn generate_random_loans(config: &LoanGenConfig) -> Vec<Loan> {
    let mut rng = rng_for(config.seed);
    let min = config.min_amount.ceil().to_i64().unwrap_or(50_000);
    let max = config.max_amount.trunc().to_i64().unwrap_or(800_000);
    let (lo, hi) = if min < max { (min, max) } else { (min, min + 1) };

    (0..config.count)
        .map(|i| {
            // whole thousands, like agency loan tapes
            let amount = Decimal::from(rng.gen_range(lo..hi) / 1000 * 1000);
            let ltv = (rng.gen_range(50.0..97.0_f64) * 10.0).round() / 10.0;
            let rate = (rng.gen_range(3.0..8.5_f64) * 1000.0).round() / 1000.0;
            let term = *[180.0, 240.0, 360.0].choose(&mut rng).unwrap_or(&360.0);
            let state = config
                .states
                .choose(&mut rng)
                .cloned()
                .unwrap_or_else(|| "CA".to_string());

            let mut loan = Loan::new(format!("SIM-{:06}", i + 1), amount)
                .with_channel(*["R", "B", "C"].choose(&mut rng).unwrap_or(&"R"))
                .with_rate(rate)
                .with_term(term)
                .with_ltv(ltv)
                .with_dti(rng.gen_range(10..50) as f64)
                .with_first_time_buyer(rng.gen_bool(0.25))
                .with_purpose(*["P", "R", "C"].choose(&mut rng).unwrap_or(&"P"))
                .with_property(*["SF", "CO", "PU"].choose(&mut rng).unwrap_or(&"SF"), 1.0)
                .with_occupancy(*["P", "S", "I"].choose(&mut rng).unwrap_or(&"P"))
                .with_state(state)
                .with_zip3(format!("{:03}", rng.gen_range(100..1000)));

            if !rng.gen_bool(config.missing_score_rate.clamp(0.0, 1.0)) {
                loan = loan.with_credit_score(rng.gen_range(580..=820) as f64);
            }
            if ltv > 80.0 {
                loan = loan.with_mortgage_insurance(if ltv > 90.0 { 30.0 } else { 25.0 }, "1");
            }
            loan
        })
        .collect()
}

/// How a sample is divided into candidates and a pre-allocated ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub sample_size: usize,
    pub seed: Option<u64>,
    pub max_ltv: f64,
    pub min_credit_score: f64,
    pub min_rate: f64,
    /// The two facilities the pre-allocated loans are split across.
    pub facilities: (FacilityId, FacilityId),
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_size: 200,
            seed: None,
            max_ltv: 90.0,
            min_credit_score: 600.0,
            min_rate: 6.0,
            facilities: (FacilityId::new(1), FacilityId::new(2)),
        }
    }
}

/// Candidates plus a ledger of loans treated as already committed.
#[derive(Debug, Clone, PartialEq)]
pub struct PreallocatedSplit {
    pub candidates: Vec<Loan>,
    pub ledger: HistoricalLedger,
}

impl SamplingConfig {
    fn qualifies(&self, loan: &Loan) -> bool {
        loan.ltv() <= self.max_ltv
            && loan.credit_score().is_some_and(|s| s >= self.min_credit_score)
            && loan.rate() >= self.min_rate
    }
}

/// Sample loans, keep the second half as candidates and turn the
/// qualifying part of the first half into a ledger split across two
/// facilities.
pub fn split_preallocated(loans: &[Loan], config: &SamplingConfig) -> PreallocatedSplit {
    let mut rng = rng_for(config.seed);
    let n = config.sample_size.min(loans.len());
    let sample: Vec<&Loan> = index::sample(&mut rng, loans.len(), n)
        .into_iter()
        .map(|i| &loans[i])
        .collect();

    let (head, tail) = sample.split_at(n / 2);
    let qualified: Vec<&Loan> = head.iter().copied().filter(|l| config.qualifies(l)).collect();
    let half = qualified.len() / 2;

    let mut ledger = HistoricalLedger::new();
    for (k, loan) in qualified.into_iter().enumerate() {
        let facility = if k < half {
            config.facilities.0
        } else {
            config.facilities.1
        };
        ledger.record(facility, loan.clone());
    }

    PreallocatedSplit {
        candidates: tail.iter().map(|l| (*l).clone()).collect(),
        ledger,
    }
}
