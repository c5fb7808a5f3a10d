use crate::core::loan::{Loan, LoanField};
use crate::core::value::{AttrValue, Operator};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One `field <op> value` test against a loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: LoanField,
    pub operator: Operator,
    pub value: AttrValue,
}

impl Condition {
    pub fn new(field: LoanField, operator: Operator, value: impl Into<AttrValue>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
        }
    }

    pub fn holds(&self, loan: &Loan) -> bool {
        self.operator.apply(&loan.get(self.field), &self.value)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// A conditional per-loan eligibility rule.
///
/// The primary condition is enforced only for loans that satisfy *every*
/// critical gate. A loan that misses any gate is outside the rule's scope
/// and passes. With no gates the primary condition always applies.
///
/// # Examples
///
/// ```
/// use facility_allocator::core::covenant::{AssetCovenant, Condition};
/// use facility_allocator::core::loan::{Loan, LoanField};
/// use facility_allocator::core::value::Operator;
/// use rust_decimal_macros::dec;
///
/// // Investor properties must carry LTV <= 75.
/// let covenant = AssetCovenant::new(Condition::new(LoanField::Ltv, Operator::Le, 75.0))
///     .with_gate(Condition::new(LoanField::Occupancy, Operator::Eq, "I"));
///
/// let owner = Loan::new("A", dec!(100_000)).with_ltv(90.0).with_occupancy("P");
/// let investor = Loan::new("B", dec!(100_000)).with_ltv(90.0).with_occupancy("I");
/// assert!(covenant.check(&owner));
/// assert!(!covenant.check(&investor));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetCovenant {
    primary: Condition,
    gates: Vec<Condition>,
}

impl AssetCovenant {
    pub fn new(primary: Condition) -> Self {
        Self {
            primary,
            gates: Vec::new(),
        }
    }

    pub fn with_gate(mut self, gate: Condition) -> Self {
        self.gates.push(gate);
        self
    }

    pub fn with_gates(mut self, gates: impl IntoIterator<Item = Condition>) -> Self {
        self.gates.extend(gates);
        self
    }

    pub fn primary(&self) -> &Condition {
        &self.primary
    }

    pub fn gates(&self) -> &[Condition] {
        &self.gates
    }

    pub fn check(&self, loan: &Loan) -> bool {
        if self.gates.iter().all(|gate| gate.holds(loan)) {
            self.primary.holds(loan)
        } else {
            true
        }
    }
}

/// Aggregate shape of a pool covenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolKind {
    /// `Σ a·b / Σ b` compared against `c` (configured as `constr_type = 0`).
    Ratio,
    /// `Σ a·b` compared against `c` (configured as `constr_type = 1`).
    WeightedSum,
}

impl PoolKind {
    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(PoolKind::Ratio),
            1 => Some(PoolKind::WeightedSum),
            _ => None,
        }
    }
}

/// Direction of a pool covenant inequality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bound {
    /// Aggregate at most `c` (`constr_op = 0`).
    AtMost,
    /// Aggregate at least `c` (`constr_op = 1`).
    AtLeast,
}

impl Bound {
    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(Bound::AtMost),
            1 => Some(Bound::AtLeast),
            _ => None,
        }
    }

    /// Sign that turns the covenant into a `<=` row: 1 for at-most, -1 for at-least.
    pub fn flip_factor(&self) -> f64 {
        match self {
            Bound::AtMost => 1.0,
            Bound::AtLeast => -1.0,
        }
    }
}

/// An aggregate constraint over the loans a facility holds.
///
/// `a` and `b` carry one coefficient per candidate loan (in candidate
/// order); `a_e` and `b_e` carry one per loan already in the facility's
/// ledger, computed once when the covenant is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolCovenant {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    pub c: f64,
    pub kind: PoolKind,
    pub bound: Bound,
    pub a_e: Vec<f64>,
    pub b_e: Vec<f64>,
}

impl PoolCovenant {
    pub fn new(a: Vec<f64>, b: Vec<f64>, c: f64, kind: PoolKind, bound: Bound) -> Self {
        Self {
            a,
            b,
            c,
            kind,
            bound,
            a_e: Vec::new(),
            b_e: Vec::new(),
        }
    }

    /// Attach coefficient vectors for the existing ledger.
    pub fn with_existing(mut self, a_e: Vec<f64>, b_e: Vec<f64>) -> Self {
        self.a_e.extend(a_e);
        self.b_e.extend(b_e);
        self
    }

    /// Coefficient of candidate `i` on the left-hand side, before flipping.
    pub fn candidate_coefficient(&self, i: usize) -> f64 {
        match self.kind {
            PoolKind::WeightedSum => self.a[i] * self.b[i],
            PoolKind::Ratio => (self.a[i] - self.c) * self.b[i],
        }
    }

    /// Right-hand side of the unflipped inequality, with the ledger folded in.
    ///
    /// Weighted sum: `c - Σ a_e·b_e`. Ratio: `Σ (c - a_e)·b_e`.
    pub fn existing_rhs(&self) -> f64 {
        let pairs = self.a_e.iter().zip(&self.b_e);
        match self.kind {
            PoolKind::WeightedSum => self.c - pairs.map(|(a, b)| a * b).sum::<f64>(),
            PoolKind::Ratio => pairs.map(|(a, b)| (self.c - a) * b).sum(),
        }
    }

    /// Whether the pool formed by the ledger plus the selected candidates
    /// satisfies the covenant, within `tolerance`.
    pub fn satisfied_by(&self, selected: &[usize], tolerance: f64) -> bool {
        let lhs: f64 = selected
            .iter()
            .map(|&i| self.candidate_coefficient(i))
            .sum();
        let flip = self.bound.flip_factor();
        lhs * flip <= self.existing_rhs() * flip + tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ca_only() -> AssetCovenant {
        AssetCovenant::new(Condition::new(LoanField::State, Operator::Eq, "CA"))
    }

    #[test]
    fn test_primary_without_gates() {
        let covenant = ca_only();
        assert!(covenant.check(&Loan::new("1", dec!(1)).with_state("CA")));
        assert!(!covenant.check(&Loan::new("2", dec!(1)).with_state("NV")));
    }

    #[test]
    fn test_all_gates_must_hold() {
        let covenant = AssetCovenant::new(Condition::new(LoanField::CreditScore, Operator::Ge, 700.0))
            .with_gate(Condition::new(LoanField::Ltv, Operator::Ge, 80.0))
            .with_gate(Condition::new(LoanField::Purpose, Operator::Eq, "C"));

        let high_ltv_cashout = Loan::new("1", dec!(1))
            .with_ltv(85.0)
            .with_purpose("C")
            .with_credit_score(650.0);
        let high_ltv_purchase = Loan::new("2", dec!(1))
            .with_ltv(85.0)
            .with_purpose("P")
            .with_credit_score(650.0);

        assert!(!covenant.check(&high_ltv_cashout));
        assert!(covenant.check(&high_ltv_purchase));
    }

    #[test]
    fn test_unknown_operator_in_primary_rejects() {
        let covenant = AssetCovenant::new(Condition::new(
            LoanField::Ltv,
            Operator::parse("=<"),
            90.0,
        ));
        assert!(!covenant.check(&Loan::new("1", dec!(1)).with_ltv(50.0)));
    }

    #[test]
    fn test_unknown_operator_in_gate_exempts() {
        let covenant = ca_only().with_gate(Condition::new(LoanField::Ltv, Operator::parse("~"), 1.0));
        assert!(covenant.check(&Loan::new("1", dec!(1)).with_state("TX")));
    }

    #[test]
    fn test_ratio_with_empty_ledger_has_zero_rhs() {
        let covenant = PoolCovenant::new(
            vec![0.5, 0.9],
            vec![100.0, 200.0],
            0.8,
            PoolKind::Ratio,
            Bound::AtMost,
        );
        assert_eq!(covenant.existing_rhs(), 0.0);
        assert!((covenant.candidate_coefficient(0) - (-30.0)).abs() < 1e-9);
        assert!((covenant.candidate_coefficient(1) - 20.0).abs() < 1e-9);
        // (0.5*100 + 0.9*200) / 300 = 0.7667 <= 0.8
        assert!(covenant.satisfied_by(&[0, 1], 0.0));
        assert!(!covenant.satisfied_by(&[1], 0.0));
    }

    #[test]
    fn test_weighted_sum_with_ledger() {
        let covenant = PoolCovenant::new(
            vec![1.0, 1.0],
            vec![1.0, 1.0],
            3.0,
            PoolKind::WeightedSum,
            Bound::AtMost,
        )
        .with_existing(vec![1.0, 1.0], vec![1.0, 1.0]);
        assert_eq!(covenant.existing_rhs(), 1.0);
        assert!(covenant.satisfied_by(&[0], 0.0));
        assert!(!covenant.satisfied_by(&[0, 1], 0.0));
    }

    #[test]
    fn test_at_least_flips() {
        let covenant = PoolCovenant::new(
            vec![700.0, 600.0],
            vec![1.0, 1.0],
            650.0,
            PoolKind::Ratio,
            Bound::AtLeast,
        );
        assert_eq!(covenant.bound.flip_factor(), -1.0);
        assert!(covenant.satisfied_by(&[0], 0.0));
        assert!(covenant.satisfied_by(&[0, 1], 0.0));
        assert!(!covenant.satisfied_by(&[1], 0.0));
    }
}
