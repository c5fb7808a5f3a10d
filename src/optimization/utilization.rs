use crate::core::facility::{FacilityId, FacilitySet};
use crate::core::loan::Loan;
use crate::optimization::assignment::Assignment;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How full one facility is after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityUtilization {
    pub facility: FacilityId,
    pub new_loans: usize,
    pub new_principal: Decimal,
    /// Ledger size including the loans committed this run.
    pub total_loans: usize,
    pub total_principal: Decimal,
    pub avg_credit_score: Option<f64>,
    pub capacity: Decimal,
}

impl FacilityUtilization {
    pub fn existing_principal(&self) -> Decimal {
        self.total_principal - self.new_principal
    }

    /// Capacity not yet used; negative when the facility is over-filled.
    pub fn unused_capacity(&self) -> Decimal {
        self.capacity - self.total_principal
    }

    /// Fraction of capacity in use, or `None` for a zero-capacity facility.
    pub fn utilization(&self) -> Option<f64> {
        if self.capacity.is_zero() {
            return None;
        }
        (self.total_principal / self.capacity).to_f64()
    }
}

/// Per-facility fill levels after assignments are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UtilizationReport {
    pub facilities: Vec<FacilityUtilization>,
}

impl UtilizationReport {
    /// Build from facilities whose ledgers already include `assignments`.
    pub fn new(facilities: &FacilitySet, loans: &[Loan], assignments: &[Assignment]) -> Self {
        let rows = facilities
            .iter()
            .enumerate()
            .map(|(j, facility)| {
                let placed: Vec<&Loan> = assignments
                    .iter()
                    .filter(|a| a.facility == j)
                    .filter_map(|a| loans.get(a.loan))
                    .collect();
                let scores: Vec<f64> = facility
                    .existing_loans()
                    .iter()
                    .filter_map(Loan::credit_score)
                    .collect();
                FacilityUtilization {
                    facility: facility.id(),
                    new_loans: placed.len(),
                    new_principal: placed.iter().map(|l| l.orig_amt()).sum(),
                    total_loans: facility.existing_loans().len(),
                    total_principal: facility.ledger_principal(),
                    avg_credit_score: mean(&scores),
                    capacity: facility.capacity(),
                }
            })
            .collect();
        Self { facilities: rows }
    }

    pub fn total_new_loans(&self) -> usize {
        self.facilities.iter().map(|f| f.new_loans).sum()
    }

    pub fn total_new_principal(&self) -> Decimal {
        self.facilities.iter().map(|f| f.new_principal).sum()
    }

    pub fn total_loans(&self) -> usize {
        self.facilities.iter().map(|f| f.total_loans).sum()
    }

    pub fn total_principal(&self) -> Decimal {
        self.facilities.iter().map(|f| f.total_principal).sum()
    }

    pub fn total_capacity(&self) -> Decimal {
        self.facilities.iter().map(|f| f.capacity).sum()
    }

    /// Mean of the per-facility average scores, skipping facilities with none.
    pub fn avg_credit_score(&self) -> Option<f64> {
        let per_facility: Vec<f64> = self
            .facilities
            .iter()
            .filter_map(|f| f.avg_credit_score)
            .collect();
        mean(&per_facility)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl std::fmt::Display for UtilizationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Facility Utilization ===")?;
        writeln!(
            f,
            "{:>8} {:>6} {:>16} {:>7} {:>16} {:>9} {:>16} {:>7}",
            "Facility", "New", "New Principal", "Total", "Total Principal", "Avg FICO", "Capacity", "Used"
        )?;
        for row in &self.facilities {
            let score = row
                .avg_credit_score
                .map_or_else(|| "-".to_string(), |s| format!("{:.1}", s));
            let used = row
                .utilization()
                .map_or_else(|| "-".to_string(), |u| format!("{:.1}%", u * 100.0));
            writeln!(
                f,
                "{:>8} {:>6} {:>16} {:>7} {:>16} {:>9} {:>16} {:>7}",
                row.facility.to_string(),
                row.new_loans,
                row.new_principal,
                row.total_loans,
                row.total_principal,
                score,
                row.capacity,
                used
            )?;
        }
        writeln!(f, "\nNew Loans:       {}", self.total_new_loans())?;
        writeln!(f, "New Principal:   {}", self.total_new_principal())?;
        writeln!(f, "Ledger Loans:    {}", self.total_loans())?;
        writeln!(f, "Ledger Value:    {}", self.total_principal())?;
        if let Some(score) = self.avg_credit_score() {
            writeln!(f, "Avg Credit:      {:.2}", score)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::facility::Facility;
    use crate::optimization::assignment::apply_assignments;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_report_after_apply() {
        let mut facilities: FacilitySet = [(1, dec!(1000)), (2, dec!(0))]
            .into_iter()
            .map(|(n, cap)| Facility::new(FacilityId::new(n), dec!(1), cap))
            .collect();
        facilities
            .get_mut(0)
            .unwrap()
            .commit_loans([Loan::new("OLD", dec!(400)).with_credit_score(700.0)]);

        let loans = vec![
            Loan::new("N1", dec!(100)).with_credit_score(760.0),
            Loan::new("N2", dec!(50)),
        ];
        let assignments = [Assignment::new(0, 0), Assignment::new(1, 1)];
        apply_assignments(&assignments, &loans, &mut facilities).unwrap();

        let report = UtilizationReport::new(&facilities, &loans, &assignments);
        let first = &report.facilities[0];
        assert_eq!(first.new_loans, 1);
        assert_eq!(first.new_principal, dec!(100));
        assert_eq!(first.total_loans, 2);
        assert_eq!(first.existing_principal(), dec!(400));
        assert_eq!(first.unused_capacity(), dec!(500));
        assert_relative_eq!(first.utilization().unwrap(), 0.5);
        assert_relative_eq!(first.avg_credit_score.unwrap(), 730.0);

        let second = &report.facilities[1];
        assert_eq!(second.utilization(), None);
        assert_eq!(second.avg_credit_score, None);

        assert_eq!(report.total_new_loans(), 2);
        assert_eq!(report.total_principal(), dec!(550));
        assert_relative_eq!(report.avg_credit_score().unwrap(), 730.0);
    }

    #[test]
    fn test_display_mentions_totals() {
        let facilities: FacilitySet =
            [Facility::new(FacilityId::new(7), dec!(1), dec!(10))].into_iter().collect();
        let text = UtilizationReport::new(&facilities, &[], &[]).to_string();
        assert!(text.contains("Facility Utilization"));
        assert!(text.contains("New Loans:       0"));
    }
}
