use crate::core::error::EngineError;
use crate::core::facility::FacilitySet;
use crate::core::loan::Loan;
use serde::{Deserialize, Serialize};

/// Dense loan × facility compatibility map derived from asset covenants.
///
/// Row `i` is candidate loan `i`, column `j` is facility index `j`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<bool>,
}

impl EligibilityMatrix {
    /// Evaluate every facility's asset covenants against every loan.
    pub fn build(loans: &[Loan], facilities: &FacilitySet) -> Self {
        let cells = loans
            .iter()
            .flat_map(|loan| facilities.iter().map(move |facility| facility.eligible(loan)))
            .collect();
        Self {
            rows: loans.len(),
            cols: facilities.len(),
            cells,
        }
    }

    /// Build from explicit rows. A row whose length differs from the
    /// first row's is a [`EngineError::MatrixShape`].
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Result<Self, EngineError> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(ragged) = rows.iter().find(|r| r.len() != cols) {
            return Err(EngineError::MatrixShape {
                rows: rows.len(),
                cols: ragged.len(),
                loans: rows.len(),
                facilities: cols,
            });
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            cells: rows.into_iter().flatten().collect(),
        })
    }

    pub fn loan_count(&self) -> usize {
        self.rows
    }

    pub fn facility_count(&self) -> usize {
        self.cols
    }

    pub fn is_eligible(&self, loan: usize, facility: usize) -> bool {
        loan < self.rows && facility < self.cols && self.cells[loan * self.cols + facility]
    }

    /// Facility indices a loan may go to.
    pub fn eligible_facilities(&self, loan: usize) -> Vec<usize> {
        (0..self.cols).filter(|&j| self.is_eligible(loan, j)).collect()
    }

    /// Loans no facility accepts.
    pub fn orphans(&self) -> Vec<usize> {
        (0..self.rows)
            .filter(|&i| (0..self.cols).all(|j| !self.is_eligible(i, j)))
            .collect()
    }

    /// Number of eligible loans per facility.
    pub fn eligible_counts(&self) -> Vec<usize> {
        (0..self.cols)
            .map(|j| (0..self.rows).filter(|&i| self.is_eligible(i, j)).count())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::covenant::{AssetCovenant, Condition};
    use crate::core::facility::{Facility, FacilityId};
    use crate::core::loan::LoanField;
    use crate::core::value::Operator;
    use rust_decimal_macros::dec;

    fn facilities() -> FacilitySet {
        let mut ca = Facility::new(FacilityId::new(1), dec!(10), dec!(1_000_000));
        ca.add_asset_covenant(AssetCovenant::new(Condition::new(
            LoanField::State,
            Operator::Eq,
            "CA",
        )));
        let open = Facility::new(FacilityId::new(2), dec!(20), dec!(1_000_000));
        let mut strict = Facility::new(FacilityId::new(3), dec!(30), dec!(1_000_000));
        strict.add_asset_covenant(AssetCovenant::new(Condition::new(
            LoanField::CreditScore,
            Operator::Ge,
            800.0,
        )));
        [ca, open, strict].into_iter().collect()
    }

    #[test]
    fn test_state_covenant_scenario() {
        let loans = vec![
            Loan::new("CA-1", dec!(1)).with_state("CA").with_credit_score(700.0),
            Loan::new("NY-1", dec!(1)).with_state("NY").with_credit_score(810.0),
        ];
        let matrix = EligibilityMatrix::build(&loans, &facilities());

        assert_eq!(matrix.loan_count(), 2);
        assert_eq!(matrix.facility_count(), 3);
        assert!(matrix.is_eligible(0, 0));
        assert!(!matrix.is_eligible(1, 0));
        assert_eq!(matrix.eligible_facilities(0), vec![0, 1]);
        assert_eq!(matrix.eligible_facilities(1), vec![1, 2]);
        assert_eq!(matrix.eligible_counts(), vec![1, 2, 1]);
    }

    #[test]
    fn test_orphans() {
        let matrix = EligibilityMatrix::from_rows(vec![
            vec![true, false],
            vec![false, false],
            vec![false, true],
        ])
        .unwrap();
        assert_eq!(matrix.orphans(), vec![1]);
        assert!(!matrix.is_eligible(5, 0));
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let result = EligibilityMatrix::from_rows(vec![vec![true, false], vec![true]]);
        assert!(matches!(
            result,
            Err(EngineError::MatrixShape { rows: 2, cols: 1, loans: 2, facilities: 2 })
        ));
        assert_eq!(EligibilityMatrix::from_rows(Vec::new()).unwrap().loan_count(), 0);
    }

    #[test]
    fn test_empty_inputs() {
        let matrix = EligibilityMatrix::build(&[], &facilities());
        assert_eq!(matrix.loan_count(), 0);
        assert!(matrix.orphans().is_empty());
        assert_eq!(matrix.eligible_counts(), vec![0, 0, 0]);
    }
}
