use crate::core::error::EngineError;
use crate::core::facility::FacilitySet;
use crate::core::loan::Loan;
use serde::{Deserialize, Serialize};

/// Candidate loan `loan` goes to facility index `facility`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assignment {
    pub loan: usize,
    pub facility: usize,
}

impl Assignment {
    pub fn new(loan: usize, facility: usize) -> Self {
        Self { loan, facility }
    }
}

/// Commit assigned loans to their facilities' ledgers.
///
/// Every index is checked before anything is written, so an error leaves
/// the ledgers untouched. Applying the same list twice commits the loans
/// twice.
pub fn apply_assignments(
    assignments: &[Assignment],
    loans: &[Loan],
    facilities: &mut FacilitySet,
) -> Result<(), EngineError> {
    if let Some(bad) = assignments
        .iter()
        .find(|a| a.loan >= loans.len() || a.facility >= facilities.len())
    {
        return Err(EngineError::AssignmentOutOfRange {
            loan: bad.loan,
            facility: bad.facility,
        });
    }

    for a in assignments {
        if let Some(facility) = facilities.get_mut(a.facility) {
            facility.commit_loans([loans[a.loan].clone()]);
        }
    }
    log::debug!("committed {} loans to facility ledgers", assignments.len());
    Ok(())
}
