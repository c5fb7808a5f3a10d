use crate::core::facility::{FacilityId, FacilitySet};
use crate::core::loan::Loan;
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One committed loan and the facility number holding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub facility_id: FacilityId,
    pub loan: Loan,
}

/// The table of loans already committed to facilities.
///
/// It is both an input of a run (what each facility held before) and its
/// output (what each facility holds after the new assignments), so one
/// run's output can be fed to the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalLedger {
    entries: Vec<LedgerEntry>,
}

impl HistoricalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, facility_id: FacilityId, loan: Loan) {
        self.entries.push(LedgerEntry { facility_id, loan });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loans held by one facility, in ledger order.
    pub fn loans_for(&self, facility_id: FacilityId) -> Vec<&Loan> {
        self.entries
            .iter()
            .filter(|e| e.facility_id == facility_id)
            .map(|e| &e.loan)
            .collect()
    }

    /// Original principal held per facility number.
    pub fn principal_by_facility(&self) -> BTreeMap<FacilityId, Decimal> {
        let mut totals = BTreeMap::new();
        for entry in &self.entries {
            *totals.entry(entry.facility_id).or_insert(Decimal::ZERO) += entry.loan.orig_amt();
        }
        totals
    }

    /// Replace every facility's ledger with this table's contents.
    ///
    /// Entries naming a facility number that is not configured are skipped.
    /// Returns the number of loans loaded.
    pub fn load_into(&self, facilities: &mut FacilitySet) -> usize {
        for facility in facilities.iter_mut() {
            facility.clear_ledger();
        }

        let mut loaded = 0;
        for entry in &self.entries {
            match facilities
                .index_of(entry.facility_id)
                .and_then(|idx| facilities.get_mut(idx))
            {
                Some(facility) => {
                    facility.commit_loans([entry.loan.clone()]);
                    loaded += 1;
                }
                None => warn!(
                    "ledger loan {} names unknown facility {}; not loaded",
                    entry.loan.loan_id(),
                    entry.facility_id
                ),
            }
        }
        loaded
    }

    /// Entries naming a facility number that is not configured. They take
    /// no part in a run but belong in the exported ledger.
    pub fn unplaced(&self, facilities: &FacilitySet) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| facilities.index_of(e.facility_id).is_none())
            .cloned()
            .collect()
    }

    /// Snapshot every facility's ledger, in facility order.
    pub fn from_facilities(facilities: &FacilitySet) -> Self {
        let entries = facilities
            .iter()
            .flat_map(|facility| {
                facility.existing_loans().iter().map(move |loan| LedgerEntry {
                    facility_id: facility.id(),
                    loan: loan.clone(),
                })
            })
            .collect();
        Self { entries }
    }
}

impl FromIterator<LedgerEntry> for HistoricalLedger {
    fn from_iter<T: IntoIterator<Item = LedgerEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<LedgerEntry> for HistoricalLedger {
    fn extend<T: IntoIterator<Item = LedgerEntry>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}
