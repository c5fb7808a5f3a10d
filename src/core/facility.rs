use crate::core::covenant::{AssetCovenant, PoolCovenant};
use crate::core::loan::Loan;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Facility number as written in the configuration and ledger tables.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FacilityId(u32);

impl FacilityId {
    pub fn new(number: u32) -> Self {
        Self(number)
    }

    pub fn number(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FacilityId {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

/// A financing vehicle loans are placed into.
///
/// A facility owns its covenants and its ledger of committed loans. The
/// ledger only grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    id: FacilityId,
    cost: Decimal,
    capacity: Decimal,
    asset_covenants: Vec<AssetCovenant>,
    pool_covenants: Vec<PoolCovenant>,
    existing_loans: Vec<Loan>,
}

impl Facility {
    pub fn new(id: FacilityId, cost: Decimal, capacity: Decimal) -> Self {
        Self {
            id,
            cost,
            capacity,
            asset_covenants: Vec::new(),
            pool_covenants: Vec::new(),
            existing_loans: Vec::new(),
        }
    }

    pub fn id(&self) -> FacilityId {
        self.id
    }

    pub fn cost(&self) -> Decimal {
        self.cost
    }

    pub fn capacity(&self) -> Decimal {
        self.capacity
    }

    /// Raise capacity to `capacity` if it is larger than the current one.
    pub fn widen_capacity(&mut self, capacity: Decimal) {
        self.capacity = self.capacity.max(capacity);
    }

    pub fn add_asset_covenant(&mut self, covenant: AssetCovenant) {
        self.asset_covenants.push(covenant);
    }

    pub fn add_pool_covenant(&mut self, covenant: PoolCovenant) {
        self.pool_covenants.push(covenant);
    }

    pub fn asset_covenants(&self) -> &[AssetCovenant] {
        &self.asset_covenants
    }

    pub fn pool_covenants(&self) -> &[PoolCovenant] {
        &self.pool_covenants
    }

    /// Whether `loan` passes every asset covenant.
    pub fn eligible(&self, loan: &Loan) -> bool {
        self.asset_covenants.iter().all(|c| c.check(loan))
    }

    /// Append loans to the ledger.
    pub fn commit_loans(&mut self, loans: impl IntoIterator<Item = Loan>) {
        self.existing_loans.extend(loans);
    }

    pub(crate) fn clear_ledger(&mut self) {
        self.existing_loans.clear();
    }

    pub fn existing_loans(&self) -> &[Loan] {
        &self.existing_loans
    }

    pub fn ledger_principal(&self) -> Decimal {
        self.existing_loans.iter().map(|l| l.orig_amt()).sum()
    }

    /// Capacity left after the ledger, floored at zero.
    pub fn remaining_capacity(&self) -> Decimal {
        (self.capacity - self.ledger_principal()).max(Decimal::ZERO)
    }
}

/// Facilities in a fixed order. A facility's position is its index in
/// every formulation, assignment and statistic of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacilitySet {
    facilities: Vec<Facility>,
}

impl FacilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a facility and return its index.
    pub fn push(&mut self, facility: Facility) -> usize {
        self.facilities.push(facility);
        self.facilities.len() - 1
    }

    pub fn index_of(&self, id: FacilityId) -> Option<usize> {
        self.facilities.iter().position(|f| f.id() == id)
    }

    pub fn get(&self, index: usize) -> Option<&Facility> {
        self.facilities.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Facility> {
        self.facilities.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Facility> {
        self.facilities.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Facility> {
        self.facilities.iter_mut()
    }

    pub fn as_slice(&self) -> &[Facility] {
        &self.facilities
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    /// Total number of loans held across all ledgers.
    pub fn ledger_size(&self) -> usize {
        self.facilities.iter().map(|f| f.existing_loans().len()).sum()
    }
}

impl FromIterator<Facility> for FacilitySet {
    fn from_iter<T: IntoIterator<Item = Facility>>(iter: T) -> Self {
        Self {
            facilities: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FacilitySet {
    type Item = &'a Facility;
    type IntoIter = std::slice::Iter<'a, Facility>;

    fn into_iter(self) -> Self::IntoIter {
        self.facilities.iter()
    }
}
