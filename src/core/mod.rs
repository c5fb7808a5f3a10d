//! Foundational types: loans, attribute values, covenants, facilities,
//! the historical ledger and the error taxonomy.

pub mod covenant;
pub mod error;
pub mod facility;
pub mod ledger;
pub mod loan;
pub mod value;
