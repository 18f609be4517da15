//! Cost accounting: pricing resolution and the charge ledger.

pub mod ledger;
pub mod pricing;
