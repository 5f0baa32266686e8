//! Types that represent the core data model: `Transaction`, its unvalidated `Candidate` form and
//! the `Amount` it carries.
mod amount;
mod transaction;

pub use amount::{Amount, AmountError};
pub use transaction::{validate, Candidate, Kind, Transaction, ISO_DATE};
