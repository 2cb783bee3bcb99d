//! Query execution
//!
//! Consumes compiled queries and produces ordered, lazily loaded results.
//!
//! # Execution Flow (strict order)
//!
//! 1. Run the compiled statement against the chosen index table
//! 2. Load revisions only when a residual selector or in-process sort remains
//! 3. Filter, sort, then apply skip and limit
//! 4. Hand back a `ResultSet` that fetches bodies while iterating
//!
//! # Invariants
//!
//! - In-process evaluation agrees with the SQL it stands in for
//! - Documents deleted after the index was refreshed never surface

mod executor;
mod filters;
mod result;
mod sorter;

pub use executor::QueryExecutor;
pub use filters::PredicateFilter;
pub use result::{ResultIter, ResultSet};
pub use sorter::ResultSorter;
