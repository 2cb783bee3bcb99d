//! Result sorting for query execution
//!
//! Sort keys use the index cell projection so an in-process sort orders
//! documents exactly as `ORDER BY` would. Ties fall back to the document
//! ID, ascending.

use std::cmp::Ordering;

use super::filters::PredicateFilter;
use crate::planner::{SortDirection, SortSpec};
use crate::source::Revision;

/// Sorts candidate revisions
pub struct ResultSorter;

impl ResultSorter {
    /// Sorts revisions by the given keys, in priority order.
    ///
    /// Sort is stable and deterministic.
    pub fn sort(revisions: &mut [Revision], sort: &[SortSpec]) {
        revisions.sort_by(|a, b| Self::compare(a, b, sort));
    }

    fn compare(a: &Revision, b: &Revision, sort: &[SortSpec]) -> Ordering {
        for key in sort {
            let (_, a_key) = PredicateFilter::lookup(a, &key.field);
            let (_, b_key) = PredicateFilter::lookup(b, &key.field);

            let ordering = match key.direction {
                SortDirection::Asc => a_key.compare(&b_key),
                SortDirection::Desc => b_key.compare(&a_key),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.doc_id.cmp(&b.doc_id)
    }
}
