//! Query planning
//!
//! Parses query documents and compiles them into parameterized SQL over a
//! single index table.
//!
//! # Design Principles
//!
//! - Deterministic: same catalog and query produce the same statement
//! - Parameterized: operand values are always bound, never inlined
//! - Total: anything the index cannot answer is carried as a residual
//!
//! # Index Selection Priority (strict order)
//!
//! 1. Longest field-list prefix matched by top-level equality fields
//! 2. Most covered top-level clauses
//! 3. Ability to serve the requested sort
//!
//! Ties go to the index with fewer fields, then the smaller name.

mod ast;
mod compiler;
mod explain;
pub(crate) mod parser;

pub use ast::{FilterOp, Predicate, Query, Selector, SortDirection, SortSpec};
pub use compiler::{CompiledQuery, QueryCompiler, SqlParts};
pub use explain::ExplainPlan;
pub use parser::{parse_fields, parse_query, parse_selector, parse_sort};
