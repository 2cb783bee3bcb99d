//! mangoquery - Mango-style secondary indexes and queries for embedded
//! document stores
//!
//! Indexes live in a SQLite file next to the document store and are kept
//! current from the store's change feed. Queries are compiled to
//! parameterized SQL over the best-matching index; whatever the index
//! cannot answer is finished in process with identical semantics.

pub mod engine;
pub mod executor;
pub mod index;
pub mod planner;
pub mod source;

pub use engine::{EngineConfig, FindOptions, Pending, QueryEngine};
pub use executor::ResultSet;
pub use index::{IndexDefinition, IndexManager, IndexType, QueryError, QueryErrorCode, QueryResult};
pub use planner::{Query, SortSpec};
pub use source::{DocumentSource, MemoryDocumentStore, Revision};
