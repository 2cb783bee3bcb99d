//! Index subsystem
//!
//! Secondary indexes are derived state: one SQLite table per index holding
//! the scalar projection of every live document, kept current by replaying
//! the document store's change feed.
//!
//! # Design Principles
//!
//! - Derived state: the document store stays the source of truth
//! - Atomic: table, SQL index and catalog row appear together or not at all
//! - Resumable: each index records the last sequence it has applied
//!
//! # Invariants
//!
//! - A watermark never advances past committed rows
//! - Every live document has exactly one row per index after a refresh
//! - `_all_docs` always exists and is never listed or deleted

pub mod catalog;
mod creator;
mod definition;
mod errors;
mod key;
mod manager;
mod updater;

pub use catalog::{CatalogEntry, CatalogRow, METADATA_TABLE};
pub use creator::{quote_identifier, table_name_for_index, IndexSchemaCreator, INDEX_TABLE_PREFIX};
pub use definition::{
    is_implicit_field, validate_field_path, validate_index_name, IndexDefinition, IndexType,
    ALL_DOCS_INDEX, DOC_ID_FIELD, REV_ID_FIELD,
};
pub use errors::{QueryError, QueryErrorCode, QueryResult, Severity, ERROR_DOMAIN};
pub use key::{extract_path, IndexKey};
pub use manager::IndexManager;
pub use updater::{IndexUpdater, UpdateStats};
