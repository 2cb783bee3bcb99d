//! Document store collaborator interfaces
//!
//! The engine consumes three things from the document store:
//!
//! - an ordered change feed filterable by "sequence greater than N"
//! - a point lookup resolving an id to its current revision
//! - a close notification, delivered by calling `QueryEngine::close`
//!
//! `MemoryDocumentStore` is a complete in-process implementation.

mod change;
mod errors;
mod memory;

pub use change::{ChangeFeed, ChangeRecord, DocumentFetch, DocumentSource, Revision};
pub use errors::{SourceError, SourceResult};
pub use memory::MemoryDocumentStore;
