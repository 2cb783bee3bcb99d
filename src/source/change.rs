//! Records and traits consumed from the document store
//!
//! The engine never mutates anything it reads through these traits.

use serde_json::Value;

use super::errors::SourceResult;

/// One entry of the document store's change feed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Document ID
    pub doc_id: String,
    /// Revision ID of the change
    pub rev_id: String,
    /// Sequence number assigned by the store
    pub sequence: u64,
    /// Whether this change deleted the document
    pub deleted: bool,
    /// Document body (empty object for deletions)
    pub body: Value,
}

/// Current revision of a live document
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    pub doc_id: String,
    pub rev_id: String,
    pub sequence: u64,
    pub body: Value,
}

impl Revision {
    /// Returns a copy keeping only the given top-level fields.
    ///
    /// `_id` and `_rev` are always present in the projected body.
    pub fn project(&self, fields: &[String]) -> Revision {
        let mut projected = serde_json::Map::new();
        if let Value::Object(map) = &self.body {
            for field in fields {
                let top = field.split('.').next().unwrap_or(field);
                if let Some(v) = map.get(top) {
                    projected.insert(top.to_string(), v.clone());
                }
            }
        }
        projected.insert("_id".to_string(), Value::String(self.doc_id.clone()));
        projected.insert("_rev".to_string(), Value::String(self.rev_id.clone()));

        Revision {
            doc_id: self.doc_id.clone(),
            rev_id: self.rev_id.clone(),
            sequence: self.sequence,
            body: Value::Object(projected),
        }
    }
}

/// Ordered change feed of the document store
pub trait ChangeFeed: Send + Sync {
    /// Returns at most `limit` changes with sequence strictly greater than
    /// `since`, in strictly ascending sequence order.
    fn changes_since(&self, since: u64, limit: usize) -> SourceResult<Vec<ChangeRecord>>;
}

/// Point lookup of the current revision of a document
pub trait DocumentFetch: Send + Sync {
    /// Returns `None` if the document does not exist or is deleted
    fn get_document(&self, doc_id: &str) -> SourceResult<Option<Revision>>;
}

/// Everything the engine needs from the document store
pub trait DocumentSource: ChangeFeed + DocumentFetch {}

impl<T: ChangeFeed + DocumentFetch> DocumentSource for T {}
