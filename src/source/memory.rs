//! In-memory document store
//!
//! Keeps only the winning revision per document and exposes a change feed
//! that reports each document once, at its latest sequence. Used by tests
//! and by embedders prototyping against the engine.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::Value;

use super::change::{ChangeFeed, ChangeRecord, DocumentFetch, Revision};
use super::errors::{SourceError, SourceResult};

#[derive(Debug, Clone)]
struct StoredDocument {
    generation: u64,
    rev_id: String,
    sequence: u64,
    deleted: bool,
    body: Value,
}

#[derive(Debug, Default)]
struct StoreInner {
    last_sequence: u64,
    documents: BTreeMap<String, StoredDocument>,
}

/// Thread-safe in-memory document store
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<StoreInner>,
}

impl MemoryDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document, returning its new revision
    pub fn put(&self, doc_id: &str, body: Value) -> SourceResult<Revision> {
        let mut inner = self.write()?;
        inner.last_sequence += 1;
        let sequence = inner.last_sequence;

        let generation = inner
            .documents
            .get(doc_id)
            .map(|d| d.generation + 1)
            .unwrap_or(1);
        let rev_id = format!("{}-{:08x}", generation, sequence);

        inner.documents.insert(
            doc_id.to_string(),
            StoredDocument {
                generation,
                rev_id: rev_id.clone(),
                sequence,
                deleted: false,
                body: body.clone(),
            },
        );

        Ok(Revision {
            doc_id: doc_id.to_string(),
            rev_id,
            sequence,
            body,
        })
    }

    /// Delete a document. Returns false if it was absent or already deleted.
    pub fn delete(&self, doc_id: &str) -> SourceResult<bool> {
        let mut inner = self.write()?;
        let next_sequence = inner.last_sequence + 1;

        let Some(doc) = inner.documents.get_mut(doc_id) else {
            return Ok(false);
        };
        if doc.deleted {
            return Ok(false);
        }

        doc.generation += 1;
        doc.rev_id = format!("{}-{:08x}", doc.generation, next_sequence);
        doc.sequence = next_sequence;
        doc.deleted = true;
        doc.body = Value::Object(serde_json::Map::new());
        inner.last_sequence = next_sequence;
        Ok(true)
    }

    /// Highest sequence number assigned so far
    pub fn last_sequence(&self) -> u64 {
        self.inner.read().map(|i| i.last_sequence).unwrap_or(0)
    }

    /// Number of live documents
    pub fn live_count(&self) -> usize {
        self.inner
            .read()
            .map(|i| i.documents.values().filter(|d| !d.deleted).count())
            .unwrap_or(0)
    }

    fn write(&self) -> SourceResult<std::sync::RwLockWriteGuard<'_, StoreInner>> {
        self.inner
            .write()
            .map_err(|_| SourceError::Unavailable("store lock poisoned".to_string()))
    }
}

impl ChangeFeed for MemoryDocumentStore {
    fn changes_since(&self, since: u64, limit: usize) -> SourceResult<Vec<ChangeRecord>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| SourceError::Unavailable("store lock poisoned".to_string()))?;

        let mut changes: Vec<ChangeRecord> = inner
            .documents
            .iter()
            .filter(|(_, d)| d.sequence > since)
            .map(|(id, d)| ChangeRecord {
                doc_id: id.clone(),
                rev_id: d.rev_id.clone(),
                sequence: d.sequence,
                deleted: d.deleted,
                body: d.body.clone(),
            })
            .collect();

        changes.sort_by_key(|c| c.sequence);
        changes.truncate(limit);
        Ok(changes)
    }
}

impl DocumentFetch for MemoryDocumentStore {
    fn get_document(&self, doc_id: &str) -> SourceResult<Option<Revision>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| SourceError::Unavailable("store lock poisoned".to_string()))?;

        Ok(inner
            .documents
            .get(doc_id)
            .filter(|d| !d.deleted)
            .map(|d| Revision {
                doc_id: doc_id.to_string(),
                rev_id: d.rev_id.clone(),
                sequence: d.sequence,
                body: d.body.clone(),
            }))
    }
}
