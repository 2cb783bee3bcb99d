//! Result set returned by `find`
//!
//! Holds the ordered IDs of matching documents. Bodies are fetched from the
//! document store one at a time while iterating, so a consumer that stops
//! early never loads the rest.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::source::{DocumentSource, Revision};

/// Ordered, single-pass result of a query
pub struct ResultSet {
    ids: Vec<String>,
    source: Arc<dyn DocumentSource>,
    fields: Option<Vec<String>>,
}

impl ResultSet {
    /// Creates a result set over already-ordered IDs
    pub fn new(ids: Vec<String>, source: Arc<dyn DocumentSource>, fields: Option<Vec<String>>) -> Self {
        Self { ids, source, fields }
    }

    /// IDs of the matching documents, in result order
    pub fn document_ids(&self) -> &[String] {
        &self.ids
    }

    /// Number of matching documents at execution time
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("ids", &self.ids)
            .field("fields", &self.fields)
            .finish()
    }
}

impl IntoIterator for ResultSet {
    type Item = Revision;
    type IntoIter = ResultIter;

    fn into_iter(self) -> ResultIter {
        ResultIter {
            ids: self.ids.into_iter(),
            source: self.source,
            fields: self.fields,
        }
    }
}

/// Lazy iterator over the revisions of a `ResultSet`
pub struct ResultIter {
    ids: std::vec::IntoIter<String>,
    source: Arc<dyn DocumentSource>,
    fields: Option<Vec<String>>,
}

impl Iterator for ResultIter {
    type Item = Revision;

    fn next(&mut self) -> Option<Revision> {
        for id in self.ids.by_ref() {
            match self.source.get_document(&id) {
                Ok(Some(revision)) => {
                    return Some(match &self.fields {
                        Some(fields) => revision.project(fields),
                        None => revision,
                    });
                }
                // deleted since the query ran
                Ok(None) => continue,
                Err(err) => {
                    warn!(doc_id = %id, error = %err, "skipping unreadable result document");
                    continue;
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.ids.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryDocumentStore;
    use serde_json::json;

    fn store() -> Arc<MemoryDocumentStore> {
        let store = Arc::new(MemoryDocumentStore::new());
        store.put("a", json!({"name": "Alice", "age": 30})).unwrap();
        store.put("b", json!({"name": "Bob", "age": 40})).unwrap();
        store.put("c", json!({"name": "Carol", "age": 50})).unwrap();
        store
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_iterates_in_result_order() {
        let results = ResultSet::new(ids(&["c", "a"]), store(), None);
        assert_eq!(results.document_ids(), ["c".to_string(), "a".to_string()]);
        assert_eq!(results.len(), 2);

        let bodies: Vec<_> = results.into_iter().map(|r| r.body["name"].clone()).collect();
        assert_eq!(bodies, vec![json!("Carol"), json!("Alice")]);
    }

    #[test]
    fn test_skips_documents_deleted_after_execution() {
        let store = store();
        let results = ResultSet::new(ids(&["a", "b", "c"]), store.clone(), None);
        store.delete("b").unwrap();

        let seen: Vec<_> = results.into_iter().map(|r| r.doc_id).collect();
        assert_eq!(seen, ids(&["a", "c"]));
    }

    #[test]
    fn test_projection_keeps_id_and_rev() {
        let results = ResultSet::new(ids(&["a"]), store(), Some(ids(&["name"])));
        let revision = results.into_iter().next().unwrap();

        let keys: Vec<_> = revision.body.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ids(&["_id", "_rev", "name"]));
    }

    #[test]
    fn test_consumer_can_stop_early() {
        let results = ResultSet::new(ids(&["a", "b", "c"]), store(), None);
        let mut iter = results.into_iter();
        assert_eq!(iter.next().unwrap().doc_id, "a");
        assert_eq!(iter.size_hint(), (0, Some(2)));
    }

    #[test]
    fn test_empty() {
        let results = ResultSet::new(Vec::new(), store(), None);
        assert!(results.is_empty());
        assert_eq!(results.into_iter().count(), 0);
    }
}
