//! Query executor
//!
//! Runs a compiled query against the index storage and produces a
//! `ResultSet`.
//!
//! Execution flow (strict order):
//! 1. Run the parameterized statement to obtain candidate IDs
//! 2. If nothing remains to do in process, return the IDs as they are
//! 3. Otherwise load each candidate's current revision from the source
//! 4. Filter by the residual selector
//! 5. Apply the in-process sort
//! 6. Apply skip and limit

use std::sync::Arc;

use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::index::QueryResult;
use crate::planner::CompiledQuery;
use crate::source::{DocumentSource, Revision};

use super::filters::PredicateFilter;
use super::result::ResultSet;
use super::sorter::ResultSorter;

/// Executes compiled queries against one storage connection
pub struct QueryExecutor<'a> {
    conn: &'a Connection,
    source: &'a Arc<dyn DocumentSource>,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new executor
    pub fn new(conn: &'a Connection, source: &'a Arc<dyn DocumentSource>) -> Self {
        Self { conn, source }
    }

    /// Executes a compiled query.
    ///
    /// `fields` is the projection applied while the result is consumed.
    pub fn execute(&self, compiled: &CompiledQuery, fields: Option<Vec<String>>) -> QueryResult<ResultSet> {
        let candidates = self.candidate_ids(compiled)?;
        debug!(
            index = %compiled.index_name,
            candidates = candidates.len(),
            residual = compiled.residual.is_some(),
            "index scan complete"
        );

        let ids = if compiled.needs_documents() {
            self.finish_in_process(compiled, candidates)?
        } else {
            candidates
        };

        Ok(ResultSet::new(ids, Arc::clone(self.source), fields))
    }

    fn candidate_ids(&self, compiled: &CompiledQuery) -> QueryResult<Vec<String>> {
        let mut stmt = self.conn.prepare(&compiled.sql.sql_with_placeholders)?;
        let rows = stmt.query_map(params_from_iter(compiled.sql.placeholder_values.iter()), |row| {
            row.get::<_, String>(0)
        })?;

        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    fn finish_in_process(&self, compiled: &CompiledQuery, candidates: Vec<String>) -> QueryResult<Vec<String>> {
        let mut revisions: Vec<Revision> = Vec::with_capacity(candidates.len());
        for id in candidates {
            // the index can trail the store; vanished documents are skipped
            let Some(revision) = self.source.get_document(&id)? else {
                continue;
            };
            let keep = match &compiled.residual {
                Some(residual) => PredicateFilter::matches(&revision, residual),
                None => true,
            };
            if keep {
                revisions.push(revision);
            }
        }

        if let Some(sort) = &compiled.in_process_sort {
            ResultSorter::sort(&mut revisions, sort);
        }

        let ids = revisions.into_iter().map(|r| r.doc_id);
        let ids: Vec<String> = if compiled.sql_paging {
            ids.collect()
        } else {
            let paged = ids.skip(compiled.skip);
            match compiled.limit {
                Some(limit) => paged.take(limit).collect(),
                None => paged.collect(),
            }
        };
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexDefinition, IndexSchemaCreator, IndexUpdater, catalog};
    use crate::planner::{parse_query, QueryCompiler};
    use crate::source::MemoryDocumentStore;
    use serde_json::{json, Value};

    struct Fixture {
        conn: Connection,
        store: Arc<MemoryDocumentStore>,
        source: Arc<dyn DocumentSource>,
        catalog: Vec<IndexDefinition>,
    }

    fn fixture(indexes: &[IndexDefinition]) -> Fixture {
        let mut conn = Connection::open_in_memory().unwrap();
        catalog::create_metadata_table(&conn).unwrap();
        IndexSchemaCreator::ensure_all_docs(&mut conn).unwrap();
        for def in indexes {
            IndexSchemaCreator::ensure_indexed(def, &mut conn).unwrap();
        }

        let store = Arc::new(MemoryDocumentStore::new());
        store.put("p1", json!({"name": "Ann", "age": 34, "status": "active"})).unwrap();
        store.put("p2", json!({"name": "Ben", "age": 27, "status": "inactive"})).unwrap();
        store.put("p3", json!({"name": "Cat", "age": 41, "status": "active"})).unwrap();
        store.put("p4", json!({"name": "Dan", "age": 19, "status": "active"})).unwrap();
        store.put("p5", json!({"name": "Eve", "status": "inactive"})).unwrap();

        let catalog: Vec<IndexDefinition> = catalog::load_all(&conn)
            .unwrap()
            .into_iter()
            .map(|e| e.definition)
            .collect();
        for def in &catalog {
            IndexUpdater::update_index(def, &mut conn, store.as_ref(), 100).unwrap();
        }

        let source: Arc<dyn DocumentSource> = store.clone();
        Fixture { conn, store, source, catalog }
    }

    fn run(fixture: &Fixture, query: Value) -> Vec<String> {
        let query = parse_query(&query).unwrap();
        let compiled = QueryCompiler::new(&fixture.catalog).compile(&query).unwrap();
        let results = QueryExecutor::new(&fixture.conn, &fixture.source)
            .execute(&compiled, query.fields.clone())
            .unwrap();
        results.document_ids().to_vec()
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_indexed_equality() {
        let f = fixture(&[IndexDefinition::json("by_status", ["status"])]);
        let mut got = run(&f, json!({"selector": {"status": "active"}}));
        got.sort();
        assert_eq!(got, ids(&["p1", "p3", "p4"]));
    }

    #[test]
    fn test_same_results_without_index() {
        let f = fixture(&[]);
        let mut got = run(&f, json!({"selector": {"status": "active"}}));
        got.sort();
        assert_eq!(got, ids(&["p1", "p3", "p4"]));
    }

    #[test]
    fn test_sql_sort_and_paging() {
        let f = fixture(&[IndexDefinition::json("by_age", ["age"])]);
        let got = run(
            &f,
            json!({"selector": {"age": {"$gt": 20}}, "sort": [{"age": "desc"}], "limit": 2}),
        );
        assert_eq!(got, ids(&["p3", "p1"]));
    }

    #[test]
    fn test_in_process_sort_then_post_slice() {
        let f = fixture(&[]);
        let got = run(
            &f,
            json!({"selector": {"status": "active"}, "sort": ["age"], "skip": 1, "limit": 1}),
        );
        assert_eq!(got, ids(&["p1"]));
    }

    #[test]
    fn test_residual_with_paging() {
        let f = fixture(&[IndexDefinition::json("by_status", ["status"])]);
        let got = run(
            &f,
            json!({"selector": {"status": "active", "age": {"$lt": 40}}, "sort": ["name"], "limit": 5}),
        );
        assert_eq!(got, ids(&["p1", "p4"]));
    }

    #[test]
    fn test_negation_matches_missing_field_on_both_paths() {
        let indexed = fixture(&[IndexDefinition::json("by_age", ["age"])]);
        let unindexed = fixture(&[]);
        let query = json!({"selector": {"age": {"$ne": 34}}, "sort": ["_id"]});

        assert_eq!(run(&indexed, query.clone()), ids(&["p2", "p3", "p4", "p5"]));
        assert_eq!(run(&unindexed, query), ids(&["p2", "p3", "p4", "p5"]));
    }

    #[test]
    fn test_stale_index_skips_deleted_documents() {
        let f = fixture(&[]);
        f.store.delete("p3").unwrap();

        let mut got = run(&f, json!({"selector": {"status": "active"}}));
        got.sort();
        assert_eq!(got, ids(&["p1", "p4"]));
    }
}
