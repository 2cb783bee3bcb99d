//! Query Equivalence Tests
//!
//! Tests for query result invariants:
//! - find({}) returns every live document
//! - A query returns the same documents with and without a covering index
//! - Sorting and paging agree between SQL and in-process execution
//! - Query values are bound, never interpreted as SQL

use std::sync::Arc;

use mangoquery::planner::SortSpec;
use mangoquery::{EngineConfig, FindOptions, IndexType, MemoryDocumentStore, QueryEngine};
use serde_json::{json, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct Fixture {
    _dir: TempDir,
    store: Arc<MemoryDocumentStore>,
    engine: QueryEngine,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryDocumentStore::new());
    let engine = QueryEngine::new(EngineConfig::in_dir(dir.path()), store.clone());
    engine.activate().unwrap();
    Fixture { _dir: dir, store, engine }
}

/// Five people, three of them active.
fn load_people(store: &MemoryDocumentStore) {
    let people = [
        ("p1", json!({"name": "Ann", "age": 34, "status": "active", "address": {"city": "Oslo"}})),
        ("p2", json!({"name": "Ben", "age": 27, "status": "inactive"})),
        ("p3", json!({"name": "Cat", "age": 41, "status": "active", "address": {"city": "Bergen"}})),
        ("p4", json!({"name": "Dan", "age": 19.5, "status": "active", "vip": true})),
        ("p5", json!({"name": "Eve", "status": "inactive", "tags": ["x", "y"]})),
    ];
    for (id, body) in people {
        store.put(id, body).unwrap();
    }
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn sorted_ids(engine: &QueryEngine, selector: &Value) -> Vec<String> {
    let results = engine
        .find(selector)
        .wait()
        .unwrap_or_else(|| panic!("find failed for {}", selector));
    let mut ids = results.document_ids().to_vec();
    ids.sort();
    ids
}

fn ordered_ids(engine: &QueryEngine, selector: &Value, options: FindOptions) -> Vec<String> {
    engine
        .find_with_options(selector, options)
        .wait()
        .unwrap()
        .document_ids()
        .to_vec()
}

// =============================================================================
// Match-All Tests
// =============================================================================

/// Empty selector returns exactly the live documents.
#[test]
fn test_find_all_returns_live_ids() {
    let f = fixture();
    load_people(&f.store);
    f.store.delete("p2").unwrap();

    assert_eq!(sorted_ids(&f.engine, &json!({})), fields(&["p1", "p3", "p4", "p5"]));
}

/// Empty store, empty result.
#[test]
fn test_find_all_on_empty_store() {
    let f = fixture();
    let results = f.engine.find(&json!({})).wait().unwrap();
    assert!(results.is_empty());
}

// =============================================================================
// Index / No-Index Equivalence Tests
// =============================================================================

/// 5 documents, 3 active: same 3 IDs with and without an index.
#[test]
fn test_status_query_with_and_without_index() {
    let f = fixture();
    load_people(&f.store);
    let selector = json!({"status": "active"});

    let without = sorted_ids(&f.engine, &selector);
    f.engine
        .ensure_indexed(fields(&["status"]), "by_status", IndexType::Json)
        .wait()
        .unwrap();
    let with = sorted_ids(&f.engine, &selector);

    assert_eq!(without, fields(&["p1", "p3", "p4"]));
    assert_eq!(with, without);
}

/// A range of selectors agree between indexed and unindexed execution.
#[test]
fn test_selector_matrix_equivalence() {
    let plain = fixture();
    let indexed = fixture();
    load_people(&plain.store);
    load_people(&indexed.store);

    for (name, index_fields) in [
        ("by_status_age", vec!["status", "age"]),
        ("by_name", vec!["name"]),
        ("by_city", vec!["address.city"]),
        ("by_vip", vec!["vip"]),
    ] {
        indexed
            .engine
            .ensure_indexed(fields(&index_fields), name, IndexType::Json)
            .wait()
            .unwrap();
    }

    let selectors = [
        json!({"status": "active", "age": {"$gt": 30}}),
        json!({"age": {"$gte": 19.5, "$lt": 34}}),
        json!({"age": {"$ne": 34}}),
        json!({"age": {"$exists": false}}),
        json!({"name": {"$in": ["Ann", "Eve", "Zed"]}}),
        json!({"name": {"$nin": ["Ann", "Eve"]}}),
        json!({"name": {"$not": {"$gt": "Cat"}}}),
        json!({"$or": [{"name": "Ben"}, {"age": {"$gt": 40}}]}),
        json!({"$and": [{"status": "active"}, {"address.city": "Oslo"}]}),
        json!({"address.city": {"$exists": true}}),
        json!({"vip": true}),
        json!({"tags": ["x", "y"]}),
        json!({"status": "active", "name": {"$ne": "Ann"}}),
        json!({"name": {"$in": []}}),
        json!({"name": {"$nin": []}}),
    ];

    for selector in &selectors {
        assert_eq!(
            sorted_ids(&indexed.engine, selector),
            sorted_ids(&plain.engine, selector),
            "results differ for {}",
            selector
        );
    }
}

/// Documents missing the field match negations on both paths.
#[test]
fn test_negation_includes_missing_fields() {
    let f = fixture();
    load_people(&f.store);
    f.engine
        .ensure_indexed(fields(&["age"]), "by_age", IndexType::Json)
        .wait()
        .unwrap();

    assert_eq!(
        sorted_ids(&f.engine, &json!({"age": {"$ne": 34}})),
        fields(&["p2", "p3", "p4", "p5"])
    );
}

/// Numeric edge values compare the same way in SQL and in process.
#[test]
fn test_numeric_edge_equivalence() {
    let plain = fixture();
    let indexed = fixture();
    for f in [&plain, &indexed] {
        f.store.put("neg_zero", json!({"n": -0.0})).unwrap();
        f.store.put("zero", json!({"n": 0})).unwrap();
        f.store.put("big", json!({"n": 9_007_199_254_740_993_i64})).unwrap();
        f.store.put("half", json!({"n": 0.5})).unwrap();
    }
    indexed
        .engine
        .ensure_indexed(fields(&["n"]), "by_n", IndexType::Json)
        .wait()
        .unwrap();

    let selectors = [
        json!({"n": 0}),
        json!({"n": {"$gte": 0}}),
        json!({"n": {"$lt": 0}}),
        json!({"n": {"$gt": 9_007_199_254_740_992.0_f64}}),
        json!({"n": {"$lte": 9_007_199_254_740_992.0_f64}}),
    ];
    for selector in &selectors {
        assert_eq!(
            sorted_ids(&indexed.engine, selector),
            sorted_ids(&plain.engine, selector),
            "results differ for {}",
            selector
        );
    }

    assert_eq!(sorted_ids(&plain.engine, &json!({"n": 0})), fields(&["neg_zero", "zero"]));
    assert_eq!(
        sorted_ids(&plain.engine, &json!({"n": {"$gt": 9_007_199_254_740_992.0_f64}})),
        fields(&["big"])
    );
}

// =============================================================================
// Sort and Paging Tests
// =============================================================================

/// Sorted paging gives the same pages whether or not the index serves the sort.
#[test]
fn test_sorted_paging_equivalence() {
    let plain = fixture();
    let indexed = fixture();
    load_people(&plain.store);
    load_people(&indexed.store);
    indexed
        .engine
        .ensure_indexed(fields(&["age"]), "by_age", IndexType::Json)
        .wait()
        .unwrap();

    let selector = json!({"age": {"$gt": 0}});
    for skip in 0..4 {
        let options = FindOptions::default()
            .with_sort(SortSpec::desc("age"))
            .with_skip(skip)
            .with_limit(2);
        assert_eq!(
            ordered_ids(&indexed.engine, &selector, options.clone()),
            ordered_ids(&plain.engine, &selector, options),
            "page at skip {}",
            skip
        );
    }

    let all = ordered_ids(
        &plain.engine,
        &selector,
        FindOptions::default().with_sort(SortSpec::asc("age")),
    );
    assert_eq!(all, fields(&["p4", "p2", "p1", "p3"]));
}

/// Sort on an unindexed field with a residual selector, then slice.
#[test]
fn test_in_process_sort_and_slice() {
    let f = fixture();
    load_people(&f.store);
    f.engine
        .ensure_indexed(fields(&["status"]), "by_status", IndexType::Json)
        .wait()
        .unwrap();

    let ids = ordered_ids(
        &f.engine,
        &json!({"status": "active"}),
        FindOptions::default()
            .with_sort(SortSpec::desc("name"))
            .with_skip(1)
            .with_limit(5),
    );
    assert_eq!(ids, fields(&["p3", "p1"]));
}

/// Full query documents go through the same path.
#[test]
fn test_query_document() {
    let f = fixture();
    load_people(&f.store);

    let results = f
        .engine
        .find_query(&json!({
            "selector": {"status": "active"},
            "sort": [{"age": "asc"}],
            "limit": 1,
            "fields": ["name"]
        }))
        .wait()
        .unwrap();

    let docs: Vec<_> = results.into_iter().collect();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].doc_id, "p4");
    assert_eq!(docs[0].body["name"], json!("Dan"));
    assert!(docs[0].body.get("age").is_none());
}

// =============================================================================
// Safety Tests
// =============================================================================

/// Hostile strings are matched literally.
#[test]
fn test_values_are_bound_not_inlined() {
    let f = fixture();
    load_people(&f.store);
    f.store
        .put("evil", json!({"name": "x' OR '1'='1"}))
        .unwrap();
    f.engine
        .ensure_indexed(fields(&["name"]), "by_name", IndexType::Json)
        .wait()
        .unwrap();

    assert_eq!(
        sorted_ids(&f.engine, &json!({"name": "x' OR '1'='1"})),
        fields(&["evil"])
    );
    assert!(sorted_ids(&f.engine, &json!({"name": "' OR 1=1 --"})).is_empty());
    // the index is intact afterwards
    assert_eq!(sorted_ids(&f.engine, &json!({})).len(), 6);
}

/// Malformed selectors resolve to no result set.
#[test]
fn test_invalid_selectors_return_none() {
    let f = fixture();
    load_people(&f.store);

    for selector in [
        json!({"age": {"$regex": "^1"}}),
        json!({"$where": "true"}),
        json!({"tags": {"$in": "x"}}),
        json!({"$or": []}),
        json!("status"),
    ] {
        assert!(f.engine.find(&selector).wait().is_none(), "accepted {}", selector);
    }
}

// =============================================================================
// Freshness Tests
// =============================================================================

/// find sees writes made after the index was built.
#[test]
fn test_find_refreshes_index() {
    let f = fixture();
    load_people(&f.store);
    f.engine
        .ensure_indexed(fields(&["status"]), "by_status", IndexType::Json)
        .wait()
        .unwrap();
    assert_eq!(sorted_ids(&f.engine, &json!({"status": "active"})).len(), 3);

    f.store.put("p2", json!({"name": "Ben", "status": "active"})).unwrap();
    f.store.delete("p1").unwrap();

    assert_eq!(
        sorted_ids(&f.engine, &json!({"status": "active"})),
        fields(&["p2", "p3", "p4"])
    );
}

/// With refresh disabled, only explicit updates move the index.
#[test]
fn test_refresh_disabled_needs_explicit_update() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryDocumentStore::new());
    let config = EngineConfig::in_dir(dir.path()).with_refresh_on_find(false);
    let engine = QueryEngine::new(config, store.clone());
    engine.activate().unwrap();
    load_people(&store);

    engine
        .ensure_indexed(fields(&["status"]), "by_status", IndexType::Json)
        .wait()
        .unwrap();
    assert!(sorted_ids(&engine, &json!({"status": "active"})).is_empty());

    assert!(engine.update_all_indexes().wait().unwrap());
    assert_eq!(sorted_ids(&engine, &json!({"status": "active"})).len(), 3);
}
