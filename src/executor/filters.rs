//! In-process selector evaluation
//!
//! Evaluates a `Selector` against a document revision with the same
//! semantics the compiled SQL has over index cells:
//!
//! - scalar comparisons use the `IndexKey` projection and ordering
//! - a NULL (missing) cell never equals or orders against anything
//! - `$ne`, `$nin` and `$not` match documents lacking the field
//!
//! Comparisons against arrays or objects never reach SQL; they use plain
//! JSON equality on the raw field value.

use std::cmp::Ordering;

use serde_json::Value;

use crate::index::{extract_path, IndexKey, DOC_ID_FIELD, REV_ID_FIELD};
use crate::planner::{FilterOp, Predicate, Selector};
use crate::source::Revision;

/// Evaluates selectors against documents
pub struct PredicateFilter;

impl PredicateFilter {
    /// Checks if a revision matches the selector
    pub fn matches(revision: &Revision, selector: &Selector) -> bool {
        match selector {
            Selector::Predicate(predicate) => Self::matches_predicate(revision, predicate),
            Selector::And(children) => children.iter().all(|c| Self::matches(revision, c)),
            Selector::Or(children) => children.iter().any(|c| Self::matches(revision, c)),
            Selector::Not(inner) => !Self::matches(revision, inner),
        }
    }

    fn matches_predicate(revision: &Revision, predicate: &Predicate) -> bool {
        let (raw, key) = Self::lookup(revision, &predicate.field);

        match &predicate.op {
            FilterOp::Eq(expected) => Self::eq_match(raw, &key, expected),
            FilterOp::Ne(expected) => !Self::eq_match(raw, &key, expected),
            FilterOp::Gt(bound) => Self::range_match(&key, bound, Ordering::is_gt),
            FilterOp::Gte(bound) => Self::range_match(&key, bound, Ordering::is_ge),
            FilterOp::Lt(bound) => Self::range_match(&key, bound, Ordering::is_lt),
            FilterOp::Lte(bound) => Self::range_match(&key, bound, Ordering::is_le),
            FilterOp::In(values) => values.iter().any(|v| Self::eq_match(raw, &key, v)),
            FilterOp::Nin(values) => !values.iter().any(|v| Self::eq_match(raw, &key, v)),
            FilterOp::Exists(expected) => !key.is_null() == *expected,
        }
    }

    /// Raw value and cell projection of a field.
    ///
    /// `_id` and `_rev` come from the revision, not the body.
    pub(crate) fn lookup<'a>(revision: &'a Revision, field: &str) -> (Option<&'a Value>, IndexKey) {
        match field {
            DOC_ID_FIELD => (None, IndexKey::Text(revision.doc_id.clone())),
            REV_ID_FIELD => (None, IndexKey::Text(revision.rev_id.clone())),
            path => {
                let raw = extract_path(&revision.body, path);
                let key = raw.map(IndexKey::from_json).unwrap_or(IndexKey::Null);
                (raw, key)
            }
        }
    }

    fn eq_match(raw: Option<&Value>, key: &IndexKey, expected: &Value) -> bool {
        match expected {
            Value::Array(_) | Value::Object(_) => raw == Some(expected),
            scalar => key.sql_eq(&IndexKey::from_json(scalar)),
        }
    }

    fn range_match(key: &IndexKey, bound: &Value, accept: fn(Ordering) -> bool) -> bool {
        if !IndexKey::is_scalar(bound) || key.is_null() {
            return false;
        }
        accept(key.compare(&IndexKey::from_json(bound)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::parser::parse_selector;
    use serde_json::json;

    fn rev(id: &str, body: Value) -> Revision {
        Revision {
            doc_id: id.to_string(),
            rev_id: "gen-00000001".to_string(),
            sequence: 1,
            body,
        }
    }

    fn matches(body: Value, selector: Value) -> bool {
        PredicateFilter::matches(&rev("doc1", body), &parse_selector(&selector).unwrap())
    }

    #[test]
    fn test_equality() {
        assert!(matches(json!({"name": "Alice"}), json!({"name": "Alice"})));
        assert!(!matches(json!({"name": "Bob"}), json!({"name": "Alice"})));
        assert!(!matches(json!({}), json!({"name": "Alice"})));
        // null never equals, not even null
        assert!(!matches(json!({"name": null}), json!({"name": null})));
    }

    #[test]
    fn test_booleans_project_to_integers() {
        assert!(matches(json!({"flag": true}), json!({"flag": true})));
        assert!(matches(json!({"flag": 1}), json!({"flag": true})));
        assert!(!matches(json!({"flag": false}), json!({"flag": true})));
    }

    #[test]
    fn test_numeric_classes_compare() {
        assert!(matches(json!({"n": 2}), json!({"n": 2.0})));
        assert!(matches(json!({"n": 2.5}), json!({"n": {"$gt": 2}})));
    }

    #[test]
    fn test_ranges_follow_storage_class_order() {
        assert!(matches(json!({"age": 30}), json!({"age": {"$gte": 30, "$lt": 40}})));
        assert!(!matches(json!({"age": 40}), json!({"age": {"$gte": 30, "$lt": 40}})));
        // TEXT sorts after every number
        assert!(matches(json!({"age": "old"}), json!({"age": {"$gt": 100}})));
        assert!(!matches(json!({}), json!({"age": {"$lt": 100}})));
    }

    #[test]
    fn test_negations_match_missing_fields() {
        assert!(matches(json!({}), json!({"pet": {"$ne": "cat"}})));
        assert!(matches(json!({"pet": "dog"}), json!({"pet": {"$ne": "cat"}})));
        assert!(!matches(json!({"pet": "cat"}), json!({"pet": {"$ne": "cat"}})));

        assert!(matches(json!({}), json!({"pet": {"$nin": ["cat"]}})));
        assert!(matches(json!({}), json!({"pet": {"$not": {"$eq": "cat"}}})));
        assert!(!matches(json!({"pet": "cat"}), json!({"pet": {"$not": {"$eq": "cat"}}})));
    }

    #[test]
    fn test_membership_and_exists() {
        assert!(matches(json!({"tag": "b"}), json!({"tag": {"$in": ["a", "b"]}})));
        assert!(!matches(json!({"tag": "c"}), json!({"tag": {"$in": ["a", "b"]}})));
        assert!(!matches(json!({"tag": "a"}), json!({"tag": {"$in": []}})));

        assert!(matches(json!({"nick": "x"}), json!({"nick": {"$exists": true}})));
        assert!(matches(json!({}), json!({"nick": {"$exists": false}})));
        // arrays have no cell value
        assert!(matches(json!({"nick": [1]}), json!({"nick": {"$exists": false}})));
    }

    #[test]
    fn test_logical_operators() {
        let selector = json!({"$or": [{"age": {"$lt": 18}}, {"age": {"$gt": 65}}]});
        assert!(matches(json!({"age": 10}), selector.clone()));
        assert!(matches(json!({"age": 70}), selector.clone()));
        assert!(!matches(json!({"age": 40}), selector));
    }

    #[test]
    fn test_nested_paths_and_structured_values() {
        let body = json!({"address": {"city": "Oslo", "tags": [1, 2]}});
        assert!(matches(body.clone(), json!({"address.city": "Oslo"})));
        assert!(matches(body.clone(), json!({"address.tags": [1, 2]})));
        assert!(!matches(body, json!({"address.tags": [2, 1]})));
    }

    #[test]
    fn test_implicit_fields_come_from_revision() {
        assert!(matches(json!({}), json!({"_id": "doc1"})));
        assert!(matches(json!({"_id": "spoofed"}), json!({"_id": "doc1"})));
        assert!(matches(json!({}), json!({"_rev": {"$exists": true}})));
    }
}
