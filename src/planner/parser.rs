//! Query document parser
//!
//! Validates MongoDB/CouchDB-style query documents and produces the typed
//! `Selector` tree. Unknown operators are rejected here, never at execution.
//!
//! Accepted selector forms:
//!
//! ```text
//! {"name": "Alice"}                         implicit $eq
//! {"age": {"$gt": 18, "$lte": 65}}          operator document, ANDed
//! {"$and": [{...}, {...}]}                  explicit conjunction
//! {"$or":  [{...}, {...}]}                  disjunction
//! {"pet":  {"$not": {"$eq": "cat"}}}        negated operator document
//! {"tag":  {"$in": ["a", "b"]}}             membership
//! {"nick": {"$exists": true}}               presence
//! ```

use serde_json::{Map, Value};

use super::ast::{FilterOp, Predicate, Query, Selector, SortDirection, SortSpec};
use crate::index::{validate_field_path, QueryError, QueryResult};

/// Parse a selector document
pub fn parse_selector(selector: &Value) -> QueryResult<Selector> {
    let Value::Object(map) = selector else {
        return Err(QueryError::invalid_selector(format!(
            "selector must be an object, got {}",
            selector
        )));
    };

    let mut clauses = Vec::with_capacity(map.len());
    for (key, value) in map {
        match key.as_str() {
            "$and" => clauses.push(Selector::And(parse_logical(key, value)?)),
            "$or" => clauses.push(Selector::Or(parse_logical(key, value)?)),
            op if op.starts_with('$') => {
                return Err(QueryError::invalid_selector(format!(
                    "unknown top-level operator '{}'",
                    op
                )));
            }
            field => clauses.push(parse_field(field, value)?),
        }
    }

    Ok(Selector::conjunction(clauses))
}

/// Parse a sort document: `["name", {"age": "desc"}]`
pub fn parse_sort(sort: &Value) -> QueryResult<Vec<SortSpec>> {
    let Value::Array(items) = sort else {
        return Err(QueryError::invalid_selector("sort must be an array"));
    };

    items.iter().map(parse_sort_item).collect()
}

/// Parse a projection list: `["name", "address.city"]`
pub fn parse_fields(fields: &Value) -> QueryResult<Vec<String>> {
    let Value::Array(items) = fields else {
        return Err(QueryError::invalid_selector("fields must be an array"));
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(field) => {
                check_field(field)?;
                Ok(field.clone())
            }
            other => Err(QueryError::invalid_selector(format!(
                "projected field must be a string, got {}",
                other
            ))),
        })
        .collect()
}

/// Parse a whole query document with optional `sort`, `skip`, `limit` and
/// `fields` keys next to `selector`
pub fn parse_query(document: &Value) -> QueryResult<Query> {
    let Value::Object(map) = document else {
        return Err(QueryError::invalid_selector("query must be an object"));
    };

    let selector = match map.get("selector") {
        Some(selector) => parse_selector(selector)?,
        None => return Err(QueryError::invalid_selector("query has no selector")),
    };

    let mut query = Query::new(selector);
    for (key, value) in map {
        match key.as_str() {
            "selector" => {}
            "sort" => query.sort = parse_sort(value)?,
            "fields" => query.fields = Some(parse_fields(value)?),
            "skip" => query.skip = parse_count(key, value)?,
            "limit" => query.limit = Some(parse_count(key, value)?),
            other => {
                return Err(QueryError::invalid_selector(format!(
                    "unknown query key '{}'",
                    other
                )));
            }
        }
    }
    Ok(query)
}

fn parse_logical(op: &str, value: &Value) -> QueryResult<Vec<Selector>> {
    match value {
        Value::Array(items) if !items.is_empty() => items.iter().map(parse_selector).collect(),
        _ => Err(QueryError::invalid_selector(format!(
            "'{}' requires a non-empty array of selectors",
            op
        ))),
    }
}

fn parse_field(field: &str, value: &Value) -> QueryResult<Selector> {
    check_field(field)?;

    match value {
        Value::Object(ops) if is_operator_document(ops) => {
            let clauses = parse_operators(field, ops)?;
            Ok(Selector::conjunction(clauses))
        }
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
            Err(QueryError::invalid_selector(format!(
                "field '{}' mixes operators and plain keys",
                field
            )))
        }
        other => Ok(Selector::Predicate(Predicate::eq(field, other.clone()))),
    }
}

fn is_operator_document(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn parse_operators(field: &str, ops: &Map<String, Value>) -> QueryResult<Vec<Selector>> {
    let mut clauses = Vec::with_capacity(ops.len());

    for (op, operand) in ops {
        let filter = match op.as_str() {
            "$eq" => FilterOp::Eq(operand.clone()),
            "$ne" => FilterOp::Ne(operand.clone()),
            "$gt" => FilterOp::Gt(range_operand(op, operand)?),
            "$gte" => FilterOp::Gte(range_operand(op, operand)?),
            "$lt" => FilterOp::Lt(range_operand(op, operand)?),
            "$lte" => FilterOp::Lte(range_operand(op, operand)?),
            "$in" => FilterOp::In(array_operand(op, operand)?),
            "$nin" => FilterOp::Nin(array_operand(op, operand)?),
            "$exists" => match operand {
                Value::Bool(b) => FilterOp::Exists(*b),
                _ => {
                    return Err(QueryError::invalid_selector(
                        "'$exists' requires a boolean",
                    ));
                }
            },
            "$not" => {
                let inner = match operand {
                    Value::Object(inner) if is_operator_document(inner) => {
                        parse_operators(field, inner)?
                    }
                    _ => {
                        return Err(QueryError::invalid_selector(
                            "'$not' requires an operator document",
                        ));
                    }
                };
                clauses.push(Selector::Not(Box::new(Selector::conjunction(inner))));
                continue;
            }
            unknown => {
                return Err(QueryError::invalid_selector(format!(
                    "unknown operator '{}' on field '{}'",
                    unknown, field
                )));
            }
        };
        clauses.push(Selector::Predicate(Predicate::new(field, filter)));
    }

    Ok(clauses)
}

/// Range bounds must be scalars; arrays and objects have no ordering
fn range_operand(op: &str, operand: &Value) -> QueryResult<Value> {
    match operand {
        Value::Array(_) | Value::Object(_) => Err(QueryError::invalid_selector(format!(
            "'{}' requires a scalar operand",
            op
        ))),
        scalar => Ok(scalar.clone()),
    }
}

fn array_operand(op: &str, operand: &Value) -> QueryResult<Vec<Value>> {
    match operand {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(QueryError::invalid_selector(format!(
            "'{}' requires an array",
            op
        ))),
    }
}

fn parse_sort_item(item: &Value) -> QueryResult<SortSpec> {
    match item {
        Value::String(field) => {
            check_field(field)?;
            Ok(SortSpec::asc(field.clone()))
        }
        Value::Object(map) if map.len() == 1 => {
            let (field, direction) = map
                .iter()
                .next()
                .ok_or_else(|| QueryError::invalid_selector("empty sort entry"))?;
            check_field(field)?;
            let direction = match direction.as_str() {
                Some("asc") => SortDirection::Asc,
                Some("desc") => SortDirection::Desc,
                _ => {
                    return Err(QueryError::invalid_selector(format!(
                        "sort direction for '{}' must be \"asc\" or \"desc\"",
                        field
                    )));
                }
            };
            Ok(SortSpec {
                field: field.clone(),
                direction,
            })
        }
        other => Err(QueryError::invalid_selector(format!(
            "invalid sort entry {}",
            other
        ))),
    }
}

fn parse_count(key: &str, value: &Value) -> QueryResult<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            QueryError::invalid_selector(format!("'{}' must be a non-negative integer", key))
        })
}

fn check_field(field: &str) -> QueryResult<()> {
    validate_field_path(field)
        .map_err(|_| QueryError::invalid_selector(format!("invalid field path '{}'", field)))
}
