//! Query compiler
//!
//! Turns a parsed `Query` and the index catalog into a parameterized SQL
//! statement over one index table, plus whatever must still happen in
//! process (residual predicates, sort, paging).
//!
//! # Index selection (greedy, no cost model)
//!
//! A top-level clause is covered by an index when every field it references
//! is a column of that index and all its operands bind as parameters. The
//! chosen index maximizes, in order:
//!
//! 1. length of its field-list prefix matched by top-level equality fields
//! 2. number of covered clauses
//! 3. whether it can serve the requested sort
//!
//! Ties go to the index with fewer fields, then the smaller name. Without
//! any candidate the built-in `_all_docs` projection is scanned and the
//! whole selector is evaluated in process.

use std::cmp::Reverse;

use serde_json::Value;

use super::ast::{FilterOp, Predicate, Query, Selector, SortDirection, SortSpec};
use crate::index::{
    quote_identifier, table_name_for_index, IndexDefinition, IndexKey, QueryError, QueryResult,
    ALL_DOCS_INDEX, DOC_ID_FIELD,
};

/// SQL text with `?` placeholders and the values bound to them, in order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParts {
    pub sql_with_placeholders: String,
    pub placeholder_values: Vec<IndexKey>,
}

impl SqlParts {
    pub fn new(sql: impl Into<String>, values: Vec<IndexKey>) -> Self {
        Self {
            sql_with_placeholders: sql.into(),
            placeholder_values: values,
        }
    }
}

/// Output of compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Index whose table the statement reads
    pub index_name: String,
    /// Statement selecting matching document IDs
    pub sql: SqlParts,
    /// Clauses not covered by the index, evaluated in process
    pub residual: Option<Selector>,
    /// Sort keys the index cannot serve, applied in process
    pub in_process_sort: Option<Vec<SortSpec>>,
    pub skip: usize,
    pub limit: Option<usize>,
    /// Whether skip/limit are already part of the statement
    pub sql_paging: bool,
}

impl CompiledQuery {
    /// Whether document bodies must be loaded before results are final
    pub fn needs_documents(&self) -> bool {
        self.residual.is_some() || self.in_process_sort.is_some()
    }
}

/// Compiles queries against a fixed catalog
pub struct QueryCompiler<'a> {
    catalog: &'a [IndexDefinition],
}

impl<'a> QueryCompiler<'a> {
    /// Creates a compiler over the given catalog (including `_all_docs`)
    pub fn new(catalog: &'a [IndexDefinition]) -> Self {
        Self { catalog }
    }

    /// Compiles a query, returning the statement and in-process remainder.
    ///
    /// Deterministic: same catalog and query produce the same output.
    pub fn compile(&self, query: &Query) -> QueryResult<CompiledQuery> {
        let clauses = query.selector.top_level_clauses();
        let index = self.select_index(query, &clauses)?;
        let table = quote_identifier(&table_name_for_index(&index.name));

        let mut covered = Vec::new();
        let mut residual = Vec::new();
        for clause in clauses {
            if Self::covers(index, clause) {
                covered.push(clause);
            } else {
                residual.push(clause.clone());
            }
        }

        let mut values = Vec::new();
        let where_sql = if covered.is_empty() {
            None
        } else {
            let parts: QueryResult<Vec<String>> = covered
                .iter()
                .map(|clause| clause_sql(clause, &table, &mut values))
                .collect();
            Some(parts?.join(" AND "))
        };

        let sort_in_sql = query.sort.iter().all(|s| index.has_column(&s.field));
        let residual = if residual.is_empty() {
            None
        } else {
            Some(Selector::conjunction(residual))
        };
        let in_process_sort = if sort_in_sql {
            None
        } else {
            Some(query.sort.clone())
        };
        let sql_paging = residual.is_none() && in_process_sort.is_none();

        let mut sql = format!("SELECT {} FROM {}", quote_identifier(DOC_ID_FIELD), table);
        if let Some(where_sql) = where_sql {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        if sort_in_sql && !query.sort.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by(&query.sort));
        }
        if sql_paging && (query.limit.is_some() || query.skip > 0) {
            // SQLite treats a negative limit as "no limit"
            let limit = query
                .limit
                .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
                .unwrap_or(-1);
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(IndexKey::Int(limit));
            values.push(IndexKey::Int(i64::try_from(query.skip).unwrap_or(i64::MAX)));
        }

        Ok(CompiledQuery {
            index_name: index.name.clone(),
            sql: SqlParts::new(sql, values),
            residual,
            in_process_sort,
            skip: query.skip,
            limit: query.limit,
            sql_paging,
        })
    }

    /// Greedy index choice, see module docs
    fn select_index(&self, query: &Query, clauses: &[&Selector]) -> QueryResult<&'a IndexDefinition> {
        let equality_fields = query.selector.equality_fields();

        let best = self
            .catalog
            .iter()
            .filter(|index| !index.is_all_docs())
            .filter_map(|index| {
                let prefix = index
                    .fields
                    .iter()
                    .take_while(|f| equality_fields.contains(f.as_str()))
                    .count();
                let covered = clauses.iter().filter(|c| Self::covers(index, c)).count();
                let serves_sort = !query.sort.is_empty()
                    && query.sort.iter().all(|s| index.has_column(&s.field));

                if covered == 0 && !serves_sort {
                    return None;
                }
                let score = (
                    prefix,
                    covered,
                    serves_sort,
                    Reverse(index.fields.len()),
                    Reverse(index.name.as_str()),
                );
                Some((score, index))
            })
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, index)| index);

        match best {
            Some(index) => Ok(index),
            None => self
                .catalog
                .iter()
                .find(|index| index.is_all_docs())
                .ok_or_else(|| {
                    QueryError::sql(format!("catalog is missing '{}'", ALL_DOCS_INDEX))
                }),
        }
    }

    fn covers(index: &IndexDefinition, clause: &Selector) -> bool {
        clause.is_sql_compatible() && clause.fields().iter().all(|f| index.has_column(f))
    }
}

fn order_by(sort: &[SortSpec]) -> String {
    let mut terms: Vec<String> = sort
        .iter()
        .map(|s| {
            let direction = match s.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!("{} {}", quote_identifier(&s.field), direction)
        })
        .collect();

    // ties resolve by document ID, matching in-process sorting
    if !sort.iter().any(|s| s.field == DOC_ID_FIELD) {
        terms.push(format!("{} ASC", quote_identifier(DOC_ID_FIELD)));
    }
    terms.join(", ")
}

/// SQL for one selector node. Every operand becomes a placeholder.
fn clause_sql(selector: &Selector, table: &str, values: &mut Vec<IndexKey>) -> QueryResult<String> {
    match selector {
        Selector::Predicate(predicate) => predicate_sql(predicate, table, values),
        Selector::And(children) if children.is_empty() => Ok("1".to_string()),
        Selector::And(children) => join_children(children, " AND ", table, values),
        Selector::Or(children) => join_children(children, " OR ", table, values),
        Selector::Not(inner) => {
            let inner_sql = clause_sql(inner, table, values)?;
            Ok(excluding(table, &inner_sql))
        }
    }
}

fn join_children(
    children: &[Selector],
    separator: &str,
    table: &str,
    values: &mut Vec<IndexKey>,
) -> QueryResult<String> {
    let parts: QueryResult<Vec<String>> = children
        .iter()
        .map(|child| clause_sql(child, table, values))
        .collect();
    Ok(format!("({})", parts?.join(separator)))
}

fn predicate_sql(predicate: &Predicate, table: &str, values: &mut Vec<IndexKey>) -> QueryResult<String> {
    let column = quote_identifier(&predicate.field);
    let mut bind = |value: &Value| -> QueryResult<()> {
        if matches!(value, Value::Array(_) | Value::Object(_)) {
            return Err(QueryError::invalid_selector(format!(
                "'{}' cannot compare against {}",
                predicate.field, value
            )));
        }
        values.push(IndexKey::from_json(value));
        Ok(())
    };

    let sql = match &predicate.op {
        FilterOp::Eq(v) => {
            bind(v)?;
            format!("{} = ?", column)
        }
        FilterOp::Gt(v) => {
            bind(v)?;
            format!("{} > ?", column)
        }
        FilterOp::Gte(v) => {
            bind(v)?;
            format!("{} >= ?", column)
        }
        FilterOp::Lt(v) => {
            bind(v)?;
            format!("{} < ?", column)
        }
        FilterOp::Lte(v) => {
            bind(v)?;
            format!("{} <= ?", column)
        }
        FilterOp::Ne(v) => {
            bind(v)?;
            excluding(table, &format!("{} = ?", column))
        }
        FilterOp::In(vs) if vs.is_empty() => "0".to_string(),
        FilterOp::In(vs) => {
            for v in vs {
                bind(v)?;
            }
            format!("{} IN ({})", column, placeholders(vs.len()))
        }
        FilterOp::Nin(vs) if vs.is_empty() => "1".to_string(),
        FilterOp::Nin(vs) => {
            for v in vs {
                bind(v)?;
            }
            excluding(table, &format!("{} IN ({})", column, placeholders(vs.len())))
        }
        FilterOp::Exists(true) => format!("{} IS NOT NULL", column),
        FilterOp::Exists(false) => format!("{} IS NULL", column),
    };
    Ok(sql)
}

/// Rows whose document does not satisfy `condition`, including rows where
/// the condition evaluates to NULL because the field is missing
fn excluding(table: &str, condition: &str) -> String {
    let id = quote_identifier(DOC_ID_FIELD);
    format!(
        "{} NOT IN (SELECT {} FROM {} WHERE {})",
        id, id, table, condition
    )
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
