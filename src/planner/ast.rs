//! Query AST structures
//!
//! Selectors parse into a tagged predicate tree: comparison leaves joined by
//! AND, OR and NOT nodes.

use std::collections::BTreeSet;

use serde_json::Value;

/// Comparison applied to one field
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// field = value
    Eq(Value),
    /// field != value, or field missing
    Ne(Value),
    /// field > value
    Gt(Value),
    /// field >= value
    Gte(Value),
    /// field < value
    Lt(Value),
    /// field <= value
    Lte(Value),
    /// field equals one of the values
    In(Vec<Value>),
    /// field equals none of the values, or is missing
    Nin(Vec<Value>),
    /// field has (true) or lacks (false) an indexable value
    Exists(bool),
}

impl FilterOp {
    /// Returns true if this is an equality operation
    pub fn is_equality(&self) -> bool {
        matches!(self, FilterOp::Eq(_))
    }

    /// Returns true if this is a range operation
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            FilterOp::Gte(_) | FilterOp::Gt(_) | FilterOp::Lte(_) | FilterOp::Lt(_)
        )
    }

    /// Returns the operator as written in a query document
    pub fn op_name(&self) -> &'static str {
        match self {
            FilterOp::Eq(_) => "$eq",
            FilterOp::Ne(_) => "$ne",
            FilterOp::Gt(_) => "$gt",
            FilterOp::Gte(_) => "$gte",
            FilterOp::Lt(_) => "$lt",
            FilterOp::Lte(_) => "$lte",
            FilterOp::In(_) => "$in",
            FilterOp::Nin(_) => "$nin",
            FilterOp::Exists(_) => "$exists",
        }
    }

    /// Values this operation compares against
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            FilterOp::Eq(v)
            | FilterOp::Ne(v)
            | FilterOp::Gt(v)
            | FilterOp::Gte(v)
            | FilterOp::Lt(v)
            | FilterOp::Lte(v) => vec![v],
            FilterOp::In(vs) | FilterOp::Nin(vs) => vs.iter().collect(),
            FilterOp::Exists(_) => Vec::new(),
        }
    }
}

/// A single predicate (field + operation)
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Field path
    pub field: String,
    /// Filter operation
    pub op: FilterOp,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: FilterOp) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }

    /// Create an equality predicate
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Eq(value))
    }

    /// Create a range predicate (gt)
    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Gt(value))
    }

    /// Create a range predicate (lt)
    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Lt(value))
    }

    /// Whether every operand can be bound as an SQL parameter.
    ///
    /// Arrays and objects have no cell representation, so predicates on them
    /// are evaluated in process.
    pub fn is_sql_compatible(&self) -> bool {
        self.op
            .operands()
            .iter()
            .all(|v| !matches!(v, Value::Array(_) | Value::Object(_)))
    }
}

/// Predicate tree of a query
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Comparison leaf
    Predicate(Predicate),
    /// All children match (empty matches everything)
    And(Vec<Selector>),
    /// At least one child matches
    Or(Vec<Selector>),
    /// Child does not match
    Not(Box<Selector>),
}

impl Selector {
    /// Selector matching every document
    pub fn match_all() -> Self {
        Selector::And(Vec::new())
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Selector::And(children) if children.is_empty())
    }

    /// Field paths referenced anywhere in the tree
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, into: &mut BTreeSet<&'a str>) {
        match self {
            Selector::Predicate(p) => {
                into.insert(p.field.as_str());
            }
            Selector::And(children) | Selector::Or(children) => {
                for child in children {
                    child.collect_fields(into);
                }
            }
            Selector::Not(inner) => inner.collect_fields(into),
        }
    }

    /// Whether every leaf can be compiled to SQL
    pub fn is_sql_compatible(&self) -> bool {
        match self {
            Selector::Predicate(p) => p.is_sql_compatible(),
            Selector::And(children) | Selector::Or(children) => {
                children.iter().all(Selector::is_sql_compatible)
            }
            Selector::Not(inner) => inner.is_sql_compatible(),
        }
    }

    /// Clauses of the top-level conjunction, nested ANDs flattened
    pub fn top_level_clauses(&self) -> Vec<&Selector> {
        match self {
            Selector::And(children) => children
                .iter()
                .flat_map(Selector::top_level_clauses)
                .collect(),
            other => vec![other],
        }
    }

    /// Fields compared for equality in the top-level conjunction
    pub fn equality_fields(&self) -> BTreeSet<&str> {
        self.top_level_clauses()
            .into_iter()
            .filter_map(|clause| match clause {
                Selector::Predicate(p) if p.op.is_equality() => Some(p.field.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Conjunction of the given clauses, collapsing the single-clause case
    pub fn conjunction(mut clauses: Vec<Selector>) -> Selector {
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Selector::And(clauses)
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One sort key and its direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    /// Field to sort by
    pub field: String,
    /// Sort direction
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// A parsed query: selector plus sort, paging and projection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub selector: Selector,
    pub sort: Vec<SortSpec>,
    pub skip: usize,
    /// `None` returns every match
    pub limit: Option<usize>,
    /// Top-level fields to keep in returned bodies; `None` keeps all
    pub fields: Option<Vec<String>>,
}

impl Query {
    /// Creates a query with the given selector and no options
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            sort: Vec::new(),
            skip: 0,
            limit: None,
            fields: None,
        }
    }

    /// Adds a sort key
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }
}
