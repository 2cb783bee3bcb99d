//! Index definitions
//!
//! An `IndexDefinition` is an immutable value: it is validated once and then
//! handed to the creator, updater and compiler.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{QueryError, QueryResult};

/// Name of the built-in covering projection over every document
pub const ALL_DOCS_INDEX: &str = "_all_docs";

/// Implicit column holding the document ID
pub const DOC_ID_FIELD: &str = "_id";

/// Implicit column holding the revision ID
pub const REV_ID_FIELD: &str = "_rev";

/// Kind of index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// Index over scalar JSON values
    Json,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Json => "json",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(IndexType::Json),
            other => Err(QueryError::sql(format!(
                "stored index type '{}' is not supported",
                other
            ))),
        }
    }
}

/// Immutable description of one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index name
    pub name: String,
    /// Ordered field paths
    pub fields: Vec<String>,
    /// Opaque settings persisted with the index
    #[serde(default)]
    pub settings: Value,
    /// Index type
    #[serde(rename = "type")]
    pub index_type: IndexType,
}

impl IndexDefinition {
    /// Create a JSON index definition
    pub fn json(name: impl Into<String>, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            settings: Value::Null,
            index_type: IndexType::Json,
        }
    }

    /// The built-in projection of every live document
    pub fn all_docs() -> Self {
        Self::json(ALL_DOCS_INDEX, [DOC_ID_FIELD, REV_ID_FIELD])
    }

    /// Sets the opaque settings
    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    /// Whether this is the engine's built-in projection
    pub fn is_all_docs(&self) -> bool {
        self.name == ALL_DOCS_INDEX
    }

    /// Validate name grammar and field list.
    ///
    /// Must hold before anything is persisted.
    pub fn validate(&self) -> QueryResult<()> {
        validate_index_name(&self.name)?;
        if self.is_all_docs() {
            return Err(QueryError::invalid_index_name(format!(
                "'{}' is reserved",
                ALL_DOCS_INDEX
            )));
        }
        validate_fields(&self.fields)
    }

    /// Field paths that need their own column (`_id` / `_rev` are implicit)
    pub fn value_columns(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(String::as_str)
            .filter(|f| !is_implicit_field(f))
    }

    /// Whether `field` can be read from this index's table
    pub fn has_column(&self, field: &str) -> bool {
        is_implicit_field(field) || self.fields.iter().any(|f| f == field)
    }

    /// Whether two definitions describe the same physical index
    pub fn same_shape(&self, other: &IndexDefinition) -> bool {
        self.fields == other.fields && self.index_type == other.index_type
    }
}

/// Whether the field maps onto an implicit column
pub fn is_implicit_field(field: &str) -> bool {
    field == DOC_ID_FIELD || field == REV_ID_FIELD
}

/// Names: letters, digits and underscores, not starting with a digit
pub fn validate_index_name(name: &str) -> QueryResult<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(QueryError::invalid_index_name("index name is empty"));
    };

    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(QueryError::invalid_index_name(format!(
            "index name '{}' must start with a letter or underscore",
            name
        )));
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(QueryError::invalid_index_name(format!(
            "index name '{}' may only contain letters, digits and underscores",
            name
        )));
    }

    Ok(())
}

fn validate_fields(fields: &[String]) -> QueryResult<()> {
    if fields.is_empty() {
        return Err(QueryError::invalid_index_name("index requires at least one field"));
    }

    // columns are SQLite identifiers, which ignore ASCII case
    let mut seen = HashSet::new();
    for field in fields {
        validate_field_path(field)?;
        let column = field.to_ascii_lowercase();
        if !is_implicit_field(field) && is_implicit_field(&column) {
            return Err(QueryError::invalid_index_name(format!(
                "field '{}' collides with the implicit '{}' column",
                field, column
            )));
        }
        if !seen.insert(column) {
            return Err(QueryError::invalid_index_name(format!(
                "field '{}' appears more than once (column names ignore case)",
                field
            )));
        }
    }

    Ok(())
}

/// Field paths are dot-separated, non-empty segments not starting with `$`
pub fn validate_field_path(field: &str) -> QueryResult<()> {
    let valid = !field.is_empty()
        && field
            .split('.')
            .all(|segment| !segment.is_empty() && !segment.starts_with('$'));

    if valid {
        Ok(())
    } else {
        Err(QueryError::invalid_index_name(format!(
            "invalid field path '{}'",
            field
        )))
    }
}
