//! Persisted index catalog
//!
//! One metadata row per index, stored next to the index tables:
//!
//! | column         | content                          |
//! |----------------|----------------------------------|
//! | index_name     | primary key                      |
//! | index_type     | `json`                           |
//! | index_settings | settings as JSON text            |
//! | fields         | field paths as a JSON array      |
//! | last_sequence  | watermark of the change feed     |
//!
//! The watermark is only written inside a transaction that also carries the
//! index rows it accounts for.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use super::definition::{IndexDefinition, IndexType};
use super::errors::{QueryError, QueryResult};

/// Name of the metadata table
pub const METADATA_TABLE: &str = "_t_mango_query_metadata";

/// A catalogued index and its watermark
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub definition: IndexDefinition,
    pub last_sequence: u64,
}

/// Create the metadata table if it does not exist yet
pub fn create_metadata_table(conn: &Connection) -> QueryResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            index_name TEXT PRIMARY KEY NOT NULL,
            index_type TEXT NOT NULL,
            index_settings TEXT NOT NULL,
            fields TEXT NOT NULL,
            last_sequence INTEGER NOT NULL DEFAULT 0
        )",
        METADATA_TABLE
    ))?;
    Ok(())
}

/// Load every catalogued index ordered by name
pub fn load_all(conn: &Connection) -> QueryResult<Vec<CatalogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT index_name, index_type, index_settings, fields, last_sequence
         FROM {} ORDER BY index_name",
        METADATA_TABLE
    ))?;

    let rows = stmt.query_map([], RawEntry::from_row)?;
    let mut entries = Vec::new();
    for raw in rows {
        entries.push(raw?.decode()?);
    }
    Ok(entries)
}

/// One catalog row, decoded independently of its neighbours
#[derive(Debug, Clone)]
pub struct CatalogRow {
    pub name: String,
    /// Stored field list, if it decodes even when the rest of the row does not
    pub fields: Option<Vec<String>>,
    pub entry: QueryResult<CatalogEntry>,
}

/// Load every catalog row ordered by name, keeping decode failures per row
pub fn load_each(conn: &Connection) -> QueryResult<Vec<CatalogRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT index_name, index_type, index_settings, fields, last_sequence
         FROM {} ORDER BY index_name",
        METADATA_TABLE
    ))?;

    let rows = stmt.query_map([], RawEntry::from_row)?;
    let mut decoded = Vec::new();
    for raw in rows {
        let raw = raw?;
        decoded.push(CatalogRow {
            name: raw.name.clone(),
            fields: serde_json::from_str(&raw.fields).ok(),
            entry: raw.decode(),
        });
    }
    Ok(decoded)
}

/// Load a single index entry
pub fn load(conn: &Connection, name: &str) -> QueryResult<Option<CatalogEntry>> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT index_name, index_type, index_settings, fields, last_sequence
                 FROM {} WHERE index_name = ?1",
                METADATA_TABLE
            ),
            params![name],
            RawEntry::from_row,
        )
        .optional()?;

    raw.map(RawEntry::decode).transpose()
}

/// Name of a catalogued index equal to `name` up to ASCII case, but not
/// identical to it
pub fn find_case_variant(conn: &Connection, name: &str) -> QueryResult<Option<String>> {
    let other = conn
        .query_row(
            &format!(
                "SELECT index_name FROM {}
                 WHERE index_name = ?1 COLLATE NOCASE AND index_name <> ?1
                 LIMIT 1",
                METADATA_TABLE
            ),
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(other)
}

/// Insert the metadata row of a new index with watermark 0
pub fn insert(conn: &Connection, definition: &IndexDefinition) -> QueryResult<()> {
    let fields = serde_json::to_string(&definition.fields)
        .map_err(|e| QueryError::sql(format!("encoding field list: {}", e)))?;
    let settings = serde_json::to_string(&definition.settings)
        .map_err(|e| QueryError::sql(format!("encoding index settings: {}", e)))?;

    conn.execute(
        &format!(
            "INSERT INTO {} (index_name, index_type, index_settings, fields, last_sequence)
             VALUES (?1, ?2, ?3, ?4, 0)",
            METADATA_TABLE
        ),
        params![definition.name, definition.index_type.as_str(), settings, fields],
    )?;
    Ok(())
}

/// Remove the metadata row. Returns false if there was none.
pub fn remove(conn: &Connection, name: &str) -> QueryResult<bool> {
    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE index_name = ?1", METADATA_TABLE),
        params![name],
    )?;
    Ok(removed > 0)
}

/// Current watermark of an index
pub fn watermark(conn: &Connection, name: &str) -> QueryResult<u64> {
    let seq: Option<i64> = conn
        .query_row(
            &format!(
                "SELECT last_sequence FROM {} WHERE index_name = ?1",
                METADATA_TABLE
            ),
            params![name],
            |row| row.get(0),
        )
        .optional()?;

    match seq {
        Some(seq) => sequence_from_sql(seq),
        None => Err(QueryError::index_not_found(name)),
    }
}

/// Advance the watermark. Callers must hold the transaction that also
/// carries the corresponding index rows.
pub fn set_watermark(conn: &Connection, name: &str, sequence: u64) -> QueryResult<()> {
    let updated = conn.execute(
        &format!(
            "UPDATE {} SET last_sequence = ?1 WHERE index_name = ?2",
            METADATA_TABLE
        ),
        params![sequence_to_sql(sequence)?, name],
    )?;

    if updated == 0 {
        return Err(QueryError::index_not_found(name));
    }
    Ok(())
}

pub(crate) fn sequence_to_sql(sequence: u64) -> QueryResult<i64> {
    i64::try_from(sequence)
        .map_err(|_| QueryError::sql(format!("sequence {} exceeds storage range", sequence)))
}

fn sequence_from_sql(sequence: i64) -> QueryResult<u64> {
    u64::try_from(sequence)
        .map_err(|_| QueryError::sql(format!("stored sequence {} is negative", sequence)))
}

/// Row as stored, before JSON decoding
struct RawEntry {
    name: String,
    index_type: String,
    settings: String,
    fields: String,
    last_sequence: i64,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            index_type: row.get(1)?,
            settings: row.get(2)?,
            fields: row.get(3)?,
            last_sequence: row.get(4)?,
        })
    }

    fn decode(self) -> QueryResult<CatalogEntry> {
        let index_type: IndexType = self.index_type.parse()?;
        let fields: Vec<String> = serde_json::from_str(&self.fields).map_err(|e| {
            QueryError::sql(format!("index '{}' has a corrupt field list: {}", self.name, e))
        })?;
        let settings: Value = serde_json::from_str(&self.settings).map_err(|e| {
            QueryError::sql(format!("index '{}' has corrupt settings: {}", self.name, e))
        })?;

        Ok(CatalogEntry {
            definition: IndexDefinition {
                name: self.name,
                fields,
                settings,
                index_type,
            },
            last_sequence: sequence_from_sql(self.last_sequence)?,
        })
    }
}
