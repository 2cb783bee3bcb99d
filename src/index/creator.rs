//! Physical index creation
//!
//! Turns an `IndexDefinition` into a table, a secondary SQL index over the
//! field columns and a metadata row. All three are created in one
//! transaction; a half-created index is never observable.

use rusqlite::Connection;
use tracing::info;

use super::catalog;
use super::definition::{IndexDefinition, DOC_ID_FIELD, REV_ID_FIELD};
use super::errors::{QueryError, QueryResult};

/// Prefix of every index table
pub const INDEX_TABLE_PREFIX: &str = "_t_mango_query_index_";

/// Prefix of the secondary SQL index over an index table's field columns.
///
/// Tables and SQL indexes share one SQLite namespace; the distinct prefix
/// keeps the two name sets disjoint for every valid index name.
pub const SQL_INDEX_PREFIX: &str = "_i_mango_query_index_";

/// Physical table name of an index
pub fn table_name_for_index(index_name: &str) -> String {
    format!("{}{}", INDEX_TABLE_PREFIX, index_name)
}

/// Name of the secondary SQL index of an index table
pub fn sql_index_name_for_index(index_name: &str) -> String {
    format!("{}{}", SQL_INDEX_PREFIX, index_name)
}

/// Quote an identifier for SQLite, doubling embedded quotes
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Creates index storage on first use
pub struct IndexSchemaCreator;

impl IndexSchemaCreator {
    /// Ensure the index described by `definition` exists.
    ///
    /// - Identical definition already present: returns its name, no mutation
    /// - Same name, different fields or type: fails, prior index untouched
    /// - Otherwise: creates table, SQL index and metadata row atomically
    pub fn ensure_indexed(definition: &IndexDefinition, conn: &mut Connection) -> QueryResult<String> {
        definition.validate()?;
        Self::ensure_validated(definition, conn)
    }

    /// Ensure the built-in `_all_docs` projection exists
    pub fn ensure_all_docs(conn: &mut Connection) -> QueryResult<()> {
        Self::ensure_validated(&IndexDefinition::all_docs(), conn)?;
        Ok(())
    }

    fn ensure_validated(definition: &IndexDefinition, conn: &mut Connection) -> QueryResult<String> {
        if let Some(existing) = catalog::load(conn, &definition.name)? {
            if existing.definition.same_shape(definition) {
                return Ok(existing.definition.name);
            }
            return Err(QueryError::invalid_index_name(format!(
                "index name collision: '{}' already indexes {:?}",
                definition.name, existing.definition.fields
            )));
        }

        // SQLite identifiers ignore ASCII case, so 'A' and 'a' would share a table
        if let Some(other) = catalog::find_case_variant(conn, &definition.name)? {
            return Err(QueryError::invalid_index_name(format!(
                "index name collision: '{}' differs from existing index '{}' only by case",
                definition.name, other
            )));
        }

        let tx = conn.transaction()?;
        tx.execute_batch(&Self::create_statements(definition))?;
        catalog::insert(&tx, definition)?;
        tx.commit()?;

        info!(
            index = %definition.name,
            fields = ?definition.fields,
            "created index"
        );
        Ok(definition.name.clone())
    }

    /// DDL for the index table and its secondary SQL index
    fn create_statements(definition: &IndexDefinition) -> String {
        let table = quote_identifier(&table_name_for_index(&definition.name));

        let mut columns = vec![
            format!("{} TEXT PRIMARY KEY NOT NULL", quote_identifier(DOC_ID_FIELD)),
            format!("{} TEXT NOT NULL", quote_identifier(REV_ID_FIELD)),
        ];
        let value_columns: Vec<String> = definition.value_columns().map(quote_identifier).collect();
        // no declared type: cells keep whatever storage class the value has
        columns.extend(value_columns.iter().cloned());

        let mut ddl = format!("CREATE TABLE {} ({});", table, columns.join(", "));

        if !value_columns.is_empty() {
            let sql_index = quote_identifier(&sql_index_name_for_index(&definition.name));
            ddl.push_str(&format!(
                "\nCREATE INDEX {} ON {} ({});",
                sql_index,
                table,
                value_columns.join(", ")
            ));
        }

        ddl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::QueryErrorCode;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        catalog::create_metadata_table(&conn).unwrap();
        conn
    }

    fn table_exists(conn: &Connection, table: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    fn column_names(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        names
    }

    #[test]
    fn test_table_name_mapping() {
        assert_eq!(table_name_for_index("by_name"), "_t_mango_query_index_by_name");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("a.b"), "\"a.b\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_creates_table_and_metadata() {
        let mut conn = open();
        let def = IndexDefinition::json("people", ["name", "address.city"]);

        let name = IndexSchemaCreator::ensure_indexed(&def, &mut conn).unwrap();
        assert_eq!(name, "people");

        let table = table_name_for_index("people");
        assert!(table_exists(&conn, &table));
        assert_eq!(
            column_names(&conn, &table),
            vec!["_id", "_rev", "name", "address.city"]
        );
        assert_eq!(catalog::watermark(&conn, "people").unwrap(), 0);
    }

    #[test]
    fn test_idempotent() {
        let mut conn = open();
        let def = IndexDefinition::json("people", ["name"]);

        IndexSchemaCreator::ensure_indexed(&def, &mut conn).unwrap();
        catalog::set_watermark(&conn, "people", 9).unwrap();
        let again = IndexSchemaCreator::ensure_indexed(&def, &mut conn).unwrap();

        assert_eq!(again, "people");
        assert_eq!(catalog::load_all(&conn).unwrap().len(), 1);
        // no reset of the watermark
        assert_eq!(catalog::watermark(&conn, "people").unwrap(), 9);
    }

    #[test]
    fn test_name_collision() {
        let mut conn = open();
        IndexSchemaCreator::ensure_indexed(&IndexDefinition::json("people", ["name"]), &mut conn)
            .unwrap();

        let err = IndexSchemaCreator::ensure_indexed(
            &IndexDefinition::json("people", ["age"]),
            &mut conn,
        )
        .unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::InvalidIndexName);

        let entry = catalog::load(&conn, "people").unwrap().unwrap();
        assert_eq!(entry.definition.fields, vec!["name"]);
    }

    #[test]
    fn test_invalid_name_creates_nothing() {
        let mut conn = open();
        let err = IndexSchemaCreator::ensure_indexed(
            &IndexDefinition::json("9lives", ["name"]),
            &mut conn,
        )
        .unwrap_err();

        assert_eq!(err.code(), QueryErrorCode::InvalidIndexName);
        assert!(catalog::load_all(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_failed_create_leaves_no_metadata() {
        let mut conn = open();
        // occupy the table name so CREATE TABLE fails inside the transaction
        conn.execute_batch("CREATE TABLE \"_t_mango_query_index_taken\" (x)")
            .unwrap();

        let err = IndexSchemaCreator::ensure_indexed(
            &IndexDefinition::json("taken", ["name"]),
            &mut conn,
        )
        .unwrap_err();

        assert_eq!(err.code(), QueryErrorCode::SqlError);
        assert!(catalog::load(&conn, "taken").unwrap().is_none());
    }

    #[test]
    fn test_suffixed_names_do_not_collide() {
        let mut conn = open();
        for name in ["by_status", "by_status_idx", "x_idx", "x"] {
            IndexSchemaCreator::ensure_indexed(&IndexDefinition::json(name, ["status"]), &mut conn)
                .unwrap();
        }

        assert_eq!(catalog::load_all(&conn).unwrap().len(), 4);
        assert!(table_exists(&conn, &table_name_for_index("by_status_idx")));
        assert!(table_exists(&conn, &table_name_for_index("x")));
    }

    #[test]
    fn test_case_variant_rejected() {
        let mut conn = open();
        IndexSchemaCreator::ensure_indexed(&IndexDefinition::json("A", ["name"]), &mut conn)
            .unwrap();

        let err = IndexSchemaCreator::ensure_indexed(
            &IndexDefinition::json("a", ["name"]),
            &mut conn,
        )
        .unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::InvalidIndexName);
        assert!(err.message().contains("case"));
        assert!(catalog::load(&conn, "a").unwrap().is_none());
    }

    #[test]
    fn test_all_docs_case_variant_rejected() {
        let mut conn = open();
        IndexSchemaCreator::ensure_all_docs(&mut conn).unwrap();

        let err = IndexSchemaCreator::ensure_indexed(
            &IndexDefinition::json("_ALL_DOCS", ["name"]),
            &mut conn,
        )
        .unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::InvalidIndexName);
    }

    #[test]
    fn test_all_docs_projection() {
        let mut conn = open();
        IndexSchemaCreator::ensure_all_docs(&mut conn).unwrap();
        IndexSchemaCreator::ensure_all_docs(&mut conn).unwrap();

        let table = table_name_for_index("_all_docs");
        assert_eq!(column_names(&conn, &table), vec!["_id", "_rev"]);
    }
}
