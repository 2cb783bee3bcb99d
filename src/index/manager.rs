//! Index Manager
//!
//! Owns the index storage connection and coordinates creation, refresh,
//! deletion and querying of indexes.
//!
//! # API
//!
//! - `open(config)` - Open storage, apply the key, ensure `_all_docs`
//! - `ensure_indexed(fields, name, type)` - Idempotent index creation
//! - `list_indexes()` / `delete_index_named(name)` - Catalog maintenance
//! - `update_all_indexes(feed)` / `update_index(name, feed)` - Refresh
//! - `find(query, source, refresh)` - Compile and execute a query
//!
//! Not thread-safe on purpose: the engine confines a manager to a single
//! worker thread.

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::catalog;
use super::creator::{quote_identifier, IndexSchemaCreator};
use super::definition::{IndexDefinition, IndexType, ALL_DOCS_INDEX};
use super::errors::{QueryError, QueryResult};
use super::updater::{IndexUpdater, UpdateStats};
use crate::engine::EngineConfig;
use crate::executor::{QueryExecutor, ResultSet};
use crate::planner::{CompiledQuery, ExplainPlan, Query, QueryCompiler};
use crate::source::{ChangeFeed, DocumentSource};

/// Index storage and catalog of one document store
pub struct IndexManager {
    conn: Connection,
    change_batch_size: usize,
}

impl IndexManager {
    /// Open (or create) the index storage described by `config`
    pub fn open(config: &EngineConfig) -> QueryResult<Self> {
        std::fs::create_dir_all(&config.storage_dir).map_err(|e| {
            QueryError::sql(format!(
                "cannot create storage directory {}: {}",
                config.storage_dir.display(),
                e
            ))
        })?;

        let path = config.storage_path();
        let conn = Connection::open(&path)?;
        let manager = Self::with_connection(
            conn,
            config.encryption_key.as_deref(),
            config.change_batch_size,
        )?;
        info!(path = %path.display(), "opened index storage");
        Ok(manager)
    }

    /// Open unencrypted storage that lives only as long as the manager
    pub fn open_in_memory(change_batch_size: usize) -> QueryResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, None, change_batch_size)
    }

    fn with_connection(
        mut conn: Connection,
        encryption_key: Option<&str>,
        change_batch_size: usize,
    ) -> QueryResult<Self> {
        if let Some(key) = encryption_key {
            apply_encryption_key(&conn, key)?;
        }
        catalog::create_metadata_table(&conn)?;
        IndexSchemaCreator::ensure_all_docs(&mut conn)?;

        Ok(Self {
            conn,
            change_batch_size: change_batch_size.max(1),
        })
    }

    /// Ensure a JSON index over `fields` exists under `name`
    pub fn ensure_indexed(
        &mut self,
        fields: Vec<String>,
        name: &str,
        index_type: IndexType,
    ) -> QueryResult<String> {
        self.ensure_indexed_with_settings(fields, name, index_type, Value::Null)
    }

    /// Like `ensure_indexed`, persisting opaque settings with a new index
    pub fn ensure_indexed_with_settings(
        &mut self,
        fields: Vec<String>,
        name: &str,
        index_type: IndexType,
        settings: Value,
    ) -> QueryResult<String> {
        let definition = IndexDefinition {
            name: name.to_string(),
            fields,
            settings,
            index_type,
        };
        IndexSchemaCreator::ensure_indexed(&definition, &mut self.conn)
    }

    /// User-defined indexes by name.
    ///
    /// Catalog rows that cannot be decoded are logged and left out.
    pub fn list_indexes(&self) -> QueryResult<BTreeMap<String, IndexDefinition>> {
        let mut indexes = BTreeMap::new();
        for row in catalog::load_each(&self.conn)? {
            match row.entry {
                Ok(entry) if entry.definition.is_all_docs() => {}
                Ok(entry) => {
                    indexes.insert(row.name, entry.definition);
                }
                Err(err) => warn!(index = %row.name, error = %err, "skipping unreadable index"),
            }
        }
        Ok(indexes)
    }

    /// Drop an index and its catalog row together.
    ///
    /// Returns `false` for unknown names and for `_all_docs`.
    pub fn delete_index_named(&mut self, name: &str) -> QueryResult<bool> {
        if name == ALL_DOCS_INDEX {
            return Ok(false);
        }

        let tx = self.conn.transaction()?;
        if catalog::load(&tx, name)?.is_none() {
            return Ok(false);
        }
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}",
            quote_identifier(&Self::table_name_for_index(name))
        ))?;
        catalog::remove(&tx, name)?;
        tx.commit()?;

        info!(index = %name, "deleted index");
        Ok(true)
    }

    /// Refresh every catalogued index, `_all_docs` included.
    ///
    /// A failing index is logged and skipped. Returns whether all succeeded.
    pub fn update_all_indexes<F: ChangeFeed + ?Sized>(&mut self, feed: &F) -> bool {
        let rows = match catalog::load_each(&self.conn) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "cannot read index catalog");
                return false;
            }
        };

        let mut all_ok = true;
        for row in rows {
            let entry = match row.entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(index = %row.name, error = %err, "skipping unreadable index");
                    all_ok = false;
                    continue;
                }
            };
            let definition = &entry.definition;
            if let Err(err) =
                IndexUpdater::update_index(definition, &mut self.conn, feed, self.change_batch_size)
            {
                warn!(index = %definition.name, error = %err, "index update failed");
                all_ok = false;
            }
        }
        all_ok
    }

    /// Refresh one index by name
    pub fn update_index<F: ChangeFeed + ?Sized>(&mut self, name: &str, feed: &F) -> QueryResult<UpdateStats> {
        let entry = catalog::load(&self.conn, name)?.ok_or_else(|| QueryError::index_not_found(name))?;
        IndexUpdater::update_index(&entry.definition, &mut self.conn, feed, self.change_batch_size)
    }

    /// Physical table backing an index
    pub fn table_name_for_index(name: &str) -> String {
        super::creator::table_name_for_index(name)
    }

    /// Compile and run a query.
    ///
    /// With `refresh`, the chosen index is brought up to date first.
    pub fn find(
        &mut self,
        query: &Query,
        source: &Arc<dyn DocumentSource>,
        refresh: bool,
    ) -> QueryResult<ResultSet> {
        let view = self.catalog_view()?;
        let compiled = view.compile(query)?;
        debug!(
            index = %compiled.index_name,
            sql = %compiled.sql.sql_with_placeholders,
            "compiled query"
        );

        if refresh {
            let definition = view
                .definitions
                .iter()
                .find(|d| d.name == compiled.index_name)
                .ok_or_else(|| QueryError::index_not_found(&compiled.index_name))?;
            IndexUpdater::update_index(
                definition,
                &mut self.conn,
                source.as_ref(),
                self.change_batch_size,
            )?;
        }

        QueryExecutor::new(&self.conn, source).execute(&compiled, query.fields.clone())
    }

    /// Describe how `query` would run without running it
    pub fn explain(&self, query: &Query) -> ExplainPlan {
        let compiled = self.catalog_view().and_then(|view| view.compile(query));
        match compiled {
            Ok(compiled) => ExplainPlan::from_compiled(&compiled),
            Err(err) => ExplainPlan::from_error(&err),
        }
    }

    /// Last change-feed sequence applied to an index
    pub fn index_watermark(&self, name: &str) -> QueryResult<u64> {
        catalog::watermark(&self.conn, name)
    }

    fn catalog_view(&self) -> QueryResult<CatalogView> {
        let mut view = CatalogView::default();
        for row in catalog::load_each(&self.conn)? {
            match (row.entry, row.fields) {
                (Ok(entry), _) => view.definitions.push(entry.definition),
                // still a candidate, so a query that would pick it reports why it can't
                (Err(err), Some(fields)) => {
                    view.definitions.push(IndexDefinition::json(row.name.clone(), fields));
                    view.unusable.insert(row.name, err);
                }
                (Err(err), None) => warn!(index = %row.name, error = %err, "skipping unreadable index"),
            }
        }
        Ok(view)
    }
}

/// Catalog as seen by the compiler
#[derive(Default)]
struct CatalogView {
    definitions: Vec<IndexDefinition>,
    /// Rows whose fields decode but whose definition does not
    unusable: BTreeMap<String, QueryError>,
}

impl CatalogView {
    fn compile(&self, query: &Query) -> QueryResult<CompiledQuery> {
        let compiled = QueryCompiler::new(&self.definitions).compile(query)?;
        match self.unusable.get(&compiled.index_name) {
            Some(err) => Err(err.clone()),
            None => Ok(compiled),
        }
    }
}

/// Key the connection and prove the key opens the file.
///
/// Must run before any other statement on the connection.
fn apply_encryption_key(conn: &Connection, key: &str) -> QueryResult<()> {
    conn.pragma_update(None, "key", key)
        .map_err(|e| QueryError::encryption_key(format!("cannot apply key: {}", e)))?;

    // plain SQLite ignores PRAGMA key; only a cipher build reports a version
    let cipher_version: Option<String> = conn
        .query_row("PRAGMA cipher_version", [], |row| row.get(0))
        .optional()
        .map_err(|e| QueryError::encryption_key(format!("cannot query cipher support: {}", e)))?;
    if cipher_version.map_or(true, |v| v.is_empty()) {
        return Err(QueryError::encryption_key(
            "storage library was built without encryption support",
        ));
    }

    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map_err(|e| QueryError::encryption_key(format!("key does not open storage: {}", e)))?;
    Ok(())
}
