//! Incremental index maintenance
//!
//! Reads the change feed from the index's watermark onwards and replays
//! each change into the index table.
//!
//! # Invariants
//!
//! - Changes are consumed in strictly ascending sequence order
//! - A batch of row writes and the watermark covering it commit together
//! - On failure the current batch rolls back; the watermark never passes
//!   data that is not durably stored, so a retry resumes safely

use rusqlite::{params, params_from_iter, Connection};
use tracing::{debug, info};

use super::catalog;
use super::creator::{quote_identifier, table_name_for_index};
use super::definition::{IndexDefinition, DOC_ID_FIELD, REV_ID_FIELD};
use super::errors::{QueryError, QueryResult};
use super::key::IndexKey;
use crate::source::{ChangeFeed, ChangeRecord};

/// Outcome of one update pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// Rows written (inserted or replaced)
    pub written: usize,
    /// Rows removed for deleted documents
    pub removed: usize,
    /// Committed batches
    pub batches: usize,
    /// Watermark after the pass
    pub watermark: u64,
}

/// Statements for one index table
struct RowStatements {
    upsert: String,
    delete: String,
}

impl RowStatements {
    fn for_index(definition: &IndexDefinition) -> Self {
        let table = quote_identifier(&table_name_for_index(&definition.name));

        let mut columns = vec![quote_identifier(DOC_ID_FIELD), quote_identifier(REV_ID_FIELD)];
        columns.extend(definition.value_columns().map(quote_identifier));
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

        Self {
            upsert: format!(
                "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders.join(", ")
            ),
            delete: format!(
                "DELETE FROM {} WHERE {} = ?1",
                table,
                quote_identifier(DOC_ID_FIELD)
            ),
        }
    }
}

/// Replays the change feed into index tables
pub struct IndexUpdater;

impl IndexUpdater {
    /// Bring one index up to date with the change feed.
    ///
    /// The index is assumed to exist.
    pub fn update_index<F: ChangeFeed + ?Sized>(
        definition: &IndexDefinition,
        conn: &mut Connection,
        feed: &F,
        batch_size: usize,
    ) -> QueryResult<UpdateStats> {
        let batch_size = batch_size.max(1);
        let statements = RowStatements::for_index(definition);
        let mut stats = UpdateStats {
            watermark: catalog::watermark(conn, &definition.name)?,
            ..UpdateStats::default()
        };

        loop {
            let changes = feed.changes_since(stats.watermark, batch_size)?;
            if changes.is_empty() {
                break;
            }

            let (written, removed, watermark) =
                Self::apply_batch(definition, conn, &statements, stats.watermark, &changes)?;
            stats.written += written;
            stats.removed += removed;
            stats.batches += 1;
            stats.watermark = watermark;

            debug!(
                index = %definition.name,
                changes = changes.len(),
                watermark,
                "committed index batch"
            );

            if changes.len() < batch_size {
                break;
            }
        }

        if stats.batches > 0 {
            info!(
                index = %definition.name,
                written = stats.written,
                removed = stats.removed,
                watermark = stats.watermark,
                "index updated"
            );
        }
        Ok(stats)
    }

    /// Apply one batch and its watermark in a single transaction
    fn apply_batch(
        definition: &IndexDefinition,
        conn: &mut Connection,
        statements: &RowStatements,
        since: u64,
        changes: &[ChangeRecord],
    ) -> QueryResult<(usize, usize, u64)> {
        let tx = conn.transaction()?;
        let mut written = 0;
        let mut removed = 0;
        let mut previous = since;

        {
            let mut upsert = tx.prepare_cached(&statements.upsert)?;
            let mut delete = tx.prepare_cached(&statements.delete)?;

            for change in changes {
                if change.sequence <= previous {
                    return Err(QueryError::sql(format!(
                        "change feed out of order: sequence {} after {}",
                        change.sequence, previous
                    )));
                }
                previous = change.sequence;

                if change.deleted {
                    removed += delete.execute(params![change.doc_id])?;
                } else {
                    let row = Self::project_row(definition, change);
                    written += upsert.execute(params_from_iter(row.iter()))?;
                }
            }
        }

        catalog::set_watermark(&tx, &definition.name, previous)?;
        tx.commit()?;

        Ok((written, removed, previous))
    }

    /// Full row for a live document: id, revision, then one cell per field
    fn project_row(definition: &IndexDefinition, change: &ChangeRecord) -> Vec<IndexKey> {
        let mut row = Vec::with_capacity(definition.fields.len() + 2);
        row.push(IndexKey::Text(change.doc_id.clone()));
        row.push(IndexKey::Text(change.rev_id.clone()));
        row.extend(
            definition
                .value_columns()
                .map(|field| IndexKey::from_path(&change.body, field)),
        );
        row
    }
}
