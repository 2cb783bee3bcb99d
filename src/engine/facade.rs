//! Query engine façade
//!
//! The single entry point a document store uses: index maintenance and
//! queries, all routed through the serial worker.
//!
//! # Lifecycle
//!
//! `new` (no I/O) → `activate` (opens storage once) → operations →
//! `close` (drains queued work, releases storage). Operations outside the
//! active window resolve to `EngineNotActive`; `find` resolves to `None`.

use std::collections::BTreeMap;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{error, info};

use super::config::EngineConfig;
use super::worker::{Pending, Worker};
use crate::executor::ResultSet;
use crate::index::{IndexDefinition, IndexType, QueryError, QueryResult, UpdateStats};
use crate::planner::{parse_query, parse_selector, ExplainPlan, Query, SortSpec};
use crate::source::DocumentSource;

/// Paging, projection and ordering for `find_with_options`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub skip: usize,
    pub limit: Option<usize>,
    /// Top-level fields to return; `_id` and `_rev` are always included
    pub fields: Option<Vec<String>>,
    pub sort: Vec<SortSpec>,
}

impl FindOptions {
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Adds a sort key
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort.push(sort);
        self
    }
}

enum EngineState {
    Inactive,
    Active(Worker),
    Closed,
}

/// Mango query engine bound to one document store
pub struct QueryEngine {
    config: EngineConfig,
    source: Arc<dyn DocumentSource>,
    state: Mutex<EngineState>,
}

fn not_active<T>() -> QueryResult<T> {
    Err(QueryError::engine_not_active())
}

fn no_results() -> Option<ResultSet> {
    None
}

impl QueryEngine {
    /// Creates an inactive engine. Touches no storage.
    pub fn new(config: EngineConfig, source: Arc<dyn DocumentSource>) -> Self {
        Self {
            config,
            source,
            state: Mutex::new(EngineState::Inactive),
        }
    }

    /// Open index storage on the worker thread.
    ///
    /// Idempotent while active. A bad or unsupported encryption key is
    /// fatal and leaves the engine inactive.
    pub fn activate(&self) -> QueryResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            EngineState::Active(_) => return Ok(()),
            EngineState::Closed => return not_active(),
            EngineState::Inactive => {}
        }

        match Worker::spawn(self.config.clone()) {
            Ok(worker) => {
                *state = EngineState::Active(worker);
                info!(path = %self.config.storage_path().display(), "query engine active");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, fatal = err.is_fatal(), "query engine failed to activate");
                Err(err)
            }
        }
    }

    /// Whether operations are currently accepted
    pub fn is_active(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(*state, EngineState::Active(_))
    }

    /// Ensure a JSON index over `fields` exists under `name`
    pub fn ensure_indexed(
        &self,
        fields: Vec<String>,
        name: &str,
        index_type: IndexType,
    ) -> Pending<QueryResult<String>> {
        self.ensure_indexed_with_settings(fields, name, index_type, Value::Null)
    }

    pub fn ensure_indexed_with_settings(
        &self,
        fields: Vec<String>,
        name: &str,
        index_type: IndexType,
        settings: Value,
    ) -> Pending<QueryResult<String>> {
        let name = name.to_string();
        self.submit(
            move |m| m.ensure_indexed_with_settings(fields, &name, index_type, settings),
            not_active,
        )
    }

    /// User-defined indexes by name
    pub fn list_indexes(&self) -> Pending<QueryResult<BTreeMap<String, IndexDefinition>>> {
        self.submit(|m| m.list_indexes(), not_active)
    }

    /// Drop an index; resolves to `false` for unknown names
    pub fn delete_index_named(&self, name: &str) -> Pending<QueryResult<bool>> {
        let name = name.to_string();
        self.submit(move |m| m.delete_index_named(&name), not_active)
    }

    /// Refresh every index; resolves to whether all refreshes succeeded
    pub fn update_all_indexes(&self) -> Pending<QueryResult<bool>> {
        let source = Arc::clone(&self.source);
        self.submit(move |m| Ok(m.update_all_indexes(source.as_ref())), not_active)
    }

    /// Refresh one index by name
    pub fn update_index(&self, name: &str) -> Pending<QueryResult<UpdateStats>> {
        let name = name.to_string();
        let source = Arc::clone(&self.source);
        self.submit(move |m| m.update_index(&name, source.as_ref()), not_active)
    }

    /// Last change-feed sequence applied to an index
    pub fn index_watermark(&self, name: &str) -> Pending<QueryResult<u64>> {
        let name = name.to_string();
        self.submit(move |m| m.index_watermark(&name), not_active)
    }

    /// Documents matching `selector`, or `None` if the query failed
    pub fn find(&self, selector: &Value) -> Pending<Option<ResultSet>> {
        self.find_with_options(selector, FindOptions::default())
    }

    pub fn find_with_options(&self, selector: &Value, options: FindOptions) -> Pending<Option<ResultSet>> {
        let query = parse_selector(selector).map(|selector| Query {
            selector,
            sort: options.sort,
            skip: options.skip,
            limit: options.limit,
            fields: options.fields,
        });
        self.run_query(query)
    }

    /// Run a full query document (`selector`, `sort`, `skip`, `limit`,
    /// `fields`)
    pub fn find_query(&self, document: &Value) -> Pending<Option<ResultSet>> {
        self.run_query(parse_query(document))
    }

    /// Describe how a query document would run
    pub fn explain(&self, document: &Value) -> Pending<ExplainPlan> {
        let closed = || ExplainPlan::from_error(&QueryError::engine_not_active());
        match parse_query(document) {
            Ok(query) => self.submit(move |m| m.explain(&query), closed),
            Err(err) => Pending::ready(ExplainPlan::from_error(&err), closed),
        }
    }

    /// Stop accepting work, drain the queue and release storage.
    ///
    /// Idempotent; also runs on drop.
    pub fn close(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            mem::replace(&mut *state, EngineState::Closed)
        };
        if let EngineState::Active(mut worker) = previous {
            worker.shutdown();
            info!("query engine closed");
        }
    }

    fn run_query(&self, query: QueryResult<Query>) -> Pending<Option<ResultSet>> {
        let query = match query {
            Ok(query) => query,
            Err(err) => {
                error!(error = %err, "rejected query");
                return Pending::ready(None, no_results);
            }
        };
        if !self.is_active() {
            error!(error = %QueryError::engine_not_active(), "find on inactive engine");
            return Pending::ready(None, no_results);
        }

        let source = Arc::clone(&self.source);
        let refresh = self.config.refresh_on_find;
        self.submit(
            move |m| match m.find(&query, &source, refresh) {
                Ok(results) => Some(results),
                Err(err) => {
                    error!(error = %err, "find failed");
                    None
                }
            },
            no_results,
        )
    }

    fn submit<T, F>(&self, job: F, closed: fn() -> T) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut crate::index::IndexManager) -> T + Send + 'static,
    {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            EngineState::Active(worker) => worker.submit(job, closed),
            EngineState::Inactive | EngineState::Closed => Pending::ready(closed(), closed),
        }
    }
}

impl Drop for QueryEngine {
    fn drop(&mut self) {
        self.close();
    }
}
