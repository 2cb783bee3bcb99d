//! Explain output for compiled queries
//!
//! Deterministic, human-readable description of how a query will run.

use std::fmt;

use super::ast::SortSpec;
use super::compiler::CompiledQuery;
use crate::index::{QueryError, ALL_DOCS_INDEX};

/// Explain plan output
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainPlan {
    /// Whether compilation succeeded
    pub accepted: bool,
    /// Index whose table is scanned
    pub selected_index: Option<String>,
    /// Statement text, placeholders unexpanded
    pub sql: Option<String>,
    /// Number of bound parameters
    pub parameters: usize,
    /// Whether a residual selector runs in process
    pub residual: bool,
    /// Sort applied in process, if any
    pub in_process_sort: Option<String>,
    /// Whether skip and limit are part of the statement
    pub sql_paging: bool,
    pub rejection_reason: Option<String>,
    pub rejection_code: Option<String>,
}

impl ExplainPlan {
    /// Creates an explain plan from a compiled query
    pub fn from_compiled(compiled: &CompiledQuery) -> Self {
        Self {
            accepted: true,
            selected_index: Some(compiled.index_name.clone()),
            sql: Some(compiled.sql.sql_with_placeholders.clone()),
            parameters: compiled.sql.placeholder_values.len(),
            residual: compiled.residual.is_some(),
            in_process_sort: compiled.in_process_sort.as_deref().map(describe_sort),
            sql_paging: compiled.sql_paging,
            rejection_reason: None,
            rejection_code: None,
        }
    }

    /// Creates an explain plan from a compilation error
    pub fn from_error(err: &QueryError) -> Self {
        Self {
            accepted: false,
            selected_index: None,
            sql: None,
            parameters: 0,
            residual: false,
            in_process_sort: None,
            sql_paging: false,
            rejection_reason: Some(err.message().to_string()),
            rejection_code: Some(err.code().code().to_string()),
        }
    }
}

fn describe_sort(sort: &[SortSpec]) -> String {
    sort.iter()
        .map(|s| format!("{} {}", s.field, s.direction.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.accepted {
            let code = self.rejection_code.as_deref().unwrap_or("?");
            let reason = self.rejection_reason.as_deref().unwrap_or("");
            return writeln!(f, "rejected [{}]: {}", code, reason);
        }

        let index = self.selected_index.as_deref().unwrap_or(ALL_DOCS_INDEX);
        writeln!(f, "index: {}", index)?;
        if let Some(sql) = &self.sql {
            writeln!(f, "sql: {} ({} bound)", sql, self.parameters)?;
        }
        if self.residual {
            writeln!(f, "filter: in process")?;
        }
        if let Some(sort) = &self.in_process_sort {
            writeln!(f, "sort: {} in process", sort)?;
        }
        let paging = if self.sql_paging { "sql" } else { "in process" };
        writeln!(f, "paging: {}", paging)
    }
}
