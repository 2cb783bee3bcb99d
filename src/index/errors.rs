//! Error types for the index and query engine
//!
//! All errors belong to the `MangoQueryErrorDomain`, which is distinct from
//! the document store's own errors. Numeric values are stable.
//!
//! Error codes:
//! - MANGO_INVALID_INDEX_NAME (REJECT)
//! - MANGO_SQL_ERROR (ERROR)
//! - MANGO_INDEX_NOT_FOUND (REJECT)
//! - MANGO_ENCRYPTION_KEY_ERROR (FATAL)
//! - MANGO_INVALID_SELECTOR (REJECT)
//! - MANGO_ENGINE_NOT_ACTIVE (ERROR)

use std::fmt;

/// Name of the error domain shared by every [`QueryError`]
pub const ERROR_DOMAIN: &str = "MangoQueryErrorDomain";

/// Severity levels for engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Request rejected before any mutation
    Reject,
    /// Operation failed, engine remains usable
    Error,
    /// Engine cannot open its storage
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Error kinds of the query error domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorCode {
    /// Index name not valid. Names may only contain letters, digits and
    /// underscores and must not start with a digit.
    InvalidIndexName,
    /// The index storage reported a failure
    SqlError,
    /// No index with this name was found
    IndexNotFound,
    /// The key could not open the index storage
    EncryptionKeyError,
    /// The query selector or sort document is malformed
    InvalidSelector,
    /// The engine has not been activated or was already closed
    EngineNotActive,
}

impl QueryErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            QueryErrorCode::InvalidIndexName => "MANGO_INVALID_INDEX_NAME",
            QueryErrorCode::SqlError => "MANGO_SQL_ERROR",
            QueryErrorCode::IndexNotFound => "MANGO_INDEX_NOT_FOUND",
            QueryErrorCode::EncryptionKeyError => "MANGO_ENCRYPTION_KEY_ERROR",
            QueryErrorCode::InvalidSelector => "MANGO_INVALID_SELECTOR",
            QueryErrorCode::EngineNotActive => "MANGO_ENGINE_NOT_ACTIVE",
        }
    }

    /// Returns the stable numeric value within the error domain
    pub fn value(&self) -> i64 {
        match self {
            QueryErrorCode::InvalidIndexName => 1,
            QueryErrorCode::SqlError => 2,
            QueryErrorCode::IndexNotFound => 3,
            QueryErrorCode::EncryptionKeyError => 4,
            QueryErrorCode::InvalidSelector => 5,
            QueryErrorCode::EngineNotActive => 6,
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            QueryErrorCode::InvalidIndexName
            | QueryErrorCode::IndexNotFound
            | QueryErrorCode::InvalidSelector => Severity::Reject,
            QueryErrorCode::SqlError | QueryErrorCode::EngineNotActive => Severity::Error,
            QueryErrorCode::EncryptionKeyError => Severity::Fatal,
        }
    }
}

impl fmt::Display for QueryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Engine error with code and diagnostic message
#[derive(Debug, Clone)]
pub struct QueryError {
    code: QueryErrorCode,
    message: String,
}

impl QueryError {
    /// Create an invalid index name error
    pub fn invalid_index_name(reason: impl Into<String>) -> Self {
        Self {
            code: QueryErrorCode::InvalidIndexName,
            message: reason.into(),
        }
    }

    /// Create a storage error carrying the underlying diagnostic
    pub fn sql(diagnostic: impl Into<String>) -> Self {
        Self {
            code: QueryErrorCode::SqlError,
            message: diagnostic.into(),
        }
    }

    /// Create an index not found error
    pub fn index_not_found(name: &str) -> Self {
        Self {
            code: QueryErrorCode::IndexNotFound,
            message: format!("No index named '{}'", name),
        }
    }

    /// Create an encryption key error
    pub fn encryption_key(reason: impl Into<String>) -> Self {
        Self {
            code: QueryErrorCode::EncryptionKeyError,
            message: reason.into(),
        }
    }

    /// Create an invalid selector error
    pub fn invalid_selector(reason: impl Into<String>) -> Self {
        Self {
            code: QueryErrorCode::InvalidSelector,
            message: reason.into(),
        }
    }

    /// Create an engine not active error
    pub fn engine_not_active() -> Self {
        Self {
            code: QueryErrorCode::EngineNotActive,
            message: "query engine is not active".to_string(),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> QueryErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the error domain
    pub fn domain(&self) -> &'static str {
        ERROR_DOMAIN
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)
    }
}

impl std::error::Error for QueryError {}

impl From<rusqlite::Error> for QueryError {
    fn from(err: rusqlite::Error) -> Self {
        QueryError::sql(err.to_string())
    }
}

impl From<crate::source::SourceError> for QueryError {
    fn from(err: crate::source::SourceError) -> Self {
        QueryError::sql(format!("document source: {}", err))
    }
}

/// Result type for engine operations
pub type QueryResult<T> = Result<T, QueryError>;
