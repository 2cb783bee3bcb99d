//! Engine Configuration
//!
//! Where the index file lives, how it is keyed, and how index refreshes are
//! batched.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::index::{QueryError, QueryResult};

/// Query engine configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the index file (default: ".")
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// File name of the index storage (default: "mango_query.sqlite3")
    #[serde(default = "default_index_file_name")]
    pub index_file_name: String,

    /// Key for encrypted storage (default: none)
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Refresh the chosen index before every find (default: true)
    #[serde(default = "default_refresh_on_find")]
    pub refresh_on_find: bool,

    /// Change records applied per transaction (default: 512)
    #[serde(default = "default_change_batch_size")]
    pub change_batch_size: usize,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_index_file_name() -> String {
    "mango_query.sqlite3".to_string()
}

fn default_refresh_on_find() -> bool {
    true
}

fn default_change_batch_size() -> usize {
    512
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            index_file_name: default_index_file_name(),
            encryption_key: None,
            refresh_on_find: default_refresh_on_find(),
            change_batch_size: default_change_batch_size(),
        }
    }
}

// never print the key
impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("storage_dir", &self.storage_dir)
            .field("index_file_name", &self.index_file_name)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "<redacted>"))
            .field("refresh_on_find", &self.refresh_on_find)
            .field("change_batch_size", &self.change_batch_size)
            .finish()
    }
}

impl EngineConfig {
    /// Create a config storing its index file in `dir`
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: dir.into(),
            ..Default::default()
        }
    }

    /// Parse a config from JSON; missing keys take their defaults
    pub fn from_json_str(json: &str) -> QueryResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| QueryError::sql(format!("invalid engine config: {}", e)))
    }

    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    pub fn with_refresh_on_find(mut self, refresh: bool) -> Self {
        self.refresh_on_find = refresh;
        self
    }

    pub fn with_change_batch_size(mut self, batch_size: usize) -> Self {
        self.change_batch_size = batch_size;
        self
    }

    /// Full path of the index file
    pub fn storage_path(&self) -> PathBuf {
        self.storage_dir.join(&self.index_file_name)
    }
}
