//! Library configuration.
//!
//! [`SiftConfig`] carries the few knobs the query layer needs: whether the
//! diagnostic query log is active, the default page size of lazy result sets
//! and the names of the bookkeeping fields every indexed document carries.
//!
//! # Example
//!
//! ```
//! use sift::config::SiftConfig;
//!
//! let config = SiftConfig::default().debug(true).page_size(25);
//! assert!(config.debug);
//! assert_eq!(config.page_size, 25);
//!
//! let config = SiftConfig::from_json_str(r#"{"page_size": 50}"#).unwrap();
//! assert_eq!(config.page_size, 50);
//! assert_eq!(config.content_field, "content");
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiftError};

fn default_page_size() -> usize {
    10
}

fn default_content_field() -> String {
    "content".to_string()
}

fn default_type_field() -> String {
    "model_type".to_string()
}

fn default_pk_field() -> String {
    "model_pk".to_string()
}

fn default_id_field() -> String {
    "id".to_string()
}

/// Configuration shared by the query plan, result sets and backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiftConfig {
    /// Record executed queries in the diagnostic query log.
    #[serde(default)]
    pub debug: bool,
    /// Number of hits fetched per backend round trip.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Reserved field name meaning "search the document text".
    #[serde(default = "default_content_field")]
    pub content_field: String,
    /// Document field holding the `app.model` type identifier.
    #[serde(default = "default_type_field")]
    pub type_field: String,
    /// Document field holding the primary key.
    #[serde(default = "default_pk_field")]
    pub pk_field: String,
    /// Document field holding the `app.model.pk` identity string.
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

impl Default for SiftConfig {
    fn default() -> Self {
        SiftConfig {
            debug: false,
            page_size: default_page_size(),
            content_field: default_content_field(),
            type_field: default_type_field(),
            pk_field: default_pk_field(),
            id_field: default_id_field(),
        }
    }
}

impl SiftConfig {
    /// Enable or disable the diagnostic query log.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the default page size.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the reserved content field name.
    pub fn content_field<S: Into<String>>(mut self, name: S) -> Self {
        self.content_field = name.into();
        self
    }

    /// Parse a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SiftConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check the invariants of the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(SiftError::invalid_config("page_size must be positive"));
        }
        let names = [
            &self.content_field,
            &self.type_field,
            &self.pk_field,
            &self.id_field,
        ];
        if names.iter().any(|name| name.is_empty()) {
            return Err(SiftError::invalid_config("field names must not be empty"));
        }
        Ok(())
    }
}
