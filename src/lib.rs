//! # Sift
//!
//! Map application objects onto a search index and query it with an
//! ORM-style filter API.
//!
//! ## Features
//!
//! - Declarative field descriptors with dotted attribute paths
//! - Composable condition trees with `&`, `|` and `!`
//! - Lazily paginated result sets with a single-round-trip cache
//! - Result objects that hydrate their stored model on demand
//! - Pluggable backends, with an in-memory Lucene-syntax backend included

pub mod backend;
pub mod config;
pub mod document;
pub mod dotpath;
pub mod error;
pub mod fields;
pub mod highlight;
pub mod index;
pub mod object;
pub mod query;
pub mod result;
pub mod util;
pub mod value;

pub mod prelude {
    pub use crate::backend::memory::MemoryBackend;
    pub use crate::backend::{DateGap, SearchBackend};
    pub use crate::config::SiftConfig;
    pub use crate::error::{Result, SiftError};
    pub use crate::fields::SearchField;
    pub use crate::index::{Registry, SearchIndex};
    pub use crate::object::{MemoryStore, ModelStore, Record, Source, SourceRef};
    pub use crate::query::{Connector, SQ, SearchConnection, SearchQuerySet};
    pub use crate::result::SearchResult;
    pub use crate::value::{ModelType, Value};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
