//! Building and running searches.
//!
//! - [`filter`] splits `field__filter` expressions.
//! - [`node`] combines lookups into an [`SQ`] condition tree.
//! - [`plan`] holds a [`SearchQuery`] and renders it for the backend.
//! - [`query_set`] wraps a plan in the lazily filled [`SearchQuerySet`].
//! - [`log`] records executed queries while debugging.

pub mod filter;
pub mod log;
pub mod node;
pub mod plan;
pub mod query_set;

pub use self::filter::FilterType;
pub use self::log::{QueryLog, QueryLogEntry};
pub use self::node::{Child, Connector, SQ};
pub use self::plan::{QueryResponse, SearchConnection, SearchQuery};
pub use self::query_set::SearchQuerySet;
