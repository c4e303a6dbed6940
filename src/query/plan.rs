//! The query execution plan.
//!
//! A [`SearchQuery`] accumulates everything a search needs besides paging:
//! the condition tree, ordering, model restriction, boosts, facets, narrowing
//! queries and highlighting. It compiles that state into a backend query
//! string and [`SearchOptions`], runs it through the connection's guarded
//! backend and translates the raw hits into [`SearchResult`]s.
//!
//! Plans are values. [`SearchQuery::with`] clones a plan and applies a change
//! to the copy, so a plan held by one result set is never altered by another.
//!
//! ```
//! use std::sync::Arc;
//!
//! use sift::backend::memory::MemoryBackend;
//! use sift::config::SiftConfig;
//! use sift::index::Registry;
//! use sift::query::node::SQ;
//! use sift::query::plan::{SearchConnection, SearchQuery};
//!
//! let connection = Arc::new(SearchConnection::new(
//!     Arc::new(MemoryBackend::new()),
//!     Arc::new(Registry::new()),
//!     SiftConfig::default(),
//! ));
//!
//! let query = SearchQuery::new(connection);
//! let query = query.with(|q| q.add_filter(SQ::content("foo"), false));
//! let query = query.with(|q| q.add_filter(SQ::new("title", "bar"), true));
//! assert_eq!(query.build_query(), "(foo OR title:bar)");
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use crate::backend::{
    DateFacet, FacetCounts, GuardedBackend, SchemaField, SearchBackend, SearchOptions,
};
use crate::config::SiftConfig;
use crate::error::Result;
use crate::index::Registry;
use crate::object::{Source, SourceRef};
use crate::query::log::{QueryLog, QueryLogEntry};
use crate::query::node::{Child, Connector, SQ};
use crate::result::SearchResult;
use crate::value::{ModelType, Value};

/// A backend bound to the registry of indexed models.
#[derive(Debug)]
pub struct SearchConnection {
    backend: GuardedBackend,
    registry: Arc<Registry>,
    query_log: Arc<QueryLog>,
}

impl SearchConnection {
    /// Connect a backend and a registry.
    ///
    /// With `config.debug` set, executed queries go to the process-wide
    /// [`QueryLog`]; otherwise nothing is recorded.
    pub fn new(backend: Arc<dyn SearchBackend>, registry: Arc<Registry>, config: SiftConfig) -> Self {
        SearchConnection {
            backend: GuardedBackend::new(backend, config),
            registry,
            query_log: QueryLog::global(),
        }
    }

    /// Record executed queries in a private log instead of the global one.
    pub fn with_query_log(mut self, query_log: Arc<QueryLog>) -> Self {
        self.query_log = query_log;
        self
    }

    /// Log an executed query if this connection runs in debug mode.
    fn record_query(&self, entry: QueryLogEntry) {
        if self.config().debug {
            self.query_log.record(entry);
        }
    }

    pub fn backend(&self) -> &GuardedBackend {
        &self.backend
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn query_log(&self) -> &Arc<QueryLog> {
        &self.query_log
    }

    pub fn config(&self) -> &SiftConfig {
        self.backend.config()
    }

    /// Index `objects` with the registered index of `model`.
    pub fn update(&self, model: &ModelType, objects: &[SourceRef]) -> Result<()> {
        let index = self.registry.get_index(model)?;
        self.backend.update(&index, objects)
    }

    /// Remove the document of a stored object.
    pub fn remove(&self, object: &dyn Source) -> Result<()> {
        self.backend.remove(object)
    }

    /// Remove every document of `models`, or everything if `models` is empty.
    pub fn clear(&self, models: &[ModelType]) {
        self.backend.clear(models)
    }

    /// The backend schema of every registered field.
    pub fn build_schema(&self) -> (String, Vec<SchemaField>) {
        self.backend.build_schema(&self.registry.all_searchfields())
    }
}

/// Hits of one executed search, translated into results.
#[derive(Debug, Default)]
pub struct QueryResponse {
    /// Total number of matching documents.
    pub hits: usize,
    /// Results of the requested window, in backend order.
    pub results: Vec<SearchResult>,
    pub facets: FacetCounts,
}

/// Accumulated state of one logical search.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    connection: Arc<SearchConnection>,
    query_filter: SQ,
    order_by: Vec<String>,
    models: BTreeSet<ModelType>,
    boost: BTreeMap<String, f64>,
    facets: BTreeSet<String>,
    date_facets: BTreeMap<String, DateFacet>,
    query_facets: Vec<(String, String)>,
    narrow_queries: BTreeSet<String>,
    highlight: bool,
    raw_query: Option<String>,
    more_like_this: Option<String>,
}

impl SearchQuery {
    /// An empty plan matching every document.
    pub fn new(connection: Arc<SearchConnection>) -> Self {
        SearchQuery {
            connection,
            query_filter: SQ::default(),
            order_by: Vec::new(),
            models: BTreeSet::new(),
            boost: BTreeMap::new(),
            facets: BTreeSet::new(),
            date_facets: BTreeMap::new(),
            query_facets: Vec::new(),
            narrow_queries: BTreeSet::new(),
            highlight: false,
            raw_query: None,
            more_like_this: None,
        }
    }

    /// A copy of this plan with `change` applied; `self` is left untouched.
    pub fn with<F: FnOnce(&mut SearchQuery)>(&self, change: F) -> SearchQuery {
        let mut query = self.clone();
        change(&mut query);
        query
    }

    pub fn connection(&self) -> &Arc<SearchConnection> {
        &self.connection
    }

    /// The root of the condition tree.
    pub fn query_filter(&self) -> &SQ {
        &self.query_filter
    }

    pub fn order_by(&self) -> &[String] {
        &self.order_by
    }

    pub fn models(&self) -> &BTreeSet<ModelType> {
        &self.models
    }

    pub fn boosts(&self) -> &BTreeMap<String, f64> {
        &self.boost
    }

    pub fn facets(&self) -> &BTreeSet<String> {
        &self.facets
    }

    pub fn date_facets(&self) -> &BTreeMap<String, DateFacet> {
        &self.date_facets
    }

    pub fn query_facets(&self) -> &[(String, String)] {
        &self.query_facets
    }

    pub fn narrow_queries(&self) -> &BTreeSet<String> {
        &self.narrow_queries
    }

    pub fn is_highlighted(&self) -> bool {
        self.highlight
    }

    pub fn raw_query(&self) -> Option<&str> {
        self.raw_query.as_deref()
    }

    /// Identity of the document this plan finds similar documents to.
    pub fn more_like_this_identity(&self) -> Option<&str> {
        self.more_like_this.as_deref()
    }

    /// Add a condition to the root of the tree.
    ///
    /// The condition is joined with AND, or with OR when `use_or` is set.
    /// A multi-child condition whose connector differs from the join is
    /// added as its own group so the existing conditions keep their meaning.
    pub fn add_filter(&mut self, query_filter: SQ, use_or: bool) {
        let mut connector = if use_or { Connector::Or } else { Connector::And };

        let subtree = !self.query_filter.is_empty()
            && query_filter.connector() != connector
            && query_filter.len() > 1;
        let parent = subtree.then(|| self.query_filter.start_subtree(connector));

        for child in query_filter.children() {
            match child {
                Child::Node(node) => {
                    let outer = self.query_filter.start_subtree(connector);
                    self.add_filter(node.clone(), false);
                    self.query_filter.end_subtree(outer);
                }
                Child::Leaf(expression, value) => {
                    self.query_filter
                        .add_leaf(expression.clone(), value.clone(), connector);
                }
            }
            connector = query_filter.connector();
        }

        if query_filter.is_negated() {
            self.query_filter.negate();
        }
        if let Some(parent) = parent {
            self.query_filter.end_subtree(parent);
        }
    }

    /// Append a sort field; `-field` sorts descending.
    pub fn add_order_by<S: Into<String>>(&mut self, field: S) {
        self.order_by.push(field.into());
    }

    pub fn clear_order_by(&mut self) {
        self.order_by.clear();
    }

    /// Restrict hits to a model type. Several calls widen the restriction.
    pub fn add_model(&mut self, model: ModelType) {
        self.models.insert(model);
    }

    pub fn add_boost<S: Into<String>>(&mut self, term: S, boost: f64) {
        self.boost.insert(term.into(), boost);
    }

    pub fn add_highlight(&mut self) {
        self.highlight = true;
    }

    pub fn add_field_facet<S: Into<String>>(&mut self, field: S) {
        self.facets.insert(field.into());
    }

    pub fn add_date_facet<S: Into<String>>(&mut self, field: S, facet: DateFacet) {
        self.date_facets.insert(field.into(), facet);
    }

    pub fn add_query_facet<F: Into<String>, Q: Into<String>>(&mut self, field: F, query: Q) {
        self.query_facets.push((field.into(), query.into()));
    }

    /// Require hits to also match a raw query string.
    pub fn add_narrow_query<S: Into<String>>(&mut self, query: S) {
        self.narrow_queries.insert(query.into());
    }

    /// Bypass the condition tree with a query string sent as is.
    pub fn set_raw_query<S: Into<String>>(&mut self, query: S) {
        self.raw_query = Some(query.into());
    }

    /// Search for documents similar to the one with `identity`.
    pub fn set_more_like_this<S: Into<String>>(&mut self, identity: S) {
        self.more_like_this = Some(identity.into());
    }

    /// Merge the conditions of `other` into this plan.
    pub fn combine(&mut self, other: &SearchQuery, connector: Connector) {
        self.add_filter(other.query_filter.clone(), connector == Connector::Or);
    }

    /// Compile the plan into a backend query string.
    ///
    /// The output depends only on the plan state: compiling twice yields the
    /// same string.
    pub fn build_query(&self) -> String {
        if let Some(raw_query) = &self.raw_query {
            return raw_query.clone();
        }

        let formatter = self.connection.backend().formatter();
        let mut root = self.query_filter.clone();
        if !self.models.is_empty() {
            let labels: Vec<Value> = self
                .models
                .iter()
                .map(|model| Value::Text(model.label()))
                .collect();
            let type_field = &self.connection.config().type_field;
            root.add(SQ::new(&format!("{type_field}__in"), labels), Connector::And);
        }

        let mut query = if root.is_empty() {
            formatter.matching_all_fragment()
        } else {
            root.as_query_string(formatter)
        };

        if !self.boost.is_empty() {
            let boosts: Vec<String> = self
                .boost
                .iter()
                .map(|(term, boost)| formatter.build_boost_fragment(term, *boost))
                .collect();
            query = format!("{query} {}", boosts.join(" "));
        }
        query
    }

    /// Request parameters for hits `start..end`.
    pub fn build_options(&self, start: usize, end: Option<usize>) -> SearchOptions {
        let mut narrow_queries = self.narrow_queries.clone();
        if self.more_like_this.is_some() && (!self.query_filter.is_empty() || !self.models.is_empty()) {
            narrow_queries.insert(self.build_query());
        }

        SearchOptions {
            start_offset: start,
            end_offset: end,
            sort_by: self.order_by.clone(),
            highlight: self.highlight,
            facets: self.facets.clone(),
            date_facets: self.date_facets.clone(),
            query_facets: self.query_facets.clone(),
            narrow_queries,
        }
    }

    /// Execute the plan for hits `start..end`; `None` fetches every hit.
    ///
    /// Backend failures surface as an empty response.
    pub fn run(&self, start: usize, end: Option<usize>) -> QueryResponse {
        let backend = self.connection.backend();
        let options = self.build_options(start, end);

        let started = Instant::now();
        let (query_string, raw) = match &self.more_like_this {
            Some(identity) => (
                format!("more_like_this:{identity}"),
                backend.more_like_this(identity, &options),
            ),
            None => {
                let query_string = self.build_query();
                let raw = backend.search(&query_string, &options);
                (query_string, raw)
            }
        };
        let elapsed = started.elapsed();

        log::debug!(
            "query '{query_string}' [{start}..{end:?}] returned {} of {} hits in {elapsed:?}",
            raw.results.len(),
            raw.hits
        );
        self.connection.record_query(QueryLogEntry::new(
            query_string,
            elapsed,
            raw.hits,
            start,
            end,
        ));

        let registry = self.connection.registry();
        let config = self.connection.config();
        let results = raw
            .results
            .into_iter()
            .filter_map(|hit| SearchResult::from_raw(hit, registry, config))
            .collect();

        QueryResponse {
            hits: raw.hits,
            results,
            facets: raw.facets,
        }
    }

    /// Number of matching documents, without fetching any hit.
    pub fn run_count(&self) -> usize {
        self.run(0, Some(0)).hits
    }
}
