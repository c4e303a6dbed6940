//! Lazy, paged result sets.
//!
//! A [`SearchQuerySet`] is a sequence view over the hits of a
//! [`SearchQuery`]. Nothing is fetched until results are read; reads fetch
//! only the pages they touch and keep every fetched result in a per-set
//! cache, so a position is never fetched twice.
//!
//! Builder methods such as [`SearchQuerySet::filter`] return a new set with
//! its own empty cache and leave the receiver untouched.
//!
//! ```
//! use std::sync::Arc;
//!
//! use sift::backend::memory::MemoryBackend;
//! use sift::config::SiftConfig;
//! use sift::index::Registry;
//! use sift::query::node::SQ;
//! use sift::query::plan::SearchConnection;
//! use sift::query::query_set::SearchQuerySet;
//!
//! let connection = Arc::new(SearchConnection::new(
//!     Arc::new(MemoryBackend::new()),
//!     Arc::new(Registry::new()),
//!     SiftConfig::default(),
//! ));
//!
//! let sqs = SearchQuerySet::new(connection)
//!     .exclude(SQ::new("title", "moof"))
//!     .filter(SQ::content("foo") | SQ::content("baz"));
//! assert_eq!(sqs.query().build_query(), "(NOT (title:moof) AND (foo OR baz))");
//! assert_eq!(sqs.len(), 0);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::ops::{BitAnd, BitOr, Bound, RangeBounds};
use std::rc::Rc;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::backend::{DateFacet, FacetCounts};
use crate::error::{Result, SiftError};
use crate::object::{ModelStore, Source, SourceRef};
use crate::query::node::{Connector, SQ};
use crate::query::plan::{SearchConnection, SearchQuery};
use crate::result::SearchResult;
use crate::value::{ModelType, get_identifier};

lazy_static! {
    static ref QUOTED_REGEX: Regex =
        Regex::new(r#""([^"]*)"|'([^']*)'"#).expect("quoted phrase pattern is valid");
}

/// State of one position of the result cache.
#[derive(Debug, Clone)]
enum CacheSlot {
    /// Not fetched yet.
    Pending,
    /// Fetched, but there is no result to show at this position.
    Empty,
    Filled(Rc<SearchResult>),
}

/// A lazily fetched, cached sequence of search results.
pub struct SearchQuerySet {
    query: SearchQuery,
    page_size: usize,
    cache: RefCell<Vec<CacheSlot>>,
    hit_count: Cell<Option<usize>>,
    load_all: bool,
    related: bool,
    load_all_stores: BTreeMap<ModelType, Arc<dyn ModelStore>>,
}

impl SearchQuerySet {
    /// A set over every indexed document.
    pub fn new(connection: Arc<SearchConnection>) -> Self {
        SearchQuerySet::from_query(SearchQuery::new(connection))
    }

    /// A set over the hits of an existing plan.
    pub fn from_query(query: SearchQuery) -> Self {
        let page_size = query.connection().config().page_size.max(1);
        SearchQuerySet {
            query,
            page_size,
            cache: RefCell::new(Vec::new()),
            hit_count: Cell::new(None),
            load_all: false,
            related: false,
            load_all_stores: BTreeMap::new(),
        }
    }

    /// The plan this set reads from.
    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of stores registered with [`SearchQuerySet::load_all_queryset`].
    pub fn load_all_querysets(&self) -> usize {
        self.load_all_stores.len()
    }

    fn chain(&self, query: SearchQuery) -> SearchQuerySet {
        SearchQuerySet {
            query,
            page_size: self.page_size,
            cache: RefCell::new(Vec::new()),
            hit_count: Cell::new(None),
            load_all: self.load_all,
            related: self.related,
            load_all_stores: self.load_all_stores.clone(),
        }
    }

    fn chain_with<F: FnOnce(&mut SearchQuery)>(&self, change: F) -> SearchQuerySet {
        self.chain(self.query.with(change))
    }

    /// A copy of this set with an empty cache.
    pub fn all(&self) -> SearchQuerySet {
        self.chain(self.query.clone())
    }

    /// Fetch `page_size` hits per backend round trip.
    pub fn with_page_size(&self, page_size: usize) -> SearchQuerySet {
        let mut set = self.all();
        set.page_size = page_size.max(1);
        set
    }

    /// Narrow the set to hits matching `sq`.
    pub fn filter(&self, sq: SQ) -> SearchQuerySet {
        self.chain_with(|q| q.add_filter(sq, false))
    }

    /// Widen the set with hits matching `sq`.
    pub fn filter_or(&self, sq: SQ) -> SearchQuerySet {
        self.chain_with(|q| q.add_filter(sq, true))
    }

    /// Narrow the set to hits not matching `sq`.
    pub fn exclude(&self, sq: SQ) -> SearchQuerySet {
        self.chain_with(|q| q.add_filter(!sq, false))
    }

    /// Sort by the given fields; `-field` sorts descending.
    pub fn order_by<S: AsRef<str>>(&self, fields: &[S]) -> SearchQuerySet {
        self.chain_with(|q| {
            for field in fields {
                q.add_order_by(field.as_ref());
            }
        })
    }

    /// Restrict hits to the given model types.
    pub fn models(&self, models: &[ModelType]) -> SearchQuerySet {
        self.chain_with(|q| {
            for model in models {
                q.add_model(model.clone());
            }
        })
    }

    pub fn highlight(&self) -> SearchQuerySet {
        self.chain_with(SearchQuery::add_highlight)
    }

    pub fn boost(&self, term: &str, boost: f64) -> SearchQuerySet {
        self.chain_with(|q| q.add_boost(term, boost))
    }

    pub fn facet(&self, field: &str) -> SearchQuerySet {
        self.chain_with(|q| q.add_field_facet(field))
    }

    pub fn date_facet(&self, field: &str, facet: DateFacet) -> SearchQuerySet {
        self.chain_with(|q| q.add_date_facet(field, facet))
    }

    pub fn query_facet(&self, field: &str, query: &str) -> SearchQuerySet {
        self.chain_with(|q| q.add_query_facet(field, query))
    }

    /// Require hits to also match a raw query string.
    pub fn narrow(&self, query: &str) -> SearchQuerySet {
        self.chain_with(|q| q.add_narrow_query(query))
    }

    /// Send `query` to the backend as is.
    pub fn raw_search(&self, query: &str) -> SearchQuerySet {
        self.chain_with(|q| q.set_raw_query(query))
    }

    /// Interpret user input as a list of keywords.
    ///
    /// Quoted text is matched as a phrase, `-word` excludes a word and every
    /// other word is required. Reserved characters are matched literally.
    pub fn auto_query(&self, query_string: &str) -> SearchQuerySet {
        let content_field = self.query.connection().config().content_field.clone();
        let mut phrases = Vec::new();
        let rest = QUOTED_REGEX.replace_all(query_string, |caps: &regex::Captures<'_>| {
            if let Some(phrase) = caps.get(1).or_else(|| caps.get(2)) {
                phrases.push(phrase.as_str().to_string());
            }
            " "
        });

        self.chain_with(|q| {
            for phrase in phrases {
                q.add_filter(SQ::new(&content_field, phrase), false);
            }
            for keyword in rest.split_whitespace() {
                match keyword.strip_prefix('-') {
                    Some(excluded) if !excluded.is_empty() => {
                        q.add_filter(!SQ::new(&content_field, excluded), false)
                    }
                    _ => q.add_filter(SQ::new(&content_field, keyword), false),
                }
            }
        })
    }

    /// Find documents similar to `object`.
    pub fn more_like_this(&self, object: &dyn Source) -> Result<SearchQuerySet> {
        let (model, pk) = object.model_type().zip(object.pk()).ok_or_else(|| {
            SiftError::attribute(format!(
                "The object '{object:?}' has no model type or primary key."
            ))
        })?;
        let identity = get_identifier(&model, &pk);
        Ok(self.chain_with(|q| q.set_more_like_this(identity)))
    }

    /// Load the objects of fetched results in bulk, one lookup per model
    /// type and page.
    pub fn load_all(&self) -> SearchQuerySet {
        let mut set = self.all();
        set.load_all = true;
        set
    }

    /// A set whose load-all mode drops results without an object.
    pub fn related(&self) -> SearchQuerySet {
        let mut set = self.all();
        set.related = true;
        set
    }

    /// Load objects of `model` from `store` instead of the registered store.
    ///
    /// Only related sets accept a replacement store.
    pub fn load_all_queryset(
        &self,
        model: ModelType,
        store: Arc<dyn ModelStore>,
    ) -> Result<SearchQuerySet> {
        if !self.related {
            return Err(SiftError::unsupported(
                "load_all_queryset is only supported on related search query sets",
            ));
        }
        let mut set = self.all();
        set.load_all_stores.insert(model, store);
        Ok(set)
    }

    /// Facet counts of the whole set.
    pub fn facet_counts(&self) -> FacetCounts {
        self.query.run(0, Some(0)).facets
    }

    /// The best scoring result.
    pub fn best_match(&self) -> Option<Rc<SearchResult>> {
        self.get(0)
    }

    /// The result with the highest value of `field`.
    pub fn latest(&self, field: &str) -> Option<Rc<SearchResult>> {
        self.order_by(&[format!("-{field}")]).best_match()
    }

    /// Total number of hits.
    ///
    /// Costs one count-only fetch the first time, nothing afterwards.
    pub fn len(&self) -> usize {
        if let Some(count) = self.hit_count.get() {
            return count;
        }
        let count = self.query.run_count();
        self.set_hit_count(count);
        count
    }

    pub fn count(&self) -> usize {
        self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_hit_count(&self, count: usize) -> usize {
        match self.hit_count.get() {
            Some(known) => known,
            None => {
                self.hit_count.set(Some(count));
                self.cache.borrow_mut().resize_with(count, || CacheSlot::Pending);
                count
            }
        }
    }

    /// Whether every position has been fetched.
    pub fn is_cache_full(&self) -> bool {
        self.hit_count.get().is_some()
            && !self
                .cache
                .borrow()
                .iter()
                .any(|slot| matches!(slot, CacheSlot::Pending))
    }

    /// Number of cached results.
    pub fn cached_len(&self) -> usize {
        self.cache
            .borrow()
            .iter()
            .filter(|slot| matches!(slot, CacheSlot::Filled(_)))
            .count()
    }

    /// Fetch hits `start..end` into the cache.
    ///
    /// Already cached positions keep their result; positions of the window
    /// without a hit become empty. Returns whether the backend returned any
    /// result.
    pub fn fill_cache(&self, start: usize, end: usize) -> bool {
        let response = self.query.run(start, Some(end));
        let count = self.set_hit_count(response.hits);

        let mut results = response.results;
        let found = !results.is_empty();
        let loaded = if self.load_all {
            self.load_objects(&mut results)
        } else {
            vec![true; results.len()]
        };

        let mut hits = results.into_iter().zip(loaded);
        let mut cache = self.cache.borrow_mut();
        for position in start..end.min(count) {
            let hit = hits.next();
            if !matches!(cache[position], CacheSlot::Pending) {
                continue;
            }
            cache[position] = match hit {
                Some((_, false)) if self.related => CacheSlot::Empty,
                Some((result, _)) => CacheSlot::Filled(Rc::new(result)),
                None => CacheSlot::Empty,
            };
        }
        found
    }

    /// Attach objects loaded in bulk; returns which results got one.
    fn load_objects(&self, results: &mut [SearchResult]) -> Vec<bool> {
        let mut pks_by_model: BTreeMap<ModelType, Vec<String>> = BTreeMap::new();
        for result in results.iter() {
            pks_by_model
                .entry(result.model().clone())
                .or_default()
                .push(result.pk().to_string());
        }

        let registry = self.query.connection().registry();
        let mut loaded: BTreeMap<ModelType, HashMap<String, SourceRef>> = BTreeMap::new();
        for (model, pks) in pks_by_model {
            let store = match self.load_all_stores.get(&model) {
                Some(store) => Arc::clone(store),
                None => match registry.get_store(&model) {
                    Ok(store) => store,
                    Err(e) => {
                        log::error!("Cannot load objects of {model}: {e}");
                        continue;
                    }
                },
            };
            match store.in_bulk(&pks) {
                Ok(objects) => {
                    loaded.insert(model, objects);
                }
                Err(e) => log::error!("Failed to load objects of {model} in bulk: {e}"),
            }
        }

        results
            .iter_mut()
            .map(|result| {
                let object = loaded
                    .get(result.model())
                    .and_then(|objects| objects.get(result.pk()))
                    .cloned();
                match object {
                    Some(object) => {
                        result.set_object(object);
                        true
                    }
                    None => false,
                }
            })
            .collect()
    }

    fn slot(&self, position: usize) -> Option<CacheSlot> {
        self.cache.borrow().get(position).cloned()
    }

    /// The result at `position`, fetching its page if needed.
    ///
    /// `None` past the end of the set or where the position holds no result.
    pub fn get(&self, position: usize) -> Option<Rc<SearchResult>> {
        if let Some(count) = self.hit_count.get() {
            if position >= count {
                return None;
            }
        }
        if matches!(self.slot(position), None | Some(CacheSlot::Pending)) {
            let start = position - position % self.page_size;
            self.fill_cache(start, (start + self.page_size).max(position + 1));
        }
        match self.slot(position) {
            Some(CacheSlot::Filled(result)) => Some(result),
            _ => None,
        }
    }

    /// Results in `range`, fetching only the uncached parts.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Vec<Rc<SearchResult>> {
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&end) => Some(end + 1),
            Bound::Excluded(&end) => Some(end),
            Bound::Unbounded => None,
        };

        let end = self.fill_range(start, end);
        self.collect_filled((start..end).collect())
    }

    /// Every `step`-th result of `start..end`.
    ///
    /// Only the pages holding the selected positions are fetched.
    pub fn slice_step(&self, start: usize, end: Option<usize>, step: usize) -> Vec<Rc<SearchResult>> {
        let step = step.max(1);
        if self.hit_count.get().is_none() {
            self.fill_cache(start, start + self.page_size);
        }
        let count = self.hit_count.get().unwrap_or_default();
        let end = end.map_or(count, |end| end.min(count));

        let positions: Vec<usize> = (start..end).step_by(step).collect();
        for &position in &positions {
            if matches!(self.slot(position), Some(CacheSlot::Pending)) {
                self.fill_cache(position, position + self.page_size);
            }
        }
        self.collect_filled(positions)
    }

    /// Fill `start..end` with as few fetches as possible; returns the
    /// effective end, clipped to the hit count.
    fn fill_range(&self, start: usize, end: Option<usize>) -> usize {
        loop {
            let Some(count) = self.hit_count.get() else {
                let span = end.map_or(self.page_size, |end| {
                    end.saturating_sub(start).max(self.page_size)
                });
                self.fill_cache(start, start + span);
                continue;
            };

            let end = end.map_or(count, |end| end.min(count));
            let pending = {
                let cache = self.cache.borrow();
                (start..end)
                    .find(|&position| matches!(cache[position], CacheSlot::Pending))
                    .map(|first| {
                        let run_end = (first..end)
                            .find(|&position| !matches!(cache[position], CacheSlot::Pending))
                            .unwrap_or(end);
                        (first, run_end)
                    })
            };
            match pending {
                Some((first, run_end)) => {
                    self.fill_cache(first, run_end.max(first + self.page_size));
                }
                None => return end.max(start),
            }
        }
    }

    fn collect_filled(&self, positions: Vec<usize>) -> Vec<Rc<SearchResult>> {
        let cache = self.cache.borrow();
        positions
            .into_iter()
            .filter_map(|position| match cache.get(position) {
                Some(CacheSlot::Filled(result)) => Some(Rc::clone(result)),
                _ => None,
            })
            .collect()
    }

    /// Iterate over every result, filling the cache page by page.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            set: self,
            position: 0,
        }
    }

    /// Stream every result page by page without touching the cache.
    pub fn manual_iter(&self) -> ManualIter<'_> {
        ManualIter {
            set: self,
            position: 0,
            count: None,
            buffer: VecDeque::new(),
        }
    }

    fn combine(&self, other: &SearchQuerySet, connector: Connector) -> SearchQuerySet {
        self.chain_with(|q| q.combine(&other.query, connector))
    }
}

impl fmt::Debug for SearchQuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchQuerySet")
            .field("query", &self.query.build_query())
            .field("page_size", &self.page_size)
            .field("hit_count", &self.hit_count.get())
            .field("cached", &self.cached_len())
            .field("load_all", &self.load_all)
            .field("related", &self.related)
            .finish()
    }
}

impl BitAnd for &SearchQuerySet {
    type Output = SearchQuerySet;

    fn bitand(self, rhs: &SearchQuerySet) -> SearchQuerySet {
        self.combine(rhs, Connector::And)
    }
}

impl BitOr for &SearchQuerySet {
    type Output = SearchQuerySet;

    fn bitor(self, rhs: &SearchQuerySet) -> SearchQuerySet {
        self.combine(rhs, Connector::Or)
    }
}

impl BitAnd for SearchQuerySet {
    type Output = SearchQuerySet;

    fn bitand(self, rhs: SearchQuerySet) -> SearchQuerySet {
        self.combine(&rhs, Connector::And)
    }
}

impl BitOr for SearchQuerySet {
    type Output = SearchQuerySet;

    fn bitor(self, rhs: SearchQuerySet) -> SearchQuerySet {
        self.combine(&rhs, Connector::Or)
    }
}

impl<'a> IntoIterator for &'a SearchQuerySet {
    type Item = Rc<SearchResult>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Cache-filling iterator over a [`SearchQuerySet`].
#[derive(Debug)]
pub struct Iter<'a> {
    set: &'a SearchQuerySet,
    position: usize,
}

impl Iterator for Iter<'_> {
    type Item = Rc<SearchResult>;

    fn next(&mut self) -> Option<Rc<SearchResult>> {
        loop {
            if self.set.hit_count.get().is_none() {
                self.set.fill_cache(0, self.set.page_size);
            }
            let count = self.set.hit_count.get().unwrap_or_default();
            if self.position >= count {
                return None;
            }

            match self.set.slot(self.position) {
                Some(CacheSlot::Filled(result)) => {
                    self.position += 1;
                    return Some(result);
                }
                Some(CacheSlot::Pending) => {
                    self.set
                        .fill_cache(self.position, self.position + self.set.page_size);
                }
                _ => self.position += 1,
            }
        }
    }
}

/// Non-caching iterator over a [`SearchQuerySet`].
pub struct ManualIter<'a> {
    set: &'a SearchQuerySet,
    position: usize,
    count: Option<usize>,
    buffer: VecDeque<SearchResult>,
}

impl Iterator for ManualIter<'_> {
    type Item = SearchResult;

    fn next(&mut self) -> Option<SearchResult> {
        loop {
            if let Some(result) = self.buffer.pop_front() {
                return Some(result);
            }
            if self.count.is_some_and(|count| self.position >= count) {
                return None;
            }

            let set = self.set;
            let end = self.position + set.page_size;
            let response = set.query.run(self.position, Some(end));
            self.count = Some(response.hits);
            self.position = end;

            let mut results = response.results;
            if results.is_empty() {
                return None;
            }
            if set.load_all {
                let loaded = set.load_objects(&mut results);
                self.buffer.extend(
                    results
                        .into_iter()
                        .zip(loaded)
                        .filter(|(_, loaded)| *loaded || !set.related)
                        .map(|(result, _)| result),
                );
            } else {
                self.buffer.extend(results);
            }
        }
    }
}

impl fmt::Debug for ManualIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualIter")
            .field("position", &self.position)
            .field("count", &self.count)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
