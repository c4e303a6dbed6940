//! An in-process search backend.
//!
//! [`MemoryBackend`] keeps prepared documents in memory and evaluates the
//! Lucene query strings written by [`LuceneFormatter`]. It supports field
//! and query facets, date facets, sorting, narrowing, highlighting and
//! "more like this", which makes it suitable for tests and small corpora.
//!
//! Matching rules:
//!
//! - Text matches a term when the whole value equals it ignoring case or when
//!   the term's words appear consecutively among the value's words.
//! - Numbers, booleans and dates are compared by value.
//! - A multi-valued field matches when any of its items does.
//! - `field:[* TO *]` matches documents that have the field.

pub mod parser;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use ahash::{AHashMap, AHashSet};
use chrono::{Months, NaiveDate, NaiveDateTime, TimeDelta};
use parking_lot::RwLock;

use crate::config::SiftConfig;
use crate::document::Document;
use crate::error::{Result, SiftError};
use crate::index::SearchIndex;
use crate::util::levenshtein::FuzzyTerm;
use crate::util::text::{tokenize, word_offsets};
use crate::value::{ModelType, Value};

use self::parser::{QueryNode, QueryParser};
use super::formatter::{LuceneFormatter, QueryFormatter, format_date};
use super::{DateFacet, DateGap, FacetCounts, RawHit, RawResults, SearchBackend, SearchOptions};

const DATE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Clone)]
struct StoredDocument {
    identity: String,
    model: String,
    /// Name of the field holding the document text.
    document_field: String,
    indexed: BTreeMap<String, Value>,
    stored: BTreeMap<String, Value>,
}

impl StoredDocument {
    fn value(&self, name: &str) -> Option<&Value> {
        self.indexed.get(name).or_else(|| self.stored.get(name))
    }

    fn text(&self) -> String {
        self.value(&self.document_field)
            .map(Value::to_string)
            .unwrap_or_default()
    }
}

/// Search backend keeping every document in memory.
///
/// Documents keep their insertion order, so equally scored hits come back in
/// the order they were first indexed.
#[derive(Debug)]
pub struct MemoryBackend {
    config: SiftConfig,
    formatter: LuceneFormatter,
    parser: QueryParser,
    documents: RwLock<Vec<StoredDocument>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::with_config(&SiftConfig::default())
    }

    /// Create a backend using the field names of `config`.
    pub fn with_config(config: &SiftConfig) -> Self {
        MemoryBackend {
            config: config.clone(),
            formatter: LuceneFormatter::new(config.content_field.as_str()),
            parser: QueryParser::new(),
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn store_document(&self, index: &SearchIndex, document: &Document) -> Result<StoredDocument> {
        let text = |name: &str| {
            document
                .get_field(name)
                .and_then(Value::as_text)
                .map(str::to_string)
                .ok_or_else(|| SiftError::backend(format!("document has no '{name}' field")))
        };
        let identity = text(&self.config.id_field)?;
        let model = text(&self.config.type_field)?;
        let document_field = index
            .document_field()
            .map_err(|e| SiftError::backend(e.to_string()))?
            .to_string();

        let mut indexed = BTreeMap::new();
        let mut stored = BTreeMap::new();
        for (name, value) in document.fields() {
            let (is_indexed, is_stored) = index
                .get_field(name)
                .map_or((true, true), |field| (field.is_indexed(), field.is_stored()));
            if is_indexed {
                indexed.insert(name.clone(), value.clone());
            }
            if is_stored {
                stored.insert(name.clone(), value.clone());
            }
        }

        Ok(StoredDocument {
            identity,
            model,
            document_field,
            indexed,
            stored,
        })
    }

    fn field_name<'a>(&self, field: Option<&'a str>, doc: &'a StoredDocument) -> &'a str {
        match field {
            Some(name) if name != self.config.content_field => name,
            _ => &doc.document_field,
        }
    }

    /// Score of `doc` against `query`, `None` if it does not match.
    fn score(&self, query: &QueryNode, doc: &StoredDocument) -> Option<f64> {
        match query {
            QueryNode::MatchAll => Some(1.0),
            QueryNode::And(clauses) => {
                let all_boosts = clauses.iter().all(|c| matches!(c, QueryNode::Boost(..)));
                let mut total = 0.0;
                for clause in clauses {
                    match (self.score(clause, doc), clause) {
                        (Some(score), _) => total += score,
                        (None, QueryNode::Boost(..)) if !all_boosts => {}
                        (None, _) => return None,
                    }
                }
                Some(total)
            }
            QueryNode::Or(clauses) => clauses
                .iter()
                .filter_map(|clause| self.score(clause, doc))
                .reduce(|a, b| a + b),
            QueryNode::Not(inner) => match self.score(inner, doc) {
                Some(_) => None,
                None => Some(0.0),
            },
            QueryNode::Boost(inner, boost) => self.score(inner, doc).map(|score| score * boost),
            leaf => {
                let field = leaf_field(leaf);
                let value = doc.indexed.get(self.field_name(field, doc));
                value.filter(|v| leaf_matches(leaf, v)).map(|_| 1.0)
            }
        }
    }

    fn parse_narrow_queries(&self, options: &SearchOptions) -> Result<Vec<QueryNode>> {
        options
            .narrow_queries
            .iter()
            .map(|narrow| self.parser.parse(narrow))
            .collect()
    }

    fn passes(&self, narrow: &[QueryNode], doc: &StoredDocument) -> bool {
        narrow.iter().all(|query| self.score(query, doc).is_some())
    }

    fn sort_matches(&self, matches: &mut [(usize, f64)], docs: &[StoredDocument], sort_by: &[String]) {
        if sort_by.is_empty() {
            matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
            return;
        }

        matches.sort_by(|a, b| {
            for key in sort_by {
                let (name, descending) = match key.strip_prefix('-') {
                    Some(name) => (name, true),
                    None => (key.as_str(), false),
                };
                let ordering = match (docs[a.0].value(name), docs[b.0].value(name)) {
                    (Some(x), Some(y)) if descending => compare_values(y, x),
                    (Some(x), Some(y)) => compare_values(x, y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    fn facet_counts(
        &self,
        options: &SearchOptions,
        matches: &[(usize, f64)],
        docs: &[StoredDocument],
    ) -> Result<FacetCounts> {
        let mut facets = FacetCounts::default();

        for field in &options.facets {
            let mut counts: AHashMap<String, usize> = AHashMap::new();
            for (position, _) in matches {
                let Some(value) = docs[*position].value(field) else {
                    continue;
                };
                for item in scalars(value) {
                    *counts.entry(facet_key(item)).or_insert(0) += 1;
                }
            }
            let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
            counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            facets.fields.insert(field.clone(), counts);
        }

        for (field, facet) in &options.date_facets {
            let mut buckets = Vec::new();
            let mut bucket_start = facet.start;
            while bucket_start < facet.end {
                let Some(bucket_end) = step_date(bucket_start, facet) else {
                    break;
                };
                if bucket_end <= bucket_start {
                    break;
                }
                let count = matches
                    .iter()
                    .filter(|(position, _)| {
                        docs[*position].value(field).is_some_and(|value| {
                            scalars(value).iter().any(|item| {
                                item.as_datetime()
                                    .is_some_and(|dt| dt >= bucket_start && dt < bucket_end)
                            })
                        })
                    })
                    .count();
                buckets.push((bucket_start.format("%Y-%m-%dT%H:%M:%SZ").to_string(), count));
                bucket_start = bucket_end;
            }
            facets.dates.insert(field.clone(), buckets);
        }

        for (field, query) in &options.query_facets {
            let key = format!("{field}:{query}");
            let parsed = self.parser.parse(&key)?;
            let count = matches
                .iter()
                .filter(|(position, _)| self.score(&parsed, &docs[*position]).is_some())
                .count();
            facets.queries.insert(key, count);
        }

        Ok(facets)
    }

    fn to_hit(&self, doc: &StoredDocument, score: f64, highlight: Option<&AHashSet<String>>) -> RawHit {
        let mut hit = RawHit {
            fields: doc.stored.clone(),
            score,
            highlighted: BTreeMap::new(),
        };
        if let Some(words) = highlight {
            let text = doc.text();
            if !text.is_empty() {
                hit.highlighted
                    .insert(doc.document_field.clone(), vec![emphasize(&text, words)]);
            }
        }
        hit
    }

    fn respond(
        &self,
        matches: Vec<(usize, f64)>,
        docs: &[StoredDocument],
        options: &SearchOptions,
        highlight: Option<&AHashSet<String>>,
        facets: FacetCounts,
    ) -> RawResults {
        let hits = matches.len();
        let start = options.start_offset.min(hits);
        let end = options.end_offset.unwrap_or(hits).clamp(start, hits);

        let results = matches[start..end]
            .iter()
            .map(|(position, score)| self.to_hit(&docs[*position], *score, highlight))
            .collect();

        RawResults {
            hits,
            results,
            facets,
        }
    }
}

impl SearchBackend for MemoryBackend {
    fn update(&self, index: &SearchIndex, documents: &[Document]) -> Result<()> {
        let prepared = documents
            .iter()
            .map(|document| self.store_document(index, document))
            .collect::<Result<Vec<_>>>()?;

        let mut stored = self.documents.write();
        for document in prepared {
            match stored.iter_mut().find(|d| d.identity == document.identity) {
                Some(existing) => *existing = document,
                None => stored.push(document),
            }
        }
        log::debug!(
            "indexed {} documents for {}, {} in total",
            documents.len(),
            index.model_type(),
            stored.len()
        );
        Ok(())
    }

    fn remove(&self, identity: &str) -> Result<()> {
        self.documents.write().retain(|d| d.identity != identity);
        Ok(())
    }

    fn clear(&self, models: &[ModelType]) -> Result<()> {
        let mut stored = self.documents.write();
        if models.is_empty() {
            stored.clear();
        } else {
            let labels: BTreeSet<String> = models.iter().map(ModelType::label).collect();
            stored.retain(|d| !labels.contains(&d.model));
        }
        Ok(())
    }

    fn search(&self, query: &str, options: &SearchOptions) -> Result<RawResults> {
        let parsed = self.parser.parse(query)?;
        let narrow = self.parse_narrow_queries(options)?;
        let docs = self.documents.read();

        let mut matches: Vec<(usize, f64)> = docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| self.passes(&narrow, doc))
            .filter_map(|(position, doc)| self.score(&parsed, doc).map(|score| (position, score)))
            .collect();
        self.sort_matches(&mut matches, &docs, &options.sort_by);

        let facets = self.facet_counts(options, &matches, &docs)?;
        let highlight = options.highlight.then(|| {
            let mut words = AHashSet::new();
            collect_highlight_words(&parsed, &self.config.content_field, &mut words);
            words
        });

        log::debug!("'{query}' matched {} documents", matches.len());
        Ok(self.respond(matches, &docs, options, highlight.as_ref(), facets))
    }

    fn more_like_this(&self, identity: &str, options: &SearchOptions) -> Result<RawResults> {
        let narrow = self.parse_narrow_queries(options)?;
        let docs = self.documents.read();

        let source = docs
            .iter()
            .find(|d| d.identity == identity)
            .ok_or_else(|| SiftError::backend(format!("no document with identity '{identity}'")))?;
        let source_words: AHashSet<String> = tokenize(&source.text()).into_iter().collect();

        let mut matches: Vec<(usize, f64)> = docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| doc.identity != identity && self.passes(&narrow, doc))
            .filter_map(|(position, doc)| {
                let words: AHashSet<String> = tokenize(&doc.text()).into_iter().collect();
                let shared = words.intersection(&source_words).count();
                (shared > 0).then_some((position, shared as f64))
            })
            .collect();
        self.sort_matches(&mut matches, &docs, &options.sort_by);

        let facets = self.facet_counts(options, &matches, &docs)?;
        Ok(self.respond(matches, &docs, options, None, facets))
    }

    fn formatter(&self) -> &dyn QueryFormatter {
        &self.formatter
    }
}

fn leaf_field(leaf: &QueryNode) -> Option<&str> {
    match leaf {
        QueryNode::Term { field, .. }
        | QueryNode::Wildcard { field, .. }
        | QueryNode::Fuzzy { field, .. }
        | QueryNode::Phrase { field, .. }
        | QueryNode::Range { field, .. } => field.as_deref(),
        _ => None,
    }
}

fn scalars(value: &Value) -> Vec<&Value> {
    match value {
        Value::List(items) => items.iter().flat_map(scalars).collect(),
        other => vec![other],
    }
}

fn leaf_matches(leaf: &QueryNode, value: &Value) -> bool {
    if let QueryNode::Range {
        lower: None,
        upper: None,
        ..
    } = leaf
    {
        return true;
    }
    scalars(value).into_iter().any(|item| scalar_matches(leaf, item))
}

fn scalar_matches(leaf: &QueryNode, value: &Value) -> bool {
    match leaf {
        QueryNode::Term { term, .. } => equals(value, term, 0),
        QueryNode::Phrase { phrase, slop, .. } => equals(value, phrase, slop.unwrap_or(0)),
        QueryNode::Wildcard { pattern, .. } => match value {
            Value::Text(text) => {
                pattern.is_match(text) || tokenize(text).iter().any(|word| pattern.is_match(word))
            }
            other => pattern.is_match(&other.to_string()),
        },
        QueryNode::Fuzzy { term, max_edits, .. } => {
            let fuzzy = FuzzyTerm::new(term).with_max_edits(*max_edits);
            match value {
                Value::Text(text) => {
                    fuzzy.matches(text) || tokenize(text).iter().any(|word| fuzzy.matches(word))
                }
                other => fuzzy.matches(&other.to_string()),
            }
        }
        QueryNode::Range {
            lower,
            upper,
            lower_inclusive,
            upper_inclusive,
            ..
        } => {
            let above = lower.as_deref().is_none_or(|bound| {
                match compare_to_bound(value, bound) {
                    Some(Ordering::Greater) => true,
                    Some(Ordering::Equal) => *lower_inclusive,
                    _ => false,
                }
            });
            let below = upper.as_deref().is_none_or(|bound| {
                match compare_to_bound(value, bound) {
                    Some(Ordering::Less) => true,
                    Some(Ordering::Equal) => *upper_inclusive,
                    _ => false,
                }
            });
            above && below
        }
        _ => false,
    }
}

/// Whether `value` equals `text`, allowing `slop` extra words between the
/// words of a text match.
fn equals(value: &Value, text: &str, slop: usize) -> bool {
    match value {
        Value::Text(content) => {
            content.to_lowercase() == text.to_lowercase()
                || contains_words(&tokenize(content), &tokenize(text), slop)
        }
        Value::Integer(_) | Value::Float(_) => text
            .parse::<f64>()
            .ok()
            .zip(value.as_f64())
            .is_some_and(|(a, b)| a == b),
        Value::Boolean(b) => text.eq_ignore_ascii_case(&b.to_string()),
        Value::Date(_) | Value::DateTime(_) => parse_datetime(text) == value.as_datetime(),
        Value::Null | Value::List(_) => false,
    }
}

fn contains_words(words: &[String], needle: &[String], slop: usize) -> bool {
    let Some(first) = needle.first() else {
        return false;
    };
    let max_span = needle.len() - 1 + slop;

    words.iter().enumerate().any(|(start, word)| {
        if word != first {
            return false;
        }
        let mut position = start;
        for next in &needle[1..] {
            match words[position + 1..].iter().position(|w| w == next) {
                Some(offset) if slop > 0 || offset == 0 => position += offset + 1,
                _ => return false,
            }
        }
        position - start <= max_span
    })
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn compare_to_bound(value: &Value, bound: &str) -> Option<Ordering> {
    match value {
        Value::Integer(_) | Value::Float(_) => {
            let bound = bound.parse::<f64>().ok()?;
            value.as_f64()?.partial_cmp(&bound)
        }
        Value::Date(_) | Value::DateTime(_) => Some(value.as_datetime()?.cmp(&parse_datetime(bound)?)),
        Value::Text(text) => Some(text.as_str().cmp(bound)),
        Value::Boolean(b) => Some(b.to_string().as_str().cmp(bound)),
        Value::Null | Value::List(_) => None,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        _ => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            }
            if let (Some(x), Some(y)) = (a.as_datetime(), b.as_datetime()) {
                return x.cmp(&y);
            }
            a.to_string().cmp(&b.to_string())
        }
    }
}

fn facet_key(value: &Value) -> String {
    match value {
        Value::Date(_) | Value::DateTime(_) => format_date(value),
        other => other.to_string(),
    }
}

fn step_date(from: NaiveDateTime, facet: &DateFacet) -> Option<NaiveDateTime> {
    let amount = facet.gap_amount;
    match facet.gap_by {
        DateGap::Year => from.checked_add_months(Months::new(amount.checked_mul(12)?)),
        DateGap::Month => from.checked_add_months(Months::new(amount)),
        DateGap::Day => from.checked_add_signed(TimeDelta::try_days(amount.into())?),
        DateGap::Hour => from.checked_add_signed(TimeDelta::try_hours(amount.into())?),
        DateGap::Minute => from.checked_add_signed(TimeDelta::try_minutes(amount.into())?),
        DateGap::Second => from.checked_add_signed(TimeDelta::try_seconds(amount.into())?),
    }
}

/// Lowercased words of the positive clauses searching the document text.
fn collect_highlight_words(query: &QueryNode, content_field: &str, words: &mut AHashSet<String>) {
    let on_content = |field: &Option<String>| field.as_deref().is_none_or(|f| f == content_field);
    match query {
        QueryNode::And(clauses) | QueryNode::Or(clauses) => {
            for clause in clauses {
                collect_highlight_words(clause, content_field, words);
            }
        }
        QueryNode::Boost(inner, _) => collect_highlight_words(inner, content_field, words),
        QueryNode::Term { field, term } if on_content(field) => words.extend(tokenize(term)),
        QueryNode::Phrase { field, phrase, .. } if on_content(field) => {
            words.extend(tokenize(phrase))
        }
        QueryNode::Fuzzy { field, term, .. } if on_content(field) => words.extend(tokenize(term)),
        _ => {}
    }
}

/// Wrap the words of `text` found in `words` in `<em>` tags.
fn emphasize(text: &str, words: &AHashSet<String>) -> String {
    let mut emphasized = String::with_capacity(text.len());
    let mut copied = 0;
    for (offset, word) in word_offsets(text) {
        if words.contains(&word.to_lowercase()) {
            emphasized.push_str(&text[copied..offset]);
            emphasized.push_str("<em>");
            emphasized.push_str(word);
            emphasized.push_str("</em>");
            copied = offset + word.len();
        }
    }
    emphasized.push_str(&text[copied..]);
    emphasized
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::fields::SearchField;

    fn mock_model() -> ModelType {
        ModelType::new("core", "mockmodel")
    }

    fn mock_index() -> SearchIndex {
        SearchIndex::new(mock_model())
            .field("text", SearchField::char().document())
            .field("name", SearchField::char())
            .field("pub_date", SearchField::datetime())
            .field("views", SearchField::integer().stored(false))
            .field("tags", SearchField::multi_value())
    }

    fn document(pk: i64, text: &str, name: &str, day: u32, views: i64) -> Document {
        let pub_date = NaiveDate::from_ymd_opt(2009, 2, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        Document::new()
            .with_field("id", format!("core.mockmodel.{pk}"))
            .with_field("model_type", "core.mockmodel")
            .with_field("model_pk", pk.to_string())
            .with_field("text", text)
            .with_field("name", name)
            .with_field("pub_date", pub_date)
            .with_field("views", views)
            .with_field("tags", vec!["search", name])
    }

    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .update(
                &mock_index(),
                &[
                    document(1, "Indexed!\n1", "daniel1", 25, 10),
                    document(2, "Indexed!\n2", "daniel2", 24, 20),
                    document(3, "Indexed!\n3 hello world", "daniel3", 23, 30),
                ],
            )
            .unwrap();
        backend
    }

    fn pks(results: &RawResults) -> Vec<String> {
        results
            .results
            .iter()
            .map(|hit| hit.fields["model_pk"].to_string())
            .collect()
    }

    fn search(backend: &MemoryBackend, query: &str) -> RawResults {
        backend.search(query, &SearchOptions::default()).unwrap()
    }

    #[test]
    fn test_update_remove_clear() {
        let backend = backend();
        let results = search(&backend, "*:*");
        assert_eq!(results.hits, 3);
        assert_eq!(pks(&results), vec!["1", "2", "3"]);

        backend.remove("core.mockmodel.1").unwrap();
        assert_eq!(pks(&search(&backend, "*:*")), vec!["2", "3"]);

        backend
            .update(&mock_index(), &[document(2, "Reindexed", "daniel2", 24, 20)])
            .unwrap();
        assert_eq!(backend.len(), 2);
        assert_eq!(pks(&search(&backend, "reindexed")), vec!["2"]);

        backend.clear(&[ModelType::new("core", "othermodel")]).unwrap();
        assert_eq!(backend.len(), 2);
        backend.clear(&[mock_model()]).unwrap();
        assert_eq!(search(&backend, "*:*").hits, 0);
    }

    #[test]
    fn test_unstored_fields_are_searchable_only() {
        let backend = backend();
        let results = search(&backend, "views:20");
        assert_eq!(pks(&results), vec!["2"]);
        assert!(!results.results[0].fields.contains_key("views"));
    }

    #[test]
    fn test_text_and_field_queries() {
        let backend = backend();
        assert_eq!(search(&backend, "indexed").hits, 3);
        assert_eq!(pks(&search(&backend, "\"hello world\"")), vec!["3"]);
        assert_eq!(pks(&search(&backend, "content:hello")), vec!["3"]);
        assert_eq!(pks(&search(&backend, "name:daniel2")), vec!["2"]);
        assert_eq!(pks(&search(&backend, "(indexed AND NOT (hello))")), vec!["1", "2"]);
        assert_eq!(pks(&search(&backend, "name:(daniel1 OR daniel3)")), vec!["1", "3"]);
        assert_eq!(pks(&search(&backend, "tags:daniel1")), vec!["1"]);
        assert_eq!(search(&backend, "(NOT *:*)").hits, 0);
    }

    #[test]
    fn test_ranges_wildcards_fuzzy() {
        let backend = backend();
        assert_eq!(
            pks(&search(&backend, "pub_date:[* TO \"2009-02-24T00:00:00Z\"]")),
            vec!["2", "3"]
        );
        assert_eq!(pks(&search(&backend, "views:{10 TO *}")), vec!["2", "3"]);
        assert_eq!(pks(&search(&backend, "name:[daniel2 TO *]")), vec!["2", "3"]);
        assert_eq!(search(&backend, "name:dan*").hits, 3);
        assert_eq!(pks(&search(&backend, "name:*el3")), vec!["3"]);
        assert_eq!(search(&backend, "name:danial1~1").hits, 1);
        assert_eq!(search(&backend, "name:[* TO *]").hits, 3);
        assert_eq!(search(&backend, "missing:[* TO *]").hits, 0);
    }

    #[test]
    fn test_boost_and_sorting() {
        let backend = backend();
        let results = search(&backend, "indexed hello^5");
        assert_eq!(results.hits, 3);
        assert_eq!(pks(&results)[0], "3");

        let options = SearchOptions {
            sort_by: vec!["-pub_date".to_string()],
            ..SearchOptions::default()
        };
        assert_eq!(pks(&backend.search("*:*", &options).unwrap()), vec!["1", "2", "3"]);
        let options = SearchOptions {
            sort_by: vec!["pub_date".to_string()],
            ..SearchOptions::default()
        };
        assert_eq!(pks(&backend.search("*:*", &options).unwrap()), vec!["3", "2", "1"]);
    }

    #[test]
    fn test_pagination_and_narrowing() {
        let backend = backend();
        let options = SearchOptions {
            start_offset: 1,
            end_offset: Some(2),
            ..SearchOptions::default()
        };
        let results = backend.search("*:*", &options).unwrap();
        assert_eq!(results.hits, 3);
        assert_eq!(pks(&results), vec!["2"]);

        let results = backend.search("*:*", &SearchOptions::count_only()).unwrap();
        assert_eq!(results.hits, 3);
        assert!(results.results.is_empty());

        let mut options = SearchOptions::default();
        options.narrow_queries.insert("name:daniel3".to_string());
        assert_eq!(pks(&backend.search("indexed", &options).unwrap()), vec!["3"]);
    }

    #[test]
    fn test_facets() {
        let backend = backend();
        let mut options = SearchOptions::default();
        options.facets.insert("tags".to_string());
        options.date_facets.insert(
            "pub_date".to_string(),
            DateFacet {
                start: NaiveDate::from_ymd_opt(2009, 2, 23).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                end: NaiveDate::from_ymd_opt(2009, 2, 25).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                gap_by: DateGap::Day,
                gap_amount: 1,
            },
        );
        options
            .query_facets
            .push(("views".to_string(), "[15 TO *]".to_string()));

        let facets = backend.search("*:*", &options).unwrap().facets;
        assert_eq!(
            facets.fields["tags"],
            vec![
                ("search".to_string(), 3),
                ("daniel1".to_string(), 1),
                ("daniel2".to_string(), 1),
                ("daniel3".to_string(), 1),
            ]
        );
        assert_eq!(
            facets.dates["pub_date"],
            vec![
                ("2009-02-23T00:00:00Z".to_string(), 1),
                ("2009-02-24T00:00:00Z".to_string(), 1),
            ]
        );
        assert_eq!(facets.queries["views:[15 TO *]"], 2);
    }

    #[test]
    fn test_highlight() {
        let backend = backend();
        let options = SearchOptions {
            highlight: true,
            ..SearchOptions::default()
        };
        let results = backend.search("hello", &options).unwrap();
        assert_eq!(
            results.results[0].highlighted["text"],
            vec!["Indexed!\n3 <em>hello</em> world".to_string()]
        );
    }

    #[test]
    fn test_more_like_this() {
        let backend = backend();
        backend
            .update(
                &mock_index(),
                &[document(4, "Something else entirely", "daniel4", 22, 40)],
            )
            .unwrap();

        let results = backend
            .more_like_this("core.mockmodel.1", &SearchOptions::default())
            .unwrap();
        assert_eq!(pks(&results), vec!["2", "3"]);
        assert!(
            backend
                .more_like_this("core.mockmodel.99", &SearchOptions::default())
                .unwrap_err()
                .is_backend()
        );
    }

    #[test]
    fn test_invalid_documents_and_queries() {
        let backend = MemoryBackend::new();
        let missing_id = Document::new().with_field("text", "no identity");
        assert!(backend.update(&mock_index(), &[missing_id]).is_err());
        assert!(matches!(
            backend.search("title:(foo", &SearchOptions::default()),
            Err(SiftError::Query(_))
        ));
    }

    #[test]
    fn test_contains_words_with_slop() {
        let words = tokenize("the quick brown fox");
        assert!(contains_words(&words, &tokenize("quick brown"), 0));
        assert!(!contains_words(&words, &tokenize("quick fox"), 0));
        assert!(contains_words(&words, &tokenize("quick fox"), 1));
        assert!(!contains_words(&words, &tokenize("fox quick"), 3));
    }
}
