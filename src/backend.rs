//! The search backend boundary.
//!
//! A [`SearchBackend`] talks to the search engine: it stores prepared
//! documents, removes them and runs query strings. Nothing in the query
//! layer calls a backend directly; every call goes through
//! [`GuardedBackend`], the single place where backend failures are caught,
//! logged and replaced by a neutral result. Field preparation errors are not
//! backend failures and still reach the caller.

pub mod formatter;
pub mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::SiftConfig;
use crate::document::Document;
use crate::error::{Result, SiftError};
use crate::fields::SearchField;
use crate::index::SearchIndex;
use crate::object::{Source, SourceRef};
use crate::value::{ModelType, Value, get_identifier, parse_identifier};

use self::formatter::QueryFormatter;

/// Unit of the buckets of a date facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateGap {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

/// Bucketed counts of a date field between two instants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFacet {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub gap_by: DateGap,
    pub gap_amount: u32,
}

/// Request parameters accompanying a query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    /// First hit to return.
    pub start_offset: usize,
    /// One past the last hit to return; `None` returns every hit.
    pub end_offset: Option<usize>,
    /// Sort fields, `-field` for descending.
    pub sort_by: Vec<String>,
    pub highlight: bool,
    /// Fields to count distinct values of.
    pub facets: BTreeSet<String>,
    pub date_facets: BTreeMap<String, DateFacet>,
    /// Named subqueries whose matches are counted.
    pub query_facets: Vec<(String, String)>,
    /// Raw query strings every hit must also match.
    pub narrow_queries: BTreeSet<String>,
}

impl SearchOptions {
    /// Options asking only for the hit count.
    pub fn count_only() -> Self {
        SearchOptions {
            end_offset: Some(0),
            ..SearchOptions::default()
        }
    }
}

/// One hit as returned by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawHit {
    /// Stored fields, including the bookkeeping fields.
    pub fields: BTreeMap<String, Value>,
    pub score: f64,
    /// Highlighted snippets per field.
    pub highlighted: BTreeMap<String, Vec<String>>,
}

/// Facet counts of a search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetCounts {
    /// Distinct values per field with their counts, most frequent first.
    pub fields: BTreeMap<String, Vec<(String, usize)>>,
    /// Bucket start and count per date facet.
    pub dates: BTreeMap<String, Vec<(String, usize)>>,
    /// Match count per query facet.
    pub queries: BTreeMap<String, usize>,
}

impl FacetCounts {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.dates.is_empty() && self.queries.is_empty()
    }
}

/// The response to a search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResults {
    /// Total number of matching documents.
    pub hits: usize,
    /// The requested window of hits.
    pub results: Vec<RawHit>,
    pub facets: FacetCounts,
}

/// One field definition of a backend schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub field_name: String,
    pub field_type: String,
    pub indexed: bool,
    pub stored: bool,
    pub multi_valued: bool,
}

/// A search engine client.
pub trait SearchBackend: Send + Sync + fmt::Debug {
    /// Insert or replace prepared documents of one index.
    fn update(&self, index: &SearchIndex, documents: &[Document]) -> Result<()>;

    /// Delete the document with this identity.
    fn remove(&self, identity: &str) -> Result<()>;

    /// Delete every document of the listed model types, or all documents.
    fn clear(&self, models: &[ModelType]) -> Result<()>;

    /// Run a query string.
    fn search(&self, query: &str, options: &SearchOptions) -> Result<RawResults>;

    /// Find documents similar to the one with this identity.
    fn more_like_this(&self, identity: &str, options: &SearchOptions) -> Result<RawResults>;

    /// The syntax this backend expects query strings in.
    fn formatter(&self) -> &dyn QueryFormatter;

    /// Derive the schema of the given fields.
    ///
    /// Returns the name of the document field and one definition per field.
    fn build_schema(&self, fields: &[(String, SearchField)]) -> Result<(String, Vec<SchemaField>)> {
        let mut content_field_name = None;
        let mut schema = Vec::with_capacity(fields.len());

        for (name, field) in fields {
            if field.is_document() {
                content_field_name = Some(name.clone());
            }
            schema.push(SchemaField {
                field_name: name.clone(),
                field_type: field.kind().schema_type().to_string(),
                indexed: field.is_indexed(),
                stored: field.is_stored(),
                multi_valued: field.kind().is_multi_valued(),
            });
        }

        let content_field_name = content_field_name
            .ok_or_else(|| SiftError::backend("no document field among the schema fields"))?;
        Ok((content_field_name, schema))
    }
}

/// Wraps a backend so its failures degrade to neutral results.
#[derive(Debug, Clone)]
pub struct GuardedBackend {
    backend: Arc<dyn SearchBackend>,
    config: SiftConfig,
}

impl GuardedBackend {
    pub fn new(backend: Arc<dyn SearchBackend>, config: SiftConfig) -> Self {
        GuardedBackend { backend, config }
    }

    pub fn inner(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub fn config(&self) -> &SiftConfig {
        &self.config
    }

    pub fn formatter(&self) -> &dyn QueryFormatter {
        self.backend.formatter()
    }

    /// Prepare and index `objects`.
    ///
    /// Field errors are returned; a backend failure is logged and ignored.
    pub fn update(&self, index: &SearchIndex, objects: &[SourceRef]) -> Result<()> {
        let documents = objects
            .iter()
            .map(|object| index.prepare(object.as_ref(), &self.config))
            .collect::<Result<Vec<_>>>()?;

        if let Err(e) = self.backend.update(index, &documents) {
            log::error!(
                "Failed to add documents to the index for {}: {e}",
                index.model_type()
            );
        }
        Ok(())
    }

    /// Remove the document of a stored object.
    pub fn remove(&self, object: &dyn Source) -> Result<()> {
        let (model, pk) = object.model_type().zip(object.pk()).ok_or_else(|| {
            SiftError::attribute(format!("The object '{object:?}' has no model type or primary key."))
        })?;
        self.remove_identity(&get_identifier(&model, &pk))
    }

    /// Remove a document by identity string.
    ///
    /// Malformed identities are rejected with an attribute error.
    pub fn remove_identity(&self, identity: &str) -> Result<()> {
        parse_identifier(identity)?;
        if let Err(e) = self.backend.remove(identity) {
            log::error!("Failed to remove document '{identity}': {e}");
        }
        Ok(())
    }

    /// Remove every document of `models`, or everything if `models` is empty.
    pub fn clear(&self, models: &[ModelType]) {
        if let Err(e) = self.backend.clear(models) {
            let target = if models.is_empty() {
                "all models".to_string()
            } else {
                models
                    .iter()
                    .map(ModelType::label)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            log::error!("Failed to clear the index of {target}: {e}");
        }
    }

    /// Run a query; failures yield no hits.
    pub fn search(&self, query: &str, options: &SearchOptions) -> RawResults {
        if query.is_empty() {
            return RawResults::default();
        }
        self.backend.search(query, options).unwrap_or_else(|e| {
            log::error!("Failed to query the index with '{query}': {e}");
            RawResults::default()
        })
    }

    /// Find documents similar to `identity`; failures yield no hits.
    pub fn more_like_this(&self, identity: &str, options: &SearchOptions) -> RawResults {
        self.backend
            .more_like_this(identity, options)
            .unwrap_or_else(|e| {
                log::error!("Failed to fetch More Like This for '{identity}': {e}");
                RawResults::default()
            })
    }

    /// Derive the schema of `fields`; failures yield an empty schema.
    pub fn build_schema(&self, fields: &[(String, SearchField)]) -> (String, Vec<SchemaField>) {
        self.backend.build_schema(fields).unwrap_or_else(|e| {
            log::error!("Failed to build the schema: {e}");
            (self.config.content_field.clone(), Vec::new())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Record;

    #[derive(Debug)]
    struct BrokenBackend {
        formatter: formatter::LuceneFormatter,
    }

    impl SearchBackend for BrokenBackend {
        fn update(&self, _index: &SearchIndex, _documents: &[Document]) -> Result<()> {
            Err(SiftError::backend("connection refused"))
        }

        fn remove(&self, _identity: &str) -> Result<()> {
            Err(SiftError::backend("connection refused"))
        }

        fn clear(&self, _models: &[ModelType]) -> Result<()> {
            Err(SiftError::backend("connection refused"))
        }

        fn search(&self, _query: &str, _options: &SearchOptions) -> Result<RawResults> {
            Err(SiftError::backend("connection refused"))
        }

        fn more_like_this(&self, _identity: &str, _options: &SearchOptions) -> Result<RawResults> {
            Err(SiftError::backend("connection refused"))
        }

        fn formatter(&self) -> &dyn QueryFormatter {
            &self.formatter
        }
    }

    fn guarded() -> GuardedBackend {
        GuardedBackend::new(
            Arc::new(BrokenBackend {
                formatter: formatter::LuceneFormatter::default(),
            }),
            SiftConfig::default(),
        )
    }

    fn mock_index() -> SearchIndex {
        SearchIndex::new(ModelType::new("core", "mockmodel"))
            .field("text", SearchField::char().document().model_attr("author"))
            .field("pub_date", SearchField::date().model_attr("pub_date"))
    }

    #[test]
    fn test_backend_failures_are_neutralised() {
        let backend = guarded();
        let obj = Record::model(ModelType::new("core", "mockmodel"), 1)
            .with("author", "daniel1")
            .with("pub_date", "2009-02-25")
            .into_ref();

        assert!(backend.update(&mock_index(), &[obj.clone()]).is_ok());
        assert!(backend.remove(obj.as_ref()).is_ok());
        backend.clear(&[]);
        assert_eq!(backend.search("*:*", &SearchOptions::default()).hits, 0);
        assert_eq!(
            backend
                .more_like_this("core.mockmodel.1", &SearchOptions::default())
                .results
                .len(),
            0
        );
    }

    #[test]
    fn test_field_errors_still_propagate() {
        let backend = guarded();
        let obj = Record::model(ModelType::new("core", "mockmodel"), 1)
            .with("author", "daniel1")
            .with("pub_date", "not a date")
            .into_ref();

        assert!(matches!(
            backend.update(&mock_index(), &[obj]),
            Err(SiftError::FieldConversion(_))
        ));
        assert!(matches!(
            backend.remove_identity("core.mockmodel"),
            Err(SiftError::Attribute(_))
        ));
    }

    #[test]
    fn test_build_schema() {
        let fields = vec![
            ("text".to_string(), SearchField::char().document().use_template()),
            ("name".to_string(), SearchField::simple_char().stored(false)),
            ("pub_date".to_string(), SearchField::datetime()),
            ("views".to_string(), SearchField::integer().indexed(false)),
            ("sites".to_string(), SearchField::multi_value_integer()),
        ];
        let (content_field, schema) = guarded().build_schema(&fields);

        assert_eq!(content_field, "text");
        let types: Vec<(&str, &str, bool)> = schema
            .iter()
            .map(|f| (f.field_name.as_str(), f.field_type.as_str(), f.multi_valued))
            .collect();
        assert_eq!(
            types,
            vec![
                ("text", "text", false),
                ("name", "string", false),
                ("pub_date", "date", false),
                ("views", "long", false),
                ("sites", "long", true),
            ]
        );
        assert!(!schema[1].stored);
        assert!(!schema[3].indexed);
    }
}
