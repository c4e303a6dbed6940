//! Search results.
//!
//! A [`SearchResult`] wraps one backend hit: the model type and primary key
//! of the indexed object, its score and the stored field values, converted
//! back to their declared types. The indexed object itself is only fetched
//! from its store when [`SearchResult::object`] is first called, or in bulk
//! by a result set in load-all mode.
//!
//! Results are [`Source`]s themselves, so stored fields, including flattened
//! ones, can be read with dotted paths:
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use sift::result::SearchResult;
//! use sift::value::{ModelType, Value};
//!
//! let mut fields = BTreeMap::new();
//! fields.insert("author".to_string(), Value::from("daniel"));
//! fields.insert("tag0_0_0name".to_string(), Value::from("primary"));
//!
//! let result = SearchResult::new(ModelType::new("core", "mockmodel"), "1", 0.5, fields);
//! assert_eq!(result.get("author").unwrap(), "daniel");
//! assert_eq!(result.get("tag.name").unwrap(), "primary");
//! assert_eq!(format!("{result:?}"), "<SearchResult: core.mockmodel (pk=\"1\")>");
//! ```

use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::backend::RawHit;
use crate::config::SiftConfig;
use crate::dotpath::{self, AttrHandle};
use crate::error::Result;
use crate::index::Registry;
use crate::object::{Attr, Source, SourceRef};
use crate::value::{ModelType, Value};

const BUILTIN_ATTRS: [&str; 4] = ["pk", "score", "app_label", "model_name"];

/// One hit of a search.
pub struct SearchResult {
    model: ModelType,
    pk: String,
    score: f64,
    fields: BTreeMap<String, Value>,
    additional: BTreeSet<String>,
    highlighted: BTreeMap<String, Vec<String>>,
    registry: Option<Arc<Registry>>,
    object: OnceCell<Option<SourceRef>>,
}

impl SearchResult {
    /// A result without a registry; every field counts as additional.
    pub fn new<P: Into<String>>(
        model: ModelType,
        pk: P,
        score: f64,
        fields: BTreeMap<String, Value>,
    ) -> Self {
        let additional = fields.keys().cloned().collect();
        SearchResult {
            model,
            pk: pk.into(),
            score,
            fields,
            additional,
            highlighted: BTreeMap::new(),
            registry: None,
            object: OnceCell::new(),
        }
    }

    /// Attach the registry used to hydrate the object and classify fields.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.additional = match registry.get_index(&self.model) {
            Ok(index) => self
                .fields
                .keys()
                .filter(|name| index.get_field(name).is_none())
                .cloned()
                .collect(),
            Err(_) => self.fields.keys().cloned().collect(),
        };
        self.registry = Some(registry);
        self
    }

    pub fn with_highlighted(mut self, highlighted: BTreeMap<String, Vec<String>>) -> Self {
        self.highlighted = highlighted;
        self
    }

    /// Translate a raw hit.
    ///
    /// Values of declared fields are converted back to their field type; a
    /// value that fails conversion is kept as returned. Hits without model
    /// type or primary key are dropped.
    pub(crate) fn from_raw(
        hit: RawHit,
        registry: &Arc<Registry>,
        config: &SiftConfig,
    ) -> Option<SearchResult> {
        let RawHit {
            mut fields,
            score,
            highlighted,
        } = hit;

        let model = fields
            .remove(&config.type_field)
            .and_then(|value| value.as_text().and_then(|label| ModelType::from_str(label).ok()));
        let pk = fields
            .remove(&config.pk_field)
            .filter(|value| !value.is_null())
            .map(|value| value.to_string());
        let (Some(model), Some(pk)) = (model, pk) else {
            log::error!("Dropping a search hit without model type or primary key: {fields:?}");
            return None;
        };

        let fields = fields
            .into_iter()
            .map(|(name, value)| {
                let value = match registry.field_for(&model, &name) {
                    Some(field) => field.convert(value.clone()).unwrap_or_else(|e| {
                        log::warn!("Keeping the raw value of '{name}' on {model}.{pk}: {e}");
                        value
                    }),
                    None => value,
                };
                (name, value)
            })
            .collect();

        Some(
            SearchResult::new(model, pk, score, fields)
                .with_registry(Arc::clone(registry))
                .with_highlighted(highlighted),
        )
    }

    pub fn model(&self) -> &ModelType {
        &self.model
    }

    pub fn pk(&self) -> &str {
        &self.pk
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn app_label(&self) -> &str {
        &self.model.app_label
    }

    pub fn model_name(&self) -> &str {
        &self.model.model_name
    }

    /// The `app.model` label of the result's model type.
    pub fn content_type(&self) -> String {
        self.model.label()
    }

    /// Human readable model name, first letter capitalized.
    pub fn verbose_name(&self) -> String {
        let mut chars = self.model.model_name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// The indexed object, fetched from its store on first access.
    ///
    /// A missing registry, an unregistered model type or a failed lookup are
    /// logged and yield `None`; the outcome is remembered either way.
    pub fn object(&self) -> Option<SourceRef> {
        self.object.get_or_init(|| self.load_object()).clone()
    }

    /// Attach an already loaded object.
    pub fn set_object(&mut self, object: SourceRef) {
        self.object = OnceCell::from(Some(object));
    }

    /// Whether the object was loaded or attached already.
    pub fn is_loaded(&self) -> bool {
        self.object.get().is_some()
    }

    fn load_object(&self) -> Option<SourceRef> {
        let Some(registry) = &self.registry else {
            log::error!("Model could not be found for SearchResult '{self:?}'.");
            return None;
        };
        let store = match registry.get_store(&self.model) {
            Ok(store) => store,
            Err(e) => {
                log::error!("Model could not be found for SearchResult '{self:?}': {e}");
                return None;
            }
        };
        match store.get(&self.pk) {
            Ok(Some(object)) => Some(object),
            Ok(None) => {
                log::error!("Object could not be found in database for SearchResult '{self:?}'.");
                None
            }
            Err(e) => {
                log::error!("Failed to load the object of SearchResult '{self:?}': {e}");
                None
            }
        }
    }

    /// Resolve a dotted or flattened path against the stored fields.
    pub fn get(&self, path: &str) -> Result<AttrHandle<'_>> {
        dotpath::resolve(self, path)
    }

    /// A stored value by its exact name.
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// The stored fields declared by the model's index.
    ///
    /// Declared fields missing from the hit map to [`Value::Null`]. Empty if
    /// the model type is not registered.
    pub fn stored_fields(&self) -> BTreeMap<String, Value> {
        let Some(index) = self
            .registry
            .as_ref()
            .and_then(|registry| registry.get_index(&self.model).ok())
        else {
            return BTreeMap::new();
        };

        index
            .stored_fields()
            .into_iter()
            .map(|name| {
                let value = self.fields.get(name).cloned().unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect()
    }

    /// Fields of the hit no index declares.
    pub fn additional_fields(&self) -> BTreeMap<String, Value> {
        self.additional
            .iter()
            .filter_map(|name| self.fields.get(name).map(|value| (name.clone(), value.clone())))
            .collect()
    }

    /// Highlighted snippets per field.
    pub fn highlighted(&self) -> &BTreeMap<String, Vec<String>> {
        &self.highlighted
    }
}

impl fmt::Debug for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<SearchResult: {} (pk={:?})>", self.model, self.pk)
    }
}

impl Source for SearchResult {
    fn attr(&self, name: &str) -> Option<Attr> {
        if let Some(value) = self.fields.get(name) {
            return Some(Attr::Value(value.clone()));
        }
        match name {
            "pk" => Some(Attr::value(self.pk.as_str())),
            "score" => Some(Attr::value(self.score)),
            "app_label" => Some(Attr::value(self.model.app_label.as_str())),
            "model_name" => Some(Attr::value(self.model.model_name.as_str())),
            _ => None,
        }
    }

    fn attr_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        for builtin in BUILTIN_ATTRS {
            if !self.fields.contains_key(builtin) {
                names.push(builtin.to_string());
            }
        }
        names
    }

    fn model_type(&self) -> Option<ModelType> {
        Some(self.model.clone())
    }

    fn pk(&self) -> Option<String> {
        Some(self.pk.clone())
    }
}
