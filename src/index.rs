//! Search index definitions and the model registry.
//!
//! A [`SearchIndex`] lists the fields indexed for one model type. Indexes are
//! registered once at startup in a [`Registry`] together with the
//! [`ModelStore`] their objects are hydrated from; the registry is then shared
//! read-only behind an `Arc` by connections, result sets and results.
//!
//! ```
//! use std::sync::Arc;
//!
//! use sift::fields::SearchField;
//! use sift::index::{Registry, SearchIndex};
//! use sift::object::MemoryStore;
//! use sift::value::ModelType;
//!
//! let model = ModelType::new("core", "mockmodel");
//! let index = SearchIndex::new(model.clone())
//!     .field("text", SearchField::char().document().model_attr("author"))
//!     .field("pub_date", SearchField::datetime().model_attr("pub_date"));
//!
//! let registry = Registry::new();
//! registry.register(index, Arc::new(MemoryStore::new())).unwrap();
//! assert_eq!(registry.indexed_models(), vec![model]);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::SiftConfig;
use crate::document::Document;
use crate::error::{Result, SiftError};
use crate::fields::{SearchField, TemplateRenderer};
use crate::object::{ModelStore, Source};
use crate::value::{ModelType, Value, get_identifier};

/// Custom preparation of a single field.
pub type PrepareFn = Arc<dyn Fn(&dyn Source) -> Result<Value> + Send + Sync>;

/// The indexed fields of one model type.
#[derive(Clone)]
pub struct SearchIndex {
    model: ModelType,
    fields: Vec<(String, SearchField)>,
    overrides: HashMap<String, PrepareFn>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
}

impl SearchIndex {
    pub fn new(model: ModelType) -> Self {
        SearchIndex {
            model,
            fields: Vec::new(),
            overrides: HashMap::new(),
            renderer: None,
        }
    }

    /// Add a named field. Fields are bound to their names on registration.
    pub fn field<S: Into<String>>(mut self, name: S, field: SearchField) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    /// Replace the preparation of one field with custom code.
    pub fn prepare_with<S, F>(mut self, name: S, prepare: F) -> Self
    where
        S: Into<String>,
        F: Fn(&dyn Source) -> Result<Value> + Send + Sync + 'static,
    {
        self.overrides.insert(name.into(), Arc::new(prepare));
        self
    }

    /// Set the renderer used by template fields.
    pub fn renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn model_type(&self) -> &ModelType {
        &self.model
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &SearchField)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn get_field(&self, name: &str) -> Option<&SearchField> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, field)| field)
    }

    /// Name of the document field.
    pub fn document_field(&self) -> Result<&str> {
        self.fields
            .iter()
            .find(|(_, field)| field.is_document())
            .map(|(name, _)| name.as_str())
            .ok_or_else(|| {
                SiftError::field(format!("The index for '{}' has no document field.", self.model))
            })
    }

    /// Names of the stored fields.
    pub fn stored_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, field)| field.is_stored())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Check that the index declares exactly one document field.
    pub fn validate(&self) -> Result<()> {
        let documents = self
            .fields
            .iter()
            .filter(|(_, field)| field.is_document())
            .count();
        match documents {
            1 => Ok(()),
            0 => Err(SiftError::field(format!(
                "The index for '{}' has no document field.",
                self.model
            ))),
            n => Err(SiftError::field(format!(
                "The index for '{}' declares {n} document fields, expected one.",
                self.model
            ))),
        }
    }

    fn bind_fields(&mut self) -> Result<()> {
        for (name, field) in &mut self.fields {
            field.bind(name.as_str())?;
        }
        Ok(())
    }

    /// Prepare one field of `obj`, honoring custom preparation.
    pub fn prepare_field(&self, name: &str, obj: &dyn Source) -> Result<Value> {
        if let Some(prepare) = self.overrides.get(name) {
            return prepare(obj);
        }
        let field = self
            .get_field(name)
            .ok_or_else(|| SiftError::field(format!("The index for '{}' has no field '{name}'.", self.model)))?;
        field.prepare(obj, self.renderer.as_deref())
    }

    /// Build the document indexed for `obj`.
    pub fn prepare(&self, obj: &dyn Source, config: &SiftConfig) -> Result<Document> {
        let pk = obj.pk().ok_or_else(|| {
            SiftError::field(format!("The object '{obj:?}' has no primary key."))
        })?;

        let mut document = Document::new();
        document.add_field(
            config.id_field.as_str(),
            Value::Text(get_identifier(&self.model, &pk)),
        );
        document.add_field(config.type_field.as_str(), Value::Text(self.model.label()));
        document.add_field(config.pk_field.as_str(), Value::Text(pk));

        for (name, _) in &self.fields {
            document.add_field(name.as_str(), self.prepare_field(name, obj)?);
        }
        Ok(document)
    }
}

impl fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchIndex")
            .field("model", &self.model)
            .field("fields", &self.fields)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct RegistryEntry {
    index: Arc<SearchIndex>,
    store: Arc<dyn ModelStore>,
}

/// Maps model types to their index and object store.
///
/// Constructed at startup; each model type is registered exactly once.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<Vec<RegistryEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register the index of a model type and its object store.
    pub fn register(&self, mut index: SearchIndex, store: Arc<dyn ModelStore>) -> Result<()> {
        index.validate()?;
        index.bind_fields()?;

        let mut entries = self.entries.write();
        if entries
            .iter()
            .any(|entry| entry.index.model_type() == index.model_type())
        {
            return Err(SiftError::AlreadyRegistered(format!(
                "The model '{}' is already registered.",
                index.model_type()
            )));
        }

        log::debug!("registered index for {}", index.model_type());
        entries.push(RegistryEntry {
            index: Arc::new(index),
            store,
        });
        Ok(())
    }

    pub fn is_registered(&self, model: &ModelType) -> bool {
        self.entries
            .read()
            .iter()
            .any(|entry| entry.index.model_type() == model)
    }

    pub fn get_index(&self, model: &ModelType) -> Result<Arc<SearchIndex>> {
        self.entry(model).map(|entry| entry.index)
    }

    pub fn get_store(&self, model: &ModelType) -> Result<Arc<dyn ModelStore>> {
        self.entry(model).map(|entry| entry.store)
    }

    fn entry(&self, model: &ModelType) -> Result<RegistryEntry> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.index.model_type() == model)
            .cloned()
            .ok_or_else(|| {
                SiftError::not_registered(format!("The model '{model}' is not registered."))
            })
    }

    /// Registered model types in registration order.
    pub fn indexed_models(&self) -> Vec<ModelType> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.index.model_type().clone())
            .collect()
    }

    /// Every field of every index, first declaration winning per name.
    pub fn all_searchfields(&self) -> Vec<(String, SearchField)> {
        let mut fields: Vec<(String, SearchField)> = Vec::new();
        for entry in self.entries.read().iter() {
            for (name, field) in entry.index.fields() {
                if !fields.iter().any(|(seen, _)| seen == name) {
                    fields.push((name.to_string(), field.clone()));
                }
            }
        }
        fields
    }

    /// The field descriptor `name` of `model`, if both exist.
    pub fn field_for(&self, model: &ModelType, name: &str) -> Option<SearchField> {
        self.get_index(model)
            .ok()
            .and_then(|index| index.get_field(name).cloned())
    }
}
