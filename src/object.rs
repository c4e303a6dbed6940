//! Application objects and the object store boundary.
//!
//! The host application's objects are seen through the [`Source`] trait: a
//! bag of named attributes, each either a plain [`Value`], a nested object or
//! a zero-argument method. [`Record`] is a map-backed implementation used by
//! tests and by applications without a richer object model.
//!
//! Hydrating search results needs the origin store of each model type, which
//! is reached through [`ModelStore`]. [`MemoryStore`] keeps records in memory
//! and can produce pre-filtered collections for `load_all_queryset`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::value::{ModelType, Value};

/// Shared reference to an application object.
pub type SourceRef = Arc<dyn Source + Send + Sync>;

/// Zero-argument method attached to an object.
pub type Method = Arc<dyn Fn() -> Attr + Send + Sync>;

/// A single attribute of an application object.
#[derive(Clone)]
pub enum Attr {
    /// A plain value.
    Value(Value),
    /// A related object.
    Object(SourceRef),
    /// A callable producing the attribute on demand.
    Method(Method),
}

impl Attr {
    /// Build a plain value attribute.
    pub fn value<V: Into<Value>>(value: V) -> Attr {
        Attr::Value(value.into())
    }

    /// Invoke methods until a non-callable attribute is reached.
    pub fn resolve_calls(self) -> Attr {
        let mut current = self;
        while let Attr::Method(method) = current {
            current = method();
        }
        current
    }

    /// The plain value, if this attribute is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Attr::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The related object, if this attribute is one.
    pub fn as_object(&self) -> Option<&SourceRef> {
        match self {
            Attr::Object(object) => Some(object),
            _ => None,
        }
    }
}

impl fmt::Debug for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attr::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Attr::Object(object) => f.debug_tuple("Object").field(object).finish(),
            Attr::Method(_) => f.write_str("Method(..)"),
        }
    }
}

impl PartialEq for Attr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Attr::Value(a), Attr::Value(b)) => a == b,
            (Attr::Object(a), Attr::Object(b)) => Arc::ptr_eq(a, b),
            (Attr::Method(a), Attr::Method(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Value> for Attr {
    fn from(value: Value) -> Self {
        Attr::Value(value)
    }
}

/// An application object whose attributes can be read by name.
pub trait Source: fmt::Debug {
    /// Look up a single attribute by its exact name.
    fn attr(&self, name: &str) -> Option<Attr>;

    /// Names of all attributes the object carries.
    fn attr_names(&self) -> Vec<String>;

    /// Whether the object has an attribute with this exact name.
    fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// The model type of the object, if it is a stored model instance.
    fn model_type(&self) -> Option<ModelType> {
        None
    }

    /// The primary key of the object, if it has one.
    fn pk(&self) -> Option<String> {
        None
    }
}

/// A map-backed object.
#[derive(Clone, Default)]
pub struct Record {
    model: Option<ModelType>,
    pk: Option<String>,
    attrs: BTreeMap<String, Attr>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Record::default()
    }

    /// Create a record for a stored model instance.
    pub fn model<P: ToString>(model: ModelType, pk: P) -> Self {
        Record {
            model: Some(model),
            pk: Some(pk.to_string()),
            attrs: BTreeMap::new(),
        }
        .with("pk", Value::Text(pk.to_string()))
    }

    /// Add a plain value attribute.
    pub fn with<S: Into<String>, V: Into<Value>>(mut self, name: S, value: V) -> Self {
        self.attrs.insert(name.into(), Attr::Value(value.into()));
        self
    }

    /// Add a related object attribute.
    pub fn with_object<S: Into<String>>(mut self, name: S, object: SourceRef) -> Self {
        self.attrs.insert(name.into(), Attr::Object(object));
        self
    }

    /// Add a method attribute.
    pub fn with_method<S, F>(mut self, name: S, method: F) -> Self
    where
        S: Into<String>,
        F: Fn() -> Attr + Send + Sync + 'static,
    {
        self.attrs.insert(name.into(), Attr::Method(Arc::new(method)));
        self
    }

    /// Replace or insert an attribute in place.
    pub fn set<S: Into<String>>(&mut self, name: S, attr: Attr) {
        self.attrs.insert(name.into(), attr);
    }

    /// Wrap the record into a shared object reference.
    pub fn into_ref(self) -> SourceRef {
        Arc::new(self)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.model, &self.pk) {
            (Some(model), Some(pk)) => write!(f, "<{model}: pk={pk}>"),
            _ => f
                .debug_struct("Record")
                .field("attrs", &self.attrs.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}

impl Source for Record {
    fn attr(&self, name: &str) -> Option<Attr> {
        self.attrs.get(name).cloned()
    }

    fn attr_names(&self) -> Vec<String> {
        self.attrs.keys().cloned().collect()
    }

    fn model_type(&self) -> Option<ModelType> {
        self.model.clone()
    }

    fn pk(&self) -> Option<String> {
        self.pk.clone()
    }
}

/// Access to the objects of one model type in the origin store.
pub trait ModelStore: Send + Sync + fmt::Debug {
    /// Point lookup by primary key.
    fn get(&self, pk: &str) -> Result<Option<SourceRef>>;

    /// Bulk lookup by primary keys; missing keys are simply absent.
    fn in_bulk(&self, pks: &[String]) -> Result<HashMap<String, SourceRef>> {
        let mut found = HashMap::new();
        for pk in pks {
            if let Some(object) = self.get(pk)? {
                found.insert(pk.clone(), object);
            }
        }
        Ok(found)
    }
}

/// An in-memory object store keyed by primary key.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    objects: Vec<(String, SourceRef)>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Build a store from objects that know their own primary key.
    pub fn from_objects<I: IntoIterator<Item = SourceRef>>(objects: I) -> Self {
        let mut store = MemoryStore::new();
        for object in objects {
            if let Some(pk) = object.pk() {
                store.insert(pk, object);
            }
        }
        store
    }

    /// Insert or replace an object.
    pub fn insert<P: Into<String>>(&mut self, pk: P, object: SourceRef) {
        let pk = pk.into();
        match self.objects.iter_mut().find(|(key, _)| *key == pk) {
            Some(slot) => slot.1 = object,
            None => self.objects.push((pk, object)),
        }
    }

    /// Remove an object.
    pub fn remove(&mut self, pk: &str) -> Option<SourceRef> {
        let position = self.objects.iter().position(|(key, _)| key == pk)?;
        Some(self.objects.remove(position).1)
    }

    /// A new store holding only the objects accepted by `predicate`.
    pub fn filter<F>(&self, predicate: F) -> MemoryStore
    where
        F: Fn(&dyn Source) -> bool,
    {
        MemoryStore {
            objects: self
                .objects
                .iter()
                .filter(|(_, object)| predicate(object.as_ref()))
                .cloned()
                .collect(),
        }
    }

    /// All objects in insertion order.
    pub fn all(&self) -> Vec<SourceRef> {
        self.objects.iter().map(|(_, object)| object.clone()).collect()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ModelStore for MemoryStore {
    fn get(&self, pk: &str) -> Result<Option<SourceRef>> {
        Ok(self
            .objects
            .iter()
            .find(|(key, _)| key == pk)
            .map(|(_, object)| object.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_attrs() {
        let tag = Record::new().with("name", "tag1").into_ref();
        let record = Record::model(ModelType::new("core", "mockmodel"), 1)
            .with("author", "daniel1")
            .with_object("tag", tag)
            .with_method("hello", || Attr::value("World!"));

        assert!(record.has_attr("author"));
        assert!(!record.has_attr("missing"));
        assert_eq!(record.pk(), Some("1".to_string()));
        assert_eq!(
            record.attr("hello").map(Attr::resolve_calls),
            Some(Attr::Value(Value::from("World!")))
        );
        assert_eq!(
            record.attr_names(),
            vec!["author", "hello", "pk", "tag"]
        );
    }

    #[test]
    fn test_memory_store_filter_and_bulk() {
        let model = ModelType::new("core", "mockmodel");
        let store = MemoryStore::from_objects(
            (1..=5).map(|i| Record::model(model.clone(), i).with("id", i as i64).into_ref()),
        );
        assert_eq!(store.len(), 5);

        let filtered = store.filter(|object| {
            object
                .attr("id")
                .and_then(|attr| attr.as_value().and_then(Value::as_i64))
                .is_some_and(|id| id > 3)
        });
        assert_eq!(filtered.len(), 2);

        let bulk = store
            .in_bulk(&["1".to_string(), "4".to_string(), "9".to_string()])
            .unwrap();
        assert_eq!(bulk.len(), 2);
        assert!(bulk.contains_key("4"));
        assert!(filtered.get("1").unwrap().is_none());
    }
}
