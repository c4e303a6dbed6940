//! Dotted and denormalized attribute access.
//!
//! Search backends only store flat key names, so nested values are indexed
//! under flattened names joined with [`SEPARATOR`]: the author name of a
//! post is stored as `author0_0_0name`. This module lets callers read such
//! values back with natural paths: `author.name`, `author__name` and the
//! flattened name itself all resolve to the same value.
//!
//! Resolution of `a.b.c` against a root object tries, in order:
//!
//! 1. the direct attribute `a.b.c`,
//! 2. the flattened name `a0_0_0b0_0_0c`,
//! 3. a proxy walk: `a` yields an [`AttrHandle`] whose further lookups are
//!    resolved against the root using the accumulated flattened prefix.
//!
//! A prefix that only exists through deeper flattened children (such as `c`
//! in `y0_0_0c0_0_0x` when `y0_0_0c` has no own value) resolves to a handle
//! of kind [`HandleKind::Null`] instead of failing.
//!
//! ```
//! use sift::dotpath::{resolve, SEPARATOR};
//! use sift::object::Record;
//!
//! let record = Record::new()
//!     .with("x", 35)
//!     .with(format!("a{SEPARATOR}b"), 40);
//!
//! assert_eq!(resolve(&record, "x").unwrap(), 35);
//! assert_eq!(resolve(&record, "a.b").unwrap(), 40);
//! assert!(resolve(&record, "a.c").is_err());
//! ```

use std::fmt;

use crate::error::{Result, SiftError};
use crate::object::{Attr, Source};
use crate::value::Value;

/// Separator joining the segments of a flattened attribute name.
pub const SEPARATOR: &str = "0_0_0";

/// Separator of ORM-style relation paths.
pub const PATH_SEPARATOR: &str = "__";

/// Find the attribute name `attr_name` resolves to on `obj`.
///
/// Segments are joined greedily from the left: a segment is appended as long
/// as the joined name exists on the object. Returns `None` if not even the
/// first segment exists.
pub fn check_attr(obj: &dyn Source, attr_name: &str, separator: &str) -> Option<String> {
    if obj.has_attr(attr_name) {
        return Some(attr_name.to_string());
    }

    let mut segments = attr_name.split(separator);
    let mut attr = segments.next()?.to_string();
    for segment in segments {
        let joined = format!("{attr}{separator}{segment}");
        if obj.has_attr(&joined) {
            attr = joined;
        }
    }

    obj.has_attr(&attr).then_some(attr)
}

/// Whether some attribute of `obj` is a flattened child of `name`.
pub fn is_denorm_attr(obj: &dyn Source, name: &str) -> bool {
    let prefix = format!("{name}{SEPARATOR}");
    obj.attr_names().iter().any(|attr| attr.contains(&prefix))
}

/// Replace `.` and `__` path separators with [`SEPARATOR`].
pub fn flatten(path: &str) -> String {
    path.replace('.', SEPARATOR).replace(PATH_SEPARATOR, SEPARATOR)
}

/// Resolve a dotted path against a root object.
pub fn resolve<'a>(root: &'a dyn Source, path: &str) -> Result<AttrHandle<'a>> {
    if let Some(attr) = root.attr(path) {
        return Ok(AttrHandle::new(Some(attr), path.to_string(), root));
    }

    let flat = flatten(path);
    if let Some(attr) = root.attr(&flat) {
        return Ok(AttrHandle::new(Some(attr), flat, root));
    }

    let mut segments = path.split('.');
    let first = segments.next().unwrap_or_default();
    let mut handle = AttrHandle::root(root, first)?;
    for segment in segments {
        handle = handle.get(segment)?;
    }
    Ok(handle)
}

/// The semantic kind of the value an [`AttrHandle`] wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// A denormalized prefix without an own value.
    Null,
    /// Integer or float.
    Numeric,
    /// Text.
    Text,
    /// List value.
    Sequence,
    /// A related object.
    Object,
    /// A method not yet invoked.
    Callable,
    /// Boolean and date values.
    Opaque,
}

/// A resolved attribute plus the flattened path that led to it.
///
/// Further attribute access goes through [`AttrHandle::get`].
#[derive(Clone)]
pub struct AttrHandle<'a> {
    wrapped: Option<Attr>,
    path: String,
    root: &'a dyn Source,
}

impl<'a> AttrHandle<'a> {
    fn new(wrapped: Option<Attr>, path: String, root: &'a dyn Source) -> Self {
        let wrapped = match wrapped {
            Some(Attr::Value(Value::Null)) => None,
            other => other,
        };
        AttrHandle {
            wrapped,
            path,
            root,
        }
    }

    fn root(root: &'a dyn Source, name: &str) -> Result<Self> {
        if is_denorm_attr(root, name) {
            return Ok(AttrHandle::new(root.attr(name), name.to_string(), root));
        }

        let flat = name.replace(PATH_SEPARATOR, SEPARATOR);
        if let Some(attr) = root.attr(&flat) {
            return Ok(AttrHandle::new(Some(attr), flat, root));
        }

        Err(missing_attribute(root, name))
    }

    /// Resolve `name` below this handle.
    pub fn get(&self, name: &str) -> Result<AttrHandle<'a>> {
        let lookup = format!("{}{SEPARATOR}{name}", self.path);

        if let Some(Attr::Object(object)) = &self.wrapped {
            if let Some(attr) = object.attr(name) {
                return Ok(AttrHandle::new(Some(attr), lookup, self.root));
            }
        }

        if is_denorm_attr(self.root, &lookup) {
            return Ok(AttrHandle::new(self.root.attr(&lookup), lookup, self.root));
        }

        match self.root.attr(&lookup) {
            Some(attr) => Ok(AttrHandle::new(Some(attr), lookup, self.root)),
            None => Err(missing_attribute(self.root, &lookup)),
        }
    }

    /// Resolve a further dotted path below this handle.
    pub fn get_path(&self, path: &str) -> Result<AttrHandle<'a>> {
        path.split('.')
            .try_fold(self.clone(), |handle, segment| handle.get(segment))
    }

    /// Flattened path of this handle.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The wrapped attribute, `None` for the null sentinel.
    pub fn attr(&self) -> Option<&Attr> {
        self.wrapped.as_ref()
    }

    pub fn kind(&self) -> HandleKind {
        match &self.wrapped {
            None => HandleKind::Null,
            Some(Attr::Object(_)) => HandleKind::Object,
            Some(Attr::Method(_)) => HandleKind::Callable,
            Some(Attr::Value(value)) => match value {
                Value::Null => HandleKind::Null,
                Value::Integer(_) | Value::Float(_) => HandleKind::Numeric,
                Value::Text(_) => HandleKind::Text,
                Value::List(_) => HandleKind::Sequence,
                Value::Boolean(_) | Value::Date(_) | Value::DateTime(_) => HandleKind::Opaque,
            },
        }
    }

    /// Whether this is the null sentinel.
    pub fn is_null(&self) -> bool {
        self.kind() == HandleKind::Null
    }

    /// The wrapped plain value, if any.
    pub fn value(&self) -> Option<&Value> {
        self.wrapped.as_ref().and_then(Attr::as_value)
    }

    /// The wrapped value, with the null sentinel as [`Value::Null`].
    pub fn to_value(&self) -> Value {
        self.value().cloned().unwrap_or(Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.value().and_then(Value::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value().and_then(Value::as_text)
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        self.value().and_then(Value::as_list)
    }

    /// Length of a text or sequence value.
    pub fn len(&self) -> Option<usize> {
        match self.value()? {
            Value::Text(text) => Some(text.chars().count()),
            Value::List(items) => Some(items.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    pub fn is_truthy(&self) -> bool {
        match &self.wrapped {
            None => false,
            Some(Attr::Value(value)) => value.is_truthy(),
            Some(_) => true,
        }
    }

    /// Invoke a wrapped method and wrap its result under the same path.
    pub fn call(&self) -> Result<AttrHandle<'a>> {
        match &self.wrapped {
            Some(Attr::Method(method)) => Ok(AttrHandle::new(
                Some(method().resolve_calls()),
                self.path.clone(),
                self.root,
            )),
            _ => Err(SiftError::attribute(format!(
                "'{}' is not callable",
                self.path
            ))),
        }
    }
}

fn missing_attribute(root: &dyn Source, name: &str) -> SiftError {
    SiftError::attribute(format!("'{root:?}' object has no attribute '{name}'"))
}

impl fmt::Debug for AttrHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.wrapped {
            None => write!(f, "<Null>"),
            Some(attr) => write!(f, "{}={attr:?}", self.path),
        }
    }
}

impl fmt::Display for AttrHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.wrapped {
            None => Ok(()),
            Some(Attr::Value(value)) => write!(f, "{value}"),
            Some(Attr::Object(object)) => write!(f, "{object:?}"),
            Some(Attr::Method(_)) => write!(f, "<method {}>", self.path),
        }
    }
}

impl PartialEq<Value> for AttrHandle<'_> {
    fn eq(&self, other: &Value) -> bool {
        match self.value() {
            Some(value) => value == other,
            None => self.is_null() && other.is_null(),
        }
    }
}

impl PartialEq<&str> for AttrHandle<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl PartialEq<i64> for AttrHandle<'_> {
    fn eq(&self, other: &i64) -> bool {
        match self.value() {
            Some(Value::Integer(i)) => i == other,
            Some(Value::Float(f)) => *f == *other as f64,
            _ => false,
        }
    }
}

impl PartialEq<i32> for AttrHandle<'_> {
    fn eq(&self, other: &i32) -> bool {
        *self == i64::from(*other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Record;

    fn flat(parts: &[&str]) -> String {
        parts.join(SEPARATOR)
    }

    fn fixture() -> Record {
        Record::new()
            .with("x", 35)
            .with(flat(&["a", "b"]), 40)
            .with("y", 5)
            .with(flat(&["y", "a"]), 3)
            .with(flat(&["y", "b"]), "hello")
            .with(flat(&["y", "c", "x"]), vec![1, 2, 3])
    }

    #[test]
    fn test_direct_and_flattened() {
        let r = fixture();
        assert_eq!(resolve(&r, "x").unwrap(), 35);
        assert_eq!(resolve(&r, "a.b").unwrap(), 40);
        assert_eq!(resolve(&r, "y").unwrap(), 5);
        assert_eq!(resolve(&r, "y.a").unwrap(), 3);
        assert_eq!(resolve(&r, "y.b").unwrap(), "hello");
        assert_eq!(resolve(&r, "y__a").unwrap(), 3);
        assert_eq!(
            resolve(&r, "y__c__x").unwrap(),
            Value::from(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_proxy_handles() {
        let r = fixture();
        let y = resolve(&r, "y").unwrap();
        assert_eq!(y.kind(), HandleKind::Numeric);
        assert_eq!(y.get("b").unwrap().len(), Some(5));

        let c = y.get("c").unwrap();
        assert_eq!(c.kind(), HandleKind::Null);
        assert!(!c.is_truthy());
        assert_eq!(c.to_string(), "");
        assert_eq!(c.get("x").unwrap().as_list().map(<[Value]>::len), Some(3));

        match resolve(&r, "y.d") {
            Err(SiftError::Attribute(msg)) => assert!(msg.contains("y0_0_0d")),
            other => panic!("expected attribute error, got {other:?}"),
        }
        assert!(resolve(&r, "missing").is_err());
    }

    #[test]
    fn test_nested_objects_and_methods() {
        let tag = Record::new().with("name", "tag1").into_ref();
        let r = Record::new()
            .with_object("tag", tag)
            .with_method("hello", || Attr::value("World!"));

        let name = resolve(&r, "tag.name").unwrap();
        assert_eq!(name, "tag1");

        let hello = resolve(&r, "hello").unwrap();
        assert_eq!(hello.kind(), HandleKind::Callable);
        assert_eq!(hello.call().unwrap(), "World!");
        assert!(name.call().is_err());
    }

    #[test]
    fn test_check_attr() {
        let some = Record::new().with("shit", 3).into_ref();
        let tag_tag = Record::new().with("url", "url").into_ref();
        let c = Record::new()
            .with("some__super", 1)
            .with("some__super__duper", 2)
            .with_object("some", some)
            .with_object("tag__tag", tag_tag)
            .with(flat(&["a", "b"]), 1);

        let check = |name: &str| check_attr(&c, name, "__");
        assert_eq!(check("some__super__bla").as_deref(), Some("some__super"));
        assert_eq!(check("some__super__duper").as_deref(), Some("some__super__duper"));
        assert_eq!(check("some__super123__bla").as_deref(), Some("some"));
        assert_eq!(check("some__shit").as_deref(), Some("some"));
        assert_eq!(check("some").as_deref(), Some("some"));
        assert_eq!(check("wtf"), None);
        assert_eq!(check("wtf__shit"), None);
        assert_eq!(check("tag__tag__url").as_deref(), Some("tag__tag"));
        assert_eq!(
            check_attr(&c, &flat(&["a", "b", "c"]), SEPARATOR),
            Some(flat(&["a", "b"]))
        );
    }

    #[test]
    fn test_is_denorm_attr() {
        let r = fixture();
        assert!(is_denorm_attr(&r, "y"));
        assert!(is_denorm_attr(&r, &flat(&["y", "c"])));
        assert!(!is_denorm_attr(&r, "x"));
    }
}
