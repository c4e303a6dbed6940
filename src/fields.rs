//! Field descriptors.
//!
//! A [`SearchField`] describes how one indexed field is produced from an
//! application object and how values read back from the backend are coerced
//! into its semantic type. Value production follows a fixed priority:
//!
//! 1. a rendered template when `use_template` is set,
//! 2. the `model_attr` path walked across the object graph,
//! 3. the configured default, or null.
//!
//! ```
//! use sift::fields::SearchField;
//! use sift::object::Record;
//! use sift::value::Value;
//!
//! let field = SearchField::integer().model_attr("stats__views");
//! let stats = Record::new().with("views", "42").into_ref();
//! let post = Record::new().with_object("stats", stats);
//!
//! assert_eq!(field.prepare(&post, None).unwrap(), Value::Integer(42));
//! ```

use std::fmt;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dotpath::{PATH_SEPARATOR, check_attr};
use crate::error::{Result, SiftError};
use crate::object::{Attr, Source, SourceRef};
use crate::value::Value;

lazy_static! {
    static ref DATETIME_REGEX: Regex = Regex::new(
        r"^(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})(?:(?:T|\s+)(?P<hour>\d{2}):(?P<minute>\d{2}):(?P<second>\d{2}).*)?$"
    )
    .expect("datetime pattern is valid");
}

/// Renders named templates with an object in context.
pub trait TemplateRenderer: Send + Sync + fmt::Debug {
    /// Render `template_name` with `object` available to the template.
    fn render(&self, template_name: &str, object: &dyn Source) -> Result<String>;
}

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Analyzed text.
    Char,
    /// Unanalyzed string.
    SimpleChar,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    /// List of values.
    MultiValue,
    /// List of integers.
    MultiValueInteger,
    /// Arbitrary value serialized to base64 text.
    Opaque,
}

impl FieldKind {
    /// Backend schema type of the kind.
    pub fn schema_type(self) -> &'static str {
        match self {
            FieldKind::Char | FieldKind::MultiValue => "text",
            FieldKind::SimpleChar | FieldKind::Opaque => "string",
            FieldKind::Integer | FieldKind::MultiValueInteger => "long",
            FieldKind::Float => "double",
            FieldKind::Boolean => "boolean",
            FieldKind::Date | FieldKind::DateTime => "date",
        }
    }

    /// Whether the kind holds several values.
    pub fn is_multi_valued(self) -> bool {
        matches!(self, FieldKind::MultiValue | FieldKind::MultiValueInteger)
    }
}

/// Default of a field: a fixed value or a producer called on each use.
#[derive(Clone)]
pub enum FieldDefault {
    Value(Value),
    Producer(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldDefault {
    fn get(&self) -> Value {
        match self {
            FieldDefault::Value(value) => value.clone(),
            FieldDefault::Producer(producer) => producer(),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(value) => f.debug_tuple("Value").field(value).finish(),
            FieldDefault::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Describes one field of a search index.
#[derive(Debug, Clone)]
pub struct SearchField {
    kind: FieldKind,
    model_attr: Option<String>,
    use_template: bool,
    template_name: Option<String>,
    document: bool,
    indexed: bool,
    stored: bool,
    default: Option<FieldDefault>,
    null: bool,
    instance_name: Option<String>,
}

impl SearchField {
    /// Create a field of the given kind, indexed and stored.
    pub fn new(kind: FieldKind) -> Self {
        SearchField {
            kind,
            model_attr: None,
            use_template: false,
            template_name: None,
            document: false,
            indexed: true,
            stored: true,
            default: None,
            null: false,
            instance_name: None,
        }
    }

    pub fn char() -> Self {
        Self::new(FieldKind::Char)
    }

    pub fn simple_char() -> Self {
        Self::new(FieldKind::SimpleChar)
    }

    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    pub fn float() -> Self {
        Self::new(FieldKind::Float)
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    pub fn date() -> Self {
        Self::new(FieldKind::Date)
    }

    pub fn datetime() -> Self {
        Self::new(FieldKind::DateTime)
    }

    pub fn multi_value() -> Self {
        Self::new(FieldKind::MultiValue)
    }

    pub fn multi_value_integer() -> Self {
        Self::new(FieldKind::MultiValueInteger)
    }

    pub fn opaque() -> Self {
        Self::new(FieldKind::Opaque)
    }

    /// Read the value from this `__`-separated attribute path.
    pub fn model_attr<S: Into<String>>(mut self, model_attr: S) -> Self {
        self.model_attr = Some(model_attr.into());
        self
    }

    /// Produce the value by rendering the conventional template.
    pub fn use_template(mut self) -> Self {
        self.use_template = true;
        self
    }

    /// Produce the value by rendering an explicit template.
    pub fn template_name<S: Into<String>>(mut self, template_name: S) -> Self {
        self.use_template = true;
        self.template_name = Some(template_name.into());
        self
    }

    /// Mark the field as the document field of its index.
    pub fn document(mut self) -> Self {
        self.document = true;
        self
    }

    pub fn indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    pub fn stored(mut self, stored: bool) -> Self {
        self.stored = stored;
        self
    }

    /// Use a fixed default value.
    pub fn default<V: Into<Value>>(mut self, value: V) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Use a producer called every time the default is needed.
    pub fn default_with<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(FieldDefault::Producer(Arc::new(producer)));
        self
    }

    /// Allow the field to be null.
    pub fn null(mut self, null: bool) -> Self {
        self.null = null;
        self
    }

    /// Bind the field to its name in the owning index.
    ///
    /// A field is bound once; rebinding to another name is an error.
    pub fn bind<S: Into<String>>(&mut self, instance_name: S) -> Result<()> {
        let instance_name = instance_name.into();
        match &self.instance_name {
            Some(bound) if *bound != instance_name => Err(SiftError::AlreadyRegistered(format!(
                "field '{bound}' cannot be rebound as '{instance_name}'"
            ))),
            _ => {
                self.instance_name = Some(instance_name);
                Ok(())
            }
        }
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn instance_name(&self) -> Option<&str> {
        self.instance_name.as_deref()
    }

    pub fn model_attr_path(&self) -> Option<&str> {
        self.model_attr.as_deref()
    }

    pub fn uses_template(&self) -> bool {
        self.use_template
    }

    pub fn is_document(&self) -> bool {
        self.document
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn is_stored(&self) -> bool {
        self.stored
    }

    pub fn allows_null(&self) -> bool {
        self.null
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// The default value, invoking a producer if one is configured.
    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(FieldDefault::get)
    }

    /// Produce the indexable value of this field for `obj`.
    pub fn prepare(
        &self,
        obj: &dyn Source,
        renderer: Option<&dyn TemplateRenderer>,
    ) -> Result<Value> {
        let raw = self.prepare_raw(obj, renderer)?;
        match self.kind {
            FieldKind::Opaque => encode_opaque(&raw),
            _ => self.convert(raw),
        }
    }

    /// Produce the unconverted value of this field for `obj`.
    pub fn prepare_raw(
        &self,
        obj: &dyn Source,
        renderer: Option<&dyn TemplateRenderer>,
    ) -> Result<Value> {
        if self.use_template {
            return self.prepare_template(obj, renderer);
        }
        if let Some(model_attr) = &self.model_attr {
            return self.walk(obj, model_attr);
        }
        Ok(self.default_value().unwrap_or(Value::Null))
    }

    /// Render the template of this field with `obj` in context.
    pub fn prepare_template(
        &self,
        obj: &dyn Source,
        renderer: Option<&dyn TemplateRenderer>,
    ) -> Result<Value> {
        let template_name = match (&self.template_name, &self.instance_name) {
            (Some(template_name), _) => template_name.clone(),
            (None, Some(instance_name)) => {
                let model = obj.model_type().ok_or_else(|| {
                    SiftError::field(format!(
                        "The object '{obj:?}' has no model type to derive a template name from."
                    ))
                })?;
                format!(
                    "search/indexes/{}/{}_{}.txt",
                    model.app_label, model.model_name, instance_name
                )
            }
            (None, None) => {
                return Err(SiftError::field(
                    "This field requires either its instance_name variable to be populated or an explicit template_name in order to load the correct template.",
                ));
            }
        };

        let renderer = renderer.ok_or_else(|| {
            SiftError::field(format!(
                "No template renderer available to render '{template_name}'."
            ))
        })?;
        Ok(Value::Text(renderer.render(&template_name, obj)?))
    }

    fn walk(&self, obj: &dyn Source, model_attr: &str) -> Result<Value> {
        let mut owned: Option<SourceRef> = None;
        let mut remaining = model_attr.to_string();

        loop {
            let current: &dyn Source = match &owned {
                Some(object) => object.as_ref(),
                None => obj,
            };

            let attr = check_attr(current, &remaining, PATH_SEPARATOR)
                .and_then(|name| current.attr(&name).map(|attr| (name, attr)));
            let (name, attr) = match attr {
                Some(found) => found,
                None => return Err(self.missing_attr(current)),
            };

            remaining = remaining
                .strip_prefix(name.as_str())
                .map(|rest| rest.strip_prefix(PATH_SEPARATOR).unwrap_or(rest))
                .unwrap_or_default()
                .to_string();

            match attr.resolve_calls() {
                Attr::Value(Value::Null) => return self.null_fallback(current),
                Attr::Value(value) if remaining.is_empty() => return Ok(value),
                Attr::Value(_) => return Err(self.missing_attr(current)),
                Attr::Object(object) if remaining.is_empty() => {
                    return Ok(Value::Text(format!("{object:?}")));
                }
                Attr::Object(object) => owned = Some(object),
                Attr::Method(_) => return Err(self.missing_attr(current)),
            }
        }
    }

    fn null_fallback(&self, current: &dyn Source) -> Result<Value> {
        if let Some(default) = self.default_value() {
            return Ok(default);
        }
        if self.null {
            return Ok(Value::Null);
        }
        Err(SiftError::field(format!(
            "The model '{current:?}' has an empty model_attr '{}' and doesn't allow a default or null value.",
            self.model_attr.as_deref().unwrap_or_default()
        )))
    }

    fn missing_attr(&self, current: &dyn Source) -> SiftError {
        SiftError::field(format!(
            "The model '{current:?}' does not have a model_attr '{}'.",
            self.model_attr.as_deref().unwrap_or_default()
        ))
    }

    /// Coerce a value into the semantic type of this field.
    ///
    /// Conversion is idempotent; null always stays null.
    pub fn convert(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match self.kind {
            FieldKind::Char | FieldKind::SimpleChar => Ok(match value {
                Value::Text(text) => Value::Text(text),
                other => Value::Text(other.to_string()),
            }),
            FieldKind::Integer => self.to_integer(value),
            FieldKind::Float => match value {
                Value::Float(f) => Ok(Value::Float(f)),
                Value::Integer(i) => Ok(Value::Float(i as f64)),
                Value::Boolean(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
                Value::Text(text) => text
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| self.conversion_error("float", &text)),
                other => Err(self.conversion_error("float", &other.to_string())),
            },
            FieldKind::Boolean => Ok(Value::Boolean(match &value {
                Value::Text(text) if text.eq_ignore_ascii_case("false") => false,
                Value::Text(text) if text.eq_ignore_ascii_case("true") => true,
                other => other.is_truthy(),
            })),
            FieldKind::Date => match value {
                Value::Date(date) => Ok(Value::Date(date)),
                Value::DateTime(datetime) => Ok(Value::Date(datetime.date())),
                Value::Text(text) => self.parse_datetime(&text).map(|dt| Value::Date(dt.date())),
                other => Err(self.conversion_error("date", &other.to_string())),
            },
            FieldKind::DateTime => match value {
                Value::DateTime(datetime) => Ok(Value::DateTime(datetime)),
                Value::Date(date) => Ok(value_or_midnight(date)),
                Value::Text(text) => self.parse_datetime(&text).map(Value::DateTime),
                other => Err(self.conversion_error("datetime", &other.to_string())),
            },
            FieldKind::MultiValue => match value {
                Value::List(items) => Ok(Value::List(items)),
                Value::Text(text) => Ok(Value::List(
                    text.chars().map(|c| Value::Text(c.to_string())).collect(),
                )),
                other => Err(self.conversion_error("list", &other.to_string())),
            },
            FieldKind::MultiValueInteger => match value {
                Value::List(items) => items
                    .into_iter()
                    .map(|item| self.to_integer(item))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List),
                other => Err(self.conversion_error("list", &other.to_string())),
            },
            FieldKind::Opaque => match value {
                Value::Text(text) if text.starts_with(OPAQUE_PREFIX) => {
                    decode_opaque(&text).map_err(|e| self.conversion_error("opaque", &e.to_string()))
                }
                other => Ok(other),
            },
        }
    }

    fn to_integer(&self, value: Value) -> Result<Value> {
        match value {
            Value::Integer(i) => Ok(Value::Integer(i)),
            Value::Float(f) => Ok(Value::Integer(f.trunc() as i64)),
            Value::Boolean(b) => Ok(Value::Integer(i64::from(b))),
            Value::Text(text) => text
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| self.conversion_error("integer", &text)),
            other => Err(self.conversion_error("integer", &other.to_string())),
        }
    }

    fn parse_datetime(&self, text: &str) -> Result<NaiveDateTime> {
        let invalid = || self.conversion_error("date", text);
        let caps = DATETIME_REGEX.captures(text).ok_or_else(invalid)?;
        let number = |name: &str| -> u32 {
            caps.name(name)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };

        let year = caps
            .name("year")
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .ok_or_else(invalid)?;
        NaiveDate::from_ymd_opt(year, number("month"), number("day"))
            .and_then(|date| date.and_hms_opt(number("hour"), number("minute"), number("second")))
            .ok_or_else(invalid)
    }

    fn conversion_error(&self, target: &str, value: &str) -> SiftError {
        SiftError::conversion(format!(
            "Value provided to '{}' field doesn't appear to be a valid {target}: '{value}'",
            self.instance_name.as_deref().unwrap_or("<unbound>")
        ))
    }
}

fn value_or_midnight(date: NaiveDate) -> Value {
    date.and_hms_opt(0, 0, 0)
        .map_or(Value::Date(date), Value::DateTime)
}

/// Marks encoded opaque payloads; never part of the base64 alphabet.
pub const OPAQUE_PREFIX: &str = "opaque:";

/// Serialize a value into prefixed base64 text for opaque fields.
pub fn encode_opaque(value: &Value) -> Result<Value> {
    let bytes = bincode::serialize(value).map_err(|e| SiftError::serialization(e.to_string()))?;
    Ok(Value::Text(format!("{OPAQUE_PREFIX}{}", STANDARD.encode(bytes))))
}

/// Reverse [`encode_opaque`].
pub fn decode_opaque(text: &str) -> Result<Value> {
    let encoded = text.strip_prefix(OPAQUE_PREFIX).ok_or_else(|| {
        SiftError::serialization(format!("'{text}' is not an encoded opaque payload"))
    })?;
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| SiftError::serialization(e.to_string()))?;
    bincode::deserialize(&bytes).map_err(|e| SiftError::serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::object::Record;
    use crate::value::ModelType;

    fn mock_model() -> Record {
        let tag = Record::model(ModelType::new("core", "mocktag"), 1)
            .with("name", "primary")
            .into_ref();
        Record::model(ModelType::new("core", "mockmodel"), 1)
            .with("author", "daniel1")
            .with(
                "pub_date",
                NaiveDate::from_ymd_opt(2009, 2, 25)
                    .and_then(|d| d.and_hms_opt(1, 2, 3))
                    .unwrap(),
            )
            .with_object("tag", tag)
            .with_method("hello", || Attr::value("World!"))
            .with_method("hello__func", || {
                Attr::Object(Record::new().with("world", "Hello World!").into_ref())
            })
    }

    #[test]
    fn test_char_field_paths() {
        let mock = mock_model();
        let prepare = |path: &str| SearchField::char().model_attr(path).prepare(&mock, None);

        assert_eq!(prepare("author").unwrap(), Value::from("daniel1"));
        assert_eq!(prepare("tag__name").unwrap(), Value::from("primary"));
        assert_eq!(prepare("hello").unwrap(), Value::from("World!"));
        assert_eq!(prepare("hello__func__world").unwrap(), Value::from("Hello World!"));
        assert_eq!(prepare("pk").unwrap(), Value::from("1"));

        match prepare("foo") {
            Err(SiftError::FieldResolution(msg)) => assert!(msg.contains("'foo'")),
            other => panic!("expected resolution error, got {other:?}"),
        }
    }

    #[test]
    fn test_null_policy() {
        let mut mock = mock_model();
        mock.set("tag", Attr::Value(Value::Null));

        let field = SearchField::char().model_attr("tag__name");
        assert!(matches!(
            field.prepare(&mock, None),
            Err(SiftError::FieldResolution(_))
        ));

        let field = SearchField::char().model_attr("tag__name").default("untagged");
        assert_eq!(field.prepare(&mock, None).unwrap(), Value::from("untagged"));

        let field = SearchField::char().model_attr("tag__name").null(true);
        assert_eq!(field.prepare(&mock, None).unwrap(), Value::Null);

        let field = SearchField::integer().default_with(|| Value::from(7));
        assert_eq!(field.prepare(&mock, None).unwrap(), Value::from(7));
        assert_eq!(SearchField::char().prepare(&mock, None).unwrap(), Value::Null);
    }

    #[test]
    fn test_conversions() {
        let date = NaiveDate::from_ymd_opt(2009, 2, 25).unwrap();
        let datetime = date.and_hms_opt(1, 2, 3).unwrap();

        assert_eq!(
            SearchField::integer().convert(Value::from("12")).unwrap(),
            Value::from(12)
        );
        assert_eq!(
            SearchField::float().convert(Value::from("3.5")).unwrap(),
            Value::from(3.5)
        );
        assert_eq!(
            SearchField::boolean().convert(Value::from("false")).unwrap(),
            Value::from(false)
        );
        assert_eq!(
            SearchField::date().convert(Value::from("2009-02-25")).unwrap(),
            Value::from(date)
        );
        assert_eq!(
            SearchField::datetime()
                .convert(Value::from("2009-02-25T01:02:03Z"))
                .unwrap(),
            Value::from(datetime)
        );
        assert_eq!(
            SearchField::datetime()
                .convert(Value::from("2009-02-25 01:02:03"))
                .unwrap(),
            Value::from(datetime)
        );
        assert_eq!(
            SearchField::multi_value_integer()
                .convert(Value::from(vec!["1", "2"]))
                .unwrap(),
            Value::from(vec![1, 2])
        );

        for bad in ["25-02-2009", "2009-13-01", "yesterday"] {
            assert!(matches!(
                SearchField::date().convert(Value::from(bad)),
                Err(SiftError::FieldConversion(_))
            ));
        }
        assert!(SearchField::integer().convert(Value::from("abc")).is_err());
        assert!(SearchField::multi_value().convert(Value::from(3)).is_err());
        assert_eq!(
            SearchField::multi_value().convert(Value::from("ab")).unwrap(),
            Value::from(vec!["a", "b"])
        );
    }

    #[test]
    fn test_convert_is_idempotent() {
        let samples: Vec<(SearchField, Value)> = vec![
            (SearchField::char(), Value::from(42)),
            (SearchField::simple_char(), Value::from("plain")),
            (SearchField::integer(), Value::from("17")),
            (SearchField::float(), Value::from(3)),
            (SearchField::boolean(), Value::from("true")),
            (SearchField::date(), Value::from("2009-02-25T10:00:00")),
            (SearchField::datetime(), Value::from("2009-02-25")),
            (SearchField::multi_value(), Value::from(vec!["a", "b"])),
            (SearchField::multi_value_integer(), Value::from(vec![1.5, 2.0])),
            (SearchField::opaque(), encode_opaque(&Value::from(vec![1, 2])).unwrap()),
            (SearchField::opaque(), encode_opaque(&Value::from("hello")).unwrap()),
            (SearchField::opaque(), Value::from("hello")),
        ];

        for (field, value) in samples {
            let once = field.convert(value).unwrap();
            let twice = field.convert(once.clone()).unwrap();
            assert_eq!(once, twice, "{:?} conversion is not idempotent", field.kind());
        }
    }

    #[test]
    fn test_opaque_round_trip() {
        let payload = Value::from(vec![Value::from("a"), Value::from(1), Value::Null]);
        let record = Record::new().with("payload", payload.clone());

        let field = SearchField::opaque().model_attr("payload");
        let prepared = field.prepare(&record, None).unwrap();
        assert!(prepared.as_text().is_some());
        assert_eq!(field.convert(prepared).unwrap(), payload);

        let text = field.convert(encode_opaque(&Value::from("hello")).unwrap()).unwrap();
        assert_eq!(text, Value::from("hello"));
        assert_eq!(field.convert(text).unwrap(), Value::from("hello"));

        assert!(matches!(
            field.convert(Value::from("opaque:not base64!")),
            Err(SiftError::FieldConversion(_))
        ));
        assert!(decode_opaque("bm90IHByZWZpeGVk").is_err());
    }

    #[derive(Debug, Default)]
    struct RecordingRenderer {
        rendered: Mutex<Vec<String>>,
    }

    impl TemplateRenderer for RecordingRenderer {
        fn render(&self, template_name: &str, object: &dyn Source) -> Result<String> {
            self.rendered.lock().unwrap().push(template_name.to_string());
            let author = object
                .attr("author")
                .and_then(|attr| attr.as_value().cloned())
                .unwrap_or(Value::Null);
            Ok(format!("Indexed!\n{author}"))
        }
    }

    #[test]
    fn test_template_fields() {
        let mock = mock_model();
        let renderer = RecordingRenderer::default();

        let unbound = SearchField::char().document().use_template();
        assert!(unbound.prepare(&mock, Some(&renderer)).is_err());

        let mut field = SearchField::char().document().use_template();
        field.bind("text").unwrap();
        assert!(field.bind("content").is_err());
        assert_eq!(
            field.prepare(&mock, Some(&renderer)).unwrap(),
            Value::from("Indexed!\ndaniel1")
        );
        assert!(matches!(
            field.prepare(&mock, None),
            Err(SiftError::FieldResolution(_))
        ));

        let explicit = SearchField::char().template_name("custom.txt");
        explicit.prepare(&mock, Some(&renderer)).unwrap();

        assert_eq!(
            *renderer.rendered.lock().unwrap(),
            vec!["search/indexes/core/mockmodel_text.txt", "custom.txt"]
        );
    }
}
