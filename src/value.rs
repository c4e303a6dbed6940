//! Field values, model types and document identities.
//!
//! [`Value`] is the indexable primitive every field descriptor produces and
//! every backend hit carries. It covers the semantic types fields convert to:
//!
//! - **Text** - string data
//! - **Integer** - 64-bit signed integers
//! - **Float** - 64-bit floating-point numbers
//! - **Boolean** - true/false values
//! - **Date** / **DateTime** - naive calendar dates and timestamps
//! - **List** - multi-valued fields
//! - **Null** - explicit absence
//!
//! ```
//! use sift::value::Value;
//!
//! let text = Value::from("hello");
//! assert_eq!(text.as_text(), Some("hello"));
//!
//! let number = Value::from(42);
//! assert_eq!(number.as_i64(), Some(42));
//! assert!(!Value::Null.is_truthy());
//! ```
//!
//! Documents are identified by `app.model.pk` strings, see [`get_identifier`]
//! and [`parse_identifier`].

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiftError};

lazy_static! {
    static ref IDENTIFIER_REGEX: Regex =
        Regex::new(r"^[\w\d_]+\.[\w\d_]+\.\d+$").expect("identifier pattern is valid");
}

/// Represents a value for a field of an indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value
    Null,
    /// Text value
    Text(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time without timezone
    DateTime(NaiveDateTime),
    /// Multi-valued field
    List(Vec<Value>),
}

impl Value {
    /// Get the value as text, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a float. Integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get the value as a boolean, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the value as a date. Datetimes are truncated.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    /// Get the value as a datetime. Dates start at midnight.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    /// Get the elements of a list value.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Check whether this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value counts as "true" in a boolean context.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Text(s) => !s.is_empty(),
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Boolean(b) => *b,
            Value::Date(_) | Value::DateTime(_) => true,
            Value::List(items) => !items.is_empty(),
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// The type of an indexed application object, `app_label.model_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelType {
    /// Application the model belongs to.
    pub app_label: String,
    /// Lowercase model name.
    pub model_name: String,
}

impl ModelType {
    /// Create a new model type.
    pub fn new<A: Into<String>, M: Into<String>>(app_label: A, model_name: M) -> Self {
        ModelType {
            app_label: app_label.into(),
            model_name: model_name.into(),
        }
    }

    /// The `app.model` label.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.model_name)
    }
}

impl FromStr for ModelType {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((app, model)) if !app.is_empty() && !model.is_empty() && !model.contains('.') => {
                Ok(ModelType::new(app, model))
            }
            _ => Err(SiftError::attribute(format!(
                "'{s}' is not a valid model type label"
            ))),
        }
    }
}

/// Build the `app.model.pk` identity of an object.
pub fn get_identifier(model: &ModelType, pk: &str) -> String {
    format!("{}.{}.{}", model.app_label, model.model_name, pk)
}

/// Validate an identity string and split it into its model type and pk.
pub fn parse_identifier(identifier: &str) -> Result<(ModelType, String)> {
    if !IDENTIFIER_REGEX.is_match(identifier) {
        return Err(SiftError::attribute(format!(
            "Provided string '{identifier}' is not a valid identifier."
        )));
    }

    let mut parts = identifier.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(app), Some(model), Some(pk)) => Ok((ModelType::new(app, model), pk.to_string())),
        _ => Err(SiftError::attribute(format!(
            "Provided string '{identifier}' is not a valid identifier."
        ))),
    }
}
