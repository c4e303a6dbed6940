//! Backend query syntax.
//!
//! The condition tree decides how lookups are combined; a [`QueryFormatter`]
//! decides how a single lookup is written. [`LuceneFormatter`] produces the
//! Lucene query syntax understood by Solr-like engines and by the bundled
//! [`MemoryBackend`](crate::backend::memory::MemoryBackend).

use crate::query::filter::FilterType;
use crate::value::Value;

/// Characters with a meaning in the Lucene query syntax.
const RESERVED_CHARACTERS: &[char] = &[
    '\\', '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '/',
];

/// Writes single lookups in a backend query language.
pub trait QueryFormatter {
    /// The query fragment for one `field filter value` lookup.
    fn build_query_fragment(&self, field: &str, filter_type: FilterType, value: &Value) -> String;

    /// The field holding the document text.
    fn content_field(&self) -> &str {
        "content"
    }

    /// A fragment matching documents that have `field`.
    fn build_exists_fragment(&self, field: &str) -> String {
        format!("{field}:[* TO *]")
    }

    /// A fragment matching every document.
    fn matching_all_fragment(&self) -> String {
        "*:*".to_string()
    }

    /// A fragment raising the score of documents containing `term`.
    fn build_boost_fragment(&self, term: &str, boost: f64) -> String {
        format!("{}^{boost}", self.clean(term))
    }

    /// Escape user text so it is matched literally.
    fn clean(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Lucene query syntax.
#[derive(Debug, Clone)]
pub struct LuceneFormatter {
    content_field: String,
}

impl Default for LuceneFormatter {
    fn default() -> Self {
        LuceneFormatter::new("content")
    }
}

impl LuceneFormatter {
    /// Create a formatter; lookups on `content_field` search the document text.
    pub fn new<S: Into<String>>(content_field: S) -> Self {
        LuceneFormatter {
            content_field: content_field.into(),
        }
    }

    fn field_prefix(&self, field: &str) -> String {
        if field == self.content_field {
            String::new()
        } else {
            format!("{field}:")
        }
    }

    /// Render a value as a standalone query term.
    pub fn convert_value(&self, value: &Value) -> String {
        match value {
            Value::Text(text) => {
                if text.chars().any(char::is_whitespace) {
                    format!("\"{}\"", quote_escape(text))
                } else {
                    self.clean(text)
                }
            }
            Value::Boolean(b) => b.to_string(),
            Value::Date(_) | Value::DateTime(_) => format!("\"{}\"", format_date(value)),
            Value::List(items) => {
                let words: Vec<String> = items.iter().map(Value::to_string).collect();
                format!("\"{}\"", quote_escape(&words.join(" ")))
            }
            other => other.to_string(),
        }
    }

    /// Render a value inside double quotes.
    fn quoted(&self, value: &Value) -> String {
        match value {
            Value::Date(_) | Value::DateTime(_) => format!("\"{}\"", format_date(value)),
            other => format!("\"{}\"", quote_escape(&other.to_string())),
        }
    }

    fn wildcard_term(&self, value: &Value) -> String {
        self.clean(&value.to_string()).replace(' ', "\\ ")
    }
}

impl QueryFormatter for LuceneFormatter {
    fn content_field(&self) -> &str {
        &self.content_field
    }

    fn build_query_fragment(&self, field: &str, filter_type: FilterType, value: &Value) -> String {
        let prefix = self.field_prefix(field);

        match filter_type {
            FilterType::Exact => format!("{prefix}{}", self.convert_value(value)),
            FilterType::Contains => format!("{prefix}*{}*", self.wildcard_term(value)),
            FilterType::StartsWith => format!("{prefix}{}*", self.wildcard_term(value)),
            FilterType::Gt => format!("{prefix}{{{} TO *}}", self.convert_value(value)),
            FilterType::Gte => format!("{prefix}[{} TO *]", self.convert_value(value)),
            FilterType::Lt => format!("{prefix}{{* TO {}}}", self.convert_value(value)),
            FilterType::Lte => format!("{prefix}[* TO {}]", self.convert_value(value)),
            FilterType::In => {
                let options: Vec<String> = match value {
                    Value::List(items) => items
                        .iter()
                        .map(|item| format!("{prefix}{}", self.quoted(item)))
                        .collect(),
                    other => vec![format!("{prefix}{}", self.quoted(other))],
                };
                if options.is_empty() {
                    format!("(NOT {})", self.matching_all_fragment())
                } else {
                    format!("({})", options.join(" OR "))
                }
            }
            FilterType::Range => match value.as_list() {
                Some([start, end]) => format!(
                    "{prefix}[{} TO {}]",
                    self.convert_value(start),
                    self.convert_value(end)
                ),
                _ => format!("{prefix}{}", self.convert_value(value)),
            },
            FilterType::Fuzzy => format!("{prefix}{}~", self.clean(&value.to_string())),
            FilterType::Near => {
                let (phrase, slop) = match value.as_list() {
                    Some([phrase, slop]) => (phrase.to_string(), slop.as_i64().unwrap_or(1)),
                    _ => (value.to_string(), 1),
                };
                format!("{prefix}\"{}\"~{slop}", quote_escape(&phrase))
            }
        }
    }

    fn clean(&self, text: &str) -> String {
        let mut cleaned = String::with_capacity(text.len());
        for c in text.chars() {
            if RESERVED_CHARACTERS.contains(&c) {
                cleaned.push('\\');
            }
            cleaned.push(c);
        }
        cleaned
    }
}

fn quote_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render a date or datetime in the backend's UTC format.
pub fn format_date(value: &Value) -> String {
    value
        .as_datetime()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| value.to_string())
}
