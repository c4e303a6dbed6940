//! Filter types and lookup expressions.
//!
//! A lookup expression names a field and optionally a filter type, joined by
//! [`FILTER_SEPARATOR`]: `pub_date__lte`, `author__startswith`, or just
//! `author` for an exact match. Relation paths such as `tag__name` are
//! rewritten to flattened attribute names before they reach the tree.

use std::fmt;
use std::str::FromStr;

use crate::dotpath::SEPARATOR;
use crate::error::{Result, SiftError};

/// Separator between field name and filter type.
pub const FILTER_SEPARATOR: &str = "__";

/// The comparison a lookup performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    Exact,
    Contains,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    StartsWith,
    Range,
    Fuzzy,
    Near,
}

impl FilterType {
    /// Every filter type, in keyword order.
    pub const ALL: [FilterType; 11] = [
        FilterType::Exact,
        FilterType::Contains,
        FilterType::Gt,
        FilterType::Gte,
        FilterType::Lt,
        FilterType::Lte,
        FilterType::In,
        FilterType::StartsWith,
        FilterType::Range,
        FilterType::Fuzzy,
        FilterType::Near,
    ];

    /// The keyword of the filter type.
    pub fn as_str(self) -> &'static str {
        match self {
            FilterType::Exact => "exact",
            FilterType::Contains => "contains",
            FilterType::Gt => "gt",
            FilterType::Gte => "gte",
            FilterType::Lt => "lt",
            FilterType::Lte => "lte",
            FilterType::In => "in",
            FilterType::StartsWith => "startswith",
            FilterType::Range => "range",
            FilterType::Fuzzy => "fuzzy",
            FilterType::Near => "near",
        }
    }

    /// Whether `keyword` names a filter type.
    pub fn is_valid(keyword: &str) -> bool {
        keyword.parse::<FilterType>().is_ok()
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterType {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self> {
        FilterType::ALL
            .into_iter()
            .find(|filter| filter.as_str() == s)
            .ok_or_else(|| SiftError::query(format!("'{s}' is not a valid filter type")))
    }
}

/// Split a lookup expression into field name and filter type.
///
/// A trailing segment that is not a filter keyword belongs to the field
/// name, and the filter type defaults to [`FilterType::Exact`].
pub fn split_expression(expression: &str) -> (String, FilterType) {
    if let Some((field, last)) = expression.rsplit_once(FILTER_SEPARATOR) {
        if let Ok(filter_type) = last.parse::<FilterType>() {
            return (field.to_string(), filter_type);
        }
    }
    (expression.to_string(), FilterType::Exact)
}

/// Rewrite relation separators in a lookup key to the flattened form.
///
/// `tag__name` becomes `tag0_0_0name`, while the separator introducing a
/// trailing filter keyword is kept: `tag__name__startswith` becomes
/// `tag0_0_0name__startswith`.
pub fn prepare_key(key: &str) -> String {
    let (field, filter) = match key.rsplit_once(FILTER_SEPARATOR) {
        Some((field, last)) if FilterType::is_valid(last) => (field, Some(last)),
        _ => (key, None),
    };

    let field = field.replace(FILTER_SEPARATOR, SEPARATOR);
    match filter {
        Some(filter) => format!("{field}{FILTER_SEPARATOR}{filter}"),
        None => field,
    }
}
