//! Query string parser of the memory backend.
//!
//! Parses the Lucene syntax written by
//! [`LuceneFormatter`](crate::backend::formatter::LuceneFormatter):
//!
//! - Match all: `*:*`
//! - Field-specific queries: `title:hello`, `title:(foo OR bar)`
//! - Boolean operators: `AND`, `OR`, `NOT`, implicit AND between clauses
//! - Phrases and proximity: `"hello world"`, `"hello world"~2`
//! - Ranges: `[1 TO 5]`, `{a TO *}`, `[* TO *]` for field existence
//! - Wildcards: `dan*`, `*ani*`, `te?t`
//! - Fuzzy terms: `danial~`
//! - Boosts: `world^5`
//! - Backslash escapes: `pants\:rule`

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use regex::Regex;

use crate::error::{Result, SiftError};
use crate::util::levenshtein::DEFAULT_MAX_EDITS;

#[derive(Parser)]
#[grammar = "backend/memory/query.pest"]
struct QueryStringParser;

/// A parsed query. `field: None` targets the document text.
#[derive(Debug, Clone)]
pub enum QueryNode {
    MatchAll,
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
    /// Raises the score of its clause; inside a conjunction it is optional.
    Boost(Box<QueryNode>, f64),
    Term {
        field: Option<String>,
        term: String,
    },
    Wildcard {
        field: Option<String>,
        pattern: Regex,
    },
    Fuzzy {
        field: Option<String>,
        term: String,
        max_edits: usize,
    },
    Phrase {
        field: Option<String>,
        phrase: String,
        slop: Option<usize>,
    },
    Range {
        field: Option<String>,
        lower: Option<String>,
        upper: Option<String>,
        lower_inclusive: bool,
        upper_inclusive: bool,
    },
}

impl QueryNode {
    /// A query matching nothing.
    pub fn match_none() -> QueryNode {
        QueryNode::Or(Vec::new())
    }
}

/// Parses query strings into [`QueryNode`] trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParser;

impl QueryParser {
    pub fn new() -> Self {
        QueryParser
    }

    /// Parse a query string. An empty string matches nothing.
    pub fn parse(&self, query_str: &str) -> Result<QueryNode> {
        let pairs = QueryStringParser::parse(Rule::query, query_str)
            .map_err(|e| SiftError::query(format!("Parse error: {e}")))?;

        for pair in pairs {
            if pair.as_rule() == Rule::query {
                for inner_pair in pair.into_inner() {
                    if inner_pair.as_rule() == Rule::or_expr {
                        return self.parse_or(inner_pair, None);
                    }
                }
            }
        }

        Ok(QueryNode::match_none())
    }

    fn parse_or(&self, pair: Pair<'_, Rule>, field: Option<&str>) -> Result<QueryNode> {
        let mut clauses = Vec::new();
        for inner_pair in pair.into_inner() {
            if inner_pair.as_rule() == Rule::and_expr {
                clauses.push(self.parse_and(inner_pair, field)?);
            }
        }
        Ok(collapse(clauses, QueryNode::Or))
    }

    fn parse_and(&self, pair: Pair<'_, Rule>, field: Option<&str>) -> Result<QueryNode> {
        let mut clauses = Vec::new();
        for inner_pair in pair.into_inner() {
            if inner_pair.as_rule() == Rule::unary {
                clauses.push(self.parse_unary(inner_pair, field)?);
            }
        }
        Ok(collapse(clauses, QueryNode::And))
    }

    fn parse_unary(&self, pair: Pair<'_, Rule>, field: Option<&str>) -> Result<QueryNode> {
        let mut negated = false;
        for inner_pair in pair.into_inner() {
            match inner_pair.as_rule() {
                Rule::not_op => negated = true,
                Rule::unary => {
                    let inner = self.parse_unary(inner_pair, field)?;
                    return Ok(if negated {
                        QueryNode::Not(Box::new(inner))
                    } else {
                        inner
                    });
                }
                _ => return self.parse_primary(inner_pair, field),
            }
        }

        Err(SiftError::query("Invalid clause"))
    }

    fn parse_primary(&self, pair: Pair<'_, Rule>, field: Option<&str>) -> Result<QueryNode> {
        match pair.as_rule() {
            Rule::match_all => Ok(QueryNode::MatchAll),
            Rule::group => self.parse_group(pair, field),
            Rule::field_clause => self.parse_field_clause(pair),
            Rule::range => self.parse_range(pair, field),
            Rule::phrase => self.parse_phrase(pair, field),
            Rule::term_clause => self.parse_term_clause(pair, field),
            rule => Err(SiftError::query(format!("Unexpected clause {rule:?}"))),
        }
    }

    fn parse_group(&self, pair: Pair<'_, Rule>, field: Option<&str>) -> Result<QueryNode> {
        let mut query = None;
        let mut boost = None;

        for inner_pair in pair.into_inner() {
            match inner_pair.as_rule() {
                Rule::or_expr => query = Some(self.parse_or(inner_pair, field)?),
                Rule::boost => boost = Some(self.parse_boost(inner_pair)?),
                _ => {}
            }
        }

        let query = query.ok_or_else(|| SiftError::query("Invalid grouped query"))?;
        Ok(with_boost(query, boost))
    }

    fn parse_field_clause(&self, pair: Pair<'_, Rule>) -> Result<QueryNode> {
        let mut field: Option<String> = None;

        for inner_pair in pair.into_inner() {
            match inner_pair.as_rule() {
                Rule::field_name => field = Some(inner_pair.as_str().to_string()),
                _ => {
                    let field_name = field
                        .as_deref()
                        .ok_or_else(|| SiftError::query("Missing field name"))?;
                    return self.parse_primary(inner_pair, Some(field_name));
                }
            }
        }

        Err(SiftError::query("Invalid field query"))
    }

    fn parse_range(&self, pair: Pair<'_, Rule>, field: Option<&str>) -> Result<QueryNode> {
        let mut lower_inclusive = true;
        let mut upper_inclusive = true;
        let mut bounds: Vec<Option<String>> = Vec::with_capacity(2);
        let mut boost = None;

        for inner_pair in pair.into_inner() {
            match inner_pair.as_rule() {
                Rule::incl_open => lower_inclusive = true,
                Rule::excl_open => lower_inclusive = false,
                Rule::incl_close => upper_inclusive = true,
                Rule::excl_close => upper_inclusive = false,
                Rule::open_bound => bounds.push(None),
                Rule::bare_bound => bounds.push(Some(unescape(inner_pair.as_str()))),
                Rule::quoted_bound => {
                    let text = inner_pair
                        .into_inner()
                        .next()
                        .map(|text| unescape(text.as_str()))
                        .unwrap_or_default();
                    bounds.push(Some(text));
                }
                Rule::boost => boost = Some(self.parse_boost(inner_pair)?),
                _ => {}
            }
        }

        let [lower, upper]: [Option<String>; 2] = bounds
            .try_into()
            .map_err(|_| SiftError::query("A range needs two bounds"))?;
        let range = QueryNode::Range {
            field: field.map(str::to_string),
            lower,
            upper,
            lower_inclusive,
            upper_inclusive,
        };
        Ok(with_boost(range, boost))
    }

    fn parse_phrase(&self, pair: Pair<'_, Rule>, field: Option<&str>) -> Result<QueryNode> {
        let mut phrase = String::new();
        let mut slop = None;
        let mut boost = None;

        for inner_pair in pair.into_inner() {
            match inner_pair.as_rule() {
                Rule::phrase_text => phrase = unescape(inner_pair.as_str()),
                Rule::proximity => {
                    for prox_pair in inner_pair.into_inner() {
                        if prox_pair.as_rule() == Rule::number {
                            slop = prox_pair.as_str().parse::<usize>().ok();
                        }
                    }
                }
                Rule::boost => boost = Some(self.parse_boost(inner_pair)?),
                _ => {}
            }
        }

        let phrase = QueryNode::Phrase {
            field: field.map(str::to_string),
            phrase,
            slop,
        };
        Ok(with_boost(phrase, boost))
    }

    fn parse_term_clause(&self, pair: Pair<'_, Rule>, field: Option<&str>) -> Result<QueryNode> {
        let mut raw_term = "";
        let mut fuzzy: Option<usize> = None;
        let mut boost = None;

        for inner_pair in pair.into_inner() {
            match inner_pair.as_rule() {
                Rule::term => raw_term = inner_pair.as_str(),
                Rule::fuzzy => {
                    let mut max_edits = DEFAULT_MAX_EDITS;
                    for fuzz_pair in inner_pair.into_inner() {
                        if fuzz_pair.as_rule() == Rule::number {
                            // Fractional similarities select the default distance.
                            if let Ok(edits) = fuzz_pair.as_str().parse::<usize>() {
                                max_edits = edits;
                            }
                        }
                    }
                    fuzzy = Some(max_edits);
                }
                Rule::boost => boost = Some(self.parse_boost(inner_pair)?),
                _ => {}
            }
        }

        let field = field.map(str::to_string);
        let query = match (fuzzy, wildcard_pattern(raw_term)?) {
            (Some(max_edits), _) => QueryNode::Fuzzy {
                field,
                term: unescape(raw_term),
                max_edits,
            },
            (None, Some(pattern)) => QueryNode::Wildcard { field, pattern },
            (None, None) => QueryNode::Term {
                field,
                term: unescape(raw_term),
            },
        };
        Ok(with_boost(query, boost))
    }

    fn parse_boost(&self, pair: Pair<'_, Rule>) -> Result<f64> {
        for inner_pair in pair.into_inner() {
            if inner_pair.as_rule() == Rule::number {
                return inner_pair
                    .as_str()
                    .parse::<f64>()
                    .map_err(|e| SiftError::query(format!("Invalid boost: {e}")));
            }
        }
        Err(SiftError::query("Missing boost value"))
    }
}

fn collapse(mut clauses: Vec<QueryNode>, combine: fn(Vec<QueryNode>) -> QueryNode) -> QueryNode {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        combine(clauses)
    }
}

fn with_boost(query: QueryNode, boost: Option<f64>) -> QueryNode {
    match boost {
        Some(boost) => QueryNode::Boost(Box::new(query), boost),
        None => query,
    }
}

/// Drop the backslashes of escaped characters.
fn unescape(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                unescaped.push(escaped);
            }
        } else {
            unescaped.push(c);
        }
    }
    unescaped
}

/// A case-insensitive pattern for a term with unescaped `*` or `?`.
fn wildcard_pattern(raw_term: &str) -> Result<Option<Regex>> {
    let mut pattern = String::from("(?i)^");
    let mut has_wildcard = false;
    let mut chars = raw_term.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    pattern.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            '*' => {
                has_wildcard = true;
                pattern.push_str(".*");
            }
            '?' => {
                has_wildcard = true;
                pattern.push('.');
            }
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');

    if !has_wildcard {
        return Ok(None);
    }
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| SiftError::query(format!("Invalid wildcard '{raw_term}': {e}")))
}
