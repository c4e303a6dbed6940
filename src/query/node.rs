//! The query condition tree.
//!
//! An [`SQ`] is a boolean tree whose leaves are `(expression, value)` pairs.
//! Trees are combined with `&`, `|` and `!`, each producing a new tree, and
//! compiled to a backend query string through a [`QueryFormatter`].
//!
//! ```
//! use sift::backend::formatter::LuceneFormatter;
//! use sift::query::node::SQ;
//!
//! let formatter = LuceneFormatter::default();
//! let sq = SQ::new("title", "moof") & !SQ::new("author", "daniel");
//! assert_eq!(sq.as_query_string(&formatter), "(title:moof AND NOT (author:daniel))");
//! ```
//!
//! Compilation only wraps in parentheses what needs it: a node with a single
//! non-negated child is emitted bare, every other node is grouped, and a
//! negated node is emitted as `NOT (...)`. Double negation is kept verbatim.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use crate::backend::formatter::QueryFormatter;
use crate::query::filter::{FILTER_SEPARATOR, FilterType, prepare_key, split_expression};
use crate::value::Value;

/// Field name of [`SQ::content`] leaves, resolved to the formatter's content
/// field at compile time.
pub const CONTENT_FIELD: &str = "@content";

/// How the children of a node are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Connector {
    #[default]
    And,
    Or,
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connector::And => f.write_str("AND"),
            Connector::Or => f.write_str("OR"),
        }
    }
}

/// A child of a condition node.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    /// A nested condition.
    Node(SQ),
    /// A lookup expression and the value it is compared against.
    Leaf(String, Value),
}

/// A node of the condition tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SQ {
    connector: Connector,
    negated: bool,
    children: Vec<Child>,
}

impl SQ {
    /// A single lookup. Relation paths in `expression` are flattened.
    pub fn new<V: Into<Value>>(expression: &str, value: V) -> Self {
        SQ {
            connector: Connector::And,
            negated: false,
            children: vec![Child::Leaf(prepare_key(expression), value.into())],
        }
    }

    /// Several lookups joined with AND, in the given order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        SQ {
            connector: Connector::And,
            negated: false,
            children: pairs
                .into_iter()
                .map(|(key, value)| Child::Leaf(prepare_key(key.as_ref()), value.into()))
                .collect(),
        }
    }

    /// A lookup against the document text, whatever the content field is
    /// named.
    pub fn content<V: Into<Value>>(value: V) -> Self {
        SQ {
            connector: Connector::And,
            negated: false,
            children: vec![Child::Leaf(CONTENT_FIELD.to_string(), value.into())],
        }
    }

    pub fn connector(&self) -> Connector {
        self.connector
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// An empty tree matches everything.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Add `node` under this tree with the given connector.
    ///
    /// Nodes with the same connector, or with a single child, are merged into
    /// this node's children; a different connector pushes the existing
    /// children down one level.
    pub fn add(&mut self, node: SQ, connector: Connector) {
        self.add_child(Child::Node(node), connector);
    }

    /// Add a single lookup with the given connector.
    pub(crate) fn add_leaf(&mut self, expression: String, value: Value, connector: Connector) {
        self.add_child(Child::Leaf(expression, value), connector);
    }

    fn add_child(&mut self, child: Child, connector: Connector) {
        if connector == self.connector && self.children.contains(&child) {
            return;
        }
        if self.children.len() < 2 {
            self.connector = connector;
        }

        if self.connector == connector {
            match child {
                Child::Node(node)
                    if !node.negated
                        && (node.connector == connector || node.children.len() == 1) =>
                {
                    self.children.extend(node.children);
                }
                child => self.children.push(child),
            }
        } else {
            let inner = SQ {
                connector: self.connector,
                negated: self.negated,
                children: std::mem::take(&mut self.children),
            };
            self.connector = connector;
            self.negated = false;
            self.children = vec![Child::Node(inner), child];
        }
    }

    /// Open a nested group joined to the current children with `connector`.
    ///
    /// Returns the enclosing tree, to be handed back to [`SQ::end_subtree`].
    pub(crate) fn start_subtree(&mut self, connector: Connector) -> SQ {
        if self.children.len() == 1 {
            self.connector = connector;
        } else if self.connector != connector && !self.children.is_empty() {
            let inner = SQ {
                connector: self.connector,
                negated: self.negated,
                children: std::mem::take(&mut self.children),
            };
            self.children = vec![Child::Node(inner)];
            self.connector = connector;
            self.negated = false;
        }
        std::mem::take(self)
    }

    /// Close the group opened by [`SQ::start_subtree`].
    pub(crate) fn end_subtree(&mut self, parent: SQ) {
        let group = SQ {
            connector: self.connector,
            negated: false,
            children: std::mem::take(&mut self.children),
        };
        *self = parent;
        self.children.push(Child::Node(group));
    }

    /// Negate this node in place.
    pub fn negate(&mut self) {
        let inner = SQ {
            connector: self.connector,
            negated: !self.negated,
            children: std::mem::take(&mut self.children),
        };
        self.children = vec![Child::Node(inner)];
        self.connector = Connector::And;
        self.negated = false;
    }

    /// A new tree joining `self` and `other`.
    pub fn combine(&self, other: &SQ, connector: Connector) -> SQ {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut combined = SQ::default();
        combined.add(self.clone(), connector);
        combined.add(other.clone(), connector);
        combined
    }

    /// A new tree matching what `self` does not.
    pub fn inverted(&self) -> SQ {
        let mut inverted = SQ::default();
        inverted.add(self.clone(), Connector::And);
        inverted.negate();
        inverted
    }

    /// Compile the tree into a query string.
    pub fn as_query_string<F: QueryFormatter + ?Sized>(&self, formatter: &F) -> String {
        if self.negated {
            if let [Child::Leaf(expression, Value::Null)] = self.children.as_slice() {
                let (field, _) = resolve_expression(expression, formatter);
                return formatter.build_exists_fragment(&field);
            }
        }

        let parts: Vec<String> = self
            .children
            .iter()
            .map(|child| match child {
                Child::Node(node) => node.as_query_string(formatter),
                Child::Leaf(expression, Value::Null) => {
                    let (field, _) = resolve_expression(expression, formatter);
                    format!("NOT ({})", formatter.build_exists_fragment(&field))
                }
                Child::Leaf(expression, value) => {
                    let (field, filter_type) = resolve_expression(expression, formatter);
                    formatter.build_query_fragment(&field, filter_type, value)
                }
            })
            .filter(|part| !part.is_empty())
            .collect();

        let query = parts.join(&format!(" {} ", self.connector));
        if query.is_empty() {
            query
        } else if self.negated {
            format!("NOT ({query})")
        } else if parts.len() != 1 {
            format!("({query})")
        } else {
            query
        }
    }

    /// Visit every leaf of the tree.
    pub fn leaves(&self) -> Vec<(&str, &Value)> {
        let mut leaves = Vec::new();
        for child in &self.children {
            match child {
                Child::Node(node) => leaves.extend(node.leaves()),
                Child::Leaf(expression, value) => leaves.push((expression.as_str(), value)),
            }
        }
        leaves
    }
}

fn resolve_expression<F: QueryFormatter + ?Sized>(
    expression: &str,
    formatter: &F,
) -> (String, FilterType) {
    let (field, filter_type) = split_expression(expression);
    if field == CONTENT_FIELD {
        (formatter.content_field().to_string(), filter_type)
    } else {
        (field, filter_type)
    }
}

/// Renders leaves as `field__filter=value` for debugging output.
struct ReprFormatter;

impl QueryFormatter for ReprFormatter {
    fn build_query_fragment(&self, field: &str, filter_type: FilterType, value: &Value) -> String {
        format!("{field}{FILTER_SEPARATOR}{filter_type}={value}")
    }
}

impl fmt::Display for SQ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<SQ: {} {}>",
            self.connector,
            self.as_query_string(&ReprFormatter)
        )
    }
}

impl BitAnd for SQ {
    type Output = SQ;

    fn bitand(self, rhs: SQ) -> SQ {
        self.combine(&rhs, Connector::And)
    }
}

impl BitOr for SQ {
    type Output = SQ;

    fn bitor(self, rhs: SQ) -> SQ {
        self.combine(&rhs, Connector::Or)
    }
}

impl Not for SQ {
    type Output = SQ;

    fn not(self) -> SQ {
        self.inverted()
    }
}

impl BitAnd for &SQ {
    type Output = SQ;

    fn bitand(self, rhs: &SQ) -> SQ {
        self.combine(rhs, Connector::And)
    }
}

impl BitOr for &SQ {
    type Output = SQ;

    fn bitor(self, rhs: &SQ) -> SQ {
        self.combine(rhs, Connector::Or)
    }
}

impl Not for &SQ {
    type Output = SQ;

    fn not(self) -> SQ {
        self.inverted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::formatter::LuceneFormatter;

    fn compile(sq: &SQ) -> String {
        sq.as_query_string(&LuceneFormatter::default())
    }

    #[test]
    fn test_single_leaf_is_bare() {
        assert_eq!(compile(&SQ::new("title", "moof")), "title:moof");
        assert_eq!(compile(&SQ::content("hello")), "hello");
        assert_eq!(compile(&SQ::default()), "");
    }

    #[test]
    fn test_content_follows_the_formatter() {
        let body = LuceneFormatter::new("body");
        assert_eq!(SQ::content("hello").as_query_string(&body), "hello");
        assert_eq!(SQ::new("content", "hello").as_query_string(&body), "content:hello");
        assert_eq!(
            (SQ::content("hello") & !SQ::new("body", "world")).as_query_string(&body),
            "(hello AND NOT (world))"
        );
        assert_eq!(SQ::content("hello").to_string(), "<SQ: AND content__exact=hello>");
    }

    #[test]
    fn test_and_or_grouping() {
        let a = SQ::new("a", 1);
        let b = SQ::new("b", 2);
        let c = SQ::new("c", 3);

        assert_eq!(compile(&(&a & &b)), "(a:1 AND b:2)");
        assert_eq!(compile(&(&a | &b)), "(a:1 OR b:2)");
        assert_eq!(compile(&(&(&a & &b) & &c)), "(a:1 AND b:2 AND c:3)");
        assert_eq!(compile(&(&(&a & &b) | &c)), "((a:1 AND b:2) OR c:3)");
        assert_eq!(compile(&(&a & &(&b | &c))), "(a:1 AND (b:2 OR c:3))");
        assert_eq!(compile(&(&a & &SQ::default())), "a:1");
    }

    #[test]
    fn test_negation_is_not_simplified() {
        let a = SQ::new("a", 1);
        assert_eq!(compile(&!&a), "NOT (a:1)");
        assert_eq!(compile(&!!a.clone()), "NOT (NOT (a:1))");
        assert_eq!(
            compile(&!(SQ::new("a", 1) | SQ::new("b", 2))),
            "NOT ((a:1 OR b:2))"
        );
    }

    #[test]
    fn test_combining_trees_wraps_operands() {
        let t1 = SQ::new("a", 1) | SQ::new("b", 2);
        let t2 = SQ::new("c", 3) | SQ::new("d", 4);
        assert_eq!(
            compile(&(&t1 & &t2)),
            format!("({} AND {})", compile(&t1), compile(&t2))
        );
    }

    #[test]
    fn test_null_lookups() {
        assert_eq!(compile(&SQ::new("foo", Value::Null)), "NOT (foo:[* TO *])");
        assert_eq!(compile(&!SQ::new("foo", Value::Null)), "foo:[* TO *]");
        assert_eq!(
            compile(&(SQ::new("title", "moof") & SQ::new("foo", Value::Null))),
            "(title:moof AND NOT (foo:[* TO *]))"
        );
    }

    #[test]
    fn test_relation_keys_are_flattened() {
        let sq = SQ::new("tag__name__startswith", "pri");
        assert_eq!(compile(&sq), "tag0_0_0name:pri*");
        assert_eq!(sq.leaves(), vec![("tag0_0_0name__startswith", &Value::from("pri"))]);
    }

    #[test]
    fn test_display() {
        let sq = SQ::from_pairs([("author", "daniel"), ("pub_date__lte", "2009-02-25")]);
        assert_eq!(
            sq.to_string(),
            "<SQ: AND (author__exact=daniel AND pub_date__lte=2009-02-25)>"
        );
        assert_eq!(
            (!SQ::new("title", "moof")).to_string(),
            "<SQ: AND NOT (title__exact=moof)>"
        );
    }
}
