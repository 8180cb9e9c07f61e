//! Structured queries sent to the index

use serde::Serialize;

/// How the terms of a free-text query combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Or,
    And,
}

/// One element of a parsed free-text query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    /// Single token, matched as a substring
    Word { field: Option<String>, value: String },
    /// Quoted phrase, matched as a whole
    Phrase { field: Option<String>, value: String },
    /// Parenthesized sub-query using the same operator
    Group(Vec<Term>),
}

/// Query tree understood by [`crate::core::service::SearchIndex`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    MatchAll,

    /// Parsed free-text query
    QueryString { terms: Vec<Term>, operator: Operator },

    /// Field equals one of the values
    Terms { field: String, values: Vec<String> },

    /// Field lies within the inclusive bounds
    Range {
        field: String,
        gte: Option<String>,
        lte: Option<String>,
    },

    /// Every sub-query matches
    All(Vec<Query>),

    /// At least one sub-query matches
    Any(Vec<Query>),
}

impl Query {
    /// Conjunction of `self` and `other`
    pub fn and(self, other: Query) -> Query {
        match (self, other) {
            (Query::MatchAll, q) | (q, Query::MatchAll) => q,
            (Query::All(mut left), Query::All(right)) => {
                left.extend(right);
                Query::All(left)
            }
            (Query::All(mut left), q) => {
                left.push(q);
                Query::All(left)
            }
            (q, Query::All(mut right)) => {
                right.insert(0, q);
                Query::All(right)
            }
            (a, b) => Query::All(vec![a, b]),
        }
    }

    /// Conjunction of all `queries`, `None` when empty
    pub fn all(queries: impl IntoIterator<Item = Query>) -> Option<Query> {
        queries.into_iter().reduce(Query::and)
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Query::MatchAll)
    }
}
