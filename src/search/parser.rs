//! Free-text query parsers
//!
//! Supported syntax: bare words, `"quoted phrases"`, `field:value`,
//! `field:"quoted phrase"` and parenthesized groups. Blank input matches
//! everything.

use std::iter::Peekable;
use std::str::Chars;

use crate::core::error::SearchError;
use crate::search::query::{Operator, Query, Term};

/// Deepest parenthesized group a query may open
pub const MAX_GROUP_DEPTH: usize = 32;

/// Turns the `q` parameter into a structured query
pub trait QueryParser: Send + Sync {
    fn parse(&self, query: Option<&str>) -> Result<Query, SearchError>;
}

/// Query-string parser with a fixed default operator
#[derive(Debug, Clone, Copy)]
pub struct QueryStringParser {
    operator: Operator,
}

impl QueryStringParser {
    /// Terms are alternatives (`or`), the default
    pub fn or() -> Self {
        Self {
            operator: Operator::Or,
        }
    }

    /// Every term must match (`and`)
    pub fn and() -> Self {
        Self {
            operator: Operator::And,
        }
    }
}

impl QueryParser for QueryStringParser {
    fn parse(&self, query: Option<&str>) -> Result<Query, SearchError> {
        let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
            return Ok(Query::MatchAll);
        };

        let terms = parse_terms(query)?;
        if terms.is_empty() {
            return Ok(Query::MatchAll);
        }
        Ok(Query::QueryString {
            terms,
            operator: self.operator,
        })
    }
}

/// Tokenize a query string into terms
pub fn parse_terms(query: &str) -> Result<Vec<Term>, SearchError> {
    TermParser {
        query,
        chars: query.chars().peekable(),
    }
    .sequence(0)
}

struct TermParser<'a> {
    query: &'a str,
    chars: Peekable<Chars<'a>>,
}

impl TermParser<'_> {
    fn error(&self, message: impl Into<String>) -> SearchError {
        SearchError::QueryParse {
            query: self.query.to_string(),
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|c: &char| c.is_whitespace()).is_some() {}
    }

    fn sequence(&mut self, depth: usize) -> Result<Vec<Term>, SearchError> {
        let mut terms = Vec::new();
        loop {
            self.skip_whitespace();
            match self.chars.peek().copied() {
                None if depth > 0 => return Err(self.error("unbalanced parentheses")),
                None => return Ok(terms),
                Some(')') if depth == 0 => return Err(self.error("unbalanced parentheses")),
                Some(')') => {
                    self.chars.next();
                    return Ok(terms);
                }
                Some('(') => {
                    self.chars.next();
                    if depth >= MAX_GROUP_DEPTH {
                        return Err(self.error(format!(
                            "groups nest deeper than {} levels",
                            MAX_GROUP_DEPTH
                        )));
                    }
                    let inner = self.sequence(depth + 1)?;
                    if !inner.is_empty() {
                        terms.push(Term::Group(inner));
                    }
                }
                Some('"') => {
                    self.chars.next();
                    let value = self.phrase()?;
                    terms.push(Term::Phrase { field: None, value });
                }
                Some(_) => terms.push(self.word()?),
            }
        }
    }

    fn phrase(&mut self) -> Result<String, SearchError> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some('"') => return Ok(value),
                Some(c) => value.push(c),
                None => return Err(self.error("unbalanced quotes")),
            }
        }
    }

    fn word(&mut self) -> Result<Term, SearchError> {
        let mut word = String::new();
        while let Some(c) = self
            .chars
            .next_if(|&c| !c.is_whitespace() && !matches!(c, '(' | ')' | '"'))
        {
            word.push(c);
        }

        let Some((field, value)) = word.split_once(':') else {
            return Ok(Term::Word {
                field: None,
                value: word,
            });
        };

        if field.is_empty() {
            return Err(self.error(format!("missing field name before ':{}'", value)));
        }
        let field = Some(field.to_string());

        if !value.is_empty() {
            return Ok(Term::Word {
                field,
                value: value.to_string(),
            });
        }

        if self.chars.next_if_eq(&'"').is_some() {
            let value = self.phrase()?;
            return Ok(Term::Phrase { field, value });
        }

        Err(self.error(format!("field '{}' has no value", word.trim_end_matches(':'))))
    }
}
