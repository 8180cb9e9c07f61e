//! Completion suggesters

use serde::{Deserialize, Serialize};

/// A suggester as configured on an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggesterDef {
    /// Field whose values are completed
    pub field: String,

    /// Maximum number of suggestions
    #[serde(default = "default_size")]
    pub size: usize,

    /// Optional field that narrows candidates; its value is taken from the
    /// request parameter of the same name
    #[serde(default)]
    pub context: Option<String>,
}

fn default_size() -> usize {
    5
}

/// Restricts suggestions to records whose `field` equals `value`
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestContext {
    pub field: String,
    pub value: String,
}

/// One suggester run
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestRequest {
    pub field: String,
    pub prefix: String,
    pub size: usize,
    pub context: Option<SuggestContext>,
}

impl SuggestRequest {
    pub fn new(def: &SuggesterDef, prefix: impl Into<String>, context: Option<String>) -> Self {
        Self {
            field: def.field.clone(),
            prefix: prefix.into(),
            size: def.size,
            context: def.context.clone().zip(context).map(|(field, value)| SuggestContext {
                field,
                value,
            }),
        }
    }
}

/// A completed value and the number of records carrying it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub doc_count: usize,
}
