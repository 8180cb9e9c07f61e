//! Search query assembly and result types

pub mod facets;
pub mod parser;
pub mod pipeline;
pub mod query;
pub mod result;
pub mod sort;
pub mod suggest;

pub use facets::{
    AggregationDef, FacetConfig, FacetDefinition, FacetFilter, RangeFilter, TermsFilter,
};
pub use parser::{QueryParser, QueryStringParser};
pub use pipeline::{AggregationRequest, PreparedSearch, SearchPipeline};
pub use query::{Operator, Query, Term};
pub use result::{AggregationResult, Bucket, SearchHit, SearchResult};
pub use sort::{
    DefaultSortDefinition, ResolvedSort, SortClause, SortDirection, SortField, SortOption,
    SortOptionDefinition, SortRegistry, SortResolver,
};
pub use suggest::{SuggestContext, SuggestRequest, SuggesterDef, Suggestion};
