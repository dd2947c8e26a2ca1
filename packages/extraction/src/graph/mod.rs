//! Knowledge graph read paths: the restricted query language.

pub mod query;

pub use query::{parse, run_query, validate, QueryPlan, DEFAULT_QUERY_LIMIT, MUTATING_KEYWORDS};
