//! Capability tools.
//!
//! Each tool implements [`crate::tool::Tool`] and is attached to an agent at
//! graph assembly. Delegation edges live in `crate::agent`; only leaf
//! capabilities belong here.

mod formula;
mod search;

pub use formula::{evaluate, FormulaError, FormulaTool};
pub use search::{DuckDuckGoSearch, SearchProvider, SearchSnippet, SearchTool, TavilySearch};
