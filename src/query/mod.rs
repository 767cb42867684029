//! Query representation and resolution
//!
//! - [`Query`]: the expression tree, built with the functions in [`ast`]
//! - [`terms`]: value to term encoding, including the numeric precision levels
//! - [`rewrite`]: boolean normalization
//! - [`resolve`]: evaluation of a tree against one segment into a doc-id set
//! - [`CachedFilter`]: a named sub-expression memoized per segment
//!
//! # Example
//!
//! ```
//! use quarry::query::{and, not, number_range, term};
//!
//! let q = and(vec![
//!     term("color", "red"),
//!     not(term("status", "draft")),
//!     number_range("price", Some(10), Some(20), true, false).unwrap(),
//! ]);
//! assert!(q.node_count() > 3);
//! ```

pub mod ast;
mod cache;
mod request;
mod resolve;
mod rewrite;
mod sort;
pub mod terms;

pub use ast::{all, and, any_field, exists, none, not, number_range, or, term, BooleanQuery, Query};
pub use cache::CachedFilter;
pub use request::QueryRequest;
pub use resolve::{resolve, resolve_node};
pub use rewrite::rewrite;
pub use sort::{
    compare_keys, value_key, DocComparator, KeyPart, KeySource, SortClause, SortDirection, SortKey,
};
pub use terms::Term;
