pub mod aggregation;
pub mod codec;
pub mod columns;
pub mod config;
pub mod docset;
pub mod error;
pub mod index;
pub mod models;
pub mod persistence;
pub mod query;
pub mod schema;
pub mod segment;
pub mod tokenizer;

pub use aggregation::{AggregationResult, AggregationSpec};
pub use config::{IndexSettings, RetryPolicy, TokenizerConfig};
pub use error::{QuarryError, Result};
pub use index::{Index, QueryStream};
pub use models::*;
pub use query::{Query, QueryRequest, SortClause};
pub use schema::{FieldConfig, FieldFlags, FieldRegistry};
pub use tokenizer::{Analyzer, KeywordAnalyzer, TextAnalyzer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
