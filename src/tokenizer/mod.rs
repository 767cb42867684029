mod analyzer;
#[allow(clippy::module_inception)]
mod tokenizer;

pub use analyzer::{Analyzer, KeywordAnalyzer, TextAnalyzer};
pub use tokenizer::Tokenizer;
