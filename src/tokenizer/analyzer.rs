//! Pluggable value-to-token analyzers

use std::fmt;

use super::tokenizer::Tokenizer;
use crate::config::TokenizerConfig;

/// Turns a string field value into index tokens
pub trait Analyzer: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn analyze(&self, text: &str) -> Vec<String>;
}

/// Indexes the whole string as one lower-cased token
#[derive(Debug, Default)]
pub struct KeywordAnalyzer;

impl Analyzer for KeywordAnalyzer {
    fn name(&self) -> &str {
        "keyword"
    }

    fn analyze(&self, text: &str) -> Vec<String> {
        vec![text.to_lowercase()]
    }
}

/// Word-segmenting analyzer backed by [`Tokenizer`]
#[derive(Debug)]
pub struct TextAnalyzer {
    tokenizer: Tokenizer,
}

impl TextAnalyzer {
    pub fn new(config: &TokenizerConfig) -> Self {
        Self {
            tokenizer: Tokenizer::new(config),
        }
    }
}

impl Default for TextAnalyzer {
    fn default() -> Self {
        Self::new(&TokenizerConfig::default())
    }
}

impl Analyzer for TextAnalyzer {
    fn name(&self) -> &str {
        "text"
    }

    fn analyze(&self, text: &str) -> Vec<String> {
        self.tokenizer.unique_terms(text)
    }
}
