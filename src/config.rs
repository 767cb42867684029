use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Index settings configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Keep the original source document for projection back to callers
    pub store_source: bool,
    /// Directory for persisted segments; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    /// Ingestion chunk size applied to the current segment
    pub batch_size: usize,
    /// Rotate the current segment once it holds this many documents
    pub max_segment_docs: Option<usize>,
    /// Decode cache budget per immutable segment
    pub cache_size_bytes: usize,
    /// Source documents per persisted block
    pub source_block_size: usize,
    pub persist_retry: RetryPolicy,
    /// Default deadline for queries that do not carry their own
    pub query_timeout: Option<Duration>,
    pub tokenizer_config: TokenizerConfig,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            store_source: true,
            data_dir: None,
            batch_size: 1000,
            max_segment_docs: None,
            cache_size_bytes: 64 * 1024 * 1024,
            source_block_size: 128,
            persist_retry: RetryPolicy::default(),
            query_timeout: None,
            tokenizer_config: TokenizerConfig::default(),
        }
    }
}

impl IndexSettings {
    /// Settings for an index persisted under `dir`
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Default::default()
        }
    }

    pub fn with_store_source(mut self, store_source: bool) -> Self {
        self.store_source = store_source;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_segment_docs(mut self, docs: usize) -> Self {
        self.max_segment_docs = Some(docs.max(1));
        self
    }

    pub fn with_cache_size_bytes(mut self, bytes: usize) -> Self {
        self.cache_size_bytes = bytes;
        self
    }

    pub fn with_source_block_size(mut self, docs: usize) -> Self {
        self.source_block_size = docs.max(1);
        self
    }

    pub fn with_persist_retry(mut self, policy: RetryPolicy) -> Self {
        self.persist_retry = policy;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn with_tokenizer_config(mut self, config: TokenizerConfig) -> Self {
        self.tokenizer_config = config;
        self
    }
}

/// Bounded retry with exponential backoff for segment persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Tokenizer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub lowercase: bool,
    pub remove_stopwords: bool,
    pub stem: bool,
    pub min_token_length: usize,
    pub max_token_length: usize,
    pub language: String,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_stopwords: true,
            stem: true,
            min_token_length: 2,
            max_token_length: 50,
            language: "english".to_string(),
        }
    }
}
