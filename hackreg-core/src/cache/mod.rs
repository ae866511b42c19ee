//! Result cache interface
//!
//! Caching is an optimization only. Every error coming out of a
//! [`CacheStore`] is logged by the engine and otherwise ignored.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::query::{QueryRequest, RawResult, Scalar};

pub use memory::MemoryCache;

/// Cache failure. Never reaches callers of the engine.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache operation failed: {0}")]
    Backend(String),
}

/// Key/value store for raw statement results.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<RawResult>>, CacheError>;

    async fn set(&self, key: CacheKey, value: Arc<RawResult>) -> Result<(), CacheError>;
}

/// Separator between joined parameters, so `["1", "23"]` and `["12", "3"]`
/// produce different keys.
const PARAM_SEPARATOR: char = '\u{1f}';

/// Cache key: the statement followed by its joined parameters.
///
/// Identical statement and parameters always produce the same key. Nothing
/// invalidates a key when a write touches the underlying rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(statement: &str, parameters: &[Scalar]) -> Self {
        let mut key = String::from(statement);
        for param in parameters {
            key.push(PARAM_SEPARATOR);
            key.push_str(&param.to_string());
        }
        Self(key)
    }

    pub fn for_request(request: &QueryRequest) -> Self {
        Self::new(&request.statement, &request.parameters)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.replace(PARAM_SEPARATOR, "|"))
    }
}
