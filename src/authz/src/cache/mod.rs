//! Evaluation caching
//!
//! The engine never talks to a cache backend directly: it goes through
//! [`EvaluationCache`], which owns key layout, TTLs, JSON encoding and the
//! role dependency index used for invalidation. Backends implement the small
//! [`CacheService`] trait so a shared cache can replace [`InMemoryCache`].

pub mod evaluation;
pub mod memory;

pub use evaluation::EvaluationCache;
pub use memory::{CacheStats, InMemoryCache};

use crate::error::{AuthzError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;

/// Key-value cache with TTLs and glob key listing
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Live keys matching a glob where `*` matches any run of characters
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Compile a `*` glob into an anchored regex; every other character is literal
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", body))
        .map_err(|e| AuthzError::Cache(format!("invalid key pattern {:?}: {}", pattern, e)))
}
