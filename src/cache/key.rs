//! Canonical cache keys
//!
//! Two lookups that mean the same thing must land on the same key:
//! query text is trimmed, lowercased and whitespace-collapsed, filters are
//! rendered as sorted, type-tagged `key=value` pairs.

use std::fmt;

use crate::types::Filters;

/// Canonical form of `(query_text, top_k, filter_set)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    top_k: usize,
    filters: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(query: &str, top_k: usize, filters: &Filters) -> Self {
        Self {
            query: normalize_query(query),
            top_k,
            // BTreeMap iteration is already sorted by key
            filters: filters
                .iter()
                .map(|(k, v)| (k.clone(), v.canonical()))
                .collect(),
        }
    }

    /// Normalized query text
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|k={}", self.query, self.top_k)?;
        for (k, v) in &self.filters {
            write!(f, "|{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Trim, lowercase and collapse runs of whitespace
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
