//! Call parameter normalization and cache keys.
//!
//! Sloppy-but-harmless input (stray whitespace, an oversized query, a result
//! count of 500) is clamped into range. Input that leaves nothing to send
//! upstream is a [`GatewayError::Validation`].

use std::fmt;

use crate::GatewayError;

pub const MAX_QUERY_CHARS: usize = 100;
pub const MAX_ID_CHARS: usize = 50;
pub const MIN_RESULTS: u32 = 1;
pub const MAX_RESULTS: u32 = 40;

/// Trim, cap at `max_chars` characters, trim again.
fn clamp_text(raw: &str, max_chars: usize) -> String {
    let capped: String = raw.trim().chars().take(max_chars).collect();
    capped.trim_end().to_string()
}

/// A normalized search request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    query: String,
    max_results: u32,
}

impl SearchQuery {
    pub fn new(query: &str, max_results: i64) -> Result<Self, GatewayError> {
        let query = clamp_text(query, MAX_QUERY_CHARS);
        if query.is_empty() {
            return Err(GatewayError::Validation("search query is empty".into()));
        }

        let max_results = max_results.clamp(MIN_RESULTS as i64, MAX_RESULTS as i64) as u32;
        Ok(Self { query, max_results })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }

    pub fn cache_key(&self) -> String {
        format!("search:{}:{}", self.query, self.max_results)
    }
}

/// A normalized volume identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeId(String);

impl VolumeId {
    pub fn new(id: &str) -> Result<Self, GatewayError> {
        let id = clamp_text(id, MAX_ID_CHARS);
        if id.is_empty() {
            return Err(GatewayError::Validation("volume id is empty".into()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn cache_key(&self) -> String {
        format!("volume:{}", self.0)
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
