use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single volume as returned by the metadata provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Provider-assigned volume identifier.
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Free-form date string (`"1965"`, `"1965-08"`, `"1965-08-01"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn_10: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn_13: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Book {
    /// Minimal record, mostly useful for tests and fixtures.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subtitle: None,
            authors: Vec::new(),
            publisher: None,
            published_date: None,
            description: None,
            page_count: None,
            categories: Vec::new(),
            isbn_10: None,
            isbn_13: None,
            thumbnail: None,
            language: None,
        }
    }

    pub fn with_authors<I, A>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }
}

/// One page of search hits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Total matches the provider reports, not just this page.
    pub total_items: u32,
    pub items: Vec<Book>,
}

/// What the response cache stores. Values are reference counted so a hit is
/// a pointer copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Search(Arc<SearchResults>),
    Volume(Arc<Book>),
}

impl Payload {
    pub fn into_search(self) -> Option<Arc<SearchResults>> {
        match self {
            Payload::Search(results) => Some(results),
            Payload::Volume(_) => None,
        }
    }

    pub fn into_volume(self) -> Option<Arc<Book>> {
        match self {
            Payload::Volume(book) => Some(book),
            Payload::Search(_) => None,
        }
    }
}
