//! [`BookSource`] backed by the Google Books volumes API.

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::params::{SearchQuery, VolumeId};
use crate::source::BookSource;
use crate::types::{Book, SearchResults};
use crate::GatewayError;

/// HTTP client for `GET /volumes` and `GET /volumes/{id}`.
#[derive(Debug, Clone)]
pub struct GoogleBooksClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl GoogleBooksClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, GatewayError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            GatewayError::Validation(format!("invalid base_url '{}': {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Validation(format!(
                "base_url '{}' cannot carry a path",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// `base_url` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let mut request = self.http.get(url).query(query);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = provider_message(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "request failed".to_string());
            return Err(GatewayError::from_status(status.as_u16(), message));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl BookSource for GoogleBooksClient {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResults, GatewayError> {
        let url = self.endpoint(&["volumes"]);
        let params = [
            ("q", query.query().to_string()),
            ("maxResults", query.max_results().to_string()),
            ("printType", "books".to_string()),
        ];

        let list: VolumeList = self.get_json(url, &params).await?;
        Ok(list.into())
    }

    async fn volume(&self, id: &VolumeId) -> Result<Book, GatewayError> {
        let url = self.endpoint(&["volumes", id.as_str()]);
        let volume: Volume = self.get_json(url, &[]).await?;
        Ok(volume.into())
    }
}

/// Pull `error.message` out of a provider error body, if it has one.
fn provider_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Envelope {
        error: ErrorBody,
    }
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_str::<Envelope>(body)
        .ok()
        .map(|envelope| envelope.error.message)
        .filter(|message| !message.is_empty())
}

// --- Wire format ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeList {
    #[serde(default)]
    total_items: u32,
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    id: String,
    #[serde(default)]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VolumeInfo {
    title: Option<String>,
    subtitle: Option<String>,
    authors: Vec<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    description: Option<String>,
    page_count: Option<u32>,
    categories: Vec<String>,
    industry_identifiers: Vec<IndustryIdentifier>,
    image_links: Option<ImageLinks>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageLinks {
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

impl From<VolumeList> for SearchResults {
    fn from(list: VolumeList) -> Self {
        Self {
            total_items: list.total_items,
            items: list.items.into_iter().map(Book::from).collect(),
        }
    }
}

impl From<Volume> for Book {
    fn from(volume: Volume) -> Self {
        let info = volume.volume_info;
        let isbn = |kind: &str| {
            info.industry_identifiers
                .iter()
                .find(|ident| ident.kind == kind)
                .map(|ident| ident.identifier.clone())
        };
        let isbn_10 = isbn("ISBN_10");
        let isbn_13 = isbn("ISBN_13");

        // The API hands out plain-http image links.
        let thumbnail = info
            .image_links
            .and_then(|links| links.thumbnail.or(links.small_thumbnail))
            .map(|link| match link.strip_prefix("http://") {
                Some(rest) => format!("https://{rest}"),
                None => link,
            });

        Book {
            id: volume.id,
            title: info.title.unwrap_or_else(|| "Untitled".to_string()),
            subtitle: info.subtitle,
            authors: info.authors,
            publisher: info.publisher,
            published_date: info.published_date,
            description: info.description,
            page_count: info.page_count,
            categories: info.categories,
            isbn_10,
            isbn_13,
            thumbnail,
            language: info.language,
        }
    }
}
