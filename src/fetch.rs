//! Page fetching and paragraph text extraction.
//!
//! [`HttpFetcher`] issues a GET with a browser-like user agent and a fixed
//! timeout, then strips the response down to the text of its
//! paragraph-level elements. Every failure mode (network, timeout, non-2xx
//! status, nothing readable) is reported as a [`FetchError`] carrying the
//! URL; the processing pipeline skips failed URLs and keeps going.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Capability for turning a URL into readable text. Injected into the
/// processing pipeline so tests can substitute a fake without network
/// access.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Real fetcher backed by `reqwest` + `scraper`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        let text = extract_paragraph_text(&body);
        if text.is_empty() {
            return Err(FetchError::NoReadableContent {
                url: url.to_string(),
            });
        }

        Ok(text)
    }
}

/// Concatenate the text content of every `<p>` element, one paragraph per
/// line. Returns an empty string when the document has no paragraph text.
pub fn extract_paragraph_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = Selector::parse("p").expect("static selector");

    let paragraphs: Vec<String> = document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    paragraphs.join("\n")
}
