// Document source: fetches one Wikipedia article per topic through the
// MediaWiki action API


use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::SourceConfig;
use crate::provider::RetryPolicy;

const API_PATH: &str = "/w/api.php";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// A fetched article
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    /// Canonical article URL, used as the document identifier
    pub source: String,
    /// Lead section of the article
    pub summary: String,
    /// Plain-text article body
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    fullurl: Option<String>,
    #[serde(default)]
    missing: bool,
}

/// Blocking MediaWiki client
#[derive(Debug, Clone)]
pub struct WikipediaClient {
    base_url: Url,
    agent: ureq::Agent,
    retry: RetryPolicy,
    max_content_chars: usize,
}

impl WikipediaClient {
    #[inline]
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let base_url = config
            .wikipedia_url()
            .context("Failed to parse Wikipedia URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .user_agent(&config.user_agent)
            .build()
            .into();

        Ok(Self {
            base_url,
            agent,
            retry: RetryPolicy::default(),
            max_content_chars: config.max_content_chars,
        })
    }

    #[inline]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Search for `topic` and load the best matching article.
    ///
    /// Returns `Ok(None)` for a blank topic (without touching the network)
    /// and when the search has no hit.
    #[inline]
    pub fn fetch_document(&self, topic: &str) -> Result<Option<Document>> {
        let topic = topic.trim();
        if topic.is_empty() {
            debug!("Blank topic, skipping Wikipedia lookup");
            return Ok(None);
        }

        let url = self.search_url(topic)?;
        debug!("Fetching Wikipedia article for '{}' from {}", topic, url);

        let response_text = self
            .retry
            .run(self.base_url.as_str(), || {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .with_context(|| format!("Failed to query Wikipedia for '{topic}'"))?;

        let response: QueryResponse = serde_json::from_str(&response_text)
            .context("Failed to parse Wikipedia response")?;

        let Some(page) = response
            .query
            .and_then(|q| q.pages.into_iter().find(|p| !p.missing))
        else {
            info!("No Wikipedia article found for '{}'", topic);
            return Ok(None);
        };

        let document = self.build_document(page);
        info!(
            "Loaded '{}' ({} chars) from {}",
            document.title,
            document.content.chars().count(),
            document.source
        );
        Ok(Some(document))
    }

    fn search_url(&self, topic: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(API_PATH)
            .context("Failed to build Wikipedia API URL")?;

        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("format", "json")
            .append_pair("formatversion", "2")
            .append_pair("generator", "search")
            .append_pair("gsrsearch", topic)
            .append_pair("gsrlimit", "1")
            .append_pair("gsrnamespace", "0")
            .append_pair("prop", "extracts|info")
            .append_pair("explaintext", "1")
            .append_pair("inprop", "url")
            .append_pair("redirects", "1");

        Ok(url)
    }

    fn build_document(&self, page: Page) -> Document {
        let extract = page.extract.unwrap_or_default();
        let summary = lead_section(&extract).to_string();

        let content = if self.max_content_chars > 0 {
            extract.chars().take(self.max_content_chars).collect()
        } else {
            extract
        };

        let source = page.fullurl.unwrap_or_else(|| self.article_url(&page.title));

        Document {
            title: page.title,
            source,
            summary,
            content,
        }
    }

    fn article_url(&self, title: &str) -> String {
        let slug = title.replace(' ', "_");
        let mut url = self.base_url.clone();
        url.set_path(&format!("/wiki/{slug}"));
        url.to_string()
    }
}

/// Text before the first section heading (`== Heading ==`)
fn lead_section(extract: &str) -> &str {
    extract
        .find("\n==")
        .map_or(extract, |end| &extract[..end])
        .trim()
}
