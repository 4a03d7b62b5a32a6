//! MediaWiki-family client (self-hosted MediaWiki, Wikipedia, Fandom).
//!
//! All three speak the same `api.php` dialect; they differ only in where the API and the
//! human-readable pages live.

use guide_core::{BoxError, GuideConfig, WikiHit, WikiMode, WikiService, WikiSummary};
use scraper::Html;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WikiError {
    #[error("wiki request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("wiki returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("invalid wiki response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid wiki configuration: {0}")]
    Config(String),
}

/// Where the API and article pages of one wiki live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiEndpoint {
    /// Full `api.php` URL.
    pub api_url: String,
    /// Prefix that an encoded title is appended to.
    pub page_base: String,
}

impl WikiEndpoint {
    pub fn from_config(config: &GuideConfig) -> Result<Self, WikiError> {
        match config.wiki_mode {
            WikiMode::Wikipedia => {
                let lang = config.wiki_lang.trim();
                let lang = if lang.is_empty() { "en" } else { lang };
                Ok(Self {
                    api_url: format!("https://{}.wikipedia.org/w/api.php", lang),
                    page_base: format!("https://{}.wikipedia.org/wiki/", lang),
                })
            }
            WikiMode::Fandom => {
                let site = config.fandom_site.trim();
                let host = format!("{}.fandom.com", if site.is_empty() { "www" } else { site });
                Ok(Self {
                    api_url: format!("https://{}/api.php", host),
                    page_base: format!("https://{}/wiki/", host),
                })
            }
            WikiMode::Mediawiki => {
                let host = config.mw_host.trim().trim_end_matches('/');
                if host.is_empty() {
                    return Err(WikiError::Config("mw_host is empty".into()));
                }
                let scheme = if config.mw_https { "https" } else { "http" };
                let prefix = config.mw_path_prefix.trim().trim_matches('/');
                let root = if prefix.is_empty() {
                    format!("{}://{}/", scheme, host)
                } else {
                    format!("{}://{}/{}/", scheme, host, prefix)
                };
                Ok(Self {
                    api_url: format!("{}api.php", root),
                    page_base: format!("{}index.php/", root),
                })
            }
        }
    }

    /// Article URL: spaces become underscores, the rest is percent-encoded.
    pub fn page_url(&self, title: &str) -> String {
        format!(
            "{}{}",
            self.page_base,
            urlencoding::encode(&title.trim().replace(' ', "_"))
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: SearchQuery,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    title: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    query: ExtractQuery,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractQuery {
    /// Keyed by page id; missing pages come back with a negative id and no extract.
    #[serde(default)]
    pages: BTreeMap<String, ExtractPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractPage {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    extract: Option<String>,
}

/// Search snippets carry `<span class="searchmatch">` markup; keep the text only.
pub fn strip_html(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    let text: String = doc.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses a `list=search` response body into hits.
pub fn parse_search(endpoint: &WikiEndpoint, body: &str) -> Result<Vec<WikiHit>, WikiError> {
    let resp: SearchResponse = serde_json::from_str(body)?;
    Ok(resp
        .query
        .search
        .into_iter()
        .filter(|item| !item.title.trim().is_empty())
        .map(|item| WikiHit {
            url: endpoint.page_url(&item.title),
            snippet: strip_html(&item.snippet),
            title: item.title,
        })
        .collect())
}

/// Parses a `prop=extracts` response body. A page with no extract yields an empty summary.
pub fn parse_summary(endpoint: &WikiEndpoint, title: &str, body: &str) -> Result<WikiSummary, WikiError> {
    let resp: ExtractResponse = serde_json::from_str(body)?;
    let page = resp.query.pages.into_values().next();
    let (page_title, extract) = match page {
        Some(p) => (
            p.title.unwrap_or_else(|| title.to_string()),
            p.extract.unwrap_or_default(),
        ),
        None => (title.to_string(), String::new()),
    };
    Ok(WikiSummary {
        url: endpoint.page_url(title),
        title: page_title,
        extract: extract.trim().to_string(),
    })
}

/// HTTP client for one configured wiki.
pub struct WikiClient {
    client: reqwest::Client,
    endpoint: WikiEndpoint,
}

impl WikiClient {
    pub fn new(endpoint: WikiEndpoint, timeout: Duration) -> Result<Self, WikiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("guide-skills/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &GuideConfig) -> Result<Self, WikiError> {
        let endpoint = WikiEndpoint::from_config(config)?;
        tracing::info!(target: "guide::wiki", mode = ?config.wiki_mode, api = %endpoint.api_url, "wiki client ready");
        Self::new(endpoint, Duration::from_secs(config.wiki_timeout_secs))
    }

    pub fn endpoint(&self) -> &WikiEndpoint {
        &self.endpoint
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<String, WikiError> {
        let resp = self
            .client
            .get(&self.endpoint.api_url)
            .query(params)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(WikiError::Status {
                status: status.as_u16(),
                url: self.endpoint.api_url.clone(),
            });
        }
        Ok(resp.text().await?)
    }

    pub async fn search_pages(&self, query: &str, limit: usize) -> Result<Vec<WikiHit>, WikiError> {
        let limit = limit.max(1).to_string();
        let body = self
            .get(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", &limit),
                ("format", "json"),
            ])
            .await?;
        let hits = parse_search(&self.endpoint, &body)?;
        tracing::debug!(target: "guide::wiki", query, hits = hits.len(), "wiki search");
        Ok(hits)
    }

    pub async fn page_summary(&self, title: &str) -> Result<WikiSummary, WikiError> {
        let body = self
            .get(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("titles", title),
                ("format", "json"),
            ])
            .await?;
        parse_summary(&self.endpoint, title, &body)
    }
}

#[async_trait::async_trait]
impl WikiService for WikiClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<WikiHit>, BoxError> {
        Ok(self.search_pages(query, limit).await?)
    }

    async fn summary(&self, title: &str) -> Result<WikiSummary, BoxError> {
        Ok(self.page_summary(title).await?)
    }
}
