//! Query orchestration: resolver → content pack → keyword KB → wiki.
//!
//! The library sits behind a reader/writer lock. Queries hold the read guard only for the
//! synchronous local lookup and release it before any wiki call; mutations hold the write
//! guard across "mutate + rebuild index", so a query sees either the old or the new index.

use crate::error::{BoxError, Result};
use crate::knowledge::{normalize, Library, LibraryStatus, LocalHit, OutputUnit, PackLoadReport};
use crate::resolver::Resolution;
use crate::shared::GuideConfig;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One search hit from the external wiki.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Intro extract of a wiki page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiSummary {
    pub title: String,
    pub extract: String,
    pub url: String,
}

/// External wiki collaborator. Implementations own their network timeouts.
#[async_trait::async_trait]
pub trait WikiService: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<WikiHit>, BoxError>;

    async fn summary(&self, title: &str) -> Result<WikiSummary, BoxError>;
}

/// What a query produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    /// Content pack entry. Terminal: no other source is consulted.
    Pack { key: String, units: Vec<OutputUnit> },
    /// Keyword KB entry.
    Kb { key: String, units: Vec<OutputUnit> },
    /// Wiki page summary (extract already truncated).
    Wiki { title: String, summary: String, url: String },
    /// No local entry and the wiki returned nothing.
    NotFound { query: String },
    /// The wiki call failed.
    Failed { message: String },
    /// Query was blank after normalization.
    EmptyQuery,
}

impl From<LocalHit> for Answer {
    fn from(hit: LocalHit) -> Self {
        match hit {
            LocalHit::Pack { key, units } => Answer::Pack { key, units },
            LocalHit::Kb { key, units } => Answer::Kb { key, units },
        }
    }
}

/// Answer plus the resolver's view of the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub resolution: Resolution,
    pub answer: Answer,
}

/// First `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Answers queries against the library, falling back to the wiki.
pub struct Orchestrator {
    library: RwLock<Library>,
    wiki: Arc<dyn WikiService>,
    wiki_limit: usize,
    summary_max_chars: usize,
}

impl Orchestrator {
    pub fn new(library: Library, wiki: Arc<dyn WikiService>) -> Self {
        let defaults = GuideConfig::default();
        Self {
            library: RwLock::new(library),
            wiki,
            wiki_limit: defaults.wiki_limit,
            summary_max_chars: defaults.summary_max_chars,
        }
    }

    /// Loads the library from `config` and applies its wiki limits.
    pub fn from_config(config: &GuideConfig, wiki: Arc<dyn WikiService>) -> (Self, PackLoadReport) {
        let (library, report) = Library::open(config);
        let orchestrator = Self::new(library, wiki).with_limits(config.wiki_limit, config.summary_max_chars);
        (orchestrator, report)
    }

    pub fn with_limits(mut self, wiki_limit: usize, summary_max_chars: usize) -> Self {
        self.wiki_limit = wiki_limit.max(1);
        self.summary_max_chars = summary_max_chars;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Library> {
        self.library.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Library> {
        self.library.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Full query: pack → KB → wiki (direct title first, then search).
    pub async fn answer(&self, raw: &str) -> QueryResponse {
        let query = raw.trim().to_string();
        if normalize(&query).is_empty() {
            return QueryResponse {
                query,
                resolution: Resolution::none(),
                answer: Answer::EmptyQuery,
            };
        }

        let (resolution, canonical, local, direct_title) = {
            let lib = self.read();
            let (resolution, canonical) = lib.canonical_for(&query);
            let local = lib.lookup_local(&query, &canonical);
            let direct_title = match local {
                Some(_) => None,
                None => lib.wiki_title_for(&query, &resolution, &canonical),
            };
            (resolution, canonical, local, direct_title)
        };

        if let Some(hit) = local {
            tracing::debug!(target: "guide::orchestrator", query = %query, canonical = %canonical, tier = ?resolution.tier, "local hit");
            return QueryResponse {
                query,
                resolution,
                answer: hit.into(),
            };
        }

        let answer = self.ask_wiki(direct_title, &canonical).await;
        QueryResponse {
            query,
            resolution,
            answer,
        }
    }

    /// Pack and KB only; never calls the wiki.
    pub fn answer_local(&self, raw: &str) -> QueryResponse {
        let query = raw.trim().to_string();
        if normalize(&query).is_empty() {
            return QueryResponse {
                query,
                resolution: Resolution::none(),
                answer: Answer::EmptyQuery,
            };
        }
        let lib = self.read();
        let (resolution, canonical) = lib.canonical_for(&query);
        let answer = match lib.lookup_local(&query, &canonical) {
            Some(hit) => hit.into(),
            None => Answer::NotFound {
                query: query.clone(),
            },
        };
        QueryResponse {
            query,
            resolution,
            answer,
        }
    }

    /// Wiki only: direct title mapping if registered, otherwise a search for the raw query.
    pub async fn wiki_lookup(&self, raw: &str) -> QueryResponse {
        let query = raw.trim().to_string();
        if normalize(&query).is_empty() {
            return QueryResponse {
                query,
                resolution: Resolution::none(),
                answer: Answer::EmptyQuery,
            };
        }
        let (resolution, direct_title) = {
            let lib = self.read();
            let (resolution, canonical) = lib.canonical_for(&query);
            let title = lib.wiki_title_for(&query, &resolution, &canonical);
            (resolution, title)
        };
        let answer = self.ask_wiki(direct_title, &query).await;
        QueryResponse {
            query,
            resolution,
            answer,
        }
    }

    async fn ask_wiki(&self, direct_title: Option<String>, search_query: &str) -> Answer {
        let title = match direct_title {
            Some(title) => title,
            None => match self.wiki.search(search_query, self.wiki_limit).await {
                Ok(hits) => match hits.into_iter().next() {
                    Some(hit) => hit.title,
                    None => {
                        return Answer::NotFound {
                            query: search_query.to_string(),
                        }
                    }
                },
                Err(e) => {
                    tracing::warn!(target: "guide::orchestrator", query = search_query, error = %e, "wiki search failed");
                    return Answer::Failed {
                        message: format!("wiki search failed: {}", e),
                    };
                }
            },
        };

        match self.wiki.summary(&title).await {
            Ok(summary) => Answer::Wiki {
                title: summary.title,
                summary: truncate_chars(summary.extract.trim(), self.summary_max_chars),
                url: summary.url,
            },
            Err(e) => {
                tracing::warn!(target: "guide::orchestrator", title = %title, error = %e, "wiki summary failed");
                Answer::Failed {
                    message: format!("wiki summary failed: {}", e),
                }
            }
        }
    }

    pub fn resolve(&self, raw: &str) -> Resolution {
        self.read().resolver().resolve(raw)
    }

    pub fn add_alias(&self, alias: &str, target: &str) -> Result<()> {
        self.write().add_alias(alias, target)
    }

    pub fn remove_alias(&self, alias: &str) -> Result<bool> {
        self.write().remove_alias(alias)
    }

    pub fn reload_pack(&self) -> PackLoadReport {
        self.write().reload_pack()
    }

    pub fn reload_all(&self) -> PackLoadReport {
        self.write().reload_all()
    }

    pub fn list_keys(&self, prefix: &str) -> Vec<String> {
        self.read().list_keys(prefix)
    }

    pub fn status(&self) -> LibraryStatus {
        self.read().status()
    }
}
