//! Keyword resolver: maps a noisy query onto one canonical term.
//!
//! Tiers are evaluated in order and the first tier with any candidate wins:
//!
//! | Tier            | Score            | Rule                                         |
//! |-----------------|------------------|----------------------------------------------|
//! | Exact           | 1.0              | normalized query is an index term            |
//! | Prefix/contains | 0.96 / 0.93 / 0.90 | term starts with query / query starts with term / containment |
//! | Fuzzy           | LCS ratio        | ratio >= threshold, best of bounded set      |

mod similarity;

pub use similarity::{lcs_len, ratio};

use crate::knowledge::{normalize, KnowledgeSource};
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.84;
pub const DEFAULT_FUZZY_CANDIDATES: usize = 5;

const SCORE_TERM_PREFIX: f64 = 0.96;
const SCORE_QUERY_PREFIX: f64 = 0.93;
const SCORE_CONTAINS: f64 = 0.90;

/// Which tier produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Prefix,
    Fuzzy,
    None,
}

/// Where an index term came from and what it resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub source: String,
    pub canonical: String,
}

/// Result of [`KeywordResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub canonical: Option<String>,
    pub source: String,
    pub matched_term: String,
    pub score: f64,
    pub tier: MatchTier,
}

impl Resolution {
    pub fn none() -> Self {
        Self {
            canonical: None,
            source: String::new(),
            matched_term: String::new(),
            score: 0.0,
            tier: MatchTier::None,
        }
    }

    fn hit(term: &str, entry: &IndexEntry, score: f64, tier: MatchTier) -> Self {
        Self {
            canonical: Some(entry.canonical.clone()),
            source: entry.source.clone(),
            matched_term: term.to_string(),
            score,
            tier,
        }
    }

    pub fn is_match(&self) -> bool {
        self.canonical.is_some()
    }
}

/// Keeps the running best; later candidates replace it only on a strictly greater score.
fn keep_best<'a>(
    best: Option<(&'a str, &'a IndexEntry, f64)>,
    candidate: (&'a str, &'a IndexEntry, f64),
) -> Option<(&'a str, &'a IndexEntry, f64)> {
    match best {
        Some(b) if b.2 >= candidate.2 => Some(b),
        _ => Some(candidate),
    }
}

fn prefix_score(term: &str, query: &str) -> Option<f64> {
    if term.starts_with(query) {
        Some(SCORE_TERM_PREFIX)
    } else if query.starts_with(term) {
        Some(SCORE_QUERY_PREFIX)
    } else if term.contains(query) || query.contains(term) {
        Some(SCORE_CONTAINS)
    } else {
        None
    }
}

/// Term index plus the layered matching policy.
#[derive(Debug, Clone)]
pub struct KeywordResolver {
    index: BTreeMap<String, IndexEntry>,
    fuzzy_threshold: f64,
    fuzzy_candidates: usize,
}

impl Default for KeywordResolver {
    fn default() -> Self {
        Self::new(DEFAULT_FUZZY_THRESHOLD, DEFAULT_FUZZY_CANDIDATES)
    }
}

impl KeywordResolver {
    pub fn new(fuzzy_threshold: f64, fuzzy_candidates: usize) -> Self {
        Self {
            index: BTreeMap::new(),
            fuzzy_threshold: fuzzy_threshold.clamp(0.0, 1.0),
            fuzzy_candidates: fuzzy_candidates.max(1),
        }
    }

    pub fn fuzzy_threshold(&self) -> f64 {
        self.fuzzy_threshold
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&self, term: &str) -> Option<&IndexEntry> {
        self.index.get(&normalize(term))
    }

    /// Rebuilds the index from scratch. Sources are applied in order; later ones win.
    pub fn rebuild(&mut self, sources: &[&dyn KnowledgeSource]) {
        let mut index = BTreeMap::new();
        for source in sources {
            let tag = source.name().to_string();
            for (term, canonical) in source.index_terms() {
                let term = normalize(&term);
                if term.is_empty() || canonical.trim().is_empty() {
                    continue;
                }
                index.insert(
                    term,
                    IndexEntry {
                        source: tag.clone(),
                        canonical,
                    },
                );
            }
        }
        self.index = index;
        tracing::debug!(target: "guide::resolver", terms = self.index.len(), sources = sources.len(), "resolver index rebuilt");
    }

    /// Rebuilds from a bare alias map and canonical term list.
    pub fn update(&mut self, aliases: &BTreeMap<String, String>, canonical_terms: &[String]) {
        let aliases = TermList {
            tag: "alias",
            terms: aliases.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        let canon = TermList {
            tag: "canon",
            terms: canonical_terms.iter().map(|t| (t.clone(), t.clone())).collect(),
        };
        self.rebuild(&[&aliases, &canon]);
    }

    /// Resolves `raw` to a canonical term.
    pub fn resolve(&self, raw: &str) -> Resolution {
        let q = normalize(raw);
        if q.is_empty() {
            return Resolution::none();
        }

        if let Some(entry) = self.index.get(&q) {
            return Resolution::hit(&q, entry, 1.0, MatchTier::Exact);
        }

        let prefix = self
            .index
            .iter()
            .filter_map(|(term, entry)| prefix_score(term, &q).map(|s| (term.as_str(), entry, s)))
            .fold(None, keep_best);
        if let Some((term, entry, score)) = prefix {
            return Resolution::hit(term, entry, score, MatchTier::Prefix);
        }

        let mut close: Vec<(&str, &IndexEntry, f64)> = self
            .index
            .iter()
            .map(|(term, entry)| (term.as_str(), entry, ratio(&q, term)))
            .filter(|(_, _, r)| *r >= self.fuzzy_threshold)
            .collect();
        close.sort_by(|a, b| b.2.total_cmp(&a.2));
        close.truncate(self.fuzzy_candidates);
        if let Some((term, entry, score)) = close.into_iter().fold(None, keep_best) {
            return Resolution::hit(term, entry, score, MatchTier::Fuzzy);
        }

        Resolution::none()
    }
}

/// Ad-hoc source used by [`KeywordResolver::update`].
struct TermList {
    tag: &'static str,
    terms: Vec<(String, String)>,
}

impl KnowledgeSource for TermList {
    fn name(&self) -> &str {
        self.tag
    }

    fn index_terms(&self) -> Vec<(String, String)> {
        self.terms.clone()
    }
}
