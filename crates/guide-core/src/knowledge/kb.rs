//! Secondary keyword KB: a flat `key -> {answer, image}` map with its own aliases.
//!
//! File shape: `{"aliases": {"alias": "key"}, "entries": {"key": {"answer": "..", "image": ".."}}}`.

use super::normalize::normalize;
use super::pack::OutputUnit;
use super::KnowledgeSource;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// `null` reads as an empty string.
fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// One KB answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KbEntry {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Entries stay raw so one bad entry is skipped instead of emptying the whole KB.
#[derive(Debug, Default, Deserialize)]
struct KbFile {
    #[serde(default)]
    aliases: BTreeMap<String, Option<String>>,
    #[serde(default)]
    entries: BTreeMap<String, serde_json::Value>,
}

/// Keyword KB loaded from a JSON file.
pub struct KeywordKb {
    path: PathBuf,
    image_dir: PathBuf,
    alias: HashMap<String, String>,
    /// normalized key -> (original key, entry)
    entries: HashMap<String, (String, KbEntry)>,
}

impl KeywordKb {
    /// Loads the KB at `path`; relative images resolve under `image_dir`.
    pub fn open_path(path: impl Into<PathBuf>, image_dir: impl Into<PathBuf>) -> Self {
        let mut kb = Self {
            path: path.into(),
            image_dir: image_dir.into(),
            alias: HashMap::new(),
            entries: HashMap::new(),
        };
        kb.reload();
        kb
    }

    pub fn reload(&mut self) {
        let file = match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str::<KbFile>(&text).unwrap_or_else(|e| {
                tracing::warn!(target: "guide::kb", path = %self.path.display(), error = %e, "KB file is not valid JSON; KB is empty");
                KbFile::default()
            }),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(target: "guide::kb", path = %self.path.display(), error = %e, "KB file unreadable; KB is empty");
                }
                KbFile::default()
            }
        };
        self.alias = file
            .aliases
            .into_iter()
            .filter_map(|(k, v)| Some((normalize(&k), normalize(&v?))))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();
        let path = &self.path;
        self.entries = file
            .entries
            .into_iter()
            .filter_map(|(k, raw)| match serde_json::from_value::<KbEntry>(raw) {
                Ok(entry) => Some((normalize(&k), (k, entry))),
                Err(e) => {
                    tracing::warn!(target: "guide::kb", path = %path.display(), key = %k, error = %e, "KB entry skipped");
                    None
                }
            })
            .filter(|(k, _)| !k.is_empty())
            .collect();
        tracing::debug!(target: "guide::kb", entries = self.entries.len(), aliases = self.alias.len(), "keyword KB loaded");
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up `term` through the alias map, falling back to the term itself.
    /// Returns the original key and its entry.
    pub fn lookup(&self, term: &str) -> Option<(&str, &KbEntry)> {
        let k = normalize(term);
        if k.is_empty() {
            return None;
        }
        let key = self.alias.get(&k).unwrap_or(&k);
        self.entries
            .get(key)
            .map(|(original, entry)| (original.as_str(), entry))
    }

    fn resolve_image(&self, img: &str) -> Option<PathBuf> {
        let path = Path::new(img);
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.image_dir.join(path)
        };
        candidate.exists().then_some(candidate)
    }

    /// Output units for an entry: the answer text, then its image if any.
    pub fn render(&self, entry: &KbEntry) -> Vec<OutputUnit> {
        let mut out = Vec::new();
        let answer = entry.answer.trim();
        if !answer.is_empty() {
            out.push(OutputUnit::Text(answer.to_string()));
        }
        let img = entry.image.as_deref().map(str::trim).unwrap_or("");
        if img.is_empty() {
            return out;
        }
        let lower = img.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            out.push(OutputUnit::RemoteImage(img.to_string()));
        } else if let Some(path) = self.resolve_image(img) {
            out.push(OutputUnit::LocalImage(path));
        } else {
            tracing::warn!(target: "guide::kb", img, "KB image not found");
            out.push(OutputUnit::Text(format!("[notice] local image not found: {}", img)));
        }
        out
    }
}

impl KnowledgeSource for KeywordKb {
    fn name(&self) -> &str {
        "kb"
    }

    fn index_terms(&self) -> Vec<(String, String)> {
        let mut terms: Vec<(String, String)> = self
            .entries
            .iter()
            .map(|(k, (original, _))| (k.clone(), original.clone()))
            .collect();
        terms.extend(self.alias.iter().filter_map(|(a, key)| {
            self.entries
                .get(key)
                .map(|(original, _)| (a.clone(), original.clone()))
        }));
        terms
    }
}
