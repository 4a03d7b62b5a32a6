//! Alias catalog backed by a JSON file (`{"aliases": {...}, "wiki": {...}}`).
//!
//! Keys are stored normalized, targets trimmed. Every add/remove rewrites the file wholesale.

use super::normalize::normalize;
use super::KnowledgeSource;
use crate::error::{GuideError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// On-disk shape of the alias storage file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasFile {
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Term → external wiki page title.
    #[serde(default)]
    pub wiki: BTreeMap<String, String>,
}

impl AliasFile {
    fn normalized(self) -> Self {
        let fold = |m: BTreeMap<String, String>| {
            m.into_iter()
                .map(|(k, v)| (normalize(&k), v.trim().to_string()))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .collect()
        };
        Self {
            aliases: fold(self.aliases),
            wiki: fold(self.wiki),
        }
    }
}

/// Alias → canonical term map plus the direct wiki title map.
pub struct AliasCatalog {
    path: PathBuf,
    data: AliasFile,
    /// Set when the backing file exists but could not be loaded; blocks saves over it.
    load_error: Option<String>,
}

impl AliasCatalog {
    /// Loads the catalog from `path`. A missing file is an empty catalog; an unparsable one
    /// is logged and treated as empty, and mutations are refused until a clean reload.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let (data, load_error) = Self::read(&path);
        Self {
            path,
            data,
            load_error,
        }
    }

    /// In-memory catalog that is never read from disk (saves still target `path`).
    pub fn from_file(path: impl Into<PathBuf>, file: AliasFile) -> Self {
        Self {
            path: path.into(),
            data: file.normalized(),
            load_error: None,
        }
    }

    fn read(path: &Path) -> (AliasFile, Option<String>) {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return (AliasFile::default(), None),
            Err(e) => {
                tracing::warn!(target: "guide::catalog", path = %path.display(), error = %e, "alias file unreadable; starting empty, saves disabled");
                return (AliasFile::default(), Some(e.to_string()));
            }
        };
        match serde_json::from_str::<AliasFile>(&text) {
            Ok(file) => (file.normalized(), None),
            Err(e) => {
                tracing::warn!(target: "guide::catalog", path = %path.display(), error = %e, "alias file is not valid JSON; starting empty, saves disabled");
                (AliasFile::default(), Some(e.to_string()))
            }
        }
    }

    /// Whether the backing file failed to load (mutations are refused while set).
    pub fn is_degraded(&self) -> bool {
        self.load_error.is_some()
    }

    fn ensure_writable(&self) -> Result<()> {
        match &self.load_error {
            Some(reason) => Err(GuideError::StoreUnreadable {
                path: self.path.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves `term` through the alias map, falling back to the trimmed term itself.
    pub fn resolve_alias(&self, term: &str) -> String {
        self.data
            .aliases
            .get(&normalize(term))
            .cloned()
            .unwrap_or_else(|| term.trim().to_string())
    }

    /// Direct wiki title registered for `term`, if any.
    pub fn wiki_title(&self, term: &str) -> Option<&str> {
        self.data.wiki.get(&normalize(term)).map(String::as_str)
    }

    /// Normalized alias → target map.
    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.data.aliases
    }

    pub fn len(&self) -> usize {
        self.data.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.aliases.is_empty()
    }

    /// Stores `normalize(alias) -> trim(target)` and persists.
    ///
    /// The in-memory map keeps the alias even if the save fails; the error is returned.
    /// Refused without any change while the backing file is unparsable.
    pub fn add_alias(&mut self, alias: &str, target: &str) -> Result<()> {
        self.ensure_writable()?;
        let key = normalize(alias);
        let target = target.trim();
        if key.is_empty() || target.is_empty() {
            return Err(GuideError::InvalidAlias(format!(
                "alias and target must be non-empty (alias={:?}, target={:?})",
                alias, target
            )));
        }
        let prev = self.data.aliases.insert(key.clone(), target.to_string());
        tracing::info!(
            target: "guide::catalog",
            alias = %key,
            target_term = target,
            action = if prev.is_some() { "UPDATE" } else { "INSERT" },
            "alias '{}' -> '{}'",
            key,
            target
        );
        self.save()
    }

    /// Removes the alias (by normalized key) and persists. Returns whether it existed.
    pub fn remove_alias(&mut self, alias: &str) -> Result<bool> {
        self.ensure_writable()?;
        let key = normalize(alias);
        if self.data.aliases.remove(&key).is_none() {
            return Ok(false);
        }
        tracing::info!(target: "guide::catalog", alias = %key, action = "REMOVE", "alias '{}' removed", key);
        self.save()?;
        Ok(true)
    }

    /// Discards in-memory state and re-reads the backing file.
    pub fn reload(&mut self) {
        let (data, load_error) = Self::read(&self.path);
        self.data = data;
        self.load_error = load_error;
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| GuideError::io(parent, e))?;
        }
        let text = serde_json::to_string_pretty(&self.data)
            .map_err(|e| GuideError::json(&self.path, e))?;
        std::fs::write(&self.path, text).map_err(|e| GuideError::io(&self.path, e))
    }

    /// View over the wiki title map, registered in the index under the `wiki` tag.
    pub fn wiki_titles(&self) -> WikiTitles<'_> {
        WikiTitles(self)
    }
}

impl KnowledgeSource for AliasCatalog {
    fn name(&self) -> &str {
        "alias"
    }

    fn index_terms(&self) -> Vec<(String, String)> {
        self.data
            .aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Index view over [`AliasCatalog`]'s wiki title map.
pub struct WikiTitles<'a>(&'a AliasCatalog);

impl KnowledgeSource for WikiTitles<'_> {
    fn name(&self) -> &str {
        "wiki"
    }

    fn index_terms(&self) -> Vec<(String, String)> {
        self.0
            .data
            .wiki
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_catalog(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join("aliases.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn resolve_alias_falls_back_to_trimmed_term() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = AliasCatalog::open_path(dir.path().join("missing.json"));
        assert!(catalog.is_empty());
        assert_eq!(catalog.resolve_alias("xyz"), "xyz");
        assert_eq!(catalog.resolve_alias("  Mixed Case  "), "Mixed Case");
    }

    #[test]
    fn loads_and_normalizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(
            dir.path(),
            r#"{"aliases": {"  水 壶 ": " Waterskin "}, "wiki": {"Ｆｏｒｔ": "Fortress"}}"#,
        );
        let catalog = AliasCatalog::open_path(&path);
        assert_eq!(catalog.resolve_alias("水 壶"), "Waterskin");
        assert_eq!(catalog.wiki_title("fort"), Some("Fortress"));
        assert_eq!(catalog.wiki_titles().index_terms(), vec![("fort".to_string(), "Fortress".to_string())]);
    }

    #[test]
    fn add_and_remove_persist_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("aliases.json");
        let mut catalog = AliasCatalog::open_path(&path);

        catalog.add_alias("Skin", "  waterskin ").unwrap();
        let reopened = AliasCatalog::open_path(&path);
        assert_eq!(reopened.resolve_alias("SKIN"), "waterskin");

        assert!(catalog.remove_alias(" skin ").unwrap());
        assert!(!catalog.remove_alias("skin").unwrap());
        let reopened = AliasCatalog::open_path(&path);
        assert_eq!(reopened.resolve_alias("skin"), "skin");
    }

    #[test]
    fn add_alias_rejects_empty_terms() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = AliasCatalog::open_path(dir.path().join("a.json"));
        assert!(matches!(catalog.add_alias("  ", "x"), Err(GuideError::InvalidAlias(_))));
        assert!(matches!(catalog.add_alias("x", ""), Err(GuideError::InvalidAlias(_))));
    }

    #[test]
    fn malformed_file_is_empty_and_reload_rereads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(dir.path(), "{not json");
        let mut catalog = AliasCatalog::open_path(&path);
        assert!(catalog.is_empty());

        std::fs::write(&path, r#"{"aliases": {"a": "b"}}"#).unwrap();
        catalog.reload();
        assert_eq!(catalog.resolve_alias("a"), "b");
        assert!(!catalog.is_degraded());
    }

    #[test]
    fn unparsable_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let broken = r#"{"aliases": {"a": "A", "b": "B", "c": "C",}}"#;
        let path = write_catalog(dir.path(), broken);
        let mut catalog = AliasCatalog::open_path(&path);
        assert!(catalog.is_degraded());

        assert!(matches!(
            catalog.add_alias("d", "D"),
            Err(GuideError::StoreUnreadable { .. })
        ));
        assert!(matches!(
            catalog.remove_alias("a"),
            Err(GuideError::StoreUnreadable { .. })
        ));
        assert_eq!(catalog.resolve_alias("d"), "d");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), broken);

        // Once the file is repaired, edits go through and keep the existing entries.
        std::fs::write(&path, r#"{"aliases": {"a": "A", "b": "B", "c": "C"}}"#).unwrap();
        catalog.reload();
        catalog.add_alias("d", "D").unwrap();
        let reopened = AliasCatalog::open_path(&path);
        assert_eq!(reopened.len(), 4);
        assert_eq!(reopened.resolve_alias("a"), "A");
    }
}
