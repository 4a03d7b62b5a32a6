//! Single owner of the alias catalog, content pack, keyword KB and resolver index.
//!
//! Every mutating operation rebuilds the resolver index before it returns, so the index never
//! lags behind its sources.

use super::catalog::AliasCatalog;
use super::kb::KeywordKb;
use super::pack::{ContentPack, OutputUnit, PackLoadReport};
use super::normalize::normalize;
use crate::error::Result;
use crate::resolver::{KeywordResolver, Resolution};
use crate::shared::GuideConfig;
use serde::Serialize;
use std::path::PathBuf;

/// A local (pack or KB) answer, already rendered to output units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LocalHit {
    Pack { key: String, units: Vec<OutputUnit> },
    Kb { key: String, units: Vec<OutputUnit> },
}

/// Counts reported by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryStatus {
    pub pack_dir: PathBuf,
    pub pack_entries: usize,
    pub kb_entries: usize,
    pub aliases: usize,
    pub index_terms: usize,
    pub fuzzy_threshold: f64,
}

pub struct Library {
    catalog: AliasCatalog,
    pack: ContentPack,
    kb: KeywordKb,
    resolver: KeywordResolver,
}

impl Library {
    /// Assembles a library from already-loaded parts and builds the index.
    pub fn new(
        catalog: AliasCatalog,
        pack: ContentPack,
        kb: KeywordKb,
        resolver: KeywordResolver,
    ) -> Self {
        let mut lib = Self {
            catalog,
            pack,
            kb,
            resolver,
        };
        lib.rebuild_index();
        lib
    }

    /// Loads every source named by `config`.
    pub fn open(config: &GuideConfig) -> (Self, PackLoadReport) {
        let catalog = AliasCatalog::open_path(&config.alias_path);
        let (pack, report) = ContentPack::open_path(&config.pack_dir);
        let kb = KeywordKb::open_path(&config.kb_path, &config.kb_image_dir);
        let resolver = KeywordResolver::new(config.fuzzy_threshold, config.fuzzy_candidates);
        (Self::new(catalog, pack, kb, resolver), report)
    }

    /// Full index rebuild. Registration order (later wins): wiki titles, KB, aliases, pack.
    pub fn rebuild_index(&mut self) {
        let wiki = self.catalog.wiki_titles();
        self.resolver
            .rebuild(&[&wiki, &self.kb, &self.catalog, &self.pack]);
        tracing::info!(target: "guide::library", terms = self.resolver.len(), "keyword index rebuilt");
    }

    pub fn catalog(&self) -> &AliasCatalog {
        &self.catalog
    }

    pub fn pack(&self) -> &ContentPack {
        &self.pack
    }

    pub fn kb(&self) -> &KeywordKb {
        &self.kb
    }

    pub fn resolver(&self) -> &KeywordResolver {
        &self.resolver
    }

    /// Resolves `raw`, falling back to the catalog's self-resolving alias lookup.
    /// Returns the resolution and the canonical term to look up.
    pub fn canonical_for(&self, raw: &str) -> (Resolution, String) {
        let resolution = self.resolver.resolve(raw);
        let canonical = match &resolution.canonical {
            Some(c) => c.clone(),
            None => self.catalog.resolve_alias(raw),
        };
        (resolution, canonical)
    }

    /// Pack first, then KB. A pack hit is final.
    pub fn lookup_local(&self, raw: &str, canonical: &str) -> Option<LocalHit> {
        if let Some(entry) = self
            .pack
            .match_term(canonical)
            .or_else(|| self.pack.match_term(raw))
        {
            return Some(LocalHit::Pack {
                key: entry.key.clone(),
                units: self.pack.render_blocks(entry),
            });
        }
        self.kb
            .lookup(canonical)
            .or_else(|| self.kb.lookup(raw))
            .map(|(key, entry)| LocalHit::Kb {
                key: key.to_string(),
                units: self.kb.render(entry),
            })
    }

    /// Direct wiki title for a query: catalog mapping on the raw query, then on the canonical
    /// term, then a resolver hit that came from the `wiki` source.
    pub fn wiki_title_for(&self, raw: &str, resolution: &Resolution, canonical: &str) -> Option<String> {
        self.catalog
            .wiki_title(raw)
            .or_else(|| self.catalog.wiki_title(canonical))
            .map(str::to_string)
            .or_else(|| {
                (resolution.source == "wiki")
                    .then(|| resolution.canonical.clone())
                    .flatten()
            })
    }

    pub fn add_alias(&mut self, alias: &str, target: &str) -> Result<()> {
        let res = self.catalog.add_alias(alias, target);
        self.rebuild_index();
        res
    }

    pub fn remove_alias(&mut self, alias: &str) -> Result<bool> {
        let res = self.catalog.remove_alias(alias);
        self.rebuild_index();
        res
    }

    pub fn reload_pack(&mut self) -> PackLoadReport {
        let report = self.pack.reload();
        self.rebuild_index();
        report
    }

    /// Re-reads catalog, KB and pack from storage.
    pub fn reload_all(&mut self) -> PackLoadReport {
        self.catalog.reload();
        self.kb.reload();
        let report = self.pack.reload();
        self.rebuild_index();
        report
    }

    /// Sorted pack keys whose normalized form starts with the normalized `prefix`.
    pub fn list_keys(&self, prefix: &str) -> Vec<String> {
        let prefix = normalize(prefix);
        self.pack
            .keys()
            .into_iter()
            .filter(|k| prefix.is_empty() || normalize(k).starts_with(&prefix))
            .collect()
    }

    pub fn status(&self) -> LibraryStatus {
        LibraryStatus {
            pack_dir: self.pack.pack_dir().to_path_buf(),
            pack_entries: self.pack.len(),
            kb_entries: self.kb.len(),
            aliases: self.catalog.len(),
            index_terms: self.resolver.len(),
            fuzzy_threshold: self.resolver.fuzzy_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn fixture(root: &Path) -> GuideConfig {
        let entries = root.join("pack").join("entries");
        std::fs::create_dir_all(&entries).unwrap();
        std::fs::write(
            entries.join("waterskin.md"),
            "---\nkey: Waterskin\naliases: [水壶]\n---\nCarries water.",
        )
        .unwrap();
        std::fs::write(
            root.join("kb.json"),
            r#"{"entries": {"Beer": {"answer": "Brewed from plants."}}}"#,
        )
        .unwrap();
        std::fs::write(
            root.join("aliases.json"),
            r#"{"aliases": {"skin": "Waterskin"}, "wiki": {"fort": "Fortress"}}"#,
        )
        .unwrap();
        GuideConfig {
            pack_dir: root.join("pack"),
            alias_path: root.join("aliases.json"),
            kb_path: root.join("kb.json"),
            kb_image_dir: root.join("images"),
            ..GuideConfig::default()
        }
    }

    #[test]
    fn index_covers_all_sources() {
        let dir = tempfile::tempdir().unwrap();
        let (lib, report) = Library::open(&fixture(dir.path()));
        assert!(report.is_success());

        let r = lib.resolver();
        assert_eq!(r.get("水壶").unwrap().source, "pack");
        assert_eq!(r.get("skin").unwrap().canonical, "Waterskin");
        assert_eq!(r.get("beer").unwrap().source, "kb");
        assert_eq!(r.get("fort").unwrap().source, "wiki");
    }

    #[test]
    fn lookup_prefers_pack_then_kb() {
        let dir = tempfile::tempdir().unwrap();
        let (lib, _) = Library::open(&fixture(dir.path()));

        let (_, canonical) = lib.canonical_for("Water");
        assert_eq!(canonical, "Waterskin");
        assert!(matches!(lib.lookup_local("Water", &canonical), Some(LocalHit::Pack { ref key, .. }) if key == "Waterskin"));

        let (_, canonical) = lib.canonical_for("beer");
        assert!(matches!(lib.lookup_local("beer", &canonical), Some(LocalHit::Kb { .. })));

        let (res, canonical) = lib.canonical_for("zzzz");
        assert!(!res.is_match());
        assert_eq!(canonical, "zzzz");
        assert!(lib.lookup_local("zzzz", &canonical).is_none());
    }

    #[test]
    fn mutations_rebuild_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = fixture(dir.path());
        let (mut lib, _) = Library::open(&cfg);

        lib.add_alias("flask", "Waterskin").unwrap();
        assert_eq!(lib.resolver().get("flask").unwrap().canonical, "Waterskin");
        assert!(lib.remove_alias("flask").unwrap());
        assert!(lib.resolver().get("flask").is_none());

        std::fs::write(
            cfg.pack_dir.join("entries").join("pick.md"),
            "---\nkey: Pick\n---\nDigs.",
        )
        .unwrap();
        assert!(lib.resolver().get("pick").is_none());
        let report = lib.reload_pack();
        assert_eq!(report.entries_loaded, 2);
        assert!(lib.resolver().get("pick").is_some());
        assert_eq!(lib.list_keys("PI"), vec!["Pick".to_string()]);
        assert_eq!(lib.list_keys(""), vec!["Pick".to_string(), "Waterskin".to_string()]);
    }

    #[test]
    fn wiki_title_prefers_direct_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let (lib, _) = Library::open(&fixture(dir.path()));
        let (res, canonical) = lib.canonical_for("fort");
        assert_eq!(lib.wiki_title_for("fort", &res, &canonical).as_deref(), Some("Fortress"));

        let (res, canonical) = lib.canonical_for("forty");
        assert_eq!(res.source, "wiki");
        assert_eq!(lib.wiki_title_for("forty", &res, &canonical).as_deref(), Some("Fortress"));
    }
}
