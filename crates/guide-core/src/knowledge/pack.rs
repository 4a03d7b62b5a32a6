//! Content pack: a directory of authored entries with interleaved text and images.
//!
//! ```text
//! <pack>/
//!   entries/*.md     markdown, optional YAML front matter (key, aliases, images)
//!   entries/*.json   {"key": .., "aliases": [..], "blocks": [{"type": "text"|"image", ..}]}
//!   assets/...       local images referenced by relative path
//! ```
//!
//! Entries are loaded in file-name order; a later file silently replaces an earlier one that
//! declares the same key or alias.

use super::normalize::normalize;
use super::KnowledgeSource;
use crate::error::{GuideError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const ENTRIES_DIR: &str = "entries";
const ASSETS_DIR: &str = "assets";

/// One unit of authored content. Order inside an entry is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text {
        #[serde(default)]
        content: String,
    },
    Image {
        #[serde(rename = "src", alias = "source", default)]
        source: String,
    },
}

impl Block {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn image(source: impl Into<String>) -> Self {
        Self::Image {
            source: source.into(),
        }
    }
}

/// A keyed, ordered sequence of blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub key: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

/// Resolved output handed to the transport-specific renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OutputUnit {
    Text(String),
    RemoteImage(String),
    LocalImage(PathBuf),
}

/// A document that failed to load during [`ContentPack::reload`].
#[derive(Debug, Clone, Serialize)]
pub struct PackLoadError {
    pub file: PathBuf,
    pub message: String,
}

/// Outcome of a pack reload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackLoadReport {
    pub files_processed: usize,
    pub entries_loaded: usize,
    pub errors: Vec<PackLoadError>,
}

impl PackLoadReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// `key`/`aliases`/`images` accept either a single string or a list.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    aliases: OneOrMany,
    #[serde(default)]
    images: OneOrMany,
}

#[derive(Debug, Deserialize)]
struct JsonEntry {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    blocks: Vec<Block>,
}

fn front_matter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\A---[ \t]*\n(?:(.*?)\n)?---[ \t]*(?:\n|\z)").expect("front matter regex")
    })
}

fn image_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[[^\]]*\]\(([^)]+)\)").expect("image marker regex"))
}

/// Splits leading `---` front matter from the body. Returns `(front, body)`.
fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    match front_matter_re().captures(text) {
        Some(caps) => {
            let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
            (Some(caps.get(1).map(|m| m.as_str()).unwrap_or("")), &text[end..])
        }
        None => (None, text),
    }
}

/// Scans `body` for image markers, emitting text and image blocks in document order.
fn parse_body_blocks(body: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut pos = 0;
    for caps in image_marker_re().captures_iter(body) {
        let (Some(whole), Some(src)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let text = body[pos..whole.start()].trim();
        if !text.is_empty() {
            blocks.push(Block::text(text));
        }
        blocks.push(Block::image(src.as_str().trim()));
        pos = whole.end();
    }
    let tail = body[pos..].trim();
    if !tail.is_empty() {
        blocks.push(Block::text(tail));
    }
    if blocks.is_empty() && !body.trim().is_empty() {
        blocks.push(Block::text(body.trim()));
    }
    blocks
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parses a markdown document. `path` supplies the default key and error context.
pub fn parse_markup_entry(path: &Path, text: &str) -> Result<ContentEntry> {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text).replace("\r\n", "\n");
    let (front, body) = split_front_matter(&text);
    let meta: FrontMatter = match front.map(str::trim).filter(|f| !f.is_empty()) {
        Some(raw) => serde_yaml::from_str::<Option<FrontMatter>>(raw)
            .map_err(|source| GuideError::FrontMatter {
                path: path.to_path_buf(),
                source,
            })?
            .unwrap_or_default(),
        None => FrontMatter::default(),
    };

    let mut blocks = parse_body_blocks(body);
    blocks.extend(
        meta.images
            .into_vec()
            .into_iter()
            .map(|src| Block::image(src.trim())),
    );

    Ok(ContentEntry {
        key: meta
            .key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| file_stem(path)),
        aliases: meta.aliases.into_vec(),
        blocks,
    })
}

/// Parses a structured JSON entry; blocks are taken verbatim.
pub fn parse_json_entry(path: &Path, text: &str) -> Result<ContentEntry> {
    let raw: JsonEntry = serde_json::from_str(text).map_err(|e| GuideError::json(path, e))?;
    Ok(ContentEntry {
        key: raw
            .key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| file_stem(path)),
        aliases: raw.aliases,
        blocks: raw.blocks,
    })
}

fn is_remote(src: &str) -> bool {
    let lower = src.get(..8).unwrap_or(src).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Keyed entries plus the normalized alias → key index.
pub struct ContentPack {
    pack_dir: PathBuf,
    entries_dir: PathBuf,
    assets_dir: PathBuf,
    by_key: HashMap<String, ContentEntry>,
    alias: HashMap<String, String>,
}

impl ContentPack {
    /// Creates an empty pack rooted at `pack_dir`. Call [`reload`](Self::reload) to populate.
    pub fn new(pack_dir: impl Into<PathBuf>) -> Self {
        let pack_dir = pack_dir.into();
        Self {
            entries_dir: pack_dir.join(ENTRIES_DIR),
            assets_dir: pack_dir.join(ASSETS_DIR),
            pack_dir,
            by_key: HashMap::new(),
            alias: HashMap::new(),
        }
    }

    /// Creates the pack and loads it.
    pub fn open_path(pack_dir: impl Into<PathBuf>) -> (Self, PackLoadReport) {
        let mut pack = Self::new(pack_dir);
        let report = pack.reload();
        (pack, report)
    }

    pub fn pack_dir(&self) -> &Path {
        &self.pack_dir
    }

    pub fn entries_dir(&self) -> &Path {
        &self.entries_dir
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Canonical keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.by_key.values().map(|e| e.key.clone()).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Entry by normalized key (no alias resolution).
    pub fn get(&self, key: &str) -> Option<&ContentEntry> {
        self.by_key.get(&normalize(key))
    }

    fn sorted_entry_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.entries_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    fn load_file(path: &Path) -> Result<Option<ContentEntry>> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let parse: fn(&Path, &str) -> Result<ContentEntry> = match ext.as_str() {
            "md" => parse_markup_entry,
            "json" => parse_json_entry,
            _ => return Ok(None),
        };
        let text = std::fs::read_to_string(path).map_err(|e| GuideError::io(path, e))?;
        parse(path, &text).map(Some)
    }

    fn register(&mut self, entry: ContentEntry) {
        let key = normalize(&entry.key);
        if key.is_empty() {
            return;
        }
        self.alias.insert(key.clone(), key.clone());
        for a in &entry.aliases {
            let a = normalize(a);
            if !a.is_empty() {
                self.alias.insert(a, key.clone());
            }
        }
        self.by_key.insert(key, entry);
    }

    /// Clears and re-reads `entries/`. A bad file is logged and skipped.
    pub fn reload(&mut self) -> PackLoadReport {
        self.by_key.clear();
        self.alias.clear();
        let mut report = PackLoadReport::default();

        let files = match self.sorted_entry_files() {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(target: "guide::pack", dir = %self.entries_dir.display(), error = %e, "entries directory not readable; pack is empty");
                return report;
            }
        };

        for path in files {
            match Self::load_file(&path) {
                Ok(Some(entry)) => {
                    report.files_processed += 1;
                    tracing::debug!(target: "guide::pack", file = %path.display(), key = %entry.key, blocks = entry.blocks.len(), "entry loaded");
                    self.register(entry);
                }
                Ok(None) => {}
                Err(e) => {
                    report.files_processed += 1;
                    tracing::warn!(target: "guide::pack", file = %path.display(), error = %e, "failed to load entry; skipped");
                    report.errors.push(PackLoadError {
                        file: path,
                        message: e.to_string(),
                    });
                }
            }
        }

        report.entries_loaded = self.by_key.len();
        tracing::info!(
            target: "guide::pack",
            pack = %self.pack_dir.display(),
            entries = report.entries_loaded,
            failed = report.errors.len(),
            "content pack reloaded: {} entries",
            report.entries_loaded
        );
        report
    }

    /// Exact normalized lookup through the alias index.
    pub fn match_term(&self, term: &str) -> Option<&ContentEntry> {
        let k = normalize(term);
        if k.is_empty() {
            return None;
        }
        self.alias.get(&k).and_then(|key| self.by_key.get(key))
    }

    /// First existing candidate among entries dir, assets dir, pack root.
    pub fn locate_local_image(&self, src: &str) -> Option<PathBuf> {
        [&self.entries_dir, &self.assets_dir, &self.pack_dir]
            .into_iter()
            .map(|base| base.join(src))
            .find(|candidate| candidate.exists())
    }

    /// Resolves an entry's blocks into output units, in order.
    pub fn render_blocks(&self, entry: &ContentEntry) -> Vec<OutputUnit> {
        let mut out = Vec::with_capacity(entry.blocks.len());
        for block in &entry.blocks {
            match block {
                Block::Text { content } => {
                    let content = content.trim();
                    if !content.is_empty() {
                        out.push(OutputUnit::Text(content.to_string()));
                    }
                }
                Block::Image { source } => {
                    let src = source.trim();
                    if src.is_empty() {
                        continue;
                    }
                    if is_remote(src) {
                        out.push(OutputUnit::RemoteImage(src.to_string()));
                    } else if let Some(path) = self.locate_local_image(src) {
                        out.push(OutputUnit::LocalImage(path));
                    } else {
                        tracing::warn!(target: "guide::pack", entry = %entry.key, src, "local image not found");
                        out.push(OutputUnit::Text(format!("[notice] local image not found: {}", src)));
                    }
                }
            }
        }
        out
    }
}

impl KnowledgeSource for ContentPack {
    fn name(&self) -> &str {
        "pack"
    }

    fn index_terms(&self) -> Vec<(String, String)> {
        self.alias
            .iter()
            .filter_map(|(term, key)| self.by_key.get(key).map(|e| (term.clone(), e.key.clone())))
            .collect()
    }
}
