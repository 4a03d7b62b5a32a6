//! Shared configuration used by the core, the wiki client and the gateway.

use crate::error::{GuideError, Result};
use crate::resolver::{DEFAULT_FUZZY_CANDIDATES, DEFAULT_FUZZY_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_APP_NAME: &str = "Guide";
const DEFAULT_PORT: u16 = 8011;
const DEFAULT_PACK_DIR: &str = "packs/df";
const DEFAULT_ALIAS_PATH: &str = "catalog/aliases.json";
const DEFAULT_KB_PATH: &str = "kb/keywords.json";
const DEFAULT_KB_IMAGE_DIR: &str = "assets/images";
const DEFAULT_MW_HOST: &str = "dwarffortresswiki.org";
const DEFAULT_WIKI_LIMIT: usize = 3;
const DEFAULT_WIKI_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SUMMARY_MAX_CHARS: usize = 900;

/// Which wiki family the fallback search talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WikiMode {
    /// Self-hosted MediaWiki (`mw_host`, `mw_https`, `mw_path_prefix`).
    #[default]
    Mediawiki,
    /// `<wiki_lang>.wikipedia.org`.
    Wikipedia,
    /// `<fandom_site>.fandom.com`.
    Fandom,
}

/// Application configuration. Load from TOML and `GUIDE__*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideConfig {
    pub app_name: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// Content pack root (contains `entries/` and `assets/`).
    pub pack_dir: PathBuf,
    /// Alias storage file (`{"aliases": {}, "wiki": {}}`).
    pub alias_path: PathBuf,
    /// Secondary keyword KB file.
    pub kb_path: PathBuf,
    /// Base directory for relative KB images.
    pub kb_image_dir: PathBuf,

    #[serde(default)]
    pub wiki_mode: WikiMode,
    pub wiki_lang: String,
    #[serde(default)]
    pub fandom_site: String,
    pub mw_host: String,
    pub mw_https: bool,
    #[serde(default)]
    pub mw_path_prefix: String,
    /// Search results requested from the wiki fallback.
    pub wiki_limit: usize,
    pub wiki_timeout_secs: u64,
    /// Extracts are cut to this many characters.
    pub summary_max_chars: usize,

    /// Minimum LCS ratio for the fuzzy tier.
    pub fuzzy_threshold: f64,
    /// How many fuzzy candidates are considered.
    pub fuzzy_candidates: usize,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            port: DEFAULT_PORT,
            pack_dir: PathBuf::from(DEFAULT_PACK_DIR),
            alias_path: PathBuf::from(DEFAULT_ALIAS_PATH),
            kb_path: PathBuf::from(DEFAULT_KB_PATH),
            kb_image_dir: PathBuf::from(DEFAULT_KB_IMAGE_DIR),
            wiki_mode: WikiMode::Mediawiki,
            wiki_lang: "en".to_string(),
            fandom_site: String::new(),
            mw_host: DEFAULT_MW_HOST.to_string(),
            mw_https: true,
            mw_path_prefix: String::new(),
            wiki_limit: DEFAULT_WIKI_LIMIT,
            wiki_timeout_secs: DEFAULT_WIKI_TIMEOUT_SECS,
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            fuzzy_candidates: DEFAULT_FUZZY_CANDIDATES,
        }
    }
}

impl GuideConfig {
    /// Load config from file and environment, then validate.
    /// Precedence: env `GUIDE__*` > file at `GUIDE_CONFIG` (default `config/guide`) > defaults.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GUIDE_CONFIG").unwrap_or_else(|_| "config/guide".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Like [`load`](Self::load) with an explicit file path (the file is optional).
    pub fn load_from(path: &Path) -> Result<Self> {
        let d = Self::default();
        let builder = config::Config::builder()
            .set_default("app_name", d.app_name)?
            .set_default("port", i64::from(d.port))?
            .set_default("pack_dir", DEFAULT_PACK_DIR)?
            .set_default("alias_path", DEFAULT_ALIAS_PATH)?
            .set_default("kb_path", DEFAULT_KB_PATH)?
            .set_default("kb_image_dir", DEFAULT_KB_IMAGE_DIR)?
            .set_default("wiki_mode", "mediawiki")?
            .set_default("wiki_lang", d.wiki_lang)?
            .set_default("mw_host", d.mw_host)?
            .set_default("mw_https", d.mw_https)?
            .set_default("wiki_limit", d.wiki_limit as i64)?
            .set_default("wiki_timeout_secs", d.wiki_timeout_secs as i64)?
            .set_default("summary_max_chars", d.summary_max_chars as i64)?
            .set_default("fuzzy_threshold", d.fuzzy_threshold)?
            .set_default("fuzzy_candidates", d.fuzzy_candidates as i64)?;

        // `config::File::from` picks the format by extension; a bare name tries the known ones.
        let builder = if path.exists() || path.with_extension("toml").exists() {
            builder.add_source(config::File::from(path).required(false))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("GUIDE").separator("__"))
            .build()?;

        let cfg: Self = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values that would make resolution or wiki calls meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(GuideError::Config(format!(
                "fuzzy_threshold must be within [0, 1], got {}",
                self.fuzzy_threshold
            )));
        }
        if self.fuzzy_candidates == 0 {
            return Err(GuideError::Config("fuzzy_candidates must be at least 1".into()));
        }
        if self.wiki_limit == 0 {
            return Err(GuideError::Config("wiki_limit must be at least 1".into()));
        }
        if self.wiki_timeout_secs == 0 {
            return Err(GuideError::Config("wiki_timeout_secs must be at least 1".into()));
        }
        if self.wiki_mode == WikiMode::Mediawiki && self.mw_host.trim().is_empty() {
            return Err(GuideError::Config("mw_host is required in mediawiki mode".into()));
        }
        Ok(())
    }
}
