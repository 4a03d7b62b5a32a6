//! guide-core: keyword resolution, content packs and query orchestration.
//!
//! A query is normalized, resolved to a canonical term, answered from the content pack or
//! the keyword KB, and only then handed to the external wiki.

mod error;
mod knowledge;
mod orchestrator;
mod resolver;
mod shared;

pub use error::{BoxError, GuideError, Result};
pub use shared::{GuideConfig, WikiMode};

pub use knowledge::{
    normalize, parse_json_entry, parse_markup_entry, AliasCatalog, AliasFile, Block, ContentEntry,
    ContentPack, KbEntry, KeywordKb, KnowledgeSource, Library, LibraryStatus, LocalHit,
    OutputUnit, PackLoadError, PackLoadReport, WikiTitles,
};

pub use resolver::{
    lcs_len, ratio, IndexEntry, KeywordResolver, MatchTier, Resolution, DEFAULT_FUZZY_CANDIDATES,
    DEFAULT_FUZZY_THRESHOLD,
};

pub use orchestrator::{
    truncate_chars, Answer, Orchestrator, QueryResponse, WikiHit, WikiService, WikiSummary,
};
