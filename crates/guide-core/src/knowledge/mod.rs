//! Local knowledge sources and the library that owns them.
//!
//! | Source        | Tag     | Purpose                                              |
//! |---------------|---------|------------------------------------------------------|
//! | AliasCatalog  | `alias` | Admin-maintained alias → canonical term map          |
//! | AliasCatalog  | `wiki`  | Direct term → external wiki page title map           |
//! | KeywordKb     | `kb`    | Flat key → answer/image entries (secondary source)   |
//! | ContentPack   | `pack`  | Markdown/JSON entries with interleaved text & images |
//!
//! Every source exposes its terms through [`KnowledgeSource`] so the resolver index can be
//! rebuilt from all of them in one pass.

mod catalog;
mod kb;
mod library;
mod normalize;
mod pack;

pub use catalog::{AliasCatalog, AliasFile, WikiTitles};
pub use kb::{KbEntry, KeywordKb};
pub use library::{Library, LibraryStatus, LocalHit};
pub use normalize::normalize;
pub use pack::{
    parse_json_entry, parse_markup_entry, Block, ContentEntry, ContentPack, OutputUnit,
    PackLoadError, PackLoadReport,
};

/// Common trait for everything that contributes terms to the resolver index.
pub trait KnowledgeSource: Send + Sync {
    /// Source tag recorded on each index entry (e.g. `pack`).
    fn name(&self) -> &str;

    /// `(term, canonical)` pairs. Terms are normalized by the index; canonicals are kept as-is.
    fn index_terms(&self) -> Vec<(String, String)>;
}
