//! Error types for the guide core.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error used at collaborator seams (wiki service).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the knowledge layer.
#[derive(Error, Debug)]
pub enum GuideError {
    /// A file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document (alias file, KB file, structured entry) did not parse.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Front matter of a markup entry is not valid YAML.
    #[error("invalid front matter in {path}: {source}")]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A backing file exists but failed to load; writing would destroy its contents.
    #[error("refusing to overwrite {path}: it failed to load ({reason}); fix the file and reload")]
    StoreUnreadable { path: PathBuf, reason: String },

    /// An alias operation was given an empty alias or target.
    #[error("invalid alias: {0}")]
    InvalidAlias(String),

    /// Configuration sources could not be read or deserialized.
    #[error("config load failed: {0}")]
    Load(#[from] config::ConfigError),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GuideError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = GuideError> = std::result::Result<T, E>;
