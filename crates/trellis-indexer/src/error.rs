//! Error types for splitting and schema loading

use thiserror::Error;

/// The only splitter failures that abort a run.
#[derive(Debug, Error)]
pub enum SplitError {
    /// Nothing to split: the input is empty or whitespace.
    #[error("document is empty")]
    EmptyDocument,
}

/// Platform schema could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported schema format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A kind names neither a canonical type nor an alias.
    #[error("kind '{0}' does not map to a component type")]
    UnmappedKind(String),

    #[error("kind '{kind}': {message}")]
    InvalidKind { kind: String, message: String },
}
