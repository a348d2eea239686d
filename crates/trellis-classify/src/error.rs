//! Error types for rule catalogs

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported catalog format: {0}")]
    UnsupportedFormat(String),

    #[error("rule '{rule}': invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule '{0}' is defined twice for the same component type")]
    DuplicateRule(String),

    #[error("rule '{0}' has no conditions")]
    EmptyRule(String),
}
