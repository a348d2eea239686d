//! Error types for the core engine

use thiserror::Error;

/// Errors raised by the core data model and aggregation engine.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("component {0} already has an intrinsic complexity")]
    AlreadyClassified(String),

    #[error("component {0} has not been classified")]
    Unclassified(String),

    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("unknown complexity level: {0}")]
    UnknownLevel(String),

    #[error("unknown component type: {0}")]
    UnknownComponentType(String),

    #[error("invalid unit path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
