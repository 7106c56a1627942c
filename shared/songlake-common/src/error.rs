//! Error types for the songlake ETL

use thiserror::Error;

/// Songlake operation errors
#[derive(Error, Debug)]
pub enum LakeError {
    /// Missing or invalid configuration entry
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Storage error (S3, filesystem)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Derived table does not match its declared schema
    #[error("Schema mismatch: {0}")]
    SchemaError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LakeError {
    /// Whether this error was raised before any storage or engine work started
    pub fn is_startup_error(&self) -> bool {
        matches!(self, LakeError::ConfigError(_))
    }
}

impl From<object_store::Error> for LakeError {
    fn from(err: object_store::Error) -> Self {
        LakeError::StorageError(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for LakeError {
    fn from(err: arrow::error::ArrowError) -> Self {
        LakeError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for LakeError {
    fn from(err: serde_json::Error) -> Self {
        LakeError::SerializationError(err.to_string())
    }
}

impl From<url::ParseError> for LakeError {
    fn from(err: url::ParseError) -> Self {
        LakeError::ConfigError(err.to_string())
    }
}

impl From<dotenvy::Error> for LakeError {
    fn from(err: dotenvy::Error) -> Self {
        LakeError::ConfigError(err.to_string())
    }
}

impl From<std::env::VarError> for LakeError {
    fn from(err: std::env::VarError) -> Self {
        LakeError::ConfigError(err.to_string())
    }
}

impl From<anyhow::Error> for LakeError {
    fn from(err: anyhow::Error) -> Self {
        LakeError::InternalError(err.to_string())
    }
}
