//! Error type for the ETL job
//!
//! Wraps the shared [`LakeError`] taxonomy and the dataframe engine's own
//! error so stages can use `?` on both.

use datafusion::error::DataFusionError;
use songlake_common::LakeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    /// Configuration, storage, schema or serialization failure
    #[error(transparent)]
    Lake(#[from] LakeError),

    /// Planning or execution failure inside the engine
    #[error("Engine error: {0}")]
    Engine(#[from] DataFusionError),
}

impl EtlError {
    /// Whether the run failed before touching storage
    pub fn is_startup_error(&self) -> bool {
        match self {
            EtlError::Lake(err) => err.is_startup_error(),
            EtlError::Engine(_) => false,
        }
    }
}

impl From<object_store::Error> for EtlError {
    fn from(err: object_store::Error) -> Self {
        EtlError::Lake(err.into())
    }
}

impl From<url::ParseError> for EtlError {
    fn from(err: url::ParseError) -> Self {
        EtlError::Lake(err.into())
    }
}

/// Result type alias for ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;
