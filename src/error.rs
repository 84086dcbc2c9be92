//! Error taxonomy shared by the gallery pipelines and the HTTP layer.

use thiserror::Error;

use crate::derivatives::DerivativeError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    DerivativeGeneration(#[from] DerivativeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("staff credentials required")]
    Unauthorized,

    #[error("staff access required")]
    Forbidden,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GalleryError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        GalleryError::NotFound(what.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        GalleryError::Validation(message.into())
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            GalleryError::NotFound(_) => "not_found",
            GalleryError::Validation(_) => "validation_error",
            GalleryError::DerivativeGeneration(_) => "derivative_generation_error",
            GalleryError::Storage(_) => "storage_error",
            GalleryError::Database(_) => "database_error",
            GalleryError::Unauthorized => "unauthorized",
            GalleryError::Forbidden => "forbidden",
            GalleryError::Internal(_) => "internal_error",
        }
    }
}

pub type GalleryResult<T> = std::result::Result<T, GalleryError>;

/// True when a rusqlite error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
