use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {field} {message}")]
    Validation { field: &'static str, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("The default folder cannot be removed: {0}")]
    DefaultFolder(String),

    #[error("Invalid share code: {0}")]
    ShareCode(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("QUOTA_BYTES_PER_ITEM exceeded in {area} storage ({bytes} bytes)")]
    QuotaExceeded { area: &'static str, bytes: usize },

    #[error("Storage backend error: {0}")]
    Backend(String),
}
