use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a document store backend
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("duplicate key '{id}' in collection '{collection}'")]
    DuplicateKey { collection: String, id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}
