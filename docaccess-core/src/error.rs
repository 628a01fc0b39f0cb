//! Error types and result types for data-access operations.
//!
//! Every fallible operation in this crate returns a [`DocumentStoreResult<T>`].
//! Errors coming from the underlying store are passed through unchanged; this layer
//! performs no retries and no local recovery.

use bson::error::Error as BsonError;
use figment::Error as FigmentError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
///
/// A logical no-op (an update or delete that matched nothing) is never reported here;
/// those surface as `false` or an empty result.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The connection descriptor, database name, or configuration source is empty or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The client for the underlying store could not be constructed.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A filter or update description cannot be expressed in the store's native language.
    #[error("Translation error: {0}")]
    Translation(String),
    /// Serialization/deserialization error when converting between entities and documents.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A document with the given identity already exists in the collection.
    /// The first argument is the identity, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The document has an invalid structure or attempts to change its identity.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error reported by the underlying store.
    #[error("Backend error: {0}")]
    Backend(String),
    /// The caller cancelled the operation before it completed.
    ///
    /// For batch operations the completion state is unknown; re-query to find out.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl DocumentStoreError {
    /// Returns `true` if this error was caused by the caller rather than the store.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            DocumentStoreError::Configuration(_)
                | DocumentStoreError::Translation(_)
                | DocumentStoreError::InvalidDocument(_)
        )
    }
}

/// A specialized `Result` type for data-access operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<FigmentError> for DocumentStoreError {
    fn from(err: FigmentError) -> Self {
        DocumentStoreError::Configuration(err.to_string())
    }
}
