//! Store error handling
//!
//! Provides typed errors for document store operations with descriptive
//! messages and recovery suggestions.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur during document store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// The request never produced a response
    #[error("Request to document store failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The document store answered with a non-success status
    #[error("Document store returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    /// A store call exceeded the configured timeout
    #[error("Document store did not respond within {0:?}")]
    Timeout(Duration),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored document is missing fields or has the wrong types
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Failed to read or write the local store file
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The remote store was selected but never configured
    #[error("Remote document store is not configured")]
    NotConfigured,
}

impl StoreError {
    /// Create an error from an I/O error with path context
    pub fn from_io(error: io::Error, path: impl Into<PathBuf>) -> Self {
        StoreError::Io {
            path: path.into(),
            source: error,
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(_) | StoreError::Timeout(_) => true,
            StoreError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::Http(_) | StoreError::Timeout(_) => {
                Some("Check your network connection and try again.")
            }
            StoreError::Status { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN =>
            {
                Some("Check the Firebase API key and the Firestore security rules.")
            }
            StoreError::Status { status, .. } if *status == StatusCode::NOT_FOUND => {
                Some("Check the Firebase project id and that Firestore is enabled.")
            }
            StoreError::Io { .. } => {
                Some("Check that the data directory exists and you have write permissions.")
            }
            StoreError::NotConfigured => {
                Some("Set firebase.project_id and firebase.api_key, or use the local store.")
            }
            _ => None,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
