use std::{error::Error, time::Duration};
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or refused the call.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What was being attempted.
        message: String,
        /// Backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The call did not finish within the configured limit.
    #[error("storage call exceeded {0:?}")]
    Timeout(Duration),
    /// A stored value could not be encoded or decoded.
    #[error("stored value for `{key}` is not valid JSON")]
    Codec {
        /// Key of the offending value.
        key: String,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
    /// The key is outside the accepted alphabet.
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
