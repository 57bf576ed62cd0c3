use std::{error::Error, time::Duration};
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by poll stores regardless of the underlying backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Optimistic concurrency kept failing for the named record.
    #[error("storage contention on `{key}` after {attempts} attempts")]
    Contention { key: String, attempts: u32 },
    /// A lock expiry would not fit in `SystemTime`.
    #[error("lock ttl {ttl:?} out of range for `{key}`")]
    LockTtl { key: String, ttl: Duration },
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
