//! Error types for the persistent cache

use std::fmt;

/// Errors raised by the cache itself (storage, serialization, key derivation)
#[derive(Debug)]
pub enum CacheError {
    /// Reading or writing the backing file failed
    Io(Box<std::io::Error>),
    /// A result could not be encoded for storage or decoded on a hit
    Serialization(String),
    /// An argument could not be turned into its hashing representation
    Representation(String),
    /// The backing file exists but is not a cache snapshot we understand
    CorruptStore(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            CacheError::Representation(msg) => write!(f, "Representation error: {}", msg),
            CacheError::CorruptStore(msg) => write!(f, "Corrupt cache store: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<tempfile::PersistError> for CacheError {
    fn from(err: tempfile::PersistError) -> Self {
        CacheError::Io(Box::new(err.error))
    }
}

/// Failure of a cached call: either the cache broke or the wrapped callable did
#[derive(Debug)]
pub enum CallError<E> {
    Cache(CacheError),
    Callable(E),
}

impl<E> CallError<E> {
    /// Returns the callable's own error, if that is what failed
    pub fn into_callable(self) -> Option<E> {
        match self {
            CallError::Callable(err) => Some(err),
            CallError::Cache(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Cache(err) => write!(f, "Cache error: {}", err),
            CallError::Callable(err) => write!(f, "Callable failed: {}", err),
        }
    }
}

impl<E> std::error::Error for CallError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Cache(err) => Some(err),
            CallError::Callable(err) => Some(err),
        }
    }
}

impl<E> From<CacheError> for CallError<E> {
    fn from(err: CacheError) -> Self {
        CallError::Cache(err)
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
