//! Error types for the cache statistics tool

use persistent_cache::CacheError;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum StatsError {
    /// Wrong command line; carries the program name
    Usage(String),
    MissingFile(PathBuf),
    Cache(CacheError),
    Config(String),
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsError::Usage(program) => write!(f, "Usage: {} CACHEFILE", program),
            StatsError::MissingFile(path) => write!(f, "no such cache file: {}", path.display()),
            StatsError::Cache(err) => write!(f, "Cache error: {}", err),
            StatsError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for StatsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatsError::Cache(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CacheError> for StatsError {
    fn from(err: CacheError) -> Self {
        StatsError::Cache(err)
    }
}

impl From<tracing_subscriber::filter::ParseError> for StatsError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        StatsError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;
