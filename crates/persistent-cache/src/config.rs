//! Cache configuration

use std::path::PathBuf;

/// Settings for opening a file-backed cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Location of the snapshot file
    pub path: PathBuf,
    /// Flush to disk after every mutating operation instead of only on close
    pub write_through: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./cache/results.json"),
            write_through: false,
        }
    }
}

impl CacheConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_write_through(mut self, write_through: bool) -> Self {
        self.write_through = write_through;
        self
    }

    /// Read `PERSISTENT_CACHE_PATH` and `PERSISTENT_CACHE_WRITE_THROUGH`,
    /// falling back to the defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let path = lookup("PERSISTENT_CACHE_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.path);

        let write_through = lookup("PERSISTENT_CACHE_WRITE_THROUGH")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.write_through);

        Self {
            path,
            write_through,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
