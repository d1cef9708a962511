//! Argument representations fed into the key hash
//!
//! A representation must tell apart every pair of argument values that matter
//! to the cached callable, and it must produce the same text for the same value
//! across process restarts and crate upgrades. The cache cannot check either
//! property; callers who plug in their own representation own that obligation.

use crate::error::{CacheError, Result};
use serde_json::Value;

/// Turns an argument value into the text that gets hashed into its key
pub trait Representation {
    fn represent(&self, value: &Value) -> Result<String>;
}

/// Compact JSON text of the value.
///
/// Object keys come out sorted, so maps built in any insertion order hash the
/// same. Works for primitives, sequences, and plain aggregates.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRepresentation;

impl Representation for JsonRepresentation {
    fn represent(&self, value: &Value) -> Result<String> {
        serde_json::to_string(value).map_err(|e| CacheError::Representation(e.to_string()))
    }
}

impl<F> Representation for F
where
    F: Fn(&Value) -> Result<String>,
{
    fn represent(&self, value: &Value) -> Result<String> {
        self(value)
    }
}
