//! Cache key derivation

use crate::error::{CacheError, Result};
use crate::finite::ensure_finite;
use crate::repr::Representation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Hex SHA-256 digest identifying one (callable, arguments) signature
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

/// Marks a positional argument in the hash input
const POSITIONAL_TAG: u8 = b'p';
/// Marks a keyword argument in the hash input
const KEYWORD_TAG: u8 = b'k';

impl CacheKey {
    /// Derive the key for `name` called with `args`.
    ///
    /// The hash is seeded with `name`, then takes each positional argument in
    /// call order, then each keyword argument as its name and representation,
    /// in name order. Every piece is length-prefixed and every argument starts
    /// with a tag byte for its kind, so no two different calls produce the
    /// same hash input. With no arguments only the framed `name` is hashed.
    pub fn derive(name: &str, args: &Args, repr: &dyn Representation) -> Result<Self> {
        let mut hasher = Sha256::new();
        update_chunk(&mut hasher, name.as_bytes());

        for value in &args.positional {
            hasher.update([POSITIONAL_TAG]);
            update_chunk(&mut hasher, repr.represent(value)?.as_bytes());
        }
        for (kw, value) in &args.keyword {
            hasher.update([KEYWORD_TAG]);
            update_chunk(&mut hasher, kw.as_bytes());
            update_chunk(&mut hasher, repr.represent(value)?.as_bytes());
        }

        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines
    pub(crate) fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = CacheError;

    /// Accepts only 64 lowercase hex digits
    fn try_from(s: String) -> Result<Self> {
        if s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Ok(Self(s))
        } else {
            Err(CacheError::CorruptStore(format!("invalid cache key {:?}", s)))
        }
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn update_chunk(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Arguments of one invocation: positional values in call order plus keyword
/// values, which are always kept sorted by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.positional.push(to_value(value)?);
        Ok(self)
    }

    /// Set a keyword argument, replacing any earlier value under `name`
    pub fn kwarg<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Result<Self> {
        self.keyword.insert(name.to_string(), to_value(value)?);
        Ok(self)
    }

    pub fn push_value(&mut self, value: Value) {
        self.positional.push(value);
    }

    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        self.keyword.insert(name.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

/// NaN and the infinities are refused: JSON would turn them all into `null`
fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    ensure_finite(value).map_err(|e| CacheError::Representation(e.to_string()))?;
    serde_json::to_value(value).map_err(|e| CacheError::Representation(e.to_string()))
}
