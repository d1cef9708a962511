//! Persistent memoization cache
//!
//! Stores results of expensive computations on disk, keyed by a SHA-256 hash
//! of the computation's name and arguments, so repeated calls across process
//! restarts are answered from the cache. Each entry remembers when it was last
//! used; stale entries can be evicted by age.
//!
//! Arguments are hashed through a [`Representation`]. The default
//! [`JsonRepresentation`] is stable for primitives, sequences and plain
//! aggregates; a custom one must keep telling apart the values that matter to
//! the cached computation, identically from one run to the next.

mod cache;
mod clock;
mod config;
mod error;
mod finite;
mod key;
mod repr;
mod store;
mod types;

pub use cache::{Memoized, PersistentCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use error::{CacheError, CallError, Result};
pub use key::{Args, CacheKey};
pub use repr::{JsonRepresentation, Representation};
pub use store::{CacheRecord, FileStore, MemoryStore, Store};
pub use types::CacheStats;
