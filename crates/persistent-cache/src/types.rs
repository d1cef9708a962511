//! Cache types

use serde::{Deserialize, Serialize};

/// Aggregate view over all access timestamps.
///
/// `oldest` and `newest` are `None` exactly when `entries` is zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    /// Earliest access time, seconds since the Unix epoch
    pub oldest: Option<f64>,
    /// Latest access time, seconds since the Unix epoch
    pub newest: Option<f64>,
}

impl CacheStats {
    /// Fold one access time into the totals
    pub fn record(&mut self, accessed_at: f64) {
        self.entries += 1;
        self.oldest = Some(self.oldest.map_or(accessed_at, |t| t.min(accessed_at)));
        self.newest = Some(self.newest.map_or(accessed_at, |t| t.max(accessed_at)));
    }

    /// Seconds between the least recently used entry and `now`
    pub fn oldest_age(&self, now: f64) -> Option<f64> {
        self.oldest.map(|t| (now - t).max(0.0))
    }

    /// Seconds between the most recently used entry and `now`
    pub fn newest_age(&self, now: f64) -> Option<f64> {
        self.newest.map(|t| (now - t).max(0.0))
    }
}
