//! Memoizing cache over a persistent store

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::{CacheError, CallError, Result};
use crate::finite::ensure_finite;
use crate::key::{Args, CacheKey};
use crate::repr::{JsonRepresentation, Representation};
use crate::store::{CacheRecord, FileStore, Store};
use crate::types::CacheStats;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::convert::Infallible;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Stores results of named computations keyed by their arguments.
///
/// Every operation takes `&mut self`, so one cache serves one caller at a
/// time. Two threads sharing it through a `Mutex` that is held across
/// [`check`](Self::check) never compute the same key twice; without such a
/// lock the borrow checker rules concurrent use out.
pub struct PersistentCache<S: Store = FileStore> {
    store: S,
    repr: Box<dyn Representation>,
    clock: Box<dyn Clock>,
    write_through: bool,
}

impl PersistentCache<FileStore> {
    /// Open or create the cache file at `path`, hashing arguments as JSON
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, JsonRepresentation)
    }

    /// Open or create the cache file at `path` with a custom argument
    /// representation
    pub fn open_with(
        path: impl AsRef<Path>,
        repr: impl Representation + 'static,
    ) -> Result<Self> {
        let store = FileStore::open(path)?;
        Ok(Self::with_store(store, repr, SystemClock))
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Ok(Self::open(&config.path)?.write_through(config.write_through))
    }
}

impl<S: Store> PersistentCache<S> {
    pub fn with_store(
        store: S,
        repr: impl Representation + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            store,
            repr: Box::new(repr),
            clock: Box::new(clock),
            write_through: false,
        }
    }

    /// Flush after every mutating operation
    pub fn write_through(mut self, enabled: bool) -> Self {
        self.write_through = enabled;
        self
    }

    pub fn key(&self, name: &str, args: &Args) -> Result<CacheKey> {
        CacheKey::derive(name, args, self.repr.as_ref())
    }

    /// Return the stored result for `name(args)`, or run `compute`, store what
    /// it returns and hand it back.
    ///
    /// A stored result is returned without calling `compute`. Whichever way the
    /// result came, the entry's access time moves to now (never backwards).
    /// When `compute` fails its error comes back as [`CallError::Callable`]
    /// and the store is left untouched.
    pub fn check<T, E, F>(
        &mut self,
        name: &str,
        args: &Args,
        compute: F,
    ) -> std::result::Result<T, CallError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let key = self.key(name, args)?;

        let result = match self.store.get(&key)? {
            Some(record) => {
                let value: T = serde_json::from_value(record.value).map_err(CacheError::from)?;
                let accessed_at = self.clock.now().max(record.accessed_at);
                self.store.touch(&key, accessed_at)?;
                debug!(callable = name, key = %key.short(), "Cache hit");
                value
            }
            None => {
                debug!(callable = name, key = %key.short(), "Cache miss");
                let value = compute().map_err(CallError::Callable)?;
                let record = CacheRecord {
                    value: encode_result(&value)?,
                    accessed_at: self.clock.now(),
                };
                self.store.insert(key, record)?;
                value
            }
        };

        self.sync()?;
        Ok(result)
    }

    /// [`check`](Self::check) for computations that cannot fail
    pub fn get_or_insert_with<T, F>(&mut self, name: &str, args: &Args, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        match self.check(name, args, || Ok::<T, Infallible>(compute())) {
            Ok(value) => Ok(value),
            Err(CallError::Cache(err)) => Err(err),
            Err(CallError::Callable(never)) => match never {},
        }
    }

    /// Wrap `f` so that calls through the returned handle go via the cache
    /// under `name`.
    pub fn wrap<F>(&mut self, name: impl Into<String>, f: F) -> Memoized<'_, S, F> {
        Memoized {
            cache: self,
            name: name.into(),
            f,
        }
    }

    pub fn contains(&self, key: &CacheKey) -> Result<bool> {
        self.store.contains(key)
    }

    pub fn len(&self) -> Result<usize> {
        self.store.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.store.is_empty()
    }

    /// Remove entries, returning how many went.
    ///
    /// With `None` or a zero duration everything is removed. Otherwise only
    /// entries whose last access lies strictly before `now - max_age` are.
    pub fn clear(&mut self, max_age: Option<Duration>) -> Result<usize> {
        let removed = match max_age.filter(|age| !age.is_zero()) {
            None => {
                let removed = self.store.len()?;
                self.store.clear()?;
                info!(removed, "Cleared cache");
                removed
            }
            Some(max_age) => {
                let cutoff = self.clock.now() - max_age.as_secs_f64();
                let outdated: Vec<CacheKey> = self
                    .store
                    .access_times()?
                    .into_iter()
                    .filter(|(_, accessed_at)| *accessed_at < cutoff)
                    .map(|(key, _)| key)
                    .collect();

                for key in &outdated {
                    self.store.remove(key)?;
                    debug!(key = %key.short(), "Evicted stale cache entry");
                }
                info!(
                    removed = outdated.len(),
                    max_age_secs = max_age.as_secs_f64(),
                    "Evicted stale cache entries"
                );
                outdated.len()
            }
        };

        self.sync()?;
        Ok(removed)
    }

    /// Count entries and find the oldest and newest access times
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for (_, accessed_at) in self.store.access_times()? {
            stats.record(accessed_at);
        }
        Ok(stats)
    }

    /// Current time according to the cache's clock
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    /// Flush pending writes and release the store
    pub fn close(mut self) -> Result<()> {
        self.store.close()?;
        info!("Closed cache");
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if self.write_through {
            self.store.flush()?;
        }
        Ok(())
    }
}

/// JSON form of a fresh result. Refuses anything that would not decode back
/// into `T` on a later hit, such as NaN or an infinity, which JSON can only
/// write as `null`.
fn encode_result<T>(value: &T) -> Result<Value>
where
    T: Serialize + DeserializeOwned,
{
    ensure_finite(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
    let encoded = serde_json::to_value(value)?;
    serde_json::from_value::<T>(encoded.clone())?;
    Ok(encoded)
}

/// A function whose calls are answered from a [`PersistentCache`]
pub struct Memoized<'c, S: Store, F> {
    cache: &'c mut PersistentCache<S>,
    name: String,
    f: F,
}

impl<S: Store, F> Memoized<'_, S, F> {
    /// Call the wrapped function with `arg` as its only positional argument.
    /// Pass a tuple to cache on several values.
    pub fn call<A, T, E>(&mut self, arg: &A) -> std::result::Result<T, CallError<E>>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnMut(&A) -> std::result::Result<T, E>,
    {
        let args = Args::new().arg(arg)?;
        let f = &mut self.f;
        self.cache.check(&self.name, &args, || f(arg))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use std::cell::Cell;
    use std::fs;
    use tempfile::tempdir;

    const T0: f64 = 1_700_000_000.0;

    fn memory_cache() -> (PersistentCache<MemoryStore>, ManualClock) {
        let clock = ManualClock::new(T0);
        let cache =
            PersistentCache::with_store(MemoryStore::new(), JsonRepresentation, clock.clone());
        (cache, clock)
    }

    fn args(x: i64) -> Args {
        Args::new().arg(&x).unwrap()
    }

    /// Every stored entry carries a timestamp and nothing else exists
    fn assert_paired(cache: &PersistentCache<MemoryStore>) {
        let times = cache.store().access_times().unwrap();
        assert_eq!(times.len(), cache.len().unwrap());
        for (key, accessed_at) in times {
            let record = cache.store().get(&key).unwrap().unwrap();
            assert_eq!(record.accessed_at, accessed_at);
        }
    }

    #[test]
    fn test_hit_skips_computation() {
        let (mut cache, _) = memory_cache();
        let calls = Cell::new(0);

        for _ in 0..5 {
            let value: i64 = cache
                .get_or_insert_with("square", &args(4), || {
                    calls.set(calls.get() + 1);
                    16
                })
                .unwrap();
            assert_eq!(value, 16);
        }

        assert_eq!(calls.get(), 1);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_hit_returns_stored_result_not_fresh_one() {
        let (mut cache, _) = memory_cache();
        let first: String = cache
            .get_or_insert_with("f", &Args::new(), || "first".to_string())
            .unwrap();
        let second: String = cache
            .get_or_insert_with("f", &Args::new(), || "second".to_string())
            .unwrap();
        assert_eq!(first, "first");
        assert_eq!(second, "first");
    }

    #[test]
    fn test_distinct_arguments_are_distinct_entries() {
        let (mut cache, _) = memory_cache();
        let four: i64 = cache.get_or_insert_with("square", &args(4), || 16).unwrap();
        let five: i64 = cache.get_or_insert_with("square", &args(5), || 25).unwrap();
        assert_eq!((four, five), (16, 25));
        assert_eq!(cache.len().unwrap(), 2);
    }

    #[test]
    fn test_callable_failure_writes_nothing() {
        let (mut cache, _) = memory_cache();

        let result: std::result::Result<i64, CallError<String>> =
            cache.check("div", &args(0), || Err("division by zero".to_string()));

        match result {
            Err(CallError::Callable(msg)) => assert_eq!(msg, "division by zero"),
            other => panic!("expected callable error, got {:?}", other),
        }
        assert!(cache.is_empty().unwrap());
        assert_paired(&cache);

        // The failed key is still a miss afterwards
        let value: std::result::Result<i64, CallError<String>> =
            cache.check("div", &args(0), || Ok(0));
        assert_eq!(value.unwrap(), 0);
    }

    #[test]
    fn test_representation_failure_is_cache_error() {
        let failing = |_: &Value| -> Result<String> {
            Err(CacheError::Representation("unhashable".to_string()))
        };
        let mut cache =
            PersistentCache::with_store(MemoryStore::new(), failing, ManualClock::new(T0));
        let calls = Cell::new(0);

        let result: std::result::Result<i64, CallError<Infallible>> =
            cache.check("f", &args(1), || {
                calls.set(calls.get() + 1);
                Ok(1)
            });

        assert!(matches!(
            result,
            Err(CallError::Cache(CacheError::Representation(_)))
        ));
        assert_eq!(calls.get(), 0);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_type_mismatch_on_hit_is_serialization_error() {
        let (mut cache, _) = memory_cache();
        let _: String = cache
            .get_or_insert_with("f", &Args::new(), || "text".to_string())
            .unwrap();

        let result: Result<i64> = cache.get_or_insert_with("f", &Args::new(), || 1);
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[test]
    fn test_non_finite_result_is_not_stored() {
        let (mut cache, _) = memory_cache();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result: Result<f64> = cache.get_or_insert_with("h", &Args::new(), || bad);
            assert!(matches!(result, Err(CacheError::Serialization(_))));
            assert!(cache.is_empty().unwrap());
        }

        let nested: Result<Vec<Option<f64>>> =
            cache.get_or_insert_with("h", &args(1), || vec![Some(1.0), Some(f64::NAN)]);
        assert!(matches!(nested, Err(CacheError::Serialization(_))));
        assert!(cache.is_empty().unwrap());

        // A later finite result for the same call is computed and kept
        let value: f64 = cache.get_or_insert_with("h", &Args::new(), || 0.5).unwrap();
        assert_eq!(value, 0.5);
        let again: f64 = cache.get_or_insert_with("h", &Args::new(), || 9.0).unwrap();
        assert_eq!(again, 0.5);
    }

    #[test]
    fn test_non_finite_arguments_never_share_an_entry() {
        let (mut cache, _) = memory_cache();
        let mut negate = cache.wrap("negate", |x: &f64| Ok::<_, Infallible>(-x));

        assert!(matches!(
            negate.call(&f64::INFINITY),
            Err(CallError::Cache(CacheError::Representation(_)))
        ));
        assert!(matches!(
            negate.call(&f64::NEG_INFINITY),
            Err(CallError::Cache(CacheError::Representation(_)))
        ));
        assert_eq!(negate.call(&2.0).unwrap(), -2.0);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_timestamp_refreshed_on_hit_and_miss() {
        let (mut cache, clock) = memory_cache();
        let key = cache.key("square", &args(4)).unwrap();

        let _: i64 = cache.get_or_insert_with("square", &args(4), || 16).unwrap();
        assert_eq!(cache.store().get(&key).unwrap().unwrap().accessed_at, T0);

        clock.advance(60.0);
        let _: i64 = cache.get_or_insert_with("square", &args(4), || 16).unwrap();
        assert_eq!(cache.store().get(&key).unwrap().unwrap().accessed_at, T0 + 60.0);
        assert_paired(&cache);
    }

    #[test]
    fn test_timestamp_never_moves_backwards() {
        let (mut cache, clock) = memory_cache();
        let key = cache.key("f", &Args::new()).unwrap();

        let _: i64 = cache.get_or_insert_with("f", &Args::new(), || 1).unwrap();
        clock.set(T0 - 3600.0);
        let _: i64 = cache.get_or_insert_with("f", &Args::new(), || 1).unwrap();

        assert_eq!(cache.store().get(&key).unwrap().unwrap().accessed_at, T0);
    }

    #[test]
    fn test_age_based_eviction_removes_only_stale_entries() {
        let (mut cache, clock) = memory_cache();

        // t1 < t2 < t3
        let _: i64 = cache.get_or_insert_with("square", &args(1), || 1).unwrap();
        clock.advance(100.0);
        let _: i64 = cache.get_or_insert_with("square", &args(2), || 4).unwrap();
        clock.advance(100.0);
        let _: i64 = cache.get_or_insert_with("square", &args(3), || 9).unwrap();
        clock.advance(10.0);

        // now - 150 lies between t1 and t2
        let removed = cache.clear(Some(Duration::from_secs(150))).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.len().unwrap(), 2);
        assert!(!cache.contains(&cache.key("square", &args(1)).unwrap()).unwrap());
        assert_paired(&cache);

        let calls = Cell::new(0);
        for x in [2, 3] {
            let _: i64 = cache
                .get_or_insert_with("square", &args(x), || {
                    calls.set(calls.get() + 1);
                    x * x
                })
                .unwrap();
        }
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_eviction_cutoff_is_strict() {
        let (mut cache, clock) = memory_cache();
        let _: i64 = cache.get_or_insert_with("f", &Args::new(), || 1).unwrap();
        clock.advance(100.0);

        // Accessed exactly at the cutoff: kept
        assert_eq!(cache.clear(Some(Duration::from_secs(100))).unwrap(), 0);
        assert_eq!(cache.len().unwrap(), 1);

        clock.advance(0.5);
        assert_eq!(cache.clear(Some(Duration::from_secs(100))).unwrap(), 1);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_full_clear() {
        let (mut cache, _) = memory_cache();
        for x in 0..4 {
            let _: i64 = cache.get_or_insert_with("square", &args(x), || x * x).unwrap();
        }

        assert_eq!(cache.clear(None).unwrap(), 4);
        assert!(cache.is_empty().unwrap());
        assert_eq!(cache.stats().unwrap(), CacheStats::default());
    }

    #[test]
    fn test_zero_max_age_clears_everything() {
        let (mut cache, _) = memory_cache();
        let _: i64 = cache.get_or_insert_with("f", &Args::new(), || 1).unwrap();
        assert_eq!(cache.clear(Some(Duration::ZERO)).unwrap(), 1);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_clear_on_empty_cache() {
        let (mut cache, _) = memory_cache();
        assert_eq!(cache.clear(None).unwrap(), 0);
        assert_eq!(cache.clear(Some(Duration::from_secs(5))).unwrap(), 0);
    }

    #[test]
    fn test_stats_tracks_oldest_and_newest() {
        let (mut cache, clock) = memory_cache();
        assert_eq!(cache.stats().unwrap().entries, 0);

        let _: i64 = cache.get_or_insert_with("square", &args(1), || 1).unwrap();
        clock.advance(30.0);
        let _: i64 = cache.get_or_insert_with("square", &args(2), || 4).unwrap();
        clock.advance(30.0);
        let _: i64 = cache.get_or_insert_with("square", &args(3), || 9).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.oldest, Some(T0));
        assert_eq!(stats.newest, Some(T0 + 60.0));
        assert_eq!(stats.oldest_age(cache.now()), Some(60.0));
        assert_eq!(stats.newest_age(cache.now()), Some(0.0));
    }

    #[test]
    fn test_wrap_memoizes_function() {
        let (mut cache, _) = memory_cache();
        let mut calls = 0;

        {
            let mut square = cache.wrap("square", |x: &i64| {
                calls += 1;
                Ok::<_, Infallible>(x * x)
            });
            assert_eq!(square.name(), "square");
            assert_eq!(square.call(&4).unwrap(), 16);
            assert_eq!(square.call(&4).unwrap(), 16);
            assert_eq!(square.call(&5).unwrap(), 25);
        }

        assert_eq!(calls, 2);
        assert_eq!(cache.stats().unwrap().entries, 2);
    }

    #[test]
    fn test_wrap_uses_same_key_as_check() {
        let (mut cache, _) = memory_cache();
        let _ = cache
            .wrap("pow", |(base, exp): &(i64, u32)| Ok::<_, Infallible>(base.pow(*exp)))
            .call(&(2, 10))
            .unwrap();

        let key = cache.key("pow", &Args::new().arg(&(2, 10)).unwrap()).unwrap();
        assert!(cache.contains(&key).unwrap());
    }

    #[test]
    fn test_square_scenario_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("square.json");
        let mut calls = 0;
        let mut square = |x: &i64| {
            calls += 1;
            Ok::<_, Infallible>(x * x)
        };

        let mut cache = PersistentCache::open(&path).unwrap();
        {
            let mut cached = cache.wrap("square", &mut square);
            assert_eq!(cached.call(&4).unwrap(), 16);
            assert_eq!(cached.call(&4).unwrap(), 16);
            assert_eq!(cached.call(&5).unwrap(), 25);
        }
        assert_eq!(cache.stats().unwrap().entries, 2);
        cache.close().unwrap();

        let mut cache = PersistentCache::open(&path).unwrap();
        assert_eq!(cache.wrap("square", &mut square).call(&4).unwrap(), 16);
        cache.close().unwrap();

        assert_eq!(calls, 2);
    }

    #[test]
    fn test_write_through_persists_without_close() {
        let dir = tempdir().unwrap();
        let config = CacheConfig::new(dir.path().join("wt.json")).with_write_through(true);

        let mut cache = PersistentCache::from_config(&config).unwrap();
        let _: i64 = cache.get_or_insert_with("f", &Args::new(), || 7).unwrap();
        assert!(!cache.store().is_dirty());

        let reopened = PersistentCache::open(&config.path).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
        cache.close().unwrap();
    }

    #[test]
    fn test_custom_representation_collapses_equivalent_arguments() {
        let dir = tempdir().unwrap();
        let case_blind = |value: &Value| -> Result<String> {
            Ok(value.as_str().map(str::to_lowercase).unwrap_or_else(|| value.to_string()))
        };
        let mut cache = PersistentCache::open_with(dir.path().join("c.json"), case_blind).unwrap();
        let calls = Cell::new(0);

        for word in ["Hello", "HELLO", "hello"] {
            let len: usize = cache
                .get_or_insert_with("len", &Args::new().arg(word).unwrap(), || {
                    calls.set(calls.get() + 1);
                    word.len()
                })
                .unwrap();
            assert_eq!(len, 5);
        }
        assert_eq!(calls.get(), 1);
        cache.close().unwrap();
    }

    #[test]
    fn test_close_reports_flush_failure() {
        let dir = tempdir().unwrap();
        let blocked = dir.path().join("sub");

        let mut cache = PersistentCache::open(blocked.join("cache.json")).unwrap();
        let _: i64 = cache.get_or_insert_with("f", &Args::new(), || 1).unwrap();
        fs::write(&blocked, b"").unwrap();

        assert!(matches!(cache.close(), Err(CacheError::Io(_))));
        assert!(blocked.is_file());
    }
}
