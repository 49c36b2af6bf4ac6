use crate::canary::{BackendArgs, BackendRegistry};
use crate::{CacheOptions, CacheStore, Entry, Error, Matcher, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// Identifier under which [`MemoryCache::register`] installs the constructor.
pub const MEMORY_BACKEND: &str = "memory_store";

/// A simple in-memory [`CacheStore`].
///
/// - `Value` is `Vec<u8>`.
/// - Expiry is checked lazily on read; [`cleanup`](CacheStore::cleanup) sweeps expired entries.
/// - `increment`/`decrement` treat the payload as a UTF-8 decimal integer.
/// - With `max_entries` set, the oldest insertion is evicted once the bound is exceeded.
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryCache {
    inner: Arc<RwLock<State>>,
    max_entries: Option<usize>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Slot>,
    next_seq: u64,
}

struct Slot {
    seq: u64,
    entry: Entry<Vec<u8>>,
}

impl State {
    fn insert(&mut self, key: String, entry: Entry<Vec<u8>>, max_entries: Option<usize>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key, Slot { seq, entry });

        if let Some(max) = max_entries {
            while self.entries.len() > max {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|(_, slot)| slot.seq)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        tracing::debug!(key = %k, "Evicting oldest entry");
                        self.entries.remove(&k);
                    }
                    None => break,
                }
            }
        }
    }

    /// Fetch a live entry, dropping it if it has expired.
    fn live(&mut self, key: &str) -> Option<&Entry<Vec<u8>>> {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|slot| slot.entry.is_expired());
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|slot| &slot.entry)
    }
}

impl MemoryCache {
    /// Create a new empty, unbounded in-memory cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an in-memory cache holding at most `max_entries` entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            inner: Arc::default(),
            max_entries: Some(max_entries),
        }
    }

    /// Build from registry arguments. Accepts a `max_entries` named argument.
    pub fn from_args(args: BackendArgs) -> Result<Self> {
        match args.parse::<usize>("max_entries")? {
            Some(0) => Err(Error::Configuration(
                "max_entries must be greater than zero".to_string(),
            )),
            Some(max) => Ok(Self::with_max_entries(max)),
            None => Ok(Self::new()),
        }
    }

    /// Register this backend under [`MEMORY_BACKEND`].
    pub fn register(registry: &mut BackendRegistry<MemoryCache>) {
        registry.register(MEMORY_BACKEND, MemoryCache::from_args);
    }

    /// Returns the number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.read().expect("poisoned lock").entries.len()
    }

    /// Returns true if there are no stored entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    /// Returns true if a raw key is present, ignoring expiry (useful for tests).
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner
            .read()
            .expect("poisoned lock")
            .entries
            .contains_key(key)
    }

    fn adjust(&self, key: &str, delta: i64, options: &CacheOptions) -> Result<Option<i64>> {
        let key = options.namespaced_key(key);
        let mut state = self.inner.write().expect("poisoned lock");

        let (current, expires_at, version) = match state.live(&key) {
            Some(entry) => {
                let text = std::str::from_utf8(&entry.value)
                    .map_err(|e| Error::InvalidValue(format!("{key}: invalid utf-8: {e}")))?;
                let n = text
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| Error::InvalidValue(format!("{key}: not an integer: {e}")))?;
                (n, entry.expires_at, entry.version.clone())
            }
            None => {
                let fresh = Entry::with_options((), options);
                (0, fresh.expires_at, fresh.version)
            }
        };

        let updated = current
            .checked_add(delta)
            .ok_or_else(|| Error::InvalidValue(format!("{key}: integer overflow")))?;

        let entry = Entry {
            value: updated.to_string().into_bytes(),
            expires_at,
            version,
        };
        state.insert(key, entry, self.max_entries);
        Ok(Some(updated))
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Avoid dumping potentially large in-memory contents.
        f.debug_struct("MemoryCache")
            .field("len", &self.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl CacheStore for MemoryCache {
    type Value = Vec<u8>;

    async fn read(&self, key: &str, options: &CacheOptions) -> Result<Option<Self::Value>> {
        Ok(self
            .read_entry(key, options)
            .await?
            .filter(|entry| !entry.mismatched(options))
            .map(Entry::into_value))
    }

    async fn read_multi(
        &self,
        keys: &[String],
        options: &CacheOptions,
    ) -> Result<HashMap<String, Self::Value>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.read(key, options).await? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn read_entry(
        &self,
        key: &str,
        options: &CacheOptions,
    ) -> Result<Option<Entry<Self::Value>>> {
        let key = options.namespaced_key(key);
        let mut state = self.inner.write().expect("poisoned lock");
        Ok(state.live(&key).cloned())
    }

    async fn write_entry(
        &self,
        key: &str,
        entry: Entry<Self::Value>,
        options: &CacheOptions,
    ) -> Result<bool> {
        let key = options.namespaced_key(key);
        let mut state = self.inner.write().expect("poisoned lock");
        state.insert(key, entry, self.max_entries);
        Ok(true)
    }

    async fn delete_entry(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        let key = options.namespaced_key(key);
        let mut state = self.inner.write().expect("poisoned lock");
        Ok(state.entries.remove(&key).is_some())
    }

    async fn increment(&self, key: &str, amount: i64, options: &CacheOptions) -> Result<Option<i64>> {
        self.adjust(key, amount, options)
    }

    async fn decrement(&self, key: &str, amount: i64, options: &CacheOptions) -> Result<Option<i64>> {
        let delta = amount
            .checked_neg()
            .ok_or_else(|| Error::InvalidValue("decrement amount out of range".to_string()))?;
        self.adjust(key, delta, options)
    }

    async fn cleanup(&self, _options: &CacheOptions) -> Result<bool> {
        let now = SystemTime::now();
        let mut state = self.inner.write().expect("poisoned lock");
        let before = state.entries.len();
        state.entries.retain(|_, slot| !slot.entry.is_expired_at(now));
        tracing::debug!(removed = before - state.entries.len(), "Swept expired entries");
        Ok(true)
    }

    async fn clear(&self, _options: &CacheOptions) -> Result<bool> {
        self.inner.write().expect("poisoned lock").entries.clear();
        Ok(true)
    }

    async fn delete_matched(&self, matcher: &Matcher, options: &CacheOptions) -> Result<bool> {
        let prefix = options.namespace.as_ref().map(|ns| format!("{ns}:"));
        let mut state = self.inner.write().expect("poisoned lock");
        state.entries.retain(|key, _| {
            let local = match &prefix {
                Some(p) => match key.strip_prefix(p.as_str()) {
                    Some(rest) => rest,
                    None => return true,
                },
                None => key.as_str(),
            };
            !matcher.matches(local)
        });
        Ok(true)
    }
}
