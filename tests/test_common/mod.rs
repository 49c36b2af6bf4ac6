//! Shared test helpers: a recording cache store with failure injection.
#![allow(dead_code)]

use canary_cache::{CacheOptions, CacheStore, Entry, Error, Matcher, MemoryCache, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// One call observed by a [`RecordingStore`], with owned copies of its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Read { key: String, options: CacheOptions },
    ReadMulti { keys: Vec<String>, options: CacheOptions },
    ReadEntry { key: String, options: CacheOptions },
    WriteEntry { key: String, entry: Entry<Vec<u8>>, options: CacheOptions },
    DeleteEntry { key: String, options: CacheOptions },
    Increment { key: String, amount: i64, options: CacheOptions },
    Decrement { key: String, amount: i64, options: CacheOptions },
    Cleanup { options: CacheOptions },
    Clear { options: CacheOptions },
    DeleteMatched { matcher: Matcher, options: CacheOptions },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::Read { .. } => "read",
            Call::ReadMulti { .. } => "read_multi",
            Call::ReadEntry { .. } => "read_entry",
            Call::WriteEntry { .. } => "write_entry",
            Call::DeleteEntry { .. } => "delete_entry",
            Call::Increment { .. } => "increment",
            Call::Decrement { .. } => "decrement",
            Call::Cleanup { .. } => "cleanup",
            Call::Clear { .. } => "clear",
            Call::DeleteMatched { .. } => "delete_matched",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Call::Read { .. } | Call::ReadMulti { .. } | Call::ReadEntry { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub store: String,
    pub call: Call,
}

/// A [`CacheStore`] backed by a [`MemoryCache`] that records every call.
///
/// Stores created with [`RecordingStore::sharing_log`] append to the same log,
/// which shows the relative order of calls across stores.
#[derive(Debug, Clone)]
pub struct RecordingStore {
    name: String,
    inner: MemoryCache,
    log: Arc<Mutex<Vec<Recorded>>>,
    failing: Arc<Mutex<HashSet<&'static str>>>,
}

impl RecordingStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: MemoryCache::new(),
            log: Arc::default(),
            failing: Arc::default(),
        }
    }

    pub fn sharing_log(name: &str, other: &RecordingStore) -> Self {
        Self {
            log: other.log.clone(),
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inner(&self) -> &MemoryCache {
        &self.inner
    }

    /// Make every future call to `operation` fail.
    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    /// Calls made on this store, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.store == self.name)
            .map(|r| r.call.clone())
            .collect()
    }

    pub fn calls_named(&self, operation: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.name() == operation)
            .collect()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls().iter().filter(|c| c.is_mutation()).count()
    }

    /// The whole shared log, across every store sharing it.
    pub fn log(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<()> {
        let name = call.name();
        self.log.lock().unwrap().push(Recorded {
            store: self.name.clone(),
            call,
        });
        if self.failing.lock().unwrap().contains(name) {
            return Err(Error::Generic(format!("{}: injected {name} failure", self.name)));
        }
        Ok(())
    }
}

impl CacheStore for RecordingStore {
    type Value = Vec<u8>;

    async fn read(&self, key: &str, options: &CacheOptions) -> Result<Option<Self::Value>> {
        self.record(Call::Read {
            key: key.to_string(),
            options: options.clone(),
        })?;
        self.inner.read(key, options).await
    }

    async fn read_multi(
        &self,
        keys: &[String],
        options: &CacheOptions,
    ) -> Result<HashMap<String, Self::Value>> {
        self.record(Call::ReadMulti {
            keys: keys.to_vec(),
            options: options.clone(),
        })?;
        self.inner.read_multi(keys, options).await
    }

    async fn read_entry(
        &self,
        key: &str,
        options: &CacheOptions,
    ) -> Result<Option<Entry<Self::Value>>> {
        self.record(Call::ReadEntry {
            key: key.to_string(),
            options: options.clone(),
        })?;
        self.inner.read_entry(key, options).await
    }

    async fn write_entry(
        &self,
        key: &str,
        entry: Entry<Self::Value>,
        options: &CacheOptions,
    ) -> Result<bool> {
        tokio::task::yield_now().await;
        self.record(Call::WriteEntry {
            key: key.to_string(),
            entry: entry.clone(),
            options: options.clone(),
        })?;
        tokio::task::yield_now().await;
        self.inner.write_entry(key, entry, options).await
    }

    async fn delete_entry(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        self.record(Call::DeleteEntry {
            key: key.to_string(),
            options: options.clone(),
        })?;
        self.inner.delete_entry(key, options).await
    }

    async fn increment(&self, key: &str, amount: i64, options: &CacheOptions) -> Result<Option<i64>> {
        self.record(Call::Increment {
            key: key.to_string(),
            amount,
            options: options.clone(),
        })?;
        self.inner.increment(key, amount, options).await
    }

    async fn decrement(&self, key: &str, amount: i64, options: &CacheOptions) -> Result<Option<i64>> {
        self.record(Call::Decrement {
            key: key.to_string(),
            amount,
            options: options.clone(),
        })?;
        self.inner.decrement(key, amount, options).await
    }

    async fn cleanup(&self, options: &CacheOptions) -> Result<bool> {
        self.record(Call::Cleanup {
            options: options.clone(),
        })?;
        self.inner.cleanup(options).await
    }

    async fn clear(&self, options: &CacheOptions) -> Result<bool> {
        self.record(Call::Clear {
            options: options.clone(),
        })?;
        self.inner.clear(options).await
    }

    async fn delete_matched(&self, matcher: &Matcher, options: &CacheOptions) -> Result<bool> {
        self.record(Call::DeleteMatched {
            matcher: matcher.clone(),
            options: options.clone(),
        })?;
        self.inner.delete_matched(matcher, options).await
    }
}

/// Route `tracing` output to the test harness when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
