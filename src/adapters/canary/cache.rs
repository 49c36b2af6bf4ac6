use super::config::CanaryConfig;
use super::resolver::{StoreEntry, StoreRole, resolve};
use crate::{CacheOptions, CacheStore, Entry, Error, Matcher, Result};
use rand::Rng;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Upper bound (inclusive) for the rollout percentage.
pub const MAX_ROLLOUT_PERCENTAGE: u8 = 100;

/// Construction options for a [`CanaryCache`].
///
/// Any slot may be left empty. A facade with no stores at all is legal, though
/// every read on it fails with [`Error::NoReadStore`].
pub struct CanaryOptions<S> {
    pub canary: Option<StoreEntry<S>>,
    pub default: Option<StoreEntry<S>>,
    /// When set, this store is the only target of mutations.
    pub write: Option<StoreEntry<S>>,
    /// Share of reads, in percent, served by the canary store.
    pub rollout_percentage: u8,
}

impl<S> Default for CanaryOptions<S> {
    fn default() -> Self {
        Self {
            canary: None,
            default: None,
            write: None,
            rollout_percentage: 0,
        }
    }
}

/// Serves a sampled share of reads from a canary store and mirrors writes.
///
/// Reads (`read`, `read_entry`, `read_multi`) go to exactly one store: the
/// canary with probability `rollout_percentage / 100`, otherwise the default.
/// Each read samples independently, so consecutive reads of the same key may
/// hit different stores.
///
/// Mutations are issued, in order, to the write store alone if one is
/// configured, otherwise to every resolved store (canary, then default). They
/// run under a per-instance lock, so mutations through one facade never
/// interleave. A failing store does not stop the others: the error is logged,
/// handed to the [`CanaryConfig`] write error hook and otherwise swallowed.
///
/// Reads do not take the lock and may observe a fan-out half way through.
/// The fan-out is not atomic: if the calling task is cancelled or the process
/// dies mid fan-out, some targets hold the new state and some the old.
pub struct CanaryCache<S: CacheStore> {
    stores: Vec<Arc<S>>,
    canary: Option<Arc<S>>,
    default: Option<Arc<S>>,
    write: Option<Arc<S>>,
    rollout_percentage: u8,
    config: Arc<CanaryConfig<S>>,
    lock: Mutex<()>,
}

impl<S: CacheStore> CanaryCache<S> {
    /// Create a builder for configuring the facade.
    pub fn builder() -> CanaryCacheBuilder<S> {
        CanaryCacheBuilder::new()
    }

    /// Resolve `options` against `config` and build the facade.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the rollout percentage exceeds 100, a
    /// backend identifier is empty or unknown, a base-family slot is used with
    /// no base family configured, or a backend constructor fails.
    pub fn new(config: Arc<CanaryConfig<S>>, options: CanaryOptions<S>) -> Result<Self> {
        let CanaryOptions {
            canary,
            default,
            write,
            rollout_percentage,
        } = options;

        if rollout_percentage > MAX_ROLLOUT_PERCENTAGE {
            return Err(Error::Configuration(format!(
                "rollout percentage must be between 0 and {MAX_ROLLOUT_PERCENTAGE}, got {rollout_percentage}"
            )));
        }

        let resolved = resolve(
            &config,
            [
                (StoreRole::Canary, canary),
                (StoreRole::Default, default),
                (StoreRole::Write, write),
            ],
        )?;

        tracing::info!(
            stores = resolved.stores.len(),
            canary = resolved.canary.is_some(),
            default = resolved.default.is_some(),
            write = resolved.write.is_some(),
            rollout_percentage,
            "Canary cache configured"
        );

        Ok(Self {
            stores: resolved.stores,
            canary: resolved.canary,
            default: resolved.default,
            write: resolved.write,
            rollout_percentage,
            config,
            lock: Mutex::new(()),
        })
    }

    /// Distinct configured stores in canary, default, write order.
    pub fn stores(&self) -> &[Arc<S>] {
        &self.stores
    }

    pub fn canary_store(&self) -> Option<&Arc<S>> {
        self.canary.as_ref()
    }

    pub fn default_store(&self) -> Option<&Arc<S>> {
        self.default.as_ref()
    }

    pub fn write_store(&self) -> Option<&Arc<S>> {
        self.write.as_ref()
    }

    pub fn store(&self, role: StoreRole) -> Option<&Arc<S>> {
        match role {
            StoreRole::Canary => self.canary_store(),
            StoreRole::Default => self.default_store(),
            StoreRole::Write => self.write_store(),
        }
    }

    pub fn rollout_percentage(&self) -> u8 {
        self.rollout_percentage
    }

    pub fn config(&self) -> &Arc<CanaryConfig<S>> {
        &self.config
    }

    /// Pick the store that serves one read.
    ///
    /// Without a canary this is always the default store. Otherwise a fresh
    /// integer in `0..100` is drawn; below the rollout percentage the canary
    /// is chosen. Returns `None` only if the chosen slot is empty.
    pub fn select_read_store(&self) -> Option<&Arc<S>> {
        match &self.canary {
            Some(canary) if self.sample_canary() => Some(canary),
            _ => self.default.as_ref(),
        }
    }

    /// Stores that receive mutations: the write store alone, or every store.
    pub fn write_targets(&self) -> &[Arc<S>] {
        match &self.write {
            Some(write) => std::slice::from_ref(write),
            None => &self.stores,
        }
    }

    fn sample_canary(&self) -> bool {
        rand::rng().random_range(0..100u8) < self.rollout_percentage
    }

    fn read_store(&self) -> Result<&Arc<S>> {
        let store = self.select_read_store().ok_or(Error::NoReadStore)?;
        tracing::debug!(
            target_store = if self.is_canary(store) { "canary" } else { "default" },
            "Routing read"
        );
        Ok(store)
    }

    fn is_canary(&self, store: &Arc<S>) -> bool {
        self.canary.as_ref().is_some_and(|c| Arc::ptr_eq(c, store))
    }

    /// Run `op` against every write target under the instance lock.
    ///
    /// Returns one slot per target, in target order; failed targets are `None`.
    async fn fan_out<'a, T, F, Fut>(&'a self, operation: &'static str, op: F) -> Vec<Option<T>>
    where
        F: Fn(&'a S) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let targets = self.write_targets();
        let _guard = self.lock.lock().await;
        tracing::debug!(operation, targets = targets.len(), "Fanning out mutation");

        let mut results = Vec::with_capacity(targets.len());
        for (idx, store) in targets.iter().enumerate() {
            match op(store.as_ref()).await {
                Ok(value) => results.push(Some(value)),
                Err(e) => {
                    tracing::warn!(
                        operation,
                        store_index = idx,
                        error = ?e,
                        "Store mutation failed, continuing with remaining stores"
                    );
                    self.config.report_write_error(&e, store.as_ref());
                    results.push(None);
                }
            }
        }
        results
    }
}

impl<S: CacheStore> Debug for CanaryCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanaryCache")
            .field("canary", &self.canary)
            .field("default", &self.default)
            .field("write", &self.write)
            .field("store_count", &self.stores.len())
            .field("rollout_percentage", &self.rollout_percentage)
            .finish()
    }
}

impl<S: CacheStore> CacheStore for CanaryCache<S> {
    type Value = S::Value;

    async fn read(&self, key: &str, options: &CacheOptions) -> Result<Option<Self::Value>> {
        self.read_store()?.read(key, options).await
    }

    async fn read_multi(
        &self,
        keys: &[String],
        options: &CacheOptions,
    ) -> Result<HashMap<String, Self::Value>> {
        self.read_store()?.read_multi(keys, options).await
    }

    async fn read_entry(
        &self,
        key: &str,
        options: &CacheOptions,
    ) -> Result<Option<Entry<Self::Value>>> {
        self.read_store()?.read_entry(key, options).await
    }

    async fn write_entry(
        &self,
        key: &str,
        entry: Entry<Self::Value>,
        options: &CacheOptions,
    ) -> Result<bool> {
        self.fan_out("write_entry", |store| {
            store.write_entry(key, entry.clone(), options)
        })
        .await;
        Ok(true)
    }

    async fn delete_entry(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        self.fan_out("delete_entry", |store| store.delete_entry(key, options))
            .await;
        Ok(true)
    }

    /// Returns the first value reported by a target, in target order.
    async fn increment(&self, key: &str, amount: i64, options: &CacheOptions) -> Result<Option<i64>> {
        let results = self
            .fan_out("increment", |store| store.increment(key, amount, options))
            .await;
        Ok(results.into_iter().find_map(Option::flatten))
    }

    async fn decrement(&self, key: &str, amount: i64, options: &CacheOptions) -> Result<Option<i64>> {
        let results = self
            .fan_out("decrement", |store| store.decrement(key, amount, options))
            .await;
        Ok(results.into_iter().find_map(Option::flatten))
    }

    async fn cleanup(&self, options: &CacheOptions) -> Result<bool> {
        self.fan_out("cleanup", |store| store.cleanup(options)).await;
        Ok(true)
    }

    async fn clear(&self, options: &CacheOptions) -> Result<bool> {
        self.fan_out("clear", |store| store.clear(options)).await;
        Ok(true)
    }

    async fn delete_matched(&self, matcher: &Matcher, options: &CacheOptions) -> Result<bool> {
        self.fan_out("delete_matched", |store| store.delete_matched(matcher, options))
            .await;
        Ok(true)
    }
}

/// Builder for [`CanaryCache`].
pub struct CanaryCacheBuilder<S> {
    options: CanaryOptions<S>,
}

impl<S: CacheStore> CanaryCacheBuilder<S> {
    /// Create a new builder with no stores and a rollout of 0%.
    pub fn new() -> Self {
        Self {
            options: CanaryOptions::default(),
        }
    }

    /// Set the canary store.
    pub fn canary_store(mut self, entry: StoreEntry<S>) -> Self {
        self.options.canary = Some(entry);
        self
    }

    /// Set the default store.
    pub fn default_store(mut self, entry: StoreEntry<S>) -> Self {
        self.options.default = Some(entry);
        self
    }

    /// Set a dedicated write store.
    pub fn write_store(mut self, entry: StoreEntry<S>) -> Self {
        self.options.write = Some(entry);
        self
    }

    /// Set the share of reads, in percent, served by the canary (default: 0).
    pub fn rollout_percentage(mut self, percentage: u8) -> Self {
        self.options.rollout_percentage = percentage;
        self
    }

    /// Build the facade. See [`CanaryCache::new`] for the failure modes.
    pub fn build(self, config: Arc<CanaryConfig<S>>) -> Result<CanaryCache<S>> {
        CanaryCache::new(config, self.options)
    }
}

impl<S: CacheStore> Default for CanaryCacheBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CacheStore> Debug for CanaryCacheBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanaryCacheBuilder")
            .field("canary", &self.options.canary.is_some())
            .field("default", &self.options.default.is_some())
            .field("write", &self.options.write.is_some())
            .field("rollout_percentage", &self.options.rollout_percentage)
            .finish()
    }
}
