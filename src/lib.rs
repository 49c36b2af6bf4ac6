//! A cache-store facade for trialling a new cache backend on live traffic.
//!
//! [`CanaryCache`] wraps up to three [`CacheStore`]s: a *canary* being evaluated,
//! a known-good *default*, and an optional dedicated *write* store. A configurable
//! percentage of reads is served by the canary; every other read goes to the
//! default. Mutations are mirrored to every configured store (or only to the
//! write store when one is set) so that whichever store ends up serving a read
//! has the same contents.
//!
//! ```
//! # #[cfg(feature = "memory")]
//! # async fn example() -> canary_cache::Result<()> {
//! use std::sync::Arc;
//! use canary_cache::{CacheOptions, CacheStoreExt, MemoryCache};
//! use canary_cache::canary::{CanaryCache, CanaryConfig, StoreEntry};
//!
//! let config = Arc::new(CanaryConfig::<MemoryCache>::new());
//! let cache = CanaryCache::builder()
//!     .canary_store(StoreEntry::store(MemoryCache::new()))
//!     .default_store(StoreEntry::store(MemoryCache::new()))
//!     .rollout_percentage(10)
//!     .build(config)?;
//!
//! cache.write("greeting", b"hello".to_vec(), &CacheOptions::new()).await?;
//! assert_eq!(cache.stores().len(), 2);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;

#[cfg(feature = "memory")]
pub use adapters::memory::MemoryCache;

pub use adapters::canary;
pub use canary::CanaryCache;
pub use entry::{CacheOptions, Entry, Matcher};

mod entry;

/// A specialized Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A unified Error type for cache operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid facade or backend configuration. Raised only at construction.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cache backend connection error")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("IO Error")]
    Io(#[from] std::io::Error),

    /// The read router picked a slot that holds no store.
    #[error("No store configured to serve reads")]
    NoReadStore,

    /// A stored value cannot be used for the requested operation.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Generic cache error: {0}")]
    Generic(String),
}

/// Backend and composition modules.
pub mod adapters {
    pub mod canary;
    #[cfg(feature = "memory")]
    pub mod memory;
}

/// The capability set every backing cache store provides.
///
/// `Value` is the cached payload; it is opaque to the canary facade, which only
/// moves it between the caller and its stores. Every operation takes a
/// [`CacheOptions`] bag of backend-specific hints.
pub trait CacheStore: Send + Sync + Debug {
    /// The payload type stored by this backend.
    type Value: Clone + Debug + Send + Sync + 'static;

    /// Read a live value.
    fn read(
        &self,
        key: &str,
        options: &CacheOptions,
    ) -> impl Future<Output = Result<Option<Self::Value>>> + Send;

    /// Read several keys at once. Missing keys are absent from the map.
    fn read_multi(
        &self,
        keys: &[String],
        options: &CacheOptions,
    ) -> impl Future<Output = Result<HashMap<String, Self::Value>>> + Send;

    /// Read the raw entry for `key`, including its metadata.
    fn read_entry(
        &self,
        key: &str,
        options: &CacheOptions,
    ) -> impl Future<Output = Result<Option<Entry<Self::Value>>>> + Send;

    fn write_entry(
        &self,
        key: &str,
        entry: Entry<Self::Value>,
        options: &CacheOptions,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Remove `key`. Returns whether anything was removed.
    fn delete_entry(
        &self,
        key: &str,
        options: &CacheOptions,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Increment a numeric value, returning the new value if the backend tracks one.
    fn increment(
        &self,
        key: &str,
        amount: i64,
        options: &CacheOptions,
    ) -> impl Future<Output = Result<Option<i64>>> + Send;

    fn decrement(
        &self,
        key: &str,
        amount: i64,
        options: &CacheOptions,
    ) -> impl Future<Output = Result<Option<i64>>> + Send;

    /// Drop expired entries.
    fn cleanup(&self, options: &CacheOptions) -> impl Future<Output = Result<bool>> + Send;

    /// Drop every entry.
    fn clear(&self, options: &CacheOptions) -> impl Future<Output = Result<bool>> + Send;

    /// Drop every entry whose key satisfies `matcher`.
    fn delete_matched(
        &self,
        matcher: &Matcher,
        options: &CacheOptions,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// Convenience methods built on [`CacheStore`] primitives.
///
/// On a [`CanaryCache`] these inherit the facade's routing: the read half is
/// sampled between canary and default, the write half is mirrored.
pub trait CacheStoreExt: CacheStore {
    /// Wrap `value` in an [`Entry`] (honouring `expires_in` and `version`) and write it.
    fn write(
        &self,
        key: &str,
        value: Self::Value,
        options: &CacheOptions,
    ) -> impl Future<Output = Result<bool>> + Send {
        async move {
            self.write_entry(key, Entry::with_options(value, options), options)
                .await
        }
    }

    /// Returns true if a live, version-matching entry exists for `key`.
    fn exist(&self, key: &str, options: &CacheOptions) -> impl Future<Output = Result<bool>> + Send {
        async move {
            Ok(self
                .read_entry(key, options)
                .await?
                .is_some_and(|entry| !entry.is_expired() && !entry.mismatched(options)))
        }
    }

    /// Read `key`, or compute, store and return it on a miss.
    ///
    /// Errors from `compute` are returned without writing anything.
    fn fetch<F, Fut>(
        &self,
        key: &str,
        options: &CacheOptions,
        compute: F,
    ) -> impl Future<Output = Result<Self::Value>> + Send
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Self::Value>> + Send,
    {
        async move {
            if let Some(entry) = self.read_entry(key, options).await? {
                if !entry.is_expired() && !entry.mismatched(options) {
                    return Ok(entry.value);
                }
            }

            let value = compute().await?;
            self.write_entry(key, Entry::with_options(value.clone(), options), options)
                .await?;
            Ok(value)
        }
    }
}

impl<T: CacheStore + ?Sized> CacheStoreExt for T {}
