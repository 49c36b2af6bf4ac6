//! Canary rollout of a cache backend.
//!
//! [`CanaryCache`] composes up to three stores of one backend type:
//!
//! - **canary** - the store under evaluation; serves `rollout_percentage`% of reads
//! - **default** - the known-good store; serves every other read
//! - **write** - optional; when set it is the only store that receives mutations
//!
//! Without a write store, every mutation (`write_entry`, `delete_entry`,
//! `increment`, `decrement`, `cleanup`, `clear`, `delete_matched`) is mirrored to
//! the canary and the default so both stay in step regardless of which one a
//! later read lands on.
//!
//! Stores are either supplied directly or built by name from a
//! [`BackendRegistry`] held in the shared [`CanaryConfig`].
//!
//! # Examples
//!
//! ## Stores by name
//!
//! ```
//! # #[cfg(feature = "memory")]
//! # async fn example() -> canary_cache::Result<()> {
//! use std::sync::Arc;
//! use canary_cache::{CacheOptions, CacheStore, MemoryCache};
//! use canary_cache::canary::{BackendArgs, BackendRegistry, CanaryCache, CanaryConfig, StoreEntry};
//!
//! let mut registry = BackendRegistry::new();
//! MemoryCache::register(&mut registry);
//!
//! let config = Arc::new(
//!     CanaryConfig::with_registry(registry).on_write_error(|error, store: &MemoryCache| {
//!         eprintln!("write to {store:?} failed: {error}");
//!     }),
//! );
//!
//! let cache = CanaryCache::builder()
//!     .canary_store(StoreEntry::backend("memory_store", BackendArgs::new().with("max_entries", "1024")))
//!     .default_store(StoreEntry::backend("memory_store", BackendArgs::new()))
//!     .rollout_percentage(25)
//!     .build(config)?;
//!
//! cache.increment("hits", 1, &CacheOptions::new()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Dedicated write store
//!
//! ```
//! # #[cfg(feature = "memory")]
//! # async fn example() -> canary_cache::Result<()> {
//! use std::sync::Arc;
//! use canary_cache::{CacheOptions, CacheStoreExt, MemoryCache};
//! use canary_cache::canary::{CanaryCache, CanaryConfig, StoreEntry};
//!
//! let write = Arc::new(MemoryCache::new());
//! let cache = CanaryCache::builder()
//!     .default_store(StoreEntry::store(MemoryCache::new()))
//!     .write_store(StoreEntry::shared(write.clone()))
//!     .build(Arc::new(CanaryConfig::new()))?;
//!
//! cache.write("k", b"v".to_vec(), &CacheOptions::new()).await?;
//! assert_eq!(write.len(), 1);
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod registry;
mod resolver;

pub use cache::{CanaryCache, CanaryCacheBuilder, CanaryOptions, MAX_ROLLOUT_PERCENTAGE};
pub use config::{CanaryConfig, WriteErrorHook};
pub use registry::{BackendArgs, BackendRegistry, Constructor};
pub use resolver::{StoreEntry, StoreRole};
