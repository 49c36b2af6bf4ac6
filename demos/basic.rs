//! Canary rollout between two [`MemoryCache`] backends.
//!
//! Run with:
//! ```sh
//! RUST_LOG=canary_cache=debug cargo run --example basic --features="memory"
//! ```

use std::sync::Arc;

use canary_cache::canary::{BackendArgs, BackendRegistry, CanaryCache, CanaryConfig, StoreEntry};
use canary_cache::{CacheOptions, CacheStore, CacheStoreExt, MemoryCache};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut registry = BackendRegistry::new();
    MemoryCache::register(&mut registry);

    let config = Arc::new(
        CanaryConfig::with_registry(registry)
            .base_backend("memory_store")
            .on_write_error(|error, store: &MemoryCache| {
                eprintln!("write to {store:?} failed: {error}");
            }),
    );

    let cache = CanaryCache::builder()
        .canary_store(StoreEntry::base(BackendArgs::new().with("max_entries", "1000")))
        .default_store(StoreEntry::base(BackendArgs::new()))
        .rollout_percentage(20)
        .build(config)?;

    let opts = CacheOptions::new();

    // Write: mirrored to both stores
    cache.write("hello", b"Hello, World!".to_vec(), &opts).await?;

    // Read: served by the canary about one time in five
    let mut canary_hits = 0;
    for _ in 0..100 {
        let store = cache.select_read_store().expect("default store is configured");
        if cache.canary_store().is_some_and(|c| Arc::ptr_eq(c, store)) {
            canary_hits += 1;
        }
    }
    println!("canary would have served {canary_hits}/100 reads");

    let value = cache.read("hello", &opts).await?;
    println!("hello: {}", String::from_utf8_lossy(&value.unwrap_or_default()));

    // Counters: the first store's result is returned
    cache.increment("visits", 1, &opts).await?;
    let visits = cache.increment("visits", 1, &opts).await?;
    println!("visits: {visits:?}");

    // Read-or-compute
    let computed = cache
        .fetch("expensive", &opts, || async { Ok(b"42".to_vec()) })
        .await?;
    println!("expensive: {}", String::from_utf8_lossy(&computed));

    for (idx, store) in cache.stores().iter().enumerate() {
        println!("store {idx}: {store:?}");
    }

    Ok(())
}
