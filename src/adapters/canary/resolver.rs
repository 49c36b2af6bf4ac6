use super::config::CanaryConfig;
use super::registry::{BackendArgs, Constructor};
use crate::{CacheStore, Error, Result};
use std::fmt;
use std::sync::Arc;

/// The three positions a store can occupy in a [`CanaryCache`](super::CanaryCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreRole {
    Canary,
    Default,
    Write,
}

impl StoreRole {
    /// Roles in priority order; resolved stores follow this order.
    pub const ALL: [StoreRole; 3] = [StoreRole::Canary, StoreRole::Default, StoreRole::Write];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreRole::Canary => "canary",
            StoreRole::Default => "default",
            StoreRole::Write => "write",
        }
    }
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a slot is configured.
#[derive(Debug)]
pub enum StoreEntry<S> {
    /// An already constructed store. Passing the same `Arc` to several slots
    /// shares one store between them.
    Store(Arc<S>),
    /// Build a store through the registry.
    Backend { id: String, args: BackendArgs },
    /// Build a store with the configured base backend family.
    Base(BackendArgs),
}

impl<S> StoreEntry<S> {
    pub fn store(store: S) -> Self {
        StoreEntry::Store(Arc::new(store))
    }

    pub fn shared(store: Arc<S>) -> Self {
        StoreEntry::Store(store)
    }

    pub fn backend(id: impl Into<String>, args: BackendArgs) -> Self {
        StoreEntry::Backend {
            id: id.into(),
            args,
        }
    }

    pub fn base(args: BackendArgs) -> Self {
        StoreEntry::Base(args)
    }
}

/// Output of resolution: the named slots plus the de-duplicated store list.
pub(crate) struct ResolvedStores<S> {
    pub canary: Option<Arc<S>>,
    pub default: Option<Arc<S>>,
    pub write: Option<Arc<S>>,
    pub stores: Vec<Arc<S>>,
}

enum Plan<'r, S> {
    Ready(Arc<S>),
    Construct {
        id: String,
        constructor: &'r Constructor<S>,
        args: BackendArgs,
    },
}

/// Resolve the configured slots into stores.
///
/// Every backend identifier is looked up before any constructor runs, so an
/// unknown identifier fails without building anything.
pub(crate) fn resolve<S: CacheStore>(
    config: &CanaryConfig<S>,
    slots: [(StoreRole, Option<StoreEntry<S>>); 3],
) -> Result<ResolvedStores<S>> {
    let mut plans = Vec::with_capacity(slots.len());
    for (role, entry) in slots {
        let Some(entry) = entry else { continue };
        let plan = match entry {
            StoreEntry::Store(store) => Plan::Ready(store),
            StoreEntry::Backend { id, args } => plan_backend(config, role, id, args)?,
            StoreEntry::Base(args) => {
                let id = config.base_backend_id().ok_or_else(|| {
                    Error::Configuration(format!(
                        "{role} store requests the base backend but none is configured"
                    ))
                })?;
                plan_backend(config, role, id.to_string(), args)?
            }
        };
        plans.push((role, plan));
    }

    let mut resolved = ResolvedStores {
        canary: None,
        default: None,
        write: None,
        stores: Vec::with_capacity(plans.len()),
    };

    for (role, plan) in plans {
        let store = match plan {
            Plan::Ready(store) => store,
            Plan::Construct {
                id,
                constructor,
                args,
            } => {
                tracing::debug!(%role, backend = %id, "Constructing store");
                let store = constructor(args).map_err(|e| {
                    Error::Configuration(format!(
                        "failed to construct {role} store with backend `{id}`: {e}"
                    ))
                })?;
                Arc::new(store)
            }
        };

        if !resolved.stores.iter().any(|s| Arc::ptr_eq(s, &store)) {
            resolved.stores.push(store.clone());
        }

        match role {
            StoreRole::Canary => resolved.canary = Some(store),
            StoreRole::Default => resolved.default = Some(store),
            StoreRole::Write => resolved.write = Some(store),
        }
    }

    Ok(resolved)
}

fn plan_backend<S: CacheStore>(
    config: &CanaryConfig<S>,
    role: StoreRole,
    id: String,
    args: BackendArgs,
) -> Result<Plan<'_, S>> {
    let constructor = config.registry().lookup(&id).map_err(|e| match e {
        Error::Configuration(msg) => Error::Configuration(format!("{role} store: {msg}")),
        other => other,
    })?;
    Ok(Plan::Construct {
        id,
        constructor,
        args,
    })
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::MemoryCache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn slots(
        canary: Option<StoreEntry<MemoryCache>>,
        default: Option<StoreEntry<MemoryCache>>,
        write: Option<StoreEntry<MemoryCache>>,
    ) -> [(StoreRole, Option<StoreEntry<MemoryCache>>); 3] {
        [
            (StoreRole::Canary, canary),
            (StoreRole::Default, default),
            (StoreRole::Write, write),
        ]
    }

    #[test]
    fn test_order_skips_absent_slots() {
        let config = CanaryConfig::new();
        let default = Arc::new(MemoryCache::new());
        let write = Arc::new(MemoryCache::new());

        let resolved = resolve(
            &config,
            slots(
                None,
                Some(StoreEntry::shared(default.clone())),
                Some(StoreEntry::shared(write.clone())),
            ),
        )
        .unwrap();

        assert!(resolved.canary.is_none());
        assert_eq!(resolved.stores.len(), 2);
        assert!(Arc::ptr_eq(&resolved.stores[0], &default));
        assert!(Arc::ptr_eq(&resolved.stores[1], &write));
    }

    #[test]
    fn test_shared_store_listed_once() {
        let config = CanaryConfig::new();
        let shared = Arc::new(MemoryCache::new());

        let resolved = resolve(
            &config,
            slots(
                Some(StoreEntry::shared(shared.clone())),
                Some(StoreEntry::shared(shared.clone())),
                None,
            ),
        )
        .unwrap();

        assert_eq!(resolved.stores.len(), 1);
        assert!(Arc::ptr_eq(resolved.canary.as_ref().unwrap(), &shared));
        assert!(Arc::ptr_eq(resolved.default.as_ref().unwrap(), &shared));
    }

    #[test]
    fn test_unknown_backend_constructs_nothing() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let mut registry = crate::canary::BackendRegistry::new();
        registry.register("memory_store", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(MemoryCache::new())
        });
        let config = CanaryConfig::with_registry(registry);

        let result = resolve(
            &config,
            slots(
                Some(StoreEntry::backend("memory_store", BackendArgs::new())),
                Some(StoreEntry::backend("nope", BackendArgs::new())),
                None,
            ),
        );

        match result {
            Err(Error::Configuration(msg)) => {
                assert!(msg.contains("default store"));
                assert!(msg.contains("nope"));
            }
            _ => panic!("expected configuration error"),
        }
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_base_backend() {
        let mut registry = crate::canary::BackendRegistry::new();
        MemoryCache::register(&mut registry);

        let config = CanaryConfig::with_registry(registry).base_backend("memory_store");
        let resolved = resolve(
            &config,
            slots(
                None,
                Some(StoreEntry::base(BackendArgs::new().with("max_entries", "8"))),
                None,
            ),
        )
        .unwrap();
        assert_eq!(resolved.default.unwrap().max_entries(), Some(8));
    }

    #[test]
    fn test_base_backend_missing() {
        let config = CanaryConfig::<MemoryCache>::new();
        let result = resolve(
            &config,
            slots(Some(StoreEntry::base(BackendArgs::new())), None, None),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_constructor_failure_is_configuration_error() {
        let mut registry = crate::canary::BackendRegistry::new();
        MemoryCache::register(&mut registry);
        let config = CanaryConfig::with_registry(registry);

        let result = resolve(
            &config,
            slots(
                Some(StoreEntry::backend(
                    "memory_store",
                    BackendArgs::new().with("max_entries", "zero"),
                )),
                None,
                None,
            ),
        );
        match result {
            Err(Error::Configuration(msg)) => assert!(msg.contains("canary")),
            _ => panic!("expected configuration error"),
        }
    }
}
