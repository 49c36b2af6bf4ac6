use super::registry::BackendRegistry;
use crate::{CacheStore, Error};
use std::fmt::{self, Debug};
use std::sync::{Arc, RwLock};

/// Callback invoked once per store that fails during a write fan-out.
///
/// Receives the error and the store that produced it.
pub type WriteErrorHook<S> = Arc<dyn Fn(&Error, &S) + Send + Sync>;

/// Process-wide settings shared by every [`CanaryCache`](super::CanaryCache).
///
/// Create one at startup, wrap it in an [`Arc`] and hand it to each facade.
/// It carries the backend registry used to resolve [`StoreEntry`](super::StoreEntry)
/// values, the base backend family used for [`StoreEntry::Base`](super::StoreEntry::Base),
/// and the write error hook.
///
/// The hook may be replaced at any time; the most recent
/// [`set_on_write_error`](Self::set_on_write_error) wins. A fan-out running while
/// the hook is replaced may report to either the old or the new callback.
pub struct CanaryConfig<S: CacheStore> {
    registry: BackendRegistry<S>,
    base_backend: Option<String>,
    on_write_error: RwLock<Option<WriteErrorHook<S>>>,
}

impl<S: CacheStore> CanaryConfig<S> {
    /// Configuration with an empty registry, no base family and no hook.
    pub fn new() -> Self {
        Self::with_registry(BackendRegistry::new())
    }

    pub fn with_registry(registry: BackendRegistry<S>) -> Self {
        Self {
            registry,
            base_backend: None,
            on_write_error: RwLock::new(None),
        }
    }

    /// Select the backend family used for [`StoreEntry::Base`](super::StoreEntry::Base) slots.
    pub fn base_backend(mut self, id: impl Into<String>) -> Self {
        self.base_backend = Some(id.into());
        self
    }

    /// Install the write error hook at construction time.
    pub fn on_write_error<F>(self, hook: F) -> Self
    where
        F: Fn(&Error, &S) + Send + Sync + 'static,
    {
        self.set_on_write_error(hook);
        self
    }

    pub fn registry(&self) -> &BackendRegistry<S> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BackendRegistry<S> {
        &mut self.registry
    }

    pub fn base_backend_id(&self) -> Option<&str> {
        self.base_backend.as_deref()
    }

    /// Replace the write error hook.
    pub fn set_on_write_error<F>(&self, hook: F)
    where
        F: Fn(&Error, &S) + Send + Sync + 'static,
    {
        *self.on_write_error.write().expect("poisoned lock") = Some(Arc::new(hook));
    }

    /// Remove the write error hook; failures are then only logged.
    pub fn clear_on_write_error(&self) {
        *self.on_write_error.write().expect("poisoned lock") = None;
    }

    pub fn has_write_error_hook(&self) -> bool {
        self.on_write_error.read().expect("poisoned lock").is_some()
    }

    /// Deliver an isolated write failure to the hook, if one is set.
    pub(crate) fn report_write_error(&self, error: &Error, store: &S) {
        // Clone out so the callback runs without holding the lock.
        let hook = self.on_write_error.read().expect("poisoned lock").clone();
        if let Some(hook) = hook {
            hook(error, store);
        }
    }
}

impl<S: CacheStore> Default for CanaryConfig<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CacheStore> Debug for CanaryConfig<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanaryConfig")
            .field("registry", &self.registry)
            .field("base_backend", &self.base_backend)
            .field("on_write_error", &self.has_write_error_hook())
            .finish()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::MemoryCache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_last_hook_wins() {
        let config = CanaryConfig::<MemoryCache>::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        config.set_on_write_error(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = second.clone();
        config.set_on_write_error(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        config.report_write_error(&Error::Generic("boom".into()), &MemoryCache::new());

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cleared_hook_is_silent() {
        let config = CanaryConfig::<MemoryCache>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        config.set_on_write_error(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(config.has_write_error_hook());

        config.clear_on_write_error();
        config.report_write_error(&Error::Generic("boom".into()), &MemoryCache::new());

        assert!(!config.has_write_error_hook());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_base_backend() {
        let config = CanaryConfig::<MemoryCache>::new().base_backend("memory_store");
        assert_eq!(config.base_backend_id(), Some("memory_store"));
        assert_eq!(CanaryConfig::<MemoryCache>::new().base_backend_id(), None);
    }
}
