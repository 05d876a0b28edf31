use std::sync::Arc;

use courier_core::Settings;
use courier_fabric::{ChannelProvider, WorkerPool};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{ChannelsError, Result};

/// Scheme to provider map with start/stop lifecycle
pub struct ProviderRegistry {
    providers: DashMap<String, Arc<dyn ChannelProvider>>,
    pool: WorkerPool,
    settings: Arc<Settings>,
}

impl ProviderRegistry {
    pub fn new(pool: WorkerPool, settings: Arc<Settings>) -> Self {
        Self {
            providers: DashMap::new(),
            pool,
            settings,
        }
    }

    /// Associate `scheme` with `provider` and start it
    ///
    /// A different provider already registered for the scheme is stopped
    /// before the new one starts. Registering the same instance twice is a
    /// no-op.
    pub fn register(&self, scheme: impl Into<String>, provider: Arc<dyn ChannelProvider>) {
        let scheme = scheme.into();
        debug!(scheme = %scheme, "registering new scheme");
        match self.providers.entry(scheme) {
            Entry::Occupied(mut entry) => {
                if Arc::ptr_eq(entry.get(), &provider) {
                    return;
                }
                debug!(scheme = %entry.key(), "stopping replaced provider");
                entry.get().stop();
                provider.start(self.pool.clone(), &self.settings);
                entry.insert(provider);
            }
            Entry::Vacant(entry) => {
                provider.start(self.pool.clone(), &self.settings);
                entry.insert(provider);
            }
        }
    }

    /// Always fails; providers are only removed by shutting the facade down
    pub fn unregister(&self, _scheme: &str) -> Result<()> {
        Err(ChannelsError::Unsupported("unregister, use shutdown instead"))
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn ChannelProvider>> {
        self.providers
            .get(scheme)
            .map(|provider| Arc::clone(provider.value()))
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        schemes.sort();
        schemes
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub(crate) fn stop_all(&self) {
        for provider in self.providers.iter() {
            provider.value().stop();
        }
    }

    pub(crate) fn clear(&self) {
        self.providers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{Format, Metadata, Persistence, Uri};
    use courier_fabric::transport::Transport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl ChannelProvider for Counting {
        fn scheme(&self) -> &str {
            "count"
        }

        fn start(&self, _pool: WorkerPool, _settings: &Settings) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn build(
            &self,
            _uri: &Uri,
            _format: Format,
            _persistence: Persistence,
            _metadata: &[Metadata],
        ) -> courier_fabric::Result<Box<dyn Transport>> {
            Err(courier_fabric::Error::Custom("not buildable".into()))
        }
    }

    fn registry() -> (ProviderRegistry, WorkerPool) {
        let pool = WorkerPool::new(1).unwrap();
        (
            ProviderRegistry::new(pool.clone(), Arc::new(Settings::default())),
            pool,
        )
    }

    #[test]
    fn get_returns_registered_instance() {
        let (registry, pool) = registry();
        let provider: Arc<dyn ChannelProvider> = Arc::new(Counting::default());
        registry.register("count", Arc::clone(&provider));

        let found = registry.get("count").unwrap();
        assert!(Arc::ptr_eq(&found, &provider));
        assert!(registry.get("missing").is_none());
        pool.shutdown_now();
    }

    #[test]
    fn register_starts_and_replacement_stops_previous() {
        let (registry, pool) = registry();
        let first = Arc::new(Counting::default());
        let second = Arc::new(Counting::default());

        registry.register("count", first.clone());
        assert_eq!(first.starts.load(Ordering::SeqCst), 1);

        registry.register("count", second.clone());
        assert_eq!(first.stops.load(Ordering::SeqCst), 1);
        assert_eq!(second.starts.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);

        let found = registry.get("count").unwrap();
        let expected: Arc<dyn ChannelProvider> = second;
        assert!(Arc::ptr_eq(&found, &expected));
        pool.shutdown_now();
    }

    #[test]
    fn registering_same_instance_twice_does_not_restart_it() {
        let (registry, pool) = registry();
        let provider = Arc::new(Counting::default());
        registry.register("count", provider.clone());
        registry.register("count", provider.clone());
        assert_eq!(provider.starts.load(Ordering::SeqCst), 1);
        assert_eq!(provider.stops.load(Ordering::SeqCst), 0);
        pool.shutdown_now();
    }

    #[test]
    fn unregister_is_always_unsupported() {
        let (registry, pool) = registry();
        registry.register("count", Arc::new(Counting::default()));
        for scheme in ["count", "missing", ""] {
            assert!(matches!(
                registry.unregister(scheme),
                Err(ChannelsError::Unsupported(_))
            ));
        }
        assert!(registry.get("count").is_some());
        pool.shutdown_now();
    }

    #[test]
    fn stop_all_then_clear_empties_registry() {
        let (registry, pool) = registry();
        let provider = Arc::new(Counting::default());
        registry.register("count", provider.clone());
        registry.stop_all();
        registry.clear();
        assert_eq!(provider.stops.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        pool.shutdown_now();
    }
}
