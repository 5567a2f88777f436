//! A cache of per-scope components.
use crate::InstrumentationScope;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

type Factory<V> = Box<dyn Fn(&InstrumentationScope) -> V + Send + Sync>;

/// Lazily creates and caches one component per distinct [InstrumentationScope].
///
/// Lookups of an already created component only take a shard read lock.
/// The first request for a scope runs the factory while holding that scope's
/// shard write lock, so concurrent first callers never observe two instances
/// for the same scope. Two scopes that only differ in their attributes are the
/// same scope, and the component is built from the first one requested.
pub struct ComponentRegistry<V> {
    components: DashMap<InstrumentationScope, Arc<V>>,
    factory: Factory<V>,
}

impl<V> ComponentRegistry<V> {
    /// Create an empty registry that builds components with `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&InstrumentationScope) -> V + Send + Sync + 'static,
    {
        ComponentRegistry {
            components: DashMap::new(),
            factory: Box::new(factory),
        }
    }

    /// Returns the component registered for `scope`, creating it on first use.
    pub fn get(&self, scope: &InstrumentationScope) -> Arc<V> {
        if let Some(component) = self.components.get(scope) {
            return Arc::clone(component.value());
        }

        let entry = self
            .components
            .entry(scope.clone())
            .or_insert_with(|| Arc::new((self.factory)(scope)));
        Arc::clone(entry.value())
    }

    /// Returns a snapshot of every component created so far.
    ///
    /// Components registered while the snapshot is taken may or may not be
    /// part of it; components registered afterwards never are.
    pub fn get_components(&self) -> Vec<Arc<V>> {
        self.components
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of components created so far.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` if no component has been created yet.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl<V> fmt::Debug for ComponentRegistry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.components.len())
            .finish()
    }
}
