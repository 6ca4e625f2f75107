//! Named pool registries.
//!
//! A registry lazily creates one [`QueryPool`] per identifier and hands back the
//! same instance for the same identifier for as long as the registry lives.
//! Applications construct a registry at startup and pass it to whoever needs it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::config::PoolConfig;
use crate::driver::ConnectionFactory;
use crate::pool::QueryPool;

/// Identifier used when the caller does not name a pool.
pub const DEFAULT_POOL: &str = "default";

/// Registry for a single control thread.
#[derive(Debug)]
pub struct PoolRegistry<F: ConnectionFactory + Clone> {
    config: PoolConfig,
    factory: F,
    pools: HashMap<String, QueryPool<F>>,
}

impl<F: ConnectionFactory + Clone> PoolRegistry<F> {
    /// Creates an empty registry; every pool gets `config` and a clone of `factory`.
    pub fn new(config: PoolConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            pools: HashMap::new(),
        }
    }

    /// Returns the pool named `id`, creating it on first access.
    pub fn get(&mut self, id: &str) -> &mut QueryPool<F> {
        let config = &self.config;
        let factory = &self.factory;
        self.pools.entry(id.to_string()).or_insert_with(|| {
            info!("Registry creating pool {}", id);
            QueryPool::new(id, config.clone(), factory.clone())
        })
    }

    /// Returns the pool named [`DEFAULT_POOL`].
    pub fn get_default(&mut self) -> &mut QueryPool<F> {
        self.get(DEFAULT_POOL)
    }

    /// Returns true if a pool named `id` exists.
    pub fn contains(&self, id: &str) -> bool {
        self.pools.contains_key(id)
    }

    /// Number of pools created.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Returns true if no pool was created yet.
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Pool identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pools.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Iterates over all pools mutably (e.g. to drive every pool from one loop).
    pub fn pools_mut(&mut self) -> impl Iterator<Item = &mut QueryPool<F>> {
        self.pools.values_mut()
    }
}

/// A pool shared between threads; one lock per pool instance.
pub type SharedPool<F> = Arc<Mutex<QueryPool<F>>>;

/// Thread-safe registry.
///
/// The identifier map has its own lock, held only while looking up or creating a
/// pool. Each pool sits behind its own mutex, which serialises submits and
/// completion passes on that pool.
pub struct SharedPoolRegistry<F: ConnectionFactory + Clone> {
    config: PoolConfig,
    factory: F,
    pools: Mutex<HashMap<String, SharedPool<F>>>,
}

impl<F: ConnectionFactory + Clone> SharedPoolRegistry<F> {
    /// Creates an empty registry.
    pub fn new(config: PoolConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the pool named `id`, creating it on first access.
    pub fn get(&self, id: &str) -> SharedPool<F> {
        let mut pools = self.pools.lock();
        let pool = pools.entry(id.to_string()).or_insert_with(|| {
            info!("Shared registry creating pool {}", id);
            Arc::new(Mutex::new(QueryPool::new(
                id,
                self.config.clone(),
                self.factory.clone(),
            )))
        });
        Arc::clone(pool)
    }

    /// Returns the pool named [`DEFAULT_POOL`].
    pub fn get_default(&self) -> SharedPool<F> {
        self.get(DEFAULT_POOL)
    }

    /// Returns true if a pool named `id` exists.
    pub fn contains(&self, id: &str) -> bool {
        self.pools.lock().contains_key(id)
    }

    /// Number of pools created.
    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    /// Returns true if no pool was created yet.
    pub fn is_empty(&self) -> bool {
        self.pools.lock().is_empty()
    }

    /// Pool identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pools.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}
