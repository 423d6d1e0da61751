/// Process-wide cache of built registries and the indices derived from them,
/// keyed by corpus location.
///
/// The lock is held only for table lookups and inserts, never while a build
/// runs. Two callers racing on the same cold corpus may both build; the
/// last insert wins.
use log::debug;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::entries::EntryIndex;
use crate::core::indexer::NodeIndex;
use crate::core::query::SearchError;
use crate::core::registry::Registry;

/// A value from the cache, with whether it had to be built and how long
/// that took.
#[derive(Debug, Clone)]
pub struct Lookup<T> {
    pub value: Arc<T>,
    pub built: bool,
    pub elapsed: Duration,
}

impl<T> Lookup<T> {
    fn cached(value: Arc<T>) -> Self {
        Self {
            value,
            built: false,
            elapsed: Duration::ZERO,
        }
    }

    fn timed(started: Instant, value: T) -> Self {
        Self {
            value: Arc::new(value),
            built: true,
            elapsed: started.elapsed(),
        }
    }
}

/// Everything cached for one corpus. Derived indices always belong to
/// `registry`; a new registry replaces the whole slot.
struct CacheSlot {
    registry: Arc<Registry>,
    nodes: Option<Arc<NodeIndex>>,
    entries: FxHashMap<usize, Arc<EntryIndex>>,
}

pub struct IndexCache {
    enabled: bool,
    slots: Mutex<FxHashMap<PathBuf, CacheSlot>>,
}

impl Default for IndexCache {
    fn default() -> Self {
        Self::new()
    }
}

fn cache_key(root: &Path) -> PathBuf {
    root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
}

impl IndexCache {
    pub fn new() -> Self {
        Self::with_enabled(true)
    }

    /// A cache that never stores anything: every lookup builds.
    pub fn disabled() -> Self {
        Self::with_enabled(false)
    }

    pub fn with_enabled(enabled: bool) -> Self {
        Self {
            enabled,
            slots: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The registry for `root`, building it if it is not cached.
    pub fn get_or_build(&self, root: &Path) -> Result<Lookup<Registry>, SearchError> {
        if !self.enabled {
            let started = Instant::now();
            return Ok(Lookup::timed(started, Registry::build(root)?));
        }

        let key = cache_key(root);
        if let Some(slot) = self.slots.lock().get(&key) {
            debug!("registry cache hit for {}", key.display());
            return Ok(Lookup::cached(Arc::clone(&slot.registry)));
        }

        let started = Instant::now();
        let lookup = Lookup::timed(started, Registry::build(root)?);
        self.slots.lock().insert(
            key,
            CacheSlot {
                registry: Arc::clone(&lookup.value),
                nodes: None,
                entries: FxHashMap::default(),
            },
        );
        Ok(lookup)
    }

    /// The node index derived from `registry`.
    pub fn nodes_for(&self, root: &Path, registry: &Arc<Registry>) -> Lookup<NodeIndex> {
        if !self.enabled {
            return Lookup::timed(Instant::now(), NodeIndex::build(registry));
        }

        let key = cache_key(root);
        {
            let slots = self.slots.lock();
            if let Some(nodes) = slots
                .get(&key)
                .filter(|s| Arc::ptr_eq(&s.registry, registry))
                .and_then(|s| s.nodes.clone())
            {
                return Lookup::cached(nodes);
            }
        }

        let started = Instant::now();
        let lookup = Lookup::timed(started, NodeIndex::build(registry));
        if let Some(slot) = self.slots.lock().get_mut(&key) {
            if Arc::ptr_eq(&slot.registry, registry) {
                slot.nodes = Some(Arc::clone(&lookup.value));
            }
        }
        lookup
    }

    /// The expanded entry index derived from `registry` at `max_depth`.
    pub fn entries_for(&self, root: &Path, registry: &Arc<Registry>, max_depth: usize) -> Lookup<EntryIndex> {
        if !self.enabled {
            return Lookup::timed(Instant::now(), EntryIndex::build(registry, max_depth));
        }

        let key = cache_key(root);
        {
            let slots = self.slots.lock();
            if let Some(entries) = slots
                .get(&key)
                .filter(|s| Arc::ptr_eq(&s.registry, registry))
                .and_then(|s| s.entries.get(&max_depth).cloned())
            {
                return Lookup::cached(entries);
            }
        }

        let started = Instant::now();
        let lookup = Lookup::timed(started, EntryIndex::build(registry, max_depth));
        if let Some(slot) = self.slots.lock().get_mut(&key) {
            if Arc::ptr_eq(&slot.registry, registry) {
                slot.entries.insert(max_depth, Arc::clone(&lookup.value));
            }
        }
        lookup
    }

    /// Drop the registry and every derived index for `root`.
    pub fn invalidate(&self, root: &Path) -> bool {
        self.slots.lock().remove(&cache_key(root)).is_some()
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Number of cached corpora.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
