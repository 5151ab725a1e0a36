use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{GridIndexError, Result};
use crate::kdtree::KDTree;
use crate::search::backend::CacheBackend;
use crate::search::config::{SearchConfig, MAPPED_FILE_LOADER, MEMORY_LOADER};
use crate::search::identity::ContentKey;
use crate::search::mapped::MappedFileBackend;
use crate::search::memory::MemoryBackend;

/// Creates a backend for one identity.
pub type BackendFactory =
    Box<dyn Fn(&BackendContext<'_>) -> Result<Box<dyn CacheBackend>> + Send + Sync>;

/// What a [`BackendFactory`] gets to open a backend.
#[derive(Debug, Clone)]
pub struct BackendContext<'a> {
    pub identity: ContentKey,
    pub config: &'a SearchConfig,
    /// In-memory trees shared by every backend of the registry
    pub trees: Arc<TreeCache>,
    /// Per-identity build locks shared by every backend of the registry
    pub locks: Arc<IdentityLocks>,
}

/// Loader names mapped to backend factories, plus the process-local state the backends share.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
    trees: Arc<TreeCache>,
    locks: Arc<IdentityLocks>,
}

impl BackendRegistry {
    /// A registry without any loader.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            trees: Arc::new(TreeCache::default()),
            locks: Arc::new(IdentityLocks::default()),
        }
    }

    /// A registry with the `"memory"` and `"mapped-cache-file"` loaders.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(MEMORY_LOADER, |ctx| {
            Ok(Box::new(MemoryBackend::new(ctx)) as Box<dyn CacheBackend>)
        });
        registry.register(MAPPED_FILE_LOADER, |ctx| {
            Ok(Box::new(MappedFileBackend::new(ctx)) as Box<dyn CacheBackend>)
        });
        registry
    }

    /// The process-wide registry, with the default loaders.
    pub fn global() -> &'static BackendRegistry {
        static GLOBAL: OnceLock<BackendRegistry> = OnceLock::new();
        GLOBAL.get_or_init(BackendRegistry::with_defaults)
    }

    /// Register a loader, replacing any previous factory of the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&BackendContext<'_>) -> Result<Box<dyn CacheBackend>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    /// Registered loader names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn trees(&self) -> &Arc<TreeCache> {
        &self.trees
    }

    pub fn locks(&self) -> &Arc<IdentityLocks> {
        &self.locks
    }

    /// Open the backend configured by `config` for `identity`.
    ///
    /// Without caching this is always a private in-memory backend.
    pub fn open(
        &self,
        identity: ContentKey,
        config: &SearchConfig,
    ) -> Result<Box<dyn CacheBackend>> {
        config.validate()?;
        if !config.caching {
            return Ok(Box::new(MemoryBackend::private(identity)));
        }

        let factory = self.factories.get(&config.loader).ok_or_else(|| {
            GridIndexError::Config(format!(
                "unknown loader '{}', expected one of {:?}",
                config.loader,
                self.names()
            ))
        })?;

        factory(&BackendContext {
            identity,
            config,
            trees: self.trees.clone(),
            locks: self.locks.clone(),
        })
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("loaders", &self.names())
            .field("trees", &self.trees)
            .finish()
    }
}

/// Committed in-memory trees keyed by identity.
#[derive(Debug, Default)]
pub struct TreeCache {
    trees: Mutex<HashMap<ContentKey, Arc<KDTree>>>,
}

impl TreeCache {
    pub fn get(&self, identity: &ContentKey) -> Option<Arc<KDTree>> {
        self.trees
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    pub fn insert(&self, identity: ContentKey, tree: Arc<KDTree>) {
        self.trees
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity, tree);
    }

    pub fn len(&self) -> usize {
        self.trees.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by cached trees.
    pub fn footprint(&self) -> usize {
        self.trees
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|tree| tree.footprint())
            .sum()
    }

    /// Drop all cached trees. Searches already attached to a tree keep it.
    pub fn purge(&self) {
        self.trees
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Exclusive per-identity locks within this process.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    held: Mutex<HashSet<ContentKey>>,
    released: Condvar,
}

impl IdentityLocks {
    /// Wait until no other guard holds `identity`, then hold it.
    pub fn acquire(self: &Arc<Self>, identity: ContentKey, timeout: Duration) -> Result<IdentityGuard> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        while held.contains(&identity) {
            let now = Instant::now();
            if now >= deadline {
                return Err(GridIndexError::LockTimeout(format!(
                    "build lock of {} still held after {:?}",
                    identity, timeout
                )));
            }
            held = self
                .released
                .wait_timeout(held, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        held.insert(identity);
        Ok(IdentityGuard {
            locks: self.clone(),
            identity,
        })
    }

    /// Whether a guard currently holds `identity`.
    pub fn is_held(&self, identity: &ContentKey) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(identity)
    }
}

/// Holds one identity of an [`IdentityLocks`] until dropped.
#[derive(Debug)]
pub struct IdentityGuard {
    locks: Arc<IdentityLocks>,
    identity: ContentKey,
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        self.locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.identity);
        self.locks.released.notify_all();
    }
}
