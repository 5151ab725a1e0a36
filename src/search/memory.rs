use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::kdtree::KDTree;
use crate::point::Point3;
use crate::search::backend::{BuildLock, CacheBackend, TreeLoader};
use crate::search::config::MEMORY_LOADER;
use crate::search::identity::ContentKey;
use crate::search::registry::{BackendContext, IdentityLocks, TreeCache};

/// Keeps the tree in memory, shared through the registry's [`TreeCache`] unless private.
#[derive(Debug)]
pub struct MemoryBackend {
    identity: ContentKey,
    shared: Option<(Arc<TreeCache>, Arc<IdentityLocks>)>,
    lock_timeout: Duration,
    loader: TreeLoader,
    tree: Option<Arc<KDTree>>,
}

impl MemoryBackend {
    /// A backend publishing its tree to the registry's cache.
    pub fn new(ctx: &BackendContext<'_>) -> Self {
        Self {
            identity: ctx.identity,
            shared: Some((ctx.trees.clone(), ctx.locks.clone())),
            lock_timeout: ctx.config.lock_timeout,
            loader: TreeLoader::new(ctx.identity.count()),
            tree: None,
        }
    }

    /// A backend whose tree is seen by nobody else.
    pub fn private(identity: ContentKey) -> Self {
        Self {
            identity,
            shared: None,
            lock_timeout: Duration::ZERO,
            loader: TreeLoader::new(identity.count()),
            tree: None,
        }
    }
}

impl CacheBackend for MemoryBackend {
    fn name(&self) -> &str {
        MEMORY_LOADER
    }

    fn identity(&self) -> ContentKey {
        self.identity
    }

    fn lock(&self) -> Result<BuildLock> {
        match &self.shared {
            Some((_, locks)) => Ok(BuildLock::new(
                locks.acquire(self.identity, self.lock_timeout)?,
                None,
            )),
            None => Ok(BuildLock::unlocked()),
        }
    }

    fn ready(&mut self) -> bool {
        if self.tree.is_none() {
            if let Some((trees, _)) = &self.shared {
                self.tree = trees.get(&self.identity);
            }
        }
        self.tree.is_some()
    }

    fn build(&mut self, coords: &[f64]) -> Result<()> {
        self.loader.bulk(coords)
    }

    fn insert(&mut self, point: Point3) -> Result<()> {
        self.loader.insert(point)
    }

    fn commit(&mut self) -> Result<()> {
        let tree = Arc::new(self.loader.finish()?);
        if let Some((trees, _)) = &self.shared {
            trees.insert(self.identity, tree.clone());
        }
        self.tree = Some(tree);
        Ok(())
    }

    fn abort(&mut self) {
        self.loader.reset();
    }

    fn tree(&self) -> Option<&KDTree> {
        self.tree.as_deref()
    }
}
