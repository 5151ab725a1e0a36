use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{GridIndexError, Result};
use crate::kdtree::{KDTree, KDTreeIndex};
use crate::point::Point3;
use crate::search::backend::{BuildLock, CacheBackend, TreeLoader};
use crate::search::config::MAPPED_FILE_LOADER;
use crate::search::identity::ContentKey;
use crate::search::registry::{BackendContext, IdentityLocks};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Persists the committed tree as `<cache_root>/<identity>.kdtree`.
///
/// Trees are written to a temporary file next to their final path and renamed into place, so
/// readers never see a partial blob. Builders in other processes are excluded by an exclusive lock
/// on `<identity>.lock`, which the OS releases if its holder dies.
#[derive(Debug)]
pub struct MappedFileBackend {
    identity: ContentKey,
    root: PathBuf,
    locks: Arc<IdentityLocks>,
    lock_timeout: Duration,
    loader: TreeLoader,
    tree: Option<Arc<KDTree>>,
}

impl MappedFileBackend {
    pub fn new(ctx: &BackendContext<'_>) -> Self {
        Self {
            identity: ctx.identity,
            root: ctx.config.cache_root.clone(),
            locks: ctx.locks.clone(),
            lock_timeout: ctx.config.lock_timeout,
            loader: TreeLoader::new(ctx.identity.count()),
            tree: None,
        }
    }

    /// Where the tree of this identity is persisted.
    pub fn blob_path(&self) -> PathBuf {
        self.root.join(format!("{}.kdtree", self.identity))
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(format!("{}.lock", self.identity))
    }

    fn load(&self) -> Option<KDTree> {
        let path = self.blob_path();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable k-d tree file, rebuilding");
                return None;
            }
        };

        match KDTree::from_bytes(&data) {
            Ok(tree) if tree.num_items() == self.identity.count() => Some(tree),
            Ok(tree) => {
                tracing::warn!(
                    path = %path.display(),
                    expected = self.identity.count(),
                    actual = tree.num_items(),
                    "k-d tree file has the wrong item count, rebuilding"
                );
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt k-d tree file, rebuilding");
                None
            }
        }
    }
}

impl CacheBackend for MappedFileBackend {
    fn name(&self) -> &str {
        MAPPED_FILE_LOADER
    }

    fn identity(&self) -> ContentKey {
        self.identity
    }

    fn lock(&self) -> Result<BuildLock> {
        let deadline = Instant::now() + self.lock_timeout;
        let process = self.locks.acquire(self.identity, self.lock_timeout)?;
        fs::create_dir_all(&self.root)?;
        let file = LockFile::acquire(&self.lock_path(), deadline)?;
        Ok(BuildLock::new(process, Some(file)))
    }

    fn ready(&mut self) -> bool {
        if self.tree.is_none() {
            self.tree = self.load().map(Arc::new);
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
        let tree = self.loader.finish()?;

        fs::create_dir_all(&self.root)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.root)?;
        file.write_all(&tree.to_bytes())?;
        file.as_file().sync_all()?;
        file.persist(self.blob_path()).map_err(|e| e.error)?;

        self.tree = Some(Arc::new(tree));
        Ok(())
    }

    fn abort(&mut self) {
        self.loader.reset();
    }

    fn tree(&self) -> Option<&KDTree> {
        self.tree.as_deref()
    }
}

/// An exclusive OS lock on a file, released on drop or when the holding process exits.
#[derive(Debug)]
pub(crate) struct LockFile {
    file: File,
}

impl LockFile {
    /// Lock `path`, creating it if needed, polling while another holder owns it, until
    /// `deadline`.
    pub(crate) fn acquire(path: &Path, deadline: Instant) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file }),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if Instant::now() >= deadline {
                        return Err(GridIndexError::LockTimeout(format!(
                            "{} is still held by another builder",
                            path.display()
                        )));
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
