use std::fmt;

use crate::error::{GridIndexError, Result};
use crate::kdtree::{KDTree, KDTreeBuilder, KDTreeIndex, Neighbour};
use crate::point::Point3;
use crate::search::identity::ContentKey;
use crate::search::mapped::LockFile;
use crate::search::registry::IdentityGuard;

/// Storage of the spatial index of one identity.
///
/// A backend is opened for one [`ContentKey`]. Under the exclusive [`lock`][CacheBackend::lock],
/// a caller asks whether a committed tree is already available with
/// [`ready`][CacheBackend::ready] and otherwise loads points through
/// [`build`][CacheBackend::build] or [`insert`][CacheBackend::insert] followed by
/// [`commit`][CacheBackend::commit].
pub trait CacheBackend: Send + Sync + fmt::Debug {
    /// The loader name this backend is registered under.
    fn name(&self) -> &str;

    /// The identity this backend was opened for.
    fn identity(&self) -> ContentKey;

    /// The number of points a build must provide.
    fn expected_item_count(&self) -> usize {
        self.identity().count()
    }

    /// Whether all points can be loaded with a single [`build`][CacheBackend::build] call.
    fn supports_bulk_load(&self) -> bool {
        true
    }

    /// Take the exclusive build lock of this identity. The lock is released when the returned
    /// guard is dropped.
    fn lock(&self) -> Result<BuildLock>;

    /// Attach a tree committed earlier for this identity, and report whether one is attached.
    fn ready(&mut self) -> bool;

    /// Load all points at once, as interleaved `x, y, z` coordinates in original index order.
    fn build(&mut self, coords: &[f64]) -> Result<()>;

    /// Load the point with the next original index.
    fn insert(&mut self, point: Point3) -> Result<()>;

    /// Finish the tree from the loaded points and publish it.
    fn commit(&mut self) -> Result<()>;

    /// Discard the points loaded since the last commit, after a failed build.
    fn abort(&mut self);

    /// The committed tree, if any.
    fn tree(&self) -> Option<&KDTree>;

    /// Bytes held by the attached tree.
    fn footprint(&self) -> usize {
        self.tree().map_or(0, KDTree::footprint)
    }

    /// The closest point to `q`.
    fn nearest(&self, q: &Point3) -> Result<Option<Neighbour>> {
        Ok(committed(self)?.nearest(q))
    }

    /// The `k` closest points to `q` by ascending distance.
    fn k_nearest(&self, q: &Point3, k: usize) -> Result<Vec<Neighbour>> {
        Ok(committed(self)?.neighbors(q, Some(k), None))
    }

    /// All points within Euclidean distance `r` of `q`.
    fn within_radius(&self, q: &Point3, r: f64) -> Result<Vec<Neighbour>> {
        Ok(committed(self)?.within(q, r))
    }
}

fn committed<B: CacheBackend + ?Sized>(backend: &B) -> Result<&KDTree> {
    backend.tree().ok_or_else(|| {
        GridIndexError::ConcurrencyViolation(format!(
            "{} backend holds no committed tree for {}",
            backend.name(),
            backend.identity()
        ))
    })
}

/// Guard of an exclusive build lock, released on drop.
#[derive(Debug, Default)]
pub struct BuildLock {
    process: Option<IdentityGuard>,
    file: Option<LockFile>,
}

impl BuildLock {
    /// A guard for a backend that is never shared.
    pub fn unlocked() -> Self {
        Self::default()
    }

    pub(crate) fn new(process: IdentityGuard, file: Option<LockFile>) -> Self {
        Self {
            process: Some(process),
            file,
        }
    }

    /// Whether this guard excludes other builders.
    pub fn is_exclusive(&self) -> bool {
        self.process.is_some() || self.file.is_some()
    }
}

/// Collects the points of a build into a [`KDTreeBuilder`].
#[derive(Debug)]
pub(crate) struct TreeLoader {
    expected: usize,
    builder: Option<KDTreeBuilder>,
}

impl TreeLoader {
    pub(crate) fn new(expected: usize) -> Self {
        Self {
            expected,
            builder: None,
        }
    }

    fn builder(&mut self) -> Result<&mut KDTreeBuilder> {
        let builder = match self.builder.take() {
            Some(builder) => builder,
            None => KDTreeBuilder::new(self.expected)?,
        };
        Ok(self.builder.insert(builder))
    }

    pub(crate) fn bulk(&mut self, coords: &[f64]) -> Result<()> {
        self.builder()?.add_interleaved(coords)
    }

    pub(crate) fn insert(&mut self, point: Point3) -> Result<()> {
        self.builder()?.add(point).map(|_| ())
    }

    /// Forget the points loaded so far.
    pub(crate) fn reset(&mut self) {
        self.builder = None;
    }

    /// The finished tree. Fails with an integrity error unless exactly the expected number of
    /// points was loaded.
    pub(crate) fn finish(&mut self) -> Result<KDTree> {
        let builder = match self.builder.take() {
            Some(builder) => builder,
            None => KDTreeBuilder::new(self.expected)?,
        };
        builder.finish()
    }
}
