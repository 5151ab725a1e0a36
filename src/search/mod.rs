//! Cached nearest-neighbour search over the points of a grid.
//!
//! A [`Search`] projects the points of a [`GridPointSource`] onto the unit sphere and queries a
//! k-d tree over them. The tree lives in a [`CacheBackend`] chosen by the `loader` of the
//! [`SearchConfig`], keyed by the [`ContentKey`] of the source, so building a search for a grid
//! that was indexed before, in this process or on disk, reuses the existing tree.
//!
//! ```
//! use grid_index::grid::RegularGrid;
//! use grid_index::point::PointLonLat;
//! use grid_index::search::{Search, SearchConfig};
//!
//! let grid = RegularGrid::global(10., 1e-9).unwrap();
//! let search = Search::open(&grid, &SearchConfig::default()).unwrap();
//! let found = search.nearest(&PointLonLat::new(11., 49.)).unwrap().unwrap();
//! assert_eq!(found.index, 4 * 36 + 1);
//! ```

mod backend;
mod config;
mod identity;
mod mapped;
mod memory;
mod registry;
mod stats;

use std::time::Instant;

use geo_traits::CoordTrait;

use crate::error::{GridIndexError, Result};
use crate::grid::GridPointSource;
use crate::kdtree::Neighbour;
use crate::point::PointLonLat;
use crate::projection::to_cartesian;

pub use backend::{BuildLock, CacheBackend};
pub use config::{SearchConfig, MAPPED_FILE_LOADER, MEMORY_LOADER};
pub use identity::{ContentKey, ContentKeyBuilder};
pub use mapped::MappedFileBackend;
pub use memory::MemoryBackend;
pub use registry::{
    BackendContext, BackendFactory, BackendRegistry, IdentityGuard, IdentityLocks, TreeCache,
};
pub use stats::SearchStats;

use stats::StatsCounters;

/// Build progress of a [`Search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    NotBuilt,
    Building,
    Ready,
}

/// Nearest-neighbour queries over the points of one source.
#[derive(Debug)]
pub struct Search {
    identity: ContentKey,
    backend: Box<dyn CacheBackend>,
    fast_build: bool,
    state: BuildState,
    stats: StatsCounters,
}

impl Search {
    /// Open the backend for `source` from the process-wide registry and build the tree unless
    /// it already exists.
    pub fn open(source: &(impl GridPointSource + ?Sized), config: &SearchConfig) -> Result<Self> {
        Self::open_with(BackendRegistry::global(), source, config)
    }

    /// Same as [`open`][Self::open], with backends from `registry`.
    pub fn open_with(
        registry: &BackendRegistry,
        source: &(impl GridPointSource + ?Sized),
        config: &SearchConfig,
    ) -> Result<Self> {
        let mut search = Self::create(registry, source.identity(), config)?;
        search.build(source)?;
        Ok(search)
    }

    /// Open the backend for `identity` without building anything. Queries fail until
    /// [`build`][Self::build] succeeds.
    pub fn create(
        registry: &BackendRegistry,
        identity: ContentKey,
        config: &SearchConfig,
    ) -> Result<Self> {
        Ok(Self {
            identity,
            backend: registry.open(identity, config)?,
            fast_build: config.fast_build,
            state: BuildState::NotBuilt,
            stats: StatsCounters::default(),
        })
    }

    /// Build the tree over `source`, holding the build lock of this identity throughout.
    ///
    /// Nothing is built when the backend already holds a tree for this identity. Fails with
    /// [`GridIndexError::Integrity`] when `source` does not provide the expected number of
    /// points.
    pub fn build(&mut self, source: &(impl GridPointSource + ?Sized)) -> Result<()> {
        let _lock = self.backend.lock()?;

        if self.backend.ready() {
            tracing::debug!(identity = %self.identity, backend = self.backend.name(), "index ready, skipping build");
            self.stats.record_skipped_build();
            self.state = BuildState::Ready;
            return Ok(());
        }

        let expected = self.backend.expected_item_count();
        if source.size() != expected {
            return Err(GridIndexError::Integrity {
                expected,
                actual: source.size(),
            });
        }

        tracing::info!(identity = %self.identity, backend = self.backend.name(), items = expected, "building index");
        self.state = BuildState::Building;
        let start = Instant::now();

        match self.load(source) {
            Ok(()) => {
                let elapsed = start.elapsed();
                self.stats.record_build(elapsed);
                self.state = BuildState::Ready;
                tracing::info!(identity = %self.identity, items = expected, ?elapsed, "index built");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(identity = %self.identity, error = %e, "build failed");
                self.backend.abort();
                self.state = BuildState::NotBuilt;
                Err(e)
            }
        }
    }

    fn load(&mut self, source: &(impl GridPointSource + ?Sized)) -> Result<()> {
        if self.fast_build && self.backend.supports_bulk_load() {
            let points: Vec<PointLonLat> = source.points().collect();
            self.backend.build(&project(&points))?;
        } else {
            for p in source.points() {
                self.backend.insert(to_cartesian(p))?;
            }
        }
        self.backend.commit()
    }

    fn check_ready(&self) -> Result<()> {
        match self.state {
            BuildState::Ready => Ok(()),
            state => Err(GridIndexError::ConcurrencyViolation(format!(
                "index {} queried while {:?}",
                self.identity, state
            ))),
        }
    }

    fn timed<T>(&self, query: impl FnOnce() -> Result<T>) -> Result<T> {
        self.check_ready()?;
        let start = Instant::now();
        let result = query();
        self.stats.record_query(start.elapsed());
        result
    }

    /// The closest point to `p`, `None` if the source has no points.
    pub fn nearest(&self, p: &PointLonLat) -> Result<Option<Neighbour>> {
        self.timed(|| self.backend.nearest(&to_cartesian(*p)))
    }

    /// The `k` closest points to `p` by ascending distance.
    pub fn k_nearest(&self, p: &PointLonLat, k: usize) -> Result<Vec<Neighbour>> {
        if k == 1 {
            return Ok(self.nearest(p)?.into_iter().collect());
        }
        self.timed(|| self.backend.k_nearest(&to_cartesian(*p), k))
    }

    /// All points within Euclidean distance `r` of `p` on the unit sphere, in no particular
    /// order. Use [`chord_length`][crate::projection::chord_length] to convert an angular
    /// radius.
    pub fn within_radius(&self, p: &PointLonLat, r: f64) -> Result<Vec<Neighbour>> {
        self.timed(|| self.backend.within_radius(&to_cartesian(*p), r))
    }

    /// [`nearest`][Self::nearest] for any coordinate, read as `x = lon` and `y = lat`.
    pub fn nearest_coord(&self, coord: &impl CoordTrait<T = f64>) -> Result<Option<Neighbour>> {
        self.nearest(&PointLonLat::from_coord(coord))
    }

    /// [`k_nearest`][Self::k_nearest] for any coordinate.
    pub fn k_nearest_coord(
        &self,
        coord: &impl CoordTrait<T = f64>,
        k: usize,
    ) -> Result<Vec<Neighbour>> {
        self.k_nearest(&PointLonLat::from_coord(coord), k)
    }

    /// [`within_radius`][Self::within_radius] for any coordinate.
    pub fn within_radius_coord(
        &self,
        coord: &impl CoordTrait<T = f64>,
        r: f64,
    ) -> Result<Vec<Neighbour>> {
        self.within_radius(&PointLonLat::from_coord(coord), r)
    }

    pub fn identity(&self) -> ContentKey {
        self.identity
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Loader name of the backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Bytes held by the tree.
    pub fn footprint(&self) -> usize {
        self.backend.footprint()
    }

    pub fn stats(&self) -> SearchStats {
        self.stats.snapshot()
    }

    /// Zero all counters. The tree is kept.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

/// Interleaved unit-sphere coordinates of `points`.
#[cfg(feature = "rayon")]
fn project(points: &[PointLonLat]) -> Vec<f64> {
    use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

    let xyz: Vec<[f64; 3]> = points
        .par_iter()
        .map(|p| {
            let q = to_cartesian(*p);
            [q.x, q.y, q.z]
        })
        .collect();
    xyz.concat()
}

/// Interleaved unit-sphere coordinates of `points`.
#[cfg(not(feature = "rayon"))]
fn project(points: &[PointLonLat]) -> Vec<f64> {
    let mut coords = Vec::with_capacity(points.len() * 3);
    for p in points {
        let q = to_cartesian(*p);
        coords.extend_from_slice(&[q.x, q.y, q.z]);
    }
    coords
}
