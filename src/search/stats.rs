use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cumulative counters of one [`Search`][crate::search::Search].
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    builds: AtomicU64,
    skipped_builds: AtomicU64,
    build_nanos: AtomicU64,
    queries: AtomicU64,
    query_nanos: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_build(&self, elapsed: Duration) {
        self.builds.fetch_add(1, Ordering::Relaxed);
        self.build_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped_build(&self) {
        self.skipped_builds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_query(&self, elapsed: Duration) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.query_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SearchStats {
        SearchStats {
            builds: self.builds.load(Ordering::Relaxed),
            skipped_builds: self.skipped_builds.load(Ordering::Relaxed),
            build_time: Duration::from_nanos(self.build_nanos.load(Ordering::Relaxed)),
            queries: self.queries.load(Ordering::Relaxed),
            query_time: Duration::from_nanos(self.query_nanos.load(Ordering::Relaxed)),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.builds,
            &self.skipped_builds,
            &self.build_nanos,
            &self.queries,
            &self.query_nanos,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Build and query counts and timings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Trees built by this search
    pub builds: u64,
    /// Builds skipped because the backend already held a tree
    pub skipped_builds: u64,
    pub build_time: Duration,
    pub queries: u64,
    pub query_time: Duration,
}

impl SearchStats {
    /// Mean time per query, zero before the first query.
    pub fn mean_query_time(&self) -> Duration {
        if self.queries == 0 {
            Duration::ZERO
        } else {
            self.query_time / self.queries as u32
        }
    }
}
