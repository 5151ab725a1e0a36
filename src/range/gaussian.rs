use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::{GridIndexError, Result};
use crate::range::{monotonic_crop, Range, RangeKind};

const NEWTON_TOLERANCE: f64 = 1e-14;
const NEWTON_MAX_ITERATIONS: usize = 100;

/// Legendre polynomials `(P_n(x), P_{n-1}(x))` by the three-term recurrence.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p_prev = 1.;
    let mut p = x;
    for k in 1..n {
        let k = k as f64;
        let next = ((2. * k + 1.) * x * p - k * p_prev) / (k + 1.);
        p_prev = p;
        p = next;
    }
    (p, p_prev)
}

/// The `2 * n` roots of the Legendre polynomial of degree `2 * n`, as latitudes in degrees from
/// north to south.
fn compute_latitudes(n: usize) -> Vec<f64> {
    let nlat = 2 * n;
    let mut lats = vec![0.; nlat];

    for i in 0..n {
        // first guess, then Newton iteration on P_nlat
        let mut x = (PI * (i as f64 + 0.75) / (nlat as f64 + 0.5)).cos();
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let (p, p_prev) = legendre(nlat, x);
            let dp = nlat as f64 * (p_prev - x * p) / (1. - x * x);
            let dx = p / dp;
            x -= dx;
            if dx.abs() <= NEWTON_TOLERANCE {
                break;
            }
        }

        let lat = x.asin().to_degrees();
        lats[i] = lat;
        lats[nlat - 1 - i] = -lat;
    }

    lats
}

/// Gaussian latitudes of a grid with `n` latitudes per hemisphere, north to south unless
/// `increasing`.
///
/// Tables are shared through [`LatitudeCache::global`].
pub fn gaussian_latitudes(n: usize, increasing: bool) -> Vec<f64> {
    let table = LatitudeCache::global().latitudes(n);
    if increasing {
        table.iter().rev().copied().collect()
    } else {
        table.to_vec()
    }
}

/// A cache of Gaussian latitude tables keyed by the number of latitudes per hemisphere.
///
/// Tables are computed once under the cache lock and then shared read-only by every range that
/// uses them.
#[derive(Debug, Default)]
pub struct LatitudeCache {
    tables: Mutex<HashMap<usize, Arc<[f64]>>>,
}

impl LatitudeCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> Arc<LatitudeCache> {
        static GLOBAL: OnceLock<Arc<LatitudeCache>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(LatitudeCache::new())).clone()
    }

    /// The `2 * n` latitudes, north to south.
    pub fn latitudes(&self, n: usize) -> Arc<[f64]> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .entry(n)
            .or_insert_with(|| {
                tracing::debug!(n, "computing Gaussian latitudes");
                compute_latitudes(n).into()
            })
            .clone()
    }

    /// Bytes held by cached tables.
    pub fn footprint(&self) -> usize {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .values()
            .map(|t| t.len() * std::mem::size_of::<f64>())
            .sum()
    }

    /// Drop all cached tables. Ranges holding a table keep their copy.
    pub fn purge(&self) {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

pub(super) fn crop(range: &Range, a: f64, b: f64) -> Result<Range> {
    range.check_order(a, b)?;

    let (RangeKind::GaussianLatitude { n }, Some(g)) = (range.kind, &range.gaussian) else {
        return Err(GridIndexError::Construction(
            "not a Gaussian latitude range".to_string(),
        ));
    };

    let (from, to) = monotonic_crop(range.values(), a.min(b), a.max(b), range.eps);
    if from == to {
        return Err(GridIndexError::Construction(format!(
            "crop [{}, {}] contains no Gaussian latitude",
            a, b
        )));
    }

    // values run through the table backwards when increasing
    let offset = if g.increasing {
        g.offset + range.size - to
    } else {
        g.offset + from
    };

    Range::gaussian_window(
        n,
        g.increasing,
        offset,
        to - from,
        range.eps,
        g.cache.clone(),
    )
}
