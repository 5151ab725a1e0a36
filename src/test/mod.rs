mod scenario;

use crate::grid::{GridPointSource, RegularGrid};
use crate::point::PointLonLat;
use crate::projection::to_cartesian;
use crate::range::Range;

pub(crate) const EPS: f64 = 1e-9;

/// Latitudes -90, -30, 30, 90 by longitudes 0, 90, 180, 270.
pub(crate) fn four_by_four() -> RegularGrid {
    RegularGrid::new(
        Range::regular_longitude(4, 0., 360., EPS).unwrap(),
        Range::regular_latitude(4, -90., 90., EPS).unwrap(),
    )
    .unwrap()
}

/// Indices of the `k` points of `source` closest to `q`, by exhaustive search.
pub(crate) fn brute_force(source: &impl GridPointSource, q: &PointLonLat, k: usize) -> Vec<usize> {
    let q = to_cartesian(*q);
    let mut all: Vec<(f64, usize)> = source
        .points()
        .enumerate()
        .map(|(i, p)| (to_cartesian(p).distance_squared(&q), i))
        .collect();
    all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    all.into_iter().take(k).map(|(_, i)| i).collect()
}
