use std::cmp;

use crate::error::{GridIndexError, Result};
use crate::kdtree::constants::DEFAULT_NODE_SIZE;
use crate::kdtree::KDTree;
use crate::point::Point3;

/// A builder to create a [`KDTree`].
///
/// The number of items is fixed up front; points are then added one at a time with
/// [`add`][Self::add] or in bulk with [`add_interleaved`][Self::add_interleaved], and
/// [`finish`][Self::finish] performs the k-d sort.
#[derive(Debug)]
pub struct KDTreeBuilder {
    /// x, y, z interleaved
    coords: Vec<f64>,
    ids: Vec<u32>,

    num_items: usize,
    node_size: usize,
}

impl KDTreeBuilder {
    /// Create a new builder with the provided number of items and the default node size.
    pub fn new(num_items: usize) -> Result<Self> {
        Self::new_with_node_size(num_items, DEFAULT_NODE_SIZE)
    }

    /// Create a new builder with the provided number of items and node size.
    ///
    /// # Panics
    ///
    /// If `node_size` is not within `2..=65535`.
    pub fn new_with_node_size(num_items: usize, node_size: usize) -> Result<Self> {
        assert!((2..=65535).contains(&node_size));
        if u32::try_from(num_items).is_err() {
            return Err(GridIndexError::Construction(format!(
                "a k-d tree holds at most {} items, got {}",
                u32::MAX,
                num_items
            )));
        }

        Ok(Self {
            coords: Vec::with_capacity(num_items * 3),
            ids: Vec::with_capacity(num_items),
            num_items,
            node_size,
        })
    }

    /// Number of points added so far.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no point has been added yet.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Add a point to the index, returning its original index.
    pub fn add(&mut self, p: Point3) -> Result<usize> {
        let index = self.ids.len();
        if index == self.num_items {
            return Err(GridIndexError::Integrity {
                expected: self.num_items,
                actual: index + 1,
            });
        }

        self.ids.push(index as u32);
        self.coords.extend_from_slice(&[p.x, p.y, p.z]);

        Ok(index)
    }

    /// Add many points at once from an interleaved `[x0, y0, z0, x1, y1, z1, ...]` buffer.
    pub fn add_interleaved(&mut self, coords: &[f64]) -> Result<()> {
        if coords.len() % 3 != 0 {
            return Err(GridIndexError::Construction(format!(
                "interleaved coordinates must come in triples, got {} values",
                coords.len()
            )));
        }

        let start = self.ids.len();
        let end = start + coords.len() / 3;
        if end > self.num_items {
            return Err(GridIndexError::Integrity {
                expected: self.num_items,
                actual: end,
            });
        }

        self.ids.extend((start..end).map(|i| i as u32));
        self.coords.extend_from_slice(coords);

        Ok(())
    }

    /// Consume this builder, performing the k-d sort and generating a KDTree ready for queries.
    pub fn finish(mut self) -> Result<KDTree> {
        if self.ids.len() != self.num_items {
            return Err(GridIndexError::Integrity {
                expected: self.num_items,
                actual: self.ids.len(),
            });
        }

        // kd-sort both arrays for efficient search
        if self.num_items > 0 {
            sort(
                &mut self.ids,
                &mut self.coords,
                self.node_size,
                0,
                self.num_items - 1,
                0,
            );
        }

        Ok(KDTree {
            coords: self.coords,
            ids: self.ids,
            node_size: self.node_size,
        })
    }
}

fn sort(
    ids: &mut [u32],
    coords: &mut [f64],
    node_size: usize,
    left: usize,
    right: usize,
    axis: usize,
) {
    if right - left <= node_size {
        return;
    }

    // middle index
    let m = (left + right) >> 1;

    // sort ids and coords around the middle index so that the halves lie on either side of the
    // splitting plane of the current axis
    select(ids, coords, m, left, right, axis);

    // recursively kd-sort first half and second half on the next axis
    let next = (axis + 1) % 3;
    sort(ids, coords, node_size, left, m - 1, next);
    sort(ids, coords, node_size, m + 1, right, next);
}

/// Custom Floyd-Rivest selection algorithm: sort ids and coords so that [left..k-1] items are
/// smaller than k-th item on the given axis
#[inline]
fn select(
    ids: &mut [u32],
    coords: &mut [f64],
    k: usize,
    mut left: usize,
    mut right: usize,
    axis: usize,
) {
    while right > left {
        if right - left > 600 {
            let n = (right - left + 1) as f64;
            let m = (k - left + 1) as f64;
            let z = f64::ln(n);
            let s = 0.5 * f64::exp((2.0 * z) / 3.0);
            let sd = 0.5
                * f64::sqrt((z * s * (n - s)) / n)
                * (if m - n / 2.0 < 0.0 { -1.0 } else { 1.0 });
            let new_left = cmp::max(left, f64::floor(k as f64 - (m * s) / n + sd) as usize);
            let new_right = cmp::min(
                right,
                f64::floor(k as f64 + ((n - m) * s) / n + sd) as usize,
            );
            select(ids, coords, k, new_left, new_right, axis);
        }

        let t = coords[3 * k + axis];
        let mut i = left;
        let mut j = right;

        swap_item(ids, coords, left, k);
        if coords[3 * right + axis] > t {
            swap_item(ids, coords, left, right);
        }

        while i < j {
            swap_item(ids, coords, i, j);
            i += 1;
            j -= 1;
            while coords[3 * i + axis] < t {
                i += 1;
            }
            while coords[3 * j + axis] > t {
                j -= 1;
            }
        }

        if coords[3 * left + axis] == t {
            swap_item(ids, coords, left, j);
        } else {
            j += 1;
            swap_item(ids, coords, j, right);
        }

        if j <= k {
            left = j + 1;
        }
        if k <= j {
            right = j - 1;
        }
    }
}

#[inline]
fn swap_item(ids: &mut [u32], coords: &mut [f64], i: usize, j: usize) {
    ids.swap(i, j);
    coords.swap(3 * i, 3 * j);
    coords.swap(3 * i + 1, 3 * j + 1);
    coords.swap(3 * i + 2, 3 * j + 2);
}
