use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use geo_traits::CoordTrait;
use tinyvec::TinyVec;

use crate::kdtree::KDTree;
use crate::point::Point3;

/// A point found by a query, with its original insertion index and its Euclidean distance to the
/// query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    /// Coordinates of the found point
    pub point: Point3,
    /// Insertion index of the found point
    pub index: usize,
    /// Euclidean distance to the query point
    pub distance: f64,
}

/// A trait for searching and accessing data out of a KDTree.
pub trait KDTreeIndex: Sized {
    /// The underlying kd-sorted coordinate buffer of this tree, `x, y, z` interleaved
    fn coords(&self) -> &[f64];

    /// The underlying kd-sorted insertion indices of this tree
    fn ids(&self) -> &[u32];

    /// The node size of this KDTree
    fn node_size(&self) -> usize;

    /// The number of items in this KDTree
    fn num_items(&self) -> usize {
        self.ids().len()
    }

    /// The point stored at a sorted position
    fn point_at(&self, position: usize) -> Point3 {
        Point3::from_slice(&self.coords()[3 * position..3 * position + 3])
    }

    /// Find the single closest point. Equally distant points resolve to the smaller insertion
    /// index.
    ///
    /// Returns `None` for an empty tree.
    fn nearest(&self, q: &Point3) -> Option<Neighbour> {
        let ids = self.ids();
        let coords = self.coords();
        let node_size = self.node_size();
        if ids.is_empty() {
            return None;
        }

        // (sorted position, squared distance)
        let mut best: Option<(usize, f64)> = None;
        let consider = |i: usize, best: &mut Option<(usize, f64)>| {
            let d = Point3::from_slice(&coords[3 * i..3 * i + 3]).distance_squared(q);
            let closer = match *best {
                None => true,
                Some((b, bd)) => d < bd || (d == bd && ids[i] < ids[b]),
            };
            if closer {
                *best = Some((i, d));
            }
        };

        // Use TinyVec to avoid heap allocations
        // (left, right, axis, squared distance to the splitting plane)
        let mut stack: TinyVec<[(usize, usize, usize, f64); 33]> = TinyVec::new();
        stack.push((0, ids.len() - 1, 0, 0.));

        while let Some((left, right, axis, bound)) = stack.pop() {
            if best.is_some_and(|(_, bd)| bound > bd) {
                continue;
            }

            // if we reached "tree node", search linearly
            if right - left <= node_size {
                for i in left..right + 1 {
                    consider(i, &mut best);
                }
                continue;
            }

            // otherwise find the middle index
            let m = (left + right) >> 1;
            consider(m, &mut best);

            let diff = q.nth(axis) - coords[3 * m + axis];
            let next = (axis + 1) % 3;
            let plane = diff * diff;

            // Note: the far half is pushed first so the near half is popped first
            if diff <= 0. {
                stack.push((m + 1, right, next, plane));
                stack.push((left, m - 1, next, bound));
            } else {
                stack.push((left, m - 1, next, plane));
                stack.push((m + 1, right, next, bound));
            }
        }

        best.map(|(i, d)| Neighbour {
            point: self.point_at(i),
            index: ids[i] as usize,
            distance: d.sqrt(),
        })
    }

    /// Search items in order of distance from the given point.
    ///
    /// - q: query point
    /// - max_results: stop after this many results
    /// - max_distance: skip points further away than this
    ///
    /// Results are sorted by ascending distance, then by insertion index.
    fn neighbors(
        &self,
        q: &Point3,
        max_results: Option<usize>,
        max_distance: Option<f64>,
    ) -> Vec<Neighbour> {
        let ids = self.ids();
        let coords = self.coords();
        let node_size = self.node_size();
        let max_dist_squared = max_distance.map_or(f64::INFINITY, |d| d * d);

        let mut results = vec![];
        if ids.is_empty() || max_results == Some(0) {
            return results;
        }

        let mut queue = BinaryHeap::new();
        queue.push(Reverse(Candidate {
            dist: 0.,
            entry: Entry::Node {
                left: 0,
                right: ids.len() - 1,
                axis: 0,
                bbox: BBox::unbounded(),
            },
        }));

        while let Some(Reverse(candidate)) = queue.pop() {
            if candidate.dist > max_dist_squared {
                break;
            }

            let (left, right, axis, bbox) = match candidate.entry {
                Entry::Item { position, .. } => {
                    results.push(Neighbour {
                        point: self.point_at(position),
                        index: ids[position] as usize,
                        distance: candidate.dist.sqrt(),
                    });
                    if max_results.is_some_and(|max_results| results.len() == max_results) {
                        break;
                    }
                    continue;
                }
                Entry::Node {
                    left,
                    right,
                    axis,
                    bbox,
                } => (left, right, axis, bbox),
            };

            let push_item = |i: usize, queue: &mut BinaryHeap<Reverse<Candidate>>| {
                let dist = Point3::from_slice(&coords[3 * i..3 * i + 3]).distance_squared(q);
                if dist <= max_dist_squared {
                    queue.push(Reverse(Candidate {
                        dist,
                        entry: Entry::Item {
                            id: ids[i],
                            position: i,
                        },
                    }));
                }
            };

            if right - left <= node_size {
                for i in left..right + 1 {
                    push_item(i, &mut queue);
                }
                continue;
            }

            let m = (left + right) >> 1;
            push_item(m, &mut queue);

            let t = coords[3 * m + axis];
            let next = (axis + 1) % 3;
            for (l, r, child) in [
                (left, m - 1, bbox.with_max(axis, t)),
                (m + 1, right, bbox.with_min(axis, t)),
            ] {
                let dist = child.distance_squared(q);
                if dist <= max_dist_squared {
                    queue.push(Reverse(Candidate {
                        dist,
                        entry: Entry::Node {
                            left: l,
                            right: r,
                            axis: next,
                            bbox: child,
                        },
                    }));
                }
            }
        }

        results
    }

    /// Search the index for items within a given radius.
    ///
    /// - q: query point
    /// - r: radius
    ///
    /// Returns found items in no particular order
    fn within(&self, q: &Point3, r: f64) -> Vec<Neighbour> {
        let ids = self.ids();
        let coords = self.coords();
        let node_size = self.node_size();

        let mut result = vec![];
        if ids.is_empty() {
            return result;
        }

        let r2 = r * r;
        let include = |i: usize, result: &mut Vec<Neighbour>| {
            let p = Point3::from_slice(&coords[3 * i..3 * i + 3]);
            let d = p.distance_squared(q);
            if d <= r2 {
                result.push(Neighbour {
                    point: p,
                    index: ids[i] as usize,
                    distance: d.sqrt(),
                });
            }
        };

        // Use TinyVec to avoid heap allocations
        let mut stack: TinyVec<[usize; 33]> = TinyVec::new();
        stack.push(0);
        stack.push(ids.len() - 1);
        stack.push(0);

        // recursively search for items within radius in the kd-sorted arrays
        while !stack.is_empty() {
            let axis = stack.pop().unwrap_or(0);
            let right = stack.pop().unwrap_or(0);
            let left = stack.pop().unwrap_or(0);

            // if we reached "tree node", search linearly
            if right - left <= node_size {
                for i in left..right + 1 {
                    include(i, &mut result);
                }
                continue;
            }

            // otherwise find the middle index
            let m = (left + right) >> 1;

            // include the middle item if it's in range
            include(m, &mut result);

            // queue search in halves that intersect the query
            let t = coords[3 * m + axis];
            let next = (axis + 1) % 3;
            if q.nth(axis) - r <= t {
                // Note: these are pushed in backwards order to what gets popped
                stack.push(left);
                stack.push(m - 1);
                stack.push(next);
            }

            if q.nth(axis) + r >= t {
                stack.push(m + 1);
                stack.push(right);
                stack.push(next);
            }
        }

        result
    }

    /// Find the single closest point to a 3-D coordinate.
    fn nearest_coord(&self, coord: &impl CoordTrait<T = f64>) -> Option<Neighbour> {
        self.nearest(&to_point3(coord))
    }

    /// Search items within a given radius of a 3-D coordinate.
    fn within_coord(&self, coord: &impl CoordTrait<T = f64>, r: f64) -> Vec<Neighbour> {
        self.within(&to_point3(coord), r)
    }
}

impl KDTreeIndex for KDTree {
    fn coords(&self) -> &[f64] {
        &self.coords
    }

    fn ids(&self) -> &[u32] {
        &self.ids
    }

    fn node_size(&self) -> usize {
        self.node_size
    }
}

fn to_point3(coord: &impl CoordTrait<T = f64>) -> Point3 {
    let z = coord.nth(2).unwrap_or(0.);
    Point3::new(coord.x(), coord.y(), z)
}

/// Axis-aligned bounds of a subtree, used as a lower bound on the distance to its points.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BBox {
    min: [f64; 3],
    max: [f64; 3],
}

impl BBox {
    fn unbounded() -> Self {
        Self {
            min: [f64::NEG_INFINITY; 3],
            max: [f64::INFINITY; 3],
        }
    }

    fn with_min(mut self, axis: usize, value: f64) -> Self {
        self.min[axis] = value;
        self
    }

    fn with_max(mut self, axis: usize, value: f64) -> Self {
        self.max[axis] = value;
        self
    }

    fn distance_squared(&self, q: &Point3) -> f64 {
        (0..3)
            .map(|axis| {
                let d = axis_dist(q.nth(axis), self.min[axis], self.max[axis]);
                d * d
            })
            .sum()
    }
}

#[inline]
fn axis_dist(k: f64, min: f64, max: f64) -> f64 {
    if k < min {
        min - k
    } else if k <= max {
        0.
    } else {
        k - max
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Entry {
    Node {
        left: usize,
        right: usize,
        axis: usize,
        bbox: BBox,
    },
    Item {
        id: u32,
        position: usize,
    },
}

/// A wrapper around a subtree or an item and its squared distance for use in the priority queue.
///
/// At equal distance subtrees sort before items and items by ascending id, so a popped item is
/// never preceded by an equally distant item with a smaller id.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    dist: f64,
    entry: Entry,
}

impl Candidate {
    fn rank(&self) -> (u8, u32) {
        match self.entry {
            Entry::Node { .. } => (0, 0),
            Entry::Item { id, .. } => (1, id),
        }
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.rank().cmp(&other.rank()))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
