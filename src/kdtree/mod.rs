//! A static 3-D k-d tree over points on the unit sphere.
//!
//! The tree is a pair of flat arrays (coordinates and original ids) kd-sorted in place by the
//! builder, so it can be copied, cached and persisted as a single buffer.

#![warn(missing_docs)]

mod builder;
pub(crate) mod constants;
mod index;
mod r#trait;

pub use builder::KDTreeBuilder;
pub use index::KDTree;
pub use r#trait::{KDTreeIndex, Neighbour};
