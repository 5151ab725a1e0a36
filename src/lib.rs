#![doc = include_str!("../README.md")]

mod error;
pub mod fraction;
pub mod grid;
pub mod kdtree;
pub mod point;
pub mod projection;
pub mod range;
pub mod search;

pub use error::{GridIndexError, Result};
pub use fraction::Fraction;
pub use range::Range;
pub use search::Search;

#[cfg(test)]
pub(crate) mod test;
