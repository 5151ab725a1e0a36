/// Magic byte at the start of a serialized tree.
pub(crate) const KDTREE_MAGIC: u8 = 0xdb;

/// Serialization format version.
pub(crate) const KDTREE_VERSION: u8 = 1;

/// magic (1) + version (1) + node size (2) + item count (4)
pub(crate) const KDTREE_HEADER_SIZE: usize = 8;

pub(crate) const DEFAULT_NODE_SIZE: usize = 64;
