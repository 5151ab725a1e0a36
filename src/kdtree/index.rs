use bytemuck::{cast_slice, pod_collect_to_vec};

use crate::error::{GridIndexError, Result};
use crate::kdtree::constants::{KDTREE_HEADER_SIZE, KDTREE_MAGIC, KDTREE_VERSION};

/// An owned, kd-sorted tree.
///
/// Usually this will be created from scratch via [`KDTreeBuilder`][crate::kdtree::KDTreeBuilder],
/// or restored from a buffer produced by [`to_bytes`][KDTree::to_bytes].
#[derive(Debug, Clone, PartialEq)]
pub struct KDTree {
    pub(crate) coords: Vec<f64>,
    pub(crate) ids: Vec<u32>,
    pub(crate) node_size: usize,
}

fn byte_len(num_items: usize) -> (usize, usize, usize) {
    let ids_byte_size = num_items * 4;
    let pad_coords_byte_size = (8 - (ids_byte_size % 8)) % 8;
    let coords_byte_size = num_items * 3 * 8;
    (ids_byte_size, pad_coords_byte_size, coords_byte_size)
}

impl KDTree {
    /// Approximate heap size of this tree in bytes.
    pub fn footprint(&self) -> usize {
        self.coords.len() * std::mem::size_of::<f64>() + self.ids.len() * std::mem::size_of::<u32>()
    }

    /// Serialize into a single buffer: an 8 byte header, the ids, padding to an 8 byte boundary
    /// and the interleaved coordinates, all in native byte order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let num_items = self.ids.len();
        let (ids_byte_size, pad, coords_byte_size) = byte_len(num_items);

        let mut data = Vec::with_capacity(KDTREE_HEADER_SIZE + ids_byte_size + pad + coords_byte_size);
        data.push(KDTREE_MAGIC);
        data.push(KDTREE_VERSION);
        data.extend_from_slice(&(self.node_size as u16).to_le_bytes());
        data.extend_from_slice(&(num_items as u32).to_le_bytes());
        data.extend_from_slice(cast_slice(&self.ids));
        data.resize(data.len() + pad, 0);
        data.extend_from_slice(cast_slice(&self.coords));
        data
    }

    /// Restore a tree from a buffer produced by [`to_bytes`][KDTree::to_bytes].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < KDTREE_HEADER_SIZE {
            return Err(GridIndexError::Format(format!(
                "buffer of {} bytes is too short for a k-d tree header",
                data.len()
            )));
        }

        if data[0] != KDTREE_MAGIC {
            return Err(GridIndexError::Format(
                "Data not in k-d tree format.".to_string(),
            ));
        }

        let version = data[1];
        if version != KDTREE_VERSION {
            return Err(GridIndexError::Format(format!(
                "Got v{} data when expected v{}.",
                version, KDTREE_VERSION
            )));
        }

        let node_size = u16::from_le_bytes([data[2], data[3]]) as usize;
        let num_items = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        if node_size < 2 {
            return Err(GridIndexError::Format(format!(
                "invalid node size {}",
                node_size
            )));
        }

        let (ids_byte_size, pad, coords_byte_size) = byte_len(num_items);
        let expected = KDTREE_HEADER_SIZE + ids_byte_size + pad + coords_byte_size;
        if data.len() != expected {
            return Err(GridIndexError::Format(format!(
                "expected {} bytes for {} items, got {}",
                expected,
                num_items,
                data.len()
            )));
        }

        let ids_start = KDTREE_HEADER_SIZE;
        let coords_start = ids_start + ids_byte_size + pad;
        let ids: Vec<u32> = pod_collect_to_vec(&data[ids_start..ids_start + ids_byte_size]);
        let coords: Vec<f64> = pod_collect_to_vec(&data[coords_start..]);

        Ok(Self {
            coords,
            ids,
            node_size,
        })
    }
}
