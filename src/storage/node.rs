//! On-page layout of leaf and internal B+tree nodes.
//!
//! Every accessor here is a pure positional read/write into a 4096-byte
//! page buffer; nothing here touches the pager or the file. Byte offsets
//! match the on-disk contract exactly and must not drift between runs.
use crate::errors::Error;

pub const PAGE_SIZE: usize = 4096;
pub const INVALID_PAGE_NUM: u32 = u32::MAX;

// Common header, present on every node.
const NODE_TYPE_OFFSET: usize = 0;
const NODE_TYPE_SIZE: usize = 1;
const IS_ROOT_OFFSET: usize = NODE_TYPE_OFFSET + NODE_TYPE_SIZE;
const IS_ROOT_SIZE: usize = 1;
const PARENT_POINTER_OFFSET: usize = IS_ROOT_OFFSET + IS_ROOT_SIZE;
const PARENT_POINTER_SIZE: usize = 4;
pub const COMMON_NODE_HEADER_SIZE: usize =
    NODE_TYPE_SIZE + IS_ROOT_SIZE + PARENT_POINTER_SIZE;

// Leaf header, following the common header.
const LEAF_NODE_NUM_CELLS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const LEAF_NODE_NUM_CELLS_SIZE: usize = 4;
const LEAF_NODE_NEXT_LEAF_OFFSET: usize = LEAF_NODE_NUM_CELLS_OFFSET + LEAF_NODE_NUM_CELLS_SIZE;
const LEAF_NODE_NEXT_LEAF_SIZE: usize = 4;
pub const LEAF_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + LEAF_NODE_NUM_CELLS_SIZE + LEAF_NODE_NEXT_LEAF_SIZE;

pub const LEAF_NODE_KEY_SIZE: usize = 4;
pub const LEAF_NODE_SPACE_FOR_CELLS: usize = PAGE_SIZE - LEAF_NODE_HEADER_SIZE;

// Internal header, following the common header.
const INTERNAL_NODE_NUM_KEYS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const INTERNAL_NODE_NUM_KEYS_SIZE: usize = 4;
const INTERNAL_NODE_RIGHT_CHILD_OFFSET: usize =
    INTERNAL_NODE_NUM_KEYS_OFFSET + INTERNAL_NODE_NUM_KEYS_SIZE;
const INTERNAL_NODE_RIGHT_CHILD_SIZE: usize = 4;
pub const INTERNAL_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + INTERNAL_NODE_NUM_KEYS_SIZE + INTERNAL_NODE_RIGHT_CHILD_SIZE;

pub const INTERNAL_NODE_KEY_SIZE: usize = 4;
pub const INTERNAL_NODE_CHILD_SIZE: usize = 4;
pub const INTERNAL_NODE_CELL_SIZE: usize = INTERNAL_NODE_CHILD_SIZE + INTERNAL_NODE_KEY_SIZE;
/// Fixed at 3 in the source; part of the on-disk contract, not derived.
pub const INTERNAL_NODE_MAX_CELLS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Leaf,
    Internal,
}

impl NodeType {
    fn from_byte(b: u8) -> Result<Self, Error> {
        match b {
            0 => Ok(NodeType::Leaf),
            1 => Ok(NodeType::Internal),
            other => Err(err!(Fatal, "unrecognised node type byte {}", other)),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            NodeType::Leaf => 0,
            NodeType::Internal => 1,
        }
    }
}

/// A single resident page, viewed as a B+tree node.
///
/// `leaf_cell_size` is schema-derived (`4 + row_size`) and fixed for the
/// lifetime of the table; it's threaded in here rather than recomputed on
/// every access.
pub struct Node {
    pub data: [u8; PAGE_SIZE],
    leaf_cell_size: usize,
    leaf_max_cells: usize,
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Node {
            data: self.data,
            leaf_cell_size: self.leaf_cell_size,
            leaf_max_cells: self.leaf_max_cells,
        }
    }
}

impl Node {
    pub fn new(data: [u8; PAGE_SIZE], leaf_cell_size: usize) -> Self {
        let leaf_max_cells = LEAF_NODE_SPACE_FOR_CELLS / leaf_cell_size;
        Node {
            data,
            leaf_cell_size,
            leaf_max_cells,
        }
    }

    pub fn leaf_max_cells(&self) -> usize {
        self.leaf_max_cells
    }

    pub fn leaf_cell_size(&self) -> usize {
        self.leaf_cell_size
    }

    // ---- common header ----

    pub fn node_type(&self) -> Result<NodeType, Error> {
        NodeType::from_byte(self.data[NODE_TYPE_OFFSET])
    }

    pub fn set_node_type(&mut self, t: NodeType) {
        self.data[NODE_TYPE_OFFSET] = t.to_byte();
    }

    pub fn is_root(&self) -> bool {
        self.data[IS_ROOT_OFFSET] != 0
    }

    pub fn set_is_root(&mut self, is_root: bool) {
        self.data[IS_ROOT_OFFSET] = is_root as u8;
    }

    pub fn parent(&self) -> u32 {
        u32::from_le_bytes(
            self.data[PARENT_POINTER_OFFSET..PARENT_POINTER_OFFSET + PARENT_POINTER_SIZE]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_parent(&mut self, page_num: u32) {
        self.data[PARENT_POINTER_OFFSET..PARENT_POINTER_OFFSET + PARENT_POINTER_SIZE]
            .copy_from_slice(&page_num.to_le_bytes());
    }

    // ---- leaf node ----

    pub fn leaf_num_cells(&self) -> u32 {
        u32::from_le_bytes(
            self.data[LEAF_NODE_NUM_CELLS_OFFSET..LEAF_NODE_NUM_CELLS_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_leaf_num_cells(&mut self, n: u32) {
        self.data[LEAF_NODE_NUM_CELLS_OFFSET..LEAF_NODE_NUM_CELLS_OFFSET + 4]
            .copy_from_slice(&n.to_le_bytes());
    }

    pub fn leaf_next_leaf(&self) -> u32 {
        u32::from_le_bytes(
            self.data[LEAF_NODE_NEXT_LEAF_OFFSET..LEAF_NODE_NEXT_LEAF_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_leaf_next_leaf(&mut self, page_num: u32) {
        self.data[LEAF_NODE_NEXT_LEAF_OFFSET..LEAF_NODE_NEXT_LEAF_OFFSET + 4]
            .copy_from_slice(&page_num.to_le_bytes());
    }

    fn leaf_cell_offset(&self, cell_num: u32) -> usize {
        LEAF_NODE_HEADER_SIZE + cell_num as usize * self.leaf_cell_size
    }

    pub fn leaf_cell(&self, cell_num: u32) -> &[u8] {
        let off = self.leaf_cell_offset(cell_num);
        &self.data[off..off + self.leaf_cell_size]
    }

    pub fn leaf_cell_mut(&mut self, cell_num: u32) -> &mut [u8] {
        let off = self.leaf_cell_offset(cell_num);
        &mut self.data[off..off + self.leaf_cell_size]
    }

    pub fn leaf_key(&self, cell_num: u32) -> u32 {
        u32::from_le_bytes(self.leaf_cell(cell_num)[..LEAF_NODE_KEY_SIZE].try_into().unwrap())
    }

    pub fn set_leaf_key(&mut self, cell_num: u32, key: u32) {
        self.leaf_cell_mut(cell_num)[..LEAF_NODE_KEY_SIZE].copy_from_slice(&key.to_le_bytes());
    }

    pub fn leaf_value(&self, cell_num: u32) -> &[u8] {
        &self.leaf_cell(cell_num)[LEAF_NODE_KEY_SIZE..]
    }

    pub fn leaf_value_mut(&mut self, cell_num: u32) -> &mut [u8] {
        &mut self.leaf_cell_mut(cell_num)[LEAF_NODE_KEY_SIZE..]
    }

    /// Copy `src` (a whole leaf cell: key + row bytes) into `cell_num`'s slot.
    pub fn write_leaf_cell(&mut self, cell_num: u32, src: &[u8]) {
        self.leaf_cell_mut(cell_num).copy_from_slice(src);
    }

    /// Shift cells `[from, num_cells)` one slot to the right, making room
    /// for an insertion at `from`. Caller updates `num_cells` separately.
    pub fn shift_leaf_cells_right(&mut self, from: u32, num_cells: u32) {
        let mut i = num_cells;
        while i > from {
            let (src_off, dst_off) = (self.leaf_cell_offset(i - 1), self.leaf_cell_offset(i));
            let size = self.leaf_cell_size;
            self.data.copy_within(src_off..src_off + size, dst_off);
            i -= 1;
        }
    }

    /// Shift cells `(at, num_cells)` one slot to the left, closing the gap
    /// left by removing the cell at `at`. Caller updates `num_cells` separately.
    pub fn shift_leaf_cells_left(&mut self, at: u32, num_cells: u32) {
        let size = self.leaf_cell_size;
        for i in at..num_cells.saturating_sub(1) {
            let (src_off, dst_off) = (self.leaf_cell_offset(i + 1), self.leaf_cell_offset(i));
            self.data.copy_within(src_off..src_off + size, dst_off);
        }
    }

    pub fn init_leaf(&mut self) {
        self.set_node_type(NodeType::Leaf);
        self.set_is_root(false);
        self.set_leaf_num_cells(0);
        self.set_leaf_next_leaf(0);
    }

    // ---- internal node ----

    pub fn internal_num_keys(&self) -> u32 {
        u32::from_le_bytes(
            self.data[INTERNAL_NODE_NUM_KEYS_OFFSET..INTERNAL_NODE_NUM_KEYS_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_internal_num_keys(&mut self, n: u32) {
        self.data[INTERNAL_NODE_NUM_KEYS_OFFSET..INTERNAL_NODE_NUM_KEYS_OFFSET + 4]
            .copy_from_slice(&n.to_le_bytes());
    }

    pub fn internal_right_child(&self) -> u32 {
        u32::from_le_bytes(
            self.data[INTERNAL_NODE_RIGHT_CHILD_OFFSET..INTERNAL_NODE_RIGHT_CHILD_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_internal_right_child(&mut self, page_num: u32) {
        self.data[INTERNAL_NODE_RIGHT_CHILD_OFFSET..INTERNAL_NODE_RIGHT_CHILD_OFFSET + 4]
            .copy_from_slice(&page_num.to_le_bytes());
    }

    fn internal_cell_offset(cell_num: u32) -> usize {
        INTERNAL_NODE_HEADER_SIZE + cell_num as usize * INTERNAL_NODE_CELL_SIZE
    }

    pub fn internal_child(&self, child_num: u32) -> Result<u32, Error> {
        let num_keys = self.internal_num_keys();
        if child_num > num_keys {
            return Err(err!(
                Fatal,
                "internal child index {} out of range ({} keys)",
                child_num,
                num_keys
            ));
        }
        let page_num = if child_num == num_keys {
            self.internal_right_child()
        } else {
            let off = Self::internal_cell_offset(child_num);
            u32::from_le_bytes(self.data[off..off + INTERNAL_NODE_CHILD_SIZE].try_into().unwrap())
        };
        if page_num == INVALID_PAGE_NUM {
            return Err(err!(Fatal, "dereferenced an invalid child pointer"));
        }
        Ok(page_num)
    }

    pub fn set_internal_child(&mut self, child_num: u32, page_num: u32) {
        let num_keys = self.internal_num_keys();
        if child_num == num_keys {
            self.set_internal_right_child(page_num);
        } else {
            let off = Self::internal_cell_offset(child_num);
            self.data[off..off + INTERNAL_NODE_CHILD_SIZE].copy_from_slice(&page_num.to_le_bytes());
        }
    }

    pub fn internal_key(&self, key_num: u32) -> u32 {
        let off = Self::internal_cell_offset(key_num) + INTERNAL_NODE_CHILD_SIZE;
        u32::from_le_bytes(self.data[off..off + INTERNAL_NODE_KEY_SIZE].try_into().unwrap())
    }

    pub fn set_internal_key(&mut self, key_num: u32, key: u32) {
        let off = Self::internal_cell_offset(key_num) + INTERNAL_NODE_CHILD_SIZE;
        self.data[off..off + INTERNAL_NODE_KEY_SIZE].copy_from_slice(&key.to_le_bytes());
    }

    pub fn write_internal_cell(&mut self, cell_num: u32, child_page: u32, key: u32) {
        let off = Self::internal_cell_offset(cell_num);
        self.data[off..off + INTERNAL_NODE_CHILD_SIZE].copy_from_slice(&child_page.to_le_bytes());
        self.data[off + INTERNAL_NODE_CHILD_SIZE..off + INTERNAL_NODE_CELL_SIZE]
            .copy_from_slice(&key.to_le_bytes());
    }

    pub fn shift_internal_cells_right(&mut self, from: u32, num_keys: u32) {
        let mut i = num_keys;
        while i > from {
            let (src_off, dst_off) = (Self::internal_cell_offset(i - 1), Self::internal_cell_offset(i));
            self.data
                .copy_within(src_off..src_off + INTERNAL_NODE_CELL_SIZE, dst_off);
            i -= 1;
        }
    }

    pub fn init_internal(&mut self) {
        self.set_node_type(NodeType::Internal);
        self.set_is_root(false);
        self.set_internal_num_keys(0);
        self.set_internal_right_child(INVALID_PAGE_NUM);
    }

    /// Binary search: smallest index `i` in `0..=num_keys` with
    /// `separator[i] >= key` (index `num_keys` means "right child").
    pub fn internal_find_child(&self, key: u32) -> u32 {
        let num_keys = self.internal_num_keys();
        let (mut lo, mut hi) = (0u32, num_keys);
        while lo != hi {
            let mid = lo + (hi - lo) / 2;
            if self.internal_key(mid) >= key {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// Binary search within a leaf for the matching key or insertion point.
    pub fn leaf_find_cell(&self, key: u32) -> u32 {
        let num_cells = self.leaf_num_cells();
        let (mut lo, mut hi) = (0u32, num_cells);
        while lo != hi {
            let mid = lo + (hi - lo) / 2;
            let mid_key = self.leaf_key(mid);
            if key == mid_key {
                return mid;
            }
            if key < mid_key {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }
}
