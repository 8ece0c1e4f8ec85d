//! B+tree insert, update-in-place and delete, plus the split/promote
//! machinery that keeps the tree balanced as leaves and internal nodes fill
//! up. Everything here operates through a `Table`'s pager one page at a
//! time; there is no in-memory copy of the tree.
use crate::errors::Error;
use crate::storage::cursor::Cursor;
use crate::storage::node::{NodeType, INTERNAL_NODE_MAX_CELLS, INVALID_PAGE_NUM};
use crate::storage::pager;
use crate::storage::row::{self, Row};
use crate::storage::table::Table;

/// Inserts `row`, erroring with `Error::DuplicateKey` if its primary key
/// already exists. Splits the target leaf (and, transitively, internal
/// nodes up to the root) when it has no room.
pub fn insert(table: &mut Table, row: &Row) -> Result<(), Error> {
    let id = row.id()?;
    let mut bytes = vec![0u8; table.schema.row_size as usize];
    row::serialize(&table.schema, row, &mut bytes)?;

    let (page_num, cell_num) = {
        let cursor = Cursor::find(table, id)?;
        (cursor.page_num, cursor.cell_num)
    };

    let (num_cells, max_cells) = {
        let arc = table.pager.get(page_num)?;
        let node = pager::lock(&arc, page_num)?;
        if cell_num < node.leaf_num_cells() && node.leaf_key(cell_num) == id {
            return Err(Error::DuplicateKey(id));
        }
        (node.leaf_num_cells(), node.leaf_max_cells() as u32)
    };

    if num_cells >= max_cells {
        leaf_split_and_insert(table, page_num, cell_num, id, &bytes)?;
        return Ok(());
    }

    let arc = table.pager.get(page_num)?;
    let mut node = pager::lock(&arc, page_num)?;
    node.shift_leaf_cells_right(cell_num, num_cells);
    node.set_leaf_num_cells(num_cells + 1);
    node.set_leaf_key(cell_num, id);
    node.leaf_value_mut(cell_num).copy_from_slice(&bytes);
    Ok(())
}

/// Overwrites the row with primary key `id` in place. The caller
/// (`table::update_rows`) is responsible for not changing the key itself;
/// this never moves the cell, so a mismatched key would desync it from its
/// leaf position.
pub fn replace(table: &mut Table, id: u32, row: &Row) -> Result<(), Error> {
    let mut bytes = vec![0u8; table.schema.row_size as usize];
    row::serialize(&table.schema, row, &mut bytes)?;

    let mut cursor = Cursor::find(table, id)?;
    let found = {
        let arc = cursor.table.pager.get(cursor.page_num)?;
        let node = pager::lock(&arc, cursor.page_num)?;
        cursor.cell_num < node.leaf_num_cells() && node.leaf_key(cursor.cell_num) == id
    };
    if !found {
        return Err(err!(Db, "no row with id {}", id));
    }
    cursor.write_value(&bytes)
}

/// Removes the row with primary key `id`. Leaf-only: the cell is shifted
/// out and the leaf's parent separator is fixed up if the leaf's max key
/// changed. There is no merge or rebalance, so a leaf can end up sparse or
/// even empty; an empty leaf is left in the sibling chain rather than
/// spliced out.
pub fn delete(table: &mut Table, id: u32) -> Result<(), Error> {
    let cursor = Cursor::find(table, id)?;
    let (page_num, cell_num) = (cursor.page_num, cursor.cell_num);

    let (found, num_cells, is_root, parent) = {
        let arc = table.pager.get(page_num)?;
        let node = pager::lock(&arc, page_num)?;
        let num_cells = node.leaf_num_cells();
        let found = cell_num < num_cells && node.leaf_key(cell_num) == id;
        (found, num_cells, node.is_root(), node.parent())
    };
    if !found {
        return Err(err!(Db, "no row with id {}", id));
    }

    let old_max = get_node_max_key(table, page_num)?;

    {
        let arc = table.pager.get(page_num)?;
        let mut node = pager::lock(&arc, page_num)?;
        node.shift_leaf_cells_left(cell_num, num_cells);
        node.set_leaf_num_cells(num_cells - 1);
    }

    // An emptied leaf has no max key to propagate; leave the parent
    // separator stale rather than defining behavior for a degenerate case.
    if !is_root && num_cells > 1 {
        let new_max = get_node_max_key(table, page_num)?;
        if new_max != old_max {
            update_internal_node_key(table, parent, old_max, new_max)?;
        }
    }
    Ok(())
}

/// The maximum key reachable under `page_num`: the leaf's own last key, or
/// the recursive max of its right child if it's internal. There is exactly
/// one implementation of this; nothing else computes a node's max key.
pub fn get_node_max_key(table: &mut Table, page_num: u32) -> Result<u32, Error> {
    let next = {
        let arc = table.pager.get(page_num)?;
        let node = pager::lock(&arc, page_num)?;
        match node.node_type()? {
            NodeType::Leaf => return Ok(node.leaf_key(node.leaf_num_cells() - 1)),
            NodeType::Internal => node.internal_right_child(),
        }
    };
    get_node_max_key(table, next)
}

fn key_of(cell: &[u8]) -> u32 {
    u32::from_le_bytes(cell[..4].try_into().unwrap())
}

/// Structural dump of the whole tree, for the `.btree` meta-command: one
/// line per node (`leaf (size N)` / `internal (size N)`) with children
/// indented beneath their parent, cell keys listed under leaves and
/// separator keys listed after each internal child.
pub fn dump_structure(table: &mut Table) -> Result<String, Error> {
    let mut out = String::new();
    dump_node(table, table.root_page_num, 0, &mut out)?;
    Ok(out)
}

fn dump_node(table: &mut Table, page_num: u32, indent: usize, out: &mut String) -> Result<(), Error> {
    let pad = "  ".repeat(indent);
    let child_pad = "  ".repeat(indent + 1);
    let node_type = {
        let arc = table.pager.get(page_num)?;
        pager::lock(&arc, page_num)?.node_type()?
    };
    match node_type {
        NodeType::Leaf => {
            let num_cells = {
                let arc = table.pager.get(page_num)?;
                pager::lock(&arc, page_num)?.leaf_num_cells()
            };
            out.push_str(&format!("{pad}- leaf (size {num_cells})\n"));
            for i in 0..num_cells {
                let key = {
                    let arc = table.pager.get(page_num)?;
                    pager::lock(&arc, page_num)?.leaf_key(i)
                };
                out.push_str(&format!("{child_pad}- {key}\n"));
            }
        }
        NodeType::Internal => {
            let num_keys = {
                let arc = table.pager.get(page_num)?;
                pager::lock(&arc, page_num)?.internal_num_keys()
            };
            out.push_str(&format!("{pad}- internal (size {num_keys})\n"));
            for i in 0..num_keys {
                let child = {
                    let arc = table.pager.get(page_num)?;
                    pager::lock(&arc, page_num)?.internal_child(i)?
                };
                dump_node(table, child, indent + 1, out)?;
                let key = {
                    let arc = table.pager.get(page_num)?;
                    pager::lock(&arc, page_num)?.internal_key(i)
                };
                out.push_str(&format!("{child_pad}- key {key}\n"));
            }
            let right_child = {
                let arc = table.pager.get(page_num)?;
                pager::lock(&arc, page_num)?.internal_right_child()
            };
            dump_node(table, right_child, indent + 1, out)?;
        }
    }
    Ok(())
}

/// Splits a full leaf, distributing its `leaf_max_cells` existing cells plus
/// the one being inserted between the old page and a freshly allocated
/// sibling, then promotes the split into the parent (or creates a new root
/// if the leaf had none).
fn leaf_split_and_insert(
    table: &mut Table,
    old_page_num: u32,
    cell_num: u32,
    id: u32,
    row_bytes: &[u8],
) -> Result<(), Error> {
    let new_page_num = table.pager.allocate_new();
    let leaf_max_cells = table.schema.leaf_max_cells;
    let left_split_count = table.schema.left_split_count;
    let right_split_count = (leaf_max_cells + 1) - left_split_count;

    let (old_parent, old_next_leaf, old_cells, old_max_before_split) = {
        let arc = table.pager.get(old_page_num)?;
        let old = pager::lock(&arc, old_page_num)?;
        let mut cells = Vec::with_capacity(leaf_max_cells as usize);
        for i in 0..leaf_max_cells {
            cells.push(old.leaf_cell(i).to_vec());
        }
        let old_max = key_of(&cells[leaf_max_cells as usize - 1]);
        (old.parent(), old.leaf_next_leaf(), cells, old_max)
    };

    {
        let arc = table.pager.get(new_page_num)?;
        let mut new_node = pager::lock(&arc, new_page_num)?;
        new_node.init_leaf();
        new_node.set_parent(old_parent);
        new_node.set_leaf_next_leaf(old_next_leaf);
    }
    {
        let arc = table.pager.get(old_page_num)?;
        let mut old = pager::lock(&arc, old_page_num)?;
        old.set_leaf_next_leaf(new_page_num);
    }

    for i in (0..=leaf_max_cells).rev() {
        let dest_page = if i >= left_split_count {
            new_page_num
        } else {
            old_page_num
        };
        let dest_cell = i % left_split_count;

        let arc = table.pager.get(dest_page)?;
        let mut dest = pager::lock(&arc, dest_page)?;

        if i == cell_num {
            dest.set_leaf_key(dest_cell, id);
            dest.leaf_value_mut(dest_cell).copy_from_slice(row_bytes);
        } else if i > cell_num {
            dest.write_leaf_cell(dest_cell, &old_cells[(i - 1) as usize]);
        } else {
            dest.write_leaf_cell(dest_cell, &old_cells[i as usize]);
        }
    }

    {
        let arc = table.pager.get(old_page_num)?;
        pager::lock(&arc, old_page_num)?.set_leaf_num_cells(left_split_count);
    }
    {
        let arc = table.pager.get(new_page_num)?;
        pager::lock(&arc, new_page_num)?.set_leaf_num_cells(right_split_count);
    }

    let was_root = {
        let arc = table.pager.get(old_page_num)?;
        pager::lock(&arc, old_page_num)?.is_root()
    };

    if was_root {
        create_new_root(table, new_page_num)?;
        return Ok(());
    }

    let new_max = get_node_max_key(table, old_page_num)?;
    update_internal_node_key(table, old_parent, old_max_before_split, new_max)?;
    internal_node_insert(table, old_parent, new_page_num)
}

/// The root is split by copying its current bytes into a new left child
/// and reinitializing the root page in place as a 2-child internal node.
/// If the copied-over left child is itself internal, every one of its
/// children's `parent_page_num` fields must be rewritten, since the page
/// holding that data is now `left_child_page_num`, not the root.
fn create_new_root(table: &mut Table, right_child_page_num: u32) -> Result<(), Error> {
    let root_page_num = table.root_page_num;
    let left_child_page_num = table.pager.allocate_new();

    let root_is_internal = {
        let arc = table.pager.get(root_page_num)?;
        pager::lock(&arc, root_page_num)?.node_type()? == NodeType::Internal
    };

    if root_is_internal {
        for page_num in [right_child_page_num, left_child_page_num] {
            let arc = table.pager.get(page_num)?;
            pager::lock(&arc, page_num)?.init_internal();
        }
    }

    let root_bytes = {
        let arc = table.pager.get(root_page_num)?;
        pager::lock(&arc, root_page_num)?.data
    };
    {
        let arc = table.pager.get(left_child_page_num)?;
        let mut left = pager::lock(&arc, left_child_page_num)?;
        left.data = root_bytes;
        left.set_is_root(false);
    }

    let left_is_internal = {
        let arc = table.pager.get(left_child_page_num)?;
        pager::lock(&arc, left_child_page_num)?.node_type()? == NodeType::Internal
    };
    if left_is_internal {
        let children = {
            let arc = table.pager.get(left_child_page_num)?;
            let left = pager::lock(&arc, left_child_page_num)?;
            let num_keys = left.internal_num_keys();
            let mut children = Vec::with_capacity(num_keys as usize + 1);
            for i in 0..=num_keys {
                children.push(left.internal_child(i)?);
            }
            children
        };
        for child_page in children {
            let arc = table.pager.get(child_page)?;
            pager::lock(&arc, child_page)?.set_parent(left_child_page_num);
        }
    }

    let left_max_key = get_node_max_key(table, left_child_page_num)?;

    {
        let arc = table.pager.get(root_page_num)?;
        let mut root = pager::lock(&arc, root_page_num)?;
        root.init_internal();
        root.set_is_root(true);
        root.set_internal_num_keys(1);
        root.write_internal_cell(0, left_child_page_num, left_max_key);
        root.set_internal_right_child(right_child_page_num);
    }
    {
        let arc = table.pager.get(left_child_page_num)?;
        pager::lock(&arc, left_child_page_num)?.set_parent(root_page_num);
    }
    {
        let arc = table.pager.get(right_child_page_num)?;
        pager::lock(&arc, right_child_page_num)?.set_parent(root_page_num);
    }
    Ok(())
}

/// Finds the separator entry in `parent` that used to read `old_key` and
/// rewrites it to `new_key`. If `old_key` belonged to the right child
/// (which has no separator entry of its own), there is nothing to rewrite.
fn update_internal_node_key(
    table: &mut Table,
    parent_page_num: u32,
    old_key: u32,
    new_key: u32,
) -> Result<(), Error> {
    let arc = table.pager.get(parent_page_num)?;
    let mut parent = pager::lock(&arc, parent_page_num)?;
    let index = parent.internal_find_child(old_key);
    if index < parent.internal_num_keys() {
        parent.set_internal_key(index, new_key);
    }
    Ok(())
}

/// Adds a `(child, key)` pair to `parent_page_num` for `child_page_num`,
/// splitting the parent first if it's already at `INTERNAL_NODE_MAX_CELLS`.
fn internal_node_insert(
    table: &mut Table,
    parent_page_num: u32,
    child_page_num: u32,
) -> Result<(), Error> {
    let child_max_key = get_node_max_key(table, child_page_num)?;

    let (index, original_num_keys, right_child_page_num) = {
        let arc = table.pager.get(parent_page_num)?;
        let parent = pager::lock(&arc, parent_page_num)?;
        (
            parent.internal_find_child(child_max_key),
            parent.internal_num_keys(),
            parent.internal_right_child(),
        )
    };

    if original_num_keys >= INTERNAL_NODE_MAX_CELLS as u32 {
        return internal_node_split_and_insert(table, parent_page_num, child_page_num);
    }

    if right_child_page_num == INVALID_PAGE_NUM {
        let arc = table.pager.get(parent_page_num)?;
        let mut parent = pager::lock(&arc, parent_page_num)?;
        parent.set_internal_num_keys(original_num_keys + 1);
        parent.set_internal_right_child(child_page_num);
        return Ok(());
    }

    let right_child_max = get_node_max_key(table, right_child_page_num)?;

    let arc = table.pager.get(parent_page_num)?;
    let mut parent = pager::lock(&arc, parent_page_num)?;
    parent.set_internal_num_keys(original_num_keys + 1);

    if child_max_key > right_child_max {
        parent.write_internal_cell(original_num_keys, right_child_page_num, right_child_max);
        parent.set_internal_right_child(child_page_num);
    } else {
        parent.shift_internal_cells_right(index, original_num_keys);
        parent.write_internal_cell(index, child_page_num, child_max_key);
    }
    Ok(())
}

/// Splits a full internal node: the top half of its children (plus its
/// former right child) move to a new sibling, then `child_page_num` is
/// inserted on whichever side now covers its key range. If the node being
/// split is the root, `create_new_root` is run first and the root's page
/// identity is rebound to the freshly allocated left child before the rest
/// of the split logic runs against it.
fn internal_node_split_and_insert(
    table: &mut Table,
    parent_page_num: u32,
    child_page_num: u32,
) -> Result<(), Error> {
    let mut old_page_num = parent_page_num;
    let old_max = get_node_max_key(table, old_page_num)?;
    let child_max = get_node_max_key(table, child_page_num)?;
    let new_page_num = table.pager.allocate_new();

    let splitting_root = {
        let arc = table.pager.get(old_page_num)?;
        pager::lock(&arc, old_page_num)?.is_root()
    };

    let grandparent = if splitting_root {
        create_new_root(table, new_page_num)?;
        let root_page_num = table.root_page_num;
        old_page_num = {
            let arc = table.pager.get(root_page_num)?;
            pager::lock(&arc, root_page_num)?.internal_child(0)?
        };
        root_page_num
    } else {
        let arc = table.pager.get(old_page_num)?;
        let grandparent = pager::lock(&arc, old_page_num)?.parent();
        let new_arc = table.pager.get(new_page_num)?;
        pager::lock(&new_arc, new_page_num)?.init_internal();
        grandparent
    };

    let old_right_child = {
        let arc = table.pager.get(old_page_num)?;
        pager::lock(&arc, old_page_num)?.internal_right_child()
    };
    internal_node_insert(table, new_page_num, old_right_child)?;
    {
        let arc = table.pager.get(old_right_child)?;
        pager::lock(&arc, old_right_child)?.set_parent(new_page_num);
    }
    {
        let arc = table.pager.get(old_page_num)?;
        pager::lock(&arc, old_page_num)?.set_internal_right_child(INVALID_PAGE_NUM);
    }

    let mut num_keys = {
        let arc = table.pager.get(old_page_num)?;
        pager::lock(&arc, old_page_num)?.internal_num_keys()
    };

    let mut i = INTERNAL_NODE_MAX_CELLS;
    while i > INTERNAL_NODE_MAX_CELLS / 2 + 1 {
        i -= 1;
        let cur_page_num = {
            let arc = table.pager.get(old_page_num)?;
            pager::lock(&arc, old_page_num)?.internal_child(i as u32)?
        };
        internal_node_insert(table, new_page_num, cur_page_num)?;
        {
            let arc = table.pager.get(cur_page_num)?;
            pager::lock(&arc, cur_page_num)?.set_parent(new_page_num);
        }
        num_keys -= 1;
        let arc = table.pager.get(old_page_num)?;
        pager::lock(&arc, old_page_num)?.set_internal_num_keys(num_keys);
    }

    {
        let arc = table.pager.get(old_page_num)?;
        let mut old = pager::lock(&arc, old_page_num)?;
        let new_right_child = old.internal_child(num_keys - 1)?;
        old.set_internal_right_child(new_right_child);
    }
    num_keys -= 1;
    {
        let arc = table.pager.get(old_page_num)?;
        pager::lock(&arc, old_page_num)?.set_internal_num_keys(num_keys);
    }

    let max_after_split = get_node_max_key(table, old_page_num)?;
    let destination_page_num = if child_max < max_after_split {
        old_page_num
    } else {
        new_page_num
    };

    internal_node_insert(table, destination_page_num, child_page_num)?;
    {
        let arc = table.pager.get(child_page_num)?;
        pager::lock(&arc, child_page_num)?.set_parent(destination_page_num);
    }

    let new_old_max = get_node_max_key(table, old_page_num)?;
    update_internal_node_key(table, grandparent, old_max, new_old_max)?;

    if !splitting_root {
        internal_node_insert(table, grandparent, new_page_num)?;
        let arc = table.pager.get(new_page_num)?;
        pager::lock(&arc, new_page_num)?.set_parent(grandparent);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::row::Value;
    use crate::storage::schema::{Column, ColumnType, Schema};
    use crate::storage::table::Table;
    use tempfile::NamedTempFile;

    fn schema() -> Schema {
        Schema::new(
            "t".into(),
            vec![Column {
                name: "id".into(),
                col_type: ColumnType::Int,
            }],
        )
        .unwrap()
    }

    fn row(id: i32) -> Row {
        Row {
            values: vec![Value::Int(id)],
        }
    }

    #[test]
    fn duplicate_primary_key_is_rejected() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::create(tmp.path(), schema()).unwrap();
        insert(&mut table, &row(1)).unwrap();
        match insert(&mut table, &row(1)) {
            Err(Error::DuplicateKey(1)) => {}
            other => panic!("expected DuplicateKey(1), got {other:?}"),
        }
    }

    #[test]
    fn inserting_past_one_leaf_capacity_splits_and_promotes_a_root() {
        let tmp = NamedTempFile::new().unwrap();
        let schema = schema();
        let leaf_max_cells = schema.leaf_max_cells;
        let mut table = Table::create(tmp.path(), schema).unwrap();

        for id in 0..=leaf_max_cells as i32 {
            insert(&mut table, &row(id)).unwrap();
        }

        let root_arc = table.pager.get(0).unwrap();
        let root = pager::lock(&root_arc, 0).unwrap();
        assert_eq!(root.node_type().unwrap(), NodeType::Internal);
        assert!(root.is_root());
    }

    #[test]
    fn many_inserts_keep_keys_recoverable_in_order() {
        let tmp = NamedTempFile::new().unwrap();
        let schema = schema();
        let mut table = Table::create(tmp.path(), schema).unwrap();

        let n = 200;
        for id in (0..n).rev() {
            insert(&mut table, &row(id)).unwrap();
        }

        let mut cursor = Cursor::start(&mut table).unwrap();
        let mut seen = Vec::new();
        while !cursor.end_of_table {
            let bytes = cursor.read_value().unwrap();
            let schema = cursor.table.schema.clone();
            seen.push(row::deserialize(&schema, &bytes).unwrap().id().unwrap());
            cursor.advance().unwrap();
        }
        let expected: Vec<u32> = (0..n as u32).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn delete_then_find_reports_the_row_is_gone() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::create(tmp.path(), schema()).unwrap();
        for id in 0..5 {
            insert(&mut table, &row(id)).unwrap();
        }
        delete(&mut table, 2).unwrap();

        let mut cursor = Cursor::start(&mut table).unwrap();
        let mut seen = Vec::new();
        while !cursor.end_of_table {
            let bytes = cursor.read_value().unwrap();
            let schema = cursor.table.schema.clone();
            seen.push(row::deserialize(&schema, &bytes).unwrap().id().unwrap());
            cursor.advance().unwrap();
        }
        assert_eq!(seen, vec![0, 1, 3, 4]);
    }
}
