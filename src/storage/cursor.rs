//! Cursor-based navigation over a table's B+tree: a `(page_num, cell_num)`
//! position plus the logic to reach it (descending through internal nodes)
//! and move past it (following the leaf chain's `next_leaf_page_num`).
use crate::errors::Error;
use crate::storage::node::NodeType;
use crate::storage::pager;
use crate::storage::table::Table;

pub struct Cursor<'a> {
    pub table: &'a mut Table,
    pub page_num: u32,
    pub cell_num: u32,
    pub end_of_table: bool,
}

impl<'a> Cursor<'a> {
    /// Positions at the first row in key order.
    pub fn start(table: &'a mut Table) -> Result<Self, Error> {
        let root = table.root_page_num;
        let page_num = leftmost_leaf(table, root)?;
        let num_cells = {
            let arc = table.pager.get(page_num)?;
            pager::lock(&arc, page_num)?.leaf_num_cells()
        };
        Ok(Cursor {
            table,
            page_num,
            cell_num: 0,
            end_of_table: num_cells == 0,
        })
    }

    /// Positions one past the last row, ready for an append.
    pub fn end(table: &'a mut Table) -> Result<Self, Error> {
        let root = table.root_page_num;
        let page_num = rightmost_leaf(table, root)?;
        let cell_num = {
            let arc = table.pager.get(page_num)?;
            pager::lock(&arc, page_num)?.leaf_num_cells()
        };
        Ok(Cursor {
            table,
            page_num,
            cell_num,
            end_of_table: true,
        })
    }

    /// Positions at `key`, or at the insertion point if `key` is absent.
    pub fn find(table: &'a mut Table, key: u32) -> Result<Self, Error> {
        let root = table.root_page_num;
        let (page_num, cell_num) = find_leaf_cell(table, root, key)?;
        Ok(Cursor {
            table,
            page_num,
            cell_num,
            end_of_table: false,
        })
    }

    pub fn read_value(&mut self) -> Result<Vec<u8>, Error> {
        let arc = self.table.pager.get(self.page_num)?;
        let node = pager::lock(&arc, self.page_num)?;
        Ok(node.leaf_value(self.cell_num).to_vec())
    }

    pub fn write_value(&mut self, src: &[u8]) -> Result<(), Error> {
        let arc = self.table.pager.get(self.page_num)?;
        let mut node = pager::lock(&arc, self.page_num)?;
        node.leaf_value_mut(self.cell_num).copy_from_slice(src);
        Ok(())
    }

    /// Moves to the next row, crossing into the sibling leaf via
    /// `next_leaf_page_num` when the current leaf is exhausted. The
    /// sentinel value `0` marks the last leaf in the chain.
    pub fn advance(&mut self) -> Result<(), Error> {
        let (num_cells, next_leaf) = {
            let arc = self.table.pager.get(self.page_num)?;
            let node = pager::lock(&arc, self.page_num)?;
            (node.leaf_num_cells(), node.leaf_next_leaf())
        };

        self.cell_num += 1;
        if self.cell_num >= num_cells {
            if next_leaf == 0 {
                self.end_of_table = true;
            } else {
                self.page_num = next_leaf;
                self.cell_num = 0;
            }
        }
        Ok(())
    }
}

fn find_leaf_cell(table: &mut Table, page_num: u32, key: u32) -> Result<(u32, u32), Error> {
    let descend_to = {
        let arc = table.pager.get(page_num)?;
        let node = pager::lock(&arc, page_num)?;
        match node.node_type()? {
            NodeType::Leaf => return Ok((page_num, node.leaf_find_cell(key))),
            NodeType::Internal => node.internal_child(node.internal_find_child(key))?,
        }
    };
    find_leaf_cell(table, descend_to, key)
}

fn leftmost_leaf(table: &mut Table, page_num: u32) -> Result<u32, Error> {
    let child = {
        let arc = table.pager.get(page_num)?;
        let node = pager::lock(&arc, page_num)?;
        match node.node_type()? {
            NodeType::Leaf => return Ok(page_num),
            NodeType::Internal => node.internal_child(0)?,
        }
    };
    leftmost_leaf(table, child)
}

fn rightmost_leaf(table: &mut Table, page_num: u32) -> Result<u32, Error> {
    let child = {
        let arc = table.pager.get(page_num)?;
        let node = pager::lock(&arc, page_num)?;
        match node.node_type()? {
            NodeType::Leaf => return Ok(page_num),
            NodeType::Internal => node.internal_right_child(),
        }
    };
    rightmost_leaf(table, child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::row::{self, Value};
    use crate::storage::schema::{Column, ColumnType, Schema};
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

    #[test]
    fn advance_visits_inserted_rows_in_key_order() {
        let tmp = NamedTempFile::new().unwrap();
        let schema = schema();
        let mut table = Table::create(tmp.path(), schema.clone()).unwrap();
        for id in [2, 0, 1] {
            crate::storage::btree::insert(
                &mut table,
                &row::Row {
                    values: vec![Value::Int(id)],
                },
            )
            .unwrap();
        }

        let mut cursor = Cursor::start(&mut table).unwrap();
        let mut seen = Vec::new();
        while !cursor.end_of_table {
            let bytes = cursor.read_value().unwrap();
            let row = row::deserialize(&schema, &bytes).unwrap();
            seen.push(row.id().unwrap());
            cursor.advance().unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn find_locates_an_inserted_key() {
        let tmp = NamedTempFile::new().unwrap();
        let schema = schema();
        let mut table = Table::create(tmp.path(), schema.clone()).unwrap();
        crate::storage::btree::insert(
            &mut table,
            &row::Row {
                values: vec![Value::Int(5)],
            },
        )
        .unwrap();

        let mut cursor = Cursor::find(&mut table, 5).unwrap();
        let bytes = cursor.read_value().unwrap();
        let row = row::deserialize(&schema, &bytes).unwrap();
        assert_eq!(row.id().unwrap(), 5);
    }
}
