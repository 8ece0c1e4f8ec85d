//! Per-table schema and the size constants derived from it.
//!
//! Every constant here is a pure function of the column list and must be
//! recomputed identically whenever a schema is loaded from the catalog
//! sidecar (see `crate::database`) rather than trusted from disk.
use crate::storage::node::{
    COMMON_NODE_HEADER_SIZE, LEAF_NODE_HEADER_SIZE, LEAF_NODE_KEY_SIZE, LEAF_NODE_SPACE_FOR_CELLS,
};
use crate::errors::Error;
use bincode::{Decode, Encode};
use std::fmt;

/// Columns beyond this make a `CREATE TABLE` a schema error.
pub const MAX_COLS: usize = 10;
/// `TEXT` values are stored in a fixed inline slot: up to 254 content
/// bytes plus a NUL terminator, or 255 bytes with no terminator at the limit.
pub const TEXT_SIZE: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum ColumnType {
    Int,
    Double,
    Text,
}

impl ColumnType {
    /// On-disk width of one value of this type.
    pub fn fixed_size(&self) -> usize {
        match self {
            ColumnType::Int => 4,
            ColumnType::Double => 8,
            ColumnType::Text => TEXT_SIZE,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "INT"),
            ColumnType::Double => write!(f, "DOUBLE"),
            ColumnType::Text => write!(f, "TEXT"),
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Column {
    pub name: String,
    pub col_type: ColumnType,
}

/// A named, ordered column list plus the size geometry it implies for the
/// B+tree that indexes it. `columns[0]` is always the primary key and is
/// always `Int`.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Schema {
    pub name: String,
    pub columns: Vec<Column>,
    pub row_size: u32,
    pub leaf_cell_size: u32,
    pub leaf_max_cells: u32,
    pub left_split_count: u32,
}

impl Schema {
    /// Builds a schema from a table name and column list, validating the
    /// primary-key constraint and computing the derived size constants.
    pub fn new(name: String, columns: Vec<Column>) -> Result<Self, Error> {
        if columns.is_empty() {
            return Err(err!(Schema, "table '{}' must have at least one column", name));
        }
        if columns.len() > MAX_COLS {
            return Err(err!(
                Schema,
                "table '{}' has {} columns, max is {}",
                name,
                columns.len(),
                MAX_COLS
            ));
        }
        if columns[0].col_type != ColumnType::Int {
            return Err(err!(
                Schema,
                "table '{}': primary key column '{}' must be INT",
                name,
                columns[0].name
            ));
        }

        let row_size: usize = columns.iter().map(|c| c.col_type.fixed_size()).sum();
        let leaf_cell_size = 4 + row_size;
        let leaf_max_cells = LEAF_NODE_SPACE_FOR_CELLS / leaf_cell_size;
        if leaf_max_cells == 0 {
            return Err(err!(
                Schema,
                "table '{}': row too wide to fit any cell in a page",
                name
            ));
        }
        let left_split_count = (leaf_max_cells + 1).div_ceil(2);

        Ok(Schema {
            name,
            columns,
            row_size: row_size as u32,
            leaf_cell_size: leaf_cell_size as u32,
            leaf_max_cells: leaf_max_cells as u32,
            left_split_count: left_split_count as u32,
        })
    }

    /// Recomputes the derived constants from `columns` and checks them
    /// against the stored values; used when loading a schema from the
    /// catalog sidecar, where the derived fields must not be trusted blindly.
    pub fn validate(&self) -> Result<(), Error> {
        let recomputed = Schema::new(self.name.clone(), self.columns.clone())?;
        if recomputed.row_size != self.row_size
            || recomputed.leaf_cell_size != self.leaf_cell_size
            || recomputed.leaf_max_cells != self.leaf_max_cells
            || recomputed.left_split_count != self.left_split_count
        {
            return Err(err!(
                Schema,
                "table '{}': stored schema constants do not match recomputed ones",
                self.name
            ));
        }
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn primary_key_name(&self) -> &str {
        &self.columns[0].name
    }

    /// Dumps the derived size constants for the `.constants` meta-command,
    /// in the same shape the original `print_constants` reports them.
    pub fn dump_constants(&self) -> String {
        format!(
            "ROW_SIZE: {}\n\
             COMMON_NODE_HEADER_SIZE: {}\n\
             LEAF_NODE_HEADER_SIZE: {}\n\
             LEAF_NODE_CELL_SIZE: {}\n\
             LEAF_NODE_SPACE_FOR_CELLS: {}\n\
             LEAF_NODE_MAX_CELLS: {}\n\
             LEFT_SPLIT_COUNT: {}\n",
            self.row_size,
            COMMON_NODE_HEADER_SIZE,
            LEAF_NODE_HEADER_SIZE,
            LEAF_NODE_KEY_SIZE as u32 + self.row_size,
            LEAF_NODE_SPACE_FOR_CELLS,
            self.leaf_max_cells,
            self.left_split_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, t: ColumnType) -> Column {
        Column {
            name: name.to_string(),
            col_type: t,
        }
    }

    #[test]
    fn derives_constants_matching_spec_formula() {
        let schema = Schema::new(
            "t".into(),
            vec![col("id", ColumnType::Int), col("name", ColumnType::Text)],
        )
        .unwrap();
        assert_eq!(schema.row_size, 4 + 255);
        assert_eq!(schema.leaf_cell_size, 4 + schema.row_size);
        let space = LEAF_NODE_SPACE_FOR_CELLS as u32;
        assert_eq!(schema.leaf_max_cells, space / schema.leaf_cell_size);
        let expected_left = (schema.leaf_max_cells + 1).div_ceil(2);
        assert_eq!(schema.left_split_count, expected_left);
    }

    #[test]
    fn rejects_non_int_primary_key() {
        let err = Schema::new("t".into(), vec![col("id", ColumnType::Text)]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_too_many_columns() {
        let columns: Vec<Column> = (0..=MAX_COLS)
            .map(|i| {
                if i == 0 {
                    col("id", ColumnType::Int)
                } else {
                    col(&format!("c{i}"), ColumnType::Int)
                }
            })
            .collect();
        assert!(Schema::new("t".into(), columns).is_err());
    }

    #[test]
    fn dump_constants_reports_row_size_and_leaf_geometry() {
        let schema = Schema::new("t".into(), vec![col("id", ColumnType::Int)]).unwrap();
        let dump = schema.dump_constants();
        assert!(dump.contains(&format!("ROW_SIZE: {}", schema.row_size)));
        assert!(dump.contains(&format!("LEAF_NODE_MAX_CELLS: {}", schema.leaf_max_cells)));
    }

    #[test]
    fn validate_accepts_freshly_recomputed_schema() {
        let schema = Schema::new("t".into(), vec![col("id", ColumnType::Int)]).unwrap();
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn validate_rejects_tampered_constants() {
        let mut schema = Schema::new("t".into(), vec![col("id", ColumnType::Int)]).unwrap();
        schema.row_size += 1;
        assert!(schema.validate().is_err());
    }
}
