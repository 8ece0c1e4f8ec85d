pub mod btree;
pub mod cursor;
pub mod node;
pub mod pager;
pub mod row;
pub mod schema;
pub mod table;

pub use btree::dump_structure;
pub use row::{build_row, Row, Value};
pub use schema::{Column, ColumnType, Schema};
pub use table::{delete_row, find_row, insert_row, select_rows, update_rows, Table};
