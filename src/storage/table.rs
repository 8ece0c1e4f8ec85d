//! A single table: its schema, its backing pager, and the row-level
//! operations built on top of the B+tree and cursor modules. The root page
//! is always page 0 — there is no free-list, so the catalog never needs to
//! track a separate root pointer per table.
use crate::errors::Error;
use crate::storage::btree;
use crate::storage::cursor::Cursor;
use crate::storage::pager::{self, Pager};

use crate::storage::row::{self, Row};
use crate::storage::schema::Schema;
use std::path::Path;
use tracing::info;

pub struct Table {
    pub name: String,
    pub schema: Schema,
    pub pager: Pager,
    pub root_page_num: u32,
}

impl Table {
    /// Opens `path`, initializing page 0 as an empty leaf root if the file
    /// is new.
    pub fn create(path: &Path, schema: Schema) -> Result<Self, Error> {
        let mut pager = Pager::open(path, schema.leaf_cell_size as usize)?;
        if pager.num_pages() == 0 {
            let root_arc = pager.get(0)?;
            let mut root = pager::lock(&root_arc, 0)?;
            root.init_leaf();
            root.set_is_root(true);
        }
        Ok(Table {
            name: schema.name.clone(),
            schema,
            pager,
            root_page_num: 0,
        })
    }

    /// Opens an existing table file; errors if it has no pages, since a
    /// loadable table must already have an initialized root.
    pub fn load(path: &Path, schema: Schema) -> Result<Self, Error> {
        let pager = Pager::open(path, schema.leaf_cell_size as usize)?;
        if pager.num_pages() == 0 {
            return Err(err!(
                Db,
                "table file for '{}' has no root page",
                schema.name
            ));
        }
        Ok(Table {
            name: schema.name.clone(),
            schema,
            pager,
            root_page_num: 0,
        })
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.pager.close()?;
        info!(table = %self.name, "flushed table");
        Ok(())
    }
}

pub fn insert_row(table: &mut Table, row: &Row) -> Result<(), Error> {
    btree::insert(table, row)
}

pub fn select_rows(table: &mut Table) -> Result<Vec<Row>, Error> {
    let mut rows = Vec::new();
    let mut cursor = Cursor::start(table)?;
    while !cursor.end_of_table {
        let bytes = cursor.read_value()?;
        let schema = cursor.table.schema.clone();
        rows.push(row::deserialize(&schema, &bytes)?);
        cursor.advance()?;
    }
    Ok(rows)
}

/// Point lookup by primary key via `table_find`, per spec §4.G ("SELECT
/// with WHERE id = k uses the index"). Returns `None` if the cursor lands
/// on an insertion point rather than a matching cell.
pub fn find_row(table: &mut Table, id: u32) -> Result<Option<Row>, Error> {
    let mut cursor = Cursor::find(table, id)?;
    let schema = cursor.table.schema.clone();
    let arc = cursor.table.pager.get(cursor.page_num)?;
    let num_cells = pager::lock(&arc, cursor.page_num)?.leaf_num_cells();
    if cursor.cell_num >= num_cells {
        return Ok(None);
    }
    let key = pager::lock(&arc, cursor.page_num)?.leaf_key(cursor.cell_num);
    if key != id {
        return Ok(None);
    }
    let bytes = cursor.read_value()?;
    Ok(Some(row::deserialize(&schema, &bytes)?))
}

/// Applies `columns`/`values` to every row in the table, leaving the
/// primary key untouched. Matches the documented limitation that `UPDATE`
/// has no `WHERE` support: it always applies to the whole table.
pub fn update_rows(table: &mut Table, columns: &[String], values: &[String]) -> Result<u32, Error> {
    let schema = table.schema.clone();
    let mut rows = select_rows(table)?;

    for row in rows.iter_mut() {
        for (col_name, literal) in columns.iter().zip(values.iter()) {
            if col_name == schema.primary_key_name() {
                continue;
            }
            if let Some(idx) = schema.column_index(col_name) {
                row.values[idx] = row::Value::parse(schema.columns[idx].col_type, literal)?;
            }
        }
    }

    let mut affected = 0u32;
    for row in &rows {
        btree::replace(table, row.id()?, row)?;
        affected += 1;
    }
    Ok(affected)
}

pub fn delete_row(table: &mut Table, id: u32) -> Result<(), Error> {
    btree::delete(table, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::row::Value;
    use crate::storage::schema::{Column, ColumnType};
    use tempfile::NamedTempFile;

    fn schema() -> Schema {
        Schema::new(
            "users".into(),
            vec![
                Column {
                    name: "id".into(),
                    col_type: ColumnType::Int,
                },
                Column {
                    name: "name".into(),
                    col_type: ColumnType::Text,
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn insert_then_select_round_trips_rows() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::create(tmp.path(), schema()).unwrap();
        for id in 0..5 {
            insert_row(
                &mut table,
                &Row {
                    values: vec![Value::Int(id), Value::Text(format!("user{id}"))],
                },
            )
            .unwrap();
        }
        let rows = select_rows(&mut table).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[3].values[1], Value::Text("user3".into()));
    }

    #[test]
    fn update_rows_changes_every_row_but_not_the_primary_key() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::create(tmp.path(), schema()).unwrap();
        for id in 0..3 {
            insert_row(
                &mut table,
                &Row {
                    values: vec![Value::Int(id), Value::Text("old".into())],
                },
            )
            .unwrap();
        }
        let affected =
            update_rows(&mut table, &["name".to_string()], &["new".to_string()]).unwrap();
        assert_eq!(affected, 3);
        let rows = select_rows(&mut table).unwrap();
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.values[0], Value::Int(i as i32));
            assert_eq!(row.values[1], Value::Text("new".into()));
        }
    }

    #[test]
    fn delete_row_removes_exactly_one_row() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::create(tmp.path(), schema()).unwrap();
        for id in 0..3 {
            insert_row(
                &mut table,
                &Row {
                    values: vec![Value::Int(id), Value::Text("x".into())],
                },
            )
            .unwrap();
        }
        delete_row(&mut table, 1).unwrap();
        let rows = select_rows(&mut table).unwrap();
        let ids: Vec<i32> = rows
            .iter()
            .map(|r| match r.values[0] {
                Value::Int(v) => v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn flush_then_load_recovers_rows() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        {
            let mut table = Table::create(&path, schema()).unwrap();
            insert_row(
                &mut table,
                &Row {
                    values: vec![Value::Int(1), Value::Text("alice".into())],
                },
            )
            .unwrap();
            table.flush().unwrap();
        }
        let mut table = Table::load(&path, schema()).unwrap();
        let rows = select_rows(&mut table).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values[1], Value::Text("alice".into()));
    }
}
