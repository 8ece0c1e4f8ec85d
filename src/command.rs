//! The executor facade: dispatches a parsed `SqlCommand` to the catalog and
//! the B+tree storage layer, returning a `SqlResult` for the caller (the
//! REPL) to render. No presentation lives here — just rows and status, per
//! spec §4.G / §9 ("global output sink" replaced by a returned value).
use crate::errors::Error;
use crate::session::Session;
use crate::sql::{
    CompareOp, Columns, DeleteStatement, DescStatement, InsertStatement, SelectStatement,
    SqlCommand, Statement, UpdateStatement, WhereClause,
};
use crate::storage::row::{Row, Value};
use crate::storage::schema::Schema;
use crate::storage::table::Table;
use crate::storage;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// The outcome of executing one statement: either a plain mutation count
/// or a projected result set, matching `repl::console`'s two-armed match.
pub enum SqlResult {
    Ok { affected_rows: u64 },
    ResultSet {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

pub fn execute(session: &mut Session, command: SqlCommand) -> Result<SqlResult, Error> {
    trace!(sql = %command.sql, "executing statement");
    match command.statement {
        Statement::CreateTable(s) => execute_create_table(session, s),
        Statement::DropTable(name) => {
            session.database.drop_table(&name)?;
            Ok(SqlResult::Ok { affected_rows: 0 })
        }
        Statement::ShowTables => execute_show_tables(session),
        Statement::Desc(s) => execute_desc(session, s),
        Statement::Insert(s) => execute_insert(session, s),
        Statement::Select(s) => execute_select(session, s),
        Statement::Update(s) => execute_update(session, s),
        Statement::Delete(s) => execute_delete(session, s),
    }
}

fn lock_table(table: &Arc<Mutex<Table>>, name: &str) -> Result<std::sync::MutexGuard<'_, Table>, Error> {
    table
        .lock()
        .map_err(|e| err!(LockTable, "failed to lock table '{}': {}", name, e))
}

fn execute_create_table(
    session: &mut Session,
    s: crate::sql::CreateTableStatement,
) -> Result<SqlResult, Error> {
    let columns = s
        .columns_schemas
        .into_iter()
        .map(|c| crate::storage::schema::Column {
            name: c.name,
            col_type: c.type_.into(),
        })
        .collect::<Vec<_>>();
    let schema = Schema::new(s.name.clone(), columns)?;
    session.database.create_table(&s.name, schema)?;
    Ok(SqlResult::Ok { affected_rows: 0 })
}

fn execute_show_tables(session: &Session) -> Result<SqlResult, Error> {
    let names = session.database.table_names();
    Ok(SqlResult::ResultSet {
        columns: vec!["Tables".to_string()],
        rows: names.into_iter().map(|n| vec![n]).collect(),
    })
}

fn execute_desc(session: &Session, s: DescStatement) -> Result<SqlResult, Error> {
    let schema = session.database.table_schema(&s.table)?;
    let rows = schema
        .columns
        .iter()
        .map(|c| vec![c.name.clone(), c.col_type.to_string()])
        .collect();
    Ok(SqlResult::ResultSet {
        columns: vec!["Column".to_string(), "Type".to_string()],
        rows,
    })
}

fn execute_insert(session: &mut Session, s: InsertStatement) -> Result<SqlResult, Error> {
    let table_arc = session.database.find_table(&s.table)?.clone();
    let mut table = lock_table(&table_arc, &s.table)?;
    let row = storage::build_row(&table.schema, &s.columns, &s.values)?;
    storage::insert_row(&mut table, &row)?;
    Ok(SqlResult::Ok { affected_rows: 1 })
}

fn execute_select(session: &mut Session, s: SelectStatement) -> Result<SqlResult, Error> {
    let table_arc = session.database.find_table(&s.table)?.clone();
    let mut table = lock_table(&table_arc, &s.table)?;
    let schema = table.schema.clone();

    let column_names: Vec<String> = match &s.columns {
        Columns::All => schema.columns.iter().map(|c| c.name.clone()).collect(),
        Columns::List(names) => {
            for name in names {
                if schema.column_index(name).is_none() {
                    return Err(err!(Db, "unknown column '{}' in table '{}'", name, s.table));
                }
            }
            names.clone()
        }
    };

    let rows: Vec<Row> = match &s.where_clause {
        // "`=` on `id` uses the index" (spec §6): point lookup via table_find
        // instead of a full scan.
        Some(wc) if wc.column == schema.primary_key_name() && wc.op == CompareOp::Eq => {
            let id = parse_id_literal(&wc.value)?;
            match storage::find_row(&mut table, id)? {
                Some(row) => vec![row],
                None => vec![],
            }
        }
        Some(wc) => storage::select_rows(&mut table)?
            .into_iter()
            .filter_map(|row| match where_matches(&schema, &row, wc) {
                Ok(true) => Some(Ok(row)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<Result<Vec<_>, Error>>()?,
        None => storage::select_rows(&mut table)?,
    };

    let projected = rows
        .iter()
        .map(|row| {
            column_names
                .iter()
                .map(|name| {
                    let idx = schema.column_index(name).expect("checked above");
                    row.values[idx].to_string()
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    Ok(SqlResult::ResultSet {
        columns: column_names,
        rows: projected,
    })
}

fn execute_update(session: &mut Session, s: UpdateStatement) -> Result<SqlResult, Error> {
    let table_arc = session.database.find_table(&s.table)?.clone();
    let mut table = lock_table(&table_arc, &s.table)?;
    let columns: Vec<String> = s.sets.iter().map(|(c, _)| c.clone()).collect();
    let values: Vec<String> = s.sets.iter().map(|(_, v)| v.clone()).collect();
    // `UPDATE` applies to every row regardless of `s.where_clause`; see
    // spec §4.D and §9 ("UPDATE ignores any WHERE clause in the source").
    let affected = storage::update_rows(&mut table, &columns, &values)?;
    Ok(SqlResult::Ok {
        affected_rows: affected as u64,
    })
}

fn execute_delete(session: &mut Session, s: DeleteStatement) -> Result<SqlResult, Error> {
    let table_arc = session.database.find_table(&s.table)?.clone();
    let mut table = lock_table(&table_arc, &s.table)?;
    let wc = s
        .where_clause
        .ok_or_else(|| err!(Syntax, "DELETE requires a WHERE <primary key> = <value> clause"))?;
    if wc.column != table.schema.primary_key_name() || wc.op != CompareOp::Eq {
        return Err(err!(
            Syntax,
            "DELETE only supports WHERE {} = <value>",
            table.schema.primary_key_name()
        ));
    }
    let id = parse_id_literal(&wc.value)?;
    storage::delete_row(&mut table, id)?;
    Ok(SqlResult::Ok { affected_rows: 1 })
}

fn parse_id_literal(literal: &str) -> Result<u32, Error> {
    literal
        .parse::<u32>()
        .map_err(|_| err!(Syntax, "invalid id literal: {}", literal))
}

/// Evaluates a single `column op value` predicate against one row.
/// Per spec §9: `=`/`<`/`>` are defined on `INT` (numeric) and `DOUBLE`
/// (numeric); `TEXT` is compared byte-lexicographically, an explicit
/// decision recorded in `DESIGN.md` since the source leaves it unspecified.
fn where_matches(schema: &Schema, row: &Row, wc: &WhereClause) -> Result<bool, Error> {
    let idx = schema
        .column_index(&wc.column)
        .ok_or_else(|| err!(Db, "unknown column '{}' in WHERE clause", wc.column))?;
    let lhs = &row.values[idx];
    let rhs = Value::parse(schema.columns[idx].col_type, &wc.value)?;

    let ordering = match (lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Double(a), Value::Double(b)) => a
            .partial_cmp(b)
            .ok_or_else(|| err!(Db, "cannot compare NaN in WHERE clause"))?,
        (Value::Text(a), Value::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
        _ => return Err(err!(Db, "type mismatch evaluating WHERE clause")),
    };

    Ok(match wc.op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Gt => ordering == Ordering::Greater,
    })
}
