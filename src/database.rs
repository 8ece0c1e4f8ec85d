//! The catalog: the set of open tables backing one database directory,
//! persisted across runs via a sidecar `<db_name>.meta` file (spec §4.F,
//! §6). Each table's own file holds its B+tree; the sidecar holds only the
//! schema list, so the catalog can re-derive and validate every table's
//! size constants on load rather than trust stale bytes.
use crate::errors::Error;
use crate::storage::schema::Schema;
use crate::storage::table::Table;
use bincode::{config, Decode, Encode};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const META_EXT: &str = "meta";
const TABLE_EXT: &str = "tbl";
const DB_NAME: &str = "default";

/// Upper bound on simultaneously open tables (spec §4.F: "bounded list (up
/// to 100) of open tables").
pub const MAX_TABLES: usize = 100;

/// The sidecar's on-disk shape: "a 4-byte table count followed by that
/// many TableSchema records" (spec §6). `bincode`'s length-prefixed `Vec`
/// encoding gives the same structure; the per-schema fields are exactly
/// the ones the spec's `TableSchema` record names.
#[derive(Debug, Encode, Decode)]
struct CatalogMeta {
    schemas: Vec<Schema>,
}

pub struct Database {
    pub name: String,
    path: PathBuf,
    tables: HashMap<String, Arc<Mutex<Table>>>,
}

impl Database {
    /// Opens the single on-disk catalog at `data/default`, creating it if
    /// this is the first run (spec §4.F: "database = set of tables keyed
    /// by name", not a namespace of databases).
    pub fn open() -> Result<Self, Error> {
        let path = PathBuf::from(format!("data/{}", DB_NAME));
        std::fs::create_dir_all(&path)?;
        Self::load(DB_NAME.to_string(), path)
    }

    fn meta_path(name: &str, path: &PathBuf) -> PathBuf {
        path.join(format!("{}.{}", name, META_EXT))
    }

    fn table_path(path: &PathBuf, table_name: &str) -> PathBuf {
        path.join(format!("{}.{}", table_name, TABLE_EXT))
    }

    /// Reads the sidecar (if any) and opens every table it names. A
    /// fresh/empty database simply has no sidecar yet.
    fn load(name: String, path: PathBuf) -> Result<Self, Error> {
        let meta_path = Self::meta_path(&name, &path);
        let mut tables = HashMap::new();

        if meta_path.exists() {
            let bytes = std::fs::read(&meta_path)?;
            let (meta, _): (CatalogMeta, usize) =
                bincode::decode_from_slice(&bytes, config::standard())?;
            for schema in meta.schemas {
                schema.validate()?;
                let table_path = Self::table_path(&path, &schema.name);
                let table_name = schema.name.clone();
                let table = Table::load(&table_path, schema)?;
                tables.insert(table_name, Arc::new(Mutex::new(table)));
            }
        }

        Ok(Self { name, path, tables })
    }

    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<(), Error> {
        if self.tables.contains_key(name) {
            return Err(err!(Db, "Table '{}.{}' already exists", self.name, name));
        }
        if self.tables.len() >= MAX_TABLES {
            return Err(err!(Db, "table full: catalog already holds {} tables", MAX_TABLES));
        }
        let table_path = Self::table_path(&self.path, name);
        let table = Table::create(&table_path, schema)?;
        self.tables
            .insert(name.to_string(), Arc::new(Mutex::new(table)));
        Ok(())
    }

    /// Forgets the table. Per spec §4.F, deleting the backing file is not
    /// required by the core.
    pub fn drop_table(&mut self, name: &str) -> Result<(), Error> {
        self.tables
            .remove(name)
            .ok_or_else(|| err!(Db, "Table '{}.{}' doesn't exist", self.name, name))?;
        Ok(())
    }

    pub fn find_table(&self, name: &str) -> Result<&Arc<Mutex<Table>>, Error> {
        self.tables
            .get(name)
            .ok_or_else(|| err!(Db, "Table '{}.{}' doesn't exist", self.name, name))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn table_schema(&self, name: &str) -> Result<Schema, Error> {
        let table = self.find_table(name)?;
        let table = table.lock().map_err(|e| {
            err!(LockTable, "Failed to lock table '{}.{}': {}", self.name, name, e)
        })?;
        Ok(table.schema.clone())
    }

    /// Flushes every table (writing its dirty pages and closing its file
    /// handle) and rewrites the catalog sidecar. This is the core's only
    /// persistence point: data written before a clean `flush` is not
    /// guaranteed to survive an abnormal exit.
    pub fn flush(&mut self) -> Result<(), Error> {
        info!(name = %self.name, "Flushing database...");

        for (name, table) in &self.tables {
            info!(table = %name, "Flushing table...");
            let mut table = table.lock().map_err(|e| {
                err!(
                    LockTable,
                    "Failed to lock table '{}.{}': {}",
                    self.name,
                    name,
                    e
                )
            })?;

            if let Err(e) = table.flush() {
                warn!(table = %name, "Failed to flush table: {}", e);
            } else {
                info!(table = %name, "Flushed table");
            }
        }

        self.persist_meta()?;
        info!(name = %self.name, "Flushed database");
        Ok(())
    }

    fn persist_meta(&self) -> Result<(), Error> {
        let mut schemas = Vec::with_capacity(self.tables.len());
        for table in self.tables.values() {
            let table = table.lock().map_err(|e| {
                err!(LockTable, "Failed to lock table while persisting catalog: {}", e)
            })?;
            schemas.push(table.schema.clone());
        }
        let meta = CatalogMeta { schemas };
        let bytes = bincode::encode_to_vec(&meta, config::standard())?;
        std::fs::write(Self::meta_path(&self.name, &self.path), bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{Column, ColumnType};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// `Database` keys its files off the process cwd, which is global
    /// state; serialize the tests in this module so they don't stomp on
    /// each other's `set_current_dir` calls.
    static CWD_LOCK: StdMutex<()> = StdMutex::new(());

    fn users_schema() -> Schema {
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

    /// `Database::open` keys off `data/default` relative to the process
    /// cwd; chdir into a scratch directory for the duration of each test so
    /// tests don't collide or touch the real working tree, holding
    /// `CWD_LOCK` for the duration since the cwd is process-global.
    fn in_scratch_dir<F: FnOnce()>(f: F) {
        let _guard = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let tmp = TempDir::new().unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(tmp.path()).unwrap();
        f();
        std::env::set_current_dir(original).unwrap();
    }

    #[test]
    fn create_table_then_flush_then_reload_recovers_schema() {
        in_scratch_dir(|| {
            {
                let mut db = Database::open().unwrap();
                db.create_table("users", users_schema()).unwrap();
                db.flush().unwrap();
            }
            let db = Database::open().unwrap();
            assert_eq!(db.table_names(), vec!["users".to_string()]);
            let schema = db.table_schema("users").unwrap();
            assert_eq!(schema.columns.len(), 2);
        });
    }

    #[test]
    fn drop_table_removes_it_from_the_catalog() {
        in_scratch_dir(|| {
            let mut db = Database::open().unwrap();
            db.create_table("users", users_schema()).unwrap();
            db.drop_table("users").unwrap();
            assert!(db.find_table("users").is_err());
        });
    }

    #[test]
    fn create_table_twice_is_an_error() {
        in_scratch_dir(|| {
            let mut db = Database::open().unwrap();
            db.create_table("users", users_schema()).unwrap();
            assert!(db.create_table("users", users_schema()).is_err());
        });
    }

    #[test]
    fn create_table_beyond_the_cap_is_an_error() {
        in_scratch_dir(|| {
            let mut db = Database::open().unwrap();
            for i in 0..MAX_TABLES {
                let schema = Schema::new(
                    format!("t{}", i),
                    vec![Column {
                        name: "id".into(),
                        col_type: ColumnType::Int,
                    }],
                )
                .unwrap();
                db.create_table(&format!("t{}", i), schema).unwrap();
            }
            let one_more = Schema::new(
                "overflow".into(),
                vec![Column {
                    name: "id".into(),
                    col_type: ColumnType::Int,
                }],
            )
            .unwrap();
            assert!(db.create_table("overflow", one_more).is_err());
        });
    }
}
