use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};

use crate::{LookupError, QueryStore};

/// SQLite-backed query store. A fresh connection is opened for every query.
///
/// The database must already exist; it is never created implicitly.
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, LookupError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }
}

fn cell_to_f64(cell: ValueRef<'_>) -> f64 {
    match cell {
        ValueRef::Integer(v) => v as f64,
        ValueRef::Real(v) => v,
        ValueRef::Text(t) => std::str::from_utf8(t)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(f64::NAN),
        ValueRef::Null | ValueRef::Blob(_) => f64::NAN,
    }
}

impl QueryStore for SqliteStore {
    // SECURITY: `sql` is executed exactly as received. Callers that splice user
    // input into it can run arbitrary single statements against the database.
    fn query(&self, sql: &str) -> Result<Vec<Vec<f64>>, LookupError> {
        tracing::debug!(sql, db = %self.path.display(), "executing query");
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let width = stmt.column_count();

        let mut out = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(cell_to_f64(row.get_ref(i)?));
            }
            out.push(values);
        }

        tracing::debug!(rows = out.len(), "query done");
        Ok(out)
    }
}

/// Demo customer holdings: (CustomerID, CompanyISIN, Holding).
const DEMO_CUSTOMERS: [(f64, f64, f64); 9] = [
    (100.0, 1.0, 20000.0),
    (200.0, 2.0, 20000.0),
    (300.0, 3.0, 10000.0),
    (400.0, 4.0, 5000.0),
    (500.0, 1.0, 12000.0),
    (600.0, 2.0, 12000.0),
    (700.0, 2.0, 12000.0),
    (800.0, 8.0, 12000.0),
    (900.0, 10.0, 12000.0),
];

/// Create the `CUSTOMER` table and load the demo rows. Returns the number of
/// rows inserted. Fails if the table already exists.
pub fn create_demo_database(path: impl AsRef<Path>) -> Result<usize, LookupError> {
    let mut conn = Connection::open(path.as_ref())?;
    let tx = conn.transaction()?;
    tx.execute(
        "CREATE TABLE CUSTOMER (
            CustomerID   REAL PRIMARY KEY NOT NULL,
            CompanyISIN  REAL NOT NULL,
            Holding      REAL NOT NULL
        )",
        [],
    )?;

    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO CUSTOMER (CustomerID, CompanyISIN, Holding) VALUES (?1, ?2, ?3)",
        )?;
        for (customer, isin, holding) in DEMO_CUSTOMERS {
            inserted += stmt.execute(params![customer, isin, holding])?;
        }
    }
    tx.commit()?;

    tracing::info!(db = %path.as_ref().display(), rows = inserted, "demo database created");
    Ok(inserted)
}
