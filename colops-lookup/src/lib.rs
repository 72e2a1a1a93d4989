use std::path::PathBuf;

use thiserror::Error;

pub mod rates;
pub use rates::StaticRates;

pub mod roles;
pub use roles::CsvRoleTable;

pub mod sqlite;
pub use sqlite::{create_demo_database, SqliteStore};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("failed to read {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{} has no '{column}' column", path.display())]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// User-id → role table. Read-only while serving.
pub trait RoleTable: Send + Sync {
    /// First matching role, or `None` when the user is not listed.
    fn role_of(&self, user_id: &str) -> Result<Option<String>, LookupError>;
}

/// Row-oriented relational store answering verbatim queries.
pub trait QueryStore: Send + Sync {
    /// Run `sql` as given and return every result row, each cell as a number.
    fn query(&self, sql: &str) -> Result<Vec<Vec<f64>>, LookupError>;
}
