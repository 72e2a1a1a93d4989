use std::path::{Path, PathBuf};

use crate::{LookupError, RoleTable};

const USER_ID_COLUMN: &str = "userid";
const USER_ROLE_COLUMN: &str = "userrole";

/// CSV-backed role table.
///
/// The file is reopened and scanned top to bottom on every lookup, so edits
/// to it are visible to the next call. Columns are located by header name.
pub struct CsvRoleTable {
    path: PathBuf,
}

impl CsvRoleTable {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn csv_err(&self, source: csv::Error) -> LookupError {
        LookupError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    fn column(&self, headers: &csv::StringRecord, column: &'static str) -> Result<usize, LookupError> {
        headers
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| LookupError::MissingColumn {
                path: self.path.clone(),
                column,
            })
    }
}

impl RoleTable for CsvRoleTable {
    fn role_of(&self, user_id: &str) -> Result<Option<String>, LookupError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| self.csv_err(e))?;
        let headers = reader.headers().map_err(|e| self.csv_err(e))?.clone();
        let id_idx = self.column(&headers, USER_ID_COLUMN)?;
        let role_idx = self.column(&headers, USER_ROLE_COLUMN)?;

        for record in reader.records() {
            let record = record.map_err(|e| self.csv_err(e))?;
            if record.get(id_idx) == Some(user_id) {
                let role = record.get(role_idx).unwrap_or_default().to_string();
                tracing::debug!(user_id, role = %role, "role table hit");
                return Ok(Some(role));
            }
        }

        tracing::debug!(user_id, "role table miss");
        Ok(None)
    }
}
