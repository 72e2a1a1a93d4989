//! Ad-hoc queries against the relational store.
//!
//! SECURITY: the command is built by appending the numeric suffix to the
//! caller's text and is executed verbatim. Any client that can invoke these
//! functions can run arbitrary single SQL statements against the store. Keep
//! them out of production catalogues or move them behind parameterized
//! queries.

use std::sync::Arc;

use colops_lookup::QueryStore;
use colops_registry::{EvalError, RowEvaluator};
use colops_types::{ResponseMeta, Row, TableShape};

fn command(row: &Row) -> Result<String, EvalError> {
    row.expect_arity(2)?;
    let fragment = row.text_at(0)?;
    let suffix = row.num_at(1)?;
    Ok(format!("{fragment}{suffix}"))
}

/// Runs the query and returns the first column of every result row.
pub struct QueryColumns {
    store: Arc<dyn QueryStore>,
}

impl QueryColumns {
    pub fn new(store: Arc<dyn QueryStore>) -> Self {
        Self { store }
    }
}

impl RowEvaluator for QueryColumns {
    fn arity(&self) -> usize {
        2
    }

    fn response_meta(&self) -> ResponseMeta {
        ResponseMeta {
            no_store: true,
            table: None,
        }
    }

    fn eval_row(&self, row: &Row) -> Result<Vec<Row>, EvalError> {
        let sql = command(row)?;
        let rows = self.store.query(&sql)?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.first().copied())
            .map(|v| Row::num([v]))
            .collect())
    }
}

/// Runs the query and returns the first two columns as a `ResultTable`.
/// Narrower results are padded with NaN.
pub struct QueryTable {
    store: Arc<dyn QueryStore>,
}

impl QueryTable {
    pub fn new(store: Arc<dyn QueryStore>) -> Self {
        Self { store }
    }
}

impl RowEvaluator for QueryTable {
    fn arity(&self) -> usize {
        2
    }

    fn response_meta(&self) -> ResponseMeta {
        ResponseMeta {
            no_store: true,
            table: Some(TableShape::numeric("ResultTable", -1, &["Col1", "Col2"])),
        }
    }

    fn eval_row(&self, row: &Row) -> Result<Vec<Row>, EvalError> {
        let sql = command(row)?;
        let rows = self.store.query(&sql)?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let cell = |i: usize| r.get(i).copied().unwrap_or(f64::NAN);
                Row::num([cell(0), cell(1)])
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colops_lookup::{create_demo_database, LookupError, SqliteStore};
    use colops_types::Dual;

    fn demo_store() -> (tempfile::TempDir, Arc<SqliteStore>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("customer.db");
        create_demo_database(&path).unwrap();
        (dir, Arc::new(SqliteStore::new(path)))
    }

    fn query_row(fragment: &str, suffix: f64) -> Row {
        Row(vec![Dual::Str(fragment.into()), Dual::Num(suffix)])
    }

    #[test]
    fn command_concatenates_fragment_and_suffix() {
        let sql = command(&query_row("SELECT Holding FROM CUSTOMER WHERE CustomerID = ", 100.0)).unwrap();
        assert_eq!(sql, "SELECT Holding FROM CUSTOMER WHERE CustomerID = 100");
    }

    #[test]
    fn columns_returns_first_column_per_result_row() {
        let (_dir, store) = demo_store();
        let eval = QueryColumns::new(store);
        let out = eval
            .eval_row(&query_row(
                "SELECT Holding, CustomerID FROM CUSTOMER WHERE CompanyISIN = ",
                1.0,
            ))
            .unwrap();
        assert_eq!(out, vec![Row::num([20000.0]), Row::num([12000.0])]);
    }

    #[test]
    fn table_returns_two_columns() {
        let (_dir, store) = demo_store();
        let eval = QueryTable::new(store);
        let out = eval
            .eval_row(&query_row(
                "SELECT CustomerID, Holding FROM CUSTOMER WHERE CustomerID = ",
                400.0,
            ))
            .unwrap();
        assert_eq!(out, vec![Row::num([400.0, 5000.0])]);

        let meta = eval.response_meta();
        assert!(meta.no_store);
        assert_eq!(meta.table.unwrap().number_of_rows, -1);
    }

    #[test]
    fn backend_failure_is_surfaced() {
        let (_dir, store) = demo_store();
        let eval = QueryColumns::new(store);
        let err = eval
            .eval_row(&query_row("SELECT Holding FROM MISSING WHERE x = ", 1.0))
            .unwrap_err();
        assert!(matches!(err, EvalError::Backend(LookupError::Sqlite(_))));
    }

    // Documents the known injection exposure; this is not a fix.
    #[test]
    fn caller_text_is_executed_verbatim() {
        let (_dir, store) = demo_store();
        let eval = QueryColumns::new(store.clone());

        // A tautology widens a single-customer lookup to every row.
        let leaked = eval
            .eval_row(&query_row(
                "SELECT Holding FROM CUSTOMER WHERE 1=1 OR CustomerID = ",
                100.0,
            ))
            .unwrap();
        assert_eq!(leaked.len(), 9);

        // Only the first of several stacked statements is ever compiled...
        let _ = eval.eval_row(&query_row(
            "SELECT Holding FROM CUSTOMER; DROP TABLE CUSTOMER; SELECT ",
            1.0,
        ));
        assert_eq!(store.query("SELECT COUNT(*) FROM CUSTOMER").unwrap(), vec![vec![9.0]]);

        // ...but any single statement, including destructive ones, runs.
        let deleted = eval
            .eval_row(&query_row("DELETE FROM CUSTOMER WHERE CustomerID > ", 0.0))
            .unwrap();
        assert!(deleted.is_empty());
        assert_eq!(store.query("SELECT COUNT(*) FROM CUSTOMER").unwrap(), vec![vec![0.0]]);
    }
}
