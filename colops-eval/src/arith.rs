//! Pure numeric evaluators: row-wise sums and products, column reductions.

use colops_registry::{EvalError, Reduction, RowEvaluator, StreamEvaluator};
use colops_types::{ResponseMeta, Row, TableShape};

/// Binary row-wise operation over two numeric columns.
pub struct RowBinary {
    op: fn(f64, f64) -> f64,
}

impl RowBinary {
    pub fn sum() -> Self {
        Self { op: |a, b| a + b }
    }

    pub fn product() -> Self {
        Self { op: |a, b| a * b }
    }
}

impl RowEvaluator for RowBinary {
    fn arity(&self) -> usize {
        2
    }

    fn eval_row(&self, row: &Row) -> Result<Vec<Row>, EvalError> {
        row.expect_arity(2)?;
        let result = (self.op)(row.num_at(0)?, row.num_at(1)?);
        Ok(vec![Row::num([result])])
    }
}

/// Fold of a single numeric column down to one value.
///
/// An empty stream yields the fold's identity (0 for sums, 1 for products).
pub struct ColumnFold {
    identity: f64,
    op: fn(f64, f64) -> f64,
}

impl ColumnFold {
    pub fn sum() -> Self {
        Self {
            identity: 0.0,
            op: |acc, v| acc + v,
        }
    }

    pub fn product() -> Self {
        Self {
            identity: 1.0,
            op: |acc, v| acc * v,
        }
    }
}

struct FoldState {
    acc: f64,
    op: fn(f64, f64) -> f64,
}

impl StreamEvaluator for ColumnFold {
    fn arity(&self) -> usize {
        1
    }

    fn start(&self) -> Box<dyn Reduction> {
        Box::new(FoldState {
            acc: self.identity,
            op: self.op,
        })
    }
}

impl Reduction for FoldState {
    fn update(&mut self, row: &Row) -> Result<(), EvalError> {
        row.expect_arity(1)?;
        self.acc = (self.op)(self.acc, row.num_at(0)?);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Row, EvalError> {
        Ok(Row::num([self.acc]))
    }
}

/// Per-column maximum of two numeric columns, returned as a one-row table.
pub struct MaxOfColumns2;

struct MaxState([f64; 2]);

impl StreamEvaluator for MaxOfColumns2 {
    fn arity(&self) -> usize {
        2
    }

    fn response_meta(&self) -> ResponseMeta {
        ResponseMeta {
            no_store: false,
            table: Some(TableShape::numeric("MaxOfColumns", 1, &["Max1", "Max2"])),
        }
    }

    fn start(&self) -> Box<dyn Reduction> {
        Box::new(MaxState([f64::NEG_INFINITY; 2]))
    }
}

impl Reduction for MaxState {
    fn update(&mut self, row: &Row) -> Result<(), EvalError> {
        row.expect_arity(2)?;
        for (i, max) in self.0.iter_mut().enumerate() {
            *max = max.max(row.num_at(i)?);
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Row, EvalError> {
        tracing::debug!(maxima = ?self.0, "max of columns");
        Ok(Row::num(self.0))
    }
}
