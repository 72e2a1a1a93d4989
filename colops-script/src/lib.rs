//! Evaluation of ad-hoc scripts sent through `EvaluateScript`.
//!
//! A script request is turned into an ordinary [`Evaluator`] so it runs
//! through the same dispatch path as registered functions: tensor scripts
//! answer every row, aggregation scripts see whole columns once the stream
//! has ended.

use std::sync::Arc;

use colops_proto::sse;
use colops_registry::{EvalError, Evaluator, Reduction, RowEvaluator, StreamEvaluator};
use colops_types::{Dual, FunctionKind, ParamType, Row, RowError};
use thiserror::Error;

pub mod expr;
pub use expr::{Expr, ExprError, Value};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Function type {0} is not supported in this plugin.")]
    Unsupported(String),
    #[error("parameter {index}: unknown data type {code}")]
    UnknownType { index: usize, code: i32 },
    #[error("unknown return type {0}")]
    UnknownReturnType(i32),
    #[error("invalid script: {0}")]
    Parse(#[from] ExprError),
    #[error("script refers to args[{index}] but declares {declared} parameter(s)")]
    ArgIndex { index: usize, declared: usize },
}

struct Compiled {
    expr: Expr,
    params: Vec<ParamType>,
    return_type: ParamType,
}

/// A parsed and checked script, ready to be bound to an invocation.
pub struct ScriptRequest {
    kind: FunctionKind,
    compiled: Arc<Compiled>,
}

impl ScriptRequest {
    /// Validate the header before any row is read.
    pub fn from_header(header: &sse::ScriptRequestHeader) -> Result<Self, ScriptError> {
        let kind = match FunctionKind::from_code(header.function_type) {
            Some(kind @ (FunctionKind::Tensor | FunctionKind::Aggregation)) => kind,
            Some(other) => return Err(ScriptError::Unsupported(other.name().to_string())),
            None => return Err(ScriptError::Unsupported(header.function_type.to_string())),
        };
        let return_type = ParamType::from_code(header.return_type)
            .ok_or(ScriptError::UnknownReturnType(header.return_type))?;
        let params = header
            .params
            .iter()
            .enumerate()
            .map(|(index, p)| {
                ParamType::from_code(p.data_type).ok_or(ScriptError::UnknownType {
                    index,
                    code: p.data_type,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let expr = Expr::parse(&header.script)?;
        if let Some(index) = expr.max_arg() {
            if index >= params.len() {
                return Err(ScriptError::ArgIndex {
                    index,
                    declared: params.len(),
                });
            }
        }
        tracing::debug!(kind = kind.name(), params = params.len(), "script compiled");

        Ok(Self {
            kind,
            compiled: Arc::new(Compiled {
                expr,
                params,
                return_type,
            }),
        })
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub fn into_evaluator(self) -> Evaluator {
        match self.kind {
            FunctionKind::Aggregation => {
                Evaluator::WholeStream(Arc::new(AggregateScript(self.compiled)))
            }
            _ => Evaluator::RowWise(Arc::new(TensorScript(self.compiled))),
        }
    }
}

/// Convert one cell into a script value according to its declared type.
fn argument(cell: &Dual, ty: ParamType, column: usize) -> Result<Value, RowError> {
    match ty {
        ParamType::Numeric => cell.as_num().map(Value::Num).ok_or(RowError::Type {
            column,
            expected: "numeric",
        }),
        ParamType::String => Ok(Value::Str(cell.text().to_string())),
        ParamType::Dual => Ok(match cell {
            Dual::Str(s) => Value::Str(s.clone()),
            Dual::Num(n) | Dual::Both(n, _) => Value::Num(*n),
        }),
    }
}

fn render(value: Value, ty: ParamType) -> Result<Dual, EvalError> {
    let parse = |s: &str| s.trim().parse::<f64>().unwrap_or(f64::NAN);
    match (value, ty) {
        (Value::List(_), _) => Err(EvalError::Script(
            "script must evaluate to a single value, not a list".into(),
        )),
        (Value::Num(n), ParamType::Numeric) => Ok(Dual::Num(n)),
        (Value::Str(s), ParamType::Numeric) => Ok(Dual::Num(parse(&s))),
        (v, ParamType::String) => Ok(Dual::Str(v.to_string())),
        (Value::Num(n), ParamType::Dual) => Ok(Dual::Both(n, n.to_string())),
        (Value::Str(s), ParamType::Dual) => Ok(Dual::Both(parse(&s), s)),
    }
}

impl Compiled {
    fn run(&self, args: &[Value]) -> Result<Row, EvalError> {
        let value = self
            .expr
            .eval(args)
            .map_err(|e| EvalError::Script(e.to_string()))?;
        Ok(Row(vec![render(value, self.return_type)?]))
    }
}

struct TensorScript(Arc<Compiled>);

impl RowEvaluator for TensorScript {
    fn arity(&self) -> usize {
        self.0.params.len()
    }

    fn eval_row(&self, row: &Row) -> Result<Vec<Row>, EvalError> {
        row.expect_arity(self.arity())?;
        let args = row
            .0
            .iter()
            .zip(&self.0.params)
            .enumerate()
            .map(|(column, (cell, ty))| argument(cell, *ty, column))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(vec![self.0.run(&args)?])
    }
}

struct AggregateScript(Arc<Compiled>);

/// Aggregation scripts may reference any column as a whole, so every column
/// is kept until the stream ends.
struct Columns {
    script: Arc<Compiled>,
    columns: Vec<Vec<Value>>,
}

impl StreamEvaluator for AggregateScript {
    fn arity(&self) -> usize {
        self.0.params.len()
    }

    fn start(&self) -> Box<dyn Reduction> {
        Box::new(Columns {
            script: Arc::clone(&self.0),
            columns: vec![Vec::new(); self.0.params.len()],
        })
    }
}

impl Reduction for Columns {
    fn update(&mut self, row: &Row) -> Result<(), EvalError> {
        row.expect_arity(self.columns.len())?;
        for (column, (cell, ty)) in row.0.iter().zip(&self.script.params).enumerate() {
            self.columns[column].push(argument(cell, *ty, column)?);
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Row, EvalError> {
        let args: Vec<Value> = self.columns.into_iter().map(Value::List).collect();
        self.script.run(&args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(script: &str, kind: i32, ret: ParamType, params: &[ParamType]) -> sse::ScriptRequestHeader {
        sse::ScriptRequestHeader {
            script: script.into(),
            function_type: kind,
            return_type: ret.code(),
            params: params
                .iter()
                .enumerate()
                .map(|(i, t)| sse::Parameter {
                    data_type: t.code(),
                    name: format!("p{i}"),
                })
                .collect(),
        }
    }

    const NUM2: &[ParamType] = &[ParamType::Numeric, ParamType::Numeric];

    #[test]
    fn scalar_scripts_are_unsupported() {
        let err = ScriptRequest::from_header(&header("args[0]", 0, ParamType::Numeric, NUM2))
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Function type SCALAR is not supported in this plugin."
        );
        assert!(matches!(
            ScriptRequest::from_header(&header("1", 9, ParamType::Numeric, &[])),
            Err(ScriptError::Unsupported(code)) if code == "9"
        ));
    }

    #[test]
    fn header_problems_are_caught_before_rows() {
        assert!(matches!(
            ScriptRequest::from_header(&header("args[2]", 2, ParamType::Numeric, NUM2)),
            Err(ScriptError::ArgIndex { index: 2, declared: 2 })
        ));
        assert!(matches!(
            ScriptRequest::from_header(&header("args[0] +", 2, ParamType::Numeric, NUM2)),
            Err(ScriptError::Parse(_))
        ));
        let nested = "-".repeat(10_000) + "args[0]";
        assert!(matches!(
            ScriptRequest::from_header(&header(&nested, 2, ParamType::Numeric, NUM2)),
            Err(ScriptError::Parse(ExprError::Syntax { .. }))
        ));
        let mut bad = header("1", 2, ParamType::Numeric, NUM2);
        bad.params[1].data_type = 7;
        assert!(matches!(
            ScriptRequest::from_header(&bad),
            Err(ScriptError::UnknownType { index: 1, code: 7 })
        ));
    }

    #[test]
    fn tensor_script_answers_each_row() {
        let request =
            ScriptRequest::from_header(&header("args[0] * args[1] + 1", 2, ParamType::Numeric, NUM2))
                .unwrap();
        assert_eq!(request.kind(), FunctionKind::Tensor);
        let Evaluator::RowWise(eval) = request.into_evaluator() else {
            panic!("tensor scripts are row-wise");
        };
        assert_eq!(eval.arity(), 2);
        assert_eq!(eval.eval_row(&Row::num([2.0, 3.0])).unwrap(), vec![Row::num([7.0])]);
        assert!(matches!(
            eval.eval_row(&Row::num([2.0])),
            Err(EvalError::Row(RowError::Arity { expected: 2, actual: 1 }))
        ));
    }

    #[test]
    fn aggregation_script_sees_whole_columns() {
        let request = ScriptRequest::from_header(&header(
            "sum(args[0]) / count(args[1])",
            1,
            ParamType::Numeric,
            NUM2,
        ))
        .unwrap();
        let Evaluator::WholeStream(eval) = request.into_evaluator() else {
            panic!("aggregation scripts are whole-stream");
        };
        let mut state = eval.start();
        for row in [Row::num([10.0, 0.0]), Row::num([20.0, 0.0]), Row::num([30.0, 0.0])] {
            state.update(&row).unwrap();
        }
        assert_eq!(state.finish().unwrap(), Row::num([20.0]));
    }

    #[test]
    fn string_parameters_and_return_types() {
        let request = ScriptRequest::from_header(&header(
            "args[0] + ':' + args[1]",
            2,
            ParamType::String,
            &[ParamType::String, ParamType::Numeric],
        ))
        .unwrap();
        let Evaluator::RowWise(eval) = request.into_evaluator() else {
            panic!("tensor scripts are row-wise");
        };
        let row = Row(vec![Dual::Str("id".into()), Dual::Num(4.0)]);
        assert_eq!(eval.eval_row(&row).unwrap(), vec![Row::text("id:4")]);

        let numeric_in_string = Row(vec![Dual::Num(f64::NAN), Dual::Num(1.0)]);
        assert_eq!(eval.eval_row(&numeric_in_string).unwrap(), vec![Row::text(":1")]);

        let row = Row(vec![Dual::Num(1.0), Dual::Str("x".into())]);
        assert!(matches!(
            eval.eval_row(&row),
            Err(EvalError::Row(RowError::Type { column: 1, .. }))
        ));
    }

    #[test]
    fn dual_return_carries_both_parts() {
        let request =
            ScriptRequest::from_header(&header("args[0] * 2", 2, ParamType::Dual, &[ParamType::Dual]))
                .unwrap();
        let Evaluator::RowWise(eval) = request.into_evaluator() else {
            panic!("tensor scripts are row-wise");
        };
        assert_eq!(
            eval.eval_row(&Row(vec![Dual::Both(2.5, "2.5".into())])).unwrap(),
            vec![Row(vec![Dual::Both(5.0, "5".into())])]
        );
    }

    #[test]
    fn list_results_are_rejected() {
        let request = ScriptRequest::from_header(&header(
            "args[0]",
            1,
            ParamType::Numeric,
            &[ParamType::Numeric],
        ))
        .unwrap();
        let Evaluator::WholeStream(eval) = request.into_evaluator() else {
            panic!("aggregation scripts are whole-stream");
        };
        let mut state = eval.start();
        state.update(&Row::num([1.0])).unwrap();
        assert!(matches!(state.finish(), Err(EvalError::Script(_))));
    }
}
