use std::collections::BTreeMap;
use std::sync::Arc;

use colops_lookup::LookupError;
use colops_types::{FunctionDescriptor, FunctionKind, ResponseMeta, Row, RowError};
use thiserror::Error;

pub mod catalog;
pub use catalog::FunctionCatalog;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read function definitions from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid function definitions in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("function {id}: unknown function type {code}")]
    UnknownKind { id: i32, code: i32 },
    #[error("function {id}: unknown data type {code} for '{field}'")]
    UnknownType { id: i32, field: String, code: i32 },
    #[error("function id {0} is declared more than once")]
    DuplicateId(i32),
    #[error("function id {0} is not registered")]
    UnknownFunction(i32),
    #[error("function {id} ({name}) is declared {declared:?} but its evaluator is {bound}")]
    KindMismatch {
        id: i32,
        name: String,
        declared: FunctionKind,
        bound: &'static str,
    },
    #[error("function {id} ({name}) declares {declared} parameter(s) but its evaluator takes {bound}")]
    ArityMismatch {
        id: i32,
        name: String,
        declared: usize,
        bound: usize,
    },
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("malformed row: {0}")]
    Row(#[from] RowError),
    #[error("backend failure: {0}")]
    Backend(#[from] LookupError),
    #[error("script failed: {0}")]
    Script(String),
}

/// Tensor-style evaluation: every input row is answered as soon as it is seen.
pub trait RowEvaluator: Send + Sync {
    fn arity(&self) -> usize;

    /// Metadata sent to the client before the first row.
    fn response_meta(&self) -> ResponseMeta {
        ResponseMeta::default()
    }

    /// Output rows for one input row, in order. Usually exactly one.
    fn eval_row(&self, row: &Row) -> Result<Vec<Row>, EvalError>;
}

/// Aggregation-style evaluation over the whole input stream.
pub trait StreamEvaluator: Send + Sync {
    fn arity(&self) -> usize;

    fn response_meta(&self) -> ResponseMeta {
        ResponseMeta::default()
    }

    /// Fresh reduction state for one invocation.
    fn start(&self) -> Box<dyn Reduction>;
}

/// Running state of one aggregation; holds only what the reduction needs.
pub trait Reduction: Send {
    fn update(&mut self, row: &Row) -> Result<(), EvalError>;
    fn finish(self: Box<Self>) -> Result<Row, EvalError>;
}

#[derive(Clone)]
pub enum Evaluator {
    RowWise(Arc<dyn RowEvaluator>),
    WholeStream(Arc<dyn StreamEvaluator>),
}

impl Evaluator {
    pub fn arity(&self) -> usize {
        match self {
            Evaluator::RowWise(e) => e.arity(),
            Evaluator::WholeStream(e) => e.arity(),
        }
    }

    pub fn response_meta(&self) -> ResponseMeta {
        match self {
            Evaluator::RowWise(e) => e.response_meta(),
            Evaluator::WholeStream(e) => e.response_meta(),
        }
    }

    fn discipline(&self) -> &'static str {
        match self {
            Evaluator::RowWise(_) => "row-wise",
            Evaluator::WholeStream(_) => "whole-stream",
        }
    }

    fn serves(&self, kind: FunctionKind) -> bool {
        matches!(
            (self, kind),
            (Evaluator::WholeStream(_), FunctionKind::Aggregation)
                | (Evaluator::RowWise(_), FunctionKind::Scalar | FunctionKind::Tensor)
        )
    }
}

/// Fixed id → evaluator table, paired with the declarative catalogue.
///
/// Bindings are made once during startup; the table is read-only afterwards.
pub struct Registry {
    catalog: FunctionCatalog,
    evaluators: BTreeMap<i32, Evaluator>,
}

impl Registry {
    pub fn new(catalog: FunctionCatalog) -> Self {
        Self {
            catalog,
            evaluators: BTreeMap::new(),
        }
    }

    pub fn bind(mut self, id: i32, evaluator: Evaluator) -> Self {
        self.evaluators.insert(id, evaluator);
        self
    }

    pub fn catalog(&self) -> &FunctionCatalog {
        &self.catalog
    }

    /// Current catalogue, re-read from disk.
    pub fn describe(&self) -> Result<Vec<FunctionDescriptor>, RegistryError> {
        self.catalog.load()
    }

    pub fn resolve(&self, id: i32) -> Result<Evaluator, RegistryError> {
        self.evaluators
            .get(&id)
            .cloned()
            .ok_or(RegistryError::UnknownFunction(id))
    }

    /// Cross-check the catalogue against the bound evaluators. Every declared
    /// function must be bound to an evaluator of matching kind and arity.
    pub fn validate(&self) -> Result<Vec<FunctionDescriptor>, RegistryError> {
        let functions = self.describe()?;
        for f in &functions {
            let evaluator = self.resolve(f.id)?;
            if !evaluator.serves(f.kind) {
                return Err(RegistryError::KindMismatch {
                    id: f.id,
                    name: f.name.clone(),
                    declared: f.kind,
                    bound: evaluator.discipline(),
                });
            }
            if evaluator.arity() != f.params.len() {
                return Err(RegistryError::ArityMismatch {
                    id: f.id,
                    name: f.name.clone(),
                    declared: f.params.len(),
                    bound: evaluator.arity(),
                });
            }
        }

        let unused: Vec<_> = self
            .evaluators
            .keys()
            .filter(|id| !functions.iter().any(|f| f.id == **id))
            .collect();
        if !unused.is_empty() {
            tracing::warn!(?unused, "evaluators bound to ids the catalogue does not declare");
        }
        Ok(functions)
    }
}
