use std::sync::Arc;

use colops_lookup::{QueryStore, RoleTable, StaticRates};
use colops_registry::{Evaluator, FunctionCatalog, Registry};

pub mod arith;
pub mod convert;
pub mod query;

pub use arith::{ColumnFold, MaxOfColumns2, RowBinary};
pub use convert::{FixedRate, PerUserRate, UserRole, UNKNOWN_ROLE};
pub use query::{QueryColumns, QueryTable};

/// Function ids of the built-in catalogue. They must match the `Id` fields of
/// the declaration file.
pub mod ids {
    pub const SUM_OF_ROWS: i32 = 0;
    pub const SUM_OF_COLUMN: i32 = 1;
    pub const MAX_OF_COLUMNS_2: i32 = 2;
    pub const CALC_OF_COLUMN: i32 = 3;
    pub const CALC_OF_ROWS: i32 = 4;
    pub const CONVERT_USD_TO_INR: i32 = 5;
    pub const CONVERT_USD_TO_GBP: i32 = 6;
    pub const GET_USER_ROLE: i32 = 7;
    pub const GET_RESULT_COLS: i32 = 8;
    pub const GET_RESULT_TABLE: i32 = 9;
}

/// Data sources the evaluators read from. Built once during startup.
#[derive(Clone)]
pub struct Lookups {
    pub rates: StaticRates,
    pub roles: Arc<dyn RoleTable>,
    pub store: Arc<dyn QueryStore>,
}

/// Bind every built-in evaluator to its id.
pub fn standard_registry(catalog: FunctionCatalog, lookups: &Lookups) -> Registry {
    use ids::*;

    Registry::new(catalog)
        .bind(SUM_OF_ROWS, Evaluator::RowWise(Arc::new(RowBinary::sum())))
        .bind(SUM_OF_COLUMN, Evaluator::WholeStream(Arc::new(ColumnFold::sum())))
        .bind(MAX_OF_COLUMNS_2, Evaluator::WholeStream(Arc::new(MaxOfColumns2)))
        .bind(CALC_OF_COLUMN, Evaluator::WholeStream(Arc::new(ColumnFold::product())))
        .bind(CALC_OF_ROWS, Evaluator::RowWise(Arc::new(RowBinary::product())))
        .bind(
            CONVERT_USD_TO_INR,
            Evaluator::RowWise(Arc::new(FixedRate::new(lookups.rates.usd_to_inr))),
        )
        .bind(
            CONVERT_USD_TO_GBP,
            Evaluator::RowWise(Arc::new(PerUserRate::new(
                lookups.rates.usd_to_gbp,
                Arc::clone(&lookups.roles),
            ))),
        )
        .bind(
            GET_USER_ROLE,
            Evaluator::RowWise(Arc::new(UserRole::new(Arc::clone(&lookups.roles)))),
        )
        .bind(
            GET_RESULT_COLS,
            Evaluator::RowWise(Arc::new(QueryColumns::new(Arc::clone(&lookups.store)))),
        )
        .bind(
            GET_RESULT_TABLE,
            Evaluator::RowWise(Arc::new(QueryTable::new(Arc::clone(&lookups.store)))),
        )
}
