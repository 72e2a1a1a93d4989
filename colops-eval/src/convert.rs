//! Currency conversion and user-role lookups.

use std::sync::Arc;

use colops_lookup::RoleTable;
use colops_registry::{EvalError, RowEvaluator};
use colops_types::{ResponseMeta, Row};

/// Role reported for users missing from the role table.
pub const UNKNOWN_ROLE: &str = "Unknown User Role";

fn no_store() -> ResponseMeta {
    ResponseMeta {
        no_store: true,
        table: None,
    }
}

/// Multiplies a numeric column by a rate fixed at startup.
pub struct FixedRate {
    rate: f64,
}

impl FixedRate {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }
}

impl RowEvaluator for FixedRate {
    fn arity(&self) -> usize {
        1
    }

    fn eval_row(&self, row: &Row) -> Result<Vec<Row>, EvalError> {
        row.expect_arity(1)?;
        Ok(vec![Row::num([row.num_at(0)? * self.rate])])
    }
}

/// Converts `(user id, amount)` for users listed in the role table; unlisted
/// users get 0.
pub struct PerUserRate {
    rate: f64,
    roles: Arc<dyn RoleTable>,
}

impl PerUserRate {
    pub fn new(rate: f64, roles: Arc<dyn RoleTable>) -> Self {
        Self { rate, roles }
    }
}

impl RowEvaluator for PerUserRate {
    fn arity(&self) -> usize {
        2
    }

    fn response_meta(&self) -> ResponseMeta {
        no_store()
    }

    fn eval_row(&self, row: &Row) -> Result<Vec<Row>, EvalError> {
        row.expect_arity(2)?;
        let user_id = row.text_at(0)?;
        let amount = row.num_at(1)?;
        let converted = match self.roles.role_of(user_id)? {
            Some(_) => amount * self.rate,
            None => 0.0,
        };
        Ok(vec![Row::num([converted])])
    }
}

/// Looks up the role of a user id.
pub struct UserRole {
    roles: Arc<dyn RoleTable>,
}

impl UserRole {
    pub fn new(roles: Arc<dyn RoleTable>) -> Self {
        Self { roles }
    }
}

impl RowEvaluator for UserRole {
    fn arity(&self) -> usize {
        1
    }

    fn response_meta(&self) -> ResponseMeta {
        no_store()
    }

    fn eval_row(&self, row: &Row) -> Result<Vec<Row>, EvalError> {
        row.expect_arity(1)?;
        let role = self
            .roles
            .role_of(row.text_at(0)?)?
            .unwrap_or_else(|| UNKNOWN_ROLE.to_string());
        Ok(vec![Row::text(role)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colops_lookup::LookupError;
    use colops_types::Dual;

    struct FixedRoles;

    impl RoleTable for FixedRoles {
        fn role_of(&self, user_id: &str) -> Result<Option<String>, LookupError> {
            Ok(match user_id {
                "alice" => Some("Admin".into()),
                "Persona\\Me" => Some("Analyst".into()),
                _ => None,
            })
        }
    }

    fn user_row(user: &str, amount: f64) -> Row {
        Row(vec![Dual::Str(user.into()), Dual::Num(amount)])
    }

    #[test]
    fn fixed_rate_multiplies() {
        let eval = FixedRate::new(83.0);
        assert_eq!(eval.eval_row(&Row::num([2.0])).unwrap(), vec![Row::num([166.0])]);
        assert!(!eval.response_meta().no_store);
    }

    #[test]
    fn per_user_rate_converts_known_users_only() {
        let eval = PerUserRate::new(0.5, Arc::new(FixedRoles));
        assert_eq!(eval.eval_row(&user_row("alice", 10.0)).unwrap(), vec![Row::num([5.0])]);
        assert_eq!(eval.eval_row(&user_row("mallory", 10.0)).unwrap(), vec![Row::num([0.0])]);
        assert!(eval.response_meta().no_store);
    }

    #[test]
    fn role_lookup_hit_and_sentinel() {
        let eval = UserRole::new(Arc::new(FixedRoles));
        assert_eq!(
            eval.eval_row(&Row::text("Persona\\Me")).unwrap(),
            vec![Row::text("Analyst")]
        );
        assert_eq!(
            eval.eval_row(&Row::text("nobody")).unwrap(),
            vec![Row::text(UNKNOWN_ROLE)]
        );
        assert!(eval.response_meta().no_store);
    }

    #[test]
    fn empty_user_id_is_a_lookup_miss() {
        // Clients send an empty string as a numeric-only NaN cell.
        let empty = Dual::Num(f64::NAN);
        let roles = UserRole::new(Arc::new(FixedRoles));
        assert_eq!(
            roles.eval_row(&Row(vec![empty.clone()])).unwrap(),
            vec![Row::text(UNKNOWN_ROLE)]
        );
        let rate = PerUserRate::new(0.5, Arc::new(FixedRoles));
        assert_eq!(
            rate.eval_row(&Row(vec![empty, Dual::Num(10.0)])).unwrap(),
            vec![Row::num([0.0])]
        );
    }
}
