//! PostgreSQL dialect.
//!
//! Close to standard SQL: double-quoted identifiers when quoting is needed,
//! LIMIT/OFFSET pagination, TRUE/FALSE boolean literals.

use super::{helpers, SqlDialect};

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_keyword(b)
    }
}
