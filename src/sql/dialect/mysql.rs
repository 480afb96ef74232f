//! MySQL dialect.
//!
//! Backtick identifier quoting, LIMIT/OFFSET pagination, 1/0 booleans,
//! no NULLS FIRST/LAST in ORDER BY.

use super::{helpers, SqlDialect};

/// MySQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }
}
