//! SQLite dialect.
//!
//! Double-quoted identifiers when quoting is needed, LIMIT/OFFSET
//! pagination, 1/0 booleans (SQLite has no boolean type).

use super::{helpers, SqlDialect};

/// SQLite dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }
}
