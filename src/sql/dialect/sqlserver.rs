//! SQL Server (T-SQL) dialect.
//!
//! The significant differences from standard SQL:
//! - Square bracket identifier quoting (`[name]`)
//! - OFFSET FETCH for pagination (requires ORDER BY)
//! - N'...' prefix for non-ASCII strings
//! - 1/0 boolean literals
//! - No NULLS FIRST/LAST before SQL Server 2022

use super::{helpers, SqlDialect};
use crate::sql::token::TokenStream;

/// SQL Server dialect.
#[derive(Debug, Clone, Copy)]
pub struct SqlServer;

impl SqlDialect for SqlServer {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        // SQL Server needs the N prefix for Unicode string literals
        if s.is_ascii() {
            helpers::quote_string_single(s)
        } else {
            helpers::quote_string_unicode(s)
        }
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_fetch(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        true
    }

    fn supports_nulls_ordering(&self) -> bool {
        // Supported from SQL Server 2022 onwards; stay conservative.
        false
    }
}
