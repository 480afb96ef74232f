//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use super::super::token::{Token, TokenStream};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Whether an identifier satisfies the catalog grammar
/// `[A-Za-z_][A-Za-z0-9_]*` and can be emitted without quoting.
///
/// Catalog loading validates every table, column, and entity name against
/// this grammar, so compiled SQL normally contains only bare identifiers.
pub fn is_bare_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote with double quotes (ANSI style) unless the identifier is bare.
/// Used by: Standard, Postgres, Sqlite
pub fn quote_double(ident: &str) -> String {
    if is_bare_identifier(ident) {
        ident.into()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

/// Quote with backticks unless the identifier is bare.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    if is_bare_identifier(ident) {
        ident.into()
    } else {
        format!("`{}`", ident.replace('`', "``"))
    }
}

/// Quote with square brackets unless the identifier is bare.
/// Used by: SQL Server
pub fn quote_bracket(ident: &str) -> String {
    if is_bare_identifier(ident) {
        ident.into()
    } else {
        format!("[{}]", ident.replace(']', "]]"))
    }
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
/// Used by: All dialects
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote string with N prefix for Unicode (SQL Server).
pub fn quote_string_unicode(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as TRUE/FALSE keywords.
/// Used by: Standard, Postgres
pub fn format_bool_keyword(b: bool) -> &'static str {
    if b {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: MySQL, Sqlite, SQL Server
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT ... OFFSET ... (standard SQL).
/// Used by: Standard, Postgres, MySQL, Sqlite
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit)
            .space()
            .push(Token::LitInt(lim as i64));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    ts
}

/// Emit OFFSET ... ROWS FETCH NEXT ... ROWS ONLY (SQL Server style).
/// Requires an ORDER BY clause; the compiler enforces that before emission.
pub fn emit_limit_offset_fetch(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    let off = offset.unwrap_or(0);
    ts.push(Token::Offset)
        .space()
        .push(Token::LitInt(off as i64))
        .space()
        .push(Token::Rows);

    if let Some(lim) = limit {
        ts.space()
            .push(Token::Fetch)
            .space()
            .push(Token::Next)
            .space()
            .push(Token::LitInt(lim as i64))
            .space()
            .push(Token::Rows)
            .space()
            .push(Token::Only);
    }

    ts
}
