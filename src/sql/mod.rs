//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect
//! SELECT statements. It includes:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    avg, col, count, count_distinct, func, lit_bool, lit_float, lit_int, lit_null, lit_str, max,
    min, sum, table_col, BinaryOperator, Expr, ExprExt, Literal,
};
pub use query::{
    Join, JoinType, LimitOffset, NullsOrder, OrderByExpr, Query, SelectExpr, SortDir, TableRef,
};
pub use token::{Token, TokenStream};
