//! # Glossa
//!
//! A semantic layer that compiles NL2SQL intermediate representations to
//! multi-dialect SQL.
//!
//! ## Quick Start
//!
//! ```rust
//! use glossa::prelude::*;
//!
//! let catalog = SemanticCatalog::from_json5(r#"{
//!     entities: {
//!         product_name: { type: "attribute", table: "products", column: "name" },
//!     },
//! }"#).unwrap();
//!
//! let ir = QueryIr::from_json(r#"{
//!     "projections": [{ "entity": "product_name" }],
//!     "filters": { "entity": "product_name", "op": "CONTAINS", "value": "电脑" }
//! }"#).unwrap();
//!
//! let output = compile(&ir, &catalog, CompileOptions::default()).unwrap();
//! assert!(output.sql.starts_with("SELECT t1.name"));
//! ```
//!
//! ## Architecture
//!
//! An upstream pipeline (typically LLM-driven, out of scope here) turns a
//! natural-language question into a validated IR. This crate is the
//! deterministic half: it resolves business entities through a declarative
//! semantic catalog, computes a minimal join tree over declared foreign
//! keys, lowers the IR's expression trees, and emits a SELECT statement.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    SemanticCatalog                       │
//! │     (entities, metrics, tables, foreign-key graph)       │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!      QueryIr ──▶ validate ──▶ plan joins ──▶ lower ──▶ SQL
//! ```
//!
//! The compiler is pure: no I/O, no global state, no clock reads unless
//! the caller injects [`lowering::QueryClock::system`]. The same inputs
//! always produce byte-identical SQL.

pub mod catalog;
pub mod compile;
pub mod ir;
pub mod lowering;
pub mod planner;
pub mod sql;

// Re-export SQL submodules at crate level for convenient paths
pub use sql::dialect;
pub use sql::expr;
pub use sql::query;
pub use sql::token;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::catalog::{CatalogError, SemanticCatalog};
    pub use crate::compile::{compile, CompileError, CompileOptions, CompileOutput, EnumMode};
    pub use crate::dialect::{Dialect, SqlDialect};
    pub use crate::ir::QueryIr;
    pub use crate::lowering::QueryClock;
}

// Also export at crate root for convenience
pub use catalog::SemanticCatalog;
pub use compile::{compile, CompileError, CompileOptions, CompileOutput};
pub use dialect::Dialect;
pub use ir::QueryIr;
pub use lowering::QueryClock;
