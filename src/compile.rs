//! End-to-end compilation from IR to SQL.
//!
//! This module provides the single public entry point:
//!
//! ```text
//! IR → validate → collect tables → plan joins → lower → emit SQL
//! ```
//!
//! # Example
//!
//! ```ignore
//! use glossa::catalog::SemanticCatalog;
//! use glossa::compile::{compile, CompileOptions};
//! use glossa::ir::QueryIr;
//! use glossa::sql::Dialect;
//!
//! let catalog = SemanticCatalog::from_json5(CATALOG_JSON5)?;
//! let ir = QueryIr::from_json(IR_JSON)?;
//! let output = compile(&ir, &catalog, CompileOptions::default())?;
//! println!("{}", output.sql);
//! ```
//!
//! The compiler is a pure function of `(ir, catalog, options)`: it holds no
//! state, performs no I/O, and can run concurrently against a shared
//! catalog. Every failure is one of the structured [`CompileError`] kinds
//! with a JSON-pointer location into the IR; the first error wins.

use std::collections::HashSet;

use crate::catalog::SemanticCatalog;
use crate::ir::{validate, walk, QueryIr};
use crate::lowering::{Lowerer, QueryClock};
use crate::planner::{plan_joins, TableRequirement};
use crate::sql::dialect::SqlDialect;
use crate::sql::expr::{table_col, ExprExt};
use crate::sql::query::{Query, TableRef};
use crate::sql::Dialect;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during compilation.
///
/// Each variant carries a JSON-pointer `location` into the IR document
/// where that is meaningful.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("Invalid IR at {location}: {message}")]
    InvalidIr { message: String, location: String },

    #[error("Unknown entity '{name}' at {location}")]
    UnknownEntity { name: String, location: String },

    #[error("Table '{table}' is not reachable through the foreign-key graph (referenced at {location})")]
    DisconnectedJoinGraph { table: String, location: String },

    #[error("Query projects nothing (at {location})")]
    EmptyProjection { location: String },

    #[error("Projection '{entity}' must appear in group_by (at {location})")]
    GroupByMismatch { entity: String, location: String },

    #[error("Unknown alias '{name}' at {location}")]
    UnknownAlias { name: String, location: String },

    #[error("Operator {op} at {location}: {message}")]
    OperatorValueMismatch {
        op: String,
        message: String,
        location: String,
    },

    #[error("Value '{value}' is outside the enum values of '{entity}' (at {location})")]
    EnumValueRejected {
        entity: String,
        value: String,
        location: String,
    },

    #[error("Operator {op} has no SQL mapping at {location}")]
    UnsupportedOperator { op: String, location: String },

    #[error("{dialect} pagination requires an ORDER BY clause")]
    DialectRequiresOrderBy { dialect: Dialect },
}

impl CompileError {
    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::InvalidIr { .. } => "InvalidIR",
            CompileError::UnknownEntity { .. } => "UnknownEntity",
            CompileError::DisconnectedJoinGraph { .. } => "DisconnectedJoinGraph",
            CompileError::EmptyProjection { .. } => "EmptyProjection",
            CompileError::GroupByMismatch { .. } => "GroupByMismatch",
            CompileError::UnknownAlias { .. } => "UnknownAlias",
            CompileError::OperatorValueMismatch { .. } => "OperatorValueMismatch",
            CompileError::EnumValueRejected { .. } => "EnumValueRejected",
            CompileError::UnsupportedOperator { .. } => "UnsupportedOperator",
            CompileError::DialectRequiresOrderBy { .. } => "DialectRequiresOrderBy",
        }
    }

    /// JSON-pointer path into the IR, where applicable.
    pub fn location(&self) -> Option<&str> {
        match self {
            CompileError::InvalidIr { location, .. }
            | CompileError::UnknownEntity { location, .. }
            | CompileError::DisconnectedJoinGraph { location, .. }
            | CompileError::EmptyProjection { location }
            | CompileError::GroupByMismatch { location, .. }
            | CompileError::UnknownAlias { location, .. }
            | CompileError::OperatorValueMismatch { location, .. }
            | CompileError::EnumValueRejected { location, .. }
            | CompileError::UnsupportedOperator { location, .. } => Some(location),
            CompileError::DialectRequiresOrderBy { .. } => None,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

// ============================================================================
// Options
// ============================================================================

/// How literals outside an attribute's enum values are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumMode {
    /// Fail compilation with `EnumValueRejected`.
    #[default]
    Reject,
    /// Emit a warning and pass the literal through.
    Warn,
}

/// Options for compilation.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// SQL dialect to generate.
    pub dialect: Dialect,
    /// Clock the temporal operators resolve against.
    pub clock: QueryClock,
    /// Enum value enforcement.
    pub enum_values: EnumMode,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Standard,
            clock: QueryClock::system(),
            enum_values: EnumMode::default(),
        }
    }
}

impl CompileOptions {
    /// Set the SQL dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Pin the compile-time clock.
    pub fn with_clock(mut self, clock: QueryClock) -> Self {
        self.clock = clock;
        self
    }

    /// Set enum value enforcement.
    pub fn with_enum_mode(mut self, mode: EnumMode) -> Self {
        self.enum_values = mode;
        self
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result of compiling an IR to SQL.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// The generated SQL string.
    pub sql: String,

    /// The SQL query AST (for further manipulation if needed).
    pub query: Query,

    /// The dialect used for generation.
    pub dialect: Dialect,
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile a validated IR against a catalog into a SELECT statement.
pub fn compile(
    ir: &QueryIr,
    catalog: &SemanticCatalog,
    options: CompileOptions,
) -> CompileResult<CompileOutput> {
    // Step 1: Validate shapes, entity references, grouping rules.
    let analysis = validate::validate(ir, catalog, options.enum_values)?;

    // Step 2: Collect the referenced physical tables in IR walk order.
    let required = collect_required_tables(ir, catalog);

    // Step 3: Plan the join tree.
    let plan = plan_joins(&required, catalog)?;

    // Step 4: Lower every clause against the plan's aliases.
    let lowerer = Lowerer::new(catalog, &plan, options.clock, analysis.aggregated);

    let mut select = Vec::with_capacity(ir.projections.len());
    for (i, p) in ir.projections.iter().enumerate() {
        select.push(lowerer.projection(p, i)?);
    }

    let driving = plan.driving_table();
    let mut query = Query::new()
        .select(select)
        .from(TableRef::new(&driving.table).with_alias(&driving.alias));

    for join in &plan.joins {
        query = query.inner_join(
            TableRef::new(&join.table).with_alias(&join.alias),
            table_col(&join.left_alias, &join.left_column)
                .eq(table_col(&join.alias, &join.right_column)),
        );
    }

    if let Some(filters) = &ir.filters {
        query = query.filter(lowerer.filter_tree(filters, "/filters")?);
    }

    let mut group_by = Vec::with_capacity(ir.group_by.len());
    for (i, g) in ir.group_by.iter().enumerate() {
        group_by.push(lowerer.group_by_item(g, i)?);
    }
    query = query.group_by(group_by);

    if let Some(having) = &ir.having {
        query = query.having(lowerer.having_tree(having, "/having")?);
    }

    query = query.order_by(
        ir.order_by
            .iter()
            .map(|o| lowerer.order_by_item(o))
            .collect(),
    );

    if let Some(limit) = ir.limit {
        query = query.limit(limit);
    }
    if let Some(offset) = ir.offset {
        query = query.offset(offset);
    }

    // Step 5: Dialect constraints on the assembled query.
    if query.limit_offset.is_some()
        && query.order_by.is_empty()
        && options.dialect.requires_order_by_for_offset()
    {
        return Err(CompileError::DialectRequiresOrderBy {
            dialect: options.dialect,
        });
    }

    // Step 6: Serialize.
    let sql = query.to_sql(options.dialect);
    tracing::debug!(
        dialect = %options.dialect,
        tables = plan.tables.len(),
        "compiled IR to SQL"
    );

    Ok(CompileOutput {
        sql,
        query,
        dialect: options.dialect,
    })
}

/// Union of `tables_of(entity)` over the IR walk, deduplicated, keeping
/// first-reference order and the first referencing location.
fn collect_required_tables(ir: &QueryIr, catalog: &SemanticCatalog) -> Vec<TableRequirement> {
    let mut required = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for entity_ref in walk::entity_refs(ir) {
        // ORDER BY fields may be projection aliases; those reference no
        // new table. Anything else unresolvable was caught by validation.
        let Some(entity) = catalog.resolve_entity(&entity_ref.name) else {
            continue;
        };
        for table in entity.tables() {
            if seen.insert(table.to_string()) {
                required.push(TableRequirement {
                    table: table.to_string(),
                    location: entity_ref.path.clone(),
                });
            }
        }
    }

    required
}
