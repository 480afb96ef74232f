//! The NL2SQL intermediate representation.
//!
//! The IR is the contract between the language-model pipeline that
//! understands a question and this compiler. It captures a single
//! Select-Project-Join-Group-Having-Order-Limit query shape: projections,
//! a recursive boolean filter tree, group-by, a having tree, order-by, and
//! pagination. The IR arrives as JSON, is validated on compiler entry, and
//! is never mutated.
//!
//! Unknown JSON fields are rejected so a hallucinated field fails loudly
//! instead of being silently dropped.

pub mod validate;
pub mod walk;

use serde::Deserialize;

use crate::sql::expr::{count_distinct, func, Expr};

// ============================================================================
// Top-level IR
// ============================================================================

/// A complete query description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryIr {
    /// Free-form rationale from the understanding phase. Informational only.
    #[serde(default)]
    pub intent: Option<String>,

    /// Ordered SELECT items. Must be non-empty.
    #[serde(default)]
    pub projections: Vec<Projection>,

    /// WHERE tree.
    #[serde(default)]
    pub filters: Option<FilterNode>,

    /// GROUP BY entities.
    #[serde(default)]
    pub group_by: Vec<GroupByItem>,

    /// HAVING tree.
    #[serde(default)]
    pub having: Option<FilterNode>,

    /// ORDER BY items.
    #[serde(default)]
    pub order_by: Vec<OrderByItem>,

    /// Row limit.
    #[serde(default)]
    pub limit: Option<u64>,

    /// Row offset. Only meaningful alongside `limit`, but accepted alone.
    #[serde(default)]
    pub offset: Option<u64>,
}

impl QueryIr {
    /// Parse an IR document from JSON.
    pub fn from_json(src: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(src)
    }
}

// ============================================================================
// Projections
// ============================================================================

/// A SELECT item: an entity, optionally aggregated, optionally aliased.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Projection {
    pub entity: String,
    #[serde(default)]
    pub op: Option<ProjectionOp>,
    #[serde(default)]
    pub alias: Option<String>,
}

/// Aggregation operators available on projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectionOp {
    Sum,
    Count,
    Avg,
    Min,
    Max,
    CountDistinct,
}

impl ProjectionOp {
    /// Wrap an expression in this aggregation.
    pub fn apply(&self, expr: Expr) -> Expr {
        match self {
            ProjectionOp::Sum => func("SUM", vec![expr]),
            ProjectionOp::Count => func("COUNT", vec![expr]),
            ProjectionOp::Avg => func("AVG", vec![expr]),
            ProjectionOp::Min => func("MIN", vec![expr]),
            ProjectionOp::Max => func("MAX", vec![expr]),
            ProjectionOp::CountDistinct => count_distinct(expr),
        }
    }
}

// ============================================================================
// Filter Tree
// ============================================================================

/// A node in the filter/having tree: either an AND/OR group or a leaf
/// condition. The same shape serves WHERE and HAVING.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Group(FilterGroup),
    Leaf(Condition),
}

/// An AND/OR group over child nodes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterGroup {
    pub operator: BoolOp,
    pub conditions: Vec<FilterNode>,
}

/// Boolean connective for a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BoolOp {
    And,
    Or,
}

/// A leaf predicate.
///
/// WHERE-style leaves name an `entity`; HAVING-style leaves may instead
/// name an `entity_alias` introduced by an aggregate projection. Exactly
/// one of the two must be present (enforced by validation).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub entity_alias: Option<String>,
    pub op: ConditionOp,
    #[serde(default)]
    pub value: Option<IrValue>,
}

/// Predicate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionOp {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    Gte,
    Lte,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Contains,
    StartsWith,
    EndsWith,
    LastMonth,
    LastNDays,
    ThisYear,
}

impl ConditionOp {
    /// The operator's IR spelling, for error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOp::Equal => "EQUAL",
            ConditionOp::NotEqual => "NOT_EQUAL",
            ConditionOp::GreaterThan => "GREATER_THAN",
            ConditionOp::LessThan => "LESS_THAN",
            ConditionOp::Gte => "GTE",
            ConditionOp::Lte => "LTE",
            ConditionOp::In => "IN",
            ConditionOp::NotIn => "NOT_IN",
            ConditionOp::IsNull => "IS_NULL",
            ConditionOp::IsNotNull => "IS_NOT_NULL",
            ConditionOp::Contains => "CONTAINS",
            ConditionOp::StartsWith => "STARTS_WITH",
            ConditionOp::EndsWith => "ENDS_WITH",
            ConditionOp::LastMonth => "LAST_MONTH",
            ConditionOp::LastNDays => "LAST_N_DAYS",
            ConditionOp::ThisYear => "THIS_YEAR",
        }
    }

    /// Whether this operator resolves against the compile-time clock.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ConditionOp::LastMonth | ConditionOp::LastNDays | ConditionOp::ThisYear
        )
    }

    /// Whether this operator is a plain binary comparison.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            ConditionOp::Equal
                | ConditionOp::NotEqual
                | ConditionOp::GreaterThan
                | ConditionOp::LessThan
                | ConditionOp::Gte
                | ConditionOp::Lte
        )
    }
}

impl std::fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Values
// ============================================================================

/// A scalar literal carried by a condition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IrScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// A condition value: a scalar or a list of scalars (for IN/NOT_IN).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IrValue {
    Scalar(IrScalar),
    List(Vec<IrScalar>),
}

impl IrValue {
    /// The scalar, if this value is one.
    pub fn as_scalar(&self) -> Option<&IrScalar> {
        match self {
            IrValue::Scalar(s) => Some(s),
            IrValue::List(_) => None,
        }
    }

    /// The list, if this value is one.
    pub fn as_list(&self) -> Option<&[IrScalar]> {
        match self {
            IrValue::Scalar(_) => None,
            IrValue::List(items) => Some(items),
        }
    }
}

// ============================================================================
// GROUP BY / ORDER BY
// ============================================================================

/// A GROUP BY item.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupByItem {
    pub entity: String,
}

/// An ORDER BY item. `field` may be an entity name or a projection alias;
/// entity names take precedence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderByItem {
    pub field: String,
    #[serde(default)]
    pub direction: SortOrder,
    #[serde(default)]
    pub nulls: Option<NullsPlacement>,
}

/// Sort direction, ASC by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

/// NULLS placement in ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum NullsPlacement {
    #[serde(rename = "FIRST")]
    First,
    #[serde(rename = "LAST")]
    Last,
}

// ============================================================================
// Tests
// ============================================================================
