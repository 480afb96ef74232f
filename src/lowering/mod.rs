//! Lowering IR constructs to SQL expressions.
//!
//! The lowerer binds every entity reference to the aliases chosen by the
//! join planner: attributes become `alias.column`, metrics have the
//! physical table names inside their defining expression rewritten to
//! aliases. Conditions fold into [`Expr`] predicates; temporal operators
//! resolve against the injected [`QueryClock`].
//!
//! Validation has already run when lowering starts, so shape errors here
//! indicate an internal inconsistency; they still surface as structured
//! errors rather than panics.

pub mod clock;

pub use clock::QueryClock;

use chrono::NaiveDate;

use crate::catalog::{metric_expr, Entity, EntityKind, SemanticCatalog};
use crate::compile::{CompileError, CompileResult};
use crate::ir::{
    BoolOp, Condition, ConditionOp, FilterNode, GroupByItem, IrScalar, NullsPlacement, OrderByItem,
    Projection, SortOrder,
};
use crate::planner::JoinPlan;
use crate::sql::expr::{
    col, lit_bool, lit_float, lit_int, lit_str, table_col, BinaryOperator, Expr, ExprExt,
};
use crate::sql::query::{NullsOrder, OrderByExpr, SelectExpr, SortDir};

/// Escape character used for LIKE patterns that contain wildcards.
const LIKE_ESCAPE_CHAR: char = '\\';

/// Lowers IR constructs into alias-bound SQL expressions.
pub struct Lowerer<'a> {
    catalog: &'a SemanticCatalog,
    plan: &'a JoinPlan,
    clock: QueryClock,
    /// Whether the query aggregates (drives implicit metric aggregation).
    aggregated: bool,
}

impl<'a> Lowerer<'a> {
    pub fn new(
        catalog: &'a SemanticCatalog,
        plan: &'a JoinPlan,
        clock: QueryClock,
        aggregated: bool,
    ) -> Self {
        Self {
            catalog,
            plan,
            clock,
            aggregated,
        }
    }

    // ========================================================================
    // Entity references
    // ========================================================================

    fn entity(&self, name: &str, location: &str) -> CompileResult<&'a Entity> {
        self.catalog
            .resolve_entity(name)
            .ok_or_else(|| CompileError::UnknownEntity {
                name: name.to_string(),
                location: location.to_string(),
            })
    }

    /// The entity's expression bound to planner aliases, without any
    /// aggregation applied.
    fn raw_entity_expr(&self, entity: &Entity) -> Expr {
        match &entity.kind {
            EntityKind::Attribute { table, column, .. } => {
                let alias = self
                    .plan
                    .alias_of(table)
                    .expect("planner covered every referenced table");
                table_col(alias, column)
            }
            EntityKind::Metric { expression, .. } => {
                metric_expr::qualify_with_aliases(expression, self.plan.alias_map())
            }
        }
    }

    /// The entity's expression as projected: explicit ops always apply;
    /// a metric without an explicit op aggregates with its default when
    /// the query aggregates.
    fn projected_entity_expr(&self, entity: &Entity, op: Option<crate::ir::ProjectionOp>) -> Expr {
        let raw = self.raw_entity_expr(entity);
        if let Some(op) = op {
            return op.apply(raw);
        }
        match &entity.kind {
            EntityKind::Metric { default_agg, .. } if self.aggregated => default_agg.apply(raw),
            _ => raw,
        }
    }

    // ========================================================================
    // Projections / GROUP BY / ORDER BY
    // ========================================================================

    /// Lower one SELECT item.
    pub fn projection(&self, p: &Projection, index: usize) -> CompileResult<SelectExpr> {
        let entity = self.entity(&p.entity, &format!("/projections/{index}/entity"))?;
        let expr = self.projected_entity_expr(entity, p.op);
        let mut select = SelectExpr::new(expr);
        if let Some(alias) = &p.alias {
            select = select.with_alias(alias);
        }
        Ok(select)
    }

    /// Lower one GROUP BY item to the raw entity expression.
    pub fn group_by_item(&self, g: &GroupByItem, index: usize) -> CompileResult<Expr> {
        let entity = self.entity(&g.entity, &format!("/group_by/{index}/entity"))?;
        Ok(self.raw_entity_expr(entity))
    }

    /// Lower one ORDER BY item. Entity names take precedence over
    /// projection aliases.
    pub fn order_by_item(&self, o: &OrderByItem) -> OrderByExpr {
        let expr = match self.catalog.resolve_entity(&o.field) {
            Some(entity) => self.projected_entity_expr(entity, None),
            // Validation guaranteed the field is a projection alias.
            None => col(&o.field),
        };

        let mut order = match o.direction {
            SortOrder::Asc => OrderByExpr {
                expr,
                dir: Some(SortDir::Asc),
                nulls: None,
            },
            SortOrder::Desc => OrderByExpr {
                expr,
                dir: Some(SortDir::Desc),
                nulls: None,
            },
        };
        order.nulls = o.nulls.map(|n| match n {
            NullsPlacement::First => NullsOrder::First,
            NullsPlacement::Last => NullsOrder::Last,
        });
        order
    }

    // ========================================================================
    // Filter trees
    // ========================================================================

    /// Lower the WHERE tree.
    pub fn filter_tree(&self, node: &FilterNode, path: &str) -> CompileResult<Expr> {
        self.lower_tree(node, path, &|cond, path| self.where_subject(cond, path))
    }

    /// Lower the HAVING tree.
    pub fn having_tree(&self, node: &FilterNode, path: &str) -> CompileResult<Expr> {
        self.lower_tree(node, path, &|cond, path| self.having_subject(cond, path))
    }

    fn lower_tree(
        &self,
        node: &FilterNode,
        path: &str,
        subject: &dyn Fn(&Condition, &str) -> CompileResult<Expr>,
    ) -> CompileResult<Expr> {
        self.lower_node(node, path, subject, true)
    }

    // Root-group children are always parenthesized; nested children only
    // when they are themselves groups. Every subgroup ends up wrapped
    // exactly once, so AND/OR precedence stays explicit at any depth.
    fn lower_node(
        &self,
        node: &FilterNode,
        path: &str,
        subject: &dyn Fn(&Condition, &str) -> CompileResult<Expr>,
        root: bool,
    ) -> CompileResult<Expr> {
        match node {
            FilterNode::Group(group) => {
                let mut children = Vec::with_capacity(group.conditions.len());
                for (i, child) in group.conditions.iter().enumerate() {
                    let expr = self.lower_node(
                        child,
                        &format!("{path}/conditions/{i}"),
                        subject,
                        false,
                    )?;
                    children.push((expr, matches!(child, FilterNode::Group(_))));
                }
                let wrap = |(expr, is_group): (Expr, bool)| {
                    if root || is_group {
                        expr.paren()
                    } else {
                        expr
                    }
                };
                match children.len() {
                    0 => Err(CompileError::InvalidIr {
                        message: "empty AND/OR group".into(),
                        location: format!("{path}/conditions"),
                    }),
                    // A single-child group renders as its child.
                    1 => Ok(children.into_iter().next().expect("length checked").0),
                    _ => {
                        let mut iter = children.into_iter();
                        let first = wrap(iter.next().expect("length checked"));
                        Ok(iter.fold(first, |acc, child| match group.operator {
                            BoolOp::And => acc.and(wrap(child)),
                            BoolOp::Or => acc.or(wrap(child)),
                        }))
                    }
                }
            }
            FilterNode::Leaf(cond) => {
                let subject = subject(cond, path)?;
                self.predicate(subject, cond, path)
            }
        }
    }

    /// The left-hand expression of a WHERE leaf: the entity itself,
    /// never aggregated (WHERE runs before grouping).
    fn where_subject(&self, cond: &Condition, path: &str) -> CompileResult<Expr> {
        let Some(name) = &cond.entity else {
            return Err(CompileError::InvalidIr {
                message: "condition must name an entity".into(),
                location: path.to_string(),
            });
        };
        let entity = self.entity(name, &format!("{path}/entity"))?;
        Ok(self.raw_entity_expr(entity))
    }

    /// The left-hand expression of a HAVING leaf: a bare projection alias,
    /// or a metric as an inline aggregate.
    fn having_subject(&self, cond: &Condition, path: &str) -> CompileResult<Expr> {
        if let Some(alias) = &cond.entity_alias {
            return Ok(col(alias));
        }
        let Some(name) = &cond.entity else {
            return Err(CompileError::InvalidIr {
                message: "having condition must name an entity or entity_alias".into(),
                location: path.to_string(),
            });
        };
        let entity = self.entity(name, &format!("{path}/entity"))?;
        match &entity.kind {
            EntityKind::Metric { default_agg, .. } => {
                Ok(default_agg.apply(self.raw_entity_expr(entity)))
            }
            EntityKind::Attribute { .. } => Err(CompileError::InvalidIr {
                message: format!(
                    "having may only reference aggregate aliases or metrics, \
                     '{name}' is an attribute"
                ),
                location: format!("{path}/entity"),
            }),
        }
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    /// Apply the condition's operator to a lowered subject expression.
    fn predicate(&self, subject: Expr, cond: &Condition, path: &str) -> CompileResult<Expr> {
        // A compound subject (a metric like `a * b`) needs parentheses as
        // a comparison operand.
        let subject = if subject.is_atomic() {
            subject
        } else {
            subject.paren()
        };

        let mismatch = |message: &str| CompileError::OperatorValueMismatch {
            op: cond.op.as_str().into(),
            message: message.into(),
            location: format!("{path}/value"),
        };

        match cond.op {
            ConditionOp::Equal
            | ConditionOp::NotEqual
            | ConditionOp::GreaterThan
            | ConditionOp::LessThan
            | ConditionOp::Gte
            | ConditionOp::Lte => {
                let scalar = cond
                    .value
                    .as_ref()
                    .and_then(|v| v.as_scalar())
                    .ok_or_else(|| mismatch("expected a scalar value"))?;
                Ok(subject.binary(comparison_operator(cond.op), scalar_expr(scalar)))
            }

            ConditionOp::In | ConditionOp::NotIn => {
                let items = cond
                    .value
                    .as_ref()
                    .and_then(|v| v.as_list())
                    .ok_or_else(|| mismatch("expected a list of values"))?;
                let values = items.iter().map(scalar_expr).collect();
                Ok(if cond.op == ConditionOp::In {
                    subject.in_list(values)
                } else {
                    subject.not_in_list(values)
                })
            }

            ConditionOp::IsNull => Ok(subject.is_null()),
            ConditionOp::IsNotNull => Ok(subject.is_not_null()),

            ConditionOp::Contains | ConditionOp::StartsWith | ConditionOp::EndsWith => {
                let Some(IrScalar::String(needle)) = cond.value.as_ref().and_then(|v| v.as_scalar())
                else {
                    return Err(mismatch("expected a string value"));
                };
                Ok(like_predicate(subject, cond.op, needle))
            }

            ConditionOp::LastMonth => {
                let (start, end) = self.clock.last_month();
                Ok(between_dates(subject, start, end))
            }
            ConditionOp::ThisYear => {
                let (start, end) = self.clock.this_year();
                Ok(between_dates(subject, start, end))
            }
            ConditionOp::LastNDays => {
                let Some(IrScalar::Int(n)) = cond.value.as_ref().and_then(|v| v.as_scalar()) else {
                    return Err(mismatch("expected a number of days"));
                };
                let (start, end) = self.clock.last_n_days(*n as u64);
                Ok(between_dates(subject, start, end))
            }
        }
    }
}

fn comparison_operator(op: ConditionOp) -> BinaryOperator {
    match op {
        ConditionOp::Equal => BinaryOperator::Eq,
        ConditionOp::NotEqual => BinaryOperator::Ne,
        ConditionOp::GreaterThan => BinaryOperator::Gt,
        ConditionOp::LessThan => BinaryOperator::Lt,
        ConditionOp::Gte => BinaryOperator::Gte,
        ConditionOp::Lte => BinaryOperator::Lte,
        other => unreachable!("'{other}' is not a comparison operator"),
    }
}

fn scalar_expr(scalar: &IrScalar) -> Expr {
    match scalar {
        IrScalar::Bool(b) => lit_bool(*b),
        IrScalar::Int(n) => lit_int(*n),
        IrScalar::Float(f) => lit_float(*f),
        IrScalar::String(s) => lit_str(s),
    }
}

fn between_dates(subject: Expr, start: NaiveDate, end: NaiveDate) -> Expr {
    subject.between(
        lit_str(&start.format("%Y-%m-%d").to_string()),
        lit_str(&end.format("%Y-%m-%d").to_string()),
    )
}

/// Build a LIKE predicate for CONTAINS/STARTS_WITH/ENDS_WITH.
///
/// Wildcards inside the needle are escaped; the ESCAPE clause is emitted
/// only when escaping actually occurred.
fn like_predicate(subject: Expr, op: ConditionOp, needle: &str) -> Expr {
    let (escaped, needed_escaping) = escape_like_pattern(needle);
    let pattern = match op {
        ConditionOp::Contains => format!("%{escaped}%"),
        ConditionOp::StartsWith => format!("{escaped}%"),
        ConditionOp::EndsWith => format!("%{escaped}"),
        other => unreachable!("'{other}' is not a LIKE operator"),
    };
    if needed_escaping {
        subject.like_escape(lit_str(&pattern), LIKE_ESCAPE_CHAR)
    } else {
        subject.like(lit_str(&pattern))
    }
}

/// Escape `%`, `_`, and the escape character itself in a LIKE needle.
fn escape_like_pattern(needle: &str) -> (String, bool) {
    let mut escaped = String::with_capacity(needle.len());
    let mut needed = false;
    for c in needle.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE_CHAR {
            escaped.push(LIKE_ESCAPE_CHAR);
            needed = true;
        }
        escaped.push(c);
    }
    (escaped, needed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_pattern() {
        assert_eq!(escape_like_pattern("电脑"), ("电脑".to_string(), false));
        assert_eq!(escape_like_pattern("50%"), ("50\\%".to_string(), true));
        assert_eq!(escape_like_pattern("a_b"), ("a\\_b".to_string(), true));
        assert_eq!(escape_like_pattern("a\\b"), ("a\\\\b".to_string(), true));
    }
}
