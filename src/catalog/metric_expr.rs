//! Metric expression parsing using sqlparser-rs.
//!
//! A metric's defining expression is written as a SQL fragment over
//! physical `table.column` references, e.g.
//! `order_items.quantity * order_items.unit_price`. The fragment is parsed
//! once at catalog load into the crate's own [`Expr`] AST; the column nodes
//! carry physical table names that lowering later swaps for planner aliases.
//! Working on a real AST keeps the rewrite immune to substring overlap
//! between table names.

use std::collections::HashMap;

use sqlparser::ast as sql_ast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token as SqlToken;

use crate::sql::expr::{BinaryOperator, Expr, Literal};

/// Parse a metric defining expression into an [`Expr`].
///
/// Supported surface: table-qualified column references, numeric literals,
/// the arithmetic operators `+ - * / %`, unary minus, and parentheses.
pub(crate) fn parse_metric_expression(raw: &str) -> Result<Expr, String> {
    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(raw)
        .map_err(|e| format!("SQL parse error: {e}"))?;

    let ast = parser
        .parse_expr()
        .map_err(|e| format!("SQL parse error: {e}"))?;

    if parser.peek_token().token != SqlToken::EOF {
        return Err(format!(
            "trailing input after expression: {}",
            parser.peek_token().token
        ));
    }

    convert(ast)
}

fn convert(ast: sql_ast::Expr) -> Result<Expr, String> {
    match ast {
        sql_ast::Expr::CompoundIdentifier(parts) if parts.len() == 2 => Ok(Expr::Column {
            table: Some(parts[0].value.clone()),
            column: parts[1].value.clone(),
        }),

        sql_ast::Expr::CompoundIdentifier(parts) => Err(format!(
            "column reference must be table.column, got '{}'",
            parts
                .iter()
                .map(|p| p.value.as_str())
                .collect::<Vec<_>>()
                .join(".")
        )),

        sql_ast::Expr::Identifier(ident) => Err(format!(
            "column reference '{}' must be table-qualified",
            ident.value
        )),

        sql_ast::Expr::BinaryOp { left, op, right } => {
            let op = convert_arithmetic_op(&op)?;
            Ok(Expr::BinaryOp {
                left: Box::new(convert(*left)?),
                op,
                right: Box::new(convert(*right)?),
            })
        }

        sql_ast::Expr::UnaryOp {
            op: sql_ast::UnaryOperator::Minus,
            expr,
        } => Ok(Expr::Neg(Box::new(convert(*expr)?))),

        sql_ast::Expr::Nested(inner) => Ok(Expr::Paren(Box::new(convert(*inner)?))),

        sql_ast::Expr::Value(sql_ast::Value::Number(repr, _)) => {
            if let Ok(n) = repr.parse::<i64>() {
                Ok(Expr::Literal(Literal::Int(n)))
            } else {
                repr.parse::<f64>()
                    .map(|f| Expr::Literal(Literal::Float(f)))
                    .map_err(|_| format!("invalid numeric literal '{repr}'"))
            }
        }

        other => Err(format!("unsupported construct in metric expression: {other}")),
    }
}

fn convert_arithmetic_op(op: &sql_ast::BinaryOperator) -> Result<BinaryOperator, String> {
    match op {
        sql_ast::BinaryOperator::Plus => Ok(BinaryOperator::Plus),
        sql_ast::BinaryOperator::Minus => Ok(BinaryOperator::Minus),
        sql_ast::BinaryOperator::Multiply => Ok(BinaryOperator::Mul),
        sql_ast::BinaryOperator::Divide => Ok(BinaryOperator::Div),
        sql_ast::BinaryOperator::Modulo => Ok(BinaryOperator::Mod),
        other => Err(format!("unsupported operator '{other}' in metric expression")),
    }
}

/// Collect the `(table, column)` slots referenced by a parsed expression.
pub(crate) fn column_slots(expr: &Expr) -> Vec<(String, String)> {
    let mut slots = Vec::new();
    collect_slots(expr, &mut slots);
    slots
}

fn collect_slots(expr: &Expr, slots: &mut Vec<(String, String)>) {
    match expr {
        Expr::Column {
            table: Some(table),
            column,
        } => slots.push((table.clone(), column.clone())),
        Expr::Column { table: None, .. } | Expr::Literal(_) => {}
        Expr::BinaryOp { left, right, .. } => {
            collect_slots(left, slots);
            collect_slots(right, slots);
        }
        Expr::Neg(inner) | Expr::Paren(inner) => collect_slots(inner, slots),
        Expr::Function { args, .. } => {
            for arg in args {
                collect_slots(arg, slots);
            }
        }
        Expr::In { expr, values, .. } => {
            collect_slots(expr, slots);
            for v in values {
                collect_slots(v, slots);
            }
        }
        Expr::Between { expr, low, high } => {
            collect_slots(expr, slots);
            collect_slots(low, slots);
            collect_slots(high, slots);
        }
        Expr::IsNull { expr, .. } => collect_slots(expr, slots),
        Expr::LikeEscape { expr, pattern, .. } => {
            collect_slots(expr, slots);
            collect_slots(pattern, slots);
        }
    }
}

/// Rewrite physical table names to planner aliases.
///
/// Tables absent from the map are left untouched; the planner guarantees
/// every table a metric references has an alias before lowering runs.
pub(crate) fn qualify_with_aliases(expr: &Expr, aliases: &HashMap<String, String>) -> Expr {
    match expr {
        Expr::Column {
            table: Some(table),
            column,
        } => Expr::Column {
            table: Some(aliases.get(table).cloned().unwrap_or_else(|| table.clone())),
            column: column.clone(),
        },
        Expr::Column { .. } | Expr::Literal(_) => expr.clone(),
        Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
            left: Box::new(qualify_with_aliases(left, aliases)),
            op: *op,
            right: Box::new(qualify_with_aliases(right, aliases)),
        },
        Expr::Neg(inner) => Expr::Neg(Box::new(qualify_with_aliases(inner, aliases))),
        Expr::Paren(inner) => Expr::Paren(Box::new(qualify_with_aliases(inner, aliases))),
        Expr::Function {
            name,
            args,
            distinct,
        } => Expr::Function {
            name: name.clone(),
            args: args.iter().map(|a| qualify_with_aliases(a, aliases)).collect(),
            distinct: *distinct,
        },
        Expr::In {
            expr,
            values,
            negated,
        } => Expr::In {
            expr: Box::new(qualify_with_aliases(expr, aliases)),
            values: values.iter().map(|v| qualify_with_aliases(v, aliases)).collect(),
            negated: *negated,
        },
        Expr::Between { expr, low, high } => Expr::Between {
            expr: Box::new(qualify_with_aliases(expr, aliases)),
            low: Box::new(qualify_with_aliases(low, aliases)),
            high: Box::new(qualify_with_aliases(high, aliases)),
        },
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: Box::new(qualify_with_aliases(expr, aliases)),
            negated: *negated,
        },
        Expr::LikeEscape {
            expr,
            pattern,
            escape_char,
        } => Expr::LikeEscape {
            expr: Box::new(qualify_with_aliases(expr, aliases)),
            pattern: Box::new(qualify_with_aliases(pattern, aliases)),
            escape_char: *escape_char,
        },
    }
}
