//! Structural validation of the IR against a catalog.
//!
//! Validation runs once on compiler entry and fails fast with a
//! JSON-pointer location into the offending IR field. Lowering can then
//! assume shapes are sound: every entity resolves, operator/value pairs
//! agree, aliases are unique, and GROUP BY covers the non-aggregate
//! projections of an aggregated query.

use std::collections::{HashMap, HashSet};

use crate::catalog::{Entity, SemanticCatalog};
use crate::compile::{CompileError, CompileResult, EnumMode};
use crate::sql::dialect::helpers::is_bare_identifier;

use super::{Condition, ConditionOp, FilterNode, IrScalar, IrValue, QueryIr};

/// Facts derived during validation that lowering reuses.
#[derive(Debug, Clone, Copy)]
pub struct Analysis {
    /// Whether the query aggregates: an explicit aggregate op on any
    /// projection, a non-empty GROUP BY, or a HAVING tree.
    pub aggregated: bool,
}

/// Validate the IR. Returns the aggregation analysis on success.
pub fn validate(
    ir: &QueryIr,
    catalog: &SemanticCatalog,
    enum_mode: EnumMode,
) -> CompileResult<Analysis> {
    if ir.projections.is_empty() {
        return Err(CompileError::EmptyProjection {
            location: "/projections".into(),
        });
    }

    // Projections: entities resolve, aliases are legal and unique.
    let mut seen_aliases: HashMap<&str, usize> = HashMap::new();
    for (i, p) in ir.projections.iter().enumerate() {
        resolve(catalog, &p.entity, || format!("/projections/{i}/entity"))?;
        if let Some(alias) = &p.alias {
            let location = format!("/projections/{i}/alias");
            if !is_bare_identifier(alias) {
                return Err(CompileError::InvalidIr {
                    message: format!("alias '{alias}' is not a valid identifier"),
                    location,
                });
            }
            if seen_aliases.insert(alias.as_str(), i).is_some() {
                return Err(CompileError::InvalidIr {
                    message: format!("duplicate projection alias '{alias}'"),
                    location,
                });
            }
        }
    }

    for (i, g) in ir.group_by.iter().enumerate() {
        resolve(catalog, &g.entity, || format!("/group_by/{i}/entity"))?;
    }

    let aggregated = ir.projections.iter().any(|p| p.op.is_some())
        || !ir.group_by.is_empty()
        || ir.having.is_some();

    // The classic GROUP BY rule: once any projection aggregates, every raw
    // attribute projection must be grouped.
    if aggregated {
        let any_aggregate = ir.projections.iter().any(|p| {
            p.op.is_some()
                || catalog
                    .resolve_entity(&p.entity)
                    .is_some_and(Entity::is_metric)
        });
        if any_aggregate {
            for (i, p) in ir.projections.iter().enumerate() {
                let is_metric = catalog
                    .resolve_entity(&p.entity)
                    .is_some_and(Entity::is_metric);
                if p.op.is_none() && !is_metric && !ir.group_by.iter().any(|g| g.entity == p.entity)
                {
                    return Err(CompileError::GroupByMismatch {
                        entity: p.entity.clone(),
                        location: format!("/projections/{i}/entity"),
                    });
                }
            }
        }
    }

    if let Some(filters) = &ir.filters {
        validate_filter_node(filters, "/filters", catalog, enum_mode)?;
    }

    if let Some(having) = &ir.having {
        let aggregate_aliases: HashSet<&str> = ir
            .projections
            .iter()
            .filter(|p| {
                p.op.is_some()
                    || catalog
                        .resolve_entity(&p.entity)
                        .is_some_and(Entity::is_metric)
            })
            .filter_map(|p| p.alias.as_deref())
            .collect();
        validate_having_node(having, "/having", catalog, &aggregate_aliases)?;
    }

    // ORDER BY fields: entity name or projection alias.
    let aliases: HashSet<&str> = ir
        .projections
        .iter()
        .filter_map(|p| p.alias.as_deref())
        .collect();
    for (i, o) in ir.order_by.iter().enumerate() {
        if catalog.resolve_entity(&o.field).is_none() && !aliases.contains(o.field.as_str()) {
            return Err(CompileError::UnknownAlias {
                name: o.field.clone(),
                location: format!("/order_by/{i}/field"),
            });
        }
    }

    Ok(Analysis { aggregated })
}

fn resolve<'a>(
    catalog: &'a SemanticCatalog,
    name: &str,
    location: impl FnOnce() -> String,
) -> CompileResult<&'a Entity> {
    catalog
        .resolve_entity(name)
        .ok_or_else(|| CompileError::UnknownEntity {
            name: name.to_string(),
            location: location(),
        })
}

fn validate_filter_node(
    node: &FilterNode,
    path: &str,
    catalog: &SemanticCatalog,
    enum_mode: EnumMode,
) -> CompileResult<()> {
    match node {
        FilterNode::Group(group) => {
            if group.conditions.is_empty() {
                return Err(CompileError::InvalidIr {
                    message: "empty AND/OR group".into(),
                    location: format!("{path}/conditions"),
                });
            }
            for (i, child) in group.conditions.iter().enumerate() {
                validate_filter_node(child, &format!("{path}/conditions/{i}"), catalog, enum_mode)?;
            }
            Ok(())
        }
        FilterNode::Leaf(cond) => {
            if cond.entity_alias.is_some() {
                return Err(CompileError::InvalidIr {
                    message: "entity_alias is only valid inside having".into(),
                    location: format!("{path}/entity_alias"),
                });
            }
            let Some(entity_name) = &cond.entity else {
                return Err(CompileError::InvalidIr {
                    message: "condition must name an entity".into(),
                    location: path.to_string(),
                });
            };
            let entity = resolve(catalog, entity_name, || format!("{path}/entity"))?;
            check_value_shape(cond, path)?;
            check_enum_values(entity, cond, path, enum_mode)
        }
    }
}

fn validate_having_node(
    node: &FilterNode,
    path: &str,
    catalog: &SemanticCatalog,
    aggregate_aliases: &HashSet<&str>,
) -> CompileResult<()> {
    match node {
        FilterNode::Group(group) => {
            if group.conditions.is_empty() {
                return Err(CompileError::InvalidIr {
                    message: "empty AND/OR group".into(),
                    location: format!("{path}/conditions"),
                });
            }
            for (i, child) in group.conditions.iter().enumerate() {
                validate_having_node(
                    child,
                    &format!("{path}/conditions/{i}"),
                    catalog,
                    aggregate_aliases,
                )?;
            }
            Ok(())
        }
        FilterNode::Leaf(cond) => {
            match (&cond.entity, &cond.entity_alias) {
                (Some(_), Some(_)) => {
                    return Err(CompileError::InvalidIr {
                        message: "condition cannot name both entity and entity_alias".into(),
                        location: path.to_string(),
                    });
                }
                (None, None) => {
                    return Err(CompileError::InvalidIr {
                        message: "having condition must name an entity or entity_alias".into(),
                        location: path.to_string(),
                    });
                }
                (None, Some(alias)) => {
                    if !aggregate_aliases.contains(alias.as_str()) {
                        return Err(CompileError::UnknownAlias {
                            name: alias.clone(),
                            location: format!("{path}/entity_alias"),
                        });
                    }
                }
                (Some(entity_name), None) => {
                    let entity = resolve(catalog, entity_name, || format!("{path}/entity"))?;
                    if !entity.is_metric() {
                        return Err(CompileError::InvalidIr {
                            message: format!(
                                "having may only reference aggregate aliases or metrics, \
                                 '{entity_name}' is an attribute"
                            ),
                            location: format!("{path}/entity"),
                        });
                    }
                }
            }
            // LIKE-family and temporal operators have no meaning over an
            // aggregated value.
            if !cond.op.is_comparison()
                && !matches!(
                    cond.op,
                    ConditionOp::In
                        | ConditionOp::NotIn
                        | ConditionOp::IsNull
                        | ConditionOp::IsNotNull
                )
            {
                return Err(CompileError::UnsupportedOperator {
                    op: cond.op.as_str().into(),
                    location: format!("{path}/op"),
                });
            }
            check_value_shape(cond, path)
        }
    }
}

fn check_value_shape(cond: &Condition, path: &str) -> CompileResult<()> {
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
        | ConditionOp::Lte => match &cond.value {
            Some(IrValue::Scalar(_)) => Ok(()),
            Some(IrValue::List(_)) => Err(mismatch("expected a scalar, got a list")),
            None => Err(mismatch("expected a scalar value")),
        },

        ConditionOp::In | ConditionOp::NotIn => match &cond.value {
            Some(IrValue::List(items)) if !items.is_empty() => Ok(()),
            Some(IrValue::List(_)) => Err(mismatch("expected a non-empty list")),
            Some(IrValue::Scalar(_)) => Err(mismatch("expected a list, got a scalar")),
            None => Err(mismatch("expected a list of values")),
        },

        ConditionOp::IsNull
        | ConditionOp::IsNotNull
        | ConditionOp::LastMonth
        | ConditionOp::ThisYear => match &cond.value {
            None => Ok(()),
            Some(_) => Err(mismatch("operator takes no value")),
        },

        ConditionOp::Contains | ConditionOp::StartsWith | ConditionOp::EndsWith => {
            match &cond.value {
                Some(IrValue::Scalar(IrScalar::String(_))) => Ok(()),
                Some(_) => Err(mismatch("expected a string")),
                None => Err(mismatch("expected a string value")),
            }
        }

        ConditionOp::LastNDays => match &cond.value {
            Some(IrValue::Scalar(IrScalar::Int(n))) if *n >= 1 => Ok(()),
            Some(IrValue::Scalar(IrScalar::Int(_))) => {
                Err(mismatch("expected a positive number of days"))
            }
            Some(_) => Err(mismatch("expected an integer number of days")),
            None => Err(mismatch("expected a number of days")),
        },
    }
}

fn check_enum_values(
    entity: &Entity,
    cond: &Condition,
    path: &str,
    enum_mode: EnumMode,
) -> CompileResult<()> {
    let Some(allowed) = entity.enum_values() else {
        return Ok(());
    };
    if !matches!(
        cond.op,
        ConditionOp::Equal | ConditionOp::NotEqual | ConditionOp::In | ConditionOp::NotIn
    ) {
        return Ok(());
    }

    let literals: Vec<&IrScalar> = match &cond.value {
        Some(IrValue::Scalar(s)) => vec![s],
        Some(IrValue::List(items)) => items.iter().collect(),
        None => return Ok(()),
    };

    for literal in literals {
        let IrScalar::String(s) = literal else {
            continue;
        };
        if allowed.contains(s) {
            continue;
        }
        match enum_mode {
            EnumMode::Reject => {
                return Err(CompileError::EnumValueRejected {
                    entity: entity.name.clone(),
                    value: s.clone(),
                    location: format!("{path}/value"),
                });
            }
            EnumMode::Warn => {
                tracing::warn!(
                    entity = %entity.name,
                    value = %s,
                    "literal outside the attribute's enum values"
                );
            }
        }
    }
    Ok(())
}
