//! Ordered entity-reference collection.
//!
//! The join planner's driving table and alias numbering depend on the order
//! entities are first referenced in the IR: projections left-to-right, then
//! the filter tree in pre-order, then group_by, having, order_by. This walk
//! produces that order together with a JSON-pointer path per reference, so
//! later errors (an unreachable table, say) can point at the reference that
//! pulled the table in.

use super::{Condition, FilterNode, QueryIr};

/// A single entity reference found in the IR.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRef {
    /// Referenced name.
    pub name: String,
    /// JSON-pointer path to the reference.
    pub path: String,
    /// True when the name may legitimately be a projection alias rather
    /// than an entity (ORDER BY fields).
    pub maybe_alias: bool,
}

/// Collect every entity reference in IR walk order.
pub fn entity_refs(ir: &QueryIr) -> Vec<EntityRef> {
    let mut refs = Vec::new();

    for (i, p) in ir.projections.iter().enumerate() {
        refs.push(EntityRef {
            name: p.entity.clone(),
            path: format!("/projections/{i}/entity"),
            maybe_alias: false,
        });
    }

    if let Some(filters) = &ir.filters {
        walk_filter_node(filters, "/filters", &mut refs);
    }

    for (i, g) in ir.group_by.iter().enumerate() {
        refs.push(EntityRef {
            name: g.entity.clone(),
            path: format!("/group_by/{i}/entity"),
            maybe_alias: false,
        });
    }

    if let Some(having) = &ir.having {
        walk_filter_node(having, "/having", &mut refs);
    }

    for (i, o) in ir.order_by.iter().enumerate() {
        refs.push(EntityRef {
            name: o.field.clone(),
            path: format!("/order_by/{i}/field"),
            maybe_alias: true,
        });
    }

    refs
}

fn walk_filter_node(node: &FilterNode, path: &str, refs: &mut Vec<EntityRef>) {
    match node {
        FilterNode::Group(group) => {
            for (i, child) in group.conditions.iter().enumerate() {
                walk_filter_node(child, &format!("{path}/conditions/{i}"), refs);
            }
        }
        FilterNode::Leaf(Condition {
            entity: Some(entity),
            ..
        }) => {
            refs.push(EntityRef {
                name: entity.clone(),
                path: format!("{path}/entity"),
                maybe_alias: false,
            });
        }
        // Alias leaves (having) reference no entity.
        FilterNode::Leaf(_) => {}
    }
}
