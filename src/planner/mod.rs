//! Join planning over the foreign-key graph.
//!
//! Given the physical tables an IR references (in first-reference order),
//! the planner picks the first as the driving table and runs a breadth-first
//! expansion over the catalog's FK graph to connect the rest. Tables that no
//! entity references but that sit on the only path between referenced tables
//! (bridge tables) join the plan too. The expansion advances one whole layer
//! at a time; all edges leaving the current frontier compete together, and
//! ties break on FK declaration order, so identical IRs always produce
//! byte-identical SQL.
//!
//! Aliases `t1, t2, …` are assigned in order of inclusion; the driving
//! table is always `t1`.

use std::collections::{HashMap, HashSet};

use crate::catalog::SemanticCatalog;
use crate::compile::{CompileError, CompileResult};

/// A table the IR needs, with the JSON-pointer of its first reference.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRequirement {
    pub table: String,
    pub location: String,
}

/// A planned table with its assigned alias.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTable {
    pub table: String,
    pub alias: String,
}

/// One JOIN step: `INNER JOIN <table> AS <alias> ON <left_alias>.<left_column> = <alias>.<right_column>`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedJoin {
    pub table: String,
    pub alias: String,
    /// Alias of the earlier-planned table the edge connects back to.
    pub left_alias: String,
    pub left_column: String,
    pub right_column: String,
}

/// The complete join plan.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlan {
    /// All participating tables in inclusion order; `tables[0]` drives.
    pub tables: Vec<PlannedTable>,
    /// Join steps in emission order.
    pub joins: Vec<PlannedJoin>,
    aliases: HashMap<String, String>,
}

impl JoinPlan {
    /// The driving table.
    pub fn driving_table(&self) -> &PlannedTable {
        &self.tables[0]
    }

    /// Alias assigned to a physical table, if it participates.
    pub fn alias_of(&self, table: &str) -> Option<&str> {
        self.aliases.get(table).map(String::as_str)
    }

    /// Table-to-alias map, for metric expression rewriting.
    pub fn alias_map(&self) -> &HashMap<String, String> {
        &self.aliases
    }
}

/// Compute the join plan for the given required tables.
///
/// `required` must be deduplicated and in IR first-reference order; the
/// first entry becomes the driving table.
pub fn plan_joins(
    required: &[TableRequirement],
    catalog: &SemanticCatalog,
) -> CompileResult<JoinPlan> {
    let Some(first) = required.first() else {
        return Err(CompileError::EmptyProjection {
            location: "/projections".into(),
        });
    };

    let mut plan = JoinPlan {
        tables: Vec::with_capacity(required.len()),
        joins: Vec::new(),
        aliases: HashMap::new(),
    };
    include_table(&mut plan, &first.table);

    if required.len() == 1 {
        return Ok(plan);
    }

    // BFS from the driving table, one layer at a time. `parent` records,
    // for every table reached, the table and FK edge it was discovered
    // through. All edges leaving the current frontier are gathered and
    // resolved in declaration order, so when two branches can claim the
    // same new table in the same hop, the earliest-declared edge wins
    // regardless of which branch entered the frontier first.
    let mut parent: HashMap<String, (String, usize)> = HashMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(first.table.clone());

    let mut remaining: HashSet<&str> = required[1..].iter().map(|r| r.table.as_str()).collect();
    remaining.remove(first.table.as_str());

    let mut frontier: Vec<String> = vec![first.table.clone()];
    while !frontier.is_empty() && !remaining.is_empty() {
        let mut layer_edges: Vec<(usize, String)> = Vec::new();
        for table in &frontier {
            for (edge_index, _) in catalog.incident_edges(table) {
                layer_edges.push((edge_index, table.clone()));
            }
        }
        layer_edges.sort_by_key(|(index, _)| *index);

        let mut next_frontier: Vec<String> = Vec::new();
        for (edge_index, from) in layer_edges {
            let edge = &catalog.foreign_keys()[edge_index];
            let Some(neighbor) = edge.other_side(&from) else {
                continue;
            };
            if visited.contains(neighbor) {
                continue;
            }
            visited.insert(neighbor.to_string());
            parent.insert(neighbor.to_string(), (from, edge_index));
            remaining.remove(neighbor);
            next_frontier.push(neighbor.to_string());
        }
        frontier = next_frontier;
    }

    // Wire every required table into the plan along its BFS path, adding
    // bridge tables as they appear. Walking required tables in IR order
    // keeps alias numbering stable.
    for requirement in &required[1..] {
        if plan.alias_of(&requirement.table).is_some() {
            continue;
        }
        if !visited.contains(requirement.table.as_str()) {
            return Err(CompileError::DisconnectedJoinGraph {
                table: requirement.table.clone(),
                location: requirement.location.clone(),
            });
        }

        // Reconstruct driving-table -> requirement path.
        let mut path: Vec<(String, usize)> = Vec::new();
        let mut cursor = requirement.table.clone();
        while let Some((from, edge_index)) = parent.get(&cursor) {
            path.push((cursor.clone(), *edge_index));
            cursor = from.clone();
        }
        path.reverse();

        for (table, edge_index) in path {
            if plan.alias_of(&table).is_some() {
                continue;
            }
            let edge = &catalog.foreign_keys()[edge_index];
            let (from_table, _) = &parent[&table];
            let left_alias = plan
                .alias_of(from_table)
                .expect("BFS parent is planned before its children")
                .to_string();
            let left_column = edge
                .column_on(from_table)
                .expect("edge endpoint matches BFS parent")
                .to_string();
            let right_column = edge
                .column_on(&table)
                .expect("edge endpoint matches joined table")
                .to_string();

            let alias = include_table(&mut plan, &table);
            plan.joins.push(PlannedJoin {
                table,
                alias,
                left_alias,
                left_column,
                right_column,
            });
        }
    }

    tracing::debug!(
        driving = %plan.tables[0].table,
        joins = plan.joins.len(),
        "join plan computed"
    );

    Ok(plan)
}

fn include_table(plan: &mut JoinPlan, table: &str) -> String {
    let alias = format!("t{}", plan.tables.len() + 1);
    plan.tables.push(PlannedTable {
        table: table.to_string(),
        alias: alias.clone(),
    });
    plan.aliases.insert(table.to_string(), alias.clone());
    alias
}
