//! Semantic catalog - the declarative layer between business names and the
//! physical schema.
//!
//! The catalog maps entity names (attributes and metrics) to physical
//! tables and columns, and carries the undirected foreign-key graph the
//! join planner walks. It is built once from a [`CatalogDocument`] and is
//! read-only afterwards; compilation never mutates it, so a single catalog
//! can be shared across threads.

pub mod document;
pub(crate) mod metric_expr;

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::{NodeIndex, UnGraph};
use serde::Deserialize;
use thiserror::Error;

use crate::sql::dialect::helpers::is_bare_identifier;
use crate::sql::expr::{func, Expr};

pub use document::{CatalogDocument, EntityDocument, ForeignKeyDocument};

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while building a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Duplicate entity: '{0}'")]
    DuplicateEntity(String),

    #[error("Invalid identifier '{ident}' in {context}")]
    InvalidIdentifier { ident: String, context: String },

    #[error("Unknown table '{table}' referenced by {context}")]
    UnknownTable { table: String, context: String },

    #[error("Unknown column '{table}.{column}' referenced by {context}")]
    UnknownColumn {
        table: String,
        column: String,
        context: String,
    },

    #[error("Malformed foreign key #{index}: {message}")]
    MalformedForeignKey { index: usize, message: String },

    #[error("Metric '{metric}': {message}")]
    MetricExpression { metric: String, message: String },

    #[error("Catalog document error: {0}")]
    Document(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

// ============================================================================
// Aggregation
// ============================================================================

/// Aggregation functions a metric may declare as its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl Aggregation {
    /// SQL function name.
    pub fn function_name(&self) -> &'static str {
        match self {
            Aggregation::Sum => "SUM",
            Aggregation::Count => "COUNT",
            Aggregation::Avg => "AVG",
            Aggregation::Min => "MIN",
            Aggregation::Max => "MAX",
        }
    }

    /// Wrap an expression in this aggregation.
    pub fn apply(&self, expr: Expr) -> Expr {
        func(self.function_name(), vec![expr])
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A business-level name bound to physical schema elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
}

/// The two entity kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    /// A single physical column, optionally constrained to a value set.
    Attribute {
        table: String,
        column: String,
        enum_values: Option<BTreeSet<String>>,
    },
    /// A computed expression over one or more tables, with a default
    /// aggregation for implicit use in projections.
    Metric {
        expression: Expr,
        tables: Vec<String>,
        default_agg: Aggregation,
    },
}

impl Entity {
    /// Whether this entity is a metric.
    pub fn is_metric(&self) -> bool {
        matches!(self.kind, EntityKind::Metric { .. })
    }

    /// The physical tables this entity touches, in declaration order.
    pub fn tables(&self) -> Vec<&str> {
        match &self.kind {
            EntityKind::Attribute { table, .. } => vec![table.as_str()],
            EntityKind::Metric { tables, .. } => tables.iter().map(String::as_str).collect(),
        }
    }

    /// The enum value constraint, if this is a constrained attribute.
    pub fn enum_values(&self) -> Option<&BTreeSet<String>> {
        match &self.kind {
            EntityKind::Attribute { enum_values, .. } => enum_values.as_ref(),
            EntityKind::Metric { .. } => None,
        }
    }
}

// ============================================================================
// Foreign Keys
// ============================================================================

/// An undirected foreign-key edge between two physical columns.
///
/// Declaration order doubles as the join-planner tie-break order.
#[derive(Debug, Clone, PartialEq)]
pub struct FkEdge {
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
}

impl FkEdge {
    /// The column this edge uses on the given table, if the table is an
    /// endpoint.
    pub fn column_on(&self, table: &str) -> Option<&str> {
        if self.left_table == table {
            Some(&self.left_column)
        } else if self.right_table == table {
            Some(&self.right_column)
        } else {
            None
        }
    }

    /// The endpoint opposite the given table, if the table is an endpoint.
    pub fn other_side(&self, table: &str) -> Option<&str> {
        if self.left_table == table {
            Some(&self.right_table)
        } else if self.right_table == table {
            Some(&self.left_table)
        } else {
            None
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// The semantic catalog: entities plus the foreign-key graph.
#[derive(Debug, Clone)]
pub struct SemanticCatalog {
    entities: HashMap<String, Entity>,
    foreign_keys: Vec<FkEdge>,
    graph: UnGraph<String, usize>,
    node_index: HashMap<String, NodeIndex>,
}

impl SemanticCatalog {
    /// Load a catalog from a json5 document string.
    pub fn from_json5(src: &str) -> CatalogResult<Self> {
        let doc: CatalogDocument =
            json5::from_str(src).map_err(|e| CatalogError::Document(e.to_string()))?;
        Self::from_document(doc)
    }

    /// Build a catalog from a parsed document.
    pub fn from_document(doc: CatalogDocument) -> CatalogResult<Self> {
        let mut entities = Vec::with_capacity(doc.entities.len());
        for (name, entity_doc) in doc.entities {
            let kind = match entity_doc {
                EntityDocument::Attribute {
                    table,
                    column,
                    enum_values,
                } => EntityKind::Attribute {
                    table,
                    column,
                    enum_values: enum_values.map(|vs| vs.into_iter().collect()),
                },
                EntityDocument::Metric {
                    expression,
                    tables,
                    default_agg,
                } => {
                    let expression = metric_expr::parse_metric_expression(&expression)
                        .map_err(|message| CatalogError::MetricExpression {
                            metric: name.clone(),
                            message,
                        })?;
                    EntityKind::Metric {
                        expression,
                        tables,
                        default_agg,
                    }
                }
            };
            entities.push(Entity { name, kind });
        }

        let foreign_keys = doc
            .foreign_keys
            .into_iter()
            .map(|fk| FkEdge {
                left_table: fk.left_table,
                left_column: fk.left_column,
                right_table: fk.right_table,
                right_column: fk.right_column,
            })
            .collect();

        let tables = doc.tables.map(|ts| {
            ts.into_iter()
                .map(|(name, cols)| (name, cols.into_iter().collect()))
                .collect()
        });

        Self::new(entities, foreign_keys, tables)
    }

    /// Build a catalog from parts, validating every reference.
    pub fn new(
        entity_list: Vec<Entity>,
        foreign_keys: Vec<FkEdge>,
        tables: Option<HashMap<String, BTreeSet<String>>>,
    ) -> CatalogResult<Self> {
        if let Some(declared) = &tables {
            for (table, columns) in declared {
                check_identifier(table, "tables")?;
                for column in columns {
                    check_identifier(column, &format!("table '{table}'"))?;
                }
            }
        }

        let mut entities: HashMap<String, Entity> = HashMap::with_capacity(entity_list.len());
        for entity in entity_list {
            check_identifier(&entity.name, "entities")?;
            validate_entity(&entity, tables.as_ref())?;
            let name = entity.name.clone();
            if entities.insert(name.clone(), entity).is_some() {
                return Err(CatalogError::DuplicateEntity(name));
            }
        }

        for (index, fk) in foreign_keys.iter().enumerate() {
            validate_foreign_key(index, fk, tables.as_ref())?;
        }

        // Build the undirected FK graph. Edge weights are declaration
        // indices; the planner sorts incident edges by weight so FK order
        // stays the tie-break.
        let mut graph = UnGraph::new_undirected();
        let mut node_index = HashMap::new();

        let intern = |graph: &mut UnGraph<String, usize>,
                          node_index: &mut HashMap<String, NodeIndex>,
                          table: &str| {
            *node_index
                .entry(table.to_string())
                .or_insert_with(|| graph.add_node(table.to_string()))
        };

        if let Some(declared) = &tables {
            for table in declared.keys() {
                intern(&mut graph, &mut node_index, table);
            }
        }
        for entity in entities.values() {
            for table in entity.tables() {
                intern(&mut graph, &mut node_index, table);
            }
        }
        for (index, fk) in foreign_keys.iter().enumerate() {
            let left = intern(&mut graph, &mut node_index, &fk.left_table);
            let right = intern(&mut graph, &mut node_index, &fk.right_table);
            graph.add_edge(left, right, index);
        }

        Ok(Self {
            entities,
            foreign_keys,
            graph,
            node_index,
        })
    }

    /// Look up an entity by name.
    pub fn resolve_entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Whether a physical table is known to the catalog.
    pub fn contains_table(&self, table: &str) -> bool {
        self.node_index.contains_key(table)
    }

    /// The foreign-key edges in declaration order.
    pub fn foreign_keys(&self) -> &[FkEdge] {
        &self.foreign_keys
    }

    /// Number of entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// FK edges incident to a table, sorted by declaration index.
    ///
    /// Each item is `(declaration_index, edge)`.
    pub(crate) fn incident_edges(&self, table: &str) -> Vec<(usize, &FkEdge)> {
        let Some(&idx) = self.node_index.get(table) else {
            return Vec::new();
        };
        let mut edges: Vec<(usize, &FkEdge)> = self
            .graph
            .edges(idx)
            .map(|e| (*e.weight(), &self.foreign_keys[*e.weight()]))
            .collect();
        edges.sort_by_key(|(index, _)| *index);
        edges
    }
}

fn check_identifier(ident: &str, context: &str) -> CatalogResult<()> {
    if is_bare_identifier(ident) {
        Ok(())
    } else {
        Err(CatalogError::InvalidIdentifier {
            ident: ident.to_string(),
            context: context.to_string(),
        })
    }
}

fn check_column_exists(
    declared: Option<&HashMap<String, BTreeSet<String>>>,
    table: &str,
    column: &str,
    context: &str,
) -> CatalogResult<()> {
    let Some(declared) = declared else {
        return Ok(());
    };
    let Some(columns) = declared.get(table) else {
        return Err(CatalogError::UnknownTable {
            table: table.to_string(),
            context: context.to_string(),
        });
    };
    if columns.contains(column) {
        Ok(())
    } else {
        Err(CatalogError::UnknownColumn {
            table: table.to_string(),
            column: column.to_string(),
            context: context.to_string(),
        })
    }
}

fn validate_entity(
    entity: &Entity,
    declared: Option<&HashMap<String, BTreeSet<String>>>,
) -> CatalogResult<()> {
    let context = format!("entity '{}'", entity.name);
    match &entity.kind {
        EntityKind::Attribute { table, column, .. } => {
            check_identifier(table, &context)?;
            check_identifier(column, &context)?;
            check_column_exists(declared, table, column, &context)
        }
        EntityKind::Metric {
            expression, tables, ..
        } => {
            if tables.is_empty() {
                return Err(CatalogError::MetricExpression {
                    metric: entity.name.clone(),
                    message: "metric must declare at least one table".into(),
                });
            }
            for table in tables {
                check_identifier(table, &context)?;
                if let Some(declared) = declared {
                    if !declared.contains_key(table) {
                        return Err(CatalogError::UnknownTable {
                            table: table.clone(),
                            context: context.clone(),
                        });
                    }
                }
            }
            for (table, column) in metric_expr::column_slots(expression) {
                if !tables.iter().any(|t| *t == table) {
                    return Err(CatalogError::MetricExpression {
                        metric: entity.name.clone(),
                        message: format!(
                            "expression references table '{table}' outside the declared tables"
                        ),
                    });
                }
                check_column_exists(declared, &table, &column, &context)?;
            }
            Ok(())
        }
    }
}

fn validate_foreign_key(
    index: usize,
    fk: &FkEdge,
    declared: Option<&HashMap<String, BTreeSet<String>>>,
) -> CatalogResult<()> {
    let context = format!("foreign key #{index}");
    for ident in [
        &fk.left_table,
        &fk.left_column,
        &fk.right_table,
        &fk.right_column,
    ] {
        check_identifier(ident, &context)?;
    }
    if fk.left_table == fk.right_table {
        return Err(CatalogError::MalformedForeignKey {
            index,
            message: format!("self-referential edge on table '{}'", fk.left_table),
        });
    }
    check_column_exists(declared, &fk.left_table, &fk.left_column, &context)?;
    check_column_exists(declared, &fk.right_table, &fk.right_column, &context)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> SemanticCatalog {
        SemanticCatalog::from_json5(
            r#"{
                entities: {
                    product_name: { type: "attribute", table: "products", column: "name" },
                    region: {
                        type: "attribute",
                        table: "customers",
                        column: "region",
                        enum_values: ["中国", "美国"],
                    },
                    sales_amount: {
                        type: "metric",
                        expression: "order_items.quantity * order_items.unit_price",
                        tables: ["order_items"],
                        default_agg: "SUM",
                    },
                },
                foreign_keys: [
                    { left_table: "customers", left_column: "id",
                      right_table: "orders", right_column: "customer_id" },
                    { left_table: "orders", left_column: "id",
                      right_table: "order_items", right_column: "order_id" },
                    { left_table: "order_items", left_column: "product_id",
                      right_table: "products", right_column: "id" },
                ],
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_entity() {
        let catalog = sample_catalog();
        assert!(catalog.resolve_entity("region").is_some());
        assert!(catalog.resolve_entity("nope").is_none());
        assert!(catalog.resolve_entity("sales_amount").unwrap().is_metric());
    }

    #[test]
    fn test_tables_of() {
        let catalog = sample_catalog();
        assert_eq!(
            catalog.resolve_entity("product_name").unwrap().tables(),
            vec!["products"]
        );
        assert_eq!(
            catalog.resolve_entity("sales_amount").unwrap().tables(),
            vec!["order_items"]
        );
    }

    #[test]
    fn test_enum_values() {
        let catalog = sample_catalog();
        let region = catalog.resolve_entity("region").unwrap();
        let values = region.enum_values().unwrap();
        assert!(values.contains("中国"));
        assert!(catalog
            .resolve_entity("product_name")
            .unwrap()
            .enum_values()
            .is_none());
    }

    #[test]
    fn test_incident_edges_in_declaration_order() {
        let catalog = sample_catalog();
        let edges = catalog.incident_edges("orders");
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].0, 0);
        assert_eq!(edges[1].0, 1);
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        let err = SemanticCatalog::from_json5(
            r#"{
                entities: {
                    bad: { type: "attribute", table: "order items", column: "id" },
                },
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_dangling_column_rejected_when_tables_declared() {
        let err = SemanticCatalog::from_json5(
            r#"{
                entities: {
                    name: { type: "attribute", table: "products", column: "label" },
                },
                tables: { products: ["id", "name"] },
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownColumn { .. }));
    }

    #[test]
    fn test_metric_outside_declared_tables_rejected() {
        let err = SemanticCatalog::from_json5(
            r#"{
                entities: {
                    m: {
                        type: "metric",
                        expression: "orders.total * order_items.quantity",
                        tables: ["orders"],
                        default_agg: "SUM",
                    },
                },
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::MetricExpression { .. }));
    }

    #[test]
    fn test_self_referential_fk_rejected() {
        let err = SemanticCatalog::from_json5(
            r#"{
                entities: {},
                foreign_keys: [
                    { left_table: "a", left_column: "x",
                      right_table: "a", right_column: "y" },
                ],
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::MalformedForeignKey { .. }));
    }
}
