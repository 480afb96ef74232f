//! Catalog document ingestion.
//!
//! The semantic layer is configured with a json5 document (comments
//! permitted) holding three sections:
//!
//! ```json5
//! {
//!   entities: {
//!     // business name -> physical binding
//!     product_name: { type: "attribute", table: "products", column: "name" },
//!     sales_amount: {
//!       type: "metric",
//!       expression: "order_items.quantity * order_items.unit_price",
//!       tables: ["order_items"],
//!       default_agg: "SUM",
//!     },
//!   },
//!   foreign_keys: [
//!     // declaration order is the join-planner tie-break order
//!     { left_table: "customers", left_column: "id",
//!       right_table: "orders", right_column: "customer_id" },
//!   ],
//!   tables: {
//!     // optional: declares physical columns for load-time validation
//!     products: ["id", "name"],
//!   },
//! }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

use super::Aggregation;

/// Top-level catalog document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogDocument {
    /// Entity name to definition.
    pub entities: BTreeMap<String, EntityDocument>,

    /// Foreign-key edges, in tie-break priority order.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDocument>,

    /// Optional enumeration of physical tables and their columns.
    /// When present, every column reference in the document is checked
    /// against it at load time.
    #[serde(default)]
    pub tables: Option<BTreeMap<String, Vec<String>>>,
}

/// An entity definition: attribute or metric.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntityDocument {
    Attribute {
        table: String,
        column: String,
        /// Legal literal values for this attribute, if constrained.
        #[serde(default)]
        enum_values: Option<Vec<String>>,
    },
    Metric {
        /// SQL fragment over physical `table.column` references.
        expression: String,
        /// Tables the expression touches.
        tables: Vec<String>,
        /// Aggregation applied when the metric is projected implicitly.
        default_agg: Aggregation,
    },
}

/// An undirected foreign-key edge between two physical columns.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForeignKeyDocument {
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_with_comments() {
        let doc: CatalogDocument = json5::from_str(
            r#"{
                entities: {
                    // an attribute
                    region: { type: "attribute", table: "customers", column: "region" },
                },
                foreign_keys: [],
            }"#,
        )
        .unwrap();
        assert_eq!(doc.entities.len(), 1);
        assert!(doc.tables.is_none());
    }

    #[test]
    fn test_unknown_section_rejected() {
        let err = json5::from_str::<CatalogDocument>(
            r#"{ entities: {}, relationships: [] }"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_metric_document() {
        let doc: CatalogDocument = json5::from_str(
            r#"{
                entities: {
                    sales_amount: {
                        type: "metric",
                        expression: "order_items.quantity * order_items.unit_price",
                        tables: ["order_items"],
                        default_agg: "SUM",
                    },
                },
            }"#,
        )
        .unwrap();
        match &doc.entities["sales_amount"] {
            EntityDocument::Metric { default_agg, .. } => {
                assert_eq!(*default_agg, Aggregation::Sum)
            }
            other => panic!("expected metric, got {other:?}"),
        }
    }
}
