//! Integration tests for the end-to-end IR → SQL compilation pipeline.
//!
//! Expected SQL is compared after whitespace normalization; clause order
//! and token content are exact. The clock is pinned wherever a temporal
//! operator is involved.

use chrono::NaiveDate;
use glossa::catalog::SemanticCatalog;
use glossa::compile::{compile, CompileError, CompileOptions, EnumMode};
use glossa::ir::QueryIr;
use glossa::lowering::QueryClock;
use glossa::sql::Dialect;

const SALES_CATALOG: &str = r#"{
    entities: {
        product_name: { type: "attribute", table: "products", column: "name" },
        customer_name: { type: "attribute", table: "customers", column: "name" },
        region: {
            type: "attribute",
            table: "customers",
            column: "region",
            enum_values: ["中国", "美国"],
        },
        is_vip: { type: "attribute", table: "customers", column: "is_vip" },
        order_date: { type: "attribute", table: "orders", column: "order_date" },
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
    tables: {
        products: ["id", "name"],
        customers: ["id", "name", "region", "is_vip"],
        orders: ["id", "customer_id", "order_date"],
        order_items: ["id", "order_id", "product_id", "quantity", "unit_price"],
    },
}"#;

fn sales_catalog() -> SemanticCatalog {
    SemanticCatalog::from_json5(SALES_CATALOG).expect("catalog loads")
}

fn flat(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compile_sql(ir_json: &str) -> String {
    compile_with(ir_json, CompileOptions::default()).expect("IR compiles")
}

fn compile_with(ir_json: &str, options: CompileOptions) -> Result<String, CompileError> {
    let ir = QueryIr::from_json(ir_json).expect("IR JSON parses");
    compile(&ir, &sales_catalog(), options).map(|output| flat(&output.sql))
}

fn compile_err(ir_json: &str) -> CompileError {
    compile_with(ir_json, CompileOptions::default()).expect_err("expected a compile error")
}

fn fixed_clock(y: i32, m: u32, d: u32) -> QueryClock {
    QueryClock::fixed(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

// ============================================================================
// Seed Scenarios
// ============================================================================

#[test]
fn s1_basic_projection_with_filter() {
    let sql = compile_sql(
        r#"{
            "projections": [{ "entity": "product_name" }],
            "filters": { "entity": "product_name", "op": "CONTAINS", "value": "电脑" }
        }"#,
    );
    assert_eq!(
        sql,
        "SELECT t1.name FROM products AS t1 WHERE t1.name LIKE '%电脑%'"
    );
}

#[test]
fn s2_aggregation_with_join() {
    let sql = compile_sql(
        r#"{
            "projections": [
                { "entity": "region" },
                { "entity": "sales_amount", "alias": "total_sales" }
            ],
            "group_by": [{ "entity": "region" }],
            "filters": { "entity": "region", "op": "EQUAL", "value": "中国" },
            "order_by": [{ "field": "total_sales", "direction": "DESC" }],
            "limit": 10
        }"#,
    );
    assert_eq!(
        sql,
        "SELECT t1.region, SUM(t3.quantity * t3.unit_price) AS total_sales \
         FROM customers AS t1 \
         INNER JOIN orders AS t2 ON t1.id = t2.customer_id \
         INNER JOIN order_items AS t3 ON t2.id = t3.order_id \
         WHERE t1.region = '中国' \
         GROUP BY t1.region \
         ORDER BY total_sales DESC \
         LIMIT 10"
    );
}

#[test]
fn s3_nested_boolean_filter() {
    let sql = compile_sql(
        r#"{
            "projections": [{ "entity": "region" }],
            "filters": {
                "operator": "AND",
                "conditions": [
                    { "entity": "region", "op": "IN", "value": ["中国", "美国"] },
                    {
                        "operator": "OR",
                        "conditions": [
                            { "entity": "sales_amount", "op": "GREATER_THAN", "value": 1000 },
                            { "entity": "product_name", "op": "IS_NULL" }
                        ]
                    }
                ]
            }
        }"#,
    );
    assert_eq!(
        sql,
        "SELECT t1.region \
         FROM customers AS t1 \
         INNER JOIN orders AS t2 ON t1.id = t2.customer_id \
         INNER JOIN order_items AS t3 ON t2.id = t3.order_id \
         INNER JOIN products AS t4 ON t3.product_id = t4.id \
         WHERE (t1.region IN ('中国', '美国')) AND \
         ((t3.quantity * t3.unit_price) > 1000 OR t4.name IS NULL)"
    );
}

#[test]
fn s4_having_references_alias() {
    let sql = compile_sql(
        r#"{
            "projections": [
                { "entity": "region" },
                { "entity": "sales_amount", "op": "SUM", "alias": "total_sales" }
            ],
            "group_by": [{ "entity": "region" }],
            "having": { "entity_alias": "total_sales", "op": "GREATER_THAN", "value": 1000 }
        }"#,
    );
    assert!(sql.ends_with("GROUP BY t1.region HAVING total_sales > 1000"));
    // The alias is never re-qualified with a table alias.
    assert!(!sql.contains(".total_sales"));
}

#[test]
fn s5_disconnected_join_graph() {
    // Same schema, but no edge reaches the order chain from customers.
    let catalog = SemanticCatalog::from_json5(
        r#"{
            entities: {
                region: { type: "attribute", table: "customers", column: "region" },
                sales_amount: {
                    type: "metric",
                    expression: "order_items.quantity * order_items.unit_price",
                    tables: ["order_items"],
                    default_agg: "SUM",
                },
            },
            foreign_keys: [
                { left_table: "orders", left_column: "id",
                  right_table: "order_items", right_column: "order_id" },
            ],
        }"#,
    )
    .unwrap();

    let ir = QueryIr::from_json(
        r#"{
            "projections": [
                { "entity": "region" },
                { "entity": "sales_amount", "alias": "total_sales" }
            ],
            "group_by": [{ "entity": "region" }]
        }"#,
    )
    .unwrap();

    let err = compile(&ir, &catalog, CompileOptions::default()).unwrap_err();
    match &err {
        CompileError::DisconnectedJoinGraph { table, location } => {
            assert_eq!(table, "order_items");
            assert_eq!(location, "/projections/1/entity");
        }
        other => panic!("expected DisconnectedJoinGraph, got {other:?}"),
    }
    assert_eq!(err.kind(), "DisconnectedJoinGraph");
}

#[test]
fn s6_sqlserver_pagination_without_order_by_is_an_error() {
    let err = compile_with(
        r#"{
            "projections": [{ "entity": "product_name" }],
            "limit": 10,
            "offset": 20
        }"#,
        CompileOptions::default().with_dialect(Dialect::SqlServer),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "DialectRequiresOrderBy");
    assert!(err.location().is_none());
}

#[test]
fn s6_sqlserver_pagination_with_order_by() {
    let sql = compile_with(
        r#"{
            "projections": [{ "entity": "product_name" }],
            "order_by": [{ "field": "product_name" }],
            "limit": 10,
            "offset": 20
        }"#,
        CompileOptions::default().with_dialect(Dialect::SqlServer),
    )
    .unwrap();
    assert_eq!(
        sql,
        "SELECT t1.name FROM products AS t1 ORDER BY t1.name ASC \
         OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
    );
}

// ============================================================================
// Boundary Behaviors
// ============================================================================

#[test]
fn single_table_query_has_no_join() {
    let sql = compile_sql(r#"{ "projections": [{ "entity": "product_name" }] }"#);
    assert_eq!(sql, "SELECT t1.name FROM products AS t1");
    assert!(!sql.contains("JOIN"));
}

#[test]
fn limit_zero_is_preserved() {
    let sql = compile_sql(
        r#"{ "projections": [{ "entity": "product_name" }], "limit": 0 }"#,
    );
    assert!(sql.ends_with("LIMIT 0"));
}

#[test]
fn offset_without_limit_is_rendered() {
    let sql = compile_sql(
        r#"{ "projections": [{ "entity": "product_name" }], "offset": 5 }"#,
    );
    assert!(sql.ends_with("OFFSET 5"));
    assert!(!sql.contains("LIMIT"));
}

#[test]
fn empty_filter_tree_omits_where() {
    let sql = compile_sql(r#"{ "projections": [{ "entity": "region" }] }"#);
    assert!(!sql.contains("WHERE"));
}

#[test]
fn last_month_window_from_fixed_clock() {
    let sql = compile_with(
        r#"{
            "projections": [{ "entity": "order_date" }],
            "filters": { "entity": "order_date", "op": "LAST_MONTH" }
        }"#,
        CompileOptions::default().with_clock(fixed_clock(2025, 10, 15)),
    )
    .unwrap();
    assert_eq!(
        sql,
        "SELECT t1.order_date FROM orders AS t1 \
         WHERE t1.order_date BETWEEN '2025-09-01' AND '2025-09-30'"
    );
}

#[test]
fn this_year_and_last_n_days_windows() {
    let options = CompileOptions::default().with_clock(fixed_clock(2025, 10, 15));

    let sql = compile_with(
        r#"{
            "projections": [{ "entity": "order_date" }],
            "filters": { "entity": "order_date", "op": "THIS_YEAR" }
        }"#,
        options,
    )
    .unwrap();
    assert!(sql.contains("BETWEEN '2025-01-01' AND '2025-12-31'"));

    let sql = compile_with(
        r#"{
            "projections": [{ "entity": "order_date" }],
            "filters": { "entity": "order_date", "op": "LAST_N_DAYS", "value": 7 }
        }"#,
        options,
    )
    .unwrap();
    assert!(sql.contains("BETWEEN '2025-10-09' AND '2025-10-15'"));
}

// ============================================================================
// Determinism and Alias Stability
// ============================================================================

#[test]
fn compilation_is_deterministic() {
    let ir_json = r#"{
        "projections": [
            { "entity": "region" },
            { "entity": "sales_amount", "alias": "total_sales" }
        ],
        "group_by": [{ "entity": "region" }],
        "order_by": [{ "field": "total_sales", "direction": "DESC" }],
        "limit": 10
    }"#;

    let first = compile_sql(ir_json);
    for _ in 0..50 {
        assert_eq!(compile_sql(ir_json), first);
    }
}

#[test]
fn compilation_is_deterministic_across_threads() {
    let ir_json = r#"{
        "projections": [
            { "entity": "product_name" },
            { "entity": "sales_amount", "alias": "total" }
        ],
        "group_by": [{ "entity": "product_name" }]
    }"#;
    let expected = compile_sql(ir_json);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let expected = expected.clone();
            std::thread::spawn(move || {
                for _ in 0..20 {
                    assert_eq!(compile_sql(ir_json), expected);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn swapping_and_siblings_changes_only_lexical_order() {
    let left_first = compile_sql(
        r#"{
            "projections": [{ "entity": "customer_name" }],
            "filters": {
                "operator": "AND",
                "conditions": [
                    { "entity": "region", "op": "EQUAL", "value": "中国" },
                    { "entity": "is_vip", "op": "EQUAL", "value": true }
                ]
            }
        }"#,
    );
    let right_first = compile_sql(
        r#"{
            "projections": [{ "entity": "customer_name" }],
            "filters": {
                "operator": "AND",
                "conditions": [
                    { "entity": "is_vip", "op": "EQUAL", "value": true },
                    { "entity": "region", "op": "EQUAL", "value": "中国" }
                ]
            }
        }"#,
    );

    assert_ne!(left_first, right_first);
    for predicate in ["(t1.region = '中国')", "(t1.is_vip = TRUE)"] {
        assert!(left_first.contains(predicate), "{left_first}");
        assert!(right_first.contains(predicate), "{right_first}");
    }
}

#[test]
fn aliases_follow_first_reference_order() {
    // customers first: it drives.
    let sql = compile_sql(
        r#"{
            "projections": [
                { "entity": "customer_name" },
                { "entity": "order_date" }
            ]
        }"#,
    );
    assert!(sql.contains("FROM customers AS t1"));
    assert!(sql.contains("INNER JOIN orders AS t2"));

    // orders first: the same two tables, flipped aliases.
    let sql = compile_sql(
        r#"{
            "projections": [
                { "entity": "order_date" },
                { "entity": "customer_name" }
            ]
        }"#,
    );
    assert!(sql.contains("FROM orders AS t1"));
    assert!(sql.contains("INNER JOIN customers AS t2"));
}

#[test]
fn projection_order_is_preserved() {
    let sql = compile_sql(
        r#"{
            "projections": [
                { "entity": "region" },
                { "entity": "customer_name" },
                { "entity": "is_vip" }
            ]
        }"#,
    );
    assert!(sql.starts_with("SELECT t1.region, t1.name, t1.is_vip"));
}

#[test]
fn no_aggregate_means_no_group_by() {
    // A metric projected in a non-aggregated query stays raw.
    let sql = compile_sql(
        r#"{
            "projections": [
                { "entity": "region" },
                { "entity": "sales_amount" }
            ]
        }"#,
    );
    assert!(sql.contains("t3.quantity * t3.unit_price"));
    assert!(!sql.contains("SUM"));
    assert!(!sql.contains("GROUP BY"));
}

// ============================================================================
// Operators and Literals
// ============================================================================

#[test]
fn count_distinct_renders_count_distinct() {
    let sql = compile_sql(
        r#"{
            "projections": [
                { "entity": "region" },
                { "entity": "customer_name", "op": "COUNT_DISTINCT", "alias": "customers" }
            ],
            "group_by": [{ "entity": "region" }]
        }"#,
    );
    assert!(sql.contains("COUNT(DISTINCT t1.name) AS customers"));
}

#[test]
fn not_in_renders_not_in() {
    let sql = compile_sql(
        r#"{
            "projections": [{ "entity": "region" }],
            "filters": { "entity": "region", "op": "NOT_IN", "value": ["中国"] }
        }"#,
    );
    assert!(sql.contains("t1.region NOT IN ('中国')"));
}

#[test]
fn starts_with_and_ends_with() {
    let sql = compile_sql(
        r#"{
            "projections": [{ "entity": "product_name" }],
            "filters": { "entity": "product_name", "op": "STARTS_WITH", "value": "Think" }
        }"#,
    );
    assert!(sql.contains("t1.name LIKE 'Think%'"));

    let sql = compile_sql(
        r#"{
            "projections": [{ "entity": "product_name" }],
            "filters": { "entity": "product_name", "op": "ENDS_WITH", "value": "Pro" }
        }"#,
    );
    assert!(sql.contains("t1.name LIKE '%Pro'"));
}

#[test]
fn like_wildcards_in_value_are_escaped() {
    let sql = compile_sql(
        r#"{
            "projections": [{ "entity": "product_name" }],
            "filters": { "entity": "product_name", "op": "CONTAINS", "value": "50%" }
        }"#,
    );
    assert!(sql.contains("t1.name LIKE '%50\\%%' ESCAPE '\\'"));
}

#[test]
fn boolean_literals_follow_dialect() {
    let ir = r#"{
        "projections": [{ "entity": "customer_name" }],
        "filters": { "entity": "is_vip", "op": "EQUAL", "value": true }
    }"#;

    let sql = compile_with(ir, CompileOptions::default().with_dialect(Dialect::Postgres)).unwrap();
    assert!(sql.contains("t1.is_vip = TRUE"));

    let sql = compile_with(ir, CompileOptions::default().with_dialect(Dialect::MySql)).unwrap();
    assert!(sql.contains("t1.is_vip = 1"));
}

#[test]
fn string_escaping_doubles_single_quotes() {
    let sql = compile_sql(
        r#"{
            "projections": [{ "entity": "customer_name" }],
            "filters": { "entity": "customer_name", "op": "EQUAL", "value": "O'Brien" }
        }"#,
    );
    assert!(sql.contains("t1.name = 'O''Brien'"));
}

#[test]
fn having_inline_metric_aggregates() {
    let sql = compile_sql(
        r#"{
            "projections": [
                { "entity": "region" },
                { "entity": "sales_amount", "alias": "total_sales" }
            ],
            "group_by": [{ "entity": "region" }],
            "having": { "entity": "sales_amount", "op": "GREATER_THAN", "value": 1000 }
        }"#,
    );
    assert!(sql.contains("HAVING SUM(t3.quantity * t3.unit_price) > 1000"));
}

// ============================================================================
// Error Paths
// ============================================================================

#[test]
fn unknown_entity_reports_location() {
    let err = compile_err(r#"{ "projections": [{ "entity": "revenue" }] }"#);
    assert_eq!(err.kind(), "UnknownEntity");
    assert_eq!(err.location(), Some("/projections/0/entity"));
}

#[test]
fn empty_projection_list_is_rejected() {
    let err = compile_err(r#"{ "projections": [] }"#);
    assert_eq!(err.kind(), "EmptyProjection");
    assert_eq!(err.location(), Some("/projections"));
}

#[test]
fn group_by_mismatch_is_rejected() {
    let err = compile_err(
        r#"{
            "projections": [
                { "entity": "region" },
                { "entity": "sales_amount", "op": "SUM" }
            ]
        }"#,
    );
    assert_eq!(err.kind(), "GroupByMismatch");
    assert_eq!(err.location(), Some("/projections/0/entity"));
}

#[test]
fn in_with_scalar_is_a_mismatch() {
    let err = compile_err(
        r#"{
            "projections": [{ "entity": "region" }],
            "filters": { "entity": "region", "op": "IN", "value": "中国" }
        }"#,
    );
    assert_eq!(err.kind(), "OperatorValueMismatch");
    assert_eq!(err.location(), Some("/filters/value"));
}

#[test]
fn is_null_with_value_is_a_mismatch() {
    let err = compile_err(
        r#"{
            "projections": [{ "entity": "region" }],
            "filters": { "entity": "region", "op": "IS_NULL", "value": 1 }
        }"#,
    );
    assert_eq!(err.kind(), "OperatorValueMismatch");
}

#[test]
fn having_unknown_alias_is_rejected() {
    let err = compile_err(
        r#"{
            "projections": [
                { "entity": "region" },
                { "entity": "sales_amount", "op": "SUM", "alias": "total_sales" }
            ],
            "group_by": [{ "entity": "region" }],
            "having": { "entity_alias": "grand_total", "op": "GREATER_THAN", "value": 10 }
        }"#,
    );
    assert_eq!(err.kind(), "UnknownAlias");
    assert_eq!(err.location(), Some("/having/entity_alias"));
}

#[test]
fn having_contains_is_unsupported() {
    let err = compile_err(
        r#"{
            "projections": [
                { "entity": "region" },
                { "entity": "sales_amount", "op": "SUM", "alias": "total_sales" }
            ],
            "group_by": [{ "entity": "region" }],
            "having": { "entity_alias": "total_sales", "op": "CONTAINS", "value": "x" }
        }"#,
    );
    assert_eq!(err.kind(), "UnsupportedOperator");
    assert_eq!(err.location(), Some("/having/op"));
}

#[test]
fn order_by_unknown_field_is_rejected() {
    let err = compile_err(
        r#"{
            "projections": [{ "entity": "region" }],
            "order_by": [{ "field": "grand_total" }]
        }"#,
    );
    assert_eq!(err.kind(), "UnknownAlias");
    assert_eq!(err.location(), Some("/order_by/0/field"));
}

#[test]
fn duplicate_projection_alias_is_rejected() {
    let err = compile_err(
        r#"{
            "projections": [
                { "entity": "region", "alias": "r" },
                { "entity": "customer_name", "alias": "r" }
            ]
        }"#,
    );
    assert_eq!(err.kind(), "InvalidIR");
    assert_eq!(err.location(), Some("/projections/1/alias"));
}

#[test]
fn nested_error_location_points_into_the_tree() {
    let err = compile_err(
        r#"{
            "projections": [{ "entity": "region" }],
            "filters": {
                "operator": "AND",
                "conditions": [
                    { "entity": "region", "op": "EQUAL", "value": "中国" },
                    { "entity": "ghost", "op": "EQUAL", "value": 1 }
                ]
            }
        }"#,
    );
    assert_eq!(err.kind(), "UnknownEntity");
    assert_eq!(err.location(), Some("/filters/conditions/1/entity"));
}

// ============================================================================
// Enum Values
// ============================================================================

#[test]
fn enum_value_outside_set_is_rejected() {
    let err = compile_err(
        r#"{
            "projections": [{ "entity": "region" }],
            "filters": { "entity": "region", "op": "EQUAL", "value": "法国" }
        }"#,
    );
    match &err {
        CompileError::EnumValueRejected { entity, value, .. } => {
            assert_eq!(entity, "region");
            assert_eq!(value, "法国");
        }
        other => panic!("expected EnumValueRejected, got {other:?}"),
    }
    assert_eq!(err.location(), Some("/filters/value"));
}

#[test]
fn enum_value_in_list_is_checked() {
    let err = compile_err(
        r#"{
            "projections": [{ "entity": "region" }],
            "filters": { "entity": "region", "op": "IN", "value": ["中国", "法国"] }
        }"#,
    );
    assert_eq!(err.kind(), "EnumValueRejected");
}

#[test]
fn enum_warn_mode_lets_the_literal_through() {
    let sql = compile_with(
        r#"{
            "projections": [{ "entity": "region" }],
            "filters": { "entity": "region", "op": "EQUAL", "value": "法国" }
        }"#,
        CompileOptions::default().with_enum_mode(EnumMode::Warn),
    )
    .unwrap();
    assert!(sql.contains("t1.region = '法国'"));
}
