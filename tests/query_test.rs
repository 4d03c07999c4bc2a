//! End-to-end query tests against the seeded SQLite fixture.

mod common;

use std::sync::Arc;

use common::{backend, query, run, temp_table_count};
use dimql::backend::SqliteBackend;
use dimql::config::QuerySettings;
use dimql::query::{Query, QueryOptions};
use dimql::schema::load_str;
use dimql::sql::Dialect;
use dimql::Error;
use serde_json::json;

fn column(table: &[Vec<String>], name: &str) -> Vec<String> {
    let index = table[0].iter().position(|h| h == name).expect("column");
    table[1..].iter().map(|row| row[index].clone()).collect()
}

// ============================================================================
// Plain aggregation
// ============================================================================

#[test]
fn test_count_by_label_title() {
    let table = run(r#"{"fact": "sale", "group_by": ["label.title"], "order": ["label.title", "asc"]}"#);
    assert_eq!(table[0], vec!["sale.label.title", "count"]);
    assert_eq!(
        &table[1..],
        &[
            vec!["".to_string(), "1".to_string()],
            vec!["Sub Pop".to_string(), "2".to_string()],
            vec!["Warp".to_string(), "2".to_string()],
        ]
    );
}

#[test]
fn test_weighted_sum_with_filter() {
    let data = query(
        r#"{"fact": "sale", "group_by": ["label"],
            "aggregates": [["revenue", "weighted_sum", "price", "quantity"]],
            "filters": [["format", "=", "CD"]],
            "order": ["label", "asc"]}"#,
    )
    .to_data(&backend(), &QuerySettings::default())
    .unwrap();

    assert_eq!(data["rows"], json!([[1, 10.0], [2, 45.0]]));
    assert_eq!(data["columns"][0]["name"], "sale.label");
    assert_eq!(data["columns"][0]["dimension_path"], json!(["sale", "label"]));
    assert_eq!(data["columns"][1]["value_type"], "float");
}

#[test]
fn test_group_by_enum_reports_external_names() {
    let table = run(
        r#"{"fact": "sale", "group_by": ["format"],
            "aggregates": [["units", "sum", "quantity"], ["top_price", "max", "price"]],
            "order": ["format", "asc"]}"#,
    );
    assert_eq!(column(&table, "sale.format"), vec!["CD", "Vinyl"]);
    assert_eq!(column(&table, "units"), vec!["5", "3"]);
    assert_eq!(column(&table, "top_price"), vec!["15", "30"]);
}

#[test]
fn test_scalar_aggregate_over_no_rows() {
    let table = run(r#"{"fact": "sale", "filters": [["label.title", "=", "Nobody"]]}"#);
    assert_eq!(table, vec![vec!["count".to_string()], vec!["0".to_string()]]);
}

#[test]
fn test_descendant_filter_makes_ancestor_joins_inner() {
    let json = r#"{"fact": "sale", "group_by": ["label.title"],
        "filters": [["label.country.name", "=", "United Kingdom"]]}"#;
    let sql = query(json)
        .explain(&backend(), &QuerySettings::default(), Dialect::Sqlite)
        .unwrap();
    assert!(sql.contains(r#"INNER JOIN "labels" AS "sale.label""#));
    assert!(sql.contains(r#"INNER JOIN "countries" AS "sale.label.country""#));

    let table = run(json);
    assert_eq!(column(&table, "sale.label.title"), vec!["Warp"]);
    assert_eq!(column(&table, "count"), vec!["2"]);
}

#[test]
fn test_order_and_limit() {
    let table = run(
        r#"{"fact": "sale", "group_by": ["calendar_day"],
            "aggregates": [["revenue", "sum", "price"]],
            "order": ["revenue", "desc"], "limit": 1}"#,
    );
    assert_eq!(table.len(), 2);
    assert_eq!(column(&table, "sale.calendar_day"), vec!["2024-01-04"]);
    assert_eq!(column(&table, "revenue"), vec!["45"]);
}

#[test]
fn test_compiled_sql() {
    let sql = query(r#"{"fact": "sale", "group_by": ["format"], "filters": [["format", "=", "CD"]]}"#)
        .explain(&backend(), &QuerySettings::default(), Dialect::Sqlite)
        .unwrap();
    insta::assert_snapshot!(sql, @r#"
    SELECT
      "sale"."format" AS "sale.format",
      COUNT(*) AS "count"
    FROM "sales" AS "sale"
    WHERE "sale"."format" = 'cd'
    GROUP BY "sale"."format"
    "#);
}

// ============================================================================
// include_all_values
// ============================================================================

#[test]
fn test_include_all_values_nullable_group_by() {
    let table = run(
        r#"{"fact": "sale", "group_by": ["label"], "include_all_values": true,
            "order": ["label", "asc"]}"#,
    );
    assert_eq!(column(&table, "sale.label"), vec!["", "1", "2", "3"]);
    assert_eq!(column(&table, "count"), vec!["1", "2", "2", "0"]);
}

#[test]
fn test_include_all_values_filtered_universe() {
    let table = run(
        r#"{"fact": "sale", "group_by": ["label"], "select": ["label", "label.title"],
            "include_all_values": true,
            "filters": [["label.title", "in", "Warp", "Loner"]],
            "order": ["label", "asc"]}"#,
    );
    assert_eq!(column(&table, "sale.label.title"), vec!["Warp", "Loner"]);
    assert_eq!(column(&table, "count"), vec!["2", "0"]);
}

#[test]
fn test_include_all_values_generated_weekdays() {
    let backend = backend();
    let table = query(
        r#"{"fact": "sale", "group_by": [["calendar_day", "day_of_week"]],
            "include_all_values": true,
            "order": ["calendar_day.day_of_week", "asc"]}"#,
    )
    .to_table(&backend, &QuerySettings::default())
    .unwrap();
    assert_eq!(table.len(), 8);
    assert_eq!(column(&table, "count"), vec!["0", "2", "1", "0", "2", "0", "0"]);
    assert_eq!(temp_table_count(&backend), 0);
}

#[test]
fn test_include_all_values_day_range() {
    let table = run(
        r#"{"fact": "sale", "group_by": ["calendar_day"], "include_all_values": true,
            "filters": [["calendar_day", "between", "2024-01-01", "2024-01-05"]],
            "order": ["calendar_day", "asc"]}"#,
    );
    assert_eq!(
        column(&table, "sale.calendar_day"),
        vec!["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04", "2024-01-05"]
    );
    assert_eq!(column(&table, "count"), vec!["2", "1", "0", "2", "0"]);
}

#[test]
fn test_include_all_values_promoted_range() {
    let json = r#"{"fact": "sale", "group_by": [["calendar_day", "days_since_epoch"]],
        "include_all_values": true, "may_promote_range_filters": true,
        "filters": [["calendar_day", "between", "2024-01-01", "2024-01-03"]],
        "order": ["calendar_day.days_since_epoch", "asc"]}"#;
    let table = run(json);
    assert_eq!(column(&table, "count"), vec!["2", "1", "0"]);

    let unpromoted = json.replace(r#""may_promote_range_filters": true"#, r#""may_promote_range_filters": false"#);
    let err = query(&unpromoted)
        .to_table(&backend(), &QuerySettings::default())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidQueryParams(_)));
}

#[test]
fn test_include_all_values_respects_limit() {
    let table = run(
        r#"{"fact": "sale", "group_by": ["format"], "include_all_values": true,
            "order": ["count", "desc"], "limit": 1}"#,
    );
    assert_eq!(table.len(), 2);
    assert_eq!(column(&table, "count"), vec!["3"]);
}

// ============================================================================
// Second aggregation and distributions
// ============================================================================

#[test]
fn test_average_sales_per_label_by_country() {
    let data = query(
        r#"{"fact": "sale", "group_by": ["label"],
            "second_group_by": [["label", "country"]],
            "second_aggregates": [["avg_sales", "avg", "count"]],
            "order": ["label.country", "asc"]}"#,
    )
    .to_data(&backend(), &QuerySettings::default())
    .unwrap();
    assert_eq!(data["rows"], json!([[null, 1.0], ["uk", 2.0], ["us", 2.0]]));
}

#[test]
fn test_identity_regrouping_matches_plain_aggregate() {
    let plain = run(r#"{"fact": "sale", "group_by": ["label"], "order": ["label", "asc"]}"#);
    let regrouped = run(
        r#"{"fact": "sale", "group_by": ["label"],
            "second_group_by": ["label"],
            "second_aggregates": [["count", "sum", "count"]],
            "order": ["label", "asc"]}"#,
    );
    assert_eq!(regrouped, plain);
}

#[test]
fn test_second_aggregate_over_everything() {
    let table = run(
        r#"{"fact": "sale", "group_by": ["label"],
            "aggregates": [["revenue", "sum", "price"]],
            "second_group_by": [],
            "second_aggregates": [["best", "max", "revenue"], ["labels", "count"]]}"#,
    );
    assert_eq!(table[1], vec!["30", "3"]);
}

#[test]
fn test_distribution_of_label_revenue() {
    let backend = backend();
    let data = query(
        r#"{"fact": "sale", "group_by": ["label"],
            "aggregates": [["total", "sum", "price"]],
            "distribution": 3}"#,
    )
    .to_data(&backend, &QuerySettings::default())
    .unwrap();
    assert_eq!(
        data["rows"],
        json!([[25.0, 27.0, 1], [27.0, 29.0, 0], [29.0, 31.0, 2]])
    );
    assert_eq!(temp_table_count(&backend), 0);
}

#[test]
fn test_distribution_default_buckets() {
    let settings = QuerySettings {
        default_num_buckets: 2,
        ..QuerySettings::default()
    };
    let table = query(r#"{"fact": "sale", "group_by": ["calendar_day"], "distribution": true}"#)
        .to_table(&backend(), &settings)
        .unwrap();
    // Sales per day are 2, 1 and 2.
    assert_eq!(column(&table, "start"), vec!["1.0", "2.0"]);
    assert_eq!(column(&table, "count"), vec!["1", "2"]);
}

#[test]
fn test_distribution_of_top_groups() {
    let data = query(
        r#"{"fact": "sale", "group_by": ["label"], "distribution": 4,
            "order": ["count", "desc"], "limit": 2}"#,
    )
    .to_data(&backend(), &QuerySettings::default())
    .unwrap();
    // Only the two best-selling labels (2 sales each) are counted.
    assert_eq!(data["rows"], json!([[2.0, 3.0, 2]]));
}

#[test]
fn test_distribution_buckets_cover_every_value() {
    let schema = Arc::new(
        load_str(
            r#"
            [[types]]
            name = "reading"
            kind = "fact"
            table = "readings"

            [[types.dimensions]]
            name = "sensor"
            type = "integer"

            [[types.dimensions]]
            name = "value"
            type = "integer"
            group_by = false
            "#,
        )
        .unwrap(),
    );
    let backend = SqliteBackend::open_in_memory().unwrap();
    backend
        .connection()
        .execute_batch(
            "CREATE TABLE readings (sensor INTEGER NOT NULL, value INTEGER NOT NULL);
             INSERT INTO readings VALUES (1, 1), (2, 2), (3, 2), (4, 5), (5, 9);",
        )
        .unwrap();
    let options = QueryOptions::from_json(
        r#"{"fact": "reading", "group_by": ["sensor"],
            "aggregates": [["total", "sum", "value"]], "distribution": 4}"#,
    )
    .unwrap();
    let data = Query::new(schema, options)
        .unwrap()
        .to_data(&backend, &QuerySettings::default())
        .unwrap();

    assert_eq!(
        data["rows"],
        json!([[1.0, 4.0, 3], [4.0, 7.0, 0], [7.0, 10.0, 2]])
    );
    let total: i64 = data["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row[2].as_i64().unwrap())
        .sum();
    assert_eq!(total, 5);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_backend_errors_surface() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    let err = query(r#"{"fact": "sale"}"#)
        .to_table(&backend, &QuerySettings::default())
        .unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
}

#[test]
fn test_explain_for_other_dialects() {
    let q = query(r#"{"fact": "sale", "group_by": ["format"], "include_all_values": true}"#);
    let sql = q
        .explain(&backend(), &QuerySettings::default(), Dialect::MySql)
        .unwrap();
    assert!(sql.contains("LEFT OUTER JOIN"));
    assert!(sql.contains("`__inner`"));

    let q = query(r#"{"fact": "sale", "group_by": ["label"], "include_all_values": true}"#);
    let err = q
        .explain(&backend(), &QuerySettings::default(), Dialect::MySql)
        .unwrap_err();
    assert!(err.to_string().contains("FULL OUTER JOIN"));
}
