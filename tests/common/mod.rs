//! Shared fixture: a small music-sales schema and a seeded SQLite database.

#![allow(dead_code)]

use std::sync::Arc;

use dimql::backend::SqliteBackend;
use dimql::config::QuerySettings;
use dimql::query::{Query, QueryOptions};
use dimql::schema::{load_str, parse_date, Derive, Schema, Value};

pub const MUSIC_SCHEMA: &str = r#"
[[enums]]
name = "format"
values = { CD = "cd", Vinyl = "vi" }

[[types]]
name = "country"
kind = "dimension"
table = "countries"

[[types.dimensions]]
name = "code"
type = "string"
primary = true

[[types.dimensions]]
name = "name"
type = "string"
filterable = true

[[types]]
name = "label"
kind = "dimension"
table = "labels"

[[types.dimensions]]
name = "id"
type = "integer"
primary = true

[[types.dimensions]]
name = "title"
type = "string"
filterable = true

[[types.dimensions]]
name = "country"
type = "country"
null = true
filterable = true

[[types]]
name = "calendar_day"
kind = "dimension"

[[types.dimensions]]
name = "calendar_day"
type = "date"
primary = true
filterable = true

[[types.dimensions]]
name = "day_of_week"
type = "day_of_week"
derive = "day_of_week"
filterable = true

[[types.dimensions]]
name = "days_since_epoch"
type = "days_since_epoch"
derive = "days_since_epoch"
filterable = true

[[types]]
name = "sale"
kind = "fact"
table = "sales"

[[types.dimensions]]
name = "label"
type = "label"
null = true
filterable = true

[[types.dimensions]]
name = "format"
type = "format"
filterable = true

[[types.dimensions]]
name = "price"
type = "integer"
group_by = false

[[types.dimensions]]
name = "quantity"
type = "integer"
group_by = false

[[types.dimensions]]
name = "calendar_day"
type = "calendar_day"
filterable = true
denormalized = true
"#;

/// (label_id, format, price, quantity, day)
const SALES: &[(Option<i64>, &str, i64, i64, &str)] = &[
    (Some(1), "cd", 10, 1, "2024-01-01"),
    (Some(1), "vi", 20, 2, "2024-01-01"),
    (Some(2), "cd", 10, 3, "2024-01-02"),
    (Some(2), "cd", 15, 1, "2024-01-04"),
    (None, "vi", 30, 1, "2024-01-04"),
];

pub fn schema() -> Arc<Schema> {
    Arc::new(load_str(MUSIC_SCHEMA).expect("music schema"))
}

fn derived(name: &str, day: i64) -> i64 {
    match Derive::from_name(name).expect("derive").apply(&Value::Date(day)) {
        Value::Int(n) => n,
        other => panic!("unexpected derived value {:?}", other),
    }
}

/// Labels 1 (Warp, uk), 2 (Sub Pop, us) and 3 (Loner, no country, no
/// sales), plus five sales in the first days of January 2024.
pub fn backend() -> SqliteBackend {
    let backend = SqliteBackend::open_in_memory().expect("sqlite");
    let conn = backend.connection();
    conn.execute_batch(
        r#"
        CREATE TABLE countries (code TEXT PRIMARY KEY, name TEXT NOT NULL);
        INSERT INTO countries VALUES ('uk', 'United Kingdom'), ('us', 'United States');

        CREATE TABLE labels (id INTEGER PRIMARY KEY, title TEXT NOT NULL, country TEXT);
        INSERT INTO labels VALUES (1, 'Warp', 'uk'), (2, 'Sub Pop', 'us'), (3, 'Loner', NULL);

        CREATE TABLE sales (
            id INTEGER PRIMARY KEY,
            label_id INTEGER,
            format TEXT NOT NULL,
            price INTEGER NOT NULL,
            quantity INTEGER NOT NULL,
            calendar_day TEXT NOT NULL,
            day_of_week INTEGER NOT NULL,
            days_since_epoch INTEGER NOT NULL
        );
        "#,
    )
    .expect("fixture tables");

    for (label, format, price, quantity, day) in SALES {
        let days = parse_date(day).expect("fixture date");
        conn.execute(
            "INSERT INTO sales (label_id, format, price, quantity, calendar_day, day_of_week, days_since_epoch)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                label,
                format,
                price,
                quantity,
                day,
                derived("day_of_week", days),
                derived("days_since_epoch", days)
            ],
        )
        .expect("fixture sale");
    }
    backend
}

pub fn query(json: &str) -> Query {
    let options = QueryOptions::from_json(json).expect("query options");
    Query::new(schema(), options).expect("query")
}

pub fn run(json: &str) -> Vec<Vec<String>> {
    query(json)
        .to_table(&backend(), &QuerySettings::default())
        .expect("query run")
}

pub fn temp_table_count(backend: &SqliteBackend) -> i64 {
    backend
        .connection()
        .query_row("SELECT COUNT(*) FROM sqlite_temp_master WHERE type = 'table'", [], |row| {
            row.get(0)
        })
        .expect("sqlite_temp_master")
}
