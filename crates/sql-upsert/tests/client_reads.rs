//! Read and maintenance helpers of `UpsertClient`.

mod common;

use chrono::NaiveDate;
use common::FakeEngine;
use sql_upsert::SqlValue;

fn prices() -> FakeEngine {
    let engine = FakeEngine::new(2);
    engine.create_table(
        "prices",
        &[("ID", "int(11)"), ("Trade_Date", "varchar(10)"), ("close", "double")],
        vec![
            vec![SqlValue::I64(1), SqlValue::from("2024-01-02"), SqlValue::F64(9.5)],
            vec![SqlValue::I64(2), SqlValue::from("not a date"), SqlValue::F64(9.75)],
        ],
    );
    engine
}

#[tokio::test]
async fn read_sql_lowercases_and_coerces_dates() {
    let engine = prices();
    let client = engine.client();

    let rows = client.read_sql("SELECT * FROM `prices`").await.unwrap();

    assert_eq!(rows.columns, vec!["id", "trade_date", "close"]);
    let midnight = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(rows.get(0, "trade_date"), Some(&SqlValue::DateTime(midnight)));
    assert_eq!(rows.get(1, "trade_date"), Some(&SqlValue::Null));
    assert_eq!(rows.get(1, "close"), Some(&SqlValue::F64(9.75)));
}

#[tokio::test]
async fn table_columns_lists_lowercase_names() {
    let engine = prices();
    let client = engine.client();

    let schema = client.table_columns("prices").await.unwrap();

    assert_eq!(schema.column_names(), vec!["id", "trade_date", "close"]);
}

#[tokio::test]
async fn table_data_keeps_only_known_fields() {
    let engine = prices();
    let client = engine.client();

    let rows = client
        .table_data("prices", &["CLOSE, bogus", "trade_date"], Some("id > 0"))
        .await
        .unwrap();

    assert_eq!(rows.columns, vec!["close", "trade_date"]);
    assert_eq!(rows.len(), 2);
    assert!(engine
        .statements()
        .contains(&"SELECT `close`, `trade_date` FROM `prices` WHERE id > 0".to_string()));
}

#[tokio::test]
async fn table_data_without_known_fields_reads_everything() {
    let engine = prices();
    let client = engine.client();

    let rows = client.table_data("prices", &["bogus"], None).await.unwrap();

    assert_eq!(rows.columns, vec!["id", "trade_date", "close"]);
    assert!(engine
        .statements()
        .contains(&"SELECT * FROM `prices`".to_string()));
}

#[tokio::test]
async fn truncate_and_execute_issue_statements() {
    let engine = prices();
    let client = engine.client();

    client.truncate("prices").await.unwrap();
    client.execute("OPTIMIZE TABLE `prices`").await.unwrap();

    let statements = engine.statements();
    assert!(statements.contains(&"TRUNCATE TABLE `prices`".to_string()));
    assert!(statements.contains(&"OPTIMIZE TABLE `prices`".to_string()));
}

#[tokio::test]
async fn read_errors_surface_as_database_errors() {
    let engine = FakeEngine::new(1);
    let client = engine.client();

    let err = client.read_sql("SELECT * FROM `ghost`").await.unwrap_err();

    assert!(matches!(err, sql_upsert::UpsertError::Database(ref e) if e.code == Some(1146)));
}
