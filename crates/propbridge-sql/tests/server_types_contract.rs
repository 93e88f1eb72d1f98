//! Server Column Type Contract Tests
//!
//! Read the column types listing databases actually use (decimals, dates,
//! timestamps, UUIDs, JSON, binary) from Postgres and MySQL.
//!
//! These need a scratch server and are skipped unless
//! `PROPBRIDGE_TEST_POSTGRES_URL` / `PROPBRIDGE_TEST_MYSQL_URL` is set.

use propbridge_core::{DataSource, DataSourceFactory, DiagnosticKind, Query, SourceConfig, Table};
use propbridge_sql::DatabaseFactory;
use serde_json::{Value, json};

fn server_url(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(url) if !url.is_empty() => Some(url),
        _ => {
            eprintln!("{} not set, skipping", var);
            None
        }
    }
}

fn first_row(table: &Table) -> Value {
    Value::Object(table.rows()[0].clone())
}

#[tokio::test]
async fn test_postgres_column_types() {
    let Some(url) = server_url("PROPBRIDGE_TEST_POSTGRES_URL") else {
        return;
    };
    let mut source = DatabaseFactory
        .create(&SourceConfig::database(url, "postgres"))
        .unwrap();

    let outcome = source
        .fetch(Query::from(
            r#"SELECT 1::bigint AS id,
                      2::int4 AS baths,
                      250000.50::numeric AS price,
                      DATE '2024-01-31' AS listed_on,
                      TIMESTAMP '2024-01-31 10:30:00' AS created_at,
                      TIMESTAMPTZ '2024-01-31 10:30:00+00' AS updated_at,
                      '6f1c4a52-3a0e-4d2e-9a55-1c6a7f1f0b11'::uuid AS listing_id,
                      '{"beds": 3}'::jsonb AS details,
                      '\x00ff'::bytea AS photo,
                      'Austin'::varchar AS city,
                      NULL::numeric AS hoa_fee"#,
        ))
        .await;

    assert!(!outcome.is_failure(), "{:?}", outcome.diagnostic);
    assert_eq!(
        first_row(&outcome.table),
        json!({
            "id": 1,
            "baths": 2,
            "price": 250000.5,
            "listed_on": "2024-01-31",
            "created_at": "2024-01-31T10:30:00",
            "updated_at": "2024-01-31T10:30:00+00:00",
            "listing_id": "6f1c4a52-3a0e-4d2e-9a55-1c6a7f1f0b11",
            "details": { "beds": 3 },
            "photo": "AP8=",
            "city": "Austin",
            "hoa_fee": null
        })
    );

    source.disconnect().await;
}

#[tokio::test]
async fn test_postgres_unmapped_type_is_decode_failure() {
    let Some(url) = server_url("PROPBRIDGE_TEST_POSTGRES_URL") else {
        return;
    };
    let mut source = DatabaseFactory
        .create(&SourceConfig::database(url, "postgres"))
        .unwrap();

    let outcome = source
        .fetch(Query::from("SELECT 1 AS id, INTERVAL '1 day' AS span"))
        .await;

    assert!(outcome.table.is_empty());
    let diagnostic = outcome.diagnostic.unwrap();
    assert_eq!(diagnostic.kind, DiagnosticKind::Decode);
    assert!(diagnostic.message.contains("span"));
}

#[tokio::test]
async fn test_mysql_column_types() {
    let Some(url) = server_url("PROPBRIDGE_TEST_MYSQL_URL") else {
        return;
    };
    let mut source = DatabaseFactory
        .create(&SourceConfig::database(url, "mysql"))
        .unwrap();

    let outcome = source
        .fetch(Query::from(
            "SELECT CAST(250000.50 AS DECIMAL(12,2)) AS price, \
                    CAST('2024-01-31' AS DATE) AS listed_on, \
                    CAST('2024-01-31 10:30:00' AS DATETIME) AS created_at, \
                    CAST(3 AS UNSIGNED) AS beds, \
                    'Austin' AS city",
        ))
        .await;

    assert!(!outcome.is_failure(), "{:?}", outcome.diagnostic);
    assert_eq!(
        first_row(&outcome.table),
        json!({
            "price": 250000.5,
            "listed_on": "2024-01-31",
            "created_at": "2024-01-31T10:30:00",
            "beds": 3,
            "city": "Austin"
        })
    );

    source.disconnect().await;
}
