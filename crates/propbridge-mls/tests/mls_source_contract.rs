//! MLS Source Contract Tests
//!
//! Verify that translated queries reach the wire as request parameters and
//! that responses flow back through the REST decoding path.

use propbridge_core::{DataSource, DataSourceFactory, Query, SourceConfig, SourceKind};
use propbridge_mls::MlsFactory;
use serde_json::{Map, Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

fn search() -> Query {
    Query::Params(object(json!({
        "city": "Austin",
        "min_price": 100000,
        "max_price": 300000
    })))
}

#[tokio::test]
async fn test_rets_search_sends_filter_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("SearchType", "Property"))
        .and(query_param("Class", "ALL"))
        .and(query_param(
            "Query",
            "City = Austin,ListPrice >= 100000,ListPrice <= 300000",
        ))
        .and(query_param("Limit", "100"))
        .and(header("X-API-Key", "mls-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "results": [
                { "ListingId": "A1", "City": "Austin", "ListPrice": 250000 }
            ] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = SourceConfig::mls(server.uri(), "api_key", "rets")
        .with("api_key", "mls-key")
        .with("api_key_header", "X-API-Key")
        .with("endpoint", "/search")
        .with("data_path", "data.results");
    let mut source = MlsFactory.create(&config).unwrap();
    assert_eq!(source.kind(), SourceKind::Mls);

    let outcome = source.fetch(search()).await;

    assert!(!outcome.is_failure(), "{:?}", outcome.diagnostic);
    assert_eq!(outcome.table.len(), 1);
    assert_eq!(outcome.table.rows()[0]["ListingId"], json!("A1"));
}

#[tokio::test]
async fn test_spark_search_marks_active_listings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("includetypes", "A"))
        .and(query_param("minimalprice", "100000"))
        .and(query_param("maximalprice", "300000"))
        .and(query_param("city", "Austin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = SourceConfig::mls(server.uri(), "none", "spark");
    let mut source = MlsFactory.create(&config).unwrap();

    let outcome = source.fetch(search()).await;
    assert!(!outcome.is_failure());
    assert!(outcome.table.is_empty());
}

#[tokio::test]
async fn test_bridge_search_carries_token_and_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("access_token", "bridge-token"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "100"))
        .and(query_param(
            "filter",
            r#"{"City":"Austin","ListPrice.min":100000,"ListPrice.max":300000}"#,
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .expect(1)
        .mount(&server)
        .await;

    let config = SourceConfig::mls(server.uri(), "oauth2", "bridge")
        .with("access_token", "bridge-token");
    let mut source = MlsFactory.create(&config).unwrap();

    let outcome = source.fetch(search()).await;
    assert_eq!(outcome.table.len(), 1);
}

#[tokio::test]
async fn test_unreachable_server_degrades_to_empty_table() {
    let config = SourceConfig::mls("http://127.0.0.1:9", "none", "rets");
    let mut source = MlsFactory.create(&config).unwrap();

    let outcome = source.fetch(search()).await;
    assert!(outcome.table.is_empty());
    assert!(outcome.is_failure());
}
