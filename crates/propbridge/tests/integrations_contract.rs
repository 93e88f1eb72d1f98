//! Integration Contract Tests
//!
//! Drive the convenience constructors and operations end to end: files on
//! temporary directories, HTTP providers on mock servers, and the
//! integrations file round trip.

use propbridge::helpers::{
    self, CrmIntegration, FileIntegration, MlsIntegration, PropertySearch,
};
use propbridge::settings::{
    IntegrationEntry, IntegrationsFile, load_integrations, read_integrations_file,
    write_integrations_file,
};
use propbridge::{DiagnosticKind, Table, WriteMode};
use serde_json::{Map, Value, json};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

fn listings() -> Table {
    Table::from_json_value(json!([
        { "id": 1, "city": "Austin", "status": "active" },
        { "id": 2, "city": "Dallas", "status": "sold" }
    ]))
    .unwrap()
}

#[tokio::test]
async fn test_file_integration_default_push_creates_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("x.csv");
    let mut manager = propbridge::manager();

    assert!(helpers::create_file_integration(
        &mut manager,
        "t1",
        FileIntegration::new(file.display().to_string()),
        true
    ));
    assert_eq!(manager.default_name(), Some("t1"));

    let outcome = manager.push(&listings(), Some("t1")).await;
    assert!(outcome.success, "{:?}", outcome.diagnostic);
    assert!(file.exists());

    // Append is the source's own default
    assert!(manager.push(&listings(), Some("t1")).await.success);
    let outcome = manager.fetch(Some("t1"), Default::default()).await;
    assert_eq!(outcome.table.len(), 4);

    manager.close_all_connections().await;
}

#[tokio::test]
async fn test_csv_export_overwrites_and_import_filters() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("exports").join("listings.csv");
    let mut manager = propbridge::manager();
    assert!(helpers::create_file_integration(
        &mut manager,
        "exports",
        FileIntegration::new(file.display().to_string()),
        false
    ));

    assert!(helpers::export_data_to_csv(&mut manager, &listings(), None, None).await.success);
    assert!(helpers::export_data_to_csv(&mut manager, &listings(), None, None).await.success);

    let outcome = helpers::import_data_from_csv(&mut manager, None, None).await;
    assert_eq!(outcome.table, listings());

    let outcome = helpers::export_data_to_csv(
        &mut manager,
        &listings(),
        Some("exports"),
        Some(WriteMode::Append),
    )
    .await;
    assert!(outcome.success);

    let outcome = helpers::import_data_from_csv(
        &mut manager,
        Some(object(json!({ "status": "sold" }))),
        Some("exports"),
    )
    .await;
    assert_eq!(outcome.table.len(), 2);
}

#[tokio::test]
async fn test_search_properties_through_mls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .and(header("X-API-Key", "mls-key"))
        .and(query_param("Query", "City = Austin,ListPrice >= 100000,Bedrooms >= 3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "results": [{ "ListingId": "A1" }, { "ListingId": "A2" }] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut manager = propbridge::manager();
    let params = MlsIntegration {
        mls_provider: "rets".into(),
        base_url: server.uri(),
        api_key: "mls-key".into(),
        extra: object(json!({ "endpoint": "/listings" })),
        ..Default::default()
    };
    assert!(helpers::create_mls_integration(&mut manager, "mls", params, true));

    let search = PropertySearch {
        min_price: Some(100000),
        bedrooms: Some(3),
        ..PropertySearch::in_location("Austin")
    };
    let outcome = helpers::search_properties(&mut manager, &search, None).await;

    assert!(!outcome.is_failure(), "{:?}", outcome.diagnostic);
    assert_eq!(outcome.table.len(), 2);
}

#[tokio::test]
async fn test_get_leads_from_zoho() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/v2/Leads"))
        .and(header("AUTHTOKEN", "zoho-key"))
        .and(query_param(
            "fields",
            "id,name,email,phone,source,status,created_at,updated_at",
        ))
        .and(query_param("criteria", "(status:equals:new)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "9", "email": "lead@example.com", "status": "new" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut manager = propbridge::manager();
    let params = CrmIntegration {
        crm_provider: "zoho".into(),
        base_url: server.uri(),
        api_key: Some("zoho-key".into()),
        ..Default::default()
    };
    assert!(helpers::create_crm_integration(&mut manager, "crm", params, false));

    let outcome = helpers::get_leads(&mut manager, Some("new"), None, Some("crm")).await;
    assert_eq!(outcome.table.len(), 1);
    assert_eq!(outcome.table.rows()[0]["email"], json!("lead@example.com"));
}

#[tokio::test]
async fn test_add_leads_targets_lead_entity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/leads/batch/create"))
        .and(header("hapikey", "hub-key"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let mut manager = propbridge::manager();
    let params = CrmIntegration {
        crm_provider: "hubspot".into(),
        base_url: server.uri(),
        api_key: Some("hub-key".into()),
        ..Default::default()
    };
    assert!(helpers::create_crm_integration(&mut manager, "crm", params, true));

    let leads = Table::from_json_value(json!([{ "email": "a@example.com" }])).unwrap();
    let outcome = helpers::add_leads_to_crm(&mut manager, &leads, None).await;
    assert!(outcome.success, "{:?}", outcome.diagnostic);

    let config = manager.get(Some("crm")).unwrap().config();
    assert_eq!(config.get_str("entity_type").as_deref(), Some("leads"));
}

#[tokio::test]
async fn test_call_api_endpoint_sets_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agents"))
        .and(query_param("office", "north"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "name": "Sam" }])))
        .expect(1)
        .mount(&server)
        .await;

    let mut manager = propbridge::manager();
    let params = helpers::ApiIntegration {
        base_url: server.uri(),
        auth_type: Some("oauth2".into()),
        access_token: Some("tok".into()),
        ..Default::default()
    };
    assert!(helpers::create_api_integration(&mut manager, "api", params, false));

    let outcome = helpers::call_api_endpoint(
        &mut manager,
        "/v1/agents",
        Some(object(json!({ "office": "north" }))),
        None,
    )
    .await;
    assert_eq!(outcome.table.len(), 1);
}

#[tokio::test]
async fn test_database_export_and_query() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("crm.db");
    let mut manager = propbridge::manager();
    let params = helpers::DatabaseIntegration {
        driver: "sqlite3".into(),
        connection_string: format!("sqlite:///{}", db.display()),
        ..Default::default()
    };
    assert!(helpers::create_database_integration(&mut manager, "db", params, true));

    let outcome = helpers::export_data_to_external_database(
        &mut manager,
        &listings(),
        "listings",
        None,
    )
    .await;
    assert!(outcome.success, "{:?}", outcome.diagnostic);

    let outcome = helpers::query_external_database(
        &mut manager,
        "SELECT id, city FROM listings WHERE status = 'sold'",
        None,
    )
    .await;
    assert_eq!(outcome.table.len(), 1);
    assert_eq!(outcome.table.rows()[0]["city"], json!("Dallas"));

    manager.close_all_connections().await;
}

#[tokio::test]
async fn test_unknown_integration_fails_softly() {
    let mut manager = propbridge::manager();

    let outcome = helpers::query_external_database(&mut manager, "SELECT 1", Some("nope")).await;
    assert!(outcome.table.is_empty());
    assert_eq!(
        outcome.diagnostic.map(|d| d.kind),
        Some(DiagnosticKind::NotFound)
    );
}

#[tokio::test]
async fn test_integrations_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config").join("integrations.json");

    let mut file = IntegrationsFile::new();
    file.insert(
        "exports",
        IntegrationEntry::new(
            "file",
            object(json!({ "file_path": dir.path().join("out.csv").display().to_string() })),
        ),
    );
    file.insert(
        "listings",
        IntegrationEntry::new(
            "mls",
            object(json!({
                "mls_provider": "spark",
                "base_url": "https://mls.example",
                "api_key": "k"
            })),
        )
        .as_default(),
    );
    file.insert(
        "broken",
        IntegrationEntry::new(
            "crm",
            object(json!({ "crm_provider": "zoho", "base_url": "https://crm.example" })),
        ),
    );
    write_integrations_file(&path, &file).await.unwrap();
    assert_eq!(read_integrations_file(&path).await.unwrap(), file);

    let mut manager = propbridge::manager();
    let loaded = load_integrations(&mut manager, &path).await.unwrap();

    assert_eq!(loaded, vec!["exports".to_string(), "listings".to_string()]);
    assert_eq!(manager.default_name(), Some("listings"));
    let config = manager.get(Some("listings")).unwrap().config();
    assert_eq!(config.get_str("data_path").as_deref(), Some("data.results"));
}

#[tokio::test]
async fn test_missing_integrations_file_loads_nothing() {
    let dir = TempDir::new().unwrap();
    let mut manager = propbridge::manager();

    let loaded = load_integrations(&mut manager, &dir.path().join("absent.json"))
        .await
        .unwrap();
    assert!(loaded.is_empty());
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_malformed_integrations_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("integrations.json");
    std::fs::write(&path, "{ not json").unwrap();

    let mut manager = propbridge::manager();
    let err = load_integrations(&mut manager, &path).await.unwrap_err();
    assert!(matches!(err, propbridge::Error::Config(_)));
}
