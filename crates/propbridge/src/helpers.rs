//! Convenience constructors and ready-made operations
//!
//! Each `create_*_integration` function turns flat parameters into a
//! [`SourceConfig`], fills in the provider defaults and adds the source to a
//! manager. They report success as a `bool` and log the reason on failure,
//! so a caller wiring up several integrations can keep going past a bad one.
//!
//! The operations below them (`search_properties`, `get_leads`, ...) shape a
//! query or tweak one configuration key, then go through the manager's
//! fail-soft fetch and push.

use propbridge_core::{
    Error, FetchOutcome, IntegrationManager, PushOutcome, Query, SourceConfig, Table,
};
use propbridge_csv::WriteMode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Header carrying API keys for REST and MLS integrations
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Where MLS responses keep their listings
pub const DEFAULT_MLS_DATA_PATH: &str = "data.results";

/// Columns requested by [`get_leads`]
pub const LEAD_FIELDS: [&str; 8] = [
    "id",
    "name",
    "email",
    "phone",
    "source",
    "status",
    "created_at",
    "updated_at",
];

/// Parameters for [`create_api_integration`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiIntegration {
    pub base_url: String,
    /// `api_key` (default), `basic` or `oauth2`
    pub auth_type: Option<String>,
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub access_token: Option<String>,
    /// Anything else, copied into the configuration as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters for [`create_database_integration`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseIntegration {
    pub driver: String,
    pub connection_string: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters for [`create_file_integration`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileIntegration {
    pub file_path: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileIntegration {
    /// Parameters for the CSV file at `file_path`
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            extra: Map::new(),
        }
    }
}

/// Parameters for [`create_mls_integration`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlsIntegration {
    /// `rets`, `spark`, `bridge` or any other name for pass-through queries
    pub mls_provider: String,
    pub base_url: String,
    pub api_key: String,
    /// Switches the integration to `oauth2`
    pub access_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters for [`create_crm_integration`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmIntegration {
    /// `salesforce`, `hubspot`, `zoho` or any other name
    pub crm_provider: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Provider-neutral property search for [`search_properties`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertySearch {
    /// City the listings are in
    pub location: String,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    /// Minimum bedrooms
    pub bedrooms: Option<u32>,
    pub property_type: Option<String>,
}

impl PropertySearch {
    /// Search every listing in `location`
    pub fn in_location(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Query understood by every MLS provider translation
    pub fn to_query(&self) -> Map<String, Value> {
        let mut query = Map::new();
        query.insert("city".to_string(), Value::from(self.location.clone()));
        if let Some(min_price) = self.min_price {
            query.insert("min_price".to_string(), Value::from(min_price));
        }
        if let Some(max_price) = self.max_price {
            query.insert("max_price".to_string(), Value::from(max_price));
        }
        if let Some(bedrooms) = self.bedrooms {
            query.insert("min_bedrooms".to_string(), Value::from(bedrooms));
        }
        if let Some(property_type) = &self.property_type {
            query.insert("property_type".to_string(), Value::from(property_type.clone()));
        }
        query
    }
}

/// Add `config` under `name`, logging failures under `what`
fn add(
    manager: &mut IntegrationManager,
    what: &str,
    name: &str,
    config: SourceConfig,
    make_default: bool,
) -> bool {
    match manager.add(name, config, make_default) {
        Ok(()) => {
            tracing::info!("Created {} integration {}", what, name);
            true
        }
        Err(e) => {
            tracing::error!("Error creating {} integration: {}", what, e);
            false
        }
    }
}

/// Copy extras in; they win over provider defaults but not over required fields
fn with_extra(mut config: SourceConfig, extra: Map<String, Value>) -> SourceConfig {
    let required = config.kind().required_fields();
    for (key, value) in extra {
        if !required.contains(&key.as_str()) {
            config = config.with(key, value);
        }
    }
    config
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Add a REST API integration
///
/// The credentials matching `auth_type` must be present: `api_key` (sent in
/// `X-API-Key`), `username` and `password`, or `access_token`. Anything else
/// is rejected.
pub fn create_api_integration(
    manager: &mut IntegrationManager,
    name: &str,
    params: ApiIntegration,
    make_default: bool,
) -> bool {
    let auth_type = params.auth_type.clone().unwrap_or_else(|| "api_key".to_string());
    let mut config = SourceConfig::rest_api(params.base_url.clone(), auth_type.clone());

    config = match auth_type.as_str() {
        "api_key" if non_empty(&params.api_key).is_some() => config
            .with("api_key", params.api_key.clone())
            .with("api_key_header", DEFAULT_API_KEY_HEADER),
        "basic"
            if non_empty(&params.username).is_some() && non_empty(&params.password).is_some() =>
        {
            config
                .with("username", params.username.clone())
                .with("password", params.password.clone())
        }
        "oauth2" if non_empty(&params.access_token).is_some() => {
            config.with("access_token", params.access_token.clone())
        }
        _ => {
            tracing::error!("Invalid authentication configuration for API integration {}", name);
            return false;
        }
    };

    let config = with_extra(config.with("response_format", "json"), params.extra);
    add(manager, "API", name, config, make_default)
}

/// Add a database integration
pub fn create_database_integration(
    manager: &mut IntegrationManager,
    name: &str,
    params: DatabaseIntegration,
    make_default: bool,
) -> bool {
    let config = with_extra(
        SourceConfig::database(params.connection_string, params.driver),
        params.extra,
    );
    add(manager, "database", name, config, make_default)
}

/// Add a CSV file integration
pub fn create_file_integration(
    manager: &mut IntegrationManager,
    name: &str,
    params: FileIntegration,
    make_default: bool,
) -> bool {
    let config = with_extra(SourceConfig::csv_file(params.file_path), params.extra);
    add(manager, "file", name, config, make_default)
}

/// Add an MLS integration
///
/// Authenticates with the API key in `X-API-Key`, or with the access token
/// when one is given. Listings are read from `data.results` unless the
/// extras say otherwise.
pub fn create_mls_integration(
    manager: &mut IntegrationManager,
    name: &str,
    params: MlsIntegration,
    make_default: bool,
) -> bool {
    let mut config = match non_empty(&params.access_token) {
        Some(token) => SourceConfig::mls(params.base_url, "oauth2", params.mls_provider)
            .with("access_token", token),
        None => SourceConfig::mls(params.base_url, "api_key", params.mls_provider),
    };
    config = config
        .with("api_key", params.api_key)
        .with("api_key_header", DEFAULT_API_KEY_HEADER)
        .with("response_format", "json")
        .with("data_path", DEFAULT_MLS_DATA_PATH);

    add(manager, "MLS", name, with_extra(config, params.extra), make_default)
}

/// Header a CRM expects its API key in
pub fn crm_api_key_header(crm_provider: &str) -> &'static str {
    match crm_provider {
        "hubspot" => "hapikey",
        "zoho" => "AUTHTOKEN",
        _ => DEFAULT_API_KEY_HEADER,
    }
}

/// Add a CRM integration
///
/// The first credential present picks the auth type: `api_key` (in the
/// provider's header), `access_token`, then `username` and `password`. With
/// none of them the integration is not created.
pub fn create_crm_integration(
    manager: &mut IntegrationManager,
    name: &str,
    params: CrmIntegration,
    make_default: bool,
) -> bool {
    let header = crm_api_key_header(&params.crm_provider);
    let base_url = params.base_url.clone();
    let provider = params.crm_provider.clone();

    let config = if let Some(key) = non_empty(&params.api_key) {
        SourceConfig::crm(base_url, "api_key", provider)
            .with("api_key", key)
            .with("api_key_header", header)
    } else if let Some(token) = non_empty(&params.access_token) {
        SourceConfig::crm(base_url, "oauth2", provider).with("access_token", token)
    } else if let (Some(username), Some(password)) =
        (non_empty(&params.username), non_empty(&params.password))
    {
        SourceConfig::crm(base_url, "basic", provider)
            .with("username", username)
            .with("password", password)
    } else {
        tracing::error!("No authentication method provided for CRM integration {}", name);
        return false;
    };

    let config = with_extra(config.with("response_format", "json"), params.extra);
    add(manager, "CRM", name, config, make_default)
}

/// Set one configuration key on a managed source
fn configure(
    manager: &mut IntegrationManager,
    name: Option<&str>,
    key: &str,
    value: Value,
) -> Result<(), Error> {
    manager.get_mut(name)?.config_mut().set(key, value);
    Ok(())
}

/// Search listings through an MLS integration
pub async fn search_properties(
    manager: &mut IntegrationManager,
    search: &PropertySearch,
    name: Option<&str>,
) -> FetchOutcome {
    manager.fetch(name, Query::Params(search.to_query())).await
}

/// Fetch leads from a CRM integration, optionally filtered by status and source
pub async fn get_leads(
    manager: &mut IntegrationManager,
    status: Option<&str>,
    source: Option<&str>,
    name: Option<&str>,
) -> FetchOutcome {
    let mut query = Map::new();
    query.insert("entity_type".to_string(), Value::from("leads"));
    query.insert("fields".to_string(), Value::from(LEAD_FIELDS.to_vec()));
    if let Some(status) = status.filter(|s| !s.is_empty()) {
        query.insert("status".to_string(), Value::from(status));
    }
    if let Some(source) = source.filter(|s| !s.is_empty()) {
        query.insert("source".to_string(), Value::from(source));
    }

    manager.fetch(name, Query::Params(query)).await
}

/// Push leads to a CRM integration
///
/// Points the integration at its lead entity first; that setting stays for
/// later pushes.
pub async fn add_leads_to_crm(
    manager: &mut IntegrationManager,
    leads: &Table,
    name: Option<&str>,
) -> PushOutcome {
    if let Err(e) = configure(manager, name, "entity_type", Value::from("leads")) {
        return PushOutcome::from_result("Error adding leads to CRM", Err(e));
    }
    manager.push(leads, name).await
}

/// Run SQL against a database integration
pub async fn query_external_database(
    manager: &mut IntegrationManager,
    sql: &str,
    name: Option<&str>,
) -> FetchOutcome {
    manager.fetch(name, Query::Sql(sql.to_string())).await
}

/// Insert `data` into `table` of a database integration
pub async fn export_data_to_external_database(
    manager: &mut IntegrationManager,
    data: &Table,
    table: &str,
    name: Option<&str>,
) -> PushOutcome {
    if let Err(e) = configure(manager, name, "table", Value::from(table)) {
        return PushOutcome::from_result("Error exporting data to external database", Err(e));
    }
    manager.push(data, name).await
}

/// GET `endpoint` of an API integration with optional query parameters
pub async fn call_api_endpoint(
    manager: &mut IntegrationManager,
    endpoint: &str,
    params: Option<Map<String, Value>>,
    name: Option<&str>,
) -> FetchOutcome {
    if let Err(e) = configure(manager, name, "endpoint", Value::from(endpoint)) {
        return FetchOutcome::from_result("Error calling API endpoint", Err(e));
    }
    let query = params.map(Query::Params).unwrap_or_default();
    manager.fetch(name, query).await
}

/// Read a CSV integration, optionally keeping only rows matching `filters`
pub async fn import_data_from_csv(
    manager: &mut IntegrationManager,
    filters: Option<Map<String, Value>>,
    name: Option<&str>,
) -> FetchOutcome {
    let query = filters.map(Query::Params).unwrap_or_default();
    manager.fetch(name, query).await
}

/// Write `data` to a CSV integration, overwriting unless told otherwise
pub async fn export_data_to_csv(
    manager: &mut IntegrationManager,
    data: &Table,
    name: Option<&str>,
    write_mode: Option<WriteMode>,
) -> PushOutcome {
    let write_mode = write_mode.unwrap_or(WriteMode::Overwrite);
    if let Err(e) = configure(manager, name, "write_mode", Value::from(write_mode.to_string())) {
        return PushOutcome::from_result("Error exporting data to CSV", Err(e));
    }
    manager.push(data, name).await
}
