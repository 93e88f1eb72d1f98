// # CRM Data Source
//
// Entity reads and batch writes against CRM platforms, sent through an
// embedded [`RestApiSource`].
//
// A fetch query may carry `entity_type` (default `contacts`); the remaining
// keys are translated for the configured `crm_provider`:
//
// | Provider | Endpoint | Records under | Query shape |
// |---|---|---|---|
// | `salesforce` | `/services/data/v52.0/query/` | (configured) | `q` = SOQL |
// | `hubspot` | `/crm/v3/objects/{entity}` | `results` | `limit`, `properties`, `filterGroups` |
// | `zoho` | `/crm/v2/{Module}` | `data` | `per_page`, `fields`, `criteria` |
// | other | `/{entity}` | (configured) | unchanged |
//
// Pushes read `entity_type` from the configuration, drop null fields from
// every record and POST a provider batch payload.

use async_trait::async_trait;
use propbridge_core::{
    Configuration, DataSource, DataSourceFactory, Error, FetchOutcome, PushOutcome, Query, Record,
    Result, SourceConfig, SourceKind, SourceRegistry, Table, value_text,
};
use propbridge_rest::RestApiSource;
use serde_json::{Map, Value, json};
use std::fmt;

/// Entity used when neither the query nor the configuration names one
const DEFAULT_ENTITY: &str = "contacts";

/// Row cap for SOQL queries without a `limit`
const DEFAULT_SOQL_LIMIT: u64 = 100;

const SALESFORCE_QUERY_ENDPOINT: &str = "/services/data/v52.0/query/";
const SALESFORCE_TREE_ENDPOINT: &str = "/services/data/v52.0/composite/tree/";

/// Known CRM providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrmProvider {
    Salesforce,
    Hubspot,
    Zoho,
    /// Unknown provider: generic `/{entity}` endpoints
    Other(String),
}

impl From<&str> for CrmProvider {
    fn from(name: &str) -> Self {
        match name {
            "salesforce" => CrmProvider::Salesforce,
            "hubspot" => CrmProvider::Hubspot,
            "zoho" => CrmProvider::Zoho,
            other => CrmProvider::Other(other.to_string()),
        }
    }
}

impl fmt::Display for CrmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrmProvider::Salesforce => f.write_str("salesforce"),
            CrmProvider::Hubspot => f.write_str("hubspot"),
            CrmProvider::Zoho => f.write_str("zoho"),
            CrmProvider::Other(name) => f.write_str(name),
        }
    }
}

/// A translated fetch: where to send it and with which parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CrmRequest {
    /// Path appended to `base_url`
    pub endpoint: String,
    /// Response key holding the records, when the provider fixes one
    pub data_path: Option<String>,
    /// Query parameters
    pub params: Map<String, Value>,
}

/// A translated push: where to POST which payload
#[derive(Debug, Clone, PartialEq)]
pub struct CrmPush {
    /// Path appended to `base_url`
    pub endpoint: String,
    /// JSON body
    pub payload: Value,
}

/// Salesforce object name for an entity type
pub fn salesforce_object(entity: &str) -> &str {
    match entity {
        "contacts" => "Contact",
        "leads" => "Lead",
        "opportunities" => "Opportunity",
        "accounts" => "Account",
        "properties" => "Property__c",
        other => other,
    }
}

/// Zoho module name for an entity type
pub fn zoho_module(entity: &str) -> &str {
    match entity {
        "contacts" => "Contacts",
        "leads" => "Leads",
        "deals" => "Deals",
        "accounts" => "Accounts",
        other => other,
    }
}

fn comma_joined(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::String(
            items
                .iter()
                .map(value_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => other,
    }
}

/// SOQL for an entity fetch
///
/// `fields` (list or text, default `*`) selects columns and `limit` (default
/// 100) caps rows; every other key becomes an equality clause, string values
/// quoted.
pub fn build_soql(entity: &str, mut query: Map<String, Value>) -> String {
    let fields = query
        .shift_remove("fields")
        .map(|fields| value_text(&comma_joined(fields)))
        .unwrap_or_else(|| "*".to_string());
    let limit = query
        .shift_remove("limit")
        .map(|limit| value_text(&limit))
        .unwrap_or_else(|| DEFAULT_SOQL_LIMIT.to_string());

    let mut soql = format!("SELECT {} FROM {}", fields, salesforce_object(entity));

    let clauses: Vec<String> = query
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{} = '{}'", key, s),
            other => format!("{} = {}", key, value_text(other)),
        })
        .collect();
    if !clauses.is_empty() {
        soql.push_str(" WHERE ");
        soql.push_str(&clauses.join(" AND "));
    }

    soql.push_str(&format!(" LIMIT {}", limit));
    soql
}

fn salesforce_request(entity: &str, query: Map<String, Value>) -> CrmRequest {
    let mut params = Map::new();
    params.insert("q".to_string(), Value::String(build_soql(entity, query)));
    CrmRequest {
        endpoint: SALESFORCE_QUERY_ENDPOINT.to_string(),
        data_path: None,
        params,
    }
}

fn hubspot_request(entity: &str, mut query: Map<String, Value>) -> CrmRequest {
    let mut params = Map::new();
    if let Some(limit) = query.shift_remove("limit") {
        params.insert("limit".to_string(), limit);
    }
    if let Some(properties) = query.shift_remove("properties") {
        params.insert("properties".to_string(), comma_joined(properties));
    }

    if !query.is_empty() {
        let filters: Vec<Value> = query
            .into_iter()
            .map(|(key, value)| {
                json!({
                    "propertyName": key,
                    "operator": "EQ",
                    "value": value
                })
            })
            .collect();
        let groups = json!([{ "filters": filters }]);
        params.insert("filterGroups".to_string(), Value::String(groups.to_string()));
    }

    CrmRequest {
        endpoint: format!("/crm/v3/objects/{}", entity),
        data_path: Some("results".to_string()),
        params,
    }
}

fn zoho_request(entity: &str, mut query: Map<String, Value>) -> CrmRequest {
    let mut params = Map::new();
    if let Some(limit) = query.shift_remove("limit") {
        params.insert("per_page".to_string(), limit);
    }
    if let Some(fields) = query.shift_remove("fields") {
        params.insert("fields".to_string(), comma_joined(fields));
    }

    if !query.is_empty() {
        let criteria: String = query
            .iter()
            .map(|(key, value)| format!("({}:equals:{})", key, value_text(value)))
            .collect();
        params.insert("criteria".to_string(), Value::String(criteria));
    }

    CrmRequest {
        endpoint: format!("/crm/v2/{}", zoho_module(entity)),
        data_path: Some("data".to_string()),
        params,
    }
}

/// Translate a provider-neutral fetch query
///
/// `entity_type` is removed from the query (default `contacts`).
pub fn translate_fetch(provider: &CrmProvider, mut query: Map<String, Value>) -> CrmRequest {
    let entity = query
        .shift_remove("entity_type")
        .map(|entity| value_text(&entity))
        .unwrap_or_else(|| DEFAULT_ENTITY.to_string());

    match provider {
        CrmProvider::Salesforce => salesforce_request(&entity, query),
        CrmProvider::Hubspot => hubspot_request(&entity, query),
        CrmProvider::Zoho => zoho_request(&entity, query),
        CrmProvider::Other(_) => CrmRequest {
            endpoint: format!("/{}", entity),
            data_path: None,
            params: query,
        },
    }
}

/// Translate a push of `records` (already stripped of nulls)
///
/// Returns `None` for unknown providers, which push through the generic
/// REST path instead.
pub fn translate_push(
    provider: &CrmProvider,
    entity: &str,
    records: Vec<Record>,
) -> Option<CrmPush> {
    match provider {
        CrmProvider::Salesforce => {
            let object = salesforce_object(entity);
            let records: Vec<Value> = records
                .into_iter()
                .enumerate()
                .map(|(i, record)| {
                    let mut tagged = Map::new();
                    tagged.insert(
                        "attributes".to_string(),
                        json!({ "type": object, "referenceId": format!("ref{}", i) }),
                    );
                    tagged.extend(record);
                    Value::Object(tagged)
                })
                .collect();
            Some(CrmPush {
                endpoint: format!("{}{}", SALESFORCE_TREE_ENDPOINT, object),
                payload: json!({ "records": records }),
            })
        }
        CrmProvider::Hubspot => {
            let inputs: Vec<Value> = records
                .into_iter()
                .map(|record| json!({ "properties": record }))
                .collect();
            Some(CrmPush {
                endpoint: format!("/crm/v3/objects/{}/batch/create", entity),
                payload: json!({ "inputs": inputs }),
            })
        }
        CrmProvider::Zoho => Some(CrmPush {
            endpoint: format!("/crm/v2/{}", zoho_module(entity)),
            payload: json!({ "data": records }),
        }),
        CrmProvider::Other(_) => None,
    }
}

/// CRM data source
pub struct CrmSource {
    rest: RestApiSource,
    provider: CrmProvider,
}

impl fmt::Debug for CrmSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrmSource")
            .field("provider", &self.provider)
            .field("rest", &self.rest)
            .finish()
    }
}

impl CrmSource {
    /// Create a CRM source over `config`
    ///
    /// # Errors
    ///
    /// A configuration error when `base_url`, `auth_type` or `crm_provider`
    /// is absent.
    pub fn new(mut config: Configuration) -> Result<Self> {
        config.require(SourceKind::Crm.required_fields().iter().copied());
        config.ensure_valid(SourceKind::Crm.type_name())?;

        let provider = CrmProvider::from(
            config
                .get_str("crm_provider")
                .unwrap_or_default()
                .as_str(),
        );

        Ok(Self {
            rest: RestApiSource::new(config)?,
            provider,
        })
    }

    /// The provider requests are translated for
    pub fn provider(&self) -> &CrmProvider {
        &self.provider
    }

    async fn fetch_entities(&mut self, query: Map<String, Value>) -> Result<Table> {
        let request = translate_fetch(&self.provider, query);
        tracing::debug!(
            "Translated {} fetch to {} with {:?}",
            self.provider,
            request.endpoint,
            request.params
        );

        let config = self.rest.config_mut();
        config.set("endpoint", request.endpoint);
        if let Some(data_path) = request.data_path {
            config.set("data_path", data_path);
        }

        self.rest.fetch_params(&request.params).await
    }

    async fn push_entities(&mut self, data: &Table) -> Result<()> {
        if data.is_empty() {
            return Err(Error::unsupported("Empty table provided for CRM push"));
        }

        let entity = self
            .rest
            .config()
            .get_str("entity_type")
            .unwrap_or_else(|| DEFAULT_ENTITY.to_string());

        match translate_push(&self.provider, &entity, data.without_nulls()) {
            Some(push) => {
                self.rest.config_mut().set("push_endpoint", push.endpoint.clone());
                tracing::debug!(
                    "Pushing {} {} record(s) to {}",
                    data.len(),
                    self.provider,
                    push.endpoint
                );
                self.rest.post_json(&push.endpoint, &push.payload).await
            }
            None => {
                let generic = format!("/{}", entity);
                let config = self.rest.config_mut();
                config.set("endpoint", generic.clone());
                config.set("push_endpoint", generic);
                self.rest.push_table(data).await
            }
        }
    }
}

#[async_trait]
impl DataSource for CrmSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Crm
    }

    fn config(&self) -> &Configuration {
        self.rest.config()
    }

    fn config_mut(&mut self) -> &mut Configuration {
        self.rest.config_mut()
    }

    fn is_connected(&self) -> bool {
        self.rest.is_connected()
    }

    async fn connect(&mut self) -> bool {
        self.rest.connect().await
    }

    async fn disconnect(&mut self) {
        self.rest.disconnect().await;
    }

    async fn fetch(&mut self, query: Query) -> FetchOutcome {
        let result = match query {
            Query::Sql(_) => Err(Error::unsupported("CRM sources take entity queries")),
            other => self.fetch_entities(other.into_params()).await,
        };
        FetchOutcome::from_result("Error fetching data from CRM", result)
    }

    async fn push(&mut self, data: &Table) -> PushOutcome {
        let result = self.push_entities(data).await;
        PushOutcome::from_result("Error pushing data to CRM", result)
    }
}

/// Factory for creating CRM sources
pub struct CrmFactory;

impl DataSourceFactory for CrmFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn DataSource>> {
        match config {
            SourceConfig::Crm { .. } => Ok(Box::new(CrmSource::new(
                config.clone().into_configuration(),
            )?)),
            other => Err(Error::config(format!(
                "CRM factory cannot build a {} source",
                other.type_name()
            ))),
        }
    }
}

/// Register the CRM source with a registry
pub fn register(registry: &mut SourceRegistry) {
    registry.register(SourceKind::Crm.type_name(), Box::new(CrmFactory));
}
