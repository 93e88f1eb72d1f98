// # REST API Data Source
//
// Reads and writes tables over HTTP.
//
// ## Configuration
//
// Required: `base_url`, `auth_type`.
//
// | Key | Meaning | Default |
// |---|---|---|
// | `auth_type` | `api_key`, `oauth2`, `basic`, anything else for none | |
// | `api_key` / `api_key_header` | key value and the header carrying it | header `Authorization` |
// | `access_token` | bearer token for `oauth2` | |
// | `username` / `password` | credentials for `basic` | |
// | `headers` | object of static headers, merged last | |
// | `ping_endpoint` | GET on connect, success iff status < 400 | no ping |
// | `endpoint` | fetch path appended to `base_url` | `""` |
// | `response_format` | `json` or `csv` | `json` |
// | `data_path` | dotted path drilled into a JSON response | whole body |
// | `push_endpoint` | push path appended to `base_url` | `""` |
// | `push_format` | `json` or `csv` | `json` |
// | `push_root_element` | key the JSON records are wrapped under | bare array |
//
// The MLS and CRM sources embed a [`RestApiSource`] and drive it through
// [`RestApiSource::fetch_params`] and [`RestApiSource::post_json`] after
// translating queries for their provider.
//
// ## Security Requirements
//
// - Credentials NEVER appear in logs
// - `Debug` output masks credential values

use async_trait::async_trait;
use propbridge_core::{
    Configuration, DataSource, DataSourceFactory, Error, FetchOutcome, PushOutcome, Query, Result,
    SourceConfig, SourceKind, SourceRegistry, Table, value_text,
};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use std::time::Duration;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the key for `auth_type = api_key` when none is configured
const DEFAULT_API_KEY_HEADER: &str = "Authorization";

/// REST API data source
pub struct RestApiSource {
    config: Configuration,

    /// HTTP session, present between connect and disconnect
    session: Option<reqwest::Client>,
}

// Custom Debug implementation that hides credentials
impl std::fmt::Debug for RestApiSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestApiSource")
            .field("config", &self.config.redacted())
            .field("connected", &self.session.is_some())
            .finish()
    }
}

impl RestApiSource {
    /// Create a REST source over `config`
    ///
    /// # Errors
    ///
    /// A configuration error when `base_url` or `auth_type` (or any field the
    /// configuration itself declares required) is absent.
    pub fn new(mut config: Configuration) -> Result<Self> {
        config.require(SourceKind::RestApi.required_fields().iter().copied());
        config.ensure_valid(SourceKind::RestApi.type_name())?;

        Ok(Self {
            config,
            session: None,
        })
    }

    /// The configured base URL
    pub fn base_url(&self) -> String {
        self.config.get_str("base_url").unwrap_or_default()
    }

    fn setting(&self, key: &str, default: &str) -> String {
        self.config
            .get_str(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Session-wide headers derived from `auth_type` and `headers`
    fn session_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        match self.setting("auth_type", "").as_str() {
            "api_key" => {
                let name = self.setting("api_key_header", DEFAULT_API_KEY_HEADER);
                let key = self.setting("api_key", "");
                if !key.is_empty() {
                    headers.insert(header_name(&name)?, secret_header_value(&key)?);
                }
            }
            "oauth2" => {
                let token = self.setting("access_token", "");
                if !token.is_empty() {
                    let bearer = format!("Bearer {}", token);
                    headers.insert(AUTHORIZATION, secret_header_value(&bearer)?);
                }
            }
            _ => {}
        }

        if let Some(Value::Object(extra)) = self.config.get("headers") {
            for (name, value) in extra {
                let value = HeaderValue::from_str(&value_text(value)).map_err(|e| {
                    Error::config(format!("Invalid value for header {}: {}", name, e))
                })?;
                headers.insert(header_name(name)?, value);
            }
        }

        Ok(headers)
    }

    async fn open_session(&mut self) -> Result<bool> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .default_headers(self.session_headers()?)
            .build()
            .map_err(|e| Error::connection(format!("Failed to build HTTP client: {}", e)))?;
        self.session = Some(client);

        let Some(ping) = self.config.get_str("ping_endpoint") else {
            return Ok(true);
        };

        let response = self.request(Method::GET, &ping)?.send().await.map_err(http_error)?;
        let status = response.status();
        if status.as_u16() >= 400 {
            tracing::error!("API ping failed with status {}", status);
            return Ok(false);
        }

        tracing::debug!("API ping succeeded with status {}", status);
        Ok(true)
    }

    /// Start a request against `base_url + endpoint`
    fn request(&self, method: Method, endpoint: &str) -> Result<reqwest::RequestBuilder> {
        let client = self
            .session
            .as_ref()
            .ok_or_else(|| Error::connection("Not connected to API"))?;

        let url = format!("{}{}", self.base_url(), endpoint);
        tracing::debug!("{} {}", method, url);

        let mut request = client.request(method, url);
        if self.setting("auth_type", "") == "basic" {
            let username = self.setting("username", "");
            let password = self.config.get_str("password");
            request = request.basic_auth(username, password);
        }
        Ok(request)
    }

    async fn ensure_connected(&mut self) {
        if self.session.is_none() {
            self.connect().await;
        }
    }

    /// GET `base_url + endpoint` with `params` and decode the response
    ///
    /// # Errors
    ///
    /// - transport failure or status >= 400
    /// - undecodable body, missing `data_path`, unsupported `response_format`
    pub async fn fetch_params(&mut self, params: &Map<String, Value>) -> Result<Table> {
        self.ensure_connected().await;

        let endpoint = self.setting("endpoint", "");
        let response = self
            .request(Method::GET, &endpoint)?
            .query(&encode_params(params))
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(http_error)?;
        if status >= 400 {
            return Err(Error::status(status, body));
        }

        self.decode_response(&body)
    }

    fn decode_response(&self, body: &str) -> Result<Table> {
        match self.setting("response_format", "json").as_str() {
            "json" => {
                let value: Value = serde_json::from_str(body)?;
                let data = match self.config.get_str("data_path") {
                    Some(path) if !path.is_empty() => extract_path(value, &path)?,
                    _ => value,
                };
                Table::from_json_value(data)
                    .ok_or_else(|| Error::decode("Response data is neither a list nor an object"))
            }
            "csv" => Table::from_csv(body),
            other => Err(Error::unsupported(format!(
                "Unsupported response format: {}",
                other
            ))),
        }
    }

    /// Serialize `data` per `push_format` and POST it to `base_url + push_endpoint`
    pub async fn push_table(&mut self, data: &Table) -> Result<()> {
        let endpoint = self.setting("push_endpoint", "");

        match self.setting("push_format", "json").as_str() {
            "json" => {
                let records = data.to_json_value();
                let payload = match self.config.get_str("push_root_element") {
                    Some(root) if !root.is_empty() => {
                        let mut wrapped = Map::new();
                        wrapped.insert(root, records);
                        Value::Object(wrapped)
                    }
                    _ => records,
                };
                self.post_json(&endpoint, &payload).await
            }
            "csv" => {
                let body = data.to_csv()?;
                self.ensure_connected().await;
                let request = self
                    .request(Method::POST, &endpoint)?
                    .header(CONTENT_TYPE, "text/csv")
                    .body(body);
                send_push(request).await
            }
            other => Err(Error::unsupported(format!("Unsupported push format: {}", other))),
        }
    }

    /// POST a JSON payload to `base_url + endpoint`; success iff status < 400
    pub async fn post_json(&mut self, endpoint: &str, payload: &Value) -> Result<()> {
        self.ensure_connected().await;
        let request = self.request(Method::POST, endpoint)?.json(payload);
        send_push(request).await
    }
}

#[async_trait]
impl DataSource for RestApiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::RestApi
    }

    fn config(&self) -> &Configuration {
        &self.config
    }

    fn config_mut(&mut self) -> &mut Configuration {
        &mut self.config
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn connect(&mut self) -> bool {
        match self.open_session().await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::error!("Error connecting to API: {}", e);
                false
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.session.take().is_some() {
            tracing::debug!("Closed API session for {}", self.base_url());
        }
    }

    async fn fetch(&mut self, query: Query) -> FetchOutcome {
        let result = match query {
            Query::Sql(_) => Err(Error::unsupported("REST sources take parameter queries")),
            other => self.fetch_params(&other.into_params()).await,
        };
        FetchOutcome::from_result("Error fetching data from API", result)
    }

    async fn push(&mut self, data: &Table) -> PushOutcome {
        let result = self.push_table(data).await;
        PushOutcome::from_result("Error pushing data to API", result)
    }
}

async fn send_push(request: reqwest::RequestBuilder) -> Result<()> {
    let response = request.send().await.map_err(http_error)?;
    let status = response.status().as_u16();
    if status >= 400 {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        return Err(Error::status(status, body));
    }
    Ok(())
}

fn http_error(err: reqwest::Error) -> Error {
    Error::http(format!("HTTP request failed: {}", err))
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::config(format!("Invalid header name {}: {}", name, e)))
}

fn secret_header_value(value: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|_| Error::config("Credential is not a valid header value"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Walk a dotted key path into decoded JSON
pub fn extract_path(value: Value, path: &str) -> Result<Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(mut object) => object.shift_remove(segment),
            _ => None,
        }
        .ok_or_else(|| Error::decode(format!("Data path '{}' not found in response", path)))?;
    }
    Ok(current)
}

/// Flatten a parameter mapping into query pairs
///
/// Strings go verbatim, numbers and booleans rendered, arrays repeated per
/// element, nulls dropped, objects JSON-encoded.
pub fn encode_params(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|item| !item.is_null()) {
                    pairs.push((key.clone(), value_text(item)));
                }
            }
            other => pairs.push((key.clone(), value_text(other))),
        }
    }
    pairs
}

/// Factory for creating REST API sources
pub struct RestApiFactory;

impl DataSourceFactory for RestApiFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn DataSource>> {
        match config {
            SourceConfig::RestApi { .. } => Ok(Box::new(RestApiSource::new(
                config.clone().into_configuration(),
            )?)),
            other => Err(Error::config(format!(
                "REST API factory cannot build a {} source",
                other.type_name()
            ))),
        }
    }
}

/// Register the REST API source with a registry
pub fn register(registry: &mut SourceRegistry) {
    registry.register(SourceKind::RestApi.type_name(), Box::new(RestApiFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_factory_creation() {
        let config = SourceConfig::rest_api("https://api.test", "none");
        let source = RestApiFactory.create(&config).unwrap();

        assert_eq!(source.kind(), SourceKind::RestApi);
        assert!(!source.is_connected());
    }

    #[test]
    fn test_factory_rejects_other_kinds() {
        let config = SourceConfig::csv_file("listings.csv");
        assert!(RestApiFactory.create(&config).is_err());
    }

    #[test]
    fn test_missing_required_field() {
        let config = Configuration::from_map(object(json!({ "base_url": "https://api.test" })));
        match RestApiSource::new(config) {
            Err(Error::Config(msg)) => assert!(msg.contains("auth_type")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_params() {
        let params = object(json!({
            "city": "Austin",
            "limit": 10,
            "active": true,
            "skip": null,
            "type": ["condo", "house"],
            "filter": { "ListPrice.min": 1 }
        }));

        assert_eq!(
            encode_params(&params),
            vec![
                ("city".to_string(), "Austin".to_string()),
                ("limit".to_string(), "10".to_string()),
                ("active".to_string(), "true".to_string()),
                ("type".to_string(), "condo".to_string()),
                ("type".to_string(), "house".to_string()),
                ("filter".to_string(), r#"{"ListPrice.min":1}"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_extract_path() {
        let body = json!({ "data": { "results": [{ "id": 1 }] } });
        assert_eq!(
            extract_path(body.clone(), "data.results").unwrap(),
            json!([{ "id": 1 }])
        );
        assert!(matches!(
            extract_path(body, "data.items"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = Configuration::from_map(object(json!({
            "base_url": "https://api.test",
            "auth_type": "api_key",
            "api_key": "super-secret"
        })));
        let source = RestApiSource::new(config).unwrap();

        let shown = format!("{:?}", source);
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("<REDACTED>"));
    }
}
