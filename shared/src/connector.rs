//! Client for the SQL connector proxy.
//!
//! The proxy holds the actual SQL Server connection. We POST the customer's
//! credentials, connection details and query text to `{base}/mssql` and get
//! back `{ "data": { "recordsets": [[...]] } }`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info};

use crate::models::ConnectorSettings;
use crate::{Error, Result};

/// SQL Server connection block of a connector request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig<'a> {
    pub server: &'a str,
    pub database: &'a str,
    pub user: &'a str,
    pub password: &'a str,
    pub port: u16,
    pub options: ServerOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerOptions {
    pub encrypt: bool,
    pub trust_server_certificate: bool,
}

/// Body of `POST /mssql`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorRequest<'a> {
    pub client_id: &'a str,
    pub client_pass: &'a str,
    pub config: ServerConfig<'a>,
    pub query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<&'static str, Option<String>>>,
}

impl<'a> ConnectorRequest<'a> {
    pub fn new(settings: &'a ConnectorSettings, query: &'a str) -> Self {
        Self {
            client_id: &settings.client_id,
            client_pass: &settings.client_pass,
            config: ServerConfig {
                server: &settings.server,
                database: &settings.database,
                user: &settings.user,
                password: &settings.password,
                port: settings.port,
                options: ServerOptions {
                    encrypt: settings.encrypt,
                    trust_server_certificate: settings.trust_server_certificate,
                },
            },
            query,
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<&'static str, Option<String>>) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConnectorData {
    #[serde(default)]
    recordsets: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ConnectorResponse {
    #[serde(default)]
    data: ConnectorData,
}

/// Parse a successful proxy body into the rows of its first recordset.
pub fn parse_rows(body: &[u8]) -> Result<Vec<serde_json::Value>> {
    let response: ConnectorResponse = serde_json::from_slice(body)?;
    Ok(response
        .data
        .recordsets
        .into_iter()
        .next()
        .unwrap_or_default())
}

/// Pull a human-readable message out of an error body, if there is one.
///
/// The proxy is not consistent: it sends `message`, `error` as a string, or
/// `error.message`.
pub fn upstream_message(body: &str) -> Option<String> {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => {
            let text = body.trim();
            return (!text.is_empty() && text.len() <= 500).then(|| text.to_string());
        }
    };

    value
        .get("message")
        .and_then(|v| v.as_str())
        .or_else(|| value.get("error").and_then(|v| v.as_str()))
        .or_else(|| {
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// HTTP client for the connector proxy.
#[derive(Debug, Clone)]
pub struct ConnectorClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl ConnectorClient {
    /// Create a client. Every call is bounded by `timeout` and never retried.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/mssql", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run a query through the proxy and return the first recordset.
    pub async fn run_query(&self, request: &ConnectorRequest<'_>) -> Result<Vec<serde_json::Value>> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!("Connector call timed out: {}", e);
                    Error::Connector(format!("timed out: {}", e))
                } else {
                    error!("Connector call failed: {}", e);
                    Error::Connector(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Connector(format!("Failed to read connector response: {}", e)))?;

        if !status.is_success() {
            let message = upstream_message(&String::from_utf8_lossy(&body));
            error!(
                "Connector returned {} for server {}: {:?}",
                status, request.config.server, message
            );
            return Err(Error::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let rows = parse_rows(&body)?;
        info!(
            "Connector returned {} rows from {}/{}",
            rows.len(),
            request.config.server,
            request.config.database
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use crate::error::GENERIC_SERVER_ERROR;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> ConnectorSettings {
        ConnectorSettings {
            customer_id: Uuid::new_v4(),
            client_id: "acme".into(),
            client_pass: "pass".into(),
            server: "sql.acme.local".into(),
            database: "ERP".into(),
            user: "rapor".into(),
            password: "pw".into(),
            port: 1433,
            encrypt: true,
            trust_server_certificate: false,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_request_wire_shape() {
        let settings = settings();
        let request = ConnectorRequest::new(&settings, "SELECT 1");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "clientId": "acme",
                "clientPass": "pass",
                "config": {
                    "server": "sql.acme.local",
                    "database": "ERP",
                    "user": "rapor",
                    "password": "pw",
                    "port": 1433,
                    "options": { "encrypt": true, "trustServerCertificate": false }
                },
                "query": "SELECT 1"
            })
        );
    }

    #[test]
    fn test_request_with_parameters() {
        let settings = settings();
        let request = ConnectorRequest::new(&settings, "SELECT @search")
            .with_parameters(BTreeMap::from([("search", Some("abc".to_string()))]));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["parameters"], json!({ "search": "abc" }));
    }

    #[test]
    fn test_parse_rows_takes_first_recordset() {
        let body = br#"{"data":{"recordsets":[[{"toplam":12}],[{"x":1}]]}}"#;
        assert_eq!(parse_rows(body).unwrap(), vec![json!({"toplam": 12})]);
    }

    #[test]
    fn test_parse_rows_tolerates_missing_recordsets() {
        assert!(parse_rows(br#"{"data":{}}"#).unwrap().is_empty());
        assert!(parse_rows(br#"{}"#).unwrap().is_empty());
        assert!(parse_rows(b"not json").is_err());
    }

    #[test]
    fn test_upstream_message_variants() {
        assert_eq!(
            upstream_message(r#"{"message":"Invalid object name 'X'"}"#).as_deref(),
            Some("Invalid object name 'X'")
        );
        assert_eq!(upstream_message(r#"{"error":"bad client"}"#).as_deref(), Some("bad client"));
        assert_eq!(
            upstream_message(r#"{"error":{"message":"login failed"}}"#).as_deref(),
            Some("login failed")
        );
        assert_eq!(upstream_message(r#"{"status":500}"#), None);
        assert_eq!(upstream_message("Bad Gateway").as_deref(), Some("Bad Gateway"));
        assert_eq!(upstream_message("  "), None);
    }

    async fn mock_connector(response: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mssql"))
            .respond_with(response)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_run_query_returns_first_recordset() {
        let server = mock_connector(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "recordsets": [[{ "toplam": 1 }]] } })),
        )
        .await;
        let client = ConnectorClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let settings = settings();

        let rows = client
            .run_query(&ConnectorRequest::new(&settings, "SELECT 1 AS toplam"))
            .await
            .unwrap();
        assert_eq!(rows, vec![json!({ "toplam": 1 })]);

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["clientId"], "acme");
        assert_eq!(body["query"], "SELECT 1 AS toplam");
    }

    #[tokio::test]
    async fn test_run_query_forwards_upstream_status_and_message() {
        let server =
            mock_connector(ResponseTemplate::new(502).set_body_json(json!({ "message": "login fail" })))
                .await;
        let client = ConnectorClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let settings = settings();

        let err = client
            .run_query(&ConnectorRequest::new(&settings, "SELECT 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 502, .. }));
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.public_message(), "login fail");
    }

    #[tokio::test]
    async fn test_run_query_timeout_is_generic_server_error() {
        let server = mock_connector(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "recordsets": [[]] } }))
                .set_delay(Duration::from_millis(1500)),
        )
        .await;
        let client = ConnectorClient::new(&server.uri(), Duration::from_millis(300)).unwrap();
        let settings = settings();

        let err = client
            .run_query(&ConnectorRequest::new(&settings, "SELECT 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connector(_)));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), GENERIC_SERVER_ERROR);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = ConnectorClient::new("https://kernel.connectorabi.com/", Duration::from_secs(30)).unwrap();
        assert_eq!(client.endpoint(), "https://kernel.connectorabi.com/mssql");
    }
}
