//! Report execution: fill the template, call the connector, record usage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Caller;
use crate::connector::{ConnectorClient, ConnectorRequest};
use crate::models::{ConnectorSettings, Report};
use crate::params::ExtractedParameters;
use crate::store;
use crate::template::{self, ParameterMode};
use crate::{Config, Error, Result};

/// Outcome of a successful execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
    pub parameters: ExtractedParameters,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Query text and optional bound values for one connector call.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    pub sql: String,
    pub parameters: Option<std::collections::BTreeMap<&'static str, Option<String>>>,
}

/// Build the connector query for a template under the given mode.
pub fn prepare(template_sql: &str, params: &ExtractedParameters, mode: ParameterMode) -> PreparedQuery {
    match mode {
        ParameterMode::Bound => PreparedQuery {
            sql: template_sql.to_string(),
            parameters: Some(template::bound_parameters(params)),
        },
        ParameterMode::Inline => PreparedQuery {
            sql: template::render_sql(template_sql, params),
            parameters: None,
        },
    }
}

/// What execution reads and writes besides the connector call.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn connector_for(&self, customer_id: Uuid) -> Result<Option<ConnectorSettings>>;
    async fn record_usage(&self, report_id: Uuid) -> Result<()>;
    async fn record_activity(
        &self,
        customer_id: Uuid,
        report_id: Uuid,
        action: &str,
        detail: serde_json::Value,
    ) -> Result<()>;
}

#[async_trait]
impl ExecutionStore for PgPool {
    async fn connector_for(&self, customer_id: Uuid) -> Result<Option<ConnectorSettings>> {
        store::find_connector(self, customer_id).await
    }

    async fn record_usage(&self, report_id: Uuid) -> Result<()> {
        store::record_usage(self, report_id).await
    }

    async fn record_activity(
        &self,
        customer_id: Uuid,
        report_id: Uuid,
        action: &str,
        detail: serde_json::Value,
    ) -> Result<()> {
        store::record_activity(self, customer_id, Some(report_id), action, detail).await
    }
}

/// Runs reports against their owner's connector.
#[derive(Debug, Clone)]
pub struct ReportExecutor {
    connector: ConnectorClient,
    mode: ParameterMode,
}

impl ReportExecutor {
    pub fn new(connector: ConnectorClient, mode: ParameterMode) -> Self {
        Self { connector, mode }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let connector = ConnectorClient::new(&config.connector_url, config.connector_timeout)?;
        // Bound mode needs a connector that reads `parameters`; older ones want `inline`.
        info!(
            "Connector {} with parameter mode {:?}",
            connector.endpoint(),
            config.parameter_mode
        );
        Ok(Self::new(connector, config.parameter_mode))
    }

    /// Execute `report` with `params` on behalf of `caller`.
    ///
    /// Usage and activity are recorded after the rows come back. Failing to
    /// record them is logged and does not fail the request.
    pub async fn execute<S: ExecutionStore>(
        &self,
        store: &S,
        caller: &Caller,
        report: &Report,
        params: ExtractedParameters,
    ) -> Result<Execution> {
        caller.ensure_access(report)?;

        let settings = store
            .connector_for(report.owner_id)
            .await?
            .ok_or_else(|| {
                Error::Validation("Veritabanı bağlantı ayarları tanımlanmamış".to_string())
            })?;

        let prepared = prepare(&report.sql_template, &params, self.mode);
        let mut request = ConnectorRequest::new(&settings, &prepared.sql);
        if let Some(bound) = prepared.parameters.clone() {
            request = request.with_parameters(bound);
        }

        let started = Instant::now();
        let rows = self.connector.run_query(&request).await?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let executed_at = Utc::now();

        info!(
            "Executed report {} for customer {} ({} rows, {} ms)",
            report.id,
            caller.customer_id,
            rows.len(),
            duration_ms
        );

        if let Err(e) = store.record_usage(report.id).await {
            warn!("Failed to record usage for report {}: {}", report.id, e);
        }

        let detail = serde_json::json!({
            "reportName": report.name,
            "rowCount": rows.len(),
            "durationMs": duration_ms,
            "parameters": &params,
        });
        if let Err(e) = store
            .record_activity(caller.customer_id, report.id, "report.execute", detail)
            .await
        {
            warn!("Failed to record activity for report {}: {}", report.id, e);
        }

        Ok(Execution {
            row_count: rows.len(),
            rows,
            parameters: params,
            executed_at,
            duration_ms,
        })
    }

    /// Run a fixed probe query against a connector, without touching reports.
    pub async fn probe(&self, settings: &ConnectorSettings) -> Result<Vec<serde_json::Value>> {
        let request = ConnectorRequest::new(settings, "SELECT 1 AS ok");
        self.connector.run_query(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DisplayType, Role};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params() -> ExtractedParameters {
        ExtractedParameters {
            date1: NaiveDate::from_ymd_opt(2026, 10, 14),
            date2: NaiveDate::from_ymd_opt(2026, 10, 14),
            search: None,
        }
    }

    #[test]
    fn test_prepare_bound_keeps_template() {
        let sql = "SELECT * FROM satis WHERE tarih BETWEEN @date1 AND @date2";
        let prepared = prepare(sql, &params(), ParameterMode::Bound);
        assert_eq!(prepared.sql, sql);
        let bound = prepared.parameters.unwrap();
        assert_eq!(bound["date1"].as_deref(), Some("2026-10-14"));
        assert_eq!(bound["search"], None);
    }

    #[test]
    fn test_prepare_inline_substitutes() {
        let sql = "SELECT * FROM satis WHERE tarih BETWEEN @date1 AND @date2 AND ad LIKE @search";
        let prepared = prepare(sql, &params(), ParameterMode::Inline);
        assert_eq!(
            prepared.sql,
            "SELECT * FROM satis WHERE tarih BETWEEN '2026-10-14' AND '2026-10-14' AND ad LIKE ''"
        );
        assert!(prepared.parameters.is_none());
    }

    #[test]
    fn test_default_mode_sends_bound_parameters() {
        let sql = "SELECT * FROM satis WHERE tarih >= @date1";
        let prepared = prepare(sql, &params(), ParameterMode::default());
        assert_eq!(prepared.sql, sql);
        assert!(prepared.parameters.is_some());
    }

    /// In-memory store that records every bookkeeping write.
    #[derive(Default)]
    struct RecordingStore {
        connector: Option<ConnectorSettings>,
        usage: Mutex<Vec<Uuid>>,
        activity: Mutex<Vec<(Uuid, Uuid, String, serde_json::Value)>>,
    }

    #[async_trait]
    impl ExecutionStore for RecordingStore {
        async fn connector_for(&self, _customer_id: Uuid) -> Result<Option<ConnectorSettings>> {
            Ok(self.connector.clone())
        }

        async fn record_usage(&self, report_id: Uuid) -> Result<()> {
            self.usage.lock().unwrap().push(report_id);
            Ok(())
        }

        async fn record_activity(
            &self,
            customer_id: Uuid,
            report_id: Uuid,
            action: &str,
            detail: serde_json::Value,
        ) -> Result<()> {
            self.activity
                .lock()
                .unwrap()
                .push((customer_id, report_id, action.to_string(), detail));
            Ok(())
        }
    }

    fn owner() -> Caller {
        Caller {
            customer_id: Uuid::new_v4(),
            role: Role::Customer,
            email: "owner@example.com".to_string(),
        }
    }

    fn report_for(owner: &Caller) -> Report {
        Report {
            id: Uuid::new_v4(),
            owner_id: owner.customer_id,
            name: "Günlük Satışlar".to_string(),
            description: String::new(),
            sql_template: "SELECT SUM(tutar) AS toplam FROM satis WHERE tarih = @date1".to_string(),
            active: true,
            keywords: vec!["satış".to_string()],
            category: None,
            display_type: DisplayType::Table,
            example_questions: vec![],
            usage_count: 0,
            last_used_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn store_for(owner: &Caller) -> RecordingStore {
        RecordingStore {
            connector: Some(ConnectorSettings {
                customer_id: owner.customer_id,
                client_id: "acme".into(),
                client_pass: "pass".into(),
                server: "sql.acme.local".into(),
                database: "ERP".into(),
                user: "rapor".into(),
                password: "pw".into(),
                port: 1433,
                encrypt: false,
                trust_server_certificate: true,
                updated_at: Utc::now(),
            }),
            ..Default::default()
        }
    }

    async fn executor_answering(response: ResponseTemplate) -> (MockServer, ReportExecutor) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mssql"))
            .respond_with(response)
            .mount(&server)
            .await;
        let connector = ConnectorClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        (server, ReportExecutor::new(connector, ParameterMode::Inline))
    }

    #[tokio::test]
    async fn test_execute_records_usage_and_activity_on_success() {
        let (_server, executor) = executor_answering(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "data": { "recordsets": [[{ "toplam": 1 }]] } })),
        )
        .await;
        let owner = owner();
        let report = report_for(&owner);
        let store = store_for(&owner);

        let execution = executor.execute(&store, &owner, &report, params()).await.unwrap();
        assert_eq!(execution.row_count, 1);

        assert_eq!(*store.usage.lock().unwrap(), vec![report.id]);
        let activity = store.activity.lock().unwrap();
        assert_eq!(activity.len(), 1);
        let (customer_id, report_id, action, detail) = &activity[0];
        assert_eq!(*customer_id, owner.customer_id);
        assert_eq!(*report_id, report.id);
        assert_eq!(action, "report.execute");
        assert_eq!(detail["rowCount"], 1);
    }

    #[tokio::test]
    async fn test_execute_failure_records_nothing() {
        let (_server, executor) = executor_answering(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({ "message": "deadlock" })),
        )
        .await;
        let owner = owner();
        let report = report_for(&owner);
        let store = store_for(&owner);

        let err = executor.execute(&store, &owner, &report, params()).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(store.usage.lock().unwrap().is_empty());
        assert!(store.activity.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execute_without_connector_settings_is_rejected() {
        let (server, executor) = executor_answering(ResponseTemplate::new(200)).await;
        let owner = owner();
        let report = report_for(&owner);
        let store = RecordingStore::default();

        let err = executor.execute(&store, &owner, &report, params()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
        assert!(store.usage.lock().unwrap().is_empty());
    }
}
